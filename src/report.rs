use std::fmt::Write;

use crate::models::UserScores;
use crate::rank::{self, RankedOffering};

#[derive(Debug, Clone)]
pub struct StateSummary {
    pub state: String,
    pub total: usize,
    pub approved: usize,
}

pub fn summarize_by_state(ranked: &[RankedOffering]) -> Vec<StateSummary> {
    let mut map: std::collections::HashMap<String, (usize, usize)> =
        std::collections::HashMap::new();

    for entry in ranked {
        let counts = map.entry(entry.offering.state.clone()).or_insert((0, 0));
        counts.0 += 1;
        if entry.passed {
            counts.1 += 1;
        }
    }

    let mut summaries: Vec<StateSummary> = map
        .into_iter()
        .map(|(state, (total, approved))| StateSummary {
            state,
            total,
            approved,
        })
        .collect();

    summaries.sort_by(|a, b| b.approved.cmp(&a.approved).then(a.state.cmp(&b.state)));
    summaries
}

pub fn build_report(ranked: &[RankedOffering], scores: &UserScores) -> String {
    let summaries = summarize_by_state(ranked);
    let approved_total = ranked.iter().filter(|entry| entry.passed).count();

    let mut output = String::new();

    let _ = writeln!(output, "# Relatório SISU Medicina");
    if scores.is_complete() {
        let _ = writeln!(
            output,
            "Notas informadas: linguagens {:.1}, humanas {:.1}, natureza {:.1}, matemática {:.1}, redação {:.1}",
            scores.linguagens.unwrap_or(0.0),
            scores.humanas.unwrap_or(0.0),
            scores.natureza.unwrap_or(0.0),
            scores.matematica.unwrap_or(0.0),
            scores.redacao.unwrap_or(0.0)
        );
    } else {
        let _ = writeln!(
            output,
            "Notas incompletas: informe as cinco notas para calcular a pontuação ponderada."
        );
    }
    let _ = writeln!(output);
    let _ = writeln!(output, "## Resumo por estado");

    if summaries.is_empty() {
        let _ = writeln!(output, "Nenhum curso de Medicina na base. Execute `harvest` primeiro.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {}: {} aprovações em {} ofertas",
                summary.state, summary.approved, summary.total
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Aprovações ({approved_total})");

    let approved: Vec<&RankedOffering> = ranked.iter().filter(|entry| entry.passed).collect();
    if approved.is_empty() {
        let _ = writeln!(output, "Nenhuma aprovação com as notas atuais.");
    } else {
        for entry in approved {
            let _ = writeln!(
                output,
                "- {} ({}, {} - {}) sua nota {} x corte {:.2} (Δ {})",
                entry.offering.name,
                entry.offering.short_name,
                entry.offering.city,
                entry.offering.state,
                rank::format_value(entry.score),
                entry.offering.min_score,
                rank::format_value(entry.delta)
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Classificação completa");

    if ranked.is_empty() {
        let _ = writeln!(output, "Nada a classificar.");
    } else {
        for entry in ranked.iter() {
            let _ = writeln!(
                output,
                "- [{}] {} ({}) corte {:.2}, sua nota {}, delta {}",
                rank::status_label(entry.passed),
                entry.offering.name,
                entry.offering.state,
                entry.offering.min_score,
                rank::format_value(entry.score),
                rank::format_value(entry.delta)
            );
        }
    }

    output
}
