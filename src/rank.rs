use std::cmp::Ordering;
use std::collections::HashSet;

use crate::models::{CourseOffering, SubjectWeights, UserScores};

/// A course offering annotated with the student's standing against it.
#[derive(Debug, Clone)]
pub struct RankedOffering {
    pub offering: CourseOffering,
    pub score: Option<f64>,
    pub delta: Option<f64>,
    pub passed: bool,
}

/// Weighted composite of the five subject scores, undefined while any score
/// is missing.
pub fn weighted_score(scores: &UserScores, weights: &SubjectWeights) -> Option<f64> {
    let linguagens = scores.linguagens?;
    let humanas = scores.humanas?;
    let natureza = scores.natureza?;
    let matematica = scores.matematica?;
    let redacao = scores.redacao?;

    let total = linguagens * weights.linguagens
        + humanas * weights.humanas
        + natureza * weights.natureza
        + matematica * weights.matematica
        + redacao * weights.redacao;

    Some(total / weights.sum())
}

/// Rank offerings for display. Stable order:
/// 1. passed before failed (an undefined composite counts as failed);
/// 2. preferred-state entries before others, mutually preferred entries in
///    lexicographic state order;
/// 3. descending delta; undefined deltas rank equal among themselves.
pub fn rank(
    offerings: &[CourseOffering],
    scores: &UserScores,
    preferred_states: &HashSet<String>,
) -> Vec<RankedOffering> {
    let mut ranked: Vec<RankedOffering> = offerings
        .iter()
        .map(|offering| {
            let score = weighted_score(scores, &offering.weights);
            let delta = score.map(|value| value - offering.min_score);
            let passed = score.is_some_and(|value| value >= offering.min_score);
            RankedOffering {
                offering: offering.clone(),
                score,
                delta,
                passed,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.passed
            .cmp(&a.passed)
            .then_with(|| {
                let a_preferred = preferred_states.contains(&a.offering.state);
                let b_preferred = preferred_states.contains(&b.offering.state);
                match b_preferred.cmp(&a_preferred) {
                    Ordering::Equal if a_preferred => a.offering.state.cmp(&b.offering.state),
                    other => other,
                }
            })
            .then_with(|| match (a.delta, b.delta) {
                (Some(a_delta), Some(b_delta)) => b_delta
                    .partial_cmp(&a_delta)
                    .unwrap_or(Ordering::Equal),
                _ => Ordering::Equal,
            })
    });

    ranked
}

/// "-" while the composite is undefined, two decimals otherwise.
pub fn format_value(value: Option<f64>) -> String {
    match value {
        Some(value) => format!("{value:.2}"),
        None => "-".to_string(),
    }
}

pub fn status_label(passed: bool) -> &'static str {
    if passed {
        "Aprovado"
    } else {
        "Reprovado"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn complete_scores(value: f64) -> UserScores {
        UserScores {
            linguagens: Some(value),
            humanas: Some(value),
            natureza: Some(value),
            matematica: Some(value),
            redacao: Some(value),
        }
    }

    fn offering(name: &str, state: &str, min_score: f64, weights: SubjectWeights) -> CourseOffering {
        CourseOffering {
            name: name.to_string(),
            short_name: name.to_string(),
            state: state.to_string(),
            city: "Cidade".to_string(),
            course_id: format!("{name}-1"),
            min_score,
            weights,
            last_update: Utc::now(),
        }
    }

    #[test]
    fn composite_undefined_with_any_missing_score() {
        let mut scores = complete_scores(700.0);
        scores.matematica = None;
        assert!(weighted_score(&scores, &SubjectWeights::uniform(1.0)).is_none());
    }

    #[test]
    fn composite_invariant_under_weight_scaling() {
        let scores = UserScores {
            linguagens: Some(640.0),
            humanas: Some(712.5),
            natureza: Some(688.2),
            matematica: Some(790.0),
            redacao: Some(900.0),
        };
        let weights = SubjectWeights {
            linguagens: 1.5,
            humanas: 1.0,
            natureza: 2.0,
            matematica: 3.0,
            redacao: 2.0,
        };
        let base = weighted_score(&scores, &weights).unwrap();
        for factor in [0.5, 2.0, 10.0] {
            let scaled = SubjectWeights {
                linguagens: weights.linguagens * factor,
                humanas: weights.humanas * factor,
                natureza: weights.natureza * factor,
                matematica: weights.matematica * factor,
                redacao: weights.redacao * factor,
            };
            let result = weighted_score(&scores, &scaled).unwrap();
            assert!((result - base).abs() < 1e-9);
        }
    }

    #[test]
    fn uniform_scores_give_composite_equal_to_score() {
        // scores {800,...}, weights {1,...}, cutoff 750: composite 800.00,
        // delta +50.00, Aprovado.
        let offerings = vec![offering("UFX", "MG", 750.0, SubjectWeights::uniform(1.0))];
        let ranked = rank(&offerings, &complete_scores(800.0), &HashSet::new());
        assert_eq!(format_value(ranked[0].score), "800.00");
        assert_eq!(format_value(ranked[0].delta), "50.00");
        assert!(ranked[0].passed);
        assert_eq!(status_label(ranked[0].passed), "Aprovado");
    }

    #[test]
    fn passed_sorts_before_failed() {
        let offerings = vec![
            offering("Alta", "SP", 900.0, SubjectWeights::uniform(1.0)),
            offering("Baixa", "RJ", 600.0, SubjectWeights::uniform(1.0)),
        ];
        let ranked = rank(&offerings, &complete_scores(700.0), &HashSet::new());
        assert_eq!(ranked[0].offering.name, "Baixa");
        assert!(ranked[0].passed);
        assert!(!ranked[1].passed);
    }

    #[test]
    fn delta_breaks_ties_descending() {
        let offerings = vec![
            offering("Apertada", "SP", 695.0, SubjectWeights::uniform(1.0)),
            offering("Folgada", "RJ", 620.0, SubjectWeights::uniform(1.0)),
        ];
        let ranked = rank(&offerings, &complete_scores(700.0), &HashSet::new());
        assert_eq!(ranked[0].offering.name, "Folgada");
        assert_eq!(ranked[1].offering.name, "Apertada");
    }

    #[test]
    fn preferred_states_sort_first_in_state_order() {
        let offerings = vec![
            offering("Fora", "BA", 600.0, SubjectWeights::uniform(1.0)),
            offering("PrefSul", "RS", 600.0, SubjectWeights::uniform(1.0)),
            offering("PrefMinas", "MG", 600.0, SubjectWeights::uniform(1.0)),
        ];
        let preferred: HashSet<String> = ["MG", "RS"].iter().map(|s| s.to_string()).collect();
        let ranked = rank(&offerings, &complete_scores(700.0), &preferred);
        assert_eq!(ranked[0].offering.state, "MG");
        assert_eq!(ranked[1].offering.state, "RS");
        assert_eq!(ranked[2].offering.state, "BA");
    }

    #[test]
    fn missing_score_falls_back_to_pass_fail_only() {
        let mut scores = complete_scores(700.0);
        scores.redacao = None;

        let offerings = vec![
            offering("Primeira", "SP", 650.0, SubjectWeights::uniform(1.0)),
            offering("Segunda", "RJ", 900.0, SubjectWeights::uniform(1.0)),
        ];
        let ranked = rank(&offerings, &scores, &HashSet::new());

        // Nothing passes, every composite renders as the sentinel, and the
        // incoming order is preserved (stable sort, no delta tie-break).
        assert!(ranked.iter().all(|r| !r.passed));
        assert!(ranked.iter().all(|r| format_value(r.score) == "-"));
        assert_eq!(ranked[0].offering.name, "Primeira");
        assert_eq!(ranked[1].offering.name, "Segunda");
    }
}
