//! Best-effort decoration of assistant replies.
//!
//! The assistant answers in free-form Portuguese. A fixed, ordered list of
//! pattern rules recognizes a handful of phrasings it tends to produce and
//! wraps them in HTML containers for the rendering layer; anything a rule
//! does not match passes through unchanged. This is presentation only, never
//! required for correctness.

use std::sync::OnceLock;

use regex::{Captures, Regex};

struct Rule {
    /// Grammar the rule matches, for the rule table below.
    name: &'static str,
    pattern: Regex,
    apply: fn(&Captures) -> String,
}

/// Rule table, applied top to bottom over the whole reply:
/// 1. approval list    — `Você está (quase )aprovado ...:` followed by `* name - scores` lines
/// 2. approval greeting — `Olá!/Bom dia!` + two more `!` sentences + a `:` intro,
///    bullet approvals, then a `Essas/Parabéns ...!` closer and a help line
/// 3. ranked cities    — `Das cidades ...:` followed by `N. city (university)` lines
/// 4. city listing     — `As cidades das universidades ...:` followed by `* city (university)` lines
/// 5. titled items     — `* **title**: description` single lines
/// 6. residual bold    — `**text**`
/// 7. IDH table        — `Comparação do IDH ...:` followed by `* city - value` lines
/// 8. university details — `Detalhes da universidade ...:` followed by `* title - content` lines
fn rules() -> &'static [Rule] {
    static RULES: OnceLock<Vec<Rule>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            Rule {
                name: "approval list",
                pattern: Regex::new(
                    r"(?P<title>Você está (?:aprovado|quase aprovado)[^:]*:)(?P<items>(?:\s*\*[^\n]*\n?)*)",
                )
                .expect("approval list pattern"),
                apply: format_approval_list,
            },
            Rule {
                name: "approval greeting",
                pattern: Regex::new(
                    r"(?P<greeting>Bom dia|Olá)![^!]*![^!]*![^:]*:(?P<items>(?:\s*\*[^\n]*\n?)*)(?P<congrats>(?:Essas|Parabéns)[^!]*!)\s*(?P<help>[^\n]*)",
                )
                .expect("approval greeting pattern"),
                apply: format_approval_greeting,
            },
            Rule {
                name: "ranked cities",
                pattern: Regex::new(
                    r"(?P<intro>Das cidades[^:]*:)(?P<items>(?:\s*\d+\.\s*[^\n]*\n?)*)",
                )
                .expect("ranked cities pattern"),
                apply: format_ranked_cities,
            },
            Rule {
                name: "city listing",
                pattern: Regex::new(
                    r"(?P<title>As cidades das universidades[^:]*:)(?P<items>(?:\s*\*[^\n]*\([^)]*\)[^\n]*\n?)*)",
                )
                .expect("city listing pattern"),
                apply: format_city_listing,
            },
            Rule {
                name: "titled items",
                pattern: Regex::new(r"\* \*\*(?P<title>[^*\n]+)\*\*: (?P<description>[^\n]*)")
                    .expect("titled items pattern"),
                apply: format_titled_item,
            },
            Rule {
                name: "residual bold",
                pattern: Regex::new(r"\*\*(?P<text>[^*\n]+)\*\*").expect("bold pattern"),
                apply: |caps| format!("<strong>{}</strong>", &caps["text"]),
            },
            Rule {
                name: "IDH comparison",
                pattern: Regex::new(
                    r"(?P<intro>Comparação do IDH[^:]*:)(?P<items>(?:\s*\*[^\n]*\n?)*)",
                )
                .expect("IDH pattern"),
                apply: format_idh_comparison,
            },
            Rule {
                name: "university details",
                pattern: Regex::new(
                    r"(?P<intro>Detalhes da universidade[^:]*:)(?P<items>(?:\s*\*[^\n]*\n?)*)",
                )
                .expect("university details pattern"),
                apply: format_university_details,
            },
        ]
    })
}

/// Apply every rule in order. Text no rule matches comes back untouched.
pub fn decorate(content: &str) -> String {
    let mut formatted = content.to_string();
    for rule in rules() {
        formatted = rule
            .pattern
            .replace_all(&formatted, |caps: &Captures| (rule.apply)(caps))
            .into_owned();
    }
    formatted
}

fn bullet_lines(items: &str) -> impl Iterator<Item = &str> {
    items
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.trim_start_matches("* "))
}

fn format_approval_list(caps: &Captures) -> String {
    let entries: String = bullet_lines(&caps["items"])
        .map(|line| match line.split_once(" - ") {
            Some((name, scores)) => format!(
                "<div class=\"university-item\"><div class=\"university-name\">{name}</div><div class=\"university-scores\">{scores}</div></div>"
            ),
            None => format!("<div class=\"university-item\">{line}</div>"),
        })
        .collect();

    format!(
        "<div class=\"universities-section\"><div class=\"universities-title\">{}</div><div class=\"universities-list\">{}</div></div>",
        &caps["title"], entries
    )
}

fn format_approval_greeting(caps: &Captures) -> String {
    let approvals: Vec<&str> = bullet_lines(&caps["items"]).collect();
    let entries: String = approvals
        .iter()
        .map(|line| {
            let (name, campus) = match line.split_once(" (") {
                Some((name, campus)) => (name, campus.trim_end_matches(')')),
                None => (*line, ""),
            };
            format!(
                "<div class=\"university-approval-item\"><div class=\"university-campus\">{campus}</div><div class=\"university-name\">{name}</div></div>"
            )
        })
        .collect();

    format!(
        "<div class=\"approval-message\"><div class=\"greeting-section\"><div class=\"greeting-emoji\">🎓</div><div class=\"greeting-text\"><div class=\"greeting\">{}!</div><div class=\"approval-count\">Você foi aprovado em {} universidades para Medicina!</div></div></div><div class=\"universities-section\"><div class=\"universities-intro\">Suas aprovações:</div><div class=\"universities-grid\">{}</div></div><div class=\"footer-section\"><div class=\"congrats\">{}</div><div class=\"help-text\">{}</div></div></div>",
        &caps["greeting"],
        approvals.len(),
        entries,
        &caps["congrats"],
        &caps["help"]
    )
}

fn format_ranked_cities(caps: &Captures) -> String {
    let entries: String = caps["items"]
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let (rank, rest) = line.split_once(". ").unwrap_or(("", line));
            let (city, university) = match rest.split_once(" (") {
                Some((city, university)) => (
                    city.to_string(),
                    format!("<div class=\"city-university\">({university}</div>"),
                ),
                None => (rest.to_string(), String::new()),
            };
            format!(
                "<div class=\"recommended-city-item\"><div class=\"city-rank\">{rank}</div><div class=\"city-details\"><div class=\"city-name\">{city}</div>{university}</div></div>"
            )
        })
        .collect();

    format!(
        "<div class=\"city-recommendations\"><div class=\"recommendations-intro\">{}</div><div class=\"recommended-cities-list\">{}</div></div>",
        &caps["intro"], entries
    )
}

fn format_city_listing(caps: &Captures) -> String {
    let entries: String = bullet_lines(&caps["items"])
        .map(|line| match line.split_once(" (") {
            Some((city, university)) => format!(
                "<div class=\"city-item\"><div class=\"city-name\">{city}</div><div class=\"city-university\">({university}</div></div>"
            ),
            None => format!("<div class=\"city-item\">{line}</div>"),
        })
        .collect();

    format!(
        "<div class=\"cities-section\"><div class=\"cities-title\">{}</div><div class=\"cities-grid\">{}</div></div>",
        &caps["title"], entries
    )
}

fn format_idh_comparison(caps: &Captures) -> String {
    let entries: String = bullet_lines(&caps["items"])
        .map(|line| {
            let (city, value) = line.split_once(" - ").unwrap_or((line, ""));
            let level = if value.trim().parse::<f64>().is_ok_and(|idh| idh >= 0.7) {
                "alto"
            } else {
                "médio"
            };
            let label = if level == "alto" { "Alto" } else { "Médio" };
            format!(
                "<div class=\"idh-city-item\"><div class=\"idh-city-name\">{city}</div><div class=\"idh-details\"><div class=\"idh-value\">{value}</div><div class=\"idh-level {level}\">{label}</div></div></div>"
            )
        })
        .collect();

    format!(
        "<div class=\"idh-comparison\"><div class=\"idh-intro\">{}</div><div class=\"idh-cities-grid\">{}</div><div class=\"idh-conclusion\">A cidade com o maior IDH é a mais desenvolvida.</div><div class=\"idh-help\">O IDH é um índice que mede o desenvolvimento humano de uma cidade.</div></div>",
        &caps["intro"], entries
    )
}

fn format_university_details(caps: &Captures) -> String {
    let entries: String = bullet_lines(&caps["items"])
        .map(|line| {
            let (title, content) = line.split_once(" - ").unwrap_or((line, ""));
            format!(
                "<div class=\"uni-detail-item\"><div class=\"detail-title\">{title}</div><div class=\"detail-content\">{content}</div></div>"
            )
        })
        .collect();

    format!(
        "<div class=\"university-details\"><div class=\"uni-header\"><div class=\"uni-intro\">{}</div><div class=\"uni-name\">Universidade</div></div><div class=\"details-section\">{}</div><div class=\"next-steps-section\"><div class=\"steps-title\">Próximos passos</div><div class=\"steps-list\"><div class=\"next-step-item\"><div class=\"step-content\">Verifique os requisitos de ingresso.</div></div><div class=\"next-step-item\"><div class=\"step-content\">Faça a inscrição no vestibular.</div></div></div></div><div class=\"uni-conclusion\">Boa sorte!</div></div>",
        &caps["intro"], entries
    )
}

fn format_titled_item(caps: &Captures) -> String {
    format!(
        "<div class=\"list-item\"><div class=\"list-item-title\">{}</div><div class=\"list-item-description\">{}</div></div>",
        &caps["title"], &caps["description"]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        let text = "A nota de corte varia ano a ano, então use os valores como referência.";
        assert_eq!(decorate(text), text);
    }

    #[test]
    fn approval_list_is_wrapped() {
        let text = "Você está aprovado nas seguintes universidades:\n* Campus Saúde (UFX) - Your score: 780.00 (Cutoff: 750)\n* Campus Norte (UFY) - Your score: 765.20 (Cutoff: 760)\n";
        let html = decorate(text);
        assert!(html.contains("universities-section"));
        assert!(html.contains("<div class=\"university-name\">Campus Saúde (UFX)</div>"));
        assert!(html.contains("Your score: 765.20"));
    }

    #[test]
    fn ranked_cities_keep_their_rank() {
        let text = "Das cidades onde você foi aprovado, as melhores são:\n1. Belo Horizonte (UFMG)\n2. Florianópolis (UFSC)\n";
        let html = decorate(text);
        assert!(html.contains("city-recommendations"));
        assert!(html.contains("<div class=\"city-rank\">1</div>"));
        assert!(html.contains("Florianópolis"));
    }

    #[test]
    fn city_listing_is_wrapped() {
        let text =
            "As cidades das universidades onde você passou:\n* Belo Horizonte (UFMG)\n* Natal (UFRN)\n";
        let html = decorate(text);
        assert!(html.contains("cities-grid"));
        assert!(html.contains("<div class=\"city-name\">Belo Horizonte</div>"));
    }

    #[test]
    fn idh_levels_split_at_0_7() {
        let text = "Comparação do IDH das cidades:\n* Florianópolis - 0.847\n* Cidade Média - 0.65\n";
        let html = decorate(text);
        assert!(html.contains("idh-level alto"));
        assert!(html.contains("idh-level médio"));
        assert!(html.contains("idh-help"));
        assert!(html.contains("O IDH é um índice"));
    }

    #[test]
    fn approval_greeting_counts_its_entries() {
        let text = "Olá! Analisei suas notas! Você tem ótimos resultados! Veja a lista:\n* UFMG (Campus Saúde)\n* UFSC (Campus Trindade)\nParabéns pelo resultado!\nPosso ajudar com mais alguma coisa?";
        let html = decorate(text);
        assert!(html.contains("approval-message"));
        assert!(html.contains("<div class=\"greeting\">Olá!</div>"));
        assert!(html.contains("Você foi aprovado em 2 universidades para Medicina!"));
        assert!(html.contains("<div class=\"university-campus\">Campus Saúde</div>"));
        assert!(html.contains("<div class=\"university-name\">UFMG</div>"));
        assert!(html.contains("<div class=\"congrats\">Parabéns pelo resultado!</div>"));
        assert!(html.contains("Posso ajudar com mais alguma coisa?"));
    }

    #[test]
    fn university_details_get_next_steps() {
        let text = "Detalhes da universidade UFMG:\n* Localização - Belo Horizonte\n* Nota de corte - 742.30\n";
        let html = decorate(text);
        assert!(html.contains("university-details"));
        assert!(html.contains("<div class=\"detail-title\">Localização</div>"));
        assert!(html.contains("<div class=\"detail-content\">Belo Horizonte</div>"));
        assert!(html.contains("Próximos passos"));
        assert!(html.contains("Boa sorte!"));
    }

    #[test]
    fn titled_items_and_bold() {
        let text = "* **Bolsas**: várias universidades oferecem auxílio.\nVeja o **edital** oficial.";
        let html = decorate(text);
        assert!(html.contains("<div class=\"list-item-title\">Bolsas</div>"));
        assert!(html.contains("<strong>edital</strong>"));
        // The titled-item rule must not leave stray markers behind.
        assert!(!html.contains("* **"));
    }
}
