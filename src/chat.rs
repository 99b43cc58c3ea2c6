use std::fmt::Write as _;
use std::time::Duration;

use anyhow::Context;
use serde_json::{json, Value};

use crate::models::{CourseOffering, UserScores};
use crate::rank;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shown instead of a reply whenever the assistant call fails. Never retried.
pub const FALLBACK_MESSAGE: &str =
    "Desculpe, ocorreu um erro ao processar sua mensagem. Por favor, tente novamente.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// One approval line for the prompt: campus, short name, composite, cutoff.
struct ApprovalLine {
    name: String,
    short_name: String,
    score: f64,
    min_score: f64,
}

impl ApprovalLine {
    fn render(&self) -> String {
        format!(
            "  * {} ({}) - Your score: {:.2} (Cutoff: {})",
            self.name, self.short_name, self.score, self.min_score
        )
    }
}

/// Business rule carried into the prompt: the assistant may only talk about
/// institutions the student is actually approved for.
pub fn build_prompt(
    messages: &[ChatMessage],
    offerings: &[CourseOffering],
    scores: Option<&UserScores>,
) -> String {
    let complete = scores.filter(|scores| scores.is_complete());
    let approval_info = complete.map(|scores| approval_block(offerings, scores));

    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "You are a helpful assistant that helps students understand medicine course data in Brazil."
    );
    if approval_info.is_some() {
        let _ = writeln!(
            prompt,
            "You have access to the student's current scores and approval status."
        );
    } else {
        let _ = writeln!(prompt, "The student has not provided their scores yet.");
    }
    let _ = writeln!(prompt);

    if let Some(info) = approval_info {
        let _ = writeln!(prompt, "{info}");
    }

    let _ = writeln!(prompt, "Important instructions:");
    let _ = writeln!(
        prompt,
        "1. When discussing universities or cities, ONLY mention those where the student is actually approved (weightedScore >= minScore)."
    );
    let _ = writeln!(
        prompt,
        "2. DO NOT mention universities or cities where the student is not yet approved."
    );
    let _ = writeln!(
        prompt,
        "3. If asked about \"best cities\" or \"quality of life\", only consider cities from approved universities."
    );
    let _ = writeln!(
        prompt,
        "4. Always check the approval status before making recommendations."
    );
    let _ = writeln!(
        prompt,
        "5. Format lists clearly with proper spacing and organization."
    );
    let _ = writeln!(prompt);

    let _ = writeln!(prompt, "Previous conversation:");
    for message in messages {
        let _ = writeln!(prompt, "{}: {}", message.role.as_str(), message.content);
    }
    let _ = writeln!(prompt);

    let _ = writeln!(
        prompt,
        "Please provide a helpful response to the user's question. Focus on being clear and concise."
    );
    let _ = writeln!(
        prompt,
        "If asked about specific scores or universities, use the data provided."
    );
    let _ = writeln!(
        prompt,
        "If asked about general advice or the admission process, provide helpful guidance."
    );
    let _ = writeln!(prompt, "Always be friendly and supportive.");
    let _ = write!(prompt, "Respond in Portuguese.");

    prompt
}

fn approval_block(offerings: &[CourseOffering], scores: &UserScores) -> String {
    let mut lines: Vec<(ApprovalLine, bool)> = offerings
        .iter()
        .filter_map(|offering| {
            let score = rank::weighted_score(scores, &offering.weights)?;
            let line = ApprovalLine {
                name: offering.name.clone(),
                short_name: offering.short_name.clone(),
                score,
                min_score: offering.min_score,
            };
            Some((line, score >= offering.min_score))
        })
        .collect();
    lines.sort_by(|a, b| {
        b.0.score
            .partial_cmp(&a.0.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let approved: Vec<&ApprovalLine> = lines
        .iter()
        .filter(|(_, approved)| *approved)
        .map(|(line, _)| line)
        .collect();
    let almost: Vec<&ApprovalLine> = lines
        .iter()
        .filter(|(line, approved)| !approved && line.score >= line.min_score - 20.0)
        .map(|(line, _)| line)
        .take(5)
        .collect();

    let mut block = String::new();
    let _ = writeln!(block, "Based on the user's current scores:");
    let _ = writeln!(block, "- Linguagens: {}", scores.linguagens.unwrap_or(0.0));
    let _ = writeln!(block, "- Humanas: {}", scores.humanas.unwrap_or(0.0));
    let _ = writeln!(block, "- Natureza: {}", scores.natureza.unwrap_or(0.0));
    let _ = writeln!(block, "- Matemática: {}", scores.matematica.unwrap_or(0.0));
    let _ = writeln!(block, "- Redação: {}", scores.redacao.unwrap_or(0.0));
    let _ = writeln!(block);
    let _ = writeln!(block, "Current approval status:");
    let _ = writeln!(block, "- Approved for {} universities", approved.len());
    for line in &approved {
        let _ = writeln!(block, "{}", line.render());
    }
    let _ = writeln!(block);
    let _ = writeln!(block, "Almost approved (within 20 points):");
    for line in &almost {
        let _ = writeln!(block, "{}", line.render());
    }

    block
}

/// Minimal client for the Gemini `generateContent` endpoint.
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> anyhow::Result<Self> {
        Self::with_config(GEMINI_BASE_URL, DEFAULT_MODEL, api_key)
    }

    pub fn with_config(base_url: &str, model: &str, api_key: String) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        })
    }

    /// One round trip, no retry: a failed assistant call degrades to the
    /// fixed fallback message at the call site.
    pub async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("assistant request failed")?
            .error_for_status()
            .context("assistant returned an error status")?;

        let payload: Value = response
            .json()
            .await
            .context("assistant response was not valid JSON")?;
        extract_text(&payload).context("assistant response had no text content")
    }
}

fn extract_text(payload: &Value) -> Option<String> {
    let parts = payload
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SubjectWeights;
    use chrono::Utc;

    fn offering(name: &str, min_score: f64) -> CourseOffering {
        CourseOffering {
            name: name.to_string(),
            short_name: name.to_string(),
            state: "MG".to_string(),
            city: "Cidade".to_string(),
            course_id: format!("{name}-1"),
            min_score,
            weights: SubjectWeights::uniform(1.0),
            last_update: Utc::now(),
        }
    }

    fn complete_scores(value: f64) -> UserScores {
        UserScores {
            linguagens: Some(value),
            humanas: Some(value),
            natureza: Some(value),
            matematica: Some(value),
            redacao: Some(value),
        }
    }

    #[test]
    fn prompt_without_scores_says_so() {
        let prompt = build_prompt(&[], &[], None);
        assert!(prompt.contains("The student has not provided their scores yet."));
        assert!(!prompt.contains("Current approval status"));
    }

    #[test]
    fn prompt_lists_approved_and_almost_approved() {
        let offerings = vec![
            offering("Aprovada", 700.0),
            offering("Quase", 715.0),
            offering("Longe", 900.0),
        ];
        let scores = complete_scores(710.0);
        let prompt = build_prompt(&[], &offerings, Some(&scores));

        assert!(prompt.contains("- Approved for 1 universities"));
        assert!(prompt.contains("Aprovada"));
        assert!(prompt.contains("Quase"));
        // Far-off institutions appear nowhere in the summary.
        assert!(!prompt.contains("Longe"));
        assert!(prompt.contains("ONLY mention those where the student is actually approved"));
    }

    #[test]
    fn incomplete_scores_behave_like_no_scores() {
        let mut scores = complete_scores(710.0);
        scores.natureza = None;
        let prompt = build_prompt(&[], &[offering("Qualquer", 600.0)], Some(&scores));
        assert!(prompt.contains("The student has not provided their scores yet."));
    }

    #[test]
    fn prompt_serializes_history_in_order() {
        let messages = vec![
            ChatMessage {
                role: Role::User,
                content: "Quais cidades?".to_string(),
            },
            ChatMessage {
                role: Role::Assistant,
                content: "Depende das suas notas.".to_string(),
            },
        ];
        let prompt = build_prompt(&messages, &[], None);
        let user_at = prompt.find("user: Quais cidades?").unwrap();
        let assistant_at = prompt.find("assistant: Depende das suas notas.").unwrap();
        assert!(user_at < assistant_at);
    }

    #[test]
    fn extracts_text_from_candidates() {
        let payload = serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": "Olá! " }, { "text": "Tudo bem?" }] }
            }]
        });
        assert_eq!(extract_text(&payload).unwrap(), "Olá! Tudo bem?");
        assert!(extract_text(&serde_json::json!({})).is_none());
    }
}
