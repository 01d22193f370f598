//! LLM-written summaries and clause explanations.
//!
//! These never fail: a missing provider or an API error comes back as the
//! message shown to the user in place of the text.

use providers::LlmProvider;
use std::collections::BTreeMap;
use tracing::warn;

pub const NOT_CONFIGURED_SUMMARY: &str =
    "Gemini API key not configured. Set GEMINI_API_KEY to enable summaries.";
pub const NOT_CONFIGURED_EXPLANATION: &str = "Gemini API key not configured.";

const MAX_EXCERPTS_PER_CATEGORY: usize = 5;
const MAX_EXCERPT_CHARS: usize = 500;
const MAX_CLAUSE_CHARS: usize = 1200;

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((byte, _)) => &s[..byte],
        None => s,
    }
}

pub fn summary_prompt(hits_by_category: &BTreeMap<String, Vec<String>>) -> String {
    let mut lines = vec![
        "You are a legal assistant. Given detected contract clauses grouped by category, write a concise \
         4-6 bullet risk summary in plain English for a Malaysian context. Avoid legalese. Keep each bullet \
         <= 20 words. Categories: Payment Terms, Liability & Exclusions, Termination, Intellectual Property, \
         Confidentiality."
            .to_string(),
        String::new(),
        "Detected clauses:".to_string(),
    ];
    for (category, texts) in hits_by_category {
        if texts.is_empty() {
            continue;
        }
        let joined = texts
            .iter()
            .take(MAX_EXCERPTS_PER_CATEGORY)
            .map(|t| truncate_chars(t, MAX_EXCERPT_CHARS))
            .collect::<Vec<_>>()
            .join(" | ");
        lines.push(format!("- {category}: {joined}"));
    }
    lines.join("\n").trim().to_string()
}

pub fn explanation_prompt(category: &str, clause: &str) -> String {
    format!(
        "Explain in 2-3 sentences why this {category} clause may pose risk in a Malaysian contract. \
         Use plain English. Avoid legal disclaimers.\n\nClause:\n{}",
        truncate_chars(clause, MAX_CLAUSE_CHARS)
    )
}

pub async fn generate_overall_summary(
    llm: Option<&dyn LlmProvider>,
    model: Option<&str>,
    hits_by_category: &BTreeMap<String, Vec<String>>,
) -> String {
    let Some(llm) = llm else {
        return NOT_CONFIGURED_SUMMARY.to_string();
    };
    match llm.generate(&summary_prompt(hits_by_category), model).await {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => "(No summary returned)".to_string(),
        Err(err) => {
            warn!(error = %err, "summary generation failed");
            format!("Gemini summarization error: {err}")
        }
    }
}

pub async fn generate_clause_explanation(
    llm: Option<&dyn LlmProvider>,
    model: Option<&str>,
    category: &str,
    clause: &str,
) -> String {
    let Some(llm) = llm else {
        return NOT_CONFIGURED_EXPLANATION.to_string();
    };
    match llm.generate(&explanation_prompt(category, clause), model).await {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => "(No explanation returned)".to_string(),
        Err(err) => {
            warn!(error = %err, "clause explanation failed");
            format!("Gemini explanation error: {err}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use providers::ProviderError;
    use std::sync::Mutex;

    struct Recording {
        reply: Result<String, String>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl LlmProvider for Recording {
        async fn generate(&self, prompt: &str, _model: Option<&str>) -> Result<String, ProviderError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply.clone().map_err(ProviderError::RequestFailed)
        }
    }

    fn recording(reply: Result<&str, &str>) -> Recording {
        Recording {
            reply: reply.map(str::to_string).map_err(str::to_string),
            prompts: Mutex::new(Vec::new()),
        }
    }

    #[test]
    fn summary_prompt_caps_excerpts() {
        let mut by_cat = BTreeMap::new();
        by_cat.insert(
            "Termination".to_string(),
            (0..7).map(|i| format!("clause {i} {}", "x".repeat(600))).collect(),
        );
        by_cat.insert("Payment Terms".to_string(), Vec::new());
        let prompt = summary_prompt(&by_cat);
        assert!(prompt.contains("- Termination: clause 0"));
        assert!(prompt.contains("clause 4"));
        assert!(!prompt.contains("clause 5"));
        assert!(!prompt.contains("- Payment Terms:"));
        assert!(!prompt.contains(&"x".repeat(500)));
    }

    #[tokio::test]
    async fn falls_back_without_provider() {
        let out = generate_overall_summary(None, None, &BTreeMap::new()).await;
        assert_eq!(out, NOT_CONFIGURED_SUMMARY);
        let out = generate_clause_explanation(None, None, "Termination", "x").await;
        assert_eq!(out, NOT_CONFIGURED_EXPLANATION);
    }

    #[tokio::test]
    async fn reports_errors_and_empty_replies_as_text() {
        let failing = recording(Err("boom"));
        let llm: &dyn LlmProvider = &failing;
        let out = generate_clause_explanation(Some(llm), None, "Termination", "x").await;
        assert_eq!(out, "Gemini explanation error: request failed: boom");

        let empty = recording(Ok("  "));
        let llm: &dyn LlmProvider = &empty;
        let out = generate_overall_summary(Some(llm), None, &BTreeMap::new()).await;
        assert_eq!(out, "(No summary returned)");

        let ok = recording(Ok(" Risky. \n"));
        let clause = "y".repeat(2000);
        let llm: &dyn LlmProvider = &ok;
        let out = generate_clause_explanation(Some(llm), Some("m"), "Payment Terms", &clause).await;
        assert_eq!(out, "Risky.");
        let prompts = ok.prompts.lock().unwrap();
        assert!(prompts[0].starts_with("Explain in 2-3 sentences why this Payment Terms clause"));
        assert!(prompts[0].ends_with(&"y".repeat(1200)));
        assert!(!prompts[0].contains(&"y".repeat(1201)));
    }
}
