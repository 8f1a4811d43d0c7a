//! The external summarizer capability.
//!
//! LLM-backed summarization is pluggable: the pipeline only ever sees the
//! [`Summarizer`] trait, and only through its `with_fallback` wrapper, so a
//! slow, failing, or verbose model can never break compression — the
//! deterministic summarizer is always behind it. The constructors here wrap
//! a plain string-to-string async callable with the prompt templates.

use std::future::Future;

use async_trait::async_trait;

use crate::summarize;

/// Terms every summarization prompt instructs the model to keep verbatim.
const PROMPT_PRESERVE_TERMS: &str = "code references, file paths, function/variable names, \
     URLs, API keys, error messages, numbers, technical decisions";

/// External summarization capability: text in, shorter text out.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> anyhow::Result<String>;
}

/// Options for the prompt-template summarizers.
#[derive(Debug, Clone, Default)]
pub struct SummarizerOptions {
    /// Prepended to the prompt when set.
    pub system_prompt: Option<String>,
    /// Extra terms appended to the preserve list.
    pub preserve_terms: Vec<String>,
}

enum PromptStyle {
    Prose,
    Bullets,
}

fn build_prompt(text: &str, options: &SummarizerOptions, style: PromptStyle) -> String {
    let budget = match style {
        PromptStyle::Prose => summarize::budget_for(text.chars().count()),
        PromptStyle::Bullets => summarize::budget_for(text.chars().count()) / 2,
    };
    let mut prompt = String::new();
    if let Some(system) = &options.system_prompt {
        prompt.push_str(system);
        prompt.push_str("\n\n");
    }
    match style {
        PromptStyle::Prose => prompt.push_str(&format!(
            "Summarize the following conversation content in at most {budget} characters. \
             Preserve verbatim: {PROMPT_PRESERVE_TERMS}"
        )),
        PromptStyle::Bullets => prompt.push_str(&format!(
            "Rewrite the following conversation content as terse bullet points, at most \
             {budget} characters in total. Preserve verbatim: {PROMPT_PRESERVE_TERMS}"
        )),
    }
    if !options.preserve_terms.is_empty() {
        prompt.push_str(". Also preserve these terms verbatim: ");
        prompt.push_str(&options.preserve_terms.join(", "));
    }
    prompt.push_str(".\n\n");
    prompt.push_str(text);
    prompt
}

/// Wrap a string-to-string async callable with the prose prompt template.
pub fn make_summarizer<F, Fut>(call_llm: F, options: SummarizerOptions) -> impl Summarizer
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
{
    PromptSummarizer { call_llm, options }
}

struct PromptSummarizer<F> {
    call_llm: F,
    options: SummarizerOptions,
}

#[async_trait]
impl<F, Fut> Summarizer for PromptSummarizer<F>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
{
    async fn summarize(&self, text: &str) -> anyhow::Result<String> {
        let prompt = build_prompt(text, &self.options, PromptStyle::Prose);
        (self.call_llm)(prompt).await
    }
}

/// Three-level strategy: normal prose, aggressive bullet points at half
/// budget, then the deterministic summarizer. Each LLM level is accepted
/// only when its output is non-empty and strictly shorter than the input.
pub fn make_escalating_summarizer<F, Fut>(
    call_llm: F,
    options: SummarizerOptions,
) -> impl Summarizer
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
{
    EscalatingSummarizer { call_llm, options }
}

struct EscalatingSummarizer<F> {
    call_llm: F,
    options: SummarizerOptions,
}

impl<F> EscalatingSummarizer<F> {
    fn acceptable(input: &str, output: &str) -> bool {
        !output.trim().is_empty() && output.chars().count() < input.chars().count()
    }
}

#[async_trait]
impl<F, Fut> Summarizer for EscalatingSummarizer<F>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
{
    async fn summarize(&self, text: &str) -> anyhow::Result<String> {
        let prose = build_prompt(text, &self.options, PromptStyle::Prose);
        if let Ok(out) = (self.call_llm)(prose).await {
            if Self::acceptable(text, &out) {
                return Ok(out);
            }
        }
        let bullets = build_prompt(text, &self.options, PromptStyle::Bullets);
        if let Ok(out) = (self.call_llm)(bullets).await {
            if Self::acceptable(text, &out) {
                return Ok(out);
            }
        }
        Ok(summarize::summarize(text).text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> SummarizerOptions {
        SummarizerOptions {
            system_prompt: Some("You compress chat logs.".to_string()),
            preserve_terms: vec!["ticket-4411".to_string()],
        }
    }

    #[test]
    fn test_prompt_carries_preserve_terms() {
        let prompt = build_prompt("body text", &opts(), PromptStyle::Prose);
        assert!(prompt.starts_with("You compress chat logs.\n\n"));
        assert!(prompt.contains("code references, file paths, function/variable names"));
        assert!(prompt.contains("ticket-4411"));
        assert!(prompt.ends_with("body text"));
    }

    #[test]
    fn test_bullet_prompt_halves_budget() {
        let long = "x".repeat(700);
        let prompt = build_prompt(&long, &SummarizerOptions::default(), PromptStyle::Bullets);
        assert!(prompt.contains("at most 200 characters"));
    }

    #[tokio::test]
    async fn test_make_summarizer_passes_through_call() {
        let summarizer = make_summarizer(
            |prompt: String| async move {
                assert!(prompt.contains("Summarize the following"));
                Ok("short".to_string())
            },
            SummarizerOptions::default(),
        );
        let out = summarizer.summarize("a longer input body").await.unwrap();
        assert_eq!(out, "short");
    }

    #[tokio::test]
    async fn test_escalating_falls_back_to_deterministic() {
        let input = "A sentence about parseConfig and its retry_count behavior. "
            .repeat(6);
        let summarizer = make_escalating_summarizer(
            |_prompt: String| async move { anyhow::bail!("provider down") },
            SummarizerOptions::default(),
        );
        let out = summarizer.summarize(&input).await.unwrap();
        assert!(!out.is_empty());
        assert!(out.chars().count() < input.chars().count());
    }

    #[tokio::test]
    async fn test_escalating_uses_bullets_when_prose_too_long() {
        let input = "Tell me more about the deployment pipeline and what broke. "
            .repeat(6);
        let long_echo = input.clone();
        let summarizer = make_escalating_summarizer(
            move |prompt: String| {
                let echo = long_echo.clone();
                async move {
                    if prompt.contains("bullet points") {
                        Ok("- pipeline broke".to_string())
                    } else {
                        // Prose attempt returns something too long to accept.
                        Ok(echo.clone())
                    }
                }
            },
            SummarizerOptions::default(),
        );
        let out = summarizer.summarize(&input).await.unwrap();
        assert_eq!(out, "- pipeline broke");
    }
}
