use ai_client::{truncate_to_char_boundary, AiError, Claude, StructuredOutput};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use veracity_common::{
    Config, Fact, GenerationError, LinkRelevance, Question, SelectedSections, ValidationResult,
    Verdict,
};

use crate::traits::{Backend, DeceptionAgents, GenResult, QuizAgents, ValidationRequest};

/// Page text beyond this many bytes is cut before section picking.
const MAX_PAGE_BYTES: usize = 30_000;

const RESEARCH_PROMPT: &str = "You research facts for a trivia game. \
Given a topic, find three distinct, little-known but verifiable facts about it. \
Every fact must be true. Give a source URL or citation for each one. \
Set is_lie to false on all of them.";

const DECEIVE_PROMPT: &str = "You receive one true fact. Rewrite it into a plausible falsehood \
by changing one concrete detail: a date, a name, a number or a cause. \
The result must read as naturally as the original and must not be obviously wrong. \
Set is_lie to true. Keep the original source, or give one that sounds equally credible.";

const AUDIT_PROMPT: &str = "You judge three statements. Exactly one of them is false. \
Check each statement against what you know, then select the index (0, 1 or 2) of the false one \
and explain the error. Report a confidence between 0.0 and 1.0. \
Mark the suspicious part of the selected statement with highlight_start and highlight_end, \
given as character offsets into that statement.";

const SECTION_PICK_PROMPT: &str = "You select source material for quiz questions. \
From the encyclopedia page below, copy the three most information-dense paragraphs verbatim. \
Prefer paragraphs with specific names, dates, numbers and causes. \
Do not paraphrase or merge paragraphs. Give a short rationale for each and overall reasoning.";

const QUIZ_PROMPT: &str = "You write one multiple-choice question from the given text. \
The question must be answerable from the text alone. Give exactly four options, \
one correct and three plausible distractors, and the 0-based index of the correct option. \
The correct option must appear in the text as written. \
Rate the difficulty as easy, medium or hard and explain the answer with reference to the text.";

const VALIDATE_PROMPT: &str = "You check a multiple-choice question against its source text. \
The question is valid only if the marked answer is correct according to the source text, \
exactly one option is correct, and the question is unambiguous. \
Report a confidence between 0.0 and 1.0. When invalid, describe the issues and \
write a correction note telling the author how to fix the question.";

const RELEVANCE_PROMPT: &str = "You rank encyclopedia links by how closely their topics relate \
to a quiz question. Score each link between 0.0 and 1.0 with a one-sentence reason. \
Only use link titles from the provided list.";

#[derive(Debug, Deserialize, JsonSchema)]
struct ResearchOutput {
    facts: Vec<Fact>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct RankedLinks {
    links: Vec<LinkRelevance>,
}

#[derive(Serialize)]
struct RelevanceInput<'a> {
    question: &'a str,
    available_links: &'a [String],
}

/// Claude-backed implementation of both agent capabilities.
///
/// Holds one handle per role. Handles are plain values and each call opens
/// its own HTTP client, so stages share no mutable state.
#[derive(Clone)]
pub struct ClaudeAgents {
    generator: Claude,
    auditor: Claude,
    fallback: Claude,
}

impl ClaudeAgents {
    pub fn new(generator: Claude, auditor: Claude, fallback: Claude) -> Self {
        Self {
            generator,
            auditor,
            fallback,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let base = Claude::new(&config.anthropic_api_key, &config.generator_model)
            .with_timeout(config.stage_timeout);
        let base = match config.anthropic_base_url {
            Some(ref url) => base.with_base_url(url),
            None => base,
        };

        Self::new(
            base.clone(),
            base.clone().with_model(&config.auditor_model),
            base.with_model(&config.fallback_model),
        )
    }

    fn backend(&self, backend: Backend) -> &Claude {
        match backend {
            Backend::Primary => &self.generator,
            Backend::Fallback => &self.fallback,
        }
    }
}

async fn run<T: StructuredOutput>(claude: &Claude, system: &str, user: String) -> GenResult<T> {
    debug!(model = claude.model(), output = %T::type_name(), "Agent call");
    claude
        .extract::<T>(system, user)
        .await
        .map_err(generation_error)
}

/// Keep the backend's status and error type for classification.
pub fn generation_error(err: AiError) -> GenerationError {
    let mut out = GenerationError::new(err.to_string());
    if let Some(status) = err.status() {
        out = out.with_status(status);
    }
    match (err.kind(), &err) {
        (Some(kind), _) => out.with_kind(kind),
        (None, AiError::Config(_)) => out.with_kind("configuration_error"),
        (None, _) => out,
    }
}

fn numbered(statements: &[String]) -> String {
    statements
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{i}: {s}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl DeceptionAgents for ClaudeAgents {
    async fn research(&self, topic: &str) -> GenResult<Vec<Fact>> {
        let output: ResearchOutput =
            run(&self.generator, RESEARCH_PROMPT, format!("Topic: {topic}")).await?;
        info!(topic, count = output.facts.len(), "Research returned facts");
        Ok(output.facts)
    }

    async fn deceive(&self, fact: &Fact) -> GenResult<Fact> {
        let user = format!("Fact: {}\nSource: {}", fact.content, fact.source);
        run(&self.generator, DECEIVE_PROMPT, user).await
    }

    async fn audit(&self, statements: &[String]) -> GenResult<Verdict> {
        let user = format!("Statements:\n{}", numbered(statements));
        run(&self.auditor, AUDIT_PROMPT, user).await
    }
}

#[async_trait]
impl QuizAgents for ClaudeAgents {
    async fn pick_sections(
        &self,
        page_text: &str,
        backend: Backend,
    ) -> GenResult<SelectedSections> {
        let text = truncate_to_char_boundary(page_text, MAX_PAGE_BYTES);
        run(self.backend(backend), SECTION_PICK_PROMPT, text.to_string()).await
    }

    async fn make_question(
        &self,
        source_text: &str,
        correction_note: Option<&str>,
    ) -> GenResult<Question> {
        let user = match correction_note {
            Some(note) => format!(
                "Source text:\n{source_text}\n\nA previous attempt was rejected. Fix this: {note}"
            ),
            None => format!("Source text:\n{source_text}"),
        };
        run(&self.generator, QUIZ_PROMPT, user).await
    }

    async fn validate(&self, request: &ValidationRequest) -> GenResult<ValidationResult> {
        let user = serde_json::to_string_pretty(request)
            .map_err(|e| GenerationError::new(format!("Failed to encode validation input: {e}")))?;
        run(&self.auditor, VALIDATE_PROMPT, user).await
    }

    async fn rank_links(&self, question: &str, links: &[String]) -> GenResult<Vec<LinkRelevance>> {
        let input = RelevanceInput {
            question,
            available_links: links,
        };
        let user = serde_json::to_string_pretty(&input)
            .map_err(|e| GenerationError::new(format!("Failed to encode relevance input: {e}")))?;
        let output: RankedLinks = run(&self.generator, RELEVANCE_PROMPT, user).await?;
        Ok(output.links)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use veracity_common::FailureClass;

    #[test]
    fn api_errors_keep_status_and_kind() {
        let err = generation_error(AiError::Api {
            status: 529,
            kind: Some("overloaded_error".into()),
            message: "Overloaded".into(),
        });
        assert_eq!(err.status, Some(529));
        assert_eq!(err.kind.as_deref(), Some("overloaded_error"));
        assert_eq!(classify(&err), FailureClass::Overloaded);
    }

    #[test]
    fn config_errors_are_fatal() {
        let err = generation_error(AiError::Config("Anthropic API key is empty".into()));
        assert_eq!(classify(&err), FailureClass::Fatal);
    }

    #[test]
    fn parse_errors_are_malformed() {
        let err = generation_error(AiError::Parse(
            "Failed to deserialize response: missing field `selection`".into(),
        ));
        assert_eq!(err.status, None);
        assert_eq!(classify(&err), FailureClass::Malformed);
    }

    #[test]
    fn statements_are_numbered_from_zero() {
        let text = numbered(&["a".to_string(), "b".to_string()]);
        assert_eq!(text, "0: a\n1: b");
    }

    #[test]
    fn wrapper_schemas_are_closed_objects() {
        let schema = ResearchOutput::closed_schema();
        assert_eq!(schema["additionalProperties"], serde_json::json!(false));
        assert!(schema["properties"]["facts"].is_object());

        let schema = RankedLinks::closed_schema();
        assert_eq!(schema["required"], serde_json::json!(["links"]));
    }

    #[test]
    fn roles_use_configured_models() {
        let mut config = Config::new("sk-ant-test");
        config.fallback_model = "claude-fallback".into();
        let agents = ClaudeAgents::from_config(&config);
        assert_eq!(agents.backend(Backend::Primary).model(), config.generator_model);
        assert_eq!(agents.backend(Backend::Fallback).model(), "claude-fallback");
        assert_eq!(agents.auditor.model(), config.auditor_model);
        assert_eq!(agents.fallback.api_key(), config.anthropic_api_key);
    }
}
