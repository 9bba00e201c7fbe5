// Capability boundaries for the round controllers.
//
// DeceptionAgents: researcher, deceiver and blind auditor.
// QuizAgents: section picker, question writer, validator, link ranker.
//
// Controllers depend only on these traits. ClaudeAgents is the production
// implementation; testing.rs has scripted ones.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use veracity_common::{
    Fact, GenerationError, LinkRelevance, Question, SelectedSections, Stage, ValidationResult,
    Verdict,
};

pub type GenResult<T> = std::result::Result<T, GenerationError>;

// ---------------------------------------------------------------------------
// Deception round
// ---------------------------------------------------------------------------

#[async_trait]
pub trait DeceptionAgents: Send + Sync {
    /// True facts about a topic. May return fewer than three.
    async fn research(&self, topic: &str) -> GenResult<Vec<Fact>>;

    /// Rewrite a true fact into a plausible falsehood.
    async fn deceive(&self, fact: &Fact) -> GenResult<Fact>;

    /// Pick the false statement. Sees only the statement texts.
    async fn audit(&self, statements: &[String]) -> GenResult<Verdict>;
}

// ---------------------------------------------------------------------------
// Quiz round
// ---------------------------------------------------------------------------

/// Which configured model a stage runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Primary,
    Fallback,
}

/// Everything the validator sees about a candidate question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationRequest {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    pub source_text: String,
}

#[async_trait]
pub trait QuizAgents: Send + Sync {
    /// Copy the most information-dense paragraphs out of a page.
    async fn pick_sections(&self, page_text: &str, backend: Backend)
        -> GenResult<SelectedSections>;

    /// One multiple-choice question answerable from `source_text` alone.
    async fn make_question(
        &self,
        source_text: &str,
        correction_note: Option<&str>,
    ) -> GenResult<Question>;

    async fn validate(&self, request: &ValidationRequest) -> GenResult<ValidationResult>;

    /// Score each link's thematic relevance to the question.
    async fn rank_links(&self, question: &str, links: &[String])
        -> GenResult<Vec<LinkRelevance>>;
}

/// Run one stage call under a deadline. Expiry becomes a timeout-class
/// `GenerationError` naming the stage.
pub async fn bounded<T, F>(stage: Stage, limit: Duration, call: F) -> GenResult<T>
where
    F: Future<Output = GenResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(GenerationError::timed_out(stage, limit)),
    }
}
