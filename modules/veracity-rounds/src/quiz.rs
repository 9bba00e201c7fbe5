//! Sourced multiple-choice questions from an encyclopedia page.
//!
//! fetch page → pick dense paragraphs → (write question → gate → validate)
//! correction loop → cite the answer → rank follow-up links.
//!
//! Unlike the deception round this fails open: when the correction loop runs
//! out, the last well-shaped question is published with `validated = false`.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use veracity_common::{
    Citation, FailureClass, GenerationError, LinkRelevance, Question, QuizRound, RoundError,
    SelectedSections, Stage, StageLog, ValidationResult,
};
use wiki_client::{section_url, PageFetcher, WikiClient, WikiPage};

use crate::classify::classify;
use crate::evidence;
use crate::settings::{with_deadline, RoundSettings};
use crate::traits::{bounded, Backend, QuizAgents, ValidationRequest};

/// Related links kept on a round.
pub const MAX_RELATED_LINKS: usize = 3;

/// Section title used when the answer is in none of the selected paragraphs.
pub const FALLBACK_SECTION_TITLE: &str = "Wikipedia";

/// Original section name for each selected paragraph, by position.
/// A paragraph found in no section is named `Section {n}` (1-based).
pub fn map_sections(
    sections: &BTreeMap<String, String>,
    selected: &SelectedSections,
) -> Vec<String> {
    selected
        .sections
        .iter()
        .enumerate()
        .map(|(i, paragraph)| {
            let needle = paragraph.text.trim();
            sections
                .iter()
                .find(|(_, body)| body.contains(needle))
                .map(|(title, _)| title.clone())
                .unwrap_or_else(|| format!("Section {}", i + 1))
        })
        .collect()
}

/// Shape and evidence checks a question must pass before it is worth
/// validating. Returns the correct option, or a note for the next attempt.
pub fn gate(question: &Question, source_text: &str) -> Result<String, String> {
    if question.options.len() != Question::OPTION_COUNT {
        return Err(format!(
            "Provide exactly {} options; the previous question had {}.",
            Question::OPTION_COUNT,
            question.options.len()
        ));
    }
    let Some(answer) = question.correct_answer() else {
        return Err(format!(
            "correct_answer_index must be between 0 and {}; it was {}.",
            Question::OPTION_COUNT - 1,
            question.correct_answer_index
        ));
    };
    if evidence::candidates(source_text, answer).is_empty() {
        return Err(format!(
            "The correct answer \"{answer}\" does not appear in the source text. \
             Use an answer stated in the text."
        ));
    }
    Ok(answer.to_string())
}

/// A question that made it through the shape gate, with what the validator
/// said about it, if anything.
struct Candidate {
    question: Question,
    answer: String,
    validation: Option<ValidationResult>,
}

#[derive(Default)]
struct StageTrace {
    enabled: bool,
    entries: Vec<StageLog>,
}

impl StageTrace {
    fn record(&mut self, stage: impl Into<String>, input: String, output: String, reasoning: String) {
        if !self.enabled {
            return;
        }
        self.entries.push(StageLog {
            stage: stage.into(),
            input_summary: input,
            output_summary: output,
            reasoning,
            at: Utc::now(),
        });
    }
}

fn stage_failure(stage: Stage, error: GenerationError, calls: u32) -> RoundError {
    let class = classify(&error);
    if class.is_fatal() {
        error!(%stage, ?class, error = %error, "Unrecoverable stage failure");
        RoundError::Fatal {
            stage,
            class,
            error,
        }
    } else {
        error!(%stage, ?class, error = %error, "Stage failed");
        RoundError::Exhausted {
            attempts: calls,
            last_failure: Some(class),
        }
    }
}

pub struct QuizController<A, F> {
    agents: A,
    wiki: Arc<WikiClient<F>>,
    settings: RoundSettings,
}

impl<A: QuizAgents, F: PageFetcher> QuizController<A, F> {
    /// `wiki` may be shared with other controllers; its cache is the only
    /// state rounds share.
    pub fn new(agents: A, wiki: Arc<WikiClient<F>>, settings: RoundSettings) -> Self {
        Self {
            agents,
            wiki,
            settings,
        }
    }

    pub fn agents(&self) -> &A {
        &self.agents
    }

    pub fn wiki(&self) -> &Arc<WikiClient<F>> {
        &self.wiki
    }

    pub async fn run_round(&self, page_title: &str) -> Result<QuizRound, RoundError> {
        let result = with_deadline(self.settings.round_timeout, self.round(page_title)).await;
        if let Err(RoundError::DeadlineExceeded(limit)) = &result {
            warn!(page_title, ?limit, "Quiz round hit its deadline");
        }
        result
    }

    /// Run a round on a random page.
    pub async fn run_random_round(&self) -> Result<QuizRound, RoundError> {
        let page = self.wiki.random_page().await.map_err(|e| RoundError::Source {
            title: "<random>".into(),
            reason: e.to_string(),
            not_found: e.is_not_found(),
        })?;
        self.run_round(&page.title).await
    }

    async fn round(&self, page_title: &str) -> Result<QuizRound, RoundError> {
        info!(page_title, "Starting quiz round");
        let mut trace = StageTrace {
            enabled: self.settings.stage_log,
            ..StageTrace::default()
        };

        let page = self.wiki.page(page_title).await.map_err(|e| {
            error!(page_title, error = %e, "Could not fetch source page");
            RoundError::Source {
                title: page_title.to_string(),
                reason: e.to_string(),
                not_found: e.is_not_found(),
            }
        })?;

        let selected = self.pick_sections(&page).await?;
        trace.record(
            Stage::SectionPick.as_str(),
            format!("Page content ({} chars)", page.content.chars().count()),
            format!("{} sections selected", selected.sections.len()),
            selected.reasoning.clone(),
        );

        let section_titles = map_sections(&page.sections, &selected);
        let combined = selected.combined_text();

        let (candidate, validated, correction_attempts) =
            self.correction_loop(&combined, &mut trace).await?;

        let citation = cite(&page, &selected, &section_titles, &combined, &candidate.answer);
        let related_links = self.related_links(&page, &candidate.question, &mut trace).await;

        info!(
            page_title,
            validated,
            correction_attempts,
            cited = citation.is_some(),
            related = related_links.len(),
            "Quiz round complete"
        );

        Ok(QuizRound {
            round_id: Uuid::new_v4(),
            page_title: page.title.clone(),
            page_url: page.url.clone(),
            selected_sections: selected,
            section_titles,
            question: candidate.question,
            validation: candidate.validation,
            validated,
            correction_attempts,
            citation,
            related_links,
            stage_log: trace.entries,
            created_at: Utc::now(),
        })
    }

    /// Primary backend first; one retry on the fallback backend when the
    /// primary is overloaded or rate limited.
    async fn pick_sections(&self, page: &WikiPage) -> Result<SelectedSections, RoundError> {
        let limit = self.settings.stage_timeout;
        let primary = bounded(
            Stage::SectionPick,
            limit,
            self.agents.pick_sections(&page.content, Backend::Primary),
        )
        .await;

        let mut selected = match primary {
            Ok(selected) => selected,
            Err(error) => {
                let class = classify(&error);
                if !matches!(class, FailureClass::Overloaded | FailureClass::RateLimited) {
                    return Err(stage_failure(Stage::SectionPick, error, 1));
                }
                warn!(?class, error = %error, "Primary backend unavailable, picking sections on fallback");
                bounded(
                    Stage::SectionPick,
                    limit,
                    self.agents.pick_sections(&page.content, Backend::Fallback),
                )
                .await
                .map_err(|e| stage_failure(Stage::SectionPick, e, 2))?
            }
        };

        selected.sections.retain(|s| !s.text.trim().is_empty());
        if selected.sections.is_empty() {
            error!(page = %page.title, "Section picker returned no text");
            return Err(RoundError::Ungrounded);
        }
        info!(count = selected.sections.len(), "Selected sections");
        Ok(selected)
    }

    /// Returns the question to publish, whether it was validated, and the
    /// number of attempts made.
    async fn correction_loop(
        &self,
        source_text: &str,
        trace: &mut StageTrace,
    ) -> Result<(Candidate, bool, u32), RoundError> {
        let limit = self.settings.stage_timeout;
        let max_attempts = self.settings.max_correction_attempts;
        let mut correction_note: Option<String> = None;
        let mut last: Option<Candidate> = None;
        let mut last_failure: Option<FailureClass> = None;

        for attempt in 1..=max_attempts {
            info!(attempt, max_attempts, "Correction loop attempt");

            let question = match bounded(
                Stage::QuizMake,
                limit,
                self.agents.make_question(source_text, correction_note.as_deref()),
            )
            .await
            {
                Ok(question) => question,
                Err(error) => {
                    let class = classify(&error);
                    if class.is_fatal() {
                        return Err(stage_failure(Stage::QuizMake, error, attempt));
                    }
                    warn!(attempt, ?class, error = %error, "Question generation failed");
                    last_failure = Some(class);
                    continue;
                }
            };
            trace.record(
                format!("{} (attempt {attempt})", Stage::QuizMake),
                format!("Combined sections ({} chars)", source_text.chars().count()),
                question.question_text.clone(),
                question.explanation.clone(),
            );

            let answer = match gate(&question, source_text) {
                Ok(answer) => answer,
                Err(note) => {
                    warn!(attempt, problem = %note, "Question failed the structural gate");
                    let shaped = question.correct_answer().map(str::to_string);
                    if let Some(answer) = shaped {
                        last = Some(Candidate {
                            question,
                            answer,
                            validation: None,
                        });
                    }
                    correction_note = Some(note);
                    continue;
                }
            };

            let request = ValidationRequest {
                question: question.question_text.clone(),
                options: question.options.clone(),
                correct_answer: answer.clone(),
                source_text: source_text.to_string(),
            };
            let validation = match bounded(Stage::Validate, limit, self.agents.validate(&request)).await {
                Ok(validation) => validation,
                Err(error) => {
                    let class = classify(&error);
                    warn!(attempt, ?class, error = %error, "Validation failed");
                    trace.record(
                        format!("{} (attempt {attempt})", Stage::Validate),
                        "Question + source text".to_string(),
                        format!("Validation call failed ({class:?})"),
                        error.to_string(),
                    );
                    last_failure = Some(class);
                    last = Some(Candidate {
                        question,
                        answer,
                        validation: None,
                    });
                    continue;
                }
            };
            trace.record(
                format!("{} (attempt {attempt})", Stage::Validate),
                "Question + source text".to_string(),
                format!(
                    "Valid: {}, Confidence: {}",
                    validation.is_valid, validation.confidence
                ),
                validation
                    .issues
                    .clone()
                    .unwrap_or_else(|| "No issues found".to_string()),
            );

            let accepted =
                validation.is_valid && validation.confidence >= self.settings.confidence_floor;
            info!(
                attempt,
                is_valid = validation.is_valid,
                confidence = validation.confidence,
                accepted,
                "Validation result"
            );

            if accepted {
                let candidate = Candidate {
                    question,
                    answer,
                    validation: Some(validation),
                };
                return Ok((candidate, true, attempt));
            }

            correction_note = validation
                .correction_note
                .clone()
                .or_else(|| validation.issues.clone());
            last = Some(Candidate {
                question,
                answer,
                validation: Some(validation),
            });
        }

        match last {
            Some(candidate) => {
                warn!(
                    attempts = max_attempts,
                    "Correction attempts exhausted, publishing last question unvalidated"
                );
                Ok((candidate, false, max_attempts))
            }
            None => {
                error!(attempts = max_attempts, "No usable question generated");
                Err(RoundError::Exhausted {
                    attempts: max_attempts,
                    last_failure,
                })
            }
        }
    }

    /// Rank the page's links against the question. Never fails the round.
    async fn related_links(
        &self,
        page: &WikiPage,
        question: &Question,
        trace: &mut StageTrace,
    ) -> Vec<LinkRelevance> {
        if page.links.is_empty() {
            info!(page = %page.title, "Page has no links to rank");
            return Vec::new();
        }

        let ranked = bounded(
            Stage::Relevance,
            self.settings.stage_timeout,
            self.agents.rank_links(&question.question_text, &page.links),
        )
        .await;

        match ranked {
            Ok(mut links) => {
                links.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
                links.truncate(MAX_RELATED_LINKS);
                trace.record(
                    Stage::Relevance.as_str(),
                    format!("Question + {} links", page.links.len()),
                    format!("{} relevant links selected", links.len()),
                    links
                        .iter()
                        .map(|l| format!("{} ({:.2})", l.link_title, l.relevance_score))
                        .collect::<Vec<_>>()
                        .join(", "),
                );
                links
            }
            Err(error) => {
                warn!(error = %error, "Link ranking failed, continuing without related links");
                Vec::new()
            }
        }
    }
}

/// Locate the answer's section among the selected paragraphs and cite the
/// first supporting sentence of the combined text.
fn cite(
    page: &WikiPage,
    selected: &SelectedSections,
    section_titles: &[String],
    combined: &str,
    answer: &str,
) -> Option<Citation> {
    let (title, url) = selected
        .sections
        .iter()
        .position(|s| evidence::contains_answer(&s.text, answer))
        .and_then(|i| section_titles.get(i))
        .map(|title| (title.clone(), section_url(&page.url, title)))
        .unwrap_or_else(|| (FALLBACK_SECTION_TITLE.to_string(), page.url.clone()));

    evidence::extract(combined, answer, &title, &url)
}
