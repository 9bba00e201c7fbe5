use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Deception game
// =============================================================================

/// One statement in a deception round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Fact {
    /// The statement itself.
    pub content: String,
    /// Source URL or citation for the statement.
    pub source: String,
    /// True only for the fabricated statement.
    pub is_lie: bool,
}

/// The auditor's judgement over three blind statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Verdict {
    /// Index (0-2) of the statement believed to be the lie.
    pub selection: usize,
    /// Confidence between 0.0 and 1.0.
    pub confidence: f64,
    /// Why this statement was chosen.
    pub reasoning: String,
    /// Character offset where the suspicious part of the statement starts.
    pub highlight_start: Option<usize>,
    /// Character offset where the suspicious part of the statement ends.
    pub highlight_end: Option<usize>,
}

impl Verdict {
    pub fn is_well_formed(&self) -> bool {
        self.confidence.is_finite() && (0.0..=1.0).contains(&self.confidence)
    }

    pub fn highlight_span(&self) -> Option<(usize, usize)> {
        match (self.highlight_start, self.highlight_end) {
            (Some(start), Some(end)) if start < end => Some((start, end)),
            _ => None,
        }
    }

    /// Split `statement` into `(before, highlighted, after)` using the
    /// character span. `None` when the span does not fit the statement.
    pub fn highlight<'a>(&self, statement: &'a str) -> Option<(&'a str, &'a str, &'a str)> {
        let (start, end) = self.highlight_span()?;
        let chars = statement.chars().count();
        if end > chars {
            return None;
        }
        let byte_at = |char_idx: usize| {
            statement
                .char_indices()
                .nth(char_idx)
                .map(|(b, _)| b)
                .unwrap_or(statement.len())
        };
        let (s, e) = (byte_at(start), byte_at(end));
        Some((&statement[..s], &statement[s..e], &statement[e..]))
    }
}

/// A finished, audited deception round. Exactly one of `facts` is the lie,
/// and the auditor picked it with confidence at or above the floor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeceptionRound {
    pub round_id: Uuid,
    pub topic: String,
    /// The researcher's true facts, before one was rewritten.
    pub raw_facts: Vec<Fact>,
    /// The three shuffled statements shown to the player.
    pub facts: Vec<Fact>,
    pub verdict: Verdict,
    /// Which attempt produced this round (1-based).
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
}

impl DeceptionRound {
    pub fn lie_index(&self) -> Option<usize> {
        self.facts.iter().position(|f| f.is_lie)
    }

    pub fn statements(&self) -> Vec<&str> {
        self.facts.iter().map(|f| f.content.as_str()).collect()
    }
}

// =============================================================================
// Quiz game
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Question {
    pub question_text: String,
    /// Exactly four answer options.
    pub options: Vec<String>,
    /// Index (0-3) of the correct option.
    pub correct_answer_index: usize,
    pub difficulty: Difficulty,
    /// Why the correct answer is correct, grounded in the source text.
    pub explanation: String,
}

impl Question {
    pub const OPTION_COUNT: usize = 4;

    /// The correct option, if the question is structurally sound.
    pub fn correct_answer(&self) -> Option<&str> {
        if self.options.len() != Self::OPTION_COUNT {
            return None;
        }
        self.options
            .get(self.correct_answer_index)
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ValidationResult {
    pub is_valid: bool,
    /// Confidence between 0.0 and 1.0.
    pub confidence: f64,
    /// What is wrong with the question, when invalid.
    pub issues: Option<String>,
    /// How the next attempt should fix it, when invalid.
    pub correction_note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SelectedSection {
    /// Verbatim paragraph copied from the page.
    pub text: String,
    /// Why this paragraph is information-dense.
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SelectedSections {
    pub sections: Vec<SelectedSection>,
    pub reasoning: String,
}

impl SelectedSections {
    /// Selected paragraphs joined by blank lines; the only text a question
    /// may be generated from.
    pub fn combined_text(&self) -> String {
        self.sections
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LinkRelevance {
    pub link_title: String,
    /// Thematic relevance between 0.0 and 1.0.
    pub relevance_score: f64,
    pub reason: String,
}

/// A literal sentence from the source text that supports an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub sentence: String,
    pub section_title: String,
    pub section_url: String,
    pub sentence_index: usize,
}

/// Per-stage trace entry, recorded when stage logging is on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageLog {
    pub stage: String,
    pub input_summary: String,
    pub output_summary: String,
    pub reasoning: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizRound {
    pub round_id: Uuid,
    pub page_title: String,
    pub page_url: String,
    pub selected_sections: SelectedSections,
    /// Original section name for each selected paragraph, by position.
    pub section_titles: Vec<String>,
    pub question: Question,
    /// Validation of the published question, if the validator answered.
    pub validation: Option<ValidationResult>,
    /// False when the correction loop ran out and the last attempt was
    /// published anyway.
    pub validated: bool,
    pub correction_attempts: u32,
    pub citation: Option<Citation>,
    pub related_links: Vec<LinkRelevance>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stage_log: Vec<StageLog>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(start: Option<usize>, end: Option<usize>) -> Verdict {
        Verdict {
            selection: 1,
            confidence: 0.9,
            reasoning: "date is wrong".into(),
            highlight_start: start,
            highlight_end: end,
        }
    }

    #[test]
    fn highlight_splits_on_character_offsets() {
        let v = verdict(Some(25), Some(29));
        let (before, marked, after) = v.highlight("The treaty was signed in 1748.").unwrap();
        assert_eq!(before, "The treaty was signed in ");
        assert_eq!(marked, "1748");
        assert_eq!(after, ".");
    }

    #[test]
    fn highlight_counts_chars_not_bytes() {
        let v = verdict(Some(0), Some(7));
        let (_, marked, _) = v.highlight("Münster hosted the signing.").unwrap();
        assert_eq!(marked, "Münster");
    }

    #[test]
    fn highlight_rejects_out_of_range_or_inverted_spans() {
        assert!(verdict(Some(3), Some(99)).highlight("short").is_none());
        assert!(verdict(Some(4), Some(2)).highlight("short").is_none());
        assert!(verdict(None, Some(2)).highlight("short").is_none());
    }

    #[test]
    fn verdict_confidence_must_be_a_probability() {
        assert!(verdict(None, None).is_well_formed());
        let mut v = verdict(None, None);
        v.confidence = 1.7;
        assert!(!v.is_well_formed());
        v.confidence = f64::NAN;
        assert!(!v.is_well_formed());
    }

    #[test]
    fn correct_answer_requires_four_options_and_valid_index() {
        let mut q = Question {
            question_text: "When was the treaty signed?".into(),
            options: vec!["1648".into(), "1748".into(), "1618".into(), "1658".into()],
            correct_answer_index: 0,
            difficulty: Difficulty::Medium,
            explanation: "Stated in the text.".into(),
        };
        assert_eq!(q.correct_answer(), Some("1648"));

        q.correct_answer_index = 4;
        assert_eq!(q.correct_answer(), None);

        q.correct_answer_index = 0;
        q.options.pop();
        assert_eq!(q.correct_answer(), None);
    }

    #[test]
    fn combined_text_joins_with_blank_lines() {
        let sections = SelectedSections {
            sections: vec![
                SelectedSection { text: "First.".into(), rationale: "a".into() },
                SelectedSection { text: "Second.".into(), rationale: "b".into() },
            ],
            reasoning: "dense".into(),
        };
        assert_eq!(sections.combined_text(), "First.\n\nSecond.");
    }

    #[test]
    fn difficulty_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Difficulty::Hard).unwrap(), "\"hard\"");
    }
}
