// Test doubles for the round controllers.
//
// - MockDeceptionAgents (DeceptionAgents): fixed research output, a marker-
//   based deceiver and an auditor that finds the marker. Scripted responses
//   queued with `.on_*()` are served first.
// - MockQuizAgents (QuizAgents): per-stage response queues; the last queued
//   response repeats once the queue is down to one.
// - MockPageFetcher (PageFetcher): title → page map with a fetch counter.
//
// Plus fixtures for facts, questions, selections and a sample page.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use veracity_common::{
    Difficulty, Fact, GenerationError, LinkRelevance, Question, SelectedSection,
    SelectedSections, ValidationResult, Verdict,
};
use wiki_client::{Lookup, PageFetcher, RawPage, WikiError};

use crate::traits::{Backend, DeceptionAgents, GenResult, QuizAgents, ValidationRequest};

/// Prefix the mock deceiver puts on every lie.
pub const LIE_MARKER: &str = "[altered] ";

// ---------------------------------------------------------------------------
// Script
// ---------------------------------------------------------------------------

/// Queue of canned responses plus a call counter.
pub struct Script<T> {
    steps: Mutex<VecDeque<GenResult<T>>>,
    calls: AtomicU32,
}

impl<T: Clone> Script<T> {
    fn new() -> Self {
        Self {
            steps: Mutex::new(VecDeque::new()),
            calls: AtomicU32::new(0),
        }
    }

    fn push(&mut self, step: GenResult<T>) {
        self.steps.get_mut().unwrap().push_back(step);
    }

    /// Next queued response, consuming it.
    fn pop(&self) -> Option<GenResult<T>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.steps.lock().unwrap().pop_front()
    }

    /// Next queued response; the final one repeats.
    fn pop_sticky(&self) -> Option<GenResult<T>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut steps = self.steps.lock().unwrap();
        if steps.len() > 1 {
            steps.pop_front()
        } else {
            steps.front().cloned()
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

fn unscripted<T>(what: &str) -> GenResult<T> {
    Err(GenerationError::new(format!("mock: no response scripted for {what}")))
}

// ---------------------------------------------------------------------------
// MockDeceptionAgents
// ---------------------------------------------------------------------------

pub struct MockDeceptionAgents {
    facts: Vec<Fact>,
    research: Script<Vec<Fact>>,
    deceive: Script<Fact>,
    audit: Script<Verdict>,
    audit_confidence: f64,
    audit_delay: Option<Duration>,
    audited: Mutex<Vec<Vec<String>>>,
}

impl MockDeceptionAgents {
    /// Research returns `facts`; the auditor always finds the lie with 0.95
    /// confidence.
    pub fn new(facts: Vec<Fact>) -> Self {
        Self {
            facts,
            research: Script::new(),
            deceive: Script::new(),
            audit: Script::new(),
            audit_confidence: 0.95,
            audit_delay: None,
            audited: Mutex::new(Vec::new()),
        }
    }

    pub fn on_research(mut self, response: GenResult<Vec<Fact>>) -> Self {
        self.research.push(response);
        self
    }

    pub fn on_deceive(mut self, response: GenResult<Fact>) -> Self {
        self.deceive.push(response);
        self
    }

    pub fn on_audit(mut self, response: GenResult<Verdict>) -> Self {
        self.audit.push(response);
        self
    }

    pub fn with_audit_confidence(mut self, confidence: f64) -> Self {
        self.audit_confidence = confidence;
        self
    }

    pub fn with_audit_delay(mut self, delay: Duration) -> Self {
        self.audit_delay = Some(delay);
        self
    }

    pub fn research_calls(&self) -> u32 {
        self.research.calls()
    }

    pub fn deceive_calls(&self) -> u32 {
        self.deceive.calls()
    }

    pub fn audit_calls(&self) -> u32 {
        self.audit.calls()
    }

    /// Statements the auditor was shown, per call.
    pub fn audited(&self) -> Vec<Vec<String>> {
        self.audited.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeceptionAgents for MockDeceptionAgents {
    async fn research(&self, _topic: &str) -> GenResult<Vec<Fact>> {
        self.research
            .pop()
            .unwrap_or_else(|| Ok(self.facts.clone()))
    }

    async fn deceive(&self, fact: &Fact) -> GenResult<Fact> {
        self.deceive.pop().unwrap_or_else(|| {
            // is_lie left false on purpose: the controller must set it
            Ok(Fact {
                content: format!("{LIE_MARKER}{}", fact.content),
                source: fact.source.clone(),
                is_lie: false,
            })
        })
    }

    async fn audit(&self, statements: &[String]) -> GenResult<Verdict> {
        if let Some(delay) = self.audit_delay {
            tokio::time::sleep(delay).await;
        }
        self.audited.lock().unwrap().push(statements.to_vec());

        self.audit.pop().unwrap_or_else(|| {
            let selection = statements
                .iter()
                .position(|s| s.starts_with(LIE_MARKER))
                .unwrap_or(0);
            Ok(Verdict {
                selection,
                confidence: self.audit_confidence,
                reasoning: "The altered detail contradicts the record.".into(),
                highlight_start: Some(0),
                highlight_end: Some(LIE_MARKER.trim_end().chars().count()),
            })
        })
    }
}

// ---------------------------------------------------------------------------
// MockQuizAgents
// ---------------------------------------------------------------------------

pub struct MockQuizAgents {
    primary: Script<SelectedSections>,
    fallback: Script<SelectedSections>,
    questions: Script<Question>,
    validations: Script<ValidationResult>,
    rankings: Script<Vec<LinkRelevance>>,
    correction_notes: Mutex<Vec<Option<String>>>,
}

impl Default for MockQuizAgents {
    fn default() -> Self {
        Self::new()
    }
}

impl MockQuizAgents {
    pub fn new() -> Self {
        Self {
            primary: Script::new(),
            fallback: Script::new(),
            questions: Script::new(),
            validations: Script::new(),
            rankings: Script::new(),
            correction_notes: Mutex::new(Vec::new()),
        }
    }

    pub fn on_pick(mut self, backend: Backend, response: GenResult<SelectedSections>) -> Self {
        match backend {
            Backend::Primary => self.primary.push(response),
            Backend::Fallback => self.fallback.push(response),
        }
        self
    }

    pub fn on_question(mut self, response: GenResult<Question>) -> Self {
        self.questions.push(response);
        self
    }

    pub fn on_validate(mut self, response: GenResult<ValidationResult>) -> Self {
        self.validations.push(response);
        self
    }

    pub fn on_rank(mut self, response: GenResult<Vec<LinkRelevance>>) -> Self {
        self.rankings.push(response);
        self
    }

    pub fn pick_calls(&self, backend: Backend) -> u32 {
        match backend {
            Backend::Primary => self.primary.calls(),
            Backend::Fallback => self.fallback.calls(),
        }
    }

    pub fn question_calls(&self) -> u32 {
        self.questions.calls()
    }

    pub fn validate_calls(&self) -> u32 {
        self.validations.calls()
    }

    pub fn rank_calls(&self) -> u32 {
        self.rankings.calls()
    }

    /// Correction note passed to each question attempt.
    pub fn correction_notes(&self) -> Vec<Option<String>> {
        self.correction_notes.lock().unwrap().clone()
    }
}

#[async_trait]
impl QuizAgents for MockQuizAgents {
    async fn pick_sections(
        &self,
        _page_text: &str,
        backend: Backend,
    ) -> GenResult<SelectedSections> {
        let script = match backend {
            Backend::Primary => &self.primary,
            Backend::Fallback => &self.fallback,
        };
        script
            .pop_sticky()
            .unwrap_or_else(|| unscripted("pick_sections"))
    }

    async fn make_question(
        &self,
        _source_text: &str,
        correction_note: Option<&str>,
    ) -> GenResult<Question> {
        self.correction_notes
            .lock()
            .unwrap()
            .push(correction_note.map(str::to_string));
        self.questions
            .pop_sticky()
            .unwrap_or_else(|| unscripted("make_question"))
    }

    async fn validate(&self, _request: &ValidationRequest) -> GenResult<ValidationResult> {
        self.validations
            .pop_sticky()
            .unwrap_or_else(|| unscripted("validate"))
    }

    async fn rank_links(
        &self,
        _question: &str,
        _links: &[String],
    ) -> GenResult<Vec<LinkRelevance>> {
        self.rankings
            .pop_sticky()
            .unwrap_or_else(|| unscripted("rank_links"))
    }
}

// ---------------------------------------------------------------------------
// MockPageFetcher
// ---------------------------------------------------------------------------

/// Title-keyed page fetcher. Unregistered titles are not found; fuzzy
/// lookups resolve through `.on_fuzzy()`.
#[derive(Default)]
pub struct MockPageFetcher {
    pages: HashMap<String, RawPage>,
    fuzzy: HashMap<String, String>,
    random: Option<String>,
    fetches: AtomicU32,
}

impl MockPageFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_page(mut self, page: RawPage) -> Self {
        self.pages.insert(page.title.clone(), page);
        self
    }

    pub fn on_fuzzy(mut self, query: &str, title: &str) -> Self {
        self.fuzzy.insert(query.to_string(), title.to_string());
        self
    }

    pub fn with_random(mut self, title: &str) -> Self {
        self.random = Some(title.to_string());
        self
    }

    pub fn fetches(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for MockPageFetcher {
    async fn fetch(&self, title: &str, lookup: Lookup) -> wiki_client::Result<RawPage> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let resolved = match lookup {
            Lookup::Exact => Some(title),
            Lookup::Fuzzy => self.fuzzy.get(title).map(String::as_str),
        };
        resolved
            .and_then(|t| self.pages.get(t))
            .cloned()
            .ok_or_else(|| WikiError::NotFound(title.to_string()))
    }

    async fn search(&self, query: &str, limit: usize) -> wiki_client::Result<Vec<String>> {
        let needle = query.to_lowercase();
        let mut titles: Vec<String> = self
            .pages
            .keys()
            .filter(|t| t.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        titles.sort();
        titles.truncate(limit);
        Ok(titles)
    }

    async fn random_title(&self) -> wiki_client::Result<String> {
        self.random
            .clone()
            .ok_or_else(|| WikiError::Parse("mock: no random page registered".into()))
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn fact(content: &str) -> Fact {
    Fact {
        content: content.to_string(),
        source: "https://en.wikipedia.org/wiki/Peace_of_Westphalia".to_string(),
        is_lie: false,
    }
}

/// Three true facts about the Peace of Westphalia.
pub fn research_facts() -> Vec<Fact> {
    vec![
        fact("The Peace of Westphalia was signed in 1648."),
        fact("Negotiations took place in Osnabrück and Münster."),
        fact("The treaties ended the Thirty Years' War."),
    ]
}

pub fn question(options: &[&str], correct_answer_index: usize) -> Question {
    Question {
        question_text: "In which year was the Peace of Westphalia signed?".to_string(),
        options: options.iter().map(|o| o.to_string()).collect(),
        correct_answer_index,
        difficulty: Difficulty::Medium,
        explanation: "The source states the treaty was signed in 1648.".to_string(),
    }
}

/// Four year options with 1648 correct.
pub fn treaty_question() -> Question {
    question(&["1648", "1748", "1618", "1658"], 0)
}

pub fn valid(confidence: f64) -> ValidationResult {
    ValidationResult {
        is_valid: true,
        confidence,
        issues: None,
        correction_note: None,
    }
}

pub fn invalid(note: &str) -> ValidationResult {
    ValidationResult {
        is_valid: false,
        confidence: 0.9,
        issues: Some("The marked answer is not supported.".to_string()),
        correction_note: Some(note.to_string()),
    }
}

pub fn selected(paragraphs: &[&str]) -> SelectedSections {
    SelectedSections {
        sections: paragraphs
            .iter()
            .map(|p| SelectedSection {
                text: p.to_string(),
                rationale: "Names and dates.".to_string(),
            })
            .collect(),
        reasoning: "Most fact-dense paragraphs.".to_string(),
    }
}

pub fn link(title: &str, score: f64) -> LinkRelevance {
    LinkRelevance {
        link_title: title.to_string(),
        relevance_score: score,
        reason: "Same period.".to_string(),
    }
}

pub const WESTPHALIA_TITLE: &str = "Peace of Westphalia";

pub const WESTPHALIA_CONTENT: &str = "The Peace of Westphalia is the collective name for two peace treaties.\n\
== Background ==\n\
The Thirty Years' War began in 1618 with the Bohemian revolt.\n\
== Treaty terms ==\n\
The treaty was signed in 1648 at Münster and Osnabrück.\n\
Sweden received territory on the Baltic coast.\n\
== See also ==\n";

/// Selected paragraphs taken verbatim from `WESTPHALIA_CONTENT`.
pub fn westphalia_selection() -> SelectedSections {
    selected(&[
        "The Thirty Years' War began in 1618 with the Bohemian revolt.",
        "The treaty was signed in 1648 at Münster and Osnabrück.",
    ])
}

pub fn westphalia_page() -> RawPage {
    RawPage {
        title: WESTPHALIA_TITLE.to_string(),
        url: "https://en.wikipedia.org/wiki/Peace_of_Westphalia".to_string(),
        content: WESTPHALIA_CONTENT.to_string(),
        links: vec![
            "Thirty Years' War".to_string(),
            "Holy Roman Empire".to_string(),
            "Münster".to_string(),
            "Osnabrück".to_string(),
            "Sovereignty".to_string(),
        ],
    }
}
