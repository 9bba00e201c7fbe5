//! Two truths and a lie, audited blind.
//!
//! research → deceive one fact → shuffle → blind audit → circuit breaker.
//! A rejected or failed attempt reruns the whole sequence; nothing from a
//! failed attempt survives into the next one.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{error, info, warn};
use uuid::Uuid;

use veracity_common::{
    DeceptionRound, Fact, FailureClass, GenerationError, RoundError, Stage, Verdict,
};

use crate::classify::classify;
use crate::settings::{with_deadline, RoundSettings};
use crate::traits::{bounded, DeceptionAgents};

/// Statements shown per round; one of them is the lie.
pub const FACTS_PER_ROUND: usize = 3;

/// The circuit breaker. Accepts only a well-formed verdict that picks the
/// lie with at least `floor` confidence.
pub fn accepts(verdict: &Verdict, lie_index: usize, floor: f64) -> bool {
    verdict.is_well_formed() && verdict.selection == lie_index && verdict.confidence >= floor
}

enum AttemptFailure {
    /// Research came back with too few facts.
    Insufficient(usize),
    /// The auditor missed the lie or was not confident enough.
    Rejected { lie_index: usize, verdict: Verdict },
    Stage { stage: Stage, error: GenerationError },
}

fn at(stage: Stage) -> impl FnOnce(GenerationError) -> AttemptFailure {
    move |error| AttemptFailure::Stage { stage, error }
}

pub struct DeceptionController<A> {
    agents: A,
    settings: RoundSettings,
    rng: Mutex<StdRng>,
}

impl<A: DeceptionAgents> DeceptionController<A> {
    pub fn new(agents: A, settings: RoundSettings) -> Self {
        Self {
            agents,
            settings,
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Deterministic victim choice and ordering.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn agents(&self) -> &A {
        &self.agents
    }

    fn rng(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run attempts until one passes the circuit breaker. Returns only
    /// complete, accepted rounds.
    pub async fn run_round(&self, topic: &str) -> Result<DeceptionRound, RoundError> {
        let result = with_deadline(self.settings.round_timeout, self.attempts(topic)).await;
        if let Err(RoundError::DeadlineExceeded(limit)) = &result {
            warn!(topic, ?limit, "Deception round hit its deadline");
        }
        result
    }

    async fn attempts(&self, topic: &str) -> Result<DeceptionRound, RoundError> {
        let max_attempts = self.settings.max_round_attempts;
        let mut last_failure: Option<FailureClass> = None;

        for attempt in 1..=max_attempts {
            info!(topic, attempt, max_attempts, "Deception round attempt");

            match self.attempt(topic, attempt).await {
                Ok(round) => {
                    info!(
                        topic,
                        attempt,
                        confidence = round.verdict.confidence,
                        "Audit passed circuit breaker"
                    );
                    return Ok(round);
                }
                Err(AttemptFailure::Insufficient(found)) => {
                    warn!(topic, attempt, found, "Research returned too few facts");
                    last_failure = None;
                }
                Err(AttemptFailure::Rejected { lie_index, verdict }) => {
                    warn!(
                        topic,
                        attempt,
                        expected = lie_index,
                        selected = verdict.selection,
                        confidence = verdict.confidence,
                        reasoning = %verdict.reasoning,
                        "Audit failed circuit breaker"
                    );
                    last_failure = None;
                }
                Err(AttemptFailure::Stage { stage, error }) => {
                    let class = classify(&error);
                    if class.is_fatal() {
                        error!(topic, %stage, ?class, error = %error, "Unrecoverable stage failure");
                        return Err(RoundError::Fatal {
                            stage,
                            class,
                            error,
                        });
                    }
                    warn!(topic, attempt, %stage, ?class, error = %error, "Stage failed");
                    last_failure = Some(class);
                }
            }
        }

        error!(topic, attempts = max_attempts, "No acceptable deception round");
        Err(RoundError::Exhausted {
            attempts: max_attempts,
            last_failure,
        })
    }

    async fn attempt(&self, topic: &str, attempt: u32) -> Result<DeceptionRound, AttemptFailure> {
        let limit = self.settings.stage_timeout;

        let mut raw_facts = bounded(Stage::Research, limit, self.agents.research(topic))
            .await
            .map_err(at(Stage::Research))?;
        if raw_facts.len() < FACTS_PER_ROUND {
            return Err(AttemptFailure::Insufficient(raw_facts.len()));
        }
        for fact in &mut raw_facts {
            fact.is_lie = false;
        }

        let victim = self.rng().random_range(0..FACTS_PER_ROUND);
        let mut lie = bounded(Stage::Deceive, limit, self.agents.deceive(&raw_facts[victim]))
            .await
            .map_err(at(Stage::Deceive))?;
        lie.is_lie = true;

        let (facts, lie_index) = self.assemble(&raw_facts[..FACTS_PER_ROUND], victim, lie);

        let statements: Vec<String> = facts.iter().map(|f| f.content.clone()).collect();
        let verdict = bounded(Stage::Audit, limit, self.agents.audit(&statements))
            .await
            .map_err(at(Stage::Audit))?;

        if !accepts(&verdict, lie_index, self.settings.confidence_floor) {
            return Err(AttemptFailure::Rejected { lie_index, verdict });
        }

        Ok(DeceptionRound {
            round_id: Uuid::new_v4(),
            topic: topic.to_string(),
            raw_facts,
            facts,
            verdict,
            attempts: attempt,
            created_at: Utc::now(),
        })
    }

    /// The untouched truths plus the lie in uniformly random order.
    fn assemble(&self, truths: &[Fact], victim: usize, lie: Fact) -> (Vec<Fact>, usize) {
        let mut facts: Vec<Fact> = truths
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != victim)
            .map(|(_, fact)| fact.clone())
            .collect();

        let mut rng = self.rng();
        facts.shuffle(&mut *rng);
        let lie_index = rng.random_range(0..=facts.len());
        facts.insert(lie_index, lie);

        (facts, lie_index)
    }
}
