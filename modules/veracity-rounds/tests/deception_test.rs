//! Deception rounds end to end against scripted agents.
//!
//! No network: MockDeceptionAgents stands in for the researcher, deceiver
//! and auditor.

use veracity_common::{FailureClass, GenerationError, RoundError, Verdict};
use veracity_rounds::deception::{DeceptionController, FACTS_PER_ROUND};
use veracity_rounds::testing::{research_facts, MockDeceptionAgents, LIE_MARKER};
use veracity_rounds::RoundSettings;

fn wrong_pick() -> Verdict {
    Verdict {
        selection: 0,
        confidence: 0.99,
        reasoning: "Looks off.".into(),
        highlight_start: None,
        highlight_end: None,
    }
}

#[tokio::test]
async fn lie_position_is_uniform_across_rounds() {
    let controller =
        DeceptionController::new(MockDeceptionAgents::new(research_facts()), RoundSettings::default())
            .with_seed(2024);

    let mut positions = [0u32; FACTS_PER_ROUND];
    for _ in 0..300 {
        let round = controller.run_round("Peace of Westphalia").await.unwrap();
        positions[round.lie_index().unwrap()] += 1;
    }

    for (index, count) in positions.iter().enumerate() {
        assert!(
            (60..=140).contains(count),
            "lie landed at {index} {count} times out of 300: {positions:?}"
        );
    }
}

#[tokio::test]
async fn lie_is_the_deceivers_rewrite() {
    let controller =
        DeceptionController::new(MockDeceptionAgents::new(research_facts()), RoundSettings::default())
            .with_seed(11);
    let round = controller.run_round("Peace of Westphalia").await.unwrap();

    let lie = &round.facts[round.lie_index().unwrap()];
    assert!(lie.content.starts_with(LIE_MARKER));
    let truths: Vec<_> = round.facts.iter().filter(|f| !f.is_lie).collect();
    assert_eq!(truths.len(), 2);
    assert!(truths.iter().all(|f| round.raw_facts.contains(f)));
}

#[tokio::test]
async fn unconfident_auditor_exhausts_three_attempts() {
    let agents = MockDeceptionAgents::new(research_facts()).with_audit_confidence(0.5);
    let controller = DeceptionController::new(agents, RoundSettings::default()).with_seed(3);

    let err = controller.run_round("Peace of Westphalia").await.unwrap_err();
    assert!(matches!(err, RoundError::Exhausted { attempts: 3, .. }));
    assert_eq!(controller.agents().research_calls(), 3);
    assert_eq!(controller.agents().audit_calls(), 3);
}

#[tokio::test]
async fn accepted_on_a_later_attempt_reports_that_attempt() {
    let agents = MockDeceptionAgents::new(research_facts())
        .on_audit(Err(GenerationError::new("503 UNAVAILABLE")))
        .on_audit(Ok(Verdict {
            confidence: 0.1,
            ..wrong_pick()
        }));
    let controller = DeceptionController::new(agents, RoundSettings::default()).with_seed(5);

    let round = controller.run_round("Peace of Westphalia").await.unwrap();
    assert_eq!(round.attempts, 3);
    assert_eq!(controller.agents().audit_calls(), 3);
}

#[tokio::test]
async fn attempt_limit_comes_from_settings() {
    let agents = MockDeceptionAgents::new(research_facts()).with_audit_confidence(0.5);
    let settings = RoundSettings {
        max_round_attempts: 5,
        ..RoundSettings::default()
    };
    let controller = DeceptionController::new(agents, settings);

    let err = controller.run_round("Peace of Westphalia").await.unwrap_err();
    assert!(matches!(err, RoundError::Exhausted { attempts: 5, .. }));
    assert_eq!(controller.agents().audit_calls(), 5);
}

#[tokio::test]
async fn missing_model_fails_fast() {
    let agents = MockDeceptionAgents::new(research_facts())
        .on_deceive(Err(GenerationError::new("model: claude-nope").with_status(404)));
    let controller = DeceptionController::new(agents, RoundSettings::default());

    let err = controller.run_round("Peace of Westphalia").await.unwrap_err();
    assert_eq!(err.failure_class(), Some(FailureClass::ModelNotFound));
    assert!(err.user_message().contains("model"));
    assert_eq!(controller.agents().research_calls(), 1);
}
