//! Integration tests for recording completions

mod common;

use trailhead::progression::RolledUpNode;
use trailhead::{CompletionPayload, EngineError, NodeKind, ReasonCode};

use common::{day, engine, xp_rows};

#[test]
fn test_finishing_three_phase_chapter() {
    let (_dir, engine) = engine();
    engine.record_completion_at("ana", "intro-1", None, None, day(3)).unwrap();
    engine.record_completion_at("ana", "intro-2", None, None, day(3)).unwrap();

    assert!(!engine.is_unlocked("ana", "next-1").unwrap());
    let outcome = engine.record_completion_at("ana", "intro-3", None, None, day(3)).unwrap();

    assert_eq!(
        outcome.completion.rolled_up,
        vec![RolledUpNode {
            node_id: "basics-intro".into(),
            kind: NodeKind::Chapter
        }]
    );
    let fresh: Vec<_> = outcome
        .awards
        .iter()
        .filter(|a| a.awarded)
        .map(|a| (a.reason, a.node_id.clone().unwrap(), a.amount))
        .collect();
    assert_eq!(
        fresh,
        vec![
            (ReasonCode::Completion, "intro-3".to_string(), 20),
            (ReasonCode::ChapterBonus, "basics-intro".to_string(), 50),
        ]
    );

    assert!(outcome.newly_unlocked.contains(&"basics-next".to_string()));
    assert!(outcome.newly_unlocked.contains(&"next-1".to_string()));
    assert!(!outcome.newly_unlocked.contains(&"next-2".to_string()));
    assert!(engine.is_unlocked("ana", "next-1").unwrap());

    assert_eq!(outcome.total_xp, 20 * 3 + 50);
    assert_eq!(outcome.level, 2);
    assert_eq!(outcome.level_up.as_ref().map(|l| l.new_level), Some(2));
}

#[test]
fn test_repeat_completion_is_idempotent() {
    let (_dir, engine) = engine();
    let first = engine.record_completion_at("ana", "intro-1", None, None, day(3)).unwrap();
    assert!(!first.is_duplicate());
    let state_once = engine.get_gamification_state_at("ana", day(3)).unwrap();

    let second = engine.record_completion_at("ana", "intro-1", None, None, day(3)).unwrap();
    assert!(second.is_duplicate());
    assert_eq!(second.xp_awarded, 0);
    assert!(second.awards.iter().all(|a| !a.awarded && a.amount == 0));

    assert_eq!(engine.get_gamification_state_at("ana", day(3)).unwrap(), state_once);
    assert_eq!(xp_rows(&engine, "ana"), vec![("completion".to_string(), 20)]);
}

#[test]
fn test_locked_node_is_rejected_without_writes() {
    let (_dir, engine) = engine();
    let err = engine
        .record_completion_at("ana", "intro-2", None, None, day(3))
        .unwrap_err();
    assert!(matches!(err, EngineError::LockedNode { .. }));
    assert!(!err.is_retryable());

    assert!(xp_rows(&engine, "ana").is_empty());
    assert!(engine.tracker().record("ana", "intro-2").unwrap().is_none());
    assert_eq!(engine.get_gamification_state_at("ana", day(3)).unwrap().current_streak, 0);
}

#[test]
fn test_unknown_and_non_leaf_nodes_are_validation_errors() {
    let (_dir, engine) = engine();
    assert!(matches!(
        engine.record_completion("ana", "no-such-node", None),
        Err(EngineError::Validation(_))
    ));
    assert!(matches!(
        engine.record_completion("ana", "basics-intro", None),
        Err(EngineError::Validation(_))
    ));
}

#[test]
fn test_payload_must_match_content_kind() {
    let (_dir, engine) = engine();
    let reflection = CompletionPayload::Reflection {
        text: "Learned the basics".into(),
    };
    assert!(matches!(
        engine.record_completion_at("ana", "intro-1", Some(&reflection), None, day(3)),
        Err(EngineError::Validation(_))
    ));

    let reading = CompletionPayload::Reading {};
    engine
        .record_completion_at("ana", "intro-1", Some(&reading), None, day(3))
        .unwrap();
    engine
        .record_completion_at("ana", "intro-2", Some(&reflection), None, day(3))
        .unwrap();
}

#[test]
fn test_perfect_score_bonus_on_resubmission() {
    let (_dir, engine) = engine();
    engine.record_completion_at("ana", "intro-1", None, None, day(3)).unwrap();
    engine.record_completion_at("ana", "intro-2", None, None, day(3)).unwrap();

    let decent = CompletionPayload::SelfAssessment {
        ratings: vec![5, 4, 5],
    };
    let first = engine
        .record_completion_at("ana", "intro-3", Some(&decent), None, day(3))
        .unwrap();
    assert!(!first.awards.iter().any(|a| a.reason == ReasonCode::PerfectScoreBonus));

    let perfect = CompletionPayload::SelfAssessment {
        ratings: vec![5, 5, 5],
    };
    let retry = engine
        .record_completion_at("ana", "intro-3", Some(&perfect), None, day(3))
        .unwrap();
    let bonus: Vec<_> = retry.awards.iter().filter(|a| a.awarded).collect();
    assert_eq!(bonus.len(), 1);
    assert_eq!(bonus[0].reason, ReasonCode::PerfectScoreBonus);
    assert_eq!(bonus[0].amount, 15);

    // Only once, however often it is resubmitted
    let again = engine
        .record_completion_at("ana", "intro-3", Some(&perfect), None, day(3))
        .unwrap();
    assert!(again.is_duplicate());

    let record = engine.tracker().record("ana", "intro-3").unwrap().unwrap();
    assert_eq!(record.payload, Some(perfect));
}

#[test]
fn test_progress_tree_percentages() {
    let (_dir, engine) = engine();
    engine.record_completion_at("ana", "intro-1", None, None, day(3)).unwrap();

    let view = engine.get_progress("ana", "basics").unwrap();
    assert_eq!(view.percentage, 0);
    assert!(view.unlocked);

    let intro = &view.children[0];
    assert_eq!(intro.node_id, "basics-intro");
    assert_eq!(intro.percentage, 33);
    assert!(intro.children[0].completed);
    assert_eq!(intro.children[0].percentage, 100);
    assert!(intro.children[1].unlocked);
    assert!(!intro.children[2].unlocked);

    let next = &view.children[1];
    assert!(!next.unlocked);
    assert_eq!(next.percentage, 0);

    assert_eq!(engine.tracker().completion_percentage("ana", "basics-intro").unwrap(), 33);
}

#[test]
fn test_pages_roll_up_through_phase_to_zone() {
    let (_dir, engine) = engine();
    for (i, node) in common::PATH.iter().enumerate() {
        let outcome = engine
            .record_completion_at("ana", node, None, None, day(3))
            .unwrap_or_else(|e| panic!("step {i} ({node}) failed: {e}"));
        if *node == "adv-1-1-b" {
            let kinds: Vec<_> = outcome.completion.rolled_up.iter().map(|r| r.kind).collect();
            assert_eq!(kinds, vec![NodeKind::Phase, NodeKind::Chapter, NodeKind::Zone]);
        }
    }

    let reasons: Vec<_> = xp_rows(&engine, "ana").into_iter().map(|(r, _)| r).collect();
    assert_eq!(reasons.iter().filter(|r| *r == "zone-bonus").count(), 2);
    assert_eq!(reasons.iter().filter(|r| *r == "chapter-bonus").count(), 3);
    assert_eq!(engine.get_progress("ana", "advanced").unwrap().percentage, 100);
}
