mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use karlsen_guard::{
    AppContext,
    behavior::BehaviorStore,
    config::{ModerationConfig, Settings},
    decision::{Decision, ViolationKind},
    engine::ModerationEngine,
    events::{MemberJoined, MessageCreated},
    policy::ModerationPolicy,
};

use common::{Call, MockExecutor, MockProvider};

fn engine(cfg: ModerationConfig) -> ModerationEngine {
    let policy = Arc::new(ModerationPolicy::from_config(&cfg));
    let store = Arc::new(BehaviorStore::new(
        policy.spam_window,
        cfg.state_capacity,
        Duration::from_secs(cfg.state_idle_secs),
    ));
    ModerationEngine::new(policy, store)
}

fn message(author: u64, text: &str) -> MessageCreated {
    MessageCreated {
        guild_id: 1,
        channel_id: 10,
        message_id: 100,
        author_id: author,
        author_display_name: format!("user{author}"),
        text: text.into(),
    }
}

fn join(uid: u64, created: DateTime<Utc>) -> MemberJoined {
    MemberJoined {
        guild_id: 1,
        user_id: uid,
        display_name: format!("user{uid}"),
        account_created_at: created,
    }
}

fn timeouts(decisions: &[Decision]) -> usize {
    decisions
        .iter()
        .filter(|d| matches!(d, Decision::Timeout { .. }))
        .count()
}

#[test]
fn four_identical_messages_give_one_timeout() {
    let e = engine(ModerationConfig::default());
    let now = Utc::now();

    let first: Vec<_> = (0..4).map(|_| e.evaluate_message(&message(1, "buy now"), now)).collect();
    assert_eq!(timeouts(&first), 1);
    assert!(matches!(first[3], Decision::Timeout { .. }));
    if let Decision::Timeout { duration, reason, .. } = &first[3] {
        assert_eq!(*duration, Duration::from_secs(30 * 60));
        assert_eq!(reason.kind, ViolationKind::Spam);
    }

    // piąta w trakcie cooldownu – nic
    let fifth = e.evaluate_message(&message(1, "buy now"), now + chrono::Duration::seconds(5));
    assert_eq!(fifth, Decision::Allow);

    // kolejna pełna seria w cooldownie też nic
    let later = now + chrono::Duration::minutes(10);
    let again: Vec<_> = (0..4).map(|_| e.evaluate_message(&message(1, "buy now"), later)).collect();
    assert_eq!(timeouts(&again), 0);
}

#[test]
fn new_streak_after_cooldown_warns_again() {
    let e = engine(ModerationConfig::default());
    let t0 = Utc::now();
    let first: Vec<_> = (0..4).map(|_| e.evaluate_message(&message(1, "x"), t0)).collect();
    assert_eq!(timeouts(&first), 1);

    let t1 = t0 + chrono::Duration::minutes(31);
    let second: Vec<_> = (0..4).map(|_| e.evaluate_message(&message(1, "x"), t1)).collect();
    assert_eq!(timeouts(&second), 1);
    assert_eq!(e.store().snapshot(1).unwrap().last_warning_at, Some(t1));
}

#[test]
fn spam_state_is_per_user() {
    let e = engine(ModerationConfig::default());
    let now = Utc::now();
    for uid in [1, 2, 1, 2, 1, 2] {
        assert_eq!(e.evaluate_message(&message(uid, "hi"), now), Decision::Allow);
    }
    assert!(matches!(e.evaluate_message(&message(1, "hi"), now), Decision::Timeout { .. }));
    assert!(matches!(e.evaluate_message(&message(2, "hi"), now), Decision::Timeout { .. }));
}

#[test]
fn full_store_still_tracks_a_newcomer() {
    let e = engine(ModerationConfig {
        state_capacity: 10,
        ..Default::default()
    });
    let now = Utc::now();
    for uid in 1..=10u64 {
        for i in 0..30 {
            e.evaluate_message(&message(uid, &format!("msg {i}")), now);
        }
    }

    let flood: Vec<_> = (0..4).map(|_| e.evaluate_message(&message(99, "join my pool"), now)).collect();
    assert_eq!(timeouts(&flood), 1);
    assert!(matches!(flood[3], Decision::Timeout { .. }));
    assert_eq!(e.store().snapshot(99).unwrap().last_warning_at, Some(now));
}

#[test]
fn sixth_join_in_window_is_a_raid() {
    let e = engine(ModerationConfig {
        raid_max_joins: 5,
        raid_window_secs: 60,
        ..Default::default()
    });
    let t0 = Utc::now();
    let old = t0 - chrono::Duration::days(365);

    for i in 0..5u64 {
        let d = e.evaluate_join(&join(i, old), t0 + chrono::Duration::seconds(i as i64));
        assert_eq!(d, Decision::Allow, "join #{} must not be a raid", i + 1);
    }
    let d = e.evaluate_join(&join(6, old), t0 + chrono::Duration::seconds(10));
    assert_eq!(d.reason().map(|r| r.kind), Some(ViolationKind::Raid));
    assert!(matches!(d, Decision::Ban { .. }));

    // okno się przesuwa – po minucie znów spokój
    let d = e.evaluate_join(&join(7, old), t0 + chrono::Duration::seconds(200));
    assert_eq!(d, Decision::Allow);
}

#[test]
fn young_account_is_sanctioned_not_allowed() {
    let e = engine(ModerationConfig::default());
    let now = Utc::now();
    let d = e.evaluate_join(&join(1, now - chrono::Duration::hours(2)), now);
    assert_eq!(d.reason().map(|r| r.kind), Some(ViolationKind::NewAccount));
    assert!(d.purges_history());
}

#[test]
fn keyword_match_ignores_case_and_surroundings() {
    let e = engine(ModerationConfig {
        banned_message_keywords: vec!["Word1".into(), "Word2".into()],
        ..Default::default()
    });
    let d = e.evaluate_message(&message(3, "hey check this WORD1!!! now"), Utc::now());
    match d {
        Decision::Ban {
            reason,
            delete_message: Some(m),
        } => {
            assert_eq!(reason.kind, ViolationKind::Content);
            assert_eq!(reason.matched_keyword.as_deref(), Some("Word1"));
            assert_eq!((m.channel_id, m.message_id), (10, 100));
        }
        other => panic!("expected content ban, got {other:?}"),
    }
}

/* --------- pełny przebieg przez AppContext --------- */

fn settings() -> Settings {
    let mut s = Settings::default();
    s.env = "test".into();
    s.metrics.enabled = false;
    s.moderation.banned_message_keywords = vec!["Word1".into()];
    s
}

#[tokio::test(start_paused = true)]
async fn content_violation_deletes_bans_and_hides_keyword_from_dm() {
    let exec = Arc::new(MockExecutor::default());
    let app = AppContext::new_testing(settings(), exec.clone(), Arc::new(MockProvider::default()));

    let d = app.handle_message(&message(42, "free WORD1 giveaway")).await;
    assert!(matches!(d, Decision::Ban { .. }));

    let calls = exec.calls().await;
    let del = calls
        .iter()
        .position(|c| *c == Call::Delete { channel: 10, message: 100 })
        .expect("offending message deleted");
    let ban = calls
        .iter()
        .position(|c| *c == Call::Ban { user: 42 })
        .expect("user banned");
    assert!(del < ban);

    let dms = exec.dms().await;
    assert_eq!(dms.len(), 1);
    assert!(!dms[0].to_lowercase().contains("word1"));
}

#[tokio::test(start_paused = true)]
async fn spam_timeout_posts_and_removes_notice() {
    let exec = Arc::new(MockExecutor::default());
    let app = AppContext::new_testing(settings(), exec.clone(), Arc::new(MockProvider::default()));

    for _ in 0..4 {
        app.handle_message(&message(5, "same")).await;
    }
    let calls = exec.calls().await;
    assert!(calls.contains(&Call::Timeout { user: 5, secs: 1800 }));
    assert!(calls.iter().any(|c| matches!(c, Call::Say { channel: 10, .. })));
    assert!(!calls.iter().any(|c| matches!(c, Call::Ban { .. } | Call::Kick { .. })));

    tokio::time::sleep(Duration::from_secs(301)).await;
    assert!(exec
        .calls()
        .await
        .contains(&Call::Delete { channel: 10, message: 900_010 }));
}
