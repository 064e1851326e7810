//! Countdown Notifier Integration Tests
//!
//! Tests for tick counts, completion signals and the missing-identifier
//! failure.

use std::sync::Arc;
use std::time::{Duration, Instant};

use taskchain::adapters::MemoryNotifications;
use taskchain::core::{CountdownNotifier, Dispatcher, Mailbox, NotifierError, MISSING_ID};
use taskchain::domain::{EventType, Journal, NotifierProfile, NotifierState};

struct Fixture {
    tray: Arc<MemoryNotifications>,
    journal: Journal,
    notifier: CountdownNotifier,
}

fn fixture(profile: NotifierProfile, tick: Duration) -> Fixture {
    let dispatcher = Dispatcher::spawn("countdown-it").unwrap();
    let tray = Arc::new(MemoryNotifications::new());
    let journal = Journal::new();
    let notifier = CountdownNotifier::new(
        profile,
        tick,
        tray.clone(),
        Mailbox::new(dispatcher),
        journal.clone(),
    );
    Fixture {
        tray,
        journal,
        notifier,
    }
}

#[tokio::test]
async fn test_primary_emits_eleven_updates_then_completes() {
    let f = fixture(NotifierProfile::primary(), Duration::from_millis(1));

    let signal = f
        .notifier
        .start(Some("001".to_string()))
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(signal.id, "001");
    assert_eq!(f.tray.progress_values(101), vec![10, 9, 8, 7, 6, 5, 4, 3, 2, 1, 0]);
    assert_eq!(f.journal.subjects(EventType::NotifierTick).len(), 11);
    assert_eq!(f.journal.subjects(EventType::NotifierCompleted), vec!["001"]);

    let last_tick = f
        .journal
        .events()
        .iter()
        .rposition(|e| e.event_type == EventType::NotifierTick)
        .unwrap();
    let completed = f.journal.position(EventType::NotifierCompleted, "001").unwrap();
    assert!(last_tick < completed);
}

#[tokio::test]
async fn test_secondary_emits_six_updates_then_completes() {
    let f = fixture(NotifierProfile::secondary(), Duration::from_millis(1));

    let signal = f
        .notifier
        .start(Some("002".to_string()))
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(signal.id, "002");
    assert_eq!(f.tray.progress_values(102), vec![5, 4, 3, 2, 1, 0]);

    let texts: Vec<String> = f
        .tray
        .history()
        .into_iter()
        .filter(|n| n.is_progress())
        .map(|n| n.text)
        .collect();
    assert_eq!(texts.first().unwrap(), "5 seconds remaining...");
    assert_eq!(texts.last().unwrap(), "0 seconds remaining...");
}

#[tokio::test]
async fn test_completion_is_published_once_to_mailbox() {
    let f = fixture(NotifierProfile::secondary(), Duration::from_millis(1));
    let completion = f.notifier.completion().clone();

    f.notifier
        .start(Some("002".to_string()))
        .unwrap()
        .wait()
        .await
        .unwrap();
    completion.dispatcher().flush().await.unwrap();

    assert_eq!(completion.value().unwrap().id, "002");
    assert_eq!(completion.version(), 1);
}

#[tokio::test]
async fn test_one_tick_sleep_precedes_every_update() {
    let f = fixture(NotifierProfile::secondary(), Duration::from_millis(10));

    let start = Instant::now();
    f.notifier
        .start(Some("002".to_string()))
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert!(start.elapsed() >= Duration::from_millis(60));
}

#[tokio::test]
async fn test_notification_is_replaced_then_removed() {
    let f = fixture(NotifierProfile::primary(), Duration::from_millis(1));

    f.notifier
        .start(Some("001".to_string()))
        .unwrap()
        .wait()
        .await
        .unwrap();

    let history = f.tray.history();
    assert_eq!(history.len(), 12);
    assert!(!history[0].is_progress());
    assert_eq!(history[0].text, "A background task is currently active.");
    assert!(history.iter().all(|n| n.notification_id == 101));
    assert!(history[1..].iter().all(|n| n.silent));

    assert!(f.tray.active(101).is_none());
    assert_eq!(f.tray.cancelled(), vec![101]);
}

#[tokio::test]
async fn test_state_reaches_terminal_completed() {
    let f = fixture(NotifierProfile::secondary(), Duration::from_millis(1));

    let handle = f.notifier.start(Some("002".to_string())).unwrap();
    let mut states = handle.subscribe();
    let completed = states.wait_for(|s| s.is_completed()).await.unwrap().clone();

    assert_eq!(
        completed,
        NotifierState::Completed {
            id: "002".to_string()
        }
    );
    assert!(handle.wait().await.is_ok());
}

#[tokio::test]
async fn test_missing_identifier_is_fatal() {
    let f = fixture(NotifierProfile::primary(), Duration::from_millis(1));
    let completion = f.notifier.completion().clone();

    let err = f.notifier.start(None).unwrap().wait().await.unwrap_err();

    assert!(matches!(
        err,
        NotifierError::Aborted { ref reason, .. } if reason == MISSING_ID
    ));
    assert!(f.tray.history().is_empty());
    assert!(f.journal.subjects(EventType::NotifierTick).is_empty());
    assert_eq!(f.journal.subjects(EventType::NotifierAborted), vec!["primary"]);

    completion.dispatcher().flush().await.unwrap();
    assert!(completion.value().is_none());
}

#[tokio::test]
async fn test_concurrent_notifiers_keep_separate_sessions() {
    let dispatcher = Dispatcher::spawn("countdown-it").unwrap();
    let tray = Arc::new(MemoryNotifications::new());
    let journal = Journal::new();
    let make = |profile| {
        CountdownNotifier::new(
            profile,
            Duration::from_millis(2),
            tray.clone(),
            Mailbox::new(dispatcher.clone()),
            journal.clone(),
        )
    };
    let primary = make(NotifierProfile::primary());
    let secondary = make(NotifierProfile::secondary());

    let a = primary.start(Some("001".to_string())).unwrap();
    let b = secondary.start(Some("002".to_string())).unwrap();
    let (a, b) = tokio::join!(a.wait(), b.wait());

    assert_eq!(a.unwrap().id, "001");
    assert_eq!(b.unwrap().id, "002");
    assert_eq!(tray.progress_values(101).len(), 11);
    assert_eq!(tray.progress_values(102).len(), 6);
}
