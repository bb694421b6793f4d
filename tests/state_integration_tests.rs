//! Integration tests for RunStateManager with run events
//!
//! These tests verify that the RunStateManager correctly:
//! - Emits run events on mutations
//! - Supports multiple subscribers
//! - Lets exactly one caller claim a run under concurrency
//! - Keeps snapshots consistent while writers are busy

use hps_soak::models::{RunConfig, Scenario};
use hps_soak::{RunEvent, RunPhase, RunStateManager};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use tokio::time::{Duration, timeout};

fn config() -> RunConfig {
    RunConfig {
        scenario: Scenario::HandPlusDepth,
        warmup: Duration::from_secs(5),
        run: Duration::from_secs(60),
        soft_reset_enabled: true,
        soft_reset_interval: Duration::from_secs(10),
        ..RunConfig::default()
    }
}

#[tokio::test]
async fn test_begin_run_emits_reset_and_phase_events() {
    let state = RunStateManager::new();
    let mut rx = state.subscribe();

    state.begin_run(&config()).unwrap();

    let first = timeout(Duration::from_millis(100), rx.recv())
        .await
        .expect("Timeout waiting for event")
        .expect("Channel closed");
    assert_eq!(first, RunEvent::RunReset);

    let second = timeout(Duration::from_millis(100), rx.recv())
        .await
        .expect("Timeout waiting for event")
        .expect("Channel closed");
    assert_eq!(
        second,
        RunEvent::PhaseChanged {
            from: RunPhase::Idle,
            to: RunPhase::Warmup
        }
    );

    let snapshot = state.snapshot();
    assert_eq!(snapshot.scenario, Scenario::HandPlusDepth);
    assert_eq!(snapshot.run_duration, Duration::from_secs(60));
    assert_eq!(snapshot.reset_interval, Some(Duration::from_secs(10)));
}

#[tokio::test]
async fn test_multiple_subscribers_receive_events() {
    let state = RunStateManager::new();
    let mut receivers = vec![state.subscribe(), state.subscribe(), state.subscribe()];

    state.set_phase(RunPhase::Running);

    for rx in &mut receivers {
        let event = timeout(Duration::from_millis(100), rx.recv())
            .await
            .expect("Timeout waiting for event")
            .expect("Channel closed");
        assert_eq!(
            event,
            RunEvent::PhaseChanged {
                from: RunPhase::Idle,
                to: RunPhase::Running
            }
        );
    }
}

#[tokio::test]
async fn test_reset_completed_event_carries_count_and_time() {
    let state = RunStateManager::new();
    state.begin_run(&config()).unwrap();
    let mut rx = state.subscribe();

    let events = state.record_reset(Duration::from_secs(10), Some(Duration::from_secs(20)));

    assert_eq!(
        events,
        vec![RunEvent::ResetCompleted {
            count: 1,
            at: Duration::from_secs(10)
        }]
    );
    assert_eq!(rx.recv().await.unwrap(), events[0]);

    let snapshot = state.snapshot();
    assert_eq!(snapshot.last_reset_at, Some(Duration::from_secs(10)));
    assert_eq!(snapshot.next_reset_at, Some(Duration::from_secs(20)));
}

#[test]
fn test_progress_without_changes_emits_nothing() {
    let state = RunStateManager::new();
    let events = state.set_progress(Duration::from_secs(3), None);
    assert!(events.is_empty());
    assert_eq!(state.snapshot().elapsed, Duration::from_secs(3));
}

#[test]
fn test_second_begin_run_is_rejected_until_release() {
    let state = RunStateManager::new();
    state.begin_run(&config()).unwrap();
    state.set_phase(RunPhase::Resetting);

    assert_eq!(state.begin_run(&config()), Err(RunPhase::Resetting));

    state.release();
    assert!(!state.is_active());
    assert!(state.begin_run(&config()).is_ok());
}

#[test]
fn test_completed_run_can_be_followed_by_a_new_one() {
    let state = RunStateManager::new();
    state.begin_run(&config()).unwrap();
    state.record_reset(Duration::from_secs(10), Some(Duration::from_secs(20)));
    state.set_phase(RunPhase::Completed);

    // Release keeps a completed phase visible
    state.release();
    assert_eq!(state.snapshot().phase, RunPhase::Completed);

    state.begin_run(&config()).unwrap();
    let snapshot = state.snapshot();
    assert_eq!(snapshot.reset_count, 0);
    assert_eq!(snapshot.last_reset_at, None);
    assert_eq!(snapshot.phase, RunPhase::Warmup);
}

#[test]
fn test_concurrent_begin_run_has_one_winner() {
    let state = Arc::new(RunStateManager::new());
    let winners = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let state = Arc::clone(&state);
            let winners = Arc::clone(&winners);
            thread::spawn(move || {
                if state.begin_run(&config()).is_ok() {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(winners.load(Ordering::SeqCst), 1);
    assert_eq!(state.snapshot().phase, RunPhase::Warmup);
}

#[test]
fn test_concurrent_updates_are_not_lost() {
    let state = Arc::new(RunStateManager::new());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let state = Arc::clone(&state);
            thread::spawn(move || {
                for _ in 0..100 {
                    state.update(|s| s.reset_count += 1);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(state.snapshot().reset_count, 800);
}

#[test]
fn test_readers_see_whole_states() {
    let state = Arc::new(RunStateManager::new());

    let writer = {
        let state = Arc::clone(&state);
        thread::spawn(move || {
            for i in 1..=500u64 {
                state.update(|s| {
                    s.elapsed = Duration::from_secs(i);
                    s.next_reset_at = Some(Duration::from_secs(i + 10));
                });
            }
        })
    };

    let reader = {
        let state = Arc::clone(&state);
        thread::spawn(move || {
            for _ in 0..500 {
                let snapshot = state.snapshot();
                if let Some(next) = snapshot.next_reset_at {
                    assert_eq!(next, snapshot.elapsed + Duration::from_secs(10));
                }
            }
        })
    };

    writer.join().unwrap();
    reader.join().unwrap();
}

#[test]
fn test_clones_share_state() {
    let state = RunStateManager::new();
    let clone = state.clone();

    state.set_phase(RunPhase::Running);

    assert_eq!(clone.snapshot().phase, RunPhase::Running);
    assert!(clone.is_active());
}
