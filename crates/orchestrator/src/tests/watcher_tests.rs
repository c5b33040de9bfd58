use super::*;
use client_core::fake::FakeObs;
use shared::domain::SceneItemId;

use crate::plan::{END_TIMEOUT, POLL_INTERVAL};

const BACKGROUND_ID: i64 = 12;

fn background() -> SceneItemRef {
    SceneItemRef::new("itstinks", SceneItemId(BACKGROUND_ID))
}

fn timings(hide_ms: u64, fallback_ms: u64) -> HoldTimings {
    HoldTimings {
        hide_delay: Duration::from_millis(hide_ms),
        fallback: Duration::from_millis(fallback_ms),
        end_timeout: END_TIMEOUT,
        poll_interval: POLL_INTERVAL,
    }
}

fn status(state: &str) -> MediaStatus {
    MediaStatus {
        state: Some(state.to_string()),
        cursor_ms: None,
        duration_ms: None,
    }
}

fn plays_until(end: Duration) -> impl Fn(Duration) -> MediaStatus + Send + Sync + 'static {
    move |elapsed| {
        if elapsed < end {
            status("OBS_MEDIA_STATE_PLAYING")
        } else {
            status("OBS_MEDIA_STATE_ENDED")
        }
    }
}

fn hide_calls(fake: &FakeObs) -> Vec<client_core::fake::RecordedCall> {
    fake.calls_of("SetSceneItemEnabled")
        .into_iter()
        .filter(|call| call.field("sceneItemEnabled") == Some(&serde_json::json!(false)))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn hides_once_after_the_delay_and_holds_until_the_fallback_floor() {
    let fake = FakeObs::new("itstinks")
        .with_scene_item("itstinks", "PreviousScene", BACKGROUND_ID, true)
        .with_media_script(plays_until(Duration::from_millis(500)));
    let client = fake.client(None);

    let started = Instant::now();
    let outcome = hold(&client, &background(), "it_stinks_clip", timings(300, 1000)).await;
    let held = started.elapsed();

    let hides = hide_calls(&fake);
    assert_eq!(hides.len(), 1);
    assert!(hides[0].at >= Duration::from_millis(300), "hid at {:?}", hides[0].at);
    assert!(hides[0].at < Duration::from_millis(400), "hid at {:?}", hides[0].at);
    assert_eq!(fake.item_enabled(BACKGROUND_ID), Some(false));

    assert!(held >= Duration::from_millis(1150), "returned after {held:?}");
    assert!(held < Duration::from_millis(1300), "returned after {held:?}");
    assert_eq!(outcome, HoldOutcome::RemoteEnded);
}

#[tokio::test(start_paused = true)]
async fn without_an_end_signal_the_hold_ends_at_the_floor() {
    let fake = FakeObs::new("itstinks")
        .with_scene_item("itstinks", "PreviousScene", BACKGROUND_ID, true);
    let client = fake.client(None);

    let started = Instant::now();
    let outcome = hold(&client, &background(), "it_stinks_clip", timings(300, 1000)).await;

    assert_eq!(outcome, HoldOutcome::FallbackFloor);
    assert!(started.elapsed() >= Duration::from_millis(1150));
}

#[tokio::test(start_paused = true)]
async fn status_failures_are_swallowed() {
    let fake = FakeObs::new("itstinks")
        .with_scene_item("itstinks", "PreviousScene", BACKGROUND_ID, true)
        .rejecting("GetMediaInputStatus", 604, "The input is not a media input.");
    let client = fake.client(None);

    let outcome = hold(&client, &background(), "it_stinks_clip", timings(0, 200)).await;

    assert_eq!(outcome, HoldOutcome::FallbackFloor);
    assert!(fake.calls_of("GetMediaInputStatus").len() > 1);
    assert_eq!(hide_calls(&fake).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_hide_is_not_retried() {
    let fake = FakeObs::new("itstinks")
        .with_scene_item("itstinks", "PreviousScene", BACKGROUND_ID, true)
        .rejecting("SetSceneItemEnabled", 600, "No scene items were found.");
    let client = fake.client(None);

    hold(&client, &background(), "it_stinks_clip", timings(100, 500)).await;

    assert_eq!(fake.calls_of("SetSceneItemEnabled").len(), 1);
    assert_eq!(fake.item_enabled(BACKGROUND_ID), Some(true));
}

#[tokio::test(start_paused = true)]
async fn hide_delay_longer_than_the_hold_never_hides() {
    let fake = FakeObs::new("itstinks")
        .with_scene_item("itstinks", "PreviousScene", BACKGROUND_ID, true);
    let client = fake.client(None);

    hold(&client, &background(), "it_stinks_clip", timings(5000, 500)).await;

    assert!(fake.calls_of("SetSceneItemEnabled").is_empty());
}

#[test]
fn both_state_vocabularies_count_as_active() {
    assert!(is_active("OBS_MEDIA_STATE_PLAYING"));
    assert!(is_active("OBS_WEBSOCKET_MEDIA_INPUT_STATE_BUFFERING"));
    assert!(!is_active("OBS_MEDIA_STATE_ENDED"));
    assert!(!is_active("OBS_WEBSOCKET_MEDIA_INPUT_STATE_STOPPED"));
}

#[test]
fn leaving_the_active_states_only_counts_after_playback_was_seen() {
    let mut state = WatchState::default();
    let ended = status("OBS_MEDIA_STATE_ENDED");

    assert!(state.observe(&ended));
    assert!(!state.ended_by_remote(&ended));

    assert!(state.observe(&status("OBS_WEBSOCKET_MEDIA_INPUT_STATE_PLAYING")));
    assert!(state.seen_active());
    assert!(state.observe(&ended));
    assert!(state.ended_by_remote(&ended));
    assert!(!state.observe(&ended));
}

#[test]
fn cursor_near_the_duration_counts_as_ended() {
    let state = WatchState::default();
    let near_end = MediaStatus {
        state: Some("OBS_MEDIA_STATE_PLAYING".to_string()),
        cursor_ms: Some(7460),
        duration_ms: Some(7500),
    };
    let mid = MediaStatus {
        cursor_ms: Some(3000),
        ..near_end.clone()
    };
    let unknown_duration = MediaStatus {
        duration_ms: Some(0),
        ..near_end.clone()
    };

    assert!(state.ended_by_remote(&near_end));
    assert!(!state.ended_by_remote(&mid));
    assert!(!state.ended_by_remote(&unknown_duration));
}

#[test]
fn the_floor_dominates_every_exit() {
    let state = WatchState::default();
    let timings = timings(300, 1000);

    assert_eq!(timings.floor(), Duration::from_millis(1150));
    assert_eq!(timings.ceiling(), END_TIMEOUT);
    assert_eq!(state.decide(Duration::from_millis(600), true, &timings), None);
    assert_eq!(
        state.decide(Duration::from_millis(1150), true, &timings),
        Some(HoldOutcome::RemoteEnded)
    );
    assert_eq!(
        state.decide(Duration::from_millis(1150), false, &timings),
        Some(HoldOutcome::FallbackFloor)
    );
    assert_eq!(
        state.decide(Duration::from_secs(20), false, &timings),
        Some(HoldOutcome::FallbackFloor)
    );
}

#[test]
fn ceiling_is_never_below_the_floor() {
    let long = HoldTimings {
        fallback: Duration::from_secs(30),
        ..timings(0, 0)
    };

    assert_eq!(long.ceiling(), long.floor());
}

#[test]
fn hide_is_due_once() {
    let timings = timings(300, 1000);
    let mut state = WatchState::default();

    assert!(!state.should_hide(Duration::from_millis(299), &timings));
    assert!(state.should_hide(Duration::from_millis(300), &timings));
    state.mark_hidden();
    assert!(state.background_hidden());
    assert!(!state.should_hide(Duration::from_millis(900), &timings));
}
