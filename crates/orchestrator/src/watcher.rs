//! Bounded wait for the overlay clip to finish playing.
//!
//! The hold polls the clip's media status and also hides the background layer once, at a fixed
//! offset into playback. It always lasts at least the fallback duration plus a small pad; the
//! remote "ended" signal is tracked and reported but never shortens the hold.

use std::time::Duration;

use client_core::{ObsClient, Requests};
use shared::domain::{MediaStatus, SceneItemRef};
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::best_effort::best_effort;

/// Media states that mean "still playing", in both the current and the legacy naming.
pub const ACTIVE_MEDIA_STATES: [&str; 6] = [
    "OBS_WEBSOCKET_MEDIA_INPUT_STATE_OPENING",
    "OBS_WEBSOCKET_MEDIA_INPUT_STATE_BUFFERING",
    "OBS_WEBSOCKET_MEDIA_INPUT_STATE_PLAYING",
    "OBS_MEDIA_STATE_OPENING",
    "OBS_MEDIA_STATE_BUFFERING",
    "OBS_MEDIA_STATE_PLAYING",
];

const FALLBACK_PAD: Duration = Duration::from_millis(150);
const CURSOR_END_TOLERANCE_MS: i64 = 50;

pub fn is_active(state: &str) -> bool {
    ACTIVE_MEDIA_STATES.contains(&state)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldOutcome {
    /// Fallback floor reached after the media reported its end.
    RemoteEnded,
    /// Fallback floor reached without any end signal.
    FallbackFloor,
    /// Hard ceiling. Never reached first while the ceiling is at least the floor.
    Ceiling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldTimings {
    /// Offset from the start of the hold at which the background is hidden.
    pub hide_delay: Duration,
    pub fallback: Duration,
    pub end_timeout: Duration,
    pub poll_interval: Duration,
}

impl HoldTimings {
    pub fn floor(&self) -> Duration {
        self.fallback + FALLBACK_PAD
    }

    pub fn ceiling(&self) -> Duration {
        self.floor().max(self.end_timeout)
    }
}

/// Progress through one hold. Elapsed time is supplied per tick by the caller.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WatchState {
    last_state: Option<String>,
    seen_active: bool,
    background_hidden: bool,
}

impl WatchState {
    pub fn should_hide(&self, elapsed: Duration, timings: &HoldTimings) -> bool {
        !self.background_hidden && elapsed >= timings.hide_delay
    }

    /// Marked even when hiding failed; the hide is attempted once.
    pub fn mark_hidden(&mut self) {
        self.background_hidden = true;
    }

    pub fn background_hidden(&self) -> bool {
        self.background_hidden
    }

    pub fn seen_active(&self) -> bool {
        self.seen_active
    }

    /// Records a status sample. Returns whether the media state changed since the last sample.
    pub fn observe(&mut self, status: &MediaStatus) -> bool {
        if status.state.as_deref().is_some_and(is_active) {
            self.seen_active = true;
        }
        if status.state == self.last_state {
            return false;
        }
        self.last_state = status.state.clone();
        true
    }

    pub fn ended_by_remote(&self, status: &MediaStatus) -> bool {
        let left_active = self.seen_active
            && status
                .state
                .as_deref()
                .is_some_and(|state| !is_active(state));
        let cursor_at_end = match (status.cursor_ms, status.duration_ms) {
            (Some(cursor), Some(duration)) if duration > 0 => {
                cursor >= duration - CURSOR_END_TOLERANCE_MS
            }
            _ => false,
        };
        left_active || cursor_at_end
    }

    pub fn decide(
        &self,
        elapsed: Duration,
        ended: bool,
        timings: &HoldTimings,
    ) -> Option<HoldOutcome> {
        if ended && elapsed >= timings.floor() {
            return Some(HoldOutcome::RemoteEnded);
        }
        if elapsed >= timings.floor() {
            return Some(HoldOutcome::FallbackFloor);
        }
        if elapsed >= timings.ceiling() {
            return Some(HoldOutcome::Ceiling);
        }
        None
    }
}

/// Holds the overlay on program while the clip plays. Never fails: status queries and the
/// background hide are best-effort.
pub async fn hold(
    client: &ObsClient,
    background: &SceneItemRef,
    clip_input: &str,
    timings: HoldTimings,
) -> HoldOutcome {
    let started = Instant::now();
    let mut state = WatchState::default();

    loop {
        let elapsed = started.elapsed();

        if state.should_hide(elapsed, &timings) {
            let hidden = best_effort(
                "hide background",
                client
                    .tagged("hidePrev")
                    .set_scene_item_enabled(&background.scene, background.item_id, false),
            )
            .await;
            if hidden.is_some() {
                info!(
                    scene = %background.scene,
                    item_id = background.item_id.0,
                    offset_ms = timings.hide_delay.as_millis() as u64,
                    "watch: background hidden"
                );
            }
            state.mark_hidden();
        }

        let status = best_effort(
            "media status",
            client.tagged("getMedia").media_input_status(clip_input),
        )
        .await
            .unwrap_or_default();
        if state.observe(&status) {
            debug!(
                media_state = ?status.state,
                cursor_ms = ?status.cursor_ms,
                duration_ms = ?status.duration_ms,
                "watch: media state changed"
            );
        }

        let ended = state.ended_by_remote(&status);
        if let Some(outcome) = state.decide(elapsed, ended, &timings) {
            info!(
                ?outcome,
                elapsed_ms = elapsed.as_millis() as u64,
                "watch: hold finished"
            );
            return outcome;
        }

        sleep(timings.poll_interval).await;
    }
}

#[cfg(test)]
#[path = "tests/watcher_tests.rs"]
mod tests;
