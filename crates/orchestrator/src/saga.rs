//! The cut itself: overlay on, clip plays, overlay off, state restored.

use std::{sync::Arc, time::Duration};

use client_core::{ClientError, ClientResult, ObsClient, Requests};
use serde_json::{json, Value};
use shared::domain::{MediaAction, SceneItemRef, TransitionOverride, TransitionSnapshot};
use tokio::{
    sync::Mutex,
    time::{sleep, Instant},
};
use tracing::{debug, info, warn};

use crate::{
    best_effort::best_effort,
    plan::{CutPlan, CUT_TRANSITION},
    rollback::{OverrideSnapshot, Rollback, RollbackAction},
    watcher::{self, HoldTimings},
    SagaError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutOutcome {
    Completed,
    /// Program was already on the overlay scene; nothing was touched.
    AlreadyOnOverlay,
}

/// One overlay cut against one OBS connection. A saga runs at most once at a time.
pub struct CutSaga {
    client: Arc<ObsClient>,
    plan: CutPlan,
    running: Mutex<()>,
}

impl CutSaga {
    pub fn new(client: Arc<ObsClient>, plan: CutPlan) -> Self {
        Self {
            client,
            plan,
            running: Mutex::new(()),
        }
    }

    /// Performs the cut. Every temporary change is rolled back before this returns, including
    /// when it returns an error.
    pub async fn run(&self) -> Result<CutOutcome, SagaError> {
        let _running = self
            .running
            .try_lock()
            .map_err(|_| SagaError::AlreadyRunning)?;
        let client = self.client.as_ref();
        let plan = &self.plan;

        let return_scene = client.tagged("getProgramScene").current_program_scene().await?;
        if return_scene == plan.overlay_scene {
            warn!(
                scene = %plan.overlay_scene,
                "cut: already on the overlay scene, refusing to cut into itself"
            );
            return Ok(CutOutcome::AlreadyOnOverlay);
        }
        info!(scene = %return_scene, "cut: return program scene");

        let clone_target = self.resolve_clone_target(&return_scene).await;

        let mut rollback = Rollback::default();
        rollback.record(RollbackAction::ReturnToScene {
            overlay_scene: plan.overlay_scene.clone(),
            return_scene: return_scene.clone(),
        });

        let result = self
            .perform(&return_scene, &clone_target, &mut rollback)
            .await;
        rollback.unwind(client).await;

        match result {
            Ok(()) => Ok(CutOutcome::Completed),
            Err(err) => {
                warn!(error = %err, "cut: aborted");
                Err(err.into())
            }
        }
    }

    /// On the wrapper scene the clone input already mirrors the real scene; keep pointing at it.
    async fn resolve_clone_target(&self, return_scene: &str) -> String {
        let plan = &self.plan;
        if return_scene != plan.wrapper_scene {
            return return_scene.to_string();
        }
        let settings = best_effort(
            "resolve wrapper clone target",
            self.client.tagged("getCloneSettings").input_settings(&plan.clone_input),
        )
        .await;
        match settings.as_ref().and_then(|s| s.get("clone")) {
            Some(Value::String(target)) if !target.is_empty() && *target != plan.wrapper_scene => {
                info!(target = %target, "cut: on wrapper scene, using its clone target");
                target.clone()
            }
            _ => return_scene.to_string(),
        }
    }

    async fn perform(
        &self,
        return_scene: &str,
        clone_target: &str,
        rollback: &mut Rollback,
    ) -> ClientResult<()> {
        let client = self.client.as_ref();
        let plan = &self.plan;

        self.suspend_overrides(return_scene, rollback).await;
        if plan.force_cut {
            self.force_cut(rollback).await;
        }

        if let Some(previous) = self.snapshot_clone_target().await {
            if previous != clone_target {
                rollback.record(RollbackAction::RestoreCloneTarget {
                    input: plan.clone_input.clone(),
                    clone: previous,
                });
            }
        }
        client
            .tagged("setCloneTarget")
            .set_input_settings(&plan.clone_input, json!({ "clone": clone_target }), true)
            .await?;
        info!(input = %plan.clone_input, target = %clone_target, "cut: clone target set");

        let clip = SceneItemRef::new(
            plan.overlay_scene.clone(),
            client
                .tagged("getClipItemId")
                .scene_item_id(&plan.overlay_scene, &plan.clip_input)
                .await?,
        );
        let background = SceneItemRef::new(
            plan.overlay_scene.clone(),
            client
                .tagged("getPrevItemId")
                .scene_item_id(&plan.overlay_scene, &plan.background_source)
                .await?,
        );
        rollback.record(RollbackAction::ShowItem(background.clone()));

        client
            .tagged("enablePrevAtStart")
            .set_scene_item_enabled(&background.scene, background.item_id, true)
            .await?;
        client
            .tagged("enableClipAtStart")
            .set_scene_item_enabled(&clip.scene, clip.item_id, true)
            .await?;

        // Preload: restart the clip while the overlay is still off program.
        best_effort(
            "stop clip",
            client
                .tagged("stopClipPre")
                .trigger_media_input_action(&plan.clip_input, MediaAction::Stop),
        )
        .await;
        sleep(plan.pre_restart_delay).await;
        let restarted_at = Instant::now();
        client
            .tagged("restartClipPre")
            .trigger_media_input_action(&plan.clip_input, MediaAction::Restart)
            .await?;
        if !plan.preload.is_zero() {
            sleep(plan.preload).await;
        }

        client
            .tagged("goOverlay")
            .set_current_program_scene(&plan.overlay_scene)
            .await?;
        rollback.set_on_overlay(true);
        info!(scene = %plan.overlay_scene, "cut: switched to overlay");

        let timings = self.hold_timings(restarted_at.elapsed());
        watcher::hold(client, &background, &plan.clip_input, timings).await;

        best_effort(
            "hide clip",
            client
                .tagged("disableClipEnd")
                .set_scene_item_enabled(&clip.scene, clip.item_id, false),
        )
        .await;

        client
            .tagged("goBack")
            .set_current_program_scene(return_scene)
            .await?;
        rollback.set_on_overlay(false);
        info!(scene = %return_scene, "cut: returned");

        best_effort(
            "re-show background",
            client
                .tagged("resetPrevVisible")
                .set_scene_item_enabled(&background.scene, background.item_id, true),
        )
        .await;
        Ok(())
    }

    /// Clears both scenes' transition overrides so the global transition applies. The restore is
    /// registered once both snapshots exist, before anything is cleared.
    async fn suspend_overrides(&self, return_scene: &str, rollback: &mut Rollback) {
        let client = self.client.as_ref();
        let overlay_scene = self.plan.overlay_scene.as_str();

        let Some(origin) = best_effort(
            "snapshot origin override",
            client
                .tagged("getOvFrom")
                .scene_transition_override(return_scene),
        )
        .await
        else {
            return;
        };
        let Some(overlay) = best_effort(
            "snapshot overlay override",
            client
                .tagged("getOvOverlay")
                .scene_transition_override(overlay_scene),
        )
        .await
        else {
            return;
        };
        rollback.record(RollbackAction::RestoreOverrides {
            overlay: OverrideSnapshot {
                scene: overlay_scene.to_string(),
                value: overlay,
            },
            origin: OverrideSnapshot {
                scene: return_scene.to_string(),
                value: origin,
            },
        });

        for (scene, tag) in [(return_scene, "clrOvFrom"), (overlay_scene, "clrOvOverlay")] {
            let cleared = best_effort(
                "clear override",
                client
                    .tagged(tag)
                    .set_scene_transition_override(scene, &TransitionOverride::cleared()),
            )
            .await;
            if cleared.is_none() {
                return;
            }
        }
        info!(
            origin = %return_scene,
            overlay = %overlay_scene,
            "cut: transition overrides cleared"
        );
    }

    /// Swaps the global transition for an instant cut. Nothing is forced unless the current
    /// transition could be captured first.
    async fn force_cut(&self, rollback: &mut Rollback) {
        let client = self.client.as_ref();
        let snapshot = best_effort("snapshot transition", async {
            Ok::<_, ClientError>(TransitionSnapshot {
                name: client.tagged("getTrans").current_scene_transition().await?,
                duration_ms: client
                    .tagged("getTransDur")
                    .current_scene_transition_duration()
                    .await?,
            })
        })
        .await;
        let Some(snapshot) = snapshot else {
            return;
        };
        if !snapshot.is_empty() {
            rollback.record(RollbackAction::RestoreTransition(snapshot));
        }

        best_effort(
            "force cut transition",
            client.tagged("setCut").set_current_scene_transition(CUT_TRANSITION),
        )
        .await;
        best_effort(
            "force cut duration",
            client
                .tagged("setCutDur")
                .set_current_scene_transition_duration(0),
        )
        .await;
        debug!("cut: instant transition forced");
    }

    async fn snapshot_clone_target(&self) -> Option<String> {
        let settings = best_effort(
            "snapshot clone target",
            self.client
                .tagged("getCloneTarget")
                .input_settings(&self.plan.clone_input),
        )
        .await?;
        match settings.get("clone") {
            Some(Value::String(previous)) if !previous.is_empty() => Some(previous.clone()),
            _ => None,
        }
    }

    /// The hide offset counts from the clip restart, so time already spent preloading is
    /// taken off it.
    fn hold_timings(&self, since_restart: Duration) -> HoldTimings {
        HoldTimings {
            hide_delay: self.plan.hide_delay.saturating_sub(since_restart),
            fallback: self.plan.fallback_duration,
            end_timeout: self.plan.end_timeout,
            poll_interval: self.plan.poll_interval,
        }
    }
}

#[cfg(test)]
#[path = "tests/saga_tests.rs"]
mod tests;
