//! Compensating actions accumulated by a cut and replayed when it ends.

use client_core::{ObsClient, Requests};
use serde_json::json;
use shared::domain::{SceneItemRef, TransitionOverride, TransitionSnapshot};
use tracing::{info, warn};

use crate::best_effort::best_effort;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideSnapshot {
    pub scene: String,
    pub value: TransitionOverride,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackAction {
    /// Switch back if program is still on the overlay.
    ReturnToScene {
        overlay_scene: String,
        return_scene: String,
    },
    RestoreOverrides {
        overlay: OverrideSnapshot,
        origin: OverrideSnapshot,
    },
    RestoreTransition(TransitionSnapshot),
    RestoreCloneTarget {
        input: String,
        clone: String,
    },
    ShowItem(SceneItemRef),
}

impl RollbackAction {
    /// Position in the unwind sequence.
    fn rank(&self) -> u8 {
        match self {
            Self::ReturnToScene { .. } => 0,
            Self::RestoreOverrides { .. } => 1,
            Self::RestoreTransition(_) => 2,
            Self::RestoreCloneTarget { .. } => 3,
            Self::ShowItem(_) => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnwindReport {
    pub steps: usize,
    pub failures: usize,
}

impl UnwindReport {
    fn step(&mut self, ok: bool) {
        self.steps += 1;
        if !ok {
            self.failures += 1;
        }
    }
}

#[derive(Debug, Default)]
pub struct Rollback {
    actions: Vec<RollbackAction>,
    on_overlay: bool,
}

impl Rollback {
    pub fn record(&mut self, action: RollbackAction) {
        self.actions.push(action);
    }

    /// Local belief about program, consulted when the remote cannot be asked.
    pub fn set_on_overlay(&mut self, on_overlay: bool) {
        self.on_overlay = on_overlay;
    }

    /// Runs every recorded action in rank order. Each step is attempted regardless of how the
    /// previous ones went.
    pub async fn unwind(mut self, client: &ObsClient) -> UnwindReport {
        self.actions.sort_by_key(RollbackAction::rank);
        let mut report = UnwindReport::default();
        for action in &self.actions {
            self.apply(client, action, &mut report).await;
        }
        if report.failures > 0 {
            warn!(
                steps = report.steps,
                failures = report.failures,
                "rollback: some state could not be restored"
            );
        }
        report
    }

    async fn apply(&self, client: &ObsClient, action: &RollbackAction, report: &mut UnwindReport) {
        match action {
            RollbackAction::ReturnToScene {
                overlay_scene,
                return_scene,
            } => {
                let current = best_effort(
                    "read program scene",
                    client
                        .tagged("getProgramSceneFinally")
                        .current_program_scene(),
                )
                .await;
                let on_overlay = match current {
                    Some(scene) => &scene == overlay_scene,
                    None => self.on_overlay,
                };
                if !on_overlay {
                    return;
                }
                let ok = best_effort(
                    "emergency return",
                    client
                        .tagged("emergencyBack")
                        .set_current_program_scene(return_scene),
                )
                .await
                .is_some();
                if ok {
                    warn!(scene = %return_scene, "rollback: emergency return");
                }
                report.step(ok);
            }
            RollbackAction::RestoreOverrides { overlay, origin } => {
                let mut restored = true;
                for (snapshot, tag) in [(overlay, "rstOvOverlay"), (origin, "rstOvFrom")] {
                    let ok = best_effort(
                        "restore transition override",
                        client
                            .tagged(tag)
                            .set_scene_transition_override(&snapshot.scene, &snapshot.value),
                    )
                    .await
                    .is_some();
                    report.step(ok);
                    restored &= ok;
                }
                if restored {
                    info!(
                        origin = %origin.scene,
                        overlay = %overlay.scene,
                        "rollback: transition overrides restored"
                    );
                }
            }
            RollbackAction::RestoreTransition(snapshot) => {
                if let Some(name) = &snapshot.name {
                    let ok = best_effort(
                        "restore transition",
                        client.tagged("restoreTrans").set_current_scene_transition(name),
                    )
                    .await
                    .is_some();
                    report.step(ok);
                }
                if let Some(duration_ms) = snapshot.duration_ms {
                    let ok = best_effort(
                        "restore transition duration",
                        client
                            .tagged("restoreDur")
                            .set_current_scene_transition_duration(duration_ms),
                    )
                    .await
                    .is_some();
                    report.step(ok);
                }
            }
            RollbackAction::RestoreCloneTarget { input, clone } => {
                let ok = best_effort(
                    "restore clone target",
                    client
                        .tagged("restoreCloneTarget")
                        .set_input_settings(input, json!({ "clone": clone }), true),
                )
                .await
                .is_some();
                report.step(ok);
            }
            RollbackAction::ShowItem(item) => {
                let ok = best_effort(
                    "restore item visibility",
                    client
                        .tagged("finallyResetPrevVisible")
                        .set_scene_item_enabled(&item.scene, item.item_id, true),
                )
                .await
                .is_some();
                report.step(ok);
            }
        }
    }
}
