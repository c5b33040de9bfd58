use std::time::Duration;

/// Global transition forced while the overlay is on program.
pub const CUT_TRANSITION: &str = "Cut";
/// Hard ceiling on the playback hold when the media never reports an end.
pub const END_TIMEOUT: Duration = Duration::from_secs(15);
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Pause between stopping and restarting the clip.
pub const PRE_RESTART_DELAY: Duration = Duration::from_millis(20);

/// Names and timings for one cut. Defaults match the production scene collection.
#[derive(Debug, Clone, PartialEq)]
pub struct CutPlan {
    pub overlay_scene: String,
    pub clip_input: String,
    /// Source inside the overlay scene that shows the previous program underneath the clip.
    pub background_source: String,
    /// Source-clone input pointed at the scene being cut away from.
    pub clone_input: String,
    /// Scene that only wraps the clone input; when it is on program the clone's own target is
    /// the scene to clone.
    pub wrapper_scene: String,
    pub hide_delay: Duration,
    pub fallback_duration: Duration,
    pub preload: Duration,
    pub force_cut: bool,
    pub end_timeout: Duration,
    pub poll_interval: Duration,
    pub pre_restart_delay: Duration,
}

impl Default for CutPlan {
    fn default() -> Self {
        Self {
            overlay_scene: "itstinks".into(),
            clip_input: "it_stinks_clip".into(),
            background_source: "PreviousScene".into(),
            clone_input: "PrevSceneClone".into(),
            wrapper_scene: "PreviousScene".into(),
            hide_delay: Duration::from_millis(2700),
            fallback_duration: Duration::from_millis(7500),
            preload: Duration::from_millis(30),
            force_cut: true,
            end_timeout: END_TIMEOUT,
            poll_interval: POLL_INTERVAL,
            pre_restart_delay: PRE_RESTART_DELAY,
        }
    }
}
