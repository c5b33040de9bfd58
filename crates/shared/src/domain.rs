use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(SceneItemId);

/// A located item inside a scene, resolved once and reused for every visibility toggle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SceneItemRef {
    pub scene: String,
    pub item_id: SceneItemId,
}

impl SceneItemRef {
    pub fn new(scene: impl Into<String>, item_id: SceneItemId) -> Self {
        Self {
            scene: scene.into(),
            item_id,
        }
    }
}

/// Per-scene transition override. Both fields absent means "no override".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOverride {
    pub name: Option<String>,
    pub duration_ms: Option<i64>,
}

impl TransitionOverride {
    pub fn cleared() -> Self {
        Self::default()
    }
}

/// The global active transition as it was before the run forced an instant cut.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionSnapshot {
    pub name: Option<String>,
    pub duration_ms: Option<i64>,
}

impl TransitionSnapshot {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.duration_ms.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaStatus {
    pub state: Option<String>,
    pub cursor_ms: Option<i64>,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaAction {
    Stop,
    Restart,
}

impl MediaAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stop => "OBS_WEBSOCKET_MEDIA_INPUT_ACTION_STOP",
            Self::Restart => "OBS_WEBSOCKET_MEDIA_INPUT_ACTION_RESTART",
        }
    }
}
