//! Typed wrappers over the individual obs-websocket requests the orchestration uses.
//!
//! Payload and response field names follow obs-websocket v5 verbatim.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Map, Value};
use shared::{
    domain::{MediaAction, MediaStatus, SceneItemId, TransitionOverride},
    protocol::RequestResponse,
};

use crate::{ClientError, ClientResult, ObsClient};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrentProgramScene {
    #[serde(default)]
    current_program_scene_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SceneItemIdResponse {
    #[serde(default)]
    scene_item_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransitionResponse {
    #[serde(default)]
    transition_name: Option<String>,
    #[serde(default)]
    transition_duration: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaInputStatus {
    #[serde(default)]
    media_state: Option<String>,
    #[serde(default)]
    media_cursor: Option<Value>,
    #[serde(default)]
    media_duration: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InputSettingsResponse {
    #[serde(default)]
    input_settings: Option<Map<String, Value>>,
}

fn decode<T: DeserializeOwned>(request_type: &str, response: &RequestResponse) -> ClientResult<T> {
    response.data().map_err(|source| ClientError::Decode {
        request_type: request_type.to_string(),
        source,
    })
}

/// Integral milliseconds from a JSON number, accepting floats. Anything else is "unknown".
fn millis(value: Option<&Value>) -> Option<i64> {
    let value = value?;
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|v| v.is_finite()).map(|v| v as i64))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Typed obs-websocket calls. [`ObsClient`] issues them with the default correlation prefix,
/// [`Tagged`] with a caller-chosen one.
#[async_trait]
pub trait Requests: Sync {
    async fn call(
        &self,
        request_type: &str,
        request_data: Option<Value>,
    ) -> ClientResult<RequestResponse>;

    /// Name of the scene currently on program. Missing or empty is a resolution failure.
    async fn current_program_scene(&self) -> ClientResult<String> {
        const REQUEST: &str = "GetCurrentProgramScene";
        let response = self.call(REQUEST, None).await?;
        let body: CurrentProgramScene = decode(REQUEST, &response)?;
        non_empty(body.current_program_scene_name)
            .ok_or_else(|| ClientError::resolution("couldn't determine current program scene name"))
    }

    async fn set_current_program_scene(&self, scene: &str) -> ClientResult<()> {
        self.call("SetCurrentProgramScene", Some(json!({ "sceneName": scene })))
            .await?;
        Ok(())
    }

    async fn scene_item_id(&self, scene: &str, source: &str) -> ClientResult<SceneItemId> {
        const REQUEST: &str = "GetSceneItemId";
        let response = self
            .call(
                REQUEST,
                Some(json!({ "sceneName": scene, "sourceName": source })),
            )
            .await?;
        let body: SceneItemIdResponse = decode(REQUEST, &response)?;
        body.scene_item_id.map(SceneItemId).ok_or_else(|| {
            ClientError::resolution(format!(
                "could not find scene item '{source}' in scene '{scene}'"
            ))
        })
    }

    async fn set_scene_item_enabled(
        &self,
        scene: &str,
        item_id: SceneItemId,
        enabled: bool,
    ) -> ClientResult<()> {
        self.call(
            "SetSceneItemEnabled",
            Some(json!({
                "sceneName": scene,
                "sceneItemId": item_id.0,
                "sceneItemEnabled": enabled,
            })),
        )
        .await?;
        Ok(())
    }

    async fn scene_transition_override(&self, scene: &str) -> ClientResult<TransitionOverride> {
        const REQUEST: &str = "GetSceneSceneTransitionOverride";
        let response = self
            .call(REQUEST, Some(json!({ "sceneName": scene })))
            .await?;
        let body: TransitionResponse = decode(REQUEST, &response)?;
        Ok(TransitionOverride {
            name: non_empty(body.transition_name),
            duration_ms: millis(body.transition_duration.as_ref()),
        })
    }

    /// Sets or, with both fields `None`, clears the override. Nulls are sent explicitly.
    async fn set_scene_transition_override(
        &self,
        scene: &str,
        value: &TransitionOverride,
    ) -> ClientResult<()> {
        self.call(
            "SetSceneSceneTransitionOverride",
            Some(json!({
                "sceneName": scene,
                "transitionName": value.name,
                "transitionDuration": value.duration_ms,
            })),
        )
        .await?;
        Ok(())
    }

    async fn current_scene_transition(&self) -> ClientResult<Option<String>> {
        const REQUEST: &str = "GetCurrentSceneTransition";
        let response = self.call(REQUEST, None).await?;
        let body: TransitionResponse = decode(REQUEST, &response)?;
        Ok(non_empty(body.transition_name))
    }

    async fn set_current_scene_transition(&self, name: &str) -> ClientResult<()> {
        self.call(
            "SetCurrentSceneTransition",
            Some(json!({ "transitionName": name })),
        )
        .await?;
        Ok(())
    }

    async fn current_scene_transition_duration(&self) -> ClientResult<Option<i64>> {
        const REQUEST: &str = "GetCurrentSceneTransitionDuration";
        let response = self.call(REQUEST, None).await?;
        let body: TransitionResponse = decode(REQUEST, &response)?;
        Ok(millis(body.transition_duration.as_ref()))
    }

    async fn set_current_scene_transition_duration(&self, duration_ms: i64) -> ClientResult<()> {
        self.call(
            "SetCurrentSceneTransitionDuration",
            Some(json!({ "transitionDuration": duration_ms })),
        )
        .await?;
        Ok(())
    }

    async fn media_input_status(&self, input: &str) -> ClientResult<MediaStatus> {
        const REQUEST: &str = "GetMediaInputStatus";
        let response = self
            .call(REQUEST, Some(json!({ "inputName": input })))
            .await?;
        let body: MediaInputStatus = decode(REQUEST, &response)?;
        Ok(MediaStatus {
            state: body.media_state,
            cursor_ms: millis(body.media_cursor.as_ref()),
            duration_ms: millis(body.media_duration.as_ref()),
        })
    }

    async fn trigger_media_input_action(
        &self,
        input: &str,
        action: MediaAction,
    ) -> ClientResult<()> {
        self.call(
            "TriggerMediaInputAction",
            Some(json!({ "inputName": input, "mediaAction": action.as_str() })),
        )
        .await?;
        Ok(())
    }

    async fn input_settings(&self, input: &str) -> ClientResult<Map<String, Value>> {
        const REQUEST: &str = "GetInputSettings";
        let response = self
            .call(REQUEST, Some(json!({ "inputName": input })))
            .await?;
        let body: InputSettingsResponse = decode(REQUEST, &response)?;
        Ok(body.input_settings.unwrap_or_default())
    }

    /// With `overlay`, the given settings are merged over the existing ones.
    async fn set_input_settings(
        &self,
        input: &str,
        settings: Value,
        overlay: bool,
    ) -> ClientResult<()> {
        self.call(
            "SetInputSettings",
            Some(json!({
                "inputName": input,
                "inputSettings": settings,
                "overlay": overlay,
            })),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Requests for ObsClient {
    async fn call(
        &self,
        request_type: &str,
        request_data: Option<Value>,
    ) -> ClientResult<RequestResponse> {
        self.request(request_type, request_data).await
    }
}

/// A client view whose correlation ids read `{tag}-{n}`, so server-side logs show the step.
#[derive(Clone, Copy)]
pub struct Tagged<'a> {
    client: &'a ObsClient,
    tag: &'a str,
}

impl ObsClient {
    pub fn tagged<'a>(&'a self, tag: &'a str) -> Tagged<'a> {
        Tagged { client: self, tag }
    }
}

#[async_trait]
impl<'a> Requests for Tagged<'a> {
    async fn call(
        &self,
        request_type: &str,
        request_data: Option<Value>,
    ) -> ClientResult<RequestResponse> {
        self.client
            .request_tagged(request_type, request_data, Some(self.tag))
            .await
    }
}
