//! In-process stand-in for an obs-websocket server.
//!
//! [`FakeObs`] keeps just enough mixer state (program scene, scene items, transition overrides,
//! the global transition, input settings, a scripted media input) to answer the requests in
//! [`crate::requests`], and records every request it sees with a timestamp taken from the tokio
//! clock, so paused-time tests observe virtual time.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use shared::{
    domain::{MediaAction, MediaStatus, SceneItemId, TransitionOverride},
    protocol::{
        AuthenticationChallenge, Envelope, Hello, Identified, Identify, OpCode, Request,
        RequestResponse, RequestStatus,
    },
};
use tokio::time::Instant;

use crate::{
    auth::compute_auth_token, error::ConnectionError, transport::Connector, transport::Transport,
    ObsClient,
};

const RPC_VERSION: u32 = 1;
const CODE_SUCCESS: i64 = 100;
const CODE_UNKNOWN_REQUEST_TYPE: i64 = 204;
const CODE_MISSING_REQUEST_FIELD: i64 = 300;
const CODE_RESOURCE_NOT_FOUND: i64 = 600;
const CODE_INJECTED_FAILURE: i64 = 500;

pub type MediaScript = Box<dyn Fn(Duration) -> MediaStatus + Send + Sync>;

type Rejection = (i64, String);

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub request_type: String,
    pub request_id: String,
    pub request_data: Option<Value>,
    /// Time since the fake was created.
    pub at: Duration,
    pub succeeded: bool,
}

impl RecordedCall {
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.request_data.as_ref()?.get(key)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.field(key)?.as_str()
    }
}

struct FakeAuth {
    password: String,
    challenge: String,
    salt: String,
}

struct FakeState {
    started: Instant,
    media_origin: Instant,
    program_scene: String,
    transition_name: Option<String>,
    transition_duration_ms: Option<i64>,
    overrides: HashMap<String, TransitionOverride>,
    scene_items: HashMap<(String, String), SceneItemId>,
    item_enabled: HashMap<SceneItemId, bool>,
    input_settings: HashMap<String, Map<String, Value>>,
    media_script: Option<MediaScript>,
    auth: Option<FakeAuth>,
    identify_auth: Vec<Option<String>>,
    rejections: HashMap<String, Rejection>,
    fail_everything_after: Option<String>,
    failing_everything: bool,
    noisy: bool,
    noise_seq: u64,
    generation: u64,
    connections: u32,
    calls: Vec<RecordedCall>,
}

#[derive(Clone)]
pub struct FakeObs {
    state: Arc<Mutex<FakeState>>,
}

impl FakeObs {
    pub fn new(program_scene: impl Into<String>) -> Self {
        let now = Instant::now();
        Self {
            state: Arc::new(Mutex::new(FakeState {
                started: now,
                media_origin: now,
                program_scene: program_scene.into(),
                transition_name: Some("Fade".to_string()),
                transition_duration_ms: Some(300),
                overrides: HashMap::new(),
                scene_items: HashMap::new(),
                item_enabled: HashMap::new(),
                input_settings: HashMap::new(),
                media_script: None,
                auth: None,
                identify_auth: Vec::new(),
                rejections: HashMap::new(),
                fail_everything_after: None,
                failing_everything: false,
                noisy: false,
                noise_seq: 0,
                generation: 0,
                connections: 0,
                calls: Vec::new(),
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        lock(&self.state)
    }

    pub fn with_scene_item(self, scene: &str, source: &str, item_id: i64, enabled: bool) -> Self {
        {
            let mut state = self.state();
            let id = SceneItemId(item_id);
            state
                .scene_items
                .insert((scene.to_string(), source.to_string()), id);
            state.item_enabled.insert(id, enabled);
        }
        self
    }

    pub fn with_override(self, scene: &str, name: Option<&str>, duration_ms: Option<i64>) -> Self {
        self.state().overrides.insert(
            scene.to_string(),
            TransitionOverride {
                name: name.map(str::to_string),
                duration_ms,
            },
        );
        self
    }

    pub fn with_transition(self, name: Option<&str>, duration_ms: Option<i64>) -> Self {
        {
            let mut state = self.state();
            state.transition_name = name.map(str::to_string);
            state.transition_duration_ms = duration_ms;
        }
        self
    }

    pub fn with_input_settings(self, input: &str, settings: Value) -> Self {
        let settings = match settings {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self.state()
            .input_settings
            .insert(input.to_string(), settings);
        self
    }

    /// Media status as a function of time since the last restart action (or creation).
    pub fn with_media_script(
        self,
        script: impl Fn(Duration) -> MediaStatus + Send + Sync + 'static,
    ) -> Self {
        self.state().media_script = Some(Box::new(script));
        self
    }

    pub fn with_auth(self, password: &str, challenge: &str, salt: &str) -> Self {
        self.state().auth = Some(FakeAuth {
            password: password.to_string(),
            challenge: challenge.to_string(),
            salt: salt.to_string(),
        });
        self
    }

    /// Every `request_type` request is answered with a failed status.
    pub fn rejecting(self, request_type: &str, code: i64, comment: &str) -> Self {
        self.state()
            .rejections
            .insert(request_type.to_string(), (code, comment.to_string()));
        self
    }

    /// Once one `request_type` request succeeds, every later request fails.
    pub fn failing_everything_after(self, request_type: &str) -> Self {
        self.state().fail_everything_after = Some(request_type.to_string());
        self
    }

    /// Precedes every response with an event frame and a response for an unknown request id.
    pub fn noisy(self) -> Self {
        self.state().noisy = true;
        self
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(FakeConnector {
            state: Arc::clone(&self.state),
        })
    }

    pub fn client(&self, password: Option<&str>) -> ObsClient {
        ObsClient::new(self.connector(), password.map(str::to_string))
    }

    /// Invalidates every open connection, as if the server went away.
    pub fn sever(&self) {
        self.state().generation += 1;
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state().calls.clone()
    }

    pub fn calls_of(&self, request_type: &str) -> Vec<RecordedCall> {
        self.state()
            .calls
            .iter()
            .filter(|call| call.request_type == request_type)
            .cloned()
            .collect()
    }

    pub fn program_scene(&self) -> String {
        self.state().program_scene.clone()
    }

    pub fn item_enabled(&self, item_id: i64) -> Option<bool> {
        self.state().item_enabled.get(&SceneItemId(item_id)).copied()
    }

    pub fn scene_override(&self, scene: &str) -> TransitionOverride {
        self.state()
            .overrides
            .get(scene)
            .cloned()
            .unwrap_or_default()
    }

    pub fn transition(&self) -> (Option<String>, Option<i64>) {
        let state = self.state();
        (state.transition_name.clone(), state.transition_duration_ms)
    }

    pub fn input_settings(&self, input: &str) -> Map<String, Value> {
        self.state()
            .input_settings
            .get(input)
            .cloned()
            .unwrap_or_default()
    }

    pub fn connections(&self) -> u32 {
        self.state().connections
    }

    /// The `authentication` field of every Identify received, in order.
    pub fn identify_auth(&self) -> Vec<Option<String>> {
        self.state().identify_auth.clone()
    }
}

fn lock(state: &Mutex<FakeState>) -> MutexGuard<'_, FakeState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct FakeConnector {
    state: Arc<Mutex<FakeState>>,
}

#[async_trait]
impl Connector for FakeConnector {
    async fn open(&self) -> Result<Box<dyn Transport>, ConnectionError> {
        let (generation, hello) = {
            let mut state = lock(&self.state);
            state.connections += 1;
            let hello = Hello {
                obs_web_socket_version: Some("5.0.0-fake".to_string()),
                rpc_version: RPC_VERSION,
                authentication: state.auth.as_ref().map(|auth| AuthenticationChallenge {
                    challenge: auth.challenge.clone(),
                    salt: auth.salt.clone(),
                }),
            };
            (state.generation, hello)
        };
        let mut queue = VecDeque::new();
        queue.push_back(Envelope::new(OpCode::Hello, &hello)?);
        Ok(Box::new(FakeTransport {
            state: Arc::clone(&self.state),
            generation,
            queue,
            open: true,
        }))
    }

    fn endpoint(&self) -> &str {
        "fake://obs"
    }
}

struct FakeTransport {
    state: Arc<Mutex<FakeState>>,
    generation: u64,
    queue: VecDeque<Envelope>,
    open: bool,
}

impl FakeTransport {
    fn live(&self) -> bool {
        self.open && lock(&self.state).generation == self.generation
    }

    fn identify(&mut self, identify: Identify) -> Result<(), ConnectionError> {
        let accepted = {
            let mut state = lock(&self.state);
            state.identify_auth.push(identify.authentication.clone());
            match &state.auth {
                Some(auth) => {
                    let expected = compute_auth_token(&auth.password, &auth.challenge, &auth.salt);
                    identify.authentication.as_deref() == Some(expected.as_str())
                }
                None => true,
            }
        };
        if !accepted {
            // obs-websocket closes with 4009 (authentication failed).
            self.open = false;
            return Ok(());
        }
        self.queue.push_back(Envelope::new(
            OpCode::Identified,
            &Identified {
                negotiated_rpc_version: Some(identify.rpc_version),
            },
        )?);
        Ok(())
    }

    fn request(&mut self, request: Request) -> Result<(), ConnectionError> {
        let (response, noise) = {
            let mut state = lock(&self.state);
            let outcome = state.answer(&request);
            let at = state.started.elapsed();
            state.calls.push(RecordedCall {
                request_type: request.request_type.clone(),
                request_id: request.request_id.clone(),
                request_data: request.request_data.clone(),
                at,
                succeeded: outcome.is_ok(),
            });
            let response = response_for(&request, outcome);
            let noise = if state.noisy {
                state.noise_seq += 1;
                Some(noise_frames(&request, state.noise_seq))
            } else {
                None
            };
            (response, noise)
        };
        if let Some(noise) = noise {
            for frame in noise {
                self.queue.push_back(frame?);
            }
        }
        self.queue
            .push_back(Envelope::new(OpCode::RequestResponse, &response)?);
        Ok(())
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&mut self, frame: &Envelope) -> Result<(), ConnectionError> {
        if !self.live() {
            return Err(ConnectionError::Closed);
        }
        match frame.op_code() {
            Some(OpCode::Identify) => self.identify(frame.decode(OpCode::Identify)?),
            Some(OpCode::Request) => self.request(frame.decode(OpCode::Request)?),
            _ => Ok(()),
        }
    }

    async fn recv(&mut self) -> Result<Envelope, ConnectionError> {
        // Give concurrent callers a chance to interleave.
        tokio::task::yield_now().await;
        if !self.live() {
            return Err(ConnectionError::Closed);
        }
        self.queue.pop_front().ok_or(ConnectionError::Closed)
    }

    fn is_open(&self) -> bool {
        self.live()
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        self.open = false;
        Ok(())
    }
}

fn response_for(request: &Request, outcome: Result<Option<Value>, Rejection>) -> RequestResponse {
    let (request_status, response_data) = match outcome {
        Ok(data) => (
            RequestStatus {
                result: true,
                code: Some(CODE_SUCCESS),
                comment: None,
            },
            data,
        ),
        Err((code, comment)) => (
            RequestStatus {
                result: false,
                code: Some(code),
                comment: Some(comment),
            },
            None,
        ),
    };
    RequestResponse {
        request_type: request.request_type.clone(),
        request_id: request.request_id.clone(),
        request_status,
        response_data,
    }
}

fn noise_frames(request: &Request, seq: u64) -> Vec<Result<Envelope, ConnectionError>> {
    let event = Envelope {
        op: OpCode::Event.code(),
        d: json!({
            "eventType": "CurrentProgramSceneChanged",
            "eventIntent": 4,
            "eventData": { "sceneName": "somewhere-else" },
        }),
    };
    let stale = RequestResponse {
        request_type: request.request_type.clone(),
        request_id: format!("req-{}", 1_000_000 + seq),
        request_status: RequestStatus {
            result: true,
            code: Some(CODE_SUCCESS),
            comment: None,
        },
        response_data: Some(json!({ "stale": true })),
    };
    vec![
        Ok(event),
        Envelope::new(OpCode::RequestResponse, &stale).map_err(ConnectionError::from),
    ]
}

fn arg<'a>(request: &'a Request, key: &str) -> Result<&'a Value, Rejection> {
    request
        .request_data
        .as_ref()
        .and_then(|data| data.get(key))
        .ok_or_else(|| {
            (
                CODE_MISSING_REQUEST_FIELD,
                format!("Your request is missing the `{key}` field."),
            )
        })
}

fn str_arg(request: &Request, key: &str) -> Result<String, Rejection> {
    arg(request, key)?.as_str().map(str::to_string).ok_or_else(|| {
        (
            CODE_MISSING_REQUEST_FIELD,
            format!("The field `{key}` must be a string."),
        )
    })
}

impl FakeState {
    fn answer(&mut self, request: &Request) -> Result<Option<Value>, Rejection> {
        if self.failing_everything {
            return Err((CODE_INJECTED_FAILURE, "injected failure".to_string()));
        }
        if let Some(rejection) = self.rejections.get(&request.request_type) {
            return Err(rejection.clone());
        }
        let outcome = self.dispatch(request);
        if outcome.is_ok()
            && self.fail_everything_after.as_deref() == Some(request.request_type.as_str())
        {
            self.failing_everything = true;
        }
        outcome
    }

    fn dispatch(&mut self, request: &Request) -> Result<Option<Value>, Rejection> {
        match request.request_type.as_str() {
            "GetCurrentProgramScene" => Ok(Some(json!({
                "currentProgramSceneName": self.program_scene,
                "sceneName": self.program_scene,
            }))),
            "SetCurrentProgramScene" => {
                self.program_scene = str_arg(request, "sceneName")?;
                Ok(None)
            }
            "GetSceneItemId" => {
                let key = (
                    str_arg(request, "sceneName")?,
                    str_arg(request, "sourceName")?,
                );
                let id = self.scene_items.get(&key).ok_or_else(|| {
                    (
                        CODE_RESOURCE_NOT_FOUND,
                        "No scene items were found in the specified scene by that name or offset."
                            .to_string(),
                    )
                })?;
                Ok(Some(json!({ "sceneItemId": id.0 })))
            }
            "SetSceneItemEnabled" => {
                let id = arg(request, "sceneItemId")?.as_i64().unwrap_or_default();
                let enabled = arg(request, "sceneItemEnabled")?
                    .as_bool()
                    .unwrap_or_default();
                let id = SceneItemId(id);
                if !self.item_enabled.contains_key(&id) {
                    return Err((
                        CODE_RESOURCE_NOT_FOUND,
                        "No scene items were found in the specified scene by that ID.".to_string(),
                    ));
                }
                self.item_enabled.insert(id, enabled);
                Ok(None)
            }
            "GetSceneSceneTransitionOverride" => {
                let scene = str_arg(request, "sceneName")?;
                let value = self.overrides.get(&scene).cloned().unwrap_or_default();
                Ok(Some(json!({
                    "transitionName": value.name,
                    "transitionDuration": value.duration_ms,
                })))
            }
            "SetSceneSceneTransitionOverride" => {
                let scene = str_arg(request, "sceneName")?;
                let value = TransitionOverride {
                    name: request
                        .request_data
                        .as_ref()
                        .and_then(|data| data.get("transitionName"))
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    duration_ms: request
                        .request_data
                        .as_ref()
                        .and_then(|data| data.get("transitionDuration"))
                        .and_then(Value::as_i64),
                };
                self.overrides.insert(scene, value);
                Ok(None)
            }
            "GetCurrentSceneTransition" => Ok(Some(json!({
                "transitionName": self.transition_name,
                "transitionKind": "fade_transition",
            }))),
            "SetCurrentSceneTransition" => {
                self.transition_name = Some(str_arg(request, "transitionName")?);
                Ok(None)
            }
            "GetCurrentSceneTransitionDuration" => Ok(Some(json!({
                "transitionDuration": self.transition_duration_ms,
            }))),
            "SetCurrentSceneTransitionDuration" => {
                self.transition_duration_ms = arg(request, "transitionDuration")?.as_i64();
                Ok(None)
            }
            "GetMediaInputStatus" => {
                str_arg(request, "inputName")?;
                let status = match &self.media_script {
                    Some(script) => script(self.media_origin.elapsed()),
                    None => MediaStatus {
                        state: Some("OBS_MEDIA_STATE_NONE".to_string()),
                        cursor_ms: None,
                        duration_ms: None,
                    },
                };
                Ok(Some(json!({
                    "mediaState": status.state,
                    "mediaCursor": status.cursor_ms,
                    "mediaDuration": status.duration_ms,
                })))
            }
            "TriggerMediaInputAction" => {
                str_arg(request, "inputName")?;
                let action = str_arg(request, "mediaAction")?;
                if action == MediaAction::Restart.as_str() {
                    self.media_origin = Instant::now();
                }
                Ok(None)
            }
            "GetInputSettings" => {
                let input = str_arg(request, "inputName")?;
                let settings = self.input_settings.get(&input).ok_or_else(|| {
                    (
                        CODE_RESOURCE_NOT_FOUND,
                        format!("No source was found by the name of `{input}`."),
                    )
                })?;
                Ok(Some(json!({
                    "inputSettings": settings,
                    "inputKind": "source-clone",
                })))
            }
            "SetInputSettings" => {
                let input = str_arg(request, "inputName")?;
                let incoming = match arg(request, "inputSettings")? {
                    Value::Object(map) => map.clone(),
                    _ => Map::new(),
                };
                let overlay = request
                    .request_data
                    .as_ref()
                    .and_then(|data| data.get("overlay"))
                    .and_then(Value::as_bool)
                    .unwrap_or(true);
                let settings = self.input_settings.entry(input).or_default();
                if overlay {
                    settings.extend(incoming);
                } else {
                    *settings = incoming;
                }
                Ok(None)
            }
            other => Err((
                CODE_UNKNOWN_REQUEST_TYPE,
                format!("Your request type `{other}` is not valid."),
            )),
        }
    }
}
