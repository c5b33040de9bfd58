use super::*;
use client_core::fake::{FakeObs, RecordedCall};

const CLIP_ID: i64 = 7;
const BACKGROUND_ID: i64 = 12;

fn plan() -> CutPlan {
    CutPlan {
        overlay_scene: "Itstinks".into(),
        hide_delay: Duration::from_millis(2700),
        fallback_duration: Duration::from_millis(7500),
        ..CutPlan::default()
    }
}

fn studio(program: &str) -> FakeObs {
    FakeObs::new(program)
        .with_scene_item("Itstinks", "it_stinks_clip", CLIP_ID, false)
        .with_scene_item("Itstinks", "PreviousScene", BACKGROUND_ID, true)
        .with_override("Main", Some("Stinger"), Some(800))
        .with_override("Itstinks", Some("Swipe"), Some(500))
        .with_input_settings("PrevSceneClone", json!({ "clone": "Game" }))
}

fn saga(fake: &FakeObs, plan: CutPlan) -> CutSaga {
    CutSaga::new(Arc::new(fake.client(None)), plan)
}

fn scene_switches(fake: &FakeObs) -> Vec<String> {
    fake.calls_of("SetCurrentProgramScene")
        .iter()
        .filter_map(|call| call.str_field("sceneName").map(str::to_string))
        .collect()
}

fn visibility_calls(fake: &FakeObs, item_id: i64, enabled: bool) -> Vec<RecordedCall> {
    fake.calls_of("SetSceneItemEnabled")
        .into_iter()
        .filter(|call| {
            call.field("sceneItemId") == Some(&json!(item_id))
                && call.field("sceneItemEnabled") == Some(&json!(enabled))
        })
        .collect()
}

fn is_mutating(call: &RecordedCall) -> bool {
    call.request_type.starts_with("Set") || call.request_type == "TriggerMediaInputAction"
}

#[tokio::test(start_paused = true)]
async fn full_cut_switches_once_each_way_and_restores_everything() {
    let fake = studio("Main");
    let saga = saga(&fake, plan());

    let outcome = saga.run().await.expect("cut");

    assert_eq!(outcome, CutOutcome::Completed);
    assert_eq!(scene_switches(&fake), vec!["Itstinks", "Main"]);
    assert_eq!(fake.program_scene(), "Main");

    let hides = visibility_calls(&fake, BACKGROUND_ID, false);
    assert_eq!(hides.len(), 1);
    let hidden_at = hides[0].at;
    assert!(
        hidden_at >= Duration::from_millis(2700) && hidden_at < Duration::from_millis(2800),
        "background hidden at {hidden_at:?}"
    );
    assert_eq!(fake.item_enabled(BACKGROUND_ID), Some(true));
    assert_eq!(fake.item_enabled(CLIP_ID), Some(false));

    assert_eq!(
        fake.scene_override("Main"),
        TransitionOverride {
            name: Some("Stinger".into()),
            duration_ms: Some(800),
        }
    );
    assert_eq!(
        fake.scene_override("Itstinks"),
        TransitionOverride {
            name: Some("Swipe".into()),
            duration_ms: Some(500),
        }
    );
    assert_eq!(fake.transition(), (Some("Fade".to_string()), Some(300)));
    assert_eq!(
        fake.input_settings("PrevSceneClone").get("clone"),
        Some(&json!("Game"))
    );
}

#[tokio::test(start_paused = true)]
async fn request_ids_name_the_step_that_sent_them() {
    let fake = studio("Main");
    saga(&fake, plan()).run().await.expect("cut");

    let switch_ids: Vec<_> = fake
        .calls_of("SetCurrentProgramScene")
        .into_iter()
        .map(|call| call.request_id)
        .collect();
    assert_eq!(switch_ids.len(), 2);
    assert!(switch_ids[0].starts_with("goOverlay-"), "{switch_ids:?}");
    assert!(switch_ids[1].starts_with("goBack-"), "{switch_ids:?}");

    let hide = &visibility_calls(&fake, BACKGROUND_ID, false)[0];
    assert!(hide.request_id.starts_with("hidePrev-"), "{}", hide.request_id);
    assert!(fake
        .calls_of("GetMediaInputStatus")
        .iter()
        .all(|call| call.request_id.starts_with("getMedia-")));
    assert!(fake
        .calls()
        .iter()
        .all(|call| !call.request_id.starts_with("req-")));
}

#[tokio::test(start_paused = true)]
async fn overlay_is_prepared_before_program_switches() {
    let fake = studio("Main");
    saga(&fake, plan()).run().await.expect("cut");

    let calls = fake.calls();
    let position = |pred: &dyn Fn(&RecordedCall) -> bool| {
        calls
            .iter()
            .position(|call| pred(call))
            .expect("call was made")
    };
    let clone_set = position(&|call| {
        call.request_type == "SetInputSettings"
            && call.field("inputSettings") == Some(&json!({ "clone": "Main" }))
    });
    let cut_forced = position(&|call| {
        call.request_type == "SetCurrentSceneTransition"
            && call.str_field("transitionName") == Some("Cut")
    });
    let overrides_cleared = position(&|call| {
        call.request_type == "SetSceneSceneTransitionOverride"
            && call.field("transitionName") == Some(&json!(null))
    });
    let restart = position(&|call| {
        call.str_field("mediaAction") == Some("OBS_WEBSOCKET_MEDIA_INPUT_ACTION_RESTART")
    });
    let switch = position(&|call| call.request_type == "SetCurrentProgramScene");

    assert!(overrides_cleared < cut_forced);
    assert!(cut_forced < clone_set);
    assert!(clone_set < restart);
    assert!(restart < switch);

    let restarted_at = calls[restart].at;
    let hidden_at = visibility_calls(&fake, BACKGROUND_ID, false)[0].at;
    assert!(hidden_at - restarted_at >= Duration::from_millis(2700));
}

#[tokio::test(start_paused = true)]
async fn already_on_overlay_makes_no_changes() {
    let fake = studio("Itstinks");

    let outcome = saga(&fake, plan()).run().await.expect("refusal is not an error");

    assert_eq!(outcome, CutOutcome::AlreadyOnOverlay);
    let calls = fake.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].request_type, "GetCurrentProgramScene");
}

#[tokio::test(start_paused = true)]
async fn unwind_still_runs_when_everything_fails_after_the_switch() {
    let fake = studio("Main").failing_everything_after("SetCurrentProgramScene");

    let err = saga(&fake, plan()).run().await.expect_err("switch back fails");

    assert!(
        matches!(
            err,
            SagaError::Client(ClientError::Request {
                code: Some(500),
                ..
            })
        ),
        "got {err:?}"
    );
    let calls = fake.calls();
    let switched = calls
        .iter()
        .position(|call| call.request_type == "SetCurrentProgramScene")
        .expect("switch to overlay");
    assert!(calls[switched].succeeded);
    let after: Vec<&RecordedCall> = calls[switched + 1..].iter().collect();

    let returns: Vec<_> = after
        .iter()
        .filter(|call| {
            call.request_type == "SetCurrentProgramScene"
                && call.str_field("sceneName") == Some("Main")
        })
        .collect();
    assert_eq!(returns.len(), 2, "switch back and emergency return");
    assert!(returns[0].request_id.starts_with("goBack-"));
    assert!(returns[1].request_id.starts_with("emergencyBack-"));

    let restores: Vec<_> = after
        .iter()
        .filter(|call| call.request_type == "SetSceneSceneTransitionOverride")
        .filter_map(|call| call.str_field("sceneName"))
        .collect();
    assert_eq!(restores, vec!["Itstinks", "Main"]);

    assert!(after.iter().any(|call| {
        call.request_type == "SetSceneItemEnabled"
            && call.field("sceneItemId") == Some(&json!(BACKGROUND_ID))
            && call.field("sceneItemEnabled") == Some(&json!(true))
    }));
}

#[tokio::test(start_paused = true)]
async fn missing_background_item_aborts_before_switching() {
    let fake = FakeObs::new("Main")
        .with_scene_item("Itstinks", "it_stinks_clip", CLIP_ID, false)
        .with_override("Main", Some("Stinger"), Some(800));

    let err = saga(&fake, plan()).run().await.expect_err("item missing");

    assert!(
        matches!(
            err,
            SagaError::Client(ClientError::Request {
                code: Some(600),
                ..
            })
        ),
        "got {err:?}"
    );
    assert!(scene_switches(&fake).is_empty());
    assert!(fake.calls_of("SetSceneItemEnabled").is_empty());
    assert!(fake.calls_of("TriggerMediaInputAction").is_empty());
    assert_eq!(
        fake.scene_override("Main"),
        TransitionOverride {
            name: Some("Stinger".into()),
            duration_ms: Some(800),
        }
    );
    assert_eq!(fake.transition(), (Some("Fade".to_string()), Some(300)));
}

#[tokio::test(start_paused = true)]
async fn unreadable_program_scene_is_a_resolution_error() {
    let fake = studio("");

    let err = saga(&fake, plan()).run().await.expect_err("no scene");

    assert!(
        matches!(err, SagaError::Client(ClientError::Resolution(_))),
        "got {err:?}"
    );
    assert!(!fake.calls().iter().any(is_mutating));
}

#[tokio::test(start_paused = true)]
async fn wrapper_scene_clones_its_own_target_and_returns_to_the_wrapper() {
    let fake = studio("PreviousScene");

    saga(&fake, plan()).run().await.expect("cut");

    let clone_sets = fake.calls_of("SetInputSettings");
    assert_eq!(clone_sets.len(), 1, "target unchanged, nothing to restore");
    assert_eq!(
        clone_sets[0].field("inputSettings"),
        Some(&json!({ "clone": "Game" }))
    );
    assert_eq!(scene_switches(&fake), vec!["Itstinks", "PreviousScene"]);
}

#[tokio::test(start_paused = true)]
async fn wrapper_pointing_at_itself_falls_back_to_the_wrapper_name() {
    let fake = studio("PreviousScene")
        .with_input_settings("PrevSceneClone", json!({ "clone": "PreviousScene" }));

    saga(&fake, plan()).run().await.expect("cut");

    let clone_sets = fake.calls_of("SetInputSettings");
    assert_eq!(
        clone_sets[0].field("inputSettings"),
        Some(&json!({ "clone": "PreviousScene" }))
    );
}

#[tokio::test(start_paused = true)]
async fn force_cut_can_be_disabled() {
    let fake = studio("Main");
    let plan = CutPlan {
        force_cut: false,
        ..plan()
    };

    saga(&fake, plan).run().await.expect("cut");

    assert!(fake.calls_of("GetCurrentSceneTransition").is_empty());
    assert!(fake.calls_of("SetCurrentSceneTransition").is_empty());
    assert!(fake.calls_of("SetCurrentSceneTransitionDuration").is_empty());
}

#[tokio::test(start_paused = true)]
async fn force_cut_sets_an_instant_transition_and_puts_the_old_one_back() {
    let fake = studio("Main").with_transition(Some("Luma Wipe"), Some(1200));

    saga(&fake, plan()).run().await.expect("cut");

    let names: Vec<_> = fake
        .calls_of("SetCurrentSceneTransition")
        .iter()
        .filter_map(|call| call.str_field("transitionName").map(str::to_string))
        .collect();
    assert_eq!(names, vec!["Cut", "Luma Wipe"]);
    let durations: Vec<_> = fake
        .calls_of("SetCurrentSceneTransitionDuration")
        .iter()
        .filter_map(|call| call.field("transitionDuration").cloned())
        .collect();
    assert_eq!(durations, vec![json!(0), json!(1200)]);
    assert_eq!(fake.transition(), (Some("Luma Wipe".to_string()), Some(1200)));
}

#[tokio::test(start_paused = true)]
async fn unreadable_transition_is_left_alone() {
    let fake = studio("Main").rejecting("GetCurrentSceneTransitionDuration", 500, "nope");

    saga(&fake, plan()).run().await.expect("cut");

    assert!(fake.calls_of("SetCurrentSceneTransition").is_empty());
    assert!(fake.calls_of("SetCurrentSceneTransitionDuration").is_empty());
}

#[tokio::test(start_paused = true)]
async fn unreadable_override_skips_clearing_and_restoring() {
    let fake = studio("Main").rejecting("GetSceneSceneTransitionOverride", 500, "nope");

    saga(&fake, plan()).run().await.expect("cut");

    assert!(fake.calls_of("SetSceneSceneTransitionOverride").is_empty());
    assert_eq!(scene_switches(&fake), vec!["Itstinks", "Main"]);
}

#[tokio::test(start_paused = true)]
async fn second_concurrent_run_is_refused() {
    let fake = studio("Main");
    let saga = Arc::new(saga(&fake, plan()));

    let first = {
        let saga = Arc::clone(&saga);
        tokio::spawn(async move { saga.run().await })
    };
    sleep(Duration::from_millis(500)).await;

    let err = saga.run().await.expect_err("first run still holding");
    assert!(matches!(err, SagaError::AlreadyRunning), "got {err:?}");

    let outcome = first.await.expect("join").expect("first run");
    assert_eq!(outcome, CutOutcome::Completed);
    assert_eq!(scene_switches(&fake), vec!["Itstinks", "Main"]);

    assert_eq!(
        saga.run().await.expect("runs again once idle"),
        CutOutcome::Completed
    );
}
