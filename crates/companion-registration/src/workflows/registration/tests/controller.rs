use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde_json::json;

use super::common::*;
use crate::workflows::registration::{
    BackendFailureKind, Command, ErrorCategory, FieldName, FieldValue, GatewayError,
    PayloadValue, Phase1Identity, ProfileSnapshot, RegistrationController, RegistrationPolicy,
    SessionStatus, Transition, WorkflowError,
};

#[tokio::test]
async fn scenario_a_next_saves_basic_info_and_advances() {
    let gateway = Arc::new(MemoryGateway::default());
    let controller = new_controller(gateway.clone());
    controller.start(Some(identity()));
    fill(&controller, basic_info("02/28/1957")).await;

    let transition = controller.dispatch(Command::Next).await.expect("next succeeds");

    assert_eq!(transition, Transition::Advanced { from: 0, to: 1 });
    let view = controller.view().expect("session active");
    assert_eq!(view.derived_age, Some(68));
    assert!(!view.unsaved_changes);

    let calls = gateway.calls();
    assert_eq!(calls.len(), 1);
    let GatewayCall::Update { username, payload } = &calls[0] else {
        panic!("expected a progress update, got {calls:?}");
    };
    assert_eq!(username, "ana.cruz");
    assert_eq!(payload.text("birthday"), Some("02/28/1957"));
    assert_eq!(payload.get("age"), Some(&PayloadValue::Number(68)));
    assert_eq!(payload.get("email"), None);
}

#[tokio::test]
async fn scenario_b_final_submit_refuses_members_under_sixty() {
    let gateway = Arc::new(MemoryGateway::default());
    let controller = new_controller(gateway.clone());
    controller.start(Some(identity()));
    walk_to_final_step(&controller, "02/28/1957").await;
    fill(&controller, about_you()).await;
    fill(
        &controller,
        vec![(FieldName::Birthday, FieldValue::Date("02/28/2010".into()))],
    )
    .await;

    let error = controller
        .dispatch(Command::FinalSubmit)
        .await
        .expect_err("age gate refuses");

    assert_eq!(
        error,
        WorkflowError::AgeIneligible {
            age: Some(15),
            minimum: 60,
            message: "You must be at least 60 years old to join".to_string(),
        }
    );
    assert_eq!(error.category(), ErrorCategory::Validation);
    assert_eq!(controller.view().expect("session kept").step_index, 3);
    assert!(!gateway
        .calls()
        .iter()
        .any(|call| matches!(call, GatewayCall::Complete { .. })));
}

#[tokio::test]
async fn scenario_c_backend_rejection_keeps_step_and_values() {
    let gateway = Arc::new(RejectingGateway::new(GatewayError::rejected(
        "Session expired",
    )));
    let controller = new_controller(gateway.clone());
    controller.start(Some(identity()));
    fill(&controller, basic_info("02/28/1957")).await;

    let error = controller
        .dispatch(Command::SubmitStep)
        .await
        .expect_err("backend refuses");

    assert_eq!(
        error,
        WorkflowError::Backend {
            kind: BackendFailureKind::Rejected,
            message: "Session expired".to_string(),
        }
    );
    assert_eq!(error.to_string(), "Session expired");
    assert_eq!(error.category(), ErrorCategory::BackendRejection);

    let view = controller.view().expect("session kept");
    assert_eq!(view.step_index, 0);
    assert!(view.unsaved_changes);
    for (field, value) in basic_info("02/28/1957") {
        assert_eq!(view.values.get(&field), Some(&value));
    }
    assert_eq!(gateway.attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn transport_failures_surface_the_same_way() {
    let gateway = Arc::new(RejectingGateway::new(GatewayError::transport(
        "Network request failed",
    )));
    let controller = new_controller(gateway);
    controller.start(Some(identity()));
    fill(&controller, basic_info("02/28/1957")).await;

    let error = controller
        .dispatch(Command::Next)
        .await
        .expect_err("transport fails");

    assert_eq!(error.category(), ErrorCategory::Transport);
    assert_eq!(error.to_string(), "Network request failed");
    assert_eq!(controller.view().expect("session kept").step_index, 0);
}

#[tokio::test]
async fn scenario_d_second_next_while_pending_is_refused() {
    let gateway = Arc::new(GatedGateway::default());
    let controller = Arc::new(new_controller(gateway.clone()));
    controller.start(Some(identity()));
    fill(&controller, basic_info("02/28/1957")).await;

    let first = tokio::spawn({
        let controller = controller.clone();
        async move { controller.dispatch(Command::Next).await }
    });
    gateway.entered.notified().await;

    assert_eq!(controller.in_flight(), Some("next"));
    assert!(controller.view().expect("session active").busy);
    assert_eq!(
        controller.dispatch(Command::Next).await,
        Err(WorkflowError::Busy)
    );
    assert_eq!(
        controller.dispatch(Command::FinalSubmit).await,
        Err(WorkflowError::Busy)
    );

    gateway.release.notify_one();
    let outcome = first.await.expect("task joins");

    assert_eq!(outcome, Ok(Transition::Advanced { from: 0, to: 1 }));
    assert_eq!(gateway.updates(), 1);
    assert_eq!(controller.in_flight(), None);
}

#[tokio::test]
async fn dropping_a_pending_transition_releases_the_guard() {
    let gateway = Arc::new(GatedGateway::default());
    let controller = new_controller(gateway.clone());
    controller.start(Some(identity()));
    fill(&controller, basic_info("02/28/1957")).await;

    tokio::select! {
        _ = controller.dispatch(Command::Next) => panic!("gateway should hold the call"),
        _ = gateway.entered.notified() => {}
    }
    assert_eq!(controller.in_flight(), None);
    assert_eq!(controller.view().expect("session kept").step_index, 0);

    gateway.release.notify_one();
    let transition = controller.dispatch(Command::Next).await.expect("retry works");
    assert_eq!(transition, Transition::Advanced { from: 0, to: 1 });
}

#[tokio::test]
async fn results_for_an_abandoned_session_are_discarded() {
    let gateway = Arc::new(GatedGateway::default());
    let controller = Arc::new(new_controller(gateway.clone()));
    controller.start(Some(identity()));
    fill(&controller, basic_info("02/28/1957")).await;

    let pending = tokio::spawn({
        let controller = controller.clone();
        async move { controller.dispatch(Command::SubmitStep).await }
    });
    gateway.entered.notified().await;

    let abandoned = controller
        .dispatch(Command::Abandon { confirmed: true })
        .await
        .expect("confirmed abandon");
    assert!(matches!(abandoned, Transition::Abandoned { .. }));

    gateway.release.notify_one();
    assert_eq!(
        pending.await.expect("task joins"),
        Err(WorkflowError::SessionDiscarded)
    );
    assert!(controller.view().is_none());
}

#[tokio::test]
async fn full_registration_merges_identity_and_completes() {
    let gateway = Arc::new(MemoryGateway::default());
    let controller = new_controller(gateway.clone());
    let started = controller.start(Some(identity()));
    walk_to_final_step(&controller, "2/8/1957").await;
    fill(&controller, about_you()).await;

    let transition = controller
        .dispatch(Command::FinalSubmit)
        .await
        .expect("submission succeeds");

    let Transition::Submitted {
        session_id,
        payload,
    } = transition
    else {
        panic!("expected submission, got {transition:?}");
    };
    assert_eq!(session_id, started.session_id);
    assert_eq!(payload.text("email"), Some("ana.cruz@example.com"));
    assert_eq!(payload.text("username"), Some("ana.cruz"));
    assert_eq!(payload.text("birthday"), Some("02/08/1957"));
    assert_eq!(payload.text("contactEmail"), Some(""));
    assert_eq!(payload.text("supportingDocuments"), Some(""));
    assert!(controller.view().is_none());

    let calls = gateway.calls();
    assert_eq!(calls.len(), 4);
    assert!(matches!(
        calls.last(),
        Some(GatewayCall::Complete {
            mark_complete: true,
            ..
        })
    ));
}

#[tokio::test]
async fn submitted_state_refuses_further_commands_until_restarted() {
    let gateway = Arc::new(MemoryGateway::default());
    let controller = new_controller(gateway.clone());
    controller.start(Some(identity()));
    walk_to_final_step(&controller, "2/8/1957").await;
    fill(&controller, about_you()).await;
    controller
        .dispatch(Command::FinalSubmit)
        .await
        .expect("submission succeeds");

    assert_eq!(controller.status(), Some(SessionStatus::Submitted));
    for command in [
        Command::FinalSubmit,
        Command::Next,
        Command::Abandon { confirmed: true },
    ] {
        assert_eq!(
            controller.dispatch(command).await,
            Err(WorkflowError::AlreadySubmitted)
        );
    }
    assert_eq!(gateway.calls().len(), 4);

    controller.start(Some(identity()));
    assert_eq!(controller.status(), Some(SessionStatus::InProgress));
}

#[tokio::test]
async fn blank_selections_cannot_complete_a_required_field() {
    let gateway = Arc::new(MemoryGateway::default());
    let controller = new_controller(gateway.clone());
    controller.start(Some(identity()));
    walk_to_final_step(&controller, "2/8/1957").await;
    fill(&controller, about_you()).await;
    fill(&controller, vec![(FieldName::Interests, many(&["   "]))]).await;

    let error = controller
        .dispatch(Command::FinalSubmit)
        .await
        .expect_err("interests are empty");

    let report = error.validation_report().expect("validation failure");
    assert_eq!(report.fields(), vec![FieldName::Interests]);
    let view = controller.view().expect("session active");
    assert_eq!(
        view.values.get(&FieldName::Interests),
        Some(&FieldValue::MultiSelect(Vec::new()))
    );
    assert!(gateway
        .calls()
        .iter()
        .all(|call| matches!(call, GatewayCall::Update { .. })));
}

#[tokio::test]
async fn final_payload_age_follows_the_current_date() {
    let gateway = Arc::new(MemoryGateway::default());
    let clock = Arc::new(SteppingClock::starting(today()));
    let controller =
        RegistrationController::new(gateway.clone(), clock.clone(), RegistrationPolicy::default());
    controller.start(Some(identity()));
    walk_to_final_step(&controller, "6/16/1957").await;
    fill(&controller, about_you()).await;
    assert_eq!(controller.view().and_then(|view| view.derived_age), Some(67));

    clock.advance_days(1);
    assert_eq!(controller.view().and_then(|view| view.derived_age), Some(68));

    let transition = controller
        .dispatch(Command::FinalSubmit)
        .await
        .expect("submission succeeds");
    let Transition::Submitted { payload, .. } = transition else {
        panic!("expected submission, got {transition:?}");
    };
    assert_eq!(payload.get("age"), Some(&PayloadValue::Number(68)));
}

#[tokio::test]
async fn next_reports_every_failing_field_of_the_step() {
    let gateway = Arc::new(MemoryGateway::default());
    let controller = new_controller(gateway.clone());
    controller.start(Some(identity()));
    fill(&controller, vec![(FieldName::FirstName, text("Ana"))]).await;

    let error = controller
        .dispatch(Command::Next)
        .await
        .expect_err("step incomplete");

    let report = error.validation_report().expect("validation failure");
    assert_eq!(
        report.fields(),
        vec![
            FieldName::LastName,
            FieldName::Birthday,
            FieldName::Country,
            FieldName::CivilStatus,
            FieldName::City,
            FieldName::Hobby,
        ]
    );
    let view = controller.view().expect("session active");
    assert_eq!(
        view.errors.get(&FieldName::City),
        Some(&Some("City is required".to_string()))
    );
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn missing_identity_is_fatal_for_transitions() {
    let gateway = Arc::new(MemoryGateway::default());
    let controller = new_controller(gateway.clone());
    controller.start(None);
    fill(&controller, basic_info("02/28/1957")).await;

    let error = controller
        .dispatch(Command::Next)
        .await
        .expect_err("identity required");

    assert_eq!(error, WorkflowError::MissingIdentity);
    assert!(error.is_fatal());
    assert!(gateway.calls().is_empty());

    let blank = new_controller(gateway);
    blank.start(Some(Phase1Identity::new("  ", "ana@example.com")));
    assert_eq!(
        blank.dispatch(Command::SubmitStep).await,
        Err(WorkflowError::MissingIdentity)
    );
}

#[tokio::test]
async fn back_steps_without_validation() {
    let gateway = Arc::new(MemoryGateway::default());
    let controller = new_controller(gateway);
    controller.start(Some(identity()));

    assert_eq!(
        controller.dispatch(Command::Back).await,
        Ok(Transition::Retreated { from: 0, to: 0 })
    );

    fill(&controller, basic_info("02/28/1957")).await;
    controller.dispatch(Command::Next).await.expect("advances");
    let _ = controller.dispatch(Command::Next).await;

    assert_eq!(
        controller.dispatch(Command::Back).await,
        Ok(Transition::Retreated { from: 1, to: 0 })
    );
    let view = controller.view().expect("session active");
    assert_eq!(
        view.errors.get(&FieldName::IdType),
        Some(&Some("Select the type of ID".to_string()))
    );
}

#[tokio::test]
async fn step_position_guards_next_and_final_submit() {
    let gateway = Arc::new(MemoryGateway::default());
    let controller = new_controller(gateway);
    controller.start(Some(identity()));
    fill(&controller, basic_info("02/28/1957")).await;

    assert_eq!(
        controller.dispatch(Command::FinalSubmit).await,
        Err(WorkflowError::NotAtFinalStep)
    );

    for values in [id_verification(), document_upload()] {
        controller.dispatch(Command::Next).await.expect("advances");
        fill(&controller, values).await;
    }
    controller.dispatch(Command::Next).await.expect("advances");
    fill(&controller, about_you()).await;

    assert_eq!(
        controller.dispatch(Command::Next).await,
        Err(WorkflowError::AtFinalStep)
    );
}

#[tokio::test]
async fn field_changes_must_match_the_field_kind() {
    let controller = new_controller(Arc::new(MemoryGateway::default()));
    controller.start(Some(identity()));

    let error = controller
        .dispatch(Command::FieldChange {
            field: FieldName::Birthday,
            value: text("02/28/1957"),
        })
        .await
        .expect_err("text is not a date");

    assert_eq!(
        error,
        WorkflowError::KindMismatch {
            field: FieldName::Birthday,
            expected: "date",
            found: "text",
        }
    );
}

#[tokio::test]
async fn field_updates_report_age_and_visible_errors() {
    let controller = new_controller(Arc::new(MemoryGateway::default()));
    controller.start(Some(identity()));

    let update = controller
        .dispatch(Command::FieldChange {
            field: FieldName::Birthday,
            value: FieldValue::Date("02/28/2010".into()),
        })
        .await
        .expect("accepted");
    assert_eq!(
        update,
        Transition::FieldUpdated {
            field: FieldName::Birthday,
            error: None,
            derived_age: Some(15),
        }
    );

    let blur = controller
        .dispatch(Command::FieldBlur {
            field: FieldName::Birthday,
        })
        .await
        .expect("accepted");
    assert_eq!(
        blur,
        Transition::FieldTouched {
            field: FieldName::Birthday,
            error: Some("You must be at least 60 years old to join".to_string()),
        }
    );
}

#[tokio::test]
async fn validate_all_touches_every_step() {
    let controller = new_controller(Arc::new(MemoryGateway::default()));
    controller.start(Some(identity()));
    fill(&controller, basic_info("02/28/1957")).await;

    let Ok(Transition::Validated { report }) = controller.dispatch(Command::ValidateAll).await
    else {
        panic!("validate all returns a report");
    };
    assert_eq!(report.fields().first(), Some(&FieldName::IdType));
    assert!(controller
        .inspect(|session| session.is_touched(FieldName::AboutMe))
        .unwrap_or(false));
}

#[tokio::test]
async fn abandon_asks_for_confirmation_with_unsaved_changes() {
    let controller = new_controller(Arc::new(MemoryGateway::default()));
    controller.start(Some(identity()));
    fill(&controller, vec![(FieldName::City, text("Manila"))]).await;

    assert_eq!(
        controller
            .dispatch(Command::Abandon { confirmed: false })
            .await,
        Err(WorkflowError::UnsavedChanges)
    );
    assert!(controller.view().is_some());

    let abandoned = controller
        .dispatch(Command::Abandon { confirmed: true })
        .await
        .expect("confirmed");
    assert!(matches!(abandoned, Transition::Abandoned { .. }));
    assert_eq!(
        controller.dispatch(Command::Next).await,
        Err(WorkflowError::NoActiveSession)
    );
}

#[tokio::test]
async fn clean_sessions_abandon_without_confirmation() {
    let controller = new_controller(Arc::new(MemoryGateway::default()));
    controller.start(Some(identity()));
    assert!(controller
        .dispatch(Command::Abandon { confirmed: false })
        .await
        .is_ok());
}

#[tokio::test]
async fn resume_seeds_values_from_the_backend_profile() {
    let snapshot: ProfileSnapshot = serde_json::from_value(json!({
        "fields": {
            "firstName": "Ana",
            "lastName": "Cruz",
            "birthday": "02/28/1957",
            "country": "Philippines",
            "civilStatus": "Widowed",
            "city": "Manila",
            "hobby": ["Cooking"]
        }
    }))
    .expect("snapshot parses");
    let gateway = Arc::new(MemoryGateway::with_snapshot("ana.cruz", snapshot));
    let controller = new_controller(gateway);

    let view = controller.resume(identity()).await.expect("resumes");

    assert_eq!(view.step_index, 1);
    assert_eq!(view.derived_age, Some(68));
    assert_eq!(
        view.values.get(&FieldName::Birthday),
        Some(&FieldValue::Date("2/28/1957".to_string()))
    );
    assert!(view.errors.values().all(Option::is_none));
}

#[tokio::test]
async fn resume_refuses_completed_profiles() {
    let snapshot = ProfileSnapshot {
        completed: true,
        ..ProfileSnapshot::default()
    };
    let controller = new_controller(Arc::new(MemoryGateway::with_snapshot("ana.cruz", snapshot)));

    assert_eq!(
        controller.resume(identity()).await,
        Err(WorkflowError::AlreadyCompleted)
    );
    assert!(controller.view().is_none());
}

#[tokio::test]
async fn resume_surfaces_backend_failures() {
    let controller = new_controller(Arc::new(RejectingGateway::new(GatewayError::transport(
        "Network request failed",
    ))));

    let error = controller
        .resume(identity())
        .await
        .expect_err("backend unreachable");
    assert_eq!(error.category(), ErrorCategory::Transport);
}
