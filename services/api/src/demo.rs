use crate::infra::{parse_date, InMemoryProfileGateway};
use crate::routes::check_eligibility;
use chrono::{Local, NaiveDate};
use clap::Args;
use companion_registration::config::{AppConfig, RegistrationSettings};
use companion_registration::error::AppError;
use companion_registration::workflows::registration::{
    Command, FieldName, FieldValue, FixedClock, ImageRef, Phase1Identity, RegistrationBlueprint,
    RegistrationController, RegistrationPolicy, Transition, WorkflowError,
};
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Member birthday as typed in the form (M/D/YYYY)
    #[arg(long, default_value = "2/28/1957")]
    pub(crate) birthday: String,
    /// Override today's date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Username created during account creation
    #[arg(long, default_value = "ana.cruz")]
    pub(crate) username: String,
    /// Email captured during account creation
    #[arg(long, default_value = "ana.cruz@example.com")]
    pub(crate) email: String,
    /// Make the backend refuse every save with this message
    #[arg(long)]
    pub(crate) reject_with: Option<String>,
    /// Override the configured minimum age
    #[arg(long)]
    pub(crate) minimum_age: Option<u32>,
}

#[derive(Args, Debug)]
pub(crate) struct AgeArgs {
    /// Birthday as M/D/YYYY
    pub(crate) birthday: String,
    /// Evaluation date (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Override the configured minimum age
    #[arg(long)]
    pub(crate) minimum_age: Option<u32>,
}

/// An explicit `--minimum-age` obeys the same range as `REGISTRATION_MINIMUM_AGE`.
fn policy_for(minimum_age: Option<u32>) -> Result<RegistrationPolicy, AppError> {
    let settings = match minimum_age {
        Some(age) => RegistrationSettings::with_minimum_age(age)?,
        None => AppConfig::load()?.registration,
    };
    Ok(RegistrationPolicy::from(&settings))
}

pub(crate) fn run_age_check(args: AgeArgs) -> Result<(), AppError> {
    let policy = policy_for(args.minimum_age)?;
    let today = args.today.unwrap_or_else(|| Local::now().date_naive());
    let eligibility = check_eligibility(&args.birthday, today, &policy)?;

    println!(
        "Birthday {} -> age {} on {} (minimum {})",
        eligibility.birthday, eligibility.age, eligibility.today, eligibility.minimum_age
    );
    if eligibility.eligible {
        println!("Eligible to join");
    } else {
        println!("Not eligible: {}", policy.ineligible_message());
    }
    Ok(())
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        birthday,
        today,
        username,
        email,
        reject_with,
        minimum_age,
    } = args;

    let policy = policy_for(minimum_age)?;
    let today = today.unwrap_or_else(|| Local::now().date_naive());
    let gateway = Arc::new(match reject_with {
        Some(message) => InMemoryProfileGateway::rejecting(message),
        None => InMemoryProfileGateway::default(),
    });
    let controller =
        RegistrationController::new(gateway.clone(), Arc::new(FixedClock(today)), policy);

    println!("Companion registration demo ({today})");
    let view = controller.start(Some(Phase1Identity::new(username.clone(), email)));
    println!(
        "- Session {} opened for {} on step 1/{}: {}",
        view.session_id, username, view.step_count, view.step_title
    );

    let steps = demo_steps(&birthday);
    let last = steps.len().saturating_sub(1);
    for (index, values) in steps.into_iter().enumerate() {
        for (field, value) in values {
            controller
                .dispatch(Command::FieldChange { field, value })
                .await?;
        }

        let command = if index == last {
            Command::FinalSubmit
        } else {
            Command::Next
        };
        match controller.dispatch(command).await {
            Ok(Transition::Advanced { from, to }) => {
                let blueprint = controller.blueprint();
                let title = |i: usize| blueprint.step(i).map(|step| step.title()).unwrap_or("?");
                println!("- {} saved, continuing to {}", title(from), title(to));
                let age = controller.view().and_then(|view| view.derived_age);
                if let (0, Some(age)) = (from, age) {
                    println!("  Derived age: {age}");
                }
            }
            Ok(Transition::Submitted {
                session_id,
                payload,
            }) => {
                println!("- Session {session_id} submitted; profile marked complete");
                let rendered =
                    serde_json::to_string_pretty(&payload).map_err(std::io::Error::from)?;
                println!("{rendered}");
            }
            Ok(other) => println!("- {other:?}"),
            Err(error) => {
                render_failure(&error);
                return Ok(());
            }
        }
    }

    if let Some(profile) = gateway.profile(&username) {
        println!(
            "Stored profile for {username}: {} fields, completed = {}",
            profile.fields.len(),
            profile.completed
        );
    }
    Ok(())
}

fn render_failure(error: &WorkflowError) {
    println!("- Registration stopped ({:?}): {error}", error.category());
    if let Some(report) = error.validation_report() {
        for failure in &report.failures {
            println!("    - {}: {}", failure.field.label(), failure.message);
        }
    }
    if error.is_fatal() {
        println!("  Restart from account creation.");
    }
}

fn demo_steps(birthday: &str) -> Vec<Vec<(FieldName, FieldValue)>> {
    let single = |value: &str| FieldValue::SingleSelect(Some(value.to_string()));
    let photos = |uris: &[&str]| {
        FieldValue::Photos(uris.iter().map(|uri| ImageRef(uri.to_string())).collect())
    };

    vec![
        vec![
            (FieldName::FirstName, FieldValue::Text("Ana".into())),
            (FieldName::LastName, FieldValue::Text("Cruz".into())),
            (FieldName::Birthday, FieldValue::Date(birthday.to_string())),
            (FieldName::Country, single("Philippines")),
            (FieldName::CivilStatus, single("Widowed")),
            (FieldName::City, FieldValue::Text("Manila".into())),
            (
                FieldName::Hobby,
                FieldValue::MultiSelect(vec!["Cooking".into(), "Gardening".into()]),
            ),
        ],
        vec![
            (FieldName::IdType, single("Senior Citizen ID")),
            (FieldName::IdNumber, FieldValue::Text("SC-2024-0099".into())),
            (FieldName::IdPhotos, photos(&["file:///demo/id-front.jpg"])),
        ],
        vec![(
            FieldName::ProfilePhotos,
            photos(&["file:///demo/portrait.jpg", "file:///demo/garden.jpg"]),
        )],
        vec![
            (
                FieldName::AboutMe,
                FieldValue::Text("Retired teacher who loves long walks by the bay.".into()),
            ),
            (
                FieldName::Interests,
                FieldValue::MultiSelect(vec!["Travel".into(), "Music".into()]),
            ),
            (FieldName::LookingFor, single("Companionship")),
        ],
    ]
}
