use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryProfileGateway};
use crate::routes::with_registration_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use companion_registration::config::AppConfig;
use companion_registration::error::AppError;
use companion_registration::telemetry;
use companion_registration::workflows::registration::{
    RegistrationPolicy, SessionRegistry, SystemClock,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let policy = RegistrationPolicy::from(&config.registration);
    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        policy: policy.clone(),
    };

    let gateway = Arc::new(InMemoryProfileGateway::default());
    let registry = Arc::new(SessionRegistry::new(
        gateway,
        Arc::new(SystemClock),
        policy,
    ));

    let app = with_registration_routes(registry)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        minimum_age = config.registration.minimum_age,
        "companion registration service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
