use crate::cli::ServeArgs;
use crate::infra::{load_directory, AppState, CrmBackend};
use crate::routes::with_service_routes;
use alloy_dispatch::config::AppConfig;
use alloy_dispatch::error::AppError;
use alloy_dispatch::telemetry;
use alloy_dispatch::workflows::dispatch::{DispatchService, JobStore};
use alloy_dispatch::workflows::leads::LeadIntakeService;
use axum::http::{header, HeaderValue, Method};
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let crm = Arc::new(CrmBackend::from_config(config.crm.as_ref())?);
    let directory = Arc::new(load_directory(&config.dispatch)?);
    let dispatch_service = Arc::new(
        DispatchService::new(directory, Arc::new(JobStore::new()), crm.clone(), crm.clone())
            .with_default_skill(config.dispatch.default_skill.clone()),
    );
    let lead_service = Arc::new(LeadIntakeService::new(
        crm,
        config.dispatch.default_city.clone(),
    ));

    let app = with_service_routes(dispatch_service, lead_service, config.dispatch.debug_routes)
        .layer(Extension(app_state))
        .layer(cors_layer(&config.server.cors_origins))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        debug_routes = config.dispatch.debug_routes,
        "alloy dispatcher ready; job store is in-memory and resets on restart"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|origin| origin == "*") {
        AllowOrigin::any()
    } else {
        let values: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(%origin, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(values)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}
