//! # API REST
//!
//! CDS Hooks REST surface for the eligibility service.
//!
//! Handles:
//! - HTTP endpoints with axum (discovery, hook invocation, heartbeat, health)
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, authorization header check)
//!
//! Uses `api-shared` for the wire types and `cds-core` for the evaluation itself.

#![warn(rust_2018_idioms)]

pub mod cards;

use api_shared::auth::require_authorization;
use api_shared::hooks::{self, HookRequest, HookResponse, ServiceDiscovery};
use api_shared::{HealthRes, HealthService};
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, Method, StatusCode},
    middleware::{self, Next},
    response::{Json, Response},
    routing::{get, post},
    Router,
};
use cds_core::config::{read_config_file, timeout_from_env_value};
use cds_core::fetch::Fetcher;
use cds_core::{CdsConfig, EligibilityService, EvaluationRequest, HttpFetcher, PatternSources};
use chrono::Local;
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Default REST listen address.
pub const DEFAULT_REST_ADDR: &str = "0.0.0.0:8000";

/// Application state for the REST API server
///
/// Holds the evaluation service, which owns the resolved configuration and the outbound fetcher.
#[derive(Clone)]
pub struct AppState {
    service: EligibilityService,
}

impl AppState {
    pub fn new(cfg: Arc<CdsConfig>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            service: EligibilityService::new(cfg, fetcher),
        }
    }

    /// Resolve configuration from the environment and build the production state.
    ///
    /// # Environment Variables
    /// - `CONFIG_FILE`: JSON configuration file (default: `config.json`)
    /// - `TIMEOUT`: per-request timeout in seconds (default: 30)
    /// - the eight classification pattern variables listed in [`PatternSources::VARIABLES`]
    ///
    /// # Errors
    /// Returns an error if:
    /// - the configuration file cannot be read or parsed,
    /// - a pattern variable is missing or does not compile,
    /// - the timeout is malformed, or
    /// - the HTTP client cannot be built.
    pub fn from_env() -> anyhow::Result<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());
        let file = read_config_file(Path::new(&config_file))?;
        let patterns = PatternSources::from_lookup(|key| std::env::var(key).ok())?;
        let timeout = timeout_from_env_value(std::env::var("TIMEOUT").ok())?;

        let cfg = Arc::new(CdsConfig::new(file, &patterns, timeout)?);
        let fetcher = Arc::new(HttpFetcher::new(cfg.timeout())?);

        tracing::info!(config_file = %config_file, timeout_secs = timeout.as_secs(), "configuration loaded");
        Ok(Self::new(cfg, fetcher))
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(health, heartbeat, discovery, eligibility),
    components(schemas(
        HealthRes,
        hooks::ServiceDiscovery,
        hooks::ServiceDefinition,
        hooks::HookRequest,
        hooks::HookContext,
        hooks::FhirAuthorization,
        hooks::HookResponse,
        hooks::SystemAction,
        hooks::Card,
        hooks::CardSource,
        hooks::CardExtension,
        hooks::Indicator,
        hooks::Link,
        hooks::Coding,
        hooks::CodeableConcept,
        hooks::ResourceReference,
        hooks::Suggestion,
        hooks::Action,
        hooks::ServiceRequest,
    ))
)]
pub struct ApiDoc;

/// Build the REST router.
///
/// CORS allows any origin but only `GET` and `POST`. The hook endpoint requires an
/// `Authorization` header.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/heartbeat", get(heartbeat))
        .route("/cds-services", get(discovery))
        .route(
            "/cds-services/eligibility",
            post(eligibility).route_layer(middleware::from_fn(require_bearer)),
        )
        .merge(
            SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
        )
        .layer(cors)
        .with_state(state)
}

/// Reject hook calls that carry no `Authorization` header.
async fn require_bearer(request: Request, next: Next) -> Result<Response, StatusCode> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    if let Err(e) = require_authorization(header) {
        tracing::warn!(error = %e, path = %request.uri().path(), "refusing hook call");
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(request).await)
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
///
/// # Returns
/// * `Json<HealthRes>` - Health status response containing service status
async fn health() -> Json<HealthRes> {
    Json(HealthService::check_health())
}

#[utoipa::path(
    get,
    path = "/heartbeat",
    responses(
        (status = 200, description = "Service is up")
    )
)]
/// Liveness probe. Always `200` with an empty body.
async fn heartbeat() -> StatusCode {
    StatusCode::OK
}

#[utoipa::path(
    get,
    path = "/cds-services",
    responses(
        (status = 200, description = "CDS Hooks discovery document", body = ServiceDiscovery)
    )
)]
/// CDS Hooks discovery endpoint
///
/// # Returns
/// * `Json<ServiceDiscovery>` - The single eligibility service and its prefetch templates
async fn discovery() -> Json<ServiceDiscovery> {
    Json(ServiceDiscovery::eligibility())
}

#[utoipa::path(
    post,
    path = "/cds-services/eligibility",
    request_body = HookRequest,
    responses(
        (status = 200, description = "Hook response, with a card when treatment is recommended", body = HookResponse),
        (status = 401, description = "Missing Authorization header"),
        (status = 500, description = "Evaluation or write-back failed")
    )
)]
/// Evaluate the patient in context and return at most one recommendation card
///
/// When the patient is in the asthma registry, eligible for treatment and not already on it, the
/// alert text is written back to the record first and the card is only returned if that write
/// succeeds.
///
/// # Arguments
/// * `hook` - The `patient-view` hook invocation
///
/// # Returns
/// * `Ok(Json<HookResponse>)` - Cards (possibly none) and an empty system action list
/// * `Err(StatusCode)` - `500` with an empty body
///
/// # Errors
/// Returns `500 Internal Server Error` if:
/// - any upstream fetch or decode fails, or
/// - the write-back fails.
#[axum::debug_handler]
async fn eligibility(
    State(state): State<AppState>,
    Json(hook): Json<HookRequest>,
) -> Result<Json<HookResponse>, StatusCode> {
    let request = evaluation_request(hook);
    let today = Local::now().date_naive();

    let evaluation = state
        .service
        .evaluate(&request, today)
        .await
        .map_err(|e| {
            tracing::error!(patient = %request.patient_id, error = %e, "evaluation failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let mut response = HookResponse::default();
    if evaluation.recommends_treatment() {
        state
            .service
            .write_back(&request, &evaluation)
            .await
            .map_err(|e| {
                tracing::error!(patient = %request.patient_id, error = %e, "write-back failed");
                StatusCode::INTERNAL_SERVER_ERROR
            })?;

        response.cards.push(cards::eligibility_card(
            &evaluation,
            state.service.config().order_set_key(),
            uuid::Uuid::new_v4().to_string(),
            Local::now(),
        ));
    }

    Ok(Json(response))
}

fn evaluation_request(hook: HookRequest) -> EvaluationRequest {
    let optional = |value: String| Some(value).filter(|v| !v.trim().is_empty());
    EvaluationRequest {
        base_url: hook.fhir_server,
        patient_id: hook.context.patient_id,
        encounter_id: optional(hook.context.encounter_id),
        user_id: optional(hook.context.user_id),
        access_token: hook.fhir_authorization.access_token,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use cds_core::config::{ActionPlanConfig, ConfigFile};
    use cds_core::fetch::{FetchOutcome, FetchRequest};
    use cds_core::FetchFailure;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    /// Answers every read with an empty bundle, or fails everything.
    struct CannedFetcher {
        fail: bool,
    }

    #[async_trait]
    impl Fetcher for CannedFetcher {
        async fn fetch(&self, request: &FetchRequest) -> FetchOutcome {
            if self.fail {
                return FetchOutcome::Failed(FetchFailure::Status {
                    url: request.url().to_string(),
                    status: 503,
                    body: "unavailable".into(),
                });
            }
            FetchOutcome::Body(br#"{"resourceType":"Bundle","total":0}"#.to_vec())
        }
    }

    fn state(fail: bool) -> AppState {
        let file = ConfigFile {
            alert_text_location: "SDI-ALERT".into(),
            asthma_action_plan: ActionPlanConfig {
                green_zone: "GREEN".into(),
                yellow_zone: "YELLOW".into(),
                ..ActionPlanConfig::default()
            },
            observation_oid: "urn:oid:1.2.840.114350".into(),
            order_set_key: "OS-1".into(),
            system_user: "SYSUSER".into(),
            ..ConfigFile::default()
        };
        let patterns = PatternSources {
            antiasthmatic: "^44".into(),
            biologic: "^4460".into(),
            controller: "^4440".into(),
            ics_formoterol: "^444099".into(),
            steroid: "^2210".into(),
            asthma_icd: "^J45".into(),
            csn_system: r"\.8\.698084$".into(),
            encounter_type_system: r"\.10110$".into(),
        };
        let cfg = CdsConfig::new(file, &patterns, Duration::from_secs(5)).expect("config");
        AppState::new(Arc::new(cfg), Arc::new(CannedFetcher { fail }))
    }

    fn hook_body() -> Body {
        Body::from(
            json!({
                "hook": "patient-view",
                "hookInstance": "h1",
                "fhirServer": "https://ehr.example.org/api/FHIR/R4",
                "fhirAuthorization": { "access_token": "secret" },
                "context": { "patientId": "p1", "encounterId": "e1", "userId": "u1" }
            })
            .to_string(),
        )
    }

    fn hook_call(authorization: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/cds-services/eligibility")
            .header("content-type", "application/json");
        if let Some(value) = authorization {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(hook_body()).expect("request")
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json")
    }

    #[tokio::test]
    async fn discovery_lists_eligibility_service() {
        let response = router(state(false))
            .oneshot(
                axum::http::Request::builder()
                    .uri("/cds-services")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["services"][0]["id"], "eligibility");
    }

    #[tokio::test]
    async fn heartbeat_is_empty_ok() {
        let response = router(state(false))
            .oneshot(
                axum::http::Request::builder()
                    .uri("/heartbeat")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn hook_without_authorization_is_refused() {
        let response = router(state(false))
            .oneshot(hook_call(None))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn patient_outside_registry_gets_no_cards() {
        let response = router(state(false))
            .oneshot(hook_call(Some("Bearer user-token")))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({ "cards": [], "systemActions": [] })
        );
    }

    #[tokio::test]
    async fn upstream_failure_is_internal_error() {
        let response = router(state(true))
            .oneshot(hook_call(Some("Bearer user-token")))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        assert!(bytes.is_empty());
    }

    #[test]
    fn blank_context_ids_become_none() {
        let request = evaluation_request(HookRequest {
            fhir_server: "https://ehr.example.org/FHIR/R4".into(),
            context: hooks::HookContext {
                patient_id: "p1".into(),
                encounter_id: " ".into(),
                user_id: String::new(),
            },
            ..HookRequest::default()
        });
        assert_eq!(request.patient_id, "p1");
        assert_eq!(request.encounter_id, None);
        assert_eq!(request.user_id, None);
    }
}
