use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use enrollments::workflows::recruitment::{
    recruitment_router, IdentityVerifier, RecruitmentService,
};
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_recruitment_routes<V>(service: Arc<RecruitmentService<V>>) -> axum::Router
where
    V: IdentityVerifier + 'static,
{
    recruitment_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use enrollments::config::StorageConfig;
    use enrollments::workflows::recruitment::{
        DomainCatalog, Email, RecruitmentStores, ServiceSettings, StaticTokenVerifier,
    };
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tower::ServiceExt;

    fn app(readiness: Arc<AtomicBool>) -> axum::Router {
        let catalog = DomainCatalog::standard();
        let (stores, _) = RecruitmentStores::in_memory(&StorageConfig::default(), &catalog)
            .expect("tables");
        let verifier = StaticTokenVerifier::new()
            .with_token("dev", Email::parse("ada@x.com").expect("email"));
        let service = Arc::new(RecruitmentService::new(
            Arc::new(verifier),
            Arc::new(stores),
            Arc::new(catalog),
            ServiceSettings::default(),
        ));
        let state = AppState {
            readiness,
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };
        with_recruitment_routes(service).layer(Extension(state))
    }

    async fn get(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::get(uri).body(Body::empty()).expect("request"))
            .await
            .expect("response");
        let status = response.status();
        let body = to_bytes(response.into_body(), 64 * 1024)
            .await
            .expect("body");
        (status, serde_json::from_slice(&body).expect("json"))
    }

    #[tokio::test]
    async fn health_and_readiness_probes() {
        let readiness = Arc::new(AtomicBool::new(false));
        let app = app(readiness.clone());

        let (status, body) = get(app.clone(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = get(app.clone(), "/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "initializing");

        readiness.store(true, Ordering::Release);
        let (status, _) = get(app, "/ready").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn workflow_routes_are_mounted() {
        let app = app(Arc::new(AtomicBool::new(true)));
        let response = app
            .oneshot(
                Request::post("/api/v1/recruitment/login")
                    .header(header::AUTHORIZATION, "Bearer dev")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }
}
