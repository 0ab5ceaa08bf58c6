use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use pesto_core::suggestions::CooldownStore;
use pesto_db::{DbPool, GraphStats, GraphStatsRepository, SqlTopicGraph};
use serde::Serialize;
use tracing::{error, info};

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    cooldowns: Arc<CooldownStore>,
}

impl HealthState {
    pub fn new(db_pool: DbPool, cooldowns: Arc<CooldownStore>) -> Self {
        Self { db_pool, cooldowns }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CooldownSummary {
    pub tracked: usize,
    pub active: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph: Option<GraphStats>,
    pub cooldowns: CooldownSummary,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn spawn(bind_address: &str, port: u16, state: HealthState) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(state)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let (database, graph) = database_check(&state.db_pool).await;
    let ready = database.status == "ready";
    let stats = state.cooldowns.stats();

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "pesto-server runtime initialized".to_string(),
        },
        database,
        graph,
        cooldowns: CooldownSummary { tracked: stats.tracked, active: stats.active },
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> (HealthCheck, Option<GraphStats>) {
    if let Err(error) = pesto_db::ping(pool).await {
        return (
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") },
            None,
        );
    }

    match SqlTopicGraph::new(pool.clone()).stats().await {
        Ok(stats) => (
            HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
            Some(stats),
        ),
        Err(error) => (
            HealthCheck {
                status: "degraded",
                detail: format!("topic graph unavailable: {error}"),
            },
            None,
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{body::Body, extract::State, http::Request, http::StatusCode, Json};
    use pesto_core::suggestions::CooldownStore;
    use pesto_db::{connect_with_settings, migrations};
    use tower::ServiceExt;

    use crate::health::{health, router, HealthState};

    #[tokio::test]
    async fn health_returns_ready_when_database_is_reachable() {
        let pool =
            connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let cooldowns = Arc::new(CooldownStore::new());
        cooldowns.mark("U1", Duration::from_secs(60));

        let (status, Json(payload)) =
            health(State(HealthState::new(pool.clone(), cooldowns))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.database.status, "ready");
        assert_eq!(payload.graph.map(|graph| graph.members), Some(0));
        assert_eq!(payload.cooldowns.active, 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn health_is_degraded_before_migrations() {
        let pool =
            connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");

        let (status, Json(payload)) =
            health(State(HealthState::new(pool.clone(), Arc::new(CooldownStore::new())))).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(payload.database.detail.contains("topic graph unavailable"));

        pool.close().await;
    }

    #[tokio::test]
    async fn health_returns_service_unavailable_when_database_is_unavailable() {
        let pool =
            connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");
        pool.close().await;

        let (status, Json(payload)) =
            health(State(HealthState::new(pool, Arc::new(CooldownStore::new())))).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.database.status, "degraded");
        assert_eq!(payload.service.status, "ready");
        assert!(payload.graph.is_none());
    }

    #[tokio::test]
    async fn router_serves_health_json() {
        let pool =
            connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let response = router(HealthState::new(pool.clone(), Arc::new(CooldownStore::new())))
            .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        pool.close().await;
    }
}
