//! OBD-II Dashboard Server
//!
//! Setup form, gauge dashboard and WebSocket push channel in front of the
//! polling loop.

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use obd_protocol::ObdClient;
use obd_scheduler::{Broadcaster, ObdLink, PollStatus, PollingLoop, SchedulerConfig, PLACEHOLDER};
use serde::Serialize;
use signals::{SelectionStore, SignalCatalog};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub mod config;
mod routes;
pub mod views;

pub use config::Settings;

/// Application state shared across handlers
pub struct AppState {
    /// Signals the dashboard knows about
    pub catalog: Arc<SignalCatalog>,
    /// Authoritative enable/disable selection
    pub selection: Arc<SelectionStore>,
    /// Snapshot fan-out to viewer sessions
    pub broadcaster: Broadcaster,
    /// Counters published by the polling loop
    pub poll_status: Arc<PollStatus>,
    /// Prometheus exposition, when a recorder is installed
    pub metrics: Option<PrometheusHandle>,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Create new application state
    pub fn new(
        selection: Arc<SelectionStore>,
        broadcaster: Broadcaster,
        poll_status: Arc<PollStatus>,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            catalog: selection.catalog().clone(),
            selection,
            broadcaster,
            poll_status,
            metrics,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
        }
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: ComponentStatus,
    pub metrics: SystemMetrics,
}

/// Component status
#[derive(Debug, Serialize)]
pub struct ComponentStatus {
    pub obd: ComponentHealth,
    pub poller: ComponentHealth,
}

/// Individual component health
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub detail: Option<String>,
}

/// System metrics
#[derive(Debug, Serialize)]
pub struct SystemMetrics {
    pub poll_cycles: u64,
    pub snapshots_published: u64,
    pub viewer_sessions: usize,
    pub enabled_signals: usize,
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(routes::setup::index))
        .route(
            "/setup",
            get(routes::setup::show).post(routes::setup::submit),
        )
        .route("/dashboard", get(routes::dashboard::show))
        .route("/ws", get(routes::push::upgrade))
        .route("/api/v1/signals", get(routes::setup::list_signals))
        .route("/api/v1/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let connected = state.poll_status.connected();
    let cycles = state.poll_status.cycles();
    let selection = state.selection.current();

    let response = HealthResponse {
        status: if connected { "healthy" } else { "degraded" }.to_string(),
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        components: ComponentStatus {
            obd: ComponentHealth {
                status: if connected { "ok" } else { "disconnected" }.to_string(),
                detail: (!connected).then(|| format!("publishing placeholder {PLACEHOLDER}")),
            },
            poller: ComponentHealth {
                status: if cycles > 0 { "ok" } else { "starting" }.to_string(),
                detail: None,
            },
        },
        metrics: SystemMetrics {
            poll_cycles: cycles,
            snapshots_published: state.poll_status.published(),
            viewer_sessions: state.broadcaster.session_count(),
            enabled_signals: selection.enabled(&state.catalog).count(),
        },
    };

    Json(response)
}

/// Prometheus text exposition
async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Initialize logging. `RUST_LOG` wins over the configured level.
pub fn init_logging(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_level));

    let result = if settings.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
    };
    if let Err(err) = result {
        eprintln!("Logging already initialised: {err}");
    }
}

/// Run the server until Ctrl-C
pub async fn run_server(settings: Settings) -> anyhow::Result<()> {
    let metrics = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(err) => {
            warn!(error = %err, "Prometheus recorder not installed, /metrics disabled");
            None
        }
    };

    let catalog = Arc::new(SignalCatalog::standard());
    let selection = Arc::new(SelectionStore::open(settings.selection_path(), catalog.clone()));

    let mut client = if settings.mock {
        info!("Using simulated OBD-II adapter");
        ObdClient::mock()
    } else {
        ObdClient::new(&settings.device, settings.baud_rate)
    };
    client.set_timeout(settings.query_timeout());
    let link = ObdLink::new(client, settings.reconnect_interval());

    let broadcaster = Broadcaster::default();
    let mut poller = PollingLoop::new(
        link,
        catalog,
        selection.subscribe(),
        broadcaster.clone(),
        SchedulerConfig {
            interval: settings.poll_interval(),
            query_timeout: settings.query_timeout(),
            placeholder: PLACEHOLDER,
        },
    );
    let state = Arc::new(AppState::new(
        selection,
        broadcaster,
        poller.status(),
        metrics,
    ));

    let device = settings.device.clone();
    tokio::spawn(async move {
        match poller.link_mut().connect().await {
            Ok(()) => info!(device = %device, "OBD-II adapter connected"),
            Err(err) => warn!(device = %device, error = %err, "OBD-II adapter unavailable, will retry"),
        }
        poller.run().await;
    });

    let addr = settings.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Dashboard listening on http://{}", addr);

    axum::serve(
        listener,
        create_router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use obd_scheduler::Snapshot;
    use signals::SignalState;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn test_state(dir: &TempDir) -> Arc<AppState> {
        let catalog = Arc::new(SignalCatalog::standard());
        let store = Arc::new(SelectionStore::open(
            dir.path().join("config.json"),
            catalog,
        ));
        Arc::new(AppState::new(
            store,
            Broadcaster::default(),
            Arc::new(PollStatus::default()),
            None,
        ))
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_root_redirects_to_setup() {
        let dir = TempDir::new().unwrap();
        let app = create_router(test_state(&dir));

        let response = app.oneshot(get_request("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/setup");
    }

    #[tokio::test]
    async fn test_setup_form_renders_catalog() {
        let dir = TempDir::new().unwrap();
        let app = create_router(test_state(&dir));

        let response = app.oneshot(get_request("/setup")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_string(response).await;
        for key in SignalCatalog::standard().keys() {
            assert!(html.contains(&format!("name=\"{key}\" value=\"Enable\" checked")));
        }
    }

    #[tokio::test]
    async fn test_setup_submit_persists_and_redirects() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        let app = create_router(state.clone());

        let request = Request::builder()
            .method("POST")
            .uri("/setup")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("RPM=Enable&Speed=Disable&MAF=Not+applicable"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/dashboard");

        let selection = state.selection.current();
        assert_eq!(selection.state("RPM"), SignalState::Enabled);
        assert_eq!(selection.state("Speed"), SignalState::Disabled);
        assert_eq!(selection.state("MAF"), SignalState::NotApplicable);
        // Omitted fields are not carried over
        assert_eq!(selection.state("Throttle"), SignalState::NotApplicable);

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("config.json")).unwrap())
                .unwrap();
        assert_eq!(saved["RPM"], "Enable");
        assert_eq!(saved["Speed"], "Disable");
    }

    #[tokio::test]
    async fn test_dashboard_shows_enabled_only() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        state.selection.update(
            &[("Speed", "Enable"), ("RPM", "Disable")]
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        let app = create_router(state);

        let response = app.oneshot(get_request("/dashboard")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_string(response).await;
        assert!(html.contains("id=\"Speed\""));
        assert!(!html.contains("id=\"RPM\""));
        assert!(!html.contains("id=\"MAF\""));
    }

    #[tokio::test]
    async fn test_signals_endpoint() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        state.selection.update(
            &[("RPM", "Enable")]
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        let app = create_router(state);

        let response = app.oneshot(get_request("/api/v1/signals")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["count"], 7);
        assert_eq!(json["enabled_count"], 1);
        assert_eq!(json["data"][0]["key"], "RPM");
        assert_eq!(json["data"][0]["unit"], "rpm");
        assert_eq!(json["data"][0]["pid"], "0C");
        assert_eq!(json["data"][1]["state"], "Not applicable");
    }

    #[tokio::test]
    async fn test_health_reports_degraded_without_link() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        let _viewer = state.broadcaster.subscribe();
        let app = create_router(state);

        let response = app.oneshot(get_request("/api/v1/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["components"]["obd"]["status"], "disconnected");
        assert_eq!(json["metrics"]["viewer_sessions"], 1);
        assert_eq!(json["metrics"]["enabled_signals"], 7);
    }

    #[tokio::test]
    async fn test_metrics_not_found_without_recorder() {
        let dir = TempDir::new().unwrap();
        let app = create_router(test_state(&dir));

        let response = app.oneshot(get_request("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_push_frame_format() {
        let mut snapshot = Snapshot::new();
        snapshot.insert("RPM", 850.0);
        let frame: serde_json::Value =
            serde_json::from_str(&snapshot.to_push_json().unwrap()).unwrap();
        assert_eq!(frame["event"], "obd_data");
        assert_eq!(frame["data"]["RPM"], 850.0);
    }

    #[tokio::test]
    async fn test_server_end_to_end() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        let addr = spawn_server(state.clone()).await;

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();
        let response = client
            .post(format!("http://{addr}/setup"))
            .form(&[("RPM", "Enable"), ("Speed", "Enable")])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::SEE_OTHER);

        let html = client
            .get(format!("http://{addr}/dashboard"))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(html.contains("id=\"RPM\""));
        assert!(html.contains("id=\"Speed\""));
        assert!(!html.contains("id=\"FuelLevel\""));
        assert_eq!(state.selection.current().enabled(&state.catalog).count(), 2);
    }

    async fn spawn_server(state: Arc<AppState>) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = create_router(state);
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });
        addr
    }

    async fn wait_for_sessions(broadcaster: &Broadcaster, expected: usize) {
        for _ in 0..200 {
            if broadcaster.session_count() == expected {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!(
            "expected {expected} viewer sessions, found {}",
            broadcaster.session_count()
        );
    }

    #[tokio::test]
    async fn test_push_channel_streams_snapshots() {
        use futures_util::StreamExt;

        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        let addr = spawn_server(state.clone()).await;

        let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
            .await
            .unwrap();
        wait_for_sessions(&state.broadcaster, 1).await;

        let mut snapshot = Snapshot::new();
        snapshot.insert("RPM", 2500.0);
        snapshot.insert("Speed", 0.0);
        assert_eq!(state.broadcaster.publish(snapshot), 1);

        let message = tokio::time::timeout(std::time::Duration::from_secs(2), socket.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let frame: serde_json::Value =
            serde_json::from_str(&message.into_text().unwrap()).unwrap();
        assert_eq!(frame["event"], "obd_data");
        assert_eq!(frame["data"]["RPM"], 2500.0);
        assert_eq!(frame["data"]["Speed"], 0.0);

        socket.close(None).await.unwrap();
        wait_for_sessions(&state.broadcaster, 0).await;
    }

    #[tokio::test]
    async fn test_push_channel_fans_out_to_every_viewer() {
        use futures_util::StreamExt;

        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        let addr = spawn_server(state.clone()).await;

        let url = format!("ws://{addr}/ws");
        let (mut first, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
        let (mut second, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
        wait_for_sessions(&state.broadcaster, 2).await;

        let mut snapshot = Snapshot::new();
        snapshot.insert("CoolantTemp", 88.0);
        assert_eq!(state.broadcaster.publish(snapshot), 2);

        for socket in [&mut first, &mut second] {
            let message = tokio::time::timeout(std::time::Duration::from_secs(2), socket.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            let frame: serde_json::Value =
                serde_json::from_str(&message.into_text().unwrap()).unwrap();
            assert_eq!(frame["data"]["CoolantTemp"], 88.0);
        }

        // Dropping one viewer leaves the other attached
        drop(first);
        wait_for_sessions(&state.broadcaster, 1).await;
        second.close(None).await.unwrap();
        wait_for_sessions(&state.broadcaster, 0).await;
    }
}
