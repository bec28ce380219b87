use std::sync::Arc;

use safeflame::config::ConfigValue;
use safeflame::dispatch::{AlertLog, AlertSink, DispatchedAlert};
use safeflame::types::unix_now;
use safeflame::{EngineError, HazardEngine, KitchenStatus, Seconds, Zone};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};

/// Fan-out of dispatched alerts to live dashboard subscribers.
#[derive(Clone)]
pub struct AlertBus {
    pub alerts_tx: broadcast::Sender<DispatchedAlert>,
}

impl AlertBus {
    pub fn new(capacity: usize) -> Self {
        let (alerts_tx, _) = broadcast::channel::<DispatchedAlert>(capacity.max(1));
        Self { alerts_tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DispatchedAlert> {
        self.alerts_tx.subscribe()
    }
}

impl AlertSink for AlertBus {
    fn deliver(&self, alert: &DispatchedAlert) {
        // No subscribers is the normal idle case.
        let _ = self.alerts_tx.send(alert.clone());
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
}

/// Body of `POST /api/config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigUpdate {
    pub key: String,
    pub value: ConfigValue,
}

type Clock = Arc<dyn Fn() -> Seconds + Send + Sync>;

/// Everything the control surface needs: the engine behind its single lock, the
/// alert history and the live alert bus.
#[derive(Clone)]
pub struct KitchenHandle {
    pub engine: Arc<Mutex<HazardEngine>>,
    pub log: AlertLog,
    pub bus: AlertBus,
    clock: Clock,
}

impl KitchenHandle {
    pub fn new(engine: HazardEngine, log: AlertLog, bus: AlertBus) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            log,
            bus,
            clock: Arc::new(unix_now),
        }
    }

    /// Replaces the wall clock, e.g. with the timestamp of the latest replayed tick.
    pub fn with_clock(mut self, clock: impl Fn() -> Seconds + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn now(&self) -> Seconds {
        (self.clock)()
    }

    pub async fn status(&self) -> KitchenStatus {
        let now = self.now();
        self.engine.lock().await.status(now)
    }

    pub fn alerts(&self, limit: usize) -> Vec<DispatchedAlert> {
        self.log.recent(limit)
    }

    pub async fn zones(&self) -> Vec<Zone> {
        self.engine.lock().await.zones().to_vec()
    }

    pub async fn replace_zones(&self, zones: Vec<Zone>) -> Result<(), EngineError> {
        self.engine.lock().await.set_zones(zones)
    }

    pub async fn force_off(&self, zone_name: &str) -> Result<(), EngineError> {
        let now = self.now();
        self.engine.lock().await.force_off(zone_name, now)
    }

    pub async fn update_config(&self, update: &ConfigUpdate) -> Result<(), EngineError> {
        self.engine.lock().await.update_config(&update.key, &update.value)
    }
}

#[cfg(feature = "web")]
pub fn router(handle: KitchenHandle) -> axum::Router {
    use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
    use axum::extract::{Path, Query, State};
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use futures_util::{SinkExt, StreamExt};
    use safeflame::dispatch::ALERT_LOG_CAPACITY;
    use tokio::sync::broadcast::error::RecvError;

    struct ApiError(EngineError);

    impl IntoResponse for ApiError {
        fn into_response(self) -> Response {
            let status = match self.0 {
                EngineError::UnknownZone(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::BAD_REQUEST,
            };
            (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
        }
    }

    #[derive(Deserialize)]
    struct AlertQuery {
        limit: Option<usize>,
    }

    async fn status(State(h): State<KitchenHandle>) -> impl IntoResponse {
        Json(h.status().await)
    }

    async fn alerts(State(h): State<KitchenHandle>, Query(q): Query<AlertQuery>) -> impl IntoResponse {
        Json(h.alerts(q.limit.unwrap_or(ALERT_LOG_CAPACITY)))
    }

    async fn get_zones(State(h): State<KitchenHandle>) -> impl IntoResponse {
        Json(h.zones().await)
    }

    async fn set_zones(State(h): State<KitchenHandle>, Json(zones): Json<Vec<Zone>>) -> Result<StatusCode, ApiError> {
        h.replace_zones(zones).await.map_err(ApiError)?;
        Ok(StatusCode::NO_CONTENT)
    }

    async fn zone_off(State(h): State<KitchenHandle>, Path(name): Path<String>) -> Result<StatusCode, ApiError> {
        h.force_off(&name).await.map_err(ApiError)?;
        Ok(StatusCode::NO_CONTENT)
    }

    async fn update_config(
        State(h): State<KitchenHandle>,
        Json(update): Json<ConfigUpdate>,
    ) -> Result<StatusCode, ApiError> {
        h.update_config(&update).await.map_err(ApiError)?;
        Ok(StatusCode::NO_CONTENT)
    }

    async fn ws_alerts(ws: WebSocketUpgrade, State(h): State<KitchenHandle>) -> impl IntoResponse {
        ws.on_upgrade(move |socket| ws_conn(socket, h.bus))
    }

    async fn ws_conn(socket: WebSocket, bus: AlertBus) {
        let mut rx = bus.subscribe();
        let (mut ws_tx, mut ws_rx) = socket.split();
        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Ok(alert) => {
                        let Ok(text) = serde_json::to_string(&alert) else { continue };
                        if ws_tx.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "dashboard client lagged, alerts skipped");
                    }
                    Err(RecvError::Closed) => break,
                },
                incoming = ws_rx.next() => match incoming {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/api/status", get(status))
        .route("/api/alerts", get(alerts))
        .route("/api/zones", get(get_zones).post(set_zones))
        .route("/api/zones/:name/off", post(zone_off))
        .route("/api/config", post(update_config))
        .route("/ws/alerts", get(ws_alerts))
        .with_state(handle)
}

#[cfg(feature = "web")]
pub async fn start_server(handle: KitchenHandle, cfg: ServerConfig) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    tracing::info!("dashboard listening on http://{}", cfg.bind_addr);
    let app = router(handle);
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("dashboard server stopped: {e}");
        }
    });
    Ok(server)
}

#[cfg(not(feature = "web"))]
pub async fn start_server(_handle: KitchenHandle, _cfg: ServerConfig) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    Err(anyhow::anyhow!("web feature not enabled for safeflame_dashboard"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use safeflame::{AlertEvent, EngineConfig, Hazard, Severity};

    fn handle() -> KitchenHandle {
        let engine = HazardEngine::with_zones(EngineConfig::default(), vec![Zone::new("B1", 0, 0, 50, 50)]).unwrap();
        KitchenHandle::new(engine, AlertLog::default(), AlertBus::new(8)).with_clock(|| 1000.0)
    }

    #[tokio::test]
    async fn bus_delivers_to_subscribers() {
        let bus = AlertBus::new(4);
        let mut rx = bus.subscribe();
        let alert = DispatchedAlert { alert: AlertEvent::new(Hazard::Smoke, Severity::Critical, 1.0), advice: None };
        bus.deliver(&alert);
        assert_eq!(rx.recv().await.unwrap(), alert);
    }

    #[test]
    fn bus_without_subscribers_drops_quietly() {
        let bus = AlertBus::new(1);
        bus.deliver(&DispatchedAlert { alert: AlertEvent::new(Hazard::Flame, Severity::Warning, 1.0), advice: None });
    }

    #[tokio::test]
    async fn zone_replacement_rejects_duplicates() {
        let h = handle();
        let dup = vec![Zone::new("B1", 0, 0, 1, 1), Zone::new("B1", 5, 5, 1, 1)];
        assert!(matches!(h.replace_zones(dup).await, Err(EngineError::DuplicateZone(_))));
        h.replace_zones(vec![Zone::new("B2", 0, 0, 10, 10)]).await.unwrap();
        let names: Vec<String> = h.zones().await.into_iter().map(|z| z.name).collect();
        assert_eq!(names, vec!["B2".to_string()]);
    }

    #[tokio::test]
    async fn force_off_and_status_use_the_handle_clock() {
        let h = handle();
        h.force_off("B1").await.unwrap();
        let status = h.status().await;
        assert_eq!(status.zones["B1"].state, safeflame::BurnerState::Off);
        assert!(matches!(h.force_off("nope").await, Err(EngineError::UnknownZone(_))));
    }

    #[tokio::test]
    async fn config_update_parses_from_json() {
        let h = handle();
        let update: ConfigUpdate =
            serde_json::from_str(r#"{"key": "alert_cooldown_seconds", "value": 12}"#).unwrap();
        h.update_config(&update).await.unwrap();
        assert_eq!(h.engine.lock().await.config().tracker.alert_cooldown_seconds, 12.0);

        let bad: ConfigUpdate = serde_json::from_str(r#"{"key": "assume_burners_active", "value": 3}"#).unwrap();
        assert!(h.update_config(&bad).await.is_err());
    }

    #[cfg(feature = "web")]
    mod routes {
        use super::*;
        use axum::body::{to_bytes, Body};
        use axum::http::{Method, Request, StatusCode};
        use tower::ServiceExt;

        async fn call(h: &KitchenHandle, method: Method, uri: &str, body: Option<&str>) -> (StatusCode, Vec<u8>) {
            let mut request = Request::builder().method(method).uri(uri);
            let body = match body {
                Some(json) => {
                    request = request.header("content-type", "application/json");
                    Body::from(json.to_string())
                }
                None => Body::empty(),
            };
            let response = router(h.clone()).oneshot(request.body(body).unwrap()).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            (status, bytes.to_vec())
        }

        #[tokio::test]
        async fn health_check_answers_ok() {
            let (status, body) = call(&handle(), Method::GET, "/healthz", None).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, b"ok");
        }

        #[tokio::test]
        async fn zone_off_maps_unknown_zone_to_not_found() {
            let h = handle();
            let (status, body) = call(&h, Method::POST, "/api/zones/B9/off", None).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
            let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert!(error["error"].as_str().unwrap().contains("B9"));

            let (status, _) = call(&h, Method::POST, "/api/zones/B1/off", None).await;
            assert_eq!(status, StatusCode::NO_CONTENT);
        }

        #[tokio::test]
        async fn config_route_accepts_key_value_bodies() {
            let h = handle();
            let (status, _) =
                call(&h, Method::POST, "/api/config", Some(r#"{"key": "alert_cooldown_seconds", "value": 12}"#)).await;
            assert_eq!(status, StatusCode::NO_CONTENT);
            assert_eq!(h.engine.lock().await.config().tracker.alert_cooldown_seconds, 12.0);

            let (status, body) = call(&h, Method::POST, "/api/config", Some(r#"{"key": "VIDEO_PATH", "value": "x"}"#)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert!(error["error"].as_str().unwrap().contains("VIDEO_PATH"));
        }

        #[tokio::test]
        async fn zones_round_trip_and_bad_zones_are_rejected() {
            let h = handle();
            let (status, _) =
                call(&h, Method::POST, "/api/zones", Some(r#"[{"name": "B1", "x": 0, "y": 0, "w": 0, "h": 10}]"#)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);

            let (status, _) =
                call(&h, Method::POST, "/api/zones", Some(r#"[{"name": "B2", "x": 5, "y": 5, "w": 10, "h": 10}]"#)).await;
            assert_eq!(status, StatusCode::NO_CONTENT);

            let (status, body) = call(&h, Method::GET, "/api/zones", None).await;
            assert_eq!(status, StatusCode::OK);
            let zones: Vec<Zone> = serde_json::from_slice(&body).unwrap();
            assert_eq!(zones, vec![Zone::new("B2", 5, 5, 10, 10)]);
        }

        #[tokio::test]
        async fn alerts_route_honors_limit() {
            let h = handle();
            for t in [1.0, 2.0] {
                h.log.deliver(&DispatchedAlert { alert: AlertEvent::new(Hazard::Smoke, Severity::Critical, t), advice: None });
            }
            let (status, body) = call(&h, Method::GET, "/api/alerts?limit=1", None).await;
            assert_eq!(status, StatusCode::OK);
            let alerts: Vec<serde_json::Value> = serde_json::from_slice(&body).unwrap();
            assert_eq!(alerts.len(), 1);

            let (_, body) = call(&h, Method::GET, "/api/alerts", None).await;
            let alerts: Vec<serde_json::Value> = serde_json::from_slice(&body).unwrap();
            assert_eq!(alerts.len(), 2);
        }

        #[tokio::test]
        async fn status_route_lists_zones() {
            let (status, body) = call(&handle(), Method::GET, "/api/status", None).await;
            assert_eq!(status, StatusCode::OK);
            let status: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert!(status["zones"].get("B1").is_some());
        }
    }

    #[cfg(not(feature = "web"))]
    #[tokio::test]
    async fn server_requires_web_feature() {
        let cfg = ServerConfig { bind_addr: "127.0.0.1:0".into() };
        assert!(start_server(handle(), cfg).await.is_err());
    }
}
