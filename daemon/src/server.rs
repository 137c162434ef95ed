/// HTTP and WebSocket server: the chat boundary over `WorkflowRegistry`.
use crate::auth::AuthManager;
use crate::chat_stream::{drive_websocket, sse_body};
use crate::config::DaemonConfig;
use crate::errors::{DaemonError, DaemonResult};
use crate::handlers::{handle_cancel, handle_chat, handle_delete, handle_list, handle_pause, handle_status};
use crate::metrics::MetricsCollector;
use crate::types::{ChatRequest, HealthCheckResponse};
use crate::ws_upgrade;
use chrono::Utc;
use hyper::header::AUTHORIZATION;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use pinion_core::WorkflowRegistry;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

#[derive(Clone)]
pub struct RpcServer {
    config: DaemonConfig,
    registry: Arc<WorkflowRegistry>,
    auth: Option<Arc<AuthManager>>,
    metrics: Arc<MetricsCollector>,
    start: Instant,
}

impl RpcServer {
    pub fn new(config: DaemonConfig, registry: Arc<WorkflowRegistry>) -> DaemonResult<Self> {
        config.validate()?;
        let metrics = Arc::new(MetricsCollector::new()?);
        let auth = if config.auth.enabled {
            Some(Arc::new(AuthManager::new(config.auth.clone())?))
        } else {
            None
        };
        Ok(RpcServer { config, registry, auth, metrics, start: Instant::now() })
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    pub async fn start_http(&self) -> DaemonResult<()> {
        let addr = format!("{}:{}", self.config.server.http_addr, self.config.server.http_port);
        let addr: std::net::SocketAddr = addr.parse().map_err(|e| DaemonError::ServerError(format!("invalid address: {e}")))?;

        let registry = self.registry.clone();
        let metrics = self.metrics.clone();
        let auth = self.auth.clone();
        let start = self.start;

        let make_svc = make_service_fn(move |_conn| {
            let registry = registry.clone();
            let metrics = metrics.clone();
            let auth = auth.clone();
            async move {
                Ok::<_, hyper::Error>(service_fn(move |req| {
                    handle_request(req, registry.clone(), metrics.clone(), auth.clone(), start)
                }))
            }
        });

        let server = Server::bind(&addr).serve(make_svc);
        info!("chat HTTP server listening on http://{}", addr);
        server.await.map_err(|e| DaemonError::ServerError(format!("HTTP server error: {e}")))
    }

    pub async fn start_metrics(&self) -> DaemonResult<()> {
        if !self.config.server.enable_metrics {
            return Ok(());
        }
        let addr = format!("{}:{}", self.config.server.http_addr, self.config.server.metrics_port);
        let addr: std::net::SocketAddr = addr.parse().map_err(|e| DaemonError::ServerError(format!("invalid address: {e}")))?;
        let metrics = self.metrics.clone();

        let make_svc = make_service_fn(move |_conn| {
            let metrics = metrics.clone();
            async move { Ok::<_, hyper::Error>(service_fn(move |_req| handle_metrics_request(metrics.clone()))) }
        });

        let server = Server::bind(&addr).serve(make_svc);
        info!("metrics endpoint listening on http://{}", addr);
        server.await.map_err(|e| DaemonError::ServerError(format!("metrics server error: {e}")))
    }

    pub async fn run(&self) -> DaemonResult<()> {
        let http = self.clone();
        let http_handle = tokio::spawn(async move {
            if let Err(e) = http.start_http().await {
                error!("HTTP server error: {:?}", e);
            }
        });

        let metrics = self.clone();
        let metrics_handle = tokio::spawn(async move {
            if let Err(e) = metrics.start_metrics().await {
                error!("metrics server error: {:?}", e);
            }
        });

        tokio::select! {
            _ = http_handle => {},
            _ = metrics_handle => {},
        }
        Ok(())
    }
}

fn bearer_token(req: &Request<Body>) -> Option<String> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|raw| raw.strip_prefix("Bearer ").or_else(|| raw.strip_prefix("bearer ")))
        .map(|s| s.trim().to_string())
}

fn authorize(auth: &Option<Arc<AuthManager>>, req: &Request<Body>) -> Result<(), Box<Response<Body>>> {
    let Some(auth) = auth else { return Ok(()) };
    match bearer_token(req) {
        Some(token) if auth.verify_token(&token).is_ok() || auth.verify_api_key(&token).is_ok() => Ok(()),
        _ => Err(Box::new(error_response(401, "missing or invalid bearer token"))),
    }
}

async fn handle_request(
    req: Request<Body>,
    registry: Arc<WorkflowRegistry>,
    metrics: Arc<MetricsCollector>,
    auth: Option<Arc<AuthManager>>,
    start: Instant,
) -> Result<Response<Body>, hyper::Error> {
    metrics.record_connection();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    if path != "/health" {
        if let Err(response) = authorize(&auth, &req) {
            metrics.record_connection_closed();
            return Ok(*response);
        }
    }

    let result = route(req, &registry, &metrics, &path, &method, start).await;
    metrics.record_connection_closed();
    match result {
        Ok(response) => Ok(response),
        Err(e) => Ok(error_response(e.status_code(), &e.to_string())),
    }
}

async fn route(
    req: Request<Body>,
    registry: &Arc<WorkflowRegistry>,
    metrics: &Arc<MetricsCollector>,
    path: &str,
    method: &Method,
    start: Instant,
) -> Result<Response<Body>, DaemonError> {
    match (method, path) {
        (&Method::GET, "/health") => Ok(json_response(HealthCheckResponse {
            status: "ok".to_string(),
            version: crate::VERSION.to_string(),
            uptime_secs: start.elapsed().as_secs(),
            timestamp: Utc::now(),
        })),

        (&Method::POST, "/chat") => {
            let body = hyper::body::to_bytes(req.into_body()).await.map_err(|e| DaemonError::ServerError(e.to_string()))?;
            let chat_req: ChatRequest = serde_json::from_slice(&body)?;
            metrics.record_workflow_started();
            let response = handle_chat(registry, chat_req).await?;
            Ok(json_response(response))
        }

        (&Method::GET, path) if path.starts_with("/chat/status/") => {
            let id = path.trim_start_matches("/chat/status/");
            Ok(json_response(handle_status(registry, id)?))
        }

        (&Method::GET, path) if path.starts_with("/chat/stream-sse/") => {
            let id = path.trim_start_matches("/chat/stream-sse/").to_string();
            let manager = registry.manager_for_id(&id).ok_or_else(|| pinion_core::errors::WorkflowError::NotFound(id.clone()))?;
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/event-stream")
                .header("Cache-Control", "no-cache")
                .body(sse_body(manager, id))
                .unwrap())
        }

        (&Method::GET, path) if path.starts_with("/chat/stream/") => {
            let id = path.trim_start_matches("/chat/stream/").to_string();
            let manager = registry.manager_for_id(&id).ok_or_else(|| pinion_core::errors::WorkflowError::NotFound(id.clone()))?;
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/plain; charset=utf-8")
                .body(sse_body(manager, id))
                .unwrap())
        }

        (&Method::GET, path) if path.starts_with("/chat/ws/") => {
            let id = path.trim_start_matches("/chat/ws/").to_string();
            let manager = registry.manager_for_id(&id).ok_or_else(|| pinion_core::errors::WorkflowError::NotFound(id.clone()))?;
            if !ws_upgrade::is_upgrade_request(req.headers()) {
                return Ok(error_response(400, "expected a websocket upgrade request"));
            }
            ws_upgrade::upgrade(req, move |ws| drive_websocket(ws, manager, id)).map_err(DaemonError::ServerError)
        }

        (&Method::POST, path) if path.starts_with("/chat/pause/") => {
            let id = path.trim_start_matches("/chat/pause/");
            Ok(json_response(handle_pause(registry, id)?))
        }

        (&Method::POST, path) if path.starts_with("/chat/cancel/") => {
            let id = path.trim_start_matches("/chat/cancel/");
            let response = handle_cancel(registry, id)?;
            metrics.record_workflow_finished(false);
            Ok(json_response(response))
        }

        (&Method::GET, "/chat/list") => Ok(json_response(handle_list(registry))),

        (&Method::DELETE, path) if path.starts_with("/chat/") => {
            let id = path.trim_start_matches("/chat/");
            Ok(json_response(handle_delete(registry, id)?))
        }

        _ => Ok(error_response(404, "not found")),
    }
}

fn json_response<T: Serialize>(data: T) -> Response<Body> {
    let body = serde_json::to_string(&data).unwrap_or_else(|_| "{}".to_string());
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn error_response(status: u16, message: &str) -> Response<Body> {
    Response::builder()
        .status(StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR))
        .header("Content-Type", "application/json")
        .body(Body::from(format!(r#"{{"error":"{message}"}}"#)))
        .unwrap()
}

async fn handle_metrics_request(metrics: Arc<MetricsCollector>) -> Result<Response<Body>, hyper::Error> {
    match metrics.gather_metrics() {
        Ok(body) => Ok(Response::builder().status(StatusCode::OK).header("Content-Type", "text/plain").body(Body::from(body)).unwrap()),
        Err(e) => {
            error!("failed to gather metrics: {:?}", e);
            Ok(Response::builder().status(StatusCode::INTERNAL_SERVER_ERROR).body(Body::from("failed to gather metrics")).unwrap())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pinion_core::AppConfig;

    #[tokio::test]
    async fn server_creation_succeeds_with_default_config() {
        let registry = Arc::new(WorkflowRegistry::init(&AppConfig::default()));
        let result = RpcServer::new(DaemonConfig::default(), registry);
        assert!(result.is_ok());
    }
}
