/// SSE and WebSocket framing over `WorkflowManager::stream`, adapted from the
/// heartbeat-ping / `tokio::select!` fan-in idiom used for event streaming.
use crate::types::StreamFrame;
use chrono::Utc;
use futures::StreamExt;
use hyper::Body;
use pinion_core::runtime::terminal_status;
use pinion_core::state::WorkflowState;
use pinion_core::WorkflowManager;
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, warn};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

fn last_ai_text(state: &WorkflowState) -> String {
    state
        .messages()
        .iter()
        .rev()
        .find(|m| m.is_ai())
        .map(|m| m.content().to_string())
        .unwrap_or_default()
}

fn status_label(state: &WorkflowState) -> &'static str {
    if state.workflow_paused() {
        "paused"
    } else {
        match terminal_status(state) {
            Some("failed") => "failed",
            Some(_) => "completed",
            None => "running",
        }
    }
}

fn frame(workflow_id: &str, state: &WorkflowState) -> StreamFrame {
    StreamFrame {
        content: last_ai_text(state),
        workflow_id: workflow_id.to_string(),
        status: status_label(state).to_string(),
        timestamp: Utc::now(),
    }
}

/// Renders `/chat/stream-sse/{id}` as a `text/event-stream` body: one `data:`
/// frame per node completion, a heartbeat comment on a timer, and a final
/// frame once the workflow reaches a terminal or paused state.
pub fn sse_body(manager: Arc<WorkflowManager>, id: String) -> Body {
    let stream = async_stream::stream! {
        let mut events = match manager.stream(&id) {
            Ok(events) => events,
            Err(e) => {
                yield Ok::<_, std::io::Error>(format!("event: error\ndata: {{\"error\":\"{e}\"}}\n\n"));
                return;
            }
        };
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                next = events.next() => {
                    match next {
                        Some(event) => {
                            let f = frame(&id, &event.accumulated);
                            let done = f.status != "running";
                            yield Ok(format!("data: {}\n\n", serde_json::to_string(&f).unwrap_or_default()));
                            if done {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = heartbeat.tick() => {
                    yield Ok(": heartbeat\n\n".to_string());
                }
            }
        }
    };
    Body::wrap_stream(stream)
}

/// Drives a WebSocket connection already upgraded by the caller, mirroring
/// `sse_body`'s frames as JSON text messages plus protocol-level pings.
pub async fn drive_websocket<S>(ws: tokio_tungstenite::WebSocketStream<S>, manager: Arc<WorkflowManager>, id: String)
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    use futures::SinkExt;

    let (mut sink, mut source) = ws.split();
    let mut events = match manager.stream(&id) {
        Ok(events) => events,
        Err(e) => {
            let _ = sink
                .send(WsMessage::Text(format!("{{\"error\":\"{e}\"}}")))
                .await;
            return;
        }
    };
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            incoming = source.next() => {
                match incoming {
                    Some(Ok(WsMessage::Close(_))) | None => {
                        debug!(workflow_id = %id, "client closed chat websocket");
                        break;
                    }
                    Some(Ok(WsMessage::Ping(payload))) => {
                        if sink.send(WsMessage::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(workflow_id = %id, error = %e, "chat websocket error");
                        break;
                    }
                }
            }
            next = events.next() => {
                match next {
                    Some(event) => {
                        let f = frame(&id, &event.accumulated);
                        let done = f.status != "running";
                        let json = serde_json::to_string(&f).unwrap_or_default();
                        if sink.send(WsMessage::Text(json)).await.is_err() {
                            break;
                        }
                        if done {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = heartbeat.tick() => {
                if sink.send(WsMessage::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }
}
