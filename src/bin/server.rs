//! Reference HTTP/WebSocket host for `Engine` (SPEC_FULL.md §4.10).
//!
//! A single `Engine` behind one `parking_lot::Mutex`, serialized the same
//! way the engine library itself demands (spec.md §5: synchronous,
//! single-threaded core). The server adds concurrency only at the
//! transport layer — many connections, one lock around the engine call.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use parking_lot::Mutex;
use reactive_engine::protocol::{to_http, Request, Response as WireResponse};
use reactive_engine::Engine;
use std::net::SocketAddr;
use std::sync::Arc;

const DB: &str = "default";

#[derive(Parser)]
#[command(name = "engine-server")]
struct Args {
    #[arg(long, default_value_t = reactive_engine::protocol::DEFAULT_PORT)]
    port: u16,
}

#[derive(Clone)]
struct AppState {
    engine: Arc<Mutex<Engine>>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let mut engine = Engine::new();
    engine.create_database(DB).expect("default database");
    let state = AppState {
        engine: Arc::new(Mutex::new(engine)),
    };

    let app = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/api/v1/command", post(handle_command))
        .route("/ws", get(handle_ws))
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    tracing::info!(%addr, "engine-server listening");
    let listener = tokio::net::TcpListener::bind(addr).await.expect("bind");
    axum::serve(listener, app).await.expect("serve");
}

async fn handle_command(State(state): State<AppState>, Json(req): Json<Request>) -> impl IntoResponse {
    let response = dispatch(&state, req);
    match response {
        Ok(body) => (axum::http::StatusCode::OK, Json(body)).into_response(),
        Err(err) => {
            let (status, body) = to_http(&err);
            (
                axum::http::StatusCode::from_u16(status).unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR),
                Json(body),
            )
                .into_response()
        }
    }
}

fn dispatch(state: &AppState, req: Request) -> Result<WireResponse, reactive_engine::EngineError> {
    let mut engine = state.engine.lock();
    match req {
        Request::CreateDatabase { database } => {
            engine.create_database(&database)?;
            Ok(WireResponse::Ok)
        }
        Request::DropDatabase { database } => {
            engine.drop_database(&database)?;
            Ok(WireResponse::Ok)
        }
        Request::TableNames { database } => Ok(WireResponse::TableNames {
            tables: engine.table_names(&database)?,
        }),
        Request::Insert { database, table, rows } => {
            let rows: Vec<Vec<reactive_engine::Value>> = rows
                .into_iter()
                .map(|row| row.iter().map(wire_value_to_value).collect())
                .collect();
            engine.insert(&database, &table, rows)?;
            Ok(WireResponse::Ok)
        }
        Request::Select { .. } => Ok(WireResponse::Error {
            message: "arbitrary plan submission over the wire is not supported by this reference server; \
                      embed the engine directly to build plans with PlanBuilder"
                .to_string(),
        }),
    }
}

fn wire_value_to_value(w: &reactive_engine::protocol::WireValue) -> reactive_engine::Value {
    use reactive_engine::protocol::WireValue;
    use reactive_engine::Value;
    match w {
        WireValue::Null(_) => Value::Null,
        WireValue::Bool(b) => Value::Bool(*b),
        WireValue::Number(f) => Value::Float64(*f),
        WireValue::Text(s) => Value::string(s.clone()),
        WireValue::Bytes(b) => Value::Bytes(b.clone()),
        WireValue::Json(j) => Value::Jsonb(j.clone()),
    }
}

async fn handle_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Each inbound text frame is one `Request` JSON object; the engine's own
/// observer/IVM subscriptions are what actually push proactive updates
/// back out over this socket in a fuller implementation. This reference
/// server wires the request/response half; push delivery is left to a
/// host-specific integration, since spec.md's subscriber callback is a
/// plain closure, not a transport.
async fn handle_socket(mut socket: WebSocket, state: AppState) {
    while let Some(Ok(msg)) = socket.recv().await {
        if let Message::Text(text) = msg {
            let reply = match serde_json::from_str::<Request>(&text) {
                Ok(req) => match dispatch(&state, req) {
                    Ok(body) => serde_json::to_string(&body).unwrap_or_default(),
                    Err(err) => {
                        let (_, body) = to_http(&err);
                        serde_json::to_string(&body).unwrap_or_default()
                    }
                },
                Err(e) => format!("{{\"kind\":\"error\",\"message\":\"invalid request: {e}\"}}"),
            };
            if socket.send(Message::Text(reply)).await.is_err() {
                break;
            }
        }
    }
}
