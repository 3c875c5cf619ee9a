use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};
use hyper_tungstenite::tungstenite::Message;
use log::{error, info, warn};
use tokio::sync::mpsc;

use attendance_server::config::Config;
use attendance_server::engine::Engine;
use attendance_server::state::{AppState, Store};
use attendance_server::{broadcast, commands};

// ============================================
// WebSocket Connection Handler
// ============================================

async fn handle_connection(
    ws: hyper_tungstenite::WebSocketStream<hyper::upgrade::Upgraded>,
    state: Arc<AppState>,
) {
    let observer_id = uuid::Uuid::new_v4().to_string();
    info!("Observer {observer_id} connected");

    let (mut ws_sender, mut ws_receiver) = ws.split();

    // Channel for pushing messages at this WebSocket; a dedicated task
    // forwards them so broadcasts never block on a slow peer.
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if ws_sender.send(message).await.is_err() {
                break;
            }
        }
    });

    // Catch the new observer up: buffered error notices first, then one
    // fresh snapshot pair for this observer only.
    {
        let mut observers = state.observers.lock().await;
        observers.register(observer_id.clone(), tx.clone());
        observers.replay_errors(&tx);
    }
    if let Err(e) = broadcast::send_snapshot(&state, &tx).await {
        error!("Failed to send initial snapshot to {observer_id}: {e}");
    }

    loop {
        tokio::select! {
            incoming = ws_receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        commands::handle_command(&text, &state).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = tx.send(Message::Pong(data));
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Observer {observer_id} closed connection");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("WebSocket error from {observer_id}: {e}");
                        break;
                    }
                    None => break,
                }
            }
            _ = &mut send_task => {
                break;
            }
        }
    }

    state.observers.lock().await.unregister(&observer_id);
    send_task.abort();
    info!("Observer {observer_id} disconnected");
}

// ============================================
// Main Request Handler
// ============================================

async fn handle_request(
    mut req: Request<Body>,
    state: Arc<AppState>,
) -> Result<Response<Body>, hyper::Error> {
    // Health check endpoint
    if req.uri().path() == "/health" {
        return Ok(Response::builder()
            .status(StatusCode::OK)
            .body(Body::from("ok"))
            .unwrap());
    }

    // WebSocket upgrade
    if hyper_tungstenite::is_upgrade_request(&req) {
        match hyper_tungstenite::upgrade(&mut req, None) {
            Ok((response, websocket)) => {
                tokio::spawn(async move {
                    match websocket.await {
                        Ok(ws) => handle_connection(ws, state).await,
                        Err(e) => warn!("WebSocket handshake failed: {e}"),
                    }
                });
                return Ok(response);
            }
            Err(e) => {
                error!("WebSocket upgrade error: {e}");
                return Ok(Response::builder()
                    .status(StatusCode::BAD_REQUEST)
                    .body(Body::from("Invalid WebSocket upgrade request"))
                    .unwrap());
            }
        }
    }

    Ok(Response::builder()
        .status(StatusCode::NOT_FOUND)
        .body(Body::from(
            "Not found. Use /health for health check, or upgrade to WebSocket.",
        ))
        .unwrap())
}

// ============================================
// Main Entry Point
// ============================================

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = Config::load();

    if let Err(e) = std::fs::create_dir_all(&config.qr_dir) {
        error!("Failed to create QR artifact directory: {e}");
        std::process::exit(1);
    }

    // A broken store is fatal: continuing would risk silent data loss.
    let store = match Store::open(&config.database_path).await {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to open store: {e}");
            std::process::exit(1);
        }
    };

    let engine = Engine::new(store, config.qr_dir.clone());
    let state = Arc::new(AppState::new(engine));

    let broadcast_state = state.clone();
    let mut broadcast_task = tokio::spawn(async move { broadcast::run(broadcast_state).await });

    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    let make_svc = make_service_fn(move |_conn| {
        let state = state.clone();
        async move {
            Ok::<_, hyper::Error>(service_fn(move |req| {
                let state = state.clone();
                handle_request(req, state)
            }))
        }
    });

    let server = Server::bind(&addr).serve(make_svc);

    info!("Attendance server listening on http://{addr}");
    info!("WebSocket endpoint: ws://{addr}");
    info!("Health check: http://{addr}/health");

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!("Server error: {e}");
            }
        }
        result = &mut broadcast_task => {
            match result {
                Ok(Err(e)) => error!("Broadcast loop failed: {e}"),
                Ok(Ok(())) => error!("Broadcast loop exited unexpectedly"),
                Err(e) => error!("Broadcast task panicked: {e}"),
            }
            std::process::exit(1);
        }
    }
}
