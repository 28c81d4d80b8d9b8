use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use meowphone_match_server::config::MatchConfig;
use meowphone_match_server::constants::TICK_PERIOD_MS;
use meowphone_match_server::controller::PhaseController;
use meowphone_match_server::logging::{init_logging, LogFormat};
use meowphone_match_server::runtime::{spawn_match, MatchClient};
use meowphone_match_server::server_protocol::{parse_client_message, ParsedClientMessage};
use meowphone_match_server::server_utils::{
    normalize_bot_index, normalize_character_kind, sanitize_name,
};
use meowphone_match_server::sim::SimWorld;
use meowphone_match_server::types::MatchEvent;
use rand::distr::Alphanumeric;
use rand::Rng;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{error, info, warn};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

type SharedState = Arc<Mutex<ServerState>>;

#[derive(Clone)]
struct AppState {
    shared: SharedState,
    matches: MatchClient,
}

#[derive(Clone)]
struct ClientContext {
    tx: mpsc::Sender<OutboundMessage>,
    player_id: Option<String>,
}

#[derive(Clone, Debug)]
enum OutboundMessage {
    Text(String),
    Close { code: u16, reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum QueuePolicy {
    DropOnFull,
    DisconnectOnFull,
}

#[derive(Default)]
struct ServerState {
    clients: HashMap<String, ClientContext>,
    reconnect_tokens: HashMap<String, String>,
    active_client_by_player_id: HashMap<String, String>,
}

#[tokio::main]
async fn main() {
    let verbosity = std::env::var("LOG_VERBOSITY")
        .ok()
        .and_then(|value| value.parse::<u8>().ok())
        .unwrap_or(1);
    let format = match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => LogFormat::Json,
        _ => LogFormat::Human,
    };
    init_logging(format, verbosity);

    let port = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let config = match std::env::var("MATCH_CONFIG").map(PathBuf::from) {
        Ok(path) => match MatchConfig::load(&path) {
            Ok(config) => config,
            Err(err) => {
                error!(path = %path.display(), %err, "failed to load match config");
                std::process::exit(2);
            }
        },
        Err(_) => MatchConfig::default(),
    };

    let world_seed = config.seed.unwrap_or_else(rand::random);
    let controller = PhaseController::new(config, SimWorld::furnished(world_seed));
    let handle = spawn_match(controller, Duration::from_millis(TICK_PERIOD_MS));

    let shared: SharedState = Arc::new(Mutex::new(ServerState::default()));
    start_event_relay(shared.clone(), handle.client().subscribe());

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/ws", get(ws_handler))
        .with_state(AppState {
            shared,
            matches: handle.client(),
        });

    let bind_addr = format!("0.0.0.0:{port}");
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(%bind_addr, %err, "failed to bind server socket");
            std::process::exit(1);
        }
    };

    info!(port, "listening");
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;
    if let Err(err) = served {
        error!(%err, "server runtime failed");
    }

    match handle.shutdown().await {
        Ok(controller) => info!(phase = ?controller.phase(), "match stopped"),
        Err(err) => error!(%err, "match task did not stop cleanly"),
    }
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(app): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(app, socket))
}

async fn handle_socket(app: AppState, socket: WebSocket) {
    let client_id = make_id("client");
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(256);

    {
        let mut guard = app.shared.lock().await;
        guard.clients.insert(
            client_id.clone(),
            ClientContext {
                tx: tx.clone(),
                player_id: None,
            },
        );
    }

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let should_close = matches!(outbound, OutboundMessage::Close { .. });
            let result = match outbound {
                OutboundMessage::Text(payload) => {
                    ws_sender.send(Message::Text(payload.into())).await
                }
                OutboundMessage::Close { code, reason } => {
                    let frame = CloseFrame {
                        code,
                        reason: reason.into(),
                    };
                    ws_sender.send(Message::Close(Some(frame))).await
                }
            };
            if result.is_err() || should_close {
                break;
            }
        }
    });

    while let Some(received) = ws_receiver.next().await {
        let Ok(message) = received else {
            break;
        };

        match message {
            Message::Text(raw) => {
                handle_client_message(&app, &client_id, raw.to_string()).await;
            }
            Message::Binary(raw) => {
                if let Ok(text) = String::from_utf8(raw.to_vec()) {
                    handle_client_message(&app, &client_id, text).await;
                } else {
                    send_error_to_client(&app.shared, &client_id, "invalid utf8 message").await;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    handle_disconnect(&app, &client_id).await;
    drop(tx);
    let _ = writer.await;
}

async fn handle_client_message(app: &AppState, client_id: &str, raw: String) {
    let Some(message) = parse_client_message(&raw) else {
        send_error_to_client(&app.shared, client_id, "invalid message").await;
        return;
    };

    let message = match message {
        ParsedClientMessage::Hello {
            name,
            reconnect_token,
        } => {
            handle_hello(app, client_id, name, reconnect_token).await;
            return;
        }
        ParsedClientMessage::Ping { t } => {
            let mut guard = app.shared.lock().await;
            send_to_client(
                &mut guard,
                client_id,
                &json!({
                    "type": "pong",
                    "t": t,
                }),
                QueuePolicy::DisconnectOnFull,
            );
            return;
        }
        other => other,
    };

    let player_id = {
        let guard = app.shared.lock().await;
        guard
            .clients
            .get(client_id)
            .and_then(|ctx| ctx.player_id.clone())
    };
    let Some(player_id) = player_id else {
        send_error_to_client(&app.shared, client_id, "send hello first").await;
        return;
    };

    let (accepted, rejection) = match message {
        ParsedClientMessage::Ready { ready } => (
            app.matches.set_ready(&player_id, ready).await,
            "ready is only accepted in the lobby",
        ),
        ParsedClientMessage::SwitchTeam { team } => (
            app.matches.switch_team(&player_id, team).await,
            "team change rejected",
        ),
        ParsedClientMessage::ChooseCharacter { kind } => match normalize_character_kind(kind) {
            Some(kind) => (
                app.matches.choose_character(&player_id, kind).await,
                "character choice rejected",
            ),
            None => (Ok(false), "unknown character kind"),
        },
        ParsedClientMessage::AddBot { team } => (
            app.matches.add_bot(&player_id, team).await,
            "bot could not be added",
        ),
        ParsedClientMessage::RemoveBot { team, index } => match normalize_bot_index(index) {
            Some(index) => (
                app.matches.remove_bot(&player_id, team, index).await,
                "bot could not be removed",
            ),
            None => (Ok(false), "bot index out of range"),
        },
        ParsedClientMessage::RestartLobby => (
            app.matches.restart_lobby(&player_id).await,
            "only the host can restart",
        ),
        ParsedClientMessage::Hello { .. } | ParsedClientMessage::Ping { .. } => return,
    };

    match accepted {
        Ok(true) => {}
        Ok(false) => send_error_to_client(&app.shared, client_id, rejection).await,
        Err(err) => {
            error!(client_id, %err, "match unavailable");
            send_error_to_client(&app.shared, client_id, "match unavailable").await;
        }
    }
}

async fn handle_hello(
    app: &AppState,
    client_id: &str,
    requested_name: String,
    reconnect_token: Option<String>,
) {
    let name = sanitize_name(&requested_name);

    let existing = {
        let guard = app.shared.lock().await;
        reconnect_token
            .as_deref()
            .and_then(|token| find_player_id_by_token(&guard, token))
    };

    let player_id = match existing {
        Some(player_id) => {
            info!(client_id, %player_id, "connection resumed");
            player_id
        }
        None => {
            let player_id = make_id("player");
            match app.matches.join(&player_id, &name).await {
                Ok(true) => {}
                Ok(false) => {
                    send_error_to_client(&app.shared, client_id, "match already running; wait for the lobby").await;
                    return;
                }
                Err(err) => {
                    error!(client_id, %err, "match unavailable");
                    send_error_to_client(&app.shared, client_id, "match unavailable").await;
                    return;
                }
            }
            let mut guard = app.shared.lock().await;
            guard
                .reconnect_tokens
                .insert(player_id.clone(), make_reconnect_token());
            player_id
        }
    };

    let snapshot = match app.matches.snapshot().await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            error!(client_id, %err, "match unavailable");
            return;
        }
    };

    let mut guard = app.shared.lock().await;
    bind_client_to_player(&mut guard, client_id, &player_id);
    let token = guard.reconnect_tokens.get(&player_id).cloned();
    send_to_client(
        &mut guard,
        client_id,
        &json!({
            "type": "welcome",
            "playerId": player_id,
            "reconnectToken": token,
            "isHost": snapshot.host_id.as_deref() == Some(player_id.as_str()),
        }),
        QueuePolicy::DisconnectOnFull,
    );
    send_to_client(
        &mut guard,
        client_id,
        &json!({
            "type": "snapshot",
            "snapshot": snapshot,
        }),
        QueuePolicy::DisconnectOnFull,
    );
}

async fn handle_disconnect(app: &AppState, client_id: &str) {
    let departed = {
        let mut guard = app.shared.lock().await;
        disconnect_client_internal(&mut guard, client_id)
    };
    let Some(player_id) = departed else {
        return;
    };
    match app.matches.disconnect(&player_id).await {
        Ok(_) => info!(client_id, %player_id, "player disconnected"),
        Err(err) => warn!(client_id, %player_id, %err, "disconnect not delivered"),
    }
}

/// Drops the client. Returns the player it was the live connection for.
fn disconnect_client_internal(state: &mut ServerState, client_id: &str) -> Option<String> {
    let context = state.clients.remove(client_id)?;
    let bound_player_id = context.player_id?;

    if state
        .active_client_by_player_id
        .get(&bound_player_id)
        .map(|active| active != client_id)
        .unwrap_or(true)
    {
        return None;
    }

    state.active_client_by_player_id.remove(&bound_player_id);
    state.reconnect_tokens.remove(&bound_player_id);
    Some(bound_player_id)
}

fn bind_client_to_player(state: &mut ServerState, client_id: &str, player_id: &str) {
    if let Some(old_client_id) = state.active_client_by_player_id.get(player_id).cloned() {
        if old_client_id != client_id {
            if let Some(old_client) = state.clients.get_mut(&old_client_id) {
                old_client.player_id = None;
                let _ = old_client.tx.try_send(OutboundMessage::Close {
                    code: 4001,
                    reason: "superseded by new connection".to_string(),
                });
            }
        }
    }

    let previous_player_id = state
        .clients
        .get(client_id)
        .and_then(|ctx| ctx.player_id.clone());
    if let Some(previous_player_id) = previous_player_id {
        if previous_player_id != player_id {
            state.active_client_by_player_id.remove(&previous_player_id);
        }
    }

    if let Some(ctx) = state.clients.get_mut(client_id) {
        ctx.player_id = Some(player_id.to_string());
    }
    state
        .active_client_by_player_id
        .insert(player_id.to_string(), client_id.to_string());
}

fn start_event_relay(state: SharedState, mut events: broadcast::Receiver<MatchEvent>) {
    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event relay lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let message = match serde_json::to_value(&event) {
                Ok(message) => message,
                Err(err) => {
                    error!(%err, "event not serialisable");
                    continue;
                }
            };
            let mut guard = state.lock().await;
            match event_recipient(&event) {
                Some(player_id) => {
                    let client_id = guard.active_client_by_player_id.get(player_id).cloned();
                    if let Some(client_id) = client_id {
                        send_to_client(&mut guard, &client_id, &message, QueuePolicy::DisconnectOnFull);
                    }
                }
                None => broadcast(&mut guard, &message, event_policy(&event)),
            }
        }
    });
}

/// Per-player notifications go to that player's live connection only.
fn event_recipient(event: &MatchEvent) -> Option<&str> {
    match event {
        MatchEvent::AttachHud { player_id, .. }
        | MatchEvent::RemoveHud { player_id, .. }
        | MatchEvent::MatchResult { player_id, .. } => Some(player_id),
        _ => None,
    }
}

fn event_policy(event: &MatchEvent) -> QueuePolicy {
    match event {
        MatchEvent::Countdown { .. } | MatchEvent::ProgressUpdated { .. } => QueuePolicy::DropOnFull,
        _ => QueuePolicy::DisconnectOnFull,
    }
}

fn send_to_client(state: &mut ServerState, client_id: &str, message: &Value, policy: QueuePolicy) {
    let send_failed = if let Some(client) = state.clients.get(client_id) {
        client
            .tx
            .try_send(OutboundMessage::Text(message.to_string()))
            .is_err()
    } else {
        false
    };
    if send_failed && policy == QueuePolicy::DisconnectOnFull {
        close_client(state, client_id);
    }
}

fn broadcast(state: &mut ServerState, message: &Value, policy: QueuePolicy) {
    let payload = message.to_string();
    let mut failed_clients = Vec::new();
    for (client_id, client) in &state.clients {
        if !can_receive_broadcast(state, client_id, client) {
            continue;
        }
        if client
            .tx
            .try_send(OutboundMessage::Text(payload.clone()))
            .is_err()
            && policy == QueuePolicy::DisconnectOnFull
        {
            failed_clients.push(client_id.clone());
        }
    }
    for client_id in failed_clients {
        close_client(state, &client_id);
    }
}

/// Asks the writer to close; the socket loop then reports the departure.
fn close_client(state: &mut ServerState, client_id: &str) {
    if let Some(client) = state.clients.get(client_id) {
        let _ = client.tx.try_send(OutboundMessage::Close {
            code: 4002,
            reason: "outbound queue full".to_string(),
        });
    }
}

fn can_receive_broadcast(state: &ServerState, client_id: &str, client: &ClientContext) -> bool {
    let Some(player_id) = client.player_id.as_ref() else {
        return false;
    };
    state
        .active_client_by_player_id
        .get(player_id)
        .map(|id| id.as_str())
        == Some(client_id)
}

async fn send_error_to_client(state: &SharedState, client_id: &str, message: &str) {
    let mut guard = state.lock().await;
    send_to_client(
        &mut guard,
        client_id,
        &json!({
            "type": "error",
            "message": message,
        }),
        QueuePolicy::DropOnFull,
    );
}

fn find_player_id_by_token(state: &ServerState, token: &str) -> Option<String> {
    state
        .reconnect_tokens
        .iter()
        .find(|(_, candidate)| candidate.as_str() == token)
        .map(|(player_id, _)| player_id.clone())
}

fn make_id(prefix: &str) -> String {
    let seq = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{seq}")
}

fn make_reconnect_token() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(48)
        .map(char::from)
        .collect()
}
