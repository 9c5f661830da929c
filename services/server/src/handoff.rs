use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use relay_protocol::{handoff_prefixes, HandoffFrame};
use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{verify_handoff_auth, AuthError};
use crate::state::AppState;

const FIRST_MESSAGE_TIMEOUT: Duration = Duration::from_secs(30);

struct PendingBundle {
    payload: String,
    expires_at: Instant,
}

/// §4.5 process-local directories: `waiters`/`collectors` hold a sender into
/// each socket's own task (mirroring the pattern the forwarder channel uses
/// for injected commands); `pendingBundles` holds a bundle with nobody yet
/// attached to receive it.
#[derive(Clone)]
pub struct HandoffDirectory {
    waiters: Arc<RwLock<HashMap<Uuid, mpsc::UnboundedSender<HandoffFrame>>>>,
    collectors: Arc<RwLock<HashMap<Uuid, mpsc::UnboundedSender<HandoffFrame>>>>,
    pending_bundles: Arc<RwLock<HashMap<Uuid, PendingBundle>>>,
    bundle_ttl: Duration,
}

impl HandoffDirectory {
    pub fn new(bundle_ttl: Duration) -> Self {
        Self {
            waiters: Arc::new(RwLock::new(HashMap::new())),
            collectors: Arc::new(RwLock::new(HashMap::new())),
            pending_bundles: Arc::new(RwLock::new(HashMap::new())),
            bundle_ttl,
        }
    }

    /// Pushes `{type: "paired", partnerPublicKey}` to the watcher for
    /// `pair_id`, if one is currently attached. Called by the pairing
    /// service's `join` on success.
    pub async fn notify_paired(&self, pair_id: Uuid, partner_public_key: String) {
        if let Some(tx) = self.waiters.read().await.get(&pair_id) {
            let _ = tx.send(HandoffFrame::Paired { partner_public_key });
        }
    }

    /// Sweeps entries whose TTL has elapsed. Intended to run on a periodic
    /// background task (≥ every 2 minutes per §4.5).
    pub async fn sweep_expired_bundles(&self) {
        let now = Instant::now();
        let mut bundles = self.pending_bundles.write().await;
        let before = bundles.len();
        bundles.retain(|_, bundle| bundle.expires_at > now);
        let removed = before - bundles.len();
        if removed > 0 {
            info!(removed, "swept expired pending handoff bundles");
        }
    }
}

pub async fn handoff_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn send_error(socket: &mut WebSocket, message: &str) {
    if let Ok(json) = serde_json::to_string(&HandoffFrame::Error {
        message: message.to_owned(),
    }) {
        let _ = socket.send(Message::Text(json.into())).await;
    }
}

async fn send_frame(socket: &mut WebSocket, frame: &HandoffFrame) -> bool {
    match serde_json::to_string(frame) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(_) => false,
    }
}

async fn recv_frame(socket: &mut WebSocket) -> Option<HandoffFrame> {
    let msg = tokio::time::timeout(FIRST_MESSAGE_TIMEOUT, socket.recv())
        .await
        .ok()??
        .ok()?;
    match msg {
        Message::Text(text) => serde_json::from_str(&text).ok(),
        _ => None,
    }
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let Some(frame) = recv_frame(&mut socket).await else {
        send_error(&mut socket, "expected an auth frame").await;
        return;
    };

    match frame {
        HandoffFrame::Auth {
            public_key,
            timestamp,
            signature,
        } => {
            match verify_handoff_auth(
                &state.pool,
                state.config.replay_window,
                handoff_prefixes::WATCH,
                &public_key,
                &timestamp,
                &signature,
            )
            .await
            {
                Ok(pair_id) => handle_watcher(socket, state, pair_id).await,
                Err(AuthError::Database(detail)) => {
                    warn!(error = %detail, "database error verifying watch auth frame");
                    send_error(&mut socket, "internal error").await;
                }
                Err(_) => send_error(&mut socket, "auth failed").await,
            }
        }
        HandoffFrame::CollectAuth {
            public_key,
            timestamp,
            signature,
        } => {
            match verify_handoff_auth(
                &state.pool,
                state.config.replay_window,
                handoff_prefixes::COLLECT,
                &public_key,
                &timestamp,
                &signature,
            )
            .await
            {
                Ok(pair_id) => handle_collector(socket, state, pair_id).await,
                Err(AuthError::Database(detail)) => {
                    warn!(error = %detail, "database error verifying collect auth frame");
                    send_error(&mut socket, "internal error").await;
                }
                Err(_) => send_error(&mut socket, "auth failed").await,
            }
        }
        _ => send_error(&mut socket, "expected an auth frame").await,
    }
}

async fn handle_watcher(mut socket: WebSocket, state: AppState, pair_id: Uuid) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    state.handoff.waiters.write().await.insert(pair_id, tx);

    if !send_frame(&mut socket, &HandoffFrame::Ready).await {
        state.handoff.waiters.write().await.remove(&pair_id);
        return;
    }

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<HandoffFrame>(&text) {
                            Ok(HandoffFrame::Bundle { payload }) => {
                                deliver_or_buffer_bundle(&state, pair_id, payload).await;
                                break;
                            }
                            _ => {
                                warn!(pair_id = %pair_id, "watcher sent an unexpected frame");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
            injected = rx.recv() => {
                match injected {
                    Some(frame) => { if !send_frame(&mut socket, &frame).await { break; } }
                    None => break,
                }
            }
        }
    }

    state.handoff.waiters.write().await.remove(&pair_id);
}

async fn deliver_or_buffer_bundle(state: &AppState, pair_id: Uuid, payload: String) {
    let collector_tx = state.handoff.collectors.write().await.remove(&pair_id);
    match collector_tx {
        Some(tx) => {
            let _ = tx.send(HandoffFrame::Bundle { payload });
        }
        None => {
            state.handoff.pending_bundles.write().await.insert(
                pair_id,
                PendingBundle {
                    payload,
                    expires_at: Instant::now() + state.handoff.bundle_ttl,
                },
            );
        }
    }
}

async fn handle_collector(mut socket: WebSocket, state: AppState, pair_id: Uuid) {
    let pending = {
        let mut bundles = state.handoff.pending_bundles.write().await;
        match bundles.get(&pair_id) {
            Some(bundle) if bundle.expires_at > Instant::now() => {
                bundles.remove(&pair_id).map(|b| b.payload)
            }
            Some(_) => {
                bundles.remove(&pair_id);
                None
            }
            None => None,
        }
    };

    if let Some(payload) = pending {
        let _ = send_frame(&mut socket, &HandoffFrame::Bundle { payload }).await;
        return;
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    state.handoff.collectors.write().await.insert(pair_id, tx);

    if !send_frame(&mut socket, &HandoffFrame::Ready).await {
        state.handoff.collectors.write().await.remove(&pair_id);
        return;
    }

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
            injected = rx.recv() => {
                match injected {
                    Some(frame) => {
                        let _ = send_frame(&mut socket, &frame).await;
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    state.handoff.collectors.write().await.remove(&pair_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sweep_removes_only_expired_bundles() {
        let directory = HandoffDirectory::new(Duration::from_millis(10));
        let pair_id = Uuid::new_v4();
        directory.pending_bundles.write().await.insert(
            pair_id,
            PendingBundle {
                payload: "blob".to_owned(),
                expires_at: Instant::now() + Duration::from_millis(10),
            },
        );
        directory.sweep_expired_bundles().await;
        assert!(directory.pending_bundles.read().await.contains_key(&pair_id));

        tokio::time::sleep(Duration::from_millis(20)).await;
        directory.sweep_expired_bundles().await;
        assert!(!directory.pending_bundles.read().await.contains_key(&pair_id));
    }

    #[tokio::test]
    async fn notify_paired_is_a_noop_without_an_attached_waiter() {
        let directory = HandoffDirectory::new(Duration::from_secs(300));
        directory.notify_paired(Uuid::new_v4(), "partner".to_owned()).await;
    }
}
