//! WebSocket session orchestration: the client loop and the upstream relay.

use super::core::{Simulator, INVALID_MESSAGE};
use crate::error::{Result, SimulatorError};
use crate::metrics::{self, WS_ACTIVE_SESSIONS};
use crate::recording::RecordDir;
use crate::ws::{Connection, Message, SessionContext, SessionRules};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// A peer hanging up or the session being torn down is a normal end.
fn is_normal_end(err: &SimulatorError) -> bool {
    matches!(
        err,
        SimulatorError::ConnectionClosed | SimulatorError::Cancelled
    )
}

impl Simulator {
    /// Runs one WebSocket session until the client leaves or either loop fails.
    ///
    /// With an upstream connection, a relay task copies upstream messages to the
    /// client (recording them when configured) while this task dispatches client
    /// messages to the rules. Both share one cancellation token; teardown cancels
    /// it, which also stops subscription tasks, then closes both connections.
    pub async fn handle_ws_session(
        &self,
        client: Arc<dyn Connection>,
        upstream: Option<Arc<dyn Connection>>,
    ) -> Result<()> {
        let Some(ws) = self.ws_rules() else {
            return Err(SimulatorError::InvalidConfig(
                "no WebSocket endpoint configured".to_string(),
            ));
        };
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        let rules = SessionRules::new(ws);
        let recorder = ws.recorder().cloned();

        async move {
            WS_ACTIVE_SESSIONS.inc();
            info!(upstream = upstream.is_some(), "WebSocket session started");

            let session = SessionContext::new(client, upstream, CancellationToken::new());
            let relay = session.upstream.clone().map(|upstream| {
                tokio::spawn(
                    relay_upstream(
                        upstream,
                        Arc::clone(&session.client),
                        recorder,
                        session.cancel.clone(),
                    )
                    .in_current_span(),
                )
            });

            let client_result = serve_client(&rules, &session).await;
            session.cancel.cancel();

            let relay_result = match relay {
                Some(handle) => handle.await.unwrap_or_else(|e| {
                    error!("Upstream relay task panicked: {}", e);
                    Ok(())
                }),
                None => Ok(()),
            };

            session.client.close().await;
            if let Some(upstream) = &session.upstream {
                upstream.close().await;
            }
            WS_ACTIVE_SESSIONS.dec();

            let outcome = match (client_result, relay_result) {
                (Err(e), _) if !is_normal_end(&e) => Err(e),
                (_, Err(e)) if !is_normal_end(&e) => Err(e),
                _ => Ok(()),
            };
            match &outcome {
                Ok(()) => info!("WebSocket session ended"),
                Err(e) => error!(error = %e, "WebSocket session failed"),
            }
            outcome
        }
        .instrument(info_span!("ws_session", id))
        .await
    }
}

/// Dispatches client messages in arrival order.
async fn serve_client(rules: &SessionRules, session: &SessionContext) -> Result<()> {
    loop {
        let message = session.client.read(&session.cancel).await?;

        let Some(rule) = rules.find_rule(&message) else {
            metrics::record_ws_message("client", "no_rule");
            session
                .client
                .write(&session.cancel, &Message::text(INVALID_MESSAGE))
                .await?;
            continue;
        };

        metrics::record_ws_message("client", "matched");
        if let Err(e) = rule.handle(&message, session).await {
            if !e.is_cancelled() {
                metrics::record_ws_message("client", "error");
                error!(error = %e, "WebSocket handler failed");
            }
            return Err(e);
        }
    }
}

/// Copies upstream messages to the client, recording each one first.
async fn relay_upstream(
    upstream: Arc<dyn Connection>,
    client: Arc<dyn Connection>,
    recorder: Option<RecordDir>,
    cancel: CancellationToken,
) -> Result<()> {
    let result = async {
        loop {
            let message = upstream.read(&cancel).await?;
            if let Some(recorder) = &recorder {
                recorder.record_message(&message).await?;
            }
            client.write(&cancel, &message).await?;
            metrics::record_ws_message("upstream", "relayed");
        }
    }
    .await;

    // any relay failure ends the whole session
    cancel.cancel();
    if let Err(e) = &result {
        if !is_normal_end(e) {
            metrics::record_ws_message("upstream", "error");
            error!(error = %e, "Upstream relay failed");
        }
    }
    result
}
