//! Subscribe/unsubscribe rule driving a background update task.
//!
//! A subscription is either `Idle` or `Active`. Subscribing while idle spawns the
//! update handler under a child of the session token; subscribing again while
//! active only re-acknowledges. Unsubscribing cancels the task. The task clears
//! the state itself when it ends for any other reason, so `Active` always means
//! exactly one update task is running for this instance.

use super::handler::{MessageHandler, SessionContext};
use super::matcher::MessageMatcher;
use super::message::Message;
use super::rule::WsRule;
use crate::error::Result;
use crate::metrics::ACTIVE_SUBSCRIPTIONS;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn, Instrument};

/// Whether subscription state is kept per WebSocket session or shared by all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionScope {
    #[default]
    Session,
    Global,
}

#[derive(Debug)]
struct ActiveUpdate {
    cancel: CancellationToken,
    generation: u64,
}

#[derive(Debug, Default)]
struct SubscriptionState {
    active: Option<ActiveUpdate>,
    next_generation: u64,
}

#[derive(Debug)]
pub struct SubscriptionRule {
    subscribe: Arc<dyn MessageMatcher>,
    on_subscribe: Arc<dyn MessageHandler>,
    unsubscribe: Arc<dyn MessageMatcher>,
    on_unsubscribe: Arc<dyn MessageHandler>,
    update: Arc<dyn MessageHandler>,
    scope: SubscriptionScope,
    state: Arc<Mutex<SubscriptionState>>,
}

impl SubscriptionRule {
    pub fn new(
        subscribe: Arc<dyn MessageMatcher>,
        on_subscribe: Arc<dyn MessageHandler>,
        unsubscribe: Arc<dyn MessageMatcher>,
        on_unsubscribe: Arc<dyn MessageHandler>,
        update: Arc<dyn MessageHandler>,
    ) -> Self {
        Self {
            subscribe,
            on_subscribe,
            unsubscribe,
            on_unsubscribe,
            update,
            scope: SubscriptionScope::default(),
            state: Arc::default(),
        }
    }

    pub fn with_scope(mut self, scope: SubscriptionScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn scope(&self) -> SubscriptionScope {
        self.scope
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().active.is_some()
    }

    /// Same matchers and handlers, idle state.
    fn fresh(&self) -> Self {
        Self {
            subscribe: Arc::clone(&self.subscribe),
            on_subscribe: Arc::clone(&self.on_subscribe),
            unsubscribe: Arc::clone(&self.unsubscribe),
            on_unsubscribe: Arc::clone(&self.on_unsubscribe),
            update: Arc::clone(&self.update),
            scope: self.scope,
            state: Arc::default(),
        }
    }

    fn start_updates(&self, message: &Message, session: &SessionContext) {
        let (cancel, generation) = {
            let mut state = self.state.lock();
            if state.active.is_some() {
                debug!("Subscription already active");
                return;
            }
            state.next_generation += 1;
            let generation = state.next_generation;
            let cancel = session.cancel.child_token();
            state.active = Some(ActiveUpdate {
                cancel: cancel.clone(),
                generation,
            });
            (cancel, generation)
        };

        ACTIVE_SUBSCRIPTIONS.inc();
        debug!(generation, "Subscription update task started");

        let update = Arc::clone(&self.update);
        let state = Arc::clone(&self.state);
        let message = message.clone();
        let context = session.with_cancel(cancel);
        tokio::spawn(
            async move {
                match update.handle(&message, &context).await {
                    Ok(()) => debug!(generation, "Subscription update task finished"),
                    Err(e) if e.is_cancelled() => {
                        debug!(generation, "Subscription update task stopped")
                    }
                    Err(e) => warn!(generation, error = %e, "Subscription update task failed"),
                }

                let mut state = state.lock();
                if state
                    .active
                    .as_ref()
                    .is_some_and(|active| active.generation == generation)
                {
                    state.active = None;
                }
                drop(state);
                ACTIVE_SUBSCRIPTIONS.dec();
            }
            .in_current_span(),
        );
    }

    fn stop_updates(&self) {
        let active = self.state.lock().active.take();
        match active {
            Some(active) => {
                active.cancel.cancel();
                debug!(generation = active.generation, "Subscription cancelled");
            }
            None => debug!("Unsubscribe without active subscription"),
        }
    }
}

#[async_trait]
impl WsRule for SubscriptionRule {
    fn matches(&self, message: &Message) -> bool {
        self.subscribe.matches(message) || self.unsubscribe.matches(message)
    }

    async fn handle(&self, message: &Message, session: &SessionContext) -> Result<()> {
        if self.subscribe.matches(message) {
            self.start_updates(message, session);
            return self.on_subscribe.handle(message, session).await;
        }
        self.stop_updates();
        self.on_unsubscribe.handle(message, session).await
    }

    fn session_instance(&self) -> Option<Arc<dyn WsRule>> {
        match self.scope {
            SubscriptionScope::Session => Some(Arc::new(self.fresh())),
            SubscriptionScope::Global => None,
        }
    }
}
