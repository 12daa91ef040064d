//! The dispatcher's conductor actor.
//!
//! The conductor owns the mutable view of the subscription registry
//! and all housekeeping that must not sit on the producer hot path:
//! serving the async lifecycle commands, recomputing the publisher
//! limit when subscriptions advance, reclaiming drained partitions,
//! and draining in-flight claims during shutdown.

use std::sync::Arc;

use async_trait::async_trait;
use strand_core::SubscriptionId;
use strand_sched::{Actor, ActorContext, FutureCompleter, Step};
use tokio::sync::mpsc;
use tracing::info;

use crate::config::DispatchMode;
use crate::dispatcher::{DispatcherShared, DispatcherState};
use crate::error::DispatchError;
use crate::subscription::Subscription;

type OpenReply = FutureCompleter<Result<Arc<Subscription>, DispatchError>>;
type CloseSubscriptionReply = FutureCompleter<Result<(), DispatchError>>;

/// What woke the conductor's run slice.
enum Wakeup {
    Command(Option<ConductorCommand>),
    Consumed,
}

/// Lifecycle commands served by the conductor.
#[derive(Debug)]
pub(crate) enum ConductorCommand {
    /// Register a subscription (or fetch a declared one) by name.
    OpenSubscription {
        name: String,
        reply: OpenReply,
    },
    /// Deregister a subscription by name.
    CloseSubscription {
        name: String,
        reply: CloseSubscriptionReply,
    },
    /// Close the dispatcher: refuse new work, drain claims, resolve.
    Close { reply: FutureCompleter<()> },
}

pub(crate) struct Conductor {
    shared: Arc<DispatcherShared>,
    commands: mpsc::UnboundedReceiver<ConductorCommand>,
    next_id: SubscriptionId,
    declared_names: Vec<String>,
    close_replies: Vec<FutureCompleter<()>>,
}

impl Conductor {
    pub(crate) fn new(
        shared: Arc<DispatcherShared>,
        commands: mpsc::UnboundedReceiver<ConductorCommand>,
        next_id: SubscriptionId,
        declared_names: Vec<String>,
    ) -> Self {
        Self {
            shared,
            commands,
            next_id,
            declared_names,
            close_replies: Vec::new(),
        }
    }

    fn handle(&mut self, command: ConductorCommand) {
        match command {
            ConductorCommand::OpenSubscription { name, reply } => {
                self.open_subscription(name, reply);
            }
            ConductorCommand::CloseSubscription { name, reply } => {
                self.close_subscription(&name, reply);
            }
            ConductorCommand::Close { reply } => {
                info!(dispatcher = self.shared.name(), "dispatcher closing");
                self.shared.set_state(DispatcherState::Closing);
                self.close_replies.push(reply);
            }
        }
    }

    fn handle_while_closing(&mut self, command: ConductorCommand) {
        match command {
            ConductorCommand::OpenSubscription { reply, .. } => {
                let _ = reply.complete(Err(DispatchError::Closed));
            }
            ConductorCommand::CloseSubscription { reply, .. } => {
                let _ = reply.complete(Err(DispatchError::Closed));
            }
            ConductorCommand::Close { reply } => self.close_replies.push(reply),
        }
    }

    fn open_subscription(&mut self, name: String, reply: OpenReply) {
        // A future dropped before registration must leave no residue.
        if reply.is_cancelled() {
            return;
        }

        if let Some(existing) = self.shared.find_subscription(&name) {
            if self.declared_names.iter().any(|declared| *declared == name) {
                let _ = reply.complete(Ok(existing));
            } else {
                let _ = reply.complete(Err(DispatchError::SubscriptionExists { name }));
            }
            return;
        }

        if self.shared.mode() == DispatchMode::Pipeline {
            // The pipeline chain is fixed at construction.
            let _ = reply.complete(Err(DispatchError::SubscriptionNotFound { name }));
            return;
        }

        let max = self.shared.limits().subscriptions_max;
        if self.shared.subscription_count() >= max as usize {
            let _ = reply.complete(Err(DispatchError::SubscriptionLimit { max }));
            return;
        }

        let id = self.next_id;
        self.next_id = id.next();

        // A late joiner starts at the current append position.
        let start = self.shared.append_position();
        let subscription = self
            .shared
            .register_subscription(id, name.clone(), start, None, false);
        self.shared.housekeep();
        info!(
            dispatcher = self.shared.name(),
            subscription = %name,
            id = %id,
            "subscription opened"
        );
        let _ = reply.complete(Ok(subscription));
    }

    fn close_subscription(&mut self, name: &str, reply: CloseSubscriptionReply) {
        if self.shared.mode() == DispatchMode::Pipeline {
            let _ = reply.complete(Err(DispatchError::PipelineMode {
                operation: "close_subscription",
            }));
            return;
        }

        if self.shared.deregister_subscription(name) {
            self.shared.housekeep();
            info!(
                dispatcher = self.shared.name(),
                subscription = %name,
                "subscription closed"
            );
            let _ = reply.complete(Ok(()));
        } else {
            let _ = reply.complete(Err(DispatchError::SubscriptionNotFound {
                name: name.to_string(),
            }));
        }
    }

    async fn drain(&mut self) -> Step {
        // Lifecycle commands queued behind the close still get answers.
        while let Ok(command) = self.commands.try_recv() {
            self.handle_while_closing(command);
        }

        if self.shared.inflight_claims() == 0 {
            return Step::Done;
        }

        // Claim resolutions and consumer advances both raise this.
        self.shared.consumed.ready().await;
        self.shared.housekeep();
        Step::Continue
    }

    fn finalize(&mut self) {
        self.shared.set_state(DispatcherState::Closed);

        // Answer anything still queued, then resolve the close futures.
        while let Ok(command) = self.commands.try_recv() {
            self.handle_while_closing(command);
        }
        for reply in self.close_replies.drain(..) {
            let _ = reply.complete(());
        }
        info!(dispatcher = self.shared.name(), "dispatcher closed");
    }
}

#[async_trait]
impl Actor for Conductor {
    async fn on_start(&mut self, _ctx: &ActorContext) {
        info!(dispatcher = self.shared.name(), "conductor started");
    }

    async fn run(&mut self, _ctx: &ActorContext) -> Step {
        if self.shared.state() == DispatcherState::Closing {
            return self.drain().await;
        }

        let consumed = self.shared.consumed.clone();
        let wakeup = tokio::select! {
            command = self.commands.recv() => Wakeup::Command(command),
            () = consumed.ready() => Wakeup::Consumed,
        };

        match wakeup {
            Wakeup::Command(Some(command)) => {
                self.handle(command);
                Step::Continue
            }
            // Every dispatcher handle is gone; wind down.
            Wakeup::Command(None) => Step::Done,
            Wakeup::Consumed => {
                self.shared.housekeep();
                Step::Continue
            }
        }
    }

    async fn on_close(&mut self, _ctx: &ActorContext) {
        self.finalize();
    }

    fn name(&self) -> &str {
        "dispatch-conductor"
    }
}
