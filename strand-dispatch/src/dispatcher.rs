//! The dispatcher: producer API, shared state, and lifecycle.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, RwLock};

use strand_core::{Limits, Position, StreamId, SubscriptionId};
use strand_log::{Claim, LogAppender, LogBuffer};
use strand_sched::{ActorFuture, DataSignal};
use tokio::sync::mpsc;
use tracing::debug;

use crate::builder::DispatcherBuilder;
use crate::config::DispatchMode;
use crate::conductor::ConductorCommand;
use crate::error::{DispatchError, OfferError};
use crate::subscription::Subscription;

/// Lifecycle state of a dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum DispatcherState {
    /// Accepting offers and claims.
    Accepting = 0,
    /// Refusing new work; draining in-flight claims.
    Closing = 1,
    /// Fully closed.
    Closed = 2,
}

impl DispatcherState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Accepting,
            1 => Self::Closing,
            2 => Self::Closed,
            _ => unreachable!("invalid dispatcher state {value}"),
        }
    }
}

/// State shared between producers, subscriptions, and the conductor.
#[derive(Debug)]
pub(crate) struct DispatcherShared {
    name: String,
    buffer: Arc<LogBuffer>,
    appender: LogAppender,
    publisher_limit: Arc<AtomicU64>,
    subscriptions: RwLock<Vec<Arc<Subscription>>>,
    mode: DispatchMode,
    limits: Limits,
    state: AtomicU8,
    inflight_claims: AtomicU64,
    /// Raised whenever a subscription advances or a claim resolves;
    /// the conductor's wake-up for housekeeping and close draining.
    pub(crate) consumed: DataSignal,
}

impl DispatcherShared {
    pub(crate) fn new(
        name: String,
        buffer: Arc<LogBuffer>,
        appender: LogAppender,
        publisher_limit: Arc<AtomicU64>,
        mode: DispatchMode,
        limits: Limits,
    ) -> Self {
        Self {
            name,
            buffer,
            appender,
            publisher_limit,
            subscriptions: RwLock::new(Vec::new()),
            mode,
            limits,
            state: AtomicU8::new(DispatcherState::Accepting as u8),
            inflight_claims: AtomicU64::new(0),
            consumed: DataSignal::new(),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) const fn mode(&self) -> DispatchMode {
        self.mode
    }

    pub(crate) const fn limits(&self) -> &Limits {
        &self.limits
    }

    pub(crate) fn state(&self) -> DispatcherState {
        DispatcherState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: DispatcherState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn inflight_claims(&self) -> u64 {
        self.inflight_claims.load(Ordering::Acquire)
    }

    pub(crate) fn append_position(&self) -> Position {
        self.appender.position()
    }

    pub(crate) fn subscription_count(&self) -> usize {
        self.registry().len()
    }

    pub(crate) fn find_subscription(&self, name: &str) -> Option<Arc<Subscription>> {
        self.registry()
            .iter()
            .find(|sub| sub.name() == name)
            .cloned()
    }

    pub(crate) fn register_subscription(
        &self,
        id: SubscriptionId,
        name: String,
        start: Position,
        predecessor: Option<Arc<Subscription>>,
        propagate_failure: bool,
    ) -> Arc<Subscription> {
        let subscription = Arc::new(Subscription::new(
            id,
            name,
            start,
            Arc::clone(&self.buffer),
            self.consumed.clone(),
            predecessor,
            propagate_failure,
        ));
        self.registry_mut().push(Arc::clone(&subscription));
        subscription
    }

    pub(crate) fn deregister_subscription(&self, name: &str) -> bool {
        let mut registry = self.registry_mut();
        let before = registry.len();
        registry.retain(|sub| sub.name() != name);
        registry.len() != before
    }

    /// Recomputes the publisher limit and reclaims drained partitions.
    ///
    /// Runs on the conductor whenever a subscription advances, never on
    /// the producer hot path.
    pub(crate) fn housekeep(&self) {
        let min = self.min_consumer_position();
        let reclaimed = self.buffer.reclaim_drained(min);
        if reclaimed > 0 {
            debug!(
                dispatcher = %self.name,
                reclaimed,
                min_position = %min,
                "partitions reclaimed"
            );
        }

        let cycle = min.cycle().checked_add(3).expect("cycle overflow");
        self.publisher_limit
            .store(Position::new(cycle, min.offset()).raw(), Ordering::Release);
    }

    fn min_consumer_position(&self) -> Position {
        // With no subscriptions the producer is its own floor: the
        // limit tracks the append position and dirty partitions
        // reclaim immediately.
        self.registry()
            .iter()
            .map(|sub| sub.position())
            .min()
            .unwrap_or_else(|| self.appender.position())
    }

    fn fragment_published(&self) {
        for subscription in self.registry().iter() {
            subscription.signal().raise();
        }
    }

    fn claim_resolved(&self) {
        let remaining = self.inflight_claims.fetch_sub(1, Ordering::AcqRel) - 1;
        if remaining == 0 && self.state() == DispatcherState::Closing {
            self.consumed.raise();
        }
    }

    fn registry(&self) -> std::sync::RwLockReadGuard<'_, Vec<Arc<Subscription>>> {
        self.subscriptions
            .read()
            .expect("subscription registry poisoned")
    }

    fn registry_mut(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Arc<Subscription>>> {
        self.subscriptions
            .write()
            .expect("subscription registry poisoned")
    }
}

/// The in-process fragment dispatcher.
///
/// Producers offer byte payloads or claim regions to fill in place;
/// subscriptions consume committed fragments independently. All
/// lifecycle operations run asynchronously on the conductor actor.
#[derive(Debug)]
pub struct Dispatcher {
    shared: Arc<DispatcherShared>,
    commands: mpsc::UnboundedSender<ConductorCommand>,
}

impl Dispatcher {
    /// Starts building a dispatcher with the given name.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> DispatcherBuilder {
        DispatcherBuilder::new(name)
    }

    pub(crate) const fn new(
        shared: Arc<DispatcherShared>,
        commands: mpsc::UnboundedSender<ConductorCommand>,
    ) -> Self {
        Self { shared, commands }
    }

    /// Returns the dispatcher's name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.shared.name()
    }

    /// Returns the frame visibility mode.
    #[must_use]
    pub fn mode(&self) -> DispatchMode {
        self.shared.mode()
    }

    /// Returns the total buffer capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.shared.buffer.capacity()
    }

    /// Returns the maximum payload length of a single fragment.
    #[must_use]
    pub fn frame_max_length(&self) -> usize {
        self.shared.appender.frame_max_length()
    }

    /// Returns the position of the next claimable byte.
    #[must_use]
    pub fn append_position(&self) -> Position {
        self.shared.append_position()
    }

    /// Returns true once the dispatcher refuses new work.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.state() != DispatcherState::Accepting
    }

    /// Offers a payload on the default stream.
    ///
    /// # Errors
    /// [`OfferError::Full`] when capacity is exhausted (retry later),
    /// [`OfferError::Closed`] once the dispatcher closed, and
    /// [`OfferError::InvalidLength`] for an empty or oversized payload.
    pub fn offer(&self, payload: &[u8]) -> Result<Position, OfferError> {
        self.offer_to_stream(payload, StreamId::DEFAULT)
    }

    /// Offers a payload tagged with a stream id.
    ///
    /// Claims, copies, and commits in one call; on success every
    /// subscription is signalled and the committed position returned.
    ///
    /// # Errors
    /// Same conditions as [`Self::offer`].
    pub fn offer_to_stream(
        &self,
        payload: &[u8],
        stream_id: StreamId,
    ) -> Result<Position, OfferError> {
        let mut claim = self.claim_on_stream(payload.len(), stream_id)?;
        claim.write_bytes(0, payload);
        Ok(claim.commit())
    }

    /// Claims a region for a payload of `length` bytes on the default
    /// stream.
    ///
    /// # Errors
    /// Same conditions as [`Self::offer`].
    pub fn claim(&self, length: usize) -> Result<ClaimedFragment, OfferError> {
        self.claim_on_stream(length, StreamId::DEFAULT)
    }

    /// Claims a region for a payload of `length` bytes.
    ///
    /// The returned handle must be committed or aborted; dropping it
    /// aborts, publishing a FAILED frame subscribers skip over.
    ///
    /// # Errors
    /// Same conditions as [`Self::offer`].
    pub fn claim_on_stream(
        &self,
        length: usize,
        stream_id: StreamId,
    ) -> Result<ClaimedFragment, OfferError> {
        if self.shared.state() != DispatcherState::Accepting {
            return Err(OfferError::Closed);
        }

        self.shared.inflight_claims.fetch_add(1, Ordering::AcqRel);

        // Re-check after registering: a close that raced the first
        // check must not admit this claim into the drain set.
        if self.shared.state() != DispatcherState::Accepting {
            self.shared.claim_resolved();
            return Err(OfferError::Closed);
        }

        match self.shared.appender.claim(length, stream_id) {
            Ok(inner) => Ok(ClaimedFragment {
                inner: Some(inner),
                shared: Arc::clone(&self.shared),
            }),
            Err(err) => {
                self.shared.claim_resolved();
                Err(err.into())
            }
        }
    }

    /// Fetches a subscription registered at construction.
    #[must_use]
    pub fn get_subscription(&self, name: &str) -> Option<Arc<Subscription>> {
        self.shared.find_subscription(name)
    }

    /// Opens (or fetches, for names declared at construction) a
    /// subscription asynchronously.
    ///
    /// The future resolves once the conductor registered the
    /// subscription; a late joiner starts at the current append
    /// position. Dropping the future before registration cancels the
    /// open and leaves no residue.
    pub fn open_subscription_async(
        &self,
        name: impl Into<String>,
    ) -> ActorFuture<Result<Arc<Subscription>, DispatchError>> {
        let (reply, future) = ActorFuture::pair();
        if self.shared.state() != DispatcherState::Accepting {
            let _ = reply.complete(Err(DispatchError::Closed));
            return future;
        }
        let command = ConductorCommand::OpenSubscription {
            name: name.into(),
            reply,
        };
        if let Err(mpsc::error::SendError(command)) = self.commands.send(command) {
            if let ConductorCommand::OpenSubscription { reply, .. } = command {
                let _ = reply.complete(Err(DispatchError::Closed));
            }
        }
        future
    }

    /// Closes a subscription asynchronously.
    pub fn close_subscription_async(
        &self,
        name: impl Into<String>,
    ) -> ActorFuture<Result<(), DispatchError>> {
        let (reply, future) = ActorFuture::pair();
        if self.shared.state() != DispatcherState::Accepting {
            let _ = reply.complete(Err(DispatchError::Closed));
            return future;
        }
        let command = ConductorCommand::CloseSubscription {
            name: name.into(),
            reply,
        };
        if let Err(mpsc::error::SendError(command)) = self.commands.send(command) {
            if let ConductorCommand::CloseSubscription { reply, .. } = command {
                let _ = reply.complete(Err(DispatchError::Closed));
            }
        }
        future
    }

    /// Closes the dispatcher asynchronously.
    ///
    /// New offers and claims fail with [`OfferError::Closed`]
    /// immediately; the future resolves once every in-flight claim has
    /// committed or aborted and the conductor stopped.
    pub fn close_async(&self) -> ActorFuture<()> {
        let (reply, future) = ActorFuture::pair();
        if self.shared.state() == DispatcherState::Closed {
            let _ = reply.complete(());
            return future;
        }
        if let Err(mpsc::error::SendError(command)) =
            self.commands.send(ConductorCommand::Close { reply })
        {
            if let ConductorCommand::Close { reply } = command {
                let _ = reply.complete(());
            }
        }
        future
    }

    /// Closes the dispatcher and blocks until the drain completes.
    ///
    /// For synchronous callers only; must not be called from a
    /// scheduler worker.
    pub fn close(&self) {
        // An abandoned future means the conductor is already gone.
        let _ = self.close_async().join();
    }
}

/// An exclusive claim on a framed region of the dispatcher's buffer.
///
/// Obtained from [`Dispatcher::claim`]; the producer writes the payload
/// in place and then commits. Dropping the handle without committing
/// aborts the claim.
#[derive(Debug)]
pub struct ClaimedFragment {
    inner: Option<Claim>,
    shared: Arc<DispatcherShared>,
}

impl ClaimedFragment {
    /// Returns the claimed payload length in bytes.
    ///
    /// # Panics
    /// Panics if the claim was already resolved.
    #[must_use]
    pub fn payload_length(&self) -> usize {
        self.claim().payload_length()
    }

    /// Returns the position a successful commit publishes.
    ///
    /// # Panics
    /// Panics if the claim was already resolved.
    #[must_use]
    pub fn position(&self) -> Position {
        self.claim().position()
    }

    /// Copies `src` into the claimed payload at `offset`.
    ///
    /// # Panics
    /// Panics if the write extends past the claimed payload or the
    /// claim was already resolved.
    pub fn write_bytes(&mut self, offset: usize, src: &[u8]) {
        self.claim_mut().write_bytes(offset, src);
    }

    /// Writes a little-endian u32 into the claimed payload at `offset`.
    ///
    /// # Panics
    /// Panics if the write extends past the claimed payload or the
    /// claim was already resolved.
    pub fn put_u32(&mut self, offset: usize, value: u32) {
        self.claim_mut().put_u32(offset, value);
    }

    /// Publishes the fragment and signals every subscription.
    ///
    /// # Panics
    /// Panics if the claim was already resolved.
    pub fn commit(mut self) -> Position {
        let inner = self.inner.take().expect("claim already resolved");
        let position = inner.commit();
        self.shared.fragment_published();
        self.shared.claim_resolved();
        position
    }

    /// Marks the fragment FAILED and publishes it so subscribers skip
    /// it without losing frame alignment.
    ///
    /// # Panics
    /// Panics if the claim was already resolved.
    pub fn abort(mut self) -> Position {
        let inner = self.inner.take().expect("claim already resolved");
        let position = inner.abort();
        self.shared.fragment_published();
        self.shared.claim_resolved();
        position
    }

    fn claim(&self) -> &Claim {
        self.inner.as_ref().expect("claim already resolved")
    }

    fn claim_mut(&mut self) -> &mut Claim {
        self.inner.as_mut().expect("claim already resolved")
    }
}

impl Drop for ClaimedFragment {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            // Dropping the raw claim aborts it.
            drop(inner);
            self.shared.fragment_published();
            self.shared.claim_resolved();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use strand_core::ByteValue;
    use strand_sched::{ActorScheduler, SchedulerConfig};

    use crate::error::DispatchError;
    use crate::subscription::FragmentOutcome;

    fn scheduler() -> ActorScheduler {
        ActorScheduler::new(SchedulerConfig::default()).unwrap()
    }

    fn collect(values: &mut Vec<u32>) -> impl FnMut(&[u8], StreamId, bool) -> FragmentOutcome + '_ {
        move |payload, _stream, _failed| {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(&payload[..4]);
            values.push(u32::from_le_bytes(bytes));
            FragmentOutcome::Consume
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..500 {
            if condition() {
                return;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        panic!("condition not reached within a second");
    }

    #[test]
    fn test_offer_then_poll_roundtrip() {
        let scheduler = scheduler();
        let dispatcher = Dispatcher::builder("roundtrip")
            .scheduler(scheduler.handle())
            .buffer_size(ByteValue::kibibytes(48))
            .build()
            .unwrap();

        let subscription = dispatcher
            .open_subscription_async("consumer")
            .join()
            .unwrap()
            .unwrap();

        for value in 1u32..=3 {
            dispatcher
                .offer_to_stream(&value.to_le_bytes(), StreamId::new(5))
                .unwrap();
        }

        let mut seen = Vec::new();
        let handled = subscription.poll(&mut collect(&mut seen), usize::MAX);
        assert_eq!(handled, 3);
        assert_eq!(seen, vec![1, 2, 3]);

        dispatcher.close();
        scheduler.shutdown();
    }

    #[test]
    fn test_claim_write_in_place() {
        let scheduler = scheduler();
        let dispatcher = Dispatcher::builder("claiming")
            .scheduler(scheduler.handle())
            .buffer_size(ByteValue::kibibytes(48))
            .build()
            .unwrap();
        let subscription = dispatcher
            .open_subscription_async("consumer")
            .join()
            .unwrap()
            .unwrap();

        let mut claim = dispatcher.claim(64).unwrap();
        assert_eq!(claim.payload_length(), 64);
        claim.put_u32(0, 42);
        let position = claim.commit();
        assert!(position > Position::ZERO);

        let mut seen = Vec::new();
        subscription.poll(&mut collect(&mut seen), usize::MAX);
        assert_eq!(seen, vec![42]);

        dispatcher.close();
        scheduler.shutdown();
    }

    #[test]
    fn test_duplicate_dynamic_subscription_rejected() {
        let scheduler = scheduler();
        let dispatcher = Dispatcher::builder("dupes")
            .scheduler(scheduler.handle())
            .buffer_size(ByteValue::kibibytes(48))
            .build()
            .unwrap();

        dispatcher
            .open_subscription_async("consumer")
            .join()
            .unwrap()
            .unwrap();
        let second = dispatcher.open_subscription_async("consumer").join().unwrap();
        assert!(matches!(
            second,
            Err(DispatchError::SubscriptionExists { .. })
        ));

        dispatcher.close();
        scheduler.shutdown();
    }

    #[test]
    fn test_declared_subscription_is_fetchable() {
        let scheduler = scheduler();
        let dispatcher = Dispatcher::builder("declared")
            .scheduler(scheduler.handle())
            .buffer_size(ByteValue::kibibytes(48))
            .subscription("boot")
            .build()
            .unwrap();

        let direct = dispatcher.get_subscription("boot").unwrap();
        let opened = dispatcher
            .open_subscription_async("boot")
            .join()
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&direct, &opened));

        dispatcher.close();
        scheduler.shutdown();
    }

    #[test]
    fn test_close_subscription_unknown_name() {
        let scheduler = scheduler();
        let dispatcher = Dispatcher::builder("unknown")
            .scheduler(scheduler.handle())
            .buffer_size(ByteValue::kibibytes(48))
            .build()
            .unwrap();

        let result = dispatcher.close_subscription_async("ghost").join().unwrap();
        assert!(matches!(
            result,
            Err(DispatchError::SubscriptionNotFound { .. })
        ));

        dispatcher.close();
        scheduler.shutdown();
    }

    #[test]
    fn test_closed_dispatcher_refuses_work() {
        let scheduler = scheduler();
        let dispatcher = Dispatcher::builder("closing")
            .scheduler(scheduler.handle())
            .buffer_size(ByteValue::kibibytes(48))
            .build()
            .unwrap();

        dispatcher.close();
        assert!(dispatcher.is_closed());
        assert_eq!(dispatcher.offer(b"late"), Err(OfferError::Closed));
        assert!(matches!(dispatcher.claim(8), Err(OfferError::Closed)));

        // Closing again resolves immediately.
        dispatcher.close();

        // Lifecycle commands after close resolve with Closed.
        let open = dispatcher.open_subscription_async("late").join().unwrap();
        assert!(matches!(open, Err(DispatchError::Closed)));

        scheduler.shutdown();
    }

    #[test]
    fn test_close_drains_inflight_claims() {
        let scheduler = scheduler();
        let dispatcher = Dispatcher::builder("draining")
            .scheduler(scheduler.handle())
            .buffer_size(ByteValue::kibibytes(48))
            .build()
            .unwrap();
        let subscription = dispatcher
            .open_subscription_async("survivor")
            .join()
            .unwrap()
            .unwrap();

        let mut claim = dispatcher.claim(4).unwrap();
        claim.put_u32(0, 77);

        let close_future = dispatcher.close_async();
        wait_until(|| dispatcher.is_closed());
        assert_eq!(dispatcher.offer(b"nope"), Err(OfferError::Closed));

        // The close future must not resolve while the claim is open.
        let committer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            claim.commit();
        });
        close_future.join().unwrap();
        committer.join().unwrap();

        // The fragment committed during the drain is still delivered.
        let mut seen = Vec::new();
        subscription.poll(&mut collect(&mut seen), usize::MAX);
        assert_eq!(seen, vec![77]);

        scheduler.shutdown();
    }

    #[test]
    fn test_backpressure_with_stalled_subscriber() {
        let scheduler = scheduler();
        let dispatcher = Dispatcher::builder("stalled")
            .scheduler(scheduler.handle())
            .buffer_size(ByteValue::kibibytes(12))
            .build()
            .unwrap();
        let subscription = dispatcher
            .open_subscription_async("sleeper")
            .join()
            .unwrap()
            .unwrap();

        // Nobody polls: offers must start failing within the buffer
        // capacity plus rotation slack.
        let payload = [0u8; 64];
        let mut offered_bytes = 0u64;
        loop {
            match dispatcher.offer(&payload) {
                Ok(_) => offered_bytes += 80, // aligned frame size
                Err(OfferError::Full) => break,
                Err(other) => panic!("unexpected offer failure: {other}"),
            }
            assert!(
                offered_bytes <= 2 * dispatcher.capacity(),
                "back-pressure bound exceeded"
            );
        }
        assert!(offered_bytes <= dispatcher.capacity());

        // Draining the subscription reopens the log once the conductor
        // catches up.
        subscription.poll(
            &mut |_: &[u8], _: StreamId, _: bool| FragmentOutcome::Consume,
            usize::MAX,
        );
        wait_until(|| dispatcher.offer(&payload).is_ok());

        dispatcher.close();
        scheduler.shutdown();
    }

    #[test]
    fn test_pipeline_end_to_end() {
        let scheduler = scheduler();
        let dispatcher = Dispatcher::builder("pipeline")
            .scheduler(scheduler.handle())
            .buffer_size(ByteValue::kibibytes(48))
            .mode(DispatchMode::Pipeline)
            .subscription("stage-1")
            .subscription("stage-2")
            .build()
            .unwrap();

        let first = dispatcher.get_subscription("stage-1").unwrap();
        let second = dispatcher.get_subscription("stage-2").unwrap();

        dispatcher.offer(&1u32.to_le_bytes()).unwrap();

        let mut seen = Vec::new();
        assert_eq!(second.poll(&mut collect(&mut seen), usize::MAX), 0);
        assert_eq!(first.poll(&mut collect(&mut seen), usize::MAX), 1);
        assert_eq!(second.poll(&mut collect(&mut seen), usize::MAX), 1);

        // The chain is fixed: no dynamic membership changes.
        let open = dispatcher.open_subscription_async("stage-3").join().unwrap();
        assert!(matches!(
            open,
            Err(DispatchError::SubscriptionNotFound { .. })
        ));
        let close = dispatcher
            .close_subscription_async("stage-1")
            .join()
            .unwrap();
        assert!(matches!(close, Err(DispatchError::PipelineMode { .. })));

        dispatcher.close();
        scheduler.shutdown();
    }

    #[test]
    fn test_builder_requires_scheduler() {
        let result = Dispatcher::builder("no-sched").build();
        assert!(matches!(result, Err(DispatchError::MissingScheduler)));
    }
}
