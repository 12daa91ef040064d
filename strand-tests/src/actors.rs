//! Reusable producer and consumer actors for dispatcher tests.
//!
//! The actors mirror the production usage pattern: producers offer or
//! claim fragments and yield between publications; consumers open their
//! subscription asynchronously in `on_start` and then poll (or peek)
//! whenever the subscription's data signal fires.

use std::sync::Arc;

use async_trait::async_trait;
use strand_core::StreamId;
use strand_dispatch::{BlockPeek, Dispatcher, FragmentOutcome, Subscription};
use strand_sched::{Actor, ActorContext, FutureCompleter, Step};

/// Result reported by the verifying consumers.
pub type SequenceResult = Result<u32, String>;

fn decode_counter(payload: &[u8]) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&payload[..4]);
    u32::from_le_bytes(bytes)
}

/// Offers `total` sequenced payloads, yielding between publications.
pub struct OfferingProducer {
    dispatcher: Arc<Dispatcher>,
    payload: Vec<u8>,
    total: u32,
    counter: u32,
    done: Option<FutureCompleter<()>>,
}

impl OfferingProducer {
    /// Creates a producer publishing `total` fragments of
    /// `payload_length` bytes, each carrying its sequence number in the
    /// first four bytes.
    #[must_use]
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        payload_length: usize,
        total: u32,
        done: FutureCompleter<()>,
    ) -> Self {
        assert!(payload_length >= 4, "payload must hold the counter");
        Self {
            dispatcher,
            payload: vec![0u8; payload_length],
            total,
            counter: 0,
            done: Some(done),
        }
    }
}

#[async_trait]
impl Actor for OfferingProducer {
    async fn run(&mut self, _ctx: &ActorContext) -> Step {
        let next = self.counter + 1;
        self.payload[..4].copy_from_slice(&next.to_le_bytes());

        if self.dispatcher.offer(&self.payload).is_ok() {
            self.counter = next;
        }

        if self.counter < self.total {
            Step::Yield
        } else {
            if let Some(done) = self.done.take() {
                done.complete(());
            }
            Step::Done
        }
    }

    fn name(&self) -> &str {
        "offering-producer"
    }
}

/// Claims `total` sequenced fragments and writes the counter in place.
pub struct ClaimingProducer {
    dispatcher: Arc<Dispatcher>,
    claim_length: usize,
    total: u32,
    counter: u32,
    done: Option<FutureCompleter<()>>,
}

impl ClaimingProducer {
    /// Creates a producer claiming `total` fragments of `claim_length`
    /// bytes each.
    #[must_use]
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        claim_length: usize,
        total: u32,
        done: FutureCompleter<()>,
    ) -> Self {
        assert!(claim_length >= 4, "claim must hold the counter");
        Self {
            dispatcher,
            claim_length,
            total,
            counter: 0,
            done: Some(done),
        }
    }
}

#[async_trait]
impl Actor for ClaimingProducer {
    async fn run(&mut self, _ctx: &ActorContext) -> Step {
        if let Ok(mut claim) = self.dispatcher.claim(self.claim_length) {
            self.counter += 1;
            claim.put_u32(0, self.counter);
            claim.commit();
        }

        if self.counter < self.total {
            Step::Yield
        } else {
            if let Some(done) = self.done.take() {
                done.complete(());
            }
            Step::Done
        }
    }

    fn name(&self) -> &str {
        "claiming-producer"
    }
}

/// Polls a subscription and verifies the sequence 1..=total.
pub struct CountingConsumer {
    dispatcher: Arc<Dispatcher>,
    subscription_name: String,
    subscription: Option<Arc<Subscription>>,
    counter: u32,
    total: u32,
    violation: Option<String>,
    done: Option<FutureCompleter<SequenceResult>>,
}

impl CountingConsumer {
    /// Creates a consumer expecting the counters `1..=total` in order.
    #[must_use]
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        subscription_name: impl Into<String>,
        total: u32,
        done: FutureCompleter<SequenceResult>,
    ) -> Self {
        Self {
            dispatcher,
            subscription_name: subscription_name.into(),
            subscription: None,
            counter: 0,
            total,
            violation: None,
            done: Some(done),
        }
    }

    fn finish(&mut self) -> Step {
        if let Some(done) = self.done.take() {
            match self.violation.take() {
                Some(violation) => done.complete(Err(violation)),
                None => done.complete(Ok(self.counter)),
            };
        }
        Step::Done
    }
}

#[async_trait]
impl Actor for CountingConsumer {
    async fn on_start(&mut self, _ctx: &ActorContext) {
        let future = self.dispatcher.open_subscription_async(&self.subscription_name);
        let subscription = future
            .await
            .expect("conductor alive")
            .expect("subscription opened");
        self.subscription = Some(subscription);
    }

    async fn run(&mut self, _ctx: &ActorContext) -> Step {
        let subscription = self.subscription.as_ref().expect("started").clone();
        subscription.signal().ready().await;

        let counter = &mut self.counter;
        let violation = &mut self.violation;
        subscription.poll(
            &mut |payload: &[u8], _stream: StreamId, _failed: bool| {
                let value = decode_counter(payload);
                if value != *counter + 1 && violation.is_none() {
                    *violation = Some(format!("expected {}, observed {value}", *counter + 1));
                }
                *counter = value;
                FragmentOutcome::Consume
            },
            usize::MAX,
        );

        if self.counter >= self.total || self.violation.is_some() {
            self.finish()
        } else {
            Step::Continue
        }
    }

    fn name(&self) -> &str {
        "counting-consumer"
    }
}

/// Consumes via peek blocks, draining each window across several
/// scheduler slices, and verifies the sequence 1..=total.
pub struct PeekingConsumer {
    dispatcher: Arc<Dispatcher>,
    subscription_name: String,
    subscription: Option<Arc<Subscription>>,
    peek: BlockPeek,
    next_fragment: usize,
    counter: u32,
    total: u32,
    violation: Option<String>,
    done: Option<FutureCompleter<SequenceResult>>,
}

/// Fragments processed per scheduler slice while draining a window.
const PEEK_BATCH: usize = 256;

impl PeekingConsumer {
    /// Creates a peeking consumer expecting the counters `1..=total`.
    #[must_use]
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        subscription_name: impl Into<String>,
        total: u32,
        done: FutureCompleter<SequenceResult>,
    ) -> Self {
        Self {
            dispatcher,
            subscription_name: subscription_name.into(),
            subscription: None,
            peek: BlockPeek::new(),
            next_fragment: 0,
            counter: 0,
            total,
            violation: None,
            done: Some(done),
        }
    }

    fn finish(&mut self) -> Step {
        if let Some(done) = self.done.take() {
            match self.violation.take() {
                Some(violation) => done.complete(Err(violation)),
                None => done.complete(Ok(self.counter)),
            };
        }
        Step::Done
    }

    fn process_batch(&mut self) {
        let batch: Vec<u32> = self
            .peek
            .iter()
            .skip(self.next_fragment)
            .take(PEEK_BATCH)
            .map(|fragment| decode_counter(fragment.payload()))
            .collect();

        for value in batch {
            if value != self.counter + 1 && self.violation.is_none() {
                self.violation = Some(format!(
                    "expected {}, observed {value}",
                    self.counter + 1
                ));
            }
            self.counter = value;
            self.next_fragment += 1;
        }

        if self.next_fragment == self.peek.fragment_count() {
            self.peek.mark_completed();
            self.next_fragment = 0;
        }
    }
}

#[async_trait]
impl Actor for PeekingConsumer {
    async fn on_start(&mut self, _ctx: &ActorContext) {
        let future = self.dispatcher.open_subscription_async(&self.subscription_name);
        let subscription = future
            .await
            .expect("conductor alive")
            .expect("subscription opened");
        self.subscription = Some(subscription);
    }

    async fn run(&mut self, _ctx: &ActorContext) -> Step {
        // Finish draining an armed window first, a batch per slice.
        if self.peek.bytes_available() > 0 {
            self.process_batch();
        } else {
            let subscription = self.subscription.as_ref().expect("started").clone();
            subscription.signal().ready().await;
            subscription.peek_block(&mut self.peek, usize::MAX, true);
        }

        if self.violation.is_some() || (self.counter >= self.total && self.peek.bytes_available() == 0)
        {
            self.finish()
        } else {
            Step::Continue
        }
    }

    fn name(&self) -> &str {
        "peeking-consumer"
    }
}
