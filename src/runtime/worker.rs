//! Worker thread owning one slot

use crate::retry::{RetryConfig, RetryStrategy};
use crate::runtime::{DriverSlot, RabbitMqDriver};
use crate::{BrokerClient, DriverConfig, DriverError, DriverResult, OwnerToken, RetrySettings};
use serde::Serialize;
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// What a worker did before it stopped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerReport {
    /// Records the broker accepted
    pub delivered: u64,
    /// Records given up on after the last retry
    pub dropped: u64,
    /// Resubmissions, over all records
    pub retries: u64,
}

/// An OS thread that owns a slot and publishes whatever is queued to it
///
/// Records are queued through a bounded channel, from async code with
/// [`send`](Self::send) or from plain threads with
/// [`blocking_send`](Self::blocking_send). Failed submissions are retried
/// with exponential backoff. Shutting down closes the queue, lets the worker
/// finish what is already queued, then releases the slot.
#[derive(Debug)]
pub struct SlotWorker {
    sender: mpsc::Sender<Vec<u8>>,
    thread: JoinHandle<WorkerReport>,
    owner: OwnerToken,
}

impl SlotWorker {
    /// Claim a slot from `driver` and start its thread
    ///
    /// Allocation errors, including pool exhaustion, are returned here.
    pub fn spawn<C: BrokerClient>(
        driver: &RabbitMqDriver<C>,
        config: &DriverConfig,
        retry: &RetrySettings,
        queue_depth: usize,
    ) -> DriverResult<Self> {
        if queue_depth == 0 {
            return Err(DriverError::config("queue_depth must be > 0"));
        }

        let slot = driver.allocate(config)?;
        let owner = slot.owner();
        let strategy = RetryStrategy::new(RetryConfig::from_settings(retry));
        let (sender, receiver) = mpsc::channel(queue_depth);

        let thread = thread::Builder::new()
            .name(format!("rabbitmq-{}", owner.index()))
            .spawn(move || run(slot, receiver, strategy))
            .map_err(|e| DriverError::WorkerStopped(format!("failed to start thread: {}", e)))?;

        info!("Started worker for {}", owner);
        Ok(Self {
            sender,
            thread,
            owner,
        })
    }

    /// Queue a record, waiting for room
    pub async fn send(&self, record: Vec<u8>) -> DriverResult<()> {
        self.sender
            .send(record)
            .await
            .map_err(|_| DriverError::WorkerStopped(self.owner.to_string()))
    }

    /// Queue a record from outside an async runtime
    pub fn blocking_send(&self, record: Vec<u8>) -> DriverResult<()> {
        self.sender
            .blocking_send(record)
            .map_err(|_| DriverError::WorkerStopped(self.owner.to_string()))
    }

    /// Another handle onto the queue
    pub fn sender(&self) -> mpsc::Sender<Vec<u8>> {
        self.sender.clone()
    }

    pub fn owner(&self) -> OwnerToken {
        self.owner
    }

    /// Close the queue and wait for the worker to drain it
    ///
    /// Blocks until the thread exits. Senders obtained from
    /// [`sender`](Self::sender) keep the queue open until they are dropped.
    pub fn shutdown(self) -> DriverResult<WorkerReport> {
        let Self { sender, thread, owner } = self;
        drop(sender);
        thread
            .join()
            .map_err(|_| DriverError::WorkerStopped(format!("{} panicked", owner)))
    }
}

fn run<C: BrokerClient>(
    mut slot: DriverSlot<C>,
    mut receiver: mpsc::Receiver<Vec<u8>>,
    strategy: RetryStrategy,
) -> WorkerReport {
    let mut report = WorkerReport::default();

    while let Some(record) = receiver.blocking_recv() {
        let mut attempt = 0;
        loop {
            match slot.submit(&record) {
                Ok(()) => {
                    report.delivered += 1;
                    break;
                }
                Err(e) if e.is_connection_failure() && strategy.should_retry(attempt) => {
                    attempt += 1;
                    report.retries += 1;
                    let backoff = strategy.calculate_backoff(attempt);
                    warn!(
                        "Submit failed: {}, retrying in {:?} (attempt {}/{})",
                        e,
                        backoff,
                        attempt,
                        strategy.max_retries()
                    );
                    thread::sleep(backoff);
                }
                Err(e) => {
                    error!(
                        "Dropping record after {} retries on {}: {}",
                        attempt,
                        slot.owner(),
                        e
                    );
                    report.dropped += 1;
                    break;
                }
            }
        }
    }

    info!(
        "Worker for {} stopped: {} delivered, {} dropped, {} retries",
        slot.owner(),
        report.delivered,
        report.dropped,
        report.retries
    );
    report
}
