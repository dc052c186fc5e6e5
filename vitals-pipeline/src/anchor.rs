//! Anchor worker - detached ledger submissions.
//!
//! The pipeline hands content hashes to an [`AnchorHandle`] and returns
//! immediately. A background task submits each hash to the ledger and, on
//! acknowledgement, appends an [`AnchorEntry`] to the anchor log. A failed
//! submission leaves the log untouched so the next ingestion anchors again.
//!
//! The worker only takes commands off the queue while a submission permit is
//! free, so at most `max_in_flight` submissions run and at most
//! `queue_capacity` wait behind them. Flushes are tracked by submission
//! sequence number and never hold up the command loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::{Id, JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use vitals_core::{AnchorEntry, Clock};

use crate::ledger::LedgerClient;
use crate::store::AnchorLog;

/// Why a hash could not be handed to the worker.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// Submission queue is at capacity
    #[error("Anchor queue is full")]
    QueueFull,

    /// Worker has shut down
    #[error("Anchor worker stopped")]
    Stopped,
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct AnchorWorkerConfig {
    /// Queued submissions before dispatch fails
    pub queue_capacity: usize,
    /// Concurrent ledger submissions
    pub max_in_flight: usize,
}

impl Default for AnchorWorkerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            max_in_flight: 4,
        }
    }
}

/// Counters of worker activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnchorStats {
    /// Hashes accepted into the queue
    pub queued: u64,
    /// Ledger acknowledgements recorded in the log
    pub anchored: u64,
    /// Submissions the ledger refused or failed
    pub ledger_failures: u64,
    /// Acknowledged submissions the log failed to record
    pub log_failures: u64,
}

#[derive(Default)]
struct Counters {
    queued: AtomicU64,
    anchored: AtomicU64,
    ledger_failures: AtomicU64,
    log_failures: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> AnchorStats {
        AnchorStats {
            queued: self.queued.load(Ordering::SeqCst),
            anchored: self.anchored.load(Ordering::SeqCst),
            ledger_failures: self.ledger_failures.load(Ordering::SeqCst),
            log_failures: self.log_failures.load(Ordering::SeqCst),
        }
    }
}

enum AnchorCommand {
    Submit { hash: String },
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// Handle for dispatching hashes to a running worker.
#[derive(Clone)]
pub struct AnchorHandle {
    tx: mpsc::Sender<AnchorCommand>,
    counters: Arc<Counters>,
}

impl AnchorHandle {
    /// Queue a hash for anchoring without waiting for the ledger.
    pub fn submit(&self, hash: impl Into<String>) -> Result<(), DispatchError> {
        let hash = hash.into();
        match self.tx.try_send(AnchorCommand::Submit { hash }) {
            Ok(()) => {
                self.counters.queued.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(DispatchError::QueueFull),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(DispatchError::Stopped),
        }
    }

    /// Wait until every submission queued so far has finished.
    ///
    /// Submissions made while the flush is pending are not waited for.
    pub async fn flush(&self) -> Result<(), DispatchError> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(AnchorCommand::Flush(ack))
            .await
            .map_err(|_| DispatchError::Stopped)?;
        done.await.map_err(|_| DispatchError::Stopped)
    }

    /// Finish outstanding submissions and stop the worker.
    pub async fn shutdown(&self) -> Result<(), DispatchError> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(AnchorCommand::Shutdown(ack))
            .await
            .map_err(|_| DispatchError::Stopped)?;
        done.await.map_err(|_| DispatchError::Stopped)
    }

    /// Current counters.
    pub fn stats(&self) -> AnchorStats {
        self.counters.snapshot()
    }

    /// Whether the worker still accepts submissions.
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Background task that anchors hashes.
pub struct AnchorWorker {
    ledger: Arc<dyn LedgerClient>,
    log: Arc<dyn AnchorLog>,
    clock: Arc<dyn Clock>,
    semaphore: Arc<Semaphore>,
    counters: Arc<Counters>,
    in_flight: JoinSet<()>,
    /// Sequence number of each running submission
    running: HashMap<Id, u64>,
    next_seq: u64,
    /// Flushes waiting for every submission below their sequence number
    flush_waiters: Vec<(u64, oneshot::Sender<()>)>,
}

impl AnchorWorker {
    /// Spawn a worker on the current runtime.
    pub fn spawn(
        ledger: Arc<dyn LedgerClient>,
        log: Arc<dyn AnchorLog>,
        clock: Arc<dyn Clock>,
        config: AnchorWorkerConfig,
    ) -> AnchorHandle {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let counters = Arc::new(Counters::default());

        let worker = Self {
            ledger,
            log,
            clock,
            semaphore: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
            counters: Arc::clone(&counters),
            in_flight: JoinSet::new(),
            running: HashMap::new(),
            next_seq: 0,
            flush_waiters: Vec::new(),
        };

        info!(
            queue_capacity = config.queue_capacity,
            max_in_flight = config.max_in_flight,
            "Anchor worker started"
        );
        tokio::spawn(worker.run(rx));

        AnchorHandle { tx, counters }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<AnchorCommand>) {
        loop {
            // Permits are only held by tasks in the join set, so one branch is always enabled
            let has_capacity = self.semaphore.available_permits() > 0;

            tokio::select! {
                command = rx.recv(), if has_capacity => match command {
                    Some(AnchorCommand::Submit { hash }) => self.start(hash).await,
                    Some(AnchorCommand::Flush(ack)) => self.register_flush(ack),
                    Some(AnchorCommand::Shutdown(ack)) => {
                        rx.close();
                        while let Some(command) = rx.recv().await {
                            match command {
                                AnchorCommand::Submit { hash } => self.start(hash).await,
                                AnchorCommand::Flush(ack) | AnchorCommand::Shutdown(ack) => {
                                    self.register_flush(ack);
                                }
                            }
                        }
                        self.drain().await;
                        let _ = ack.send(());
                        break;
                    }
                    None => {
                        self.drain().await;
                        break;
                    }
                },
                Some(joined) = self.in_flight.join_next_with_id(), if !self.in_flight.is_empty() => {
                    self.finish(joined);
                }
            }
        }

        info!("Anchor worker stopped");
    }

    async fn start(&mut self, hash: String) {
        let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                error!(hash = %hash, error = %e, "Anchor permits closed, dropping submission");
                return;
            }
        };

        let ledger = Arc::clone(&self.ledger);
        let log = Arc::clone(&self.log);
        let clock = Arc::clone(&self.clock);
        let counters = Arc::clone(&self.counters);

        let seq = self.next_seq;
        self.next_seq += 1;

        let task = self.in_flight.spawn(async move {
            let _permit = permit;
            anchor_once(ledger.as_ref(), log.as_ref(), clock.as_ref(), &counters, &hash).await;
        });
        self.running.insert(task.id(), seq);
    }

    fn finish(&mut self, joined: Result<(Id, ()), JoinError>) {
        let id = match joined {
            Ok((id, ())) => id,
            Err(e) => {
                error!(error = %e, "Anchor submission task failed");
                e.id()
            }
        };
        self.running.remove(&id);
        self.release_flushes();
    }

    fn register_flush(&mut self, ack: oneshot::Sender<()>) {
        self.flush_waiters.push((self.next_seq, ack));
        self.release_flushes();
    }

    /// Acknowledge flushes whose earlier submissions have all finished.
    fn release_flushes(&mut self) {
        let oldest_running = self.running.values().min().copied().unwrap_or(u64::MAX);
        let (ready, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.flush_waiters)
            .into_iter()
            .partition(|(target, _)| *target <= oldest_running);
        self.flush_waiters = waiting;
        for (_, ack) in ready {
            let _ = ack.send(());
        }
    }

    async fn drain(&mut self) {
        while let Some(joined) = self.in_flight.join_next_with_id().await {
            self.finish(joined);
        }
    }
}

async fn anchor_once(
    ledger: &dyn LedgerClient,
    log: &dyn AnchorLog,
    clock: &dyn Clock,
    counters: &Counters,
    hash: &str,
) {
    debug!(hash = %hash, ledger = %ledger.id(), "Submitting hash to ledger");

    let receipt = match ledger.submit_hash(hash).await {
        Ok(receipt) => receipt,
        Err(e) => {
            counters.ledger_failures.fetch_add(1, Ordering::SeqCst);
            warn!(hash = %hash, error = %e, "Ledger submission failed; will retry on next ingestion");
            return;
        }
    };

    let entry = AnchorEntry::new(hash, receipt.ledger_reference.clone(), clock.now());
    match log.append(entry).await {
        Ok(()) => {
            counters.anchored.fetch_add(1, Ordering::SeqCst);
            info!(
                hash = %hash,
                reference = %receipt.ledger_reference,
                block = ?receipt.block_number,
                "Hash anchored"
            );
        }
        Err(e) => {
            counters.log_failures.fetch_add(1, Ordering::SeqCst);
            error!(
                hash = %hash,
                reference = %receipt.ledger_reference,
                error = %e,
                "Ledger acknowledged hash but anchor log append failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MockLedger;
    use crate::store::MemoryStore;
    use std::time::Duration;
    use vitals_core::SystemClock;

    fn spawn(ledger: Arc<MockLedger>, store: Arc<MemoryStore>) -> AnchorHandle {
        AnchorWorker::spawn(ledger, store, Arc::new(SystemClock), AnchorWorkerConfig::default())
    }

    #[tokio::test]
    async fn test_successful_anchor_appends_entry() {
        let ledger = Arc::new(MockLedger::default());
        let store = Arc::new(MemoryStore::new());
        let handle = spawn(Arc::clone(&ledger), Arc::clone(&store));

        let hash = "ab".repeat(32);
        handle.submit(hash.clone()).unwrap();
        handle.flush().await.unwrap();

        let latest = store.most_recent().await.unwrap().unwrap();
        assert_eq!(latest.content_hash, hash);
        assert_eq!(latest.ledger_reference, "mock-ledger-tx-1");
        assert_eq!(
            handle.stats(),
            AnchorStats {
                queued: 1,
                anchored: 1,
                ..Default::default()
            }
        );
    }

    #[tokio::test]
    async fn test_ledger_failure_leaves_log_untouched() {
        let ledger = Arc::new(MockLedger::default().with_available(false));
        let store = Arc::new(MemoryStore::new());
        let handle = spawn(Arc::clone(&ledger), Arc::clone(&store));

        handle.submit("cd".repeat(32)).unwrap();
        handle.flush().await.unwrap();

        assert_eq!(store.anchor_count().await, 0);
        assert_eq!(ledger.call_count(), 1);
        assert_eq!(handle.stats().ledger_failures, 1);
    }

    #[tokio::test]
    async fn test_log_failure_is_counted() {
        let ledger = Arc::new(MockLedger::default());
        let store = Arc::new(MemoryStore::new());
        store.set_anchor_log_available(false);
        let handle = spawn(Arc::clone(&ledger), Arc::clone(&store));

        handle.submit("ef".repeat(32)).unwrap();
        handle.flush().await.unwrap();

        assert_eq!(ledger.submitted().len(), 1);
        assert_eq!(handle.stats().log_failures, 1);
        assert_eq!(handle.stats().anchored, 0);
    }

    #[tokio::test]
    async fn test_slow_ledger_does_not_block_submit() {
        let ledger = Arc::new(MockLedger::default().with_delay(Duration::from_millis(200)));
        let store = Arc::new(MemoryStore::new());
        let handle = spawn(Arc::clone(&ledger), Arc::clone(&store));

        let started = std::time::Instant::now();
        for i in 0..3u8 {
            handle.submit(hex::encode([i; 32])).unwrap();
        }
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(store.anchor_count().await, 0);

        handle.flush().await.unwrap();
        assert_eq!(store.anchor_count().await, 3);
    }

    #[tokio::test]
    async fn test_queue_full_and_stopped() {
        let ledger = Arc::new(MockLedger::default());
        let store = Arc::new(MemoryStore::new());
        let handle = AnchorWorker::spawn(
            ledger,
            store,
            Arc::new(SystemClock),
            AnchorWorkerConfig {
                queue_capacity: 1,
                max_in_flight: 1,
            },
        );

        // The worker has not been polled yet on this single-threaded runtime
        handle.submit("01".repeat(32)).unwrap();
        assert_eq!(handle.submit("02".repeat(32)), Err(DispatchError::QueueFull));

        handle.shutdown().await.unwrap();
        assert!(!handle.is_running());
        assert_eq!(handle.submit("03".repeat(32)), Err(DispatchError::Stopped));
        assert_eq!(handle.flush().await, Err(DispatchError::Stopped));
    }

    #[tokio::test]
    async fn test_backlog_bounded_by_queue_capacity() {
        let ledger = Arc::new(MockLedger::default().with_delay(Duration::from_millis(300)));
        let store = Arc::new(MemoryStore::new());
        let handle = AnchorWorker::spawn(
            ledger.clone() as Arc<dyn LedgerClient>,
            store.clone() as Arc<dyn AnchorLog>,
            Arc::new(SystemClock),
            AnchorWorkerConfig {
                queue_capacity: 1,
                max_in_flight: 1,
            },
        );

        handle.submit("0a".repeat(32)).unwrap();
        // Let the worker start the first submission
        tokio::time::sleep(Duration::from_millis(50)).await;

        // One waits in the queue behind the running submission, the next is refused
        handle.submit("0b".repeat(32)).unwrap();
        assert_eq!(handle.submit("0c".repeat(32)), Err(DispatchError::QueueFull));

        handle.flush().await.unwrap();
        assert_eq!(store.anchor_count().await, 2);
        assert_eq!(ledger.call_count(), 2);
        assert_eq!(handle.stats().queued, 2);
    }

    #[tokio::test]
    async fn test_submit_accepted_while_flush_pending() {
        let ledger = Arc::new(MockLedger::default().with_delay(Duration::from_millis(300)));
        let store = Arc::new(MemoryStore::new());
        let handle = AnchorWorker::spawn(
            ledger.clone() as Arc<dyn LedgerClient>,
            store.clone() as Arc<dyn AnchorLog>,
            Arc::new(SystemClock),
            AnchorWorkerConfig {
                queue_capacity: 1,
                max_in_flight: 4,
            },
        );

        handle.submit("1a".repeat(32)).unwrap();
        let flusher = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.flush().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The pending flush must not stop the worker from taking new submissions
        handle.submit("1b".repeat(32)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.submit("1c".repeat(32)).unwrap();

        flusher.await.unwrap().unwrap();
        assert!(store.anchor_count().await >= 1);

        handle.flush().await.unwrap();
        assert_eq!(store.anchor_count().await, 3);
    }
}
