//! Mock ledger for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::traits::*;

/// Mock ledger for testing.
///
/// Records every accepted hash and hands out sequential references.
/// Availability and latency are configurable.
pub struct MockLedger {
    ledger_id: String,
    available: AtomicBool,
    delay: Option<Duration>,
    call_count: AtomicU32,
    submitted: Mutex<Vec<String>>,
}

impl MockLedger {
    /// Create a new mock ledger.
    pub fn new(ledger_id: impl Into<String>) -> Self {
        Self {
            ledger_id: ledger_id.into(),
            available: AtomicBool::new(true),
            delay: None,
            call_count: AtomicU32::new(0),
            submitted: Mutex::new(Vec::new()),
        }
    }

    /// Set availability.
    pub fn with_available(self, available: bool) -> Self {
        self.available.store(available, Ordering::SeqCst);
        self
    }

    /// Delay every submission.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Toggle availability at runtime.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of times `submit_hash` was called.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Hashes accepted so far, in submission order.
    pub fn submitted(&self) -> Vec<String> {
        self.submitted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new("mock-ledger")
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    fn id(&self) -> &str {
        &self.ledger_id
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn submit_hash(&self, hex_hash: &str) -> Result<LedgerReceipt, LedgerError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        parse_hash(hex_hash)?;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if !self.available.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("Mock ledger disabled".to_string()));
        }

        let mut submitted = self.submitted.lock().unwrap_or_else(|e| e.into_inner());
        submitted.push(hex_hash.to_string());

        Ok(LedgerReceipt {
            ledger_reference: format!("{}-tx-{}", self.ledger_id, submitted.len()),
            block_number: Some(submitted.len() as u64),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_ledger() {
        let ledger = MockLedger::new("test-ledger");
        let hash = "00".repeat(32);

        assert!(ledger.is_available().await);
        assert_eq!(ledger.call_count(), 0);

        let receipt = ledger.submit_hash(&hash).await.unwrap();

        assert_eq!(receipt.ledger_reference, "test-ledger-tx-1");
        assert_eq!(ledger.call_count(), 1);
        assert_eq!(ledger.submitted(), vec![hash]);
    }

    #[tokio::test]
    async fn test_mock_unavailable() {
        let ledger = MockLedger::default().with_available(false);

        assert!(!ledger.is_available().await);

        let result = ledger.submit_hash(&"11".repeat(32)).await;
        assert!(matches!(result, Err(LedgerError::Unavailable(_))));
        assert!(ledger.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_mock_rejects_malformed_hash() {
        let ledger = MockLedger::default();
        assert!(matches!(
            ledger.submit_hash("not-a-hash").await,
            Err(LedgerError::InvalidHash(_))
        ));
    }
}
