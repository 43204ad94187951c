//! Uploads pending ledger records within the remote rate quota.

use energy_store::ReconstructedRecord;

use super::ledger::{Ledger, LedgerError};

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("endpoint answered {0}")]
    Status(u16),
    #[error("record {0} has no local date")]
    Timestamp(i64),
}

/// The remote endpoint, seen from the publisher.
#[async_trait::async_trait]
pub trait PublishTransport: Send + Sync {
    /// Calls left in the current rate window, or `None` if the endpoint did not say.
    async fn remaining_quota(&self) -> Result<Option<u32>, TransportError>;

    /// `true` only when the endpoint confirmed the upload.
    async fn post(&self, record: &ReconstructedRecord) -> Result<bool, TransportError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub quota: Option<u32>,
    pub attempted: usize,
    pub published: usize,
    pub failed: usize,
}

pub struct Publisher<T> {
    ledger: Ledger,
    transport: T,
    margin: u32,
}

impl<T: PublishTransport> Publisher<T> {
    pub fn new(ledger: Ledger, transport: T, margin: u32) -> Self {
        Self {
            ledger,
            transport,
            margin,
        }
    }

    /// Uploads at most `quota - margin` pending records, oldest first.
    ///
    /// Failed uploads stay pending for the next cycle. Only ledger errors are
    /// returned; transport trouble is logged and reported.
    pub async fn publish_batch(&self) -> Result<PublishReport, LedgerError> {
        let mut report = PublishReport::default();

        let quota = match self.transport.remaining_quota().await {
            Ok(Some(quota)) => quota,
            Ok(None) => {
                tracing::warn!("endpoint did not report a rate limit, skipping upload");
                return Ok(report);
            }
            Err(e) => {
                tracing::warn!(error = %e, "rate limit query failed, skipping upload");
                return Ok(report);
            }
        };
        report.quota = Some(quota);

        let budget = quota.saturating_sub(self.margin);
        if budget == 0 {
            tracing::info!(quota, margin = self.margin, "rate limit too low, skipping upload");
            return Ok(report);
        }

        for record in self.ledger.pending(budget as usize).await? {
            report.attempted += 1;
            match self.transport.post(&record).await {
                Ok(true) => {
                    self.ledger.mark_published(record.timestamp).await?;
                    report.published += 1;
                    metrics::counter!("publisher_uploads_total").increment(1);
                }
                Ok(false) => {
                    report.failed += 1;
                    metrics::counter!("publisher_upload_failures_total").increment(1);
                }
                Err(e) => {
                    tracing::warn!(timestamp = record.timestamp, error = %e, "upload failed");
                    report.failed += 1;
                    metrics::counter!("publisher_upload_failures_total").increment(1);
                }
            }
        }

        tracing::info!(
            quota,
            attempted = report.attempted,
            published = report.published,
            failed = report.failed,
            "upload batch finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use super::*;
    use energy_store::db::{memory_pool, schema};

    /// In-memory endpoint that records what it was sent.
    #[derive(Default)]
    pub(crate) struct FakeTransport {
        pub quota: Option<u32>,
        pub quota_fails: bool,
        pub rejected: Vec<i64>,
        pub posted: Mutex<Vec<i64>>,
    }

    impl FakeTransport {
        pub fn with_quota(quota: u32) -> Self {
            Self {
                quota: Some(quota),
                ..Self::default()
            }
        }

        pub fn posted(&self) -> Vec<i64> {
            self.posted.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl PublishTransport for FakeTransport {
        async fn remaining_quota(&self) -> Result<Option<u32>, TransportError> {
            if self.quota_fails {
                return Err(TransportError::Status(503));
            }
            Ok(self.quota)
        }

        async fn post(&self, record: &ReconstructedRecord) -> Result<bool, TransportError> {
            self.posted.lock().unwrap().push(record.timestamp);
            Ok(!self.rejected.contains(&record.timestamp))
        }
    }

    async fn ledger_with_pending(count: i64) -> Ledger {
        let ledger = Ledger::new(memory_pool(&[schema::LEDGER_SCHEMA]).await.unwrap());
        for i in 1..=count {
            let record = ReconstructedRecord {
                energy_generation_wh: Some(i as f64),
                ..ReconstructedRecord::new(i * 600)
            };
            ledger.append(&record).await.unwrap();
        }
        ledger
    }

    #[tokio::test]
    async fn never_posts_more_than_quota_minus_margin() {
        let ledger = ledger_with_pending(30).await;
        let publisher = Publisher::new(ledger.clone(), FakeTransport::with_quota(20), 15);

        let report = publisher.publish_batch().await.unwrap();
        assert_eq!(report.attempted, 5);
        assert_eq!(report.published, 5);
        assert_eq!(publisher.transport.posted(), vec![600, 1200, 1800, 2400, 3000]);
        assert_eq!(ledger.pending(100).await.unwrap().len(), 25);
    }

    #[tokio::test]
    async fn quota_at_margin_uploads_nothing() {
        let ledger = ledger_with_pending(3).await;
        let publisher = Publisher::new(ledger, FakeTransport::with_quota(15), 15);

        let report = publisher.publish_batch().await.unwrap();
        assert_eq!(report.quota, Some(15));
        assert_eq!(report.attempted, 0);
        assert!(publisher.transport.posted().is_empty());
    }

    #[tokio::test]
    async fn unknown_quota_uploads_nothing() {
        let ledger = ledger_with_pending(3).await;

        let publisher = Publisher::new(ledger.clone(), FakeTransport::default(), 15);
        assert_eq!(publisher.publish_batch().await.unwrap(), PublishReport::default());

        let failing = FakeTransport {
            quota_fails: true,
            ..FakeTransport::with_quota(100)
        };
        let publisher = Publisher::new(ledger, failing, 15);
        assert_eq!(publisher.publish_batch().await.unwrap(), PublishReport::default());
        assert!(publisher.transport.posted().is_empty());
    }

    #[tokio::test]
    async fn rejected_upload_stays_pending() {
        let ledger = ledger_with_pending(3).await;
        let transport = FakeTransport {
            rejected: vec![1200],
            ..FakeTransport::with_quota(60)
        };
        let publisher = Publisher::new(ledger.clone(), transport, 15);

        let report = publisher.publish_batch().await.unwrap();
        assert_eq!((report.attempted, report.published, report.failed), (3, 2, 1));

        let left: Vec<i64> = ledger.pending(10).await.unwrap().iter().map(|r| r.timestamp).collect();
        assert_eq!(left, vec![1200]);
    }
}
