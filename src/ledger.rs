use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::models::{money, ReceiptRecord};
use crate::store::{JsonArray, SnapshotStore, StoreError};

/// Append-only record of every receipt issued.
pub struct ReceiptLedger {
    file: RwLock<Box<dyn SnapshotStore<ReceiptRecord>>>,
}

impl ReceiptLedger {
    pub fn new(store: impl SnapshotStore<ReceiptRecord> + 'static) -> Self {
        Self {
            file: RwLock::new(Box::new(store)),
        }
    }

    pub fn json(path: impl Into<PathBuf>) -> Self {
        Self::new(JsonArray::new(path))
    }

    /// Appends a record and returns the ledger size.
    pub async fn append(&self, record: ReceiptRecord) -> Result<usize, StoreError> {
        let file = self.file.write().await;
        let mut records = file.load().await?;
        if records.iter().any(|r| r.receipt_id == record.receipt_id) {
            return Err(StoreError::Conflict(format!(
                "receipt {} is already recorded",
                record.receipt_id
            )));
        }
        records.push(record);
        file.save(&records).await?;
        Ok(records.len())
    }

    pub async fn find_by_id(&self, receipt_id: &str) -> Result<Option<ReceiptRecord>, StoreError> {
        Ok(self
            .list_all()
            .await?
            .into_iter()
            .find(|record| record.receipt_id == receipt_id))
    }

    pub async fn list_all(&self) -> Result<Vec<ReceiptRecord>, StoreError> {
        let file = self.file.read().await;
        file.load().await
    }

    pub async fn stats(&self) -> Result<LedgerStats, StoreError> {
        Ok(LedgerStats::compute(&self.list_all().await?))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerStats {
    pub total_receipts: usize,
    pub total_amount: String,
    pub average_amount: String,
    pub last_receipt_at: Option<DateTime<Utc>>,
}

impl LedgerStats {
    pub fn compute(records: &[ReceiptRecord]) -> Self {
        let total: f64 = records.iter().map(|record| record.amount).sum();
        let average = if records.is_empty() {
            0.0
        } else {
            total / records.len() as f64
        };
        Self {
            total_receipts: records.len(),
            total_amount: money(total),
            average_amount: money(average),
            last_receipt_at: records.iter().map(|record| record.date).max(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, amount: f64) -> ReceiptRecord {
        ReceiptRecord {
            receipt_id: id.to_string(),
            student_id: "1".to_string(),
            student_name: "Jane".to_string(),
            student_email: "jane@x.com".to_string(),
            amount,
            description: "Course Fee Payment".to_string(),
            date: Utc::now(),
            file_name: format!("receipt_{}.pdf", id),
            file_path: format!("/tmp/receipt_{}.pdf", id),
            generated_by: "admin@x.com".to_string(),
        }
    }

    #[tokio::test]
    async fn append_then_find() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ReceiptLedger::json(dir.path().join("receipts.json"));
        assert!(ledger.list_all().await.unwrap().is_empty());

        assert_eq!(ledger.append(record("REC1_a", 400.0)).await.unwrap(), 1);
        assert_eq!(ledger.append(record("REC2_b", 100.0)).await.unwrap(), 2);

        let found = ledger.find_by_id("REC2_b").await.unwrap().unwrap();
        assert_eq!(found.amount, 100.0);
        assert!(ledger.find_by_id("REC3_c").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_ids_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ReceiptLedger::json(dir.path().join("receipts.json"));
        ledger.append(record("REC1_a", 400.0)).await.unwrap();
        assert!(matches!(
            ledger.append(record("REC1_a", 1.0)).await,
            Err(StoreError::Conflict(_))
        ));
        assert_eq!(ledger.list_all().await.unwrap().len(), 1);
    }

    #[test]
    fn stats_over_records() {
        let empty = LedgerStats::compute(&[]);
        assert_eq!(empty.total_amount, "0.00");
        assert_eq!(empty.average_amount, "0.00");
        assert!(empty.last_receipt_at.is_none());

        let stats = LedgerStats::compute(&[record("a", 400.0), record("b", 100.5)]);
        assert_eq!(stats.total_receipts, 2);
        assert_eq!(stats.total_amount, "500.50");
        assert_eq!(stats.average_amount, "250.25");
        assert!(stats.last_receipt_at.is_some());
    }
}
