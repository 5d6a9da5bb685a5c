use std::path::PathBuf;

use chrono::Utc;
use rand::{thread_rng, Rng};
use serde::Serialize;

use crate::config::Branding;
use crate::io::{file_exists, read_io_file, write_io_file};
use crate::ledger::{LedgerStats, ReceiptLedger};
use crate::models::{round_cents, Identity, PaymentRequest, ReceiptRecord, SendReceipt};
use crate::notify::{Delivery, Notifier, NotifyError, ReceiptMail};
use crate::pdf::{self, ReceiptSheet, DEFAULT_DESCRIPTION};
use crate::store::StoreError;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, thiserror::Error)]
pub enum ReceiptError {
    #[error("Student ID, Name, Email, and Amount are required")]
    MissingFields,
    #[error("Receipt ID and student email are required")]
    MissingDeliveryFields,
    #[error("Amount must be a non-negative number")]
    InvalidAmount,
    #[error("Receipt not found")]
    ReceiptNotFound(String),
    #[error("could not render receipt: {0}")]
    Render(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Failed to send email: {0}")]
    Delivery(#[from] NotifyError),
}

/// Where a receipt document was found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedReceipt {
    pub file_name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptListing {
    #[serde(flatten)]
    pub record: ReceiptRecord,
    pub available: bool,
}

/// Issues receipt documents, keeps them on disk and hands them out again.
pub struct ReceiptDesk {
    dir: PathBuf,
    ledger: ReceiptLedger,
    branding: Branding,
}

impl ReceiptDesk {
    pub fn new(dir: impl Into<PathBuf>, ledger: ReceiptLedger, branding: Branding) -> Self {
        Self {
            dir: dir.into(),
            ledger,
            branding,
        }
    }

    fn document_name(receipt_id: &str) -> String {
        format!("receipt_{}.pdf", receipt_id)
    }

    pub async fn generate(
        &self,
        payment: PaymentRequest,
        issuer: &Identity,
    ) -> Result<ReceiptRecord, ReceiptError> {
        let student_id = payment
            .student_id
            .filter(|id| !id.is_blank())
            .ok_or(ReceiptError::MissingFields)?
            .to_string();
        let student_name = present(payment.student_name).ok_or(ReceiptError::MissingFields)?;
        let student_email = present(payment.student_email).ok_or(ReceiptError::MissingFields)?;
        let amount = payment
            .amount
            .filter(|amount| !amount.is_blank())
            .ok_or(ReceiptError::MissingFields)?
            .value()
            .map(round_cents)
            .ok_or(ReceiptError::InvalidAmount)?;
        let description =
            present(payment.description).unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());

        let receipt_id = new_receipt_id();
        let issued_at = Utc::now();
        let sheet = ReceiptSheet {
            receipt_id: receipt_id.clone(),
            issued_at,
            student_id: student_id.clone(),
            student_name: student_name.clone(),
            student_email: student_email.clone(),
            amount,
            description: description.clone(),
            branding: self.branding.clone(),
        };
        let document =
            tokio::task::spawn_blocking(move || pdf::render(&sheet).map_err(|err| err.to_string()))
                .await
                .map_err(|err| ReceiptError::Render(err.to_string()))?
                .map_err(ReceiptError::Render)?;

        let file_name = Self::document_name(&receipt_id);
        let path = self.dir.join(&file_name);
        write_io_file(&path, &document).await?;

        let record = ReceiptRecord {
            receipt_id,
            student_id,
            student_name,
            student_email,
            amount,
            description,
            date: issued_at,
            file_name,
            file_path: path.to_string_lossy().into_owned(),
            generated_by: issuer.email.clone(),
        };
        self.ledger.append(record.clone()).await?;
        log::info!(
            "Issued receipt {} for {} ({:.2})",
            record.receipt_id,
            record.student_email,
            record.amount
        );
        Ok(record)
    }

    /// Finds the document for `receipt_id`: the receipts directory first, then
    /// the path recorded in the ledger.
    pub async fn locate(&self, receipt_id: &str) -> Result<LocatedReceipt, ReceiptError> {
        let not_found = || ReceiptError::ReceiptNotFound(receipt_id.to_string());
        if !valid_id(receipt_id) {
            return Err(not_found());
        }

        let file_name = Self::document_name(receipt_id);
        let path = self.dir.join(&file_name);
        if file_exists(&path).await {
            return Ok(LocatedReceipt { file_name, path });
        }

        let record = self.ledger.find_by_id(receipt_id).await?.ok_or_else(not_found)?;
        let path = PathBuf::from(&record.file_path);
        if file_exists(&path).await {
            return Ok(LocatedReceipt {
                file_name: record.file_name,
                path,
            });
        }
        Err(not_found())
    }

    pub async fn read_document(
        &self,
        receipt_id: &str,
    ) -> Result<(LocatedReceipt, Vec<u8>), ReceiptError> {
        let located = self.locate(receipt_id).await?;
        match read_io_file(&located.path).await? {
            Some(bytes) => Ok((located, bytes)),
            None => Err(ReceiptError::ReceiptNotFound(receipt_id.to_string())),
        }
    }

    pub async fn send(
        &self,
        request: SendReceipt,
        notifier: &dyn Notifier,
    ) -> Result<Delivery, ReceiptError> {
        let receipt_id = present(request.receipt_id).ok_or(ReceiptError::MissingDeliveryFields)?;
        let recipient_email =
            present(request.student_email).ok_or(ReceiptError::MissingDeliveryFields)?;
        let recipient_name = present(request.student_name).unwrap_or_else(|| "Student".to_string());

        let (located, document) = self.read_document(&receipt_id).await?;
        let delivery = notifier
            .send(ReceiptMail {
                receipt_id,
                recipient_email,
                recipient_name,
                file_name: located.file_name,
                document,
                sender_name: self.branding.name.clone(),
            })
            .await?;
        Ok(delivery)
    }

    pub async fn list(&self) -> Result<Vec<ReceiptListing>, ReceiptError> {
        let mut listings = Vec::new();
        for record in self.ledger.list_all().await? {
            let available = file_exists(&PathBuf::from(&record.file_path)).await
                || file_exists(&self.dir.join(&record.file_name)).await;
            listings.push(ReceiptListing { record, available });
        }
        Ok(listings)
    }

    pub async fn find(&self, receipt_id: &str) -> Result<Option<ReceiptRecord>, ReceiptError> {
        Ok(self.ledger.find_by_id(receipt_id).await?)
    }

    pub async fn stats(&self) -> Result<LedgerStats, ReceiptError> {
        Ok(self.ledger.stats().await?)
    }
}

fn present(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn valid_id(receipt_id: &str) -> bool {
    !receipt_id.is_empty()
        && receipt_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `REC{unix millis}_{9 base-36 chars}`
fn new_receipt_id() -> String {
    let mut rng = thread_rng();
    let suffix: String = (0..9)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("REC{}_{}", Utc::now().timestamp_millis(), suffix)
}
