use std::sync::Arc;

use axum::extract::Path;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::auth::AdminSession;
use crate::err::JsonBody;
use crate::ledger::LedgerStats;
use crate::models::{money, PaymentRequest, SendReceipt};
use crate::receipt::ReceiptListing;
use crate::state::AppState;
use crate::{proceeds, Error, Payload};

pub async fn create(
    AdminSession(admin): AdminSession,
    Extension(state): Extension<Arc<AppState>>,
    JsonBody(payment): JsonBody<PaymentRequest>,
) -> Payload<GeneratedReceipt> {
    let record = state.receipts.generate(payment, &admin.identity()).await?;
    proceeds(GeneratedReceipt {
        message: "Receipt generated successfully".to_string(),
        receipt_url: format!("/api/payments/download/{}", record.receipt_id),
        receipt_id: record.receipt_id,
        student_name: record.student_name,
        student_email: record.student_email,
        amount: money(record.amount),
        timestamp: record.date,
    })
}

async fn document(state: &AppState, receipt_id: &str, disposition: &str) -> Result<Response, Error> {
    let (located, bytes) = state.receipts.read_document(receipt_id).await?;
    let disposition = format!("{}; filename=\"{}\"", disposition, located.file_name);
    Ok((
        [
            (CONTENT_TYPE, "application/pdf".to_string()),
            (CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// Serves the receipt as an attachment. Also mounted as `/receipt/:id`.
pub async fn download(
    _: AdminSession,
    Extension(state): Extension<Arc<AppState>>,
    Path(receipt_id): Path<String>,
) -> Result<Response, Error> {
    document(&state, &receipt_id, "attachment").await
}

pub async fn view(
    _: AdminSession,
    Extension(state): Extension<Arc<AppState>>,
    Path(receipt_id): Path<String>,
) -> Result<Response, Error> {
    document(&state, &receipt_id, "inline").await
}

pub async fn send_receipt(
    AdminSession(admin): AdminSession,
    Extension(state): Extension<Arc<AppState>>,
    JsonBody(request): JsonBody<SendReceipt>,
) -> Payload<SentReceipt> {
    let delivery = state
        .receipts
        .send(request, state.notifier.as_ref())
        .await?;
    log::info!(
        "{} requested receipt delivery (simulated: {})",
        admin.email,
        delivery.simulated
    );
    let message = if delivery.simulated {
        "Receipt sent successfully (simulated)"
    } else {
        "Receipt sent successfully"
    };
    proceeds(SentReceipt {
        message: message.to_string(),
        delivered: delivery.delivered,
        simulated: delivery.simulated,
    })
}

pub async fn list(
    _: AdminSession,
    Extension(state): Extension<Arc<AppState>>,
) -> Payload<ReceiptList> {
    let receipts = state.receipts.list().await?;
    proceeds(ReceiptList {
        count: receipts.len(),
        receipts,
    })
}

pub async fn stats(
    _: AdminSession,
    Extension(state): Extension<Arc<AppState>>,
) -> Payload<LedgerStats> {
    proceeds(state.receipts.stats().await?)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedReceipt {
    message: String,
    receipt_id: String,
    receipt_url: String,
    student_name: String,
    student_email: String,
    amount: String,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SentReceipt {
    message: String,
    delivered: bool,
    simulated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReceiptList {
    count: usize,
    receipts: Vec<ReceiptListing>,
}
