use crate::domain::credential::Provider;
use crate::domain::money::Amount;
use crate::domain::payment_request::{Destination, PaymentRequest};
use crate::domain::{PaymentRequestId, TransferId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prepared payload for one outbound bank transfer call.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferOrder {
    /// Withdrawal account override; `None` uses the configured company account.
    pub from_account: Option<String>,
    pub to_account: String,
    pub to_bank_code: String,
    pub to_holder: String,
    pub amount: Amount,
    pub memo: String,
    /// Stable per-request key (`req_client_num`) so the provider can
    /// de-duplicate a re-submitted order.
    pub idempotency_key: String,
}

impl TransferOrder {
    pub fn for_request(request: &PaymentRequest, memo: String) -> Self {
        Self {
            from_account: None,
            to_account: request.destination.account_number.clone(),
            to_bank_code: request.destination.bank_code.clone(),
            to_holder: request.destination.holder.clone(),
            amount: request.total_amount(),
            memo,
            idempotency_key: request.id.simple().to_string(),
        }
    }
}

/// Provider acknowledgement of an accepted transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferReceipt {
    pub transaction_id: String,
    pub amount: Amount,
    pub timestamp: DateTime<Utc>,
}

/// Status column of the transfer audit record. Rows are only ever written
/// for provider-accepted calls, so the single value is `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Completed,
}

/// Append-only record that money moved.
///
/// Created only from a provider-accepted executor call and never mutated;
/// at most one exists per payment request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    pub payment_request_id: PaymentRequestId,
    pub provider: Provider,
    /// Provider transaction id — the source of truth that money moved.
    pub transaction_id: String,
    pub destination: Destination,
    pub amount: Amount,
    pub status: TransferStatus,
    pub executed_by: UserId,
    pub executed_at: DateTime<Utc>,
}

impl Transfer {
    pub fn from_receipt(
        request: &PaymentRequest,
        provider: Provider,
        receipt: &TransferReceipt,
        executed_by: UserId,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            payment_request_id: request.id,
            provider,
            transaction_id: receipt.transaction_id.clone(),
            destination: request.destination.clone(),
            amount: receipt.amount,
            status: TransferStatus::Completed,
            executed_by,
            executed_at: receipt.timestamp,
        }
    }
}
