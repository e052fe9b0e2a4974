use crate::domain::credential::{BankCredential, Provider, TokenGrant};
use crate::domain::money::Amount;
use crate::domain::payment_request::PaymentRequest;
use crate::domain::transfer::{Transfer, TransferOrder, TransferReceipt};
use crate::domain::{PaymentRequestId, ProjectId, UserId};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

pub type PaymentRequestStoreRef = Arc<dyn PaymentRequestStore>;
pub type TransferStoreRef = Arc<dyn TransferStore>;
pub type CredentialStoreRef = Arc<dyn CredentialStore>;
pub type BankGatewayRef = Arc<dyn BankGateway>;
pub type NotifierRef = Arc<dyn Notifier>;
pub type LedgerSinkRef = Arc<dyn LedgerSink>;

#[async_trait]
pub trait PaymentRequestStore: Send + Sync {
    async fn store(&self, request: PaymentRequest) -> Result<()>;
    async fn get(&self, id: PaymentRequestId) -> Result<Option<PaymentRequest>>;
    async fn all(&self) -> Result<Vec<PaymentRequest>>;
}

#[async_trait]
pub trait TransferStore: Send + Sync {
    async fn store(&self, transfer: Transfer) -> Result<()>;
    /// The at-most-one successful transfer recorded for a payment request.
    async fn find_by_request(&self, id: PaymentRequestId) -> Result<Option<Transfer>>;
    async fn all(&self) -> Result<Vec<Transfer>>;
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, user_id: UserId, provider: Provider) -> Result<Option<BankCredential>>;
    /// Insert-or-replace: at most one row per (user, provider).
    async fn upsert(&self, credential: BankCredential) -> Result<()>;
    async fn delete(&self, user_id: UserId, provider: Provider) -> Result<()>;
}

/// Outbound HTTP surface of one banking provider: OAuth token lifecycle and
/// the transfer endpoint. Implementations never retry internally; retry
/// policy belongs to the orchestration layer.
#[async_trait]
pub trait BankGateway: Send + Sync {
    fn provider(&self) -> Provider;

    /// Exchanges a refresh token for fresh token material. A stale refresh
    /// token must surface as `NeedsAuthorization`, transport failures as
    /// `Transient`.
    async fn refresh_token(&self, user_id: UserId, refresh_token: &str) -> Result<TokenGrant>;

    /// Executes one funds transfer. Provider business rejections surface as
    /// `Rejected` with the provider's code and message verbatim; transport
    /// failures as `Transient`.
    async fn execute_transfer(
        &self,
        access_token: &str,
        order: &TransferOrder,
    ) -> Result<TransferReceipt>;
}

/// Advisory notification fired after a committed state transition.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaymentEvent {
    Created {
        request_id: PaymentRequestId,
        project_id: ProjectId,
        requester: UserId,
        amount: Amount,
    },
    Approved {
        request_id: PaymentRequestId,
        approved_by: UserId,
    },
    Rejected {
        request_id: PaymentRequestId,
        reason: String,
    },
    Completed {
        request_id: PaymentRequestId,
        amount: Amount,
        /// Absent for manual settlements.
        transaction_id: Option<String>,
    },
}

/// Denormalized execution-ledger row written after a completed disbursement,
/// for reporting only.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
    pub payment_request_id: PaymentRequestId,
    pub project_id: ProjectId,
    pub amount: Amount,
    pub material_amount: Amount,
    pub labor_amount: Amount,
    pub recorded_at: DateTime<Utc>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &PaymentEvent) -> Result<()>;
}

#[async_trait]
pub trait LedgerSink: Send + Sync {
    async fn record(&self, entry: &LedgerEntry) -> Result<()>;
}
