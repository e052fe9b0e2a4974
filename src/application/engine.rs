use crate::application::credentials::CredentialManager;
use crate::application::dispatcher::SideEffectDispatcher;
use crate::application::locks::KeyedLocks;
use crate::domain::payment_request::{
    Destination, NewPaymentRequest, PaymentRequest, RequestStatus, TaxTreatment,
};
use crate::domain::ports::{
    BankGatewayRef, LedgerEntry, PaymentEvent, PaymentRequestStoreRef, TransferStoreRef,
};
use crate::domain::transfer::{Transfer, TransferOrder};
use crate::domain::{Actor, PaymentRequestId};
use crate::error::{PayoutError, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::info;

const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of `transfer_and_settle`.
#[derive(Debug, Clone, Serialize)]
pub struct SettlementOutcome {
    pub status: RequestStatus,
    pub transaction_id: String,
    /// True when the idempotency guard returned an already-recorded transfer
    /// instead of calling the bank again.
    pub reused: bool,
}

/// Per-status counts and sums for reporting.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RequestStats {
    pub pending_count: usize,
    pub approved_count: usize,
    pub rejected_count: usize,
    pub completed_count: usize,
    pub pending_amount: Decimal,
    pub completed_amount: Decimal,
}

/// The payment request state machine.
///
/// Owns every status transition of `PaymentRequest` and coordinates the
/// money calculator, credential manager, and transfer executor. Transitions
/// are serialized per request id, which also covers the idempotency check
/// before a bank call.
pub struct PayoutEngine {
    requests: PaymentRequestStoreRef,
    transfers: TransferStoreRef,
    credentials: Arc<CredentialManager>,
    gateway: BankGatewayRef,
    dispatcher: SideEffectDispatcher,
    locks: KeyedLocks<PaymentRequestId>,
    transfer_timeout: Duration,
}

impl PayoutEngine {
    pub fn new(
        requests: PaymentRequestStoreRef,
        transfers: TransferStoreRef,
        credentials: Arc<CredentialManager>,
        gateway: BankGatewayRef,
        dispatcher: SideEffectDispatcher,
    ) -> Self {
        Self {
            requests,
            transfers,
            credentials,
            gateway,
            dispatcher,
            locks: KeyedLocks::new(),
            transfer_timeout: DEFAULT_TRANSFER_TIMEOUT,
        }
    }

    pub fn with_transfer_timeout(mut self, transfer_timeout: Duration) -> Self {
        self.transfer_timeout = transfer_timeout;
        self
    }

    /// Creates a payment request in `pending`, with the payable amounts
    /// derived from the tax treatment.
    pub async fn create(&self, actor: &Actor, input: NewPaymentRequest) -> Result<PaymentRequest> {
        let request = PaymentRequest::create(input, Utc::now())?;
        self.requests.store(request.clone()).await?;
        info!(request_id = %request.id, requester = actor.user_id, "payment request created");
        self.dispatcher.dispatch(PaymentEvent::Created {
            request_id: request.id,
            project_id: request.project_id,
            requester: request.requester,
            amount: request.total_amount(),
        });
        Ok(request)
    }

    pub async fn get(&self, id: PaymentRequestId) -> Result<PaymentRequest> {
        self.requests.get(id).await?.ok_or(PayoutError::NotFound(id))
    }

    /// All requests, oldest first.
    pub async fn all(&self) -> Result<Vec<PaymentRequest>> {
        self.requests.all().await
    }

    pub async fn approve(&self, actor: &Actor, id: PaymentRequestId) -> Result<RequestStatus> {
        require_disburser(actor, "approve")?;
        let _guard = self.locks.acquire(id).await;
        let mut request = self.get(id).await?;
        request.approve(actor.user_id, Utc::now())?;
        self.requests.store(request.clone()).await?;
        info!(request_id = %id, approved_by = actor.user_id, "payment request approved");
        self.dispatcher.dispatch(PaymentEvent::Approved {
            request_id: id,
            approved_by: actor.user_id,
        });
        Ok(request.status)
    }

    pub async fn reject(
        &self,
        actor: &Actor,
        id: PaymentRequestId,
        reason: &str,
    ) -> Result<RequestStatus> {
        require_disburser(actor, "reject")?;
        let _guard = self.locks.acquire(id).await;
        let mut request = self.get(id).await?;
        request.reject(reason, Utc::now())?;
        self.requests.store(request.clone()).await?;
        info!(request_id = %id, "payment request rejected");
        self.dispatcher.dispatch(PaymentEvent::Rejected {
            request_id: id,
            reason: reason.to_owned(),
        });
        Ok(request.status)
    }

    /// Marks an approved request completed without a bank call, for funds
    /// moved out-of-band.
    pub async fn settle(&self, actor: &Actor, id: PaymentRequestId) -> Result<RequestStatus> {
        require_disburser(actor, "settle")?;
        let _guard = self.locks.acquire(id).await;
        let mut request = self.get(id).await?;
        request.settle_manually(Utc::now())?;
        self.requests.store(request.clone()).await?;
        info!(request_id = %id, "payment request settled manually");
        self.complete_side_effects(&request, None);
        Ok(request.status)
    }

    /// Switches the request's tax treatment, re-deriving payable amounts
    /// from the stored originals.
    pub async fn set_tax_treatment(
        &self,
        actor: &Actor,
        id: PaymentRequestId,
        treatment: TaxTreatment,
    ) -> Result<PaymentRequest> {
        let _guard = self.locks.acquire(id).await;
        let mut request = self.get(id).await?;
        if actor.user_id != request.requester && !actor.role.can_disburse() {
            return Err(PayoutError::Authorization(
                "only the requester or a manager may change amounts".into(),
            ));
        }
        request.set_tax_treatment(treatment, Utc::now())?;
        self.requests.store(request.clone()).await?;
        Ok(request)
    }

    /// Executes the bank transfer for an approved request and commits the
    /// terminal `completed` state.
    ///
    /// The idempotency guard runs under the same per-id lock as the
    /// transition: if a successful transfer is already recorded the cached
    /// result is returned without calling the bank, and a request left
    /// un-completed by a crash between the two commits is repaired here.
    pub async fn transfer_and_settle(
        &self,
        actor: &Actor,
        id: PaymentRequestId,
        corrected_destination: Option<Destination>,
    ) -> Result<SettlementOutcome> {
        require_disburser(actor, "transfer")?;
        let _guard = self.locks.acquire(id).await;
        let mut request = self.get(id).await?;

        if let Some(existing) = self.transfers.find_by_request(id).await? {
            if request.status != RequestStatus::Completed {
                request.complete_with_transfer(&existing.transaction_id, Utc::now())?;
                self.requests.store(request.clone()).await?;
                self.complete_side_effects(&request, Some(existing.transaction_id.clone()));
            }
            info!(request_id = %id, transaction_id = %existing.transaction_id,
                "transfer already recorded, returning cached result");
            return Ok(SettlementOutcome {
                status: RequestStatus::Completed,
                transaction_id: existing.transaction_id,
                reused: true,
            });
        }

        if request.status != RequestStatus::Approved {
            return Err(PayoutError::InvalidTransition {
                from: request.status,
                action: "transfer",
            });
        }

        if let Some(destination) = corrected_destination {
            request.set_destination(destination, Utc::now())?;
        }

        let provider = self.gateway.provider();
        let token = self
            .credentials
            .get_valid_access_token(actor.user_id, provider)
            .await?;

        let order = TransferOrder::for_request(&request, format!("payment #{id}"));
        // Rejections and transient failures leave the request in `approved`;
        // nothing has been persisted yet at this point.
        let receipt = match timeout(
            self.transfer_timeout,
            self.gateway.execute_transfer(token.secret(), &order),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => return Err(PayoutError::Transient("transfer call timed out".into())),
        };

        let transfer = Transfer::from_receipt(&request, provider, &receipt, actor.user_id);
        self.transfers.store(transfer).await?;
        // If this second commit fails, the transfer row stays behind and the
        // guard above repairs the request on the next call instead of paying
        // twice.
        request.complete_with_transfer(&receipt.transaction_id, Utc::now())?;
        self.requests.store(request.clone()).await?;

        info!(request_id = %id, transaction_id = %receipt.transaction_id,
            amount = %receipt.amount, "transfer completed");
        self.complete_side_effects(&request, Some(receipt.transaction_id.clone()));

        Ok(SettlementOutcome {
            status: request.status,
            transaction_id: receipt.transaction_id,
            reused: false,
        })
    }

    /// Per-status counts and amount sums across all requests.
    pub async fn stats(&self) -> Result<RequestStats> {
        let mut stats = RequestStats::default();
        for request in self.requests.all().await? {
            let total = request.total_amount().value();
            match request.status {
                RequestStatus::Pending => {
                    stats.pending_count += 1;
                    stats.pending_amount += total;
                }
                RequestStatus::Approved => stats.approved_count += 1,
                RequestStatus::Rejected => stats.rejected_count += 1,
                RequestStatus::Completed => {
                    stats.completed_count += 1;
                    stats.completed_amount += total;
                }
            }
        }
        Ok(stats)
    }

    fn complete_side_effects(&self, request: &PaymentRequest, transaction_id: Option<String>) {
        self.dispatcher.dispatch(PaymentEvent::Completed {
            request_id: request.id,
            amount: request.total_amount(),
            transaction_id,
        });
        self.dispatcher.record(LedgerEntry {
            payment_request_id: request.id,
            project_id: request.project_id,
            amount: request.total_amount(),
            material_amount: request.material_amount,
            labor_amount: request.labor_amount,
            recorded_at: request.paid_at.unwrap_or_else(Utc::now),
        });
    }
}

fn require_disburser(actor: &Actor, action: &str) -> Result<()> {
    if !actor.role.can_disburse() {
        return Err(PayoutError::Authorization(format!(
            "role {:?} may not {action} payment requests",
            actor.role
        )));
    }
    Ok(())
}
