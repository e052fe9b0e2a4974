use crate::domain::credential::{BankCredential, Provider};
use crate::domain::payment_request::PaymentRequest;
use crate::domain::ports::{
    CredentialStore, LedgerEntry, LedgerSink, PaymentRequestStore, TransferStore,
};
use crate::domain::transfer::Transfer;
use crate::domain::{PaymentRequestId, UserId};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Thread-safe in-memory store for payment requests.
///
/// Uses `Arc<RwLock<HashMap>>` for shared concurrent access; suitable for
/// tests and the CLI harness.
#[derive(Default, Clone)]
pub struct InMemoryPaymentRequestStore {
    requests: Arc<RwLock<HashMap<PaymentRequestId, PaymentRequest>>>,
}

impl InMemoryPaymentRequestStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentRequestStore for InMemoryPaymentRequestStore {
    async fn store(&self, request: PaymentRequest) -> Result<()> {
        let mut requests = self.requests.write().await;
        requests.insert(request.id, request);
        Ok(())
    }

    async fn get(&self, id: PaymentRequestId) -> Result<Option<PaymentRequest>> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id).cloned())
    }

    async fn all(&self) -> Result<Vec<PaymentRequest>> {
        let requests = self.requests.read().await;
        let mut all: Vec<_> = requests.values().cloned().collect();
        all.sort_by_key(|r| r.created_at);
        Ok(all)
    }
}

/// Thread-safe in-memory store for transfer audit records, keyed by the
/// payment request they fulfill.
#[derive(Default, Clone)]
pub struct InMemoryTransferStore {
    transfers: Arc<RwLock<HashMap<PaymentRequestId, Transfer>>>,
}

impl InMemoryTransferStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransferStore for InMemoryTransferStore {
    async fn store(&self, transfer: Transfer) -> Result<()> {
        let mut transfers = self.transfers.write().await;
        transfers.insert(transfer.payment_request_id, transfer);
        Ok(())
    }

    async fn find_by_request(&self, id: PaymentRequestId) -> Result<Option<Transfer>> {
        let transfers = self.transfers.read().await;
        Ok(transfers.get(&id).cloned())
    }

    async fn all(&self) -> Result<Vec<Transfer>> {
        let transfers = self.transfers.read().await;
        let mut all: Vec<_> = transfers.values().cloned().collect();
        all.sort_by_key(|t| t.executed_at);
        Ok(all)
    }
}

/// Thread-safe in-memory credential store, one row per (user, provider).
#[derive(Default, Clone)]
pub struct InMemoryCredentialStore {
    credentials: Arc<RwLock<HashMap<(UserId, Provider), BankCredential>>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn get(&self, user_id: UserId, provider: Provider) -> Result<Option<BankCredential>> {
        let credentials = self.credentials.read().await;
        Ok(credentials.get(&(user_id, provider)).cloned())
    }

    async fn upsert(&self, credential: BankCredential) -> Result<()> {
        let mut credentials = self.credentials.write().await;
        credentials.insert(credential.key(), credential);
        Ok(())
    }

    async fn delete(&self, user_id: UserId, provider: Provider) -> Result<()> {
        let mut credentials = self.credentials.write().await;
        credentials.remove(&(user_id, provider));
        Ok(())
    }
}

/// In-memory execution ledger for reporting in tests and the CLI harness.
#[derive(Default, Clone)]
pub struct InMemoryLedger {
    entries: Arc<RwLock<Vec<LedgerEntry>>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<LedgerEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl LedgerSink for InMemoryLedger {
    async fn record(&self, entry: &LedgerEntry) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::credential::EncryptedToken;
    use crate::domain::money::Amount;
    use crate::domain::payment_request::{
        Destination, NewPaymentRequest, PaymentRequest, TaxTreatment,
    };
    use crate::domain::transfer::{TransferReceipt, TransferStatus};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn request() -> PaymentRequest {
        PaymentRequest::create(
            NewPaymentRequest {
                project_id: 1,
                requester: 2,
                material_amount: Amount::new(dec!(100_000)).unwrap(),
                labor_amount: Amount::ZERO,
                treatment: TaxTreatment::VatInclusive,
                destination: Destination::new("홍길동", "088", "11122233344").unwrap(),
                note: None,
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_payment_request_store_round_trip() {
        let store = InMemoryPaymentRequestStore::new();
        let request = request();
        store.store(request.clone()).await.unwrap();
        assert_eq!(store.get(request.id).await.unwrap().unwrap(), request);
        assert!(store.get(uuid::Uuid::new_v4()).await.unwrap().is_none());
        assert_eq!(store.all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transfer_store_lookup_by_request() {
        let store = InMemoryTransferStore::new();
        let request = request();
        let receipt = TransferReceipt {
            transaction_id: "TX-1".into(),
            amount: request.total_amount(),
            timestamp: Utc::now(),
        };
        let transfer =
            Transfer::from_receipt(&request, Provider::OpenBanking, &receipt, 1);
        store.store(transfer.clone()).await.unwrap();

        let found = store.find_by_request(request.id).await.unwrap().unwrap();
        assert_eq!(found.transaction_id, "TX-1");
        assert_eq!(found.status, TransferStatus::Completed);
        assert!(store
            .find_by_request(uuid::Uuid::new_v4())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_credential_store_upsert_replaces_row() {
        let store = InMemoryCredentialStore::new();
        let now = Utc::now();
        let mut credential = BankCredential {
            user_id: 1,
            provider: Provider::OpenBanking,
            access_token: EncryptedToken("a1".into()),
            refresh_token: EncryptedToken("r1".into()),
            scope: "transfer".into(),
            token_type: "Bearer".into(),
            expires_at: now,
            subject_id: None,
            connected_at: now,
            updated_at: now,
        };
        store.upsert(credential.clone()).await.unwrap();
        credential.access_token = EncryptedToken("a2".into());
        store.upsert(credential.clone()).await.unwrap();

        let row = store.get(1, Provider::OpenBanking).await.unwrap().unwrap();
        assert_eq!(row.access_token, EncryptedToken("a2".into()));

        store.delete(1, Provider::OpenBanking).await.unwrap();
        assert!(store.get(1, Provider::OpenBanking).await.unwrap().is_none());
    }
}
