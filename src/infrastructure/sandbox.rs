//! Offline stand-ins for the provider and the notification channel, used by
//! the CLI harness and the integration tests. No network calls are made.

use crate::domain::credential::{Provider, TokenGrant};
use crate::domain::ports::{BankGateway, Notifier, PaymentEvent};
use crate::domain::transfer::{TransferOrder, TransferReceipt};
use crate::domain::UserId;
use crate::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Gateway that accepts every well-formed order and issues sequential
/// transaction ids, so runs are reproducible.
#[derive(Default)]
pub struct SandboxGateway {
    sequence: AtomicU64,
}

impl SandboxGateway {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BankGateway for SandboxGateway {
    fn provider(&self) -> Provider {
        Provider::OpenBanking
    }

    async fn refresh_token(&self, _user_id: UserId, refresh_token: &str) -> Result<TokenGrant> {
        Ok(TokenGrant {
            access_token: format!("sandbox-access-{}", Utc::now().timestamp()),
            refresh_token: refresh_token.to_owned(),
            token_type: "Bearer".to_owned(),
            scope: "login transfer inquiry".to_owned(),
            expires_in: 3600,
            subject_id: None,
        })
    }

    async fn execute_transfer(
        &self,
        _access_token: &str,
        order: &TransferOrder,
    ) -> Result<TransferReceipt> {
        let serial = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(TransferReceipt {
            transaction_id: format!("SBX{serial:08}"),
            amount: order.amount,
            timestamp: Utc::now(),
        })
    }
}

/// Notifier that writes events to the log instead of an external channel.
#[derive(Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &PaymentEvent) -> Result<()> {
        info!(event = ?event, "payment event");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Amount;
    use rust_decimal_macros::dec;

    fn order() -> TransferOrder {
        TransferOrder {
            from_account: None,
            to_account: "11122233344".into(),
            to_bank_code: "004".into(),
            to_holder: "홍길동".into(),
            amount: Amount::new(dec!(967_000)).unwrap(),
            memo: "자재비".into(),
            idempotency_key: "k".into(),
        }
    }

    #[tokio::test]
    async fn test_sandbox_issues_sequential_transaction_ids() {
        let gateway = SandboxGateway::new();
        let first = gateway.execute_transfer("t", &order()).await.unwrap();
        let second = gateway.execute_transfer("t", &order()).await.unwrap();
        assert_eq!(first.transaction_id, "SBX00000001");
        assert_eq!(second.transaction_id, "SBX00000002");
        assert_eq!(first.amount, order().amount);
    }

    #[tokio::test]
    async fn test_sandbox_refresh_preserves_refresh_token() {
        let gateway = SandboxGateway::new();
        let grant = gateway.refresh_token(1, "keep-me").await.unwrap();
        assert_eq!(grant.refresh_token, "keep-me");
        assert!(grant.access_token.starts_with("sandbox-access-"));
    }
}
