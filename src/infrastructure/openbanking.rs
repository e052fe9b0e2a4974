//! HTTP client for the open-banking OAuth and transfer API.
//!
//! Encapsulates the provider's wire format completely; the rest of the
//! subsystem only sees `TokenGrant`, `TransferOrder`, and `TransferReceipt`.

use crate::config::ProviderConfig;
use crate::domain::credential::{Provider, TokenGrant};
use crate::domain::ports::BankGateway;
use crate::domain::transfer::{TransferOrder, TransferReceipt};
use crate::domain::UserId;
use crate::error::{PayoutError, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Response code the provider uses for an accepted request.
const RSP_SUCCESS: &str = "A0000";

/// Maximum length of a `bank_tran_id`.
const BANK_TRAN_ID_LEN: usize = 20;

pub struct OpenBankingClient {
    http: Client,
    cfg: ProviderConfig,
}

impl OpenBankingClient {
    pub fn new(cfg: ProviderConfig) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(cfg.request_timeout)
            .build()
            .map_err(|e| PayoutError::Transient(format!("failed to build http client: {e}")))?;
        Ok(Self { http, cfg })
    }

    /// URL the human is redirected to for the authorization-code flow.
    /// The state carries the user id plus CSRF randomness.
    pub fn authorization_url(&self, user_id: UserId) -> String {
        let state = format!(
            "{user_id}_{}_{}",
            Uuid::new_v4().simple(),
            Utc::now().timestamp_millis()
        );
        format!(
            "{}/oauth/2.0/authorize?response_type=code&client_id={}&redirect_uri={}&scope=login%20transfer%20inquiry&state={}&auth_type=0",
            self.cfg.auth_url, self.cfg.client_id, self.cfg.redirect_uri, state
        )
    }

    /// Exchanges an authorization code for the initial token grant.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenGrant> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.cfg.client_id.as_str()),
            ("client_secret", self.cfg.client_secret.as_str()),
            ("redirect_uri", self.cfg.redirect_uri.as_str()),
        ];
        let envelope = self.token_request(&params).await?;
        envelope.into_grant().map_err(|(code, message)| {
            PayoutError::Validation(format!("authorization code exchange failed [{code}]: {message}"))
        })
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenEnvelope> {
        let url = format!("{}/oauth/2.0/token", self.cfg.auth_url);
        let response = self
            .http
            .post(&url)
            .form(params)
            .send()
            .await
            .map_err(transport_error)?;
        response.json().await.map_err(transport_error)
    }

    fn new_bank_tran_id(&self) -> String {
        // Institution code + 'U' + random digits filling out the 20 chars.
        let room = BANK_TRAN_ID_LEN
            .saturating_sub(self.cfg.institution_code.len() + 1)
            .min(9);
        let serial = Uuid::new_v4().as_u128() % 10u128.pow(room as u32);
        format!(
            "{}U{serial:0room$}",
            self.cfg.institution_code,
            room = room
        )
    }

    fn deposit_body<'a>(&'a self, bank_tran_id: &'a str, order: &'a TransferOrder) -> DepositRequest<'a> {
        DepositRequest {
            bank_tran_id,
            cntr_account_type: "N",
            cntr_account_num: order
                .from_account
                .as_deref()
                .unwrap_or(&self.cfg.company_account),
            dps_print_content: truncated(&order.memo, 16),
            fintech_use_num: &self.cfg.fintech_use_num,
            wd_print_content: truncated(&order.memo, 16),
            tran_amt: order.amount.value().to_string(),
            tran_dtime: Utc::now().format("%Y%m%d%H%M%S").to_string(),
            // The requesting client is the company side of the contract; the
            // recipient goes in the recv_* fields.
            req_client_name: &self.cfg.company_account_holder,
            req_client_num: truncated(&order.idempotency_key, 32),
            transfer_purpose: "TR",
            recv_client_name: &order.to_holder,
            recv_client_bank_code: &order.to_bank_code,
            recv_client_account_num: &order.to_account,
        }
    }
}

#[async_trait]
impl BankGateway for OpenBankingClient {
    fn provider(&self) -> Provider {
        Provider::OpenBanking
    }

    async fn refresh_token(&self, user_id: UserId, refresh_token: &str) -> Result<TokenGrant> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.cfg.client_id.as_str()),
            ("client_secret", self.cfg.client_secret.as_str()),
        ];
        let envelope = self.token_request(&params).await?;
        envelope.into_grant().map_err(|(code, message)| {
            // A declined refresh means the refresh token itself is no longer
            // valid; the human has to run the authorization flow again.
            debug!(user_id, %code, %message, "token refresh declined");
            PayoutError::NeedsAuthorization {
                user_id,
                provider: Provider::OpenBanking,
            }
        })
    }

    async fn execute_transfer(
        &self,
        access_token: &str,
        order: &TransferOrder,
    ) -> Result<TransferReceipt> {
        let bank_tran_id = self.new_bank_tran_id();
        let body = self.deposit_body(&bank_tran_id, order);

        let url = format!("{}/v2.0/transfer/deposit/acnt_num", self.cfg.api_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let result: DepositResponse = response.json().await.map_err(transport_error)?;

        if result.rsp_code.as_deref() == Some(RSP_SUCCESS) {
            if let Some(transaction_id) = result.api_tran_id {
                debug!(%transaction_id, amount = %order.amount, "transfer accepted");
                return Ok(TransferReceipt {
                    transaction_id,
                    amount: order.amount,
                    timestamp: Utc::now(),
                });
            }
        }
        // Provider business rejection: pass the code and message through
        // verbatim for operator visibility.
        Err(PayoutError::Rejected {
            code: result.rsp_code.unwrap_or_else(|| "UNKNOWN".to_owned()),
            message: result
                .rsp_message
                .unwrap_or_else(|| "transfer was not accepted".to_owned()),
        })
    }
}

fn transport_error(e: reqwest::Error) -> PayoutError {
    if e.is_timeout() {
        PayoutError::Transient("bank API call timed out".into())
    } else {
        PayoutError::Transient(format!("bank API transport error: {e}"))
    }
}

fn truncated(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Token endpoint response; carries either token material or an error.
#[derive(Debug, Deserialize)]
struct TokenEnvelope {
    access_token: Option<String>,
    refresh_token: Option<String>,
    token_type: Option<String>,
    scope: Option<String>,
    expires_in: Option<u64>,
    user_seq_no: Option<String>,
    rsp_code: Option<String>,
    rsp_message: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl TokenEnvelope {
    fn into_grant(self) -> std::result::Result<TokenGrant, (String, String)> {
        match (self.access_token, self.refresh_token) {
            (Some(access_token), Some(refresh_token)) => Ok(TokenGrant {
                access_token,
                refresh_token,
                token_type: self.token_type.unwrap_or_else(|| "Bearer".to_owned()),
                scope: self.scope.unwrap_or_default(),
                expires_in: self.expires_in.unwrap_or(3600),
                subject_id: self.user_seq_no,
            }),
            _ => {
                let code = self
                    .error
                    .or(self.rsp_code)
                    .unwrap_or_else(|| "UNKNOWN".to_owned());
                let message = self
                    .error_description
                    .or(self.rsp_message)
                    .unwrap_or_else(|| "token endpoint returned no tokens".to_owned());
                Err((code, message))
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct DepositRequest<'a> {
    bank_tran_id: &'a str,
    cntr_account_type: &'a str,
    cntr_account_num: &'a str,
    dps_print_content: &'a str,
    fintech_use_num: &'a str,
    wd_print_content: &'a str,
    tran_amt: String,
    tran_dtime: String,
    req_client_name: &'a str,
    req_client_num: &'a str,
    transfer_purpose: &'a str,
    recv_client_name: &'a str,
    recv_client_bank_code: &'a str,
    recv_client_account_num: &'a str,
}

#[derive(Debug, Deserialize)]
struct DepositResponse {
    rsp_code: Option<String>,
    rsp_message: Option<String>,
    api_tran_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::domain::money::Amount;
    use rust_decimal_macros::dec;

    fn client() -> OpenBankingClient {
        let cfg = ProviderConfig {
            client_id: "client-123".into(),
            institution_code: "M202300000".into(),
            company_account: "99988877766655".into(),
            company_account_holder: "주식회사 한성건설".into(),
            fintech_use_num: "199160000000000000000001".into(),
            ..ProviderConfig::default()
        };
        OpenBankingClient::new(cfg).unwrap()
    }

    #[test]
    fn test_authorization_url_carries_user_state() {
        let url = client().authorization_url(42);
        assert!(url.contains("response_type=code"));
        assert!(url.contains("client_id=client-123"));
        assert!(url.contains("state=42_"));
    }

    #[test]
    fn test_bank_tran_id_shape() {
        let client = client();
        let a = client.new_bank_tran_id();
        let b = client.new_bank_tran_id();
        assert_eq!(a.len(), 20);
        assert!(a.starts_with("M202300000U"));
        assert!(a[11..].chars().all(|c| c.is_ascii_digit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_token_envelope_success() {
        let envelope: TokenEnvelope = serde_json::from_str(
            r#"{"access_token":"a","refresh_token":"r","token_type":"Bearer",
                "scope":"transfer inquiry","expires_in":7776000,"user_seq_no":"U001"}"#,
        )
        .unwrap();
        let grant = envelope.into_grant().unwrap();
        assert_eq!(grant.access_token, "a");
        assert_eq!(grant.expires_in, 7_776_000);
        assert_eq!(grant.subject_id.as_deref(), Some("U001"));
    }

    #[test]
    fn test_token_envelope_error_carries_provider_text() {
        let envelope: TokenEnvelope = serde_json::from_str(
            r#"{"error":"invalid_grant","error_description":"refresh token expired"}"#,
        )
        .unwrap();
        let (code, message) = envelope.into_grant().unwrap_err();
        assert_eq!(code, "invalid_grant");
        assert_eq!(message, "refresh token expired");
    }

    #[test]
    fn test_deposit_body_names_company_as_requesting_client() {
        let client = client();
        let order = TransferOrder {
            from_account: None,
            to_account: "123456789012".into(),
            to_bank_code: "004".into(),
            to_holder: "김목수".into(),
            amount: Amount::new(dec!(967_000)).unwrap(),
            memo: "자재비".into(),
            idempotency_key: "0f3a".into(),
        };
        let body = client.deposit_body("M202300000U000000001", &order);
        assert_eq!(body.req_client_name, "주식회사 한성건설");
        assert_eq!(body.cntr_account_num, "99988877766655");
        assert_eq!(body.recv_client_name, "김목수");
        assert_eq!(body.recv_client_bank_code, "004");
        assert_eq!(body.tran_amt, "967000");
        assert_eq!(body.transfer_purpose, "TR");
    }

    #[test]
    fn test_deposit_body_uses_withdrawal_override_account() {
        let client = client();
        let order = TransferOrder {
            from_account: Some("11100022233".into()),
            to_account: "123456789012".into(),
            to_bank_code: "004".into(),
            to_holder: "김목수".into(),
            amount: Amount::new(dec!(100_000)).unwrap(),
            memo: "노무비".into(),
            idempotency_key: "0f3b".into(),
        };
        let body = client.deposit_body("M202300000U000000002", &order);
        assert_eq!(body.cntr_account_num, "11100022233");
    }

    #[test]
    fn test_memo_truncation_respects_char_boundaries() {
        assert_eq!(truncated("결제대금 송금입니다 감사합니다", 6), "결제대금 송");
        assert_eq!(truncated("short", 16), "short");
    }
}
