use crate::domain::UserId;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Banking provider a credential belongs to. Distinct providers have
/// independent credential rows for the same user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    OpenBanking,
    KbBank,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenBanking => "open_banking",
            Provider::KbBank => "kb_bank",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An encrypted OAuth token as persisted at rest.
///
/// The payload is `base64(nonce):base64(ciphertext)`; only the credential
/// manager's cipher can produce or open it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedToken(pub String);

impl fmt::Debug for EncryptedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptedToken(<redacted>)")
    }
}

/// Token material returned by the provider's OAuth endpoint, either from the
/// authorization-code exchange or from a refresh.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
    /// Provider-specific subject id (`user_seq_no`).
    #[serde(default)]
    pub subject_id: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_owned()
}

fn default_expires_in() -> u64 {
    3600
}

/// Stored OAuth credential for one (user, provider) pair.
///
/// At most one live row exists per pair; every refresh mutates the row in
/// place, and an explicit disconnect deletes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankCredential {
    pub user_id: UserId,
    pub provider: Provider,
    pub access_token: EncryptedToken,
    pub refresh_token: EncryptedToken,
    pub scope: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    pub subject_id: Option<String>,
    pub connected_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BankCredential {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn key(&self) -> (UserId, Provider) {
        (self.user_id, self.provider)
    }
}

/// Expiry deadline for a grant issued at `now`.
pub fn expiry_from_grant(now: DateTime<Utc>, expires_in: u64) -> DateTime<Utc> {
    now + Duration::seconds(expires_in as i64)
}

/// Connection summary exposed without decrypting anything.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialStatus {
    pub provider: Provider,
    pub scope: String,
    pub expires_at: DateTime<Utc>,
    pub connected_at: DateTime<Utc>,
}

impl From<&BankCredential> for CredentialStatus {
    fn from(cred: &BankCredential) -> Self {
        Self {
            provider: cred.provider,
            scope: cred.scope.clone(),
            expires_at: cred.expires_at,
            connected_at: cred.connected_at,
        }
    }
}
