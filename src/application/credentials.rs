use crate::application::locks::KeyedLocks;
use crate::domain::credential::{
    expiry_from_grant, BankCredential, CredentialStatus, Provider, TokenGrant,
};
use crate::domain::ports::{BankGatewayRef, CredentialStoreRef};
use crate::domain::UserId;
use crate::error::{PayoutError, Result};
use crate::infrastructure::crypto::TokenCipher;
use chrono::Utc;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::time::timeout;
use zeroize::Zeroizing;

const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(5);

/// A decrypted access token scoped to a single outbound call.
///
/// The backing buffer is wiped on drop and never appears in debug output.
pub struct AccessToken {
    inner: Zeroizing<String>,
}

impl AccessToken {
    fn new(inner: Zeroizing<String>) -> Self {
        Self { inner }
    }

    pub fn secret(&self) -> &str {
        &self.inner
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// Owns the OAuth credential lifecycle: persistence (encrypted), expiry
/// tracking, and refresh against the provider.
///
/// This is the only component that decrypts stored tokens. Refreshes are
/// serialized per (user, provider) so an expired credential triggers exactly
/// one refresh call under concurrent callers.
pub struct CredentialManager {
    store: CredentialStoreRef,
    cipher: TokenCipher,
    gateways: HashMap<Provider, BankGatewayRef>,
    locks: KeyedLocks<(UserId, Provider)>,
    refresh_timeout: Duration,
}

impl CredentialManager {
    pub fn new(
        store: CredentialStoreRef,
        cipher: TokenCipher,
        gateways: Vec<BankGatewayRef>,
    ) -> Self {
        let gateways = gateways
            .into_iter()
            .map(|gateway| (gateway.provider(), gateway))
            .collect();
        Self {
            store,
            cipher,
            gateways,
            locks: KeyedLocks::new(),
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
        }
    }

    pub fn with_refresh_timeout(mut self, refresh_timeout: Duration) -> Self {
        self.refresh_timeout = refresh_timeout;
        self
    }

    /// Returns a valid access token for the user, refreshing (and persisting
    /// the refreshed credential) when the stored one has expired.
    pub async fn get_valid_access_token(
        &self,
        user_id: UserId,
        provider: Provider,
    ) -> Result<AccessToken> {
        let _guard = self.locks.acquire((user_id, provider)).await;

        let credential = self
            .store
            .get(user_id, provider)
            .await?
            .ok_or(PayoutError::NeedsAuthorization { user_id, provider })?;

        let now = Utc::now();
        if !credential.is_expired(now) {
            return Ok(AccessToken::new(self.cipher.decrypt(&credential.access_token)?));
        }

        tracing::debug!(user_id, %provider, "access token expired, refreshing");
        let refresh_token = self.cipher.decrypt(&credential.refresh_token)?;
        let gateway = self.gateway(provider)?;
        let grant = timeout(
            self.refresh_timeout,
            gateway.refresh_token(user_id, &refresh_token),
        )
        .await
        .map_err(|_| PayoutError::Transient("token refresh timed out".into()))??;

        let access_token = Zeroizing::new(grant.access_token.clone());
        let updated = self.credential_from_grant(user_id, provider, grant, Some(credential))?;
        self.store.upsert(updated).await?;

        Ok(AccessToken::new(access_token))
    }

    /// Persists token material obtained from the authorization-code exchange
    /// (the OAuth callback path). Replaces any previous row for the pair.
    pub async fn store_grant(
        &self,
        user_id: UserId,
        provider: Provider,
        grant: TokenGrant,
    ) -> Result<()> {
        let _guard = self.locks.acquire((user_id, provider)).await;
        let credential = self.credential_from_grant(user_id, provider, grant, None)?;
        self.store.upsert(credential).await
    }

    /// Deletes the stored credential for the pair.
    pub async fn disconnect(&self, user_id: UserId, provider: Provider) -> Result<()> {
        let _guard = self.locks.acquire((user_id, provider)).await;
        self.store.delete(user_id, provider).await
    }

    /// Connection summary for the pair, without touching token material.
    pub async fn connection_status(
        &self,
        user_id: UserId,
        provider: Provider,
    ) -> Result<Option<CredentialStatus>> {
        let credential = self.store.get(user_id, provider).await?;
        Ok(credential.as_ref().map(CredentialStatus::from))
    }

    fn gateway(&self, provider: Provider) -> Result<&BankGatewayRef> {
        self.gateways.get(&provider).ok_or_else(|| {
            PayoutError::Validation(format!("no gateway registered for provider {provider}"))
        })
    }

    fn credential_from_grant(
        &self,
        user_id: UserId,
        provider: Provider,
        grant: TokenGrant,
        previous: Option<BankCredential>,
    ) -> Result<BankCredential> {
        let now = Utc::now();
        let connected_at = previous.as_ref().map(|c| c.connected_at).unwrap_or(now);
        let subject_id = grant
            .subject_id
            .or_else(|| previous.as_ref().and_then(|c| c.subject_id.clone()));
        let scope = if grant.scope.is_empty() {
            previous.as_ref().map(|c| c.scope.clone()).unwrap_or_default()
        } else {
            grant.scope
        };
        Ok(BankCredential {
            user_id,
            provider,
            access_token: self.cipher.encrypt(&grant.access_token)?,
            refresh_token: self.cipher.encrypt(&grant.refresh_token)?,
            scope,
            token_type: grant.token_type,
            expires_at: expiry_from_grant(now, grant.expires_in),
            subject_id,
            connected_at,
            updated_at: now,
        })
    }
}
