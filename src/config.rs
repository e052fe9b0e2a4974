use std::env;
use std::time::Duration;

/// Connection settings for the open-banking provider, read from the
/// environment the way the deployment supplies them.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL of the OAuth authorization/token endpoints.
    pub auth_url: String,
    /// Base URL of the transfer API.
    pub api_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    /// Registered fintech-use number of the company withdrawal account.
    pub fintech_use_num: String,
    /// Institution code prefixed to generated bank transaction ids.
    pub institution_code: String,
    pub company_account: String,
    pub company_account_holder: String,
    /// Hard deadline applied to every outbound HTTP call.
    pub request_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            auth_url: "https://testapi.openbanking.or.kr".to_owned(),
            api_url: "https://testapi.openbanking.or.kr".to_owned(),
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: "http://localhost:3000/api/banking/auth/callback".to_owned(),
            fintech_use_num: String::new(),
            institution_code: "M202300000".to_owned(),
            company_account: String::new(),
            company_account_holder: String::new(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ProviderConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            auth_url: var_or("OPENBANKING_AUTH_URL", &defaults.auth_url),
            api_url: var_or("OPENBANKING_API_URL", &defaults.api_url),
            client_id: var_or("OPENBANKING_CLIENT_ID", ""),
            client_secret: var_or("OPENBANKING_CLIENT_SECRET", ""),
            redirect_uri: var_or("OPENBANKING_REDIRECT_URI", &defaults.redirect_uri),
            fintech_use_num: var_or("COMPANY_FINTECH_USE_NUM", ""),
            institution_code: var_or("OPENBANKING_INSTITUTION_CODE", &defaults.institution_code),
            company_account: var_or("COMPANY_ACCOUNT_NO", ""),
            company_account_holder: var_or("COMPANY_ACCOUNT_HOLDER", ""),
            request_timeout: defaults.request_timeout,
        }
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}
