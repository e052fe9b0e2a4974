//! Wire-format DTOs and normalization for the external JSON surface.
//!
//! Clients send the historical two-boolean tax shape and human bank names;
//! both are normalized here before anything reaches the domain.

use crate::domain::money::Amount;
use crate::domain::payment_request::{Destination, NewPaymentRequest, TaxTreatment};
use crate::domain::{ProjectId, UserId};
use crate::error::{PayoutError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Incoming create-payment payload. Field aliases accept both the camelCase
/// shape older clients send and snake_case.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentBody {
    #[serde(alias = "project_id")]
    pub project_id: ProjectId,
    #[serde(default, alias = "material_amount")]
    pub material_amount: Decimal,
    #[serde(default, alias = "labor_amount")]
    pub labor_amount: Decimal,
    /// Apply the 3.3% contractor withholding.
    #[serde(default, alias = "apply_tax_deduction")]
    pub apply_tax_deduction: bool,
    /// Stored amounts already include VAT.
    #[serde(default, alias = "includesVAT", alias = "includes_vat")]
    pub includes_vat: bool,
    #[serde(alias = "account_holder")]
    pub account_holder: String,
    /// Either a provider bank code ("004") or a human bank name ("KB국민은행").
    pub bank: String,
    #[serde(alias = "account_number")]
    pub account_number: String,
    #[serde(default)]
    pub note: Option<String>,
}

impl CreatePaymentBody {
    /// Normalizes the wire shape into validated domain input.
    pub fn into_new_request(self, requester: UserId) -> Result<NewPaymentRequest> {
        let treatment = tax_treatment(self.apply_tax_deduction, self.includes_vat)?;
        let bank_code = resolve_bank_code(&self.bank)?;
        Ok(NewPaymentRequest {
            project_id: self.project_id,
            requester,
            material_amount: Amount::new(self.material_amount)?,
            labor_amount: Amount::new(self.labor_amount)?,
            treatment,
            destination: Destination::new(&self.account_holder, bank_code, &self.account_number)?,
            note: self.note,
        })
    }
}

/// Collapses the legacy two-boolean shape into the single treatment.
/// Setting both flags is a client bug and is refused outright.
pub fn tax_treatment(apply_tax_deduction: bool, includes_vat: bool) -> Result<TaxTreatment> {
    match (apply_tax_deduction, includes_vat) {
        (true, false) => Ok(TaxTreatment::Withholding),
        (false, true) => Ok(TaxTreatment::VatInclusive),
        _ => Err(PayoutError::Validation(
            "tax deduction and VAT-inclusive are mutually exclusive; set exactly one".into(),
        )),
    }
}

/// Standard three-digit codes for the banks clients name in Korean.
const BANK_CODES: &[(&str, &str)] = &[
    ("KB국민은행", "004"),
    ("국민은행", "004"),
    ("신한은행", "088"),
    ("우리은행", "020"),
    ("하나은행", "081"),
    ("NH농협은행", "011"),
    ("농협", "011"),
    ("IBK기업은행", "003"),
    ("기업은행", "003"),
    ("SC제일은행", "023"),
    ("씨티은행", "027"),
    ("카카오뱅크", "090"),
    ("토스뱅크", "092"),
    ("케이뱅크", "089"),
    ("새마을금고", "045"),
    ("신협", "048"),
    ("우체국", "071"),
    ("수협은행", "007"),
    ("대구은행", "031"),
    ("부산은행", "032"),
    ("광주은행", "034"),
    ("제주은행", "035"),
    ("전북은행", "037"),
    ("경남은행", "039"),
];

/// Accepts either a three-digit code verbatim or a known bank name.
pub fn resolve_bank_code(bank: &str) -> Result<&str> {
    let bank = bank.trim();
    if bank.len() == 3 && bank.chars().all(|c| c.is_ascii_digit()) {
        return Ok(bank);
    }
    BANK_CODES
        .iter()
        .find(|(name, _)| *name == bank)
        .map(|(_, code)| *code)
        .ok_or_else(|| PayoutError::Validation(format!("unknown bank: '{bank}'")))
}

/// Uniform error body returned to clients.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    /// Whether the client may retry the same call unchanged.
    pub retryable: bool,
}

impl From<&PayoutError> for ErrorBody {
    fn from(err: &PayoutError) -> Self {
        let code = match err {
            PayoutError::Validation(_) => "validation",
            PayoutError::Authorization(_) => "forbidden",
            PayoutError::InvalidTransition { .. } => "invalid_state",
            PayoutError::NotFound(_) => "not_found",
            PayoutError::NeedsAuthorization { .. } => "needs_authorization",
            PayoutError::Transient(_) => "transient",
            PayoutError::Rejected { .. } => "rejected",
            PayoutError::Persistence(_) => "persistence",
            PayoutError::Encryption(_) => "encryption",
        };
        Self {
            code,
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}
