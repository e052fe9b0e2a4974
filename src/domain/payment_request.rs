use crate::domain::money::{Amount, VatBreakdown};
use crate::domain::{PaymentRequestId, ProjectId, UserId};
use crate::error::{PayoutError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle status of a payment request.
///
/// `Rejected` and `Completed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Rejected | RequestStatus::Completed)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// The single active derived-amount transform.
///
/// Modeling this as an enum makes the "both flags set" and "neither flag set"
/// states unrepresentable; the two-boolean wire shape is normalized at the
/// API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxTreatment {
    /// 3.3% contractor withholding applied independently to material and labor.
    Withholding,
    /// Stored amounts are VAT-inclusive; VAT is split out for display only.
    VatInclusive,
}

/// Destination bank account for the disbursement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub holder: String,
    pub bank_code: String,
    pub account_number: String,
}

impl Destination {
    pub fn new(holder: &str, bank_code: &str, account_number: &str) -> Result<Self> {
        let dest = Self {
            holder: holder.trim().to_owned(),
            bank_code: bank_code.trim().to_owned(),
            // Account numbers arrive with or without hyphens.
            account_number: account_number.replace('-', "").trim().to_owned(),
        };
        dest.validate()?;
        Ok(dest)
    }

    pub fn validate(&self) -> Result<()> {
        if self.holder.is_empty() {
            return Err(PayoutError::Validation(
                "destination holder name is required".into(),
            ));
        }
        if self.bank_code.is_empty() {
            return Err(PayoutError::Validation(
                "destination bank code is required".into(),
            ));
        }
        if self.account_number.is_empty() || !self.account_number.chars().all(|c| c.is_ascii_digit())
        {
            return Err(PayoutError::Validation(format!(
                "invalid destination account number: '{}'",
                self.account_number
            )));
        }
        Ok(())
    }
}

/// Validated input for creating a payment request.
///
/// Amounts are the gross (pre-adjustment) figures; the entity derives the
/// payable amounts from the tax treatment.
#[derive(Debug, Clone)]
pub struct NewPaymentRequest {
    pub project_id: ProjectId,
    pub requester: UserId,
    pub material_amount: Amount,
    pub labor_amount: Amount,
    pub treatment: TaxTreatment,
    pub destination: Destination,
    pub note: Option<String>,
}

/// A monetary disbursement request, from creation through approval to payout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub id: PaymentRequestId,
    pub project_id: ProjectId,
    pub requester: UserId,
    /// Payable amounts, post tax-treatment adjustment.
    pub material_amount: Amount,
    pub labor_amount: Amount,
    /// Gross amounts as entered; the adjustment is always re-derived from
    /// these, never reversed from the rounded results.
    pub original_material_amount: Amount,
    pub original_labor_amount: Amount,
    pub treatment: TaxTreatment,
    pub destination: Destination,
    pub status: RequestStatus,
    pub approved_by: Option<UserId>,
    pub approved_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    /// Append-only audit trail. Entries are never rewritten or removed.
    pub notes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentRequest {
    pub fn create(input: NewPaymentRequest, now: DateTime<Utc>) -> Result<Self> {
        input.destination.validate()?;
        let (material, labor) =
            derive_amounts(input.material_amount, input.labor_amount, input.treatment);
        let mut notes = Vec::new();
        if let Some(note) = input.note {
            if !note.trim().is_empty() {
                notes.push(note.trim().to_owned());
            }
        }
        Ok(Self {
            id: Uuid::new_v4(),
            project_id: input.project_id,
            requester: input.requester,
            material_amount: material,
            labor_amount: labor,
            original_material_amount: input.material_amount,
            original_labor_amount: input.labor_amount,
            treatment: input.treatment,
            destination: input.destination,
            status: RequestStatus::Pending,
            approved_by: None,
            approved_at: None,
            paid_at: None,
            notes,
            created_at: now,
            updated_at: now,
        })
    }

    /// Sum of the payable material and labor amounts.
    pub fn total_amount(&self) -> Amount {
        self.material_amount + self.labor_amount
    }

    /// Supply/VAT display split, present only under VAT-inclusive treatment.
    pub fn vat_breakdown(&self) -> Option<VatBreakdown> {
        match self.treatment {
            TaxTreatment::VatInclusive => Some(self.total_amount().vat_breakdown()),
            TaxTreatment::Withholding => None,
        }
    }

    pub fn approve(&mut self, approver: UserId, now: DateTime<Utc>) -> Result<()> {
        self.guard(RequestStatus::Pending, "approve")?;
        self.status = RequestStatus::Approved;
        self.approved_by = Some(approver);
        self.approved_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn reject(&mut self, reason: &str, now: DateTime<Utc>) -> Result<()> {
        self.guard(RequestStatus::Pending, "reject")?;
        self.status = RequestStatus::Rejected;
        self.append_note(format!("rejected: {reason}"));
        self.updated_at = now;
        Ok(())
    }

    /// Marks the request paid without a bank call (funds moved out-of-band).
    pub fn settle_manually(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.guard(RequestStatus::Approved, "settle")?;
        self.status = RequestStatus::Completed;
        self.paid_at = Some(now);
        self.append_note(format!("settled manually at {}", now.to_rfc3339()));
        self.updated_at = now;
        Ok(())
    }

    /// Marks the request paid as the result of an accepted bank transfer.
    pub fn complete_with_transfer(&mut self, transaction_id: &str, now: DateTime<Utc>) -> Result<()> {
        self.guard(RequestStatus::Approved, "complete")?;
        self.status = RequestStatus::Completed;
        self.paid_at = Some(now);
        self.append_note(format!("[bank-transfer] {transaction_id}"));
        self.updated_at = now;
        Ok(())
    }

    /// Switches the active derived-amount transform, re-deriving the payable
    /// amounts from the stored originals so repeated toggles never compound
    /// rounding error.
    pub fn set_tax_treatment(&mut self, treatment: TaxTreatment, now: DateTime<Utc>) -> Result<()> {
        if self.status == RequestStatus::Completed {
            return Err(PayoutError::InvalidTransition {
                from: self.status,
                action: "change amounts of",
            });
        }
        let (material, labor) = derive_amounts(
            self.original_material_amount,
            self.original_labor_amount,
            treatment,
        );
        self.treatment = treatment;
        self.material_amount = material;
        self.labor_amount = labor;
        self.updated_at = now;
        Ok(())
    }

    /// Replaces the destination, e.g. an operator correcting details after a
    /// provider rejection. Forbidden once the request is completed.
    pub fn set_destination(&mut self, destination: Destination, now: DateTime<Utc>) -> Result<()> {
        if self.status == RequestStatus::Completed {
            return Err(PayoutError::InvalidTransition {
                from: self.status,
                action: "change destination of",
            });
        }
        destination.validate()?;
        self.destination = destination;
        self.updated_at = now;
        Ok(())
    }

    pub fn append_note(&mut self, note: String) {
        self.notes.push(note);
    }

    fn guard(&self, expected: RequestStatus, action: &'static str) -> Result<()> {
        if self.status != expected {
            return Err(PayoutError::InvalidTransition {
                from: self.status,
                action,
            });
        }
        Ok(())
    }
}

fn derive_amounts(material: Amount, labor: Amount, treatment: TaxTreatment) -> (Amount, Amount) {
    match treatment {
        TaxTreatment::Withholding => (material.deducted(), labor.deducted()),
        TaxTreatment::VatInclusive => (material, labor),
    }
}
