use std::fmt;

use crate::error::{Error, Result};

/// What a payment is for. A closed set: an unrecognized purpose token is an
/// error at the decoding boundary, never silently treated as a contribution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaymentPurpose {
    Contribution,
    LoanRepayment,
}

impl PaymentPurpose {
    pub fn parse(token: &str) -> Result<Self> {
        match token {
            "Contribution" | "contribution" | "monthly" | "Monthly" => {
                Ok(PaymentPurpose::Contribution)
            }
            "LoanRepayment" => Ok(PaymentPurpose::LoanRepayment),
            other => Err(Error::UnknownPurpose(other.to_string())),
        }
    }

    /// Canonical token used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentPurpose::Contribution => "Contribution",
            PaymentPurpose::LoanRepayment => "LoanRepayment",
        }
    }
}

/// The account-reference string attached to a push request and echoed back
/// in its callback: `"<purpose>-<entityId>"`. The entity id is a loan id
/// for repayments and a group-member id for contributions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentReference {
    pub purpose: PaymentPurpose,
    pub entity_id: String,
}

impl PaymentReference {
    pub fn new(purpose: PaymentPurpose, entity_id: impl Into<String>) -> Result<Self> {
        let entity_id = entity_id.into();
        if entity_id.is_empty() {
            return Err(Error::MalformedReference(purpose.as_str().to_string()));
        }
        Ok(PaymentReference { purpose, entity_id })
    }

    pub fn encode(&self) -> String {
        format!("{}-{}", self.purpose.as_str(), self.entity_id)
    }

    /// Splits on the *first* `-`; entity ids may themselves contain
    /// hyphens. A missing or empty second token is a malformed reference.
    pub fn decode(raw: &str) -> Result<Self> {
        let (purpose_token, entity_id) = raw
            .split_once('-')
            .ok_or_else(|| Error::MalformedReference(raw.to_string()))?;
        if entity_id.is_empty() {
            return Err(Error::MalformedReference(raw.to_string()));
        }
        Ok(PaymentReference {
            purpose: PaymentPurpose::parse(purpose_token)?,
            entity_id: entity_id.to_string(),
        })
    }
}

impl fmt::Display for PaymentReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}
