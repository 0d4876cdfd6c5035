use thiserror::Error;

use crate::ledger::LoanStatus;
use crate::types::amount::Amount;
use crate::types::ids::LoanId;

#[derive(Error, Debug)]
pub enum Error {
    // Validation Errors
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid phone number: {0}")]
    InvalidPhone(String),

    #[error("Amount must be positive, got {0}")]
    NonPositiveAmount(Amount),

    #[error("Amount must be in whole currency units, got {0}")]
    FractionalAmount(Amount),

    #[error("Malformed payment reference: {0:?}")]
    MalformedReference(String),

    #[error("Unknown payment purpose: {0:?}")]
    UnknownPurpose(String),

    // Ledger Store Errors
    #[error("Ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error("Loan not found: {0}")]
    LoanNotFound(LoanId),

    #[error("Refusing to query with an empty loan filter set")]
    EmptyFilterSet,

    // Approval Errors
    #[error("Loan cannot be approved from status {status}")]
    NotApprovable { status: LoanStatus },

    #[error("Insufficient pool: requested={requested}, available={available}")]
    InsufficientPool {
        requested: Amount,
        available: Amount,
    },

    // Gateway Errors
    #[error("Gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Gateway rejected request: code={code}, description={description}")]
    GatewayRejected { code: String, description: String },

    // Reconciliation Errors
    #[error("Reconciliation failed for {reference}: {detail}")]
    ReconciliationFailed { reference: String, detail: String },

    // System Errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    /// Shortfall between requested and available for pool refusals.
    pub fn shortfall(&self) -> Option<Amount> {
        match self {
            Error::InsufficientPool {
                requested,
                available,
            } => Some(*requested - *available),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
