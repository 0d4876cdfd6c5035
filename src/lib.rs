pub mod accounting;
pub mod api;
pub mod config;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod observability;
pub mod reconcile;
pub mod types;

// Contribution kind written when a callback reference carries no explicit kind
pub const DEFAULT_CONTRIBUTION_KIND: &str = "monthly";

// Daraja transaction type for paybill push requests
pub const STK_TRANSACTION_TYPE: &str = "CustomerPayBillOnline";
