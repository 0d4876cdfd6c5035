pub mod approval;
pub mod pool;

pub use approval::ApprovalGate;
pub use pool::{Accountant, PoolBreakdown};
