pub mod amount;
pub mod ids;
pub mod phone;
