pub mod routes;

pub use routes::{ApiState, create_router};
