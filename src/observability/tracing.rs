use tracing::Span;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

pub fn trace_callback(checkout_request_id: &str) -> Span {
    tracing::info_span!(
        "stk_callback",
        checkout = %checkout_request_id,
    )
}

pub fn trace_initiation(account_reference: &str) -> Span {
    tracing::info_span!(
        "stk_initiation",
        reference = %account_reference,
    )
}
