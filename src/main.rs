use anyhow::Context;
use std::sync::Arc;

use chamapool::accounting::{Accountant, ApprovalGate};
use chamapool::api::{self, ApiState};
use chamapool::config::AppConfig;
use chamapool::gateway::daraja::DarajaGateway;
use chamapool::ledger::LedgerStore;
use chamapool::ledger::rest::RestLedger;
use chamapool::observability;
use chamapool::reconcile::PaymentRelay;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init_tracing();

    let env = std::env::var("CHAMAPOOL_ENV").unwrap_or_else(|_| "default".to_string());
    let config = AppConfig::load(&env).context("loading configuration")?;

    let store: Arc<dyn LedgerStore> = Arc::new(RestLedger::new(&config.ledger));
    let gateway = Arc::new(DarajaGateway::new(config.gateway.clone()));

    let state = Arc::new(ApiState {
        relay: PaymentRelay::new(store.clone(), gateway),
        accountant: Accountant::new(store.clone()),
        gate: ApprovalGate::new(store),
    });
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("binding {}", config.server.bind))?;
    tracing::info!(addr = %config.server.bind, "reconciliation relay listening");
    axum::serve(listener, app).await.context("serving")?;
    Ok(())
}
