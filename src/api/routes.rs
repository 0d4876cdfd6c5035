use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::accounting::{Accountant, ApprovalGate, PoolBreakdown};
use crate::error::Error;
use crate::gateway::StkPushAck;
use crate::reconcile::{PaymentIntent, PaymentPurpose, PaymentReference, PaymentRelay};
use crate::types::amount::Amount;
use crate::types::ids::{GroupId, LoanId, MemberId};

pub struct ApiState {
    pub relay: PaymentRelay,
    pub accountant: Accountant,
    pub gate: ApprovalGate,
}

pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/stk-push", post(stk_push))
        .route("/callback", post(callback))
        .route("/members/:id/loanable", get(member_loanable))
        .route("/members/:id/guarantor-capacity", get(member_guarantor_capacity))
        .route("/groups/:id/pool", get(group_pool))
        .route("/loans/:id/approve", post(approve_loan))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::MissingField(_)
            | Error::InvalidPhone(_)
            | Error::NonPositiveAmount(_)
            | Error::FractionalAmount(_)
            | Error::MalformedReference(_)
            | Error::UnknownPurpose(_)
            | Error::NotApprovable { .. } => StatusCode::BAD_REQUEST,
            Error::LoanNotFound(_) => StatusCode::NOT_FOUND,
            Error::InsufficientPool { .. } => StatusCode::CONFLICT,
            Error::EmptyFilterSet
            | Error::LedgerUnavailable(_)
            | Error::GatewayUnavailable(_)
            | Error::GatewayRejected { .. }
            | Error::ReconciliationFailed { .. }
            | Error::ConfigError(_)
            | Error::IoError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

async fn health_check() -> &'static str {
    "OK"
}

#[derive(Debug, serde::Deserialize)]
struct StkPushBody {
    phone: Option<String>,
    amount: Option<f64>,
    #[serde(rename = "accountReference")]
    account_reference: Option<String>,
    #[serde(rename = "transactionDesc")]
    transaction_desc: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    group_member_id: Option<String>,
}

async fn stk_push(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<StkPushBody>,
) -> Result<Json<StkPushAck>, Error> {
    let phone = body.phone.ok_or(Error::MissingField("phone"))?;
    let amount = body.amount.ok_or(Error::MissingField("amount"))?;
    let kind = body.kind.ok_or(Error::MissingField("type"))?;
    let group_member_id = body
        .group_member_id
        .ok_or(Error::MissingField("group_member_id"))?;

    // An explicit account reference (e.g. "LoanRepayment-<loanId>") routes
    // the payment; otherwise the reference targets the member's own
    // contribution record.
    let (purpose, entity_id) = match body.account_reference {
        Some(raw) => {
            let reference = PaymentReference::decode(&raw)?;
            (reference.purpose, reference.entity_id)
        }
        None => (PaymentPurpose::parse(&kind)?, group_member_id),
    };

    let ack = state
        .relay
        .initiate(PaymentIntent {
            phone,
            amount: Amount::from_f64(amount),
            purpose,
            entity_id,
            description: body.transaction_desc,
        })
        .await?;
    Ok(Json(ack))
}

async fn callback(
    State(state): State<Arc<ApiState>>,
    Json(envelope): Json<crate::reconcile::CallbackEnvelope>,
) -> Result<String, Error> {
    let outcome = state.relay.handle_callback(&envelope).await?;
    Ok(outcome.describe())
}

#[derive(serde::Serialize)]
struct MemberAmountResponse {
    member_id: String,
    amount: Amount,
}

async fn member_loanable(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<MemberAmountResponse>, Error> {
    let member = MemberId::new(id);
    let amount = state.accountant.available_loanable_amount(&member).await?;
    Ok(Json(MemberAmountResponse {
        member_id: member.to_string(),
        amount,
    }))
}

async fn member_guarantor_capacity(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<MemberAmountResponse>, Error> {
    let member = MemberId::new(id);
    let amount = state.accountant.guarantor_capacity(&member).await?;
    Ok(Json(MemberAmountResponse {
        member_id: member.to_string(),
        amount,
    }))
}

async fn group_pool(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<PoolBreakdown>, Error> {
    let breakdown = state
        .accountant
        .group_loan_pool_breakdown(&GroupId::new(id))
        .await?;
    Ok(Json(breakdown))
}

async fn approve_loan(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Response {
    match state.gate.approve_loan(&LoanId::new(id)).await {
        Ok(()) => (StatusCode::OK, "approved").into_response(),
        Err(err) => match err.shortfall() {
            // Name the shortfall so the caller can report something actionable
            Some(shortfall) => (
                StatusCode::CONFLICT,
                format!("{err}; shortfall {shortfall}"),
            )
                .into_response(),
            None => err.into_response(),
        },
    }
}
