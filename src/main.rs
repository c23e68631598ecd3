use axum::{
    Json, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;
use tripsplit::config::CONFIG;
use tripsplit::core::models::{
    audit::{AppLog, EngineAudit},
    fees::{FeeConfig, FeeRate},
    influencer::{BankAccount, Influencer},
    offering::{Offering, OfferingRef, OfferingType},
    participation::Participation,
    settlement::Settlement,
    wallet::{ExpenseWallet, WalletTransaction},
};
use tripsplit::core::services::{
    AllocationOutcome, CancellationOutcome, RefundQuote, SettlementBreakdownResponse,
    TripsplitService, WalletSummaryResponse,
};
use tripsplit::{EngineError, InMemoryCache, InMemoryLogging, InMemoryStorage};
use uuid::Uuid;

type Engine = TripsplitService<InMemoryLogging, InMemoryStorage, InMemoryCache>;

// Request structs for JSON payloads
#[derive(Deserialize)]
struct RegisterInfluencerRequest {
    name: String,
    bank_name: String,
    account_number: String,
    account_holder: String,
    course_fee_override_bps: Option<u32>,
    party_fee_override_bps: Option<u32>,
}

#[derive(Deserialize)]
struct RegisterOfferingRequest {
    offering_type: OfferingType,
    influencer_id: Uuid,
    title: String,
    price: i64,
    max_participants: u32,
    start_date: DateTime<Utc>,
}

#[derive(Deserialize)]
struct ApplyRequest {
    offering_type: OfferingType,
    offering_id: Uuid,
    participant_id: Uuid,
}

#[derive(Deserialize)]
struct ConfirmParticipationRequest {
    paid_amount: i64,
}

#[derive(Deserialize)]
struct QuoteRefundRequest {
    participation_id: Uuid,
}

#[derive(Deserialize)]
struct ChargeWalletRequest {
    offering_id: Uuid,
    participant_id: Uuid,
    amount: i64,
    description: Option<String>,
}

#[derive(Deserialize)]
struct DeductWalletRequest {
    offering_id: Uuid,
    participant_id: Uuid,
    amount: i64,
    description: String,
}

#[derive(Deserialize)]
struct RequestTopupRequest {
    offering_id: Uuid,
    participant_id: Option<Uuid>,
    amount: i64,
}

#[derive(Deserialize)]
struct CreateAllocationRequest {
    offering_id: Uuid,
    title: String,
    total_amount: i64,
    participant_ids: Vec<Uuid>,
    #[serde(default)]
    include_fee_in_amount: bool,
}

#[derive(Deserialize)]
struct SetFeeConfigRequest {
    course_fee_bps: u32,
    party_fee_bps: u32,
    pg_fee_bps: u32,
}

#[derive(Deserialize)]
struct CalculateSettlementRequest {
    offering_type: OfferingType,
    offering_id: Uuid,
}

#[derive(Deserialize)]
struct CompleteSettlementRequest {
    receipt_url: Option<String>,
    notes: Option<String>,
}

#[derive(Serialize)]
struct WalletMutationResponse {
    wallet: ExpenseWallet,
    transaction: WalletTransaction,
}

// Error response struct
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// Newtype wrapper for EngineError to implement IntoResponse
struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            EngineError::InsufficientBalance { .. }
            | EngineError::AlreadyCalculated(_)
            | EngineError::InvalidState { .. }
            | EngineError::AllocationAlreadyCompleted(_)
            | EngineError::AlreadyCancelled(_) => StatusCode::CONFLICT,
            EngineError::OfferingNotFound(_)
            | EngineError::InfluencerNotFound(_)
            | EngineError::ParticipationNotFound(_)
            | EngineError::AllocationNotFound(_)
            | EngineError::SettlementNotFound(_) => StatusCode::NOT_FOUND,
            EngineError::NothingToSettle(_)
            | EngineError::NotConfirmedParticipant(_)
            | EngineError::DuplicateParticipant(_)
            | EngineError::EmptyParticipants
            | EngineError::InvalidAmount(_, _)
            | EngineError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            EngineError::LedgerInvariantViolation(_)
            | EngineError::StorageError(_)
            | EngineError::LoggingError(_)
            | EngineError::CacheError(_)
            | EngineError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorResponse {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

async fn register_influencer(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<RegisterInfluencerRequest>,
) -> Result<Json<Influencer>, ApiError> {
    let now = Utc::now();
    let influencer = Influencer {
        id: Uuid::new_v4(),
        name: req.name,
        bank: BankAccount {
            bank_name: req.bank_name,
            account_number: req.account_number,
            account_holder: req.account_holder,
        },
        course_fee_override: req.course_fee_override_bps.map(FeeRate::from_basis_points),
        party_fee_override: req.party_fee_override_bps.map(FeeRate::from_basis_points),
        created_at: now,
        updated_at: now,
    };
    let created = engine.register_influencer(influencer).await?;
    Ok(Json(created))
}

async fn register_offering(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<RegisterOfferingRequest>,
) -> Result<Json<Offering>, ApiError> {
    let offering = Offering {
        id: Uuid::new_v4(),
        offering_type: req.offering_type,
        influencer_id: req.influencer_id,
        title: req.title,
        price: req.price,
        max_participants: req.max_participants,
        current_participants: 0,
        start_date: req.start_date,
        created_at: Utc::now(),
    };
    let created = engine.register_offering(offering).await?;
    Ok(Json(created))
}

async fn apply_for_offering(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<ApplyRequest>,
) -> Result<Json<Participation>, ApiError> {
    let reference = OfferingRef::new(req.offering_type, req.offering_id);
    let participation = engine
        .apply_for_offering(reference, req.participant_id)
        .await?;
    Ok(Json(participation))
}

async fn confirm_participation(
    State(engine): State<Arc<Engine>>,
    Path(participation_id): Path<Uuid>,
    Json(req): Json<ConfirmParticipationRequest>,
) -> Result<Json<Participation>, ApiError> {
    let participation = engine
        .confirm_participation(participation_id, req.paid_amount)
        .await?;
    Ok(Json(participation))
}

async fn cancel_participation(
    State(engine): State<Arc<Engine>>,
    Path(participation_id): Path<Uuid>,
) -> Result<Json<CancellationOutcome>, ApiError> {
    let outcome = engine.cancel_participation(participation_id).await?;
    Ok(Json(outcome))
}

async fn quote_refund(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<QuoteRefundRequest>,
) -> Result<Json<RefundQuote>, ApiError> {
    let quote = engine.quote_refund(req.participation_id).await?;
    Ok(Json(quote))
}

async fn charge_wallet(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<ChargeWalletRequest>,
) -> Result<Json<WalletMutationResponse>, ApiError> {
    let (wallet, transaction) = engine
        .charge_wallet(
            req.offering_id,
            req.participant_id,
            req.amount,
            req.description,
        )
        .await?;
    Ok(Json(WalletMutationResponse {
        wallet,
        transaction,
    }))
}

async fn deduct_wallet(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<DeductWalletRequest>,
) -> Result<Json<WalletMutationResponse>, ApiError> {
    let (wallet, transaction) = engine
        .deduct_wallet(
            req.offering_id,
            req.participant_id,
            req.amount,
            req.description,
        )
        .await?;
    Ok(Json(WalletMutationResponse {
        wallet,
        transaction,
    }))
}

async fn request_topup(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<RequestTopupRequest>,
) -> Result<Json<Vec<ExpenseWallet>>, ApiError> {
    let wallets = engine
        .request_topup(req.offering_id, req.participant_id, req.amount)
        .await?;
    Ok(Json(wallets))
}

async fn wallet_summary(
    State(engine): State<Arc<Engine>>,
    Path((offering_id, participant_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<WalletSummaryResponse>, ApiError> {
    let summary = engine.wallet_summary(offering_id, participant_id).await?;
    Ok(Json(summary))
}

async fn create_allocation(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<CreateAllocationRequest>,
) -> Result<Json<AllocationOutcome>, ApiError> {
    let outcome = engine
        .create_allocation(
            req.offering_id,
            req.title,
            req.total_amount,
            req.participant_ids,
            req.include_fee_in_amount,
        )
        .await?;
    Ok(Json(outcome))
}

async fn retry_allocation(
    State(engine): State<Arc<Engine>>,
    Path(allocation_id): Path<Uuid>,
) -> Result<Json<AllocationOutcome>, ApiError> {
    let outcome = engine.retry_allocation(allocation_id).await?;
    Ok(Json(outcome))
}

async fn allocation_status(
    State(engine): State<Arc<Engine>>,
    Path(allocation_id): Path<Uuid>,
) -> Result<Json<AllocationOutcome>, ApiError> {
    let outcome = engine.allocation_status(allocation_id).await?;
    Ok(Json(outcome))
}

async fn set_fee_config(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<SetFeeConfigRequest>,
) -> Result<Json<FeeConfig>, ApiError> {
    let config = engine
        .set_fee_config(
            FeeRate::from_basis_points(req.course_fee_bps),
            FeeRate::from_basis_points(req.party_fee_bps),
            FeeRate::from_basis_points(req.pg_fee_bps),
        )
        .await?;
    Ok(Json(config))
}

async fn calculate_settlement(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<CalculateSettlementRequest>,
) -> Result<Json<Settlement>, ApiError> {
    let settlement = engine
        .calculate_settlement(req.offering_type, req.offering_id)
        .await?;
    Ok(Json(settlement))
}

async fn get_settlement(
    State(engine): State<Arc<Engine>>,
    Path(settlement_id): Path<Uuid>,
) -> Result<Json<Settlement>, ApiError> {
    let settlement = engine
        .get_settlement(settlement_id)
        .await?
        .ok_or_else(|| EngineError::SettlementNotFound(settlement_id.to_string()))?;
    Ok(Json(settlement))
}

async fn process_settlement(
    State(engine): State<Arc<Engine>>,
    Path(settlement_id): Path<Uuid>,
) -> Result<Json<Settlement>, ApiError> {
    let settlement = engine.process_settlement(settlement_id).await?;
    Ok(Json(settlement))
}

async fn complete_settlement(
    State(engine): State<Arc<Engine>>,
    Path(settlement_id): Path<Uuid>,
    Json(req): Json<CompleteSettlementRequest>,
) -> Result<Json<Settlement>, ApiError> {
    let settlement = engine
        .complete_settlement(settlement_id, req.receipt_url, req.notes)
        .await?;
    Ok(Json(settlement))
}

async fn settlement_breakdown(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<CalculateSettlementRequest>,
) -> Result<Json<SettlementBreakdownResponse>, ApiError> {
    let breakdown = engine
        .settlement_breakdown(req.offering_type, req.offering_id)
        .await?;
    Ok(Json(breakdown))
}

async fn get_app_logs(State(engine): State<Arc<Engine>>) -> Result<Json<Vec<AppLog>>, ApiError> {
    let logs = engine.get_app_logs().await?;
    Ok(Json(logs))
}

async fn get_engine_audits(
    State(engine): State<Arc<Engine>>,
    Path(offering_id): Path<Uuid>,
) -> Result<Json<Vec<EngineAudit>>, ApiError> {
    let audits = engine.get_engine_audits(offering_id).await?;
    Ok(Json(audits))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(CONFIG.log_level.as_str())
        .init();

    // Initialize storage, logging and cache
    let cache = InMemoryCache::new();
    let storage = InMemoryStorage::new();
    let logging = InMemoryLogging::new();
    let engine = Arc::new(TripsplitService::new(storage, logging, cache));

    // Define API routes
    let app = Router::new()
        // add / route with a simple health check
        .route("/", get(|| async { "OK" }))
        .route("/influencers", post(register_influencer))
        .route("/offerings", post(register_offering))
        .route("/offerings/{offering_id}/audits", get(get_engine_audits))
        .route("/participations", post(apply_for_offering))
        .route(
            "/participations/{participation_id}/confirm",
            post(confirm_participation),
        )
        .route(
            "/participations/{participation_id}/cancel",
            post(cancel_participation),
        )
        .route("/refunds/quote", post(quote_refund))
        .route("/wallets/charge", post(charge_wallet))
        .route("/wallets/deduct", post(deduct_wallet))
        .route("/wallets/topup_request", post(request_topup))
        .route(
            "/wallets/{offering_id}/{participant_id}",
            get(wallet_summary),
        )
        .route("/allocations", post(create_allocation))
        .route("/allocations/{allocation_id}", get(allocation_status))
        .route("/allocations/{allocation_id}/retry", post(retry_allocation))
        .route("/fees/config", post(set_fee_config))
        .route("/settlements/calculate", post(calculate_settlement))
        .route("/settlements/breakdown", post(settlement_breakdown))
        .route("/settlements/{settlement_id}", get(get_settlement))
        .route(
            "/settlements/{settlement_id}/process",
            post(process_settlement),
        )
        .route(
            "/settlements/{settlement_id}/complete",
            post(complete_settlement),
        )
        .route("/logs", get(get_app_logs))
        .layer(CompressionLayer::new()) // Gzip compression
        .layer(TimeoutLayer::new(Duration::from_secs(30))) // 30-second timeout
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([http::Method::GET, http::Method::POST])
                .allow_headers([header::CONTENT_TYPE]),
        )
        .layer(TraceLayer::new_for_http()) // Request tracing
        .with_state(engine);

    // Start server
    let addr = SocketAddr::from(([127, 0, 0, 1], CONFIG.port));
    info!("Server running at http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
