//! HTTP request handlers.
//!
//! The webhook handler is the only one with unusual status-code rules:
//! gateways retry anything that is not a 2xx, so outcomes a retry cannot
//! change (unknown payment, recorded conflict, unsupported event type) are
//! acknowledged with 200 after logging. Signature failures stay 401 - an
//! unverified body must never be acknowledged.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};

use settlement_types::{
    AppError, AuditEntryResponse, BookingId, BookingResponse, ConfirmPaymentRequest,
    CreateBookingRequest, CreatePaymentRequest, EnqueuedResponse, FailPaymentRequest, Gateway,
    JobQueue, JobResponse, KycCallbackRequest, PartnerId, PaymentId, PaymentResponse,
    RefundRequest, SettlementRecord, SettlementRepository, VerifyError, WalletId, WalletResponse,
    WalletTransactionResponse,
};

use crate::service::SettlementService;
use crate::webhook::WebhookVerifier;

/// Application state shared across handlers.
pub struct AppState<R: SettlementRepository, Q: JobQueue> {
    pub service: SettlementService<R, Q>,
    pub verifier: WebhookVerifier,
}

/// Wrapper to implement IntoResponse for AppError (orphan rule workaround).
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::InsufficientBalance {
                available,
                requested,
            } => (
                StatusCode::BAD_REQUEST,
                format!(
                    "Insufficient balance: available {}, requested {}",
                    available, requested
                ),
            ),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message,
            "code": status.as_u16()
        });

        (status, Json(body)).into_response()
    }
}

/// Health check endpoint.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Gateway webhook
// ─────────────────────────────────────────────────────────────────────────────

/// Receives a gateway callback: verify the signature over the raw body,
/// then hand the normalized event to the state machine.
#[tracing::instrument(skip(state, headers, body), fields(gateway = %gateway))]
pub async fn gateway_webhook<R: SettlementRepository, Q: JobQueue>(
    State(state): State<Arc<AppState<R, Q>>>,
    Path(gateway): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Ok(gateway) = Gateway::from_str(&gateway) else {
        return ApiError(AppError::NotFound(format!("Unknown gateway: {}", gateway)))
            .into_response();
    };

    let Some(signature) = headers
        .get(gateway.signature_header())
        .and_then(|h| h.to_str().ok())
    else {
        return ApiError(AppError::Unauthorized(format!(
            "Missing {} header",
            gateway.signature_header()
        )))
        .into_response();
    };

    let event = match state.verifier.verify(gateway, &body, signature) {
        Ok(event) => event,
        Err(VerifyError::UnsupportedEvent(event_type)) => {
            // Event types outside the pipeline's interest are acknowledged
            // so the gateway stops redelivering them.
            tracing::info!(%event_type, "ignoring unsupported gateway event");
            return Json(serde_json::json!({ "status": "ignored" })).into_response();
        }
        Err(e @ VerifyError::MissingSecret(_)) => {
            tracing::error!(error = %e, "webhook secret not configured");
            return ApiError(AppError::Internal("Webhook secret not configured".into()))
                .into_response();
        }
        Err(e) => {
            tracing::warn!(error = %e, "webhook rejected");
            return ApiError(AppError::Unauthorized(e.to_string())).into_response();
        }
    };

    match state.service.apply_gateway_event(event).await {
        Ok(_) => Json(serde_json::json!({ "status": "ok" })).into_response(),
        Err(AppError::NotFound(msg)) => {
            // The gateway knows a payment we do not. Redelivery cannot fix
            // that, so acknowledge after logging.
            tracing::warn!(%msg, "gateway event matched no payment");
            Json(serde_json::json!({ "status": "ok" })).into_response()
        }
        Err(AppError::Conflict(msg)) => {
            // Already logged and written to the audit trail by the service.
            tracing::error!(%msg, "gateway event conflicts with recorded settlement");
            Json(serde_json::json!({ "status": "ok" })).into_response()
        }
        Err(e) => ApiError(e).into_response(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Bookings & payments
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip(state), fields(user_id = %req.user_id, amount = req.amount))]
pub async fn create_booking<R: SettlementRepository, Q: JobQueue>(
    State(state): State<Arc<AppState<R, Q>>>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let booking = state.service.create_booking(req).await?;
    Ok((StatusCode::CREATED, Json(BookingResponse::from(booking))))
}

#[tracing::instrument(skip(state), fields(booking_id = %id))]
pub async fn get_booking<R: SettlementRepository, Q: JobQueue>(
    State(state): State<Arc<AppState<R, Q>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let booking_id: BookingId = id
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid booking ID".into()))?;

    let booking = state.service.get_booking(booking_id).await?;
    Ok(Json(BookingResponse::from(booking)))
}

#[tracing::instrument(skip(state), fields(booking_id = %req.booking_id, amount = req.amount))]
pub async fn create_payment<R: SettlementRepository, Q: JobQueue>(
    State(state): State<Arc<AppState<R, Q>>>,
    Json(req): Json<CreatePaymentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let payment = state.service.create_payment(req).await?;
    Ok((StatusCode::CREATED, Json(PaymentResponse::from(payment))))
}

#[tracing::instrument(skip(state), fields(payment_id = %id))]
pub async fn get_payment<R: SettlementRepository, Q: JobQueue>(
    State(state): State<Arc<AppState<R, Q>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let payment_id: PaymentId = id
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid payment ID".into()))?;

    let payment = state.service.get_payment(payment_id).await?;
    Ok(Json(PaymentResponse::from(payment)))
}

/// Manual confirmation (reconciliation path). Routed through the same
/// transition as gateway webhooks.
#[tracing::instrument(skip(state, req), fields(payment_id = %id))]
pub async fn confirm_payment<R: SettlementRepository, Q: JobQueue>(
    State(state): State<Arc<AppState<R, Q>>>,
    Path(id): Path<String>,
    Json(req): Json<ConfirmPaymentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let payment_id: PaymentId = id
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid payment ID".into()))?;

    let record = SettlementRecord {
        gateway_payment_id: req.gateway_payment_id,
        gateway_order_id: req.gateway_order_id,
        gateway_response: req.gateway_response,
    };
    let payment = state
        .service
        .settle_payment(payment_id, record, "admin")
        .await?;
    Ok(Json(PaymentResponse::from(payment)))
}

#[tracing::instrument(skip(state), fields(payment_id = %id))]
pub async fn fail_payment<R: SettlementRepository, Q: JobQueue>(
    State(state): State<Arc<AppState<R, Q>>>,
    Path(id): Path<String>,
    Json(req): Json<FailPaymentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let payment_id: PaymentId = id
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid payment ID".into()))?;

    let payment = state
        .service
        .fail_payment(payment_id, req.reason, None, "admin")
        .await?;
    Ok(Json(PaymentResponse::from(payment)))
}

#[tracing::instrument(skip(state), fields(payment_id = %id))]
pub async fn cancel_payment<R: SettlementRepository, Q: JobQueue>(
    State(state): State<Arc<AppState<R, Q>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let payment_id: PaymentId = id
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid payment ID".into()))?;

    let payment = state.service.cancel_payment(payment_id, "admin").await?;
    Ok(Json(PaymentResponse::from(payment)))
}

// ─────────────────────────────────────────────────────────────────────────────
// KYC & refunds
// ─────────────────────────────────────────────────────────────────────────────

/// Completion callback from the KYC provider.
#[tracing::instrument(skip(state), fields(user_id = %req.user_id, verification_id = %req.verification_id))]
pub async fn kyc_callback<R: SettlementRepository, Q: JobQueue>(
    State(state): State<Arc<AppState<R, Q>>>,
    Json(req): Json<KycCallbackRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let booking = state.service.handle_kyc_completion(req).await?;
    Ok(Json(BookingResponse::from(booking)))
}

#[tracing::instrument(skip(state, req), fields(booking_id = %id))]
pub async fn request_refund<R: SettlementRepository, Q: JobQueue>(
    State(state): State<Arc<AppState<R, Q>>>,
    Path(id): Path<String>,
    Json(req): Json<RefundRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let booking_id: BookingId = id
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid booking ID".into()))?;

    let job_id = state.service.request_refund(booking_id, req).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(EnqueuedResponse {
            job_id: job_id.into_string(),
        }),
    ))
}

// ─────────────────────────────────────────────────────────────────────────────
// Wallets
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip(state), fields(partner_id = %id))]
pub async fn get_partner_wallet<R: SettlementRepository, Q: JobQueue>(
    State(state): State<Arc<AppState<R, Q>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let partner_id: PartnerId = id
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid partner ID".into()))?;

    let wallet = state.service.partner_wallet(partner_id).await?;
    Ok(Json(WalletResponse::from(wallet)))
}

#[tracing::instrument(skip(state), fields(wallet_id = %id))]
pub async fn list_wallet_transactions<R: SettlementRepository, Q: JobQueue>(
    State(state): State<Arc<AppState<R, Q>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let wallet_id: WalletId = id
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid wallet ID".into()))?;

    let transactions = state.service.wallet_transactions(wallet_id).await?;
    let response: Vec<WalletTransactionResponse> = transactions
        .into_iter()
        .map(WalletTransactionResponse::from)
        .collect();
    Ok(Json(response))
}

// ─────────────────────────────────────────────────────────────────────────────
// Admin surface
// ─────────────────────────────────────────────────────────────────────────────

/// Jobs that exhausted their retry budget.
#[tracing::instrument(skip(state))]
pub async fn list_dead_letters<R: SettlementRepository, Q: JobQueue>(
    State(state): State<Arc<AppState<R, Q>>>,
) -> Result<impl IntoResponse, ApiError> {
    let jobs = state.service.dead_letters().await?;
    let response: Vec<JobResponse> = jobs.into_iter().map(JobResponse::from).collect();
    Ok(Json(response))
}

/// Queue counters.
#[tracing::instrument(skip(state))]
pub async fn queue_stats<R: SettlementRepository, Q: JobQueue>(
    State(state): State<Arc<AppState<R, Q>>>,
) -> Result<impl IntoResponse, ApiError> {
    let stats = state.service.queue_stats().await?;
    Ok(Json(stats))
}

/// Audit trail for one aggregate, oldest first.
#[tracing::instrument(skip(state), fields(aggregate_id = %aggregate_id))]
pub async fn audit_trail<R: SettlementRepository, Q: JobQueue>(
    State(state): State<Arc<AppState<R, Q>>>,
    Path(aggregate_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let entries = state.service.audit_trail(&aggregate_id).await?;
    let response: Vec<AuditEntryResponse> =
        entries.into_iter().map(AuditEntryResponse::from).collect();
    Ok(Json(response))
}
