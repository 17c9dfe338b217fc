use crate::auth::{self, AuthUser};
use crate::error::{ApiError, ApiResult};
use crate::lifecycle;
use crate::models::*;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use chrono::{Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

const OTP_TTL_MINUTES: i64 = 5;
const OTP_MAX_ATTEMPTS: i32 = 5;
const PASSWORD_MIN_LEN: usize = 6;

#[derive(Debug, serde::Serialize)]
pub struct HealthOut {
    pub status: &'static str,
    pub env: String,
    pub service: &'static str,
    pub version: &'static str,
}

pub async fn health(State(state): State<AppState>) -> axum::Json<HealthOut> {
    axum::Json(HealthOut {
        status: "ok",
        env: state.env_name.clone(),
        service: "Taxi API",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, serde::Serialize)]
pub struct OkOut {
    pub ok: bool,
}

// ----- auth -------------------------------------------------------------

fn valid_email(email: &str) -> bool {
    let e = email.trim();
    if e.len() < 3 || e.len() > 254 {
        return false;
    }
    match e.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.'),
        None => false,
    }
}

pub async fn register(
    State(state): State<AppState>,
    axum::Json(body): axum::Json<RegisterIn>,
) -> ApiResult<axum::Json<AuthOut>> {
    let email = body
        .email
        .as_deref()
        .map(str::trim)
        .map(str::to_lowercase)
        .filter(|e| valid_email(e))
        .ok_or_else(|| ApiError::bad_request("valid email required"))?;
    let password = body
        .password
        .as_deref()
        .filter(|p| p.len() >= PASSWORD_MIN_LEN)
        .ok_or_else(|| ApiError::bad_request("password must be at least 6 characters"))?;
    let name = body
        .name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let phone = body
        .phone
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let users = state.table("users");
    let sql = format!("SELECT 1 FROM {users} WHERE email=$1 LIMIT 1");
    let existing = sqlx::query(&sql)
        .bind(&email)
        .fetch_optional(&state.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "db register email check failed");
            ApiError::internal("database error")
        })?;
    if existing.is_some() {
        return Err(ApiError::conflict("email already registered"));
    }

    let password_hash = auth::hash_password(password)?;
    let id = Uuid::new_v4().to_string();
    let sql = format!(
        "INSERT INTO {users} (id,email,password_hash,name,phone,role,created_at) \
         VALUES ($1,$2,$3,$4,$5,$6,$7)"
    );
    sqlx::query(&sql)
        .bind(&id)
        .bind(&email)
        .bind(&password_hash)
        .bind(&name)
        .bind(&phone)
        .bind(auth::ROLE_CUSTOMER)
        .bind(Utc::now().to_rfc3339())
        .execute(&state.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "db register insert failed");
            ApiError::internal("database error")
        })?;

    let token = auth::sign_token(&state.jwt_secret, &id, auth::ROLE_CUSTOMER)?;
    Ok(axum::Json(AuthOut {
        user: UserOut {
            id,
            email,
            name,
            phone,
            role: auth::ROLE_CUSTOMER.to_string(),
        },
        token,
    }))
}

pub async fn login(
    State(state): State<AppState>,
    axum::Json(body): axum::Json<LoginIn>,
) -> ApiResult<axum::Json<AuthOut>> {
    let email = body
        .email
        .as_deref()
        .map(str::trim)
        .map(str::to_lowercase)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| ApiError::bad_request("valid email required"))?;
    let password = body
        .password
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::bad_request("password is required"))?;

    let users = state.table("users");
    let sql = format!("SELECT id,email,password_hash,name,phone,role FROM {users} WHERE email=$1");
    let row = sqlx::query(&sql)
        .bind(&email)
        .fetch_optional(&state.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "db login lookup failed");
            ApiError::internal("database error")
        })?
        .ok_or_else(|| ApiError::unauthorized("invalid credentials"))?;

    let password_hash: String = row.try_get("password_hash").unwrap_or_default();
    if password_hash.is_empty() || !auth::verify_password(&password_hash, password)? {
        return Err(ApiError::unauthorized("invalid credentials"));
    }

    let id: String = row.try_get("id").unwrap_or_default();
    let role: String = row
        .try_get("role")
        .unwrap_or_else(|_| auth::ROLE_CUSTOMER.to_string());
    let token = auth::sign_token(&state.jwt_secret, &id, &role)?;
    Ok(axum::Json(AuthOut {
        user: UserOut {
            id,
            email: row.try_get("email").unwrap_or_default(),
            name: row.try_get("name").unwrap_or(None),
            phone: row.try_get("phone").unwrap_or(None),
            role,
        },
        token,
    }))
}

pub async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<axum::Json<UserOut>> {
    let user = auth::require_user(&state, &headers).await?;
    Ok(axum::Json(user_out(user)))
}

fn user_out(user: AuthUser) -> UserOut {
    UserOut {
        id: user.id,
        email: user.email,
        name: user.name,
        phone: user.phone,
        role: user.role,
    }
}

pub async fn forgot_password(
    State(state): State<AppState>,
    axum::Json(body): axum::Json<ForgotPasswordIn>,
) -> ApiResult<axum::Json<ForgotPasswordOut>> {
    let email = body
        .email
        .as_deref()
        .map(str::trim)
        .map(str::to_lowercase)
        .filter(|s| !s.is_empty());
    let phone = body
        .phone
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    if email.is_none() && phone.is_none() {
        return Err(ApiError::bad_request("email or phone is required"));
    }

    let users = state.table("users");
    let row = if let Some(email) = email {
        let sql = format!("SELECT id,phone FROM {users} WHERE email=$1");
        sqlx::query(&sql)
            .bind(&email)
            .fetch_optional(&state.pool)
            .await
    } else {
        let raw = phone.unwrap_or_default();
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        let normalized = auth::normalize_phone(&raw);
        let sql = format!("SELECT id,phone FROM {users} WHERE phone IN ($1,$2,$3) LIMIT 1");
        sqlx::query(&sql)
            .bind(&raw)
            .bind(&normalized)
            .bind(format!("+{digits}"))
            .fetch_optional(&state.pool)
            .await
    }
    .map_err(|e| {
        tracing::error!(error = %e, "db password reset lookup failed");
        ApiError::internal("database error")
    })?
    .ok_or_else(|| ApiError::not_found("user not found"))?;

    let user_id: String = row.try_get("id").unwrap_or_default();
    let user_phone: Option<String> = row.try_get("phone").unwrap_or(None);
    let Some(user_phone) = user_phone.filter(|p| !p.trim().is_empty()) else {
        return Err(ApiError::bad_request("no phone number on file for this user"));
    };

    let otp = auth::generate_otp();
    let otp_hash = auth::hash_password(&otp)?;
    let expires_at = Utc::now() + Duration::minutes(OTP_TTL_MINUTES);
    let reset_id = Uuid::new_v4().to_string();

    let reset_otps = state.table("password_reset_otps");
    let sql = format!(
        "INSERT INTO {reset_otps} (id,user_id,otp_hash,expires_at,attempts,verified,created_at) \
         VALUES ($1,$2,$3,$4,0,0,$5)"
    );
    sqlx::query(&sql)
        .bind(&reset_id)
        .bind(&user_id)
        .bind(&otp_hash)
        .bind(expires_at.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(&state.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "db password reset insert failed");
            ApiError::internal("database error")
        })?;

    // OTP delivery is fire-and-forget; a provider outage must not leak
    // whether the account exists beyond this response.
    let notifier = state.notifier.clone();
    let destination = auth::normalize_phone(&user_phone);
    tokio::spawn(async move {
        if let Err(e) = notifier
            .send_password_reset_otp(&destination, &otp, OTP_TTL_MINUTES)
            .await
        {
            tracing::error!(error = %e.detail, "password reset OTP delivery failed");
        }
    });

    Ok(axum::Json(ForgotPasswordOut {
        reset_id,
        expires_at,
        expires_in: OTP_TTL_MINUTES * 60,
        destination: auth::mask_phone(&user_phone),
    }))
}

pub async fn reset_password(
    State(state): State<AppState>,
    axum::Json(body): axum::Json<ResetPasswordIn>,
) -> ApiResult<axum::Json<OkOut>> {
    let reset_id = body
        .reset_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("reset id, OTP, and new password are required"))?;
    let otp = body
        .otp
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("reset id, OTP, and new password are required"))?;
    let new_password = body
        .new_password
        .as_deref()
        .filter(|p| p.len() >= PASSWORD_MIN_LEN)
        .ok_or_else(|| ApiError::bad_request("password must be at least 6 characters"))?;

    let reset_otps = state.table("password_reset_otps");
    let users = state.table("users");

    let sql = format!(
        "SELECT id,user_id,otp_hash,expires_at,attempts,verified FROM {reset_otps} WHERE id=$1"
    );
    let row = sqlx::query(&sql)
        .bind(reset_id)
        .fetch_optional(&state.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "db reset otp lookup failed");
            ApiError::internal("database error")
        })?
        .ok_or_else(|| ApiError::bad_request("invalid reset request"))?;

    let user_id: String = row.try_get("user_id").unwrap_or_default();
    let otp_hash: String = row.try_get("otp_hash").unwrap_or_default();
    let attempts: i32 = row.try_get("attempts").unwrap_or(0);
    let verified: i32 = row.try_get("verified").unwrap_or(0);
    let expires_at = lifecycle::row_dt_opt(&row, "expires_at");

    if verified != 0 {
        return Err(ApiError::bad_request("OTP already used"));
    }
    if attempts >= OTP_MAX_ATTEMPTS {
        return Err(ApiError::bad_request(
            "too many invalid attempts; request a new OTP",
        ));
    }
    if expires_at.map(|at| at < Utc::now()).unwrap_or(true) {
        return Err(ApiError::bad_request("OTP expired; request a new one"));
    }

    if !auth::verify_password(&otp_hash, otp)? {
        let sql = format!("UPDATE {reset_otps} SET attempts=attempts+1 WHERE id=$1");
        let _ = sqlx::query(&sql).bind(reset_id).execute(&state.pool).await;
        return Err(ApiError::bad_request("invalid OTP"));
    }

    let password_hash = auth::hash_password(new_password)?;

    let mut tx = state.pool.begin().await.map_err(|e| {
        tracing::error!(error = %e, "db begin tx failed");
        ApiError::internal("database error")
    })?;
    let sql = format!("UPDATE {users} SET password_hash=$1 WHERE id=$2");
    sqlx::query(&sql)
        .bind(&password_hash)
        .bind(&user_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "db password update failed");
            ApiError::internal("database error")
        })?;
    let sql = format!("UPDATE {reset_otps} SET verified=1, attempts=attempts+1 WHERE id=$1");
    sqlx::query(&sql)
        .bind(reset_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "db reset otp consume failed");
            ApiError::internal("database error")
        })?;
    tx.commit().await.map_err(|e| {
        tracing::error!(error = %e, "db commit failed");
        ApiError::internal("database error")
    })?;

    Ok(axum::Json(OkOut { ok: true }))
}

// ----- customer bookings -------------------------------------------------

pub async fn create_booking_after_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<BookingAfterPaymentIn>,
) -> ApiResult<axum::Json<BookingOut>> {
    let user = auth::require_user(&state, &headers).await?;
    let booking = state
        .engine
        .create_booking_after_payment(&user.id, body)
        .await?;
    Ok(axum::Json(booking))
}

pub async fn my_bookings(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<axum::Json<Vec<BookingOut>>> {
    let user = auth::require_user(&state, &headers).await?;
    let bookings = state.engine.list_user_bookings(&user.id).await?;
    Ok(axum::Json(bookings))
}

// ----- payments ----------------------------------------------------------

pub async fn create_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<CreateOrderIn>,
) -> ApiResult<axum::Json<CreateOrderOut>> {
    let user = auth::require_user(&state, &headers).await?;
    let Some(gateway) = state.gateway.as_ref() else {
        return Err(ApiError::internal("PAYMENT_GATEWAY_BASE_URL not configured"));
    };

    let pay_amount = body
        .amount
        .or(body.total_amount)
        .filter(|v| *v > 0.0)
        .ok_or_else(|| ApiError::bad_request("amount must be positive"))?;

    let receipt = format!("user_{}_{}", user.id, Utc::now().timestamp_millis());
    let order = gateway
        .create_order(pay_amount, &body.currency, &receipt)
        .await?;

    let booking = state
        .engine
        .create_booking_with_pending_payment(
            &user.id,
            &body,
            &order.id,
            &state.gateway_provider,
            body.amount,
        )
        .await?;

    let payment_id = booking.payments.first().map(|p| p.id.clone());
    Ok(axum::Json(CreateOrderOut {
        key_id: gateway.key_id().to_string(),
        order_id: order.id,
        amount_minor: order.amount_minor,
        currency: order.currency,
        booking_id: booking.id,
        payment_id,
    }))
}

pub async fn verify_and_book(
    State(state): State<AppState>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<VerifyPaymentIn>,
) -> ApiResult<axum::Json<BookingOut>> {
    let _user = auth::require_user(&state, &headers).await?;
    let Some(gateway) = state.gateway.as_ref() else {
        return Err(ApiError::internal("PAYMENT_GATEWAY_BASE_URL not configured"));
    };

    let order_id = body
        .order_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("order_id is required"))?;
    let payment_id = body
        .payment_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("payment_id is required"))?;
    let signature = body
        .signature
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("signature is required"))?;

    if !gateway.verify_signature(order_id, payment_id, signature) {
        return Err(ApiError::bad_request("invalid payment signature"));
    }

    let booking = state
        .engine
        .reconcile_payment_success(order_id, payment_id)
        .await?;

    // Confirmation message is detached: reconciliation is already committed
    // and must not be re-signalled by a delivery failure.
    let phone = booking.user.as_ref().and_then(|u| u.phone.clone());
    state
        .notifier
        .spawn_booking_confirmation(phone, booking.clone());

    Ok(axum::Json(booking))
}

// ----- admin: bookings ---------------------------------------------------

pub async fn admin_me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<axum::Json<UserOut>> {
    let user = auth::require_admin(&state, &headers).await?;
    Ok(axum::Json(user_out(user)))
}

pub async fn admin_list_bookings(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<axum::Json<Vec<BookingOut>>> {
    let _admin = auth::require_admin(&state, &headers).await?;
    let bookings = state.engine.list_bookings().await?;
    Ok(axum::Json(bookings))
}

pub async fn admin_booking_ticket(
    Path(booking_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<axum::Json<BookingOut>> {
    let _admin = auth::require_admin(&state, &headers).await?;
    let booking = state.engine.booking_snapshot(booking_id.trim(), true).await?;
    Ok(axum::Json(booking))
}

pub async fn admin_assign_taxi(
    Path(booking_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<AssignTaxiIn>,
) -> ApiResult<axum::Json<AssignTaxiOut>> {
    let _admin = auth::require_admin(&state, &headers).await?;
    let assignment = state
        .engine
        .assign_taxi(&state.notifier, booking_id.trim(), &body)
        .await?;
    Ok(axum::Json(AssignTaxiOut { assignment }))
}

pub async fn admin_update_status(
    Path(booking_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<StatusUpdateIn>,
) -> ApiResult<axum::Json<BookingOut>> {
    let admin = auth::require_admin(&state, &headers).await?;
    let status = body
        .status
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("status is required"))?;
    let booking = state
        .engine
        .update_booking_status(booking_id.trim(), status, &admin.id, body.reason.as_deref())
        .await?;
    Ok(axum::Json(booking))
}

pub async fn admin_complete_trip(
    Path(booking_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<CompleteTripIn>,
) -> ApiResult<axum::Json<CompleteTripOut>> {
    let admin = auth::require_admin(&state, &headers).await?;
    let (booking, adjustments) = state
        .engine
        .complete_trip(booking_id.trim(), &body, &admin.id)
        .await?;
    Ok(axum::Json(CompleteTripOut {
        booking,
        adjustments,
    }))
}

pub async fn admin_cancel_booking(
    Path(booking_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<CancelBookingIn>,
) -> ApiResult<axum::Json<BookingOut>> {
    let admin = auth::require_admin(&state, &headers).await?;
    let reason = body.reason.as_deref().unwrap_or("");
    let booking = state
        .engine
        .cancel_booking(booking_id.trim(), reason, &admin.id)
        .await?;
    Ok(axum::Json(booking))
}

pub async fn admin_list_notes(
    Path(booking_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<axum::Json<Vec<NoteOut>>> {
    let _admin = auth::require_admin(&state, &headers).await?;
    let notes = state.engine.list_notes(booking_id.trim()).await?;
    Ok(axum::Json(notes))
}

pub async fn admin_add_note(
    Path(booking_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<NoteIn>,
) -> ApiResult<axum::Json<NoteOut>> {
    let admin = auth::require_admin(&state, &headers).await?;
    let content = body.content.as_deref().unwrap_or("");
    let note = state
        .engine
        .add_note(booking_id.trim(), &admin.id, content)
        .await?;
    Ok(axum::Json(note))
}

pub async fn admin_completed_history(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<axum::Json<Vec<BookingOut>>> {
    let _admin = auth::require_admin(&state, &headers).await?;
    let bookings = state
        .engine
        .list_bookings_by_status(lifecycle::COMPLETED)
        .await?;
    Ok(axum::Json(bookings))
}

pub async fn admin_cancelled_history(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<axum::Json<Vec<BookingOut>>> {
    let _admin = auth::require_admin(&state, &headers).await?;
    let bookings = state
        .engine
        .list_bookings_by_status(lifecycle::CANCELLED)
        .await?;
    Ok(axum::Json(bookings))
}

pub async fn admin_pending_payments(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<axum::Json<Vec<BookingOut>>> {
    let _admin = auth::require_admin(&state, &headers).await?;
    let bookings = state.engine.list_pending_payment_bookings().await?;
    Ok(axum::Json(bookings))
}

pub async fn admin_clean_bookings(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<axum::Json<CleanupOut>> {
    let _admin = auth::require_admin(&state, &headers).await?;
    let counts = state.engine.clean_booking_data().await?;
    Ok(axum::Json(counts))
}

// ----- fleet vehicles ----------------------------------------------------

fn vehicle_from_row(row: &PgRow) -> FleetVehicleOut {
    let is_active: i32 = row.try_get("is_active").unwrap_or(1);
    FleetVehicleOut {
        id: row.try_get("id").unwrap_or_default(),
        name: row.try_get("name").unwrap_or_default(),
        seats: row.try_get("seats").unwrap_or(4),
        base_price_per_km: row.try_get("base_price_per_km").unwrap_or(0.0),
        category: row.try_get("category").unwrap_or_default(),
        description: row.try_get("description").unwrap_or(None),
        image_url: row.try_get("image_url").unwrap_or(None),
        is_active: is_active != 0,
    }
}

fn vehicle_json(v: &FleetVehicleOut) -> Option<serde_json::Value> {
    serde_json::to_value(v).ok()
}

async fn fetch_vehicle(state: &AppState, vehicle_id: &str) -> ApiResult<FleetVehicleOut> {
    let fleet = state.table("fleet_vehicles");
    let sql = format!(
        "SELECT id,name,seats,base_price_per_km,category,description,image_url,is_active \
         FROM {fleet} WHERE id=$1"
    );
    let row = sqlx::query(&sql)
        .bind(vehicle_id)
        .fetch_optional(&state.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "db vehicle lookup failed");
            ApiError::internal("database error")
        })?
        .ok_or_else(|| ApiError::not_found("vehicle not found"))?;
    Ok(vehicle_from_row(&row))
}

#[derive(Debug, serde::Deserialize)]
pub struct FleetListParams {
    pub active_only: Option<bool>,
}

async fn list_vehicles(
    state: &AppState,
    active_only: bool,
) -> ApiResult<axum::Json<Vec<FleetVehicleOut>>> {
    let fleet = state.table("fleet_vehicles");
    let sql = if active_only {
        format!(
            "SELECT id,name,seats,base_price_per_km,category,description,image_url,is_active \
             FROM {fleet} WHERE is_active=1 ORDER BY category ASC"
        )
    } else {
        format!(
            "SELECT id,name,seats,base_price_per_km,category,description,image_url,is_active \
             FROM {fleet} ORDER BY category ASC"
        )
    };
    let rows = sqlx::query(&sql).fetch_all(&state.pool).await.map_err(|e| {
        tracing::error!(error = %e, "db fleet list failed");
        ApiError::internal("database error")
    })?;
    Ok(axum::Json(rows.iter().map(vehicle_from_row).collect()))
}

/// Active vehicles for the customer booking page; no auth required.
pub async fn fleet_public_list(
    State(state): State<AppState>,
) -> ApiResult<axum::Json<Vec<FleetVehicleOut>>> {
    list_vehicles(&state, true).await
}

pub async fn fleet_list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<FleetListParams>,
) -> ApiResult<axum::Json<Vec<FleetVehicleOut>>> {
    let _admin = auth::require_admin(&state, &headers).await?;
    list_vehicles(&state, params.active_only.unwrap_or(false)).await
}

pub async fn fleet_get(
    Path(vehicle_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<axum::Json<FleetVehicleOut>> {
    let _admin = auth::require_admin(&state, &headers).await?;
    let vehicle = fetch_vehicle(&state, vehicle_id.trim()).await?;
    Ok(axum::Json(vehicle))
}

pub async fn fleet_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<FleetVehicleIn>,
) -> ApiResult<axum::Json<FleetVehicleOut>> {
    let admin = auth::require_admin(&state, &headers).await?;
    let name = body
        .name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            ApiError::bad_request("name, seats, base_price_per_km, and category are required")
        })?;
    let seats = body.seats.filter(|s| *s > 0).ok_or_else(|| {
        ApiError::bad_request("name, seats, base_price_per_km, and category are required")
    })?;
    let base_price_per_km = body.base_price_per_km.filter(|p| *p > 0.0).ok_or_else(|| {
        ApiError::bad_request("name, seats, base_price_per_km, and category are required")
    })?;
    let category = body
        .category
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            ApiError::bad_request("name, seats, base_price_per_km, and category are required")
        })?;

    let vehicle = FleetVehicleOut {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        seats,
        base_price_per_km,
        category: category.to_string(),
        description: body
            .description
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        image_url: body
            .image_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        is_active: body.is_active.unwrap_or(true),
    };

    let fleet = state.table("fleet_vehicles");
    let now = Utc::now().to_rfc3339();
    let mut tx = state.pool.begin().await.map_err(|e| {
        tracing::error!(error = %e, "db begin tx failed");
        ApiError::internal("database error")
    })?;
    let sql = format!(
        "INSERT INTO {fleet} \
         (id,name,seats,base_price_per_km,category,description,image_url,is_active,created_at,updated_at) \
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)"
    );
    sqlx::query(&sql)
        .bind(&vehicle.id)
        .bind(&vehicle.name)
        .bind(vehicle.seats)
        .bind(vehicle.base_price_per_km)
        .bind(&vehicle.category)
        .bind(&vehicle.description)
        .bind(&vehicle.image_url)
        .bind(if vehicle.is_active { 1i32 } else { 0i32 })
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "db vehicle insert failed");
            ApiError::internal("database error")
        })?;

    state
        .engine
        .append_audit(
            &mut tx,
            lifecycle::ENTITY_FLEET,
            &vehicle.id,
            "CREATE",
            None,
            vehicle_json(&vehicle),
            &admin.id,
            "Vehicle added to fleet",
        )
        .await?;

    tx.commit().await.map_err(|e| {
        tracing::error!(error = %e, "db commit failed");
        ApiError::internal("database error")
    })?;

    Ok(axum::Json(vehicle))
}

pub async fn fleet_update(
    Path(vehicle_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<FleetVehicleIn>,
) -> ApiResult<axum::Json<FleetVehicleOut>> {
    let admin = auth::require_admin(&state, &headers).await?;
    let vehicle_id = vehicle_id.trim().to_string();
    let existing = fetch_vehicle(&state, &vehicle_id).await?;

    let updated = FleetVehicleOut {
        id: existing.id.clone(),
        name: body
            .name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| existing.name.clone()),
        seats: body.seats.filter(|s| *s > 0).unwrap_or(existing.seats),
        base_price_per_km: body
            .base_price_per_km
            .filter(|p| *p > 0.0)
            .unwrap_or(existing.base_price_per_km),
        category: body
            .category
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| existing.category.clone()),
        description: body.description.clone().or_else(|| existing.description.clone()),
        image_url: body.image_url.clone().or_else(|| existing.image_url.clone()),
        is_active: body.is_active.unwrap_or(existing.is_active),
    };

    let fleet = state.table("fleet_vehicles");
    let mut tx = state.pool.begin().await.map_err(|e| {
        tracing::error!(error = %e, "db begin tx failed");
        ApiError::internal("database error")
    })?;
    let sql = format!(
        "UPDATE {fleet} SET name=$1, seats=$2, base_price_per_km=$3, category=$4, \
         description=$5, image_url=$6, is_active=$7, updated_at=$8 WHERE id=$9"
    );
    sqlx::query(&sql)
        .bind(&updated.name)
        .bind(updated.seats)
        .bind(updated.base_price_per_km)
        .bind(&updated.category)
        .bind(&updated.description)
        .bind(&updated.image_url)
        .bind(if updated.is_active { 1i32 } else { 0i32 })
        .bind(Utc::now().to_rfc3339())
        .bind(&vehicle_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "db vehicle update failed");
            ApiError::internal("database error")
        })?;

    state
        .engine
        .append_audit(
            &mut tx,
            lifecycle::ENTITY_FLEET,
            &vehicle_id,
            "UPDATE",
            vehicle_json(&existing),
            vehicle_json(&updated),
            &admin.id,
            "Vehicle details updated",
        )
        .await?;

    tx.commit().await.map_err(|e| {
        tracing::error!(error = %e, "db commit failed");
        ApiError::internal("database error")
    })?;

    Ok(axum::Json(updated))
}

/// Soft delete: fleet vehicles are deactivated, never removed.
pub async fn fleet_delete(
    Path(vehicle_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<axum::Json<OkOut>> {
    let admin = auth::require_admin(&state, &headers).await?;
    let vehicle_id = vehicle_id.trim().to_string();
    let existing = fetch_vehicle(&state, &vehicle_id).await?;

    let fleet = state.table("fleet_vehicles");
    let mut tx = state.pool.begin().await.map_err(|e| {
        tracing::error!(error = %e, "db begin tx failed");
        ApiError::internal("database error")
    })?;
    let sql = format!("UPDATE {fleet} SET is_active=0, updated_at=$1 WHERE id=$2");
    sqlx::query(&sql)
        .bind(Utc::now().to_rfc3339())
        .bind(&vehicle_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "db vehicle deactivate failed");
            ApiError::internal("database error")
        })?;

    state
        .engine
        .append_audit(
            &mut tx,
            lifecycle::ENTITY_FLEET,
            &vehicle_id,
            "DELETE",
            vehicle_json(&existing),
            None,
            &admin.id,
            "Vehicle deactivated from fleet",
        )
        .await?;

    tx.commit().await.map_err(|e| {
        tracing::error!(error = %e, "db commit failed");
        ApiError::internal("database error")
    })?;

    Ok(axum::Json(OkOut { ok: true }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation_accepts_plain_addresses() {
        assert!(valid_email("rider@example.com"));
        assert!(valid_email("a.b+tag@mail.example.co"));
        assert!(!valid_email("rider"));
        assert!(!valid_email("rider@localhost"));
        assert!(!valid_email("@example.com"));
        assert!(!valid_email(""));
    }
}
