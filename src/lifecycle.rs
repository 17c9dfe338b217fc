use crate::error::{ApiError, ApiResult};
use crate::models::*;
use crate::notify::Notifier;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

pub const PENDING_PAYMENT: &str = "PENDING_PAYMENT";
pub const PAID: &str = "PAID";
pub const IN_PROGRESS: &str = "IN_PROGRESS";
pub const COMPLETED: &str = "COMPLETED";
pub const CANCELLED: &str = "CANCELLED";

pub const PAYMENT_PENDING: &str = "PENDING";
pub const PAYMENT_SUCCESS: &str = "SUCCESS";
pub const PAYMENT_CREATED: &str = "CREATED";

pub const ASSIGN_ASSIGNED: &str = "ASSIGNED";

pub const ENTITY_BOOKING: &str = "BOOKING";
pub const ENTITY_FLEET: &str = "FLEET";

pub const ACTION_STATUS_CHANGE: &str = "STATUS_CHANGE";
pub const ACTION_CANCEL: &str = "CANCEL";

const DEFAULT_RATE_PER_KM: f64 = 12.0;

/// Edges of the admin status machine, keyed by current status. Terminal
/// states have no outgoing edges.
pub fn allowed_transitions(from: &str) -> &'static [&'static str] {
    match from {
        "PENDING_PAYMENT" => &["PAID", "CANCELLED"],
        "PAID" => &["IN_PROGRESS", "CANCELLED"],
        "IN_PROGRESS" => &["COMPLETED", "CANCELLED"],
        _ => &[],
    }
}

pub fn is_terminal(status: &str) -> bool {
    status == COMPLETED || status == CANCELLED
}

/// Completion arithmetic: only distance beyond the estimate is billed, at
/// the given (or default) per-km rate, plus flat toll/waiting charges.
pub fn fare_breakdown(
    estimated_km: f64,
    actual_km: Option<f64>,
    rate_per_km: Option<f64>,
    toll_charges: Option<f64>,
    waiting_charges: Option<f64>,
    total_amount: f64,
) -> AdjustmentsOut {
    let actual = actual_km.unwrap_or(estimated_km);
    let extra_km = (actual - estimated_km).max(0.0);
    let rate = rate_per_km.unwrap_or(DEFAULT_RATE_PER_KM);
    let extra_km_charge = extra_km * rate;
    let toll = toll_charges.unwrap_or(0.0);
    let waiting = waiting_charges.unwrap_or(0.0);
    let total_adjustments = extra_km_charge + toll + waiting;
    AdjustmentsOut {
        extra_km,
        extra_km_charge,
        toll_charges: toll,
        waiting_charges: waiting,
        total_adjustments,
        new_total: total_amount + total_adjustments,
    }
}

/// Partial-payment split: what is actually paid now and what stays owed.
/// An omitted payment amount means full payment.
pub fn remaining_after(total_amount: f64, payment_amount: Option<f64>) -> (f64, f64) {
    let actual = payment_amount.unwrap_or(total_amount);
    (actual, (total_amount - actual).max(0.0))
}

pub(crate) fn parse_iso8601(dt: &str) -> Result<DateTime<Utc>, ApiError> {
    let s = dt.trim();
    if s.is_empty() {
        return Err(ApiError::bad_request("invalid date format; use ISO8601"));
    }
    let s = s.replace('Z', "+00:00");
    let parsed = DateTime::parse_from_rfc3339(&s)
        .map_err(|_| ApiError::bad_request("invalid date format; use ISO8601"))?;
    Ok(parsed.with_timezone(&Utc))
}

fn parse_db_dt(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim().replace('Z', "+00:00");
    DateTime::parse_from_rfc3339(&s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

pub(crate) fn row_dt_opt(row: &PgRow, col: &str) -> Option<DateTime<Utc>> {
    row.try_get::<Option<String>, _>(col)
        .ok()
        .flatten()
        .and_then(|s| parse_db_dt(&s))
}

fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

fn make_in_clause(start_index: usize, n: usize) -> String {
    let mut parts = Vec::with_capacity(n);
    for i in 0..n {
        parts.push(format!("${}", start_index + i));
    }
    parts.join(",")
}

fn db_err(e: sqlx::Error, what: &str) -> ApiError {
    tracing::error!(error = %e, "db {what} failed");
    ApiError::internal("database error")
}

/// The booking lifecycle engine. Owns every booking/payment state
/// transition and the audit trail that documents them; constructed with an
/// explicitly injected pool, no ambient client.
#[derive(Clone)]
pub struct Lifecycle {
    pool: PgPool,
    db_schema: Option<String>,
}

impl Lifecycle {
    pub fn new(pool: PgPool, db_schema: Option<String>) -> Self {
        Self { pool, db_schema }
    }

    fn table(&self, name: &str) -> String {
        match &self.db_schema {
            Some(s) => format!("{s}.{name}"),
            None => name.to_string(),
        }
    }

    // ----- row mapping -------------------------------------------------

    fn booking_from_row(&self, row: &PgRow) -> BookingOut {
        BookingOut {
            id: row.try_get("id").unwrap_or_default(),
            user_id: row.try_get("user_id").unwrap_or_default(),
            pickup_location: row.try_get("pickup_location").unwrap_or_default(),
            drop_location: row.try_get("drop_location").unwrap_or_default(),
            scheduled_at: row_dt_opt(row, "scheduled_at"),
            distance_km: row.try_get("distance_km").unwrap_or(None),
            estimated_fare: row.try_get("estimated_fare").unwrap_or(None),
            total_amount: row.try_get("total_amount").unwrap_or(0.0),
            actual_km: row.try_get("actual_km").unwrap_or(None),
            extra_km: row.try_get("extra_km").unwrap_or(None),
            extra_charge: row.try_get("extra_charge").unwrap_or(None),
            car_model: row.try_get("car_model").unwrap_or(None),
            cancellation_reason: row.try_get("cancellation_reason").unwrap_or(None),
            taxi_assign_status: row.try_get("taxi_assign_status").unwrap_or(None),
            status: row
                .try_get("status")
                .unwrap_or_else(|_| PENDING_PAYMENT.to_string()),
            created_at: row_dt_opt(row, "created_at"),
            updated_at: row_dt_opt(row, "updated_at"),
            payments: Vec::new(),
            user: None,
            assignments: Vec::new(),
        }
    }

    fn payment_from_row(&self, row: &PgRow) -> PaymentOut {
        PaymentOut {
            id: row.try_get("id").unwrap_or_default(),
            booking_id: row.try_get("booking_id").unwrap_or_default(),
            amount: row.try_get("amount").unwrap_or(0.0),
            currency: row.try_get("currency").unwrap_or_else(|_| "INR".to_string()),
            status: row
                .try_get("status")
                .unwrap_or_else(|_| PAYMENT_PENDING.to_string()),
            provider: row.try_get("provider").unwrap_or(None),
            provider_txn_id: row.try_get("provider_txn_id").unwrap_or(None),
            remaining_amount: row.try_get("remaining_amount").unwrap_or(None),
            created_at: row_dt_opt(row, "created_at"),
        }
    }

    fn assignment_from_row(&self, row: &PgRow) -> AssignmentOut {
        AssignmentOut {
            id: row.try_get("id").unwrap_or_default(),
            booking_id: row.try_get("booking_id").unwrap_or_default(),
            driver_name: row.try_get("driver_name").unwrap_or_default(),
            driver_number: row.try_get("driver_number").unwrap_or_default(),
            cab_number: row.try_get("cab_number").unwrap_or_default(),
            cab_name: row.try_get("cab_name").unwrap_or_default(),
            created_at: row_dt_opt(row, "created_at"),
            updated_at: row_dt_opt(row, "updated_at"),
        }
    }

    fn user_from_row(&self, row: &PgRow) -> UserOut {
        UserOut {
            id: row.try_get("id").unwrap_or_default(),
            email: row.try_get("email").unwrap_or_default(),
            name: row.try_get("name").unwrap_or(None),
            phone: row.try_get("phone").unwrap_or(None),
            role: row
                .try_get("role")
                .unwrap_or_else(|_| "customer".to_string()),
        }
    }

    // ----- snapshot assembly -------------------------------------------

    /// Booking snapshot with payments and assignments attached; `with_user`
    /// joins in the owning user (needed by notification callers).
    pub async fn booking_snapshot(
        &self,
        booking_id: &str,
        with_user: bool,
    ) -> ApiResult<BookingOut> {
        let bookings = self.table("bookings");
        let sql = format!(
            "SELECT id,user_id,pickup_location,drop_location,scheduled_at,distance_km,estimated_fare,\
             total_amount,actual_km,extra_km,extra_charge,car_model,cancellation_reason,\
             taxi_assign_status,status,created_at,updated_at FROM {bookings} WHERE id=$1"
        );
        let row = sqlx::query(&sql)
            .bind(booking_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_err(e, "booking lookup"))?
            .ok_or_else(|| ApiError::not_found("booking not found"))?;
        let mut booking = self.booking_from_row(&row);

        let payments = self.table("payments");
        let sql = format!(
            "SELECT id,booking_id,amount,currency,status,provider,provider_txn_id,remaining_amount,created_at \
             FROM {payments} WHERE booking_id=$1 ORDER BY created_at ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(booking_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_err(e, "payments lookup"))?;
        booking.payments = rows.iter().map(|r| self.payment_from_row(r)).collect();

        let assignments = self.table("taxi_assignments");
        let sql = format!(
            "SELECT id,booking_id,driver_name,driver_number,cab_number,cab_name,created_at,updated_at \
             FROM {assignments} WHERE booking_id=$1"
        );
        let rows = sqlx::query(&sql)
            .bind(booking_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_err(e, "assignments lookup"))?;
        booking.assignments = rows.iter().map(|r| self.assignment_from_row(r)).collect();

        if with_user {
            let users = self.table("users");
            let sql = format!("SELECT id,email,name,phone,role FROM {users} WHERE id=$1");
            if let Some(row) = sqlx::query(&sql)
                .bind(&booking.user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_err(e, "booking user lookup"))?
            {
                booking.user = Some(self.user_from_row(&row));
            }
        }

        Ok(booking)
    }

    async fn fetch_payments_map(
        &self,
        booking_ids: &[String],
    ) -> ApiResult<HashMap<String, Vec<PaymentOut>>> {
        let mut out: HashMap<String, Vec<PaymentOut>> = HashMap::new();
        if booking_ids.is_empty() {
            return Ok(out);
        }
        let payments = self.table("payments");
        let sql = format!(
            "SELECT id,booking_id,amount,currency,status,provider,provider_txn_id,remaining_amount,created_at \
             FROM {payments} WHERE booking_id IN ({}) ORDER BY created_at ASC",
            make_in_clause(1, booking_ids.len())
        );
        let mut q = sqlx::query(&sql);
        for id in booking_ids {
            q = q.bind(id);
        }
        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_err(e, "payments map lookup"))?;
        for row in rows {
            let p = self.payment_from_row(&row);
            out.entry(p.booking_id.clone()).or_default().push(p);
        }
        Ok(out)
    }

    async fn fetch_assignments_map(
        &self,
        booking_ids: &[String],
    ) -> ApiResult<HashMap<String, Vec<AssignmentOut>>> {
        let mut out: HashMap<String, Vec<AssignmentOut>> = HashMap::new();
        if booking_ids.is_empty() {
            return Ok(out);
        }
        let assignments = self.table("taxi_assignments");
        let sql = format!(
            "SELECT id,booking_id,driver_name,driver_number,cab_number,cab_name,created_at,updated_at \
             FROM {assignments} WHERE booking_id IN ({})",
            make_in_clause(1, booking_ids.len())
        );
        let mut q = sqlx::query(&sql);
        for id in booking_ids {
            q = q.bind(id);
        }
        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_err(e, "assignments map lookup"))?;
        for row in rows {
            let a = self.assignment_from_row(&row);
            out.entry(a.booking_id.clone()).or_default().push(a);
        }
        Ok(out)
    }

    async fn fetch_users_map(&self, user_ids: &[String]) -> ApiResult<HashMap<String, UserOut>> {
        let mut out: HashMap<String, UserOut> = HashMap::new();
        if user_ids.is_empty() {
            return Ok(out);
        }
        let users = self.table("users");
        let sql = format!(
            "SELECT id,email,name,phone,role FROM {users} WHERE id IN ({})",
            make_in_clause(1, user_ids.len())
        );
        let mut q = sqlx::query(&sql);
        for id in user_ids {
            q = q.bind(id);
        }
        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_err(e, "users map lookup"))?;
        for row in rows {
            let u = self.user_from_row(&row);
            out.insert(u.id.clone(), u);
        }
        Ok(out)
    }

    async fn attach_related(&self, mut bookings: Vec<BookingOut>) -> ApiResult<Vec<BookingOut>> {
        let booking_ids: Vec<String> = bookings.iter().map(|b| b.id.clone()).collect();
        let mut user_ids: Vec<String> = bookings.iter().map(|b| b.user_id.clone()).collect();
        user_ids.sort();
        user_ids.dedup();

        let mut payments = self.fetch_payments_map(&booking_ids).await?;
        let mut assignments = self.fetch_assignments_map(&booking_ids).await?;
        let users = self.fetch_users_map(&user_ids).await?;

        for b in &mut bookings {
            b.payments = payments.remove(&b.id).unwrap_or_default();
            b.assignments = assignments.remove(&b.id).unwrap_or_default();
            b.user = users.get(&b.user_id).cloned();
        }
        Ok(bookings)
    }

    // ----- audit recorder ----------------------------------------------

    /// Append one immutable audit row inside the caller's transaction. Every
    /// admin-triggered mutation goes through here, in the same transaction
    /// as the mutation it documents.
    pub async fn append_audit(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        entity_type: &str,
        entity_id: &str,
        action: &str,
        old_value: Option<serde_json::Value>,
        new_value: Option<serde_json::Value>,
        admin_id: &str,
        reason: &str,
    ) -> ApiResult<()> {
        let audit = self.table("audit_log");
        let sql = format!(
            "INSERT INTO {audit} (id,entity_type,entity_id,action,old_value,new_value,admin_id,reason,created_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)"
        );
        sqlx::query(&sql)
            .bind(Uuid::new_v4().to_string())
            .bind(entity_type)
            .bind(entity_id)
            .bind(action)
            .bind(old_value.map(|v| v.to_string()))
            .bind(new_value.map(|v| v.to_string()))
            .bind(admin_id)
            .bind(reason)
            .bind(now_iso())
            .execute(&mut **tx)
            .await
            .map_err(|e| db_err(e, "audit insert"))?;
        Ok(())
    }

    // ----- booking creation --------------------------------------------

    /// Path A: payment already confirmed out of band (cash/manual flow).
    /// Booking lands directly in PAID; an optional payment payload is
    /// recorded in the same transaction.
    pub async fn create_booking_after_payment(
        &self,
        user_id: &str,
        input: BookingAfterPaymentIn,
    ) -> ApiResult<BookingOut> {
        if user_id.trim().is_empty() {
            return Err(ApiError::bad_request("user id is required"));
        }
        let pickup = input
            .pickup_location
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ApiError::bad_request("pickup_location and drop_location are required"))?;
        let drop = input
            .drop_location
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ApiError::bad_request("pickup_location and drop_location are required"))?;
        let total_amount = input
            .total_amount
            .filter(|v| *v > 0.0)
            .ok_or_else(|| ApiError::bad_request("total_amount is required"))?;
        let scheduled_at = match input.scheduled_at.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => Some(parse_iso8601(s)?),
            _ => None,
        };

        let bookings = self.table("bookings");
        let payments = self.table("payments");
        let booking_id = Uuid::new_v4().to_string();
        let now = now_iso();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_err(e, "begin tx"))?;

        let sql = format!(
            "INSERT INTO {bookings} \
             (id,user_id,pickup_location,drop_location,scheduled_at,distance_km,estimated_fare,\
              total_amount,car_model,status,created_at,updated_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)"
        );
        sqlx::query(&sql)
            .bind(&booking_id)
            .bind(user_id)
            .bind(pickup)
            .bind(drop)
            .bind(scheduled_at.map(|dt| dt.to_rfc3339()))
            .bind(input.distance_km)
            .bind(input.estimated_fare)
            .bind(total_amount)
            .bind(input.car_model.as_deref().map(str::trim).filter(|s| !s.is_empty()))
            .bind(PAID)
            .bind(&now)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err(e, "booking insert"))?;

        if let Some(payment) = input.payment {
            let sql = format!(
                "INSERT INTO {payments} \
                 (id,booking_id,amount,currency,status,provider,provider_txn_id,created_at) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8)"
            );
            sqlx::query(&sql)
                .bind(Uuid::new_v4().to_string())
                .bind(&booking_id)
                .bind(payment.amount.unwrap_or(total_amount))
                .bind(payment.currency.as_deref().unwrap_or("INR"))
                .bind(payment.status.as_deref().unwrap_or(PAYMENT_SUCCESS))
                .bind(payment.provider.as_deref().unwrap_or("unknown"))
                .bind(payment.provider_txn_id.as_deref())
                .bind(&now)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_err(e, "payment insert"))?;
        }

        tx.commit().await.map_err(|e| db_err(e, "commit tx"))?;

        self.booking_snapshot(&booking_id, false).await
    }

    /// Path B: gateway-first flow. Booking starts in PENDING_PAYMENT with
    /// one PENDING payment whose provider_txn_id holds the gateway order id
    /// until reconciliation overwrites it with the payment id.
    pub async fn create_booking_with_pending_payment(
        &self,
        user_id: &str,
        input: &CreateOrderIn,
        order_id: &str,
        provider: &str,
        payment_amount: Option<f64>,
    ) -> ApiResult<BookingOut> {
        if user_id.trim().is_empty() {
            return Err(ApiError::bad_request("user id is required"));
        }
        let pickup = input
            .pickup_location
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ApiError::bad_request("pickup_location and drop_location are required"))?;
        let drop = input
            .drop_location
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ApiError::bad_request("pickup_location and drop_location are required"))?;
        let total_amount = input
            .total_amount
            .ok_or_else(|| ApiError::bad_request("total_amount is required"))?;
        let scheduled_at = match input.scheduled_at.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => Some(parse_iso8601(s)?),
            _ => None,
        };

        let (paid_now, remaining) = remaining_after(total_amount, payment_amount);

        let bookings = self.table("bookings");
        let payments = self.table("payments");
        let booking_id = Uuid::new_v4().to_string();
        let now = now_iso();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_err(e, "begin tx"))?;

        let sql = format!(
            "INSERT INTO {bookings} \
             (id,user_id,pickup_location,drop_location,scheduled_at,distance_km,estimated_fare,\
              total_amount,car_model,status,created_at,updated_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)"
        );
        sqlx::query(&sql)
            .bind(&booking_id)
            .bind(user_id)
            .bind(pickup)
            .bind(drop)
            .bind(scheduled_at.map(|dt| dt.to_rfc3339()))
            .bind(input.distance_km)
            .bind(input.estimated_fare)
            .bind(total_amount)
            .bind(input.car_model.as_deref().map(str::trim).filter(|s| !s.is_empty()))
            .bind(PENDING_PAYMENT)
            .bind(&now)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err(e, "booking insert"))?;

        let sql = format!(
            "INSERT INTO {payments} \
             (id,booking_id,amount,currency,status,provider,provider_txn_id,remaining_amount,created_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)"
        );
        sqlx::query(&sql)
            .bind(Uuid::new_v4().to_string())
            .bind(&booking_id)
            .bind(paid_now)
            .bind(&input.currency)
            .bind(PAYMENT_PENDING)
            .bind(provider)
            .bind(order_id)
            .bind(remaining)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err(e, "payment insert"))?;

        tx.commit().await.map_err(|e| db_err(e, "commit tx"))?;

        self.booking_snapshot(&booking_id, false).await
    }

    // ----- payment reconciliation --------------------------------------

    /// Reconcile a gateway payment-success callback (already authenticated
    /// by the caller). Looks up the unique PENDING payment for the order id,
    /// so a replayed callback finds nothing and fails with not-found.
    pub async fn reconcile_payment_success(
        &self,
        order_id: &str,
        gateway_payment_id: &str,
    ) -> ApiResult<BookingOut> {
        let order_id = order_id.trim();
        let gateway_payment_id = gateway_payment_id.trim();
        if order_id.is_empty() || gateway_payment_id.is_empty() {
            return Err(ApiError::bad_request("order_id and payment_id are required"));
        }

        let payments = self.table("payments");
        let bookings = self.table("bookings");

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_err(e, "begin tx"))?;

        let sql = format!(
            "SELECT id,booking_id,remaining_amount FROM {payments} \
             WHERE provider_txn_id=$1 AND status=$2 FOR UPDATE"
        );
        let row = sqlx::query(&sql)
            .bind(order_id)
            .bind(PAYMENT_PENDING)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| db_err(e, "pending payment lookup"))?
            .ok_or_else(|| ApiError::not_found("payment record not found"))?;

        let payment_id: String = row.try_get("id").unwrap_or_default();
        let booking_id: String = row.try_get("booking_id").unwrap_or_default();
        let remaining: Option<f64> = row.try_get("remaining_amount").unwrap_or(None);
        let is_full_payment = remaining.map(|r| r == 0.0).unwrap_or(true);

        let sql = format!("UPDATE {payments} SET status=$1, provider_txn_id=$2 WHERE id=$3");
        sqlx::query(&sql)
            .bind(PAYMENT_SUCCESS)
            .bind(gateway_payment_id)
            .bind(&payment_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err(e, "payment update"))?;

        if is_full_payment {
            let sql = format!("UPDATE {bookings} SET status=$1, updated_at=$2 WHERE id=$3");
            sqlx::query(&sql)
                .bind(PAID)
                .bind(now_iso())
                .bind(&booking_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_err(e, "booking update"))?;
        }

        tx.commit().await.map_err(|e| db_err(e, "commit tx"))?;

        // Re-read with payments + owning user for the notification step.
        self.booking_snapshot(&booking_id, true).await
    }

    // ----- admin status transition -------------------------------------

    pub async fn update_booking_status(
        &self,
        booking_id: &str,
        new_status: &str,
        admin_id: &str,
        reason: Option<&str>,
    ) -> ApiResult<BookingOut> {
        let new_status = new_status.trim();
        if new_status.is_empty() {
            return Err(ApiError::bad_request("status is required"));
        }

        let bookings = self.table("bookings");
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_err(e, "begin tx"))?;

        let sql = format!("SELECT status FROM {bookings} WHERE id=$1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(booking_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| db_err(e, "booking lookup"))?
            .ok_or_else(|| ApiError::not_found("booking not found"))?;
        let old_status: String = row
            .try_get("status")
            .unwrap_or_else(|_| PENDING_PAYMENT.to_string());

        if !allowed_transitions(&old_status).contains(&new_status) {
            return Err(ApiError::invalid_transition(&old_status, new_status));
        }

        let sql = format!("UPDATE {bookings} SET status=$1, updated_at=$2 WHERE id=$3");
        sqlx::query(&sql)
            .bind(new_status)
            .bind(now_iso())
            .bind(booking_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err(e, "booking status update"))?;

        let default_reason = format!("status changed from {old_status} to {new_status}");
        self.append_audit(
            &mut tx,
            ENTITY_BOOKING,
            booking_id,
            ACTION_STATUS_CHANGE,
            Some(serde_json::json!({ "status": old_status })),
            Some(serde_json::json!({ "status": new_status })),
            admin_id,
            reason
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(&default_reason),
        )
        .await?;

        tx.commit().await.map_err(|e| db_err(e, "commit tx"))?;

        self.booking_snapshot(booking_id, false).await
    }

    // ----- trip completion ---------------------------------------------

    pub async fn complete_trip(
        &self,
        booking_id: &str,
        input: &CompleteTripIn,
        admin_id: &str,
    ) -> ApiResult<(BookingOut, AdjustmentsOut)> {
        let bookings = self.table("bookings");
        let adjustments_table = self.table("fare_adjustments");

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_err(e, "begin tx"))?;

        let sql = format!(
            "SELECT status,distance_km,total_amount FROM {bookings} WHERE id=$1 FOR UPDATE"
        );
        let row = sqlx::query(&sql)
            .bind(booking_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| db_err(e, "booking lookup"))?
            .ok_or_else(|| ApiError::not_found("booking not found"))?;
        let old_status: String = row
            .try_get("status")
            .unwrap_or_else(|_| PENDING_PAYMENT.to_string());
        if old_status != IN_PROGRESS && old_status != PAID {
            return Err(ApiError::invalid_state(
                "trip must be in progress or paid to complete",
            ));
        }
        let estimated_km: f64 = row.try_get::<Option<f64>, _>("distance_km").unwrap_or(None).unwrap_or(0.0);
        let old_total: f64 = row.try_get("total_amount").unwrap_or(0.0);

        let breakdown = fare_breakdown(
            estimated_km,
            input.actual_km,
            input.rate_per_km,
            input.toll_charges,
            input.waiting_charges,
            old_total,
        );
        let actual_km = input.actual_km.unwrap_or(estimated_km);
        let rate = input.rate_per_km.unwrap_or(DEFAULT_RATE_PER_KM);

        // distance_km keeps the original estimate; the measured value goes
        // to actual_km.
        let sql = format!(
            "UPDATE {bookings} SET status=$1, total_amount=$2, actual_km=$3, extra_km=$4, \
             extra_charge=$5, updated_at=$6 WHERE id=$7"
        );
        sqlx::query(&sql)
            .bind(COMPLETED)
            .bind(breakdown.new_total)
            .bind(actual_km)
            .bind(breakdown.extra_km)
            .bind(breakdown.total_adjustments)
            .bind(now_iso())
            .bind(booking_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err(e, "booking completion update"))?;

        let mut rows: Vec<(&str, f64, String)> = Vec::new();
        if breakdown.extra_km_charge > 0.0 {
            rows.push((
                "EXTRA_KM",
                breakdown.extra_km_charge,
                format!("Extra {:.1} km @ ₹{rate}/km", breakdown.extra_km),
            ));
        }
        if breakdown.toll_charges > 0.0 {
            rows.push(("TOLL", breakdown.toll_charges, "Toll charges".to_string()));
        }
        if breakdown.waiting_charges > 0.0 {
            rows.push((
                "WAITING",
                breakdown.waiting_charges,
                "Waiting charges".to_string(),
            ));
        }
        for (kind, amount, description) in rows {
            let sql = format!(
                "INSERT INTO {adjustments_table} (id,booking_id,kind,amount,description,admin_id,created_at) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7)"
            );
            sqlx::query(&sql)
                .bind(Uuid::new_v4().to_string())
                .bind(booking_id)
                .bind(kind)
                .bind(amount)
                .bind(description)
                .bind(admin_id)
                .bind(now_iso())
                .execute(&mut *tx)
                .await
                .map_err(|e| db_err(e, "fare adjustment insert"))?;
        }

        self.append_audit(
            &mut tx,
            ENTITY_BOOKING,
            booking_id,
            ACTION_STATUS_CHANGE,
            Some(serde_json::json!({ "status": old_status, "total_amount": old_total })),
            Some(serde_json::json!({
                "status": COMPLETED,
                "total_amount": breakdown.new_total,
                "adjustments": breakdown.total_adjustments,
            })),
            admin_id,
            input
                .notes
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or("Trip completed with fare adjustment"),
        )
        .await?;

        tx.commit().await.map_err(|e| db_err(e, "commit tx"))?;

        let booking = self.booking_snapshot(booking_id, false).await?;
        Ok((booking, breakdown))
    }

    // ----- cancellation ------------------------------------------------

    pub async fn cancel_booking(
        &self,
        booking_id: &str,
        reason: &str,
        admin_id: &str,
    ) -> ApiResult<BookingOut> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ApiError::bad_request("cancellation reason is required"));
        }

        let bookings = self.table("bookings");
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_err(e, "begin tx"))?;

        let sql = format!("SELECT status FROM {bookings} WHERE id=$1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(booking_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| db_err(e, "booking lookup"))?
            .ok_or_else(|| ApiError::not_found("booking not found"))?;
        let old_status: String = row
            .try_get("status")
            .unwrap_or_else(|_| PENDING_PAYMENT.to_string());
        if is_terminal(&old_status) {
            return Err(ApiError::invalid_state(format!(
                "cannot cancel a {old_status} booking"
            )));
        }

        let sql = format!(
            "UPDATE {bookings} SET status=$1, cancellation_reason=$2, updated_at=$3 WHERE id=$4"
        );
        sqlx::query(&sql)
            .bind(CANCELLED)
            .bind(reason)
            .bind(now_iso())
            .bind(booking_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err(e, "booking cancel update"))?;

        self.append_audit(
            &mut tx,
            ENTITY_BOOKING,
            booking_id,
            ACTION_CANCEL,
            Some(serde_json::json!({ "status": old_status })),
            Some(serde_json::json!({ "status": CANCELLED })),
            admin_id,
            reason,
        )
        .await?;

        tx.commit().await.map_err(|e| db_err(e, "commit tx"))?;

        self.booking_snapshot(booking_id, false).await
    }

    // ----- taxi assignment ---------------------------------------------

    /// Upsert the assignment for a booking (one live row per booking,
    /// explicit lookup-then-branch), then attempt customer and driver
    /// notifications in that order. Only when both deliveries succeed does
    /// the booking flip to ASSIGNED / IN_PROGRESS; otherwise the assignment
    /// stays persisted and the caller gets a partial-success error.
    pub async fn assign_taxi(
        &self,
        notifier: &Notifier,
        booking_id: &str,
        input: &AssignTaxiIn,
    ) -> ApiResult<AssignmentOut> {
        let driver_name = required_field(input.driver_name.as_deref(), "driver_name")?;
        let driver_number = required_field(input.driver_number.as_deref(), "driver_number")?;
        let cab_number = required_field(input.cab_number.as_deref(), "cab_number")?;
        let cab_name = required_field(input.cab_name.as_deref(), "cab_name")?;

        let booking = self.booking_snapshot(booking_id, true).await?;

        let assignments = self.table("taxi_assignments");
        let now = now_iso();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_err(e, "begin tx"))?;

        let sql = format!("SELECT id FROM {assignments} WHERE booking_id=$1 FOR UPDATE");
        let existing = sqlx::query(&sql)
            .bind(booking_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| db_err(e, "assignment lookup"))?;

        let assignment_id = match existing {
            Some(row) => {
                let id: String = row.try_get("id").unwrap_or_default();
                let sql = format!(
                    "UPDATE {assignments} SET driver_name=$1, driver_number=$2, cab_number=$3, \
                     cab_name=$4, updated_at=$5 WHERE id=$6"
                );
                sqlx::query(&sql)
                    .bind(&driver_name)
                    .bind(&driver_number)
                    .bind(&cab_number)
                    .bind(&cab_name)
                    .bind(&now)
                    .bind(&id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| db_err(e, "assignment update"))?;
                id
            }
            None => {
                let id = Uuid::new_v4().to_string();
                let sql = format!(
                    "INSERT INTO {assignments} \
                     (id,booking_id,driver_name,driver_number,cab_number,cab_name,created_at,updated_at) \
                     VALUES ($1,$2,$3,$4,$5,$6,$7,$8)"
                );
                sqlx::query(&sql)
                    .bind(&id)
                    .bind(booking_id)
                    .bind(&driver_name)
                    .bind(&driver_number)
                    .bind(&cab_number)
                    .bind(&cab_name)
                    .bind(&now)
                    .bind(&now)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| db_err(e, "assignment insert"))?;
                id
            }
        };

        tx.commit().await.map_err(|e| db_err(e, "commit tx"))?;

        let assignment = AssignmentOut {
            id: assignment_id,
            booking_id: booking_id.to_string(),
            driver_name,
            driver_number,
            cab_number,
            cab_name,
            created_at: parse_db_dt(&now),
            updated_at: parse_db_dt(&now),
        };

        // Customer first, then driver; both are awaited because delivery
        // gates the status flip below.
        let customer_phone = booking
            .user
            .as_ref()
            .and_then(|u| u.phone.clone())
            .unwrap_or_default();
        let notify_result = async {
            notifier
                .send_taxi_assignment(&customer_phone, &booking, &assignment)
                .await?;
            notifier
                .send_driver_assignment(&assignment.driver_number, &booking)
                .await
        }
        .await;

        if let Err(e) = notify_result {
            tracing::error!(
                error = %e.detail,
                booking_id = %booking_id,
                "assignment notifications failed; booking status left unchanged"
            );
            return Err(ApiError::partial_success(
                "taxi assignment saved, but notification messages could not be sent",
            ));
        }

        let bookings = self.table("bookings");
        let sql = format!(
            "UPDATE {bookings} SET taxi_assign_status=$1, status=$2, updated_at=$3 WHERE id=$4"
        );
        sqlx::query(&sql)
            .bind(ASSIGN_ASSIGNED)
            .bind(IN_PROGRESS)
            .bind(now_iso())
            .bind(booking_id)
            .execute(&self.pool)
            .await
            .map_err(|e| db_err(e, "assignment status flip"))?;

        Ok(assignment)
    }

    // ----- booking notes -----------------------------------------------

    pub async fn add_note(
        &self,
        booking_id: &str,
        admin_id: &str,
        content: &str,
    ) -> ApiResult<NoteOut> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ApiError::bad_request("note content is required"));
        }
        // Notes have no status effect, but must reference a live booking.
        let _ = self.booking_snapshot(booking_id, false).await?;

        let notes = self.table("booking_notes");
        let id = Uuid::new_v4().to_string();
        let now = now_iso();
        let sql = format!(
            "INSERT INTO {notes} (id,booking_id,admin_id,content,created_at) VALUES ($1,$2,$3,$4,$5)"
        );
        sqlx::query(&sql)
            .bind(&id)
            .bind(booking_id)
            .bind(admin_id)
            .bind(content)
            .bind(&now)
            .execute(&self.pool)
            .await
            .map_err(|e| db_err(e, "note insert"))?;

        Ok(NoteOut {
            id,
            booking_id: booking_id.to_string(),
            admin_id: Some(admin_id.to_string()),
            content: content.to_string(),
            created_at: parse_db_dt(&now),
        })
    }

    pub async fn list_notes(&self, booking_id: &str) -> ApiResult<Vec<NoteOut>> {
        let notes = self.table("booking_notes");
        let sql = format!(
            "SELECT id,booking_id,admin_id,content,created_at FROM {notes} \
             WHERE booking_id=$1 ORDER BY created_at DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(booking_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_err(e, "notes lookup"))?;
        Ok(rows
            .into_iter()
            .map(|row| NoteOut {
                id: row.try_get("id").unwrap_or_default(),
                booking_id: row.try_get("booking_id").unwrap_or_default(),
                admin_id: row.try_get("admin_id").unwrap_or(None),
                content: row.try_get("content").unwrap_or_default(),
                created_at: row_dt_opt(&row, "created_at"),
            })
            .collect())
    }

    // ----- admin views -------------------------------------------------

    pub async fn list_bookings(&self) -> ApiResult<Vec<BookingOut>> {
        let bookings = self.table("bookings");
        let sql = format!(
            "SELECT id,user_id,pickup_location,drop_location,scheduled_at,distance_km,estimated_fare,\
             total_amount,actual_km,extra_km,extra_charge,car_model,cancellation_reason,\
             taxi_assign_status,status,created_at,updated_at FROM {bookings} ORDER BY created_at DESC"
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_err(e, "bookings list"))?;
        let list = rows.iter().map(|r| self.booking_from_row(r)).collect();
        self.attach_related(list).await
    }

    pub async fn list_bookings_by_status(&self, status: &str) -> ApiResult<Vec<BookingOut>> {
        let bookings = self.table("bookings");
        let sql = format!(
            "SELECT id,user_id,pickup_location,drop_location,scheduled_at,distance_km,estimated_fare,\
             total_amount,actual_km,extra_km,extra_charge,car_model,cancellation_reason,\
             taxi_assign_status,status,created_at,updated_at FROM {bookings} \
             WHERE status=$1 ORDER BY updated_at DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(status)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_err(e, "bookings by status list"))?;
        let list = rows.iter().map(|r| self.booking_from_row(r)).collect();
        self.attach_related(list).await
    }

    /// Gateway orders that were created but never reconciled.
    pub async fn list_pending_payment_bookings(&self) -> ApiResult<Vec<BookingOut>> {
        let bookings = self.table("bookings");
        let payments = self.table("payments");
        let sql = format!(
            "SELECT DISTINCT b.id,b.user_id,b.pickup_location,b.drop_location,b.scheduled_at,\
             b.distance_km,b.estimated_fare,b.total_amount,b.actual_km,b.extra_km,b.extra_charge,\
             b.car_model,b.cancellation_reason,b.taxi_assign_status,b.status,b.created_at,b.updated_at \
             FROM {bookings} b JOIN {payments} p ON p.booking_id = b.id \
             WHERE b.status=$1 AND p.status IN ($2,$3) ORDER BY b.created_at DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(PENDING_PAYMENT)
            .bind(PAYMENT_CREATED)
            .bind(PAYMENT_PENDING)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_err(e, "pending payments list"))?;
        let list = rows.iter().map(|r| self.booking_from_row(r)).collect();
        self.attach_related(list).await
    }

    pub async fn list_user_bookings(&self, user_id: &str) -> ApiResult<Vec<BookingOut>> {
        let bookings = self.table("bookings");
        let sql = format!(
            "SELECT id,user_id,pickup_location,drop_location,scheduled_at,distance_km,estimated_fare,\
             total_amount,actual_km,extra_km,extra_charge,car_model,cancellation_reason,\
             taxi_assign_status,status,created_at,updated_at FROM {bookings} \
             WHERE user_id=$1 ORDER BY created_at DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_err(e, "user bookings list"))?;
        let booking_ids: Vec<String> = rows
            .iter()
            .map(|r| r.try_get("id").unwrap_or_default())
            .collect();
        let mut payments = self.fetch_payments_map(&booking_ids).await?;
        let mut list: Vec<BookingOut> = rows.iter().map(|r| self.booking_from_row(r)).collect();
        for b in &mut list {
            b.payments = payments.remove(&b.id).unwrap_or_default();
        }
        Ok(list)
    }

    // ----- maintenance -------------------------------------------------

    /// The only physical delete path: wipe all booking data in dependency
    /// order, one transaction, and report per-table counts.
    pub async fn clean_booking_data(&self) -> ApiResult<CleanupOut> {
        let adjustments = self.table("fare_adjustments");
        let notes = self.table("booking_notes");
        let audit = self.table("audit_log");
        let assignments = self.table("taxi_assignments");
        let payments = self.table("payments");
        let bookings = self.table("bookings");

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_err(e, "begin tx"))?;

        let adj = sqlx::query(&format!("DELETE FROM {adjustments}"))
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err(e, "fare adjustments delete"))?
            .rows_affected();
        let nts = sqlx::query(&format!("DELETE FROM {notes}"))
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err(e, "booking notes delete"))?
            .rows_affected();
        let aud = sqlx::query(&format!("DELETE FROM {audit} WHERE entity_type=$1"))
            .bind(ENTITY_BOOKING)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err(e, "audit delete"))?
            .rows_affected();
        let asg = sqlx::query(&format!("DELETE FROM {assignments}"))
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err(e, "assignments delete"))?
            .rows_affected();
        let pay = sqlx::query(&format!("DELETE FROM {payments}"))
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err(e, "payments delete"))?
            .rows_affected();
        let bkg = sqlx::query(&format!("DELETE FROM {bookings}"))
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err(e, "bookings delete"))?
            .rows_affected();

        tx.commit().await.map_err(|e| db_err(e, "commit tx"))?;

        Ok(CleanupOut {
            fare_adjustments: adj,
            booking_notes: nts,
            audit_logs: aud,
            taxi_assignments: asg,
            payments: pay,
            bookings: bkg,
        })
    }
}

fn required_field(value: Option<&str>, field: &str) -> ApiResult<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .ok_or_else(|| ApiError::bad_request(format!("{field} is required")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn transition_table_matches_lifecycle() {
        assert_eq!(
            allowed_transitions(PENDING_PAYMENT).to_vec(),
            vec![PAID, CANCELLED]
        );
        assert_eq!(
            allowed_transitions(PAID).to_vec(),
            vec![IN_PROGRESS, CANCELLED]
        );
        assert_eq!(
            allowed_transitions(IN_PROGRESS).to_vec(),
            vec![COMPLETED, CANCELLED]
        );
        assert!(allowed_transitions(COMPLETED).is_empty());
        assert!(allowed_transitions(CANCELLED).is_empty());
        assert!(allowed_transitions("nonsense").is_empty());
    }

    #[test]
    fn backwards_transitions_are_rejected() {
        assert!(!allowed_transitions(IN_PROGRESS).contains(&PENDING_PAYMENT));
        assert!(!allowed_transitions(PAID).contains(&PENDING_PAYMENT));
        assert!(!allowed_transitions(PENDING_PAYMENT).contains(&COMPLETED));
    }

    #[test]
    fn terminal_states_have_no_exit() {
        assert!(is_terminal(COMPLETED));
        assert!(is_terminal(CANCELLED));
        assert!(!is_terminal(PAID));
        assert!(!is_terminal(IN_PROGRESS));
        assert!(!is_terminal(PENDING_PAYMENT));
    }

    #[test]
    fn fare_breakdown_bills_only_distance_beyond_estimate() {
        // estimated 10 km, drove 13 km at ₹15/km plus ₹50 toll
        let b = fare_breakdown(10.0, Some(13.0), Some(15.0), Some(50.0), None, 500.0);
        assert_eq!(b.extra_km, 3.0);
        assert_eq!(b.extra_km_charge, 45.0);
        assert_eq!(b.toll_charges, 50.0);
        assert_eq!(b.waiting_charges, 0.0);
        assert_eq!(b.total_adjustments, 95.0);
        assert_eq!(b.new_total, 595.0);
    }

    #[test]
    fn fare_breakdown_never_credits_short_trips() {
        let b = fare_breakdown(10.0, Some(7.0), Some(15.0), None, None, 500.0);
        assert_eq!(b.extra_km, 0.0);
        assert_eq!(b.extra_km_charge, 0.0);
        assert_eq!(b.new_total, 500.0);
    }

    #[test]
    fn fare_breakdown_defaults() {
        // No actual distance reported: assume the estimate; default rate 12.
        let b = fare_breakdown(10.0, None, None, None, None, 300.0);
        assert_eq!(b.extra_km, 0.0);
        assert_eq!(b.new_total, 300.0);

        let b = fare_breakdown(10.0, Some(12.0), None, None, Some(30.0), 300.0);
        assert_eq!(b.extra_km_charge, 24.0);
        assert_eq!(b.waiting_charges, 30.0);
        assert_eq!(b.new_total, 354.0);
    }

    #[test]
    fn remaining_amount_supports_partial_payment() {
        assert_eq!(remaining_after(500.0, None), (500.0, 0.0));
        assert_eq!(remaining_after(500.0, Some(500.0)), (500.0, 0.0));
        assert_eq!(remaining_after(500.0, Some(200.0)), (200.0, 300.0));
        // Overpayment never goes negative.
        assert_eq!(remaining_after(500.0, Some(600.0)), (600.0, 0.0));
    }

    #[test]
    fn extra_km_description_is_human_readable() {
        let b = fare_breakdown(10.0, Some(13.2), Some(12.0), None, None, 500.0);
        let description = format!("Extra {:.1} km @ ₹{}/km", b.extra_km, 12.0);
        assert_eq!(description, "Extra 3.2 km @ ₹12/km");
    }

    #[test]
    fn iso8601_parsing_accepts_z_suffix() {
        assert!(parse_iso8601("2026-08-06T10:30:00Z").is_ok());
        assert!(parse_iso8601("2026-08-06T10:30:00+05:30").is_ok());
        let err = parse_iso8601("tomorrow at noon").expect_err("must reject");
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[test]
    fn in_clause_numbers_placeholders_from_start_index() {
        assert_eq!(make_in_clause(1, 3), "$1,$2,$3");
        assert_eq!(make_in_clause(4, 2), "$4,$5");
    }
}
