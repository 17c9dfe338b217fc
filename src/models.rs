use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct RegisterIn {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginIn {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
pub struct UserOut {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct AuthOut {
    pub user: UserOut,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordIn {
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ForgotPasswordOut {
    pub reset_id: String,
    pub expires_at: DateTime<Utc>,
    pub expires_in: i64,
    pub destination: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordIn {
    pub reset_id: Option<String>,
    pub otp: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentPayloadIn {
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub status: Option<String>,
    pub provider: Option<String>,
    pub provider_txn_id: Option<String>,
}

/// Path A: booking created with payment already confirmed (cash/manual flow).
#[derive(Debug, Deserialize)]
pub struct BookingAfterPaymentIn {
    pub pickup_location: Option<String>,
    pub drop_location: Option<String>,
    pub scheduled_at: Option<String>,
    pub distance_km: Option<f64>,
    pub estimated_fare: Option<f64>,
    pub total_amount: Option<f64>,
    pub car_model: Option<String>,
    pub payment: Option<PaymentPayloadIn>,
}

/// Path B: gateway-first flow. `amount` is what gets charged now and may be
/// less than `total_amount` (partial payment); it defaults to the total.
#[derive(Debug, Deserialize)]
pub struct CreateOrderIn {
    pub amount: Option<f64>,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub pickup_location: Option<String>,
    pub drop_location: Option<String>,
    pub scheduled_at: Option<String>,
    pub distance_km: Option<f64>,
    pub estimated_fare: Option<f64>,
    pub total_amount: Option<f64>,
    pub car_model: Option<String>,
}

fn default_currency() -> String {
    "INR".to_string()
}

#[derive(Debug, Serialize)]
pub struct CreateOrderOut {
    pub key_id: String,
    pub order_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub booking_id: String,
    pub payment_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyPaymentIn {
    pub order_id: Option<String>,
    pub payment_id: Option<String>,
    pub signature: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
pub struct PaymentOut {
    pub id: String,
    pub booking_id: String,
    pub amount: f64,
    pub currency: String,
    pub status: String,
    pub provider: Option<String>,
    pub provider_txn_id: Option<String>,
    pub remaining_amount: Option<f64>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Clone)]
pub struct AssignmentOut {
    pub id: String,
    pub booking_id: String,
    pub driver_name: String,
    pub driver_number: String,
    pub cab_number: String,
    pub cab_name: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Clone)]
pub struct BookingOut {
    pub id: String,
    pub user_id: String,
    pub pickup_location: String,
    pub drop_location: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub distance_km: Option<f64>,
    pub estimated_fare: Option<f64>,
    pub total_amount: f64,
    pub actual_km: Option<f64>,
    pub extra_km: Option<f64>,
    pub extra_charge: Option<f64>,
    pub car_model: Option<String>,
    pub cancellation_reason: Option<String>,
    pub taxi_assign_status: Option<String>,
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub payments: Vec<PaymentOut>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserOut>,
    pub assignments: Vec<AssignmentOut>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateIn {
    pub status: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CompleteTripIn {
    pub actual_km: Option<f64>,
    pub rate_per_km: Option<f64>,
    pub toll_charges: Option<f64>,
    pub waiting_charges: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
pub struct AdjustmentsOut {
    pub extra_km: f64,
    pub extra_km_charge: f64,
    pub toll_charges: f64,
    pub waiting_charges: f64,
    pub total_adjustments: f64,
    pub new_total: f64,
}

#[derive(Debug, Serialize)]
pub struct CompleteTripOut {
    pub booking: BookingOut,
    pub adjustments: AdjustmentsOut,
}

#[derive(Debug, Deserialize)]
pub struct CancelBookingIn {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssignTaxiIn {
    pub driver_name: Option<String>,
    pub driver_number: Option<String>,
    pub cab_number: Option<String>,
    pub cab_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AssignTaxiOut {
    pub assignment: AssignmentOut,
}

#[derive(Debug, Deserialize)]
pub struct NoteIn {
    pub content: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
pub struct NoteOut {
    pub id: String,
    pub booking_id: String,
    pub admin_id: Option<String>,
    pub content: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct FleetVehicleIn {
    pub name: Option<String>,
    pub seats: Option<i32>,
    pub base_price_per_km: Option<f64>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, Clone)]
pub struct FleetVehicleOut {
    pub id: String,
    pub name: String,
    pub seats: i32,
    pub base_price_per_km: f64,
    pub category: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Serialize)]
pub struct CleanupOut {
    pub fare_adjustments: u64,
    pub booking_notes: u64,
    pub audit_logs: u64,
    pub taxi_assignments: u64,
    pub payments: u64,
    pub bookings: u64,
}
