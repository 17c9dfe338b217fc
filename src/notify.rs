use crate::error::ApiError;
use crate::models::{AssignmentOut, BookingOut};
use chrono::FixedOffset;
use reqwest::Client;

/// Outbound WhatsApp-style messaging through a configured HTTP provider.
/// When no provider is configured every send becomes a logged no-op, so a
/// dev environment never blocks on messaging.
#[derive(Clone)]
pub struct Notifier {
    base_url: Option<String>,
    from: Option<String>,
    token: Option<String>,
    http: Client,
}

/// Normalize a stored phone number to the provider's `whatsapp:+E164` form.
/// Bare 10-digit numbers are assumed to be Indian mobiles (+91).
pub fn format_whatsapp_number(phone: &str) -> Option<String> {
    let trimmed = phone.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.to_ascii_lowercase().starts_with("whatsapp:") {
        return Some(trimmed.to_string());
    }
    if trimmed.starts_with('+') {
        return Some(format!("whatsapp:{trimmed}"));
    }
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    if digits.len() == 10 {
        return Some(format!("whatsapp:+91{digits}"));
    }
    Some(format!("whatsapp:+{digits}"))
}

fn pickup_time_text(booking: &BookingOut) -> String {
    // Customer-facing times are rendered in IST.
    let ist = FixedOffset::east_opt(5 * 3600 + 1800).expect("fixed offset");
    match booking.scheduled_at {
        Some(at) => at.with_timezone(&ist).format("%d/%m/%Y %H:%M").to_string(),
        None => "ASAP".to_string(),
    }
}

fn amount_paid(booking: &BookingOut) -> f64 {
    booking
        .payments
        .iter()
        .filter(|p| p.status == "SUCCESS" || p.status == "PAID")
        .map(|p| p.amount)
        .sum()
}

pub fn booking_confirmation_message(booking: &BookingOut) -> String {
    let name = booking
        .user
        .as_ref()
        .and_then(|u| u.name.as_deref())
        .unwrap_or("Customer");
    let total = booking.total_amount;
    let paid = booking
        .payments
        .first()
        .map(|p| p.amount)
        .unwrap_or(total);
    let remaining = (total - paid).max(0.0);

    format!(
        "Hi {name}, 👋\n\n\
         Your Urban Cabz booking #{id} is *confirmed*.\n\n\
         🚖 Trip: {pickup} ➜ {drop}\n\
         🕒 Pickup: {when}\n\n\
         💰 Invoice Summary\n\
         • Total Fare: ₹{total:.2}\n\
         • Paid Now: ₹{paid:.2}\n\
         • Remaining: ₹{remaining:.2}\n\n\
         A cab will be assigned shortly. You will receive driver & vehicle details soon.\n\n\
         Thank you for riding with Urban Cabz!",
        id = booking.id,
        pickup = booking.pickup_location,
        drop = booking.drop_location,
        when = pickup_time_text(booking),
    )
}

pub fn taxi_assignment_message(booking: &BookingOut, assignment: &AssignmentOut) -> String {
    format!(
        "*Urban Cabz Booking Confirmation* 🚖\n\
         Booking ID: #{id}\n\
         Trip: {pickup} ➜ {drop}\n\
         ------------------\n\
         Vehicle: {cab_name} ({cab_number})\n\
         Driver: {driver_name} ({driver_number})\n\
         ------------------\n\
         Thank you for choosing Urban Cabz!",
        id = booking.id,
        pickup = booking.pickup_location,
        drop = booking.drop_location,
        cab_name = assignment.cab_name,
        cab_number = assignment.cab_number,
        driver_name = assignment.driver_name,
        driver_number = assignment.driver_number,
    )
}

pub fn driver_assignment_message(booking: &BookingOut) -> String {
    let due = (booking.total_amount - amount_paid(booking)).max(0.0);
    let customer_name = booking
        .user
        .as_ref()
        .and_then(|u| u.name.as_deref())
        .unwrap_or("Customer");
    let customer_phone = booking
        .user
        .as_ref()
        .and_then(|u| u.phone.as_deref())
        .unwrap_or("-");

    format!(
        "*New Trip Assignment* 🚨\n\
         Booking ID: #{id}\n\
         Customer: {customer_name} ({customer_phone})\n\
         From: {pickup}\n\
         To: {drop}\n\
         Fare to Collect: ₹{due:.2}\n\
         ------------------\n\
         Please contact the customer for pickup.",
        id = booking.id,
        pickup = booking.pickup_location,
        drop = booking.drop_location,
    )
}

pub fn password_reset_otp_message(otp: &str, ttl_minutes: i64) -> String {
    let minutes_text = if ttl_minutes == 1 {
        "1 minute".to_string()
    } else {
        format!("{ttl_minutes} minutes")
    };
    format!(
        "Urban Cabz password reset request.\n\n\
         OTP: *{otp}*\n\
         Valid for {minutes_text}.\n\n\
         Do not share this code with anyone.",
    )
}

impl Notifier {
    pub fn new(
        base_url: Option<String>,
        from: Option<String>,
        token: Option<String>,
        http: Client,
    ) -> Self {
        Self {
            base_url,
            from,
            token,
            http,
        }
    }

    pub fn enabled(&self) -> bool {
        self.base_url.as_deref().unwrap_or("").trim() != ""
    }

    /// Deliver one message. A missing provider or an unusable destination is
    /// a logged no-op (matching the provider-less dev setup); an actual
    /// delivery failure is an error so callers that gate on delivery
    /// (taxi assignment) can react.
    pub async fn send(&self, to_phone: &str, body: &str) -> Result<(), ApiError> {
        let Some(base) = self.base_url.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
            tracing::warn!("notification provider not configured; skipping send");
            return Ok(());
        };
        let Some(from) = self.from.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
            tracing::warn!("NOTIFY_WHATSAPP_FROM not set; skipping send");
            return Ok(());
        };
        let Some(to) = format_whatsapp_number(to_phone) else {
            tracing::warn!("unable to format destination phone; skipping send");
            return Ok(());
        };

        let url = format!("{}/messages", base.trim_end_matches('/'));
        let mut req = self.http.post(url).json(&serde_json::json!({
            "from": from,
            "to": to,
            "body": body,
        }));
        if let Some(token) = self.token.as_deref() {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.map_err(|e| {
            tracing::error!(error = %e, "notification http error");
            ApiError::upstream("notification delivery failed")
        })?;
        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            tracing::error!(status = %status, detail = %detail, "notification provider rejected message");
            return Err(ApiError::upstream("notification delivery failed"));
        }
        Ok(())
    }

    pub async fn send_booking_confirmation(
        &self,
        to_phone: &str,
        booking: &BookingOut,
    ) -> Result<(), ApiError> {
        self.send(to_phone, &booking_confirmation_message(booking)).await
    }

    pub async fn send_taxi_assignment(
        &self,
        to_phone: &str,
        booking: &BookingOut,
        assignment: &AssignmentOut,
    ) -> Result<(), ApiError> {
        self.send(to_phone, &taxi_assignment_message(booking, assignment))
            .await
    }

    pub async fn send_driver_assignment(
        &self,
        to_phone: &str,
        booking: &BookingOut,
    ) -> Result<(), ApiError> {
        self.send(to_phone, &driver_assignment_message(booking)).await
    }

    pub async fn send_password_reset_otp(
        &self,
        to_phone: &str,
        otp: &str,
        ttl_minutes: i64,
    ) -> Result<(), ApiError> {
        self.send(to_phone, &password_reset_otp_message(otp, ttl_minutes))
            .await
    }

    /// Detached booking-confirmation send. Reconciliation must never fail or
    /// roll back because a message could not be delivered, so the result only
    /// gets logged.
    pub fn spawn_booking_confirmation(&self, to_phone: Option<String>, booking: BookingOut) {
        let Some(phone) = to_phone.filter(|p| !p.trim().is_empty()) else {
            tracing::warn!(booking_id = %booking.id, "no destination phone for booking confirmation");
            return;
        };
        let notifier = self.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.send_booking_confirmation(&phone, &booking).await {
                tracing::error!(
                    error = %e.detail,
                    booking_id = %booking.id,
                    "booking confirmation notification failed"
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PaymentOut;
    use chrono::Utc;
    use std::collections::HashMap;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    fn booking_fixture() -> BookingOut {
        BookingOut {
            id: "b-1".to_string(),
            user_id: "u-1".to_string(),
            pickup_location: "Airport".to_string(),
            drop_location: "City Centre".to_string(),
            scheduled_at: None,
            distance_km: Some(10.0),
            estimated_fare: Some(500.0),
            total_amount: 500.0,
            actual_km: None,
            extra_km: None,
            extra_charge: None,
            car_model: None,
            cancellation_reason: None,
            taxi_assign_status: None,
            status: "PAID".to_string(),
            created_at: Some(Utc::now()),
            updated_at: None,
            payments: vec![PaymentOut {
                id: "p-1".to_string(),
                booking_id: "b-1".to_string(),
                amount: 200.0,
                currency: "INR".to_string(),
                status: "SUCCESS".to_string(),
                provider: Some("razorpay".to_string()),
                provider_txn_id: Some("pay_1".to_string()),
                remaining_amount: Some(300.0),
                created_at: None,
            }],
            user: None,
            assignments: Vec::new(),
        }
    }

    #[test]
    fn formats_whatsapp_numbers() {
        assert_eq!(
            format_whatsapp_number("+919812345678").as_deref(),
            Some("whatsapp:+919812345678")
        );
        assert_eq!(
            format_whatsapp_number("9812345678").as_deref(),
            Some("whatsapp:+919812345678")
        );
        assert_eq!(
            format_whatsapp_number("whatsapp:+14155238886").as_deref(),
            Some("whatsapp:+14155238886")
        );
        assert_eq!(
            format_whatsapp_number("91 98123 45678").as_deref(),
            Some("whatsapp:+919812345678")
        );
        assert_eq!(format_whatsapp_number("   "), None);
        assert_eq!(format_whatsapp_number("n/a"), None);
    }

    #[test]
    fn confirmation_message_reports_paid_and_remaining() {
        let booking = booking_fixture();
        let msg = booking_confirmation_message(&booking);
        assert!(msg.contains("booking #b-1"));
        assert!(msg.contains("Airport ➜ City Centre"));
        assert!(msg.contains("Pickup: ASAP"));
        assert!(msg.contains("Total Fare: ₹500.00"));
        assert!(msg.contains("Paid Now: ₹200.00"));
        assert!(msg.contains("Remaining: ₹300.00"));
    }

    #[test]
    fn driver_message_reports_fare_left_to_collect() {
        let booking = booking_fixture();
        let msg = driver_assignment_message(&booking);
        assert!(msg.contains("Fare to Collect: ₹300.00"));
        assert!(msg.contains("From: Airport"));
        assert!(msg.contains("To: City Centre"));
    }

    #[test]
    fn otp_message_pluralizes_minutes() {
        assert!(password_reset_otp_message("123456", 5).contains("Valid for 5 minutes."));
        assert!(password_reset_otp_message("123456", 1).contains("Valid for 1 minute."));
    }

    #[tokio::test]
    async fn unconfigured_notifier_is_a_noop() {
        let notifier = Notifier::new(None, None, None, Client::new());
        assert!(!notifier.enabled());
        notifier
            .send("+919812345678", "hello")
            .await
            .expect("noop send");
    }

    async fn spawn_mock_provider(
        status_line: &str,
    ) -> (String, oneshot::Receiver<(String, HashMap<String, String>, String)>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let (tx, rx) = oneshot::channel();
        let status_line = status_line.to_string();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.expect("accept");
            let mut buf: Vec<u8> = Vec::new();
            let mut tmp = [0u8; 2048];
            let header_end = loop {
                let n = stream.read(&mut tmp).await.expect("read");
                if n == 0 {
                    break None;
                }
                buf.extend_from_slice(&tmp[..n]);
                if let Some(i) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    break Some(i);
                }
            };
            let Some(header_end) = header_end else { return };

            let header_text = String::from_utf8_lossy(&buf[..header_end]).to_string();
            let mut lines = header_text.split("\r\n");
            let request_line = lines.next().unwrap_or_default();
            let path = request_line
                .split_whitespace()
                .nth(1)
                .unwrap_or_default()
                .to_string();
            let mut headers: HashMap<String, String> = HashMap::new();
            for line in lines {
                if let Some((k, v)) = line.split_once(':') {
                    headers.insert(k.trim().to_ascii_lowercase(), v.trim().to_string());
                }
            }
            let content_len = headers
                .get("content-length")
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(0);
            let mut body = buf[(header_end + 4)..].to_vec();
            while body.len() < content_len {
                let n = stream.read(&mut tmp).await.expect("read body");
                if n == 0 {
                    break;
                }
                body.extend_from_slice(&tmp[..n]);
            }
            body.truncate(content_len);

            let _ = tx.send((path, headers, String::from_utf8_lossy(&body).to_string()));

            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{{}}"
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.flush().await;
        });

        (format!("http://{}", addr), rx)
    }

    #[tokio::test]
    async fn send_posts_formatted_message_to_provider() {
        let (base_url, rx) = spawn_mock_provider("200 OK").await;
        let notifier = Notifier::new(
            Some(base_url),
            Some("whatsapp:+14155238886".to_string()),
            Some("provider-token".to_string()),
            Client::new(),
        );

        notifier
            .send("9812345678", "trip booked")
            .await
            .expect("send");

        let (path, headers, body) = rx.await.expect("captured request");
        assert_eq!(path, "/messages");
        assert_eq!(
            headers.get("authorization").map(String::as_str),
            Some("Bearer provider-token")
        );
        let v: serde_json::Value = serde_json::from_str(&body).expect("json body");
        assert_eq!(
            v.get("from").and_then(|x| x.as_str()),
            Some("whatsapp:+14155238886")
        );
        assert_eq!(
            v.get("to").and_then(|x| x.as_str()),
            Some("whatsapp:+919812345678")
        );
        assert_eq!(v.get("body").and_then(|x| x.as_str()), Some("trip booked"));
    }

    #[tokio::test]
    async fn provider_rejection_surfaces_as_upstream_error() {
        let (base_url, _rx) = spawn_mock_provider("500 Internal Server Error").await;
        let notifier = Notifier::new(
            Some(base_url),
            Some("whatsapp:+14155238886".to_string()),
            None,
            Client::new(),
        );

        let err = notifier
            .send("9812345678", "trip booked")
            .await
            .expect_err("delivery failure expected");
        assert_eq!(err.kind, crate::error::ErrorKind::Upstream);
    }
}
