use crate::error::ApiError;
use hmac::{Hmac, Mac};
use reqwest::Client;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Remote payment order as returned by the gateway.
#[derive(Debug, Clone)]
pub struct GatewayOrder {
    pub id: String,
    pub amount_minor: i64,
    pub currency: String,
}

/// Adapter for the payment gateway REST API: order creation plus callback
/// signature verification. The signature is HMAC-SHA256 over
/// `"{order_id}|{payment_id}"` keyed with the API secret; the gateway
/// requires byte-for-byte reproducibility here.
#[derive(Clone)]
pub struct Gateway {
    base_url: String,
    key_id: String,
    key_secret: String,
    http: Client,
}

pub fn payment_signature(key_secret: &str, order_id: &str, payment_id: &str) -> String {
    let msg = format!("{order_id}|{payment_id}");
    let mut mac = HmacSha256::new_from_slice(key_secret.as_bytes()).expect("hmac key");
    mac.update(msg.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Gateways quote amounts in minor units (rupees -> paise).
pub fn to_minor_units(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

impl Gateway {
    pub fn new(base_url: String, key_id: String, key_secret: String, http: Client) -> Self {
        Self {
            base_url,
            key_id,
            key_secret,
            http,
        }
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub async fn create_order(
        &self,
        amount: f64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, ApiError> {
        let url = format!("{}/orders", self.base_url.trim_end_matches('/'));
        let amount_minor = to_minor_units(amount);

        let resp = self
            .http
            .post(url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&serde_json::json!({
                "amount": amount_minor,
                "currency": currency,
                "receipt": receipt,
            }))
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "gateway create_order http error");
                ApiError::upstream("payment gateway unavailable")
            })?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            // Best-effort extraction of gateway error details.
            let mut msg = body.clone();
            if let Ok(v) = serde_json::from_str::<serde_json::Value>(&body) {
                if let Some(d) = v
                    .get("error")
                    .and_then(|e| e.get("description"))
                    .and_then(|x| x.as_str())
                {
                    msg = d.to_string();
                }
            }
            tracing::error!(status = %status, detail = %msg, "gateway create_order rejected");
            return Err(ApiError::upstream("payment gateway order failed"));
        }

        let v: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
            tracing::error!(error = %e, "gateway create_order invalid json");
            ApiError::upstream("payment gateway order failed")
        })?;
        let id = v
            .get("id")
            .and_then(|x| x.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| ApiError::upstream("payment gateway order failed"))?;
        let amount_minor = v.get("amount").and_then(|x| x.as_i64()).unwrap_or(amount_minor);
        let currency = v
            .get("currency")
            .and_then(|x| x.as_str())
            .unwrap_or(currency)
            .to_string();

        Ok(GatewayOrder {
            id,
            amount_minor,
            currency,
        })
    }

    pub fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        let expect = payment_signature(&self.key_secret, order_id, payment_id);
        let provided = signature.trim().to_ascii_lowercase();
        expect.as_bytes().ct_eq(provided.as_bytes()).unwrap_u8() == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    #[derive(Debug)]
    struct CapturedRequest {
        method: String,
        path: String,
        headers: HashMap<String, String>,
        body: String,
    }

    fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }

    async fn spawn_mock_gateway(
        status_line: &str,
        response_body: &str,
    ) -> (String, oneshot::Receiver<CapturedRequest>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let (tx, rx) = oneshot::channel();
        let status_line = status_line.to_string();
        let response_body = response_body.to_string();

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
                if let Some(i) = find_subsequence(&buf, b"\r\n\r\n") {
                    break Some(i);
                }
            };

            let Some(header_end) = header_end else {
                return;
            };

            let header_text = String::from_utf8_lossy(&buf[..header_end]).to_string();
            let mut lines = header_text.split("\r\n");
            let request_line = lines.next().unwrap_or_default();
            let mut req_parts = request_line.split_whitespace();
            let method = req_parts.next().unwrap_or_default().to_string();
            let path = req_parts.next().unwrap_or_default().to_string();

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

            let _ = tx.send(CapturedRequest {
                method,
                path,
                headers,
                body: String::from_utf8_lossy(&body).to_string(),
            });

            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                response_body.len(),
                response_body
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.flush().await;
        });

        (format!("http://{}", addr), rx)
    }

    fn test_gateway(base_url: &str) -> Gateway {
        Gateway::new(
            base_url.to_string(),
            "key-id-test".to_string(),
            "key-secret-test".to_string(),
            Client::builder().build().expect("http client"),
        )
    }

    #[tokio::test]
    async fn create_order_posts_minor_units_with_basic_auth() {
        let (base_url, rx) = spawn_mock_gateway(
            "200 OK",
            "{\"id\":\"order_test_1\",\"amount\":50000,\"currency\":\"INR\"}",
        )
        .await;
        let gw = test_gateway(&base_url);

        let order = gw
            .create_order(500.0, "INR", "user_u1_order")
            .await
            .expect("create order");
        assert_eq!(order.id, "order_test_1");
        assert_eq!(order.amount_minor, 50_000);
        assert_eq!(order.currency, "INR");

        let captured = rx.await.expect("captured request");
        assert_eq!(captured.method, "POST");
        assert_eq!(captured.path, "/orders");
        let auth = captured
            .headers
            .get("authorization")
            .cloned()
            .unwrap_or_default();
        assert!(auth.starts_with("Basic "));

        let body: serde_json::Value = serde_json::from_str(&captured.body).expect("json body");
        assert_eq!(body.get("amount").and_then(|v| v.as_i64()), Some(50_000));
        assert_eq!(body.get("currency").and_then(|v| v.as_str()), Some("INR"));
        assert_eq!(
            body.get("receipt").and_then(|v| v.as_str()),
            Some("user_u1_order")
        );
    }

    #[tokio::test]
    async fn create_order_maps_gateway_rejection_to_upstream() {
        let (base_url, _rx) = spawn_mock_gateway(
            "400 Bad Request",
            "{\"error\":{\"description\":\"amount too small\"}}",
        )
        .await;
        let gw = test_gateway(&base_url);

        let err = gw
            .create_order(0.01, "INR", "r1")
            .await
            .expect_err("rejection expected");
        assert_eq!(err.kind, crate::error::ErrorKind::Upstream);
    }

    #[test]
    fn minor_unit_conversion_rounds_rupees_to_paise() {
        assert_eq!(to_minor_units(500.0), 50_000);
        assert_eq!(to_minor_units(499.995), 50_000);
        assert_eq!(to_minor_units(0.01), 1);
    }

    #[test]
    fn signature_round_trips_and_rejects_tampering() {
        let gw = test_gateway("http://unused");
        let sig = payment_signature("key-secret-test", "order_1", "pay_1");
        assert!(gw.verify_signature("order_1", "pay_1", &sig));
        assert!(gw.verify_signature("order_1", "pay_1", &sig.to_uppercase()));
        assert!(!gw.verify_signature("order_1", "pay_2", &sig));
        assert!(!gw.verify_signature("order_2", "pay_1", &sig));
        assert!(!gw.verify_signature("order_1", "pay_1", "deadbeef"));
    }

    #[test]
    fn signature_is_keyed_on_the_secret() {
        let a = payment_signature("secret-a", "order_1", "pay_1");
        let b = payment_signature("secret-b", "order_1", "pay_1");
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
