//! Payment provider integration via REST + webhooks (no SDK dependency).
//!
//! Only the webhook side lives here: signature verification over the raw
//! request body and typed views of the event payloads the storefront
//! cares about. Checkout sessions are created by the payment provider's
//! hosted flow; the cart snapshot rides in session metadata.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

/// Maximum accepted age of a signed event, in seconds.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Webhook verification and parsing errors.
///
/// All of these map to a 400-class response: the event is rejected
/// before any side effect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StripeError {
    #[error("missing signature header")]
    MissingSignature,

    #[error("malformed signature header")]
    MalformedSignature,

    #[error("webhook signature mismatch")]
    SignatureMismatch,

    #[error("webhook timestamp outside tolerance")]
    StaleTimestamp,

    #[error("malformed event payload: {0}")]
    MalformedPayload(String),
}

/// Verify a webhook signature header (`t=<unix>,v1=<hex hmac>`) against
/// the raw request body.
///
/// HMAC-SHA256 over `"{timestamp}.{body}"` with the shared signing
/// secret, constant-time comparison, then a replay window check. This
/// must run before any parsing of event semantics.
///
/// # Errors
///
/// Returns a [`StripeError`] describing why verification failed.
pub fn verify_webhook_signature(
    payload: &[u8],
    sig_header: &str,
    secret: &str,
) -> Result<(), StripeError> {
    let mut timestamp = "";
    let mut signature = "";
    for part in sig_header.split(',') {
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = t;
        } else if let Some(v) = part.strip_prefix("v1=") {
            signature = v;
        }
    }

    if timestamp.is_empty() || signature.is_empty() {
        return Err(StripeError::MalformedSignature);
    }

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| StripeError::MalformedSignature)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);

    let sig_bytes = hex::decode(signature).map_err(|_| StripeError::MalformedSignature)?;
    mac.verify_slice(&sig_bytes)
        .map_err(|_| StripeError::SignatureMismatch)?;

    // Reject replayed events outside the tolerance window.
    let ts: i64 = timestamp
        .parse()
        .map_err(|_| StripeError::MalformedSignature)?;
    let now = chrono::Utc::now().timestamp();
    if (now - ts).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(StripeError::StaleTimestamp);
    }

    Ok(())
}

/// Provider event envelope: `{ id, type, data: { object } }`.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

impl WebhookEvent {
    /// Parse a verified raw body into the event envelope.
    ///
    /// # Errors
    ///
    /// Returns [`StripeError::MalformedPayload`] when the body is not a
    /// well-formed event.
    pub fn from_body(body: &[u8]) -> Result<Self, StripeError> {
        serde_json::from_slice(body).map_err(|e| StripeError::MalformedPayload(e.to_string()))
    }
}

/// The slice of a checkout session this system reads.
#[derive(Debug, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub customer_details: Option<SessionCustomer>,
    /// Total charged, in the smallest currency unit.
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: SessionMetadata,
    #[serde(default)]
    pub shipping_details: Option<SessionShipping>,
}

impl CheckoutSession {
    /// Parse the session object out of a `checkout.session.*` event.
    ///
    /// # Errors
    ///
    /// Returns [`StripeError::MalformedPayload`] when the object does
    /// not look like a checkout session.
    pub fn from_event_object(object: &serde_json::Value) -> Result<Self, StripeError> {
        serde_json::from_value(object.clone())
            .map_err(|e| StripeError::MalformedPayload(e.to_string()))
    }

    /// Decode the cart snapshot carried in session metadata.
    ///
    /// Metadata values are strings, so the cart is a JSON-encoded array.
    ///
    /// # Errors
    ///
    /// Returns [`StripeError::MalformedPayload`] when the snapshot is
    /// missing or does not decode.
    pub fn cart_snapshot(&self) -> Result<Vec<CartItemSnapshot>, StripeError> {
        let raw = self
            .metadata
            .cart
            .as_deref()
            .ok_or_else(|| StripeError::MalformedPayload("missing cart metadata".to_string()))?;

        serde_json::from_str(raw).map_err(|e| StripeError::MalformedPayload(e.to_string()))
    }
}

/// The slice of a payment intent this system reads.
#[derive(Debug, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    #[serde(default)]
    pub metadata: SessionMetadata,
}

impl PaymentIntent {
    /// Parse the intent object out of a `payment_intent.*` event.
    ///
    /// # Errors
    ///
    /// Returns [`StripeError::MalformedPayload`] when the object does
    /// not look like a payment intent.
    pub fn from_event_object(object: &serde_json::Value) -> Result<Self, StripeError> {
        serde_json::from_value(object.clone())
            .map_err(|e| StripeError::MalformedPayload(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
pub struct SessionCustomer {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionMetadata {
    /// JSON-encoded cart snapshot set when the session was created.
    #[serde(default)]
    pub cart: Option<String>,
    /// Storefront user id for signed-in checkouts.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Back-reference set on payment intents so `payment_intent.*`
    /// events can be tied to their session.
    #[serde(default)]
    pub checkout_session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SessionShipping {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<SessionAddress>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionAddress {
    #[serde(default)]
    pub line1: Option<String>,
    #[serde(default)]
    pub line2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

/// One cart line as snapshotted into session metadata at checkout time.
#[derive(Debug, Clone, Deserialize)]
pub struct CartItemSnapshot {
    pub listing_id: i64,
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub condition: Option<String>,
    /// Unit price in the smallest currency unit.
    pub unit_amount: i64,
    pub quantity: u32,
    #[serde(default)]
    pub weight_grams: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &str = "whsec_Zk9qQ3J5cHRvR3JhZGVTZWNyZXQ";

    fn sign(payload: &[u8], timestamp: i64, secret: &str) -> String {
        let mut mac =
            Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        let sig = hex::encode(mac.finalize().into_bytes());
        format!("t={timestamp},v1={sig}")
    }

    #[test]
    fn test_valid_signature_accepted() {
        let body = br#"{"id":"evt_1","type":"checkout.session.completed","data":{"object":{}}}"#;
        let header = sign(body, chrono::Utc::now().timestamp(), SECRET);

        assert_eq!(verify_webhook_signature(body, &header, SECRET), Ok(()));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let body = b"{}";
        let header = sign(body, chrono::Utc::now().timestamp(), "whsec_other");

        assert_eq!(
            verify_webhook_signature(body, &header, SECRET),
            Err(StripeError::SignatureMismatch)
        );
    }

    #[test]
    fn test_tampered_body_rejected() {
        let header = sign(b"{\"total\":100}", chrono::Utc::now().timestamp(), SECRET);

        assert_eq!(
            verify_webhook_signature(b"{\"total\":999}", &header, SECRET),
            Err(StripeError::SignatureMismatch)
        );
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let body = b"{}";
        let header = sign(body, chrono::Utc::now().timestamp() - 600, SECRET);

        assert_eq!(
            verify_webhook_signature(body, &header, SECRET),
            Err(StripeError::StaleTimestamp)
        );
    }

    #[test]
    fn test_malformed_header_rejected() {
        assert_eq!(
            verify_webhook_signature(b"{}", "v1=deadbeef", SECRET),
            Err(StripeError::MalformedSignature)
        );
        assert_eq!(
            verify_webhook_signature(b"{}", "t=123", SECRET),
            Err(StripeError::MalformedSignature)
        );
        assert_eq!(
            verify_webhook_signature(b"{}", "t=123,v1=nothex", SECRET),
            Err(StripeError::MalformedSignature)
        );
    }

    #[test]
    fn test_event_envelope_parses() {
        let body = json!({
            "id": "evt_42",
            "type": "payment_intent.succeeded",
            "data": { "object": { "id": "pi_1" } }
        })
        .to_string();

        let event = WebhookEvent::from_body(body.as_bytes()).expect("parses");
        assert_eq!(event.id, "evt_42");
        assert_eq!(event.event_type, "payment_intent.succeeded");
        assert_eq!(event.data.object["id"], "pi_1");
    }

    #[test]
    fn test_cart_snapshot_roundtrip() {
        let cart = json!([
            {
                "listing_id": 101,
                "title": "Journey In Satchidananda",
                "artist": "Alice Coltrane",
                "condition": "Near Mint (NM or M-)",
                "unit_amount": 3499,
                "quantity": 1,
                "weight_grams": 230
            }
        ])
        .to_string();

        let session = CheckoutSession::from_event_object(&json!({
            "id": "cs_test_9",
            "amount_total": 3499,
            "currency": "usd",
            "customer_details": { "email": "shopper@example.com", "name": "A Shopper" },
            "metadata": { "cart": cart },
            "shipping_details": {
                "name": "A Shopper",
                "address": {
                    "line1": "1 Record Lane",
                    "city": "Portland",
                    "state": "OR",
                    "postal_code": "97201",
                    "country": "US"
                }
            }
        }))
        .expect("session parses");

        let items = session.cart_snapshot().expect("cart decodes");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].listing_id, 101);
        assert_eq!(items[0].unit_amount, 3499);
    }

    #[test]
    fn test_missing_cart_metadata_is_malformed() {
        let session = CheckoutSession::from_event_object(&json!({ "id": "cs_1" }))
            .expect("session parses");
        assert!(matches!(
            session.cart_snapshot(),
            Err(StripeError::MalformedPayload(_))
        ));
    }
}
