//! Gateway webhook verification and normalization.
//!
//! Verification is pure: signature check over the raw body, then parse into
//! the gateway-agnostic [`GatewayEvent`]. No side effects, so a caller can
//! safely re-invoke it on redelivery. Gateway-specific field names are
//! translated here, nowhere else.

use std::collections::HashMap;

use sha2::Sha256;
use subtle::ConstantTimeEq;

use settlement_types::{Gateway, GatewayEvent, GatewayEventKind, VerifyError};

/// Signs a payload with HMAC-SHA256, hex-encoded.
pub fn sign(payload: &[u8], secret: &str) -> String {
    use hmac::{Hmac, Mac};

    type HmacSha256 = Hmac<Sha256>;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a signature using constant-time comparison.
fn signature_matches(payload: &[u8], signature: &str, secret: &str) -> bool {
    let expected = sign(payload, secret);
    expected.as_bytes().ct_eq(signature.as_bytes()).into()
}

/// Verifies inbound gateway callbacks against per-gateway shared secrets.
pub struct WebhookVerifier {
    secrets: HashMap<Gateway, String>,
}

impl WebhookVerifier {
    pub fn new(secrets: HashMap<Gateway, String>) -> Self {
        Self { secrets }
    }

    /// Verifies the signature over the raw, unparsed body and normalizes
    /// the payload. Rejects before reading any state:
    /// - missing secret is a configuration fault (fatal, not retried)
    /// - signature mismatch or malformed body means the caller was not the
    ///   gateway; the body must not be processed
    pub fn verify(
        &self,
        gateway: Gateway,
        raw_body: &[u8],
        signature: &str,
    ) -> Result<GatewayEvent, VerifyError> {
        let secret = self
            .secrets
            .get(&gateway)
            .ok_or(VerifyError::MissingSecret(gateway))?;

        if !signature_matches(raw_body, signature, secret) {
            return Err(VerifyError::InvalidSignature);
        }

        let body: serde_json::Value = serde_json::from_slice(raw_body)
            .map_err(|e| VerifyError::MalformedPayload(e.to_string()))?;

        match gateway {
            Gateway::Razorpay => parse_razorpay(body),
            Gateway::Stripe => parse_stripe(body),
        }
    }
}

/// Razorpay: `{"event": "payment.captured", "payload": {"payment": {"entity": {...}}}}`
fn parse_razorpay(body: serde_json::Value) -> Result<GatewayEvent, VerifyError> {
    let event_type = body
        .get("event")
        .and_then(|v| v.as_str())
        .ok_or_else(|| VerifyError::MalformedPayload("missing event field".into()))?;

    let kind = match event_type {
        "payment.captured" => GatewayEventKind::PaymentCaptured,
        "payment.failed" => GatewayEventKind::PaymentFailed,
        other => return Err(VerifyError::UnsupportedEvent(other.to_string())),
    };

    let entity = body
        .pointer("/payload/payment/entity")
        .ok_or_else(|| VerifyError::MalformedPayload("missing payment entity".into()))?;

    let gateway_payment_id = entity
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| VerifyError::MalformedPayload("missing payment id".into()))?
        .to_string();

    Ok(GatewayEvent {
        gateway: Gateway::Razorpay,
        kind,
        gateway_payment_id,
        gateway_order_id: entity
            .get("order_id")
            .and_then(|v| v.as_str())
            .map(String::from),
        payment_reference: entity
            .pointer("/notes/reference")
            .and_then(|v| v.as_str())
            .map(String::from),
        amount: entity.get("amount").and_then(|v| v.as_i64()),
        failure_reason: entity
            .get("error_description")
            .and_then(|v| v.as_str())
            .map(String::from),
        raw: body,
    })
}

/// Stripe: `{"type": "payment_intent.succeeded", "data": {"object": {...}}}`
fn parse_stripe(body: serde_json::Value) -> Result<GatewayEvent, VerifyError> {
    let event_type = body
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| VerifyError::MalformedPayload("missing type field".into()))?;

    let kind = match event_type {
        "payment_intent.succeeded" => GatewayEventKind::PaymentCaptured,
        "payment_intent.payment_failed" => GatewayEventKind::PaymentFailed,
        other => return Err(VerifyError::UnsupportedEvent(other.to_string())),
    };

    let object = body
        .pointer("/data/object")
        .ok_or_else(|| VerifyError::MalformedPayload("missing data.object".into()))?;

    let gateway_payment_id = object
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| VerifyError::MalformedPayload("missing intent id".into()))?
        .to_string();

    Ok(GatewayEvent {
        gateway: Gateway::Stripe,
        kind,
        gateway_payment_id,
        gateway_order_id: None,
        payment_reference: object
            .pointer("/metadata/reference")
            .and_then(|v| v.as_str())
            .map(String::from),
        amount: object.get("amount").and_then(|v| v.as_i64()),
        failure_reason: object
            .pointer("/last_payment_error/message")
            .and_then(|v| v.as_str())
            .map(String::from),
        raw: body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> WebhookVerifier {
        let mut secrets = HashMap::new();
        secrets.insert(Gateway::Razorpay, "rzp_secret".to_string());
        WebhookVerifier::new(secrets)
    }

    fn captured_body() -> Vec<u8> {
        serde_json::json!({
            "event": "payment.captured",
            "payload": {"payment": {"entity": {
                "id": "pay_abc123",
                "order_id": "order_xyz",
                "amount": 250000,
                "notes": {"reference": "PAY-deadbeef"}
            }}}
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn test_valid_signature_parses_event() {
        let body = captured_body();
        let signature = sign(&body, "rzp_secret");

        let event = verifier()
            .verify(Gateway::Razorpay, &body, &signature)
            .unwrap();

        assert_eq!(event.kind, GatewayEventKind::PaymentCaptured);
        assert_eq!(event.gateway_payment_id, "pay_abc123");
        assert_eq!(event.gateway_order_id.as_deref(), Some("order_xyz"));
        assert_eq!(event.payment_reference.as_deref(), Some("PAY-deadbeef"));
        assert_eq!(event.amount, Some(250000));
    }

    #[test]
    fn test_wrong_signature_rejected() {
        let body = captured_body();
        let signature = sign(&body, "wrong_secret");

        let result = verifier().verify(Gateway::Razorpay, &body, &signature);
        assert!(matches!(result, Err(VerifyError::InvalidSignature)));
    }

    #[test]
    fn test_tampered_body_rejected() {
        let body = captured_body();
        let signature = sign(&body, "rzp_secret");
        let mut tampered = body.clone();
        tampered[20] ^= 1;

        let result = verifier().verify(Gateway::Razorpay, &tampered, &signature);
        assert!(matches!(result, Err(VerifyError::InvalidSignature)));
    }

    #[test]
    fn test_missing_secret_is_configuration_error() {
        let body = captured_body();
        let signature = sign(&body, "whatever");

        let result = verifier().verify(Gateway::Stripe, &body, &signature);
        assert!(matches!(
            result,
            Err(VerifyError::MissingSecret(Gateway::Stripe))
        ));
    }

    #[test]
    fn test_unsupported_event_type() {
        let body = serde_json::json!({
            "event": "payment.authorized",
            "payload": {"payment": {"entity": {"id": "pay_1"}}}
        })
        .to_string()
        .into_bytes();
        let signature = sign(&body, "rzp_secret");

        let result = verifier().verify(Gateway::Razorpay, &body, &signature);
        assert!(matches!(result, Err(VerifyError::UnsupportedEvent(_))));
    }

    #[test]
    fn test_stripe_failure_event() {
        let mut secrets = HashMap::new();
        secrets.insert(Gateway::Stripe, "stripe_secret".to_string());
        let verifier = WebhookVerifier::new(secrets);

        let body = serde_json::json!({
            "type": "payment_intent.payment_failed",
            "data": {"object": {
                "id": "pi_123",
                "amount": 250000,
                "metadata": {"reference": "PAY-cafe"},
                "last_payment_error": {"message": "card declined"}
            }}
        })
        .to_string()
        .into_bytes();
        let signature = sign(&body, "stripe_secret");

        let event = verifier.verify(Gateway::Stripe, &body, &signature).unwrap();
        assert_eq!(event.kind, GatewayEventKind::PaymentFailed);
        assert_eq!(event.failure_reason.as_deref(), Some("card declined"));
    }
}
