//! Webhook signature verification
//!
//! The gateway signs a callback by concatenating a fixed, per-event list of
//! `obj` field values (in lexicographic key order) and computing
//! HMAC-SHA512 over it with the merchant HMAC secret. The hex digest
//! arrives in the `hmac` query parameter.

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha512;
use tracing::warn;

type HmacSha512 = Hmac<Sha512>;

/// Fields covered by the signature of a `TRANSACTION` callback
pub const TRANSACTION_FIELDS: &[&str] = &[
    "amount_cents",
    "created_at",
    "currency",
    "error_occured",
    "has_parent_transaction",
    "id",
    "integration_id",
    "is_3d_secure",
    "is_auth",
    "is_capture",
    "is_refunded",
    "is_standalone_payment",
    "is_voided",
    "order.id",
    "owner",
    "pending",
    "source_data.pan",
    "source_data.sub_type",
    "source_data.type",
    "success",
];

/// Fields covered by the signature of a `TOKEN` callback
pub const TOKEN_FIELDS: &[&str] = &[
    "card_subtype",
    "created_at",
    "email",
    "id",
    "masked_pan",
    "merchant_id",
    "order_id",
    "token",
];

/// Keyed-hash verifier for inbound callbacks
#[derive(Clone)]
pub struct WebhookSignature {
    secret: Vec<u8>,
}

impl std::fmt::Debug for WebhookSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookSignature").finish_non_exhaustive()
    }
}

impl WebhookSignature {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    /// Signed fields for an event type; `None` for types we never trust
    pub fn fields_for(event_type: &str) -> Option<&'static [&'static str]> {
        match event_type {
            "TRANSACTION" => Some(TRANSACTION_FIELDS),
            "TOKEN" => Some(TOKEN_FIELDS),
            _ => None,
        }
    }

    /// Lowercase hex HMAC-SHA512 over the concatenated field values
    pub fn sign(&self, event_type: &str, obj: &Value) -> Option<String> {
        let fields = Self::fields_for(event_type)?;
        let mut mac = HmacSha512::new_from_slice(&self.secret).ok()?;
        mac.update(concat_fields(obj, fields).as_bytes());
        Some(hex::encode(mac.finalize().into_bytes()))
    }

    /// Constant-time comparison of `signature` (hex) against the expected
    /// digest. An empty secret never verifies.
    pub fn verify(&self, event_type: &str, obj: &Value, signature: &str) -> bool {
        if self.secret.is_empty() {
            warn!("Webhook HMAC secret is not configured, rejecting callback");
            return false;
        }
        let Some(fields) = Self::fields_for(event_type) else {
            return false;
        };
        let Ok(provided) = hex::decode(signature.trim()) else {
            return false;
        };
        let Ok(mut mac) = HmacSha512::new_from_slice(&self.secret) else {
            return false;
        };
        mac.update(concat_fields(obj, fields).as_bytes());
        mac.verify_slice(&provided).is_ok()
    }
}

fn concat_fields(obj: &Value, fields: &[&str]) -> String {
    fields
        .iter()
        .map(|path| render(lookup(obj, path)))
        .collect()
}

fn lookup<'a>(obj: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(obj, |node, key| node.get(key))
}

fn render(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn transaction() -> Value {
        json!({
            "id": 192036465,
            "pending": false,
            "amount_cents": 10000,
            "success": true,
            "is_auth": false,
            "is_capture": false,
            "is_standalone_payment": true,
            "is_voided": false,
            "is_refunded": false,
            "is_3d_secure": true,
            "integration_id": 4097558,
            "has_parent_transaction": false,
            "order": { "id": 217503754, "merchant_order_id": null },
            "created_at": "2024-06-13T11:33:44.592345",
            "currency": "SAR",
            "source_data": { "pan": "2346", "type": "card", "sub_type": "MasterCard" },
            "error_occured": false,
            "owner": 302852
        })
    }

    #[test]
    fn test_concatenation_order_and_rendering() {
        let concat = concat_fields(&transaction(), TRANSACTION_FIELDS);
        assert_eq!(
            concat,
            "100002024-06-13T11:33:44.592345SARfalsefalse192036465\
             4097558truefalsefalsefalsetruefalse217503754302852false\
             2346MasterCardcardtrue"
        );
    }

    #[test]
    fn test_sign_then_verify() {
        let signer = WebhookSignature::new("secret");
        let obj = transaction();
        let sig = signer.sign("TRANSACTION", &obj).unwrap();
        assert_eq!(sig.len(), 128);
        assert!(signer.verify("TRANSACTION", &obj, &sig));
        assert!(signer.verify("TRANSACTION", &obj, &sig.to_uppercase()));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let signer = WebhookSignature::new("secret");
        let mut obj = transaction();
        let sig = signer.sign("TRANSACTION", &obj).unwrap();

        obj["amount_cents"] = json!(1000000);
        assert!(!signer.verify("TRANSACTION", &obj, &sig));
    }

    #[test]
    fn test_wrong_key_and_garbage_rejected() {
        let obj = transaction();
        let sig = WebhookSignature::new("secret")
            .sign("TRANSACTION", &obj)
            .unwrap();

        assert!(!WebhookSignature::new("other").verify("TRANSACTION", &obj, &sig));
        assert!(!WebhookSignature::new("secret").verify("TRANSACTION", &obj, "zz-not-hex"));
        assert!(!WebhookSignature::new("secret").verify("TRANSACTION", &obj, ""));
        assert!(!WebhookSignature::new("").verify("TRANSACTION", &obj, &sig));
    }

    #[test]
    fn test_unknown_type_never_verifies() {
        let signer = WebhookSignature::new("secret");
        assert!(signer.sign("REFUND", &json!({})).is_none());
        assert!(!signer.verify("REFUND", &json!({}), "00"));
    }

    #[test]
    fn test_token_fields_missing_render_empty() {
        let signer = WebhookSignature::new("k");
        let partial = json!({ "id": 1, "token": "abc" });
        let full = json!({
            "id": 1, "token": "abc", "email": null, "card_subtype": "",
            "created_at": "", "masked_pan": "", "merchant_id": "", "order_id": ""
        });
        assert_eq!(
            signer.sign("TOKEN", &partial),
            signer.sign("TOKEN", &full)
        );
    }
}
