//! Webhook Signature Verification
//!
//! Both rails sign callbacks with a shared secret. Verification fails closed:
//! a missing secret, a missing or malformed header, or any mismatch rejects
//! the delivery before its body is looked at.
//!
//! ```text
//! crypto: hex(HMAC-SHA512(ipn_secret, sorted_compact_json(body)))  -> x-nowpayments-sig
//! card:   t=<ts>,v1=hex(HMAC-SHA256(secret, "<ts>.<body>"))        -> stripe-signature
//! ```

use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};
use subtle::ConstantTimeEq;

use crate::error::{PaymentError, Result};

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

/// Header carrying the crypto rail signature
pub const CRYPTO_SIGNATURE_HEADER: &str = "x-nowpayments-sig";

/// Header carrying the card rail signature
pub const CARD_SIGNATURE_HEADER: &str = "stripe-signature";

/// Maximum age of a card webhook timestamp (seconds)
const CARD_TIMESTAMP_TOLERANCE_SECS: i64 = 300;

/// Allowed clock skew for card webhook timestamps from the future (seconds)
const CARD_FUTURE_SKEW_SECS: i64 = 60;

fn invalid(reason: &str) -> PaymentError {
    PaymentError::SignatureInvalid(reason.to_string())
}

fn constant_time_eq(expected: &[u8], provided: &[u8]) -> bool {
    expected.len() == provided.len() && bool::from(expected.ct_eq(provided))
}

/// Largest integer a double represents exactly
const MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;

/// Render a double the way `Number.prototype.toString` does: shortest
/// round-trip digits, positional between 1e-7 and 1e21, exponent otherwise.
fn js_number(value: f64) -> String {
    let sci = format!("{:e}", value.abs());
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    if digits.bytes().all(|b| b == b'0') {
        return "0".into();
    }

    let k = i32::try_from(digits.len()).unwrap_or(i32::MAX);
    let n = exponent.parse::<i32>().unwrap_or(0) + 1;
    let body = if k <= n && n <= 21 {
        format!("{digits}{}", "0".repeat((n - k).unsigned_abs() as usize))
    } else if 0 < n && n <= 21 {
        let (int, frac) = digits.split_at(n.unsigned_abs() as usize);
        format!("{int}.{frac}")
    } else if -6 < n && n <= 0 {
        format!("0.{}{digits}", "0".repeat(n.unsigned_abs() as usize))
    } else {
        let (lead, rest) = digits.split_at(1);
        let sign = if n > 0 { '+' } else { '-' };
        let exp = (n - 1).unsigned_abs();
        if rest.is_empty() {
            format!("{lead}e{sign}{exp}")
        } else {
            format!("{lead}.{rest}e{sign}{exp}")
        }
    };

    if value.is_sign_negative() {
        format!("-{body}")
    } else {
        body
    }
}

fn write_number(number: &serde_json::Number, out: &mut String) {
    if let Some(u) = number.as_u64().filter(|u| *u <= MAX_SAFE_INTEGER) {
        out.push_str(&u.to_string());
    } else if let Some(i) = number.as_i64().filter(|i| i.unsigned_abs() <= MAX_SAFE_INTEGER) {
        out.push_str(&i.to_string());
    } else if let Some(f) = number.as_f64() {
        out.push_str(&js_number(f));
    }
}

/// Append `value` as compact JSON with every object's keys in lexicographic order.
fn write_sorted(value: &serde_json::Value, out: &mut String) -> Result<()> {
    use serde_json::Value;

    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(number) => write_number(number, out),
        Value::String(s) => out.push_str(&serde_json::to_string(s)?),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_sorted(item, out)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                write_sorted(item, out)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

/// The exact bytes the crypto processor signs: the body re-serialized the
/// way its JavaScript signer does, compact with recursively sorted keys.
fn crypto_signing_payload(body: &[u8]) -> Result<String> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|_| invalid("body is not JSON"))?;
    let mut out = String::with_capacity(body.len());
    write_sorted(&value, &mut out)?;
    Ok(out)
}

/// Compute the crypto rail signature for `body`.
pub fn sign_crypto(secret: &str, body: &[u8]) -> Result<String> {
    let payload = crypto_signing_payload(body)?;
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
        .map_err(|_| PaymentError::Internal("invalid IPN secret".into()))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a crypto rail callback.
pub fn verify_crypto(secret: Option<&str>, body: &[u8], signature: Option<&str>) -> Result<()> {
    let secret = secret
        .filter(|s| !s.is_empty())
        .ok_or_else(|| invalid("crypto webhook secret not configured"))?;
    let signature = signature
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| invalid("missing signature header"))?;

    let expected = sign_crypto(secret, body)?;
    let provided = signature.to_ascii_lowercase();
    if constant_time_eq(expected.as_bytes(), provided.as_bytes()) {
        Ok(())
    } else {
        tracing::warn!("Crypto webhook signature mismatch");
        Err(invalid("signature mismatch"))
    }
}

/// Compute the card rail `v1` signature for `body` signed at `timestamp`.
pub fn sign_card(secret: &str, body: &[u8], timestamp: i64) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| PaymentError::Internal("invalid webhook secret".into()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Build a complete card signature header value.
pub fn card_signature_header(secret: &str, body: &[u8], timestamp: i64) -> Result<String> {
    Ok(format!("t={timestamp},v1={}", sign_card(secret, body, timestamp)?))
}

/// Verify a card rail callback against the `stripe-signature` header at `now` (unix seconds).
pub fn verify_card(secret: Option<&str>, body: &[u8], header: Option<&str>, now: i64) -> Result<()> {
    let secret = secret
        .filter(|s| !s.is_empty())
        .ok_or_else(|| invalid("card webhook secret not configured"))?;
    let header = header.ok_or_else(|| invalid("missing signature header"))?;

    // Format: t=timestamp,v1=signature[,v1=signature...]
    let mut timestamp = None;
    let mut candidates = Vec::new();
    for part in header.split(',') {
        let part = part.trim();
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = Some(t);
        } else if let Some(s) = part.strip_prefix("v1=") {
            candidates.push(s);
        }
    }

    let timestamp: i64 = timestamp
        .ok_or_else(|| invalid("malformed signature header"))?
        .parse()
        .map_err(|_| invalid("invalid timestamp in signature"))?;
    if candidates.is_empty() {
        return Err(invalid("malformed signature header"));
    }

    let age = now - timestamp;
    if age > CARD_TIMESTAMP_TOLERANCE_SECS {
        tracing::warn!(age, max = CARD_TIMESTAMP_TOLERANCE_SECS, "Card webhook timestamp too old");
        return Err(invalid("timestamp outside tolerance"));
    }
    if age < -CARD_FUTURE_SKEW_SECS {
        tracing::warn!(age, "Card webhook timestamp in the future");
        return Err(invalid("timestamp outside tolerance"));
    }

    let expected = sign_card(secret, body, timestamp)?;
    if candidates
        .iter()
        .any(|c| constant_time_eq(expected.as_bytes(), c.as_bytes()))
    {
        Ok(())
    } else {
        tracing::warn!("Card webhook signature mismatch");
        Err(invalid("signature mismatch"))
    }
}
