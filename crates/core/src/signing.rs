//! HMAC-SHA256 signatures for webhook bodies, both outbound deliveries and inbound decisions.
//!
//! The signed material is `"{timestamp}.{body}"` and the header value is `sha256=<hex>`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-innkeep-signature";
pub const TIMESTAMP_HEADER: &str = "x-innkeep-timestamp";

const SIGNATURE_PREFIX: &str = "sha256=";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureCheck {
    Valid,
    Malformed,
    Mismatch,
}

/// Returns `None` only if the MAC cannot be keyed, which HMAC never refuses in practice.
pub fn sign_payload(secret: &[u8], timestamp: i64, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    feed(&mut mac, timestamp, body);
    Some(format!("{SIGNATURE_PREFIX}{}", encode_hex(mac.finalize().into_bytes().as_slice())))
}

pub fn verify_payload(secret: &[u8], timestamp: i64, body: &[u8], header: &str) -> SignatureCheck {
    let Some(encoded) = header.trim().strip_prefix(SIGNATURE_PREFIX) else {
        return SignatureCheck::Malformed;
    };
    let Some(expected) = decode_hex(encoded) else {
        return SignatureCheck::Malformed;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return SignatureCheck::Malformed;
    };
    feed(&mut mac, timestamp, body);
    match mac.verify_slice(&expected) {
        Ok(()) => SignatureCheck::Valid,
        Err(_) => SignatureCheck::Mismatch,
    }
}

fn feed(mac: &mut HmacSha256, timestamp: i64, body: &[u8]) {
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

fn decode_hex(raw: &str) -> Option<Vec<u8>> {
    if raw.len() % 2 != 0 {
        return None;
    }
    (0..raw.len())
        .step_by(2)
        .map(|index| raw.get(index..index + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{sign_payload, verify_payload, SignatureCheck};

    #[test]
    fn signature_round_trips_for_same_secret_and_timestamp() {
        let header = sign_payload(b"shared", 1_700_000_000, br#"{"decision":"approve"}"#)
            .expect("hmac keys any length");
        assert!(header.starts_with("sha256="));
        assert_eq!(
            verify_payload(b"shared", 1_700_000_000, br#"{"decision":"approve"}"#, &header),
            SignatureCheck::Valid
        );
    }

    #[test]
    fn tampered_body_or_timestamp_is_a_mismatch() {
        let header = sign_payload(b"shared", 10, b"body").expect("hmac keys any length");
        assert_eq!(verify_payload(b"shared", 10, b"body!", &header), SignatureCheck::Mismatch);
        assert_eq!(verify_payload(b"shared", 11, b"body", &header), SignatureCheck::Mismatch);
        assert_eq!(verify_payload(b"other", 10, b"body", &header), SignatureCheck::Mismatch);
    }

    #[test]
    fn malformed_headers_are_reported_separately() {
        assert_eq!(verify_payload(b"s", 1, b"b", "md5=abc"), SignatureCheck::Malformed);
        assert_eq!(verify_payload(b"s", 1, b"b", "sha256=zz"), SignatureCheck::Malformed);
        assert_eq!(verify_payload(b"s", 1, b"b", "sha256=abc"), SignatureCheck::Malformed);
    }
}
