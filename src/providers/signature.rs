use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{CILensError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Verifies a hex-encoded HMAC-SHA256 signature of `payload`.
///
/// Fails closed: a missing or empty secret, a missing prefix, malformed hex, or a
/// digest mismatch all return `false`. The digest comparison is constant-time.
pub fn verify_signature(secret: Option<&str>, payload: &[u8], signature: &str, prefix: &str) -> bool {
    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        return false;
    };

    let Some(hex_digest) = signature.trim().strip_prefix(prefix) else {
        return false;
    };

    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

/// Produces `<prefix><hex hmac-sha256>` for `payload`.
pub fn sign_payload(secret: &str, payload: &[u8], prefix: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    format!("{prefix}{}", hex::encode(mac.finalize().into_bytes()))
}

/// Random 32-byte secret, hex encoded.
pub fn generate_secret() -> Result<String> {
    let mut buf = [0u8; 32];
    getrandom::getrandom(&mut buf)
        .map_err(|err| CILensError::Configuration(format!("failed to generate webhook secret: {err}")))?;
    Ok(hex::encode(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &[u8] = br#"{"action":"completed","workflow_run":{"id":1}}"#;

    #[test]
    fn test_valid_signature_is_accepted() {
        let signature = sign_payload("topsecret", PAYLOAD, "sha256=");
        assert!(verify_signature(Some("topsecret"), PAYLOAD, &signature, "sha256="));
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let signature = sign_payload("topsecret", PAYLOAD, "sha256=");
        assert!(!verify_signature(Some("other"), PAYLOAD, &signature, "sha256="));
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let signature = sign_payload("topsecret", PAYLOAD, "sha256=");
        let tampered = br#"{"action":"completed","workflow_run":{"id":2}}"#;
        assert!(!verify_signature(Some("topsecret"), tampered, &signature, "sha256="));
    }

    #[test]
    fn test_truncated_signature_is_rejected() {
        let signature = sign_payload("topsecret", PAYLOAD, "sha256=");
        let truncated = &signature[..signature.len() - 2];
        assert!(!verify_signature(Some("topsecret"), PAYLOAD, truncated, "sha256="));
    }

    #[test]
    fn test_missing_secret_fails_closed() {
        let signature = sign_payload("topsecret", PAYLOAD, "sha256=");
        assert!(!verify_signature(None, PAYLOAD, &signature, "sha256="));
        assert!(!verify_signature(Some(""), PAYLOAD, &signature, "sha256="));
    }

    #[test]
    fn test_missing_prefix_is_rejected() {
        let signature = sign_payload("topsecret", PAYLOAD, "");
        assert!(!verify_signature(Some("topsecret"), PAYLOAD, &signature, "sha256="));
        assert!(verify_signature(Some("topsecret"), PAYLOAD, &signature, ""));
    }

    #[test]
    fn test_non_hex_signature_is_rejected() {
        assert!(!verify_signature(Some("topsecret"), PAYLOAD, "sha256=zzzz", "sha256="));
        assert!(!verify_signature(Some("topsecret"), PAYLOAD, "", "sha256="));
    }

    #[test]
    fn test_generated_secrets_are_distinct() {
        let a = generate_secret().unwrap();
        let b = generate_secret().unwrap();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }
}
