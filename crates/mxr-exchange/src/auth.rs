//! Request signing for authenticated exchange endpoints.
//!
//! Signature = base64(HMAC-SHA256(base64_decode(secret),
//! timestamp + method + request_path + body)).

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub fn sign(
    secret_b64: &str,
    timestamp: &str,
    method: &str,
    request_path: &str,
    body: &str,
) -> Result<String> {
    let key = STANDARD
        .decode(secret_b64.trim())
        .context("exchange api secret is not valid base64")?;
    let mut mac =
        HmacSha256::new_from_slice(&key).map_err(|e| anyhow!("invalid hmac key: {e}"))?;
    mac.update(timestamp.as_bytes());
    mac.update(method.as_bytes());
    mac.update(request_path.as_bytes());
    mac.update(body.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_matches_rfc4231_case_2() {
        // key "Jefe", data "what do ya want for nothing?"
        let sig = sign("SmVmZQ==", "what do ya ", "want", " for nothing?", "").unwrap();
        assert_eq!(sig, "W9zBRr9gdU5qBCQmCJV1x1oAPwidJzmDnexYuWTsOEM=");
    }

    #[test]
    fn sign_rejects_non_base64_secret() {
        let err = sign("not base64!!", "0", "GET", "/fills", "").unwrap_err();
        assert!(err.to_string().contains("base64"));
    }
}
