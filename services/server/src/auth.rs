use axum::http::HeaderMap;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, VerifyingKey, Verifier};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

/// Result of a successful request verification (§4.1).
pub struct VerifiedRequest {
    pub public_key: String,
    pub pair_id: Uuid,
}

/// Distinct failure reasons for the verifier's own diagnostics. The HTTP
/// layer maps every variant but [`AuthError::Database`] to 401 uniformly
/// (spec §7: "uniformly 401 to avoid leaking which part failed"); a genuine
/// database error is a 500, never a disguised auth failure (§7: "database
/// errors in user-facing paths become 500").
#[derive(Debug, PartialEq, Eq)]
pub enum AuthError {
    MissingHeaders,
    BadHeader,
    ClockSkew,
    BadSignature,
    UnknownUser,
    Database(String),
}

/// Verifies a request's `{signature, publicKey, timestamp}` headers against
/// the canonical payload `method + "\n" + path + "\n" + timestamp + "\n" +
/// sha256HexLower(body)`, then resolves the signer's pair.
///
/// Signature arithmetic is synchronous/CPU-bound; the only suspension point
/// is the user-table lookup (§4.1 "Suspension").
pub async fn verify_request(
    pool: &PgPool,
    replay_window: Duration,
    method: &str,
    path_with_query: &str,
    body: &[u8],
    headers: &HeaderMap,
) -> Result<VerifiedRequest, AuthError> {
    let signature_header = header_str(headers, "authorization").ok_or(AuthError::MissingHeaders)?;
    let public_key = header_str(headers, "x-public-key").ok_or(AuthError::MissingHeaders)?;
    let timestamp = header_str(headers, "x-timestamp").ok_or(AuthError::MissingHeaders)?;

    let signature_b64 = signature_header
        .strip_prefix("Signature ")
        .ok_or(AuthError::BadHeader)?;

    check_freshness(&timestamp, replay_window)?;
    verify_signature(
        &public_key,
        signature_b64,
        &canonical_payload(method, path_with_query, &timestamp, body),
    )?;

    let row = sqlx::query!("SELECT pair_id FROM users WHERE public_key = $1", public_key)
        .fetch_optional(pool)
        .await
        .map_err(|err| AuthError::Database(err.to_string()))?;

    let pair_id = row.ok_or(AuthError::UnknownUser)?.pair_id;

    Ok(VerifiedRequest {
        public_key,
        pair_id,
    })
}

/// Verifies a handoff channel auth/collect_auth frame (§4.5): same crypto
/// and freshness checks as [`verify_request`], but over the fixed
/// `prefix + "\n" + publicKey + "\n" + timestamp` payload instead of a
/// method/path/body triple, and resolving the signer's `pairId` the same way.
pub async fn verify_handoff_auth(
    pool: &PgPool,
    replay_window: Duration,
    prefix: &str,
    public_key: &str,
    timestamp: &str,
    signature_b64: &str,
) -> Result<Uuid, AuthError> {
    check_freshness(timestamp, replay_window)?;
    let payload = format!("{prefix}\n{public_key}\n{timestamp}");
    verify_signature(public_key, signature_b64, &payload)?;

    let row = sqlx::query!("SELECT pair_id FROM users WHERE public_key = $1", public_key)
        .fetch_optional(pool)
        .await
        .map_err(|err| AuthError::Database(err.to_string()))?;

    Ok(row.ok_or(AuthError::UnknownUser)?.pair_id)
}

/// Verifies a standalone Ed25519 signature over an already-built payload,
/// used by the handoff channel's auth/collect_auth frames (§4.5), which sign
/// a different prefix but go through the same crypto check.
pub fn verify_signature(
    public_key_b64: &str,
    signature_b64: &str,
    payload: &str,
) -> Result<(), AuthError> {
    let key_bytes: [u8; 32] = URL_SAFE_NO_PAD
        .decode(public_key_b64)
        .map_err(|_| AuthError::BadHeader)?
        .try_into()
        .map_err(|_| AuthError::BadHeader)?;
    let verifying_key = VerifyingKey::from_bytes(&key_bytes).map_err(|_| AuthError::BadHeader)?;

    let sig_bytes: [u8; 64] = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| AuthError::BadHeader)?
        .try_into()
        .map_err(|_| AuthError::BadHeader)?;
    let signature = Signature::from_bytes(&sig_bytes);

    verifying_key
        .verify(payload.as_bytes(), &signature)
        .map_err(|_| AuthError::BadSignature)
}

pub fn check_freshness(timestamp: &str, replay_window: Duration) -> Result<(), AuthError> {
    let parsed: DateTime<Utc> = DateTime::parse_from_rfc3339(timestamp)
        .map_err(|_| AuthError::BadHeader)?
        .with_timezone(&Utc);
    let skew = (Utc::now() - parsed).num_milliseconds().unsigned_abs();
    if skew > replay_window.as_millis() as u64 {
        return Err(AuthError::ClockSkew);
    }
    Ok(())
}

pub fn canonical_payload(method: &str, path: &str, timestamp: &str, body: &[u8]) -> String {
    let body_hash = if body.is_empty() {
        String::new()
    } else {
        hex::encode(Sha256::digest(body))
    };
    format!("{method}\n{path}\n{timestamp}\n{body_hash}")
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name)?.to_str().ok().map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    fn make_identity() -> (SigningKey, String) {
        let signing_key = SigningKey::generate(&mut rand::rngs::OsRng);
        let public_key = URL_SAFE_NO_PAD.encode(signing_key.verifying_key().to_bytes());
        (signing_key, public_key)
    }

    #[test]
    fn canonical_payload_empty_body_hash_is_empty_string() {
        let payload = canonical_payload("GET", "/api/pairs/status", "2026-02-17T10:00:00Z", b"");
        assert_eq!(payload, "GET\n/api/pairs/status\n2026-02-17T10:00:00Z\n");
    }

    #[test]
    fn canonical_payload_hashes_body_as_lowercase_hex() {
        let payload = canonical_payload("POST", "/api/entries", "2026-02-17T10:00:00Z", b"hi");
        let expected_hash = hex::encode(Sha256::digest(b"hi"));
        assert!(payload.ends_with(&expected_hash));
        assert_eq!(expected_hash, expected_hash.to_lowercase());
    }

    #[test]
    fn verify_signature_accepts_valid_signature() {
        let (signing_key, public_key) = make_identity();
        let payload = "POST\n/api/entries\n2026-02-17T10:00:00Z\n";
        let sig = signing_key.sign(payload.as_bytes());
        let sig_b64 = URL_SAFE_NO_PAD.encode(sig.to_bytes());

        assert!(verify_signature(&public_key, &sig_b64, payload).is_ok());
    }

    #[test]
    fn verify_signature_rejects_tampered_payload() {
        let (signing_key, public_key) = make_identity();
        let sig = signing_key.sign(b"original");
        let sig_b64 = URL_SAFE_NO_PAD.encode(sig.to_bytes());

        assert_eq!(
            verify_signature(&public_key, &sig_b64, "tampered"),
            Err(AuthError::BadSignature)
        );
    }

    #[test]
    fn verify_signature_rejects_malformed_base64() {
        let (_signing_key, public_key) = make_identity();
        assert_eq!(
            verify_signature(&public_key, "not-valid-base64!!!", "payload"),
            Err(AuthError::BadHeader)
        );
    }

    #[test]
    fn check_freshness_accepts_within_window() {
        let now = Utc::now().to_rfc3339();
        assert!(check_freshness(&now, Duration::from_secs(300)).is_ok());
    }

    #[test]
    fn check_freshness_rejects_stale_timestamp() {
        let stale = (Utc::now() - chrono::Duration::minutes(10)).to_rfc3339();
        assert_eq!(
            check_freshness(&stale, Duration::from_secs(300)),
            Err(AuthError::ClockSkew)
        );
    }

    #[test]
    fn watch_and_collect_signatures_are_not_interchangeable() {
        use relay_protocol::handoff_prefixes;

        let (signing_key, public_key) = make_identity();
        let timestamp = Utc::now().to_rfc3339();
        let watch_payload = format!("{}\n{}\n{}", handoff_prefixes::WATCH, public_key, timestamp);
        let sig = signing_key.sign(watch_payload.as_bytes());
        let sig_b64 = URL_SAFE_NO_PAD.encode(sig.to_bytes());

        let collect_payload =
            format!("{}\n{}\n{}", handoff_prefixes::COLLECT, public_key, timestamp);
        assert_eq!(
            verify_signature(&public_key, &sig_b64, &collect_payload),
            Err(AuthError::BadSignature)
        );
        assert!(verify_signature(&public_key, &sig_b64, &watch_payload).is_ok());
    }

    #[test]
    fn check_freshness_rejects_unparseable_timestamp() {
        assert_eq!(
            check_freshness("not-a-timestamp", Duration::from_secs(300)),
            Err(AuthError::BadHeader)
        );
    }
}
