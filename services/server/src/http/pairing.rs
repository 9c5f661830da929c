use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::Json;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use rand::rngs::OsRng;
use rand::RngCore;
use relay_protocol::{InitiateRequest, InitiateResponse, JoinRequest, JoinResponse, StatusResponse};

use crate::error::{AppError, HttpResult};
use crate::http::authenticate;
use crate::repo;
use crate::state::AppState;

/// Ed25519 public keys are exactly 32 bytes (§9 "ambient cryptography
/// primitives"); anything else is rejected as `InvalidKey`.
fn validate_public_key(public_key: &str) -> HttpResult<()> {
    let decoded = URL_SAFE_NO_PAD
        .decode(public_key)
        .map_err(|_| AppError::InvalidInput("publicKey is not valid base64".to_owned()))?;
    if decoded.len() != 32 {
        return Err(AppError::InvalidInput(
            "publicKey must decode to 32 bytes".to_owned(),
        ));
    }
    Ok(())
}

fn generate_relay_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub async fn initiate(
    State(state): State<AppState>,
    Json(body): Json<InitiateRequest>,
) -> HttpResult<(StatusCode, Json<InitiateResponse>)> {
    validate_public_key(&body.public_key)?;

    let token = generate_relay_token();
    let expires_at = Utc::now()
        + chrono::Duration::from_std(state.config.token_ttl)
            .unwrap_or_else(|_| chrono::Duration::minutes(10));

    let pair_id =
        repo::pairs::initiate_pair(&state.pool, &body.public_key, &token, expires_at).await?;

    Ok((
        StatusCode::CREATED,
        Json(InitiateResponse {
            pair_id,
            relay_token: token,
        }),
    ))
}

pub async fn join(
    State(state): State<AppState>,
    Json(body): Json<JoinRequest>,
) -> HttpResult<Json<JoinResponse>> {
    validate_public_key(&body.public_key)?;

    let token_row = repo::pairs::find_token(&state.pool, &body.relay_token)
        .await?
        .ok_or_else(|| AppError::NotFound("relay token not found".to_owned()))?;

    // A token whose initiator has since deleted their account is unusable —
    // the row only remains as an audit record (§3).
    let Some(initiator_key) = token_row.initiator_key.clone() else {
        return Err(AppError::NotFound("relay token not found".to_owned()));
    };

    if body.public_key == initiator_key {
        return Err(AppError::InvalidInput(
            "cannot join a pair using the initiator's own key".to_owned(),
        ));
    }
    if token_row.consumed {
        return Err(AppError::Gone("relay token already consumed".to_owned()));
    }
    if token_row.expires_at <= Utc::now() {
        return Err(AppError::Gone("relay token expired".to_owned()));
    }

    // The checks above are advisory fast-fails; this compare-and-swap is the
    // sole authoritative race defence (§4.2).
    let redeemed =
        repo::pairs::redeem_token_and_join(&state.pool, &body.relay_token, &body.public_key)
            .await?;
    let Some((pair_id, initiator_key)) = redeemed else {
        return Err(AppError::Gone("relay token already consumed".to_owned()));
    };
    let Some(initiator_key) = initiator_key else {
        return Err(AppError::Internal(
            "initiator account vanished mid-redemption".to_owned(),
        ));
    };

    state
        .handoff
        .notify_paired(pair_id, body.public_key.clone())
        .await;

    Ok(Json(JoinResponse {
        pair_id,
        partner_public_key: initiator_key,
    }))
}

pub async fn status(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> HttpResult<Json<StatusResponse>> {
    let verified = authenticate(&state, method.as_str(), &uri, &headers, b"").await?;

    let partner =
        repo::users::partner_public_key(&state.pool, verified.pair_id, &verified.public_key)
            .await?;

    Ok(Json(StatusResponse {
        paired: partner.is_some(),
        partner_public_key: partner,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_public_key_rejects_wrong_length() {
        let short = URL_SAFE_NO_PAD.encode([0u8; 16]);
        assert!(validate_public_key(&short).is_err());
    }

    #[test]
    fn validate_public_key_accepts_32_bytes() {
        let key = URL_SAFE_NO_PAD.encode([0u8; 32]);
        assert!(validate_public_key(&key).is_ok());
    }

    #[test]
    fn generate_relay_token_is_url_safe_and_not_trivially_repeated() {
        let a = generate_relay_token();
        let b = generate_relay_token();
        assert_ne!(a, b);
        assert!(!a.contains('+') && !a.contains('/') && !a.contains('='));
    }
}
