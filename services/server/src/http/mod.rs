pub mod account;
pub mod entries;
pub mod pairing;
pub mod push;

use axum::http::{HeaderMap, Uri};

use crate::auth::{self, AuthError, VerifiedRequest};
use crate::error::AppError;
use crate::state::AppState;

/// Runs the §4.1 signature verifier. Every failure reason maps uniformly to
/// 401 (§7: "signature/replay failures are uniformly 401 to avoid leaking
/// which part failed") except a genuine database error, which is a 500
/// (§7: "database errors in user-facing paths become 500") rather than a
/// disguised auth failure.
pub async fn authenticate(
    state: &AppState,
    method: &str,
    uri: &Uri,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<VerifiedRequest, AppError> {
    let path_with_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());

    auth::verify_request(
        &state.pool,
        state.config.replay_window,
        method,
        path_with_query,
        body,
        headers,
    )
    .await
    .map_err(|err| match err {
        AuthError::Database(detail) => AppError::Internal(detail),
        _ => AppError::Unauthenticated,
    })
}
