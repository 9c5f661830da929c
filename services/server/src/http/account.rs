use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};

use crate::error::HttpResult;
use crate::http::authenticate;
use crate::repo;
use crate::state::AppState;

pub async fn delete_account(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> HttpResult<StatusCode> {
    let verified = authenticate(&state, method.as_str(), &uri, &headers, b"").await?;

    repo::users::delete_account(&state.pool, &verified.public_key).await?;

    Ok(StatusCode::NO_CONTENT)
}
