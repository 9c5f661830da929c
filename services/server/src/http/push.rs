use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, Uri};
use axum::Json;
use relay_protocol::{SubscribeRequest, SubscribeResponse};

use crate::error::{AppError, HttpResult};
use crate::http::authenticate;
use crate::repo::users::{self, PushSubscription};
use crate::state::AppState;

pub async fn subscribe(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> HttpResult<Json<SubscribeResponse>> {
    let verified = authenticate(&state, method.as_str(), &uri, &headers, &body).await?;

    let request: SubscribeRequest = serde_json::from_slice(&body)
        .map_err(|_| AppError::InvalidInput("invalid JSON body".to_owned()))?;

    if request.endpoint.is_empty() || request.p256dh.is_empty() || request.auth.is_empty() {
        return Err(AppError::InvalidInput(
            "endpoint, p256dh and auth are all required".to_owned(),
        ));
    }

    users::set_push_subscription(
        &state.pool,
        &verified.public_key,
        &PushSubscription {
            endpoint: request.endpoint,
            p256dh: request.p256dh,
            auth: request.auth,
        },
    )
    .await?;

    Ok(Json(SubscribeResponse {
        status: "subscribed".to_owned(),
    }))
}
