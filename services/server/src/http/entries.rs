use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::Json;
use base64::{engine::general_purpose::STANDARD, Engine};
use relay_protocol::{AckRequest, AckResponse, EntriesResponse, EntryDto, UploadRequest, UploadResponse};
use uuid::Uuid;

use crate::error::{AppError, HttpResult};
use crate::http::authenticate;
use crate::push::{PushOutcome, PushSubscriptionTarget};
use crate::repo;
use crate::state::AppState;

/// §6 DayId grammar: exactly ten characters, `^\d{4}-\d{2}-\d{2}$`. Date
/// *validity* is deliberately not enforced (e.g. `2026-13-45` is accepted).
fn is_valid_day_id(day_id: &str) -> bool {
    let bytes = day_id.as_bytes();
    bytes.len() == 10
        && bytes[0..4].iter().all(u8::is_ascii_digit)
        && bytes[4] == b'-'
        && bytes[5..7].iter().all(u8::is_ascii_digit)
        && bytes[7] == b'-'
        && bytes[8..10].iter().all(u8::is_ascii_digit)
}

pub async fn upload(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> HttpResult<(StatusCode, Json<UploadResponse>)> {
    let verified = authenticate(&state, method.as_str(), &uri, &headers, &body).await?;

    let request: UploadRequest = serde_json::from_slice(&body)
        .map_err(|_| AppError::InvalidInput("invalid JSON body".to_owned()))?;

    if !is_valid_day_id(&request.day_id) {
        return Err(AppError::InvalidInput(
            "dayId must match YYYY-MM-DD".to_owned(),
        ));
    }

    // Best-effort per §5: count-then-insert is not strictly atomic, and that
    // tolerance is accepted (the cap is a user-friendly ceiling, not a
    // security boundary).
    let count =
        repo::entries::count_uploads_for_day(&state.pool, &verified.public_key, &request.day_id)
            .await?;
    if count >= 2 {
        return Err(AppError::RateLimited);
    }

    let payload = STANDARD
        .decode(&request.payload)
        .map_err(|_| AppError::InvalidInput("payload must be valid base64".to_owned()))?;

    let id = Uuid::new_v4();
    repo::entries::insert_entry(
        &state.pool,
        id,
        &verified.public_key,
        verified.pair_id,
        &request.day_id,
        &payload,
    )
    .await?;

    // Notify fan-out is detached: upload latency must not couple to push
    // latency (§5), and push failures never surface to the caller (§7).
    let notify_state = state.clone();
    let pair_id = verified.pair_id;
    let author_key = verified.public_key.clone();
    tokio::spawn(async move {
        notify_partner(&notify_state, pair_id, &author_key).await;
    });

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            id,
            status: "stored".to_owned(),
        }),
    ))
}

async fn notify_partner(state: &AppState, pair_id: Uuid, author_key: &str) {
    let partner_key = match repo::users::partner_public_key(&state.pool, pair_id, author_key).await
    {
        Ok(Some(key)) => key,
        Ok(None) => return,
        Err(err) => {
            tracing::warn!(error = %err, "failed to resolve partner for notify");
            return;
        }
    };

    let subscription = match repo::users::get_push_subscription(&state.pool, &partner_key).await {
        Ok(Some(sub)) => sub,
        Ok(None) => return,
        Err(err) => {
            tracing::warn!(error = %err, "failed to load push subscription for notify");
            return;
        }
    };

    let target = PushSubscriptionTarget {
        endpoint: subscription.endpoint,
        p256dh: subscription.p256dh,
        auth: subscription.auth,
    };

    if state.push.send(&target).await == PushOutcome::Gone {
        if let Err(err) = repo::users::clear_push_subscription(&state.pool, &partner_key).await {
            tracing::warn!(error = %err, "failed to clear stale push subscription");
        }
    }
}

pub async fn fetch_undelivered(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> HttpResult<Json<EntriesResponse>> {
    let verified = authenticate(&state, method.as_str(), &uri, &headers, b"").await?;

    let since = since_from_query(uri.query());

    let Some(partner_key) =
        repo::users::partner_public_key(&state.pool, verified.pair_id, &verified.public_key)
            .await?
    else {
        return Ok(Json(EntriesResponse { entries: vec![] }));
    };

    let rows =
        repo::entries::fetch_undelivered(&state.pool, verified.pair_id, &partner_key, &since)
            .await?;

    let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
    if !ids.is_empty() {
        repo::entries::mark_fetched(&state.pool, &ids).await?;
    }

    let entries = rows
        .into_iter()
        .map(|row| EntryDto {
            id: row.id,
            day_id: row.day_id,
            payload: STANDARD.encode(row.payload),
        })
        .collect();

    Ok(Json(EntriesResponse { entries }))
}

fn since_from_query(query: Option<&str>) -> String {
    let Some(query) = query else {
        return "1970-01-01".to_owned();
    };
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("since="))
        .map(str::to_owned)
        .unwrap_or_else(|| "1970-01-01".to_owned())
}

pub async fn ack(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> HttpResult<Json<AckResponse>> {
    let verified = authenticate(&state, method.as_str(), &uri, &headers, &body).await?;

    let request: AckRequest = serde_json::from_slice(&body)
        .map_err(|_| AppError::InvalidInput("invalid JSON body".to_owned()))?;

    if request.entry_ids.is_empty() {
        return Err(AppError::InvalidInput("entryIds must not be empty".to_owned()));
    }

    let Some(partner_key) =
        repo::users::partner_public_key(&state.pool, verified.pair_id, &verified.public_key)
            .await?
    else {
        return Err(AppError::InvalidInput("no partner in this pair".to_owned()));
    };

    let deleted = repo::entries::ack_entries(
        &state.pool,
        &request.entry_ids,
        verified.pair_id,
        &partner_key,
    )
    .await?;

    Ok(Json(AckResponse { deleted }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_id_grammar_accepts_nominally_absurd_but_shaped_dates() {
        assert!(is_valid_day_id("2026-13-45"));
    }

    #[test]
    fn day_id_grammar_rejects_short_years() {
        assert!(!is_valid_day_id("26-01-01"));
    }

    #[test]
    fn day_id_grammar_rejects_non_digit_bytes() {
        assert!(!is_valid_day_id("2026-0a-01"));
    }

    #[test]
    fn since_from_query_falls_back_to_epoch() {
        assert_eq!(since_from_query(None), "1970-01-01");
        assert_eq!(since_from_query(Some("other=x")), "1970-01-01");
    }

    #[test]
    fn since_from_query_reads_the_since_param() {
        assert_eq!(since_from_query(Some("since=2026-02-01")), "2026-02-01");
    }
}
