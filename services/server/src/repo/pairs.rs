use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// The initiate-pair transaction (§4.2): new pair, upserted initiator user
/// (re-pair semantics — prior pair membership and push subscription are
/// forfeited), new relay token.
pub async fn initiate_pair(
    pool: &PgPool,
    public_key: &str,
    token: &str,
    expires_at: DateTime<Utc>,
) -> Result<Uuid, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let pair_id = Uuid::new_v4();

    sqlx::query!("INSERT INTO pairs (id) VALUES ($1)", pair_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query!(
        r#"INSERT INTO users (public_key, pair_id)
           VALUES ($1, $2)
           ON CONFLICT (public_key) DO UPDATE
               SET pair_id = EXCLUDED.pair_id,
                   push_endpoint = NULL,
                   push_p256dh = NULL,
                   push_auth = NULL"#,
        public_key,
        pair_id,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query!(
        r#"INSERT INTO relay_tokens (token, initiator_key, pair_id, expires_at)
           VALUES ($1, $2, $3, $4)"#,
        token,
        public_key,
        pair_id,
        expires_at,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(pair_id)
}

pub struct TokenRow {
    pub pair_id: Uuid,
    /// `None` once the initiator has called `deleteAccount` — the token row
    /// survives as an audit record (§3) with its initiator link cleared.
    pub initiator_key: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
}

/// Fast-fail lookup used for the join endpoint's advisory preconditions
/// (§4.2/§4.3) — the CAS in [`redeem_token_and_join`] remains authoritative.
pub async fn find_token(pool: &PgPool, token: &str) -> Result<Option<TokenRow>, sqlx::Error> {
    let row = sqlx::query!(
        "SELECT pair_id, initiator_key, expires_at, consumed FROM relay_tokens WHERE token = $1",
        token
    )
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| TokenRow {
        pair_id: r.pair_id,
        initiator_key: r.initiator_key,
        expires_at: r.expires_at,
        consumed: r.consumed,
    }))
}

/// The join-pair transaction (§4.2): redeem the token via
/// `UPDATE ... WHERE NOT consumed RETURNING` (the sole race defence against
/// two followers redeeming the same token concurrently), then upsert the
/// follower user with the same re-pair semantics as initiate.
///
/// Returns `Ok(None)` when the CAS loses (token already consumed by a
/// concurrent winner) — the caller maps that to 410 `TokenAlreadyConsumed`.
/// The returned `initiator_key` is `None` only if the initiator deleted
/// their account in the instant between the caller's advisory checks and
/// this transaction.
pub async fn redeem_token_and_join(
    pool: &PgPool,
    token: &str,
    follower_public_key: &str,
) -> Result<Option<(Uuid, Option<String>)>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let redeemed = sqlx::query!(
        r#"UPDATE relay_tokens SET consumed = true
           WHERE token = $1 AND NOT consumed
           RETURNING pair_id, initiator_key"#,
        token,
    )
    .fetch_optional(&mut *tx)
    .await?;

    let Some(redeemed) = redeemed else {
        tx.rollback().await?;
        return Ok(None);
    };

    sqlx::query!(
        r#"INSERT INTO users (public_key, pair_id)
           VALUES ($1, $2)
           ON CONFLICT (public_key) DO UPDATE
               SET pair_id = EXCLUDED.pair_id,
                   push_endpoint = NULL,
                   push_p256dh = NULL,
                   push_auth = NULL"#,
        follower_public_key,
        redeemed.pair_id,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(Some((redeemed.pair_id, redeemed.initiator_key)))
}
