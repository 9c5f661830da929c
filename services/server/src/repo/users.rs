use sqlx::PgPool;
use uuid::Uuid;

/// Deletes the caller's account (§4.3): entries first to satisfy the
/// foreign key, then the user row. The partner's row and history are left
/// untouched — only the caller's membership and subscription disappear.
pub async fn delete_account(pool: &PgPool, public_key: &str) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query!("DELETE FROM entries WHERE author_key = $1", public_key)
        .execute(&mut *tx)
        .await?;

    sqlx::query!("DELETE FROM users WHERE public_key = $1", public_key)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// The partner's public key for a pair, or `None` if no partner has joined
/// yet (§4.2 status: "paired: false" case).
pub async fn partner_public_key(
    pool: &PgPool,
    pair_id: Uuid,
    caller_public_key: &str,
) -> Result<Option<String>, sqlx::Error> {
    let row = sqlx::query!(
        "SELECT public_key FROM users WHERE pair_id = $1 AND public_key != $2",
        pair_id,
        caller_public_key,
    )
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.public_key))
}

pub struct PushSubscription {
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
}

pub async fn set_push_subscription(
    pool: &PgPool,
    public_key: &str,
    sub: &PushSubscription,
) -> Result<(), sqlx::Error> {
    sqlx::query!(
        r#"UPDATE users SET push_endpoint = $2, push_p256dh = $3, push_auth = $4
           WHERE public_key = $1"#,
        public_key,
        sub.endpoint,
        sub.p256dh,
        sub.auth,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Clears a subscription after the push transport reports 410 Gone (§4.7) —
/// the endpoint is dead and must not be retried.
pub async fn clear_push_subscription(pool: &PgPool, public_key: &str) -> Result<(), sqlx::Error> {
    sqlx::query!(
        r#"UPDATE users SET push_endpoint = NULL, push_p256dh = NULL, push_auth = NULL
           WHERE public_key = $1"#,
        public_key,
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_push_subscription(
    pool: &PgPool,
    public_key: &str,
) -> Result<Option<PushSubscription>, sqlx::Error> {
    let row = sqlx::query!(
        "SELECT push_endpoint, push_p256dh, push_auth FROM users WHERE public_key = $1",
        public_key,
    )
    .fetch_optional(pool)
    .await?;

    Ok(row.and_then(|r| {
        Some(PushSubscription {
            endpoint: r.push_endpoint?,
            p256dh: r.push_p256dh?,
            auth: r.push_auth?,
        })
    }))
}
