use sqlx::PgPool;
use uuid::Uuid;

/// Upload quota check (§4.4: at most two uploads per `day_id` per author).
pub async fn count_uploads_for_day(
    pool: &PgPool,
    author_key: &str,
    day_id: &str,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query!(
        "SELECT COUNT(*) AS count FROM entries WHERE author_key = $1 AND day_id = $2",
        author_key,
        day_id,
    )
    .fetch_one(pool)
    .await?;

    Ok(row.count.unwrap_or(0))
}

pub async fn insert_entry(
    pool: &PgPool,
    id: Uuid,
    author_key: &str,
    pair_id: Uuid,
    day_id: &str,
    payload: &[u8],
) -> Result<(), sqlx::Error> {
    sqlx::query!(
        r#"INSERT INTO entries (id, author_key, pair_id, day_id, payload)
           VALUES ($1, $2, $3, $4, $5)"#,
        id,
        author_key,
        pair_id,
        day_id,
        payload,
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub struct EntryRow {
    pub id: Uuid,
    pub day_id: String,
    pub payload: Vec<u8>,
}

/// Entries authored by the caller's partner, not yet fetched (§4.4). There is
/// no `ackedAt IS NULL` filter: an acked entry is deleted outright, so
/// fetched-but-unacked and never-fetched rows are the only states that exist.
pub async fn fetch_undelivered(
    pool: &PgPool,
    pair_id: Uuid,
    partner_key: &str,
    since: &str,
) -> Result<Vec<EntryRow>, sqlx::Error> {
    let rows = sqlx::query!(
        r#"SELECT id, day_id, payload FROM entries
           WHERE pair_id = $1 AND author_key = $2 AND day_id >= $3
           ORDER BY day_id ASC"#,
        pair_id,
        partner_key,
        since,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| EntryRow {
            id: r.id,
            day_id: r.day_id,
            payload: r.payload,
        })
        .collect())
}

pub async fn mark_fetched(pool: &PgPool, ids: &[Uuid]) -> Result<(), sqlx::Error> {
    sqlx::query!(
        "UPDATE entries SET fetched_at = now() WHERE id = ANY($1) AND fetched_at IS NULL",
        ids,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Ack is a hard delete (§4.4). The `author_key = partner_key` predicate is
/// what makes self-ack impossible: a caller can only delete entries their
/// partner authored, never their own.
pub async fn ack_entries(
    pool: &PgPool,
    ids: &[Uuid],
    pair_id: Uuid,
    partner_key: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query!(
        r#"DELETE FROM entries
           WHERE id = ANY($1) AND pair_id = $2 AND author_key = $3"#,
        ids,
        pair_id,
        partner_key,
    )
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
