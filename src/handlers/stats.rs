use actix_web::web::{Data, Json, Path};
use sqlx::{query_as, query_scalar, PgPool};
use uuid::Uuid;

use crate::error::Error;
use crate::handlers::poll::load_tallies;
use crate::models::stats::{PollStats, Summary, UserStats};

pub async fn poll_stats(path: Path<(Uuid,)>, db: Data<PgPool>) -> Result<Json<PollStats>, Error> {
    let (poll_id,) = path.into_inner();
    let mut conn = db.acquire().await?;
    let exists: bool = query_scalar("SELECT EXISTS(SELECT 1 FROM polls WHERE id = $1)")
        .bind(poll_id)
        .fetch_one(&mut conn)
        .await?;
    if !exists {
        return Err(Error::PollNotFound);
    }
    let (options, total_votes) = load_tallies(&mut conn, poll_id).await?;
    Ok(Json(PollStats { poll_id, total_votes, options }))
}

pub async fn user_stats(path: Path<(Uuid,)>, db: Data<PgPool>) -> Result<Json<UserStats>, Error> {
    let (user_id,) = path.into_inner();
    let mut conn = db.acquire().await?;
    let exists: bool = query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
        .bind(user_id)
        .fetch_one(&mut conn)
        .await?;
    if !exists {
        return Err(Error::UserNotFound);
    }
    let stats: UserStats = query_as(
        "SELECT
            (SELECT COUNT(*) FROM polls WHERE created_by = $1) AS polls_created,
            (SELECT COUNT(*) FROM votes WHERE user_id = $1) AS votes_cast,
            (SELECT COUNT(*) FROM polls
                WHERE created_by = $1 AND is_active AND (end_date IS NULL OR end_date > now())) AS active_polls",
    )
    .bind(user_id)
    .fetch_one(&mut conn)
    .await?;
    Ok(Json(stats))
}

pub async fn summary(db: Data<PgPool>) -> Result<Json<Summary>, Error> {
    let mut conn = db.acquire().await?;
    let summary: Summary = query_as(
        "SELECT
            (SELECT COUNT(*) FROM polls) AS total_polls,
            (SELECT COUNT(*) FROM votes) AS total_votes,
            (SELECT COUNT(*) FROM polls
                WHERE is_active AND (end_date IS NULL OR end_date > now())) AS active_polls",
    )
    .fetch_one(&mut conn)
    .await?;
    Ok(Json(summary))
}
