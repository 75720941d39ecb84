use actix_web::web::{Data, Json, Path, Query};
use chrono::Utc;
use sqlx::{query, query_as, query_scalar, PgPool};
use uuid::Uuid;

use crate::context::UserInfo;
use crate::error::{vote_insert_error, Error};
use crate::models::poll::Poll;
use crate::models::vote::Vote;
use crate::response::{CreateResponse, DeleteResponse, List};
use crate::serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct CastVote {
    pub option_id: Uuid,
}

// The row lock serializes a cast against a concurrent close or delete of the
// same poll; the one-vote-per-user rule itself is NOT enforced by the checks
// here but by the votes_one_per_user index, so two racing casts can never
// both land (the loser surfaces as AlreadyVoted via the 23505 mapping).
pub async fn create(user_info: UserInfo, path: Path<(Uuid,)>, body: Json<CastVote>, db: Data<PgPool>) -> Result<Json<CreateResponse>, Error> {
    let (poll_id,) = path.into_inner();
    let mut tx = db.begin().await?;
    let poll: Poll = query_as("SELECT * FROM polls WHERE id = $1 FOR UPDATE")
        .bind(poll_id)
        .fetch_optional(&mut tx)
        .await?
        .ok_or(Error::PollNotFound)?;
    if !poll.is_open_at(Utc::now()) {
        return Err(Error::PollClosed);
    }
    let belongs: bool = query_scalar("SELECT EXISTS(SELECT 1 FROM poll_options WHERE id = $1 AND poll_id = $2)")
        .bind(body.option_id)
        .bind(poll_id)
        .fetch_one(&mut tx)
        .await?;
    if !belongs {
        return Err(Error::InvalidOption);
    }
    // single_choice is snapshotted from the poll inside the same statement
    // so the partial unique index applies exactly when the poll is
    // single-choice.
    let id: Uuid = query_scalar(
        "INSERT INTO votes (poll_id, option_id, user_id, single_choice)
        SELECT p.id, $2, $3, NOT p.allow_multiple_votes
        FROM polls AS p
        WHERE p.id = $1
        RETURNING id",
    )
    .bind(poll_id)
    .bind(body.option_id)
    .bind(user_info.id)
    .fetch_one(&mut tx)
    .await
    .map_err(vote_insert_error)?;
    tx.commit().await?;
    Ok(Json(CreateResponse { id }))
}

// Retracting is only allowed while the poll is open, mirroring the cast rule.
pub async fn retract(user_info: UserInfo, path: Path<(Uuid,)>, db: Data<PgPool>) -> Result<Json<DeleteResponse>, Error> {
    let (poll_id,) = path.into_inner();
    let mut tx = db.begin().await?;
    let poll: Poll = query_as("SELECT * FROM polls WHERE id = $1 FOR UPDATE")
        .bind(poll_id)
        .fetch_optional(&mut tx)
        .await?
        .ok_or(Error::PollNotFound)?;
    if !poll.is_open_at(Utc::now()) {
        return Err(Error::PollClosed);
    }
    let deleted = query("DELETE FROM votes WHERE poll_id = $1 AND user_id = $2")
        .bind(poll_id)
        .bind(user_info.id)
        .execute(&mut tx)
        .await?
        .rows_affected();
    tx.commit().await?;
    Ok(Json(DeleteResponse::new(deleted)))
}

#[derive(Debug, Deserialize)]
pub struct MyVotesParams {
    pub page: i64,
    pub size: i64,
}

pub async fn my_votes(user_info: UserInfo, Query(MyVotesParams { page, size }): Query<MyVotesParams>, db: Data<PgPool>) -> Result<Json<List<Vote>>, Error> {
    let mut conn = db.acquire().await?;
    let total: i64 = query_scalar("SELECT COUNT(*) FROM votes WHERE user_id = $1")
        .bind(user_info.id)
        .fetch_one(&mut conn)
        .await?;
    let votes: Vec<Vote> = query_as(
        "SELECT id, poll_id, option_id, user_id, created_at
        FROM votes
        WHERE user_id = $1
        ORDER BY created_at DESC
        LIMIT $2
        OFFSET $3",
    )
    .bind(user_info.id)
    .bind(size)
    .bind((page - 1) * size)
    .fetch_all(&mut conn)
    .await?;
    Ok(Json(List::new(votes, total)))
}
