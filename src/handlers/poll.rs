use actix_web::web::{Data, Json, Path, Query};
use chrono::{DateTime, Utc};
use sqlx::{query_as, FromRow, PgPool, QueryBuilder};
use uuid::Uuid;

use crate::context::UserInfo;
use crate::error::Error;
use crate::models::poll::{fill_percentages, OptionTally, Poll, PollDetail, PollStatus};
use crate::response::{CreateResponse, DeleteResponse, List};
use crate::serde::{Deserialize, Serialize};

pub const MAX_OPTIONS: usize = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct PollCreation {
    pub title: String,
    pub description: Option<String>,
    pub options: Vec<String>,
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub allow_multiple_votes: bool,
    #[serde(default)]
    pub is_anonymous: bool,
}

fn validate_creation(body: &PollCreation, now: DateTime<Utc>) -> Result<Vec<String>, Error> {
    if body.title.trim().is_empty() {
        return Err(Error::BusinessError("title must not be empty".into()));
    }
    let options: Vec<String> = body.options.iter().map(|o| o.trim().to_owned()).filter(|o| !o.is_empty()).collect();
    if options.len() < 2 {
        return Err(Error::BusinessError("a poll needs at least 2 options".into()));
    }
    if options.len() > MAX_OPTIONS {
        return Err(Error::BusinessError(format!("a poll can have at most {} options", MAX_OPTIONS)));
    }
    for (i, opt) in options.iter().enumerate() {
        if options[..i].contains(opt) {
            return Err(Error::BusinessError(format!("duplicate option: {}", opt)));
        }
    }
    if let Some(end) = body.end_date {
        if end <= now {
            return Err(Error::BusinessError("end date must be in the future".into()));
        }
    }
    Ok(options)
}

// Poll and options are one aggregate: both inserts share a transaction so a
// failed options insert never leaves a poll with zero options behind.
pub async fn create(user_info: UserInfo, body: Json<PollCreation>, db: Data<PgPool>) -> Result<Json<CreateResponse>, Error> {
    let options = validate_creation(&body, Utc::now())?;
    let mut tx = db.begin().await?;
    let poll_id: Uuid = sqlx::query_scalar(
        "INSERT INTO polls (title, description, created_by, allow_multiple_votes, is_anonymous, end_date)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id",
    )
    .bind(body.title.trim())
    .bind(&body.description)
    .bind(user_info.id)
    .bind(body.allow_multiple_votes)
    .bind(body.is_anonymous)
    .bind(body.end_date)
    .fetch_one(&mut tx)
    .await?;
    QueryBuilder::new("INSERT INTO poll_options (poll_id, text, position)")
        .push_values(options.into_iter().enumerate(), |mut b, (position, text)| {
            b.push_bind(poll_id);
            b.push_bind(text);
            b.push_bind(position as i32);
        })
        .build()
        .execute(&mut tx)
        .await?;
    tx.commit().await?;
    Ok(Json(CreateResponse { id: poll_id }))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: i64,
    pub size: i64,
    pub active: Option<bool>,
    pub created_by: Option<Uuid>,
    pub search: Option<String>,
}

#[derive(Debug, FromRow)]
struct PollWithMeta {
    id: Uuid,
    title: String,
    description: Option<String>,
    created_by: Uuid,
    creator_name: String,
    creator_username: String,
    is_active: bool,
    allow_multiple_votes: bool,
    is_anonymous: bool,
    end_date: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    total_votes: i64,
}

#[derive(Debug, Serialize)]
pub struct PollSummary {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub created_by: Uuid,
    pub creator_name: String,
    pub creator_username: String,
    pub status: PollStatus,
    pub allow_multiple_votes: bool,
    pub is_anonymous: bool,
    pub end_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub total_votes: i64,
}

impl PollWithMeta {
    fn into_summary(self, now: DateTime<Utc>) -> PollSummary {
        let open = self.is_active && self.end_date.map(|end| now < end).unwrap_or(true);
        PollSummary {
            id: self.id,
            title: self.title,
            description: self.description,
            created_by: self.created_by,
            creator_name: self.creator_name,
            creator_username: self.creator_username,
            status: if open { PollStatus::Active } else { PollStatus::Closed },
            allow_multiple_votes: self.allow_multiple_votes,
            is_anonymous: self.is_anonymous,
            end_date: self.end_date,
            created_at: self.created_at,
            total_votes: self.total_votes,
        }
    }
}

pub async fn list(Query(ListParams { page, size, active, created_by, search }): Query<ListParams>, db: Data<PgPool>) -> Result<Json<List<PollSummary>>, Error> {
    let mut conn = db.acquire().await?;
    let mut total_query = QueryBuilder::new("SELECT COUNT(*) FROM polls AS p WHERE 1 = 1");
    if let Some(active) = active {
        if active {
            total_query.push(" AND p.is_active AND (p.end_date IS NULL OR p.end_date > now())");
        } else {
            total_query.push(" AND (NOT p.is_active OR p.end_date <= now())");
        }
    }
    if let Some(created_by) = created_by {
        total_query.push(" AND p.created_by = ");
        total_query.push_bind(created_by);
    }
    if let Some(search) = &search {
        total_query.push(" AND p.title ILIKE ");
        total_query.push_bind(format!("%{}%", search));
    }
    let (total,): (i64,) = total_query.build_query_as().fetch_one(&mut conn).await?;
    let mut list_query = QueryBuilder::new(
        "SELECT p.id, p.title, p.description, p.created_by, u.name AS creator_name, u.username AS creator_username,
            p.is_active, p.allow_multiple_votes, p.is_anonymous, p.end_date, p.created_at,
            COUNT(v.id) AS total_votes
        FROM polls AS p
        JOIN users AS u ON p.created_by = u.id
        LEFT JOIN votes AS v ON v.poll_id = p.id
        WHERE 1 = 1",
    );
    if let Some(active) = active {
        if active {
            list_query.push(" AND p.is_active AND (p.end_date IS NULL OR p.end_date > now())");
        } else {
            list_query.push(" AND (NOT p.is_active OR p.end_date <= now())");
        }
    }
    if let Some(created_by) = created_by {
        list_query.push(" AND p.created_by = ");
        list_query.push_bind(created_by);
    }
    if let Some(search) = &search {
        list_query.push(" AND p.title ILIKE ");
        list_query.push_bind(format!("%{}%", search));
    }
    list_query.push(" GROUP BY p.id, u.name, u.username ORDER BY p.created_at DESC LIMIT ");
    list_query.push_bind(size);
    list_query.push(" OFFSET ");
    list_query.push_bind((page - 1) * size);
    let polls: Vec<PollWithMeta> = list_query.build_query_as().fetch_all(&mut conn).await?;
    let now = Utc::now();
    Ok(Json(List::new(polls.into_iter().map(|p| p.into_summary(now)).collect(), total)))
}

/// Loads option tallies for a poll in display order, counts and shares
/// computed from the votes table. Returns the tallies and the poll total.
pub async fn load_tallies<'e, E>(executor: E, poll_id: Uuid) -> Result<(Vec<OptionTally>, i64), Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let mut tallies: Vec<OptionTally> = query_as(
        "SELECT o.id, o.text, COUNT(v.id) AS votes
        FROM poll_options AS o
        LEFT JOIN votes AS v ON v.option_id = o.id
        WHERE o.poll_id = $1
        GROUP BY o.id, o.text, o.position
        ORDER BY o.position",
    )
    .bind(poll_id)
    .fetch_all(executor)
    .await?;
    let total = fill_percentages(&mut tallies);
    Ok((tallies, total))
}

pub async fn detail(path: Path<(Uuid,)>, db: Data<PgPool>) -> Result<Json<PollDetail>, Error> {
    let (poll_id,) = path.into_inner();
    let mut conn = db.acquire().await?;
    let poll: Poll = query_as("SELECT * FROM polls WHERE id = $1")
        .bind(poll_id)
        .fetch_optional(&mut conn)
        .await?
        .ok_or(Error::PollNotFound)?;
    let (creator_name, creator_username): (String, String) = query_as("SELECT name, username FROM users WHERE id = $1")
        .bind(poll.created_by)
        .fetch_one(&mut conn)
        .await?;
    let (options, total_votes) = load_tallies(&mut conn, poll_id).await?;
    let status = poll.status_at(Utc::now());
    Ok(Json(PollDetail {
        id: poll.id,
        title: poll.title,
        description: poll.description,
        created_by: poll.created_by,
        creator_name,
        creator_username,
        status,
        allow_multiple_votes: poll.allow_multiple_votes,
        is_anonymous: poll.is_anonymous,
        end_date: poll.end_date,
        created_at: poll.created_at,
        total_votes,
        options,
    }))
}

pub async fn close(user_info: UserInfo, path: Path<(Uuid,)>, db: Data<PgPool>) -> Result<Json<PollDetail>, Error> {
    let (poll_id,) = path.into_inner();
    let mut tx = db.begin().await?;
    let poll: Poll = query_as("SELECT * FROM polls WHERE id = $1 FOR UPDATE")
        .bind(poll_id)
        .fetch_optional(&mut tx)
        .await?
        .ok_or(Error::PollNotFound)?;
    if poll.created_by != user_info.id {
        return Err(Error::Forbidden);
    }
    sqlx::query("UPDATE polls SET is_active = FALSE, updated_at = now() WHERE id = $1")
        .bind(poll_id)
        .execute(&mut tx)
        .await?;
    tx.commit().await?;
    detail(Path::from((poll_id,)), db).await
}

// Votes and options go with the poll (ON DELETE CASCADE); a poll id that was
// deleted reads back as not-found with no orphaned rows.
pub async fn delete_poll(user_info: UserInfo, path: Path<(Uuid,)>, db: Data<PgPool>) -> Result<Json<DeleteResponse>, Error> {
    let (poll_id,) = path.into_inner();
    let mut tx = db.begin().await?;
    let created_by: Option<Uuid> = sqlx::query_scalar("SELECT created_by FROM polls WHERE id = $1 FOR UPDATE")
        .bind(poll_id)
        .fetch_optional(&mut tx)
        .await?;
    let created_by = created_by.ok_or(Error::PollNotFound)?;
    if created_by != user_info.id {
        return Err(Error::Forbidden);
    }
    let deleted = sqlx::query("DELETE FROM polls WHERE id = $1").bind(poll_id).execute(&mut tx).await?.rows_affected();
    tx.commit().await?;
    Ok(Json(DeleteResponse::new(deleted)))
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Duration;

    fn creation(options: Vec<&str>) -> PollCreation {
        PollCreation {
            title: "favorite season".into(),
            description: None,
            options: options.into_iter().map(String::from).collect(),
            end_date: None,
            allow_multiple_votes: false,
            is_anonymous: false,
        }
    }

    #[test]
    fn test_validate_ok() {
        let opts = validate_creation(&creation(vec!["A", "B", "C"]), Utc::now()).unwrap();
        assert_eq!(opts, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_validate_keeps_option_order() {
        let opts = validate_creation(&creation(vec!["winter", "spring", "summer", "fall"]), Utc::now()).unwrap();
        assert_eq!(opts, vec!["winter", "spring", "summer", "fall"]);
    }

    #[test]
    fn test_validate_empty_title() {
        let mut c = creation(vec!["A", "B"]);
        c.title = "   ".into();
        assert!(validate_creation(&c, Utc::now()).is_err());
    }

    #[test]
    fn test_validate_too_few_options() {
        assert!(validate_creation(&creation(vec!["A"]), Utc::now()).is_err());
        assert!(validate_creation(&creation(vec!["A", "  "]), Utc::now()).is_err());
    }

    #[test]
    fn test_validate_duplicate_options() {
        assert!(validate_creation(&creation(vec!["A", "B", "A"]), Utc::now()).is_err());
    }

    #[test]
    fn test_validate_too_many_options() {
        let opts: Vec<String> = (0..=MAX_OPTIONS).map(|i| format!("opt {}", i)).collect();
        let c = PollCreation {
            options: opts,
            ..creation(vec![])
        };
        assert!(validate_creation(&c, Utc::now()).is_err());
    }

    #[test]
    fn test_validate_past_end_date() {
        let now = Utc::now();
        let mut c = creation(vec!["A", "B"]);
        c.end_date = Some(now - Duration::hours(1));
        assert!(validate_creation(&c, now).is_err());
        c.end_date = Some(now + Duration::hours(1));
        assert!(validate_creation(&c, now).is_ok());
    }
}
