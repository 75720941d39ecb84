use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::poll::OptionTally;

#[derive(Debug, Serialize)]
pub struct PollStats {
    pub poll_id: Uuid,
    pub total_votes: i64,
    pub options: Vec<OptionTally>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct UserStats {
    pub polls_created: i64,
    pub votes_cast: i64,
    pub active_polls: i64,
}

/// Site-wide counters for the landing page.
#[derive(Debug, Serialize, FromRow)]
pub struct Summary {
    pub total_polls: i64,
    pub total_votes: i64,
    pub active_polls: i64,
}
