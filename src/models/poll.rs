use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollStatus {
    Active,
    Closed,
}

#[derive(Debug, Clone, FromRow)]
pub struct Poll {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub created_by: Uuid,
    pub is_active: bool,
    pub allow_multiple_votes: bool,
    pub is_anonymous: bool,
    pub end_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Poll {
    /// A poll is open while its owner has not closed it and its end date,
    /// if any, has not passed. The stored flag alone is never trusted: a
    /// poll whose end date is in the past reads as closed regardless.
    pub fn status_at(&self, now: DateTime<Utc>) -> PollStatus {
        if !self.is_active {
            return PollStatus::Closed;
        }
        match self.end_date {
            Some(end) if now >= end => PollStatus::Closed,
            _ => PollStatus::Active,
        }
    }

    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.status_at(now) == PollStatus::Active
    }
}

/// One option of a poll with its vote count and share, both computed from
/// the votes table at read time.
#[derive(Debug, Serialize, FromRow)]
pub struct OptionTally {
    pub id: Uuid,
    pub text: String,
    pub votes: i64,
    #[sqlx(default)]
    pub percentage: f64,
}

/// Fills in each tally's percentage from the given counts. An empty poll
/// (total 0) yields all zeros instead of dividing by zero.
pub fn fill_percentages(tallies: &mut [OptionTally]) -> i64 {
    let total: i64 = tallies.iter().map(|t| t.votes).sum();
    for t in tallies.iter_mut() {
        t.percentage = if total > 0 {
            t.votes as f64 / total as f64 * 100.0
        } else {
            0.0
        };
    }
    total
}

#[derive(Debug, Serialize)]
pub struct PollDetail {
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
    pub options: Vec<OptionTally>,
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Duration;

    fn poll(is_active: bool, end_date: Option<DateTime<Utc>>) -> Poll {
        let now = Utc::now();
        Poll {
            id: Uuid::new_v4(),
            title: "favorite season".into(),
            description: None,
            created_by: Uuid::new_v4(),
            is_active,
            allow_multiple_votes: false,
            is_anonymous: false,
            end_date,
            created_at: now,
            updated_at: now,
        }
    }

    fn tally(votes: i64) -> OptionTally {
        OptionTally {
            id: Uuid::new_v4(),
            text: "opt".into(),
            votes,
            percentage: 0.0,
        }
    }

    #[test]
    fn test_status_open_without_end_date() {
        let p = poll(true, None);
        assert_eq!(p.status_at(Utc::now()), PollStatus::Active);
    }

    #[test]
    fn test_status_closed_past_end_date_even_if_flag_active() {
        let now = Utc::now();
        let p = poll(true, Some(now - Duration::hours(1)));
        assert_eq!(p.status_at(now), PollStatus::Closed);
    }

    #[test]
    fn test_status_open_before_end_date() {
        let now = Utc::now();
        let p = poll(true, Some(now + Duration::hours(1)));
        assert_eq!(p.status_at(now), PollStatus::Active);
    }

    #[test]
    fn test_status_closed_by_owner_flag() {
        let now = Utc::now();
        let p = poll(false, Some(now + Duration::days(7)));
        assert_eq!(p.status_at(now), PollStatus::Closed);
    }

    #[test]
    fn test_status_closed_exactly_at_end_date() {
        let now = Utc::now();
        let p = poll(true, Some(now));
        assert_eq!(p.status_at(now), PollStatus::Closed);
    }

    #[test]
    fn test_percentages_zero_total() {
        let mut tallies = vec![tally(0), tally(0), tally(0)];
        let total = fill_percentages(&mut tallies);
        assert_eq!(total, 0);
        assert!(tallies.iter().all(|t| t.percentage == 0.0));
    }

    #[test]
    fn test_percentages_uneven_split() {
        let mut tallies = vec![tally(3), tally(1)];
        let total = fill_percentages(&mut tallies);
        assert_eq!(total, 4);
        assert_eq!(tallies[0].percentage, 75.0);
        assert_eq!(tallies[1].percentage, 25.0);
    }

    #[test]
    fn test_percentages_sum_to_hundred() {
        let mut tallies = vec![tally(1), tally(1), tally(1)];
        fill_percentages(&mut tallies);
        let sum: f64 = tallies.iter().map(|t| t.percentage).sum();
        assert!((sum - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_percentages_single_winner() {
        let mut tallies = vec![tally(5), tally(0)];
        fill_percentages(&mut tallies);
        assert_eq!(tallies[0].percentage, 100.0);
        assert_eq!(tallies[1].percentage, 0.0);
    }
}
