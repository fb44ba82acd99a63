//! Canned "recent history" windows.
//!
//! Each window ends at a caller-supplied `now` and reaches back a fixed
//! duration:
//! - `lastday`: 24 hours
//! - `lasthour`: 1 hour
//! - `justnow`: 5 minutes

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SearchError;
use crate::query::Query;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecentWindow {
    LastDay,
    LastHour,
    JustNow,
}

impl RecentWindow {
    pub const ALL: [RecentWindow; 3] = [
        RecentWindow::LastDay,
        RecentWindow::LastHour,
        RecentWindow::JustNow,
    ];

    pub fn duration(&self) -> Duration {
        match self {
            RecentWindow::LastDay => Duration::days(1),
            RecentWindow::LastHour => Duration::hours(1),
            RecentWindow::JustNow => Duration::minutes(5),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecentWindow::LastDay => "lastday",
            RecentWindow::LastHour => "lasthour",
            RecentWindow::JustNow => "justnow",
        }
    }

    /// Inclusive `[now - duration, now]` range on the timestamp field.
    pub fn range(&self, field: &str, now: DateTime<Utc>) -> Query {
        Query::date_range(field, now - self.duration(), now)
    }
}

impl std::fmt::Display for RecentWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecentWindow {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|w| w.as_str() == s)
            .ok_or_else(|| SearchError::UnsupportedQuery(format!("unknown window: {}", s)))
    }
}
