use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Open,
    InProgress,
    Closed,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 3] = [Self::Open, Self::InProgress, Self::Closed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "inprogress",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "Invalid status '{}'. Must be one of: open, inprogress, closed",
                    s
                )
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub ticket_id: i64,
    pub title: String,
    pub description: String,
    pub status: TicketStatus,
    pub user_assigned: String,
    pub assigned_to: Option<String>,
    pub category_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub comment_id: i64,
    pub ticket_id: i64,
    pub comment_text: String,
    pub user_commented: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub category_id: i64,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_status_parses_known_values() {
        assert_eq!("open".parse::<TicketStatus>().unwrap(), TicketStatus::Open);
        assert_eq!(
            "inprogress".parse::<TicketStatus>().unwrap(),
            TicketStatus::InProgress
        );
        assert_eq!(
            "closed".parse::<TicketStatus>().unwrap(),
            TicketStatus::Closed
        );
    }

    #[test]
    fn test_status_rejects_near_misses() {
        assert!("Open".parse::<TicketStatus>().is_err());
        assert!("in_progress".parse::<TicketStatus>().is_err());
        assert!("".parse::<TicketStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_as_wire_string() {
        let json = serde_json::to_string(&TicketStatus::InProgress).unwrap();
        assert_eq!(json, "\"inprogress\"");
    }

    proptest! {
        #[test]
        fn prop_status_only_three_values(s in "[a-z]{0,12}") {
            let parsed = s.parse::<TicketStatus>();
            let known = ["open", "inprogress", "closed"].contains(&s.as_str());
            prop_assert_eq!(parsed.is_ok(), known);
        }
    }
}
