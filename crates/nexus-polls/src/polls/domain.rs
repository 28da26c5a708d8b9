use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

use crate::auth::UserId;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

record_id!(
    /// Identifier of a stored poll.
    PollId
);
record_id!(
    /// Identifier of a stored choice.
    ChoiceId
);
record_id!(
    /// Identifier of a recorded vote.
    VoteId
);

/// A question with an optional expiry. Owns its choices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poll {
    pub id: PollId,
    pub question: String,
    pub pub_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
}

impl Poll {
    /// Voting is allowed until `end_date`, exclusive. Polls without one never close.
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        match self.end_date {
            Some(end) => now < end,
            None => true,
        }
    }
}

/// One selectable answer of a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub id: ChoiceId,
    pub poll: PollId,
    pub choice_text: String,
}

/// A user's single ballot for a poll.
///
/// `poll` is copied from the choice at insert time so the store can index
/// ballots by (user, poll).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub id: VoteId,
    pub user: UserId,
    pub choice: ChoiceId,
    pub poll: PollId,
    pub voted_at: DateTime<Utc>,
}

/// Poll plus nested choice texts, inserted atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPoll {
    pub question: String,
    pub end_date: Option<DateTime<Utc>>,
    pub choices: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChoice {
    pub poll: PollId,
    pub choice_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewVote {
    pub user: UserId,
    pub choice: ChoiceId,
    pub poll: PollId,
}

/// Body of `POST /api/polls/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct PollSubmission {
    #[validate(length(min = 1, max = 200, message = "Ensure this field has between 1 and 200 characters."))]
    pub question: String,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub choices: Vec<ChoiceDraft>,
}

/// Nested choice supplied while creating a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ChoiceDraft {
    #[validate(length(min = 1, max = 200, message = "Ensure this field has between 1 and 200 characters."))]
    pub choice_text: String,
}

/// Body of `PUT /api/polls/:id/`. An omitted `end_date` clears the expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct PollUpdate {
    #[validate(length(min = 1, max = 200, message = "Ensure this field has between 1 and 200 characters."))]
    pub question: String,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

/// Body of `PATCH /api/polls/:id/`; only supplied fields change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Validate)]
pub struct PollPatch {
    /// `Some(None)` is an explicit `null`, which the service rejects.
    #[serde(default, deserialize_with = "deserialize_present")]
    #[validate(length(min = 1, max = 200, message = "Ensure this field has between 1 and 200 characters."))]
    pub question: Option<Option<String>>,
    /// `None` leaves the expiry alone, `Some(None)` clears it.
    #[serde(default, deserialize_with = "deserialize_present")]
    pub end_date: Option<Option<DateTime<Utc>>>,
}

/// Body of `POST /api/choices/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ChoiceSubmission {
    pub poll: PollId,
    #[validate(length(min = 1, max = 200, message = "Ensure this field has between 1 and 200 characters."))]
    pub choice_text: String,
}

/// Body of `PUT`/`PATCH /api/choices/:id/`. The owning poll never changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Validate)]
pub struct ChoiceUpdate {
    #[serde(default, deserialize_with = "deserialize_present")]
    #[validate(length(min = 1, max = 200, message = "Ensure this field has between 1 and 200 characters."))]
    pub choice_text: Option<Option<String>>,
}

/// Body of `POST /api/polls/:id/vote/`.
///
/// `choice_id` stays untyped so that a numeric string, a number, and garbage
/// all reach the admission check, which reports a single "invalid choice" error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoteRequest {
    #[serde(default)]
    pub choice_id: Option<serde_json::Value>,
}

impl VoteRequest {
    pub fn for_choice(choice: ChoiceId) -> Self {
        Self {
            choice_id: Some(serde_json::Value::from(choice.0)),
        }
    }
}

/// Representation returned after a vote is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteReceipt {
    pub id: VoteId,
    pub choice: ChoiceId,
    pub user: UserId,
    pub voted_at: DateTime<Utc>,
}

impl From<&Vote> for VoteReceipt {
    fn from(vote: &Vote) -> Self {
        Self {
            id: vote.id,
            choice: vote.choice,
            user: vote.user,
            voted_at: vote.voted_at,
        }
    }
}

/// Standalone choice representation used by the choice endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceView {
    pub id: ChoiceId,
    pub poll: PollId,
    pub choice_text: String,
    pub votes_count: u64,
}

fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn poll(end_date: Option<DateTime<Utc>>) -> Poll {
        Poll {
            id: PollId(1),
            question: "Tabs or spaces?".to_string(),
            pub_date: Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap(),
            end_date,
        }
    }

    #[test]
    fn poll_without_end_date_stays_open() {
        let poll = poll(None);
        assert!(poll.is_open_at(poll.pub_date + Duration::days(3650)));
    }

    #[test]
    fn poll_closes_at_end_date() {
        let end = Utc.with_ymd_and_hms(2025, 3, 2, 9, 0, 0).unwrap();
        let poll = poll(Some(end));
        assert!(poll.is_open_at(end - Duration::seconds(1)));
        assert!(!poll.is_open_at(end));
    }

    #[test]
    fn patch_distinguishes_null_from_absent_end_date() {
        let absent: PollPatch = serde_json::from_str(r#"{"question":"Q"}"#).unwrap();
        assert_eq!(absent.end_date, None);

        let cleared: PollPatch = serde_json::from_str(r#"{"end_date":null}"#).unwrap();
        assert_eq!(cleared.end_date, Some(None));

        let set: PollPatch =
            serde_json::from_str(r#"{"end_date":"2025-04-01T00:00:00Z"}"#).unwrap();
        assert_eq!(
            set.end_date,
            Some(Some(Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap()))
        );
    }

    #[test]
    fn patch_keeps_explicit_null_text_apart_from_absence() {
        let absent: PollPatch = serde_json::from_str(r#"{"end_date":null}"#).unwrap();
        assert_eq!(absent.question, None);

        let null: PollPatch = serde_json::from_str(r#"{"question":null}"#).unwrap();
        assert_eq!(null.question, Some(None));

        let null: ChoiceUpdate = serde_json::from_str(r#"{"choice_text":null}"#).unwrap();
        assert_eq!(null.choice_text, Some(None));
        assert_eq!(
            serde_json::from_str::<ChoiceUpdate>("{}").unwrap().choice_text,
            None
        );
    }

    #[test]
    fn submission_rejects_overlong_question() {
        let submission = PollSubmission {
            question: "x".repeat(201),
            end_date: None,
            choices: Vec::new(),
        };
        let errors = submission.validate().expect_err("question too long");
        assert!(errors.field_errors().contains_key("question"));
    }

    #[test]
    fn ids_serialize_as_bare_integers() {
        let receipt = VoteReceipt {
            id: VoteId(7),
            choice: ChoiceId(3),
            user: UserId(2),
            voted_at: Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap(),
        };
        let value = serde_json::to_value(&receipt).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["choice"], 3);
        assert_eq!(value["user"], 2);
    }
}
