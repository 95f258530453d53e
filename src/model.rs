//! Domain types shared across the agent.
//!
//! Naming follows the registry's vocabulary: a *bulletin* is one message
//! fetched from the EFRSB feed, a *party* is a tracked legal or natural
//! person in the case-management store, a *matter* is one case a party is
//! involved in.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ── Inbox ───────────────────────────────────────────────────────────

/// One bulletin row in the inbox.
///
/// Created during acquisition with empty content; content is filled in by the
/// second acquisition step. Exactly one terminal transition happens per row:
/// `closed`, `failed` (with a diagnostic), or deletion when no party matched.
#[derive(Debug, Clone)]
pub struct Bulletin {
    /// Store-generated row id (UUID string).
    pub id: String,
    /// Registry-assigned message id.
    pub external_id: String,
    /// Raw XML content; `None` until fetched.
    pub content: Option<String>,
    pub closed: bool,
    pub failed: bool,
    /// Terminal failure text, if any.
    pub diagnostic: Option<String>,
    pub written_at: DateTime<Utc>,
}

/// Audit record for a bulletin whose dispatch failed.
#[derive(Debug, Clone)]
pub struct BrokenBulletin {
    pub id: String,
    pub bulletin_id: String,
    /// All leaf failure messages, joined with "; ".
    pub errors: String,
    pub created_at: DateTime<Utc>,
}

// ── Parsed facts ────────────────────────────────────────────────────

/// Structured facts extracted from one bulletin's XML.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBulletin {
    /// Registry message id (from the document, not the inbox row).
    pub external_id: String,
    pub published_at: Option<DateTime<Utc>>,
    /// Registry message type, e.g. "ArbitralDecree".
    pub message_type: Option<String>,
    /// Free-text body of the message section.
    pub text: Option<String>,
    pub subject: SubjectDescription,
}

/// Polymorphic description of the debtor referenced by a bulletin.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SubjectDescription {
    /// Discriminator missing or unrecognized.
    #[default]
    Empty,
    Company(CompanyDescription),
    Person(PersonDescription),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompanyDescription {
    pub name: Option<String>,
    pub address: Option<String>,
    /// Tax id (INN).
    pub tax_id: Option<String>,
    /// Registration id (OGRN).
    pub reg_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PersonDescription {
    pub name: Option<PersonName>,
    /// Previous names, each record independently optional in the source.
    pub name_history: Vec<PersonName>,
    pub address: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub birth_place: Option<String>,
    /// Tax id (INN).
    pub tax_id: Option<String>,
    /// Sole-proprietor registration id (OGRNIP).
    pub reg_id: Option<String>,
    /// Pension insurance id (SNILS).
    pub insurance_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PersonName {
    pub first: Option<String>,
    pub last: Option<String>,
    pub middle: Option<String>,
}

impl PersonName {
    /// Canonical `last first middle` form, missing components omitted.
    pub fn canonical(&self) -> String {
        [&self.last, &self.first, &self.middle]
            .into_iter()
            .filter_map(|part| part.as_deref())
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// ── Case-management subjects ────────────────────────────────────────

/// Juridical status of a tracked party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JuridicalStatus {
    Person,
    SoleProprietor,
    Company,
}

impl JuridicalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JuridicalStatus::Person => "person",
            JuridicalStatus::SoleProprietor => "sole_proprietor",
            JuridicalStatus::Company => "company",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "person" => Some(JuridicalStatus::Person),
            "sole_proprietor" => Some(JuridicalStatus::SoleProprietor),
            "company" => Some(JuridicalStatus::Company),
            _ => None,
        }
    }
}

/// A tracked legal or natural person, with its matters loaded eagerly.
#[derive(Debug, Clone)]
pub struct Party {
    pub id: i64,
    pub status: JuridicalStatus,
    /// Tax id (INN).
    pub tax_id: Option<String>,
    /// Registration id (OGRN).
    pub reg_id: Option<String>,
    pub full_name: String,
    pub short_name: String,
    pub matters: Vec<Matter>,
}

/// Status of a matter. Only `Bankruptcy` is relevant to dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatterStatus {
    Bankruptcy,
    Other(String),
}

impl MatterStatus {
    pub fn as_str(&self) -> &str {
        match self {
            MatterStatus::Bankruptcy => "bankruptcy",
            MatterStatus::Other(s) => s,
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "bankruptcy" => MatterStatus::Bankruptcy,
            other => MatterStatus::Other(other.to_string()),
        }
    }
}

/// One case a party is involved in.
#[derive(Debug, Clone)]
pub struct Matter {
    /// Link-row id (party ↔ case).
    pub id: i64,
    pub party_id: i64,
    pub case_id: i64,
    pub status: MatterStatus,
    pub lead_user_id: Option<i64>,
    pub assistant_user_id: Option<i64>,
    pub project_id: Option<i64>,
}

/// A scheduled court session for a case.
#[derive(Debug, Clone)]
pub struct CourtSession {
    pub id: i64,
    pub case_id: i64,
    /// Procedural stage code; `STAGE_ACTIVE` marks an active stage.
    pub stage: i64,
    pub is_current: bool,
}

/// Procedural stage code of a session in an active stage.
pub const STAGE_ACTIVE: i64 = 30;

/// One row of the working calendar.
#[derive(Debug, Clone)]
pub struct CalendarDay {
    pub date: NaiveDate,
    /// `None` means the row exists but carries no flag — treated as working.
    pub is_working: Option<bool>,
}

// ── Rule configuration ──────────────────────────────────────────────

/// Action kind a rule maps a message type to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    Comment,
    Task,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Comment => "comment",
            ActionType::Task => "task",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "comment" => Some(ActionType::Comment),
            "task" => Some(ActionType::Task),
            _ => None,
        }
    }
}

/// Rule mapping one registry message type to an action.
#[derive(Debug, Clone)]
pub struct ActionSetting {
    pub id: i64,
    /// Display key, first letter capitalized.
    pub key: String,
    /// Uppercase lookup key; unique.
    pub normalized_key: String,
    pub action: ActionType,
    /// Task templates; only meaningful when `action` is `Task`.
    pub templates: Vec<TaskTemplate>,
}

/// One task to create when a `Task` rule fires.
#[derive(Debug, Clone)]
pub struct TaskTemplate {
    pub id: i64,
    /// Executor-type name resolved by the executor assignment table.
    pub executor_type: String,
    pub task_type_name: String,
    /// Case-management task status code; tasks without one are not creatable.
    pub task_type_code: Option<i64>,
    /// Due-date offset in days from today.
    pub time_limit_days: Option<i64>,
}

// ── Dispatch products ───────────────────────────────────────────────

/// A case comment created by a `Comment` rule.
#[derive(Debug, Clone)]
pub struct CaseComment {
    pub id: String,
    pub case_id: i64,
    pub text: String,
    /// Per-matter ordering: previous maximum + 1.
    pub order_weight: i64,
    pub creator_user_id: i64,
    pub created_at: DateTime<Utc>,
}

/// A case task created by a `Task` rule.
#[derive(Debug, Clone)]
pub struct CaseTask {
    pub id: String,
    pub case_id: i64,
    pub task_type_code: i64,
    pub executor_user_id: Option<i64>,
    /// Anchoring court session; tasks are never created without one.
    pub court_session_id: i64,
    pub begin_date: NaiveDate,
    pub plan_date: NaiveDate,
    pub fact_date: NaiveDate,
    pub status: i64,
    pub section_code: i64,
    pub creator_user_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Flag record for a party implicated in a bankruptcy bulletin while having
/// no active bankruptcy matter. At most one per party.
#[derive(Debug, Clone)]
pub struct PotentialParty {
    pub id: String,
    pub party_id: i64,
    pub status: JuridicalStatus,
    pub bulletin_external_id: String,
    pub message_type: Option<String>,
    pub setting_key: String,
    pub project_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_name_orders_last_first_middle() {
        let name = PersonName {
            first: Some("Иван".into()),
            last: Some("Иванов".into()),
            middle: Some("Иванович".into()),
        };
        assert_eq!(name.canonical(), "Иванов Иван Иванович");
    }

    #[test]
    fn canonical_name_omits_missing_components() {
        let name = PersonName {
            first: Some("Анна".into()),
            last: Some("Петрова".into()),
            middle: None,
        };
        assert_eq!(name.canonical(), "Петрова Анна");

        let empty = PersonName::default();
        assert_eq!(empty.canonical(), "");
    }

    #[test]
    fn juridical_status_round_trips_through_str() {
        for status in [
            JuridicalStatus::Person,
            JuridicalStatus::SoleProprietor,
            JuridicalStatus::Company,
        ] {
            assert_eq!(JuridicalStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(JuridicalStatus::from_str("llc"), None);
    }

    #[test]
    fn matter_status_keeps_unknown_codes() {
        assert_eq!(MatterStatus::from_str("bankruptcy"), MatterStatus::Bankruptcy);
        let other = MatterStatus::from_str("enforcement");
        assert_eq!(other.as_str(), "enforcement");
    }
}
