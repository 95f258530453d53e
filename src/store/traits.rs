//! Unified `Database` trait — single async interface for all persistence.
//!
//! Covers both stores the agent touches: the bulletin inbox it owns, and the
//! case-management tables it correlates against. Party, matter, session and
//! calendar rows are read-only to the dispatch cycle; the cycle writes only
//! bulletins, broken-bulletin diagnostics, comments, tasks and
//! potential-party records.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::DatabaseError;
use crate::model::{
    ActionSetting, BrokenBulletin, Bulletin, CalendarDay, CaseComment, CaseTask, CourtSession,
    JuridicalStatus, Matter, Party, PotentialParty,
};

/// Backend-agnostic database trait.
#[async_trait]
pub trait Database: Send + Sync {
    // ── Acquisition ─────────────────────────────────────────────────

    /// Timestamp of the most recent acquisition batch, the resume anchor.
    async fn latest_acquisition_time(&self) -> Result<Option<DateTime<Utc>>, DatabaseError>;

    /// Record one acquisition batch and insert an inbox row per new id.
    /// Ids already present in the inbox are skipped. Returns the number of
    /// rows inserted.
    async fn record_acquisition(
        &self,
        at: DateTime<Utc>,
        external_ids: &[String],
    ) -> Result<usize, DatabaseError>;

    // ── Bulletins ───────────────────────────────────────────────────

    /// Inbox rows whose content has not been fetched yet.
    async fn bulletins_missing_content(&self) -> Result<Vec<Bulletin>, DatabaseError>;

    /// Inbox rows ready for dispatch: content present, not closed, not failed.
    async fn open_bulletins(&self) -> Result<Vec<Bulletin>, DatabaseError>;

    async fn store_bulletin_content(
        &self,
        id: &str,
        content: &str,
    ) -> Result<(), DatabaseError>;

    /// Terminal failure: sets the flag and records the diagnostic text.
    async fn mark_bulletin_failed(&self, id: &str, diagnostic: &str)
    -> Result<(), DatabaseError>;

    /// Terminal success.
    async fn mark_bulletin_closed(&self, id: &str) -> Result<(), DatabaseError>;

    /// Terminal discard (no matching party).
    async fn delete_bulletin(&self, id: &str) -> Result<(), DatabaseError>;

    async fn get_bulletin(&self, id: &str) -> Result<Option<Bulletin>, DatabaseError>;

    // ── Broken-bulletin audit trail ─────────────────────────────────

    async fn insert_broken_bulletin(
        &self,
        bulletin_id: &str,
        errors: &str,
    ) -> Result<(), DatabaseError>;

    async fn broken_bulletins(&self) -> Result<Vec<BrokenBulletin>, DatabaseError>;

    // ── Parties & matters (read-only to the cycle) ──────────────────

    /// Exact-requisite lookup: parties in any of `statuses` whose tax id or
    /// registration id equals one of the given values. `None` arguments never
    /// match.
    async fn find_parties_by_requisites(
        &self,
        statuses: &[JuridicalStatus],
        tax_id: Option<&str>,
        reg_id: Option<&str>,
    ) -> Result<Vec<Party>, DatabaseError>;

    /// All parties in any of `statuses`, matters loaded.
    async fn parties_with_status(
        &self,
        statuses: &[JuridicalStatus],
    ) -> Result<Vec<Party>, DatabaseError>;

    /// Case ids whose registry monitoring is explicitly disabled.
    async fn tracking_disabled_cases(&self) -> Result<HashSet<i64>, DatabaseError>;

    /// Sessions for a case, most recent (highest id) first.
    async fn court_sessions(&self, case_id: i64) -> Result<Vec<CourtSession>, DatabaseError>;

    async fn project_name(&self, project_id: i64) -> Result<Option<String>, DatabaseError>;

    /// Whether a user belongs to the given organizational department.
    async fn is_department_member(
        &self,
        department_id: i64,
        user_id: i64,
    ) -> Result<bool, DatabaseError>;

    // ── Working calendar ────────────────────────────────────────────

    async fn calendar_day(&self, date: NaiveDate) -> Result<Option<CalendarDay>, DatabaseError>;

    /// Earliest calendar row after `date` flagged as working.
    async fn next_working_day_after(
        &self,
        date: NaiveDate,
    ) -> Result<Option<NaiveDate>, DatabaseError>;

    // ── Dispatch products ───────────────────────────────────────────

    /// Highest comment ordering value in the given case, 0 when none.
    async fn max_comment_order_weight(&self, case_id: i64) -> Result<i64, DatabaseError>;

    async fn insert_case_comment(&self, comment: &CaseComment) -> Result<(), DatabaseError>;

    async fn insert_case_task(&self, task: &CaseTask) -> Result<(), DatabaseError>;

    async fn has_potential_party(&self, party_id: i64) -> Result<bool, DatabaseError>;

    async fn insert_potential_party(&self, record: &PotentialParty)
    -> Result<(), DatabaseError>;

    // ── Rule catalog ────────────────────────────────────────────────

    async fn list_action_settings(&self) -> Result<Vec<ActionSetting>, DatabaseError>;

    /// Insert a setting with its templates; returns the new setting id.
    /// Fails on a duplicate normalized key.
    async fn insert_action_setting(&self, setting: &ActionSetting) -> Result<i64, DatabaseError>;

    /// Update a setting's key fields and replace its templates.
    async fn update_action_setting(&self, setting: &ActionSetting) -> Result<(), DatabaseError>;

    // ── Case-management fixtures ────────────────────────────────────
    // Written by the case-management system (and tests), never by the cycle.

    async fn insert_party(&self, party: &Party) -> Result<(), DatabaseError>;

    async fn insert_matter(&self, matter: &Matter) -> Result<(), DatabaseError>;

    async fn insert_court_session(&self, session: &CourtSession) -> Result<(), DatabaseError>;

    async fn insert_calendar_day(&self, day: &CalendarDay) -> Result<(), DatabaseError>;

    async fn insert_project(&self, id: i64, name: &str) -> Result<(), DatabaseError>;

    async fn insert_department_member(
        &self,
        department_id: i64,
        user_id: i64,
    ) -> Result<(), DatabaseError>;

    async fn set_case_tracking_disabled(
        &self,
        case_id: i64,
        disabled: Option<bool>,
    ) -> Result<(), DatabaseError>;

    /// Comments for a case, for assertions and audits.
    async fn case_comments(&self, case_id: i64) -> Result<Vec<CaseComment>, DatabaseError>;

    /// Tasks for a case, for assertions and audits.
    async fn case_tasks(&self, case_id: i64) -> Result<Vec<CaseTask>, DatabaseError>;

    /// Potential-party records, newest first.
    async fn potential_parties(&self) -> Result<Vec<PotentialParty>, DatabaseError>;
}
