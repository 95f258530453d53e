//! Task dispatcher / rule engine.
//!
//! Applies the matched action setting to every resolved party and each of its
//! active bankruptcy matters. Every sub-operation that fails appends a leaf
//! to the bulletin's outcome tree; siblings keep going. The engine never
//! decides the bulletin's terminal state — that is the cycle's job, based on
//! the returned tree.

use std::collections::HashSet;

use chrono::{Duration, NaiveDate, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::dispatch::executor::ExecutorAssigner;
use crate::dispatch::outcome::DispatchOutcome;
use crate::error::DatabaseError;
use crate::model::{
    ActionSetting, ActionType, CaseComment, CaseTask, CourtSession, Matter, MatterStatus, Party,
    ParsedBulletin, PotentialParty, STAGE_ACTIVE, TaskTemplate,
};
use crate::settings::SettingsCatalog;
use crate::store::Database;

/// Comments are filed by the robot's service account.
const COMMENT_CREATOR_USER_ID: i64 = 1;
/// Tasks are filed by a dedicated robot account.
const TASK_CREATOR_USER_ID: i64 = 13;
/// Status code of a freshly created task.
const TASK_STATUS_NEW: i64 = 10;
/// Robot-created tasks always land in this section.
const TASK_SECTION_ROBOT: i64 = 90;

/// Comment text when the bulletin body is empty.
const EMPTY_BODY_PLACEHOLDER: &str = "Робот Банкрот: \"Получено пустое сообщение от ЕФРСБ\"";

pub struct DispatchEngine<'a> {
    db: &'a dyn Database,
    executor: &'a ExecutorAssigner,
}

impl<'a> DispatchEngine<'a> {
    pub fn new(db: &'a dyn Database, executor: &'a ExecutorAssigner) -> Self {
        Self { db, executor }
    }

    /// Apply the configured rule for `parsed` to every resolved party.
    ///
    /// `parties` is non-empty (the caller discards unresolved bulletins
    /// before dispatch). Returns the bulletin's outcome tree.
    pub async fn dispatch(
        &self,
        parsed: &ParsedBulletin,
        parties: &[Party],
        catalog: &SettingsCatalog,
        tracking_disabled: &HashSet<i64>,
        today: NaiveDate,
    ) -> Result<DispatchOutcome, DatabaseError> {
        let mut outcome = DispatchOutcome::root();

        let message_type = parsed.message_type.as_deref().unwrap_or_default();
        let Some(setting) = parsed
            .message_type
            .as_deref()
            .and_then(|t| catalog.find(t))
        else {
            outcome.push(DispatchOutcome::failure(format!(
                "В справочниках отсутствует настройка для типа сообщения \"{}\" с EFRSBID={}",
                message_type, parsed.external_id
            )));
            return Ok(outcome);
        };

        for party in parties {
            let bankrupt_matters: Vec<&Matter> = party
                .matters
                .iter()
                .filter(|m| m.status == MatterStatus::Bankruptcy)
                .collect();

            if bankrupt_matters.is_empty() {
                self.ensure_potential_party(party, parsed, setting, &mut outcome)
                    .await?;
                continue;
            }

            for matter in bankrupt_matters {
                if tracking_disabled.contains(&matter.case_id) {
                    debug!(
                        case_id = matter.case_id,
                        "Registry monitoring disabled for case, skipping"
                    );
                    continue;
                }

                match setting.action {
                    ActionType::Comment => {
                        self.create_comment(matter, parsed, &mut outcome).await;
                    }
                    ActionType::Task => {
                        if setting.templates.is_empty() {
                            outcome.push(DispatchOutcome::failure(format!(
                                "Настройка для типа сообщений {} содержит пустой список задач (EFRSBID={})",
                                message_type, parsed.external_id
                            )));
                            continue;
                        }
                        for template in &setting.templates {
                            self.create_task(matter, parsed, template, today, &mut outcome)
                                .await;
                        }
                    }
                }
            }
        }

        Ok(outcome)
    }

    /// Append a case comment with the bulletin body.
    ///
    /// Any store failure becomes a leaf; siblings continue.
    async fn create_comment(
        &self,
        matter: &Matter,
        parsed: &ParsedBulletin,
        outcome: &mut DispatchOutcome,
    ) {
        let result: Result<(), DatabaseError> = async {
            let order_weight = self.db.max_comment_order_weight(matter.case_id).await? + 1;
            self.db
                .insert_case_comment(&CaseComment {
                    id: Uuid::new_v4().to_string(),
                    case_id: matter.case_id,
                    text: parsed
                        .text
                        .clone()
                        .unwrap_or_else(|| EMPTY_BODY_PLACEHOLDER.to_string()),
                    order_weight,
                    creator_user_id: COMMENT_CREATOR_USER_ID,
                    created_at: Utc::now(),
                })
                .await
        }
        .await;

        if let Err(e) = result {
            warn!(case_id = matter.case_id, error = %e, "Comment creation failed");
            outcome.push(DispatchOutcome::failure(format!(
                "Не удалось создать комментарий в деле с ID={} для сообщения типа \"{}\" с EFRSBID={}",
                matter.id,
                parsed.message_type.as_deref().unwrap_or_default(),
                parsed.external_id
            )));
        }
    }

    /// Create one task from a template.
    ///
    /// Tasks must anchor to a court session; without one the task is not
    /// created and a leaf failure names the task type.
    async fn create_task(
        &self,
        matter: &Matter,
        parsed: &ParsedBulletin,
        template: &TaskTemplate,
        today: NaiveDate,
        outcome: &mut DispatchOutcome,
    ) {
        let result: Result<bool, DatabaseError> = async {
            let Some(code) = template.task_type_code.filter(|c| *c > 0) else {
                return Ok(false);
            };

            let sessions = self.db.court_sessions(matter.case_id).await?;
            let Some(session) = pick_session(&sessions) else {
                return Ok(false);
            };

            let due_date = self
                .nearest_working_day(today + Duration::days(template.time_limit_days.unwrap_or(0)))
                .await?;
            let executor = self
                .executor
                .assign(self.db, matter, &template.executor_type)
                .await?;

            self.db
                .insert_case_task(&CaseTask {
                    id: Uuid::new_v4().to_string(),
                    case_id: matter.case_id,
                    task_type_code: code,
                    executor_user_id: executor,
                    court_session_id: session.id,
                    begin_date: due_date,
                    plan_date: due_date,
                    fact_date: due_date,
                    status: TASK_STATUS_NEW,
                    section_code: TASK_SECTION_ROBOT,
                    creator_user_id: TASK_CREATOR_USER_ID,
                    created_at: Utc::now(),
                })
                .await?;
            Ok(true)
        }
        .await;

        let created = match result {
            Ok(created) => created,
            Err(e) => {
                warn!(case_id = matter.case_id, error = %e, "Task creation failed");
                false
            }
        };

        if !created {
            outcome.push(DispatchOutcome::failure(format!(
                "Не удалось создать задачу \"{}\" в деле с ID={} для сообщения типа \"{}\" с EFRSBID={}",
                template.task_type_name,
                matter.id,
                parsed.message_type.as_deref().unwrap_or_default(),
                parsed.external_id
            )));
        }
    }

    /// Record a party implicated without an active bankruptcy matter.
    ///
    /// Idempotent: at most one record per party, ever.
    async fn ensure_potential_party(
        &self,
        party: &Party,
        parsed: &ParsedBulletin,
        setting: &ActionSetting,
        outcome: &mut DispatchOutcome,
    ) -> Result<(), DatabaseError> {
        if self.db.has_potential_party(party.id).await? {
            return Ok(());
        }

        let project_name = match party.matters.first().and_then(|m| m.project_id) {
            Some(project_id) => self.db.project_name(project_id).await?,
            None => None,
        };

        let record = PotentialParty {
            id: Uuid::new_v4().to_string(),
            party_id: party.id,
            status: party.status,
            bulletin_external_id: parsed.external_id.clone(),
            message_type: parsed.message_type.clone(),
            setting_key: setting.key.clone(),
            project_name,
            created_at: Utc::now(),
        };

        match self.db.insert_potential_party(&record).await {
            Ok(()) => {
                debug!(party_id = party.id, "Recorded potential bankrupt");
                Ok(())
            }
            // Lost a race with an earlier bulletin in the same cycle — the
            // record exists, which is all the invariant asks for.
            Err(DatabaseError::Constraint(_)) => Ok(()),
            Err(e) => {
                warn!(party_id = party.id, error = %e, "Potential-party insert failed");
                outcome.push(DispatchOutcome::failure(format!(
                    "Не удалось создать запись о потенциальном банкроте для субъекта с ID={} (EFRSBID={})",
                    party.id, parsed.external_id
                )));
                Ok(())
            }
        }
    }

    /// Nearest working day at or after `date`.
    ///
    /// A missing calendar row, or one without an explicit non-working flag,
    /// accepts the candidate. An explicitly non-working day advances to the
    /// next row flagged working; a calendar with no such row keeps the
    /// candidate unchanged.
    pub async fn nearest_working_day(&self, date: NaiveDate) -> Result<NaiveDate, DatabaseError> {
        match self.db.calendar_day(date).await? {
            Some(day) if day.is_working == Some(false) => Ok(self
                .db
                .next_working_day_after(date)
                .await?
                .unwrap_or(date)),
            _ => Ok(date),
        }
    }
}

/// Session the task anchors to: the most recent one in an active procedural
/// stage, else the one flagged current.
fn pick_session(sessions: &[CourtSession]) -> Option<&CourtSession> {
    sessions
        .iter()
        .find(|s| s.stage == STAGE_ACTIVE)
        .or_else(|| sessions.iter().find(|s| s.is_current))
}
