//! Executor assignment — deterministic table keyed by executor-type name.
//!
//! The service/system user ids and the archived-case override table are
//! configuration (`ExecutorRules`), injected here rather than scattered
//! through the dispatch logic.

use tracing::debug;

use crate::error::DatabaseError;
use crate::model::Matter;
use crate::store::Database;

/// Executor-type name: the matter's lead user.
pub const EXECUTOR_LAWYER: &str = "Lawyer";
/// Executor-type name: the matter's assistant.
pub const EXECUTOR_APPRENTICE: &str = "Apprentice";

/// Business rules for executor resolution.
#[derive(Debug, Clone)]
pub struct ExecutorRules {
    /// Service/system user ids that never receive tasks.
    pub excluded_user_ids: Vec<i64>,
    /// Lead or assistant equal to this id marks an archived special case.
    pub archived_marker_user_id: i64,
    /// Replacement executor for archived cases in override projects.
    pub archived_override_user_id: i64,
    /// Projects where archived cases get the override executor.
    pub archived_override_project_ids: Vec<i64>,
    /// Projects where archived cases get no executor at all.
    pub archived_dropped_project_ids: Vec<i64>,
    /// Assistants in this department never act as apprentices.
    pub apprentice_blocked_department_id: i64,
}

impl Default for ExecutorRules {
    fn default() -> Self {
        Self {
            excluded_user_ids: vec![-1, 0, 1, 11, 12, 10059, 10413, 10498],
            archived_marker_user_id: 10059,
            archived_override_user_id: 10413,
            archived_override_project_ids: vec![33, 47],
            archived_dropped_project_ids: vec![104],
            apprentice_blocked_department_id: 3,
        }
    }
}

impl ExecutorRules {
    /// Build from environment, falling back to defaults per field.
    pub fn from_env() -> Self {
        let mut rules = Self::default();
        if let Some(ids) = id_list_env("EFRSB_EXECUTOR_EXCLUDED_IDS") {
            rules.excluded_user_ids = ids;
        }
        if let Some(ids) = id_list_env("EFRSB_ARCHIVED_OVERRIDE_PROJECTS") {
            rules.archived_override_project_ids = ids;
        }
        if let Some(ids) = id_list_env("EFRSB_ARCHIVED_DROPPED_PROJECTS") {
            rules.archived_dropped_project_ids = ids;
        }
        rules
    }
}

fn id_list_env(var: &str) -> Option<Vec<i64>> {
    let raw = std::env::var(var).ok()?;
    Some(
        raw.split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect(),
    )
}

/// Resolves an executor-type name to a user id for one matter.
pub struct ExecutorAssigner {
    rules: ExecutorRules,
}

impl ExecutorAssigner {
    pub fn new(rules: ExecutorRules) -> Self {
        Self { rules }
    }

    /// Resolve the executor for a matter. `None` means the task is created
    /// without an executor.
    pub async fn assign(
        &self,
        db: &dyn Database,
        matter: &Matter,
        executor_type: &str,
    ) -> Result<Option<i64>, DatabaseError> {
        match executor_type {
            EXECUTOR_LAWYER => self.lawyer(matter),
            EXECUTOR_APPRENTICE => self.apprentice(db, matter).await,
            other => {
                debug!(executor_type = other, "Unknown executor type, no executor");
                Ok(None)
            }
        }
    }

    fn lawyer(&self, matter: &Matter) -> Result<Option<i64>, DatabaseError> {
        let Some(lead) = matter.lead_user_id else {
            return Ok(None);
        };

        if let Some(verdict) = self.archived_verdict(matter) {
            return Ok(verdict);
        }
        if self.rules.excluded_user_ids.contains(&lead) {
            return Ok(None);
        }
        Ok(Some(lead))
    }

    async fn apprentice(
        &self,
        db: &dyn Database,
        matter: &Matter,
    ) -> Result<Option<i64>, DatabaseError> {
        let Some(assistant) = matter.assistant_user_id else {
            return Ok(None);
        };
        if db
            .is_department_member(self.rules.apprentice_blocked_department_id, assistant)
            .await?
        {
            return Ok(None);
        }

        if let Some(verdict) = self.archived_verdict(matter) {
            return Ok(verdict);
        }
        if self.rules.excluded_user_ids.contains(&assistant) {
            return Ok(None);
        }
        Ok(Some(assistant))
    }

    /// Archived-special-case verdict: `Some(Some(id))` replaces the executor,
    /// `Some(None)` drops it, `None` means the normal rules apply.
    fn archived_verdict(&self, matter: &Matter) -> Option<Option<i64>> {
        let marker = self.rules.archived_marker_user_id;
        let is_archived = matter.lead_user_id == Some(marker)
            || matter.assistant_user_id == Some(marker);
        if !is_archived {
            return None;
        }

        let project = matter.project_id?;
        if self.rules.archived_override_project_ids.contains(&project) {
            return Some(Some(self.rules.archived_override_user_id));
        }
        if self.rules.archived_dropped_project_ids.contains(&project) {
            return Some(None);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MatterStatus;
    use crate::store::LibSqlBackend;

    fn matter(lead: Option<i64>, assistant: Option<i64>, project: Option<i64>) -> Matter {
        Matter {
            id: 1,
            party_id: 1,
            case_id: 100,
            status: MatterStatus::Bankruptcy,
            lead_user_id: lead,
            assistant_user_id: assistant,
            project_id: project,
        }
    }

    fn assigner() -> ExecutorAssigner {
        ExecutorAssigner::new(ExecutorRules::default())
    }

    #[tokio::test]
    async fn lawyer_is_the_matter_lead() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let result = assigner()
            .assign(&db, &matter(Some(200), None, None), EXECUTOR_LAWYER)
            .await
            .unwrap();
        assert_eq!(result, Some(200));
    }

    #[tokio::test]
    async fn excluded_lead_gets_no_executor() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        for excluded in [-1, 0, 1, 11, 12, 10498] {
            let result = assigner()
                .assign(&db, &matter(Some(excluded), None, None), EXECUTOR_LAWYER)
                .await
                .unwrap();
            assert_eq!(result, None, "user {excluded} must be excluded");
        }
    }

    #[tokio::test]
    async fn archived_case_override_projects() {
        let db = LibSqlBackend::new_memory().await.unwrap();

        // Archived marker as lead, override project: replacement executor.
        let result = assigner()
            .assign(&db, &matter(Some(10059), None, Some(33)), EXECUTOR_LAWYER)
            .await
            .unwrap();
        assert_eq!(result, Some(10413));

        // Dropped project: explicitly nobody.
        let result = assigner()
            .assign(&db, &matter(Some(10059), None, Some(104)), EXECUTOR_LAWYER)
            .await
            .unwrap();
        assert_eq!(result, None);

        // Archived but unlisted project: falls through to the exclusion list,
        // and the marker user itself is excluded.
        let result = assigner()
            .assign(&db, &matter(Some(10059), None, Some(5)), EXECUTOR_LAWYER)
            .await
            .unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn archived_marker_as_assistant_also_triggers_override() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let result = assigner()
            .assign(&db, &matter(Some(300), Some(10059), Some(47)), EXECUTOR_LAWYER)
            .await
            .unwrap();
        assert_eq!(result, Some(10413));
    }

    #[tokio::test]
    async fn apprentice_is_the_assistant_unless_in_blocked_department() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let result = assigner()
            .assign(&db, &matter(Some(200), Some(300), None), EXECUTOR_APPRENTICE)
            .await
            .unwrap();
        assert_eq!(result, Some(300));

        db.insert_department_member(3, 300).await.unwrap();
        let result = assigner()
            .assign(&db, &matter(Some(200), Some(300), None), EXECUTOR_APPRENTICE)
            .await
            .unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn apprentice_excluded_ids_apply() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let result = assigner()
            .assign(&db, &matter(Some(200), Some(11), None), EXECUTOR_APPRENTICE)
            .await
            .unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn unknown_executor_type_assigns_nobody() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let result = assigner()
            .assign(&db, &matter(Some(200), Some(300), None), "Accountant")
            .await
            .unwrap();
        assert_eq!(result, None);
    }
}
