//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. One connection is reused for
//! all operations; `libsql::Connection` is `Send + Sync` and safe for
//! concurrent async use, and the single-cycle constraint means there is never
//! more than one writer anyway.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use libsql::{Connection, Database as LibSqlDatabase, Value, params};
use tracing::info;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::model::{
    ActionSetting, ActionType, BrokenBulletin, Bulletin, CalendarDay, CaseComment, CaseTask,
    CourtSession, JuridicalStatus, Matter, MatterStatus, Party, PotentialParty, TaskTemplate,
};
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;
        info!(path = %path.display(), "Database opened");

        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to create in-memory database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;

        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn load_matters(&self, party_id: i64) -> Result<Vec<Matter>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, party_id, case_id, status, lead_user_id, assistant_user_id, project_id
                 FROM matters WHERE party_id = ?1 ORDER BY id",
                params![party_id],
            )
            .await
            .map_err(query_err)?;

        let mut matters = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            matters.push(row_to_matter(&row).map_err(query_err)?);
        }
        Ok(matters)
    }

    async fn load_parties(
        &self,
        sql: &str,
        query_params: impl libsql::params::IntoParams,
    ) -> Result<Vec<Party>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, query_params)
            .await
            .map_err(query_err)?;

        let mut parties = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            parties.push(row_to_party(&row).map_err(query_err)?);
        }
        for party in &mut parties {
            party.matters = self.load_matters(party.id).await?;
        }
        Ok(parties)
    }
}

// ── Helper functions ────────────────────────────────────────────────

fn query_err(e: impl std::fmt::Display) -> DatabaseError {
    DatabaseError::Query(e.to_string())
}

fn exec_err(e: libsql::Error) -> DatabaseError {
    let text = e.to_string();
    if text.contains("UNIQUE") {
        DatabaseError::Constraint(text)
    } else {
        DatabaseError::Query(text)
    }
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap_or(NaiveDate::MIN)
}

fn date_str(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

fn opt_text(v: Option<&str>) -> Value {
    v.map(|s| Value::Text(s.to_owned())).unwrap_or(Value::Null)
}

fn opt_int(v: Option<i64>) -> Value {
    v.map(Value::Integer).unwrap_or(Value::Null)
}

/// Quoted `IN (...)` list for the fixed juridical-status enum.
fn status_in_list(statuses: &[JuridicalStatus]) -> String {
    statuses
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn row_to_bulletin(row: &libsql::Row) -> Result<Bulletin, libsql::Error> {
    Ok(Bulletin {
        id: row.get(0)?,
        external_id: row.get(1)?,
        content: row.get::<String>(2).ok(),
        closed: row.get::<i64>(3)? != 0,
        failed: row.get::<i64>(4)? != 0,
        diagnostic: row.get::<String>(5).ok(),
        written_at: parse_datetime(&row.get::<String>(6)?),
    })
}

const BULLETIN_COLUMNS: &str = "id, external_id, content, closed, failed, diagnostic, written_at";

fn row_to_party(row: &libsql::Row) -> Result<Party, libsql::Error> {
    let status_str: String = row.get(1)?;
    Ok(Party {
        id: row.get(0)?,
        status: JuridicalStatus::from_str(&status_str).unwrap_or(JuridicalStatus::Company),
        tax_id: row.get::<String>(2).ok(),
        reg_id: row.get::<String>(3).ok(),
        full_name: row.get(4)?,
        short_name: row.get(5)?,
        matters: Vec::new(),
    })
}

const PARTY_COLUMNS: &str = "id, status, tax_id, reg_id, full_name, short_name";

fn row_to_matter(row: &libsql::Row) -> Result<Matter, libsql::Error> {
    let status_str: String = row.get(3)?;
    Ok(Matter {
        id: row.get(0)?,
        party_id: row.get(1)?,
        case_id: row.get(2)?,
        status: MatterStatus::from_str(&status_str),
        lead_user_id: row.get::<i64>(4).ok(),
        assistant_user_id: row.get::<i64>(5).ok(),
        project_id: row.get::<i64>(6).ok(),
    })
}

#[async_trait]
impl Database for LibSqlBackend {
    // ── Acquisition ─────────────────────────────────────────────────

    async fn latest_acquisition_time(&self) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT written_at FROM acquisitions ORDER BY written_at DESC LIMIT 1",
                (),
            )
            .await
            .map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => {
                let s: String = row.get(0).map_err(query_err)?;
                Ok(Some(parse_datetime(&s)))
            }
            None => Ok(None),
        }
    }

    async fn record_acquisition(
        &self,
        at: DateTime<Utc>,
        external_ids: &[String],
    ) -> Result<usize, DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO acquisitions (id, written_at) VALUES (?1, ?2)",
                params![Uuid::new_v4().to_string(), at.to_rfc3339()],
            )
            .await
            .map_err(exec_err)?;

        let mut inserted = 0usize;
        for external_id in external_ids {
            let changed = self
                .conn()
                .execute(
                    "INSERT OR IGNORE INTO bulletins (id, external_id, written_at)
                     VALUES (?1, ?2, ?3)",
                    params![
                        Uuid::new_v4().to_string(),
                        external_id.as_str(),
                        at.to_rfc3339()
                    ],
                )
                .await
                .map_err(exec_err)?;
            inserted += changed as usize;
        }
        Ok(inserted)
    }

    // ── Bulletins ───────────────────────────────────────────────────

    async fn bulletins_missing_content(&self) -> Result<Vec<Bulletin>, DatabaseError> {
        let sql = format!(
            "SELECT {BULLETIN_COLUMNS} FROM bulletins
             WHERE content IS NULL AND failed = 0 ORDER BY written_at, external_id"
        );
        let mut rows = self.conn().query(&sql, ()).await.map_err(query_err)?;

        let mut bulletins = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            bulletins.push(row_to_bulletin(&row).map_err(query_err)?);
        }
        Ok(bulletins)
    }

    async fn open_bulletins(&self) -> Result<Vec<Bulletin>, DatabaseError> {
        let sql = format!(
            "SELECT {BULLETIN_COLUMNS} FROM bulletins
             WHERE content IS NOT NULL AND closed = 0 AND failed = 0
             ORDER BY written_at, external_id"
        );
        let mut rows = self.conn().query(&sql, ()).await.map_err(query_err)?;

        let mut bulletins = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            bulletins.push(row_to_bulletin(&row).map_err(query_err)?);
        }
        Ok(bulletins)
    }

    async fn store_bulletin_content(&self, id: &str, content: &str) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE bulletins SET content = ?2 WHERE id = ?1",
                params![id, content],
            )
            .await
            .map_err(exec_err)?;
        Ok(())
    }

    async fn mark_bulletin_failed(&self, id: &str, diagnostic: &str) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE bulletins SET failed = 1, diagnostic = ?2 WHERE id = ?1",
                params![id, diagnostic],
            )
            .await
            .map_err(exec_err)?;
        Ok(())
    }

    async fn mark_bulletin_closed(&self, id: &str) -> Result<(), DatabaseError> {
        self.conn()
            .execute("UPDATE bulletins SET closed = 1 WHERE id = ?1", params![id])
            .await
            .map_err(exec_err)?;
        Ok(())
    }

    async fn delete_bulletin(&self, id: &str) -> Result<(), DatabaseError> {
        self.conn()
            .execute("DELETE FROM bulletins WHERE id = ?1", params![id])
            .await
            .map_err(exec_err)?;
        Ok(())
    }

    async fn get_bulletin(&self, id: &str) -> Result<Option<Bulletin>, DatabaseError> {
        let sql = format!("SELECT {BULLETIN_COLUMNS} FROM bulletins WHERE id = ?1");
        let mut rows = self
            .conn()
            .query(&sql, params![id])
            .await
            .map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row_to_bulletin(&row).map_err(query_err)?)),
            None => Ok(None),
        }
    }

    // ── Broken-bulletin audit trail ─────────────────────────────────

    async fn insert_broken_bulletin(
        &self,
        bulletin_id: &str,
        errors: &str,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO broken_bulletins (id, bulletin_id, errors, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    Uuid::new_v4().to_string(),
                    bulletin_id,
                    errors,
                    Utc::now().to_rfc3339()
                ],
            )
            .await
            .map_err(exec_err)?;
        Ok(())
    }

    async fn broken_bulletins(&self) -> Result<Vec<BrokenBulletin>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, bulletin_id, errors, created_at FROM broken_bulletins
                 ORDER BY created_at DESC",
                (),
            )
            .await
            .map_err(query_err)?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            records.push(BrokenBulletin {
                id: row.get(0).map_err(query_err)?,
                bulletin_id: row.get(1).map_err(query_err)?,
                errors: row.get(2).map_err(query_err)?,
                created_at: parse_datetime(&row.get::<String>(3).map_err(query_err)?),
            });
        }
        Ok(records)
    }

    // ── Parties & matters ───────────────────────────────────────────

    async fn find_parties_by_requisites(
        &self,
        statuses: &[JuridicalStatus],
        tax_id: Option<&str>,
        reg_id: Option<&str>,
    ) -> Result<Vec<Party>, DatabaseError> {
        if tax_id.is_none() && reg_id.is_none() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {PARTY_COLUMNS} FROM parties
             WHERE status IN ({statuses})
               AND ((?1 IS NOT NULL AND tax_id = ?1) OR (?2 IS NOT NULL AND reg_id = ?2))
             ORDER BY id",
            statuses = status_in_list(statuses),
        );
        self.load_parties(&sql, params![opt_text(tax_id), opt_text(reg_id)])
            .await
    }

    async fn parties_with_status(
        &self,
        statuses: &[JuridicalStatus],
    ) -> Result<Vec<Party>, DatabaseError> {
        let sql = format!(
            "SELECT {PARTY_COLUMNS} FROM parties WHERE status IN ({statuses}) ORDER BY id",
            statuses = status_in_list(statuses),
        );
        self.load_parties(&sql, ()).await
    }

    async fn tracking_disabled_cases(&self) -> Result<HashSet<i64>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT case_id FROM tracking_settings WHERE disabled = 1",
                (),
            )
            .await
            .map_err(query_err)?;

        let mut cases = HashSet::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            cases.insert(row.get::<i64>(0).map_err(query_err)?);
        }
        Ok(cases)
    }

    async fn court_sessions(&self, case_id: i64) -> Result<Vec<CourtSession>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, case_id, stage, is_current FROM court_sessions
                 WHERE case_id = ?1 ORDER BY id DESC",
                params![case_id],
            )
            .await
            .map_err(query_err)?;

        let mut sessions = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            sessions.push(CourtSession {
                id: row.get(0).map_err(query_err)?,
                case_id: row.get(1).map_err(query_err)?,
                stage: row.get(2).map_err(query_err)?,
                is_current: row.get::<i64>(3).map_err(query_err)? != 0,
            });
        }
        Ok(sessions)
    }

    async fn project_name(&self, project_id: i64) -> Result<Option<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT name FROM projects WHERE id = ?1",
                params![project_id],
            )
            .await
            .map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row.get(0).map_err(query_err)?)),
            None => Ok(None),
        }
    }

    async fn is_department_member(
        &self,
        department_id: i64,
        user_id: i64,
    ) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM department_members
                 WHERE department_id = ?1 AND user_id = ?2",
                params![department_id, user_id],
            )
            .await
            .map_err(query_err)?;

        let row = rows
            .next()
            .await
            .map_err(query_err)?
            .ok_or_else(|| DatabaseError::Query("empty COUNT result".to_string()))?;
        Ok(row.get::<i64>(0).map_err(query_err)? > 0)
    }

    // ── Working calendar ────────────────────────────────────────────

    async fn calendar_day(&self, date: NaiveDate) -> Result<Option<CalendarDay>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT date, is_working FROM working_calendar WHERE date = ?1",
                params![date_str(date)],
            )
            .await
            .map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(CalendarDay {
                date: parse_date(&row.get::<String>(0).map_err(query_err)?),
                is_working: row.get::<i64>(1).ok().map(|v| v != 0),
            })),
            None => Ok(None),
        }
    }

    async fn next_working_day_after(
        &self,
        date: NaiveDate,
    ) -> Result<Option<NaiveDate>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT date FROM working_calendar
                 WHERE date > ?1 AND is_working = 1
                 ORDER BY date ASC LIMIT 1",
                params![date_str(date)],
            )
            .await
            .map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(parse_date(&row.get::<String>(0).map_err(query_err)?))),
            None => Ok(None),
        }
    }

    // ── Dispatch products ───────────────────────────────────────────

    async fn max_comment_order_weight(&self, case_id: i64) -> Result<i64, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COALESCE(MAX(order_weight), 0) FROM case_comments WHERE case_id = ?1",
                params![case_id],
            )
            .await
            .map_err(query_err)?;

        let row = rows
            .next()
            .await
            .map_err(query_err)?
            .ok_or_else(|| DatabaseError::Query("empty MAX result".to_string()))?;
        row.get(0).map_err(query_err)
    }

    async fn insert_case_comment(&self, comment: &CaseComment) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO case_comments
                 (id, case_id, text, order_weight, creator_user_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    comment.id.as_str(),
                    comment.case_id,
                    comment.text.as_str(),
                    comment.order_weight,
                    comment.creator_user_id,
                    comment.created_at.to_rfc3339()
                ],
            )
            .await
            .map_err(exec_err)?;
        Ok(())
    }

    async fn insert_case_task(&self, task: &CaseTask) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO case_tasks
                 (id, case_id, task_type_code, executor_user_id, court_session_id,
                  begin_date, plan_date, fact_date, status, section_code,
                  creator_user_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    task.id.as_str(),
                    task.case_id,
                    task.task_type_code,
                    opt_int(task.executor_user_id),
                    task.court_session_id,
                    date_str(task.begin_date),
                    date_str(task.plan_date),
                    date_str(task.fact_date),
                    task.status,
                    task.section_code,
                    task.creator_user_id,
                    task.created_at.to_rfc3339()
                ],
            )
            .await
            .map_err(exec_err)?;
        Ok(())
    }

    async fn has_potential_party(&self, party_id: i64) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM potential_parties WHERE party_id = ?1",
                params![party_id],
            )
            .await
            .map_err(query_err)?;

        let row = rows
            .next()
            .await
            .map_err(query_err)?
            .ok_or_else(|| DatabaseError::Query("empty COUNT result".to_string()))?;
        Ok(row.get::<i64>(0).map_err(query_err)? > 0)
    }

    async fn insert_potential_party(&self, record: &PotentialParty) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO potential_parties
                 (id, party_id, status, bulletin_external_id, message_type,
                  setting_key, project_name, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.id.as_str(),
                    record.party_id,
                    record.status.as_str(),
                    record.bulletin_external_id.as_str(),
                    opt_text(record.message_type.as_deref()),
                    record.setting_key.as_str(),
                    opt_text(record.project_name.as_deref()),
                    record.created_at.to_rfc3339()
                ],
            )
            .await
            .map_err(exec_err)?;
        Ok(())
    }

    // ── Rule catalog ────────────────────────────────────────────────

    async fn list_action_settings(&self) -> Result<Vec<ActionSetting>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, key, normalized_key, action FROM action_settings ORDER BY id",
                (),
            )
            .await
            .map_err(query_err)?;

        let mut settings = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            let action_str: String = row.get(3).map_err(query_err)?;
            settings.push(ActionSetting {
                id: row.get(0).map_err(query_err)?,
                key: row.get(1).map_err(query_err)?,
                normalized_key: row.get(2).map_err(query_err)?,
                action: ActionType::from_str(&action_str).unwrap_or(ActionType::Comment),
                templates: Vec::new(),
            });
        }

        for setting in &mut settings {
            let mut rows = self
                .conn()
                .query(
                    "SELECT id, executor_type, task_type_name, task_type_code, time_limit_days
                     FROM action_setting_tasks WHERE setting_id = ?1 ORDER BY id",
                    params![setting.id],
                )
                .await
                .map_err(query_err)?;

            while let Some(row) = rows.next().await.map_err(query_err)? {
                setting.templates.push(TaskTemplate {
                    id: row.get(0).map_err(query_err)?,
                    executor_type: row.get(1).map_err(query_err)?,
                    task_type_name: row.get(2).map_err(query_err)?,
                    task_type_code: row.get::<i64>(3).ok(),
                    time_limit_days: row.get::<i64>(4).ok(),
                });
            }
        }
        Ok(settings)
    }

    async fn insert_action_setting(&self, setting: &ActionSetting) -> Result<i64, DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO action_settings (key, normalized_key, action) VALUES (?1, ?2, ?3)",
                params![
                    setting.key.as_str(),
                    setting.normalized_key.as_str(),
                    setting.action.as_str()
                ],
            )
            .await
            .map_err(exec_err)?;

        let setting_id = self.conn().last_insert_rowid();
        for template in &setting.templates {
            self.conn()
                .execute(
                    "INSERT INTO action_setting_tasks
                     (setting_id, executor_type, task_type_name, task_type_code, time_limit_days)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        setting_id,
                        template.executor_type.as_str(),
                        template.task_type_name.as_str(),
                        opt_int(template.task_type_code),
                        opt_int(template.time_limit_days)
                    ],
                )
                .await
                .map_err(exec_err)?;
        }
        Ok(setting_id)
    }

    async fn update_action_setting(&self, setting: &ActionSetting) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE action_settings SET key = ?2, normalized_key = ?3, action = ?4
                 WHERE id = ?1",
                params![
                    setting.id,
                    setting.key.as_str(),
                    setting.normalized_key.as_str(),
                    setting.action.as_str()
                ],
            )
            .await
            .map_err(exec_err)?;

        self.conn()
            .execute(
                "DELETE FROM action_setting_tasks WHERE setting_id = ?1",
                params![setting.id],
            )
            .await
            .map_err(exec_err)?;

        for template in &setting.templates {
            self.conn()
                .execute(
                    "INSERT INTO action_setting_tasks
                     (setting_id, executor_type, task_type_name, task_type_code, time_limit_days)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        setting.id,
                        template.executor_type.as_str(),
                        template.task_type_name.as_str(),
                        opt_int(template.task_type_code),
                        opt_int(template.time_limit_days)
                    ],
                )
                .await
                .map_err(exec_err)?;
        }
        Ok(())
    }

    // ── Case-management fixtures ────────────────────────────────────

    async fn insert_party(&self, party: &Party) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO parties (id, status, tax_id, reg_id, full_name, short_name)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    party.id,
                    party.status.as_str(),
                    opt_text(party.tax_id.as_deref()),
                    opt_text(party.reg_id.as_deref()),
                    party.full_name.as_str(),
                    party.short_name.as_str()
                ],
            )
            .await
            .map_err(exec_err)?;

        for matter in &party.matters {
            self.insert_matter(matter).await?;
        }
        Ok(())
    }

    async fn insert_matter(&self, matter: &Matter) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO matters
                 (id, party_id, case_id, status, lead_user_id, assistant_user_id, project_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    matter.id,
                    matter.party_id,
                    matter.case_id,
                    matter.status.as_str(),
                    opt_int(matter.lead_user_id),
                    opt_int(matter.assistant_user_id),
                    opt_int(matter.project_id)
                ],
            )
            .await
            .map_err(exec_err)?;
        Ok(())
    }

    async fn insert_court_session(&self, session: &CourtSession) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO court_sessions (id, case_id, stage, is_current)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    session.id,
                    session.case_id,
                    session.stage,
                    session.is_current as i64
                ],
            )
            .await
            .map_err(exec_err)?;
        Ok(())
    }

    async fn insert_calendar_day(&self, day: &CalendarDay) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO working_calendar (date, is_working) VALUES (?1, ?2)",
                params![date_str(day.date), opt_int(day.is_working.map(|v| v as i64))],
            )
            .await
            .map_err(exec_err)?;
        Ok(())
    }

    async fn insert_project(&self, id: i64, name: &str) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO projects (id, name) VALUES (?1, ?2)",
                params![id, name],
            )
            .await
            .map_err(exec_err)?;
        Ok(())
    }

    async fn insert_department_member(
        &self,
        department_id: i64,
        user_id: i64,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT OR IGNORE INTO department_members (department_id, user_id)
                 VALUES (?1, ?2)",
                params![department_id, user_id],
            )
            .await
            .map_err(exec_err)?;
        Ok(())
    }

    async fn set_case_tracking_disabled(
        &self,
        case_id: i64,
        disabled: Option<bool>,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO tracking_settings (case_id, disabled) VALUES (?1, ?2)",
                params![case_id, opt_int(disabled.map(|v| v as i64))],
            )
            .await
            .map_err(exec_err)?;
        Ok(())
    }

    async fn case_comments(&self, case_id: i64) -> Result<Vec<CaseComment>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, case_id, text, order_weight, creator_user_id, created_at
                 FROM case_comments WHERE case_id = ?1 ORDER BY order_weight",
                params![case_id],
            )
            .await
            .map_err(query_err)?;

        let mut comments = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            comments.push(CaseComment {
                id: row.get(0).map_err(query_err)?,
                case_id: row.get(1).map_err(query_err)?,
                text: row.get(2).map_err(query_err)?,
                order_weight: row.get(3).map_err(query_err)?,
                creator_user_id: row.get(4).map_err(query_err)?,
                created_at: parse_datetime(&row.get::<String>(5).map_err(query_err)?),
            });
        }
        Ok(comments)
    }

    async fn case_tasks(&self, case_id: i64) -> Result<Vec<CaseTask>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, case_id, task_type_code, executor_user_id, court_session_id,
                        begin_date, plan_date, fact_date, status, section_code,
                        creator_user_id, created_at
                 FROM case_tasks WHERE case_id = ?1 ORDER BY created_at",
                params![case_id],
            )
            .await
            .map_err(query_err)?;

        let mut tasks = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            tasks.push(CaseTask {
                id: row.get(0).map_err(query_err)?,
                case_id: row.get(1).map_err(query_err)?,
                task_type_code: row.get(2).map_err(query_err)?,
                executor_user_id: row.get::<i64>(3).ok(),
                court_session_id: row.get(4).map_err(query_err)?,
                begin_date: parse_date(&row.get::<String>(5).map_err(query_err)?),
                plan_date: parse_date(&row.get::<String>(6).map_err(query_err)?),
                fact_date: parse_date(&row.get::<String>(7).map_err(query_err)?),
                status: row.get(8).map_err(query_err)?,
                section_code: row.get(9).map_err(query_err)?,
                creator_user_id: row.get(10).map_err(query_err)?,
                created_at: parse_datetime(&row.get::<String>(11).map_err(query_err)?),
            });
        }
        Ok(tasks)
    }

    async fn potential_parties(&self) -> Result<Vec<PotentialParty>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, party_id, status, bulletin_external_id, message_type,
                        setting_key, project_name, created_at
                 FROM potential_parties ORDER BY created_at DESC",
                (),
            )
            .await
            .map_err(query_err)?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            let status_str: String = row.get(2).map_err(query_err)?;
            records.push(PotentialParty {
                id: row.get(0).map_err(query_err)?,
                party_id: row.get(1).map_err(query_err)?,
                status: JuridicalStatus::from_str(&status_str)
                    .unwrap_or(JuridicalStatus::Company),
                bulletin_external_id: row.get(3).map_err(query_err)?,
                message_type: row.get::<String>(4).ok(),
                setting_key: row.get(5).map_err(query_err)?,
                project_name: row.get::<String>(6).ok(),
                created_at: parse_datetime(&row.get::<String>(7).map_err(query_err)?),
            });
        }
        Ok(records)
    }
}
