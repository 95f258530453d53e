//! Rule catalog — message-type-keyed action settings.
//!
//! Keys are normalized at write time: the display key gets a capitalized
//! first letter, the lookup key is uppercased and unique. Lookup is therefore
//! case-insensitive by construction.

use tracing::info;

use crate::dispatch::executor::{EXECUTOR_APPRENTICE, EXECUTOR_LAWYER};
use crate::error::DatabaseError;
use crate::model::{ActionSetting, ActionType, TaskTemplate};
use crate::store::Database;

/// Uppercase lookup form of a message-type key.
pub fn normalize_key(key: &str) -> String {
    key.trim().to_uppercase()
}

/// Display form: first letter uppercase, the rest lowercase.
pub fn capitalize(key: &str) -> String {
    let key = key.trim();
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Create a new setting, normalizing both key forms.
pub async fn create_setting(
    db: &dyn Database,
    key: &str,
    action: ActionType,
    templates: Vec<TaskTemplate>,
) -> Result<ActionSetting, DatabaseError> {
    let mut setting = ActionSetting {
        id: 0,
        key: capitalize(key),
        normalized_key: normalize_key(key),
        action,
        templates,
    };
    setting.id = db.insert_action_setting(&setting).await?;
    Ok(setting)
}

/// Update a setting, re-deriving the normalized key from the display key.
pub async fn update_setting(
    db: &dyn Database,
    setting: &mut ActionSetting,
) -> Result<(), DatabaseError> {
    setting.normalized_key = normalize_key(&setting.key);
    db.update_action_setting(setting).await
}

/// In-memory catalog loaded once per cycle.
pub struct SettingsCatalog {
    settings: Vec<ActionSetting>,
}

impl SettingsCatalog {
    pub async fn load(db: &dyn Database) -> Result<Self, DatabaseError> {
        Ok(Self {
            settings: db.list_action_settings().await?,
        })
    }

    /// Case-insensitive lookup by message type.
    pub fn find(&self, message_type: &str) -> Option<&ActionSetting> {
        let normalized = normalize_key(message_type);
        self.settings
            .iter()
            .find(|s| s.normalized_key == normalized)
    }

    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }
}

/// Registry message types the default rule set covers.
const DEFAULT_COMMENT_TYPES: &[&str] = &[
    "ActDealInvalid",
    "ActDealInvalid2",
    "ActPersonSubsidiary",
    "ChangeAuction",
    "EstimatesAndUnsoldAssets",
    "CompletionOfExtrajudicialBankruptcy",
    "CreditorChoiceRightSubsidiary",
];

/// One-time bootstrap: insert the default rule set when the catalog is empty.
///
/// Idempotent — a non-empty catalog is left untouched, so operator edits
/// survive restarts. Returns the number of settings created.
pub async fn seed_default_settings(db: &dyn Database) -> Result<usize, DatabaseError> {
    if !db.list_action_settings().await?.is_empty() {
        return Ok(0);
    }

    let mut created = 0usize;

    create_setting(
        db,
        "AppointAdministration",
        ActionType::Task,
        vec![
            TaskTemplate {
                id: 0,
                executor_type: EXECUTOR_LAWYER.to_string(),
                task_type_name: "Ознакомиться с судебным актом".to_string(),
                task_type_code: Some(120),
                time_limit_days: Some(3),
            },
            TaskTemplate {
                id: 0,
                executor_type: EXECUTOR_APPRENTICE.to_string(),
                task_type_name: "Подготовить требование кредитора".to_string(),
                task_type_code: Some(125),
                time_limit_days: Some(10),
            },
        ],
    )
    .await?;
    created += 1;

    for message_type in DEFAULT_COMMENT_TYPES {
        create_setting(db, message_type, ActionType::Comment, Vec::new()).await?;
        created += 1;
    }

    info!(created, "Seeded default action settings");
    Ok(created)
}
