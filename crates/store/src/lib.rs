pub mod error;

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use model::{ScheduleConfig, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Everything persisted for one user. The source URL is kept so the
/// question source can be re-established lazily after a restart.
#[derive(Clone, Default, PartialEq, Debug, Serialize, Deserialize)]
pub struct UserSettings {
    #[serde(flatten)]
    pub config: ScheduleConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

/// On-disk shape: one flat keyed record, `{ "users": { "<id>": { .. } } }`.
#[derive(Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    users: HashMap<String, UserSettings>,
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Loads every persisted user at process start.
    async fn load_all(&self) -> error::Result<HashMap<UserId, UserSettings>>;
    /// Persists one user after a mutation.
    async fn save(&self, user: UserId, settings: &UserSettings) -> error::Result<()>;
}

/// JSON file store. Each save rewrites the whole document through a
/// temp-file rename so a crash mid-write cannot truncate it.
pub struct JsonFileStore {
    path: PathBuf,
    /// Full document cache; saves merge into it and rewrite everything.
    users: Mutex<HashMap<String, UserSettings>>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), users: Mutex::new(HashMap::new()) }
    }

    async fn persist(&self, users: &HashMap<String, UserSettings>) -> error::Result<()> {
        let json = serde_json::to_vec_pretty(&Document { users: users.clone() })?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for JsonFileStore {
    async fn load_all(&self) -> error::Result<HashMap<UserId, UserSettings>> {
        let users = match tokio::fs::read(&self.path).await {
            Ok(bytes) => match serde_json::from_slice::<Document>(&bytes) {
                Ok(document) => document.users,
                Err(err) => {
                    // Corrupt settings reset to empty defaults instead of
                    // taking the process down.
                    log::warn!("settings file {} is unreadable ({err}); resetting", self.path.display());
                    let empty = HashMap::new();
                    self.persist(&empty).await?;
                    empty
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                log::info!("no settings file at {}; starting empty", self.path.display());
                HashMap::new()
            }
            Err(err) => return Err(err.into()),
        };

        *self.users.lock().await = users.clone();
        Ok(users
            .into_iter()
            .filter_map(|(key, settings)| key.parse().ok().map(|id| (UserId(id), settings)))
            .collect())
    }

    async fn save(&self, user: UserId, settings: &UserSettings) -> error::Result<()> {
        let mut users = self.users.lock().await;
        users.insert(user.to_string(), settings.clone());
        self.persist(&users).await
    }
}

#[cfg(test)]
mod tests {
    use super::{JsonFileStore, SettingsStore, UserSettings};
    use model::{QuestionMode, QuestionType, UserId};

    fn store_at(dir: &tempfile::TempDir) -> JsonFileStore {
        JsonFileStore::new(dir.path().join("user_settings.json"))
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(&dir);
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn settings_survive_a_reload() {
        let dir = tempfile::tempdir().unwrap();
        let user = UserId(42);
        let mut settings = UserSettings::default();
        settings.config.interval_minutes = Some(15);
        settings.config.timeout_minutes = 5;
        settings.config.quiet = Some("23:00-06:00".parse().unwrap());
        settings.config.mode = QuestionMode::Fixed(QuestionType::ReverseReading);
        settings.source_url = Some("https://example.com/sheet.json".to_owned());

        {
            let store = store_at(&dir);
            store.load_all().await.unwrap();
            store.save(user, &settings).await.unwrap();
        }

        let store = store_at(&dir);
        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[&user], settings);
    }

    #[tokio::test]
    async fn saves_merge_instead_of_clobbering() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(&dir);
        store.load_all().await.unwrap();

        let mut first = UserSettings::default();
        first.config.interval_minutes = Some(10);
        let mut second = UserSettings::default();
        second.config.interval_minutes = Some(20);
        store.save(UserId(1), &first).await.unwrap();
        store.save(UserId(2), &second).await.unwrap();

        let loaded = store_at(&dir).load_all().await.unwrap();
        assert_eq!(loaded[&UserId(1)].config.interval_minutes, Some(10));
        assert_eq!(loaded[&UserId(2)].config.interval_minutes, Some(20));
    }

    #[tokio::test]
    async fn corrupt_file_resets_to_empty_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_settings.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let store = JsonFileStore::new(&path);
        assert!(store.load_all().await.unwrap().is_empty());

        // The reset is persisted, so the next load parses cleanly.
        let reloaded = JsonFileStore::new(&path).load_all().await.unwrap();
        assert!(reloaded.is_empty());
    }

    #[tokio::test]
    async fn unknown_fields_do_not_break_loading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_settings.json");
        std::fs::write(&path, br#"{ "users": { "7": { "interval_minutes": 30, "future_field": true } } }"#)
            .unwrap();

        let loaded = JsonFileStore::new(&path).load_all().await.unwrap();
        assert_eq!(loaded[&UserId(7)].config.interval_minutes, Some(30));
        assert!(loaded[&UserId(7)].config.auto_send);
    }
}
