use crate::config::DatabaseConfig;
use crate::db::{CredentialStore, DatabaseError, LogStore, RouteStore, SessionStore};
use std::sync::Arc;

#[cfg(feature = "sqlite")]
use crate::db::sqlite::{
    SqliteCredentialStore, SqliteLogStore, SqliteRouteStore, SqliteSessionStore,
    establish_connection,
};
#[cfg(feature = "sqlite")]
use diesel::RunQueryDsl;

#[derive(Clone)]
pub struct DatabaseManager {
    sqlite_path: String,
    route_store: Arc<dyn RouteStore>,
    credential_store: Arc<dyn CredentialStore>,
    session_store: Arc<dyn SessionStore>,
    log_store: Arc<dyn LogStore>,
}

impl DatabaseManager {
    #[cfg(feature = "sqlite")]
    pub async fn new(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let path = config.sqlite_path();
        let path_arc = Arc::new(path.clone());

        Ok(Self {
            route_store: Arc::new(SqliteRouteStore::new(path_arc.clone())),
            credential_store: Arc::new(SqliteCredentialStore::new(path_arc.clone())),
            session_store: Arc::new(SqliteSessionStore::new(path_arc.clone())),
            log_store: Arc::new(SqliteLogStore::new(path_arc)),
            sqlite_path: path,
        })
    }

    #[cfg(not(feature = "sqlite"))]
    pub async fn new(_config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        Err(DatabaseError::Connection(
            "SQLite feature not enabled".to_string(),
        ))
    }

    #[cfg(feature = "sqlite")]
    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        let path = self.sqlite_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&path)?;

            let statements = [
                "PRAGMA journal_mode = WAL",
                r#"
                CREATE TABLE IF NOT EXISTS routes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    owner_id BIGINT NOT NULL,
                    source TEXT NOT NULL,
                    destinations TEXT NOT NULL,
                    active BOOLEAN NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    UNIQUE (owner_id, source)
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS credential_sets (
                    owner_id BIGINT PRIMARY KEY NOT NULL,
                    api_id INTEGER NOT NULL,
                    api_hash TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS session_artifacts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    owner_id BIGINT NOT NULL,
                    filename TEXT NOT NULL,
                    data BLOB NOT NULL,
                    uploaded_at TEXT NOT NULL
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS forward_logs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    owner_id BIGINT NOT NULL,
                    source TEXT NOT NULL,
                    original_text TEXT NOT NULL,
                    cleaned_text TEXT NOT NULL,
                    destination TEXT,
                    status TEXT NOT NULL,
                    created_at TEXT NOT NULL
                )
                "#,
                "CREATE INDEX IF NOT EXISTS idx_routes_owner_active ON routes(owner_id, active)",
                "CREATE INDEX IF NOT EXISTS idx_session_artifacts_owner ON session_artifacts(owner_id)",
                "CREATE INDEX IF NOT EXISTS idx_forward_logs_created_at ON forward_logs(created_at)",
            ];

            for statement in statements {
                diesel::sql_query(statement)
                    .execute(&mut conn)
                    .map_err(|e| DatabaseError::Migration(e.to_string()))?;
            }

            Ok(())
        })
        .await
        .map_err(|e| DatabaseError::Migration(format!("migration task failed: {e}")))?
    }

    #[cfg(not(feature = "sqlite"))]
    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        Err(DatabaseError::Migration(
            "SQLite feature not enabled".to_string(),
        ))
    }

    pub fn route_store(&self) -> Arc<dyn RouteStore> {
        self.route_store.clone()
    }

    pub fn credential_store(&self) -> Arc<dyn CredentialStore> {
        self.credential_store.clone()
    }

    pub fn session_store(&self) -> Arc<dyn SessionStore> {
        self.session_store.clone()
    }

    pub fn log_store(&self) -> Arc<dyn LogStore> {
        self.log_store.clone()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use secrecy::{ExposeSecret, SecretString};
    use tempfile::NamedTempFile;

    use super::DatabaseManager;
    use crate::config::DatabaseConfig;
    use crate::db::{CredentialSet, DatabaseError, LogStatus, NewLogEntry};

    pub(crate) async fn temp_manager() -> (NamedTempFile, DatabaseManager) {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let config = DatabaseConfig {
            url: None,
            filename: Some(file.path().to_string_lossy().to_string()),
        };

        let manager = DatabaseManager::new(&config).await.expect("db manager");
        manager.migrate().await.expect("migrate");
        (file, manager)
    }

    #[tokio::test]
    async fn sqlite_route_lifecycle() {
        let (_file, manager) = temp_manager().await;
        let store = manager.route_store();

        let created = store
            .create_route(1, "@chan", &["@bot".to_string(), "@other".to_string()])
            .await
            .expect("create route");
        assert!(created.active);
        assert_eq!(created.destinations, vec!["@bot", "@other"]);

        let duplicate = store.create_route(1, "@chan", &["@bot".to_string()]).await;
        assert!(matches!(duplicate, Err(DatabaseError::Conflict(_))));

        store
            .create_route(2, "@chan", &["@bot".to_string()])
            .await
            .expect("other owner may route the same source");

        assert!(store.set_route_active(created.id, false).await.expect("toggle"));
        assert!(
            store
                .list_active_routes(1)
                .await
                .expect("active routes")
                .is_empty()
        );

        let found = store
            .get_route(created.id)
            .await
            .expect("get")
            .expect("route exists");
        assert!(!found.active);

        assert!(store.delete_route(created.id).await.expect("delete"));
        assert!(!store.delete_route(created.id).await.expect("second delete"));
        assert!(store.get_route(created.id).await.expect("get").is_none());
        assert_eq!(store.list_routes(2).await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn sqlite_list_routes_newest_first() {
        let (_file, manager) = temp_manager().await;
        let store = manager.route_store();
        for name in ["@a", "@b", "@c"] {
            store
                .create_route(7, name, &["@dest".to_string()])
                .await
                .expect("create");
        }

        let sources: Vec<String> = store
            .list_routes(7)
            .await
            .expect("list")
            .into_iter()
            .map(|route| route.source)
            .collect();
        assert_eq!(sources, vec!["@c", "@b", "@a"]);
    }

    #[tokio::test]
    async fn sqlite_ids_beyond_row_range_match_nothing() {
        let (_file, manager) = temp_manager().await;
        let store = manager.route_store();
        let created = store
            .create_route(1, "@chan", &["@bot".to_string()])
            .await
            .expect("create");
        let wide_id = created.id + (1_i64 << 32);

        assert!(store.get_route(wide_id).await.expect("get").is_none());
        assert!(!store.set_route_active(wide_id, false).await.expect("toggle"));
        assert!(!store.delete_route(wide_id).await.expect("delete"));
        assert!(!store.delete_route(i64::MIN).await.expect("delete negative"));

        let kept = store
            .get_route(created.id)
            .await
            .expect("get")
            .expect("route kept");
        assert!(kept.active);
    }

    #[tokio::test]
    async fn sqlite_credentials_and_sessions() {
        let (_file, manager) = temp_manager().await;

        let credentials = CredentialSet {
            owner_id: 5,
            api_id: 1111,
            api_hash: SecretString::from("first".to_string()),
        };
        manager
            .credential_store()
            .upsert_credentials(&credentials)
            .await
            .expect("insert credentials");
        manager
            .credential_store()
            .upsert_credentials(&CredentialSet {
                api_hash: SecretString::from("second".to_string()),
                ..credentials
            })
            .await
            .expect("update credentials");

        let stored = manager
            .credential_store()
            .get_credentials(5)
            .await
            .expect("get credentials")
            .expect("credentials exist");
        assert_eq!(stored.api_id, 1111);
        assert_eq!(stored.api_hash.expose_secret(), "second");

        let sessions = manager.session_store();
        assert!(sessions.latest_session(5).await.expect("none yet").is_none());
        sessions
            .save_session(5, "old.session", b"old")
            .await
            .expect("save old");
        sessions
            .save_session(5, "new.session", b"new")
            .await
            .expect("save new");

        let latest = sessions
            .latest_session(5)
            .await
            .expect("latest")
            .expect("session exists");
        assert_eq!(latest.filename, "new.session");
        assert_eq!(latest.data, b"new");
    }

    #[tokio::test]
    async fn sqlite_logs_append_only_newest_first() {
        let (_file, manager) = temp_manager().await;
        let logs = manager.log_store();

        for (owner, status) in [
            (1, LogStatus::Sent),
            (2, LogStatus::NoTarget),
            (1, LogStatus::Error("boom".to_string())),
        ] {
            logs.append_log(&NewLogEntry {
                owner_id: owner,
                source: "@chan".to_string(),
                original_text: "raw".to_string(),
                cleaned_text: "clean".to_string(),
                destination: Some("@bot".to_string()),
                status,
            })
            .await
            .expect("append");
        }

        let recent = logs.recent_logs(None, 10, 0).await.expect("recent");
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].status, LogStatus::Error("boom".to_string()));
        assert_eq!(recent[2].status, LogStatus::Sent);

        let owned = logs.recent_logs(Some(1), 10, 0).await.expect("owned");
        assert_eq!(owned.len(), 2);
        assert!(owned.iter().all(|entry| entry.owner_id == 1));
        assert_eq!(owned[0].status, LogStatus::Error("boom".to_string()));

        let second_page = logs.recent_logs(Some(1), 1, 1).await.expect("page");
        assert_eq!(second_page.len(), 1);
        assert_eq!(second_page[0].status, LogStatus::Sent);

        assert!(logs.recent_logs(Some(9), 10, 0).await.expect("none").is_empty());
    }
}
