use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sqlite::{Sqlite, SqliteConnection};
use std::sync::Arc;

use crate::db::schema_sqlite::{credential_sets, forward_logs, routes, session_artifacts};

use super::{
    DatabaseError,
    models::{CredentialSet, LogEntry, NewLogEntry, RouteEntry, SessionArtifact},
};

const BUSY_TIMEOUT_MS: u32 = 5000;

// Helper function to convert DateTime to ISO string for SQLite
fn datetime_to_string(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

// Helper function to parse ISO string to DateTime
fn string_to_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Corrupt(format!("invalid datetime format: {}", e)))
}

/// Row ids are `INTEGER` columns mapped to `i32`; anything wider cannot name a row.
fn row_id(id: i64) -> Option<i32> {
    i32::try_from(id).ok()
}

fn map_write_error(err: DieselError) -> DatabaseError {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
            DatabaseError::Conflict(info.message().to_string())
        }
        other => DatabaseError::Query(other.to_string()),
    }
}

pub(crate) fn establish_connection(path: &str) -> Result<SqliteConnection, DatabaseError> {
    let mut conn =
        SqliteConnection::establish(path).map_err(|e| DatabaseError::Connection(e.to_string()))?;
    diesel::sql_query(format!("PRAGMA busy_timeout = {BUSY_TIMEOUT_MS}"))
        .execute(&mut conn)
        .map_err(|e| DatabaseError::Connection(e.to_string()))?;
    Ok(conn)
}

async fn with_connection<T, F>(db_path: Arc<String>, operation: F) -> Result<T, DatabaseError>
where
    T: Send + 'static,
    F: FnOnce(&mut SqliteConnection) -> Result<T, DatabaseError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut conn = establish_connection(&db_path)?;
        operation(&mut conn)
    })
    .await
    .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
}

// SQLite uses i32 for INTEGER (primary keys), but we want to keep i64 in our API
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = routes)]
struct DbRoute {
    id: i32,
    owner_id: i64,
    source: String,
    destinations: String,
    active: bool,
    created_at: String,
    updated_at: String,
}

impl DbRoute {
    fn to_route_entry(&self) -> Result<RouteEntry, DatabaseError> {
        let destinations: Vec<String> = serde_json::from_str(&self.destinations).map_err(|e| {
            DatabaseError::Corrupt(format!("route {} destinations: {}", self.id, e))
        })?;
        Ok(RouteEntry {
            id: self.id as i64,
            owner_id: self.owner_id,
            source: self.source.clone(),
            destinations,
            active: self.active,
            created_at: string_to_datetime(&self.created_at)?,
            updated_at: string_to_datetime(&self.updated_at)?,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = routes)]
struct NewRoute<'a> {
    owner_id: i64,
    source: &'a str,
    destinations: String,
    active: bool,
    created_at: String,
    updated_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = credential_sets)]
struct DbCredentialSet {
    owner_id: i64,
    api_id: i32,
    api_hash: String,
    #[allow(dead_code)]
    updated_at: String,
}

#[derive(Insertable)]
#[diesel(table_name = credential_sets)]
struct NewCredentialSet<'a> {
    owner_id: i64,
    api_id: i32,
    api_hash: &'a str,
    updated_at: String,
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = session_artifacts)]
struct DbSessionArtifact {
    id: i32,
    owner_id: i64,
    filename: String,
    data: Vec<u8>,
    uploaded_at: String,
}

impl DbSessionArtifact {
    fn into_session_artifact(self) -> Result<SessionArtifact, DatabaseError> {
        Ok(SessionArtifact {
            id: self.id as i64,
            owner_id: self.owner_id,
            filename: self.filename,
            data: self.data,
            uploaded_at: string_to_datetime(&self.uploaded_at)?,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = session_artifacts)]
struct NewSessionArtifact<'a> {
    owner_id: i64,
    filename: &'a str,
    data: &'a [u8],
    uploaded_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = forward_logs)]
struct DbLogEntry {
    id: i32,
    owner_id: i64,
    source: String,
    original_text: String,
    cleaned_text: String,
    destination: Option<String>,
    status: String,
    created_at: String,
}

impl DbLogEntry {
    fn into_log_entry(self) -> Result<LogEntry, DatabaseError> {
        Ok(LogEntry {
            id: self.id as i64,
            owner_id: self.owner_id,
            source: self.source,
            original_text: self.original_text,
            cleaned_text: self.cleaned_text,
            destination: self.destination,
            status: self.status.into(),
            created_at: string_to_datetime(&self.created_at)?,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = forward_logs)]
struct NewDbLogEntry<'a> {
    owner_id: i64,
    source: &'a str,
    original_text: &'a str,
    cleaned_text: &'a str,
    destination: Option<&'a str>,
    status: String,
    created_at: String,
}

pub struct SqliteRouteStore {
    db_path: Arc<String>,
}

impl SqliteRouteStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl super::RouteStore for SqliteRouteStore {
    async fn get_route(&self, route_id: i64) -> Result<Option<RouteEntry>, DatabaseError> {
        let Some(route_id) = row_id(route_id) else {
            return Ok(None);
        };
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::routes::dsl::*;
            routes
                .filter(id.eq(route_id))
                .select(DbRoute::as_select())
                .first::<DbRoute>(conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .map(|r| r.to_route_entry())
                .transpose()
        })
        .await
    }

    async fn list_routes(&self, owner: i64) -> Result<Vec<RouteEntry>, DatabaseError> {
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::routes::dsl::*;
            let results = routes
                .filter(owner_id.eq(owner))
                .order(id.desc())
                .select(DbRoute::as_select())
                .load::<DbRoute>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;

            results.iter().map(DbRoute::to_route_entry).collect()
        })
        .await
    }

    async fn list_active_routes(&self, owner: i64) -> Result<Vec<RouteEntry>, DatabaseError> {
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::routes::dsl::*;
            let results = routes
                .filter(owner_id.eq(owner))
                .filter(active.eq(true))
                .order(id.asc())
                .select(DbRoute::as_select())
                .load::<DbRoute>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;

            results.iter().map(DbRoute::to_route_entry).collect()
        })
        .await
    }

    async fn create_route(
        &self,
        owner: i64,
        source_handle: &str,
        destination_handles: &[String],
    ) -> Result<RouteEntry, DatabaseError> {
        let source_handle = source_handle.to_string();
        let encoded = serde_json::to_string(destination_handles)
            .map_err(|e| DatabaseError::Query(e.to_string()))?;
        with_connection(self.db_path.clone(), move |conn| {
            let now = datetime_to_string(&Utc::now());
            let new_route = NewRoute {
                owner_id: owner,
                source: &source_handle,
                destinations: encoded,
                active: true,
                created_at: now.clone(),
                updated_at: now,
            };

            diesel::insert_into(routes::table)
                .values(&new_route)
                .execute(conn)
                .map_err(map_write_error)?;

            // (owner_id, source) is unique, so this reads back the row just written.
            routes::table
                .filter(routes::owner_id.eq(owner))
                .filter(routes::source.eq(&source_handle))
                .select(DbRoute::as_select())
                .first::<DbRoute>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .to_route_entry()
        })
        .await
    }

    async fn set_route_active(&self, route_id: i64, is_active: bool) -> Result<bool, DatabaseError> {
        let Some(route_id) = row_id(route_id) else {
            return Ok(false);
        };
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::routes::dsl::*;
            diesel::update(routes.filter(id.eq(route_id)))
                .set((
                    active.eq(is_active),
                    updated_at.eq(datetime_to_string(&Utc::now())),
                ))
                .execute(conn)
                .map(|affected| affected > 0)
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn delete_route(&self, route_id: i64) -> Result<bool, DatabaseError> {
        let Some(route_id) = row_id(route_id) else {
            return Ok(false);
        };
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::routes::dsl::*;
            diesel::delete(routes.filter(id.eq(route_id)))
                .execute(conn)
                .map(|affected| affected > 0)
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }
}

pub struct SqliteCredentialStore {
    db_path: Arc<String>,
}

impl SqliteCredentialStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl super::CredentialStore for SqliteCredentialStore {
    async fn get_credentials(&self, owner: i64) -> Result<Option<CredentialSet>, DatabaseError> {
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::credential_sets::dsl::*;
            let row = credential_sets
                .filter(owner_id.eq(owner))
                .select(DbCredentialSet::as_select())
                .first::<DbCredentialSet>(conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?;

            Ok(row.map(|row| CredentialSet {
                owner_id: row.owner_id,
                api_id: row.api_id,
                api_hash: row.api_hash.into(),
            }))
        })
        .await
    }

    async fn upsert_credentials(&self, credentials: &CredentialSet) -> Result<(), DatabaseError> {
        use secrecy::ExposeSecret;

        let owner = credentials.owner_id;
        let new_api_id = credentials.api_id;
        let new_api_hash = credentials.api_hash.expose_secret().to_string();
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::credential_sets::dsl::*;
            let now = datetime_to_string(&Utc::now());

            let existing = credential_sets
                .filter(owner_id.eq(owner))
                .count()
                .get_result::<i64>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;

            if existing > 0 {
                diesel::update(credential_sets.filter(owner_id.eq(owner)))
                    .set((
                        api_id.eq(new_api_id),
                        api_hash.eq(&new_api_hash),
                        updated_at.eq(now),
                    ))
                    .execute(conn)
                    .map(|_| ())
                    .map_err(|e| DatabaseError::Query(e.to_string()))
            } else {
                diesel::insert_into(credential_sets)
                    .values(NewCredentialSet {
                        owner_id: owner,
                        api_id: new_api_id,
                        api_hash: &new_api_hash,
                        updated_at: now,
                    })
                    .execute(conn)
                    .map(|_| ())
                    .map_err(map_write_error)
            }
        })
        .await
    }
}

pub struct SqliteSessionStore {
    db_path: Arc<String>,
}

impl SqliteSessionStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl super::SessionStore for SqliteSessionStore {
    async fn save_session(
        &self,
        owner: i64,
        session_filename: &str,
        session_data: &[u8],
    ) -> Result<(), DatabaseError> {
        let session_filename = session_filename.to_string();
        let session_data = session_data.to_vec();
        with_connection(self.db_path.clone(), move |conn| {
            diesel::insert_into(session_artifacts::table)
                .values(NewSessionArtifact {
                    owner_id: owner,
                    filename: &session_filename,
                    data: &session_data,
                    uploaded_at: datetime_to_string(&Utc::now()),
                })
                .execute(conn)
                .map(|_| ())
                .map_err(map_write_error)
        })
        .await
    }

    async fn latest_session(&self, owner: i64) -> Result<Option<SessionArtifact>, DatabaseError> {
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::session_artifacts::dsl::*;
            session_artifacts
                .filter(owner_id.eq(owner))
                .order(id.desc())
                .select(DbSessionArtifact::as_select())
                .first::<DbSessionArtifact>(conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .map(DbSessionArtifact::into_session_artifact)
                .transpose()
        })
        .await
    }
}

pub struct SqliteLogStore {
    db_path: Arc<String>,
}

impl SqliteLogStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl super::LogStore for SqliteLogStore {
    async fn append_log(&self, entry: &NewLogEntry) -> Result<(), DatabaseError> {
        let entry = entry.clone();
        with_connection(self.db_path.clone(), move |conn| {
            diesel::insert_into(forward_logs::table)
                .values(NewDbLogEntry {
                    owner_id: entry.owner_id,
                    source: &entry.source,
                    original_text: &entry.original_text,
                    cleaned_text: &entry.cleaned_text,
                    destination: entry.destination.as_deref(),
                    status: entry.status.to_string(),
                    created_at: datetime_to_string(&Utc::now()),
                })
                .execute(conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
    }

    async fn recent_logs(
        &self,
        owner: Option<i64>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LogEntry>, DatabaseError> {
        with_connection(self.db_path.clone(), move |conn| {
            use crate::db::schema_sqlite::forward_logs::dsl::*;
            let mut query: crate::db::schema_sqlite::forward_logs::BoxedQuery<'_, Sqlite> =
                forward_logs.into_boxed();
            if let Some(owner) = owner {
                query = query.filter(owner_id.eq(owner));
            }
            let results = query
                .order(id.desc())
                .limit(limit)
                .offset(offset)
                .select(DbLogEntry::as_select())
                .load::<DbLogEntry>(conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;

            results
                .into_iter()
                .map(DbLogEntry::into_log_entry)
                .collect()
        })
        .await
    }
}
