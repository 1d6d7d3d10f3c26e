//! Configured connection repository

use super::SqliteDirectoryStore;
use crate::error::{DirectoryError, Result};
use crate::models::{ApiConnectionConfig, ConnectionStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Connection totals by health.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionCounts {
    pub total: i64,
    pub connected: i64,
    pub error: i64,
}

#[async_trait]
pub trait ConnectionRepository: Send + Sync {
    async fn find_connection(&self, id: &str) -> Result<Option<ApiConnectionConfig>>;

    /// Insert a new connection
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails
    async fn insert_connection(&self, connection: &ApiConnectionConfig) -> Result<()>;

    /// Update an existing connection
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the connection does not exist
    async fn update_connection(&self, connection: &ApiConnectionConfig) -> Result<()>;

    /// Every configured connection, ordered by name.
    async fn list_connections(&self) -> Result<Vec<ApiConnectionConfig>>;

    /// Enabled connections whose `next_sync` is unset or at or before `now`.
    async fn list_due_connections(&self, now: i64) -> Result<Vec<ApiConnectionConfig>>;

    async fn count_connections(&self) -> Result<ConnectionCounts>;
}

#[derive(Debug, FromRow)]
struct ConnectionRow {
    id: String,
    name: String,
    provider: String,
    base_url: String,
    api_version: Option<String>,
    credentials: Option<String>,
    sync_enabled: bool,
    sync_interval_minutes: Option<String>,
    last_sync: Option<i64>,
    next_sync: Option<i64>,
    status: String,
    health_check_message: Option<String>,
    last_health_check: Option<i64>,
    rate_limit_requests: i64,
    rate_limit_window: String,
    supports_users: bool,
    supports_devices: bool,
    supports_groups: bool,
    supports_realtime: bool,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<ConnectionRow> for ApiConnectionConfig {
    type Error = DirectoryError;

    fn try_from(row: ConnectionRow) -> Result<Self> {
        Ok(ApiConnectionConfig {
            id: row.id,
            name: row.name,
            provider: row.provider.parse()?,
            base_url: row.base_url,
            api_version: row.api_version,
            credentials: row.credentials,
            sync_enabled: row.sync_enabled,
            sync_interval_minutes: row.sync_interval_minutes,
            last_sync: row.last_sync,
            next_sync: row.next_sync,
            status: row.status.parse()?,
            health_check_message: row.health_check_message,
            last_health_check: row.last_health_check,
            rate_limit_requests: row.rate_limit_requests,
            rate_limit_window: row.rate_limit_window.parse()?,
            supports_users: row.supports_users,
            supports_devices: row.supports_devices,
            supports_groups: row.supports_groups,
            supports_realtime: row.supports_realtime,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const CONNECTION_COLUMNS: &str = "id, name, provider, base_url, api_version, credentials, \
     sync_enabled, sync_interval_minutes, last_sync, next_sync, status, health_check_message, \
     last_health_check, rate_limit_requests, rate_limit_window, supports_users, \
     supports_devices, supports_groups, supports_realtime, created_at, updated_at";

#[async_trait]
impl ConnectionRepository for SqliteDirectoryStore {
    async fn find_connection(&self, id: &str) -> Result<Option<ApiConnectionConfig>> {
        let row = sqlx::query_as::<_, ConnectionRow>(&format!(
            "SELECT {} FROM api_connections WHERE id = ?",
            CONNECTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ApiConnectionConfig::try_from).transpose()
    }

    async fn insert_connection(&self, connection: &ApiConnectionConfig) -> Result<()> {
        connection.validate()?;

        sqlx::query(
            r#"
            INSERT INTO api_connections (
                id, name, provider, base_url, api_version, credentials,
                sync_enabled, sync_interval_minutes, last_sync, next_sync, status,
                health_check_message, last_health_check, rate_limit_requests,
                rate_limit_window, supports_users, supports_devices, supports_groups,
                supports_realtime, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&connection.id)
        .bind(&connection.name)
        .bind(connection.provider.as_str())
        .bind(&connection.base_url)
        .bind(&connection.api_version)
        .bind(&connection.credentials)
        .bind(connection.sync_enabled)
        .bind(&connection.sync_interval_minutes)
        .bind(connection.last_sync)
        .bind(connection.next_sync)
        .bind(connection.status.as_str())
        .bind(&connection.health_check_message)
        .bind(connection.last_health_check)
        .bind(connection.rate_limit_requests)
        .bind(connection.rate_limit_window.as_str())
        .bind(connection.supports_users)
        .bind(connection.supports_devices)
        .bind(connection.supports_groups)
        .bind(connection.supports_realtime)
        .bind(connection.created_at)
        .bind(connection.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_connection(&self, connection: &ApiConnectionConfig) -> Result<()> {
        connection.validate()?;

        let result = sqlx::query(
            r#"
            UPDATE api_connections SET
                name = ?, provider = ?, base_url = ?, api_version = ?, credentials = ?,
                sync_enabled = ?, sync_interval_minutes = ?, last_sync = ?, next_sync = ?,
                status = ?, health_check_message = ?, last_health_check = ?,
                rate_limit_requests = ?, rate_limit_window = ?, supports_users = ?,
                supports_devices = ?, supports_groups = ?, supports_realtime = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&connection.name)
        .bind(connection.provider.as_str())
        .bind(&connection.base_url)
        .bind(&connection.api_version)
        .bind(&connection.credentials)
        .bind(connection.sync_enabled)
        .bind(&connection.sync_interval_minutes)
        .bind(connection.last_sync)
        .bind(connection.next_sync)
        .bind(connection.status.as_str())
        .bind(&connection.health_check_message)
        .bind(connection.last_health_check)
        .bind(connection.rate_limit_requests)
        .bind(connection.rate_limit_window.as_str())
        .bind(connection.supports_users)
        .bind(connection.supports_devices)
        .bind(connection.supports_groups)
        .bind(connection.supports_realtime)
        .bind(connection.updated_at)
        .bind(&connection.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DirectoryError::not_found("ApiConnectionConfig", &connection.id));
        }

        Ok(())
    }

    async fn list_connections(&self) -> Result<Vec<ApiConnectionConfig>> {
        let rows = sqlx::query_as::<_, ConnectionRow>(&format!(
            "SELECT {} FROM api_connections ORDER BY name, id",
            CONNECTION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(ApiConnectionConfig::try_from)
            .collect::<Result<Vec<_>>>()
    }

    async fn list_due_connections(&self, now: i64) -> Result<Vec<ApiConnectionConfig>> {
        let rows = sqlx::query_as::<_, ConnectionRow>(&format!(
            "SELECT {} FROM api_connections
             WHERE sync_enabled = 1 AND (next_sync IS NULL OR next_sync <= ?)
             ORDER BY next_sync IS NOT NULL, next_sync, name",
            CONNECTION_COLUMNS
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(ApiConnectionConfig::try_from)
            .collect::<Result<Vec<_>>>()
    }

    async fn count_connections(&self) -> Result<ConnectionCounts> {
        let (total, connected, error): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN status = ? THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = ? THEN 1 ELSE 0 END), 0)
            FROM api_connections
            "#,
        )
        .bind(ConnectionStatus::Connected.as_str())
        .bind(ConnectionStatus::Error.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(ConnectionCounts {
            total,
            connected,
            error,
        })
    }
}
