//! Append-only activity trail

use super::SqliteDirectoryStore;
use crate::error::Result;
use crate::models::ActivityRecord;
use async_trait::async_trait;
use sqlx::FromRow;

#[async_trait]
pub trait ActivityRepository: Send + Sync {
    async fn append_activity_record(&self, record: &ActivityRecord) -> Result<()>;

    /// Newest first, at most `limit` records.
    async fn list_activity_for_identity(&self, identity_id: &str, limit: u32) -> Result<Vec<ActivityRecord>>;

    /// Newest first, at most `limit` records.
    async fn list_activity_for_device(&self, device_id: &str, limit: u32) -> Result<Vec<ActivityRecord>>;
}

#[derive(Debug, FromRow)]
struct ActivityRow {
    id: String,
    identity_id: Option<String>,
    device_id: Option<String>,
    source_system: String,
    description: String,
    created_at: i64,
}

impl From<ActivityRow> for ActivityRecord {
    fn from(row: ActivityRow) -> Self {
        ActivityRecord {
            id: row.id,
            identity_id: row.identity_id,
            device_id: row.device_id,
            source_system: row.source_system,
            description: row.description,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl ActivityRepository for SqliteDirectoryStore {
    async fn append_activity_record(&self, record: &ActivityRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO activity_records (id, identity_id, device_id, source_system, description, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.identity_id)
        .bind(&record.device_id)
        .bind(&record.source_system)
        .bind(&record.description)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_activity_for_identity(&self, identity_id: &str, limit: u32) -> Result<Vec<ActivityRecord>> {
        let rows = sqlx::query_as::<_, ActivityRow>(
            r#"
            SELECT id, identity_id, device_id, source_system, description, created_at
            FROM activity_records
            WHERE identity_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(identity_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ActivityRecord::from).collect())
    }

    async fn list_activity_for_device(&self, device_id: &str, limit: u32) -> Result<Vec<ActivityRecord>> {
        let rows = sqlx::query_as::<_, ActivityRow>(
            r#"
            SELECT id, identity_id, device_id, source_system, description, created_at
            FROM activity_records
            WHERE device_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(device_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ActivityRecord::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::{CanonicalIdentity, Device};
    use crate::repositories::{DeviceRepository, IdentityRepository};

    #[tokio::test]
    async fn test_activity_is_listed_newest_first() {
        let store = SqliteDirectoryStore::new(create_test_pool().await.unwrap());
        let jane = CanonicalIdentity::new("jane@corp.example", "Jane Doe", "Eng", "Engineer", 0);
        store.insert_identity(&jane).await.unwrap();
        let laptop = Device::new("Jane Doe's Laptop", 0);
        store.insert_device(&laptop).await.unwrap();

        let first = ActivityRecord::new("Okta-Prod", "USER_CORRELATED", 10).with_identity(&jane.id);
        let second = ActivityRecord::new("Intune", "DEVICE_CORRELATED", 20)
            .with_identity(&jane.id)
            .with_device(&laptop.id);
        store.append_activity_record(&first).await.unwrap();
        store.append_activity_record(&second).await.unwrap();

        let for_jane = store.list_activity_for_identity(&jane.id, 10).await.unwrap();
        assert_eq!(for_jane, vec![second.clone(), first]);

        let limited = store.list_activity_for_identity(&jane.id, 1).await.unwrap();
        assert_eq!(limited.len(), 1);

        let for_laptop = store.list_activity_for_device(&laptop.id, 10).await.unwrap();
        assert_eq!(for_laptop, vec![second]);
    }
}
