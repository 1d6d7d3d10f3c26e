//! Canonical identity repository

use super::{escape_like, SqliteDirectoryStore};
use crate::error::{DirectoryError, Result};
use crate::models::{CanonicalIdentity, IdentityStatus};
use async_trait::async_trait;
use sqlx::{FromRow, QueryBuilder, Sqlite};

/// Attribute predicate for identity lookups. Unset fields do not constrain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityFilter {
    /// Case-insensitive substring of the full name
    pub name_contains: Option<String>,
    /// Exact department
    pub department: Option<String>,
    pub employee_id: Option<String>,
    pub status: Option<IdentityStatus>,
}

impl IdentityFilter {
    pub fn name_contains(mut self, name: impl Into<String>) -> Self {
        self.name_contains = Some(name.into());
        self
    }

    pub fn department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    pub fn employee_id(mut self, employee_id: impl Into<String>) -> Self {
        self.employee_id = Some(employee_id.into());
        self
    }

    pub fn status(mut self, status: IdentityStatus) -> Self {
        self.status = Some(status);
        self
    }
}

/// A disabled identity together with what it still holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityResourceSummary {
    pub identity: CanonicalIdentity,
    pub device_count: i64,
    pub account_count: i64,
}

#[async_trait]
pub trait IdentityRepository: Send + Sync {
    async fn find_identity_by_id(&self, id: &str) -> Result<Option<CanonicalIdentity>>;

    /// Exact match on the normalized (trimmed, lower-cased) email.
    async fn find_identity_by_email(&self, email: &str) -> Result<Option<CanonicalIdentity>>;

    /// All identities matching every set field of `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn find_identities(&self, filter: &IdentityFilter) -> Result<Vec<CanonicalIdentity>>;

    /// Insert a new identity
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Validation fails
    /// - An identity with the same email already exists
    async fn insert_identity(&self, identity: &CanonicalIdentity) -> Result<()>;

    /// Update an existing identity
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the identity does not exist
    async fn update_identity(&self, identity: &CanonicalIdentity) -> Result<()>;

    /// Disabled identities that still own at least one device or linked account.
    async fn list_disabled_identities_with_resources(&self) -> Result<Vec<IdentityResourceSummary>>;
}

#[derive(Debug, FromRow)]
struct IdentityRow {
    id: String,
    email: String,
    full_name: String,
    department: String,
    role: String,
    manager: Option<String>,
    location: Option<String>,
    status: String,
    employee_id: Option<String>,
    last_seen: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<IdentityRow> for CanonicalIdentity {
    type Error = DirectoryError;

    fn try_from(row: IdentityRow) -> Result<Self> {
        Ok(CanonicalIdentity {
            id: row.id,
            email: row.email,
            full_name: row.full_name,
            department: row.department,
            role: row.role,
            manager: row.manager,
            location: row.location,
            status: row.status.parse()?,
            employee_id: row.employee_id,
            last_seen: row.last_seen,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct IdentityResourceRow {
    #[sqlx(flatten)]
    identity: IdentityRow,
    device_count: i64,
    account_count: i64,
}

const IDENTITY_COLUMNS: &str = "id, email, full_name, department, role, manager, location, \
     status, employee_id, last_seen, created_at, updated_at";

#[async_trait]
impl IdentityRepository for SqliteDirectoryStore {
    async fn find_identity_by_id(&self, id: &str) -> Result<Option<CanonicalIdentity>> {
        let row = sqlx::query_as::<_, IdentityRow>(&format!(
            "SELECT {} FROM identities WHERE id = ?",
            IDENTITY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(CanonicalIdentity::try_from).transpose()
    }

    async fn find_identity_by_email(&self, email: &str) -> Result<Option<CanonicalIdentity>> {
        let row = sqlx::query_as::<_, IdentityRow>(&format!(
            "SELECT {} FROM identities WHERE email = ?",
            IDENTITY_COLUMNS
        ))
        .bind(email.trim().to_lowercase())
        .fetch_optional(&self.pool)
        .await?;

        row.map(CanonicalIdentity::try_from).transpose()
    }

    async fn find_identities(&self, filter: &IdentityFilter) -> Result<Vec<CanonicalIdentity>> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM identities WHERE 1 = 1", IDENTITY_COLUMNS));

        if let Some(name) = &filter.name_contains {
            builder
                .push(" AND LOWER(full_name) LIKE '%' || ")
                .push_bind(escape_like(&name.to_lowercase()))
                .push(" || '%' ESCAPE '\\'");
        }
        if let Some(department) = &filter.department {
            builder.push(" AND department = ").push_bind(department.clone());
        }
        if let Some(employee_id) = &filter.employee_id {
            builder.push(" AND employee_id = ").push_bind(employee_id.clone());
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        builder.push(" ORDER BY created_at, id");

        let rows = builder
            .build_query_as::<IdentityRow>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(CanonicalIdentity::try_from)
            .collect::<Result<Vec<_>>>()
    }

    async fn insert_identity(&self, identity: &CanonicalIdentity) -> Result<()> {
        identity.validate()?;

        sqlx::query(
            r#"
            INSERT INTO identities (
                id, email, full_name, department, role, manager, location,
                status, employee_id, last_seen, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&identity.id)
        .bind(&identity.email)
        .bind(&identity.full_name)
        .bind(&identity.department)
        .bind(&identity.role)
        .bind(&identity.manager)
        .bind(&identity.location)
        .bind(identity.status.as_str())
        .bind(&identity.employee_id)
        .bind(identity.last_seen)
        .bind(identity.created_at)
        .bind(identity.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_identity(&self, identity: &CanonicalIdentity) -> Result<()> {
        identity.validate()?;

        let result = sqlx::query(
            r#"
            UPDATE identities SET
                email = ?, full_name = ?, department = ?, role = ?,
                manager = ?, location = ?, status = ?, employee_id = ?,
                last_seen = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&identity.email)
        .bind(&identity.full_name)
        .bind(&identity.department)
        .bind(&identity.role)
        .bind(&identity.manager)
        .bind(&identity.location)
        .bind(identity.status.as_str())
        .bind(&identity.employee_id)
        .bind(identity.last_seen)
        .bind(identity.updated_at)
        .bind(&identity.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DirectoryError::not_found("CanonicalIdentity", &identity.id));
        }

        Ok(())
    }

    async fn list_disabled_identities_with_resources(&self) -> Result<Vec<IdentityResourceSummary>> {
        let rows = sqlx::query_as::<_, IdentityResourceRow>(
            r#"
            SELECT * FROM (
                SELECT i.id, i.email, i.full_name, i.department, i.role, i.manager,
                       i.location, i.status, i.employee_id, i.last_seen,
                       i.created_at, i.updated_at,
                       (SELECT COUNT(*) FROM devices d WHERE d.owner_id = i.id) AS device_count,
                       (SELECT COUNT(*) FROM accounts a WHERE a.identity_id = i.id) AS account_count
                FROM identities i
                WHERE i.status = 'disabled'
            )
            WHERE device_count > 0 OR account_count > 0
            ORDER BY email
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(IdentityResourceSummary {
                    identity: CanonicalIdentity::try_from(row.identity)?,
                    device_count: row.device_count,
                    account_count: row.account_count,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    async fn store() -> SqliteDirectoryStore {
        SqliteDirectoryStore::new(create_test_pool().await.unwrap())
    }

    fn identity(email: &str, name: &str, department: &str) -> CanonicalIdentity {
        CanonicalIdentity::new(email, name, department, "Engineer", 1_700_000_000)
    }

    #[tokio::test]
    async fn test_insert_and_find_by_email() {
        let store = store().await;
        let jane = identity("jane@corp.example", "Jane Doe", "Engineering");
        store.insert_identity(&jane).await.unwrap();

        let found = store
            .find_identity_by_email(" JANE@corp.example ")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found, jane);

        let by_id = store.find_identity_by_id(&jane.id).await.unwrap();
        assert_eq!(by_id, Some(jane));
    }

    #[tokio::test]
    async fn test_duplicate_email_is_rejected() {
        let store = store().await;
        store
            .insert_identity(&identity("jane@corp.example", "Jane Doe", "Engineering"))
            .await
            .unwrap();

        let result = store
            .insert_identity(&identity("jane@corp.example", "Jane D.", "Sales"))
            .await;
        assert!(matches!(result, Err(DirectoryError::Database(_))));
    }

    #[tokio::test]
    async fn test_update_identity() {
        let store = store().await;
        let mut jane = identity("jane@corp.example", "Jane Doe", "Engineering");
        store.insert_identity(&jane).await.unwrap();

        jane.department = "Platform".to_string();
        jane.status = IdentityStatus::Disabled;
        store.update_identity(&jane).await.unwrap();

        let found = store.find_identity_by_id(&jane.id).await.unwrap().unwrap();
        assert_eq!(found.department, "Platform");
        assert_eq!(found.status, IdentityStatus::Disabled);
    }

    #[tokio::test]
    async fn test_update_missing_identity_is_not_found() {
        let store = store().await;
        let ghost = identity("ghost@corp.example", "Ghost", "Nowhere");

        let result = store.update_identity(&ghost).await;
        assert!(matches!(result, Err(DirectoryError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_find_identities_by_name_and_department() {
        let store = store().await;
        store
            .insert_identity(&identity("john.smith@corp.example", "John Smith", "Engineering"))
            .await
            .unwrap();
        store
            .insert_identity(&identity("j.smith@corp.example", "Dr. John Smith", "Engineering"))
            .await
            .unwrap();
        store
            .insert_identity(&identity("john.s@corp.example", "John Smith", "Sales"))
            .await
            .unwrap();

        let filter = IdentityFilter::default()
            .name_contains("john smith")
            .department("Engineering");
        let matches = store.find_identities(&filter).await.unwrap();
        assert_eq!(matches.len(), 2);

        let filter = IdentityFilter::default().name_contains("JOHN");
        assert_eq!(store.find_identities(&filter).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_name_filter_treats_wildcards_literally() {
        let store = store().await;
        store
            .insert_identity(&identity("a@corp.example", "Ann Lee", "Ops"))
            .await
            .unwrap();

        let filter = IdentityFilter::default().name_contains("%");
        assert!(store.find_identities(&filter).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_find_identities_by_employee_id() {
        let store = store().await;
        let mut jane = identity("jane@corp.example", "Jane Doe", "Engineering");
        jane.employee_id = Some("E-1001".to_string());
        store.insert_identity(&jane).await.unwrap();

        let filter = IdentityFilter::default().employee_id("E-1001");
        let matches = store.find_identities(&filter).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, jane.id);
    }

    #[tokio::test]
    async fn test_disabled_identities_with_resources() {
        let store = store().await;
        let mut holder = identity("holder@corp.example", "Holder One", "Ops");
        holder.status = IdentityStatus::Disabled;
        store.insert_identity(&holder).await.unwrap();

        let mut idle = identity("idle@corp.example", "Idle Two", "Ops");
        idle.status = IdentityStatus::Disabled;
        store.insert_identity(&idle).await.unwrap();

        sqlx::query(
            "INSERT INTO devices (id, name, owner_id, status, compliant, created_at, updated_at)
             VALUES ('dev-1', 'Holder One''s Laptop', ?, 'unknown', 0, 0, 0)",
        )
        .bind(&holder.id)
        .execute(store.pool())
        .await
        .unwrap();

        let summaries = store.list_disabled_identities_with_resources().await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].identity.id, holder.id);
        assert_eq!(summaries[0].device_count, 1);
        assert_eq!(summaries[0].account_count, 0);
    }
}
