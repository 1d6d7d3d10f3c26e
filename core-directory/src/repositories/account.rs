//! External account repository

use super::SqliteDirectoryStore;
use crate::error::{DirectoryError, Result};
use crate::models::ExternalAccount;
use async_trait::async_trait;
use sqlx::FromRow;

#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Insert a new account
    ///
    /// # Errors
    ///
    /// Returns an error if the service name is empty or the linked identity does not exist
    async fn insert_account(&self, account: &ExternalAccount) -> Result<()>;

    /// Accounts not linked to any identity.
    async fn list_unlinked_accounts(&self) -> Result<Vec<ExternalAccount>>;

    async fn count_accounts_for_identity(&self, identity_id: &str) -> Result<i64>;
}

#[derive(Debug, FromRow)]
struct AccountRow {
    id: String,
    service: String,
    status: String,
    user_email: Option<String>,
    identity_id: Option<String>,
    created_at: i64,
}

impl From<AccountRow> for ExternalAccount {
    fn from(row: AccountRow) -> Self {
        ExternalAccount {
            id: row.id,
            service: row.service,
            status: row.status,
            user_email: row.user_email,
            identity_id: row.identity_id,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl AccountRepository for SqliteDirectoryStore {
    async fn insert_account(&self, account: &ExternalAccount) -> Result<()> {
        if account.service.trim().is_empty() {
            return Err(DirectoryError::InvalidData(
                "Account service cannot be empty".to_string(),
            ));
        }

        sqlx::query(
            r#"
            INSERT INTO accounts (id, service, status, user_email, identity_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&account.id)
        .bind(&account.service)
        .bind(&account.status)
        .bind(&account.user_email)
        .bind(&account.identity_id)
        .bind(account.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_unlinked_accounts(&self) -> Result<Vec<ExternalAccount>> {
        let rows = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT id, service, status, user_email, identity_id, created_at
            FROM accounts
            WHERE identity_id IS NULL
            ORDER BY service, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ExternalAccount::from).collect())
    }

    async fn count_accounts_for_identity(&self, identity_id: &str) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM accounts WHERE identity_id = ?")
            .bind(identity_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0)
    }
}
