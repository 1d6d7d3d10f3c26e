//! Device repository

use super::SqliteDirectoryStore;
use crate::error::{DirectoryError, Result};
use crate::models::Device;
use async_trait::async_trait;
use sqlx::FromRow;

#[async_trait]
pub trait DeviceRepository: Send + Sync {
    async fn find_device_by_id(&self, id: &str) -> Result<Option<Device>>;

    /// Match on the normalized (upper-case, colon separated) MAC address.
    async fn find_device_by_mac(&self, mac_address: &str) -> Result<Option<Device>>;

    /// Exact name match for a given owner (`None` matches unowned devices).
    async fn find_device_by_name_and_owner(
        &self,
        name: &str,
        owner_id: Option<&str>,
    ) -> Result<Option<Device>>;

    async fn find_device_by_ip(&self, ip_address: &str) -> Result<Option<Device>>;

    /// Insert a new device
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails or the owner does not exist
    async fn insert_device(&self, device: &Device) -> Result<()>;

    /// Update an existing device
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the device does not exist
    async fn update_device(&self, device: &Device) -> Result<()>;

    /// Devices with no owner, most recently seen first.
    async fn list_unowned_devices(&self) -> Result<Vec<Device>>;

    async fn count_devices_for_identity(&self, identity_id: &str) -> Result<i64>;
}

#[derive(Debug, FromRow)]
struct DeviceRow {
    id: String,
    name: String,
    owner_id: Option<String>,
    ip_address: Option<String>,
    mac_address: Option<String>,
    vlan: Option<String>,
    os_version: Option<String>,
    status: String,
    compliant: bool,
    last_seen: Option<i64>,
    last_check_in: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<DeviceRow> for Device {
    type Error = DirectoryError;

    fn try_from(row: DeviceRow) -> Result<Self> {
        Ok(Device {
            id: row.id,
            name: row.name,
            owner_id: row.owner_id,
            ip_address: row.ip_address,
            mac_address: row.mac_address,
            vlan: row.vlan,
            os_version: row.os_version,
            status: row.status.parse()?,
            compliant: row.compliant,
            last_seen: row.last_seen,
            last_check_in: row.last_check_in,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const DEVICE_COLUMNS: &str = "id, name, owner_id, ip_address, mac_address, vlan, os_version, \
     status, compliant, last_seen, last_check_in, created_at, updated_at";

impl SqliteDirectoryStore {
    async fn fetch_device(&self, predicate: &str, value: &str) -> Result<Option<Device>> {
        let row = sqlx::query_as::<_, DeviceRow>(&format!(
            "SELECT {} FROM devices WHERE {} ORDER BY created_at, id LIMIT 1",
            DEVICE_COLUMNS, predicate
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Device::try_from).transpose()
    }
}

#[async_trait]
impl DeviceRepository for SqliteDirectoryStore {
    async fn find_device_by_id(&self, id: &str) -> Result<Option<Device>> {
        self.fetch_device("id = ?", id).await
    }

    async fn find_device_by_mac(&self, mac_address: &str) -> Result<Option<Device>> {
        self.fetch_device("mac_address = ?", mac_address).await
    }

    async fn find_device_by_name_and_owner(
        &self,
        name: &str,
        owner_id: Option<&str>,
    ) -> Result<Option<Device>> {
        let row = sqlx::query_as::<_, DeviceRow>(&format!(
            "SELECT {} FROM devices WHERE name = ? AND owner_id IS ? ORDER BY created_at, id LIMIT 1",
            DEVICE_COLUMNS
        ))
        .bind(name)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Device::try_from).transpose()
    }

    async fn find_device_by_ip(&self, ip_address: &str) -> Result<Option<Device>> {
        self.fetch_device("ip_address = ?", ip_address).await
    }

    async fn insert_device(&self, device: &Device) -> Result<()> {
        device.validate()?;

        sqlx::query(
            r#"
            INSERT INTO devices (
                id, name, owner_id, ip_address, mac_address, vlan, os_version,
                status, compliant, last_seen, last_check_in, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&device.id)
        .bind(&device.name)
        .bind(&device.owner_id)
        .bind(&device.ip_address)
        .bind(&device.mac_address)
        .bind(&device.vlan)
        .bind(&device.os_version)
        .bind(device.status.as_str())
        .bind(device.compliant)
        .bind(device.last_seen)
        .bind(device.last_check_in)
        .bind(device.created_at)
        .bind(device.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_device(&self, device: &Device) -> Result<()> {
        device.validate()?;

        let result = sqlx::query(
            r#"
            UPDATE devices SET
                name = ?, owner_id = ?, ip_address = ?, mac_address = ?, vlan = ?,
                os_version = ?, status = ?, compliant = ?, last_seen = ?,
                last_check_in = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&device.name)
        .bind(&device.owner_id)
        .bind(&device.ip_address)
        .bind(&device.mac_address)
        .bind(&device.vlan)
        .bind(&device.os_version)
        .bind(device.status.as_str())
        .bind(device.compliant)
        .bind(device.last_seen)
        .bind(device.last_check_in)
        .bind(device.updated_at)
        .bind(&device.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DirectoryError::not_found("Device", &device.id));
        }

        Ok(())
    }

    async fn list_unowned_devices(&self) -> Result<Vec<Device>> {
        let rows = sqlx::query_as::<_, DeviceRow>(&format!(
            "SELECT {} FROM devices WHERE owner_id IS NULL ORDER BY last_seen DESC, id",
            DEVICE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(Device::try_from)
            .collect::<Result<Vec<_>>>()
    }

    async fn count_devices_for_identity(&self, identity_id: &str) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM devices WHERE owner_id = ?")
            .bind(identity_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::{CanonicalIdentity, DeviceStatus};
    use crate::repositories::IdentityRepository;

    async fn store() -> SqliteDirectoryStore {
        SqliteDirectoryStore::new(create_test_pool().await.unwrap())
    }

    async fn owner(store: &SqliteDirectoryStore) -> CanonicalIdentity {
        let identity =
            CanonicalIdentity::new("jane@corp.example", "Jane Doe", "Engineering", "Engineer", 0);
        store.insert_identity(&identity).await.unwrap();
        identity
    }

    #[tokio::test]
    async fn test_insert_and_find_by_mac_and_ip() {
        let store = store().await;
        let mut device = Device::new("JANE-LAPTOP", 100);
        device.mac_address = Some("AA:BB:CC:DD:EE:FF".to_string());
        device.ip_address = Some("10.0.0.5".to_string());
        device.status = DeviceStatus::Connected;
        device.compliant = true;
        store.insert_device(&device).await.unwrap();

        let by_mac = store
            .find_device_by_mac("AA:BB:CC:DD:EE:FF")
            .await
            .unwrap();
        assert_eq!(by_mac, Some(device.clone()));

        let by_ip = store.find_device_by_ip("10.0.0.5").await.unwrap();
        assert_eq!(by_ip.map(|d| d.id), Some(device.id));

        assert!(store.find_device_by_ip("10.0.0.6").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_by_name_and_owner_distinguishes_null_owner() {
        let store = store().await;
        let jane = owner(&store).await;

        let mut owned = Device::new("Workstation", 0);
        owned.owner_id = Some(jane.id.clone());
        store.insert_device(&owned).await.unwrap();

        let unowned = Device::new("Workstation", 0);
        store.insert_device(&unowned).await.unwrap();

        let found = store
            .find_device_by_name_and_owner("Workstation", Some(&jane.id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, owned.id);

        let found = store
            .find_device_by_name_and_owner("Workstation", None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, unowned.id);
    }

    #[tokio::test]
    async fn test_insert_with_unknown_owner_fails() {
        let store = store().await;
        let mut device = Device::new("Orphan", 0);
        device.owner_id = Some("missing-identity".to_string());

        assert!(store.insert_device(&device).await.is_err());
    }

    #[tokio::test]
    async fn test_update_device_and_count_for_owner() {
        let store = store().await;
        let jane = owner(&store).await;

        let mut device = Device::new("JANE-LAPTOP", 0);
        store.insert_device(&device).await.unwrap();
        assert_eq!(store.count_devices_for_identity(&jane.id).await.unwrap(), 0);

        device.owner_id = Some(jane.id.clone());
        device.name = "Jane Doe's Laptop".to_string();
        store.update_device(&device).await.unwrap();

        assert_eq!(store.count_devices_for_identity(&jane.id).await.unwrap(), 1);
        let stored = store.find_device_by_id(&device.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Jane Doe's Laptop");
    }

    #[tokio::test]
    async fn test_update_missing_device_is_not_found() {
        let store = store().await;
        let result = store.update_device(&Device::new("Ghost", 0)).await;
        assert!(matches!(result, Err(DirectoryError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_list_unowned_devices() {
        let store = store().await;
        let jane = owner(&store).await;

        let mut owned = Device::new("Owned", 0);
        owned.owner_id = Some(jane.id.clone());
        store.insert_device(&owned).await.unwrap();

        let older = Device::new("Older", 10);
        let newer = Device::new("Newer", 20);
        store.insert_device(&older).await.unwrap();
        store.insert_device(&newer).await.unwrap();

        let names: Vec<_> = store
            .list_unowned_devices()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["Newer", "Older"]);
    }
}
