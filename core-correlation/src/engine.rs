//! # Identity Correlation Engine
//!
//! Maps raw source records onto canonical identities and devices.
//!
//! ## User records
//!
//! 1. [`validate_user_record`] extracts the attributes
//! 2. [`CorrelationEngine::resolve_canonical_user`] finds the identity:
//!    exact email, then a unique employee id, then a unique name + department
//!    match, else a new identity
//! 3. [`CorrelationEngine::apply_conflict_resolution`] merges the record into
//!    it under the source-category rules
//! 4. The identity is persisted and an activity record appended
//!
//! ## Device records
//!
//! 1. [`validate_device_record`] extracts the attributes
//! 2. [`CorrelationEngine::infer_device_owner`] looks for an owner
//! 3. [`CorrelationEngine::resolve_or_create_device`] matches on MAC, then
//!    name + owner, then IP, else creates the device
//! 4. [`CorrelationEngine::apply_device_update_rules`] merges the record
//!
//! Every failure is per record: validation problems come back as
//! [`CorrelationError::Validation`] and store failures as
//! [`CorrelationError::Store`]. Callers fold them into a
//! [`CorrelationOutcome`](crate::CorrelationOutcome) and move on.

use crate::error::{CorrelationError, Result};
use crate::locks::EntityLocks;
use crate::naming::improve_device_name;
use crate::orphans::OrphanReport;
use crate::outcome::{DeviceCorrelation, UserCorrelation};
use crate::policy::{SourceCategory, SourcePolicy};
use crate::validation::{validate_device_record, validate_user_record, NormalizedDevice, NormalizedUser};
use bridge_traits::time::Clock;
use core_directory::{
    ActivityRecord, CanonicalIdentity, Device, DirectoryError, DirectoryStore, IdentityFilter,
};
use core_runtime::events::{CoreEvent, CorrelationEvent, EventBus};
use core_runtime::logging::redact_if_sensitive;
use regex::Regex;
use serde_json::Value;
use std::sync::{Arc, LazyLock, RwLock};
use tracing::{debug, info, instrument, warn};

static EMBEDDED_EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b")
        .expect("EMBEDDED_EMAIL is a valid regex pattern")
});

trait StoreContext<T> {
    fn context(self, source_system: &str, record_hint: &str) -> Result<T>;
}

impl<T> StoreContext<T> for std::result::Result<T, DirectoryError> {
    fn context(self, source_system: &str, record_hint: &str) -> Result<T> {
        self.map_err(|e| CorrelationError::store(source_system, record_hint, e))
    }
}

pub struct CorrelationEngine {
    store: Arc<dyn DirectoryStore>,
    clock: Arc<dyn Clock>,
    policy: RwLock<SourcePolicy>,
    event_bus: Option<EventBus>,
    locks: EntityLocks,
}

impl CorrelationEngine {
    /// Create an engine with the default source policy table.
    pub fn new(store: Arc<dyn DirectoryStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            policy: RwLock::new(SourcePolicy::default()),
            event_bus: None,
            locks: EntityLocks::default(),
        }
    }

    pub fn with_policy(mut self, policy: SourcePolicy) -> Self {
        self.policy = RwLock::new(policy);
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Classify a new source, or reclassify a known one, while running.
    pub fn register_source(&self, name: &str, category: SourceCategory) {
        match self.policy.write() {
            Ok(mut policy) => policy.insert(name, category),
            Err(poisoned) => poisoned.into_inner().insert(name, category),
        }
        info!(source = name, category = %category, "Registered source category");
    }

    pub fn classify_source(&self, source_system: &str) -> SourceCategory {
        match self.policy.read() {
            Ok(policy) => policy.classify(source_system),
            Err(poisoned) => poisoned.into_inner().classify(source_system),
        }
    }

    fn emit(&self, event: CorrelationEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Correlation(event)).ok();
        }
    }

    async fn append_activity(&self, record: ActivityRecord) {
        if let Err(e) = self.store.append_activity_record(&record).await {
            warn!(error = %e, source = %record.source_system, "Failed to append activity record");
        }
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Correlate one raw user record end to end.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationError::Validation`] for records without a usable
    /// email and [`CorrelationError::Store`] when a directory write fails.
    #[instrument(skip(self, raw))]
    pub async fn correlate_user(&self, raw: &Value, source_system: &str) -> Result<UserCorrelation> {
        let user = validate_user_record(raw, source_system)?;
        let hint = redact_if_sensitive("email", &user.email);

        let _email_guard = self.locks.lock(format!("email:{}", user.email)).await;
        let (resolved, created) = self.resolve_canonical_user(&user, source_system).await?;

        let _identity_guard = self.locks.lock(format!("identity:{}", resolved.id)).await;
        let mut identity = if created {
            resolved
        } else {
            // Another source may have written it since it was resolved
            self.store
                .find_identity_by_id(&resolved.id)
                .await
                .context(source_system, &hint)?
                .unwrap_or(resolved)
        };

        let conflicts_resolved = self.apply_conflict_resolution(&mut identity, &user, source_system);
        self.store
            .update_identity(&identity)
            .await
            .context(source_system, &hint)?;

        let now = self.clock.unix_timestamp();
        self.append_activity(
            ActivityRecord::new(
                source_system,
                format!("Data correlation from {}: USER_CORRELATED", source_system),
                now,
            )
            .with_identity(&identity.id),
        )
        .await;

        debug!(
            identity_id = %identity.id,
            created,
            conflicts_resolved,
            "User correlated"
        );

        Ok(UserCorrelation {
            identity,
            created,
            conflicts_resolved,
        })
    }

    /// Find the canonical identity a user record belongs to, creating one when
    /// nothing matches with confidence.
    ///
    /// Only an exact email match merges unconditionally. The employee id and
    /// name + department strategies must each yield exactly one candidate;
    /// an ambiguous result falls through to creating a new identity.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationError::Store`] when a lookup or the insert fails.
    pub async fn resolve_canonical_user(
        &self,
        user: &NormalizedUser,
        source_system: &str,
    ) -> Result<(CanonicalIdentity, bool)> {
        let hint = redact_if_sensitive("email", &user.email);

        if let Some(identity) = self
            .store
            .find_identity_by_email(&user.email)
            .await
            .context(source_system, &hint)?
        {
            debug!(identity_id = %identity.id, "Matched identity by email");
            return Ok((identity, false));
        }

        if let Some(employee_id) = &user.employee_id {
            let candidates = self
                .store
                .find_identities(&IdentityFilter::default().employee_id(employee_id.as_str()))
                .await
                .context(source_system, &hint)?;
            match candidates.len() {
                0 => {}
                1 => {
                    if let Some(identity) = candidates.into_iter().next() {
                        info!(identity_id = %identity.id, "Matched identity by employee id");
                        return Ok((identity, false));
                    }
                }
                n => warn!(candidates = n, "Employee id is shared by several identities, ignoring it"),
            }
        }

        let candidates = self
            .store
            .find_identities(
                &IdentityFilter::default()
                    .name_contains(user.full_name.as_str())
                    .department(user.department.as_str()),
            )
            .await
            .context(source_system, &hint)?;
        match candidates.len() {
            0 => {}
            1 => {
                if let Some(identity) = candidates.into_iter().next() {
                    warn!(
                        identity_id = %identity.id,
                        department = %user.department,
                        "Matched identity by name and department"
                    );
                    return Ok((identity, false));
                }
            }
            n => warn!(
                candidates = n,
                department = %user.department,
                "Several identities match name and department, creating a new identity"
            ),
        }

        let now = self.clock.unix_timestamp();
        let mut identity = CanonicalIdentity::new(
            user.email.as_str(),
            user.full_name.as_str(),
            user.department.as_str(),
            user.role.as_str(),
            now,
        );
        identity.manager = user.manager.clone();
        identity.location = user.location.clone();
        identity.status = user.status;
        identity.employee_id = user.employee_id.clone();

        self.store
            .insert_identity(&identity)
            .await
            .context(source_system, &hint)?;

        info!(identity_id = %identity.id, email = %hint, source = source_system, "Created canonical identity");
        self.emit(CorrelationEvent::IdentityCreated {
            identity_id: identity.id.clone(),
            source_system: source_system.to_string(),
        });

        Ok((identity, true))
    }

    /// Merge a user record into `identity` in place and return the number of
    /// fields that changed.
    ///
    /// - HR sources overwrite department and role
    /// - Identity providers overwrite status
    /// - Any source sets manager and location when it has a value
    /// - The full name only ever gets longer
    ///
    /// `last_seen` moves to now regardless.
    pub fn apply_conflict_resolution(
        &self,
        identity: &mut CanonicalIdentity,
        user: &NormalizedUser,
        source_system: &str,
    ) -> u32 {
        let category = self.classify_source(source_system);
        let mut changes = 0;

        if category == SourceCategory::Hr {
            if identity.department != user.department {
                info!(
                    from = %identity.department,
                    to = %user.department,
                    source = source_system,
                    "HR source updating department"
                );
                identity.department = user.department.clone();
                changes += 1;
            }
            if identity.role != user.role {
                info!(from = %identity.role, to = %user.role, source = source_system, "HR source updating role");
                identity.role = user.role.clone();
                changes += 1;
            }
        }

        if category == SourceCategory::IdentityProvider && identity.status != user.status {
            info!(
                from = %identity.status,
                to = %user.status,
                source = source_system,
                "Identity provider updating status"
            );
            identity.status = user.status;
            changes += 1;
        }

        if let Some(manager) = &user.manager {
            if identity.manager.as_ref() != Some(manager) {
                identity.manager = Some(manager.clone());
                changes += 1;
            }
        }

        if let Some(location) = &user.location {
            if identity.location.as_ref() != Some(location) {
                identity.location = Some(location.clone());
                changes += 1;
            }
        }

        if user.full_name.chars().count() > identity.full_name.chars().count() {
            identity.full_name = user.full_name.clone();
            changes += 1;
        }

        if identity.employee_id.is_none() && user.employee_id.is_some() {
            identity.employee_id = user.employee_id.clone();
        }

        let now = self.clock.unix_timestamp();
        identity.last_seen = Some(now);
        identity.updated_at = now;

        if changes > 0 {
            info!(identity_id = %identity.id, conflicts = changes, "Resolved field conflicts");
        }
        changes
    }

    // =========================================================================
    // Devices
    // =========================================================================

    /// Correlate one raw device record end to end.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationError::Validation`] for non-object records and
    /// [`CorrelationError::Store`] when a directory call fails.
    #[instrument(skip(self, raw))]
    pub async fn correlate_device(&self, raw: &Value, source_system: &str) -> Result<DeviceCorrelation> {
        let normalized = validate_device_record(raw, source_system)?;
        let hint = normalized.name.clone();
        let inferred = self.infer_device_owner(&normalized, source_system).await?;

        let key = match &normalized.mac_address {
            Some(mac) => format!("device-mac:{}", mac),
            None => format!("device-name:{}", normalized.name),
        };
        let _key_guard = self.locks.lock(key).await;
        let (resolved, created) = self
            .resolve_or_create_device(&normalized, inferred.as_ref(), source_system)
            .await?;

        let _device_guard = self.locks.lock(format!("device:{}", resolved.id)).await;
        let mut device = if created {
            resolved
        } else {
            self.store
                .find_device_by_id(&resolved.id)
                .await
                .context(source_system, &hint)?
                .unwrap_or(resolved)
        };

        let previous_owner = device.owner_id.clone();
        let owner = match (&device.owner_id, inferred) {
            (Some(owner_id), Some(inferred)) if *owner_id == inferred.id => Some(inferred),
            (Some(owner_id), _) => self
                .store
                .find_identity_by_id(owner_id)
                .await
                .context(source_system, &hint)?,
            (None, inferred) => inferred,
        };

        let conflicts_resolved =
            self.apply_device_update_rules(&mut device, &normalized, owner.as_ref(), source_system);
        self.store
            .update_device(&device)
            .await
            .context(source_system, &hint)?;

        if let Some(owner_id) = &device.owner_id {
            if created || previous_owner.is_none() {
                self.emit(CorrelationEvent::OwnerInferred {
                    device_id: device.id.clone(),
                    identity_id: owner_id.clone(),
                });
            }

            let now = self.clock.unix_timestamp();
            self.append_activity(
                ActivityRecord::new(
                    source_system,
                    format!("Data correlation from {}: DEVICE_CORRELATED", source_system),
                    now,
                )
                .with_device(&device.id)
                .with_identity(owner_id),
            )
            .await;
        }

        debug!(device_id = %device.id, created, conflicts_resolved, "Device correlated");

        Ok(DeviceCorrelation {
            device,
            created,
            conflicts_resolved,
        })
    }

    /// Best-effort owner lookup for a device record.
    ///
    /// Tries the owner id hint, the owner email hint, a possessive
    /// `"<Name>'s "` prefix in the device name (accepted only when exactly one
    /// identity's name contains it) and an email embedded in the device name.
    /// `Ok(None)` leaves the device orphaned; it is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationError::Store`] when a lookup fails.
    pub async fn infer_device_owner(
        &self,
        device: &NormalizedDevice,
        source_system: &str,
    ) -> Result<Option<CanonicalIdentity>> {
        let hint = device.name.as_str();

        if let Some(owner_id) = &device.owner_id {
            if let Some(owner) = self
                .store
                .find_identity_by_id(owner_id)
                .await
                .context(source_system, hint)?
            {
                return Ok(Some(owner));
            }
        }

        if let Some(owner_email) = &device.owner_email {
            if let Some(owner) = self
                .store
                .find_identity_by_email(owner_email)
                .await
                .context(source_system, hint)?
            {
                return Ok(Some(owner));
            }
        }

        let name = device.name.to_lowercase();

        if let Some((owner_name, _)) = name.split_once("'s ") {
            let owner_name = owner_name.trim();
            if !owner_name.is_empty() {
                let candidates = self
                    .store
                    .find_identities(&IdentityFilter::default().name_contains(owner_name))
                    .await
                    .context(source_system, hint)?;
                if candidates.len() == 1 {
                    return Ok(candidates.into_iter().next());
                }
                debug!(candidates = candidates.len(), device = hint, "Possessive owner name is not unique");
            }
        }

        if let Some(found) = EMBEDDED_EMAIL.find(&name) {
            if let Some(owner) = self
                .store
                .find_identity_by_email(found.as_str())
                .await
                .context(source_system, hint)?
            {
                return Ok(Some(owner));
            }
        }

        warn!(device = hint, source = source_system, "Could not find owner for device");
        Ok(None)
    }

    /// Find the device a record describes, creating it when nothing matches.
    ///
    /// A new device with a known owner gets its name improved before it is
    /// stored; the name + owner lookup therefore tries both spellings.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationError::Store`] when a lookup or the insert fails.
    pub async fn resolve_or_create_device(
        &self,
        device: &NormalizedDevice,
        owner: Option<&CanonicalIdentity>,
        source_system: &str,
    ) -> Result<(Device, bool)> {
        let hint = device.name.as_str();

        if let Some(mac) = &device.mac_address {
            if let Some(existing) = self
                .store
                .find_device_by_mac(mac)
                .await
                .context(source_system, hint)?
            {
                debug!(device_id = %existing.id, "Matched device by MAC address");
                return Ok((existing, false));
            }
        }

        let improved_name = owner.map(|owner| improve_device_name(&device.name, &owner.full_name));

        let mut names = vec![device.name.as_str()];
        if let Some(improved) = improved_name.as_deref().filter(|n| *n != device.name) {
            names.push(improved);
        }
        let owner_id = owner.map(|owner| owner.id.as_str());
        for name in names {
            if let Some(existing) = self
                .store
                .find_device_by_name_and_owner(name, owner_id)
                .await
                .context(source_system, hint)?
            {
                debug!(device_id = %existing.id, "Matched device by name and owner");
                return Ok((existing, false));
            }
        }

        if let Some(ip) = &device.ip_address {
            if let Some(existing) = self
                .store
                .find_device_by_ip(ip)
                .await
                .context(source_system, hint)?
            {
                debug!(device_id = %existing.id, "Matched device by IP address");
                return Ok((existing, false));
            }
        }

        let now = self.clock.unix_timestamp();
        let mut created = Device::new(improved_name.unwrap_or_else(|| device.name.clone()), now);
        created.owner_id = owner.map(|owner| owner.id.clone());
        created.ip_address = device.ip_address.clone();
        created.mac_address = device.mac_address.clone();
        created.vlan = device.vlan.clone();
        created.os_version = device.os_version.clone();
        created.status = device.status;
        created.compliant = device.compliant;

        self.store
            .insert_device(&created)
            .await
            .context(source_system, hint)?;

        info!(device_id = %created.id, name = %created.name, source = source_system, "Created device");
        self.emit(CorrelationEvent::DeviceCreated {
            device_id: created.id.clone(),
            source_system: source_system.to_string(),
        });

        Ok((created, true))
    }

    /// Merge a device record into `device` in place and return the number of
    /// fields that changed.
    ///
    /// - Security sources overwrite compliance and connectivity
    /// - Network sources overwrite IP and VLAN when they have a value
    /// - Any source refreshes the check-in time and a non-empty OS version
    /// - An unowned device takes `owner`; an owned device keeps its owner
    ///
    /// When the device ends up owned by `owner`, the name improvement is
    /// re-applied.
    pub fn apply_device_update_rules(
        &self,
        device: &mut Device,
        normalized: &NormalizedDevice,
        owner: Option<&CanonicalIdentity>,
        source_system: &str,
    ) -> u32 {
        let category = self.classify_source(source_system);
        let mut changes = 0;

        if category == SourceCategory::Security {
            if device.compliant != normalized.compliant {
                device.compliant = normalized.compliant;
                changes += 1;
            }
            if device.status != normalized.status {
                device.status = normalized.status;
                changes += 1;
            }
        }

        if category == SourceCategory::Network {
            if let Some(ip) = &normalized.ip_address {
                if device.ip_address.as_ref() != Some(ip) {
                    device.ip_address = Some(ip.clone());
                    changes += 1;
                }
            }
            if let Some(vlan) = &normalized.vlan {
                if device.vlan.as_ref() != Some(vlan) {
                    device.vlan = Some(vlan.clone());
                    changes += 1;
                }
            }
        }

        if device.mac_address.is_none() {
            device.mac_address = normalized.mac_address.clone();
        }
        if let Some(os_version) = &normalized.os_version {
            device.os_version = Some(os_version.clone());
        }

        if let Some(owner) = owner {
            if device.owner_id.is_none() {
                info!(device_id = %device.id, identity_id = %owner.id, "Assigning inferred owner");
                device.owner_id = Some(owner.id.clone());
                changes += 1;
            }

            if device.owner_id.as_deref() == Some(owner.id.as_str()) {
                let improved = improve_device_name(&device.name, &owner.full_name);
                if improved != device.name {
                    info!(from = %device.name, to = %improved, "Improving device name");
                    device.name = improved;
                    changes += 1;
                }
            }
        }

        let now = self.clock.unix_timestamp();
        device.last_check_in = Some(now);
        device.last_seen = Some(now);
        device.updated_at = now;

        changes
    }

    // =========================================================================
    // Orphans
    // =========================================================================

    /// Read-only sweep for resources nobody is accountable for.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationError::Store`] when a query fails.
    #[instrument(skip(self))]
    pub async fn detect_orphaned_resources(&self) -> Result<OrphanReport> {
        const SOURCE: &str = "directory";

        let report = OrphanReport {
            devices_without_owner: self
                .store
                .list_unowned_devices()
                .await
                .context(SOURCE, "unowned devices")?,
            accounts_without_identity: self
                .store
                .list_unlinked_accounts()
                .await
                .context(SOURCE, "unlinked accounts")?,
            disabled_identities_with_resources: self
                .store
                .list_disabled_identities_with_resources()
                .await
                .context(SOURCE, "disabled identities")?,
        };

        info!(
            devices = report.devices_without_owner.len(),
            accounts = report.accounts_without_identity.len(),
            identities = report.disabled_identities_with_resources.len(),
            "Orphan sweep complete"
        );
        Ok(report)
    }
}
