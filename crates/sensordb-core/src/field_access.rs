//! Field-level access checks and masking.
//!
//! Every query is evaluated against two access levels: one from the caller's
//! account role and one from the caller's device role. A record or field is
//! visible (or writable) only when both levels' masks allow it.

use std::collections::BTreeMap;

use sensordb_proto::{Device, Entity, EntityKind, FieldValue, Updates, User};

use crate::error::{Error, Result};
use crate::policy::{AccessLevel, Policy, RoleKind, RwAccess, STREAM_DATA_KEY};

/// The account-level and device-level access levels for one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessLevels<'p> {
    pub account: &'p AccessLevel,
    pub device: &'p AccessLevel,
}

impl<'p> AccessLevels<'p> {
    /// A coarse flag holds only when both levels grant it.
    pub fn grants(&self, flag: impl Fn(&AccessLevel) -> bool) -> bool {
        flag(self.account) && flag(self.device)
    }

    pub fn can_create_user(&self) -> bool {
        self.grants(|level| level.can_create_user)
    }

    pub fn can_delete_user(&self) -> bool {
        self.grants(|level| level.can_delete_user)
    }

    pub fn can_list_users(&self) -> bool {
        self.grants(|level| level.can_list_users)
    }

    pub fn can_count(&self) -> bool {
        self.grants(|level| level.can_count)
    }
}

/// Which side of an access level a check uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
}

/// The pair of masks selected by an [`AccessLevels`] for one mode.
struct Masks<'p> {
    account: &'p RwAccess,
    device: &'p RwAccess,
}

impl<'p> Masks<'p> {
    fn select(policy: &'p Policy, levels: &AccessLevels<'_>, mode: AccessMode) -> Result<Self> {
        let (account, device) = match mode {
            AccessMode::Read => (
                policy.read_mask(levels.account)?,
                policy.read_mask(levels.device)?,
            ),
            AccessMode::Write => (
                policy.write_mask(levels.account)?,
                policy.write_mask(levels.device)?,
            ),
        };
        Ok(Self { account, device })
    }

    // Both lookups run so a missing key is reported even when the other
    // mask already denies.
    fn permits(&self, key: &str) -> Result<bool> {
        let account = self.account.permits(key)?;
        let device = self.device.permits(key)?;
        Ok(account && device)
    }

    fn gate(&self, kind: EntityKind) -> Result<()> {
        let key = kind.access_key();
        if self.permits(&key)? {
            Ok(())
        } else {
            tracing::debug!(gate = %key, "record gate closed");
            Err(Error::AccessDenied)
        }
    }
}

/// Resolve the two access levels for a caller querying a record.
///
/// `queried_account_id` is the account owning the record; the caller is its
/// owner when it belongs to the same account.
pub fn get_access_levels<'p>(
    policy: &'p Policy,
    account: &User,
    device: &Device,
    queried_account_id: i64,
    is_public: bool,
    is_self: bool,
) -> Result<AccessLevels<'p>> {
    let is_owner = account.user_id == queried_account_id;
    Ok(AccessLevels {
        account: policy.resolve_access_level(
            RoleKind::Account,
            &account.role,
            is_self,
            is_owner,
            is_public,
        )?,
        device: policy.resolve_access_level(
            RoleKind::Device,
            &device.role,
            is_self,
            is_owner,
            is_public,
        )?,
    })
}

/// Validate a partial update against the write masks.
///
/// The record gate is checked first. Then every key must be an external
/// field of `kind` and writable under both masks. Nothing is applied here;
/// a failure rejects the whole update.
pub fn check_field_update_permitted(
    policy: &Policy,
    levels: &AccessLevels<'_>,
    kind: EntityKind,
    updates: &Updates,
) -> Result<()> {
    let masks = Masks::select(policy, levels, AccessMode::Write)?;
    masks.gate(kind)?;

    for field in updates.keys() {
        if !kind.has_field(field) {
            return Err(Error::UnrecognizedField(field.clone()));
        }
        if !masks.permits(&kind.field_key(field))? {
            tracing::debug!(kind = kind.prefix(), field = %field, "field not writable");
            return Err(Error::FieldNotWritable(field.clone()));
        }
    }
    Ok(())
}

/// Reset every field the read masks hide to its zero value.
///
/// Fails with access denied when the record gate is closed. Every key is
/// looked up before anything is reset, so a corrupt mask leaves the record
/// untouched. Applying it twice gives the same record.
pub fn mask_unreadable_fields<E: Entity>(
    policy: &Policy,
    levels: &AccessLevels<'_>,
    entity: &mut E,
) -> Result<()> {
    let masks = Masks::select(policy, levels, AccessMode::Read)?;
    masks.gate(E::KIND)?;

    let mut hidden = Vec::new();
    for field in E::FIELDS {
        if !masks.permits(&E::KIND.field_key(field))? {
            hidden.push(*field);
        }
    }
    for field in hidden {
        entity.reset_field(field);
    }
    Ok(())
}

/// The readable fields of a record as a name to value map.
pub fn readable_fields<E: Entity>(
    policy: &Policy,
    levels: &AccessLevels<'_>,
    entity: &E,
) -> Result<BTreeMap<String, FieldValue>> {
    let masks = Masks::select(policy, levels, AccessMode::Read)?;
    masks.gate(E::KIND)?;

    let mut fields = BTreeMap::new();
    for field in E::FIELDS {
        if masks.permits(&E::KIND.field_key(field))? {
            if let Some(value) = entity.field(field) {
                fields.insert((*field).to_string(), value);
            }
        }
    }
    Ok(fields)
}

/// Whether both masks open the stream data gate.
pub fn can_access_stream_data(
    policy: &Policy,
    levels: &AccessLevels<'_>,
    mode: AccessMode,
) -> Result<bool> {
    Masks::select(policy, levels, mode)?.permits(STREAM_DATA_KEY)
}
