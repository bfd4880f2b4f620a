//! Authorization layer over a storage operator.
//!
//! An [`AuthOperator`] is bound to one acting device. Every call re-reads the
//! device and its account (through the caches when the wrapped operator is a
//! [`CachedOperator`](crate::operator::CachedOperator)), resolves the
//! caller's relation to the target, applies the field policy, forwards to the
//! wrapped operator, and logs mutations to the acting account's log stream.
//!
//! Failures to look up a target are reported as access denied, so callers
//! cannot learn whether entities they may not see exist.

mod accounts;
mod data;
mod devices;
mod streams;

use std::sync::Arc;

use sensordb_proto::path::device_path;
use sensordb_proto::FieldValue;

use crate::audit::{AuditJournal, AuditLog, AuditRecord};
use crate::context::CallerContext;
use crate::error::{Error, Result};
use crate::operator::BaseOperator;
use crate::policy::{Policy, RoleKind};

/// Enforces the access policy for one acting device.
pub struct AuthOperator<O: BaseOperator> {
    db: Arc<O>,
    policy: Arc<Policy>,
    journal: Arc<AuditJournal>,
    device_id: i64,
    device_path: String,
    log: AuditLog,
}

impl<O: BaseOperator> AuthOperator<O> {
    /// Bind to a device by id.
    ///
    /// Resolves the device's path and its account's log stream, creating the
    /// stream if needed. Fails if either cannot be resolved.
    pub fn new(
        db: Arc<O>,
        policy: Arc<Policy>,
        journal: Arc<AuditJournal>,
        device_id: i64,
    ) -> Result<Self> {
        let device = db.read_device_by_id(device_id)?;
        let user = db.read_user_by_id(device.user_id)?;
        let log = AuditLog::resolve(db.as_ref(), &user)?;
        let device_path = device_path(&user.name, &device.name);
        tracing::debug!(
            device = %device_path,
            log_stream = log.stream_id,
            "bound authorization operator"
        );

        Ok(Self {
            db,
            policy,
            journal,
            device_id,
            device_path,
            log,
        })
    }

    /// Bind to a device by `user/device` path.
    pub fn for_path(
        db: Arc<O>,
        policy: Arc<Policy>,
        journal: Arc<AuditJournal>,
        path: &str,
    ) -> Result<Self> {
        let device = db.read_device(path)?;
        Self::new(db, policy, journal, device.device_id)
    }

    /// Path of the acting device.
    pub fn name(&self) -> &str {
        &self.device_path
    }

    pub fn device_id(&self) -> i64 {
        self.device_id
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Id of the acting account's log stream.
    pub fn log_stream_id(&self) -> i64 {
        self.log.stream_id
    }

    /// The acting device and its account. A disabled device may do nothing.
    pub fn caller(&self) -> Result<CallerContext> {
        let device = self.db.read_device_by_id(self.device_id).map_err(denied)?;
        if !device.enabled {
            tracing::debug!(device = %self.device_path, "request from disabled device");
            return Err(Error::AccessDenied);
        }
        let user = self.db.read_user_by_id(device.user_id).map_err(denied)?;
        Ok(CallerContext::new(user, device))
    }

    /// Run a mutation and log it, holding the account's sequencing lock so
    /// log order matches completion order.
    fn mutate<T>(&self, record: AuditRecord, op: impl FnOnce() -> Result<T>) -> Result<T> {
        self.journal.sequenced(self.log.account_id, || {
            let out = op()?;
            self.journal
                .append(self.db.as_ref(), &self.log, &self.device_path, &record);
            Ok(out)
        })
    }

    /// Count queries are for administrators or levels granting `can_count`.
    fn require_count(&self, caller: &CallerContext) -> Result<()> {
        if caller.is_root() || caller.global_access_levels(&self.policy)?.can_count() {
            Ok(())
        } else {
            Err(Error::AccessDenied)
        }
    }

    /// A role named in an update must exist.
    fn require_role(&self, kind: RoleKind, value: &FieldValue) -> Result<()> {
        match value.as_str() {
            Some(role) if self.policy.has_role(kind, role) => Ok(()),
            _ => Err(Error::InvalidRequest(format!(
                "unknown {} role '{}'",
                kind.as_str(),
                value
            ))),
        }
    }
}

/// Collapse a lookup failure into a uniform denial.
fn denied(err: Error) -> Error {
    if err.is_fatal() {
        return err;
    }
    tracing::debug!(error = %err, "lookup failed, denying");
    Error::AccessDenied
}

/// Keep the items `visible` lets through. Denials drop the item; fatal
/// errors abort the listing.
fn collect_visible<T>(items: Vec<T>, mut visible: impl FnMut(T) -> Result<T>) -> Result<Vec<T>> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match visible(item) {
            Ok(item) => out.push(item),
            Err(err) if err.is_fatal() => return Err(err),
            Err(_) => {}
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::MemoryOperator;
    use sensordb_proto::NewUser;

    #[test]
    fn test_denied_keeps_fatal_errors() {
        assert!(denied(Error::NotFound("user 1".into())).is_access_denied());
        assert!(matches!(
            denied(Error::ConfigCorruption("missing key".into())),
            Error::ConfigCorruption(_)
        ));
    }

    #[test]
    fn test_collect_visible_skips_denials() {
        let kept = collect_visible(vec![1, 2, 3, 4], |n| {
            if n % 2 == 0 {
                Ok(n)
            } else {
                Err(Error::AccessDenied)
            }
        })
        .unwrap();
        assert_eq!(kept, vec![2, 4]);

        let err = collect_visible(vec![1], |_| -> Result<i32> {
            Err(Error::ConfigCorruption("missing key".into()))
        })
        .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_binding_creates_log_stream() {
        let db = Arc::new(MemoryOperator::new());
        db.create_user(&NewUser::new("alice", "alice@example.com", "pw", "user"))
            .unwrap();
        let op = AuthOperator::for_path(
            db.clone(),
            Arc::new(Policy::default()),
            Arc::new(AuditJournal::default()),
            "alice/user",
        )
        .unwrap();

        assert_eq!(op.name(), "alice/user");
        let log = db.read_stream("alice/user/log").unwrap();
        assert_eq!(op.log_stream_id(), log.stream_id);
        assert!(matches!(
            AuthOperator::for_path(
                db,
                Arc::new(Policy::default()),
                Arc::new(AuditJournal::default()),
                "alice/ghost",
            ),
            Err(Error::NotFound(_))
        ));
    }
}
