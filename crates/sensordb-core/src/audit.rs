//! Audit trail of mutations.
//!
//! Every successful create, update or delete made through the authorization
//! layer appends one `{cmd, arg}` datapoint to the acting account's log
//! stream (`<account>/user/log`), with the acting device's path as sender.
//! Records for one account are appended in the order the mutations
//! completed. Appending is best effort: a failure is logged and never fails
//! the mutation.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;

use sensordb_proto::path::log_stream_path;
use sensordb_proto::{Datapoint, User};

use crate::bus::{MessageBus, NullBus};
use crate::error::{Error, Result};
use crate::operator::BaseOperator;

/// Schema of the log stream.
pub const LOG_SCHEMA: &str = r#"{"type":"object","properties":{"cmd":{"type":"string"},"arg":{"type":"string"}},"required":["cmd","arg"]}"#;

/// Mutation kinds recorded in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditCommand {
    CreateUser,
    UpdateUser,
    DeleteUser,
    CreateDevice,
    UpdateDevice,
    DeleteDevice,
    CreateStream,
    UpdateStream,
    DeleteStream,
}

impl AuditCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditCommand::CreateUser => "CreateUser",
            AuditCommand::UpdateUser => "UpdateUser",
            AuditCommand::DeleteUser => "DeleteUser",
            AuditCommand::CreateDevice => "CreateDevice",
            AuditCommand::UpdateDevice => "UpdateDevice",
            AuditCommand::DeleteDevice => "DeleteDevice",
            AuditCommand::CreateStream => "CreateStream",
            AuditCommand::UpdateStream => "UpdateStream",
            AuditCommand::DeleteStream => "DeleteStream",
        }
    }
}

impl fmt::Display for AuditCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub cmd: String,
    /// Name or path of the entity the command acted on.
    pub arg: String,
}

impl AuditRecord {
    pub fn new(cmd: AuditCommand, arg: impl Into<String>) -> Self {
        Self {
            cmd: cmd.to_string(),
            arg: arg.into(),
        }
    }

    pub fn to_datapoint(&self, sender: &str) -> Datapoint {
        Datapoint::now(json!({ "cmd": self.cmd, "arg": self.arg })).with_sender(sender)
    }

    pub fn from_datapoint(datapoint: &Datapoint) -> Option<Self> {
        serde_json::from_value(datapoint.data.clone()).ok()
    }
}

/// The log stream of one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditLog {
    pub account_id: i64,
    pub stream_id: i64,
    /// Bus address the records are published to.
    pub address: String,
}

impl AuditLog {
    /// Find an account's log stream, creating it when it does not exist.
    pub fn resolve<O: BaseOperator + ?Sized>(db: &O, account: &User) -> Result<Self> {
        let path = log_stream_path(&account.name);
        let stream = match db.read_stream(&path) {
            Ok(stream) => stream,
            Err(Error::NotFound(_)) => {
                tracing::debug!(path = %path, "creating account log stream");
                db.create_stream(&path, LOG_SCHEMA)?;
                db.read_stream(&path)?
            }
            Err(err) => return Err(err),
        };
        Ok(Self {
            account_id: account.user_id,
            stream_id: stream.stream_id,
            address: path,
        })
    }
}

/// Sequences and appends audit records.
///
/// Shared by every authorization operator of a process so that mutations of
/// one account, from any device, are logged in completion order.
pub struct AuditJournal {
    bus: Arc<dyn MessageBus>,
    sequences: DashMap<i64, Arc<Mutex<()>>>,
}

impl AuditJournal {
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self {
            bus,
            sequences: DashMap::new(),
        }
    }

    pub fn bus(&self) -> &Arc<dyn MessageBus> {
        &self.bus
    }

    /// Run `f` while holding the account's sequencing lock.
    pub fn sequenced<T>(&self, account_id: i64, f: impl FnOnce() -> T) -> T {
        let lock = self.sequences.entry(account_id).or_default().clone();
        let _guard = lock.lock();
        f()
    }

    /// Drop the sequencing lock of a deleted account.
    pub fn forget(&self, account_id: i64) {
        self.sequences.remove(&account_id);
    }

    /// Append a record to the log and publish it. Failures are logged only.
    pub fn append<O: BaseOperator + ?Sized>(
        &self,
        db: &O,
        log: &AuditLog,
        sender: &str,
        record: &AuditRecord,
    ) {
        let points = vec![record.to_datapoint(sender)];
        if let Err(err) = db.insert_stream_by_id(log.stream_id, "", points.clone(), true) {
            tracing::error!(
                error = %err,
                account = log.account_id,
                cmd = %record.cmd,
                arg = %record.arg,
                "failed to append audit record"
            );
            return;
        }
        tracing::info!(
            target: "sensordb::audit",
            cmd = %record.cmd,
            arg = %record.arg,
            sender,
            "mutation"
        );
        if let Err(err) = self.bus.publish(&log.address, &points) {
            tracing::warn!(error = %err, address = %log.address, "failed to publish audit record");
        }
    }
}

impl Default for AuditJournal {
    fn default() -> Self {
        Self::new(Arc::new(NullBus))
    }
}
