//! Integration tests for the authorization layer over the cached operator.

use std::sync::Arc;

use sensordb_core::proto::{Datapoint, FieldValue, NewUser, Updates};
use sensordb_core::{
    AccessLevel, AuditCommand, AuditJournal, AuditRecord, AuthOperator, BaseOperator,
    CacheConfig, CachedOperator, Error, MemoryBus, MemoryOperator, Policy, Role, RwAccess,
};
use serde_json::json;

type Db = CachedOperator<MemoryOperator>;

struct TestContext {
    db: Arc<Db>,
    policy: Arc<Policy>,
    journal: Arc<AuditJournal>,
    bus: Arc<MemoryBus>,
}

impl TestContext {
    fn new() -> Self {
        Self::with_policy(Policy::default())
    }

    fn with_policy(policy: Policy) -> Self {
        let bus = Arc::new(MemoryBus::new());
        Self {
            db: Arc::new(
                CachedOperator::new(MemoryOperator::new(), &CacheConfig::default()).unwrap(),
            ),
            policy: Arc::new(policy),
            journal: Arc::new(AuditJournal::new(bus.clone())),
            bus,
        }
    }

    /// Create an account directly in storage, bypassing the policy.
    fn add_user(&self, name: &str, role: &str, public: bool) {
        self.db
            .create_user(
                &NewUser::new(name, format!("{}@example.com", name), "pw", role).public(public),
            )
            .unwrap();
    }

    /// Create an account whose primary device is a global administrator.
    fn add_admin(&self, name: &str) {
        self.add_user(name, "admin", false);
        let device = self.db.inner().read_device(&format!("{}/user", name)).unwrap();
        self.db.inner().set_device_admin(device.device_id, true).unwrap();
        self.db.purge();
    }

    fn as_device(&self, path: &str) -> AuthOperator<Db> {
        AuthOperator::for_path(
            self.db.clone(),
            self.policy.clone(),
            self.journal.clone(),
            path,
        )
        .unwrap()
    }

    fn audit_records(&self, user: &str) -> Vec<(AuditRecord, String)> {
        let log = self.db.read_stream(&format!("{}/user/log", user)).unwrap();
        let len = self.db.length_stream_by_id(log.stream_id, "").unwrap() as i64;
        self.db
            .get_stream_index_range_by_id(log.stream_id, "", 0, len)
            .unwrap()
            .iter()
            .map(|p| (AuditRecord::from_datapoint(p).unwrap(), p.sender.clone()))
            .collect()
    }
}

fn updates(pairs: &[(&str, FieldValue)]) -> Updates {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn point(t: f64, value: i64) -> Datapoint {
    Datapoint::new(t, json!(value))
}

#[test]
fn test_device_ownership() {
    let ctx = TestContext::new();
    ctx.add_user("alice", "user", false);
    ctx.add_user("bob", "user", false);
    ctx.db.create_device("alice/sensor").unwrap();
    ctx.db
        .create_stream("alice/sensor/temp", r#"{"type":"number"}"#)
        .unwrap();

    let alice = ctx.as_device("alice/user");
    let sensor = ctx.as_device("alice/sensor");
    let bob = ctx.as_device("bob/user");

    alice.create_device("alice/sensor2").unwrap();
    assert!(matches!(
        sensor.create_device("alice/sensor3"),
        Err(Error::AccessDenied)
    ));

    let devices = sensor.read_all_devices("alice").unwrap();
    let mut names: Vec<_> = devices.iter().map(|d| d.name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["sensor", "sensor2", "user"]);

    assert!(matches!(
        bob.read_stream("alice/sensor/temp"),
        Err(Error::AccessDenied)
    ));
    assert!(matches!(
        bob.read_all_devices("alice"),
        Ok(devices) if devices.is_empty()
    ));

    assert!(matches!(
        sensor.delete_device("alice/sensor2"),
        Err(Error::AccessDenied)
    ));
    assert!(ctx.db.read_device("alice/sensor2").is_ok());

    let records = ctx.audit_records("alice");
    assert_eq!(records.len(), 1);
    assert_eq!(
        records[0].0,
        AuditRecord::new(AuditCommand::CreateDevice, "alice/sensor2")
    );
    assert_eq!(records[0].1, "alice/user");
}

#[test]
fn test_missing_and_hidden_look_the_same() {
    let ctx = TestContext::new();
    ctx.add_user("alice", "user", false);
    ctx.add_user("bob", "user", false);
    let bob = ctx.as_device("bob/user");

    assert!(matches!(bob.read_user("alice"), Err(Error::AccessDenied)));
    assert!(matches!(bob.read_user("nobody-here"), Err(Error::AccessDenied)));
    assert!(matches!(bob.read_device("alice/ghost"), Err(Error::AccessDenied)));
}

#[test]
fn test_public_account_masking() {
    let ctx = TestContext::new();
    ctx.add_user("alice", "user", true);
    ctx.add_user("bob", "user", false);

    let seen = ctx.as_device("bob/user").read_user("alice").unwrap();
    assert_eq!(seen.name, "alice");
    assert_eq!(seen.email, "");
    assert_eq!(seen.password, "");

    let own = ctx.as_device("alice/user").read_user("alice").unwrap();
    assert_eq!(own.email, "alice@example.com");
    assert_eq!(own.password, "");

    let fields = ctx.as_device("bob/user").read_user_fields("alice").unwrap();
    assert!(fields.contains_key("name"));
    assert!(!fields.contains_key("email"));
}

#[test]
fn test_guest_role_from_policy_file() {
    let mut policy = Policy::default();
    policy.rw_access.insert(
        "guestread".to_string(),
        RwAccess::full().deny(&["user_email", "user_password"]),
    );
    policy.access_levels.insert(
        "guest".to_string(),
        AccessLevel::with_masks("guestread", "none"),
    );
    policy
        .user_roles
        .insert("guest".to_string(), Role::uniform("guest"));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("policy.json");
    policy.save(&path).unwrap();
    let loaded = Policy::load(&path).unwrap();

    let ctx = TestContext::with_policy(loaded);
    ctx.add_user("alice", "user", true);
    ctx.add_user("guest1", "guest", false);

    let seen = ctx.as_device("guest1/user").read_user("alice").unwrap();
    assert_eq!(seen.name, "alice");
    assert_eq!(seen.email, "");

    let err = ctx
        .as_device("guest1/user")
        .update_user("guest1", &updates(&[("nickname", "g".into())]))
        .unwrap_err();
    assert!(matches!(err, Error::AccessDenied | Error::FieldNotWritable(_)));
}

#[test]
fn test_field_update_rules() {
    let ctx = TestContext::new();
    ctx.add_user("alice", "user", false);
    let alice = ctx.as_device("alice/user");

    alice
        .update_user("alice", &updates(&[("nickname", "Al".into())]))
        .unwrap();
    assert_eq!(ctx.db.read_user("alice").unwrap().nickname, "Al");

    assert!(matches!(
        alice.update_user("alice", &updates(&[("role", "admin".into())])),
        Err(Error::FieldNotWritable(_))
    ));
    assert!(matches!(
        alice.update_user("alice", &updates(&[("color", "red".into())])),
        Err(Error::UnrecognizedField(_))
    ));
    assert!(matches!(
        alice.update_user(
            "alice",
            &updates(&[("nickname", "Ally".into()), ("name", "ally".into())])
        ),
        Err(Error::FieldNotWritable(_))
    ));
    assert_eq!(ctx.db.read_user("alice").unwrap().nickname, "Al");
}

#[test]
fn test_role_changes_are_validated() {
    let ctx = TestContext::new();
    ctx.add_admin("overseer");
    ctx.add_user("alice", "user", false);
    ctx.db.create_device("alice/sensor").unwrap();
    let admin = ctx.as_device("overseer/user");

    assert!(matches!(
        admin.update_device("alice/sensor", &updates(&[("role", "wizard".into())])),
        Err(Error::InvalidRequest(_))
    ));
    admin
        .update_device("alice/sensor", &updates(&[("role", "reader".into())]))
        .unwrap();
    assert_eq!(ctx.db.read_device("alice/sensor").unwrap().role, "reader");

    assert!(matches!(
        admin.update_user("alice", &updates(&[("role", "wizard".into())])),
        Err(Error::InvalidRequest(_))
    ));
}

#[test]
fn test_disabled_device_is_denied() {
    let ctx = TestContext::new();
    ctx.add_user("alice", "user", false);
    ctx.db.create_device("alice/sensor").unwrap();
    let alice = ctx.as_device("alice/user");
    let sensor = ctx.as_device("alice/sensor");

    assert!(sensor.read_user("alice").is_ok());
    alice
        .update_device("alice/sensor", &updates(&[("enabled", false.into())]))
        .unwrap();
    assert!(matches!(sensor.read_user("alice"), Err(Error::AccessDenied)));

    alice
        .update_device("alice/sensor", &updates(&[("enabled", true.into())]))
        .unwrap();
    assert!(sensor.read_user("alice").is_ok());
}

#[test]
fn test_primary_device_is_protected() {
    let ctx = TestContext::new();
    ctx.add_user("alice", "user", false);
    let alice = ctx.as_device("alice/user");

    assert!(matches!(
        alice.update_device("alice/user", &updates(&[("enabled", false.into())])),
        Err(Error::InvalidRequest(_))
    ));
    assert!(matches!(
        alice.delete_device("alice/user"),
        Err(Error::InvalidRequest(_))
    ));
    assert!(ctx.db.read_device("alice/user").unwrap().enabled);
}

#[test]
fn test_create_user_policy() {
    let mut policy = Policy::default();
    policy.max_users = 3;
    policy.allowed_email_suffixes = vec!["@example.com".to_string()];
    let ctx = TestContext::with_policy(policy);
    ctx.add_admin("overseer");
    ctx.add_user("alice", "user", false);
    let admin = ctx.as_device("overseer/user");
    let alice = ctx.as_device("alice/user");

    assert!(matches!(
        alice.create_user(&NewUser::new("mallory", "m@example.com", "pw", "user")),
        Err(Error::AccessDenied)
    ));
    assert!(matches!(
        admin.create_user(&NewUser::new("Admin", "a@example.com", "pw", "user")),
        Err(Error::InvalidRequest(_))
    ));
    assert!(matches!(
        admin.create_user(&NewUser::new("carol", "carol@elsewhere.org", "pw", "user")),
        Err(Error::InvalidRequest(_))
    ));
    assert!(matches!(
        admin.create_user(&NewUser::new("carol", "carol@example.com", "pw", "wizard")),
        Err(Error::InvalidRequest(_))
    ));

    admin
        .create_user(&NewUser::new("carol", "carol@example.com", "pw", "user"))
        .unwrap();
    assert!(ctx.db.read_device("carol/user").is_ok());
    assert!(matches!(
        admin.create_user(&NewUser::new("dave", "dave@example.com", "pw", "user")),
        Err(Error::InvalidRequest(_))
    ));

    let records = ctx.audit_records("overseer");
    assert_eq!(
        records.last().map(|r| &r.0),
        Some(&AuditRecord::new(AuditCommand::CreateUser, "carol"))
    );
}

#[test]
fn test_counting_and_listing() {
    let ctx = TestContext::new();
    ctx.add_admin("overseer");
    ctx.add_user("alice", "user", false);
    ctx.add_user("bob", "user", true);
    let admin = ctx.as_device("overseer/user");
    let alice = ctx.as_device("alice/user");

    assert_eq!(admin.count_users().unwrap(), 3);
    assert_eq!(admin.count_devices().unwrap(), 3);
    assert!(admin.count_streams().unwrap() >= 2);
    assert!(matches!(alice.count_users(), Err(Error::AccessDenied)));

    assert_eq!(admin.read_all_users().unwrap().len(), 3);
    let listed = alice.read_all_users().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "alice");
}

#[test]
fn test_data_io_and_sender_stamping() {
    let ctx = TestContext::new();
    ctx.add_user("alice", "user", false);
    ctx.add_user("bob", "user", false);
    ctx.db.create_device("alice/sensor").unwrap();
    ctx.db
        .create_stream("alice/sensor/temp", r#"{"type":"number"}"#)
        .unwrap();
    let stream_id = ctx.db.read_stream("alice/sensor/temp").unwrap().stream_id;

    let sensor = ctx.as_device("alice/sensor");
    let alice = ctx.as_device("alice/user");
    let bob = ctx.as_device("bob/user");

    sensor
        .insert_stream_by_id(
            stream_id,
            "",
            vec![point(1.0, 20).with_sender("spoofed"), point(2.0, 21)],
            false,
        )
        .unwrap();
    alice
        .insert_stream("alice/sensor/temp", vec![point(3.0, 22)], false)
        .unwrap();

    let points = alice.get_stream_index_range_by_id(stream_id, "", 0, 10).unwrap();
    assert_eq!(points.len(), 3);
    assert_eq!(points[0].sender, "");
    assert_eq!(points[2].sender, "alice/user");

    assert_eq!(sensor.length_stream_by_id(stream_id, "").unwrap(), 3);
    assert_eq!(sensor.time_to_index_stream_by_id(stream_id, "", 1.5).unwrap(), 1);
    let window = sensor
        .get_stream_time_range_by_id(stream_id, "", 1.0, 3.0, 0)
        .unwrap();
    assert_eq!(window.len(), 2);

    assert!(matches!(
        bob.insert_stream_by_id(stream_id, "", vec![point(4.0, 1)], false),
        Err(Error::AccessDenied)
    ));
    assert!(matches!(
        bob.length_stream_by_id(stream_id, ""),
        Err(Error::AccessDenied)
    ));
}

#[test]
fn test_downlink_writes_from_other_accounts() {
    let ctx = TestContext::new();
    ctx.add_user("alice", "user", false);
    ctx.add_user("bob", "user", false);
    ctx.db.create_device("alice/lamp").unwrap();
    ctx.db.create_device("bob/sensor").unwrap();
    ctx.db
        .create_stream("alice/lamp/power", r#"{"type":"boolean"}"#)
        .unwrap();
    let stream = ctx.db.read_stream("alice/lamp/power").unwrap();

    assert!(matches!(
        ctx.as_device("bob/user")
            .insert_stream_by_id(stream.stream_id, "", vec![point(1.0, 1)], false),
        Err(Error::AccessDenied)
    ));

    ctx.db
        .update_stream_by_id(stream.stream_id, &updates(&[("downlink", true.into())]))
        .unwrap();

    ctx.as_device("bob/user")
        .insert_stream_by_id(stream.stream_id, "", vec![point(1.0, 1)], false)
        .unwrap();
    assert!(matches!(
        ctx.as_device("bob/sensor")
            .insert_stream_by_id(stream.stream_id, "", vec![point(2.0, 0)], false),
        Err(Error::AccessDenied)
    ));

    let alice = ctx.as_device("alice/user");
    assert_eq!(alice.length_stream_by_id(stream.stream_id, "").unwrap(), 0);
    let requested = alice
        .get_stream_index_range_by_id(stream.stream_id, "downlink", 0, 10)
        .unwrap();
    assert_eq!(requested.len(), 1);
    assert_eq!(requested[0].sender, "bob/user");
}

#[test]
fn test_subscriptions() {
    let ctx = TestContext::new();
    ctx.add_user("alice", "user", false);
    ctx.add_user("bob", "user", false);
    ctx.db.create_device("alice/sensor").unwrap();
    ctx.db
        .create_stream("alice/sensor/temp", r#"{"type":"number"}"#)
        .unwrap();

    let alice = ctx.as_device("alice/user");
    let sensor = ctx.as_device("alice/sensor");
    let bob = ctx.as_device("bob/user");

    assert!(matches!(bob.subscribe("alice"), Err(Error::AccessDenied)));
    assert!(matches!(
        bob.subscribe("alice/sensor/temp"),
        Err(Error::AccessDenied)
    ));
    assert!(matches!(bob.subscribe("a/b/c/d/e"), Err(Error::Proto(_))));

    let data = alice.subscribe("alice/sensor/temp").unwrap();
    let account = alice.subscribe("alice").unwrap();

    sensor
        .insert_stream("alice/sensor/temp", vec![point(1.0, 20)], false)
        .unwrap();
    alice.create_device("alice/sensor2").unwrap();

    let messages = ctx.bus.drain(data);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].address, "alice/sensor/temp");
    assert_eq!(ctx.bus.drain(account).len(), 2);

    alice.unsubscribe(data).unwrap();
    assert!(matches!(alice.unsubscribe(data), Err(Error::Bus(_))));
}

#[test]
fn test_deleting_an_account() {
    let ctx = TestContext::new();
    ctx.add_admin("overseer");
    ctx.add_user("alice", "user", false);
    ctx.db.create_device("alice/sensor").unwrap();
    assert!(ctx.db.read_device("alice/sensor").is_ok());

    assert!(matches!(
        ctx.as_device("alice/sensor").delete_user("alice"),
        Err(Error::AccessDenied)
    ));
    ctx.as_device("overseer/user").delete_user("alice").unwrap();

    assert!(matches!(ctx.db.read_user("alice"), Err(Error::NotFound(_))));
    assert!(matches!(
        ctx.db.read_device("alice/sensor"),
        Err(Error::NotFound(_))
    ));
    let records = ctx.audit_records("overseer");
    assert_eq!(
        records.last().map(|r| &r.0),
        Some(&AuditRecord::new(AuditCommand::DeleteUser, "alice"))
    );
}

#[test]
fn test_read_only_device_cannot_insert() {
    let ctx = TestContext::new();
    ctx.add_user("alice", "user", false);
    ctx.db.create_device("alice/sensor").unwrap();
    ctx.db
        .create_stream("alice/sensor/temp", r#"{"type":"number"}"#)
        .unwrap();
    let stream_id = ctx.db.read_stream("alice/sensor/temp").unwrap().stream_id;
    let sensor = ctx.as_device("alice/sensor");

    sensor
        .insert_stream("alice/sensor/temp", vec![point(1.0, 20)], false)
        .unwrap();

    let device = ctx.db.read_device("alice/sensor").unwrap();
    ctx.db
        .update_device_by_id(device.device_id, &updates(&[("role", "reader".into())]))
        .unwrap();

    assert!(matches!(
        sensor.insert_stream("alice/sensor/temp", vec![point(2.0, 21)], false),
        Err(Error::AccessDenied)
    ));
    assert_eq!(ctx.db.length_stream_by_id(stream_id, "").unwrap(), 1);
    assert_eq!(sensor.length_stream_by_id(stream_id, "").unwrap(), 1);
}

#[test]
fn test_public_account_subscription_hides_private_streams() {
    let ctx = TestContext::new();
    ctx.add_user("alice", "user", true);
    ctx.add_user("bob", "user", false);
    ctx.db.create_device("alice/sensor").unwrap();
    ctx.db
        .create_stream("alice/sensor/temp", r#"{"type":"number"}"#)
        .unwrap();

    let alice = ctx.as_device("alice/user");
    let sensor = ctx.as_device("alice/sensor");
    let bob = ctx.as_device("bob/user");

    assert!(matches!(
        bob.read_stream("alice/sensor/temp"),
        Err(Error::AccessDenied)
    ));
    let outsider = bob.subscribe("alice").unwrap();
    let owner = alice.subscribe("alice").unwrap();

    sensor
        .insert_stream("alice/sensor/temp", vec![point(1.0, 42)], false)
        .unwrap();
    alice.create_device("alice/sensor2").unwrap();

    assert!(ctx.bus.drain(outsider).is_empty());
    let addresses: Vec<_> = ctx
        .bus
        .drain(owner)
        .into_iter()
        .map(|m| m.address)
        .collect();
    assert_eq!(addresses, vec!["alice/sensor/temp", "alice/user/log"]);
}

#[test]
fn test_concurrent_mutations_are_logged_in_order() {
    let ctx = TestContext::new();
    ctx.add_user("alice", "user", false);
    let operators: Vec<_> = (0..4).map(|_| ctx.as_device("alice/user")).collect();

    std::thread::scope(|scope| {
        for (worker, op) in operators.iter().enumerate() {
            scope.spawn(move || {
                for n in 0..10 {
                    op.create_device(&format!("alice/dev{}n{}", worker, n))
                        .unwrap();
                }
            });
        }
    });

    let records = ctx.audit_records("alice");
    assert_eq!(records.len(), 40);
    let ids: Vec<i64> = records
        .iter()
        .map(|(record, _)| {
            assert_eq!(record.cmd, "CreateDevice");
            ctx.db.read_device(&record.arg).unwrap().device_id
        })
        .collect();
    assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
}
