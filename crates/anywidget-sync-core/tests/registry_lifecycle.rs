use anywidget_sync_core::model::{Model, ModelChannel, SharedChannel, SharedModel};
use anywidget_sync_core::registry::{ModelRegistry, RegistryError, DEFAULT_MODEL_WAIT_TIMEOUT};
use anywidget_sync_core::value::StateMap;
use anywidget_sync_core::wire::OutboundMessage;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;
use std::time::{Duration, Instant};

struct NullChannel;

impl ModelChannel for NullChannel {
    fn send_patch(&mut self, _model_id: &str, _message: OutboundMessage) {}
    fn send_custom(&mut self, _model_id: &str, _message: OutboundMessage) {}
}

fn shared_model(id: &str) -> SharedModel {
    let channel: SharedChannel = Rc::new(RefCell::new(NullChannel));
    Model::new(id, StateMap::new(), channel, &BTreeSet::new()).into_shared()
}

fn record_into(
    log: &Rc<RefCell<Vec<Result<String, RegistryError>>>>,
    tag: &str,
) -> impl FnOnce(Result<SharedModel, RegistryError>) + 'static {
    let log = log.clone();
    let tag = tag.to_string();
    move |resolved| {
        log.borrow_mut()
            .push(resolved.map(|model| format!("{tag}:{}", model.borrow().id())));
    }
}

#[test]
fn get_after_set_resolves_immediately() {
    let mut registry = ModelRegistry::new();
    let now = Instant::now();
    registry.set("m1", shared_model("m1"));

    let log = Rc::new(RefCell::new(Vec::new()));
    registry.get("m1", now, record_into(&log, "w"));
    assert_eq!(&*log.borrow(), &[Ok("w:m1".to_string())]);
}

#[test]
fn get_before_set_parks_and_wakes_in_arrival_order() {
    let mut registry = ModelRegistry::new();
    let now = Instant::now();
    let log = Rc::new(RefCell::new(Vec::new()));
    registry.get("m1", now, record_into(&log, "first"));
    registry.get("m1", now, record_into(&log, "second"));
    assert!(log.borrow().is_empty(), "nothing resolves before set");
    assert!(registry.contains("m1"), "pending entry counts as present");
    assert!(registry.try_get("m1").is_none());

    registry.set("m1", shared_model("m1"));
    assert_eq!(
        &*log.borrow(),
        &[Ok("first:m1".to_string()), Ok("second:m1".to_string())]
    );
    assert!(registry.try_get("m1").is_some());
}

#[test]
fn sweep_expires_overdue_waits_with_not_found() {
    let mut registry = ModelRegistry::new();
    let start = Instant::now();
    let log = Rc::new(RefCell::new(Vec::new()));
    registry.get("m1", start, record_into(&log, "w"));

    assert_eq!(registry.sweep(start + Duration::from_secs(9)), 0);
    assert!(log.borrow().is_empty());

    assert_eq!(registry.sweep(start + DEFAULT_MODEL_WAIT_TIMEOUT), 1);
    assert_eq!(
        &*log.borrow(),
        &[Err(RegistryError::NotFound("m1".to_string()))]
    );
    assert!(!registry.contains("m1"), "expired entry is removed");
}

#[test]
fn joining_an_existing_wait_does_not_extend_its_deadline() {
    let mut registry = ModelRegistry::new();
    let start = Instant::now();
    let log = Rc::new(RefCell::new(Vec::new()));
    registry.get("m1", start, record_into(&log, "early"));
    registry.get("m1", start + Duration::from_secs(5), record_into(&log, "late"));

    assert_eq!(registry.sweep(start + Duration::from_secs(10)), 1);
    assert_eq!(
        &*log.borrow(),
        &[
            Err(RegistryError::NotFound("m1".to_string())),
            Err(RegistryError::NotFound("m1".to_string())),
        ]
    );
}

#[test]
fn a_fresh_wait_can_start_after_expiry() {
    let mut registry = ModelRegistry::new();
    let start = Instant::now();
    let log = Rc::new(RefCell::new(Vec::new()));
    registry.get("m1", start, record_into(&log, "first"));
    registry.sweep(start + Duration::from_secs(10));

    let restart = start + Duration::from_secs(12);
    registry.get("m1", restart, record_into(&log, "retry"));
    assert_eq!(registry.sweep(restart + Duration::from_secs(9)), 0);
    registry.set("m1", shared_model("m1"));
    assert_eq!(
        &*log.borrow(),
        &[
            Err(RegistryError::NotFound("m1".to_string())),
            Ok("retry:m1".to_string()),
        ]
    );
}

#[test]
fn delete_fails_pending_waiters_immediately() {
    let mut registry = ModelRegistry::new();
    let now = Instant::now();
    let log = Rc::new(RefCell::new(Vec::new()));
    registry.get("m1", now, record_into(&log, "w"));
    registry.delete("m1");
    assert_eq!(
        &*log.borrow(),
        &[Err(RegistryError::NotFound("m1".to_string()))]
    );
    assert!(!registry.contains("m1"));
}

#[test]
fn delete_removes_a_resolved_model() {
    let mut registry = ModelRegistry::new();
    let now = Instant::now();
    registry.set("m1", shared_model("m1"));
    registry.delete("m1");
    assert!(registry.try_get("m1").is_none());

    // a later get starts a fresh wait instead of resurrecting the old model
    let log = Rc::new(RefCell::new(Vec::new()));
    registry.get("m1", now, record_into(&log, "w"));
    assert!(log.borrow().is_empty());
}

#[test]
fn custom_timeout_is_honored() {
    let mut registry = ModelRegistry::with_timeout(Duration::from_millis(50));
    let start = Instant::now();
    let log = Rc::new(RefCell::new(Vec::new()));
    registry.get("m1", start, record_into(&log, "w"));
    assert_eq!(registry.sweep(start + Duration::from_millis(49)), 0);
    assert_eq!(registry.sweep(start + Duration::from_millis(50)), 1);
}

#[test]
fn replacing_a_live_model_keeps_the_newer_one() {
    let mut registry = ModelRegistry::new();
    let first = shared_model("m1");
    registry.set("m1", first.clone());
    let second = shared_model("m1");
    registry.set("m1", second.clone());
    let resolved = registry.try_get("m1").expect("model must be present");
    assert!(Rc::ptr_eq(&resolved, &second));
    assert!(!Rc::ptr_eq(&resolved, &first));
    assert_eq!(registry.len(), 1);
}
