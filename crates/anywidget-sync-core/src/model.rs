//! The synchronized widget model.
//!
//! A [`Model`] owns the current field values for one backend-owned widget,
//! tracks locally dirty fields that still need to be sent upstream, and fans
//! change notifications out to subscribed views. The capability surface
//! mirrors the third-party model/view contract widgets are written against:
//! `get`, `set`, `save_changes`, `send`, `on`/`off`, plus the non-standard
//! `set_direct_update_keys` extension.
//!
//! All mutation happens synchronously on a single thread; sharing between the
//! registry and views goes through [`SharedModel`].

use crate::dispatch::WidgetMessage;
use crate::value::{StateMap, StateValue};
use crate::wire::{self, OutboundMessage};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

/// Outbound seam: where patches and custom messages leave the core.
///
/// The transport that ultimately delivers these is out of scope; tests
/// substitute a recording implementation.
pub trait ModelChannel {
    /// Deliver a state patch produced by [`Model::save_changes`].
    fn send_patch(&mut self, model_id: &str, message: OutboundMessage);
    /// Deliver an out-of-band custom message produced by [`Model::send`].
    fn send_custom(&mut self, model_id: &str, message: OutboundMessage);
}

/// Shared handle to the outbound channel.
pub type SharedChannel = Rc<RefCell<dyn ModelChannel>>;

/// Shared handle to a model; the registry and each attached view hold one.
pub type SharedModel = Rc<RefCell<Model>>;

/// Handle returned by the `on_*` subscription methods; passing it to
/// [`Model::off`] removes exactly that listener.
pub type ListenerId = u64;

type FieldListener = Box<dyn FnMut(&Model, &StateValue)>;
type AnyChangeListener = Box<dyn FnMut(&Model)>;
type CustomListener = Box<dyn FnMut(&Model, &Value, &[Vec<u8>])>;

/// Monotonic lifecycle: once disposed, a model never emits again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Active,
    Disposed,
}

pub struct Model {
    id: String,
    data: StateMap,
    dirty: StateMap,
    direct_update_keys: BTreeSet<String>,
    lifecycle: Lifecycle,
    channel: SharedChannel,
    next_listener_id: ListenerId,
    field_listeners: BTreeMap<String, BTreeMap<ListenerId, FieldListener>>,
    any_listeners: BTreeMap<ListenerId, AnyChangeListener>,
    custom_listeners: BTreeMap<ListenerId, CustomListener>,
    any_change_pending: bool,
    update_notifier: Option<Box<dyn FnMut()>>,
}

impl Model {
    /// Create a model with its initial state.
    ///
    /// `initial_dirty` seeds the dirty map for fields whose local value
    /// already diverged from the backend at attach time; the first
    /// `save_changes` pushes them upstream.
    pub fn new(
        id: impl Into<String>,
        data: StateMap,
        channel: SharedChannel,
        initial_dirty: &BTreeSet<String>,
    ) -> Model {
        let dirty = initial_dirty
            .iter()
            .filter_map(|key| data.get(key).map(|v| (key.clone(), v.clone())))
            .collect();
        Model {
            id: id.into(),
            data,
            dirty,
            direct_update_keys: BTreeSet::new(),
            lifecycle: Lifecycle::Active,
            channel,
            next_listener_id: 1,
            field_listeners: BTreeMap::new(),
            any_listeners: BTreeMap::new(),
            custom_listeners: BTreeMap::new(),
            any_change_pending: false,
            update_notifier: None,
        }
    }

    /// Wrap a model for sharing between the registry and views.
    pub fn into_shared(self) -> SharedModel {
        Rc::new(RefCell::new(self))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current value of one field. No side effects.
    pub fn get(&self, key: &str) -> Option<&StateValue> {
        self.data.get(key)
    }

    pub fn state(&self) -> &StateMap {
        &self.data
    }

    pub fn is_disposed(&self) -> bool {
        self.lifecycle == Lifecycle::Disposed
    }

    /// Locally overwrite a field.
    ///
    /// Marks the field dirty even when the value is unchanged; caller intent,
    /// not diffing, drives dirtiness for local writes. Emits the per-field
    /// change event immediately and arms the debounced any-change event.
    pub fn set(&mut self, key: impl Into<String>, value: StateValue) {
        let key = key.into();
        self.data.insert(key.clone(), value.clone());
        self.dirty.insert(key.clone(), value);
        self.emit_field(&key);
        self.any_change_pending = true;
    }

    /// Send the dirty snapshot upstream as a patch, then clear it.
    ///
    /// No-op when nothing is dirty. At-most-once delivery per call; a `set`
    /// racing an in-flight send lands in the fresh dirty map.
    pub fn save_changes(&mut self) {
        if self.dirty.is_empty() {
            return;
        }
        let snapshot = std::mem::take(&mut self.dirty);
        let message = wire::encode_patch_message(&snapshot);
        self.channel.borrow_mut().send_patch(&self.id, message);
    }

    /// Send out-of-band content upstream, independent of field state.
    ///
    /// Binary views inside `content` are extracted and base64-encoded the
    /// same way state patches are.
    pub fn send(&mut self, content: &StateValue) {
        let message = wire::encode_content_message(content);
        self.channel.borrow_mut().send_custom(&self.id, message);
    }

    /// Subscribe to changes of one field (`change:<key>` in the third-party
    /// contract). The callback receives the model and the new value.
    pub fn on_change<F>(&mut self, key: impl Into<String>, callback: F) -> ListenerId
    where
        F: FnMut(&Model, &StateValue) + 'static,
    {
        let id = self.alloc_listener_id();
        self.field_listeners
            .entry(key.into())
            .or_default()
            .insert(id, Box::new(callback));
        id
    }

    /// Subscribe to the coalesced any-change event. Fired at most once per
    /// batch; subscribers re-read current values via [`Model::get`].
    pub fn on_any_change<F>(&mut self, callback: F) -> ListenerId
    where
        F: FnMut(&Model) + 'static,
    {
        let id = self.alloc_listener_id();
        self.any_listeners.insert(id, Box::new(callback));
        id
    }

    /// Subscribe to custom messages (`msg:custom` in the third-party
    /// contract). The callback receives opaque content and raw buffers.
    pub fn on_custom_message<F>(&mut self, callback: F) -> ListenerId
    where
        F: FnMut(&Model, &Value, &[Vec<u8>]) + 'static,
    {
        let id = self.alloc_listener_id();
        self.custom_listeners.insert(id, Box::new(callback));
        id
    }

    /// Remove one listener by handle. Returns `false` for unknown handles.
    pub fn off(&mut self, listener: ListenerId) -> bool {
        if self.any_listeners.remove(&listener).is_some() {
            return true;
        }
        if self.custom_listeners.remove(&listener).is_some() {
            return true;
        }
        for listeners in self.field_listeners.values_mut() {
            if listeners.remove(&listener).is_some() {
                return true;
            }
        }
        false
    }

    /// Remove every listener without disposing. The instance may be
    /// reattached to a new view later.
    pub fn off_all(&mut self) {
        self.field_listeners.clear();
        self.any_listeners.clear();
        self.custom_listeners.clear();
    }

    /// Mark the model disposed: all subsequent emission is a no-op.
    /// Idempotent; never panics.
    pub fn dispose(&mut self) {
        self.lifecycle = Lifecycle::Disposed;
        self.off_all();
        self.update_notifier = None;
    }

    /// Exempt fields from the view re-render signal. Per-field change events
    /// still fire; only the batch-level re-render notification is skipped.
    /// Callers must feature-detect this extension before relying on it.
    pub fn set_direct_update_keys<I, S>(&mut self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.direct_update_keys = keys.into_iter().map(Into::into).collect();
    }

    /// Install the view-level "please re-render" callback. Invoked at most
    /// once per inbound update batch.
    pub fn set_update_notifier(&mut self, notifier: Box<dyn FnMut()>) {
        self.update_notifier = Some(notifier);
    }

    pub fn clear_update_notifier(&mut self) {
        self.update_notifier = None;
    }

    /// Apply a remote-origin state snapshot, emitting only real diffs.
    ///
    /// Each key is deep-compared against the current value; changed fields
    /// are overwritten without being marked dirty, and their per-field events
    /// fire. If any changed field is outside the direct-update set, the
    /// re-render notifier fires exactly once for the whole batch.
    pub fn update_and_emit_diffs(&mut self, new_state: StateMap) {
        let mut render_relevant = false;
        for (key, value) in new_state {
            if self.data.get(&key) == Some(&value) {
                continue;
            }
            if !self.direct_update_keys.contains(&key) {
                render_relevant = true;
            }
            self.data.insert(key.clone(), value);
            self.emit_field(&key);
            self.any_change_pending = true;
        }
        if render_relevant {
            self.notify_update();
        }
    }

    /// Flush the debounced any-change event for the current batch.
    ///
    /// The first `set` (or applied diff) in a batch arms the flag; the host
    /// calls this at the end of the task turn, delivering one coalesced
    /// notification no matter how many fields changed.
    pub fn flush_any_change(&mut self) {
        if !self.any_change_pending {
            return;
        }
        self.any_change_pending = false;
        if self.is_disposed() {
            return;
        }
        let mut listeners = std::mem::take(&mut self.any_listeners);
        for callback in listeners.values_mut() {
            if self.is_disposed() {
                break;
            }
            if catch_unwind(AssertUnwindSafe(|| callback(self))).is_err() {
                tracing::debug!(model_id = %self.id, "any-change listener panicked");
            }
        }
        if !self.is_disposed() {
            self.any_listeners = listeners;
        }
    }

    /// Handle one inbound wire envelope addressed to this model.
    ///
    /// Malformed envelopes are logged and dropped; `echo_update` loop-backs
    /// are intentionally ignored; `close` is a registry concern and ignored
    /// here.
    pub fn receive_custom_message(&mut self, message: &Value, buffers: &[Vec<u8>]) {
        let parsed = match WidgetMessage::from_value(message) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::error!(model_id = %self.id, %err, "dropping malformed widget message");
                return;
            }
        };
        match parsed {
            WidgetMessage::Open { state, buffer_paths }
            | WidgetMessage::Update { state, buffer_paths } => {
                match wire::decode_state(&state, &buffer_paths, buffers) {
                    Ok(decoded) => {
                        self.update_and_emit_diffs(decoded);
                        self.flush_any_change();
                    }
                    Err(err) => {
                        tracing::error!(model_id = %self.id, %err, "dropping undecodable state update");
                    }
                }
            }
            WidgetMessage::Custom { content } => self.emit_custom(&content, buffers),
            WidgetMessage::EchoUpdate { .. } => {
                // loop-back acknowledgement of our own send; acting on it
                // would feed the update back into save_changes
            }
            WidgetMessage::Close => {
                tracing::debug!(model_id = %self.id, "close is handled by the registry");
            }
        }
    }

    fn alloc_listener_id(&mut self) -> ListenerId {
        let id = self.next_listener_id;
        self.next_listener_id = self.next_listener_id.saturating_add(1);
        id
    }

    fn emit_field(&mut self, key: &str) {
        if self.is_disposed() {
            return;
        }
        let Some(mut listeners) = self.field_listeners.remove(key) else {
            return;
        };
        let value = self.data.get(key).cloned().unwrap_or(StateValue::Null);
        for callback in listeners.values_mut() {
            if self.is_disposed() {
                break;
            }
            if catch_unwind(AssertUnwindSafe(|| callback(self, &value))).is_err() {
                tracing::debug!(model_id = %self.id, key, "change listener panicked");
            }
        }
        if !self.is_disposed() && !listeners.is_empty() {
            self.field_listeners.insert(key.to_string(), listeners);
        }
    }

    fn emit_custom(&mut self, content: &Value, buffers: &[Vec<u8>]) {
        if self.is_disposed() {
            return;
        }
        let mut listeners = std::mem::take(&mut self.custom_listeners);
        for callback in listeners.values_mut() {
            if self.is_disposed() {
                break;
            }
            if catch_unwind(AssertUnwindSafe(|| callback(self, content, buffers))).is_err() {
                tracing::debug!(model_id = %self.id, "custom message listener panicked");
            }
        }
        if !self.is_disposed() {
            self.custom_listeners = listeners;
        }
    }

    fn notify_update(&mut self) {
        if self.is_disposed() {
            return;
        }
        if let Some(notifier) = self.update_notifier.as_mut() {
            notifier();
        }
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("id", &self.id)
            .field("fields", &self.data.len())
            .field("dirty", &self.dirty.len())
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}
