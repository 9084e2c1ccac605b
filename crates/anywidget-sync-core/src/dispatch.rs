//! Inbound envelope classification and routing.
//!
//! One [`MessageDispatcher`] serves one logical message stream. Each inbound
//! envelope is parsed into a [`WidgetMessage`] and routed: `open` resolves
//! the registry entry with a fresh model, `update` and `custom` reach the
//! (possibly not-yet-arrived) model through the registry, `close` drops the
//! entry, and `echo_update` loop-backs are discarded. A malformed message is
//! logged and dropped; the stream never halts on one bad message.

use crate::model::{Model, SharedChannel, SharedModel};
use crate::registry::ModelRegistry;
use crate::value::StateMap;
use crate::wire;
use anywidget_sync_path::{parse_buffer_paths, BufferPath, BufferPathError};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("envelope must be an object")]
    NotAnObject,
    #[error("envelope is missing a string `method`")]
    MissingMethod,
    #[error("unknown method: {0}")]
    UnknownMethod(String),
    #[error("`{0}` envelope requires an object `state`")]
    MissingState(String),
    #[error("`echo_update` envelope requires `buffer_paths`")]
    MissingBufferPaths,
    #[error("invalid buffer paths: {0}")]
    InvalidBufferPaths(#[from] BufferPathError),
}

/// A parsed inbound wire envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetMessage {
    Open {
        state: Value,
        buffer_paths: Vec<BufferPath>,
    },
    Update {
        state: Value,
        buffer_paths: Vec<BufferPath>,
    },
    Custom {
        content: Value,
    },
    EchoUpdate {
        state: Value,
        buffer_paths: Vec<BufferPath>,
    },
    Close,
}

impl WidgetMessage {
    /// Parse an envelope; total over arbitrary JSON input.
    pub fn from_value(message: &Value) -> Result<WidgetMessage, EnvelopeError> {
        let obj = message.as_object().ok_or(EnvelopeError::NotAnObject)?;
        let method = obj
            .get("method")
            .and_then(Value::as_str)
            .ok_or(EnvelopeError::MissingMethod)?;
        match method {
            "open" | "update" => {
                let state = required_state(obj, method)?;
                let buffer_paths = optional_buffer_paths(obj)?;
                if method == "open" {
                    Ok(WidgetMessage::Open {
                        state,
                        buffer_paths,
                    })
                } else {
                    Ok(WidgetMessage::Update {
                        state,
                        buffer_paths,
                    })
                }
            }
            "custom" => Ok(WidgetMessage::Custom {
                content: obj.get("content").cloned().unwrap_or(Value::Null),
            }),
            "echo_update" => {
                let state = required_state(obj, method)?;
                let raw = obj
                    .get("buffer_paths")
                    .ok_or(EnvelopeError::MissingBufferPaths)?;
                Ok(WidgetMessage::EchoUpdate {
                    state,
                    buffer_paths: parse_buffer_paths(raw)?,
                })
            }
            "close" => Ok(WidgetMessage::Close),
            other => Err(EnvelopeError::UnknownMethod(other.to_string())),
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            WidgetMessage::Open { .. } => "open",
            WidgetMessage::Update { .. } => "update",
            WidgetMessage::Custom { .. } => "custom",
            WidgetMessage::EchoUpdate { .. } => "echo_update",
            WidgetMessage::Close => "close",
        }
    }
}

fn required_state(
    obj: &serde_json::Map<String, Value>,
    method: &str,
) -> Result<Value, EnvelopeError> {
    obj.get("state")
        .filter(|state| state.is_object())
        .cloned()
        .ok_or_else(|| EnvelopeError::MissingState(method.to_string()))
}

fn optional_buffer_paths(
    obj: &serde_json::Map<String, Value>,
) -> Result<Vec<BufferPath>, EnvelopeError> {
    match obj.get("buffer_paths") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(raw) => Ok(parse_buffer_paths(raw)?),
    }
}

/// Subscribers notified with the model id after each applied remote update.
#[derive(Default)]
pub struct UpdateObservers {
    next_id: u64,
    observers: BTreeMap<u64, Box<dyn FnMut(&str)>>,
}

pub type SharedUpdateObservers = Rc<RefCell<UpdateObservers>>;

impl UpdateObservers {
    pub fn subscribe<F>(&mut self, observer: F) -> u64
    where
        F: FnMut(&str) + 'static,
    {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        self.observers.insert(id, Box::new(observer));
        id
    }

    pub fn unsubscribe(&mut self, id: u64) -> bool {
        self.observers.remove(&id).is_some()
    }

    fn notify(&mut self, model_id: &str) {
        for observer in self.observers.values_mut() {
            observer(model_id);
        }
    }
}

/// The protocol state machine over one message stream.
pub struct MessageDispatcher {
    registry: ModelRegistry,
    channel: SharedChannel,
    observers: SharedUpdateObservers,
}

impl MessageDispatcher {
    pub fn new(registry: ModelRegistry, channel: SharedChannel) -> MessageDispatcher {
        MessageDispatcher {
            registry,
            channel,
            observers: Rc::new(RefCell::new(UpdateObservers::default())),
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ModelRegistry {
        &mut self.registry
    }

    /// Handle to the update-observer list; clones share the same list.
    pub fn observers(&self) -> SharedUpdateObservers {
        self.observers.clone()
    }

    /// Expire overdue registry waits.
    pub fn sweep(&mut self, now: Instant) -> usize {
        self.registry.sweep(now)
    }

    /// Route one inbound envelope. Never fails: schema and decode errors are
    /// logged and the message is dropped.
    pub fn dispatch(&mut self, model_id: &str, message: &Value, buffers: &[Vec<u8>], now: Instant) {
        self.registry.sweep(now);
        let parsed = match WidgetMessage::from_value(message) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::error!(model_id, %err, "dropping malformed widget message");
                return;
            }
        };
        match parsed {
            WidgetMessage::Open {
                state,
                buffer_paths,
            } => match wire::decode_state(&state, &buffer_paths, buffers) {
                Ok(decoded) => {
                    let model =
                        Model::new(model_id, decoded, self.channel.clone(), &BTreeSet::new())
                            .into_shared();
                    self.registry.set(model_id, model);
                }
                Err(err) => {
                    tracing::error!(model_id, %err, "dropping undecodable open");
                }
            },
            WidgetMessage::Update {
                state,
                buffer_paths,
            } => match wire::decode_state(&state, &buffer_paths, buffers) {
                Ok(decoded) => self.apply_update(model_id, decoded, now),
                Err(err) => {
                    tracing::error!(model_id, %err, "dropping undecodable update");
                }
            },
            WidgetMessage::Custom { .. } => {
                if let Some(model) = self.registry.try_get(model_id) {
                    model.borrow_mut().receive_custom_message(message, buffers);
                } else {
                    let message = message.clone();
                    let buffers = buffers.to_vec();
                    let id = model_id.to_string();
                    self.registry.get(model_id, now, move |resolved| match resolved {
                        Ok(model) => model.borrow_mut().receive_custom_message(&message, &buffers),
                        Err(err) => {
                            tracing::debug!(model_id = %id, %err, "custom message never found its model");
                        }
                    });
                }
            }
            WidgetMessage::Close => self.registry.delete(model_id),
            WidgetMessage::EchoUpdate { .. } => {
                tracing::trace!(model_id, "ignoring echo_update loop-back");
            }
        }
    }

    fn apply_update(&mut self, model_id: &str, state: StateMap, now: Instant) {
        if let Some(model) = self.registry.try_get(model_id) {
            apply_to(&model, state);
            self.observers.borrow_mut().notify(model_id);
            return;
        }
        // update arrived before open: park it as a waiter so it is applied
        // in arrival order once the model resolves
        let observers = self.observers.clone();
        let id = model_id.to_string();
        self.registry.get(model_id, now, move |resolved| match resolved {
            Ok(model) => {
                apply_to(&model, state);
                observers.borrow_mut().notify(&id);
            }
            Err(err) => {
                tracing::debug!(model_id = %id, %err, "update never found its model");
            }
        });
    }
}

fn apply_to(model: &SharedModel, state: StateMap) {
    let mut model = model.borrow_mut();
    model.update_and_emit_diffs(state);
    model.flush_any_change();
}

impl std::fmt::Debug for MessageDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageDispatcher")
            .field("registry", &self.registry)
            .finish()
    }
}
