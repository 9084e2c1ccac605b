//! Core widget-state synchronization primitives for anywidget-sync-rs.
//!
//! Keeps a piece of state owned by a remote computation backend consistent
//! with the live view instances attached to it, over a message channel that
//! carries JSON envelopes plus out-of-band binary buffers:
//!
//! - [`wire`] converts between the flat wire triple (state, buffer paths,
//!   buffers) and in-memory state trees with inline binary views,
//! - [`model`] holds per-widget state, dirty-field tracking and change
//!   subscriptions,
//! - [`registry`] resolves model ids to models with deferred arrival and
//!   timeout,
//! - [`dispatch`] classifies inbound envelopes and routes them,
//! - [`view`] binds rendered views to models with flicker-free re-renders.
//!
//! Everything runs on a single thread; suspension exists only as parked
//! registry waiters, never as blocking.

pub mod dispatch;
pub mod model;
pub mod registry;
pub mod value;
pub mod view;
pub mod wire;

pub use dispatch::{MessageDispatcher, WidgetMessage};
pub use model::{Model, ModelChannel, SharedChannel, SharedModel};
pub use registry::{ModelRegistry, RegistryError, DEFAULT_MODEL_WAIT_TIMEOUT};
pub use value::{StateMap, StateValue};
pub use view::{RenderMode, ViewAdapter, WidgetRenderer};
pub use wire::OutboundMessage;

/// Returns the crate version at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
