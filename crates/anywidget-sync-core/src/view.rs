//! Binding between one rendered view and its model.
//!
//! The adapter owns a renderer for the view's mounted lifetime. Data-only
//! model updates re-render in place so an already-painted view never
//! flickers; a change of the view's code identity (content hash of its
//! implementation) forces a full remount. Renderer failures are contained:
//! they are logged and the adapter stays in a safe state.

use crate::model::SharedModel;
use crate::value::StateMap;
use std::cell::Cell;
use std::collections::BTreeSet;
use std::rc::Rc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ViewError {
    #[error("render failed: {0}")]
    Render(String),
    #[error("initialize failed: {0}")]
    Initialize(String),
}

/// Whether the renderer may assume a blank surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// First paint after (re)mount; prior output has been discarded.
    Fresh,
    /// Data-only update; the renderer must update its existing output in
    /// place without clearing it first.
    InPlace,
}

/// Teardown hook a renderer may return from `render`.
pub type Cleanup = Box<dyn FnOnce()>;

/// The view side of the model/view contract.
///
/// `render` must be idempotent under [`RenderMode::InPlace`]: called again
/// with unchanged code identity it updates the painted output rather than
/// rebuilding it.
pub trait WidgetRenderer {
    fn initialize(&mut self, _model: &SharedModel) -> Result<(), ViewError> {
        Ok(())
    }

    fn render(&mut self, model: &SharedModel, mode: RenderMode)
        -> Result<Option<Cleanup>, ViewError>;
}

/// Binds one renderer to one model instance for its mounted lifetime.
pub struct ViewAdapter<R: WidgetRenderer> {
    model: SharedModel,
    renderer: R,
    code_hash: String,
    cleanup: Option<Cleanup>,
    update_pending: Rc<Cell<bool>>,
    mounted: bool,
}

impl<R: WidgetRenderer> ViewAdapter<R> {
    /// `code_hash` is the content hash of the view's implementation; it is
    /// the remount key, so a URL change with identical content does not
    /// remount.
    pub fn new(model: SharedModel, renderer: R, code_hash: impl Into<String>) -> ViewAdapter<R> {
        ViewAdapter {
            model,
            renderer,
            code_hash: code_hash.into(),
            cleanup: None,
            update_pending: Rc::new(Cell::new(false)),
            mounted: false,
        }
    }

    pub fn model(&self) -> &SharedModel {
        &self.model
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Initialize the renderer and paint the first frame.
    pub fn mount(&mut self) {
        if self.mounted {
            return;
        }
        let flag = self.update_pending.clone();
        self.model
            .borrow_mut()
            .set_update_notifier(Box::new(move || flag.set(true)));
        if let Err(err) = self.renderer.initialize(&self.model) {
            tracing::error!(%err, "widget initialize failed");
            self.detach_model();
            return;
        }
        match self.renderer.render(&self.model, RenderMode::Fresh) {
            Ok(cleanup) => self.cleanup = cleanup,
            Err(err) => {
                tracing::error!(%err, "widget render failed");
                self.cleanup = None;
            }
        }
        self.mounted = true;
    }

    /// Re-render if the model flagged a data change since the last pump.
    ///
    /// Returns `true` when a re-render happened. The previous cleanup hook
    /// only runs after the new render succeeds, so the painted output is
    /// never torn down ahead of its replacement.
    pub fn pump(&mut self) -> bool {
        if !self.mounted || !self.update_pending.replace(false) {
            return false;
        }
        match self.renderer.render(&self.model, RenderMode::InPlace) {
            Ok(next_cleanup) => {
                if let Some(previous) = self.cleanup.take() {
                    previous();
                }
                self.cleanup = next_cleanup;
                true
            }
            Err(err) => {
                tracing::error!(%err, "widget re-render failed; keeping previous output");
                false
            }
        }
    }

    /// Apply a host-supplied state snapshot (the props path), then re-render
    /// if it changed anything.
    pub fn apply_value(&mut self, value: StateMap) {
        {
            let mut model = self.model.borrow_mut();
            model.update_and_emit_diffs(value);
            model.flush_any_change();
        }
        self.pump();
    }

    /// React to a possibly-changed code identity: a different hash discards
    /// the painted output and remounts from scratch.
    pub fn update_code(&mut self, code_hash: &str) {
        if self.code_hash == code_hash {
            self.pump();
            return;
        }
        self.unmount();
        self.code_hash = code_hash.to_string();
        self.mount();
    }

    /// Tear down this view's binding. Runs the renderer's cleanup hook and
    /// detaches the re-render subscription; the model itself stays alive for
    /// sibling views.
    pub fn unmount(&mut self) {
        if !self.mounted {
            return;
        }
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
        self.detach_model();
        self.mounted = false;
    }

    fn detach_model(&mut self) {
        self.model.borrow_mut().clear_update_notifier();
        self.update_pending.set(false);
    }
}

impl<R: WidgetRenderer> Drop for ViewAdapter<R> {
    fn drop(&mut self) {
        self.unmount();
    }
}

/// Keys whose value deep-differs between `value` and `initial`.
///
/// Used to seed a model's dirty set when a view mounts with locally-diverged
/// props that the backend has not seen yet.
pub fn dirty_fields_between(value: &StateMap, initial: &StateMap) -> BTreeSet<String> {
    value
        .iter()
        .filter(|(key, v)| initial.get(key.as_str()) != Some(*v))
        .map(|(key, _)| key.clone())
        .collect()
}
