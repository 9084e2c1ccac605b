//! Wire codec for the anywidget state protocol.
//!
//! The wire form is a flat triple: a JSON-safe `state` object, a list of
//! `buffer_paths`, and an ordered list of binary buffers. Path index `i`
//! identifies where buffer `i` belongs inside `state`. Decoding grafts each
//! buffer into the state tree as a [`StateValue::Bytes`] node; encoding walks
//! the tree, extracts every binary view in traversal order and leaves a
//! JSON-safe skeleton behind.
//!
//! Outbound buffers are base64-encoded so the enclosing transport can stay
//! text-only; `decode`/`encode` are inverses under that text encoding too.

use crate::value::{StateMap, StateValue};
use anywidget_sync_path::{format_buffer_path, format_buffer_paths, BufferPath, PathStep};
use base64::Engine;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("wire state must be an object")]
    StateNotObject,
    #[error("buffer path {0} does not resolve into state")]
    UnresolvedBufferPath(String),
    #[error("{paths} buffer paths but only {buffers} buffers")]
    BufferCountMismatch { paths: usize, buffers: usize },
    #[error("invalid base64 buffer")]
    InvalidBase64,
}

/// The JSON-safe half of an encoded state: skeleton plus buffer locations.
#[derive(Debug, Clone, PartialEq)]
pub struct WirePayload {
    pub state: Value,
    pub buffer_paths: Vec<BufferPath>,
}

/// An outbound message: JSON payload plus base64-encoded buffers.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub content: WirePayload,
    pub buffers: Vec<String>,
}

impl OutboundMessage {
    /// Render the full `{ content: { state, bufferPaths }, buffers }` shape.
    pub fn to_json(&self) -> Value {
        let mut content = Map::new();
        content.insert("state".to_string(), self.content.state.clone());
        content.insert(
            "bufferPaths".to_string(),
            format_buffer_paths(&self.content.buffer_paths),
        );
        let mut root = Map::new();
        root.insert("content".to_string(), Value::Object(content));
        root.insert(
            "buffers".to_string(),
            Value::Array(
                self.buffers
                    .iter()
                    .map(|b| Value::String(b.clone()))
                    .collect(),
            ),
        );
        Value::Object(root)
    }
}

/// Decode a wire value: graft `buffers[i]` into `state` at `buffer_paths[i]`.
///
/// Values at unlisted paths are left as plain JSON. Extra buffers beyond the
/// listed paths are ignored; missing buffers are an error.
pub fn decode_value(
    state: &Value,
    buffer_paths: &[BufferPath],
    buffers: &[Vec<u8>],
) -> Result<StateValue, WireError> {
    if buffer_paths.len() > buffers.len() {
        return Err(WireError::BufferCountMismatch {
            paths: buffer_paths.len(),
            buffers: buffers.len(),
        });
    }
    let mut out = StateValue::from_json(state);
    for (path, buffer) in buffer_paths.iter().zip(buffers) {
        graft(&mut out, path, buffer.clone())?;
    }
    Ok(out)
}

/// Decode a wire state object into a [`StateMap`] with inline binary views.
pub fn decode_state(
    state: &Value,
    buffer_paths: &[BufferPath],
    buffers: &[Vec<u8>],
) -> Result<StateMap, WireError> {
    match decode_value(state, buffer_paths, buffers)? {
        StateValue::Object(map) => Ok(map),
        _ => Err(WireError::StateNotObject),
    }
}

/// The raw (not yet text-encoded) output of [`encode_value`]/[`encode_state`].
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedState {
    pub state: Value,
    pub buffer_paths: Vec<BufferPath>,
    pub buffers: Vec<Vec<u8>>,
}

/// Encode a state value: extract every binary view in traversal order,
/// recording its path, and return the remaining JSON-safe skeleton.
///
/// Extracted object members are dropped from the skeleton; extracted array
/// elements leave a `null` placeholder so sibling indices stay stable.
pub fn encode_value(state: &StateValue) -> EncodedState {
    let mut buffer_paths = Vec::new();
    let mut buffers = Vec::new();
    let mut path = Vec::new();
    let skeleton = strip(state, &mut path, &mut buffer_paths, &mut buffers);
    EncodedState {
        state: skeleton.unwrap_or(Value::Null),
        buffer_paths,
        buffers,
    }
}

/// Encode a [`StateMap`], producing the wire triple for a state patch.
pub fn encode_state(state: &StateMap) -> EncodedState {
    encode_value(&StateValue::Object(state.clone()))
}

fn strip(
    value: &StateValue,
    path: &mut Vec<PathStep>,
    buffer_paths: &mut Vec<BufferPath>,
    buffers: &mut Vec<Vec<u8>>,
) -> Option<Value> {
    match value {
        StateValue::Null => Some(Value::Null),
        StateValue::Bool(b) => Some(Value::Bool(*b)),
        StateValue::Number(n) => Some(Value::Number(n.clone())),
        StateValue::String(s) => Some(Value::String(s.clone())),
        StateValue::Bytes(data) => {
            buffer_paths.push(path.clone());
            buffers.push(data.clone());
            None
        }
        StateValue::Array(arr) => {
            let mut out = Vec::with_capacity(arr.len());
            for (idx, item) in arr.iter().enumerate() {
                path.push(PathStep::Index(idx));
                // null placeholder keeps later indices addressable
                out.push(strip(item, path, buffer_paths, buffers).unwrap_or(Value::Null));
                path.pop();
            }
            Some(Value::Array(out))
        }
        StateValue::Object(map) => {
            let mut out = Map::new();
            for (key, item) in map {
                path.push(PathStep::Key(key.clone()));
                if let Some(v) = strip(item, path, buffer_paths, buffers) {
                    out.insert(key.clone(), v);
                }
                path.pop();
            }
            Some(Value::Object(out))
        }
    }
}

fn graft(root: &mut StateValue, path: &[PathStep], buffer: Vec<u8>) -> Result<(), WireError> {
    if path.is_empty() {
        *root = StateValue::Bytes(buffer);
        return Ok(());
    }
    let (parents, leaf) = path.split_at(path.len() - 1);
    let mut current = root;
    for step in parents {
        current = match (step, current) {
            (PathStep::Key(key), StateValue::Object(map)) => map
                .get_mut(key)
                .ok_or_else(|| unresolved(path))?,
            (PathStep::Index(idx), StateValue::Array(arr)) => arr
                .get_mut(*idx)
                .ok_or_else(|| unresolved(path))?,
            _ => return Err(unresolved(path)),
        };
    }
    match (&leaf[0], current) {
        // object members were dropped during encode, so insert (re)creates
        (PathStep::Key(key), StateValue::Object(map)) => {
            map.insert(key.clone(), StateValue::Bytes(buffer));
            Ok(())
        }
        (PathStep::Index(idx), StateValue::Array(arr)) => {
            let slot = arr.get_mut(*idx).ok_or_else(|| unresolved(path))?;
            *slot = StateValue::Bytes(buffer);
            Ok(())
        }
        _ => Err(unresolved(path)),
    }
}

fn unresolved(path: &[PathStep]) -> WireError {
    WireError::UnresolvedBufferPath(format_buffer_path(path).to_string())
}

/// Base64-encode raw buffers for a text-only transport.
pub fn buffers_to_base64(buffers: &[Vec<u8>]) -> Vec<String> {
    buffers
        .iter()
        .map(|b| base64::engine::general_purpose::STANDARD.encode(b))
        .collect()
}

/// Decode base64 transport buffers back to raw bytes.
pub fn buffers_from_base64(buffers: &[String]) -> Result<Vec<Vec<u8>>, WireError> {
    buffers
        .iter()
        .map(|b| {
            base64::engine::general_purpose::STANDARD
                .decode(b)
                .map_err(|_| WireError::InvalidBase64)
        })
        .collect()
}

/// Encode a state patch into the outbound
/// `{ content: { state, bufferPaths }, buffers }` message.
pub fn encode_patch_message(state: &StateMap) -> OutboundMessage {
    let encoded = encode_state(state);
    OutboundMessage {
        buffers: buffers_to_base64(&encoded.buffers),
        content: WirePayload {
            state: encoded.state,
            buffer_paths: encoded.buffer_paths,
        },
    }
}

/// Encode arbitrary out-of-band content into an outbound message.
pub fn encode_content_message(content: &StateValue) -> OutboundMessage {
    let encoded = encode_value(content);
    OutboundMessage {
        buffers: buffers_to_base64(&encoded.buffers),
        content: WirePayload {
            state: encoded.state,
            buffer_paths: encoded.buffer_paths,
        },
    }
}
