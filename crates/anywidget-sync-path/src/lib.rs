//! Buffer-path utilities for the anywidget wire format.
//!
//! A buffer path is a property-access path into a widget's state object,
//! marking where a binary buffer belongs after decoding. On the wire each
//! path is an array of strings (object keys) and numbers (array indices):
//!
//! ```json
//! { "buffer_paths": [["image"], ["series", 0, "data"]] }
//! ```
//!
//! # Example
//!
//! ```
//! use anywidget_sync_path::{parse_buffer_path, format_buffer_path, PathStep};
//! use serde_json::json;
//!
//! let path = parse_buffer_path(&json!(["series", 0, "data"])).unwrap();
//! assert_eq!(
//!     path,
//!     vec![
//!         PathStep::Key("series".to_string()),
//!         PathStep::Index(0),
//!         PathStep::Key("data".to_string()),
//!     ]
//! );
//! assert_eq!(format_buffer_path(&path), json!(["series", 0, "data"]));
//! ```

use serde_json::Value;
use thiserror::Error;

/// A step in a buffer path: an object key or an array index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PathStep {
    Key(String),
    Index(usize),
}

/// A property-access path into a state object.
pub type BufferPath = Vec<PathStep>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BufferPathError {
    #[error("buffer path must be an array")]
    NotAnArray,
    #[error("buffer path step must be a string or unsigned integer")]
    InvalidStep,
}

/// Parse one wire-form buffer path (`Array<string | number>`).
///
/// # Example
///
/// ```
/// use anywidget_sync_path::{parse_buffer_path, PathStep};
/// use serde_json::json;
///
/// assert_eq!(parse_buffer_path(&json!([])).unwrap(), vec![]);
/// assert_eq!(
///     parse_buffer_path(&json!(["a", 1])).unwrap(),
///     vec![PathStep::Key("a".to_string()), PathStep::Index(1)]
/// );
/// assert!(parse_buffer_path(&json!("a")).is_err());
/// assert!(parse_buffer_path(&json!([-1])).is_err());
/// ```
pub fn parse_buffer_path(value: &Value) -> Result<BufferPath, BufferPathError> {
    let steps = value.as_array().ok_or(BufferPathError::NotAnArray)?;
    let mut out = Vec::with_capacity(steps.len());
    for step in steps {
        match step {
            Value::String(key) => out.push(PathStep::Key(key.clone())),
            Value::Number(n) => {
                let idx = n
                    .as_u64()
                    .and_then(|n| usize::try_from(n).ok())
                    .ok_or(BufferPathError::InvalidStep)?;
                out.push(PathStep::Index(idx));
            }
            _ => return Err(BufferPathError::InvalidStep),
        }
    }
    Ok(out)
}

/// Parse a wire-form list of buffer paths (`Array<Array<string | number>>`).
pub fn parse_buffer_paths(value: &Value) -> Result<Vec<BufferPath>, BufferPathError> {
    let paths = value.as_array().ok_or(BufferPathError::NotAnArray)?;
    paths.iter().map(parse_buffer_path).collect()
}

/// Format a buffer path back into its wire form.
pub fn format_buffer_path(path: &[PathStep]) -> Value {
    Value::Array(
        path.iter()
            .map(|step| match step {
                PathStep::Key(key) => Value::String(key.clone()),
                PathStep::Index(idx) => Value::from(*idx),
            })
            .collect(),
    )
}

/// Format a list of buffer paths into their wire form.
pub fn format_buffer_paths(paths: &[BufferPath]) -> Value {
    Value::Array(paths.iter().map(|p| format_buffer_path(p)).collect())
}

/// Get a value from a JSON document by buffer path.
///
/// Returns `None` if the path does not resolve.
///
/// # Example
///
/// ```
/// use anywidget_sync_path::{get, PathStep};
/// use serde_json::json;
///
/// let doc = json!({"a": [10, 20]});
/// let path = [PathStep::Key("a".to_string()), PathStep::Index(1)];
/// assert_eq!(get(&doc, &path), Some(&json!(20)));
/// ```
pub fn get<'a>(value: &'a Value, path: &[PathStep]) -> Option<&'a Value> {
    let mut current = value;
    for step in path {
        current = match (step, current) {
            (PathStep::Key(key), Value::Object(map)) => map.get(key)?,
            (PathStep::Index(idx), Value::Array(arr)) => arr.get(*idx)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Get a mutable reference to a value in a JSON document by buffer path.
pub fn get_mut<'a>(value: &'a mut Value, path: &[PathStep]) -> Option<&'a mut Value> {
    let mut current = value;
    for step in path {
        current = match (step, current) {
            (PathStep::Key(key), Value::Object(map)) => map.get_mut(key)?,
            (PathStep::Index(idx), Value::Array(arr)) => arr.get_mut(*idx)?,
            _ => return None,
        };
    }
    Some(current)
}
