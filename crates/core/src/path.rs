//! Field paths into stored documents
//!
//! Documents are addressed with dotted paths, the same way filters and update
//! operators name fields:
//!
//! | Syntax | Meaning | Example |
//! |--------|---------|---------|
//! | `key` | Object property | `name` |
//! | `a.b` | Nested property | `address.city` |
//! | `a.0` | Array element (when `a` is an array) | `grades.0` |
//! | `a.$[]` | Every element of an array (updates only) | `grades.$[]` |
//! | `a.$[id]` | Elements matching array filter `id` (updates only) | `grades.$[element]` |
//!
//! A numeric segment is an array index only when the container at that point
//! is an array; against an object it is an ordinary key.

use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// FieldPath and PathSegment
// =============================================================================

/// Error type for field path parsing
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathParseError {
    /// Empty path
    #[error("empty field path")]
    Empty,
    /// Empty segment (`a..b`, leading or trailing dot)
    #[error("empty segment at position {0}")]
    EmptySegment(usize),
    /// Malformed positional operator
    #[error("invalid positional segment '{0}'")]
    InvalidPositional(String),
}

/// A segment in a field path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// Object key, or array index when numeric and the container is an array
    Key(String),
    /// `$[]`: every element of the array
    AllElements,
    /// `$[identifier]`: elements matching the named array filter
    Filtered(String),
}

impl PathSegment {
    /// The segment as an array index, if it is numeric
    pub fn as_index(&self) -> Option<usize> {
        match self {
            PathSegment::Key(k) => k.parse::<usize>().ok(),
            _ => None,
        }
    }

    /// True for `$[]` and `$[identifier]`
    pub fn is_positional(&self) -> bool {
        !matches!(self, PathSegment::Key(_))
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(k) => write!(f, "{}", k),
            PathSegment::AllElements => write!(f, "$[]"),
            PathSegment::Filtered(id) => write!(f, "$[{}]", id),
        }
    }
}

/// A dotted path into a document
///
/// # Examples
///
/// ```
/// use foldline_core::path::FieldPath;
///
/// let path: FieldPath = "address.city".parse().unwrap();
/// assert_eq!(path.len(), 2);
/// assert_eq!(path.first_key(), Some("address"));
/// assert!(!path.has_positional());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<PathSegment>,
}

impl FieldPath {
    /// Create a path from segments
    pub fn from_segments(segments: Vec<PathSegment>) -> Self {
        FieldPath { segments }
    }

    /// Get the path segments
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Number of segments
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// True if the path has no segments
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The top-level field this path starts at
    pub fn first_key(&self) -> Option<&str> {
        match self.segments.first() {
            Some(PathSegment::Key(k)) => Some(k),
            _ => None,
        }
    }

    /// True if any segment is `$[]` or `$[identifier]`
    pub fn has_positional(&self) -> bool {
        self.segments.iter().any(PathSegment::is_positional)
    }
}

impl FromStr for FieldPath {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(PathParseError::Empty);
        }

        let mut segments = Vec::new();
        let mut position = 0;
        for part in s.split('.') {
            if part.is_empty() {
                return Err(PathParseError::EmptySegment(position));
            }
            let segment = if part == "$[]" {
                PathSegment::AllElements
            } else if let Some(rest) = part.strip_prefix("$[") {
                let ident = rest
                    .strip_suffix(']')
                    .filter(|id| !id.is_empty() && id.chars().all(|c| c.is_alphanumeric() || c == '_'))
                    .ok_or_else(|| PathParseError::InvalidPositional(part.to_string()))?;
                PathSegment::Filtered(ident.to_string())
            } else {
                PathSegment::Key(part.to_string())
            };
            segments.push(segment);
            position += part.len() + 1;
        }

        Ok(FieldPath { segments })
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", seg)?;
        }
        Ok(())
    }
}

// =============================================================================
// Path Operations Error
// =============================================================================

/// Error type for path mutation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// Traversal hit a scalar where a container was needed
    #[error("cannot traverse {found} at '{segment}'")]
    TypeMismatch {
        /// Segment being resolved
        segment: String,
        /// Actual type found
        found: &'static str,
    },

    /// Array index past the end (more than one past)
    #[error("index out of bounds: {index} > {len}")]
    IndexOutOfBounds {
        /// The requested index
        index: usize,
        /// The array length
        len: usize,
    },

    /// Positional segments must be expanded before mutation
    #[error("positional segment '{0}' cannot be resolved here")]
    Positional(String),
}

/// Helper to get type name for error messages
pub fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// =============================================================================
// Path Lookup
// =============================================================================

/// Get the value at a path, without traversing into array elements
///
/// Numeric segments index arrays. Returns `None` if any segment is missing
/// or a positional segment is present.
pub fn get_path<'a>(root: &'a Value, path: &FieldPath) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.segments() {
        current = match (segment, current) {
            (PathSegment::Key(key), Value::Object(obj)) => obj.get(key)?,
            (PathSegment::Key(_), Value::Array(arr)) => arr.get(segment.as_index()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Resolve every value a query path can reach
///
/// Follows query semantics: when a non-numeric segment meets an array, the
/// lookup continues into each element of the array. An empty result means the
/// field is missing.
pub fn resolve_path<'a>(root: &'a Value, path: &FieldPath) -> Vec<&'a Value> {
    let mut out = Vec::new();
    resolve_into(root, path.segments(), &mut out);
    out
}

fn resolve_into<'a>(current: &'a Value, segments: &[PathSegment], out: &mut Vec<&'a Value>) {
    let Some((segment, rest)) = segments.split_first() else {
        out.push(current);
        return;
    };

    match (segment, current) {
        (PathSegment::Key(key), Value::Object(obj)) => {
            if let Some(next) = obj.get(key) {
                resolve_into(next, rest, out);
            }
        }
        (PathSegment::Key(_), Value::Array(arr)) => {
            if let Some(idx) = segment.as_index() {
                if let Some(next) = arr.get(idx) {
                    resolve_into(next, rest, out);
                }
            } else {
                for element in arr {
                    if element.is_object() {
                        resolve_into(element, segments, out);
                    }
                }
            }
        }
        _ => {}
    }
}

// =============================================================================
// Path Mutation
// =============================================================================

/// Set the value at a path, creating intermediate objects as needed
///
/// Writing one past the end of an array appends. Positional segments must be
/// expanded by the caller first.
pub fn set_path(root: &mut Value, path: &FieldPath, value: Value) -> Result<(), PathError> {
    let segments = path.segments();
    let Some((last, parents)) = segments.split_last() else {
        *root = value;
        return Ok(());
    };

    let mut current = root;
    for segment in parents {
        current = step_mut(current, segment, true)?;
    }

    match (last, current) {
        (PathSegment::Key(key), Value::Object(obj)) => {
            obj.insert(key.clone(), value);
            Ok(())
        }
        (PathSegment::Key(key), Value::Array(arr)) => {
            let idx = last.as_index().ok_or_else(|| PathError::TypeMismatch {
                segment: key.clone(),
                found: "array",
            })?;
            if idx < arr.len() {
                arr[idx] = value;
                Ok(())
            } else if idx == arr.len() {
                arr.push(value);
                Ok(())
            } else {
                Err(PathError::IndexOutOfBounds {
                    index: idx,
                    len: arr.len(),
                })
            }
        }
        (PathSegment::Key(key), other) => Err(PathError::TypeMismatch {
            segment: key.clone(),
            found: value_type_name(other),
        }),
        (positional, _) => Err(PathError::Positional(positional.to_string())),
    }
}

/// Get a mutable reference at a path, optionally creating missing objects
pub fn get_path_mut<'a>(
    root: &'a mut Value,
    path: &FieldPath,
    create: bool,
) -> Result<Option<&'a mut Value>, PathError> {
    let mut current = root;
    for segment in path.segments() {
        if !create && !has_step(current, segment) {
            return Ok(None);
        }
        current = step_mut(current, segment, create)?;
    }
    Ok(Some(current))
}

fn has_step(current: &Value, segment: &PathSegment) -> bool {
    match (segment, current) {
        (PathSegment::Key(key), Value::Object(obj)) => obj.contains_key(key),
        (PathSegment::Key(_), Value::Array(arr)) => {
            segment.as_index().map(|i| i < arr.len()).unwrap_or(false)
        }
        _ => false,
    }
}

fn step_mut<'a>(
    current: &'a mut Value,
    segment: &PathSegment,
    create: bool,
) -> Result<&'a mut Value, PathError> {
    match segment {
        PathSegment::Key(key) => {
            let found = value_type_name(current);
            match current {
                Value::Object(obj) => {
                    if create && !obj.contains_key(key) {
                        obj.insert(key.clone(), Value::Object(Map::new()));
                    }
                    obj.get_mut(key).ok_or_else(|| PathError::TypeMismatch {
                        segment: key.clone(),
                        found: "missing",
                    })
                }
                Value::Array(arr) => {
                    let len = arr.len();
                    let idx = segment.as_index().ok_or_else(|| PathError::TypeMismatch {
                        segment: key.clone(),
                        found: "array",
                    })?;
                    arr.get_mut(idx)
                        .ok_or(PathError::IndexOutOfBounds { index: idx, len })
                }
                _ => Err(PathError::TypeMismatch {
                    segment: key.clone(),
                    found,
                }),
            }
        }
        positional => Err(PathError::Positional(positional.to_string())),
    }
}

/// Remove the value at a path
///
/// For objects the key is removed. For arrays the element is replaced with
/// null so sibling indexes stay stable. Returns the removed value, if any.
pub fn unset_path(root: &mut Value, path: &FieldPath) -> Option<Value> {
    let (last, parents) = path.segments().split_last()?;

    let mut current = root;
    for segment in parents {
        if !has_step(current, segment) {
            return None;
        }
        current = step_mut(current, segment, false).ok()?;
    }

    match (last, current) {
        (PathSegment::Key(key), Value::Object(obj)) => obj.remove(key),
        (PathSegment::Key(_), Value::Array(arr)) => {
            let idx = last.as_index()?;
            arr.get_mut(idx).map(|slot| std::mem::replace(slot, Value::Null))
        }
        _ => None,
    }
}
