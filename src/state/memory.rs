//! Path addressing over JSON memory
//!
//! Paths are dotted property names with optional array indexes, e.g.
//! `turn.activity.membersAdded[0].name`.

use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
enum Segment<'p> {
    Key(&'p str),
    Index(usize),
}

fn segments(path: &str) -> Option<Vec<Segment<'_>>> {
    let mut out = Vec::new();
    for part in path.split('.') {
        let (key, mut rest) = match part.find('[') {
            Some(pos) => (&part[..pos], &part[pos..]),
            None => (part, ""),
        };
        if key.is_empty() {
            return None;
        }
        out.push(Segment::Key(key));
        while !rest.is_empty() {
            let close = rest.find(']')?;
            let index = rest.get(1..close)?.trim().parse().ok()?;
            out.push(Segment::Index(index));
            rest = &rest[close + 1..];
            if !rest.is_empty() && !rest.starts_with('[') {
                return None;
            }
        }
    }
    Some(out)
}

/// Resolve a path against a JSON value
pub fn get_path<'v>(root: &'v Value, path: &str) -> Option<&'v Value> {
    let mut current = root;
    for segment in segments(path)? {
        current = match segment {
            Segment::Key(key) => current.as_object()?.get(key)?,
            Segment::Index(index) => current.as_array()?.get(index)?,
        };
    }
    Some(current)
}

/// Write a value at a dotted path, creating intermediate objects
///
/// Returns `false` when the path is malformed or uses array indexes, which
/// are read-only.
pub fn set_path(root: &mut Map<String, Value>, path: &str, value: Value) -> bool {
    let Some(keys) = object_keys(path) else {
        return false;
    };
    let Some((last, parents)) = keys.split_last() else {
        return false;
    };
    let mut current = root;
    for key in parents {
        let slot = current
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        current = match slot {
            Value::Object(map) => map,
            _ => return false,
        };
    }
    current.insert(last.to_string(), value);
    true
}

/// Remove the value at a dotted path
pub fn remove_path(root: &mut Map<String, Value>, path: &str) -> Option<Value> {
    let keys = object_keys(path)?;
    let (last, parents) = keys.split_last()?;
    let mut current = root;
    for key in parents {
        current = current.get_mut(*key)?.as_object_mut()?;
    }
    current.remove(*last)
}

fn object_keys(path: &str) -> Option<Vec<&str>> {
    segments(path)?
        .into_iter()
        .map(|segment| match segment {
            Segment::Key(key) => Some(key),
            Segment::Index(_) => None,
        })
        .collect()
}

/// Ensure `map[key]` is an object and return it
pub fn object_entry<'m>(map: &'m mut Map<String, Value>, key: &str) -> &'m mut Map<String, Value> {
    let slot = map
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    match slot {
        Value::Object(inner) => inner,
        _ => unreachable!("slot was just replaced with an object"),
    }
}
