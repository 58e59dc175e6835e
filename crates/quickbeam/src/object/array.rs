//! Array operations
//!
//! Indices follow the Python convention: `-k` is the k-th item from the end.
//! Reads need `0 <= resolved < len`; inserts also accept `resolved == len`,
//! and for inserts `-1` means "append".

use super::{Contents, Object};
use crate::value::Value;

/// Resolve a read index against `len`.
pub(crate) fn read_index(index: i32, len: usize) -> Option<usize> {
    let resolved = if index < 0 {
        len as i64 + index as i64
    } else {
        index as i64
    };
    (0..len as i64).contains(&resolved).then_some(resolved as usize)
}

/// Resolve an insert position against `len`; `-1` is one past the end.
pub(crate) fn write_index(index: i32, len: usize) -> Option<usize> {
    let resolved = if index < 0 {
        len as i64 + 1 + index as i64
    } else {
        index as i64
    };
    (0..=len as i64).contains(&resolved).then_some(resolved as usize)
}

impl Object {
    fn with_items<R>(&self, f: impl FnOnce(&mut Vec<Value>) -> R) -> Option<R> {
        let mut state = self.lock();
        match &mut state.contents {
            Contents::Array(items) => Some(f(items)),
            _ => None,
        }
    }

    /// Append `value`
    pub fn push(&self, value: impl Into<Value>) -> bool {
        self.insert(value, -1)
    }

    /// Insert `value` before position `at` (`-1` appends).
    pub fn insert(&self, value: impl Into<Value>, at: i32) -> bool {
        let value = value.into();
        // A rejected value leaves the lock before it is dropped
        let rejected = self.with_items(|items| match write_index(at, items.len()) {
            Some(i) => {
                items.insert(i, value);
                None
            }
            None => Some(value),
        });
        matches!(rejected, Some(None))
    }

    /// Copy of all items
    pub fn items(&self) -> Vec<Value> {
        self.with_items(|items| items.clone()).unwrap_or_default()
    }

    /// Items in `[start, end)`; `None` unless `start < end <= len`.
    pub fn slice(&self, start: i32, end: i32) -> Option<Vec<Value>> {
        self.with_items(|items| {
            let (start, end) = (usize::try_from(start).ok()?, usize::try_from(end).ok()?);
            (start < end && end <= items.len()).then(|| items[start..end].to_vec())
        })
        .flatten()
    }

    /// Index of the first item equal to `value`, or -1.
    ///
    /// A non-negative `start` searches forward from there; a negative one
    /// searches backward from the resolved position.
    pub fn find(&self, value: impl Into<Value>, start: i32) -> i32 {
        let needle = value.into();
        self.with_items(|items| {
            let from = read_index(start, items.len())?;
            let found = if start >= 0 {
                items[from..].iter().position(|v| *v == needle).map(|i| from + i)
            } else {
                items[..=from].iter().rposition(|v| *v == needle)
            };
            found.map(|i| i as i32)
        })
        .flatten()
        .unwrap_or(-1)
    }

    /// Remove items in the inclusive range `[first, last]`.
    ///
    /// After resolution `first > last` is a no-op, not an error.
    pub fn erase_range(&self, first: i32, last: i32) -> bool {
        let removed = self.with_items(|items| {
            let (a, b) = (read_index(first, items.len())?, read_index(last, items.len())?);
            (a <= b).then(|| items.drain(a..=b).collect::<Vec<_>>())
        });
        matches!(removed, Some(Some(_)))
    }

    /// Exchange two items
    pub fn swap_items(&self, first: i32, second: i32) -> bool {
        self.with_items(|items| {
            match (read_index(first, items.len()), read_index(second, items.len())) {
                (Some(a), Some(b)) => {
                    items.swap(a, b);
                    true
                }
                _ => false,
            }
        })
        .unwrap_or(false)
    }

    /// Sort ascending: none < numbers < forms < containers < strings.
    pub fn sort(&self) {
        self.with_items(|items| items.sort());
    }

    /// Sort, then drop adjacent duplicates; the array can then be used as a set.
    pub fn unique(&self) {
        let removed = self.with_items(|items| {
            items.sort();
            let mut kept: Vec<Value> = Vec::with_capacity(items.len());
            let mut dropped = Vec::new();
            for item in items.drain(..) {
                match kept.last() {
                    Some(last) if *last == item => dropped.push(item),
                    _ => kept.push(item),
                }
            }
            *items = kept;
            dropped
        });
        drop(removed);
    }

    /// Insert every item of `source` before `at` (`-1` appends).
    ///
    /// Adding an array to itself is a no-op. Both locks are taken in handle
    /// order, so two threads adding in opposite directions cannot deadlock.
    pub fn add_from_array(&self, source: &Object, at: i32) -> bool {
        if std::ptr::eq(self, source) || !self.is_array() || !source.is_array() {
            return false;
        }
        let (mut target, source) = Object::lock_pair(self, source);
        let incoming = match &source.contents {
            Contents::Array(items) => items.clone(),
            _ => return false,
        };
        match &mut target.contents {
            Contents::Array(items) => match write_index(at, items.len()) {
                Some(i) => {
                    items.splice(i..i, incoming);
                    true
                }
                None => false,
            },
            _ => false,
        }
    }
}
