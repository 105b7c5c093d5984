#![forbid(unsafe_code)]

//! Canonical state fingerprints.
//!
//! A [`Fingerprint`] is an order-stable serialization of a [`Value`] tree,
//! used to decide whether a derived field needs recomputation. Two trees
//! produce the same fingerprint if and only if they are deeply equal:
//!
//! - object keys are emitted in sorted order (`serde_json`'s `Map` is
//!   BTreeMap-backed, so iteration is already sorted and insertion order
//!   never leaks into the output);
//! - strings and keys are emitted with injective escaping, so `"1"` and `1`
//!   (or a key containing `,`) can never collide with structural characters.
//!
//! The writer is hand-rolled and infallible; a serde round-trip would do the
//! same job but forces a fallible API into what is a hot per-action path.

use std::fmt::Write as _;

use serde_json::Value;

/// A comparable structural representation of a state tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint the given tree.
    #[must_use]
    pub fn of(value: &Value) -> Self {
        let mut out = String::with_capacity(128);
        write_canonical(value, &mut out);
        Self(out)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => {
            let _ = write!(out, "{n}");
        }
        Value::String(s) => {
            let _ = write!(out, "{s:?}");
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            for (i, (key, item)) in map.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                let _ = write!(out, "{key:?}:");
                write_canonical(item, out);
            }
            out.push('}');
        }
    }
}
