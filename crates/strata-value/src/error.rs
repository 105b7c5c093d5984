#![forbid(unsafe_code)]

use thiserror::Error;

use crate::path::{self, Segment};

pub type Result<T> = std::result::Result<T, ValueError>;

/// Structural failures raised while navigating or mutating a value tree.
#[derive(Debug, Error)]
pub enum ValueError {
    #[error("`{path}` is not an object")]
    NotAnObject { path: String },

    #[error("`{path}` is not an array")]
    NotAnArray { path: String },

    #[error("index {index} out of bounds at `{path}` (len {len})")]
    IndexOutOfBounds {
        path: String,
        index: usize,
        len: usize,
    },

    #[error("no value at `{path}`")]
    Missing { path: String },
}

impl ValueError {
    #[must_use]
    pub fn not_an_object(at: &[Segment]) -> Self {
        Self::NotAnObject {
            path: path::render(at),
        }
    }

    #[must_use]
    pub fn not_an_array(at: &[Segment]) -> Self {
        Self::NotAnArray {
            path: path::render(at),
        }
    }

    #[must_use]
    pub fn index_out_of_bounds(at: &[Segment], index: usize, len: usize) -> Self {
        Self::IndexOutOfBounds {
            path: path::render(at),
            index,
            len,
        }
    }

    #[must_use]
    pub fn missing(at: &[Segment]) -> Self {
        Self::Missing {
            path: path::render(at),
        }
    }
}
