//! Error types shared across the core.
//!
//! Only malformed input is an error. MAC mismatches, absent values and
//! exhausted searches are ordinary results (see [`crate::session`] and
//! [`crate::search`]).

use thiserror::Error;

use crate::record::StoreKind;

/// Input rejected at the boundary before any canonicalization happens.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MalformedInput {
    /// A value is nested deeper than [`crate::value::MAX_DEPTH`] levels.
    #[error("max depth exceeded: value nested deeper than {max_depth} levels")]
    MaxDepthExceeded {
        /// The depth limit that was exceeded.
        max_depth: usize,
    },

    /// A map contains the same key twice.
    #[error("duplicate key: '{key}' appears multiple times in object")]
    DuplicateKey {
        /// The duplicated key.
        key: String,
    },

    /// The source text is not valid JSON.
    #[error("JSON parse error: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
    },

    /// A dotted preference path is empty.
    #[error("preference path is empty")]
    EmptyPath,

    /// A dotted preference path has an empty segment (`a..b`, `.a`, `a.`).
    #[error("preference path '{path}' has an empty segment")]
    EmptySegment {
        /// The rejected path.
        path: String,
    },

    /// A MAC is not 64 hexadecimal characters.
    #[error("invalid MAC '{value}': expected 64 hex characters")]
    InvalidMac {
        /// The rejected input.
        value: String,
    },

    /// Two MAC records cannot be laid out as one nested tree because one
    /// path is a strict prefix of the other.
    #[error("path conflict: '{path}' is both a MAC leaf and a parent of another path")]
    PathConflict {
        /// The path that is both a leaf and an interior node.
        path: String,
    },
}

/// Errors raised by a [`crate::session::VerificationSession`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionError {
    /// A record references a store the session holds no keying material for.
    #[error("no MAC context registered for the {store} store")]
    MissingContext {
        /// The store with no context.
        store: StoreKind,
    },
}
