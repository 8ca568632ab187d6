//! Error types for mesh construction and lazy fragment access.

/// Errors that abort construction of a [`crate::MultiresolutionMesh`].
#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    /// The index blob is truncated or its size disagrees with the declared counts.
    #[error("malformed mesh index: {0}")]
    Format(#[from] FormatError),

    /// The index blob could not be read.
    #[error("failed to read mesh index: {0}")]
    Io(#[source] std::io::Error),
}

/// Structural problems detected while decoding the index blob.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    /// The blob is shorter than the fixed 16-byte header.
    #[error("header truncated: expected {expected} bytes, got {actual}")]
    TruncatedHeader {
        /// Header size in bytes.
        expected: usize,
        /// Actual blob size.
        actual: usize,
    },
    /// A header count is negative.
    #[error("negative {table} count: {count}")]
    NegativeCount {
        /// Which table the count belongs to.
        table: &'static str,
        /// The raw count.
        count: i32,
    },
    /// The blob size does not match `header + records`.
    #[error("size mismatch: declared counts need {expected} bytes, blob has {actual}")]
    SizeMismatch {
        /// Byte count implied by the header.
        expected: u64,
        /// Actual blob size.
        actual: u64,
    },
    /// The index has no root node.
    #[error("index declares no nodes")]
    MissingRoot,
    /// The index has no fragment 0, so the domain box is undefined.
    #[error("index declares no fragments")]
    MissingDomain,
}

/// Errors raised the first time a fragment's triangle data is requested.
///
/// These are recoverable: callers may skip the fragment, retry, or keep
/// rendering coarser geometry.
#[derive(Debug, thiserror::Error)]
pub enum FragmentError {
    /// Reading the fragment blob failed (including a missing blob file).
    #[error("failed to read fragment {fragment}: {source}")]
    Io {
        /// The fragment being fetched.
        fragment: u32,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The triangle batch does not match its declared layout.
    #[error("fragment {fragment} is malformed: {reason}")]
    Malformed {
        /// The fragment being decoded.
        fragment: u32,
        /// What was wrong with it.
        reason: String,
    },
    /// No fragment with this id exists in the index.
    #[error("unknown fragment id {0}")]
    UnknownFragment(u32),
}
