use std::fmt;
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Read,
    Write,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Read => f.write_str("read"),
            Op::Write => f.write_str("write"),
        }
    }
}

/// Everything that can end a single connection early. None of these are
/// fatal to the worker serving it.
#[derive(Debug, thiserror::Error)]
pub enum ConnError {
    #[error("{op} timed out")]
    Timeout { op: Op },

    #[error("{op} failed: {source}")]
    Io {
        op: Op,
        #[source]
        source: io::Error,
    },

    #[error("peer closed before sending any bytes")]
    Closed,
}

impl ConnError {
    pub fn io(op: Op, source: io::Error) -> Self {
        ConnError::Io { op, source }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ConnError::Timeout { .. })
    }

    /// The stage that failed. A peer hanging up early counts as a read failure.
    pub fn op(&self) -> Op {
        match self {
            ConnError::Timeout { op } | ConnError::Io { op, .. } => *op,
            ConnError::Closed => Op::Read,
        }
    }
}
