//! Graph editing errors.

use std::fmt;

use thiserror::Error;

use super::module::ModuleId;
use super::port::IoId;

/// Where a connection loop was detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopSite {
    /// The proposed edge would close a cycle.
    Edge {
        /// Source of the rejected edge.
        from: IoId,
        /// Destination of the rejected edge.
        to: IoId,
    },
    /// Ordering could not place every module.
    Ordering {
        /// Modules placed before the sort stalled.
        ordered: usize,
        /// Modules on the canvas.
        total: usize,
    },
}

impl fmt::Display for LoopSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Edge { from, to } => write!(f, "{from} -> {to} would close a cycle"),
            Self::Ordering { ordered, total } => {
                write!(f, "only {ordered} of {total} modules could be ordered")
            }
        }
    }
}

/// Errors from editing the patch graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// Endpoint does not resolve to a port of a live module.
    #[error("{0} is not a port of a live module")]
    InvalidEndpoint(IoId),

    /// The exact edge already exists.
    #[error("{from} is already connected to {to}")]
    DoubleConnection {
        /// Source endpoint.
        from: IoId,
        /// Destination endpoint.
        to: IoId,
    },

    /// Source outlet is at its fan-out cap.
    #[error("{from} already feeds {limit} inlets")]
    MultipleConnections {
        /// Source outlet.
        from: IoId,
        /// Fan-out cap.
        limit: usize,
    },

    /// The graph would contain, or contains, a cycle.
    #[error("connection loop: {0}")]
    ConnectionLoop(LoopSite),

    /// No module with this id.
    #[error("module {0:?} not found")]
    UnknownModule(ModuleId),
}
