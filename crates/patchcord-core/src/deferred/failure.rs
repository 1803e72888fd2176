//! Failure channel types for the continuation framework.
//!
//! A [`Failure`] travels down a [`Deferred`](super::Deferred) chain the way a
//! value would. Handlers are selected by [`FailureKind`], the payload-free
//! discriminant of a failure.

use thiserror::Error;

/// Discriminant of a [`Failure`], used to select a handler with
/// [`Deferred::catch`](super::Deferred::catch).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The audio server refused to instantiate a template.
    InstanceCreationFailed,
    /// The audio server could not allocate a bus.
    BusAllocationFailed,
    /// No template is registered under the requested id.
    UnknownTemplate,
    /// The request never reached the audio server.
    ServerUnreachable,
    /// The server answered with a reply of the wrong shape.
    UnexpectedReply,
    /// The operation was abandoned (owner dropped or scheduler shut down).
    Aborted,
}

/// An asynchronous failure delivered through a Deferred's failure channel.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Failure {
    /// The audio server refused to instantiate a template.
    #[error("server refused to instantiate '{template}': {reason}")]
    InstanceCreationFailed {
        /// Full id of the refused template.
        template: String,
        /// Reason reported by the server.
        reason: String,
    },

    /// The audio server could not allocate a bus.
    #[error("bus allocation failed: {0}")]
    BusAllocationFailed(String),

    /// No template is registered under the requested id.
    #[error("unknown module template: {0}")]
    UnknownTemplate(String),

    /// The request never reached the audio server.
    #[error("audio server unreachable: {0}")]
    ServerUnreachable(String),

    /// The server answered with a reply of the wrong shape.
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),

    /// The operation was abandoned before it could complete.
    #[error("operation aborted")]
    Aborted,
}

impl Failure {
    /// Returns the kind of this failure.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::InstanceCreationFailed { .. } => FailureKind::InstanceCreationFailed,
            Self::BusAllocationFailed(_) => FailureKind::BusAllocationFailed,
            Self::UnknownTemplate(_) => FailureKind::UnknownTemplate,
            Self::ServerUnreachable(_) => FailureKind::ServerUnreachable,
            Self::UnexpectedReply(_) => FailureKind::UnexpectedReply,
            Self::Aborted => FailureKind::Aborted,
        }
    }
}

/// Misuse of a [`Completer`](super::Completer).
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum DeferredError {
    /// `resolve` or `fail` was called on a completer that already settled.
    #[error("completer already settled")]
    AlreadySettled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        let f = Failure::InstanceCreationFailed {
            template: "osc.sine".to_string(),
            reason: "no such synthdef".to_string(),
        };
        assert_eq!(f.kind(), FailureKind::InstanceCreationFailed);
        assert_eq!(Failure::Aborted.kind(), FailureKind::Aborted);
        assert_eq!(
            Failure::BusAllocationFailed("full".into()).kind(),
            FailureKind::BusAllocationFailed
        );
    }

    #[test]
    fn instance_failure_display() {
        let f = Failure::InstanceCreationFailed {
            template: "osc.sine".to_string(),
            reason: "no such synthdef".to_string(),
        };
        assert_eq!(
            f.to_string(),
            "server refused to instantiate 'osc.sine': no such synthdef"
        );
    }
}
