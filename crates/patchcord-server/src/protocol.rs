//! Wire protocol between the bridge and an audio server.
//!
//! Messages are serialized as one JSON object per line. Requests that expect a
//! reply carry the id of the pending request; fire-and-forget requests do not.
//!
//! ```text
//! {"id":3,"op":"new_instance","def":"vca","outlets":[{"name":"out","bus":4294967295}]}
//! {"op":"bind_outlet","node":1000,"outlet":"out","buses":[16,17]}
//! {"id":3,"reply":"instance","node":1000}
//! ```

use std::fmt;

use patchcord_core::{BusId, ExecToken, GroupId, InstanceId, OutletPlaceholder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from encoding or decoding a protocol line.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Line is not a valid message.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Outlet binding sent with an instance request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireOutlet {
    /// Outlet name.
    pub name: String,
    /// Bus the outlet writes to initially.
    pub bus: u32,
}

impl From<&OutletPlaceholder> for WireOutlet {
    fn from(p: &OutletPlaceholder) -> Self {
        Self {
            name: p.name.clone(),
            bus: p.bus.0,
        }
    }
}

/// One entry of an execution order on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum WireToken {
    /// A container group.
    Group(i32),
    /// A node.
    Node(i32),
}

impl fmt::Display for WireToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group(g) => write!(f, "group#{g}"),
            Self::Node(n) => write!(f, "node#{n}"),
        }
    }
}

impl From<ExecToken> for WireToken {
    fn from(token: ExecToken) -> Self {
        match token {
            ExecToken::Group(GroupId(g)) => Self::Group(g),
            ExecToken::Instance(InstanceId(n)) => Self::Node(n),
        }
    }
}

/// Requests understood by the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ServerRequest {
    /// Allocate a bus. Replies [`ServerReply::Bus`].
    AllocBus,
    /// Instantiate a definition. Replies [`ServerReply::Instance`] or
    /// [`ServerReply::Refused`].
    NewInstance {
        /// Definition name.
        def: String,
        /// Initial outlet buses.
        outlets: Vec<WireOutlet>,
    },
    /// Create a group. Replies [`ServerReply::Group`].
    NewGroup,
    /// Route a bus into a node inlet.
    BindInlet {
        /// Target node.
        node: i32,
        /// Inlet name.
        inlet: String,
        /// Source bus.
        bus: u32,
    },
    /// Replace the buses a node outlet writes to.
    BindOutlet {
        /// Source node.
        node: i32,
        /// Outlet name.
        outlet: String,
        /// Destination buses.
        buses: Vec<u32>,
    },
    /// Set a control value.
    SetParam {
        /// Target node.
        node: i32,
        /// Parameter name.
        param: String,
        /// New value.
        value: f32,
    },
    /// Replace the execution order.
    Order {
        /// Nodes and groups, first to run first.
        tokens: Vec<WireToken>,
    },
    /// Free a node. Replies [`ServerReply::Done`].
    Free {
        /// Node to free.
        node: i32,
    },
    /// Round trip marker. Replies [`ServerReply::Done`] once every earlier
    /// request has been processed.
    Sync,
}

/// Replies from the server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum ServerReply {
    /// Allocated bus.
    Bus {
        /// Bus number.
        bus: u32,
    },
    /// Created node.
    Instance {
        /// Node id.
        node: i32,
    },
    /// Created group.
    Group {
        /// Group id.
        group: i32,
    },
    /// Request processed.
    Done,
    /// Request refused.
    Refused {
        /// Server-provided reason.
        reason: String,
    },
}

/// A request as framed for the transport.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Outgoing {
    /// Pending request id, for requests that expect a reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// The request itself.
    #[serde(flatten)]
    pub request: ServerRequest,
}

/// A reply as framed by the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Incoming {
    /// Id of the request being answered.
    pub id: u64,
    /// The reply itself.
    #[serde(flatten)]
    pub reply: ServerReply,
}

/// Encodes a request as a single line (without the trailing newline).
pub fn encode_request(message: &Outgoing) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(message)?)
}

/// Decodes a request line.
pub fn decode_request(line: &str) -> Result<Outgoing, ProtocolError> {
    Ok(serde_json::from_str(line.trim())?)
}

/// Encodes a reply as a single line.
pub fn encode_reply(message: &Incoming) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(message)?)
}

/// Decodes a reply line.
pub fn decode_reply(line: &str) -> Result<Incoming, ProtocolError> {
    Ok(serde_json::from_str(line.trim())?)
}

/// Converts bus handles to wire numbers.
pub(crate) fn wire_buses(buses: &[BusId]) -> Vec<u32> {
    buses.iter().map(|b| b.0).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_line_shape() {
        let line = encode_request(&Outgoing {
            id: Some(3),
            request: ServerRequest::NewInstance {
                def: "vca".into(),
                outlets: vec![WireOutlet {
                    name: "out".into(),
                    bus: u32::MAX,
                }],
            },
        })
        .unwrap();
        assert!(line.starts_with(r#"{"id":3,"op":"new_instance","def":"vca""#));
        assert!(!line.contains('\n'));
    }

    #[test]
    fn notifications_omit_id() {
        let line = encode_request(&Outgoing {
            id: None,
            request: ServerRequest::Order {
                tokens: vec![WireToken::Group(2), WireToken::Node(1000)],
            },
        })
        .unwrap();
        assert_eq!(
            line,
            r#"{"op":"order","tokens":[{"kind":"group","id":2},{"kind":"node","id":1000}]}"#
        );
        let back = decode_request(&line).unwrap();
        assert_eq!(back.id, None);
    }

    #[test]
    fn reply_decodes() {
        let reply = decode_reply(r#"{"id":9,"reply":"refused","reason":"no such def"}"#).unwrap();
        assert_eq!(reply.id, 9);
        assert_eq!(
            reply.reply,
            ServerReply::Refused {
                reason: "no such def".into()
            }
        );
    }

    #[test]
    fn garbage_is_malformed() {
        let err = decode_request("{not json").unwrap_err();
        assert!(err.to_string().starts_with("malformed message"));
        assert!(decode_reply(r#"{"id":1,"reply":"bogus"}"#).is_err());
    }

    #[test]
    fn exec_tokens_convert() {
        assert_eq!(WireToken::from(ExecToken::Group(GroupId(4))), WireToken::Group(4));
        assert_eq!(
            WireToken::from(ExecToken::Instance(InstanceId(1001))),
            WireToken::Node(1001)
        );
    }
}
