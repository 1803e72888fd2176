//! In-process simulated audio server.
//!
//! [`LoopbackTransport`] runs a server on a background thread. Requests cross
//! to it as encoded protocol lines over a channel; replies come back through a
//! [`ReplySender`], exactly as they would from a socket reader. The server
//! keeps a [`LoopbackState`] record of everything it was asked to do, which
//! tests and the CLI read through [`LoopbackTransport::snapshot`].

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use patchcord_core::{ReplySender, RequestId};

use crate::protocol::{self, Outgoing, ServerReply, ServerRequest, WireToken};
use crate::transport::{Transport, TransportError};

/// First bus number handed out. Lower numbers are hardware I/O on a real server.
pub const FIRST_BUS: u32 = 16;
/// First node id handed out.
pub const FIRST_NODE: i32 = 1000;
/// First group id handed out. Group 1 is the server's root group.
pub const FIRST_GROUP: i32 = 2;

/// Everything the loopback server has been asked to do.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoopbackState {
    /// Buses allocated so far.
    pub buses: Vec<u32>,
    /// Live nodes and their definition names.
    pub nodes: BTreeMap<i32, String>,
    /// Groups created so far.
    pub groups: Vec<i32>,
    /// Inlet routing per (node, inlet).
    pub inlets: BTreeMap<(i32, String), u32>,
    /// Outlet fan-out per (node, outlet).
    pub outlets: BTreeMap<(i32, String), Vec<u32>>,
    /// Last value per (node, param).
    pub params: BTreeMap<(i32, String), f32>,
    /// Execution order currently in effect.
    pub order: Vec<WireToken>,
    /// Number of execution-order updates received.
    pub order_updates: usize,
    /// Nodes freed so far.
    pub freed: Vec<i32>,
    /// Requests that named a node the server does not know.
    pub stale_requests: usize,
    /// Total messages processed.
    pub processed: usize,
}

/// Options for [`LoopbackTransport::spawn`].
#[derive(Clone, Debug, Default)]
pub struct LoopbackOptions {
    /// Definitions the server refuses to instantiate.
    pub refused: HashSet<String>,
    /// Requests of these ops are never answered.
    pub silent_ops: HashSet<String>,
}

impl LoopbackOptions {
    /// Refuses instances of `def`.
    pub fn refuse(mut self, def: impl Into<String>) -> Self {
        self.refused.insert(def.into());
        self
    }

    /// Drops requests of type `op` (e.g. `"free"`) without replying.
    pub fn silence(mut self, op: impl Into<String>) -> Self {
        self.silent_ops.insert(op.into());
        self
    }
}

/// Transport backed by an in-process server thread.
pub struct LoopbackTransport {
    tx: Option<Sender<String>>,
    state: Arc<Mutex<LoopbackState>>,
    handle: Option<JoinHandle<()>>,
}

impl LoopbackTransport {
    /// Starts the server thread. Replies are delivered through `replies`.
    pub fn spawn(replies: ReplySender<ServerReply>, options: LoopbackOptions) -> Self {
        let (tx, rx) = unbounded();
        let state = Arc::new(Mutex::new(LoopbackState::default()));
        let server = LoopbackServer {
            state: Arc::clone(&state),
            options,
            next_bus: FIRST_BUS,
            next_node: FIRST_NODE,
            next_group: FIRST_GROUP,
        };
        let handle = thread::Builder::new()
            .name("patchcord-loopback".into())
            .spawn(move || server.run(&rx, &replies))
            .map_err(|err| tracing::error!(error = %err, "loopback_spawn: thread failed"))
            .ok();
        tracing::debug!("loopback_spawn");
        Self {
            tx: handle.is_some().then_some(tx),
            state,
            handle,
        }
    }

    /// Copy of the server's current record.
    pub fn snapshot(&self) -> LoopbackState {
        self.state.lock().clone()
    }

    /// Stops accepting requests and waits for the server thread to finish
    /// everything already queued.
    pub fn shutdown(&mut self) {
        self.tx = None;
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("loopback_shutdown: server thread panicked");
            }
            tracing::debug!("loopback_shutdown");
        }
    }
}

impl Transport for LoopbackTransport {
    fn send(&self, message: Outgoing) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        let line = protocol::encode_request(&message)?;
        tx.send(line).map_err(|_| TransportError::Closed)
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct LoopbackServer {
    state: Arc<Mutex<LoopbackState>>,
    options: LoopbackOptions,
    next_bus: u32,
    next_node: i32,
    next_group: i32,
}

impl LoopbackServer {
    fn run(mut self, rx: &Receiver<String>, replies: &ReplySender<ServerReply>) {
        for line in rx {
            let message = match protocol::decode_request(&line) {
                Ok(message) => message,
                Err(err) => {
                    tracing::warn!(error = %err, "loopback_recv: dropped line");
                    continue;
                }
            };
            let op = op_name(&message.request);
            let reply = self.handle(message.request);
            let Some(id) = message.id else {
                continue;
            };
            if self.options.silent_ops.contains(op) {
                tracing::debug!(op, id, "loopback_reply: withheld");
                continue;
            }
            if replies.send(RequestId(id), reply).is_err() {
                tracing::debug!("loopback_reply: main loop gone, stopping");
                break;
            }
        }
    }

    fn handle(&mut self, request: ServerRequest) -> ServerReply {
        let mut state = self.state.lock();
        state.processed += 1;
        match request {
            ServerRequest::AllocBus => {
                let bus = self.next_bus;
                self.next_bus += 1;
                state.buses.push(bus);
                ServerReply::Bus { bus }
            }
            ServerRequest::NewInstance { def, outlets } => {
                if self.options.refused.contains(&def) {
                    return ServerReply::Refused {
                        reason: format!("definition '{def}' not loaded"),
                    };
                }
                let node = self.next_node;
                self.next_node += 1;
                for outlet in outlets {
                    state.outlets.insert((node, outlet.name), vec![outlet.bus]);
                }
                state.nodes.insert(node, def);
                ServerReply::Instance { node }
            }
            ServerRequest::NewGroup => {
                let group = self.next_group;
                self.next_group += 1;
                state.groups.push(group);
                ServerReply::Group { group }
            }
            ServerRequest::BindInlet { node, inlet, bus } => {
                if check_node(&mut state, node) {
                    state.inlets.insert((node, inlet), bus);
                }
                ServerReply::Done
            }
            ServerRequest::BindOutlet {
                node,
                outlet,
                buses,
            } => {
                if check_node(&mut state, node) {
                    state.outlets.insert((node, outlet), buses);
                }
                ServerReply::Done
            }
            ServerRequest::SetParam { node, param, value } => {
                if check_node(&mut state, node) {
                    state.params.insert((node, param), value);
                }
                ServerReply::Done
            }
            ServerRequest::Order { tokens } => {
                state.order = tokens;
                state.order_updates += 1;
                ServerReply::Done
            }
            ServerRequest::Free { node } => {
                if state.nodes.remove(&node).is_none() {
                    state.stale_requests += 1;
                    return ServerReply::Refused {
                        reason: format!("node {node} not found"),
                    };
                }
                state.inlets.retain(|(n, _), _| *n != node);
                state.outlets.retain(|(n, _), _| *n != node);
                state.params.retain(|(n, _), _| *n != node);
                state.freed.push(node);
                ServerReply::Done
            }
            ServerRequest::Sync => ServerReply::Done,
        }
    }
}

fn check_node(state: &mut LoopbackState, node: i32) -> bool {
    if state.nodes.contains_key(&node) {
        return true;
    }
    tracing::warn!(node, "loopback: request for unknown node");
    state.stale_requests += 1;
    false
}

fn op_name(request: &ServerRequest) -> &'static str {
    match request {
        ServerRequest::AllocBus => "alloc_bus",
        ServerRequest::NewInstance { .. } => "new_instance",
        ServerRequest::NewGroup => "new_group",
        ServerRequest::BindInlet { .. } => "bind_inlet",
        ServerRequest::BindOutlet { .. } => "bind_outlet",
        ServerRequest::SetParam { .. } => "set_param",
        ServerRequest::Order { .. } => "order",
        ServerRequest::Free { .. } => "free",
        ServerRequest::Sync => "sync",
    }
}
