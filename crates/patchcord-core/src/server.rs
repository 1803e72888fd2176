//! Contract with the real-time audio server.
//!
//! The graph engine never talks to the server directly. It issues requests
//! through an [`AudioServer`] implementation (see the `patchcord-server` crate
//! for the bridge and an in-process loopback). Calls either return a
//! [`Deferred`] for the reply or are fire-and-forget. None of them block.

use std::fmt;

use crate::deferred::Deferred;

/// Server-allocated bus handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BusId(pub u32);

impl BusId {
    /// Bus an outlet writes to before it feeds any inlet.
    pub const PLACEHOLDER: BusId = BusId(u32::MAX);

    /// Returns true for [`BusId::PLACEHOLDER`].
    pub fn is_placeholder(self) -> bool {
        self == Self::PLACEHOLDER
    }
}

impl fmt::Display for BusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_placeholder() {
            write!(f, "bus#placeholder")
        } else {
            write!(f, "bus#{}", self.0)
        }
    }
}

/// Server node id of a module's real-time instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub i32);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Server group id owned by a nested sub-graph container.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub i32);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group#{}", self.0)
    }
}

/// One entry of the execution order sent to the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExecToken {
    /// A container's sub-graph group, ordered as one unit.
    Group(GroupId),
    /// A module instance.
    Instance(InstanceId),
}

impl fmt::Display for ExecToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group(g) => g.fmt(f),
            Self::Instance(i) => i.fmt(f),
        }
    }
}

/// Outlet binding passed along with an instance allocation request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutletPlaceholder {
    /// Outlet name as the server-side definition knows it.
    pub name: String,
    /// Bus written until the outlet is connected.
    pub bus: BusId,
}

/// Requests the graph engine issues to the audio server.
pub trait AudioServer {
    /// Allocates a bus for an inlet.
    fn allocate_bus(&self) -> Deferred<BusId>;

    /// Creates a real-time instance of a template.
    ///
    /// Fails with [`Failure::InstanceCreationFailed`](crate::Failure::InstanceCreationFailed)
    /// if the server refuses the template.
    fn allocate_instance(
        &self,
        template_full_id: &str,
        outlets: &[OutletPlaceholder],
    ) -> Deferred<InstanceId>;

    /// Creates the group a nested sub-graph container runs in.
    fn allocate_group(&self) -> Deferred<GroupId>;

    /// Makes `inlet` of `instance` read from `bus`.
    fn bind_inlet(&self, instance: InstanceId, inlet: &str, bus: BusId);

    /// Makes `outlet` of `instance` write to every bus in `buses`.
    fn bind_outlet_fanout(&self, instance: InstanceId, outlet: &str, buses: &[BusId]);

    /// Sets a control value on `instance`.
    fn set_param(&self, instance: InstanceId, param: &str, value: f32);

    /// Replaces the server's execution order.
    fn set_execution_order(&self, tokens: &[ExecToken]);

    /// Frees `instance`.
    fn destroy_instance(&self, instance: InstanceId) -> Deferred<()>;
}
