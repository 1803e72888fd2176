//! Ports and port addressing.
//!
//! An [`IoId`] names one port of one module and is the endpoint address used
//! by both connection maps. Ports carry the [`ModuleId`] of their owner rather
//! than a reference to it.

use std::fmt;

use crate::server::BusId;

use super::module::ModuleId;

/// Graph-wide address of a port: owning module plus port name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IoId {
    /// Module the port belongs to.
    pub module: ModuleId,
    /// Port (or parameter) name, unique within the module.
    pub port: String,
}

impl IoId {
    /// Creates an address for `port` on `module`.
    pub fn new(module: ModuleId, port: impl Into<String>) -> Self {
        Self {
            module,
            port: port.into(),
        }
    }
}

impl fmt::Display for IoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}.{}", self.module, self.port)
    }
}

/// Audio input. Owns one bus for its whole lifetime on the canvas.
#[derive(Clone, Debug)]
pub struct Inlet {
    name: String,
    module: ModuleId,
    bus: BusId,
}

impl Inlet {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            module: ModuleId::default(),
            bus: BusId::PLACEHOLDER,
        }
    }

    /// Port name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bus this inlet reads from.
    pub fn bus(&self) -> BusId {
        self.bus
    }

    /// Address of this inlet.
    pub fn ioid(&self) -> IoId {
        IoId::new(self.module, self.name.clone())
    }

    pub(crate) fn set_bus(&mut self, bus: BusId) {
        self.bus = bus;
    }

    pub(crate) fn set_module(&mut self, module: ModuleId) {
        self.module = module;
    }
}

/// Audio output. Writes to the buses of every inlet it feeds.
#[derive(Clone, Debug)]
pub struct Outlet {
    name: String,
    module: ModuleId,
    fanout: Vec<BusId>,
}

impl Outlet {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            module: ModuleId::default(),
            fanout: Vec::new(),
        }
    }

    /// Port name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Buses this outlet currently writes to.
    pub fn fanout(&self) -> &[BusId] {
        &self.fanout
    }

    /// Address of this outlet.
    pub fn ioid(&self) -> IoId {
        IoId::new(self.module, self.name.clone())
    }

    pub(crate) fn attach(&mut self, bus: BusId) {
        self.fanout.push(bus);
    }

    pub(crate) fn detach(&mut self, bus: BusId) -> bool {
        match self.fanout.iter().position(|b| *b == bus) {
            Some(pos) => {
                self.fanout.remove(pos);
                true
            }
            None => false,
        }
    }

    pub(crate) fn set_module(&mut self, module: ModuleId) {
        self.module = module;
    }
}
