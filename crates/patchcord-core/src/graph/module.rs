//! Modules: the nodes of the patch graph.

use std::rc::Rc;

use slotmap::new_key_type;

use crate::server::{BusId, ExecToken, GroupId, InstanceId};
use crate::signal::Subscription;

use super::param::ParamController;
use super::port::{Inlet, Outlet};
use super::template::ModuleTemplate;

new_key_type! {
    /// Stable handle to a module on a canvas.
    pub struct ModuleId;
}

/// What backs a module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModuleKind {
    /// Pure control logic. No server-side instance.
    Logic,
    /// Backed by one real-time instance.
    Realtime,
    /// Nested sub-graph: a real-time instance running inside its own group.
    Container,
}

impl ModuleKind {
    /// Returns true if modules of this kind own a server instance.
    pub fn is_realtime(self) -> bool {
        !matches!(self, Self::Logic)
    }
}

/// A node in the patch graph.
pub struct Module {
    id: ModuleId,
    template: String,
    kind: ModuleKind,
    seq: u64,
    inlets: Vec<Inlet>,
    outlets: Vec<Outlet>,
    params: Vec<Rc<ParamController>>,
    instance: Option<InstanceId>,
    group: Option<GroupId>,
    param_links: Vec<Subscription>,
}

impl Module {
    /// Builds an unplaced module with the ports and parameters of `template`.
    pub fn from_template(template: &ModuleTemplate) -> Self {
        Self {
            id: ModuleId::default(),
            template: template.id.clone(),
            kind: template.kind,
            seq: 0,
            inlets: template.inlets.iter().map(Inlet::new).collect(),
            outlets: template.outlets.iter().map(Outlet::new).collect(),
            params: template
                .params
                .iter()
                .map(|p| Rc::new(ParamController::new(p.name.clone(), p.min, p.max, p.default)))
                .collect(),
            instance: None,
            group: None,
            param_links: Vec::new(),
        }
    }

    /// Canvas handle. Null until the module is placed.
    pub fn id(&self) -> ModuleId {
        self.id
    }

    /// Id of the template the module was built from.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Backing kind.
    pub fn kind(&self) -> ModuleKind {
        self.kind
    }

    /// Creation sequence number on its canvas.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Audio inputs.
    pub fn inlets(&self) -> &[Inlet] {
        &self.inlets
    }

    /// Audio outputs.
    pub fn outlets(&self) -> &[Outlet] {
        &self.outlets
    }

    /// Control parameters.
    pub fn params(&self) -> &[Rc<ParamController>] {
        &self.params
    }

    /// Looks up an inlet by name.
    pub fn inlet(&self, name: &str) -> Option<&Inlet> {
        self.inlets.iter().find(|i| i.name() == name)
    }

    /// Looks up an outlet by name.
    pub fn outlet(&self, name: &str) -> Option<&Outlet> {
        self.outlets.iter().find(|o| o.name() == name)
    }

    /// Looks up a parameter by name.
    pub fn param(&self, name: &str) -> Option<&Rc<ParamController>> {
        self.params.iter().find(|p| p.name() == name)
    }

    /// Server instance, once allocated.
    pub fn instance(&self) -> Option<InstanceId> {
        self.instance
    }

    /// Server group of a container, once allocated.
    pub fn group(&self) -> Option<GroupId> {
        self.group
    }

    /// Appends this module's execution-order entries: the group first for a
    /// container, then the instance.
    pub fn push_exec_tokens(&self, out: &mut Vec<ExecToken>) {
        if let Some(group) = self.group {
            out.push(ExecToken::Group(group));
        }
        if let Some(instance) = self.instance {
            out.push(ExecToken::Instance(instance));
        }
    }

    pub(crate) fn outlet_mut(&mut self, name: &str) -> Option<&mut Outlet> {
        self.outlets.iter_mut().find(|o| o.name() == name)
    }

    pub(crate) fn assign_inlet_buses(&mut self, buses: &[BusId]) {
        for (inlet, bus) in self.inlets.iter_mut().zip(buses) {
            inlet.set_bus(*bus);
        }
    }

    pub(crate) fn attach_instance(&mut self, instance: InstanceId, group: Option<GroupId>) {
        self.instance = Some(instance);
        self.group = group;
    }

    pub(crate) fn set_param_links(&mut self, links: Vec<Subscription>) {
        self.param_links = links;
    }

    pub(crate) fn place(&mut self, id: ModuleId, seq: u64) {
        self.id = id;
        self.seq = seq;
        for inlet in &mut self.inlets {
            inlet.set_module(id);
        }
        for outlet in &mut self.outlets {
            outlet.set_module(id);
        }
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("template", &self.template)
            .field("kind", &self.kind)
            .field("instance", &self.instance)
            .field("group", &self.group)
            .finish_non_exhaustive()
    }
}
