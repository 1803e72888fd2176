//! Module templates: the static description a module is built from.

use super::module::ModuleKind;

/// Declared control parameter of a template.
#[derive(Clone, Debug, PartialEq)]
pub struct ParamSpec {
    /// Parameter name.
    pub name: String,
    /// Lower bound.
    pub min: f32,
    /// Upper bound.
    pub max: f32,
    /// Initial value.
    pub default: f32,
}

/// Static description of a module type.
///
/// `id` is the key modules are created by; `full_id` is the name the server
/// knows the real-time definition under.
#[derive(Clone, Debug, PartialEq)]
pub struct ModuleTemplate {
    /// Lookup key on the canvas.
    pub id: String,
    /// Server-side definition name.
    pub full_id: String,
    /// What the module is backed by.
    pub kind: ModuleKind,
    /// Inlet names, in declaration order.
    pub inlets: Vec<String>,
    /// Outlet names, in declaration order.
    pub outlets: Vec<String>,
    /// Declared parameters.
    pub params: Vec<ParamSpec>,
}

impl ModuleTemplate {
    /// Template with no ports. `full_id` defaults to `id`.
    pub fn new(id: impl Into<String>, kind: ModuleKind) -> Self {
        let id = id.into();
        Self {
            full_id: id.clone(),
            id,
            kind,
            inlets: Vec::new(),
            outlets: Vec::new(),
            params: Vec::new(),
        }
    }

    /// Shorthand for a [`ModuleKind::Realtime`] template.
    pub fn realtime(id: impl Into<String>) -> Self {
        Self::new(id, ModuleKind::Realtime)
    }

    /// Shorthand for a [`ModuleKind::Logic`] template.
    pub fn logic(id: impl Into<String>) -> Self {
        Self::new(id, ModuleKind::Logic)
    }

    /// Shorthand for a [`ModuleKind::Container`] template.
    pub fn container(id: impl Into<String>) -> Self {
        Self::new(id, ModuleKind::Container)
    }

    /// Sets the server-side definition name.
    pub fn with_full_id(mut self, full_id: impl Into<String>) -> Self {
        self.full_id = full_id.into();
        self
    }

    /// Adds an inlet.
    pub fn inlet(mut self, name: impl Into<String>) -> Self {
        self.inlets.push(name.into());
        self
    }

    /// Adds an outlet.
    pub fn outlet(mut self, name: impl Into<String>) -> Self {
        self.outlets.push(name.into());
        self
    }

    /// Adds a parameter.
    pub fn param(mut self, name: impl Into<String>, min: f32, max: f32, default: f32) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            min,
            max,
            default,
        });
        self
    }
}
