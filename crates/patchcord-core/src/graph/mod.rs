//! Patch graph engine.
//!
//! The [`Canvas`] owns every [`Module`], the audio edge map (outlet to inlets)
//! and the data edge map (parameter to parameters). Modules live in a
//! slot-map arena and are addressed by [`ModuleId`]; ports are addressed by
//! [`IoId`].
//!
//! Audio edges must keep the graph acyclic. Each accepted edge, module
//! creation and module removal triggers a topological sort whose result is
//! sent to the audio server as its execution order.

mod canvas;
mod error;
mod factory;
mod module;
mod order;
mod param;
mod port;
mod template;

pub use canvas::{Canvas, CanvasOptions, DEFAULT_MAX_FANOUT};
pub use error::{GraphError, LoopSite};
pub use factory::{ModuleFactory, TemplateFactory};
pub use module::{Module, ModuleId, ModuleKind};
pub use param::{ParamController, ParamMode};
pub use port::{Inlet, IoId, Outlet};
pub use template::{ModuleTemplate, ParamSpec};
