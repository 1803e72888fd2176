//! Patchcord Core - patch graph engine and continuation framework
//!
//! This crate holds the editor-side model of a modular audio patch. The audio
//! itself runs on a remote real-time server; this crate decides what runs
//! there and in which order.
//!
//! # Core Abstractions
//!
//! ## Patch Graph
//!
//! - [`Canvas`] - Owns modules, audio edges and parameter bindings
//! - [`Module`] / [`ModuleTemplate`] - Nodes and the templates they are built from
//! - [`IoId`] - Graph-wide port address
//! - [`ParamController`] - Ranged control value with a change signal
//! - [`ModuleFactory`] / [`TemplateFactory`] - Module construction and teardown
//!
//! ## Continuations
//!
//! - [`Deferred`] / [`Completer`] - Single-assignment result with typed failure routing
//! - [`JoinBarrier`] / [`join_all`] - Fan-in over N concurrent requests
//! - [`Scheduler`] - Pending-request table and reply queue for a server transport
//!
//! ## Server Contract
//!
//! - [`AudioServer`] - Requests the engine issues; implemented by `patchcord-server`
//!
//! # Example
//!
//! ```rust,ignore
//! use patchcord_core::{Canvas, CanvasOptions, IoId, ModuleTemplate};
//!
//! let canvas = Canvas::with_server(server, CanvasOptions::default());
//! canvas.register_template(ModuleTemplate::realtime("osc").outlet("out"));
//! canvas.register_template(ModuleTemplate::realtime("vca").inlet("in").outlet("out"));
//!
//! canvas.create_module("osc").then(move |osc| { /* ... */ });
//!
//! // Wire once both modules exist
//! canvas.connect_audio(&IoId::new(osc, "out"), &IoId::new(vca, "in"))?;
//! ```

pub mod deferred;
pub mod graph;
pub mod server;
pub mod signal;

pub use deferred::{
    Completer, DEFAULT_DRAIN_BUDGET, Deferred, DeferredError, Envelope, Failure, FailureKind,
    JoinBarrier, QueueClosed, ReplySender, RequestId, Scheduler, Slot, join_all,
};
pub use graph::{
    Canvas, CanvasOptions, DEFAULT_MAX_FANOUT, GraphError, Inlet, IoId, LoopSite, Module,
    ModuleFactory, ModuleId, ModuleKind, ModuleTemplate, Outlet, ParamController, ParamMode,
    ParamSpec, TemplateFactory,
};
pub use server::{AudioServer, BusId, ExecToken, GroupId, InstanceId, OutletPlaceholder};
pub use signal::{Signal, Subscription};
