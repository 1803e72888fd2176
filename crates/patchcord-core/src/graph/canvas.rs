//! The patch canvas: owns modules and both connection maps, and keeps the
//! server's execution order in step with the audio graph.
//!
//! # Ordering
//!
//! After every structural edit that can change dependencies (module created,
//! module removed, audio edge added) the canvas recomputes a topological order
//! and pushes it to the server, unless reordering is suspended. Disconnecting
//! an edge never reorders: the old order remains valid for the smaller graph.
//!
//! # Borrowing
//!
//! State lives behind a single `RefCell`. The canvas never calls into the
//! server, the factory, or a listener while that borrow is held, so those may
//! call back into the canvas freely. References handed out by
//! [`Canvas::module`] must be dropped before the next mutating call.

use std::cell::{Ref, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use slotmap::SlotMap;

use crate::deferred::{Deferred, Failure, join_all};
use crate::server::{AudioServer, BusId, ExecToken, InstanceId, OutletPlaceholder};
use crate::signal::Subscription;

use super::error::{GraphError, LoopSite};
use super::factory::{ModuleFactory, TemplateFactory};
use super::module::{Module, ModuleId, ModuleKind};
use super::order::{self, AudioEdges};
use super::param::{ParamController, ParamMode, normalize};
use super::port::IoId;
use super::template::ModuleTemplate;

/// Default cap on how many inlets one outlet may feed.
pub const DEFAULT_MAX_FANOUT: usize = 20;

/// Canvas tuning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CanvasOptions {
    /// Maximum number of inlets a single outlet may feed.
    pub max_fanout: usize,
}

impl Default for CanvasOptions {
    fn default() -> Self {
        Self {
            max_fanout: DEFAULT_MAX_FANOUT,
        }
    }
}

struct DataTarget {
    to: IoId,
    mode: ParamMode,
    param: Weak<ParamController>,
}

type DataTargets = Rc<RefCell<Vec<DataTarget>>>;

/// Outgoing parameter bindings of one source parameter, plus the listener
/// that drives them. Dropping it stops propagation.
struct DataFanout {
    targets: DataTargets,
    _listener: Subscription,
}

impl DataFanout {
    fn subscribe(source: &ParamController) -> Self {
        let targets: DataTargets = Rc::new(RefCell::new(Vec::new()));
        let driven = Rc::clone(&targets);
        let (min, max) = source.range();
        let listener = source.on_change(move |value| pass_data(&driven, *value, min, max));
        Self {
            targets,
            _listener: listener,
        }
    }
}

/// Pushes a source value to every bound destination.
fn pass_data(targets: &RefCell<Vec<DataTarget>>, value: f32, min: f32, max: f32) {
    let fraction = normalize(value, min, max);
    let live: Vec<(ParamMode, Rc<ParamController>)> = targets
        .borrow()
        .iter()
        .filter_map(|t| t.param.upgrade().map(|p| (t.mode, p)))
        .collect();
    for (mode, param) in live {
        match mode {
            ParamMode::Absolute => param.set_value(value),
            ParamMode::Relative => param.set_normalized(fraction),
        }
    }
}

struct CanvasState {
    options: CanvasOptions,
    templates: HashMap<String, ModuleTemplate>,
    modules: SlotMap<ModuleId, Module>,
    audio: AudioEdges,
    data: HashMap<IoId, DataFanout>,
    next_seq: u64,
    suspended: bool,
    published: Vec<ExecToken>,
}

impl CanvasState {
    fn param(&self, at: &IoId) -> Option<Rc<ParamController>> {
        self.modules.get(at.module)?.param(&at.port).cloned()
    }

    fn inlet_bus(&self, at: &IoId) -> Option<BusId> {
        self.modules
            .get(at.module)?
            .inlet(&at.port)
            .map(super::port::Inlet::bus)
    }

    fn has_outlet(&self, at: &IoId) -> bool {
        self.modules
            .get(at.module)
            .is_some_and(|m| m.outlet(&at.port).is_some())
    }

    /// Checks a proposed audio edge and returns the destination bus.
    fn validate_audio(&self, from: &IoId, to: &IoId) -> Result<BusId, GraphError> {
        if !self.has_outlet(from) {
            return Err(GraphError::InvalidEndpoint(from.clone()));
        }
        let bus = self
            .inlet_bus(to)
            .ok_or_else(|| GraphError::InvalidEndpoint(to.clone()))?;

        if order::reaches(&self.audio, to.module, from.module) {
            return Err(GraphError::ConnectionLoop(LoopSite::Edge {
                from: from.clone(),
                to: to.clone(),
            }));
        }

        let existing = self.audio.get(from).map_or(&[][..], Vec::as_slice);
        if existing.contains(to) {
            return Err(GraphError::DoubleConnection {
                from: from.clone(),
                to: to.clone(),
            });
        }
        if existing.len() >= self.options.max_fanout {
            return Err(GraphError::MultipleConnections {
                from: from.clone(),
                limit: self.options.max_fanout,
            });
        }
        Ok(bus)
    }

    /// Updates the source outlet's fan-out and returns the binding to push, if
    /// the source has a server instance.
    fn retarget_outlet(
        &mut self,
        from: &IoId,
        bus: BusId,
        attach: bool,
    ) -> Option<(InstanceId, Vec<BusId>)> {
        let source = self.modules.get_mut(from.module)?;
        let instance = source.instance();
        let outlet = source.outlet_mut(&from.port)?;
        if attach {
            outlet.attach(bus);
        } else {
            outlet.detach(bus);
        }
        instance.map(|i| (i, outlet.fanout().to_vec()))
    }
}

struct CanvasInner {
    state: RefCell<CanvasState>,
    server: Rc<dyn AudioServer>,
    factory: Rc<dyn ModuleFactory>,
}

/// Owner of the patch graph.
pub struct Canvas {
    inner: Rc<CanvasInner>,
}

impl Canvas {
    /// Creates an empty canvas.
    pub fn new(
        server: Rc<dyn AudioServer>,
        factory: Rc<dyn ModuleFactory>,
        options: CanvasOptions,
    ) -> Self {
        Self {
            inner: Rc::new(CanvasInner {
                state: RefCell::new(CanvasState {
                    options,
                    templates: HashMap::new(),
                    modules: SlotMap::with_key(),
                    audio: AudioEdges::new(),
                    data: HashMap::new(),
                    next_seq: 0,
                    suspended: false,
                    published: Vec::new(),
                }),
                server,
                factory,
            }),
        }
    }

    /// Creates a canvas that builds modules with a [`TemplateFactory`].
    pub fn with_server(server: Rc<dyn AudioServer>, options: CanvasOptions) -> Self {
        let factory = Rc::new(TemplateFactory::new(Rc::clone(&server)));
        Self::new(server, factory, options)
    }

    /// Current tuning.
    pub fn options(&self) -> CanvasOptions {
        self.inner.state.borrow().options
    }

    /// Registers a template, returning the one it replaces.
    pub fn register_template(&self, template: ModuleTemplate) -> Option<ModuleTemplate> {
        let id = template.id.clone();
        let previous = self
            .inner
            .state
            .borrow_mut()
            .templates
            .insert(id.clone(), template);
        tracing::debug!(template = %id, replaced = previous.is_some(), "canvas_register_template");
        previous
    }

    /// Returns a copy of a registered template.
    pub fn template(&self, id: &str) -> Option<ModuleTemplate> {
        self.inner.state.borrow().templates.get(id).cloned()
    }

    // --- Module lifecycle ---

    /// Creates a module from a registered template.
    ///
    /// The module is built by the factory, its inlet buses are allocated, and
    /// for real-time kinds an instance (plus a group for containers) is
    /// requested. Inlets are bound and initial parameter values pushed before
    /// the module is placed and the order recomputed. Any failed step fails the
    /// returned deferred and nothing is placed.
    pub fn create_module(&self, template_id: &str) -> Deferred<ModuleId> {
        let Some(template) = self.template(template_id) else {
            tracing::warn!(template = template_id, "canvas_create_module: unknown template");
            return Deferred::failed(Failure::UnknownTemplate(template_id.to_string()));
        };
        tracing::debug!(template = template_id, "canvas_create_module");

        let server = Rc::clone(&self.inner.server);
        let canvas = Rc::downgrade(&self.inner);
        let full_id = template.full_id.clone();
        self.inner
            .factory
            .create_instance(&template)
            .and_then(move |module| provision(server, full_id, module))
            .and_then(move |module| match canvas.upgrade() {
                Some(inner) => Deferred::resolved(Canvas { inner }.place(module)),
                None => {
                    tracing::warn!("canvas_create_module: canvas dropped before placement");
                    Deferred::failed(Failure::Aborted)
                }
            })
    }

    fn place(&self, mut module: Module) -> ModuleId {
        if let Some(instance) = module.instance() {
            let links = module
                .params()
                .iter()
                .map(|param| {
                    let server = Rc::clone(&self.inner.server);
                    let name = param.name().to_string();
                    server.set_param(instance, &name, param.value());
                    param.on_change(move |value| server.set_param(instance, &name, *value))
                })
                .collect();
            module.set_param_links(links);
        }

        let (id, suspended) = {
            let mut state = self.inner.state.borrow_mut();
            let seq = state.next_seq;
            state.next_seq += 1;
            let id = state.modules.insert_with_key(|id| {
                module.place(id, seq);
                module
            });
            (id, state.suspended)
        };
        tracing::debug!(module = ?id, "canvas_place_module");
        if !suspended {
            self.publish_order();
        }
        id
    }

    /// Removes a module and every connection touching it, then hands it to the
    /// factory for teardown.
    pub fn remove_module(&self, id: ModuleId) -> Result<Deferred<()>, GraphError> {
        let (audio, data) = {
            let state = self.inner.state.borrow();
            if !state.modules.contains_key(id) {
                return Err(GraphError::UnknownModule(id));
            }
            let audio: Vec<(IoId, IoId)> = state
                .audio
                .iter()
                .flat_map(|(from, targets)| targets.iter().map(move |to| (from, to)))
                .filter(|(from, to)| from.module == id || to.module == id)
                .map(|(from, to)| (from.clone(), to.clone()))
                .collect();
            let data: Vec<(IoId, IoId)> = state
                .data
                .iter()
                .flat_map(|(from, fanout)| {
                    fanout
                        .targets
                        .borrow()
                        .iter()
                        .map(|t| (from.clone(), t.to.clone()))
                        .collect::<Vec<_>>()
                })
                .filter(|(from, to)| from.module == id || to.module == id)
                .collect();
            (audio, data)
        };

        for (from, to) in &audio {
            self.disconnect_audio(from, to);
        }
        for (from, to) in &data {
            self.disconnect_data(from, to);
        }

        let (module, suspended) = {
            let mut state = self.inner.state.borrow_mut();
            let module = state
                .modules
                .remove(id)
                .ok_or(GraphError::UnknownModule(id))?;
            (module, state.suspended)
        };
        tracing::debug!(
            module = ?id,
            audio_edges = audio.len(),
            data_edges = data.len(),
            "canvas_remove_module"
        );
        if !suspended {
            self.publish_order();
        }
        Ok(self.inner.factory.destroy_instance(module))
    }

    // --- Audio edges ---

    /// Connects an outlet to an inlet.
    ///
    /// Checks run in this order: both endpoints resolve, the edge would not
    /// close a cycle (a self-loop counts), the edge is new, and the source is
    /// under its fan-out cap.
    pub fn connect_audio(&self, from: &IoId, to: &IoId) -> Result<(), GraphError> {
        let (binding, suspended) = {
            let mut state = self.inner.state.borrow_mut();
            let bus = match state.validate_audio(from, to) {
                Ok(bus) => bus,
                Err(err) => {
                    tracing::debug!(%from, %to, error = %err, "canvas_connect_audio: rejected");
                    return Err(err);
                }
            };
            state.audio.entry(from.clone()).or_default().push(to.clone());
            (state.retarget_outlet(from, bus, true), state.suspended)
        };
        tracing::debug!(%from, %to, "canvas_connect_audio");
        if let Some((instance, buses)) = binding {
            self.inner
                .server
                .bind_outlet_fanout(instance, &from.port, &buses);
        }
        if !suspended {
            self.publish_order();
        }
        Ok(())
    }

    /// Removes an audio edge. Returns false if it did not exist.
    pub fn disconnect_audio(&self, from: &IoId, to: &IoId) -> bool {
        let binding = {
            let mut state = self.inner.state.borrow_mut();
            let Some(targets) = state.audio.get_mut(from) else {
                return false;
            };
            let Some(pos) = targets.iter().position(|t| t == to) else {
                return false;
            };
            targets.remove(pos);
            if targets.is_empty() {
                state.audio.remove(from);
            }
            match state.inlet_bus(to) {
                Some(bus) => state.retarget_outlet(from, bus, false),
                None => None,
            }
        };
        tracing::debug!(%from, %to, "canvas_disconnect_audio");
        if let Some((instance, buses)) = binding {
            self.inner
                .server
                .bind_outlet_fanout(instance, &from.port, &buses);
        }
        true
    }

    // --- Data edges ---

    /// Binds one parameter to another so changes to `from` propagate to `to`.
    pub fn connect_data(&self, from: &IoId, to: &IoId, mode: ParamMode) -> Result<(), GraphError> {
        let mut state = self.inner.state.borrow_mut();
        let source = state
            .param(from)
            .ok_or_else(|| GraphError::InvalidEndpoint(from.clone()))?;
        let target = state
            .param(to)
            .ok_or_else(|| GraphError::InvalidEndpoint(to.clone()))?;

        let bound = state
            .data
            .get(from)
            .is_some_and(|f| f.targets.borrow().iter().any(|t| t.to == *to));
        if bound {
            return Err(GraphError::DoubleConnection {
                from: from.clone(),
                to: to.clone(),
            });
        }

        let fanout = state
            .data
            .entry(from.clone())
            .or_insert_with(|| DataFanout::subscribe(&source));
        fanout.targets.borrow_mut().push(DataTarget {
            to: to.clone(),
            mode,
            param: Rc::downgrade(&target),
        });
        drop(state);
        tracing::debug!(%from, %to, ?mode, "canvas_connect_data");
        Ok(())
    }

    /// Removes a parameter binding. Returns false if it did not exist.
    pub fn disconnect_data(&self, from: &IoId, to: &IoId) -> bool {
        let released = {
            let mut state = self.inner.state.borrow_mut();
            let Some(fanout) = state.data.get(from) else {
                return false;
            };
            let now_empty = {
                let mut targets = fanout.targets.borrow_mut();
                let Some(pos) = targets.iter().position(|t| t.to == *to) else {
                    return false;
                };
                targets.remove(pos);
                targets.is_empty()
            };
            if now_empty {
                state.data.remove(from)
            } else {
                None
            }
        };
        drop(released);
        tracing::debug!(%from, %to, "canvas_disconnect_data");
        true
    }

    // --- Ordering ---

    /// Suspends or resumes automatic reordering. Resuming forces an immediate
    /// recomputation.
    pub fn set_reordering_suspended(&self, suspended: bool) {
        let was = std::mem::replace(&mut self.inner.state.borrow_mut().suspended, suspended);
        tracing::debug!(suspended, "canvas_reordering");
        if was && !suspended {
            self.publish_order();
        }
    }

    /// Returns true while automatic reordering is suspended.
    pub fn is_reordering_suspended(&self) -> bool {
        self.inner.state.borrow().suspended
    }

    /// Runs `f` with reordering suspended and reorders once afterwards.
    /// Nested batches defer to the outermost one.
    pub fn batch<R>(&self, f: impl FnOnce(&Canvas) -> R) -> R {
        let already = self.is_reordering_suspended();
        if !already {
            self.set_reordering_suspended(true);
        }
        let result = f(self);
        if !already {
            self.set_reordering_suspended(false);
        }
        result
    }

    /// Computes a topological order of the real-time modules without
    /// publishing it.
    pub fn execution_order(&self) -> Result<Vec<ModuleId>, GraphError> {
        let state = self.inner.state.borrow();
        order::topological_order(&state.modules, &state.audio)
    }

    /// Recomputes the order and pushes it to the server.
    ///
    /// On failure the previously published order is left in place.
    pub fn recompute_order(&self) -> Result<Vec<ExecToken>, GraphError> {
        let tokens = {
            let state = self.inner.state.borrow();
            let order = order::topological_order(&state.modules, &state.audio)?;
            order::exec_tokens(&state.modules, &order)
        };
        self.inner.state.borrow_mut().published = tokens.clone();
        self.inner.server.set_execution_order(&tokens);
        tracing::debug!(tokens = tokens.len(), "canvas_order");
        Ok(tokens)
    }

    fn publish_order(&self) {
        if let Err(err) = self.recompute_order() {
            tracing::error!(error = %err, "canvas_order: keeping previous order");
        }
    }

    /// The order most recently sent to the server.
    pub fn published_order(&self) -> Vec<ExecToken> {
        self.inner.state.borrow().published.clone()
    }

    // --- Queries ---

    /// Number of placed modules.
    pub fn module_count(&self) -> usize {
        self.inner.state.borrow().modules.len()
    }

    /// All placed modules, in creation order.
    pub fn modules(&self) -> Vec<ModuleId> {
        let state = self.inner.state.borrow();
        let mut ids: Vec<(u64, ModuleId)> =
            state.modules.iter().map(|(id, m)| (m.seq(), id)).collect();
        ids.sort_unstable();
        ids.into_iter().map(|(_, id)| id).collect()
    }

    /// Borrows a module.
    pub fn module(&self, id: ModuleId) -> Option<Ref<'_, Module>> {
        Ref::filter_map(self.inner.state.borrow(), |s| s.modules.get(id)).ok()
    }

    /// Kind of a module.
    pub fn module_kind(&self, id: ModuleId) -> Option<ModuleKind> {
        self.inner.state.borrow().modules.get(id).map(Module::kind)
    }

    /// Returns true if this exact audio edge exists.
    pub fn has_audio_connection(&self, from: &IoId, to: &IoId) -> bool {
        self.inner
            .state
            .borrow()
            .audio
            .get(from)
            .is_some_and(|t| t.contains(to))
    }

    /// Returns true if any outlet of `from` feeds any inlet of `to`.
    pub fn audio_connected(&self, from: ModuleId, to: ModuleId) -> bool {
        self.inner
            .state
            .borrow()
            .audio
            .iter()
            .any(|(f, targets)| f.module == from && targets.iter().any(|t| t.module == to))
    }

    /// Modules fed directly by `module`, in creation order.
    pub fn directly_reachable(&self, module: ModuleId) -> Vec<ModuleId> {
        let state = self.inner.state.borrow();
        order::successors(&state.modules, &state.audio, module)
    }

    /// Inlets fed by an outlet, in connection order.
    pub fn audio_targets(&self, from: &IoId) -> Vec<IoId> {
        self.inner
            .state
            .borrow()
            .audio
            .get(from)
            .cloned()
            .unwrap_or_default()
    }

    /// Parameters bound to `from`, with their modes.
    pub fn data_targets(&self, from: &IoId) -> Vec<(IoId, ParamMode)> {
        self.inner
            .state
            .borrow()
            .data
            .get(from)
            .map(|f| {
                f.targets
                    .borrow()
                    .iter()
                    .map(|t| (t.to.clone(), t.mode))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns true if this exact parameter binding exists.
    pub fn has_data_connection(&self, from: &IoId, to: &IoId) -> bool {
        self.data_targets(from).iter().any(|(t, _)| t == to)
    }

    /// Current value of a parameter.
    pub fn param_value(&self, at: &IoId) -> Option<f32> {
        self.inner.state.borrow().param(at).map(|p| p.value())
    }

    /// Sets a parameter, propagating through bindings and to the server.
    pub fn set_param_value(&self, at: &IoId, value: f32) -> Result<(), GraphError> {
        let param = self
            .inner
            .state
            .borrow()
            .param(at)
            .ok_or_else(|| GraphError::InvalidEndpoint(at.clone()))?;
        param.set_value(value);
        Ok(())
    }
}

/// Allocates inlet buses and, for real-time kinds, the server instance.
fn provision(server: Rc<dyn AudioServer>, full_id: String, mut module: Module) -> Deferred<Module> {
    let buses = module.inlets().iter().map(|_| server.allocate_bus()).collect();
    join_all(buses).and_then(move |buses| {
        module.assign_inlet_buses(&buses);
        if !module.kind().is_realtime() {
            return Deferred::resolved(module);
        }

        let placeholders: Vec<OutletPlaceholder> = module
            .outlets()
            .iter()
            .map(|o| OutletPlaceholder {
                name: o.name().to_string(),
                bus: BusId::PLACEHOLDER,
            })
            .collect();
        let instance = server.allocate_instance(&full_id, &placeholders);
        let group = if module.kind() == ModuleKind::Container {
            server.allocate_group().map(Some)
        } else {
            Deferred::resolved(None)
        };

        instance
            .and_then(move |instance| group.map(move |group| (instance, group)))
            .map(move |(instance, group)| {
                module.attach_instance(instance, group);
                for inlet in module.inlets() {
                    server.bind_inlet(instance, inlet.name(), inlet.bus());
                }
                tracing::debug!(%instance, template = module.template(), "canvas_provision");
                module
            })
    })
}
