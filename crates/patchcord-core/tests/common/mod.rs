//! Shared fixtures for patchcord-core integration tests.
#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use patchcord_core::{
    AudioServer, BusId, Canvas, CanvasOptions, Deferred, ExecToken, Failure, GroupId, InstanceId,
    IoId, ModuleId, ModuleTemplate, OutletPlaceholder,
};

/// Synchronous server that answers every request immediately and records
/// what it was asked to do.
#[derive(Default)]
pub struct RecordingServer {
    next_id: Cell<i32>,
    pub refused: RefCell<Vec<String>>,
    pub orders: RefCell<Vec<Vec<ExecToken>>>,
    pub inlet_bindings: RefCell<Vec<(InstanceId, String, BusId)>>,
    pub fanouts: RefCell<Vec<(InstanceId, String, Vec<BusId>)>>,
    pub params: RefCell<Vec<(InstanceId, String, f32)>>,
    pub destroyed: RefCell<Vec<InstanceId>>,
}

impl RecordingServer {
    fn bump(&self) -> i32 {
        let n = self.next_id.get() + 1;
        self.next_id.set(n);
        n
    }

    pub fn order_count(&self) -> usize {
        self.orders.borrow().len()
    }

    pub fn last_order(&self) -> Vec<ExecToken> {
        self.orders.borrow().last().cloned().unwrap_or_default()
    }
}

impl AudioServer for RecordingServer {
    fn allocate_bus(&self) -> Deferred<BusId> {
        Deferred::resolved(BusId(self.bump() as u32))
    }

    fn allocate_instance(
        &self,
        template_full_id: &str,
        _outlets: &[OutletPlaceholder],
    ) -> Deferred<InstanceId> {
        if self.refused.borrow().iter().any(|r| r == template_full_id) {
            return Deferred::failed(Failure::InstanceCreationFailed {
                template: template_full_id.to_string(),
                reason: "definition not loaded".into(),
            });
        }
        Deferred::resolved(InstanceId(1000 + self.bump()))
    }

    fn allocate_group(&self) -> Deferred<GroupId> {
        Deferred::resolved(GroupId(self.bump()))
    }

    fn bind_inlet(&self, instance: InstanceId, inlet: &str, bus: BusId) {
        self.inlet_bindings
            .borrow_mut()
            .push((instance, inlet.to_string(), bus));
    }

    fn bind_outlet_fanout(&self, instance: InstanceId, outlet: &str, buses: &[BusId]) {
        self.fanouts
            .borrow_mut()
            .push((instance, outlet.to_string(), buses.to_vec()));
    }

    fn set_param(&self, instance: InstanceId, param: &str, value: f32) {
        self.params
            .borrow_mut()
            .push((instance, param.to_string(), value));
    }

    fn set_execution_order(&self, tokens: &[ExecToken]) {
        self.orders.borrow_mut().push(tokens.to_vec());
    }

    fn destroy_instance(&self, instance: InstanceId) -> Deferred<()> {
        self.destroyed.borrow_mut().push(instance);
        Deferred::resolved(())
    }
}

/// Canvas over a [`RecordingServer`] with a small template library.
pub fn canvas_with(options: CanvasOptions) -> (Rc<RecordingServer>, Canvas) {
    let server = Rc::new(RecordingServer::default());
    let canvas = Canvas::with_server(server.clone(), options);
    for template in library() {
        canvas.register_template(template);
    }
    (server, canvas)
}

pub fn canvas() -> (Rc<RecordingServer>, Canvas) {
    canvas_with(CanvasOptions::default())
}

pub fn library() -> Vec<ModuleTemplate> {
    vec![
        ModuleTemplate::realtime("osc")
            .outlet("out")
            .param("freq", 20.0, 20_000.0, 440.0),
        ModuleTemplate::realtime("vca")
            .inlet("in")
            .outlet("out")
            .param("gain", 0.0, 1.0, 0.5),
        ModuleTemplate::realtime("mixer").inlet("in").outlet("out"),
        ModuleTemplate::logic("knob").param("value", 0.0, 1.0, 0.0),
        ModuleTemplate::container("sub").inlet("in").outlet("out"),
    ]
}

/// Creates a module, panicking if the synchronous server did not settle it.
pub fn create(canvas: &Canvas, template: &str) -> ModuleId {
    canvas
        .create_module(template)
        .into_slot()
        .take()
        .expect("recording server settles synchronously")
        .expect("module creation succeeds")
}

pub fn out(m: ModuleId) -> IoId {
    IoId::new(m, "out")
}

pub fn inp(m: ModuleId) -> IoId {
    IoId::new(m, "in")
}
