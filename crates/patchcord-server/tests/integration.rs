//! End-to-end tests: canvas -> bridge -> loopback server thread -> scheduler.
//!
//! Every reply crosses a real thread boundary and is settled on the test
//! thread by the scheduler, so these exercise the full request/reply path.

use std::rc::Rc;
use std::time::Duration;

use patchcord_core::{
    Canvas, CanvasOptions, Deferred, FailureKind, IoId, ModuleId, ModuleTemplate, ParamMode,
    Scheduler,
};
use patchcord_server::{
    FIRST_NODE, LoopbackOptions, LoopbackState, LoopbackTransport, ServerBridge, ServerReply,
    WireToken,
};

const TIMEOUT: Duration = Duration::from_secs(5);

struct Rig {
    scheduler: Scheduler<ServerReply>,
    bridge: Rc<ServerBridge<LoopbackTransport>>,
    canvas: Canvas,
}

impl Rig {
    fn new(options: LoopbackOptions) -> Self {
        let scheduler = Scheduler::init();
        let transport = LoopbackTransport::spawn(scheduler.reply_sender(), options);
        let bridge = Rc::new(ServerBridge::new(transport, scheduler.clone()));
        let canvas = Canvas::with_server(bridge.clone(), CanvasOptions::default());
        canvas.register_template(
            ModuleTemplate::realtime("vca")
                .with_full_id("patchcord.vca")
                .inlet("in")
                .outlet("out")
                .param("gain", 0.0, 1.0, 0.5),
        );
        canvas.register_template(ModuleTemplate::container("sub").inlet("in").outlet("out"));
        canvas.register_template(ModuleTemplate::logic("knob").param("value", 0.0, 1.0, 0.0));
        Self {
            scheduler,
            bridge,
            canvas,
        }
    }

    fn settle<T: 'static>(&self, deferred: Deferred<T>) -> Result<T, patchcord_core::Failure> {
        let slot = deferred.into_slot();
        assert!(
            self.scheduler.run_until(TIMEOUT, || slot.is_ready()),
            "no reply within {TIMEOUT:?}"
        );
        slot.take().expect("slot is ready")
    }

    fn create(&self, template: &str) -> ModuleId {
        self.settle(self.canvas.create_module(template))
            .expect("module created")
    }

    /// Waits until the server has processed everything sent so far.
    fn server_state(&self) -> LoopbackState {
        self.settle(self.bridge.sync()).expect("sync");
        self.bridge.transport().snapshot()
    }
}

#[test]
fn chain_is_built_and_ordered_on_the_server() {
    let rig = Rig::new(LoopbackOptions::default());
    let a = rig.create("vca");
    let b = rig.create("vca");
    let c = rig.create("vca");
    rig.canvas
        .connect_audio(&IoId::new(b, "out"), &IoId::new(c, "in"))
        .unwrap();
    rig.canvas
        .connect_audio(&IoId::new(a, "out"), &IoId::new(b, "in"))
        .unwrap();

    let node = |m| rig.canvas.module(m).unwrap().instance().unwrap().0;
    let state = rig.server_state();
    assert_eq!(
        state.order,
        vec![
            WireToken::Node(node(a)),
            WireToken::Node(node(b)),
            WireToken::Node(node(c)),
        ]
    );
    assert_eq!(state.nodes.len(), 3);
    assert!(state.nodes.values().all(|def| def == "patchcord.vca"));

    let b_bus = rig.canvas.module(b).unwrap().inlets()[0].bus().0;
    assert_eq!(state.outlets[&(node(a), "out".to_string())], vec![b_bus]);
    assert_eq!(state.inlets[&(node(b), "in".to_string())], b_bus);
    assert_eq!(rig.scheduler.pending_count(), 0);
}

#[test]
fn refused_definition_fails_creation() {
    let rig = Rig::new(LoopbackOptions::default().refuse("patchcord.vca"));
    let failure = rig.settle(rig.canvas.create_module("vca")).unwrap_err();
    assert_eq!(failure.kind(), FailureKind::InstanceCreationFailed);
    assert!(failure.to_string().contains("patchcord.vca"));
    assert_eq!(rig.canvas.module_count(), 0);
    // Inlet buses were allocated before the refusal; cleanup is the server's.
    assert_eq!(rig.server_state().buses.len(), 1);
}

#[test]
fn container_gets_a_group_ahead_of_its_node() {
    let rig = Rig::new(LoopbackOptions::default());
    let s = rig.create("sub");
    let group = rig.canvas.module(s).unwrap().group().unwrap().0;
    let state = rig.server_state();
    assert_eq!(state.groups, vec![group]);
    assert_eq!(
        state.order,
        vec![WireToken::Group(group), WireToken::Node(FIRST_NODE)]
    );
}

#[test]
fn parameter_changes_reach_the_server() {
    let rig = Rig::new(LoopbackOptions::default());
    let knob = rig.create("knob");
    let a = rig.create("vca");
    let node = rig.canvas.module(a).unwrap().instance().unwrap().0;

    assert_eq!(
        rig.server_state().params[&(node, "gain".to_string())],
        0.5
    );

    rig.canvas
        .connect_data(
            &IoId::new(knob, "value"),
            &IoId::new(a, "gain"),
            ParamMode::Absolute,
        )
        .unwrap();
    rig.canvas
        .set_param_value(&IoId::new(knob, "value"), 0.9)
        .unwrap();
    assert_eq!(
        rig.server_state().params[&(node, "gain".to_string())],
        0.9
    );
}

#[test]
fn removal_frees_the_node() {
    let rig = Rig::new(LoopbackOptions::default());
    let a = rig.create("vca");
    let node = rig.canvas.module(a).unwrap().instance().unwrap().0;
    let done = rig.canvas.remove_module(a).unwrap();
    rig.settle(done).unwrap();

    let state = rig.server_state();
    assert_eq!(state.freed, vec![node]);
    assert!(state.nodes.is_empty());
    assert!(state.order.is_empty());
}

#[test]
fn unanswered_requests_stay_pending_until_shutdown() {
    let rig = Rig::new(LoopbackOptions::default().silence("free"));
    let a = rig.create("vca");
    let done = rig.canvas.remove_module(a).unwrap().into_slot();

    // Sync replies after the free has been processed, yet the free stays unanswered.
    rig.settle(rig.bridge.sync()).unwrap();
    assert!(!done.is_ready());
    assert_eq!(rig.scheduler.pending_count(), 1);

    assert_eq!(rig.scheduler.shutdown(), 1);
    assert!(!done.is_ready());
}
