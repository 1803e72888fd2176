//! Criterion benchmarks for canvas editing and execution ordering.
//!
//! Uses a server that answers every request immediately so only graph
//! bookkeeping is measured.
//!
//! Run with: `cargo bench -p patchcord-core -- canvas/`
#![allow(missing_docs)]

use std::cell::Cell;
use std::rc::Rc;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use patchcord_core::{
    AudioServer, BusId, Canvas, CanvasOptions, Deferred, ExecToken, GroupId, InstanceId, IoId,
    ModuleId, ModuleTemplate, OutletPlaceholder,
};

/// Server that allocates sequential ids and ignores fire-and-forget calls.
#[derive(Default)]
struct NullServer {
    next: Cell<i32>,
}

impl NullServer {
    fn bump(&self) -> i32 {
        let n = self.next.get() + 1;
        self.next.set(n);
        n
    }
}

impl AudioServer for NullServer {
    fn allocate_bus(&self) -> Deferred<BusId> {
        Deferred::resolved(BusId(self.bump() as u32))
    }
    fn allocate_instance(&self, _: &str, _: &[OutletPlaceholder]) -> Deferred<InstanceId> {
        Deferred::resolved(InstanceId(self.bump()))
    }
    fn allocate_group(&self) -> Deferred<GroupId> {
        Deferred::resolved(GroupId(self.bump()))
    }
    fn bind_inlet(&self, _: InstanceId, _: &str, _: BusId) {}
    fn bind_outlet_fanout(&self, _: InstanceId, _: &str, _: &[BusId]) {}
    fn set_param(&self, _: InstanceId, _: &str, _: f32) {}
    fn set_execution_order(&self, tokens: &[ExecToken]) {
        black_box(tokens);
    }
    fn destroy_instance(&self, _: InstanceId) -> Deferred<()> {
        Deferred::resolved(())
    }
}

fn make_canvas(n: usize) -> (Canvas, Vec<ModuleId>) {
    let canvas = Canvas::with_server(Rc::new(NullServer::default()), CanvasOptions::default());
    canvas.register_template(ModuleTemplate::realtime("vca").inlet("in").outlet("out"));
    let ids = (0..n)
        .map(|_| {
            canvas
                .create_module("vca")
                .into_slot()
                .take()
                .unwrap()
                .unwrap()
        })
        .collect();
    (canvas, ids)
}

fn wire_chain(canvas: &Canvas, ids: &[ModuleId]) {
    for pair in ids.windows(2) {
        canvas
            .connect_audio(&IoId::new(pair[0], "out"), &IoId::new(pair[1], "in"))
            .unwrap();
    }
}

// ---------------------------------------------------------------------------
// Chain loading: per-edge reorder vs. one batched reorder
// ---------------------------------------------------------------------------

fn bench_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("canvas/load");

    for &n in &[8usize, 32, 128] {
        group.bench_with_input(BenchmarkId::new("incremental", n), &n, |b, &n| {
            b.iter(|| {
                let (canvas, ids) = make_canvas(n);
                wire_chain(&canvas, &ids);
                black_box(canvas.published_order());
            });
        });
        group.bench_with_input(BenchmarkId::new("batched", n), &n, |b, &n| {
            b.iter(|| {
                let (canvas, ids) = make_canvas(n);
                canvas.batch(|canvas| wire_chain(canvas, &ids));
                black_box(canvas.published_order());
            });
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Ordering a prebuilt graph
// ---------------------------------------------------------------------------

fn bench_order(c: &mut Criterion) {
    let mut group = c.benchmark_group("canvas/order");

    for &n in &[32usize, 256] {
        let (canvas, ids) = make_canvas(n);
        canvas.batch(|canvas| wire_chain(canvas, &ids));
        group.bench_with_input(BenchmarkId::new("chain", n), &canvas, |b, canvas| {
            b.iter(|| black_box(canvas.execution_order().unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_load, bench_order);
criterion_main!(benches);
