//! Property-based tests for the patchcord-core graph engine and continuations.
//!
//! Random edge-insertion sequences check acyclicity, order validity and
//! batch equivalence; random settle orders check the fan-in primitives.

mod common;

use std::cell::Cell;
use std::collections::HashSet;
use std::rc::Rc;

use common::{canvas, create, inp, out};
use patchcord_core::{
    Canvas, Completer, ExecToken, GraphError, JoinBarrier, LoopSite, ModuleId, join_all,
};
use proptest::prelude::*;

/// Maps the published order back to creation indices in `modules`.
fn published_indices(canvas: &Canvas, modules: &[ModuleId]) -> Vec<usize> {
    canvas
        .published_order()
        .iter()
        .map(|token| {
            let ExecToken::Instance(instance) = token else {
                panic!("unexpected token {token:?}");
            };
            modules
                .iter()
                .position(|&m| canvas.module(m).unwrap().instance() == Some(*instance))
                .unwrap()
        })
        .collect()
}

/// Returns true if `target` is reachable from `start` in `edges`.
fn reachable(edges: &HashSet<(usize, usize)>, start: usize, target: usize) -> bool {
    let mut stack = vec![start];
    let mut seen = HashSet::new();
    while let Some(n) = stack.pop() {
        if n == target {
            return true;
        }
        if seen.insert(n) {
            stack.extend(edges.iter().filter(|(f, _)| *f == n).map(|(_, t)| *t));
        }
    }
    false
}

fn edge_attempts() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (2usize..8).prop_flat_map(|n| (Just(n), prop::collection::vec((0..n, 0..n), 0..40)))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Every accepted edge keeps the module graph acyclic, and every
    /// `ConnectionLoop` rejection corresponds to an edge that would have closed
    /// a cycle.
    #[test]
    fn accepted_edges_stay_acyclic((n, attempts) in edge_attempts()) {
        let (_, canvas) = canvas();
        let ids: Vec<ModuleId> = (0..n).map(|_| create(&canvas, "vca")).collect();
        let mut accepted = HashSet::new();

        for (f, t) in attempts {
            match canvas.connect_audio(&out(ids[f]), &inp(ids[t])) {
                Ok(()) => {
                    prop_assert!(!reachable(&accepted, t, f));
                    accepted.insert((f, t));
                }
                Err(GraphError::ConnectionLoop(LoopSite::Edge { .. })) => {
                    prop_assert!(reachable(&accepted, t, f));
                }
                Err(GraphError::DoubleConnection { .. }) => {
                    prop_assert!(accepted.contains(&(f, t)));
                }
                Err(other) => prop_assert!(false, "unexpected error {other}"),
            }
        }
        for &(f, t) in &accepted {
            prop_assert!(canvas.audio_connected(ids[f], ids[t]));
        }
    }

    /// The computed order places every module after all of its sources and
    /// covers every real-time module exactly once.
    #[test]
    fn order_is_topological((n, attempts) in edge_attempts()) {
        let (_, canvas) = canvas();
        let ids: Vec<ModuleId> = (0..n).map(|_| create(&canvas, "vca")).collect();
        let mut accepted = Vec::new();
        for (f, t) in attempts {
            if canvas.connect_audio(&out(ids[f]), &inp(ids[t])).is_ok() {
                accepted.push((f, t));
            }
        }

        let order = canvas.execution_order().unwrap();
        prop_assert_eq!(order.len(), n);
        let position = |m: ModuleId| order.iter().position(|x| *x == m).unwrap();
        for (f, t) in accepted {
            prop_assert!(position(ids[f]) < position(ids[t]));
        }
    }

    /// Loading with reordering suspended and recomputing once yields the same
    /// published order as recomputing after each insertion.
    #[test]
    fn suspended_load_matches_incremental((n, attempts) in edge_attempts()) {
        let (_, incremental) = canvas();
        let (_, batched) = canvas();
        let a: Vec<ModuleId> = (0..n).map(|_| create(&incremental, "vca")).collect();
        let b: Vec<ModuleId> = (0..n).map(|_| create(&batched, "vca")).collect();

        let mut accepted = Vec::new();
        for (f, t) in attempts {
            if incremental.connect_audio(&out(a[f]), &inp(a[t])).is_ok() {
                accepted.push((f, t));
            }
        }
        batched.batch(|canvas| {
            for &(f, t) in &accepted {
                canvas.connect_audio(&out(b[f]), &inp(b[t])).unwrap();
            }
        });

        let index_a: Vec<usize> = incremental
            .execution_order()
            .unwrap()
            .iter()
            .map(|m| a.iter().position(|x| x == m).unwrap())
            .collect();
        let index_b: Vec<usize> = batched
            .execution_order()
            .unwrap()
            .iter()
            .map(|m| b.iter().position(|x| x == m).unwrap())
            .collect();
        prop_assert_eq!(index_a, index_b);
        prop_assert_eq!(
            published_indices(&incremental, &a),
            published_indices(&batched, &b)
        );
    }

    /// `join_all` collects values in input order whatever order the inputs
    /// settle in.
    #[test]
    fn join_all_preserves_input_order(
        order in Just((0..8usize).collect::<Vec<_>>()).prop_shuffle()
    ) {
        let completers: Vec<Completer<usize>> = (0..order.len()).map(|_| Completer::new()).collect();
        let slot = join_all(completers.iter().map(Completer::deferred).collect()).into_slot();
        for &i in &order {
            prop_assert!(!slot.is_ready());
            completers[i].resolve(i).unwrap();
        }
        let values = slot.take().unwrap().unwrap();
        prop_assert_eq!(values, (0..order.len()).collect::<Vec<_>>());
    }

    /// A barrier fires exactly once, on the n-th tick.
    #[test]
    fn barrier_fires_once_after_n_ticks(n in 1usize..32, extra in 0usize..4) {
        let barrier = JoinBarrier::new(n);
        let fired = Rc::new(Cell::new(0));
        let f = Rc::clone(&fired);
        barrier.on_complete(move || f.set(f.get() + 1));
        for i in 0..n {
            prop_assert_eq!(fired.get(), 0, "fired early at tick {}", i);
            barrier.tick();
        }
        for _ in 0..extra {
            barrier.tick();
        }
        prop_assert_eq!(fired.get(), 1);
    }
}
