//! Reachability and execution ordering over the audio edge map.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use slotmap::SlotMap;

use crate::server::ExecToken;

use super::error::{GraphError, LoopSite};
use super::module::{Module, ModuleId};
use super::port::IoId;

/// Audio edges keyed by source outlet.
pub(crate) type AudioEdges = HashMap<IoId, Vec<IoId>>;

/// Distinct modules fed directly by `module`, in creation order.
pub(crate) fn successors(
    modules: &SlotMap<ModuleId, Module>,
    edges: &AudioEdges,
    module: ModuleId,
) -> Vec<ModuleId> {
    let mut found: Vec<(u64, ModuleId)> = edges
        .iter()
        .filter(|(from, _)| from.module == module)
        .flat_map(|(_, targets)| targets.iter().map(|t| t.module))
        .collect::<HashSet<_>>()
        .into_iter()
        .filter_map(|id| modules.get(id).map(|m| (m.seq(), id)))
        .collect();
    found.sort_unstable();
    found.into_iter().map(|(_, id)| id).collect()
}

/// Returns true if `target` is reachable from `start` along audio edges.
/// A module always reaches itself.
pub(crate) fn reaches(edges: &AudioEdges, start: ModuleId, target: ModuleId) -> bool {
    if start == target {
        return true;
    }
    let mut adjacency: HashMap<ModuleId, Vec<ModuleId>> = HashMap::new();
    for (from, targets) in edges {
        adjacency
            .entry(from.module)
            .or_default()
            .extend(targets.iter().map(|t| t.module));
    }

    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([start]);
    visited.insert(start);
    while let Some(current) = queue.pop_front() {
        let Some(next) = adjacency.get(&current) else {
            continue;
        };
        for &m in next {
            if m == target {
                return true;
            }
            if visited.insert(m) {
                queue.push_back(m);
            }
        }
    }
    false
}

/// Kahn's algorithm over the modules that have a real-time counterpart.
///
/// Logic-only modules are left out of the result, and only edges between two
/// real-time modules count toward in-degree. Ties are broken by creation
/// sequence, so the result depends only on the module set and the edge set,
/// not on the order edits were made in.
pub(crate) fn topological_order(
    modules: &SlotMap<ModuleId, Module>,
    edges: &AudioEdges,
) -> Result<Vec<ModuleId>, GraphError> {
    let realtime = |id: ModuleId| modules.get(id).is_some_and(|m| m.kind().is_realtime());

    let mut indegree: HashMap<ModuleId, usize> = modules
        .iter()
        .filter(|(_, m)| m.kind().is_realtime())
        .map(|(id, _)| (id, 0))
        .collect();
    let mut adjacency: HashMap<ModuleId, Vec<ModuleId>> = HashMap::new();
    for (from, targets) in edges {
        for to in targets {
            if !(realtime(from.module) && realtime(to.module)) {
                continue;
            }
            adjacency.entry(from.module).or_default().push(to.module);
            if let Some(d) = indegree.get_mut(&to.module) {
                *d += 1;
            }
        }
    }

    let seq = |id: ModuleId| modules.get(id).map_or(u64::MAX, Module::seq);
    let mut ready: BTreeSet<(u64, ModuleId)> = indegree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(id, _)| (seq(*id), *id))
        .collect();

    let total = indegree.len();
    let mut order = Vec::with_capacity(total);
    while let Some((_, id)) = ready.pop_first() {
        order.push(id);
        let Some(next) = adjacency.get(&id) else {
            continue;
        };
        for &m in next {
            if let Some(d) = indegree.get_mut(&m) {
                *d -= 1;
                if *d == 0 {
                    ready.insert((seq(m), m));
                }
            }
        }
    }

    if order.len() == total {
        Ok(order)
    } else {
        Err(GraphError::ConnectionLoop(LoopSite::Ordering {
            ordered: order.len(),
            total,
        }))
    }
}

/// Flattens an ordered module list into server tokens.
pub(crate) fn exec_tokens(modules: &SlotMap<ModuleId, Module>, order: &[ModuleId]) -> Vec<ExecToken> {
    let mut tokens = Vec::with_capacity(order.len());
    for id in order {
        if let Some(module) = modules.get(*id) {
            module.push_exec_tokens(&mut tokens);
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::template::ModuleTemplate;

    fn arena(kinds: &[ModuleTemplate]) -> (SlotMap<ModuleId, Module>, Vec<ModuleId>) {
        let mut modules = SlotMap::with_key();
        let mut ids = Vec::new();
        for (seq, t) in kinds.iter().enumerate() {
            let mut m = Module::from_template(t);
            let id = modules.insert_with_key(|id| {
                m.place(id, seq as u64);
                m
            });
            ids.push(id);
        }
        (modules, ids)
    }

    fn edge(edges: &mut AudioEdges, from: ModuleId, to: ModuleId) {
        edges
            .entry(IoId::new(from, "out"))
            .or_default()
            .push(IoId::new(to, "in"));
    }

    #[test]
    fn chain_orders_upstream_first() {
        let t = ModuleTemplate::realtime("v").inlet("in").outlet("out");
        let (modules, ids) = arena(&[t.clone(), t.clone(), t]);
        let mut edges = AudioEdges::new();
        // Created A, B, C but wired C -> B -> A.
        edge(&mut edges, ids[2], ids[1]);
        edge(&mut edges, ids[1], ids[0]);
        let order = topological_order(&modules, &edges).unwrap();
        assert_eq!(order, vec![ids[2], ids[1], ids[0]]);
    }

    #[test]
    fn independent_modules_follow_creation_order() {
        let t = ModuleTemplate::realtime("v").inlet("in").outlet("out");
        let (modules, ids) = arena(&[t.clone(), t.clone(), t]);
        let order = topological_order(&modules, &AudioEdges::new()).unwrap();
        assert_eq!(order, ids);
    }

    #[test]
    fn cycle_is_reported() {
        let t = ModuleTemplate::realtime("v").inlet("in").outlet("out");
        let (modules, ids) = arena(&[t.clone(), t]);
        let mut edges = AudioEdges::new();
        edge(&mut edges, ids[0], ids[1]);
        edge(&mut edges, ids[1], ids[0]);
        let err = topological_order(&modules, &edges).unwrap_err();
        assert_eq!(
            err,
            GraphError::ConnectionLoop(LoopSite::Ordering {
                ordered: 0,
                total: 2
            })
        );
    }

    #[test]
    fn logic_modules_are_left_out() {
        let rt = ModuleTemplate::realtime("v").inlet("in").outlet("out");
        let logic = ModuleTemplate::logic("l").inlet("in").outlet("out");
        let (modules, ids) = arena(&[rt.clone(), logic, rt]);
        let mut edges = AudioEdges::new();
        edge(&mut edges, ids[2], ids[1]);
        edge(&mut edges, ids[1], ids[0]);
        let order = topological_order(&modules, &edges).unwrap();
        assert_eq!(order, vec![ids[0], ids[2]]);
    }

    #[test]
    fn reachability() {
        let t = ModuleTemplate::realtime("v").inlet("in").outlet("out");
        let (modules, ids) = arena(&[t.clone(), t.clone(), t]);
        let mut edges = AudioEdges::new();
        edge(&mut edges, ids[0], ids[1]);
        edge(&mut edges, ids[1], ids[2]);
        assert!(reaches(&edges, ids[0], ids[2]));
        assert!(!reaches(&edges, ids[2], ids[0]));
        assert!(reaches(&edges, ids[1], ids[1]));
        assert_eq!(successors(&modules, &edges, ids[0]), vec![ids[1]]);
    }

    #[test]
    fn successors_follow_creation_order_across_outlets() {
        let src = ModuleTemplate::realtime("s").outlet("out").outlet("aux");
        let t = ModuleTemplate::realtime("v").inlet("in").outlet("out");
        let (modules, ids) = arena(&[src, t.clone(), t.clone(), t.clone(), t]);
        let mut edges = AudioEdges::new();
        for &to in &[ids[4], ids[2]] {
            edges
                .entry(IoId::new(ids[0], "aux"))
                .or_default()
                .push(IoId::new(to, "in"));
        }
        edge(&mut edges, ids[0], ids[3]);
        edge(&mut edges, ids[0], ids[1]);
        edge(&mut edges, ids[0], ids[2]);
        assert_eq!(
            successors(&modules, &edges, ids[0]),
            vec![ids[1], ids[2], ids[3], ids[4]]
        );
    }
}
