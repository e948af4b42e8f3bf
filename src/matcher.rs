//! Attaches call graphs to the intervals whose span contains them.

use serde::{Deserialize, Serialize};

use crate::{BootData, CallGraph, PhaseKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmatchedGraph {
    pub root: String,
    pub proc: String,
    pub pid: u32,
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchReport {
    pub matched: usize,
    pub unmatched: Vec<UnmatchedGraph>,
}

/// For each graph, attaches it to the first interval (phase order, then
/// discovery order) with `start <= graph.start` and `end >= graph.end` that
/// does not already carry a graph. Graphs with no such interval are reported.
pub fn match_callgraphs(
    data: &mut BootData,
    graphs: Vec<CallGraph>,
    phases: &[PhaseKind],
) -> MatchReport {
    let mut report = MatchReport::default();
    'graphs: for cg in graphs {
        for kind in phases {
            let Some(phase) = data.phases.get_mut(kind) else {
                continue;
            };
            let found = phase
                .intervals
                .values_mut()
                .find(|i| i.callgraph.is_none() && i.contains_span(cg.start, cg.end));
            if let Some(interval) = found {
                tracing::trace!("call graph {} attached to {}", cg.root(), interval.name);
                interval.callgraph = Some(cg);
                report.matched += 1;
                continue 'graphs;
            }
        }
        tracing::warn!(
            "BAD: {} {}-{} [{:.6} - {:.6}] has no containing interval",
            cg.root(),
            cg.proc,
            cg.pid,
            cg.start,
            cg.end
        );
        report.unmatched.push(UnmatchedGraph {
            root: cg.root().to_string(),
            proc: cg.proc.clone(),
            pid: cg.pid,
            start: cg.start,
            end: cg.end,
        });
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CallGraph, FuncKind, FuncLine, NewInterval};

    fn graph(root: &str, start: f64, end: f64) -> CallGraph {
        let mut cg = CallGraph::new("swapper/0", 1);
        cg.add_line(FuncLine {
            time: start,
            depth: 0,
            kind: FuncKind::Call,
            name: root.to_string(),
            length: 0.0,
        });
        cg.add_line(FuncLine {
            time: end,
            depth: 0,
            kind: FuncKind::Return,
            name: String::new(),
            length: 0.0,
        });
        cg
    }

    fn boot_data() -> BootData {
        let mut data = BootData::new(&[PhaseKind::Boot]);
        data.new_action(PhaseKind::Boot, NewInterval::new("first", 1.0, 2.0));
        data.new_action(PhaseKind::Boot, NewInterval::new("second", 3.0, 4.0));
        data
    }

    #[test]
    fn graph_inside_interval_attaches() {
        let mut data = boot_data();
        let report = match_callgraphs(&mut data, vec![graph("g", 3.1, 3.9)], &[PhaseKind::Boot]);
        assert_eq!(report.matched, 1);
        assert!(report.unmatched.is_empty());
        let boot = data.phase(PhaseKind::Boot).expect("boot");
        assert!(boot.get("first").expect("first").callgraph.is_none());
        assert_eq!(
            boot.get("second").expect("second").callgraph.as_ref().map(CallGraph::root),
            Some("g")
        );
    }

    #[test]
    fn bounds_are_inclusive() {
        let mut data = boot_data();
        let report = match_callgraphs(&mut data, vec![graph("g", 1.0, 2.0)], &[PhaseKind::Boot]);
        assert_eq!(report.matched, 1);
    }

    #[test]
    fn graph_outside_every_interval_is_reported() {
        let mut data = boot_data();
        let report = match_callgraphs(&mut data, vec![graph("g", 1.5, 3.5)], &[PhaseKind::Boot]);
        assert_eq!(report.matched, 0);
        assert_eq!(report.unmatched.len(), 1);
        assert_eq!(report.unmatched[0].root, "g");
        assert!(data.intervals().all(|(_, i)| i.callgraph.is_none()));
    }

    #[test]
    fn interval_takes_at_most_one_graph() {
        let mut data = boot_data();
        let report = match_callgraphs(
            &mut data,
            vec![graph("g1", 1.1, 1.2), graph("g2", 1.3, 1.4)],
            &[PhaseKind::Boot],
        );
        assert_eq!(report.matched, 1);
        assert_eq!(report.unmatched.len(), 1);
        assert_eq!(report.unmatched[0].root, "g2");
    }

    #[test]
    fn phases_outside_the_scan_set_are_ignored() {
        let mut data = BootData::new(&[PhaseKind::Boot, PhaseKind::WakeLock]);
        data.new_action(PhaseKind::WakeLock, NewInterval::new("lock", 0.0, 10.0));
        let report = match_callgraphs(&mut data, vec![graph("g", 1.0, 2.0)], &[PhaseKind::Boot]);
        assert_eq!(report.unmatched.len(), 1);
    }
}
