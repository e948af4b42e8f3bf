//! Timeline store: phases of named intervals extracted from one log, plus the
//! JSON timeline artifact built from it.

use indexmap::IndexMap;
use serde::ser::Serializer as _;
use serde::{Deserialize, Serialize};

use std::fmt;
use std::path::Path;

use crate::fsutil::ensure_parent;
use crate::{BootgraphResult, CallGraph, TimeScale, color_for_name};

/// Display color of a phase band.
pub const PHASE_COLOR: &str = "#dddddd";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseKind {
    Boot,
    WakeSource,
    WakeLock,
    CpuIdle,
    CpuFreq,
}

impl PhaseKind {
    pub const TRACE_EVENTS: [PhaseKind; 4] = [
        PhaseKind::WakeSource,
        PhaseKind::WakeLock,
        PhaseKind::CpuIdle,
        PhaseKind::CpuFreq,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PhaseKind::Boot => "boot",
            PhaseKind::WakeSource => "wakesource",
            PhaseKind::WakeLock => "wakelock",
            PhaseKind::CpuIdle => "cpuidle",
            PhaseKind::CpuFreq => "cpufreq",
        }
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A completed, named span. Created when a close event finds its open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interval {
    pub id: String,
    pub name: String,
    pub start: f64,
    pub end: f64,
    pub pid: u32,
    pub parent: String,
    /// Free-form driver or extra-info tag.
    pub driver: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callgraph: Option<CallGraph>,
}

impl Interval {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn contains_span(&self, start: f64, end: f64) -> bool {
        self.start <= start && self.end >= end
    }
}

/// Input for [`BootData::new_action`].
#[derive(Debug, Clone, Default)]
pub struct NewInterval {
    pub name: String,
    pub start: f64,
    pub end: f64,
    pub pid: u32,
    pub parent: String,
    pub driver: String,
}

impl NewInterval {
    pub fn new(name: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            name: name.into(),
            start,
            end,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase {
    pub kind: PhaseKind,
    pub intervals: IndexMap<String, Interval>,
    pub start: Option<f64>,
    pub end: Option<f64>,
    pub color: String,
}

impl Phase {
    pub fn new(kind: PhaseKind) -> Self {
        Self {
            kind,
            intervals: IndexMap::new(),
            start: None,
            end: None,
            color: PHASE_COLOR.to_string(),
        }
    }

    /// Widens the phase span so it covers `[start, end]`.
    pub fn observe(&mut self, start: f64, end: f64) {
        self.start = Some(self.start.map_or(start, |s| s.min(start)));
        self.end = Some(self.end.map_or(end, |e| e.max(end)));
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Interval> {
        self.intervals.get(name)
    }

    /// Interval names ordered by start time, discovery order breaking ties.
    pub fn sorted_by_start(&self) -> Vec<&str> {
        let mut names: Vec<(f64, &str)> = self
            .intervals
            .values()
            .map(|i| (i.start, i.name.as_str()))
            .collect();
        names.sort_by(|a, b| a.0.total_cmp(&b.0));
        names.into_iter().map(|(_, n)| n).collect()
    }

    fn unique_name(&self, name: &str) -> String {
        if !self.intervals.contains_key(name) {
            return name.to_string();
        }
        let mut i = 2u32;
        loop {
            let candidate = format!("{name}[{i}]");
            if !self.intervals.contains_key(&candidate) {
                return candidate;
            }
            i += 1;
        }
    }
}

/// Everything extracted from one parse run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootData {
    pub phases: IndexMap<PhaseKind, Phase>,
    /// Tokenized lines, verbatim, in log order.
    pub log: Vec<String>,
    pub start: f64,
    pub end: f64,
    /// Timestamp of the last console line consumed before the pass ended.
    pub initstart: f64,
    pub valid: bool,
    pub boottime: Option<String>,
    pub kernel: Option<String>,
    id_prefix: String,
    next_id: u64,
}

impl BootData {
    pub fn new(phases: &[PhaseKind]) -> Self {
        Self {
            phases: phases.iter().map(|k| (*k, Phase::new(*k))).collect(),
            log: Vec::new(),
            start: 0.0,
            end: 0.0,
            initstart: 0.0,
            valid: false,
            boottime: None,
            kernel: None,
            id_prefix: "a".to_string(),
            next_id: 0,
        }
    }

    pub fn phase(&self, kind: PhaseKind) -> Option<&Phase> {
        self.phases.get(&kind)
    }

    pub fn phase_mut(&mut self, kind: PhaseKind) -> &mut Phase {
        self.phases.entry(kind).or_insert_with(|| Phase::new(kind))
    }

    /// Records an interval in `kind`, suffixing `[2]`, `[3]`, ... onto a name
    /// already taken in that phase. Returns the stored name.
    pub fn new_action(&mut self, kind: PhaseKind, action: NewInterval) -> String {
        self.next_id += 1;
        let id = format!("{}{}", self.id_prefix, self.next_id);
        let phase = self.phase_mut(kind);
        let name = phase.unique_name(&action.name);
        phase.observe(action.start, action.end);
        phase.intervals.insert(
            name.clone(),
            Interval {
                id,
                name: name.clone(),
                start: action.start,
                end: action.end,
                pid: action.pid,
                parent: action.parent,
                driver: action.driver,
                callgraph: None,
            },
        );
        self.valid = true;
        name
    }

    pub fn interval_count(&self) -> usize {
        self.phases.values().map(Phase::len).sum()
    }

    pub fn intervals(&self) -> impl Iterator<Item = (PhaseKind, &Interval)> {
        self.phases
            .values()
            .flat_map(|p| p.intervals.values().map(move |i| (p.kind, i)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub index: usize,
    pub phase: PhaseKind,
    pub id: String,
    pub name: String,
    pub start: f64,
    pub end: f64,
    pub duration: f64,
    pub color: String,
    pub left: f64,
    pub width: f64,
    pub pid: u32,
    pub parent: String,
    pub callgraph_lines: usize,
}

pub fn timeline_entries(data: &BootData) -> BootgraphResult<Vec<TimelineEntry>> {
    let scale = TimeScale::new(data.start, data.end)?;
    Ok(data
        .intervals()
        .enumerate()
        .map(|(index, (phase, i))| TimelineEntry {
            index,
            phase,
            id: i.id.clone(),
            name: i.name.clone(),
            start: i.start,
            end: i.end,
            duration: i.duration(),
            color: color_for_name(&i.name).hex.to_string(),
            left: scale.left(i.start),
            width: scale.width(i.start, i.end),
            pid: i.pid,
            parent: i.parent.clone(),
            callgraph_lines: i.callgraph.as_ref().map_or(0, |cg| cg.lines.len()),
        })
        .collect())
}

pub fn write_timeline(data: &BootData, out_path: &Path) -> BootgraphResult<()> {
    let entries = timeline_entries(data)?;
    ensure_parent(out_path)?;
    let mut buf = Vec::with_capacity(entries.len().saturating_mul(160));
    {
        let mut ser = serde_json::Serializer::pretty(&mut buf);
        use serde::ser::SerializeSeq as _;
        let mut seq = ser.serialize_seq(Some(entries.len()))?;
        for entry in &entries {
            seq.serialize_element(entry)?;
        }
        seq.end()?;
    }
    std::fs::write(out_path, buf)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colliding_names_get_numeric_suffixes() {
        let mut data = BootData::new(&[PhaseKind::Boot]);
        let a = data.new_action(PhaseKind::Boot, NewInterval::new("usb_probe", 0.1, 0.2));
        let b = data.new_action(PhaseKind::Boot, NewInterval::new("usb_probe", 0.3, 0.4));
        let c = data.new_action(PhaseKind::Boot, NewInterval::new("usb_probe", 0.5, 0.6));
        assert_eq!(a, "usb_probe");
        assert_eq!(b, "usb_probe[2]");
        assert_eq!(c, "usb_probe[3]");
        let phase = data.phase(PhaseKind::Boot).expect("boot");
        let names: Vec<&str> = phase.intervals.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["usb_probe", "usb_probe[2]", "usb_probe[3]"]);
        assert_eq!(phase.get("usb_probe[2]").expect("second").start, 0.3);
    }

    #[test]
    fn suffix_skips_names_already_present() {
        let mut data = BootData::new(&[PhaseKind::Boot]);
        data.new_action(PhaseKind::Boot, NewInterval::new("x[2]", 0.0, 0.1));
        data.new_action(PhaseKind::Boot, NewInterval::new("x", 0.0, 0.1));
        let third = data.new_action(PhaseKind::Boot, NewInterval::new("x", 0.0, 0.1));
        assert_eq!(third, "x[3]");
    }

    #[test]
    fn ids_increase_across_phases() {
        let mut data = BootData::new(&PhaseKind::TRACE_EVENTS);
        data.new_action(PhaseKind::WakeLock, NewInterval::new("a", 0.0, 1.0));
        data.new_action(PhaseKind::CpuFreq, NewInterval::new("b", 0.0, 1.0));
        let ids: Vec<String> = data.intervals().map(|(_, i)| i.id.clone()).collect();
        assert_eq!(ids, vec!["a1".to_string(), "a2".to_string()]);
        assert!(data.valid);
    }

    #[test]
    fn phase_span_only_widens() {
        let mut phase = Phase::new(PhaseKind::Boot);
        phase.observe(1.0, 2.0);
        phase.observe(1.5, 1.8);
        assert_eq!((phase.start, phase.end), (Some(1.0), Some(2.0)));
        phase.observe(0.5, 3.0);
        assert_eq!((phase.start, phase.end), (Some(0.5), Some(3.0)));
    }

    #[test]
    fn sorted_by_start_orders_names() {
        let mut data = BootData::new(&[PhaseKind::Boot]);
        data.new_action(PhaseKind::Boot, NewInterval::new("late", 2.0, 3.0));
        data.new_action(PhaseKind::Boot, NewInterval::new("early", 1.0, 3.0));
        let phase = data.phase(PhaseKind::Boot).expect("boot");
        assert_eq!(phase.sorted_by_start(), vec!["early", "late"]);
    }

    #[test]
    fn timeline_entries_scale_to_percentages() {
        let mut data = BootData::new(&[PhaseKind::Boot]);
        data.new_action(PhaseKind::Boot, NewInterval::new("foo", 1.0, 2.0));
        data.start = 0.0;
        data.end = 4.0;
        let entries = timeline_entries(&data).expect("entries");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].left, 25.0);
        assert_eq!(entries[0].width, 25.0);
        assert_eq!(entries[0].phase, PhaseKind::Boot);
        assert_eq!(entries[0].duration, 1.0);
    }

    #[test]
    fn timeline_entries_reject_zero_span() {
        let data = BootData::new(&[PhaseKind::Boot]);
        assert!(matches!(
            timeline_entries(&data),
            Err(crate::BootgraphError::NoTimeline { .. })
        ));
    }

    #[test]
    fn write_timeline_creates_missing_directories() {
        let dir = std::env::temp_dir().join(format!("bootgraph-timeline-{}", uuid::Uuid::new_v4()));
        let out = dir.join("nested/out/timeline.json");
        let mut data = BootData::new(&[PhaseKind::Boot]);
        data.new_action(PhaseKind::Boot, NewInterval::new("foo", 1.0, 2.0));
        data.end = 2.0;
        write_timeline(&data, &out).expect("write");
        let parsed: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&out).expect("read")).expect("json");
        assert_eq!(parsed[0]["name"], "foo");
    }
}
