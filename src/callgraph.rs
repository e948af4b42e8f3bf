//! Call graph assembly from function_graph tracer output.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{BootgraphResult, LogFormat, Record, Tokenizer};

/// Graphs this long are abandoned as runaway.
const MAX_GRAPH_LINES: usize = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FuncKind {
    /// `name() {`
    Call,
    /// `}` or `} /* name */`
    Return,
    /// `name();`, a call with no children.
    Leaf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncLine {
    pub time: f64,
    pub depth: usize,
    pub kind: FuncKind,
    pub name: String,
    /// Seconds spent in the function when known.
    pub length: f64,
}

impl FuncLine {
    /// Reads the call column of a function_graph record. Trace event
    /// comments (`/* ... */`) and kprobe markers are not function lines.
    pub fn from_record(rec: &Record) -> Option<Self> {
        let body = rec.body.strip_prefix(' ').unwrap_or(&rec.body);
        let text = body.trim_start_matches(' ');
        let depth = (body.len() - text.len()) / 2;
        let text = text.trim_end();
        if text.is_empty() || (text.starts_with("/*") && text.ends_with("*/")) {
            return None;
        }
        let length = rec.duration.unwrap_or(0.0);
        let (kind, name) = if let Some(rest) = text.strip_prefix('}') {
            let name = rest
                .trim()
                .strip_prefix("/*")
                .and_then(|r| r.strip_suffix("*/"))
                .map(|n| n.trim().to_string())
                .unwrap_or_default();
            (FuncKind::Return, name)
        } else if text.ends_with('{') {
            (FuncKind::Call, call_name(text))
        } else if text.ends_with(';') {
            (FuncKind::Leaf, call_name(text))
        } else {
            return None;
        };
        Some(Self {
            time: rec.time,
            depth,
            kind,
            name,
            length,
        })
    }

    fn ends_at(&self) -> f64 {
        match self.kind {
            FuncKind::Leaf => self.time + self.length,
            _ => self.time,
        }
    }
}

fn call_name(text: &str) -> String {
    text.split('(').next().unwrap_or(text).trim().to_string()
}

/// Ordered function lines of one `(process, pid)` context, from a root call
/// to its matching return.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallGraph {
    pub proc: String,
    pub pid: u32,
    pub lines: Vec<FuncLine>,
    pub start: f64,
    pub end: f64,
    pub invalid: bool,
    depth: i64,
    closed: bool,
}

impl CallGraph {
    pub fn new(proc: impl Into<String>, pid: u32) -> Self {
        Self {
            proc: proc.into(),
            pid,
            lines: Vec::new(),
            start: 0.0,
            end: 0.0,
            invalid: false,
            depth: 0,
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Name of the root call, once known.
    pub fn root(&self) -> &str {
        self.lines.first().map_or("", |l| l.name.as_str())
    }

    pub fn span(&self) -> f64 {
        self.end - self.start
    }

    /// Appends `line` and reports whether it closed the graph (a return or
    /// leaf at depth zero). A line whose depth disagrees with the running
    /// nesting marks the graph invalid.
    pub fn add_line(&mut self, line: FuncLine) -> bool {
        if self.lines.len() >= MAX_GRAPH_LINES {
            self.invalid = true;
        }
        let expected = match line.kind {
            FuncKind::Return => line.depth as i64 + 1,
            FuncKind::Call | FuncKind::Leaf => line.depth as i64,
        };
        if expected != self.depth {
            self.invalid = true;
        }
        match line.kind {
            FuncKind::Call => self.depth += 1,
            FuncKind::Return => self.depth -= 1,
            FuncKind::Leaf => {}
        }
        if self.depth < 0 {
            self.invalid = true;
        }
        if self.lines.is_empty() {
            self.start = line.time;
            self.end = line.ends_at();
        } else {
            self.start = self.start.min(line.time);
            self.end = self.end.max(line.ends_at());
        }
        let closes =
            line.depth == 0 && matches!(line.kind, FuncKind::Return | FuncKind::Leaf);
        if self.lines.len() < MAX_GRAPH_LINES {
            self.lines.push(line);
        }
        if closes {
            self.closed = true;
        }
        closes
    }

    /// Checks call/return balance and fills in each call's length from its
    /// return. Returns false when the nesting does not balance.
    pub fn post_process(&mut self) -> bool {
        let mut stack: Vec<usize> = Vec::new();
        for idx in 0..self.lines.len() {
            match self.lines[idx].kind {
                FuncKind::Call => stack.push(idx),
                FuncKind::Return => {
                    let Some(open) = stack.pop() else {
                        return false;
                    };
                    let ret_time = self.lines[idx].time;
                    let call = &mut self.lines[open];
                    call.length = ret_time - call.time;
                    if self.lines[idx].name.is_empty() {
                        self.lines[idx].name = self.lines[open].name.clone();
                    }
                }
                FuncKind::Leaf => {}
            }
        }
        stack.is_empty()
    }
}

/// Why a sealed graph was not handed to the matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    Empty,
    Invalid,
    Unbalanced,
    TooShort,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssembleReport {
    pub lines: usize,
    pub records: usize,
    pub beyond_end: usize,
    pub empty: usize,
    pub invalid: usize,
    pub unbalanced: usize,
    pub too_short: usize,
}

impl AssembleReport {
    fn count(&mut self, reason: DiscardReason) {
        match reason {
            DiscardReason::Empty => self.empty += 1,
            DiscardReason::Invalid => self.invalid += 1,
            DiscardReason::Unbalanced => self.unbalanced += 1,
            DiscardReason::TooShort => self.too_short += 1,
        }
    }
}

/// Groups function lines by `(process, pid)` and splits each group into
/// consecutive call graphs.
#[derive(Debug, Default)]
pub struct CallGraphAssembler {
    groups: IndexMap<(String, u32), Vec<CallGraph>>,
}

impl CallGraphAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, proc: &str, pid: u32, line: FuncLine) {
        let graphs = self
            .groups
            .entry((proc.to_string(), pid))
            .or_insert_with(Vec::new);
        let needs_new = graphs.last().is_none_or(CallGraph::is_closed);
        if needs_new {
            graphs.push(CallGraph::new(proc, pid));
        }
        if let Some(current) = graphs.last_mut() {
            current.add_line(line);
        }
    }

    /// Seals every graph, keeping the ones that are non-empty, structurally
    /// sound and at least `min_secs` long. Group order is first-seen order.
    pub fn finish(self, min_secs: f64, report: &mut AssembleReport) -> Vec<CallGraph> {
        let mut out = Vec::new();
        for ((proc, pid), graphs) in self.groups {
            for mut cg in graphs {
                let verdict = if cg.lines.is_empty() {
                    Err(DiscardReason::Empty)
                } else if cg.invalid {
                    Err(DiscardReason::Invalid)
                } else if !cg.post_process() {
                    Err(DiscardReason::Unbalanced)
                } else if cg.span() < min_secs {
                    Err(DiscardReason::TooShort)
                } else {
                    Ok(())
                };
                match verdict {
                    Ok(()) => out.push(cg),
                    Err(reason) => {
                        if matches!(reason, DiscardReason::Invalid | DiscardReason::Unbalanced) {
                            tracing::warn!(
                                "sanity check failed for {proc}-{pid} ({} lines from {:.6})",
                                cg.lines.len(),
                                cg.start
                            );
                        }
                        report.count(reason);
                    }
                }
            }
        }
        out
    }
}

/// Assembles call graphs from a function_graph log, ignoring lines at or
/// after `end` (the end of the primary pass).
pub fn assemble_callgraphs<I>(
    lines: I,
    end: f64,
    min_secs: f64,
) -> BootgraphResult<(Vec<CallGraph>, AssembleReport)>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let tokenizer = Tokenizer::new()?;
    let mut assembler = CallGraphAssembler::new();
    let mut report = AssembleReport::default();
    for line in lines {
        report.lines += 1;
        let Some(rec) = tokenizer.tokenize(LogFormat::FunctionGraph, line.as_ref()) else {
            continue;
        };
        if rec.time >= end {
            report.beyond_end += 1;
            continue;
        }
        let Some(task) = rec.task.as_ref() else {
            continue;
        };
        let Some(fline) = FuncLine::from_record(&rec) else {
            continue;
        };
        report.records += 1;
        assembler.push(&task.proc, task.pid, fline);
    }
    let graphs = assembler.finish(min_secs, &mut report);
    tracing::debug!(?report, kept = graphs.len(), "call graph assembly finished");
    Ok((graphs, report))
}
