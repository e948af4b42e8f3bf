//! Line grammars for kernel console logs and ftrace output.
//!
//! Every recognizer returns `None` for lines it does not understand; a noisy
//! log is expected and unparseable lines are never errors.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::BootgraphResult;

/// `[    1.234567] message`, after any prefix before the first `[`.
const CONSOLE_LINE_RE: &str = r"^\[ *(?P<ktime>[0-9]+\.[0-9]+)\] (?P<msg>.*)$";

/// `<proc>-<pid> [<cpu>] <flags> <seconds>.<fraction>: <message>` as written by
/// the nop tracer with trace events enabled. The flags column is optional.
const TRACE_EVENT_RE: &str = concat!(
    r"^\s*(?P<proc>.+)-(?P<pid>[0-9]+)\s+\[(?P<cpu>[0-9]+)\]\s+",
    r"(?:(?P<flags>\S+)\s+)?(?P<time>[0-9]+\.[0-9]+):\s*(?P<msg>.*)$",
);

/// `<time> | <cpu>) <proc>-<pid> | <duration> us | <call>` as written by the
/// function_graph tracer with `funcgraph-abstime` and `funcgraph-proc`.
const FUNCTION_GRAPH_RE: &str = concat!(
    r"^\s*(?P<time>[0-9]+\.[0-9]+)\s*\|\s*(?P<cpu>[0-9]+)\)\s*(?P<proc>.+)-(?P<pid>[0-9]+)\s*\|",
    r"[ +!#*@$]*(?P<dur>[0-9.]*)[ *us]*\s*\|(?P<msg>.*)$",
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Console,
    TraceEvent,
    FunctionGraph,
}

/// Execution context columns carried by ftrace lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskContext {
    pub proc: String,
    pub pid: u32,
    pub cpu: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub format: LogFormat,
    /// Seconds since the log-wide time origin.
    pub time: f64,
    pub body: String,
    pub task: Option<TaskContext>,
    /// Function duration column in seconds (function_graph only).
    pub duration: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Tokenizer {
    console: Regex,
    trace_event: Regex,
    function_graph: Regex,
}

impl Tokenizer {
    pub fn new() -> BootgraphResult<Self> {
        Ok(Self {
            console: Regex::new(CONSOLE_LINE_RE)?,
            trace_event: Regex::new(TRACE_EVENT_RE)?,
            function_graph: Regex::new(FUNCTION_GRAPH_RE)?,
        })
    }

    pub fn tokenize(&self, format: LogFormat, line: &str) -> Option<Record> {
        match format {
            LogFormat::Console => self.console(line),
            LogFormat::TraceEvent => self.trace_event(line),
            LogFormat::FunctionGraph => self.function_graph(line),
        }
    }

    pub fn console(&self, line: &str) -> Option<Record> {
        let line = strip_line_ending(line);
        let line = &line[line.find('[')?..];
        let caps = self.console.captures(line)?;
        let time = parse_seconds(&caps["ktime"])?;
        Some(Record {
            format: LogFormat::Console,
            time,
            body: caps["msg"].to_string(),
            task: None,
            duration: None,
        })
    }

    pub fn trace_event(&self, line: &str) -> Option<Record> {
        let line = strip_line_ending(line);
        if is_comment(line) {
            return None;
        }
        let caps = self.trace_event.captures(line)?;
        Some(Record {
            format: LogFormat::TraceEvent,
            time: parse_seconds(&caps["time"])?,
            body: caps["msg"].to_string(),
            task: Some(TaskContext {
                proc: caps["proc"].trim().to_string(),
                pid: caps["pid"].parse().ok()?,
                cpu: caps["cpu"].parse().ok()?,
            }),
            duration: None,
        })
    }

    pub fn function_graph(&self, line: &str) -> Option<Record> {
        let line = strip_line_ending(line);
        if is_comment(line) {
            return None;
        }
        let caps = self.function_graph.captures(line)?;
        let duration = match &caps["dur"] {
            "" => None,
            usecs => Some(usecs.parse::<f64>().ok()? / 1_000_000.0),
        };
        Some(Record {
            format: LogFormat::FunctionGraph,
            time: parse_seconds(&caps["time"])?,
            body: caps["msg"].to_string(),
            task: Some(TaskContext {
                proc: caps["proc"].trim().to_string(),
                pid: caps["pid"].parse().ok()?,
                cpu: caps["cpu"].parse().ok()?,
            }),
            duration,
        })
    }
}

/// Reads the tracer name from a `# tracer: <name>` header line.
pub fn tracer_header(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix('#')?.trim_start();
    let name = rest.strip_prefix("tracer:")?.trim();
    if name.is_empty() { None } else { Some(name) }
}

fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

fn strip_line_ending(line: &str) -> &str {
    line.trim_end_matches(['\r', '\n'])
}

fn parse_seconds(s: &str) -> Option<f64> {
    let v = s.parse::<f64>().ok()?;
    v.is_finite().then_some(v)
}
