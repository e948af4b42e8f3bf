//! Open/close pairing for every event family.
//!
//! Two passes live here. The console pass pairs `calling`/`initcall` lines
//! into the boot phase. The trace-event pass pairs wakeup source, wakelock
//! and cpu idle events and emits one short interval per cpu frequency change.

use regex::Regex;
use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::{Duration, PrimitiveDateTime};

use crate::{
    BootData, BootgraphResult, Config, LogFormat, NewInterval, PendingTable, PhaseKind, Record,
    TraceFamilies, Tokenizer, kernel_version,
};

/// Counters describing what a pass absorbed instead of emitting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassStats {
    pub lines: usize,
    pub records: usize,
    pub intervals: usize,
    /// Close events with no pending open.
    pub unmatched_closes: usize,
    /// Opens that replaced a still-pending open for the same key.
    pub overwritten_opens: usize,
    /// Opens still waiting for a close when the pass ended.
    pub pending_at_end: usize,
    /// Closes timestamped before their open.
    pub reversed: usize,
}

#[derive(Debug, Clone)]
pub struct ParseOutput {
    pub data: BootData,
    pub stats: PassStats,
}

struct ConsolePatterns {
    calling: Regex,
    initcall: Regex,
    clock: Regex,
}

impl ConsolePatterns {
    fn new() -> BootgraphResult<Self> {
        Ok(Self {
            calling: Regex::new(r"^calling *(?P<f>.*)\+")?,
            initcall: Regex::new(r"^initcall *(?P<f>.*)\+")?,
            clock: Regex::new(
                r"setting system clock to (?P<t>[0-9]{4}-[0-9]{2}-[0-9]{2} [0-9]{2}:[0-9]{2}:[0-9]{2}) UTC",
            )?,
        })
    }
}

/// Pairs initcall markers from a kernel console log into the boot phase.
///
/// The pass stops at the first line at or beyond `config.cutoff_secs`, or
/// after the "Freeing unused kernel memory" marker.
pub fn parse_console_log<I>(lines: I, config: &Config) -> BootgraphResult<ParseOutput>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let tokenizer = Tokenizer::new()?;
    let patterns = ConsolePatterns::new()?;
    let mut data = BootData::new(&[PhaseKind::Boot]);
    let mut pending = PendingTable::<String>::new();
    let mut stats = PassStats::default();

    for line in lines {
        let line = line.as_ref();
        stats.lines += 1;
        let Some(rec) = tokenizer.tokenize(LogFormat::Console, line) else {
            continue;
        };
        if rec.time >= config.cutoff_secs {
            tracing::debug!("console pass reached cutoff {}s at {}s", config.cutoff_secs, rec.time);
            break;
        }
        stats.records += 1;
        data.end = rec.time;
        data.initstart = rec.time;
        data.log.push(line.trim_end_matches(['\r', '\n']).to_string());
        let msg = rec.body.as_str();

        if rec.time == 0.0 && msg.starts_with("Linux version ") {
            if data.kernel.is_none() {
                data.kernel = kernel_version(msg).map(ToString::to_string);
            }
            continue;
        }
        if let Some(caps) = patterns.clock.captures(msg) {
            match boot_wallclock(&caps["t"], rec.time) {
                Some(bt) => data.boottime = Some(bt),
                None => tracing::debug!("unparseable system clock in {msg:?}"),
            }
            continue;
        }
        if let Some(caps) = patterns.calling.captures(msg) {
            data.phase_mut(PhaseKind::Boot).observe(rec.time, rec.time);
            pending.open(caps["f"].trim().to_string(), rec.time);
            continue;
        }
        if let Some(caps) = patterns.initcall.captures(msg) {
            let f = caps["f"].trim().to_string();
            match pending.close(&f) {
                Some(start) if start <= rec.time => {
                    data.new_action(PhaseKind::Boot, NewInterval::new(f, start, rec.time));
                    stats.intervals += 1;
                }
                Some(_) => stats.reversed += 1,
                None => stats.unmatched_closes += 1,
            }
            continue;
        }
        if msg.starts_with("Freeing unused kernel memory") {
            break;
        }
    }

    stats.overwritten_opens = pending.overwritten();
    stats.pending_at_end = pending.len();
    tracing::debug!(?stats, "console pass finished");
    Ok(ParseOutput { data, stats })
}

/// `clock - trunc(ktime)` rendered as `YYYY-MM-DD_HH:MM:SS`.
fn boot_wallclock(clock: &str, ktime: f64) -> Option<String> {
    let at = PrimitiveDateTime::parse(
        clock,
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    )
    .ok()?;
    let boot = at.checked_sub(Duration::seconds(ktime.trunc() as i64))?;
    boot.format(format_description!("[year]-[month]-[day]_[hour]:[minute]:[second]"))
        .ok()
}

const IDLE_WFI: &str = "WFI";
const IDLE_POWEROFF: &str = "POWEROFF";

struct TracePatterns {
    wakesource_activate: Regex,
    wakesource_deactivate: Regex,
    wake_lock: Regex,
    wake_unlock: Regex,
    cpu_idle: Regex,
    cpu_frequency: Regex,
}

impl TracePatterns {
    fn new() -> BootgraphResult<Self> {
        Ok(Self {
            wakesource_activate: Regex::new(r"^wakeup_source_activate: *(?P<f>.*) ")?,
            wakesource_deactivate: Regex::new(r"^wakeup_source_deactivate: *(?P<f>.*) ")?,
            wake_lock: Regex::new(r"^pm_wake_lock: *(?P<f>.*)")?,
            wake_unlock: Regex::new(r"^pm_wake_unlock: *(?P<f>.*)")?,
            cpu_idle: Regex::new(r"^cpu_idle: state=(?P<state>[0-9]+) *cpu_id=(?P<f>.*)")?,
            cpu_frequency: Regex::new(r"^cpu_frequency: state=(?P<freq>[0-9]+) *cpu_id=(?P<f>.*)")?,
        })
    }
}

/// Trace-event pass state. Each family keeps its own pending table so keys
/// from different families never collide.
pub struct TraceEventPairer {
    patterns: TracePatterns,
    families: TraceFamilies,
    cpufreq_width: f64,
    data: BootData,
    wakesource: PendingTable<String>,
    wakelock: PendingTable<String>,
    cpuidle: PendingTable<String, (f64, &'static str)>,
    first_event: Option<f64>,
    stats: PassStats,
}

impl TraceEventPairer {
    pub fn new(config: &Config) -> BootgraphResult<Self> {
        Ok(Self {
            patterns: TracePatterns::new()?,
            families: config.families,
            cpufreq_width: config.cpufreq_width_secs,
            data: BootData::new(&PhaseKind::TRACE_EVENTS),
            wakesource: PendingTable::new(),
            wakelock: PendingTable::new(),
            cpuidle: PendingTable::new(),
            first_event: None,
            stats: PassStats::default(),
        })
    }

    pub fn feed(&mut self, line: &str, rec: &Record) {
        self.stats.records += 1;
        self.data.end = self.data.end.max(rec.time);
        self.data.initstart = rec.time;
        self.data.log.push(line.trim_end_matches(['\r', '\n']).to_string());
        let pid = rec.task.as_ref().map_or(0, |t| t.pid);
        let msg = rec.body.as_str();

        if self.families.wakesource && self.wakesource_event(msg, rec.time, pid) {
            return;
        }
        if self.families.wakelock && self.wakelock_event(msg, rec.time, pid) {
            return;
        }
        if self.families.cpuidle && self.cpuidle_event(msg, rec.time, pid) {
            return;
        }
        if self.families.cpufreq {
            self.cpufreq_event(msg, rec.time, pid);
        }
    }

    pub fn pending(&self) -> usize {
        self.wakesource.len() + self.wakelock.len() + self.cpuidle.len()
    }

    pub fn finish(mut self) -> ParseOutput {
        self.data.start = self.first_event.unwrap_or(0.0);
        self.stats.overwritten_opens =
            self.wakesource.overwritten() + self.wakelock.overwritten() + self.cpuidle.overwritten();
        self.stats.pending_at_end = self.pending();
        tracing::debug!(stats = ?self.stats, "trace event pass finished");
        ParseOutput {
            data: self.data,
            stats: self.stats,
        }
    }

    fn mark_event(&mut self, kind: PhaseKind, t: f64) {
        self.first_event.get_or_insert(t);
        self.data.phase_mut(kind).observe(t, t);
    }

    fn emit(&mut self, kind: PhaseKind, name: String, start: f64, end: f64, pid: u32) {
        if end < start {
            self.stats.reversed += 1;
            return;
        }
        let action = NewInterval {
            pid,
            ..NewInterval::new(name, start, end)
        };
        self.data.new_action(kind, action);
        self.data.end = self.data.end.max(end);
        self.stats.intervals += 1;
    }

    fn wakesource_event(&mut self, msg: &str, t: f64, pid: u32) -> bool {
        if let Some(caps) = self.patterns.wakesource_activate.captures(msg) {
            let name = caps["f"].trim().to_string();
            self.mark_event(PhaseKind::WakeSource, t);
            self.wakesource.open(name, t);
            return true;
        }
        if let Some(caps) = self.patterns.wakesource_deactivate.captures(msg) {
            let name = caps["f"].trim().to_string();
            match self.wakesource.close(&name) {
                Some(start) => self.emit(PhaseKind::WakeSource, name, start, t, pid),
                None => self.stats.unmatched_closes += 1,
            }
            return true;
        }
        false
    }

    fn wakelock_event(&mut self, msg: &str, t: f64, pid: u32) -> bool {
        if let Some(caps) = self.patterns.wake_lock.captures(msg) {
            let name = caps["f"].trim().to_string();
            self.mark_event(PhaseKind::WakeLock, t);
            self.wakelock.open(name, t);
            return true;
        }
        if let Some(caps) = self.patterns.wake_unlock.captures(msg) {
            let name = caps["f"].trim().to_string();
            match self.wakelock.close(&name) {
                Some(start) => self.emit(PhaseKind::WakeLock, name, start, t, pid),
                None => self.stats.unmatched_closes += 1,
            }
            return true;
        }
        false
    }

    fn cpuidle_event(&mut self, msg: &str, t: f64, pid: u32) -> bool {
        let Some(caps) = self.patterns.cpu_idle.captures(msg) else {
            return false;
        };
        let cpu = caps["f"].trim().to_string();
        let Ok(state) = caps["state"].parse::<u64>() else {
            return true;
        };
        self.mark_event(PhaseKind::CpuIdle, t);
        match state {
            0 => self.cpuidle.open(cpu, (t, IDLE_WFI)),
            1 => self.cpuidle.open(cpu, (t, IDLE_POWEROFF)),
            _ => match self.cpuidle.close(&cpu) {
                Some((start, label)) => {
                    self.emit(PhaseKind::CpuIdle, format!("{cpu}-{label}"), start, t, pid)
                }
                None => self.stats.unmatched_closes += 1,
            },
        }
        true
    }

    fn cpufreq_event(&mut self, msg: &str, t: f64, pid: u32) {
        let Some(caps) = self.patterns.cpu_frequency.captures(msg) else {
            return;
        };
        let name = format!("{}-{}", caps["f"].trim(), &caps["freq"]);
        self.mark_event(PhaseKind::CpuFreq, t);
        self.emit(PhaseKind::CpuFreq, name, t, t + self.cpufreq_width, pid);
    }
}

/// Runs the trace-event pass over an ftrace log captured with the nop tracer.
pub fn parse_trace_events<I>(lines: I, config: &Config) -> BootgraphResult<ParseOutput>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let tokenizer = Tokenizer::new()?;
    let mut pairer = TraceEventPairer::new(config)?;
    let mut lines_seen = 0usize;
    for line in lines {
        let line = line.as_ref();
        lines_seen += 1;
        if let Some(rec) = tokenizer.tokenize(LogFormat::TraceEvent, line) {
            pairer.feed(line, &rec);
        }
    }
    let mut out = pairer.finish();
    out.stats.lines = lines_seen;
    Ok(out)
}
