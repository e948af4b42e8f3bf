//! Boot timeline command (`bootgraph boot ...`).

use clap::Args;
use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::{
    AssembleReport, BootData, BootgraphError, BootgraphResult, Config, HostInfo, LogSource,
    MatchReport, PassStats, RenderOptions, TRACEFS_DIRS, assemble_callgraphs, find_tracefs,
    match_callgraphs, parse_console_log, render_html, tracer_header, verify_tracefs, write_text,
    write_timeline,
};

#[derive(Debug, Clone, Default, Args)]
pub struct BootArgs {
    /// Load a stored dmesg file instead of reading the live ring buffer.
    #[arg(long, value_name = "FILE")]
    pub dmesg: Option<PathBuf>,
    /// Load a stored function_graph trace (implies --callgraph).
    #[arg(long, value_name = "FILE")]
    pub ftrace: Option<PathBuf>,
    /// Attach function_graph call graphs to initcalls.
    #[arg(short = 'f', long)]
    pub callgraph: bool,
    /// Discard call graphs shorter than this many milliseconds.
    #[arg(long, value_name = "MS")]
    pub mincg: Option<f64>,
    /// Stop the initcall pass at this kernel timestamp.
    #[arg(long, value_name = "SECS")]
    pub cutoff: Option<f64>,
    /// Html timeline output path.
    #[arg(long, value_name = "FILE")]
    pub html: Option<PathBuf>,
    /// Also write the timeline as json.
    #[arg(long = "timeline-json", value_name = "FILE")]
    pub timeline_json: Option<PathBuf>,
    /// Embed the raw log in the html output.
    #[arg(long)]
    pub addlogs: bool,
    /// Write a one-line pass/initstart/end/boot status file.
    #[arg(long = "status-out", value_name = "FILE")]
    pub status_out: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Boot,
    Trace,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallGraphSummary {
    pub source: String,
    pub assembled: AssembleReport,
    pub matched: usize,
    pub unmatched: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootSummary {
    pub mode: RunMode,
    pub host: HostInfo,
    pub source: String,
    pub kernel: Option<String>,
    pub boottime: Option<String>,
    pub valid: bool,
    pub start_ms: f64,
    pub end_ms: f64,
    pub initstart_ms: f64,
    pub total_ms: f64,
    pub intervals: BTreeMap<String, usize>,
    pub pass: PassStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callgraphs: Option<CallGraphSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeline_path: Option<String>,
}

impl BootSummary {
    pub fn new(mode: RunMode, host: HostInfo, source: String, data: &BootData, pass: PassStats) -> Self {
        Self {
            mode,
            host,
            source,
            kernel: data.kernel.clone(),
            boottime: data.boottime.clone(),
            valid: data.valid,
            start_ms: data.start * 1000.0,
            end_ms: data.end * 1000.0,
            initstart_ms: data.initstart * 1000.0,
            total_ms: (data.end - data.start) * 1000.0,
            intervals: data
                .phases
                .values()
                .map(|p| (p.kind.to_string(), p.len()))
                .collect(),
            pass,
            callgraphs: None,
            html_path: None,
            timeline_path: None,
        }
    }

    /// `pass <valid> initstart <ms> end <ms> boot <boottime>`.
    pub fn status_line(&self) -> String {
        format!(
            "pass {} initstart {:.3} end {:.3} boot {}",
            self.valid,
            self.initstart_ms,
            self.end_ms,
            self.boottime.as_deref().unwrap_or("")
        )
    }
}

pub fn boot_command(config: &Config, args: &BootArgs) -> BootgraphResult<BootSummary> {
    let mut config = config.clone();
    if let Some(cutoff) = args.cutoff {
        config.cutoff_secs = cutoff;
    }
    if let Some(ms) = args.mincg {
        config.min_callgraph_secs = ms / 1000.0;
    }
    config.add_logs |= args.addlogs;
    config.validate()?;
    let html_path = args.html.clone().unwrap_or_else(|| config.html_file.clone());
    if args.dmesg.as_deref() == Some(html_path.as_path()) {
        return Err(BootgraphError::InvalidArgument(
            "output filename collides with the dmesg input".to_string(),
        ));
    }

    let source = args.dmesg.as_ref().map_or_else(LogSource::dmesg, LogSource::file);
    let lines = source.read_lines()?;
    let parsed = parse_console_log(&lines, &config)?;
    let mut data = parsed.data;
    tracing::info!(
        intervals = data.interval_count(),
        end = data.end,
        "initcall pass over {} finished",
        source.describe()
    );

    let callgraphs = if args.callgraph || args.ftrace.is_some() {
        Some(attach_callgraphs(&mut data, args.ftrace.as_deref(), &config)?)
    } else {
        None
    };

    let mut summary = BootSummary::new(RunMode::Boot, HostInfo::detect(), source.describe(), &data, parsed.stats);
    summary.callgraphs = callgraphs;
    if let Some(path) = &args.status_out {
        write_text(path, &format!("{}\n", summary.status_line()))?;
    }
    if !data.valid {
        return Err(BootgraphError::NoData(match &args.dmesg {
            Some(path) => format!("no initcall data found in {}", path.display()),
            None => "no initcall data found, is initcall_debug enabled?".to_string(),
        }));
    }

    write_outputs(&data, &config, &summary.host, "bootgraph", &html_path, args.timeline_json.as_deref())?;
    summary.html_path = Some(html_path.display().to_string());
    summary.timeline_path = args.timeline_json.as_ref().map(|p| p.display().to_string());
    Ok(summary)
}

fn attach_callgraphs(
    data: &mut BootData,
    ftrace: Option<&Path>,
    config: &Config,
) -> BootgraphResult<CallGraphSummary> {
    let source = match ftrace {
        Some(path) => LogSource::file(path),
        None => {
            let tracefs = find_tracefs(&TRACEFS_DIRS)?;
            verify_tracefs(&tracefs)?;
            LogSource::tracefs(&tracefs)
        }
    };
    let lines = source.read_lines()?;
    if let Some(tracer) = lines.iter().find_map(|l| tracer_header(l)) {
        if tracer != "function_graph" {
            return Err(BootgraphError::Trace(format!(
                "{} was recorded with the {tracer} tracer, expected function_graph",
                source.describe()
            )));
        }
    }
    let (graphs, assembled) = assemble_callgraphs(&lines, data.end, config.min_callgraph_secs)?;
    let MatchReport { matched, unmatched } = match_callgraphs(data, graphs, &config.callgraph_phases);
    Ok(CallGraphSummary {
        source: source.describe(),
        assembled,
        matched,
        unmatched: unmatched.len(),
    })
}

pub(crate) fn write_outputs(
    data: &BootData,
    config: &Config,
    host: &HostInfo,
    title: &str,
    html_path: &Path,
    timeline_json: Option<&Path>,
) -> BootgraphResult<()> {
    let html = render_html(
        data,
        &RenderOptions {
            title,
            host,
            add_logs: config.add_logs,
        },
    )?;
    write_text(html_path, &html)?;
    if let Some(path) = timeline_json {
        write_timeline(data, path)?;
    }
    Ok(())
}
