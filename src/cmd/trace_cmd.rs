//! Trace event timeline command (`bootgraph trace ...`).

use clap::Args;

use std::path::PathBuf;

use crate::{
    BootSummary, BootgraphError, BootgraphResult, Config, HostInfo, LogSource, RunMode,
    TraceFamilies, parse_trace_events,
};

#[derive(Debug, Clone, Default, Args)]
pub struct TraceArgs {
    /// Stored ftrace log recorded with trace events enabled.
    #[arg(long, value_name = "FILE")]
    pub ftrace: PathBuf,
    #[arg(long)]
    pub wakesource: bool,
    #[arg(long)]
    pub wakelock: bool,
    #[arg(long)]
    pub cpuidle: bool,
    #[arg(long)]
    pub cpufreq: bool,
    /// Html timeline output path.
    #[arg(long, value_name = "FILE")]
    pub html: Option<PathBuf>,
    /// Also write the timeline as json.
    #[arg(long = "timeline-json", value_name = "FILE")]
    pub timeline_json: Option<PathBuf>,
    /// Embed the raw log in the html output.
    #[arg(long)]
    pub addlogs: bool,
}

impl TraceArgs {
    /// Families named on the command line, or the configured ones when no
    /// flag was given.
    fn families(&self, config: &Config) -> TraceFamilies {
        let flags = TraceFamilies {
            wakesource: self.wakesource,
            wakelock: self.wakelock,
            cpuidle: self.cpuidle,
            cpufreq: self.cpufreq,
        };
        if flags.any() { flags } else { config.families }
    }
}

pub fn trace_command(config: &Config, args: &TraceArgs) -> BootgraphResult<BootSummary> {
    let mut config = config.clone();
    config.families = args.families(&config);
    config.add_logs |= args.addlogs;
    config.validate()?;
    if !config.families.any() {
        return Err(BootgraphError::InvalidArgument(
            "no trace event family enabled (use --wakesource, --wakelock, --cpuidle or --cpufreq)"
                .to_string(),
        ));
    }
    let html_path = args.html.clone().unwrap_or_else(|| config.html_file.clone());
    if html_path == args.ftrace {
        return Err(BootgraphError::InvalidArgument(
            "output filename collides with the ftrace input".to_string(),
        ));
    }

    let source = LogSource::file(&args.ftrace);
    let lines = source.read_lines()?;
    let parsed = parse_trace_events(&lines, &config)?;
    let data = parsed.data;
    tracing::info!(
        intervals = data.interval_count(),
        start = data.start,
        end = data.end,
        "trace event pass over {} finished",
        source.describe()
    );

    let mut summary = BootSummary::new(RunMode::Trace, HostInfo::detect(), source.describe(), &data, parsed.stats);
    if !data.valid {
        return Err(BootgraphError::NoData(format!(
            "no trace event intervals found in {}",
            args.ftrace.display()
        )));
    }
    super::boot_cmd::write_outputs(&data, &config, &summary.host, "tracegraph", &html_path, args.timeline_json.as_deref())?;
    summary.html_path = Some(html_path.display().to_string());
    summary.timeline_path = args.timeline_json.as_ref().map(|p| p.display().to_string());
    Ok(summary)
}
