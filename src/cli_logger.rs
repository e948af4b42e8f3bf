use anyhow::Result;
use bootgraph::{BootSummary, RunMode};

pub struct CliLogger {
    json: bool,
    no_color: bool,
}

impl CliLogger {
    pub fn new(json: bool, no_color: bool) -> Self {
        Self { json, no_color }
    }

    pub fn print_run_summary(&self, summary: &BootSummary) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string(summary)?);
            return Ok(());
        }

        let mode = match summary.mode {
            RunMode::Boot => "boot",
            RunMode::Trace => "trace",
        };
        let mut out = String::new();
        out.push_str(&format!(
            "{} {} {}\n",
            self.style("bootgraph", "36;1"),
            self.style(mode, "37;1"),
            self.style(&summary.source, "90")
        ));
        out.push_str(&format!("{} {}\n", self.style("          Host:", "90"), summary.host.hostname));
        out.push_str(&format!("{} {}\n", self.style("     Test time:", "90"), summary.host.test_time));
        out.push_str(&format!(
            "{} {}\n",
            self.style("     Boot time:", "90"),
            summary.boottime.as_deref().unwrap_or("unknown")
        ));
        out.push_str(&format!(
            "{} {}\n",
            self.style("Kernel Version:", "90"),
            summary.kernel.as_deref().unwrap_or(&summary.host.kernel)
        ));
        let (start_label, end_label) = match summary.mode {
            RunMode::Boot => ("  Kernel start:", "    init start:"),
            RunMode::Trace => (" Measure start:", "   Measure end:"),
        };
        out.push_str(&format!("{} {:.3}\n", self.style(start_label, "90"), summary.start_ms));
        out.push_str(&format!("{} {:.3}\n", self.style(end_label, "90"), summary.initstart_ms));

        let counts: Vec<String> = summary
            .intervals
            .iter()
            .map(|(phase, n)| format!("{phase}={n}"))
            .collect();
        out.push_str(&format!("{} {}\n", self.style("     intervals", "90"), counts.join(" ")));
        out.push_str(&format!(
            "{} unmatched_closes={} pending={} overwritten={}\n",
            self.style("       dropped", "90"),
            summary.pass.unmatched_closes,
            summary.pass.pending_at_end,
            summary.pass.overwritten_opens
        ));

        if let Some(cg) = &summary.callgraphs {
            out.push_str(&format!(
                "{} matched={} unmatched={} invalid={} unbalanced={} too_short={}\n",
                self.style("    callgraphs", "90"),
                cg.matched,
                cg.unmatched,
                cg.assembled.invalid,
                cg.assembled.unbalanced,
                cg.assembled.too_short
            ));
        }
        if let Some(path) = &summary.html_path {
            out.push_str(&format!("{} {}\n", self.style("          html", "90"), path));
        }
        if let Some(path) = &summary.timeline_path {
            out.push_str(&format!("{} {}\n", self.style("      timeline", "90"), path));
        }

        println!("{}", out.trim_end());

        if let Some(cg) = summary.callgraphs.as_ref().filter(|cg| cg.unmatched > 0) {
            self.print_warning(&format!(
                "{} call graph(s) had no containing interval",
                cg.unmatched
            ));
        }
        Ok(())
    }

    pub fn print_error(&self, msg: &str) {
        if self.json {
            let out = serde_json::json!({
                "status": "error",
                "code": "error",
                "message": msg,
            });
            println!("{out}");
            return;
        }
        eprintln!("{} {msg}", self.style("error", "31;1"));
    }

    pub fn print_warning(&self, msg: &str) {
        if self.json {
            let out = serde_json::json!({
                "status": "warning",
                "code": "warning",
                "message": msg,
            });
            eprintln!("{out}");
            return;
        }
        eprintln!("{} {msg}", self.style("warn", "33;1"));
    }

    fn style(&self, text: &str, ansi: &str) -> String {
        if self.no_color {
            return text.to_string();
        }
        format!("\x1b[{ansi}m{text}\x1b[0m")
    }
}
