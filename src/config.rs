//! `bootgraph.toml` config loading.

use serde::{Deserialize, Serialize};

use std::path::{Path, PathBuf};

use crate::PhaseKind;

/// Trace event families the trace-event pass recognizes. A disabled family
/// never has its patterns evaluated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct TraceFamilies {
    pub wakesource: bool,
    pub wakelock: bool,
    pub cpuidle: bool,
    pub cpufreq: bool,
}

impl TraceFamilies {
    pub fn all() -> Self {
        Self {
            wakesource: true,
            wakelock: true,
            cpuidle: true,
            cpufreq: true,
        }
    }

    pub fn any(&self) -> bool {
        self.wakesource || self.wakelock || self.cpuidle || self.cpufreq
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    #[serde(default)]
    pub families: TraceFamilies,

    /// Console lines at or beyond this kernel timestamp end the initcall pass.
    #[serde(default = "default_cutoff_secs")]
    pub cutoff_secs: f64,

    /// Width given to instantaneous cpu-frequency observations.
    #[serde(default = "default_cpufreq_width_secs")]
    pub cpufreq_width_secs: f64,

    /// Call graphs shorter than this are discarded before matching.
    #[serde(default)]
    pub min_callgraph_secs: f64,

    /// Phases scanned when attaching call graphs to intervals.
    #[serde(default = "default_callgraph_phases")]
    pub callgraph_phases: Vec<PhaseKind>,

    /// Embed the raw log text in the html output.
    #[serde(default)]
    pub add_logs: bool,

    #[serde(default = "default_html_file")]
    pub html_file: PathBuf,
}

fn default_cutoff_secs() -> f64 {
    120.0
}

fn default_cpufreq_width_secs() -> f64 {
    0.01
}

fn default_callgraph_phases() -> Vec<PhaseKind> {
    vec![PhaseKind::Boot]
}

fn default_html_file() -> PathBuf {
    PathBuf::from("bootgraph.html")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            families: TraceFamilies::default(),
            cutoff_secs: default_cutoff_secs(),
            cpufreq_width_secs: default_cpufreq_width_secs(),
            min_callgraph_secs: 0.0,
            callgraph_phases: default_callgraph_phases(),
            add_logs: false,
            html_file: default_html_file(),
        }
    }
}

impl Config {
    pub fn load_optional(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(s) => match toml::from_str::<Config>(&s) {
                Ok(cfg) => cfg,
                Err(err) => {
                    tracing::warn!("failed to parse config {}: {err}", path.display());
                    Self::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(err) => {
                tracing::warn!("failed to read config {}: {err}", path.display());
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> crate::BootgraphResult<()> {
        if !(self.cutoff_secs > 0.0) {
            return Err(crate::BootgraphError::Config(format!(
                "cutoff_secs must be positive, got {}",
                self.cutoff_secs
            )));
        }
        if !(self.cpufreq_width_secs > 0.0) {
            return Err(crate::BootgraphError::Config(format!(
                "cpufreq_width_secs must be positive, got {}",
                self.cpufreq_width_secs
            )));
        }
        if self.min_callgraph_secs < 0.0 {
            return Err(crate::BootgraphError::Config(format!(
                "min_callgraph_secs must not be negative, got {}",
                self.min_callgraph_secs
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: Config = toml::from_str(
            "cutoff_secs = 30.0\n[families]\ncpufreq = true\n",
        )
        .expect("config");
        assert_eq!(cfg.cutoff_secs, 30.0);
        assert!(cfg.families.cpufreq);
        assert!(!cfg.families.wakelock);
        assert_eq!(cfg.cpufreq_width_secs, 0.01);
        assert_eq!(cfg.callgraph_phases, vec![PhaseKind::Boot]);
        assert_eq!(cfg.html_file, PathBuf::from("bootgraph.html"));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = Config::load_optional(Path::new("/nonexistent/bootgraph.toml"));
        assert_eq!(cfg.cutoff_secs, 120.0);
        assert!(!cfg.families.any());
    }

    #[test]
    fn validate_rejects_non_positive_cutoff() {
        let cfg = Config {
            cutoff_secs: 0.0,
            ..Config::default()
        };
        assert!(matches!(cfg.validate(), Err(crate::BootgraphError::Config(_))));
    }
}
