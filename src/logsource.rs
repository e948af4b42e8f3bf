//! Line-oriented log inputs: a stored file or the output of a capture command.

use serde::{Deserialize, Serialize};

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::{BootgraphError, BootgraphResult};

/// Tracefs mount points tried, in order, when no stored ftrace file is given.
pub const TRACEFS_DIRS: [&str; 2] = ["/sys/kernel/tracing", "/sys/kernel/debug/tracing"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogSource {
    File { path: PathBuf },
    Command { program: String, args: Vec<String> },
}

impl LogSource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File { path: path.into() }
    }

    /// The live kernel ring buffer.
    pub fn dmesg() -> Self {
        Self::Command {
            program: "dmesg".to_string(),
            args: Vec::new(),
        }
    }

    /// The live ftrace buffer under `tracefs`.
    pub fn tracefs(tracefs: &Path) -> Self {
        Self::file(tracefs.join("trace"))
    }

    pub fn describe(&self) -> String {
        match self {
            Self::File { path } => path.display().to_string(),
            Self::Command { program, args } if args.is_empty() => program.clone(),
            Self::Command { program, args } => format!("{program} {}", args.join(" ")),
        }
    }

    /// Reads the whole source. Invalid UTF-8 is replaced rather than
    /// rejected; a failed read or capture is an error for the run.
    pub fn read_lines(&self) -> BootgraphResult<Vec<String>> {
        let bytes = match self {
            Self::File { path } => std::fs::read(path)?,
            Self::Command { program, args } => {
                let output = Command::new(program).args(args).output()?;
                if !output.status.success() {
                    return Err(BootgraphError::Io(std::io::Error::other(format!(
                        "`{}` exited with {}: {}",
                        self.describe(),
                        output.status,
                        String::from_utf8_lossy(&output.stderr).trim()
                    ))));
                }
                output.stdout
            }
        };
        Ok(String::from_utf8_lossy(&bytes)
            .lines()
            .map(ToString::to_string)
            .collect())
    }
}

/// First candidate that looks like a mounted tracefs (has `current_tracer`).
pub fn find_tracefs<P: AsRef<Path>>(candidates: &[P]) -> BootgraphResult<PathBuf> {
    for dir in candidates {
        let dir = dir.as_ref();
        if dir.join("current_tracer").is_file() {
            return Ok(dir.to_path_buf());
        }
        tracing::debug!("no tracefs at {}", dir.display());
    }
    let tried: Vec<String> = candidates
        .iter()
        .map(|d| d.as_ref().display().to_string())
        .collect();
    Err(BootgraphError::Trace(format!(
        "ftrace not available (tried {})",
        tried.join(", ")
    )))
}

/// Checks that the live tracer is set up for a boot call graph.
pub fn verify_tracefs(tracefs: &Path) -> BootgraphResult<()> {
    let tracer = std::fs::read_to_string(tracefs.join("current_tracer")).map_err(|err| {
        BootgraphError::Trace(format!("ftrace not available at {}: {err}", tracefs.display()))
    })?;
    if tracer.trim() != "function_graph" {
        return Err(BootgraphError::Trace(format!(
            "current tracer is {:?}, expected function_graph",
            tracer.trim()
        )));
    }
    let graph_fns = std::fs::read_to_string(tracefs.join("set_graph_function")).unwrap_or_default();
    if !graph_fns.contains("do_one_initcall") {
        return Err(BootgraphError::Trace(
            "ftrace not configured for a boot callgraph (set_graph_function lacks do_one_initcall)"
                .to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("bootgraph-logsource-{name}-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("dir");
        dir
    }

    #[test]
    fn file_source_splits_lines() {
        let dir = temp_dir("file");
        let path = dir.join("dmesg.txt");
        std::fs::write(&path, b"[    0.1] a\r\n[    0.2] b\n").expect("write");
        let lines = LogSource::file(&path).read_lines().expect("read");
        assert_eq!(lines, vec!["[    0.1] a".to_string(), "[    0.2] b".to_string()]);
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = LogSource::file("/nonexistent/dmesg.txt").read_lines().expect_err("missing");
        assert!(matches!(err, BootgraphError::Io(_)));
    }

    #[test]
    fn tracefs_requires_function_graph() {
        let dir = temp_dir("tracefs");
        std::fs::write(dir.join("current_tracer"), "nop\n").expect("write");
        assert!(matches!(verify_tracefs(&dir), Err(BootgraphError::Trace(_))));
        std::fs::write(dir.join("current_tracer"), "function_graph\n").expect("write");
        std::fs::write(dir.join("set_graph_function"), "do_one_initcall\n").expect("write");
        verify_tracefs(&dir).expect("configured");
    }

    #[test]
    fn tracefs_lookup_falls_back_to_the_next_mount() {
        let missing = temp_dir("missing");
        let debugfs = temp_dir("debugfs");
        std::fs::write(debugfs.join("current_tracer"), "function_graph\n").expect("write");
        let found = find_tracefs(&[missing.as_path(), debugfs.as_path()]).expect("found");
        assert_eq!(found, debugfs);

        let err = find_tracefs(&[missing.as_path()]).expect_err("none mounted");
        assert!(matches!(err, BootgraphError::Trace(_)));
    }

    #[test]
    fn describe_command() {
        assert_eq!(LogSource::dmesg().describe(), "dmesg");
    }
}
