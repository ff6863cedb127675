//! Runs model-written Plotly code against a table and collects the figure.
//!
//! The snippet never runs in this process. Each execution gets a fresh
//! temporary directory, a separate interpreter with a cleared environment,
//! an address-space and CPU limit, and a wall-clock timeout. The only data
//! the snippet can see is the table, written next to it as CSV.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tokio::process::Command;

use crate::config::PlotConfig;
use crate::error::ChatError;
use crate::table::Table;

const HARNESS: &str = include_str!("harness.py");
const NO_FIGURE_EXIT: i32 = 3;
const PLOTLY_JS: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";

static CODE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```python(.*?)```").expect("code block pattern is valid")
});

/// First ```python fenced block in a model reply, trimmed.
pub fn extract_code_block(response: &str) -> Option<String> {
    CODE_BLOCK
        .captures(response)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// A Plotly figure as produced by `fig.to_json()`, with the code that built
/// it.
#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    pub code: String,
    pub figure: serde_json::Value,
}

impl Chart {
    /// Standalone page that draws the figure with plotly.js.
    pub fn to_html(&self, title: &str) -> String {
        // Keep `</script>` inside string values from closing the tag.
        let figure = self.figure.to_string().replace("</", "<\\/");
        format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n\
             <script src=\"{}\"></script>\n</head>\n<body>\n<div id=\"chart\"></div>\n\
             <script>\nconst figure = {};\n\
             Plotly.newPlot(\"chart\", figure.data || [], figure.layout || {{}}, {{responsive: true}});\n\
             </script>\n</body>\n</html>\n",
            escape_html(title),
            PLOTLY_JS,
            figure
        )
    }

    /// Write `<stem>-<id>.html` into `dir`, creating it if needed.
    pub fn write_html(&self, dir: &Path, stem: &str) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let id = uuid::Uuid::new_v4().simple().to_string();
        let file = format!("{}-{}.html", sanitize(stem), &id[..8]);
        let path = dir.join(file);
        std::fs::write(&path, self.to_html(stem))?;
        Ok(path)
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn sanitize(stem: &str) -> String {
    let cleaned: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "chart".to_string()
    } else {
        cleaned
    }
}

#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub interpreter: String,
    pub timeout: Duration,
    pub memory_limit_mb: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self::from(&PlotConfig::default())
    }
}

impl From<&PlotConfig> for SandboxConfig {
    fn from(config: &PlotConfig) -> Self {
        Self {
            interpreter: config.interpreter.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            memory_limit_mb: config.memory_limit_mb,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlotExecutor {
    config: SandboxConfig,
}

impl PlotExecutor {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    /// Extract the fenced snippet from `response` and execute it.
    pub async fn run(&self, response: &str, table: &Table) -> Result<Chart, ChatError> {
        let code = extract_code_block(response).ok_or_else(|| ChatError::NoCodeFound {
            response: response.to_string(),
        })?;
        self.execute(&code, table).await
    }

    /// Execute `code` with the table bound as `df` and return the `fig` it
    /// builds.
    pub async fn execute(&self, code: &str, table: &Table) -> Result<Chart, ChatError> {
        let exec_err = ChatError::ExecutionError;

        let workdir = tempfile::tempdir().map_err(|e| exec_err(e.to_string()))?;
        let csv = table.to_csv().map_err(exec_err)?;
        std::fs::write(workdir.path().join("data.csv"), csv).map_err(|e| exec_err(e.to_string()))?;
        std::fs::write(workdir.path().join("snippet.py"), code)
            .map_err(|e| exec_err(e.to_string()))?;
        std::fs::write(workdir.path().join("harness.py"), HARNESS)
            .map_err(|e| exec_err(e.to_string()))?;

        let mut cmd = Command::new(&self.config.interpreter);
        cmd.arg("-I")
            .arg("harness.py")
            .arg("snippet.py")
            .arg("data.csv")
            .current_dir(workdir.path())
            .env_clear()
            .env("DOCCHAT_MEMORY_LIMIT_MB", self.config.memory_limit_mb.to_string())
            .env("DOCCHAT_CPU_LIMIT_SECS", self.config.timeout.as_secs().max(1).to_string())
            .env("OPENBLAS_NUM_THREADS", "1")
            .env("MPLBACKEND", "Agg")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(path) = std::env::var_os("PATH") {
            cmd.env("PATH", path);
        }

        tracing::debug!(
            interpreter = %self.config.interpreter,
            timeout_secs = self.config.timeout.as_secs(),
            code_lines = code.lines().count(),
            "Running plot snippet"
        );

        let child = cmd.spawn().map_err(|e| {
            exec_err(format!(
                "could not start {}: {}",
                self.config.interpreter, e
            ))
        })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.config.timeout, child.wait_with_output()).await
        {
            Ok(result) => result.map_err(|e| exec_err(e.to_string()))?,
            Err(_) => {
                tracing::warn!(timeout_secs = self.config.timeout.as_secs(), "Plot snippet timed out");
                return Err(exec_err(format!(
                    "timed out after {}s",
                    self.config.timeout.as_secs()
                )));
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        match output.status.code() {
            Some(0) => {
                let figure: serde_json::Value = serde_json::from_slice(&output.stdout)
                    .map_err(|e| exec_err(format!("invalid figure output: {}", e)))?;
                Ok(Chart {
                    code: code.to_string(),
                    figure,
                })
            }
            Some(NO_FIGURE_EXIT) => Err(ChatError::NoFigureProduced),
            Some(status) => {
                tracing::debug!(exit_code = status, stderr = %stderr, "Plot snippet failed");
                Err(exec_err(last_line(&stderr).unwrap_or_else(|| {
                    format!("interpreter exited with status {}", status)
                })))
            }
            None => Err(exec_err("interpreter was terminated by a signal".to_string())),
        }
    }
}

fn last_line(text: &str) -> Option<String> {
    text.lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

/// Executable stand-ins for the interpreter, so the exit protocol can be
/// exercised without pandas or plotly installed.
#[cfg(all(test, unix))]
pub(crate) mod testing {
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    /// Write `body` as a `/bin/sh` script named `name` inside `dir` and
    /// return its path.
    pub fn fake_interpreter(dir: &Path, name: &str, body: &str) -> String {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    pub const PRINTS_FIGURE: &str = r#"echo '{"data": [{"type": "scatter"}], "layout": {}}'"#;
}
