// Telemetry Side Processes
// Best-effort iostat and top sampling around a worker group

use crate::supervisor::worker::OutputSink;

use std::fs::File;
use std::io;
use std::path::Path;
use std::process::Stdio;
use tokio::process::{Child, Command};

/// Seconds between samples
const SAMPLE_INTERVAL: &str = "2";

/// Where each telemetry stream is written for one attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetrySinks {
    pub iostat: OutputSink,
    pub top: OutputSink,
}

impl TelemetrySinks {
    pub fn discard() -> Self {
        Self {
            iostat: OutputSink::Discard,
            top: OutputSink::Discard,
        }
    }
}

/// Sampling commands available on this machine
#[derive(Debug, Clone, Default)]
pub struct Telemetry {
    iostat: Option<Vec<String>>,
    top: Option<Vec<String>>,
}

impl Telemetry {
    /// Telemetry that never starts anything
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Look up `iostat` and `top` on the PATH; missing tools are skipped
    pub async fn detect() -> Self {
        let iostat = match which::which("iostat") {
            Ok(path) => {
                let mut argv = vec![path.to_string_lossy().into_owned()];
                if iostat_supports_extended(&path).await {
                    argv.push("-x".to_string());
                }
                argv.push(SAMPLE_INTERVAL.to_string());
                Some(argv)
            }
            Err(_) => None,
        };
        let top = which::which("top").ok().map(|path| {
            let mut argv = vec![path.to_string_lossy().into_owned()];
            if cfg!(target_os = "macos") {
                argv.extend(["-l", "0", "-s", SAMPLE_INTERVAL].map(String::from));
            } else {
                argv.extend(["-b", "-d", SAMPLE_INTERVAL].map(String::from));
            }
            argv
        });
        tracing::debug!(iostat = ?iostat, top = ?top, "telemetry commands");
        Self { iostat, top }
    }

    pub fn is_enabled(&self) -> bool {
        self.iostat.is_some() || self.top.is_some()
    }

    /// Start every available sampler, writing stdout and stderr to its sink
    pub fn start(&self, sinks: &TelemetrySinks) -> TelemetryHandle {
        let mut children = Vec::new();
        for (argv, sink) in [(&self.iostat, &sinks.iostat), (&self.top, &sinks.top)] {
            let Some(argv) = argv else { continue };
            match spawn_sampler(argv, sink) {
                Ok(child) => {
                    tracing::debug!(command = %argv.join(" "), pid = ?child.id(), "started sampler");
                    children.push(child);
                }
                Err(e) => tracing::debug!(command = %argv.join(" "), error = %e, "sampler unavailable"),
            }
        }
        TelemetryHandle { children }
    }
}

async fn iostat_supports_extended(path: &Path) -> bool {
    match Command::new(path).arg("--help").output().await {
        Ok(output) => {
            let text = [output.stdout, output.stderr].concat();
            String::from_utf8_lossy(&text).contains("-x")
        }
        Err(_) => false,
    }
}

fn spawn_sampler(argv: &[String], sink: &OutputSink) -> io::Result<Child> {
    let (stdout, stderr) = match sink {
        OutputSink::File(path) => {
            let file = File::create(path)?;
            (Stdio::from(file.try_clone()?), Stdio::from(file))
        }
        OutputSink::Discard => (Stdio::null(), Stdio::null()),
    };
    Command::new(&argv[0])
        .args(&argv[1..])
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr)
        .kill_on_drop(true)
        .spawn()
}

/// Running samplers; killed once the worker group has been joined
#[derive(Debug)]
pub struct TelemetryHandle {
    children: Vec<Child>,
}

impl TelemetryHandle {
    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub async fn kill(self) {
        for mut child in self.children {
            tracing::debug!(pid = ?child.id(), "killing sampler");
            let _ = child.kill().await;
        }
    }
}
