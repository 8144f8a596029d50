//! Runtime trace: run events persisted as JSON lines.

use crate::config::ObservabilityConfig;
use crate::workflow::{Event, EventSink};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceMode {
    None,
    /// Keep the newest `max_entries` lines. The file may run up to a
    /// quarter over before it is trimmed back.
    Rolling,
    Full,
}

impl TraceMode {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "rolling" => Ok(Self::Rolling),
            "full" => Ok(Self::Full),
            other => anyhow::bail!("unknown runtime trace mode: {other}"),
        }
    }
}

#[derive(Debug)]
pub struct RuntimeTrace {
    mode: TraceMode,
    path: PathBuf,
    max_entries: usize,
    /// Lines currently in the file, counted once on first write.
    lines: Mutex<Option<usize>>,
}

impl RuntimeTrace {
    pub fn new(mode: TraceMode, path: impl Into<PathBuf>, max_entries: usize) -> Self {
        Self {
            mode,
            path: path.into(),
            max_entries: max_entries.max(1),
            lines: Mutex::new(None),
        }
    }

    /// Build from `[observability]`; `None` when tracing is off.
    pub fn from_config(config: &ObservabilityConfig, path: &Path) -> Result<Option<Self>> {
        let mode = TraceMode::parse(&config.runtime_trace_mode)?;
        if mode == TraceMode::None {
            return Ok(None);
        }
        Ok(Some(Self::new(mode, path, config.runtime_trace_max_entries)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, event: &Event) -> Result<()> {
        if self.mode == TraceMode::None {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create trace directory: {}", parent.display())
            })?;
        }

        let line = serde_json::to_string(event).context("Failed to serialize trace event")?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open trace file: {}", self.path.display()))?;
        writeln!(file, "{line}").context("Failed to append trace event")?;
        drop(file);

        if self.mode == TraceMode::Rolling {
            let mut lines = self.lines.lock();
            let count = match *lines {
                Some(count) => count + 1,
                None => self.count_lines()?,
            };
            *lines = Some(count);
            if count > self.trim_threshold() {
                self.trim()?;
                *lines = Some(self.max_entries.min(count));
            }
        }
        Ok(())
    }

    fn trim_threshold(&self) -> usize {
        self.max_entries + (self.max_entries / 4).max(1)
    }

    fn read_contents(&self) -> Result<String> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(contents),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to read trace file: {}", self.path.display())),
        }
    }

    fn count_lines(&self) -> Result<usize> {
        Ok(self
            .read_contents()?
            .lines()
            .filter(|l| !l.trim().is_empty())
            .count())
    }

    fn trim(&self) -> Result<()> {
        let contents = self.read_contents()?;
        let lines: Vec<&str> = contents.lines().filter(|l| !l.trim().is_empty()).collect();
        if lines.len() <= self.max_entries {
            return Ok(());
        }

        let keep = &lines[lines.len() - self.max_entries..];
        let mut rewritten = keep.join("\n");
        rewritten.push('\n');
        let temp_path = self.path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4()));
        fs::write(&temp_path, rewritten).context("Failed to write trimmed trace file")?;
        if let Err(e) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            anyhow::bail!("Failed to replace trace file: {e}");
        }
        Ok(())
    }
}

impl EventSink for RuntimeTrace {
    fn emit(&mut self, event: &Event) {
        if let Err(e) = self.record(event) {
            tracing::warn!(path = %self.path.display(), "runtime trace write failed: {e:#}");
        }
    }
}
