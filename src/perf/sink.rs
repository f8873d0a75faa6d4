//! Observability sinks
//!
//! The core hands out plain values; a sink decides where they go. [`LogSink`]
//! writes through the `log` facade, [`JsonLinesSink`] writes one JSON object
//! per line for offline analysis.

use std::io::Write;

use serde::Serialize;

use super::{LeakWarning, PerfSnapshot};
use crate::error::Result;
use crate::frame_loop::FrameStats;

pub trait PerfSink {
    /// Per-frame statistics
    fn record_frame(&mut self, stats: &FrameStats) -> Result<()>;

    /// Periodic rolling report
    fn record_report(&mut self, _snapshot: &PerfSnapshot) -> Result<()> {
        Ok(())
    }

    fn record_leak(&mut self, _warning: &LeakWarning) -> Result<()> {
        Ok(())
    }
}

/// Writes frame summaries at debug level and reports at info level
#[derive(Debug, Default)]
pub struct LogSink;

impl PerfSink for LogSink {
    fn record_frame(&mut self, stats: &FrameStats) -> Result<()> {
        log::debug!(
            target: "perf",
            "frame {}: {} substeps, {} visible, {} collisions, {} regions ({} px), {} draw calls",
            stats.frame,
            stats.substeps,
            stats.visible,
            stats.collisions,
            stats.render.regions,
            stats.render.dirty_area,
            stats.render.batch.draw_calls()
        );
        Ok(())
    }

    fn record_report(&mut self, snapshot: &PerfSnapshot) -> Result<()> {
        log::info!(target: "perf", "{} frames, {:.1} fps", snapshot.frame, snapshot.fps);
        Ok(())
    }

    fn record_leak(&mut self, warning: &LeakWarning) -> Result<()> {
        log::warn!(target: "perf", "memory {:.1}% above baseline", warning.growth_pct);
        Ok(())
    }
}

/// Tagged line so readers can tell record kinds apart
#[derive(Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
enum Record<'a> {
    Frame(&'a FrameStats),
    Report(&'a PerfSnapshot),
    Leak(&'a LeakWarning),
}

/// Newline-delimited JSON
#[derive(Debug)]
pub struct JsonLinesSink<W: Write> {
    writer: W,
    lines: u64,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, lines: 0 }
    }

    pub fn lines_written(&self) -> u64 {
        self.lines
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write(&mut self, record: Record<'_>) -> Result<()> {
        serde_json::to_writer(&mut self.writer, &record)?;
        self.writer.write_all(b"\n")?;
        self.lines += 1;
        Ok(())
    }
}

impl<W: Write> PerfSink for JsonLinesSink<W> {
    fn record_frame(&mut self, stats: &FrameStats) -> Result<()> {
        self.write(Record::Frame(stats))
    }

    fn record_report(&mut self, snapshot: &PerfSnapshot) -> Result<()> {
        self.write(Record::Report(snapshot))
    }

    fn record_leak(&mut self, warning: &LeakWarning) -> Result<()> {
        self.write(Record::Leak(warning))?;
        self.writer.flush()?;
        Ok(())
    }
}
