//! Performance monitoring
//!
//! One [`PerformanceMonitor`] is owned by the frame loop. It times the
//! pipeline sections into rolling sample windows, tracks frame rate from real
//! frame intervals, samples process memory every few frames and runs the leak
//! heuristic. With monitoring disabled every entry point returns immediately.

pub mod memory;
pub mod sink;
pub mod window;

use std::time::{Duration, Instant};

use serde::Serialize;

pub use memory::{LeakDetector, LeakWarning, MemorySample, MemorySource, ProcessMemory};
pub use sink::{JsonLinesSink, LogSink, PerfSink};
pub use window::SampleWindow;

use crate::settings::Settings;

/// FPS is recomputed after this much real time (seconds)
const FPS_WINDOW: f64 = 0.5;

/// Timed stage of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Section {
    Frame,
    Update,
    Collision,
    Render,
}

impl Section {
    pub const COUNT: usize = 4;
    pub const ALL: [Section; Section::COUNT] =
        [Section::Frame, Section::Update, Section::Collision, Section::Render];

    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Frame => "frame",
            Section::Update => "update",
            Section::Collision => "collision",
            Section::Render => "render",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Section::Frame => "Frame",
            Section::Update => "Update",
            Section::Collision => "Collision",
            Section::Render => "Render",
        }
    }

    #[inline]
    fn index(self) -> usize {
        self as usize
    }
}

/// Rolling statistics of one section
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SectionSummary {
    pub section: Section,
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub last_ms: f64,
}

/// Last measured duration of each section, in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SectionTimes {
    pub frame_ms: f64,
    pub update_ms: f64,
    pub collision_ms: f64,
    pub render_ms: f64,
}

/// Everything the monitor knows, as plain data
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerfSnapshot {
    pub frame: u64,
    pub fps: f64,
    pub sections: Vec<SectionSummary>,
    pub memory: Option<MemorySample>,
    pub baseline_bytes: Option<u64>,
    pub leak_warning: Option<LeakWarning>,
}

pub struct PerformanceMonitor {
    enabled: bool,
    frame: u64,

    sections: [SampleWindow<Duration>; Section::COUNT],
    started: [Option<Instant>; Section::COUNT],
    slow_threshold: Duration,
    warnings: Vec<String>,

    frame_intervals: SampleWindow<f64>,
    fps: f64,
    fps_frames: u32,
    fps_elapsed: f64,
    report_interval: f64,
    since_report: f64,

    memory_source: Option<Box<dyn MemorySource>>,
    memory_interval: u64,
    warmup_frames: u64,
    leak: LeakDetector,
    last_memory: Option<MemorySample>,
    leak_warning: Option<LeakWarning>,
}

impl PerformanceMonitor {
    /// Monitor reading memory from this process
    pub fn new(settings: &Settings) -> Self {
        Self::with_memory_source(settings, Some(Box::new(ProcessMemory)))
    }

    pub fn with_memory_source(settings: &Settings, source: Option<Box<dyn MemorySource>>) -> Self {
        let capacity = settings.sample_capacity;
        Self {
            enabled: settings.monitoring,
            frame: 0,
            sections: std::array::from_fn(|_| SampleWindow::new(capacity)),
            started: [None; Section::COUNT],
            slow_threshold: Duration::try_from_secs_f32(settings.slow_section_ms.max(0.0) / 1000.0)
                .unwrap_or(Duration::MAX),
            warnings: Vec::new(),
            frame_intervals: SampleWindow::new(capacity),
            fps: 0.0,
            fps_frames: 0,
            fps_elapsed: 0.0,
            report_interval: settings.report_interval_secs as f64,
            since_report: 0.0,
            memory_source: source,
            memory_interval: settings.memory_sample_interval.max(1),
            warmup_frames: settings.memory_warmup_frames,
            leak: LeakDetector::new(settings.leak_threshold_pct, settings.leak_sustained_samples),
            last_memory: None,
            leak_warning: None,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.started = [None; Section::COUNT];
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Frames started so far
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn begin_frame(&mut self) {
        if !self.enabled {
            return;
        }
        self.frame += 1;
        self.warnings.clear();
        self.begin_section(Section::Frame);
    }

    /// Close the frame section and account `elapsed` seconds of real time
    ///
    /// Returns a snapshot when a periodic report is due.
    pub fn end_frame(&mut self, elapsed: f32) -> Option<PerfSnapshot> {
        if !self.enabled {
            return None;
        }
        self.end_section(Section::Frame);
        self.record_frame_interval(elapsed as f64);

        self.since_report += elapsed as f64;
        if self.report_interval > 0.0 && self.since_report >= self.report_interval {
            self.since_report = 0.0;
            let snapshot = self.snapshot();
            self.log_report(&snapshot);
            return Some(snapshot);
        }
        None
    }

    #[inline]
    pub fn begin_section(&mut self, section: Section) {
        if !self.enabled {
            return;
        }
        self.started[section.index()] = Some(Instant::now());
    }

    /// Record the time since the matching `begin_section`
    #[inline]
    pub fn end_section(&mut self, section: Section) -> Option<Duration> {
        if !self.enabled {
            return None;
        }
        let start = self.started[section.index()].take()?;
        let elapsed = start.elapsed();
        self.record_section(section, elapsed);
        Some(elapsed)
    }

    /// Time a closure as one section
    pub fn time<F, R>(&mut self, section: Section, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        self.begin_section(section);
        let result = f();
        self.end_section(section);
        result
    }

    /// Add a measured duration directly
    pub fn record_section(&mut self, section: Section, elapsed: Duration) {
        if !self.enabled {
            return;
        }
        self.sections[section.index()].record(elapsed);
        if elapsed > self.slow_threshold {
            let warning = format!(
                "{} taking too long: {:.1}ms",
                section.label(),
                elapsed.as_secs_f64() * 1000.0
            );
            log::debug!("Performance warning: {warning}");
            self.warnings.push(warning);
        }
    }

    /// Feed one real frame interval into the FPS estimate
    pub fn record_frame_interval(&mut self, seconds: f64) {
        if !self.enabled || !seconds.is_finite() || seconds <= 0.0 {
            return;
        }
        self.frame_intervals.record(seconds);
        self.fps_frames += 1;
        self.fps_elapsed += seconds;
        if self.fps_elapsed >= FPS_WINDOW {
            self.fps = self.fps_frames as f64 / self.fps_elapsed;
            self.fps_frames = 0;
            self.fps_elapsed = 0.0;
        }
    }

    /// Frame rate over the last half second
    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Frame rate from the rolling frame-interval average
    pub fn average_fps(&self) -> f64 {
        let avg = self.frame_intervals.mean();
        if avg > 0.0 { 1.0 / avg } else { 0.0 }
    }

    pub fn average(&self, section: Section) -> Duration {
        self.sections[section.index()].mean()
    }

    pub fn last(&self, section: Section) -> Duration {
        self.sections[section.index()].latest().unwrap_or_default()
    }

    pub fn last_times(&self) -> SectionTimes {
        let ms = |s: Section| self.last(s).as_secs_f64() * 1000.0;
        SectionTimes {
            frame_ms: ms(Section::Frame),
            update_ms: ms(Section::Update),
            collision_ms: ms(Section::Collision),
            render_ms: ms(Section::Render),
        }
    }

    /// Slow-section warnings raised during the current frame
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Read process memory if this frame is a sampling frame
    pub fn sample_memory(&mut self) -> Option<LeakWarning> {
        if !self.enabled || self.frame % self.memory_interval != 0 {
            return None;
        }
        let bytes = self.memory_source.as_mut()?.sample()?;
        self.record_memory(bytes)
    }

    /// Feed a memory reading taken elsewhere
    pub fn record_memory(&mut self, bytes: u64) -> Option<LeakWarning> {
        if !self.enabled {
            return None;
        }
        self.last_memory = Some(MemorySample {
            frame: self.frame,
            bytes,
        });
        if self.leak.baseline().is_none() {
            if self.frame >= self.warmup_frames {
                self.capture_baseline(bytes);
            }
            return None;
        }

        let warning = self.leak.record(bytes);
        if warning.is_some() {
            self.leak_warning = warning;
        } else if !self.leak.is_warning() {
            self.leak_warning = None;
        }
        warning
    }

    /// Take `bytes` as the quiescent reference point
    pub fn capture_baseline(&mut self, bytes: u64) {
        log::info!("Memory baseline set to {:.1} MB", memory::mb(bytes));
        self.leak.set_baseline(bytes);
        self.leak_warning = None;
    }

    pub fn baseline(&self) -> Option<u64> {
        self.leak.baseline()
    }

    /// Active leak warning, until memory drops back under the threshold
    pub fn leak_warning(&self) -> Option<LeakWarning> {
        self.leak_warning
    }

    pub fn snapshot(&self) -> PerfSnapshot {
        let sections = Section::ALL
            .iter()
            .map(|&section| {
                let window = &self.sections[section.index()];
                let (min, max) = window.range();
                SectionSummary {
                    section,
                    avg_ms: window.mean().as_secs_f64() * 1000.0,
                    min_ms: min.as_secs_f64() * 1000.0,
                    max_ms: max.as_secs_f64() * 1000.0,
                    last_ms: window.latest().unwrap_or_default().as_secs_f64() * 1000.0,
                }
            })
            .collect();
        PerfSnapshot {
            frame: self.frame,
            fps: self.fps,
            sections,
            memory: self.last_memory,
            baseline_bytes: self.leak.baseline(),
            leak_warning: self.leak_warning,
        }
    }

    /// Text for the on-screen panel
    pub fn overlay_lines(&self) -> Vec<String> {
        let mut lines = vec![format!("FPS: {:.1}", self.fps)];
        for section in Section::ALL {
            let window = &self.sections[section.index()];
            if !window.is_empty() {
                lines.push(format!(
                    "{}: {:.1}ms",
                    section.label(),
                    window.mean().as_secs_f64() * 1000.0
                ));
            }
        }
        if let Some(warning) = self.warnings.last() {
            lines.push(warning.clone());
        } else if let Some(leak) = self.leak_warning {
            lines.push(format!("Memory +{:.0}%", leak.growth_pct));
        }
        lines
    }

    fn log_report(&self, snapshot: &PerfSnapshot) {
        let frame_ms = self.average(Section::Frame).as_secs_f64() * 1000.0;
        log::info!(target: "perf", "FPS: {:.1}", self.average_fps());
        log::info!(target: "perf", "Frame Time: {frame_ms:.2}ms");
        for summary in snapshot.sections.iter().filter(|s| s.section != Section::Frame) {
            let pct = if frame_ms > 0.0 {
                summary.avg_ms / frame_ms * 100.0
            } else {
                0.0
            };
            log::info!(
                target: "perf",
                "{} Time: {:.2}ms ({pct:.0}%)",
                summary.section.label(),
                summary.avg_ms
            );
        }
        if let Some(sample) = snapshot.memory {
            log::info!(target: "perf", "Memory: {:.1} MB", memory::mb(sample.bytes));
        }
    }
}
