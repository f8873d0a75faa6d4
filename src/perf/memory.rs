//! Process memory sampling and leak detection
//!
//! Memory is sampled every few frames and compared against a baseline taken
//! once the game has warmed up. Growth above the threshold has to persist for
//! several consecutive samples before it is reported; allocation bursts come
//! and go and are not leaks.

use serde::Serialize;

/// Where memory readings come from
pub trait MemorySource {
    /// Current resident memory in bytes, if it can be read
    fn sample(&mut self) -> Option<u64>;
}

/// Resident set size of this process
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessMemory;

impl MemorySource for ProcessMemory {
    fn sample(&mut self) -> Option<u64> {
        memory_stats::memory_stats().map(|stats| stats.physical_mem as u64)
    }
}

/// One memory reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemorySample {
    pub frame: u64,
    pub bytes: u64,
}

/// Advisory report of sustained memory growth
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LeakWarning {
    pub baseline: u64,
    pub current: u64,
    pub growth_pct: f32,
    /// Consecutive samples above the threshold
    pub samples: u32,
}

/// Sustained-growth heuristic against a baseline
#[derive(Debug, Clone)]
pub struct LeakDetector {
    baseline: Option<u64>,
    threshold_pct: f32,
    sustained: u32,
    consecutive: u32,
    warned: bool,
}

impl LeakDetector {
    pub fn new(threshold_pct: f32, sustained: u32) -> Self {
        Self {
            baseline: None,
            threshold_pct,
            sustained: sustained.max(1),
            consecutive: 0,
            warned: false,
        }
    }

    pub fn set_baseline(&mut self, bytes: u64) {
        self.baseline = Some(bytes);
        self.consecutive = 0;
        self.warned = false;
    }

    pub fn baseline(&self) -> Option<u64> {
        self.baseline
    }

    /// Growth of `bytes` over the baseline in percent
    pub fn growth_pct(&self, bytes: u64) -> Option<f32> {
        let baseline = self.baseline.filter(|&b| b > 0)?;
        Some(((bytes as f64 - baseline as f64) * 100.0 / baseline as f64) as f32)
    }

    /// Feed a sample; warns once per episode of sustained growth
    pub fn record(&mut self, bytes: u64) -> Option<LeakWarning> {
        let growth = self.growth_pct(bytes)?;
        if growth <= self.threshold_pct {
            self.consecutive = 0;
            self.warned = false;
            return None;
        }

        self.consecutive += 1;
        if self.consecutive < self.sustained || self.warned {
            return None;
        }
        self.warned = true;
        let warning = LeakWarning {
            baseline: self.baseline.unwrap_or_default(),
            current: bytes,
            growth_pct: growth,
            samples: self.consecutive,
        };
        log::warn!(
            "Possible memory leak: {:.1} MB is {:.1}% above the {:.1} MB baseline for {} samples",
            mb(warning.current),
            warning.growth_pct,
            mb(warning.baseline),
            warning.samples
        );
        Some(warning)
    }

    pub fn is_warning(&self) -> bool {
        self.warned
    }
}

pub(crate) fn mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}
