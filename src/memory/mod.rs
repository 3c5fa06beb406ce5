//! GPU memory monitoring.
//!
//! Samples device memory through whichever vendor diagnostic tool is
//! installed. The vendor is detected on the first sample and reused for the
//! rest of the run. Sampling never fails from the caller's point of view:
//! any problem degrades to [`MemoryReading::unavailable`], which the probe
//! treats as "no usage data".

pub mod vendor;

use std::fmt;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config;

pub use vendor::{GpuVendor, MemoryError};

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// One device memory observation, in megabytes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MemoryReading {
    pub used_mb: f64,
    pub total_mb: f64,
}

impl MemoryReading {
    pub fn new(used_mb: f64, total_mb: f64) -> Self {
        Self { used_mb, total_mb }
    }

    /// Sentinel for "no usage data". Memory checks are inconclusive.
    pub fn unavailable() -> Self {
        Self::new(0.0, 0.0)
    }

    pub fn is_available(&self) -> bool {
        self.total_mb > 0.0
    }

    /// Usage as a percentage of total. 0 when the total is unknown.
    pub fn percent(&self) -> f64 {
        if self.total_mb > 0.0 {
            self.used_mb / self.total_mb * 100.0
        } else {
            0.0
        }
    }
}

impl fmt::Display for MemoryReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.0}M / {:.0}M ({:.1}%)",
            self.used_mb,
            self.total_mb,
            self.percent()
        )
    }
}

/// Anything that can report current device memory usage.
pub trait MemorySampler {
    fn sample(&self) -> MemoryReading;
}

// ═══════════════════════════════════════════════════════════
// MemoryMonitor
// ═══════════════════════════════════════════════════════════

/// Runs one vendor tool with a time bound.
type ToolRunner = fn(GpuVendor, Duration) -> Result<MemoryReading, MemoryError>;

/// Memory sampler backed by the vendor tool found on this machine.
///
/// Constructed once per run and passed by reference to the trial runner.
pub struct MemoryMonitor {
    vendor: OnceLock<GpuVendor>,
    candidates: &'static [GpuVendor],
    sample_timeout: Duration,
    run_tool: ToolRunner,
}

impl MemoryMonitor {
    pub fn new() -> Self {
        Self::with_candidates(&GpuVendor::CANDIDATES)
    }

    /// Detect among `candidates` (in order) instead of every supported tool.
    pub fn with_candidates(candidates: &'static [GpuVendor]) -> Self {
        Self {
            vendor: OnceLock::new(),
            candidates,
            sample_timeout: config::MEMORY_SAMPLE_TIMEOUT,
            run_tool: |vendor, timeout| vendor.sample(timeout),
        }
    }

    /// Skip detection and sample through a known vendor tool.
    pub fn with_vendor(vendor: GpuVendor) -> Self {
        let monitor = Self::new();
        let _ = monitor.vendor.set(vendor);
        monitor
    }

    #[cfg(test)]
    fn with_tool_runner(mut self, run_tool: ToolRunner) -> Self {
        self.run_tool = run_tool;
        self
    }

    #[cfg(test)]
    fn with_sample_timeout(mut self, timeout: Duration) -> Self {
        self.sample_timeout = timeout;
        self
    }

    /// The detected vendor. Runs detection on first call.
    pub fn vendor(&self) -> GpuVendor {
        *self.vendor.get_or_init(|| self.detect().0)
    }

    /// Try the candidates in order and keep the first that yields a reading.
    ///
    /// The whole pass shares one sample timeout, and the detecting reading is
    /// returned so the first sample costs no second tool run.
    fn detect(&self) -> (GpuVendor, Option<MemoryReading>) {
        let _span = tracing::info_span!("gpu_vendor_detect").entered();
        let deadline = Instant::now() + self.sample_timeout;

        for &candidate in self.candidates {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                tracing::debug!(vendor = %candidate, "Detection time exhausted");
                break;
            }
            match (self.run_tool)(candidate, remaining) {
                Ok(reading) => {
                    tracing::info!(vendor = %candidate, memory = %reading, "GPU memory tool detected");
                    return (candidate, Some(reading));
                }
                Err(e) => {
                    tracing::debug!(vendor = %candidate, error = %e, "GPU memory tool not usable");
                }
            }
        }

        tracing::warn!(
            "No supported GPU memory tool found (nvidia-smi, rocm-smi, radeontop); memory checks disabled"
        );
        (GpuVendor::None, None)
    }
}

impl Default for MemoryMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySampler for MemoryMonitor {
    fn sample(&self) -> MemoryReading {
        let mut detected = None;
        let vendor = *self.vendor.get_or_init(|| {
            let (vendor, reading) = self.detect();
            detected = reading;
            vendor
        });
        if let Some(reading) = detected {
            return reading;
        }
        if vendor == GpuVendor::None {
            return MemoryReading::unavailable();
        }

        match (self.run_tool)(vendor, self.sample_timeout) {
            Ok(reading) => reading,
            Err(e) => {
                tracing::debug!(vendor = %vendor, error = %e, "Memory sample failed");
                MemoryReading::unavailable()
            }
        }
    }
}

/// Sampler that always returns the same reading.
pub struct FixedMemorySampler {
    reading: MemoryReading,
}

impl FixedMemorySampler {
    pub fn new(used_mb: f64, total_mb: f64) -> Self {
        Self {
            reading: MemoryReading::new(used_mb, total_mb),
        }
    }
}

impl MemorySampler for FixedMemorySampler {
    fn sample(&self) -> MemoryReading {
        self.reading
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
