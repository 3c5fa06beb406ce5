//! Vendor-specific memory sampling: one external tool per variant.

use std::fmt;
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;
use serde::Serialize;

use super::MemoryReading;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

const ROCM_USED_KEY: &str = "VRAM Total Used Memory (B)";
const ROCM_TOTAL_KEY: &str = "VRAM Total Memory (B)";

static RADEONTOP_VRAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"vram (\d+(?:\.\d+)?)% (\d+(?:\.\d+)?)mb").expect("static regex")
});

/// Supported GPU memory tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GpuVendor {
    /// `nvidia-smi` CSV query.
    Nvidia,
    /// `rocm-smi` JSON output.
    AmdRocm,
    /// `radeontop` single-line dump.
    AmdRadeontop,
    /// No tool found. Every sample is the zero reading.
    None,
}

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("No GPU memory tool available")]
    NoVendor,

    #[error("Failed to launch {tool}: {message}")]
    Launch { tool: &'static str, message: String },

    #[error("{tool} did not finish within {millis}ms")]
    Timeout { tool: &'static str, millis: u128 },

    #[error("{tool} exited with {status}")]
    ToolFailed { tool: &'static str, status: String },

    #[error("Could not parse {tool} output: {detail}")]
    Parse { tool: &'static str, detail: String },
}

impl GpuVendor {
    /// Detection order.
    pub const CANDIDATES: [GpuVendor; 3] =
        [GpuVendor::Nvidia, GpuVendor::AmdRocm, GpuVendor::AmdRadeontop];

    /// Program and arguments used to sample this vendor.
    pub fn command(&self) -> Option<(&'static str, &'static [&'static str])> {
        match self {
            Self::Nvidia => Some((
                "nvidia-smi",
                &["--query-gpu=memory.used,memory.total", "--format=csv,noheader,nounits"],
            )),
            Self::AmdRocm => Some(("rocm-smi", &["--showmeminfo", "vram", "--json"])),
            Self::AmdRadeontop => Some(("radeontop", &["-d", "-", "-l", "1"])),
            Self::None => None,
        }
    }

    /// Parse the tool's stdout into a reading.
    pub fn parse(&self, output: &str) -> Result<MemoryReading, MemoryError> {
        match self {
            Self::Nvidia => parse_nvidia_smi(output),
            Self::AmdRocm => parse_rocm_smi(output),
            Self::AmdRadeontop => parse_radeontop(output),
            Self::None => Err(MemoryError::NoVendor),
        }
    }

    /// Run the tool (bounded by `timeout`) and parse its output.
    pub fn sample(&self, timeout: Duration) -> Result<MemoryReading, MemoryError> {
        let (program, args) = self.command().ok_or(MemoryError::NoVendor)?;
        let output = run_bounded(program, args, timeout)?;
        self.parse(&output)
    }
}

impl fmt::Display for GpuVendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nvidia => write!(f, "NVIDIA (nvidia-smi)"),
            Self::AmdRocm => write!(f, "AMD (rocm-smi)"),
            Self::AmdRadeontop => write!(f, "AMD (radeontop)"),
            Self::None => write!(f, "none"),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Parsers
// ═══════════════════════════════════════════════════════════

/// `memory.used, memory.total` in MiB, one line per GPU. Only the first GPU is read.
pub fn parse_nvidia_smi(output: &str) -> Result<MemoryReading, MemoryError> {
    let parse_err = |detail: &str| MemoryError::Parse {
        tool: "nvidia-smi",
        detail: detail.to_string(),
    };

    let line = output
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| parse_err("empty output"))?;

    let mut fields = line.split(',').map(str::trim);
    let used = fields
        .next()
        .and_then(|v| v.parse::<f64>().ok())
        .ok_or_else(|| parse_err(line))?;
    let total = fields
        .next()
        .and_then(|v| v.parse::<f64>().ok())
        .ok_or_else(|| parse_err(line))?;

    Ok(MemoryReading::new(used, total))
}

/// `rocm-smi --json`: `{"card0": {"VRAM Total Memory (B)": "...", ...}}`.
///
/// Cards are visited in key order and the first with both fields wins.
pub fn parse_rocm_smi(output: &str) -> Result<MemoryReading, MemoryError> {
    let parse_err = |detail: String| MemoryError::Parse {
        tool: "rocm-smi",
        detail,
    };

    let value: serde_json::Value =
        serde_json::from_str(output.trim()).map_err(|e| parse_err(e.to_string()))?;
    let cards = value
        .as_object()
        .ok_or_else(|| parse_err("expected a JSON object".into()))?;

    let mut names: Vec<&String> = cards.keys().collect();
    names.sort_by(|a, b| (card_index(a), *a).cmp(&(card_index(b), *b)));

    for name in names {
        let card = &cards[name];
        if let (Some(used), Some(total)) = (
            json_number(card.get(ROCM_USED_KEY)),
            json_number(card.get(ROCM_TOTAL_KEY)),
        ) {
            return Ok(MemoryReading::new(used / BYTES_PER_MB, total / BYTES_PER_MB));
        }
    }

    Err(parse_err("no card reported VRAM usage".into()))
}

/// Numeric suffix of a `cardN` key, so `card2` sorts before `card10`.
/// Keys without one sort last.
fn card_index(name: &str) -> u32 {
    let digits = name.trim_start_matches(|c: char| !c.is_ascii_digit());
    digits.parse().unwrap_or(u32::MAX)
}

/// rocm-smi reports byte counts as strings; accept numbers too.
fn json_number(value: Option<&serde_json::Value>) -> Option<f64> {
    match value? {
        serde_json::Value::String(s) => s.trim().parse().ok(),
        serde_json::Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// `radeontop -d -` line containing `vram <pct>% <used>mb`.
///
/// radeontop only reports usage, so the total is derived from the percentage.
pub fn parse_radeontop(output: &str) -> Result<MemoryReading, MemoryError> {
    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("Dumping") {
            continue;
        }

        if let Some(caps) = RADEONTOP_VRAM.captures(line) {
            let percent: f64 = caps[1].parse().unwrap_or(0.0);
            let used: f64 = caps[2].parse().unwrap_or(0.0);
            let total = if percent > 0.0 {
                used / (percent / 100.0)
            } else {
                0.0
            };
            return Ok(MemoryReading::new(used, total));
        }
    }

    Err(MemoryError::Parse {
        tool: "radeontop",
        detail: "no vram field in output".into(),
    })
}

// ═══════════════════════════════════════════════════════════
// Process execution
// ═══════════════════════════════════════════════════════════

/// Kill and reap a child we no longer wait on.
fn abandon(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Run `program` and collect stdout, killing it once `timeout` elapses.
fn run_bounded(
    program: &'static str,
    args: &[&str],
    timeout: Duration,
) -> Result<String, MemoryError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| MemoryError::Launch {
            tool: program,
            message: e.to_string(),
        })?;

    // Drain stdout on a separate thread so a chatty tool cannot block on a full pipe.
    let reader = child.stdout.take().map(|mut stdout| {
        std::thread::spawn(move || {
            let mut buf = String::new();
            let _ = stdout.read_to_string(&mut buf);
            buf
        })
    });

    let start = Instant::now();
    let poll_interval = Duration::from_millis(20);

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if start.elapsed() >= timeout => {
                abandon(&mut child);
                return Err(MemoryError::Timeout {
                    tool: program,
                    millis: timeout.as_millis(),
                });
            }
            Ok(None) => std::thread::sleep(poll_interval),
            Err(e) => {
                abandon(&mut child);
                return Err(MemoryError::Launch {
                    tool: program,
                    message: e.to_string(),
                })
            }
        }
    };

    let output = reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();

    if !status.success() {
        return Err(MemoryError::ToolFailed {
            tool: program,
            status: status.to_string(),
        });
    }

    Ok(output)
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
