//! Run configuration
//!
//! Settings come from a configuration file (one `key: value` per line,
//! case-insensitive keys, `#` comments) optionally followed by inline
//! overrides on the command line in the same form. Defaults, validation,
//! and the derived large-block rate all live on [`Config`].

pub mod cli;
pub mod file;

use crate::stats::HistScale;
use crate::Result;
use anyhow::{anyhow, bail, Context};
use log::warn;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Kernel I/O scheduler written to sysfs for each device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerMode {
    Noop,
    Cfq,
    Deadline,
}

impl SchedulerMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SchedulerMode::Noop => "noop",
            SchedulerMode::Cfq => "cfq",
            SchedulerMode::Deadline => "deadline",
        }
    }
}

impl FromStr for SchedulerMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "noop" => Ok(SchedulerMode::Noop),
            "cfq" => Ok(SchedulerMode::Cfq),
            "deadline" => Ok(SchedulerMode::Deadline),
            other => Err(anyhow!(
                "scheduler-mode must be one of noop, cfq, deadline, got '{}'",
                other
            )),
        }
    }
}

impl fmt::Display for SchedulerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Effective run configuration after file, overrides, and defaults.
///
/// Keys marked reserved in the format are accepted and echoed but unused
/// by the workload core.
#[derive(Debug, Clone)]
pub struct Config {
    pub device_names: Vec<String>,
    pub test_duration_sec: u32,
    pub read_reqs_per_sec: u32,
    pub write_reqs_per_sec: u32,
    pub num_queues: u32,
    pub threads_per_queue: u32,
    pub report_interval_sec: u32,
    pub us_histograms: bool,
    pub record_bytes: u32,
    pub record_bytes_range_max: u32,
    pub large_block_op_kbytes: u32,
    pub replication_factor: u32,
    pub update_pct: u32,
    pub defrag_lwm_pct: u32,
    pub disable_odsync: bool,
    pub commit_to_device: bool,
    pub commit_min_bytes: u32,
    pub tomb_raider: bool,
    pub tomb_raider_sleep_usec: u32,
    pub max_reqs_queued: u32,
    pub max_lag_sec: i32,
    pub scheduler_mode: SchedulerMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_names: Vec::new(),
            test_duration_sec: 0,
            read_reqs_per_sec: 0,
            write_reqs_per_sec: 0,
            num_queues: detected_cpu_count(),
            threads_per_queue: 4,
            report_interval_sec: 1,
            us_histograms: false,
            record_bytes: 1536,
            record_bytes_range_max: 0,
            large_block_op_kbytes: 128,
            replication_factor: 1,
            update_pct: 0,
            defrag_lwm_pct: 50,
            disable_odsync: false,
            commit_to_device: false,
            commit_min_bytes: 0,
            tomb_raider: false,
            tomb_raider_sleep_usec: 0,
            max_reqs_queued: 100_000,
            max_lag_sec: 10,
            scheduler_mode: SchedulerMode::Noop,
        }
    }
}

/// Tracks which required keys actually appeared.
#[derive(Default)]
struct Seen {
    devices: bool,
    duration: bool,
    read_rate: bool,
    write_rate: bool,
}

impl Config {
    /// Load from a configuration file plus inline overrides.
    pub fn load(path: &Path, overrides: &[String]) -> Result<Config> {
        let mut settings = file::read_settings(path)?;

        for raw in overrides {
            settings.push(
                file::split_setting(raw)
                    .with_context(|| format!("bad override '{}'", raw))?,
            );
        }

        Self::from_settings(settings)
    }

    /// Build a configuration from parsed `(key, value)` pairs.
    pub fn from_settings(
        settings: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Config> {
        let mut cfg = Config::default();
        let mut seen = Seen::default();

        for (key, value) in settings {
            cfg.apply(&mut seen, &key, &value)?;
        }

        cfg.validate(&seen)?;

        Ok(cfg)
    }

    fn apply(&mut self, seen: &mut Seen, key: &str, value: &str) -> Result<()> {
        match key {
            "device-names" => {
                self.device_names = value
                    .split(',')
                    .map(|name| name.trim().to_string())
                    .filter(|name| !name.is_empty())
                    .collect();
                seen.devices = true;
            }
            "test-duration-sec" => {
                self.test_duration_sec = parse_u32(key, value)?;
                seen.duration = true;
            }
            "read-reqs-per-sec" => {
                self.read_reqs_per_sec = parse_u32(key, value)?;
                seen.read_rate = true;
            }
            "write-reqs-per-sec" => {
                self.write_reqs_per_sec = parse_u32(key, value)?;
                seen.write_rate = true;
            }
            "num-queues" => self.num_queues = parse_u32(key, value)?,
            "threads-per-queue" => self.threads_per_queue = parse_u32(key, value)?,
            "report-interval-sec" => self.report_interval_sec = parse_u32(key, value)?,
            "microsecond-histograms" => self.us_histograms = parse_bool(key, value)?,
            "record-bytes" => self.record_bytes = parse_u32(key, value)?,
            "record-bytes-range-max" => {
                self.record_bytes_range_max = parse_u32(key, value)?
            }
            "large-block-op-kbytes" => {
                self.large_block_op_kbytes = parse_u32(key, value)?
            }
            "replication-factor" => self.replication_factor = parse_u32(key, value)?,
            "update-pct" => self.update_pct = parse_u32(key, value)?,
            "defrag-lwm-pct" => self.defrag_lwm_pct = parse_u32(key, value)?,
            "disable-odsync" => self.disable_odsync = parse_bool(key, value)?,
            "commit-to-device" => self.commit_to_device = parse_bool(key, value)?,
            "commit-min-bytes" => self.commit_min_bytes = parse_u32(key, value)?,
            "tomb-raider" => self.tomb_raider = parse_bool(key, value)?,
            "tomb-raider-sleep-usec" => {
                self.tomb_raider_sleep_usec = parse_u32(key, value)?
            }
            "max-reqs-queued" => self.max_reqs_queued = parse_u32(key, value)?,
            "max-lag-sec" => self.max_lag_sec = parse_i32(key, value)?,
            "scheduler-mode" => self.scheduler_mode = value.parse()?,
            unknown => warn!("ignoring unknown config key '{}'", unknown),
        }

        Ok(())
    }

    fn validate(&self, seen: &Seen) -> Result<()> {
        if !seen.devices || self.device_names.is_empty() {
            bail!("device-names is required");
        }
        if !seen.duration {
            bail!("test-duration-sec is required");
        }
        if !seen.read_rate {
            bail!("read-reqs-per-sec is required");
        }
        if !seen.write_rate {
            bail!("write-reqs-per-sec is required");
        }
        if self.test_duration_sec == 0 {
            bail!("test-duration-sec must be > 0");
        }
        if self.read_reqs_per_sec == 0 {
            bail!("read-reqs-per-sec must be > 0");
        }
        if self.num_queues == 0 {
            bail!("num-queues must be > 0");
        }
        if self.threads_per_queue == 0 {
            bail!("threads-per-queue must be > 0");
        }
        if self.report_interval_sec == 0 {
            bail!("report-interval-sec must be > 0");
        }
        if self.record_bytes == 0 {
            bail!("record-bytes must be > 0");
        }
        if self.large_block_op_kbytes == 0 {
            bail!("large-block-op-kbytes must be > 0");
        }
        if self.replication_factor == 0 {
            bail!("replication-factor must be > 0");
        }
        if self.defrag_lwm_pct >= 100 {
            bail!("defrag-lwm-pct must be < 100");
        }

        Ok(())
    }

    /// Large-block operation size in bytes.
    #[inline]
    pub fn large_block_bytes(&self) -> u64 {
        self.large_block_op_kbytes as u64 * 1024
    }

    /// Aggregate large-block rate across all devices, both directions.
    ///
    /// Models the write-back fill rate amplified by defragmentation at the
    /// configured low-water mark: records written per second (scaled by the
    /// replication factor) fill large blocks, and each block defragmented
    /// at lwm fullness forces proportionally more block writes.
    pub fn large_block_ops_per_sec(&self) -> f64 {
        if self.write_reqs_per_sec == 0 {
            return 0.0;
        }

        let fill_bytes_per_sec = self.write_reqs_per_sec as f64
            * self.replication_factor as f64
            * self.record_bytes as f64;

        fill_bytes_per_sec * 100.0
            / (self.large_block_bytes() as f64 * (100 - self.defrag_lwm_pct) as f64)
    }

    #[inline]
    pub fn run_us(&self) -> u64 {
        self.test_duration_sec as u64 * 1_000_000
    }

    #[inline]
    pub fn report_interval_us(&self) -> u64 {
        self.report_interval_sec as u64 * 1_000_000
    }

    /// Scheduling lag beyond which a large-block loop declares overload.
    #[inline]
    pub fn max_sleep_lag_us(&self) -> i64 {
        self.max_lag_sec as i64 * 1_000_000
    }

    #[inline]
    pub fn scale(&self) -> HistScale {
        if self.us_histograms {
            HistScale::Microseconds
        } else {
            HistScale::Milliseconds
        }
    }

    /// Echo the effective configuration, reference style.
    pub fn echo(&self) {
        println!("CONFIGURATION");
        println!("device-names: {}", self.device_names.join(","));
        println!("num devices: {}", self.device_names.len());
        println!("test-duration-sec: {}", self.test_duration_sec);
        println!("read-reqs-per-sec: {}", self.read_reqs_per_sec);
        println!("write-reqs-per-sec: {}", self.write_reqs_per_sec);
        println!("num-queues: {}", self.num_queues);
        println!("threads-per-queue: {}", self.threads_per_queue);
        println!("report-interval-sec: {}", self.report_interval_sec);
        println!("microsecond-histograms: {}", yes_no(self.us_histograms));
        println!("record-bytes: {}", self.record_bytes);
        println!("record-bytes-range-max: {}", self.record_bytes_range_max);
        println!("large-block-op-kbytes: {}", self.large_block_op_kbytes);
        println!("replication-factor: {}", self.replication_factor);
        println!("update-pct: {}", self.update_pct);
        println!("defrag-lwm-pct: {}", self.defrag_lwm_pct);
        println!("disable-odsync: {}", yes_no(self.disable_odsync));
        println!("commit-to-device: {}", yes_no(self.commit_to_device));
        println!("commit-min-bytes: {}", self.commit_min_bytes);
        println!("tomb-raider: {}", yes_no(self.tomb_raider));
        println!("tomb-raider-sleep-usec: {}", self.tomb_raider_sleep_usec);
        println!("max-reqs-queued: {}", self.max_reqs_queued);
        println!("max-lag-sec: {}", self.max_lag_sec);
        println!("scheduler-mode: {}", self.scheduler_mode);
        if self.write_reqs_per_sec != 0 {
            println!(
                "derived large-block ops/sec: {:.1}",
                self.large_block_ops_per_sec()
            );
        }
        println!();
    }
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}

fn detected_cpu_count() -> u32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(1)
}

fn parse_u32(key: &str, value: &str) -> Result<u32> {
    value
        .parse()
        .with_context(|| format!("bad value for {}: '{}'", key, value))
}

fn parse_i32(key: &str, value: &str) -> Result<i32> {
    value
        .parse()
        .with_context(|| format!("bad value for {}: '{}'", key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "yes" | "true" | "1" => Ok(true),
        "no" | "false" | "0" => Ok(false),
        other => bail!("bad value for {}: '{}' (expected yes/no)", key, other),
    }
}
