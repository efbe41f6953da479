//! Process CPU and memory usage.
//!
//! CPU usage is tracked as an exponential moving average of the fraction of
//! all cores the process kept busy since the previous sample. The sampler
//! is driven from outside (the server samples every couple of seconds); it
//! never spawns anything itself.

use std::time::{Duration, Instant};

use serde::Serialize;

/// Weight the previous average keeps on each new sample.
const EMA_KEEP: f64 = 0.3;

/// Smoothed CPU usage as a fraction of total machine capacity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CpuUsage {
    pub user: f64,
    pub system: f64,
}

impl CpuUsage {
    /// Usage over one sampling interval.
    ///
    /// `user_us` and `system_us` are CPU microseconds consumed during
    /// `elapsed`, spread over `cores` cores.
    pub fn from_delta(user_us: u64, system_us: u64, elapsed: Duration, cores: usize) -> Self {
        let capacity = elapsed.as_secs_f64() * 1_000_000.0 * cores.max(1) as f64;
        if capacity <= 0.0 {
            return Self::default();
        }
        Self {
            user: user_us as f64 / capacity,
            system: system_us as f64 / capacity,
        }
    }

    /// Folds a new sample into the running average.
    pub fn blend(self, sample: CpuUsage) -> CpuUsage {
        CpuUsage {
            user: self.user * EMA_KEEP + sample.user * (1.0 - EMA_KEEP),
            system: self.system * EMA_KEEP + sample.system * (1.0 - EMA_KEEP),
        }
    }
}

/// Memory held by the process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsage {
    /// Resident set size in bytes. On platforms without a cheap current
    /// figure this is the peak resident size instead.
    pub rss_bytes: u64,
}

/// Keeps the CPU average between samples.
#[derive(Debug)]
pub struct ResourceSampler {
    cores: usize,
    last_cpu: Option<(u64, u64)>,
    last_at: Instant,
    usage: CpuUsage,
}

impl Default for ResourceSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSampler {
    pub fn new() -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            cores,
            last_cpu: process_cpu_micros(),
            last_at: Instant::now(),
            usage: CpuUsage::default(),
        }
    }

    /// Takes a CPU sample and returns the updated average.
    pub fn sample(&mut self) -> CpuUsage {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_at);
        let current = process_cpu_micros();

        if let (Some((user, system)), Some((last_user, last_system))) = (current, self.last_cpu) {
            let sample = CpuUsage::from_delta(
                user.saturating_sub(last_user),
                system.saturating_sub(last_system),
                elapsed,
                self.cores,
            );
            self.usage = self.usage.blend(sample);
        }

        self.last_cpu = current;
        self.last_at = now;
        self.usage
    }

    /// The current average without taking a new sample.
    pub fn cpu(&self) -> CpuUsage {
        self.usage
    }

    pub fn memory(&self) -> MemoryUsage {
        MemoryUsage {
            rss_bytes: resident_bytes().unwrap_or(0),
        }
    }
}

// ---------------------------------------------------------------------------
// Platform readings
// ---------------------------------------------------------------------------

#[cfg(unix)]
fn rusage_self() -> Option<libc::rusage> {
    let mut usage = std::mem::MaybeUninit::<libc::rusage>::uninit();
    // SAFETY: getrusage fills the struct on success and we only read it then.
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
    if rc != 0 {
        return None;
    }
    // SAFETY: rc == 0 means the struct was initialized.
    Some(unsafe { usage.assume_init() })
}

#[cfg(unix)]
fn timeval_micros(tv: libc::timeval) -> u64 {
    (tv.tv_sec as u64) * 1_000_000 + tv.tv_usec as u64
}

/// User and system CPU time consumed so far, in microseconds.
#[cfg(unix)]
fn process_cpu_micros() -> Option<(u64, u64)> {
    rusage_self().map(|u| (timeval_micros(u.ru_utime), timeval_micros(u.ru_stime)))
}

#[cfg(not(unix))]
fn process_cpu_micros() -> Option<(u64, u64)> {
    None
}

#[cfg(target_os = "linux")]
fn resident_bytes() -> Option<u64> {
    // Second field of statm is resident pages.
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    // SAFETY: sysconf has no memory-safety preconditions.
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    u64::try_from(page_size).ok().map(|size| pages * size)
}

#[cfg(all(unix, not(target_os = "linux")))]
fn resident_bytes() -> Option<u64> {
    let max_rss = u64::try_from(rusage_self()?.ru_maxrss).ok()?;
    // macOS reports bytes, the BSDs kilobytes.
    if cfg!(target_os = "macos") {
        Some(max_rss)
    } else {
        Some(max_rss * 1024)
    }
}

#[cfg(not(unix))]
fn resident_bytes() -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_delta_normalizes_by_cores_and_time() {
        // One full core out of four, for two seconds.
        let usage = CpuUsage::from_delta(2_000_000, 500_000, Duration::from_secs(2), 4);
        assert!((usage.user - 0.25).abs() < 1e-9);
        assert!((usage.system - 0.0625).abs() < 1e-9);
    }

    #[test]
    fn test_from_delta_zero_elapsed_is_zero() {
        let usage = CpuUsage::from_delta(1_000, 1_000, Duration::ZERO, 2);
        assert_eq!(usage, CpuUsage::default());
    }

    #[test]
    fn test_blend_weights_new_sample_heavier() {
        let old = CpuUsage { user: 1.0, system: 0.0 };
        let new = CpuUsage { user: 0.0, system: 1.0 };
        let blended = old.blend(new);
        assert!((blended.user - 0.3).abs() < 1e-9);
        assert!((blended.system - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_sampler_starts_at_zero() {
        let sampler = ResourceSampler::new();
        assert_eq!(sampler.cpu(), CpuUsage::default());
    }

    #[test]
    fn test_sampler_sample_stays_in_range() {
        let mut sampler = ResourceSampler::new();
        // Burn a little CPU so there's something to measure.
        let mut x = 0u64;
        for i in 0..200_000u64 {
            x = x.wrapping_mul(31).wrapping_add(i);
        }
        std::hint::black_box(x);

        let usage = sampler.sample();
        assert!(usage.user >= 0.0);
        assert!(usage.system >= 0.0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_memory_reports_resident_size_on_linux() {
        let sampler = ResourceSampler::new();
        assert!(sampler.memory().rss_bytes > 0);
    }
}
