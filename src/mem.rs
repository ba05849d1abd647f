use std::time::{Duration, Instant};
use sysinfo::{System, SystemExt};

const REFRESH_EVERY: Duration = Duration::from_millis(500);

/// Low-overhead available-memory probe owned by one stage run.
/// Refreshes at most every `REFRESH_EVERY`; in between it returns the cached fraction.
pub struct MemoryProbe {
    sys: System,
    last_check: Instant,
    last_frac: f64, // available / total (0.0..1.0)
}

impl MemoryProbe {
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        Self { sys, last_check: Instant::now() - REFRESH_EVERY * 2, last_frac: 1.0 }
    }

    pub fn available_fraction(&mut self) -> f64 {
        let now = Instant::now();
        if now.duration_since(self.last_check) >= REFRESH_EVERY {
            self.sys.refresh_memory();
            let total = self.sys.total_memory() as f64;
            let avail = self.sys.available_memory() as f64;
            self.last_frac = if total > 0.0 { (avail / total).clamp(0.0, 1.0) } else { 1.0 };
            self.last_check = now;
        }
        self.last_frac
    }

    /// True if available memory is below `threshold` (e.g. 0.10 for 10%).
    pub fn is_low(&mut self, threshold: f64) -> bool {
        self.available_fraction() < threshold
    }
}

impl Default for MemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}
