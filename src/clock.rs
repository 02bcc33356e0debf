//! Local monotonic clock used to stamp samples.

use std::sync::OnceLock;
use std::time::Instant;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Seconds elapsed since the first call in this process.
///
/// Monotonic and shared by every outlet, so timestamps from different streams
/// can be compared directly.
pub fn local_clock() -> f64 {
    EPOCH.get_or_init(Instant::now).elapsed().as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_never_goes_backwards() {
        let mut last = local_clock();
        for _ in 0..1000 {
            let now = local_clock();
            assert!(now >= last);
            last = now;
        }
    }
}
