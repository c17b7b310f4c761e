use once_cell::sync::Lazy;
use std::time::Instant;

static ORIGIN: Lazy<Instant> = Lazy::new(Instant::now);

/// Microseconds elapsed on the process-monotonic clock. Never returns 0 --
/// a zero frame timestamp on the wire means "no sender timestamp".
pub fn monotonic_us() -> u64 {
    (ORIGIN.elapsed().as_micros() as u64).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_is_nonzero_and_nondecreasing() {
        let a = monotonic_us();
        let b = monotonic_us();
        assert!(a >= 1);
        assert!(b >= a);
    }
}
