use std::time::{Duration, Instant};

pub fn now_monotonic() -> Instant {
    Instant::now()
}

/// Elapsed times are sampled with millisecond granularity, which is also the
/// granularity of the oversubmission threshold search.
pub fn elapsed_millis(since: Instant) -> u64 {
    duration_millis(since.elapsed())
}

pub fn duration_millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}
