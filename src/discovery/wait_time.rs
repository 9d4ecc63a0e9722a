use std::time::Duration;

use crate::constants::MAX_BLOCKING_WAIT_SECS;

/// Duration passed as `wait` on a blocking query.
///
/// Consul adds a random delay of up to `wait/16` before answering, so
/// `read_timeout/8` is reserved to let the response land before the client
/// read timeout fires. Consul rejects waits above 10 minutes. The override
/// only applies when it lies strictly between 1s and the derived value.
pub fn max_wait_time(
    read_timeout: Duration,
    wait_override: Option<Duration>,
) -> Duration {
    let mut d = read_timeout - read_timeout / 8;
    d = d.min(Duration::from_secs(MAX_BLOCKING_WAIT_SECS));
    if let Some(w) = wait_override {
        if w > Duration::from_secs(1) && w < d {
            d = w;
        }
    }
    d
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaves_headroom_for_consul_jitter() {
        let d = max_wait_time(Duration::from_secs(10), None);
        assert_eq!(d, Duration::from_millis(8750));
        assert_eq!(d.as_secs(), 8);
    }

    #[test]
    fn caps_at_ten_minutes() {
        let d = max_wait_time(Duration::from_secs(20 * 60), None);
        assert_eq!(d, Duration::from_secs(600));
    }

    #[test]
    fn override_within_bounds_is_used() {
        let d = max_wait_time(Duration::from_secs(20 * 60), Some(Duration::from_secs(5)));
        assert_eq!(d, Duration::from_secs(5));
    }

    #[test]
    fn override_at_or_below_one_second_is_ignored() {
        let ceiling = Duration::from_secs(20 * 60);
        assert_eq!(
            max_wait_time(ceiling, Some(Duration::from_millis(500))),
            Duration::from_secs(600)
        );
        assert_eq!(
            max_wait_time(ceiling, Some(Duration::from_secs(1))),
            Duration::from_secs(600)
        );
    }

    #[test]
    fn override_above_derived_ceiling_is_ignored() {
        let d = max_wait_time(Duration::from_secs(10), Some(Duration::from_secs(9)));
        assert_eq!(d, Duration::from_millis(8750));
    }
}
