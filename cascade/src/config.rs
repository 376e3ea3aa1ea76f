//! Process-level configuration.

use std::sync::OnceLock;

/// Environment variable overriding the default pool size.
const NUM_THREADS_ENV: &str = "LIBASYNC_NUM_THREADS";

/// Number of hardware threads. Never returns 0 (1 is returned instead) and
/// stays constant for the duration of the program.
pub fn hardware_concurrency() -> usize {
    static CACHED: OnceLock<usize> = OnceLock::new();
    *CACHED.get_or_init(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    })
}

/// Worker count for the default pool: `LIBASYNC_NUM_THREADS` when it parses
/// to a positive integer, hardware concurrency otherwise.
pub(crate) fn default_num_threads() -> usize {
    parse_num_threads(std::env::var(NUM_THREADS_ENV).ok())
}

fn parse_num_threads(raw: Option<String>) -> usize {
    raw.and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or_else(hardware_concurrency)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn hardware_concurrency_is_positive_and_stable() {
        let first = hardware_concurrency();
        assert!(first >= 1);
        assert_eq!(hardware_concurrency(), first);
    }

    #[rstest]
    #[case::absent(None)]
    #[case::zero(Some("0"))]
    #[case::garbage(Some("many"))]
    #[case::negative(Some("-2"))]
    fn invalid_overrides_fall_back(#[case] raw: Option<&str>) {
        assert_eq!(
            parse_num_threads(raw.map(String::from)),
            hardware_concurrency()
        );
    }

    #[rstest]
    #[case::one("1", 1)]
    #[case::several("6", 6)]
    #[case::padded(" 3 ", 3)]
    fn valid_overrides_are_used(#[case] raw: &str, #[case] expected: usize) {
        assert_eq!(parse_num_threads(Some(raw.to_string())), expected);
    }
}
