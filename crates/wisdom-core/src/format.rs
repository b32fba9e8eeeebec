/// Magnitude labels for operation-count estimates, largest first.
const COMPLEXITY_SCALES: [(f64, &str); 6] = [
    (1e18, "Exa"),
    (1e15, "Peta"),
    (1e12, "Tera"),
    (1e9, "Giga"),
    (1e6, "Mega"),
    (1e3, "Kilo"),
];

/// Scale a count (scrypt N, request totals) to `K`/`M` with one decimal.
///
/// Values below 1000 are rendered in their plain decimal form, so `512.0`
/// becomes `"512"` and `12.5` stays `"12.5"`.
pub fn scale_count(n: f64) -> String {
    if n >= 1e6 {
        format!("{:.1}M", n / 1e6)
    } else if n >= 1e3 {
        format!("{:.1}K", n / 1e3)
    } else {
        n.to_string()
    }
}

/// Scale an operation-count estimate with SI-like labels and two decimals.
pub fn scale_complexity(c: f64) -> String {
    for (threshold, label) in COMPLEXITY_SCALES {
        if c >= threshold {
            return format!("{:.2} {}", c / threshold, label);
        }
    }
    format!("{:.2}", c)
}

/// Duration in seconds, e.g. `"1.25s"`.
pub fn seconds(s: f64) -> String {
    format!("{:.2}s", s)
}

/// Requests-per-second rate, e.g. `"13.70"`.
pub fn rate(r: f64) -> String {
    format!("{:.2}", r)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_count() {
        assert_eq!(scale_count(0.0), "0");
        assert_eq!(scale_count(512.0), "512");
        assert_eq!(scale_count(12.5), "12.5");
        assert_eq!(scale_count(999.0), "999");
        assert_eq!(scale_count(1000.0), "1.0K");
        assert_eq!(scale_count(16384.0), "16.4K");
        assert_eq!(scale_count(1_000_000.0), "1.0M");
        assert_eq!(scale_count(1_048_576.0), "1.0M");
        assert_eq!(scale_count(2_500_000.0), "2.5M");
    }

    #[test]
    fn test_scale_complexity_labels() {
        assert_eq!(scale_complexity(2.5e12), "2.50 Tera");
        assert_eq!(scale_complexity(3e18), "3.00 Exa");
        assert_eq!(scale_complexity(1e15), "1.00 Peta");
        assert_eq!(scale_complexity(7.25e9), "7.25 Giga");
        assert_eq!(scale_complexity(4_194_304.0), "4.19 Mega");
        assert_eq!(scale_complexity(1500.0), "1.50 Kilo");
        assert_eq!(scale_complexity(999.0), "999.00");
        assert_eq!(scale_complexity(0.0), "0.00");
    }

    #[test]
    fn test_scale_complexity_default_challenge() {
        // N=16384, r=8, p=1, keyLen=32, level 1 => 16384*8*32*16
        let c = 16384.0 * 8.0 * 1.0 * 32.0 * 16.0;
        assert_eq!(scale_complexity(c), "67.11 Mega");
    }

    #[test]
    fn test_seconds_and_rate() {
        assert_eq!(seconds(1.254), "1.25s");
        assert_eq!(seconds(0.0), "0.00s");
        assert_eq!(rate(13.7), "13.70");
        assert_eq!(rate(0.0), "0.00");
    }

    #[test]
    fn test_monotonic_within_band() {
        fn leading(s: &str) -> f64 {
            s.trim_end_matches(|c: char| c.is_alphabetic() || c == ' ')
                .parse()
                .unwrap()
        }

        let band = [1e6, 2e6, 5e6, 9.9e6, 1.5e7, 2.5e8];
        for w in band.windows(2) {
            assert!(leading(&scale_complexity(w[0])) <= leading(&scale_complexity(w[1])));
        }

        let counts = [1e3, 2e3, 16384.0, 500_000.0, 999_000.0];
        for w in counts.windows(2) {
            assert!(leading(&scale_count(w[0])) <= leading(&scale_count(w[1])));
        }
    }
}
