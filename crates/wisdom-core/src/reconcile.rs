use crate::format::{rate, scale_complexity, scale_count, seconds};
use crate::types::StatsSnapshot;
use serde::{Deserialize, Serialize};

/// Shown for any optional stat the latest snapshot did not carry.
pub const NOT_AVAILABLE: &str = "N/A";

/// Display-ready stats. Every slot is already formatted; the presentation layer
/// only prints them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayModel {
    pub requests: String,
    pub success: String,
    pub failure: String,
    pub difficulty: String,
    pub difficulty_level: String,
    pub scrypt_r: String,
    pub scrypt_p: String,
    pub complexity: String,
    pub avg_solve: String,
    pub min_solve: String,
    pub max_solve: String,
    pub last_solve: String,
    pub load_requests: String,
    pub load_rps: String,
    pub load_test_active: bool,
}

impl DisplayModel {
    pub fn new() -> Self {
        let na = || NOT_AVAILABLE.to_string();
        Self {
            requests: "0".to_string(),
            success: "0".to_string(),
            failure: "0".to_string(),
            difficulty: na(),
            difficulty_level: na(),
            scrypt_r: na(),
            scrypt_p: na(),
            complexity: na(),
            avg_solve: na(),
            min_solve: na(),
            max_solve: na(),
            last_solve: na(),
            load_requests: "0".to_string(),
            load_rps: "0".to_string(),
            load_test_active: false,
        }
    }
}

impl Default for DisplayModel {
    fn default() -> Self {
        Self::new()
    }
}

/// Fold an incoming snapshot into the display model.
///
/// The snapshot replaces the previous one wholesale: an absent optional field
/// becomes [`NOT_AVAILABLE`], never the previous value. Only the three request
/// counters carry over, and only when the payload omits them entirely.
/// `None` means no payload arrived and leaves the model untouched.
///
/// Fields the service defines as strictly positive (scrypt N/r/p, difficulty
/// level, complexity) treat zero as "not yet observed". Durations and the load
/// rate are non-negative, so a reported zero is shown as a real value.
pub fn reconcile(current: &DisplayModel, incoming: Option<&StatsSnapshot>) -> DisplayModel {
    let Some(stats) = incoming else {
        return current.clone();
    };

    let counter = |value: Option<u64>, last: &str| match value {
        Some(v) => v.to_string(),
        None => last.to_string(),
    };

    DisplayModel {
        requests: counter(stats.request_count, &current.requests),
        success: counter(stats.success_count, &current.success),
        failure: counter(stats.failure_count, &current.failure),
        difficulty: positive(stats.last_difficulty, scale_count),
        difficulty_level: stats
            .last_difficulty_level
            .as_ref()
            .filter(|label| !label.is_unset())
            .map(|label| label.to_string())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        scrypt_r: positive(stats.last_scrypt_r.map(|r| r as f64), |r| r.to_string()),
        scrypt_p: positive(stats.last_scrypt_p.map(|p| p as f64), |p| p.to_string()),
        complexity: positive(stats.estimated_complexity, scale_complexity),
        avg_solve: present(stats.average_solve_time, seconds),
        min_solve: present(stats.min_solve_time, seconds),
        max_solve: present(stats.max_solve_time, seconds),
        last_solve: present(stats.last_solve_time, seconds),
        load_requests: stats.load_test_requests.unwrap_or(0).to_string(),
        load_rps: stats
            .load_test_requests_per_sec
            .map(rate)
            .unwrap_or_else(|| "0".to_string()),
        load_test_active: stats.load_test_active,
    }
}

fn present(value: Option<f64>, fmt: impl Fn(f64) -> String) -> String {
    value
        .map(fmt)
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

fn positive(value: Option<f64>, fmt: impl Fn(f64) -> String) -> String {
    present(value.filter(|v| *v > 0.0), fmt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Label;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn full_snapshot() -> StatsSnapshot {
        StatsSnapshot {
            request_count: Some(12),
            success_count: Some(10),
            failure_count: Some(2),
            last_difficulty: Some(16384.0),
            last_difficulty_level: Some(Label::Level(2)),
            last_scrypt_r: Some(8),
            last_scrypt_p: Some(1),
            estimated_complexity: Some(2.5e12),
            average_solve_time: Some(0.5),
            min_solve_time: Some(0.25),
            max_solve_time: Some(1.0),
            last_solve_time: Some(0.75),
            load_test_requests: Some(42),
            load_test_requests_per_sec: Some(13.7),
            load_test_active: true,
        }
    }

    #[test]
    fn test_counters_only_payload() {
        let stats = StatsSnapshot {
            request_count: Some(100),
            success_count: Some(95),
            failure_count: Some(5),
            load_test_active: false,
            ..Default::default()
        };

        let model = reconcile(&DisplayModel::new(), Some(&stats));
        assert_eq!(model.requests, "100");
        assert_eq!(model.success, "95");
        assert_eq!(model.failure, "5");
        assert_eq!(model.difficulty, NOT_AVAILABLE);
        assert_eq!(model.complexity, NOT_AVAILABLE);
        assert_eq!(model.load_requests, "0");
        assert_eq!(model.load_rps, "0");
        assert!(!model.load_test_active);
    }

    #[test]
    fn test_full_payload_is_formatted() {
        let model = reconcile(&DisplayModel::new(), Some(&full_snapshot()));
        assert_eq!(model.difficulty, "16.4K");
        assert_eq!(model.difficulty_level, "2");
        assert_eq!(model.scrypt_r, "8");
        assert_eq!(model.scrypt_p, "1");
        assert_eq!(model.complexity, "2.50 Tera");
        assert_eq!(model.avg_solve, "0.50s");
        assert_eq!(model.min_solve, "0.25s");
        assert_eq!(model.max_solve, "1.00s");
        assert_eq!(model.last_solve, "0.75s");
        assert_eq!(model.load_requests, "42");
        assert_eq!(model.load_rps, "13.70");
        assert!(model.load_test_active);
    }

    #[test]
    fn test_absent_fields_replace_previous_values() {
        let first = reconcile(&DisplayModel::new(), Some(&full_snapshot()));
        let second = reconcile(&first, Some(&StatsSnapshot::default()));

        // counters were absent, so they carry over
        assert_eq!(second.requests, "12");
        assert_eq!(second.success, "10");
        assert_eq!(second.failure, "2");

        assert_eq!(second.difficulty, NOT_AVAILABLE);
        assert_eq!(second.difficulty_level, NOT_AVAILABLE);
        assert_eq!(second.avg_solve, NOT_AVAILABLE);
        assert_eq!(second.load_requests, "0");
        assert_eq!(second.load_rps, "0");
        assert!(!second.load_test_active);
    }

    #[test]
    fn test_missing_payload_is_noop() {
        let first = reconcile(&DisplayModel::new(), Some(&full_snapshot()));
        assert_eq!(reconcile(&first, None), first);
    }

    #[test]
    fn test_zero_values() {
        let stats = StatsSnapshot {
            last_difficulty: Some(0.0),
            last_difficulty_level: Some(Label::Level(0)),
            last_scrypt_r: Some(0),
            last_scrypt_p: Some(0),
            estimated_complexity: Some(0.0),
            min_solve_time: Some(0.0),
            load_test_requests: Some(0),
            load_test_requests_per_sec: Some(0.0),
            ..Default::default()
        };

        let model = reconcile(&DisplayModel::new(), Some(&stats));
        assert_eq!(model.difficulty, NOT_AVAILABLE);
        assert_eq!(model.difficulty_level, NOT_AVAILABLE);
        assert_eq!(model.scrypt_r, NOT_AVAILABLE);
        assert_eq!(model.scrypt_p, NOT_AVAILABLE);
        assert_eq!(model.complexity, NOT_AVAILABLE);
        assert_eq!(model.min_solve, "0.00s");
        assert_eq!(model.load_requests, "0");
        assert_eq!(model.load_rps, "0.00");
    }

    /// Clear the optional fields selected by `mask` and return the slots that
    /// must then read N/A.
    fn apply_mask(stats: &mut StatsSnapshot, mask: u16) -> Vec<&'static str> {
        let mut omitted = Vec::new();
        let mut omit = |bit: u16, name: &'static str| {
            let gone = mask & (1 << bit) != 0;
            if gone {
                omitted.push(name);
            }
            gone
        };
        if omit(0, "difficulty") {
            stats.last_difficulty = None;
        }
        if omit(1, "difficulty_level") {
            stats.last_difficulty_level = None;
        }
        if omit(2, "scrypt_r") {
            stats.last_scrypt_r = None;
        }
        if omit(3, "scrypt_p") {
            stats.last_scrypt_p = None;
        }
        if omit(4, "complexity") {
            stats.estimated_complexity = None;
        }
        if omit(5, "avg_solve") {
            stats.average_solve_time = None;
        }
        if omit(6, "min_solve") {
            stats.min_solve_time = None;
        }
        if omit(7, "max_solve") {
            stats.max_solve_time = None;
        }
        if omit(8, "last_solve") {
            stats.last_solve_time = None;
        }
        omitted
    }

    fn slots(model: &DisplayModel) -> [(&'static str, &str); 9] {
        [
            ("difficulty", model.difficulty.as_str()),
            ("difficulty_level", model.difficulty_level.as_str()),
            ("scrypt_r", model.scrypt_r.as_str()),
            ("scrypt_p", model.scrypt_p.as_str()),
            ("complexity", model.complexity.as_str()),
            ("avg_solve", model.avg_solve.as_str()),
            ("min_solve", model.min_solve.as_str()),
            ("max_solve", model.max_solve.as_str()),
            ("last_solve", model.last_solve.as_str()),
        ]
    }

    #[test]
    fn test_seeded_presence_masks() {
        let mut rng = StdRng::seed_from_u64(42);
        let previous = reconcile(&DisplayModel::new(), Some(&full_snapshot()));

        for _ in 0..256 {
            let mask: u16 = rng.gen_range(0..512);
            let mut stats = full_snapshot();
            let omitted = apply_mask(&mut stats, mask);
            let model = reconcile(&previous, Some(&stats));

            for (name, value) in slots(&model) {
                assert_eq!(
                    value == NOT_AVAILABLE,
                    omitted.contains(&name),
                    "slot {name} mask {mask:#b}"
                );
            }
        }
    }

    proptest! {
        #[test]
        fn prop_omitted_fields_read_na(
            mask in 0u16..512,
            difficulty in 1u64..10_000_000,
            r in 1u64..64,
            p in 1u64..16,
            complexity in 1.0f64..1e20,
            solve in 0.0f64..120.0,
        ) {
            let mut stats = StatsSnapshot {
                last_difficulty: Some(difficulty as f64),
                last_difficulty_level: Some(Label::Level(3)),
                last_scrypt_r: Some(r),
                last_scrypt_p: Some(p),
                estimated_complexity: Some(complexity),
                average_solve_time: Some(solve),
                min_solve_time: Some(solve),
                max_solve_time: Some(solve),
                last_solve_time: Some(solve),
                ..Default::default()
            };
            let omitted = apply_mask(&mut stats, mask);
            let model = reconcile(&DisplayModel::new(), Some(&stats));

            for (name, value) in slots(&model) {
                prop_assert_eq!(value == NOT_AVAILABLE, omitted.contains(&name));
            }
            if !omitted.contains(&"difficulty") {
                prop_assert_eq!(model.difficulty, scale_count(difficulty as f64));
            }
            if !omitted.contains(&"complexity") {
                prop_assert_eq!(model.complexity, scale_complexity(complexity));
            }
            if !omitted.contains(&"avg_solve") {
                prop_assert_eq!(model.avg_solve, seconds(solve));
            }
        }
    }
}
