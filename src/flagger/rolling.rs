use chrono::{Duration, NaiveDateTime};
use std::collections::VecDeque;
use crate::config::{KdigoCriteria, WindowConfig};
use crate::records::Stage;

/// Rounds to a fixed number of decimals so `>=` is stable at exact thresholds.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

pub fn meets_threshold(value: f64, threshold: f64, decimals: u32) -> bool {
    round_to(value, decimals) >= round_to(threshold, decimals)
}

/// Minimum of `values` over `[times[i] - window, times[i]]` for every `i`.
///
/// Monotonic deque: each index is pushed and popped at most once, so the pass is
/// linear in the number of readings. `times` must be ascending.
pub fn trailing_minimum(times: &[NaiveDateTime], values: &[f64], window: Duration) -> Vec<f64> {
    let mut minima = Vec::with_capacity(values.len());
    let mut candidates: VecDeque<usize> = VecDeque::new();

    for (i, (&time, &value)) in times.iter().zip(values).enumerate() {
        while let Some(&back) = candidates.back() {
            if values[back] >= value {
                candidates.pop_back();
            } else {
                break;
            }
        }
        candidates.push_back(i);

        let window_start = time - window;
        while let Some(&front) = candidates.front() {
            if times[front] < window_start {
                candidates.pop_front();
            } else {
                break;
            }
        }

        // The current index is never evicted, so the deque is non-empty here.
        minima.push(candidates.front().map_or(value, |&front| values[front]));
    }

    minima
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RollingMinima {
    pub short: Vec<f64>,
    pub long: Vec<f64>,
}

impl RollingMinima {
    pub fn compute(times: &[NaiveDateTime], creatinine: &[f64], windows: &WindowConfig) -> Self {
        Self {
            short: trailing_minimum(times, creatinine, windows.short_window()),
            long: trailing_minimum(times, creatinine, windows.long_window()),
        }
    }
}

/// The individual KDIGO conditions evaluated for one reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageConditions {
    /// Absolute rise over the short-window minimum (c1).
    pub absolute: bool,
    /// Relative rise over the reference value (c2).
    pub relative: bool,
    pub doubled: bool,
    pub tripled: bool,
}

impl StageConditions {
    pub fn against_rolling(creatinine: f64, short_min: f64, long_min: f64, criteria: &KdigoCriteria) -> Self {
        let decimals = criteria.rounding_decimals;
        Self {
            absolute: meets_threshold(creatinine, short_min + criteria.absolute_rise, decimals),
            ..Self::against_reference(creatinine, long_min, criteria)
        }
    }

    /// Purely multiplicative conditions against a fixed reference value.
    pub fn against_reference(creatinine: f64, reference: f64, criteria: &KdigoCriteria) -> Self {
        let decimals = criteria.rounding_decimals;
        Self {
            absolute: false,
            relative: meets_threshold(creatinine, criteria.relative_rise * reference, decimals),
            doubled: meets_threshold(creatinine, criteria.stage2_factor * reference, decimals),
            tripled: meets_threshold(creatinine, criteria.stage3_factor * reference, decimals),
        }
    }

    pub fn stage1(&self) -> bool {
        self.absolute || self.relative
    }

    pub fn stage(&self) -> Stage {
        Stage::from_conditions(self.stage1(), self.doubled, self.tripled)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RollingOutcome {
    pub minima: RollingMinima,
    pub conditions: Vec<StageConditions>,
}

impl RollingOutcome {
    pub fn stages(&self) -> Vec<Stage> {
        self.conditions.iter().map(StageConditions::stage).collect()
    }
}

/// Rolling-window KDIGO evaluation for one patient's ascending series.
pub fn rolling_window_stage(
    times: &[NaiveDateTime],
    creatinine: &[f64],
    windows: &WindowConfig,
    criteria: &KdigoCriteria,
) -> RollingOutcome {
    let minima = RollingMinima::compute(times, creatinine, windows);
    let conditions = creatinine
        .iter()
        .zip(minima.short.iter().zip(&minima.long))
        .map(|(&value, (&short_min, &long_min))| {
            StageConditions::against_rolling(value, short_min, long_min, criteria)
        })
        .collect();

    RollingOutcome { minima, conditions }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rand_distr::{Distribution, Normal};

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 2, 26)
            .unwrap()
            .and_hms_opt(12, 0, 2)
            .unwrap()
    }

    fn stages_for(offsets_hours: &[i64], values: &[f64]) -> Vec<u8> {
        let times: Vec<_> = offsets_hours.iter().map(|&h| start() + Duration::hours(h)).collect();
        rolling_window_stage(&times, values, &WindowConfig::default(), &KdigoCriteria::default())
            .stages()
            .into_iter()
            .map(Stage::as_u8)
            .collect()
    }

    fn brute_force_minimum(times: &[NaiveDateTime], values: &[f64], window: Duration) -> Vec<f64> {
        times
            .iter()
            .map(|&t| {
                times
                    .iter()
                    .zip(values)
                    .filter(|(s, _)| **s >= t - window && **s <= t)
                    .map(|(_, &v)| v)
                    .fold(f64::INFINITY, f64::min)
            })
            .collect()
    }

    #[test]
    fn test_rounding_makes_boundary_inclusive() {
        assert!(meets_threshold(1.3, 1.0 + 0.3, 4));
        assert!(meets_threshold(1.5, 1.5 * 1.0, 4));
        assert!(!meets_threshold(1.29, 1.0 + 0.3, 4));
        assert!(meets_threshold(2.1, 1.5 * 1.4, 4));
        assert_eq!(round_to(1.23456, 4), 1.2346);
    }

    #[test]
    fn test_trailing_minimum_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(42);
        let normal = Normal::new(1.2, 0.4).unwrap();
        let window = Duration::hours(48) + Duration::seconds(1);

        for _ in 0..20 {
            let mut time = start();
            let mut times = Vec::new();
            let mut values = Vec::new();
            for _ in 0..rng.gen_range(1..60) {
                time += Duration::minutes(rng.gen_range(1..4000));
                times.push(time);
                let value: f64 = normal.sample(&mut rng);
                values.push(value.max(0.1));
            }

            assert_eq!(
                trailing_minimum(&times, &values, window),
                brute_force_minimum(&times, &values, window)
            );
        }
    }

    #[test]
    fn test_window_edge_one_second_slack() {
        let window = WindowConfig::default().short_window();
        let base = start();

        let included = vec![base, base + Duration::hours(48) + Duration::seconds(1)];
        assert_eq!(trailing_minimum(&included, &[1.0, 1.4], window), vec![1.0, 1.0]);

        let excluded = vec![base, base + Duration::hours(48) + Duration::seconds(2)];
        assert_eq!(trailing_minimum(&excluded, &[1.0, 1.4], window), vec![1.0, 1.4]);
    }

    #[test]
    fn test_simple_rolling_window_staging() {
        // 1.0 baseline, +0.3 next day, doubling and tripling within the week.
        assert_eq!(stages_for(&[0, 24], &[1.0, 1.3]), vec![0, 1]);
        assert_eq!(stages_for(&[0, 24, 72], &[1.0, 1.3, 2.0]), vec![0, 1, 2]);
        assert_eq!(stages_for(&[0, 24, 72, 120], &[1.0, 1.3, 2.0, 3.0]), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_rolling_window_main_sequence() {
        // 2020-02-26 12:00:02 outpatient, then four readings at 12:00:01 on later days.
        let base = start();
        let times = vec![
            base,
            base + Duration::hours(48) - Duration::seconds(1),
            base + Duration::hours(72) - Duration::seconds(1),
            base + Duration::hours(96) - Duration::seconds(1),
            base + Duration::hours(144) - Duration::seconds(1),
        ];
        let values = vec![1.2, 1.5, 1.6, 1.8, 1.8];

        let outcome = rolling_window_stage(&times, &values, &WindowConfig::default(), &KdigoCriteria::default());
        let flagged: Vec<bool> = outcome.stages().iter().map(|s| s.is_aki()).collect();
        assert_eq!(flagged, vec![false, true, false, true, true]);
        assert_eq!(outcome.minima.short, vec![1.2, 1.2, 1.5, 1.5, 1.8]);
        assert_eq!(outcome.minima.long, vec![1.2; 5]);
    }

    #[test]
    fn test_rolling_window_edge_sequence() {
        let base = start();
        let times = vec![
            base,
            base + Duration::hours(48),
            base + Duration::hours(120),
            base + Duration::hours(312),
        ];
        let values = vec![1.3, 1.5999, 3.0, 400.0];

        let outcome = rolling_window_stage(&times, &values, &WindowConfig::default(), &KdigoCriteria::default());
        let flagged: Vec<bool> = outcome.stages().iter().map(|s| s.is_aki()).collect();
        assert_eq!(flagged, vec![false, false, true, false]);
    }

    #[test]
    fn test_stages_are_monotonic() {
        let mut rng = StdRng::seed_from_u64(7);
        let normal = Normal::new(1.5, 0.8).unwrap();
        let mut time = start();
        let mut times = Vec::new();
        let mut values = Vec::new();
        for _ in 0..500 {
            time += Duration::hours(rng.gen_range(1..30));
            times.push(time);
            let value: f64 = normal.sample(&mut rng);
            values.push(value.max(0.2));
        }

        let outcome = rolling_window_stage(&times, &values, &WindowConfig::default(), &KdigoCriteria::default());
        for conditions in &outcome.conditions {
            if conditions.tripled {
                assert!(conditions.doubled);
            }
            if conditions.doubled {
                assert!(conditions.stage1());
            }
            assert!(conditions.stage().as_u8() <= 3);
        }
    }
}
