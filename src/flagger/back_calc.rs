use chrono::{Duration, NaiveDateTime};
use crate::config::KdigoCriteria;
use crate::records::Baseline;
use super::rolling::meets_threshold;

/// Window around admission in which readings are compared to the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackCalcWindow {
    pub lookbehind: Duration,
    pub lookahead: Duration,
}

impl BackCalcWindow {
    pub fn contains(&self, time: NaiveDateTime, admission: NaiveDateTime) -> bool {
        time >= admission - self.lookbehind && time <= admission + self.lookahead
    }
}

/// Relative-rise check against the admission baseline.
///
/// `None` means the reading could not be judged: no admission, no baseline, or
/// outside the window.
pub fn back_calc_stage(
    times: &[NaiveDateTime],
    creatinine: &[f64],
    admissions: &[Option<NaiveDateTime>],
    baselines: &[Baseline],
    window: BackCalcWindow,
    criteria: &KdigoCriteria,
) -> Vec<Option<bool>> {
    (0..times.len())
        .map(|i| {
            let admission = admissions[i]?;
            let baseline = baselines[i].value()?;
            if !window.contains(times[i], admission) {
                return None;
            }
            Some(meets_threshold(
                creatinine[i],
                criteria.relative_rise * baseline,
                criteria.rounding_decimals,
            ))
        })
        .collect()
}

/// Coerces undetermined results to `false` unless nulls are kept.
pub fn resolve_nulls(flags: Vec<Option<bool>>, keep_nulls: bool) -> Vec<Option<bool>> {
    if keep_nulls {
        flags
    } else {
        flags.into_iter().map(|flag| Some(flag.unwrap_or(false))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn admission() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 2, 24)
            .unwrap()
            .and_hms_opt(14, 37, 34)
            .unwrap()
    }

    fn window() -> BackCalcWindow {
        BackCalcWindow {
            lookbehind: Duration::hours(6),
            lookahead: Duration::hours(168) + Duration::seconds(1),
        }
    }

    fn flags(offsets_hours: &[i64], values: &[f64], baseline: Baseline) -> Vec<Option<bool>> {
        let times: Vec<_> = offsets_hours.iter().map(|&h| admission() + Duration::hours(h)).collect();
        let admissions = vec![Some(admission()); times.len()];
        let baselines = vec![baseline; times.len()];
        back_calc_stage(&times, values, &admissions, &baselines, window(), &KdigoCriteria::default())
    }

    #[test]
    fn test_relative_rise_within_window() {
        let result = flags(&[24, 48], &[1.5, 1.4], Baseline::Known(1.0));
        assert_eq!(result, vec![Some(true), Some(false)]);
    }

    #[test]
    fn test_readings_outside_window_are_unflagged() {
        let result = flags(&[-7, -6, 168, 169], &[1.5, 1.5, 1.5, 1.5], Baseline::Known(1.0));
        assert_eq!(result, vec![None, Some(true), Some(true), None]);
        assert_eq!(
            resolve_nulls(result, false),
            vec![Some(false), Some(true), Some(true), Some(false)]
        );
    }

    #[test]
    fn test_unknown_baseline_or_admission() {
        let result = flags(&[24], &[3.0], Baseline::Unknown);
        assert_eq!(result, vec![None]);
        assert_eq!(resolve_nulls(result.clone(), true), vec![None]);
        assert_eq!(resolve_nulls(result, false), vec![Some(false)]);

        let times = vec![admission()];
        let result = back_calc_stage(
            &times,
            &[3.0],
            &[None],
            &[Baseline::Known(1.0)],
            window(),
            &KdigoCriteria::default(),
        );
        assert_eq!(result, vec![None]);
    }

    #[test]
    fn test_threshold_is_rounded() {
        // 1.5 x 1.4 is not exactly 2.1 in binary floating point.
        let result = flags(&[120], &[2.1], Baseline::Known(1.4));
        assert_eq!(result, vec![Some(true)]);
    }
}
