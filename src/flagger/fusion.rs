use chrono::{Duration, NaiveDateTime};
use crate::config::{KdigoCriteria, WindowConfig};
use crate::records::{Baseline, Stage};
use super::rolling::{RollingOutcome, StageConditions};

/// Reading-aligned inputs for historical-baseline trumping of one patient.
pub struct FusionInputs<'a> {
    pub times: &'a [NaiveDateTime],
    pub creatinine: &'a [f64],
    pub admissions: &'a [Option<NaiveDateTime>],
    pub baselines: &'a [Baseline],
    pub rolling: &'a RollingOutcome,
}

fn within(time: NaiveDateTime, admission: Option<NaiveDateTime>, span: Duration) -> bool {
    admission.map_or(false, |admission| time >= admission && time <= admission + span)
}

/// Merges rolling-window and baseline-relative stages.
///
/// From admission to the end of the long window, a reading with a baseline
/// takes the baseline-relative stage, even when the rolling stage is higher.
/// The absolute-rise criterion cannot be expressed against a baseline, so a
/// reading still at stage 0 within the short window after admission gets the
/// rolling stage-1 check back when its short-window rise qualifies or when it
/// has no baseline.
pub fn fuse(inputs: &FusionInputs<'_>, windows: &WindowConfig, criteria: &KdigoCriteria) -> Vec<Stage> {
    let short_window = windows.short_window();
    let long_window = windows.long_window();

    (0..inputs.times.len())
        .map(|i| {
            let time = inputs.times[i];
            let admission = inputs.admissions[i];
            let rolling = inputs.rolling.conditions[i];
            let baseline = inputs.baselines[i].value();

            let mut stage = match baseline {
                Some(reference) if within(time, admission, long_window) => {
                    StageConditions::against_reference(inputs.creatinine[i], reference, criteria).stage()
                }
                _ => rolling.stage(),
            };

            let absolute_bump = rolling.absolute || baseline.is_none();
            if stage == Stage::None && within(time, admission, short_window) && absolute_bump {
                stage = Stage::from_conditions(rolling.stage1(), false, false);
            }

            stage
        })
        .collect()
}
