pub mod admission;
pub mod back_calc;
pub mod baseline;
pub mod fusion;
pub mod rolling;
pub mod summary;

use crate::config::FlaggerConfig;
use crate::error::{AkiError, AkiResult};
use crate::records::{AkiFlag, Baseline, Reading, Stage};
use chrono::{Duration, NaiveDateTime};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashMap;

pub use admission::{infer_admissions, number_encounters};
pub use back_calc::{back_calc_stage, BackCalcWindow};
pub use baseline::{compute_baselines, AdmissionBaselines, BaselineInputs};
pub use fusion::{fuse, FusionInputs};
pub use rolling::{rolling_window_stage, RollingMinima, RollingOutcome};
pub use summary::*;

/// Result for one input row, in input order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlaggedReading {
    pub row: usize,
    pub patient_id: String,
    pub time: NaiveDateTime,
    pub aki: AkiFlag,
    /// Only populated when back-calculation output is enabled.
    pub back_calc: Option<bool>,
    pub min_creat_short: f64,
    pub min_creat_long: f64,
    pub baseline: Baseline,
    pub admission: Option<NaiveDateTime>,
    pub encounter_id: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct FlaggerOutput {
    pub rows: Vec<FlaggedReading>,
    pub summary: FlaggingSummary,
}

/// One patient's readings, sorted and deduplicated, with the input rows behind each.
struct PatientSeries<'a> {
    patient_id: &'a str,
    readings: Vec<&'a Reading>,
    sources: Vec<Vec<usize>>,
    times: Vec<NaiveDateTime>,
    creatinine: Vec<f64>,
    inpatient: Vec<bool>,
}

impl<'a> PatientSeries<'a> {
    fn build(patient_id: &'a str, all: &'a [Reading], rows: &[usize], sort: bool) -> AkiResult<Self> {
        let mut order = rows.to_vec();
        if sort {
            // Stable: the first-seen duplicate stays first.
            order.sort_by_key(|&row| all[row].time);
        } else if order.windows(2).any(|pair| all[pair[1]].time < all[pair[0]].time) {
            return Err(AkiError::UnsortedInput {
                patient_id: patient_id.to_string(),
            });
        }

        let mut series = Self {
            patient_id,
            readings: Vec::with_capacity(order.len()),
            sources: Vec::with_capacity(order.len()),
            times: Vec::with_capacity(order.len()),
            creatinine: Vec::with_capacity(order.len()),
            inpatient: Vec::with_capacity(order.len()),
        };

        for row in order {
            let reading = &all[row];
            if series.times.last() == Some(&reading.time) {
                if let Some(sources) = series.sources.last_mut() {
                    sources.push(row);
                }
                continue;
            }
            series.readings.push(reading);
            series.sources.push(vec![row]);
            series.times.push(reading.time);
            series.creatinine.push(reading.creatinine);
            series.inpatient.push(reading.inpatient);
        }

        Ok(series)
    }

    fn duplicates(&self) -> usize {
        self.sources.iter().map(|rows| rows.len() - 1).sum()
    }
}

struct PatientOutcome {
    admissions: Vec<Option<NaiveDateTime>>,
    baselines: Vec<Baseline>,
    admission_baselines: AdmissionBaselines,
    rolling: RollingOutcome,
    stages: Vec<Stage>,
    back_calc: Vec<Option<bool>>,
}

#[derive(Debug, Clone)]
pub struct Flagger {
    config: FlaggerConfig,
}

impl Flagger {
    pub fn new(config: FlaggerConfig) -> AkiResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &FlaggerConfig {
        &self.config
    }

    /// Flags every reading. Admissions are inferred unless some reading carries
    /// one; encounter ids likewise.
    pub fn flag(&self, readings: &[Reading]) -> AkiResult<FlaggerOutput> {
        self.validate_readings(readings)?;

        let groups = group_by_patient(readings);
        info!(
            "Flagging {} readings across {} patients",
            readings.len(),
            groups.len()
        );

        // Ordering errors surface before any patient is evaluated.
        let sort = self.config.options.sort_values;
        let series: Vec<PatientSeries<'_>> = groups
            .iter()
            .map(|(patient_id, rows)| PatientSeries::build(*patient_id, readings, rows, sort))
            .collect::<AkiResult<_>>()?;

        let infer_admission_times = readings.iter().all(|r| r.admission.is_none());
        let infer_encounters = readings.iter().all(|r| r.encounter_id.is_none());

        let mut assembled: Vec<Option<FlaggedReading>> = (0..readings.len()).map(|_| None).collect();
        let mut admission_summary = AdmissionSummary::default();
        let mut next_encounter = 1;
        let mut n_duplicates = 0;

        for patient in &series {
            let duplicates = patient.duplicates();
            if duplicates > 0 {
                warn!(
                    "Patient {}: {} readings share a timestamp with an earlier one; keeping the first",
                    patient.patient_id, duplicates
                );
                n_duplicates += duplicates;
            }

            let outcome = self.flag_patient(patient, infer_admission_times);
            for (_, baseline) in outcome.admission_baselines.iter() {
                admission_summary.record(baseline);
            }

            let encounters = if infer_encounters {
                number_encounters(&outcome.admissions, &mut next_encounter)
            } else {
                patient.readings.iter().map(|r| r.encounter_id).collect()
            };

            for (i, rows) in patient.sources.iter().enumerate() {
                let flagged = FlaggedReading {
                    row: 0,
                    patient_id: patient.patient_id.to_string(),
                    time: patient.times[i],
                    aki: AkiFlag::from_stage(outcome.stages[i], self.config.options.add_stages),
                    back_calc: outcome.back_calc[i],
                    min_creat_short: outcome.rolling.minima.short[i],
                    min_creat_long: outcome.rolling.minima.long[i],
                    baseline: outcome.baselines[i],
                    admission: outcome.admissions[i],
                    encounter_id: encounters[i],
                };
                for &row in rows {
                    assembled[row] = Some(FlaggedReading { row, ..flagged.clone() });
                }
            }
        }

        let rows: Vec<FlaggedReading> = assembled.into_iter().flatten().collect();
        let summary = FlaggingSummary::from_results(
            &rows,
            series.iter().map(|patient| patient.patient_id),
            admission_summary,
            n_duplicates,
        );
        info!(
            "Flagging completed: {} of {} readings flagged ({} stage 1, {} stage 2, {} stage 3)",
            summary.stages.flagged(),
            summary.n_readings,
            summary.stages.stage1,
            summary.stages.stage2,
            summary.stages.stage3
        );

        Ok(FlaggerOutput { rows, summary })
    }

    fn validate_readings(&self, readings: &[Reading]) -> AkiResult<()> {
        for (row, reading) in readings.iter().enumerate() {
            if !reading.creatinine.is_finite() {
                return Err(AkiError::NullCreatinine { row });
            }
            if self.config.options.egfr_impute && reading.demographics.is_none() {
                return Err(AkiError::MissingDemographicValue {
                    row,
                    field: "demographics",
                });
            }
        }
        Ok(())
    }

    fn flag_patient(&self, patient: &PatientSeries<'_>, infer: bool) -> PatientOutcome {
        let config = &self.config;
        debug!(
            "Flagging patient {} ({} readings)",
            patient.patient_id,
            patient.times.len()
        );

        let admissions = if infer {
            infer_admissions(
                &patient.times,
                &patient.inpatient,
                Duration::hours(config.admission.max_gap_hours),
            )
        } else {
            patient.readings.iter().map(|r| r.admission).collect()
        };

        let demographics: Vec<_> = patient.readings.iter().map(|r| r.demographics).collect();
        let admission_baselines = compute_baselines(
            &BaselineInputs {
                times: &patient.times,
                creatinine: &patient.creatinine,
                inpatient: &patient.inpatient,
                admissions: &admissions,
                demographics: &demographics,
            },
            &config.baseline,
            config.options.egfr_impute,
        );
        let baselines: Vec<Baseline> = patient
            .readings
            .iter()
            .zip(&admissions)
            .map(|(reading, &admission)| match reading.baseline_creat {
                Some(value) => Baseline::Known(value),
                None => admission_baselines.get(admission),
            })
            .collect();

        let rolling = rolling_window_stage(
            &patient.times,
            &patient.creatinine,
            &config.windows,
            &config.criteria,
        );

        let stages = if config.options.historical_trumping {
            fuse(
                &FusionInputs {
                    times: &patient.times,
                    creatinine: &patient.creatinine,
                    admissions: &admissions,
                    baselines: &baselines,
                    rolling: &rolling,
                },
                &config.windows,
                &config.criteria,
            )
        } else {
            rolling.stages()
        };

        let back_calc = if config.options.back_calculate {
            let window = BackCalcWindow {
                lookbehind: Duration::hours(config.baseline.back_calc_lookbehind_hours),
                lookahead: config.windows.long_window(),
            };
            back_calc::resolve_nulls(
                back_calc_stage(
                    &patient.times,
                    &patient.creatinine,
                    &admissions,
                    &baselines,
                    window,
                    &config.criteria,
                ),
                config.options.keep_null_back_calc,
            )
        } else {
            vec![None; patient.times.len()]
        };

        PatientOutcome {
            admissions,
            baselines,
            admission_baselines,
            rolling,
            stages,
            back_calc,
        }
    }
}

/// Row indices per patient, patients in first-seen order.
fn group_by_patient(readings: &[Reading]) -> Vec<(&str, Vec<usize>)> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<(&str, Vec<usize>)> = Vec::new();

    for (row, reading) in readings.iter().enumerate() {
        let id = reading.patient_id.as_str();
        match index.get(id) {
            Some(&position) => groups[position].1.push(row),
            None => {
                index.insert(id, groups.len());
                groups.push((id, vec![row]));
            }
        }
    }

    groups
}
