use chrono::{Duration, NaiveDateTime};
use log::debug;
use crate::config::BaselineConfig;
use crate::records::{Baseline, Demographics};

// CKD-EPI (Levey et al., 2009) constants.
const CKD_EPI_SCALE: f64 = 141.0;
const CKD_EPI_HIGH_EXPONENT: f64 = -1.209;
const CKD_EPI_AGE_BASE: f64 = 0.993;
const CKD_EPI_FEMALE_FACTOR: f64 = 0.018;
const CKD_EPI_BLACK_FACTOR: f64 = 0.159;

fn kappa(is_female: bool) -> f64 {
    if is_female { 0.7 } else { 0.9 }
}

fn alpha(is_female: bool) -> f64 {
    if is_female { -0.329 } else { -0.411 }
}

fn demographic_scale(demographics: &Demographics) -> f64 {
    let female = if demographics.is_female { 1.0 } else { 0.0 };
    let black = if demographics.is_black { 1.0 } else { 0.0 };
    CKD_EPI_SCALE
        * (1.0 + CKD_EPI_FEMALE_FACTOR * female)
        * (1.0 + CKD_EPI_BLACK_FACTOR * black)
        * CKD_EPI_AGE_BASE.powf(demographics.age)
}

/// Estimated GFR (mL/min/1.73 m^2) from serum creatinine.
pub fn ckd_epi_egfr(creatinine: f64, demographics: &Demographics) -> f64 {
    let ratio = creatinine / kappa(demographics.is_female);
    demographic_scale(demographics)
        * ratio.min(1.0).powf(alpha(demographics.is_female))
        * ratio.max(1.0).powf(CKD_EPI_HIGH_EXPONENT)
}

/// Closed-form inversion of CKD-EPI: the creatinine giving `egfr` for these demographics.
pub fn impute_creatinine_from_egfr(egfr: f64, demographics: &Demographics) -> f64 {
    let kappa = kappa(demographics.is_female);
    let ratio = egfr / demographic_scale(demographics);
    if ratio < 1.0 {
        kappa * ratio.powf(1.0 / CKD_EPI_HIGH_EXPONENT)
    } else {
        kappa * ratio.powf(1.0 / alpha(demographics.is_female))
    }
}

pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Median of outpatient readings in `[admission - start, admission - end]`.
pub fn lookback_median(
    times: &[NaiveDateTime],
    creatinine: &[f64],
    inpatient: &[bool],
    admission: NaiveDateTime,
    config: &BaselineConfig,
) -> Option<f64> {
    let from = admission - Duration::days(config.lookback_start_days);
    let to = admission - Duration::days(config.lookback_end_days);

    let mut eligible: Vec<f64> = (0..times.len())
        .filter(|&i| !inpatient[i] && times[i] >= from && times[i] <= to)
        .map(|i| creatinine[i])
        .collect();

    median(&mut eligible)
}

/// Baselines cached once per admission of one patient.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdmissionBaselines {
    entries: Vec<(NaiveDateTime, Baseline)>,
}

impl AdmissionBaselines {
    pub fn get(&self, admission: Option<NaiveDateTime>) -> Baseline {
        admission
            .and_then(|time| {
                self.entries
                    .binary_search_by(|(candidate, _)| candidate.cmp(&time))
                    .ok()
                    .map(|position| self.entries[position].1)
            })
            .unwrap_or(Baseline::Unknown)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(NaiveDateTime, Baseline)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Inputs for one patient's baseline computation; all slices are reading-aligned.
pub struct BaselineInputs<'a> {
    pub times: &'a [NaiveDateTime],
    pub creatinine: &'a [f64],
    pub inpatient: &'a [bool],
    pub admissions: &'a [Option<NaiveDateTime>],
    pub demographics: &'a [Option<Demographics>],
}

pub fn compute_baselines(
    inputs: &BaselineInputs<'_>,
    config: &BaselineConfig,
    egfr_impute: bool,
) -> AdmissionBaselines {
    let mut distinct: Vec<NaiveDateTime> = inputs.admissions.iter().flatten().copied().collect();
    distinct.sort();
    distinct.dedup();

    let entries = distinct
        .into_iter()
        .map(|admission| {
            let found = lookback_median(
                inputs.times,
                inputs.creatinine,
                inputs.inpatient,
                admission,
                config,
            );

            let baseline = match found {
                Some(value) => Baseline::Known(value),
                None if egfr_impute => admission_demographics(inputs, admission)
                    .map(|demographics| {
                        Baseline::Imputed(impute_creatinine_from_egfr(config.assumed_egfr, &demographics))
                    })
                    .unwrap_or(Baseline::Unknown),
                None => Baseline::Unknown,
            };
            debug!("Admission {}: baseline {:?}", admission, baseline);
            (admission, baseline)
        })
        .collect();

    AdmissionBaselines { entries }
}

fn admission_demographics(inputs: &BaselineInputs<'_>, admission: NaiveDateTime) -> Option<Demographics> {
    inputs
        .admissions
        .iter()
        .zip(inputs.demographics)
        .find_map(|(candidate, demographics)| {
            if *candidate == Some(admission) {
                *demographics
            } else {
                None
            }
        })
}
