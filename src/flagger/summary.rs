use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use super::FlaggedReading;
use crate::records::{AkiFlag, Baseline, Stage};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlaggingSummary {
    pub n_readings: usize,
    pub n_patients: usize,
    pub n_duplicates_dropped: usize,
    pub admissions: AdmissionSummary,
    pub stages: StageSummary,
    pub patients_with_aki: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdmissionSummary {
    pub n_admissions: usize,
    pub baseline_known: usize,
    pub baseline_imputed: usize,
    pub baseline_unknown: usize,
}

impl AdmissionSummary {
    pub fn record(&mut self, baseline: &Baseline) {
        self.n_admissions += 1;
        match baseline {
            Baseline::Known(_) => self.baseline_known += 1,
            Baseline::Imputed(_) => self.baseline_imputed += 1,
            Baseline::Unknown => self.baseline_unknown += 1,
        }
    }
}

/// Row counts per label; boolean output is tallied as `no_aki` / `stage1`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageSummary {
    pub no_aki: usize,
    pub stage1: usize,
    pub stage2: usize,
    pub stage3: usize,
}

impl StageSummary {
    fn record(&mut self, flag: &AkiFlag) {
        let stage = match flag {
            AkiFlag::Staged(stage) => *stage,
            AkiFlag::Any(true) => Stage::Stage1,
            AkiFlag::Any(false) => Stage::None,
        };
        match stage {
            Stage::None => self.no_aki += 1,
            Stage::Stage1 => self.stage1 += 1,
            Stage::Stage2 => self.stage2 += 1,
            Stage::Stage3 => self.stage3 += 1,
        }
    }

    pub fn flagged(&self) -> usize {
        self.stage1 + self.stage2 + self.stage3
    }
}

impl FlaggingSummary {
    pub fn from_results<'a>(
        rows: &[FlaggedReading],
        patient_ids: impl Iterator<Item = &'a str>,
        admissions: AdmissionSummary,
        n_duplicates_dropped: usize,
    ) -> Self {
        let mut stages = StageSummary::default();
        for row in rows {
            stages.record(&row.aki);
        }

        let patients: HashSet<&str> = patient_ids.collect();
        let patients_with_aki: HashSet<&str> = rows
            .iter()
            .filter(|row| row.aki.is_aki())
            .map(|row| row.patient_id.as_str())
            .collect();

        Self {
            n_readings: rows.len(),
            n_patients: patients.len(),
            n_duplicates_dropped,
            admissions,
            stages,
            patients_with_aki: patients_with_aki.len(),
        }
    }
}
