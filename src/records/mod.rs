use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One creatinine measurement, already translated out of the caller's column names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub patient_id: String,
    pub encounter_id: Option<u64>,
    pub time: NaiveDateTime,
    pub creatinine: f64,
    pub inpatient: bool,
    pub admission: Option<NaiveDateTime>,
    pub demographics: Option<Demographics>,
    /// Caller-supplied baseline; overrides the computed one when present.
    pub baseline_creat: Option<f64>,
}

impl Reading {
    pub fn new(patient_id: impl Into<String>, time: NaiveDateTime, creatinine: f64, inpatient: bool) -> Self {
        Self {
            patient_id: patient_id.into(),
            encounter_id: None,
            time,
            creatinine,
            inpatient,
            admission: None,
            demographics: None,
            baseline_creat: None,
        }
    }

    pub fn with_demographics(mut self, demographics: Demographics) -> Self {
        self.demographics = Some(demographics);
        self
    }

    pub fn with_admission(mut self, admission: NaiveDateTime) -> Self {
        self.admission = Some(admission);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Demographics {
    pub age: f64,
    pub is_female: bool,
    pub is_black: bool,
}

/// Pre-admission baseline creatinine for one admission.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Baseline {
    /// Median of outpatient readings in the lookback range, or caller-supplied.
    Known(f64),
    /// No outpatient reading in range; value inverted from CKD-EPI.
    Imputed(f64),
    Unknown,
}

impl Baseline {
    pub fn value(&self) -> Option<f64> {
        match self {
            Baseline::Known(value) | Baseline::Imputed(value) => Some(*value),
            Baseline::Unknown => None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.value().is_some()
    }
}

/// KDIGO stage of a single reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Stage {
    None = 0,
    Stage1 = 1,
    Stage2 = 2,
    Stage3 = 3,
}

impl Stage {
    /// Additive combination of the three stage conditions.
    pub fn from_conditions(stage1: bool, stage2: bool, stage3: bool) -> Self {
        match stage1 as u8 + stage2 as u8 + stage3 as u8 {
            0 => Stage::None,
            1 => Stage::Stage1,
            2 => Stage::Stage2,
            _ => Stage::Stage3,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_aki(self) -> bool {
        self != Stage::None
    }
}

/// Final per-row label: a 0..3 stage, or a plain flag when staging is disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AkiFlag {
    Staged(Stage),
    Any(bool),
}

impl AkiFlag {
    pub fn from_stage(stage: Stage, add_stages: bool) -> Self {
        if add_stages {
            AkiFlag::Staged(stage)
        } else {
            AkiFlag::Any(stage.is_aki())
        }
    }

    pub fn is_aki(&self) -> bool {
        match self {
            AkiFlag::Staged(stage) => stage.is_aki(),
            AkiFlag::Any(flag) => *flag,
        }
    }

    pub fn to_cell(&self) -> String {
        match self {
            AkiFlag::Staged(stage) => stage.as_u8().to_string(),
            AkiFlag::Any(flag) => flag.to_string(),
        }
    }
}
