use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use crate::error::{AkiError, AkiResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlaggerConfig {
    #[serde(default)]
    pub columns: ColumnMap,
    #[serde(default)]
    pub windows: WindowConfig,
    #[serde(default)]
    pub criteria: KdigoCriteria,
    #[serde(default)]
    pub baseline: BaselineConfig,
    #[serde(default)]
    pub admission: AdmissionConfig,
    #[serde(default)]
    pub options: FlaggerOptions,
}

/// External column names for every field of the internal reading schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMap {
    pub patient_id: String,
    pub time: String,
    pub creatinine: String,
    pub inpatient: String,
    pub admission: String,
    pub encounter_id: String,
    pub age: String,
    pub sex: String,
    pub race: String,
    pub baseline_creat: String,
    pub sex_encoding: SexEncoding,
    pub time_format: Option<String>,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            patient_id: "patient_id".to_string(),
            time: "time".to_string(),
            creatinine: "creatinine".to_string(),
            inpatient: "inpatient".to_string(),
            admission: "admission".to_string(),
            encounter_id: "encounter_id".to_string(),
            age: "age".to_string(),
            sex: "female".to_string(),
            race: "black".to_string(),
            baseline_creat: "baseline_creat".to_string(),
            sex_encoding: SexEncoding::Female,
            time_format: None,
        }
    }
}

/// What a `true` in the sex column means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SexEncoding {
    Female,
    Male,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub window1: WindowDuration,
    pub window2: WindowDuration,
    pub pad1: WindowDuration,
    pub pad2: WindowDuration,
    /// Added on top of each padded window so readings exactly at the nominal edge still count.
    pub boundary_slack: WindowDuration,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            window1: WindowDuration::from_hours(48),
            window2: WindowDuration::from_hours(168),
            pad1: WindowDuration::from_hours(0),
            pad2: WindowDuration::from_hours(0),
            boundary_slack: WindowDuration::from_seconds(1),
        }
    }
}

impl WindowConfig {
    /// Short (0.3 mg/dL rise) window, padding and slack included.
    pub fn short_window(&self) -> Duration {
        self.window1.as_duration() + self.pad1.as_duration() + self.boundary_slack.as_duration()
    }

    /// Long (relative rise) window, padding and slack included.
    pub fn long_window(&self) -> Duration {
        self.window2.as_duration() + self.pad2.as_duration() + self.boundary_slack.as_duration()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KdigoCriteria {
    /// Stage 1 absolute rise in mg/dL over the short window.
    pub absolute_rise: f64,
    /// Stage 1 relative rise over the long window.
    pub relative_rise: f64,
    pub stage2_factor: f64,
    pub stage3_factor: f64,
    /// Both sides of every threshold comparison are rounded to this many decimals.
    pub rounding_decimals: u32,
}

impl Default for KdigoCriteria {
    fn default() -> Self {
        Self {
            absolute_rise: 0.3,
            relative_rise: 1.5,
            stage2_factor: 2.0,
            stage3_factor: 3.0,
            rounding_decimals: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    pub lookback_start_days: i64,
    pub lookback_end_days: i64,
    /// eGFR (mL/min/1.73 m^2) assumed when inverting CKD-EPI.
    pub assumed_egfr: f64,
    pub back_calc_lookbehind_hours: i64,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            lookback_start_days: 365,
            lookback_end_days: 7,
            assumed_egfr: 75.0,
            back_calc_lookbehind_hours: 6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    pub max_gap_hours: i64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self { max_gap_hours: 72 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlaggerOptions {
    pub historical_trumping: bool,
    pub egfr_impute: bool,
    pub add_stages: bool,
    pub sort_values: bool,
    pub back_calculate: bool,
    pub keep_null_back_calc: bool,
    pub add_min_creat: bool,
    pub add_baseline_creat: bool,
    pub add_admission_col: bool,
    pub add_imputed_encounter: bool,
}

impl Default for FlaggerOptions {
    fn default() -> Self {
        Self {
            historical_trumping: false,
            egfr_impute: false,
            add_stages: true,
            sort_values: true,
            back_calculate: false,
            keep_null_back_calc: false,
            add_min_creat: false,
            add_baseline_creat: false,
            add_admission_col: false,
            add_imputed_encounter: false,
        }
    }
}

/// A duration written as `<number><unit>`, e.g. `48hours`, `7 days`, `1second`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WindowDuration {
    millis: i64,
}

impl WindowDuration {
    pub fn from_hours(hours: i64) -> Self {
        Self { millis: hours * 3_600_000 }
    }

    pub fn from_seconds(seconds: i64) -> Self {
        Self { millis: seconds * 1_000 }
    }

    pub fn as_duration(&self) -> Duration {
        Duration::milliseconds(self.millis)
    }

    pub fn parse(input: &str) -> AkiResult<Self> {
        let trimmed = input.trim();
        let split = trimmed
            .find(|c: char| c.is_ascii_alphabetic())
            .ok_or_else(|| AkiError::InvalidDuration(format!("'{}' has no unit", input)))?;
        let (number, unit) = trimmed.split_at(split);

        let value: f64 = number
            .trim()
            .parse()
            .map_err(|_| AkiError::InvalidDuration(format!("'{}' has an invalid number", input)))?;
        if !value.is_finite() || value < 0.0 {
            return Err(AkiError::InvalidDuration(format!("'{}' must be non-negative", input)));
        }

        let unit_millis = match unit.trim().to_ascii_lowercase().as_str() {
            "ms" | "millisecond" | "milliseconds" => 1.0,
            "s" | "sec" | "secs" | "second" | "seconds" => 1_000.0,
            "m" | "min" | "mins" | "minute" | "minutes" => 60_000.0,
            "h" | "hr" | "hrs" | "hour" | "hours" => 3_600_000.0,
            "d" | "day" | "days" => 86_400_000.0,
            "w" | "week" | "weeks" => 604_800_000.0,
            other => {
                return Err(AkiError::InvalidDuration(format!(
                    "unsupported unit '{}' in '{}'",
                    other, input
                )))
            }
        };

        let millis = value * unit_millis;
        // Keeps NaiveDateTime arithmetic far from overflow.
        if millis > 1.0e15 {
            return Err(AkiError::InvalidDuration(format!("'{}' is too long", input)));
        }
        Ok(Self { millis: millis.round() as i64 })
    }

    /// Whole hours, used to name intermediate columns.
    pub fn whole_hours(duration: Duration) -> i64 {
        duration.num_hours()
    }
}

impl TryFrom<String> for WindowDuration {
    type Error = AkiError;

    fn try_from(value: String) -> AkiResult<Self> {
        Self::parse(&value)
    }
}

impl From<WindowDuration> for String {
    fn from(value: WindowDuration) -> Self {
        value.to_string()
    }
}

impl fmt::Display for WindowDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.millis % 3_600_000 == 0 {
            write!(f, "{}hours", self.millis / 3_600_000)
        } else if self.millis % 1_000 == 0 {
            write!(f, "{}seconds", self.millis / 1_000)
        } else {
            write!(f, "{}milliseconds", self.millis)
        }
    }
}

/// Upper bound on day and hour settings; keeps timestamp arithmetic in range.
const MAX_SPAN_DAYS: i64 = 36_525;
const MAX_SPAN_HOURS: i64 = MAX_SPAN_DAYS * 24;

impl FlaggerConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> AkiResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: FlaggerConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AkiResult<()> {
        if self.windows.window1.as_duration() <= Duration::zero()
            || self.windows.window2.as_duration() <= Duration::zero()
        {
            return Err(AkiError::Validation(
                "Rolling windows must be longer than zero".to_string()
            ));
        }

        self.validate_criteria()?;

        let baseline = &self.baseline;
        if baseline.lookback_end_days < 0 || baseline.lookback_start_days <= baseline.lookback_end_days {
            return Err(AkiError::Validation(format!(
                "Baseline lookback must satisfy start ({}) > end ({}) >= 0 days",
                baseline.lookback_start_days, baseline.lookback_end_days
            )));
        }
        if baseline.lookback_start_days > MAX_SPAN_DAYS {
            return Err(AkiError::Validation(format!(
                "Baseline lookback of {} days exceeds {} days",
                baseline.lookback_start_days, MAX_SPAN_DAYS
            )));
        }
        if baseline.assumed_egfr <= 0.0 {
            return Err(AkiError::Validation(
                "Assumed eGFR must be positive".to_string()
            ));
        }
        if !(0..=MAX_SPAN_HOURS).contains(&baseline.back_calc_lookbehind_hours) {
            return Err(AkiError::Validation(format!(
                "Back-calculation lookbehind must be between 0 and {} hours",
                MAX_SPAN_HOURS
            )));
        }

        if !(1..=MAX_SPAN_HOURS).contains(&self.admission.max_gap_hours) {
            return Err(AkiError::Validation(format!(
                "Admission gap must be between 1 and {} hours",
                MAX_SPAN_HOURS
            )));
        }

        let columns = &self.columns;
        for (field, name) in [
            ("patient_id", &columns.patient_id),
            ("time", &columns.time),
            ("creatinine", &columns.creatinine),
            ("inpatient", &columns.inpatient),
        ] {
            if name.trim().is_empty() {
                return Err(AkiError::Validation(format!(
                    "Column name for {} must not be empty",
                    field
                )));
            }
        }

        Ok(())
    }

    fn validate_criteria(&self) -> AkiResult<()> {
        let criteria = &self.criteria;
        if criteria.absolute_rise <= 0.0 {
            return Err(AkiError::Validation(
                "Absolute creatinine rise must be positive".to_string()
            ));
        }
        if !(criteria.relative_rise > 1.0
            && criteria.stage2_factor > criteria.relative_rise
            && criteria.stage3_factor > criteria.stage2_factor)
        {
            return Err(AkiError::Validation(format!(
                "Stage factors must increase: 1 < {} < {} < {}",
                criteria.relative_rise, criteria.stage2_factor, criteria.stage3_factor
            )));
        }
        if criteria.rounding_decimals > 10 {
            return Err(AkiError::Validation(
                "Rounding decimals must be at most 10".to_string()
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_parsing() {
        assert_eq!(WindowDuration::parse("48hours").unwrap(), WindowDuration::from_hours(48));
        assert_eq!(WindowDuration::parse("7 days").unwrap(), WindowDuration::from_hours(168));
        assert_eq!(WindowDuration::parse("1second").unwrap(), WindowDuration::from_seconds(1));
        assert_eq!(WindowDuration::parse("1.5h").unwrap(), WindowDuration::from_seconds(5400));
        assert_eq!(WindowDuration::parse("0hours").unwrap(), WindowDuration::from_hours(0));

        assert!(WindowDuration::parse("48").is_err());
        assert!(WindowDuration::parse("fortyeight hours").is_err());
        assert!(WindowDuration::parse("3 fortnights").is_err());
        assert!(WindowDuration::parse("-2hours").is_err());
    }

    #[test]
    fn test_default_windows_include_slack() {
        let windows = WindowConfig::default();
        assert_eq!(windows.short_window(), Duration::hours(48) + Duration::seconds(1));
        assert_eq!(windows.long_window(), Duration::hours(168) + Duration::seconds(1));
        assert_eq!(WindowDuration::whole_hours(windows.short_window()), 48);
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: FlaggerConfig = serde_json::from_str("{}").unwrap();
        config.validate().unwrap();
        assert_eq!(config.columns.creatinine, "creatinine");
        assert_eq!(config.criteria.rounding_decimals, 4);
        assert!(config.options.add_stages);
        assert!(!config.options.historical_trumping);
    }

    #[test]
    fn test_partial_json_overrides() {
        let json = r#"{
            "columns": { "patient_id": "mrn", "sex": "male", "sex_encoding": "male" },
            "windows": { "window1": "24hours", "pad2": "4hours" },
            "options": { "historical_trumping": true }
        }"#;
        let config: FlaggerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.columns.patient_id, "mrn");
        assert_eq!(config.columns.time, "time");
        assert_eq!(config.columns.sex_encoding, SexEncoding::Male);
        assert_eq!(config.windows.window1, WindowDuration::from_hours(24));
        assert_eq!(config.windows.long_window(), Duration::hours(172) + Duration::seconds(1));
        assert!(config.options.historical_trumping);
    }

    #[test]
    fn test_invalid_duration_in_json() {
        let json = r#"{ "windows": { "window1": "two days" } }"#;
        assert!(serde_json::from_str::<FlaggerConfig>(json).is_err());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = FlaggerConfig::default();
        config.criteria.stage2_factor = 1.2;
        assert!(matches!(config.validate(), Err(AkiError::Validation(_))));

        let mut config = FlaggerConfig::default();
        config.windows.window1 = WindowDuration::from_hours(0);
        assert!(config.validate().is_err());

        let mut config = FlaggerConfig::default();
        config.baseline.lookback_end_days = 400;
        assert!(config.validate().is_err());

        let mut config = FlaggerConfig::default();
        config.columns.creatinine = " ".to_string();
        assert!(config.validate().unwrap_err().is_configuration());
    }

    #[test]
    fn test_validation_bounds_day_and_hour_settings() {
        let mut config = FlaggerConfig::default();
        config.baseline.lookback_start_days = 200_000_000;
        assert!(matches!(config.validate(), Err(AkiError::Validation(_))));

        let mut config = FlaggerConfig::default();
        config.baseline.back_calc_lookbehind_hours = i64::MAX;
        assert!(matches!(config.validate(), Err(AkiError::Validation(_))));

        let mut config = FlaggerConfig::default();
        config.admission.max_gap_hours = 10_000_000_000;
        assert!(matches!(config.validate(), Err(AkiError::Validation(_))));

        let mut config = FlaggerConfig::default();
        config.baseline.lookback_start_days = MAX_SPAN_DAYS;
        config.baseline.back_calc_lookbehind_hours = MAX_SPAN_HOURS;
        config.admission.max_gap_hours = MAX_SPAN_HOURS;
        config.validate().unwrap();
    }

    #[test]
    fn test_duration_serializes_back_to_string() {
        let value = serde_json::to_value(WindowConfig::default()).unwrap();
        assert_eq!(value["window1"], "48hours");
        assert_eq!(value["boundary_slack"], "1seconds");
    }
}
