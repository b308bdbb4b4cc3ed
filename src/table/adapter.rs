use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, info};
use super::Table;
use crate::config::{FlaggerConfig, SexEncoding};
use crate::error::{AkiError, AkiResult};
use crate::records::{Demographics, Reading};

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemographicColumns {
    pub age: usize,
    pub sex: usize,
    pub race: usize,
}

/// Positions of the configured columns in one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnBindings {
    pub patient_id: usize,
    pub time: usize,
    pub creatinine: usize,
    pub inpatient: usize,
    pub admission: Option<usize>,
    pub encounter_id: Option<usize>,
    pub baseline_creat: Option<usize>,
    pub demographics: Option<DemographicColumns>,
}

impl ColumnBindings {
    /// Resolves every binding against the header row; missing required columns fail here.
    pub fn resolve(table: &Table, config: &FlaggerConfig) -> AkiResult<Self> {
        let columns = &config.columns;
        let required = |field: &'static str, name: &String| {
            table.column(name).ok_or_else(|| AkiError::MissingColumn {
                field,
                column: name.clone(),
            })
        };

        let patient_id = required("patient_id", &columns.patient_id)?;
        let time = required("time", &columns.time)?;
        let creatinine = required("creatinine", &columns.creatinine)?;
        let inpatient = required("inpatient", &columns.inpatient)?;

        let age = table.column(&columns.age);
        let sex = table.column(&columns.sex);
        let race = table.column(&columns.race);
        let demographics = match (age, sex, race) {
            (Some(age), Some(sex), Some(race)) => Some(DemographicColumns { age, sex, race }),
            _ if config.options.egfr_impute => {
                let missing = [(&columns.age, age), (&columns.sex, sex), (&columns.race, race)]
                    .into_iter()
                    .find(|(_, position)| position.is_none())
                    .map(|(name, _)| name.clone())
                    .unwrap_or_default();
                return Err(AkiError::MissingDemographics { column: missing });
            }
            _ => None,
        };

        let bindings = Self {
            patient_id,
            time,
            creatinine,
            inpatient,
            admission: table.column(&columns.admission),
            encounter_id: table.column(&columns.encounter_id),
            baseline_creat: table.column(&columns.baseline_creat),
            demographics,
        };
        debug!("Resolved column bindings: {:?}", bindings);
        Ok(bindings)
    }
}

/// Translates a table into internal readings, rejecting bad rows before any flagging starts.
pub fn load_readings(table: &Table, config: &FlaggerConfig) -> AkiResult<Vec<Reading>> {
    let bindings = ColumnBindings::resolve(table, config)?;
    let format = config.columns.time_format.as_deref();

    let readings = table
        .rows
        .iter()
        .enumerate()
        .map(|(row, cells)| read_row(row, cells, &bindings, config, format))
        .collect::<AkiResult<Vec<_>>>()?;

    info!("Loaded {} readings from {} columns", readings.len(), table.headers.len());
    Ok(readings)
}

fn cell<'a>(cells: &'a [String], position: usize) -> Option<&'a str> {
    cells
        .get(position)
        .map(|value| value.trim())
        .filter(|value| !is_null(value))
}

fn is_null(value: &str) -> bool {
    value.is_empty()
        || value.eq_ignore_ascii_case("na")
        || value.eq_ignore_ascii_case("nan")
        || value.eq_ignore_ascii_case("null")
        || value.eq_ignore_ascii_case("none")
        || value.eq_ignore_ascii_case("nat")
}

fn read_row(
    row: usize,
    cells: &[String],
    bindings: &ColumnBindings,
    config: &FlaggerConfig,
    format: Option<&str>,
) -> AkiResult<Reading> {
    let creatinine = match cell(cells, bindings.creatinine) {
        Some(value) => parse_number(row, "creatinine", value)?,
        None => return Err(AkiError::NullCreatinine { row }),
    };
    if !creatinine.is_finite() {
        return Err(AkiError::NullCreatinine { row });
    }

    let patient_id = cell(cells, bindings.patient_id)
        .ok_or_else(|| parse_error(row, "patient_id", ""))?
        .to_string();
    let time = cell(cells, bindings.time)
        .ok_or_else(|| parse_error(row, "time", ""))
        .and_then(|value| parse_timestamp(row, "time", value, format))?;
    let inpatient = cell(cells, bindings.inpatient)
        .ok_or_else(|| parse_error(row, "inpatient", ""))
        .and_then(|value| parse_bool(row, "inpatient", value))?;

    let mut reading = Reading::new(patient_id, time, creatinine, inpatient);

    if let Some(value) = bindings.admission.and_then(|position| cell(cells, position)) {
        reading.admission = Some(parse_timestamp(row, "admission", value, format)?);
    }
    if let Some(value) = bindings.encounter_id.and_then(|position| cell(cells, position)) {
        reading.encounter_id = Some(parse_encounter(row, value)?);
    }
    if let Some(value) = bindings.baseline_creat.and_then(|position| cell(cells, position)) {
        reading.baseline_creat = Some(parse_number(row, "baseline_creat", value)?);
    }
    if let Some(columns) = bindings.demographics {
        reading.demographics = read_demographics(row, cells, columns, config)?;
    }

    Ok(reading)
}

fn read_demographics(
    row: usize,
    cells: &[String],
    columns: DemographicColumns,
    config: &FlaggerConfig,
) -> AkiResult<Option<Demographics>> {
    let age = cell(cells, columns.age);
    let sex = cell(cells, columns.sex);
    let race = cell(cells, columns.race);

    let (age, sex, race) = match (age, sex, race) {
        (Some(age), Some(sex), Some(race)) => (age, sex, race),
        _ if config.options.egfr_impute => {
            let field = if age.is_none() {
                "age"
            } else if sex.is_none() {
                "sex"
            } else {
                "race"
            };
            return Err(AkiError::MissingDemographicValue { row, field });
        }
        _ => return Ok(None),
    };

    let sex_flag = parse_bool(row, "sex", sex)?;
    Ok(Some(Demographics {
        age: parse_number(row, "age", age)?,
        is_female: match config.columns.sex_encoding {
            SexEncoding::Female => sex_flag,
            SexEncoding::Male => !sex_flag,
        },
        is_black: parse_bool(row, "race", race)?,
    }))
}

fn parse_error(row: usize, field: &'static str, value: &str) -> AkiError {
    AkiError::Parse {
        row,
        field,
        value: value.to_string(),
    }
}

fn parse_number(row: usize, field: &'static str, value: &str) -> AkiResult<f64> {
    value.parse().map_err(|_| parse_error(row, field, value))
}

fn parse_encounter(row: usize, value: &str) -> AkiResult<u64> {
    if let Ok(id) = value.parse::<u64>() {
        return Ok(id);
    }
    // Encounter ids exported through a float column, e.g. "12345.0".
    match value.parse::<f64>() {
        Ok(id) if id >= 0.0 && id.fract() == 0.0 => Ok(id as u64),
        _ => Err(parse_error(row, "encounter_id", value)),
    }
}

pub fn parse_bool(row: usize, field: &'static str, value: &str) -> AkiResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "1.0" | "yes" | "y" => Ok(true),
        "false" | "f" | "0" | "0.0" | "no" | "n" => Ok(false),
        _ => Err(parse_error(row, field, value)),
    }
}

pub fn parse_timestamp(
    row: usize,
    field: &'static str,
    value: &str,
    format: Option<&str>,
) -> AkiResult<NaiveDateTime> {
    if let Some(format) = format {
        return NaiveDateTime::parse_from_str(value, format)
            .map_err(|_| parse_error(row, field, value));
    }

    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| parse_error(row, field, value))
}
