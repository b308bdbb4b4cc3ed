use std::fs::File;
use std::io::Write;
use std::path::Path;
use log::info;
use super::Table;
use crate::config::{FlaggerConfig, WindowDuration};
use crate::error::AkiResult;
use crate::flagger::{FlaggedReading, FlaggerOutput, FlaggingSummary};

pub const AKI_COLUMN: &str = "aki";
pub const BACK_CALC_COLUMN: &str = "backcalc_aki";
pub const ADMISSION_COLUMN: &str = "imputed_admission";
pub const ENCOUNTER_COLUMN: &str = "imputed_encounter_id";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

type Extractor = Box<dyn Fn(&FlaggedReading) -> String>;

/// Result columns appended after the input columns, in output order.
fn result_columns(table: &Table, config: &FlaggerConfig) -> Vec<(String, Extractor)> {
    let options = &config.options;
    let mut columns: Vec<(String, Extractor)> = Vec::new();

    if options.add_min_creat {
        let short = WindowDuration::whole_hours(config.windows.short_window());
        let long = WindowDuration::whole_hours(config.windows.long_window());
        columns.push((format!("min_creat{}", short), Box::new(|r: &FlaggedReading| r.min_creat_short.to_string())));
        columns.push((format!("min_creat{}", long), Box::new(|r: &FlaggedReading| r.min_creat_long.to_string())));
    }
    if options.add_baseline_creat && table.column(&config.columns.baseline_creat).is_none() {
        columns.push((
            config.columns.baseline_creat.clone(),
            Box::new(|r: &FlaggedReading| r.baseline.value().map(|v| v.to_string()).unwrap_or_default()),
        ));
    }
    if options.add_admission_col {
        columns.push((
            ADMISSION_COLUMN.to_string(),
            Box::new(|r: &FlaggedReading| {
                r.admission
                    .map(|t| t.format(TIMESTAMP_FORMAT).to_string())
                    .unwrap_or_default()
            }),
        ));
    }
    if options.add_imputed_encounter {
        columns.push((
            ENCOUNTER_COLUMN.to_string(),
            Box::new(|r: &FlaggedReading| r.encounter_id.map(|id| id.to_string()).unwrap_or_default()),
        ));
    }
    if options.back_calculate {
        columns.push((
            BACK_CALC_COLUMN.to_string(),
            Box::new(|r: &FlaggedReading| r.back_calc.map(|flag| flag.to_string()).unwrap_or_default()),
        ));
    }
    columns.push((AKI_COLUMN.to_string(), Box::new(|r: &FlaggedReading| r.aki.to_cell())));

    columns
}

/// Writes the input table with the result columns appended.
pub fn write_flagged_to<W: Write>(
    writer: W,
    table: &Table,
    output: &FlaggerOutput,
    config: &FlaggerConfig,
) -> AkiResult<()> {
    let columns = result_columns(table, config);
    let mut writer = csv::Writer::from_writer(writer);

    let mut header = table.headers.clone();
    header.extend(columns.iter().map(|(name, _)| name.clone()));
    writer.write_record(&header)?;

    for (cells, flagged) in table.rows.iter().zip(&output.rows) {
        let mut record = cells.clone();
        record.extend(columns.iter().map(|(_, extract)| extract(flagged)));
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

pub fn write_flagged<P: AsRef<Path>>(
    path: P,
    table: &Table,
    output: &FlaggerOutput,
    config: &FlaggerConfig,
) -> AkiResult<()> {
    let file = File::create(path.as_ref())?;
    write_flagged_to(file, table, output, config)?;
    info!("Flagged table written to {:?}", path.as_ref());
    Ok(())
}

pub fn save_summary<P: AsRef<Path>>(summary: &FlaggingSummary, path: P) -> AkiResult<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, summary)?;
    Ok(())
}
