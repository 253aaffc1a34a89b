//! CSV export for per-node cycle records.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::sim::types::CycleRecord;

/// Column header for CSV telemetry export.
const HEADER: &str = "node,cycle,time,priority,can_shed,interval_kwh,self_forecast_kwh,\
                      aggregate_forecast_kwh,consumed_kwh,cap_kwh,budget_remaining_kwh,\
                      remaining_cycles,peers_known,action,output_level,reason";

/// Exports cycle records to a CSV file at the given path.
///
/// Writes a header row followed by one data row per record. Produces
/// deterministic output for identical inputs.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(records: &[CycleRecord], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_csv(records, buf)
}

/// Writes cycle records as CSV to any writer.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(records: &[CycleRecord], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    wtr.write_record(HEADER.split(',').map(str::trim))?;

    for r in records {
        wtr.write_record(&[
            r.node.0.to_string(),
            r.cycle.to_string(),
            r.time.format("%Y-%m-%dT%H:%M:%S").to_string(),
            r.priority.to_string(),
            r.can_shed.to_string(),
            format!("{:.4}", r.interval_kwh),
            format!("{:.4}", r.self_forecast_kwh),
            format!("{:.4}", r.aggregate_forecast_kwh),
            format!("{:.4}", r.consumed_kwh),
            format!("{:.4}", r.cap_kwh),
            format!("{:.4}", r.budget_remaining_kwh),
            r.remaining_cycles.to_string(),
            r.peers_known.to_string(),
            action_label(r),
            format!("{:.4}", r.output_level),
            format!("{:?}", r.reason),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

fn action_label(r: &CycleRecord) -> String {
    use crate::sim::shedder::ShedAction;
    match r.action {
        ShedAction::On => "on".to_string(),
        ShedAction::Off => "off".to_string(),
        ShedAction::Dim(_) => "dim".to_string(),
    }
}
