//! Flattened delimited tables for the output records.
//!
//! Columns are fixed by the fit protocol, not by the records, so every row has
//! the same shape even when a sightline has no fitted model (missing values are
//! empty cells).
//!
//! Floats are written with Rust's shortest round-trip formatting, so scalar
//! columns read back bit-exact. Sequences (spectrum, model curves, candidate
//! BICs) are either written as JSON array text or dropped; stringified
//! sequences lose non-finite values (JSON has no NaN/inf).

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Write;
use std::path::Path;

use csv::StringRecord;

use crate::domain::{ComponentRecord, FitProtocol, NamedStats, ParamStats, SequencePolicy, SightlineRecord};
use crate::error::AppError;

const SIGHTLINE_SCALARS: [&str; 8] = [
    "idx",
    "glon",
    "glat",
    "rms",
    "exception",
    "n_components",
    "bic",
    "multiplicity",
];
const SIGHTLINE_SEQUENCES: [&str; 3] = ["candidate_bics", "model", "spectrum"];
const COMPONENT_SCALARS: [&str; 5] = ["idx", "component", "glon", "glat", "rms"];

fn fmt_f64(v: f64) -> String {
    v.to_string()
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(fmt_f64).unwrap_or_default()
}

fn stat_columns(name: &str) -> impl Iterator<Item = String> + '_ {
    ParamStats::COLUMNS.iter().map(move |s| format!("{name}_{s}"))
}

fn push_stats(row: &mut Vec<String>, stats: &[NamedStats], name: &str) {
    match stats.iter().find(|s| s.name == name) {
        Some(s) => row.extend(s.stats.values().into_iter().map(fmt_opt)),
        None => row.extend(std::iter::repeat_n(String::new(), ParamStats::COLUMNS.len())),
    }
}

fn json_text<T: serde::Serialize>(value: &T) -> Result<String, AppError> {
    serde_json::to_string(value).map_err(|e| AppError::new(4, format!("Failed to stringify sequence column: {e}")))
}

/// Parameter names whose statistics appear in the sightline table.
fn sightline_params(protocol: &FitProtocol) -> Vec<String> {
    (0..=protocol.baseline_degree)
        .map(|i| protocol.baseline_name(i))
        .chain(protocol.global_params.iter().cloned())
        .collect()
}

/// Sightline table header.
pub fn sightline_header(protocol: &FitProtocol, policy: SequencePolicy) -> Vec<String> {
    let mut header: Vec<String> = SIGHTLINE_SCALARS.iter().map(|s| s.to_string()).collect();
    for p in sightline_params(protocol) {
        header.extend(stat_columns(&p));
    }
    if policy == SequencePolicy::Stringify {
        header.extend(SIGHTLINE_SEQUENCES.iter().map(|s| s.to_string()));
    }
    header
}

/// Component table header.
pub fn component_header(protocol: &FitProtocol, policy: SequencePolicy) -> Vec<String> {
    let mut header: Vec<String> = COMPONENT_SCALARS.iter().map(|s| s.to_string()).collect();
    for p in protocol.component_params() {
        header.extend(stat_columns(&p));
    }
    if policy == SequencePolicy::Stringify {
        header.push("model".to_string());
    }
    header
}

/// Write sightline records as CSV.
pub fn write_sightline_table<W: Write>(
    writer: W,
    records: &[SightlineRecord],
    protocol: &FitProtocol,
    policy: SequencePolicy,
) -> Result<(), AppError> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(sightline_header(protocol, policy))
        .map_err(|e| AppError::new(2, format!("Failed to write sightline table header: {e}")))?;

    let baseline: Vec<String> = (0..=protocol.baseline_degree).map(|i| protocol.baseline_name(i)).collect();
    for r in records {
        let mut row = vec![
            r.idx.to_string(),
            fmt_f64(r.glon),
            fmt_f64(r.glat),
            fmt_f64(r.rms),
            r.exception.clone().unwrap_or_default(),
            r.n_components.to_string(),
            fmt_opt(r.bic),
            r.multiplicity.to_string(),
        ];
        for p in &baseline {
            push_stats(&mut row, &r.baseline, p);
        }
        for p in &protocol.global_params {
            push_stats(&mut row, &r.globals, p);
        }
        if policy == SequencePolicy::Stringify {
            row.push(json_text(&r.candidate_bics)?);
            row.push(json_text(&r.model)?);
            row.push(json_text(&r.spectrum)?);
        }
        out.write_record(&row)
            .map_err(|e| AppError::new(2, format!("Failed to write sightline table row: {e}")))?;
    }
    out.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush sightline table: {e}")))?;
    Ok(())
}

/// Write component records as CSV.
pub fn write_component_table<W: Write>(
    writer: W,
    records: &[ComponentRecord],
    protocol: &FitProtocol,
    policy: SequencePolicy,
) -> Result<(), AppError> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(component_header(protocol, policy))
        .map_err(|e| AppError::new(2, format!("Failed to write component table header: {e}")))?;

    let params = protocol.component_params();
    for r in records {
        let mut row = vec![
            r.idx.to_string(),
            r.component.to_string(),
            fmt_f64(r.glon),
            fmt_f64(r.glat),
            fmt_f64(r.rms),
        ];
        for p in &params {
            push_stats(&mut row, &r.params, p);
        }
        if policy == SequencePolicy::Stringify {
            row.push(json_text(&r.model)?);
        }
        out.write_record(&row)
            .map_err(|e| AppError::new(2, format!("Failed to write component table row: {e}")))?;
    }
    out.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush component table: {e}")))?;
    Ok(())
}

/// Scalar view of one sightline table row.
#[derive(Debug, Clone, PartialEq)]
pub struct SightlineRow {
    pub idx: u64,
    pub glon: f64,
    pub glat: f64,
    pub rms: f64,
    pub exception: Option<String>,
    pub n_components: usize,
    pub bic: Option<f64>,
    pub multiplicity: usize,
    /// Statistic columns that had a value, keyed by column name.
    pub stats: BTreeMap<String, f64>,
    /// Stringified sequences, when the table kept them.
    pub sequences: BTreeMap<String, String>,
}

/// Read a sightline table back.
pub fn read_sightline_table(path: &Path) -> Result<Vec<SightlineRow>, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open sightline table '{}': {e}", path.display())))?;
    let mut reader = csv::Reader::from_reader(file);
    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read sightline table headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);
    for col in SIGHTLINE_SCALARS {
        if !header_map.contains_key(col) {
            return Err(AppError::new(2, format!("Sightline table is missing column '{col}'.")));
        }
    }

    let mut rows = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let line = i + 2;
        let record = result.map_err(|e| AppError::new(2, format!("Sightline table line {line}: {e}")))?;
        rows.push(parse_row(&record, &headers, &header_map).map_err(|e| AppError::new(2, format!("Sightline table line {line}: {e}")))?);
    }
    Ok(rows)
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.trim().to_string(), idx))
        .collect()
}

fn cell<'a>(record: &'a StringRecord, header_map: &HashMap<String, usize>, name: &str) -> &'a str {
    header_map
        .get(name)
        .and_then(|&i| record.get(i))
        .unwrap_or("")
}

fn parse_row(
    record: &StringRecord,
    headers: &StringRecord,
    header_map: &HashMap<String, usize>,
) -> Result<SightlineRow, String> {
    let cell = |name: &str| cell(record, header_map, name);
    let float = |name: &str| -> Result<f64, String> {
        cell(name)
            .parse::<f64>()
            .map_err(|_| format!("invalid {name} '{}'", cell(name)))
    };
    let opt_float = |name: &str| -> Result<Option<f64>, String> {
        match cell(name) {
            "" => Ok(None),
            _ => float(name).map(Some),
        }
    };
    let count = |name: &str| -> Result<usize, String> {
        cell(name)
            .parse::<usize>()
            .map_err(|_| format!("invalid {name} '{}'", cell(name)))
    };

    let mut stats = BTreeMap::new();
    let mut sequences = BTreeMap::new();
    for (i, name) in headers.iter().enumerate() {
        if SIGHTLINE_SCALARS.contains(&name) {
            continue;
        }
        let value = record.get(i).unwrap_or("");
        if SIGHTLINE_SEQUENCES.contains(&name) {
            sequences.insert(name.to_string(), value.to_string());
        } else if !value.is_empty() {
            let v = value
                .parse::<f64>()
                .map_err(|_| format!("invalid {name} '{value}'"))?;
            stats.insert(name.to_string(), v);
        }
    }

    Ok(SightlineRow {
        idx: cell("idx")
            .parse()
            .map_err(|_| format!("invalid idx '{}'", cell("idx")))?,
        glon: float("glon")?,
        glat: float("glat")?,
        rms: float("rms")?,
        exception: Some(cell("exception").to_string()).filter(|e| !e.is_empty()),
        n_components: count("n_components")?,
        bic: opt_float("bic")?,
        multiplicity: count("multiplicity")?,
        stats,
        sequences,
    })
}
