//! Persist combined records.
//!
//! A batch writes four files into the output directory:
//! - `sightlines.bin`, `components.bin`: `bincode` blobs of the full records
//! - `sightlines.csv`, `components.csv`: flattened tables
//!
//! Every file is first written to a `.tmp` sibling, and renames start only once
//! all four writes succeeded. A failed write therefore leaves the previous
//! outputs untouched and no `.tmp` files behind. Each rename is atomic on its
//! own; the set of four is not, so a rename failure can mix old and new files.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::{CombinedRecords, FitProtocol, SequencePolicy};
use crate::error::AppError;
use crate::io::table::{write_component_table, write_sightline_table};

pub const SIGHTLINES_BIN: &str = "sightlines.bin";
pub const COMPONENTS_BIN: &str = "components.bin";
pub const SIGHTLINES_CSV: &str = "sightlines.csv";
pub const COMPONENTS_CSV: &str = "components.csv";

/// Where a batch's outputs ended up.
#[derive(Debug, Clone)]
pub struct PersistedPaths {
    pub sightlines_bin: PathBuf,
    pub components_bin: PathBuf,
    pub sightlines_csv: PathBuf,
    pub components_csv: PathBuf,
}

impl PersistedPaths {
    fn in_dir(dir: &Path) -> Self {
        Self {
            sightlines_bin: dir.join(SIGHTLINES_BIN),
            components_bin: dir.join(COMPONENTS_BIN),
            sightlines_csv: dir.join(SIGHTLINES_CSV),
            components_csv: dir.join(COMPONENTS_CSV),
        }
    }

    fn all(&self) -> [&Path; 4] {
        [
            &self.sightlines_bin,
            &self.components_bin,
            &self.sightlines_csv,
            &self.components_csv,
        ]
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn create(path: &Path) -> Result<BufWriter<File>, AppError> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| AppError::new(2, format!("Failed to create '{}': {e}", path.display())))
}

fn finish(mut writer: BufWriter<File>, path: &Path) -> Result<(), AppError> {
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to write '{}': {e}", path.display())))
}

/// Serialize `value` with `bincode`.
pub fn write_binary<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), AppError> {
    let mut writer = create(path)?;
    bincode::serialize_into(&mut writer, value)
        .map_err(|e| AppError::new(2, format!("Failed to encode '{}': {e}", path.display())))?;
    finish(writer, path)
}

/// Read back a `bincode` blob written by [`write_binary`].
pub fn read_binary<T: DeserializeOwned>(path: &Path) -> Result<T, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open '{}': {e}", path.display())))?;
    bincode::deserialize_from(BufReader::new(file))
        .map_err(|e| AppError::new(2, format!("Failed to decode '{}': {e}", path.display())))
}

fn stage(
    tmp: &PersistedPaths,
    records: &CombinedRecords,
    protocol: &FitProtocol,
    policy: SequencePolicy,
) -> Result<(), AppError> {
    write_binary(&tmp.sightlines_bin, &records.sightlines)?;
    write_binary(&tmp.components_bin, &records.components)?;

    let writer = create(&tmp.sightlines_csv)?;
    write_sightline_table(writer, &records.sightlines, protocol, policy)?;
    let writer = create(&tmp.components_csv)?;
    write_component_table(writer, &records.components, protocol, policy)?;
    Ok(())
}

/// Write all four outputs into `out_dir`.
pub fn persist_records(
    out_dir: &Path,
    records: &CombinedRecords,
    protocol: &FitProtocol,
    policy: SequencePolicy,
) -> Result<PersistedPaths, AppError> {
    fs::create_dir_all(out_dir)
        .map_err(|e| AppError::new(2, format!("Failed to create output dir '{}': {e}", out_dir.display())))?;

    let paths = PersistedPaths::in_dir(out_dir);
    let tmp = PersistedPaths {
        sightlines_bin: tmp_path(&paths.sightlines_bin),
        components_bin: tmp_path(&paths.components_bin),
        sightlines_csv: tmp_path(&paths.sightlines_csv),
        components_csv: tmp_path(&paths.components_csv),
    };

    if let Err(e) = stage(&tmp, records, protocol, policy) {
        for p in tmp.all() {
            let _ = fs::remove_file(p);
        }
        return Err(e);
    }

    for (from, to) in tmp.all().into_iter().zip(paths.all()) {
        fs::rename(from, to).map_err(|e| {
            AppError::new(
                2,
                format!("Failed to move '{}' to '{}': {e}", from.display(), to.display()),
            )
        })?;
    }

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ComponentRecord, SightlineRecord};

    fn records() -> CombinedRecords {
        let sightline = SightlineRecord {
            idx: 1,
            glon: 10.0,
            glat: 0.5,
            rms: 2.0,
            exception: None,
            n_components: 1,
            bic: Some(100.0),
            multiplicity: 1,
            candidate_bics: vec![120.0, 100.0],
            baseline: vec![],
            globals: vec![],
            model: vec![0.0, 1.0, f64::NAN],
            spectrum: vec![Some(1.0), None],
        };
        let component = ComponentRecord {
            idx: 1,
            component: 0,
            glon: 10.0,
            glat: 0.5,
            rms: 2.0,
            params: vec![],
            model: vec![0.0, 1.0, 0.0],
        };
        CombinedRecords {
            sightlines: vec![sightline],
            components: vec![component],
            ..CombinedRecords::default()
        }
    }

    #[test]
    fn writes_all_outputs_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let paths = persist_records(&out, &records(), &FitProtocol::default(), SequencePolicy::Stringify).unwrap();

        for p in paths.all() {
            assert!(p.exists(), "{} missing", p.display());
            assert!(!tmp_path(p).exists());
        }

        let back: Vec<SightlineRecord> = read_binary(&paths.sightlines_bin).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].spectrum, vec![Some(1.0), None]);
        // The binary form keeps non-finite samples the table cannot.
        assert!(back[0].model[2].is_nan());

        let back: Vec<ComponentRecord> = read_binary(&paths.components_bin).unwrap();
        assert_eq!(back, records().components);
    }

    #[test]
    fn failed_write_keeps_previous_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path();
        let paths = PersistedPaths::in_dir(out);
        for p in paths.all() {
            fs::write(p, "previous").unwrap();
        }
        // A directory in the way makes the last staged file impossible to create.
        fs::create_dir(tmp_path(&paths.components_csv)).unwrap();

        let err = persist_records(out, &records(), &FitProtocol::default(), SequencePolicy::Stringify).unwrap_err();
        assert_eq!(err.exit_code(), 2);

        for p in paths.all() {
            assert_eq!(fs::read_to_string(p).unwrap(), "previous");
        }
        for p in [&paths.sightlines_bin, &paths.components_bin, &paths.sightlines_csv] {
            assert!(!tmp_path(p).exists(), "{} left behind", tmp_path(p).display());
        }
    }

    #[test]
    fn tmp_path_appends_suffix() {
        assert_eq!(tmp_path(Path::new("/a/b/sightlines.csv")), PathBuf::from("/a/b/sightlines.csv.tmp"));
    }
}
