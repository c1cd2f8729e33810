//! CSV export of per-beat feature vectors, one row per beat.

use crate::features::{FeatureVector, FIELD_NAMES};
use anyhow::{Context, Result};
use std::{fs::File, io::Write, path::Path};

/// Write a header row with the feature names followed by one row per beat.
pub fn write_features<W: Write>(writer: W, features: &[FeatureVector]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    // Explicit header so an empty extraction still produces a usable file.
    wtr.write_record(FIELD_NAMES)?;
    for fv in features {
        wtr.write_record(fv.as_array().iter().map(|v| v.to_string()))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_features_file(path: &Path, features: &[FeatureVector]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    write_features(file, features).with_context(|| format!("writing {}", path.display()))
}

pub fn read_features<R: std::io::Read>(reader: R) -> Result<Vec<FeatureVector>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut out = Vec::new();
    for record in rdr.deserialize() {
        out.push(record?);
    }
    Ok(out)
}
