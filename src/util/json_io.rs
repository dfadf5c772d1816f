
use anyhow::Context;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::util::staged_output::StagedOutput;

/// Returns true if the path should be gzip-compressed
pub fn is_gzip(filename: &Path) -> bool {
    filename.extension().unwrap_or_default() == "gz"
}

/// Opens a file for reading, decompressing when it ends with `.gz`
/// # Errors
/// * if the file cannot be opened
pub fn open_input(filename: &Path) -> anyhow::Result<Box<dyn Read>> {
    let file = File::open(filename)
        .with_context(|| format!("Error while opening {filename:?}:"))?;
    if is_gzip(filename) {
        Ok(Box::new(flate2::read::MultiGzDecoder::new(file)))
    } else {
        Ok(Box::new(file))
    }
}

/// Loads a JSON file into some type
/// # Arguments
/// * `filename` - the file path to open and parse
/// # Errors
/// * if the file does not open properly
/// * if the deserialization throws errors
pub fn load_json<T: serde::de::DeserializeOwned>(filename: &Path) -> anyhow::Result<T> {
    let reader = open_input(filename)?;
    let result: T = serde_json::from_reader(reader)
        .with_context(|| format!("Error while deserializing {filename:?}:"))?;
    Ok(result)
}

/// Saves a serializable struct as pretty JSON
/// # Arguments
/// * `data` - the data in memory
/// * `out_filename` - user provided path to write to
/// # Errors
/// * if opening or writing to the file throw errors
/// * if JSON serialization throws errors
pub fn save_json<T: serde::Serialize>(data: &T, out_filename: &Path) -> anyhow::Result<()> {
    let mut writer = StagedOutput::create(out_filename)?;
    serde_json::to_writer_pretty(&mut writer, data)
        .with_context(|| format!("Error while serializing {out_filename:?}:"))?;
    writer.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_json_round_trip_gz() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let filename = tmp_dir.path().join("data.json.gz");
        let data: BTreeMap<String, u64> = [("a".to_string(), 1), ("b".to_string(), 2)].into_iter().collect();
        save_json(&data, &filename).unwrap();

        // make sure it is actually compressed
        let mut raw = vec![];
        File::open(&filename).unwrap().read_to_end(&mut raw).unwrap();
        assert_eq!(&raw[..2], &[0x1f, 0x8b]);

        let loaded: BTreeMap<String, u64> = load_json(&filename).unwrap();
        assert_eq!(loaded, data);
    }
}
