use memmap2::Mmap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, warn};

use crate::config::EncodingMode;
use crate::errors::{CountError, CountResult};

const BUFFER_CAPACITY: usize = 65536;
pub(crate) const MMAP_THRESHOLD: u64 = 10 * 1024 * 1024; // 10MB

/// A named input text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    pub name: String,
    pub text: String,
}

impl Dataset {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Decodes bytes into a String according to the encoding mode
fn decode_bytes(bytes: &[u8], path: &Path, encoding_mode: EncodingMode) -> CountResult<String> {
    match encoding_mode {
        EncodingMode::FailFast => match std::str::from_utf8(bytes) {
            Ok(valid) => Ok(valid.to_owned()),
            Err(_) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => Ok(text),
                Err(e) => Err(CountError::encoding_error(path, e)),
            },
        },
        EncodingMode::Lossy => {
            let cow = String::from_utf8_lossy(bytes);
            if let std::borrow::Cow::Owned(_) = cow {
                warn!("Invalid UTF-8 replaced in file: {}", path.display());
            }
            Ok(cow.into_owned())
        }
    }
}

fn read_buffered(file: File, size: u64) -> CountResult<Vec<u8>> {
    let mut reader = BufReader::with_capacity(BUFFER_CAPACITY, file);
    let mut bytes = Vec::with_capacity(size as usize);
    reader.read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Loads a file as a dataset named after its file name.
///
/// Files of 10MB or more are memory-mapped; smaller files are read through
/// a buffered reader.
pub fn load_dataset(path: &Path, encoding_mode: EncodingMode) -> CountResult<Dataset> {
    let file = File::open(path)?;
    let size = file.metadata()?.len();

    let text = if size >= MMAP_THRESHOLD {
        let mmap = unsafe { Mmap::map(&file) }?;
        debug!("Memory-mapped {} ({} bytes)", path.display(), size);
        decode_bytes(&mmap, path, encoding_mode)?
    } else {
        let bytes = read_buffered(file, size)?;
        debug!("Read {} ({} bytes)", path.display(), size);
        decode_bytes(&bytes, path, encoding_mode)?
    };

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    Ok(Dataset { name, text })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_load_dataset_names_after_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sample.txt");
        std::fs::write(&path, "one two one").unwrap();

        let dataset = load_dataset(&path, EncodingMode::FailFast).unwrap();
        assert_eq!(dataset.name, "sample.txt");
        assert_eq!(dataset.text, "one two one");
        assert_eq!(dataset.len(), 11);
    }

    #[test]
    fn test_invalid_utf8_fail_fast() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.txt");
        let mut file = File::create(&path).unwrap();
        file.write_all(b"ok \xff\xfe bytes").unwrap();

        let result = load_dataset(&path, EncodingMode::FailFast);
        assert!(matches!(result, Err(CountError::EncodingError { .. })));
    }

    #[test]
    fn test_invalid_utf8_lossy() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.txt");
        std::fs::write(&path, b"ok \xff bytes").unwrap();

        let dataset = load_dataset(&path, EncodingMode::Lossy).unwrap();
        assert_eq!(dataset.text, "ok \u{FFFD} bytes");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let result = load_dataset(&dir.path().join("absent.txt"), EncodingMode::FailFast);
        assert!(matches!(result, Err(CountError::IoError(_))));
    }

    #[test]
    fn test_large_file_is_mapped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("large.txt");
        let line = "word filler text\n";
        let text = line.repeat((MMAP_THRESHOLD as usize / line.len()) + 1);
        std::fs::write(&path, &text).unwrap();

        let dataset = load_dataset(&path, EncodingMode::FailFast).unwrap();
        assert_eq!(dataset.len(), text.len());
    }
}
