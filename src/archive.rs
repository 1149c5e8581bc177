//! ZIP assembly for batch exports.
//!
//! Entries are buffered until [`ZipAssembler::finish`], then written in
//! insertion order with deflate compression and a fixed timestamp, so the
//! same inputs always produce the same archive bytes.
//!
//! File names are never de-duplicated. Adding a name that is already present
//! replaces the earlier entry's contents in place: the archive ends up with
//! one entry per distinct name, at the position the name was first added.

use std::io::{Cursor, Write};
use thiserror::Error;
use tracing::warn;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

/// Failure while finalizing an archive or document. Fails the whole job.
#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("pdf error: {0}")]
    Pdf(String),
}

#[derive(Debug, Default)]
pub struct ZipAssembler {
    entries: Vec<(String, Vec<u8>)>,
}

impl ZipAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an entry. Returns `false` when `name` replaced an earlier entry.
    pub fn add(&mut self, name: &str, bytes: Vec<u8>) -> bool {
        if let Some(existing) = self.entries.iter_mut().find(|(n, _)| n == name) {
            warn!(name, "duplicate archive entry name, earlier entry overwritten");
            existing.1 = bytes;
            return false;
        }
        self.entries.push((name.to_string(), bytes));
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Write the archive.
    pub fn finish(self) -> Result<Vec<u8>, AssemblyError> {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default());
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, bytes) in self.entries {
            writer.start_file(name, options)?;
            writer.write_all(&bytes)?;
        }
        Ok(writer.finish()?.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::ZipArchive;

    fn read_back(bytes: Vec<u8>) -> Vec<(String, Vec<u8>)> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut file = archive.by_index(i).unwrap();
                let mut content = Vec::new();
                file.read_to_end(&mut content).unwrap();
                (file.name().to_string(), content)
            })
            .collect()
    }

    #[test]
    fn entries_keep_insertion_order() {
        let mut zip = ZipAssembler::new();
        zip.add("b.png", vec![2; 10]);
        zip.add("a.png", vec![1; 10]);

        let entries = read_back(zip.finish().unwrap());
        assert_eq!(
            entries,
            vec![("b.png".to_string(), vec![2; 10]), ("a.png".to_string(), vec![1; 10])]
        );
    }

    #[test]
    fn duplicate_names_are_not_renamed() {
        let mut zip = ZipAssembler::new();
        assert!(zip.add("photo.jpg", vec![1]));
        assert!(zip.add("other.jpg", vec![2]));
        assert!(!zip.add("photo.jpg", vec![3]));
        assert_eq!(zip.len(), 2);

        let entries = read_back(zip.finish().unwrap());
        assert_eq!(entries[0], ("photo.jpg".to_string(), vec![3]));
        assert_eq!(entries[1].0, "other.jpg");
    }

    #[test]
    fn empty_archive_is_valid() {
        let zip = ZipAssembler::new();
        assert!(zip.is_empty());
        assert!(read_back(zip.finish().unwrap()).is_empty());
    }

    #[test]
    fn archive_bytes_are_deterministic() {
        let build = || {
            let mut zip = ZipAssembler::new();
            zip.add("x.png", vec![9; 64]);
            zip.finish().unwrap()
        };
        assert_eq!(build(), build());
    }
}
