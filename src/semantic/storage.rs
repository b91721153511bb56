//! Binary storage for recipe name embeddings.
//!
//! File format: vectors.bin
//!
//! Header (47 bytes):
//! - version: u8 (1)
//! - model_id: [u8; 32] (SHA256 hash of model name)
//! - dimensions: u16 (little-endian)
//! - entry_count: u64 (little-endian)
//! - checksum: u32 (CRC32 of header fields before checksum)
//!
//! Entries (repeated, ascending recipe id):
//! - recipe_id: u64 (little-endian)
//! - embedding: [f32; dimensions] (little-endian)

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::semantic::index::{EmbeddingStore, IndexError};

const FORMAT_VERSION: u8 = 1;

/// version(1) + model_id(32) + dimensions(2) + entry_count(8) + checksum(4)
const HEADER_SIZE: usize = 47;

#[derive(Debug, thiserror::Error)]
pub enum VectorStorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Model mismatch: file uses different model")]
    ModelMismatch,

    #[error("Checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    #[error("Dimension mismatch: expected {expected}, file has {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Index error: {0}")]
    Index(#[from] IndexError),
}

/// Reads and writes the embedding store at one path.
pub struct VectorStorage {
    path: PathBuf,
}

impl VectorStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the store, rejecting files written by another model or with
    /// another dimension.
    pub fn load(
        &self,
        expected_model_id: &[u8; 32],
        expected_dimensions: usize,
    ) -> Result<EmbeddingStore, VectorStorageError> {
        let file = File::open(&self.path)?;
        decode(BufReader::new(file), expected_model_id, expected_dimensions)
    }

    /// Write the store to a temp file next to the target, then rename it
    /// over the target.
    pub fn save(&self, store: &EmbeddingStore, model_id: &[u8; 32]) -> Result<(), VectorStorageError> {
        let temp_path = self.path.with_extension("tmp");

        let result = self.write_to_file(&temp_path, store, model_id);
        if result.is_err() {
            let _ = std::fs::remove_file(&temp_path);
            return result;
        }

        std::fs::rename(&temp_path, &self.path)?;
        log::debug!("wrote {} vectors to {}", store.len(), self.path.display());
        Ok(())
    }

    pub fn delete(&self) -> Result<(), VectorStorageError> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    fn write_to_file(
        &self,
        path: &Path,
        store: &EmbeddingStore,
        model_id: &[u8; 32],
    ) -> Result<(), VectorStorageError> {
        let mut writer = BufWriter::new(File::create(path)?);
        encode(&mut writer, store, model_id)?;

        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        file.sync_all()?;
        Ok(())
    }
}

#[derive(Debug)]
struct Header {
    version: u8,
    model_id: [u8; 32],
    dimensions: u16,
    entry_count: u64,
}

impl Header {
    fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0] = self.version;
        bytes[1..33].copy_from_slice(&self.model_id);
        bytes[33..35].copy_from_slice(&self.dimensions.to_le_bytes());
        bytes[35..43].copy_from_slice(&self.entry_count.to_le_bytes());

        let checksum = crc32fast::hash(&bytes[0..43]);
        bytes[43..47].copy_from_slice(&checksum.to_le_bytes());
        bytes
    }

    fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Result<Self, VectorStorageError> {
        let version = bytes[0];
        if version != FORMAT_VERSION {
            return Err(VectorStorageError::VersionMismatch(version, FORMAT_VERSION));
        }

        let stored_checksum = u32::from_le_bytes([bytes[43], bytes[44], bytes[45], bytes[46]]);
        if stored_checksum != crc32fast::hash(&bytes[0..43]) {
            return Err(VectorStorageError::ChecksumMismatch);
        }

        let mut model_id = [0u8; 32];
        model_id.copy_from_slice(&bytes[1..33]);
        let mut count = [0u8; 8];
        count.copy_from_slice(&bytes[35..43]);

        Ok(Self {
            version,
            model_id,
            dimensions: u16::from_le_bytes([bytes[33], bytes[34]]),
            entry_count: u64::from_le_bytes(count),
        })
    }
}

fn encode<W: Write>(
    writer: &mut W,
    store: &EmbeddingStore,
    model_id: &[u8; 32],
) -> Result<(), VectorStorageError> {
    let dimensions = u16::try_from(store.dimensions()).map_err(|_| {
        VectorStorageError::InvalidFormat(format!(
            "{} dimensions do not fit the header",
            store.dimensions()
        ))
    })?;

    let header = Header {
        version: FORMAT_VERSION,
        model_id: *model_id,
        dimensions,
        entry_count: store.len() as u64,
    };
    writer.write_all(&header.to_bytes())?;

    for (id, embedding) in store.iter() {
        writer.write_all(&id.to_le_bytes())?;
        for value in embedding {
            writer.write_all(&value.to_le_bytes())?;
        }
    }
    Ok(())
}

fn decode<R: Read>(
    mut reader: R,
    expected_model_id: &[u8; 32],
    expected_dimensions: usize,
) -> Result<EmbeddingStore, VectorStorageError> {
    let mut header_bytes = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header_bytes).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => {
            VectorStorageError::InvalidFormat("file shorter than header".to_string())
        }
        _ => e.into(),
    })?;
    let header = Header::from_bytes(&header_bytes)?;

    if header.model_id != *expected_model_id {
        return Err(VectorStorageError::ModelMismatch);
    }
    let dimensions = header.dimensions as usize;
    if dimensions != expected_dimensions {
        return Err(VectorStorageError::DimensionMismatch {
            expected: expected_dimensions,
            got: dimensions,
        });
    }

    let mut store = EmbeddingStore::new(dimensions);
    let mut id_bytes = [0u8; 8];
    let mut float_bytes = [0u8; 4];
    for n in 0..header.entry_count {
        reader.read_exact(&mut id_bytes).map_err(|_| {
            VectorStorageError::InvalidFormat(format!(
                "truncated at entry {n} of {}",
                header.entry_count
            ))
        })?;

        let mut embedding = Vec::with_capacity(dimensions);
        for _ in 0..dimensions {
            reader.read_exact(&mut float_bytes).map_err(|_| {
                VectorStorageError::InvalidFormat(format!("truncated embedding at entry {n}"))
            })?;
            embedding.push(f32::from_le_bytes(float_bytes));
        }
        store.insert(u64::from_le_bytes(id_bytes), embedding)?;
    }

    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_model_id() -> [u8; 32] {
        let mut id = [0u8; 32];
        id[0] = 0xAB;
        id[31] = 0xCD;
        id
    }

    fn sample_store() -> EmbeddingStore {
        let mut store = EmbeddingStore::new(3);
        store.insert(1, vec![1.0, 0.0, 0.0]).unwrap();
        store.insert(2, vec![0.0, 1.0, 0.0]).unwrap();
        store.insert(3, vec![0.0, 0.0, 0.0]).unwrap();
        store
    }

    #[test]
    fn test_save_and_load_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = VectorStorage::new(dir.path().join("vectors.bin"));

        storage.save(&EmbeddingStore::new(384), &test_model_id()).unwrap();
        assert!(storage.exists());

        let loaded = storage.load(&test_model_id(), 384).unwrap();
        assert_eq!(loaded.len(), 0);
        assert_eq!(loaded.dimensions(), 384);
    }

    #[test]
    fn test_save_and_load_with_entries() {
        let dir = tempfile::tempdir().unwrap();
        let storage = VectorStorage::new(dir.path().join("vectors.bin"));

        storage.save(&sample_store(), &test_model_id()).unwrap();
        assert!(!dir.path().join("vectors.tmp").exists());

        let loaded = storage.load(&test_model_id(), 3).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.get(2), Some(&[0.0, 1.0, 0.0][..]));
        assert_eq!(loaded.get(3), Some(&[0.0, 0.0, 0.0][..]));
    }

    #[test]
    fn test_model_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let storage = VectorStorage::new(dir.path().join("vectors.bin"));
        storage.save(&sample_store(), &test_model_id()).unwrap();

        let wrong = [0xFFu8; 32];
        assert!(matches!(
            storage.load(&wrong, 3),
            Err(VectorStorageError::ModelMismatch)
        ));
    }

    #[test]
    fn test_dimension_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let storage = VectorStorage::new(dir.path().join("vectors.bin"));
        storage.save(&sample_store(), &test_model_id()).unwrap();

        assert!(matches!(
            storage.load(&test_model_id(), 384),
            Err(VectorStorageError::DimensionMismatch { expected: 384, got: 3 })
        ));
    }

    #[test]
    fn test_corrupted_header_checksum() {
        let mut bytes = Vec::new();
        encode(&mut bytes, &sample_store(), &test_model_id()).unwrap();
        bytes[35] ^= 0x01;

        assert!(matches!(
            decode(bytes.as_slice(), &test_model_id(), 3),
            Err(VectorStorageError::ChecksumMismatch)
        ));
    }

    #[test]
    fn test_unknown_version() {
        let mut bytes = Vec::new();
        encode(&mut bytes, &sample_store(), &test_model_id()).unwrap();
        bytes[0] = 9;

        assert!(matches!(
            decode(bytes.as_slice(), &test_model_id(), 3),
            Err(VectorStorageError::VersionMismatch(9, FORMAT_VERSION))
        ));
    }

    #[test]
    fn test_truncated_entries() {
        let mut bytes = Vec::new();
        encode(&mut bytes, &sample_store(), &test_model_id()).unwrap();
        bytes.truncate(bytes.len() - 5);

        assert!(matches!(
            decode(bytes.as_slice(), &test_model_id(), 3),
            Err(VectorStorageError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_short_file() {
        assert!(matches!(
            decode(&[1u8, 2, 3][..], &test_model_id(), 3),
            Err(VectorStorageError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = VectorStorage::new(dir.path().join("vectors.bin"));
        storage.save(&sample_store(), &test_model_id()).unwrap();

        storage.delete().unwrap();
        assert!(!storage.exists());
        storage.delete().unwrap();
    }
}
