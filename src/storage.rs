use std::path::{Path, PathBuf};

/// A directory holding the table files, the vector file and config.yaml.
///
/// Writes go through a temp file in the same directory followed by a
/// rename, so a reader never observes a half-written file.
#[derive(Clone, Debug)]
pub struct DataDir {
    base_dir: PathBuf,
}

impl DataDir {
    pub fn open(base_dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        Ok(DataDir { base_dir })
    }

    pub fn path(&self, ident: &str) -> PathBuf {
        self.base_dir.join(ident)
    }

    pub fn exists(&self, ident: &str) -> bool {
        std::fs::metadata(self.path(ident)).is_ok()
    }

    pub fn read(&self, ident: &str) -> std::io::Result<Vec<u8>> {
        std::fs::read(self.path(ident))
    }

    pub fn write(&self, ident: &str, data: &[u8]) -> std::io::Result<()> {
        let temp_path = self.temp_path(ident);
        if let Err(err) = std::fs::write(&temp_path, data) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(err);
        }
        self.commit(&temp_path, ident)
    }

    /// Unique scratch path for `ident`; pass it to [`DataDir::commit`] once written.
    pub fn temp_path(&self, ident: &str) -> PathBuf {
        self.base_dir
            .join(format!("{}-{ident}.tmp", rusty_ulid::generate_ulid_string()))
    }

    pub fn commit(&self, temp_path: &Path, ident: &str) -> std::io::Result<()> {
        std::fs::rename(temp_path, self.path(ident))
    }

    pub fn delete(&self, ident: &str) -> std::io::Result<()> {
        std::fs::remove_file(self.path(ident))
    }
}
