//! Keyed persistence of per-geometry artifacts such as computational basis matrices.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{self, format_err};
use serde::{de::DeserializeOwned, Serialize};

use crate::io::{read_evcont_binary, write_evcont_binary, EvcontFileType};

#[cfg(test)]
#[path = "store_tests.rs"]
mod store_tests;

/// Trait for key-value stores of artifacts indexed by training-geometry index.
pub trait ArtifactStore<T> {
    /// Persists an artifact under `index`, replacing any previous artifact under that index.
    fn store(&mut self, index: usize, artifact: &T) -> Result<(), anyhow::Error>;

    /// Retrieves the artifact persisted under `index`.
    fn load(&self, index: usize) -> Result<T, anyhow::Error>;
}

/// Artifact store writing one binary file of type [`EvcontFileType::Bas`] per index into a
/// directory.
#[derive(Clone, Debug)]
pub struct FileArtifactStore {
    directory: PathBuf,
    prefix: String,
}

impl FileArtifactStore {
    /// Creates a file store, creating `directory` if necessary.
    ///
    /// # Arguments
    ///
    /// * `directory` - The directory holding the artifact files.
    /// * `prefix` - The file name prefix; the artifact under index `i` is written to
    ///   `{prefix}_{i}.evcont.bas`.
    pub fn new<P: AsRef<Path>>(directory: P, prefix: &str) -> Result<Self, anyhow::Error> {
        fs::create_dir_all(directory.as_ref()).map_err(|err| format_err!(err))?;
        Ok(Self {
            directory: directory.as_ref().to_path_buf(),
            prefix: prefix.to_string(),
        })
    }

    fn name(&self, index: usize) -> PathBuf {
        self.directory.join(format!("{}_{index}", self.prefix))
    }
}

impl<T> ArtifactStore<T> for FileArtifactStore
where
    T: Serialize + DeserializeOwned,
{
    fn store(&mut self, index: usize, artifact: &T) -> Result<(), anyhow::Error> {
        write_evcont_binary(self.name(index), EvcontFileType::Bas, artifact)
    }

    fn load(&self, index: usize) -> Result<T, anyhow::Error> {
        read_evcont_binary(self.name(index), EvcontFileType::Bas)
            .map_err(|err| format_err!("Unable to load artifact {index}: {err}"))
    }
}

/// In-memory artifact store.
#[derive(Clone, Debug)]
pub struct MemoryArtifactStore<T> {
    artifacts: HashMap<usize, T>,
}

impl<T> Default for MemoryArtifactStore<T> {
    fn default() -> Self {
        Self {
            artifacts: HashMap::new(),
        }
    }
}

impl<T> MemoryArtifactStore<T> {
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

impl<T: Clone> ArtifactStore<T> for MemoryArtifactStore<T> {
    fn store(&mut self, index: usize, artifact: &T) -> Result<(), anyhow::Error> {
        self.artifacts.insert(index, artifact.clone());
        Ok(())
    }

    fn load(&self, index: usize) -> Result<T, anyhow::Error> {
        self.artifacts
            .get(&index)
            .cloned()
            .ok_or_else(|| format_err!("No artifact stored under index {index}."))
    }
}
