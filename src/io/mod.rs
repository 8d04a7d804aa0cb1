//! Reading and writing of `EVCont` files.
//!
//! Training sets, orthogonal integrals and computational bases are stored as `bincode` blobs under
//! a common name with a per-type extension, so that all files of one system sit side by side:
//! `h2_chain.evcont.trn`, `h2_chain.evcont.int`, `h2_chain.evcont.bas`. Inputs and results are
//! YAML.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{self, format_err, Context};
use bincode;
use serde::{de::DeserializeOwned, Serialize};
use serde_yaml;

pub(crate) mod format;


/// An enumerated type for `EVCont` binary file types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvcontFileType {
    /// Accumulated training sets of transition density matrices.
    Trn,

    /// Hamiltonian integrals in an orthogonal basis.
    Int,

    /// Computational basis matrices of training geometries.
    Bas,
}

impl EvcontFileType {
    /// Returns the extension of the file type.
    pub fn ext(&self) -> &'static str {
        match self {
            EvcontFileType::Trn => "evcont.trn",
            EvcontFileType::Int => "evcont.int",
            EvcontFileType::Bas => "evcont.bas",
        }
    }
}

/// Returns the full path of an `EVCont` file given its name without extensions.
pub fn evcont_path<P: AsRef<Path>>(name: P, file_type: EvcontFileType) -> PathBuf {
    name.as_ref().with_extension(file_type.ext())
}

fn open_reader(path: &Path) -> Result<BufReader<File>, anyhow::Error> {
    let file = File::open(path).with_context(|| format!("Unable to open `{}`.", path.display()))?;
    Ok(BufReader::new(file))
}

fn create_writer(path: &Path) -> Result<BufWriter<File>, anyhow::Error> {
    let file =
        File::create(path).with_context(|| format!("Unable to create `{}`.", path.display()))?;
    Ok(BufWriter::new(file))
}

/// Deserialises a structure from the `EVCont` binary file `name.<file_type extension>`.
pub fn read_evcont_binary<T, P: AsRef<Path>>(
    name: P,
    file_type: EvcontFileType,
) -> Result<T, anyhow::Error>
where
    T: DeserializeOwned,
{
    let path = evcont_path(name, file_type);
    bincode::deserialize_from(open_reader(&path)?)
        .map_err(|err| format_err!(err))
        .with_context(|| format!("`{}` is not a valid binary file.", path.display()))
}

/// Serialises `value` into the `EVCont` binary file `name.<file_type extension>`, replacing any
/// existing file.
pub fn write_evcont_binary<T, P: AsRef<Path>>(
    name: P,
    file_type: EvcontFileType,
    value: &T,
) -> Result<(), anyhow::Error>
where
    T: Serialize,
{
    let path = evcont_path(name, file_type);
    bincode::serialize_into(create_writer(&path)?, value).map_err(|err| format_err!(err))
}

/// Deserialises a structure from a YAML file.
///
/// # Arguments
///
/// * `name` - The full name of the file, including its `.yml` or `.yaml` extension.
pub fn read_evcont_yaml<T, P: AsRef<Path>>(name: P) -> Result<T, anyhow::Error>
where
    T: DeserializeOwned,
{
    let path = name.as_ref();
    serde_yaml::from_reader(open_reader(path)?)
        .map_err(|err| format_err!(err))
        .with_context(|| format!("`{}` could not be parsed.", path.display()))
}

/// Serialises `value` into the YAML file `name.yml`.
pub fn write_evcont_yaml<T, P: AsRef<Path>>(name: P, value: &T) -> Result<(), anyhow::Error>
where
    T: Serialize,
{
    let path = name.as_ref().with_extension("yml");
    serde_yaml::to_writer(create_writer(&path)?, value).map_err(|err| format_err!(err))
}
