use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;

use crate::metadata::Metadata;
use crate::sequence::SequenceSet;

pub const METADATA_FILE: &str = "metadata.json";

/// Writes the windowed partitions and their metadata under one directory.
pub struct ArtifactWriter {
    dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).with_context(|| format!("Cannot create {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    /// `{name}.bin`, bincode-encoded.
    pub fn write_partition(&self, name: &str, set: &SequenceSet) -> Result<PathBuf> {
        let path = self.path(&format!("{name}.bin"));
        let file = File::create(&path).with_context(|| format!("Cannot create {}", path.display()))?;
        let mut out = BufWriter::new(file);
        bincode::serialize_into(&mut out, set)?;
        out.flush()?;
        info!("Wrote {} {:?} windows to {}", name, set.x.dim(), path.display());
        Ok(path)
    }

    pub fn write_metadata(&self, metadata: &Metadata) -> Result<PathBuf> {
        let path = self.path(METADATA_FILE);
        let file = File::create(&path).with_context(|| format!("Cannot create {}", path.display()))?;
        let mut out = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut out, metadata)?;
        out.flush()?;
        info!("Wrote metadata to {}", path.display());
        Ok(path)
    }
}

pub fn read_partition(path: &Path) -> Result<SequenceSet> {
    let file = File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
    let set = bincode::deserialize_from(BufReader::new(file))?;
    Ok(set)
}

pub fn read_metadata(path: &Path) -> Result<Metadata> {
    let file = File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
    let metadata = serde_json::from_reader(BufReader::new(file))?;
    Ok(metadata)
}
