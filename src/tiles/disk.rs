//! File-system layout of cached tiles:
//! `<root>/<source content hash>/<zoom>/<x>/<y>.<format>`.

use crate::core::geo::TileCoord;
use crate::tiles::source::MapSource;
use crate::Result;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskTileStore {
    root: PathBuf,
}

impl DiskTileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every tile of `source`
    pub fn source_dir(&self, source: &MapSource) -> PathBuf {
        self.root.join(source.content_hash())
    }

    pub fn tile_path(&self, source: &MapSource, coord: TileCoord) -> PathBuf {
        self.source_dir(source)
            .join(coord.z.to_string())
            .join(coord.x.to_string())
            .join(format!("{}.{}", coord.y, source.image_format()))
    }

    /// Recovers the tile address from a path produced by [`Self::tile_path`]
    /// for the same source; `None` for anything else.
    pub fn tile_coord(&self, source: &MapSource, path: &Path) -> Option<TileCoord> {
        let relative = path.strip_prefix(self.source_dir(source)).ok()?;
        let mut parts = relative.iter().map(|part| part.to_str());
        let z = parts.next()??.parse().ok()?;
        let x = parts.next()??.parse().ok()?;
        let file = Path::new(parts.next()??);
        if parts.next().is_some() || file.extension()?.to_str()? != source.image_format() {
            return None;
        }
        let y = file.file_stem()?.to_str()?.parse().ok()?;
        Some(TileCoord::new(x, y, z))
    }

    pub fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    /// Writes `bytes` to `path` so that readers see either the old file, the
    /// complete new one, or nothing. Parent directories are created as needed.
    pub fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let parent = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(parent)?;

        let mut staged = NamedTempFile::new_in(parent)?;
        staged.write_all(bytes)?;
        staged.as_file().sync_all()?;
        staged.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Deletes a cached tile; a missing file is not an error.
    pub fn remove(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
