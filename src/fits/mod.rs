//! FITS support over `fitsio` (cfitsio): header cards, multi-extension images
//! and binary tables.
//!
//! Only what the calibration pipeline consumes and produces is exposed:
//! image extensions (plain or tile-compressed) in, binary tables out.

pub mod header;
pub mod image;
mod raw;
pub mod table;

use std::path::Path;

use anyhow::{Context, Result};

pub use header::{read_header, write_header, Card, Header, HeaderValue};
pub use image::{write_mef, Hdu, MefFile};
pub use table::{write_table, BinTable, Column, ColumnData};

/// Produce `path` by letting `write` fill a `tmp-` sibling, then renaming it
/// into place.
pub fn write_via_temp<P: AsRef<Path>>(path: P, write: impl FnOnce(&Path) -> Result<()>) -> Result<()> {
    let path = path.as_ref();
    let name = path
        .file_name()
        .with_context(|| format!("{} has no file name", path.display()))?;
    let tmp = path.with_file_name(format!("tmp-{}", name.to_string_lossy()));
    write(&tmp).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to rename {} to {}", tmp.display(), path.display()))?;
    Ok(())
}
