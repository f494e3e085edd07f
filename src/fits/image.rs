//! Multi-extension FITS image reading on top of `fitsio`.
//!
//! Opening a file records every HDU header once; pixels are read on demand,
//! optionally restricted to a band of rows, so a 60-extension mosaic never
//! has to be held in memory. Tile-compressed (`.fits.fz`) extensions are
//! decompressed by cfitsio and look like plain images here.

use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use fitsio::hdu::HduInfo;
use fitsio::images::{ImageDescription, ImageType};
use fitsio::FitsFile;
use tracing::debug;

use super::header::{read_header, write_header, Header};
use super::write_via_temp;
use crate::plane::{Plane, Region};

/// Header of one HDU and whether it holds an image.
#[derive(Debug, Clone)]
pub struct Hdu {
    pub header: Header,
    image: bool,
}

impl Hdu {
    pub fn extname(&self) -> Option<String> {
        self.header.get_str("EXTNAME")
    }

    pub fn is_image(&self) -> bool {
        self.image
    }

    /// `(width, height)` of the image, or `None` for an empty HDU. Compressed
    /// HDUs carry the image axes in ZNAXISn.
    pub fn shape(&self) -> Option<(usize, usize)> {
        let prefix = if self.header.get_bool("ZIMAGE") == Some(true) { "ZNAXIS" } else { "NAXIS" };
        if self.header.get_i64(prefix)? < 2 {
            return None;
        }
        let w = self.header.get_i64(&format!("{prefix}1"))?;
        let h = self.header.get_i64(&format!("{prefix}2"))?;
        Some((w as usize, h as usize))
    }
}

/// HDU directory of a FITS file on disk.
///
/// Holds no open handle (a cfitsio handle cannot cross threads); each read
/// reopens the file.
#[derive(Debug, Clone)]
pub struct MefFile {
    path: PathBuf,
    hdus: Vec<Hdu>,
}

impl MefFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut fptr = open_fits(&path)?;
        let mut hdus = Vec::new();
        while let Ok(hdu) = fptr.hdu(hdus.len()) {
            let header = read_header(&mut fptr)
                .with_context(|| format!("Bad header in HDU {} of {}", hdus.len(), path.display()))?;
            hdus.push(Hdu {
                header,
                image: matches!(hdu.info, HduInfo::ImageInfo { .. }),
            });
        }
        ensure!(!hdus.is_empty(), "{} contains no HDUs", path.display());
        debug!("Opened {} ({} HDUs)", path.display(), hdus.len());
        Ok(Self { path, hdus })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn primary_header(&self) -> &Header {
        &self.hdus[0].header
    }

    pub fn hdus(&self) -> &[Hdu] {
        &self.hdus
    }

    /// Index of the HDU whose EXTNAME matches `name` (case-insensitive).
    pub fn hdu_index(&self, name: &str) -> Result<usize> {
        let want = name.trim().to_ascii_uppercase();
        self.hdus
            .iter()
            .position(|h| h.extname().map(|e| e.trim().to_ascii_uppercase()) == Some(want.clone()))
            .with_context(|| format!("No extension {} in {}", name, self.path.display()))
    }

    /// EXTNAMEs of every image extension after the primary, in file order.
    pub fn extension_names(&self) -> Vec<String> {
        self.hdus
            .iter()
            .skip(1)
            .filter(|h| h.is_image())
            .filter_map(Hdu::extname)
            .collect()
    }

    /// Read image pixels of HDU `index` as `f64`; cfitsio applies BSCALE/BZERO.
    pub fn read_image(&self, index: usize, region: Option<Region>) -> Result<Plane<f64>> {
        let hdu = self
            .hdus
            .get(index)
            .with_context(|| format!("HDU {} out of range", index))?;
        let (w, h) = hdu
            .shape()
            .with_context(|| format!("HDU {} has no image data", index))?;
        let region = region.unwrap_or(Region {
            x0: 0,
            x1: w,
            y0: 0,
            y1: h,
        });
        ensure!(
            region.x0 <= region.x1 && region.y0 <= region.y1 && region.x1 <= w && region.y1 <= h,
            "Region {:?} outside {}x{} image",
            region,
            w,
            h
        );
        if region.width() == 0 || region.height() == 0 {
            return Plane::new(region.width(), region.height(), Vec::new());
        }

        // Whole rows are contiguous in the file; columns are cut in memory.
        let mut fptr = open_fits(&self.path)?;
        let fits_hdu = fptr.hdu(index)?;
        let rows: Vec<f64> = fits_hdu
            .read_section(&mut fptr, region.y0 * w, region.y1 * w)
            .with_context(|| format!("Failed to read pixels of HDU {} in {}", index, self.path.display()))?;
        let band = Plane::new(w, region.height(), rows)?;
        band.crop(&Region {
            x0: region.x0,
            x1: region.x1,
            y0: 0,
            y1: region.height(),
        })
    }
}

fn open_fits(path: &Path) -> Result<FitsFile> {
    FitsFile::open(path)
        .with_context(|| format!("Failed to open FITS file {}", path.display()))
}

/// Write a multi-extension file: `primary` on an empty primary HDU, then one
/// float image extension per `(extname, header, pixels)`.
pub fn write_mef<P: AsRef<Path>>(
    path: P,
    primary: &Header,
    extensions: &[(&str, &Header, &Plane<f32>)],
) -> Result<()> {
    write_via_temp(path, |tmp| {
        let mut fptr = FitsFile::create(tmp).overwrite().open()?;
        let hdu = fptr.hdu(0)?;
        write_header(&mut fptr, &hdu, primary)?;
        for (extname, header, pixels) in extensions {
            let description = ImageDescription {
                data_type: ImageType::Float,
                dimensions: &[pixels.height(), pixels.width()],
            };
            let hdu = fptr.create_image(*extname, &description)?;
            hdu.write_image(&mut fptr, pixels.data())?;
            write_header(&mut fptr, &hdu, header)?;
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_read_mef() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mef.fits");

        let mut primary = Header::new();
        primary.set("EXPNUM", 611450i64, Some("exposure number"));
        primary.set("PHOTOMET", true, None);
        let mut ext = Header::new();
        ext.set("CCDNAME", "N4", None);
        ext.set("GAINA", 4.1, None);
        let pixels = Plane::new(4, 4, (0..16).map(|v| v as f32 * 0.5).collect()).unwrap();
        write_mef(&path, &primary, &[("N4", &ext, &pixels), ("S7", &ext, &pixels)]).unwrap();

        let file = MefFile::open(&path).unwrap();
        assert_eq!(file.primary_header().get_i64("EXPNUM"), Some(611450));
        assert_eq!(file.primary_header().get_bool("PHOTOMET"), Some(true));
        assert_eq!(file.extension_names(), vec!["N4".to_string(), "S7".to_string()]);
        let idx = file.hdu_index("s7").unwrap();
        assert_eq!(idx, 2);
        assert_eq!(file.hdus()[idx].shape(), Some((4, 4)));
        assert_eq!(file.hdus()[idx].header.get_f64("GAINA"), Some(4.1));

        let full = file.read_image(idx, None).unwrap();
        assert_eq!(full.get(3, 2), 5.5);
        let cut = file
            .read_image(
                idx,
                Some(Region {
                    x0: 1,
                    x1: 3,
                    y0: 2,
                    y1: 4,
                }),
            )
            .unwrap();
        assert_eq!((cut.width(), cut.height()), (2, 2));
        assert_eq!(cut.data(), &[4.5, 5.0, 6.5, 7.0]);
        assert!(!dir.path().join("tmp-mef.fits").exists());
    }

    #[test]
    fn test_missing_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.fits");
        let pixels = Plane::filled(2, 2, 1.0f32);
        write_mef(&path, &Header::new(), &[("N4", &Header::new(), &pixels)]).unwrap();
        let file = MefFile::open(&path).unwrap();
        assert!(file.hdu_index("S30").is_err());
        assert!(file.read_image(0, None).is_err(), "primary HDU has no pixels");
    }
}
