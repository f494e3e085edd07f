//! FITS binary tables, read and written through `fitsio`.
//!
//! Output tables are committed with a write-to-temp-then-rename so concurrent
//! readers never observe a partially written file.

use std::path::Path;

use anyhow::{anyhow, bail, ensure, Context, Result};
use fitsio::hdu::{FitsHdu, HduInfo};
use fitsio::tables::{ColumnDataDescription, ConcreteColumnDescription};
use fitsio::FitsFile;
use tracing::info;

use super::header::{is_structural, read_header, write_header, Header};
use super::{raw, write_via_temp};

/// Typed column storage. `repeat` columns hold `repeat` values per row, row-major.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Bool(Vec<bool>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    F32Array { repeat: usize, values: Vec<f32> },
    Str { width: usize, values: Vec<String> },
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Bool(v) => v.len(),
            ColumnData::I16(v) => v.len(),
            ColumnData::I32(v) => v.len(),
            ColumnData::I64(v) => v.len(),
            ColumnData::F32(v) => v.len(),
            ColumnData::F64(v) => v.len(),
            ColumnData::F32Array { repeat, values } => {
                if *repeat == 0 {
                    0
                } else {
                    values.len() / repeat
                }
            }
            ColumnData::Str { values, .. } => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// TFORM code of the column.
    pub fn tform(&self) -> String {
        match self {
            ColumnData::Bool(_) => "L".into(),
            ColumnData::I16(_) => "I".into(),
            ColumnData::I32(_) => "J".into(),
            ColumnData::I64(_) => "K".into(),
            ColumnData::F32(_) => "E".into(),
            ColumnData::F64(_) => "D".into(),
            ColumnData::F32Array { repeat, .. } => format!("{}E", repeat),
            ColumnData::Str { width, .. } => format!("{}A", (*width).max(1)),
        }
    }

    fn description(&self, name: &str) -> Result<ConcreteColumnDescription> {
        let tform = self.tform();
        let data_type = tform
            .parse::<ColumnDataDescription>()
            .map_err(|e| anyhow!("bad TFORM {} for column {}: {:?}", tform, name, e))?;
        Ok(ConcreteColumnDescription {
            name: name.to_string(),
            data_type,
        })
    }

    /// Write all rows as column `colnum` (1-based) of the table `hdu`.
    fn write(&self, fptr: &mut FitsFile, hdu: &FitsHdu, name: &str, colnum: usize) -> Result<()> {
        match self {
            ColumnData::Bool(v) => raw::write_logical_column(fptr, colnum, v)?,
            ColumnData::I16(v) => {
                let wide: Vec<i32> = v.iter().map(|&x| x as i32).collect();
                hdu.write_col(fptr, name, &wide)?;
            }
            ColumnData::I32(v) => {
                hdu.write_col(fptr, name, v)?;
            }
            ColumnData::I64(v) => {
                hdu.write_col(fptr, name, v)?;
            }
            ColumnData::F32(v) => {
                hdu.write_col(fptr, name, v)?;
            }
            ColumnData::F64(v) => {
                hdu.write_col(fptr, name, v)?;
            }
            ColumnData::F32Array { values, .. } => raw::write_float_column(fptr, colnum, values)?,
            ColumnData::Str { width, values } => {
                let clean: Vec<String> = values
                    .iter()
                    .map(|s| s.chars().filter(|c| c.is_ascii() && *c != '\0').take((*width).max(1)).collect())
                    .collect();
                hdu.write_col(fptr, name, &clean)?;
            }
        }
        Ok(())
    }

    /// Read `nrows` rows of column `colnum` (1-based) with format `tform`.
    fn read(fptr: &mut FitsFile, hdu: &FitsHdu, name: &str, colnum: usize, tform: &str, nrows: usize) -> Result<Self> {
        let (repeat, code) = parse_tform(tform)?;
        if nrows == 0 {
            return Ok(match (code, repeat) {
                ('L', _) => ColumnData::Bool(vec![]),
                ('I', _) => ColumnData::I16(vec![]),
                ('J', _) => ColumnData::I32(vec![]),
                ('K', _) => ColumnData::I64(vec![]),
                ('E', 1) => ColumnData::F32(vec![]),
                ('E', n) => ColumnData::F32Array { repeat: n, values: vec![] },
                ('D', _) => ColumnData::F64(vec![]),
                ('A', width) => ColumnData::Str { width, values: vec![] },
                (c, n) => bail!("unsupported column format {}{}", n, c),
            });
        }
        Ok(match (code, repeat) {
            ('L', 1) => ColumnData::Bool(raw::read_logical_column(fptr, colnum, nrows)?),
            ('I', 1) => ColumnData::I16(
                hdu.read_col::<i32>(fptr, name)?
                    .into_iter()
                    .map(|x| x as i16)
                    .collect(),
            ),
            ('J', 1) => ColumnData::I32(hdu.read_col(fptr, name)?),
            ('K', 1) => ColumnData::I64(hdu.read_col(fptr, name)?),
            ('E', 1) => ColumnData::F32(hdu.read_col(fptr, name)?),
            ('E', n) => ColumnData::F32Array {
                repeat: n,
                values: raw::read_float_column(fptr, colnum, nrows * n)?,
            },
            ('D', 1) => ColumnData::F64(hdu.read_col(fptr, name)?),
            ('A', width) => ColumnData::Str {
                width,
                values: hdu
                    .read_col::<String>(fptr, name)?
                    .into_iter()
                    .map(|s| s.trim_end_matches(['\0', ' ']).to_string())
                    .collect(),
            },
            (c, n) => bail!("unsupported column format {}{}", n, c),
        })
    }

    /// Column values widened to `f64`. `None` for string columns.
    pub fn as_f64(&self) -> Option<Vec<f64>> {
        Some(match self {
            ColumnData::Bool(v) => v.iter().map(|&b| if b { 1.0 } else { 0.0 }).collect(),
            ColumnData::I16(v) => v.iter().map(|&x| x as f64).collect(),
            ColumnData::I32(v) => v.iter().map(|&x| x as f64).collect(),
            ColumnData::I64(v) => v.iter().map(|&x| x as f64).collect(),
            ColumnData::F32(v) => v.iter().map(|&x| x as f64).collect(),
            ColumnData::F64(v) => v.clone(),
            ColumnData::F32Array { values, .. } => values.iter().map(|&x| x as f64).collect(),
            ColumnData::Str { .. } => return None,
        })
    }

    /// Integer column values widened to `i64`.
    pub fn as_i64(&self) -> Option<Vec<i64>> {
        Some(match self {
            ColumnData::I16(v) => v.iter().map(|&x| x as i64).collect(),
            ColumnData::I32(v) => v.iter().map(|&x| x as i64).collect(),
            ColumnData::I64(v) => v.clone(),
            _ => return None,
        })
    }

    pub fn as_strings(&self) -> Option<&[String]> {
        match self {
            ColumnData::Str { values, .. } => Some(values),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

/// A binary table plus the extra header cards written with it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BinTable {
    columns: Vec<Column>,
    pub header: Header,
}

impl BinTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nrows(&self) -> usize {
        self.columns.first().map_or(0, |c| c.data.len())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Append a column. All columns must have the same number of rows.
    pub fn push(&mut self, name: &str, data: ColumnData) -> Result<()> {
        if let Some(first) = self.columns.first() {
            ensure!(
                first.data.len() == data.len(),
                "column {} has {} rows, table has {}",
                name,
                data.len(),
                first.data.len()
            );
        }
        ensure!(
            self.column(name).is_none(),
            "duplicate column {}",
            name
        );
        self.columns.push(Column {
            name: name.to_string(),
            data,
        });
        Ok(())
    }

    pub fn column(&self, name: &str) -> Option<&ColumnData> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .map(|c| &c.data)
    }

    /// Read the first BINTABLE extension of `path`.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut fptr = FitsFile::open(path)
            .with_context(|| format!("Failed to open FITS file {}", path.display()))?;
        let mut index = 1;
        let (hdu, nrows) = loop {
            let hdu = fptr
                .hdu(index)
                .with_context(|| format!("No binary table in {}", path.display()))?;
            if let HduInfo::TableInfo { num_rows, .. } = hdu.info {
                break (hdu, num_rows);
            }
            index += 1;
        };
        let hdr = read_header(&mut fptr)?;
        let nfields = hdr.require_i64("TFIELDS")? as usize;

        let mut table = BinTable::new();
        for i in 1..=nfields {
            let name = hdr.require_str(&format!("TTYPE{}", i))?;
            let tform = hdr.require_str(&format!("TFORM{}", i))?;
            let data = ColumnData::read(&mut fptr, &hdu, &name, i, &tform, nrows)
                .with_context(|| format!("column {} ({}) of {}", name, tform, path.display()))?;
            table.push(&name, data)?;
        }
        for card in hdr.iter().filter(|c| !is_structural(&c.key)) {
            table
                .header
                .set(&card.key, card.value.clone(), card.comment.as_deref());
        }
        if let Some(extname) = hdr.get_str("EXTNAME") {
            table.header.set("EXTNAME", extname, None);
        }
        Ok(table)
    }
}

fn parse_tform(tform: &str) -> Result<(usize, char)> {
    let tform = tform.trim();
    let split = tform
        .find(|c: char| c.is_ascii_alphabetic())
        .with_context(|| format!("bad TFORM {}", tform))?;
    let repeat = if split == 0 { 1 } else { tform[..split].parse()? };
    let code = tform[split..].chars().next().unwrap_or(' ');
    Ok((repeat, code))
}

/// Write `table` as a FITS file at `path` (empty primary HDU plus one
/// BINTABLE named by the header's EXTNAME, default `TABLE`), atomically.
pub fn write_table<P: AsRef<Path>>(path: P, table: &BinTable) -> Result<()> {
    let descriptions = table
        .columns
        .iter()
        .map(|c| c.data.description(&c.name))
        .collect::<Result<Vec<_>>>()?;
    let extname = table.header.get_str("EXTNAME").unwrap_or_else(|| "TABLE".to_string());

    write_via_temp(&path, |tmp| {
        let mut fptr = FitsFile::create(tmp).overwrite().open()?;
        let hdu = fptr.create_table(extname.clone(), &descriptions)?;
        if table.nrows() > 0 {
            for (i, col) in table.columns.iter().enumerate() {
                col.data
                    .write(&mut fptr, &hdu, &col.name, i + 1)
                    .with_context(|| format!("column {}", col.name))?;
            }
        }
        // Column writes leave the table HDU current.
        write_header(&mut fptr, &hdu, &table.header)
    })?;
    info!(
        "Wrote {} ({} rows, {} columns)",
        path.as_ref().display(),
        table.nrows(),
        table.columns().len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> BinTable {
        let mut t = BinTable::new();
        t.push("expnum", ColumnData::I64(vec![563212, 563213])).unwrap();
        t.push("ccdname", ColumnData::Str { width: 4, values: vec!["N4".into(), "S31".into()] })
            .unwrap();
        t.push("zpt", ColumnData::F32(vec![25.1, 0.0])).unwrap();
        t.push("yshift", ColumnData::Bool(vec![true, false])).unwrap();
        t.push("flux", ColumnData::F32Array { repeat: 3, values: vec![1., 2., 3., 4., 5., 6.] })
            .unwrap();
        t.header.set("EXPNUM", 563212i64, Some("Exposure number"));
        t.header.set("CAMERA", "decam", None);
        t
    }

    #[test]
    fn test_table_write_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ccds.fits");
        write_table(&path, &sample_table()).unwrap();
        assert!(!dir.path().join("tmp-ccds.fits").exists());

        let back = BinTable::read(&path).unwrap();
        assert_eq!(back.nrows(), 2);
        assert_eq!(back.column("EXPNUM").unwrap().as_i64().unwrap(), vec![563212, 563213]);
        assert_eq!(back.column("ccdname").unwrap().as_strings().unwrap()[1], "S31");
        assert_eq!(back.column("yshift"), Some(&ColumnData::Bool(vec![true, false])));
        assert_eq!(
            back.column("flux"),
            Some(&ColumnData::F32Array { repeat: 3, values: vec![1., 2., 3., 4., 5., 6.] })
        );
        assert_eq!(back.header.get_i64("EXPNUM"), Some(563212));
        assert_eq!(back.header.get_str("CAMERA").as_deref(), Some("decam"));
        assert_eq!(back.header.get_str("EXTNAME").as_deref(), Some("TABLE"));
        assert!(!back.header.contains("TTYPE1"));
    }

    #[test]
    fn test_empty_table_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.fits");
        let mut t = BinTable::new();
        t.push("ra", ColumnData::F64(vec![])).unwrap();
        t.push("ccdname", ColumnData::Str { width: 3, values: vec![] }).unwrap();
        write_table(&path, &t).unwrap();
        let back = BinTable::read(&path).unwrap();
        assert_eq!(back.nrows(), 0);
        assert_eq!(back.columns().len(), 2);
    }

    #[test]
    fn test_read_without_table_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.fits");
        let pixels = crate::plane::Plane::filled(2, 2, 0.0f32);
        super::super::write_mef(&path, &Header::new(), &[("N4", &Header::new(), &pixels)]).unwrap();
        assert!(BinTable::read(&path).is_err());
    }

    #[test]
    fn test_push_rejects_ragged_column() {
        let mut t = sample_table();
        assert!(t.push("bad", ColumnData::F64(vec![1.0])).is_err());
    }
}
