//! The cfitsio calls the safe `fitsio` API does not wrap: listing every
//! header record, logical keys and columns, and fixed-length float vector
//! columns. All of them act on the current HDU of `fptr`.

use std::ffi::CString;
use std::os::raw::{c_char, c_int};

use anyhow::{bail, Context, Result};
use fitsio::sys;
use fitsio::FitsFile;

fn check(status: c_int, call: &str) -> Result<()> {
    if status != 0 {
        bail!("cfitsio {} failed with status {}", call, status);
    }
    Ok(())
}

/// Every keyword record of the current HDU, in file order.
pub(crate) fn header_records(fptr: &mut FitsFile) -> Result<Vec<String>> {
    let raw = unsafe { fptr.as_raw() };
    let mut status: c_int = 0;
    let mut nkeys: c_int = 0;
    let mut nmore: c_int = 0;
    unsafe { sys::ffghsp(raw, &mut nkeys, &mut nmore, &mut status) };
    check(status, "ffghsp")?;

    let mut records = Vec::with_capacity(nkeys.max(0) as usize);
    let mut card = [0 as c_char; 81];
    for nrec in 1..=nkeys {
        unsafe { sys::ffgrec(raw, nrec, card.as_mut_ptr(), &mut status) };
        check(status, "ffgrec")?;
        let bytes: Vec<u8> = card.iter().take_while(|&&c| c != 0).map(|&c| c as u8).collect();
        records.push(String::from_utf8_lossy(&bytes).into_owned());
    }
    Ok(records)
}

/// Write (or update) a logical keyword.
pub(crate) fn write_logical_key(fptr: &mut FitsFile, key: &str, value: bool, comment: &str) -> Result<()> {
    let key = CString::new(key).context("keyword contains a NUL byte")?;
    let comment = CString::new(comment).unwrap_or_default();
    let mut status: c_int = 0;
    unsafe {
        sys::ffukyl(
            fptr.as_raw(),
            key.as_ptr(),
            value as c_int,
            comment.as_ptr(),
            &mut status,
        )
    };
    check(status, "ffukyl")
}

/// Write a logical (`L`) column starting at row 1.
pub(crate) fn write_logical_column(fptr: &mut FitsFile, colnum: usize, values: &[bool]) -> Result<()> {
    let mut data: Vec<c_char> = values.iter().map(|&b| b as c_char).collect();
    let mut status: c_int = 0;
    unsafe {
        sys::ffpcll(
            fptr.as_raw(),
            colnum as c_int,
            1,
            1,
            data.len() as i64,
            data.as_mut_ptr(),
            &mut status,
        )
    };
    check(status, "ffpcll")
}

/// Read `nrows` values of a logical column.
pub(crate) fn read_logical_column(fptr: &mut FitsFile, colnum: usize, nrows: usize) -> Result<Vec<bool>> {
    let mut data: Vec<c_char> = vec![0; nrows];
    let mut anynul: c_int = 0;
    let mut status: c_int = 0;
    if nrows > 0 {
        unsafe {
            sys::ffgcvl(
                fptr.as_raw(),
                colnum as c_int,
                1,
                1,
                nrows as i64,
                0,
                data.as_mut_ptr(),
                &mut anynul,
                &mut status,
            )
        };
        check(status, "ffgcvl")?;
    }
    Ok(data.into_iter().map(|c| c != 0).collect())
}

/// Read `nelem` values of a float column row-major from row 1; covers vector
/// columns like `nE`, which `read_col` only returns one element per row of.
pub(crate) fn read_float_column(fptr: &mut FitsFile, colnum: usize, nelem: usize) -> Result<Vec<f32>> {
    let mut data = vec![0f32; nelem];
    let mut anynul: c_int = 0;
    let mut status: c_int = 0;
    if nelem > 0 {
        unsafe {
            sys::ffgcve(
                fptr.as_raw(),
                colnum as c_int,
                1,
                1,
                nelem as i64,
                0.0,
                data.as_mut_ptr(),
                &mut anynul,
                &mut status,
            )
        };
        check(status, "ffgcve")?;
    }
    Ok(data)
}

/// Write a float column row-major from row 1, including vector columns.
pub(crate) fn write_float_column(fptr: &mut FitsFile, colnum: usize, values: &[f32]) -> Result<()> {
    let mut data = values.to_vec();
    let mut status: c_int = 0;
    if !data.is_empty() {
        unsafe {
            sys::ffpcle(
                fptr.as_raw(),
                colnum as c_int,
                1,
                1,
                data.len() as i64,
                data.as_mut_ptr(),
                &mut status,
            )
        };
        check(status, "ffpcle")?;
    }
    Ok(())
}
