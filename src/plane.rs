//! Row-major 2D pixel arrays.

use anyhow::{ensure, Result};

/// A rectangular pixel region `[x0, x1) × [y0, y1)` in zero-indexed CCD pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x0: usize,
    pub x1: usize,
    pub y0: usize,
    pub y1: usize,
}

impl Region {
    pub fn width(&self) -> usize {
        self.x1 - self.x0
    }

    pub fn height(&self) -> usize {
        self.y1 - self.y0
    }
}

/// Row-major image buffer. `data[y * width + x]` is column `x`, row `y`.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane<T> {
    width: usize,
    height: usize,
    data: Vec<T>,
}

impl<T: Copy> Plane<T> {
    pub fn new(width: usize, height: usize, data: Vec<T>) -> Result<Self> {
        ensure!(
            data.len() == width * height,
            "plane data length {} does not match {}x{}",
            data.len(),
            width,
            height
        );
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn filled(width: usize, height: usize, value: T) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        self.data[y * self.width + x] = value;
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    /// Copy out the pixels of `region`. The region must lie inside the plane.
    pub fn crop(&self, region: &Region) -> Result<Self> {
        ensure!(
            region.x1 <= self.width && region.y1 <= self.height && region.x0 <= region.x1 && region.y0 <= region.y1,
            "crop region {:?} outside {}x{} plane",
            region,
            self.width,
            self.height
        );
        let mut data = Vec::with_capacity(region.width() * region.height());
        for y in region.y0..region.y1 {
            let row = y * self.width;
            data.extend_from_slice(&self.data[row + region.x0..row + region.x1]);
        }
        Ok(Self {
            width: region.width(),
            height: region.height(),
            data,
        })
    }

    /// Apply `f` element-wise, producing a new plane of the same shape.
    pub fn map<U: Copy>(&self, f: impl Fn(T) -> U) -> Plane<U> {
        Plane {
            width: self.width,
            height: self.height,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crop_row_major() {
        let p = Plane::new(4, 3, (0..12).collect::<Vec<i32>>()).unwrap();
        let c = p
            .crop(&Region {
                x0: 1,
                x1: 3,
                y0: 1,
                y1: 3,
            })
            .unwrap();
        assert_eq!(c.width(), 2);
        assert_eq!(c.data(), &[5, 6, 9, 10]);
    }

    #[test]
    fn test_new_rejects_bad_length() {
        assert!(Plane::new(3, 3, vec![0.0f32; 8]).is_err());
    }
}
