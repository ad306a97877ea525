use std::ops::{Index, IndexMut};

use v_frame::pixel::ChromaSampling;

use super::block::{ColorPlane, plane_shift};

/// Rectangle inside a plane, in samples of that plane.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    /// Left edge.
    pub x: usize,
    /// Top edge.
    pub y: usize,
    /// Width in samples.
    pub width: usize,
    /// Height in samples.
    pub height: usize,
}

impl Rect {
    /// Rectangle with its top-left corner at `(x, y)`.
    #[inline]
    pub const fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }
}

/// Owned two-dimensional sample array with a stride equal to its width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaneBuf<T> {
    data: Vec<T>,
    width: usize,
    height: usize,
}

impl<T: Copy> PlaneBuf<T> {
    /// A `width` x `height` plane with every sample set to `fill`.
    #[inline]
    pub fn new(width: usize, height: usize, fill: T) -> Self {
        PlaneBuf {
            data: vec![fill; width * height],
            width,
            height,
        }
    }

    /// Width in samples.
    #[inline]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Height in samples.
    #[inline]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Distance between rows. Planes are tightly packed.
    #[inline]
    pub const fn stride(&self) -> usize {
        self.width
    }

    /// Samples in raster order.
    #[inline]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Mutable samples in raster order.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Sets every sample to `value`.
    #[inline]
    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    /// Sample at `(x, y)` with coordinates clamped to the plane.
    ///
    /// # Panics
    ///
    /// - If the plane is empty.
    #[inline]
    pub fn clamped(&self, x: isize, y: isize) -> T {
        assert!(self.width > 0 && self.height > 0);
        let x = x.clamp(0, self.width as isize - 1) as usize;
        let y = y.clamp(0, self.height as isize - 1) as usize;
        self.data[y * self.width + x]
    }

    /// # Panics
    ///
    /// - If `rect` is not fully inside the plane.
    #[inline]
    pub fn region(&self, rect: Rect) -> PlaneRegion<'_, T> {
        assert!(rect.x + rect.width <= self.width);
        assert!(rect.y + rect.height <= self.height);
        let origin = rect.y * self.width + rect.x;
        let end = if rect.height == 0 {
            origin
        } else {
            (rect.y + rect.height - 1) * self.width + rect.x + rect.width
        };
        PlaneRegion {
            data: &self.data[origin..end],
            stride: self.width,
            rect,
        }
    }

    /// # Panics
    ///
    /// - If `rect` is not fully inside the plane.
    #[inline]
    pub fn region_mut(&mut self, rect: Rect) -> PlaneRegionMut<'_, T> {
        assert!(rect.x + rect.width <= self.width);
        assert!(rect.y + rect.height <= self.height);
        let origin = rect.y * self.width + rect.x;
        let end = if rect.height == 0 {
            origin
        } else {
            (rect.y + rect.height - 1) * self.width + rect.x + rect.width
        };
        PlaneRegionMut {
            data: &mut self.data[origin..end],
            stride: self.width,
            rect,
        }
    }

    /// View of the whole plane.
    #[inline]
    pub fn as_region(&self) -> PlaneRegion<'_, T> {
        self.region(Rect::new(0, 0, self.width, self.height))
    }
}

impl<T> Index<usize> for PlaneBuf<T> {
    type Output = [T];

    #[inline]
    fn index(&self, y: usize) -> &[T] {
        &self.data[y * self.width..(y + 1) * self.width]
    }
}

impl<T> IndexMut<usize> for PlaneBuf<T> {
    #[inline]
    fn index_mut(&mut self, y: usize) -> &mut [T] {
        &mut self.data[y * self.width..(y + 1) * self.width]
    }
}

/// Bounded region of a plane
///
/// This allows giving access to a rectangular area of a plane without
/// giving access to the whole plane.
#[derive(Debug, Clone, Copy)]
pub struct PlaneRegion<'a, T> {
    // starts at (rect.x, rect.y)
    data: &'a [T],
    stride: usize,
    rect: Rect,
}

/// Mutable bounded region of a plane
#[derive(Debug)]
pub struct PlaneRegionMut<'a, T> {
    data: &'a mut [T],
    stride: usize,
    rect: Rect,
}

impl<'a, T: Copy> PlaneRegion<'a, T> {
    #[inline]
    pub const fn rect(&self) -> &Rect {
        &self.rect
    }

    #[inline]
    pub const fn width(&self) -> usize {
        self.rect.width
    }

    #[inline]
    pub const fn height(&self) -> usize {
        self.rect.height
    }

    #[inline]
    pub fn rows_iter(&self) -> impl Iterator<Item = &'a [T]> + 'a {
        let (stride, width, height) = (self.stride, self.rect.width, self.rect.height);
        let data = self.data;
        (0..height).map(move |y| &data[y * stride..y * stride + width])
    }

    /// Region relative to this one.
    ///
    /// # Panics
    ///
    /// - If the subregion is not fully inside this region.
    #[inline]
    pub fn subregion(&self, x: usize, y: usize, width: usize, height: usize) -> PlaneRegion<'a, T> {
        assert!(x + width <= self.rect.width && y + height <= self.rect.height);
        let origin = y * self.stride + x;
        let end = if height == 0 {
            origin
        } else {
            (y + height - 1) * self.stride + x + width
        };
        PlaneRegion {
            data: &self.data[origin..end],
            stride: self.stride,
            rect: Rect::new(self.rect.x + x, self.rect.y + y, width, height),
        }
    }
}

impl<T> Index<usize> for PlaneRegion<'_, T> {
    type Output = [T];

    #[inline]
    fn index(&self, y: usize) -> &[T] {
        assert!(y < self.rect.height);
        let start = y * self.stride;
        &self.data[start..start + self.rect.width]
    }
}

impl<'a, T: Copy> PlaneRegionMut<'a, T> {
    #[inline]
    pub const fn rect(&self) -> &Rect {
        &self.rect
    }

    #[inline]
    pub fn rows_iter_mut(&mut self) -> impl Iterator<Item = &mut [T]> + '_ {
        let (stride, width) = (self.stride, self.rect.width);
        self.data
            .chunks_mut(stride.max(1))
            .take(self.rect.height)
            .map(move |row| &mut row[..width])
    }

    #[inline]
    pub fn as_const(&self) -> PlaneRegion<'_, T> {
        PlaneRegion {
            data: &*self.data,
            stride: self.stride,
            rect: self.rect,
        }
    }

    /// # Panics
    ///
    /// - If the regions differ in size.
    #[inline]
    pub fn copy_from(&mut self, src: &PlaneRegion<'_, T>) {
        assert_eq!(self.rect.width, src.width());
        assert_eq!(self.rect.height, src.height());
        for (dst, src) in self.rows_iter_mut().zip(src.rows_iter()) {
            dst.copy_from_slice(src);
        }
    }

    #[inline]
    pub fn fill(&mut self, value: T) {
        for row in self.rows_iter_mut() {
            row.fill(value);
        }
    }
}

impl<T> Index<usize> for PlaneRegionMut<'_, T> {
    type Output = [T];

    #[inline]
    fn index(&self, y: usize) -> &[T] {
        assert!(y < self.rect.height);
        let start = y * self.stride;
        &self.data[start..start + self.rect.width]
    }
}

impl<T> IndexMut<usize> for PlaneRegionMut<'_, T> {
    #[inline]
    fn index_mut(&mut self, y: usize) -> &mut [T] {
        assert!(y < self.rect.height);
        let start = y * self.stride;
        &mut self.data[start..start + self.rect.width]
    }
}

/// Three co-sited planes of one picture or block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Yuv<T> {
    /// Luma, Cb and Cr, in that order.
    pub planes: [PlaneBuf<T>; 3],
    /// Chroma layout of `planes`.
    pub chroma_sampling: ChromaSampling,
}

impl<T: Copy> Yuv<T> {
    /// Allocates planes for a luma area of `width` x `height`. Monochrome
    /// content gets empty chroma planes.
    #[inline]
    pub fn new(width: usize, height: usize, chroma_sampling: ChromaSampling, fill: T) -> Self {
        let chroma = |plane| {
            if chroma_sampling == ChromaSampling::Cs400 {
                PlaneBuf::new(0, 0, fill)
            } else {
                let (xdec, ydec) = plane_shift(chroma_sampling, plane);
                PlaneBuf::new(width >> xdec, height >> ydec, fill)
            }
        };
        Yuv {
            planes: [
                PlaneBuf::new(width, height, fill),
                chroma(ColorPlane::Cb),
                chroma(ColorPlane::Cr),
            ],
            chroma_sampling,
        }
    }

    /// Luma width.
    #[inline]
    pub const fn width(&self) -> usize {
        self.planes[0].width()
    }

    /// Luma height.
    #[inline]
    pub const fn height(&self) -> usize {
        self.planes[0].height()
    }

    /// Returns `false` for 4:0:0 content.
    #[inline]
    pub fn has_chroma(&self) -> bool {
        self.chroma_sampling != ChromaSampling::Cs400
    }

    /// One plane by color.
    #[inline]
    pub fn plane(&self, plane: ColorPlane) -> &PlaneBuf<T> {
        &self.planes[plane.index()]
    }

    /// One plane by color, mutably.
    #[inline]
    pub fn plane_mut(&mut self, plane: ColorPlane) -> &mut PlaneBuf<T> {
        &mut self.planes[plane.index()]
    }

    /// Region of `plane` covering the luma rectangle `luma`.
    #[inline]
    pub fn region_for(&self, plane: ColorPlane, luma: Rect) -> PlaneRegion<'_, T> {
        let (xdec, ydec) = plane_shift(self.chroma_sampling, plane);
        self.plane(plane).region(Rect::new(
            luma.x >> xdec,
            luma.y >> ydec,
            luma.width >> xdec,
            luma.height >> ydec,
        ))
    }

    /// Mutable counterpart of [`Yuv::region_for`].
    #[inline]
    pub fn region_for_mut(&mut self, plane: ColorPlane, luma: Rect) -> PlaneRegionMut<'_, T> {
        let (xdec, ydec) = plane_shift(self.chroma_sampling, plane);
        self.plane_mut(plane).region_mut(Rect::new(
            luma.x >> xdec,
            luma.y >> ydec,
            luma.width >> xdec,
            luma.height >> ydec,
        ))
    }

    /// Copies the luma rectangle `luma` (and its chroma counterpart) from
    /// `src`, where both buffers share the same origin.
    #[inline]
    pub fn copy_area_from(&mut self, src: &Yuv<T>, luma: Rect) {
        let planes = if self.has_chroma() { 3 } else { 1 };
        for &plane in &ColorPlane::ALL[..planes] {
            let src = src.region_for(plane, luma);
            self.region_for_mut(plane, luma).copy_from(&src);
        }
    }
}
