//! Region Compositing
//!
//! Copies a UV region of a source texture into a pixel rectangle of a
//! destination texture. Rows are filled in parallel with rayon.

use meshtiles_core::atlas::{PixelRect, UvRect};
use meshtiles_core::math::DVec2;
use rayon::prelude::*;

use crate::texture::Texture;
use crate::TextureResult;

/// Sampling used when copying a region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    /// Nearest texel, exact when source and destination pixel sizes match
    Point,
    /// Four texel blend, used when the region is resampled
    Bilinear,
}

/// UV transform of the material the source texture belongs to
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureTransform {
    pub scale: DVec2,
    pub offset: DVec2,
}

impl TextureTransform {
    pub fn apply(&self, uv: DVec2) -> DVec2 {
        uv * self.scale + self.offset
    }
}

impl Default for TextureTransform {
    fn default() -> Self {
        Self {
            scale: DVec2::ONE,
            offset: DVec2::ZERO,
        }
    }
}

/// Texture region copy service
pub trait TextureCompositor {
    /// Fill `destination_rect` of `destination` with the `source_rect` region
    /// of `source`, leaving every other destination pixel untouched
    fn copy_region(
        &self,
        source: &Texture,
        transform: TextureTransform,
        source_rect: &UvRect,
        destination: &mut Texture,
        destination_rect: PixelRect,
        filter: FilterMode,
    ) -> TextureResult<()>;
}

/// Compositor running on the CPU
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuCompositor;

impl TextureCompositor for CpuCompositor {
    fn copy_region(
        &self,
        source: &Texture,
        transform: TextureTransform,
        source_rect: &UvRect,
        destination: &mut Texture,
        destination_rect: PixelRect,
        filter: FilterMode,
    ) -> TextureResult<()> {
        let (dst_width, dst_height) = destination.size();
        let x_end = (destination_rect.x + destination_rect.width).min(dst_width);
        let y_end = (destination_rect.y + destination_rect.height).min(dst_height);
        if destination_rect.x >= x_end || destination_rect.y >= y_end {
            return Ok(());
        }

        let stride = dst_width as usize * 4;
        let rect_size = DVec2::new(
            f64::from(destination_rect.width),
            f64::from(destination_rect.height),
        );
        let pixels: &mut [u8] = destination.image_mut();

        pixels
            .par_chunks_mut(stride)
            .enumerate()
            .skip(destination_rect.y as usize)
            .take((y_end - destination_rect.y) as usize)
            .for_each(|(y, row)| {
                for x in destination_rect.x..x_end {
                    let local = DVec2::new(
                        f64::from(x - destination_rect.x) + 0.5,
                        (y as u32 - destination_rect.y) as f64 + 0.5,
                    ) / rect_size;
                    let uv = transform.apply(source_rect.min + local * source_rect.size());
                    let texel = match filter {
                        FilterMode::Point => source.sample_point(uv),
                        FilterMode::Bilinear => source.sample_bilinear(uv),
                    };
                    let offset = x as usize * 4;
                    row[offset..offset + 4].copy_from_slice(&texel.0);
                }
            });

        Ok(())
    }
}
