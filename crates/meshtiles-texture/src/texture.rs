//! Textures and Materials
//!
//! RGBA8 textures backed by [`image::RgbaImage`], sampled in image-space UVs
//! (v = 0 on the first row) with repeat wrapping.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use image::{ImageFormat, Rgba, RgbaImage};
use meshtiles_core::math::DVec2;

use crate::TextureResult;

/// RGBA8 texture
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    image: RgbaImage,
}

impl Texture {
    /// Create a fully transparent texture
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
        }
    }

    pub fn from_image(image: RgbaImage) -> Self {
        Self { image }
    }

    /// Load any format the `image` crate can decode
    pub fn load(path: impl AsRef<Path>) -> TextureResult<Self> {
        let image = image::open(path.as_ref())?.to_rgba8();
        Ok(Self { image })
    }

    pub fn save_png(&self, path: impl AsRef<Path>) -> TextureResult<()> {
        self.image.save_with_format(path.as_ref(), ImageFormat::Png)?;
        Ok(())
    }

    /// PNG encoded bytes
    pub fn encode_png(&self) -> TextureResult<Vec<u8>> {
        let mut bytes = Cursor::new(Vec::new());
        self.image.write_to(&mut bytes, ImageFormat::Png)?;
        Ok(bytes.into_inner())
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut RgbaImage {
        &mut self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Reset every pixel to transparent black
    pub fn clear(&mut self) {
        for pixel in self.image.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 0]);
        }
    }

    fn texel(&self, x: i64, y: i64) -> Rgba<u8> {
        let x = x.rem_euclid(i64::from(self.width())) as u32;
        let y = y.rem_euclid(i64::from(self.height())) as u32;
        *self.image.get_pixel(x, y)
    }

    /// Nearest texel
    pub fn sample_point(&self, uv: DVec2) -> Rgba<u8> {
        if self.width() == 0 || self.height() == 0 {
            return Rgba([0, 0, 0, 0]);
        }
        let px = (uv * DVec2::new(f64::from(self.width()), f64::from(self.height()))).floor();
        self.texel(px.x as i64, px.y as i64)
    }

    /// Bilinear blend of the four texels around `uv`
    pub fn sample_bilinear(&self, uv: DVec2) -> Rgba<u8> {
        if self.width() == 0 || self.height() == 0 {
            return Rgba([0, 0, 0, 0]);
        }
        let coord = uv * DVec2::new(f64::from(self.width()), f64::from(self.height())) - 0.5;
        let base = coord.floor();
        let frac = coord - base;
        let (x, y) = (base.x as i64, base.y as i64);

        let corners = [
            (self.texel(x, y), (1.0 - frac.x) * (1.0 - frac.y)),
            (self.texel(x + 1, y), frac.x * (1.0 - frac.y)),
            (self.texel(x, y + 1), (1.0 - frac.x) * frac.y),
            (self.texel(x + 1, y + 1), frac.x * frac.y),
        ];

        let mut out = [0u8; 4];
        for (channel, value) in out.iter_mut().enumerate() {
            let blended: f64 = corners
                .iter()
                .map(|(texel, weight)| f64::from(texel.0[channel]) * weight)
                .sum();
            *value = blended.round().clamp(0.0, 255.0) as u8;
        }
        Rgba(out)
    }
}

/// Surface material: an optional texture plus its UV transform
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub texture: Option<Arc<Texture>>,
    /// UV scale applied before sampling
    pub scale: DVec2,
    /// UV offset applied after scaling
    pub offset: DVec2,
}

impl Material {
    /// Untextured material
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            texture: None,
            scale: DVec2::ONE,
            offset: DVec2::ZERO,
        }
    }

    pub fn with_texture(mut self, texture: Arc<Texture>) -> Self {
        self.texture = Some(texture);
        self
    }

    pub fn with_transform(mut self, scale: DVec2, offset: DVec2) -> Self {
        self.scale = scale;
        self.offset = offset;
        self
    }

    pub fn texture_size(&self) -> Option<(u32, u32)> {
        self.texture.as_ref().map(|texture| texture.size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker() -> Texture {
        let mut texture = Texture::new(2, 2);
        texture.image_mut().put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        texture.image_mut().put_pixel(1, 0, Rgba([0, 255, 0, 255]));
        texture.image_mut().put_pixel(0, 1, Rgba([0, 0, 255, 255]));
        texture.image_mut().put_pixel(1, 1, Rgba([255, 255, 255, 255]));
        texture
    }

    #[test]
    fn test_point_sampling_picks_texels() {
        let texture = checker();
        assert_eq!(texture.sample_point(DVec2::new(0.25, 0.25)), Rgba([255, 0, 0, 255]));
        assert_eq!(texture.sample_point(DVec2::new(0.75, 0.25)), Rgba([0, 255, 0, 255]));
        assert_eq!(texture.sample_point(DVec2::new(0.25, 0.75)), Rgba([0, 0, 255, 255]));
        // Repeat wrapping
        assert_eq!(texture.sample_point(DVec2::new(1.25, -0.25)), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn test_bilinear_at_texel_center_is_exact() {
        let texture = checker();
        assert_eq!(texture.sample_bilinear(DVec2::new(0.75, 0.75)), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_bilinear_blends_between_texels() {
        let texture = checker();
        let blended = texture.sample_bilinear(DVec2::new(0.5, 0.25));
        assert_eq!(blended, Rgba([128, 128, 0, 255]));
    }

    #[test]
    fn test_png_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checker.png");
        let texture = checker();
        texture.save_png(&path).unwrap();
        assert_eq!(Texture::load(&path).unwrap(), texture);
        assert!(!texture.encode_png().unwrap().is_empty());
    }

    #[test]
    fn test_clear() {
        let mut texture = checker();
        texture.clear();
        assert!(texture.image().pixels().all(|p| p.0 == [0, 0, 0, 0]));
    }

    #[test]
    fn test_material_texture_size() {
        let material = Material::new("stone").with_texture(Arc::new(Texture::new(64, 32)));
        assert_eq!(material.texture_size(), Some((64, 32)));
        assert_eq!(Material::new("plain").texture_size(), None);
    }
}
