//! Texture Pool
//!
//! Recycles atlas pixel buffers by resolution.

use image::RgbaImage;
use meshtiles_core::memory::{Pool, PoolStats};

use crate::texture::Texture;

/// Pool of RGBA buffers keyed by `(width, height)`
pub struct TexturePool {
    pool: Pool<(u32, u32), RgbaImage>,
}

impl TexturePool {
    /// Create a pool keeping at most `max_per_size` buffers per resolution
    pub fn new(max_per_size: usize) -> Self {
        Self {
            pool: Pool::new(max_per_size),
        }
    }

    /// A transparent texture of the requested size
    pub fn acquire(&self, width: u32, height: u32) -> Texture {
        let image = self
            .pool
            .acquire((width, height), |&(w, h)| RgbaImage::new(w, h));
        let mut texture = Texture::from_image(image);
        texture.clear();
        texture
    }

    /// Hand a texture's buffer back for reuse
    pub fn release(&self, texture: Texture) {
        let key = texture.size();
        self.pool.release(key, texture.into_image());
    }

    pub fn available(&self, width: u32, height: u32) -> usize {
        self.pool.available(&(width, height))
    }

    pub fn stats(&self) -> &PoolStats {
        self.pool.stats()
    }
}

impl Default for TexturePool {
    fn default() -> Self {
        Self::new(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_released_texture_comes_back_cleared() {
        let pool = TexturePool::default();
        let mut texture = pool.acquire(4, 4);
        texture.image_mut().put_pixel(1, 1, Rgba([9, 9, 9, 9]));
        pool.release(texture);
        assert_eq!(pool.available(4, 4), 1);

        let again = pool.acquire(4, 4);
        assert_eq!(again.image().get_pixel(1, 1).0, [0, 0, 0, 0]);
        assert_eq!(pool.stats().reused(), 1);
        assert_eq!(pool.available(4, 4), 0);
    }
}
