//! Image to patch-embedding sequence.

use ndarray::{Array2, ArrayView3, ArrayViewD, ArrayViewMutD, s};
use rand::Rng;

use crate::config::ViTConfig;
use crate::error::{Error, Result};
use crate::nn::{Linear, Parameters, param_key};

/// Cuts an image into non-overlapping square patches and projects each one
/// to the model width with a single shared linear layer.
#[derive(Debug, Clone)]
pub struct PatchEmbedding {
    channels: usize,
    image_size: usize,
    patch_size: usize,
    proj: Linear,
}

impl PatchEmbedding {
    pub fn new<R: Rng + ?Sized>(config: &ViTConfig, rng: &mut R) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            channels: config.channels,
            image_size: config.image_size,
            patch_size: config.patch_size,
            proj: Linear::new(config.patch_dim(), config.dim, true, rng),
        })
    }

    pub fn num_patches(&self) -> usize {
        (self.image_size / self.patch_size).pow(2)
    }

    pub fn patch_dim(&self) -> usize {
        self.channels * self.patch_size * self.patch_size
    }

    /// Check that `image` is `(channels, image_size, image_size)`.
    pub fn check_image(&self, image: &ArrayView3<'_, f32>) -> Result<()> {
        let (c, h, w) = image.dim();
        if c != self.channels {
            return Err(Error::Shape(format!(
                "expected {} channels, got {c}",
                self.channels
            )));
        }
        if h != self.image_size || w != self.image_size {
            return Err(Error::Shape(format!(
                "expected {size}x{size} image, got {h}x{w}",
                size = self.image_size
            )));
        }
        Ok(())
    }

    /// Flatten the image into one row per patch, in raster order.
    ///
    /// Each row holds the patch's values channel by channel, each channel
    /// row-major.
    pub fn patchify(&self, image: ArrayView3<'_, f32>) -> Result<Array2<f32>> {
        self.check_image(&image)?;
        let p = self.patch_size;
        let grid = self.image_size / p;

        let mut patches = Array2::zeros((self.num_patches(), self.patch_dim()));
        for (idx, mut row) in patches.rows_mut().into_iter().enumerate() {
            let (gy, gx) = (idx / grid, idx % grid);
            let patch = image.slice(s![.., gy * p..(gy + 1) * p, gx * p..(gx + 1) * p]);
            for (dst, &src) in row.iter_mut().zip(patch.iter()) {
                *dst = src;
            }
        }
        Ok(patches)
    }

    /// Embed `image` as `num_patches x dim`.
    pub fn forward(&self, image: ArrayView3<'_, f32>) -> Result<Array2<f32>> {
        let patches = self.patchify(image)?;
        Ok(self.proj.forward(&patches))
    }
}

impl Parameters for PatchEmbedding {
    fn parameters(&self, prefix: &str) -> Vec<(String, ArrayViewD<'_, f32>)> {
        self.proj.parameters(&param_key(prefix, "proj"))
    }

    fn parameters_mut(&mut self, prefix: &str) -> Vec<(String, ArrayViewMutD<'_, f32>)> {
        self.proj.parameters_mut(&param_key(prefix, "proj"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn embedding(channels: usize) -> PatchEmbedding {
        let config = ViTConfig::new(4, 2, 3, 8, 1, 2, 16, 0.0, 0.0).with_channels(channels);
        PatchEmbedding::new(&config, &mut StdRng::seed_from_u64(1)).unwrap()
    }

    #[test]
    fn test_patchify_raster_order() {
        let embed = embedding(1);
        let image = Array3::from_shape_fn((1, 4, 4), |(_, y, x)| (y * 4 + x) as f32);
        let patches = embed.patchify(image.view()).unwrap();
        assert_eq!(patches.dim(), (4, 4));
        assert_eq!(patches.row(0).to_vec(), vec![0.0, 1.0, 4.0, 5.0]);
        assert_eq!(patches.row(1).to_vec(), vec![2.0, 3.0, 6.0, 7.0]);
        assert_eq!(patches.row(2).to_vec(), vec![8.0, 9.0, 12.0, 13.0]);
        assert_eq!(patches.row(3).to_vec(), vec![10.0, 11.0, 14.0, 15.0]);
    }

    #[test]
    fn test_patchify_channel_major() {
        let embed = embedding(2);
        let image = Array3::from_shape_fn((2, 4, 4), |(c, y, x)| (c * 100 + y * 4 + x) as f32);
        let patches = embed.patchify(image.view()).unwrap();
        assert_eq!(patches.dim(), (4, 8));
        assert_eq!(
            patches.row(0).to_vec(),
            vec![0.0, 1.0, 4.0, 5.0, 100.0, 101.0, 104.0, 105.0]
        );
    }

    #[test]
    fn test_forward_shape() {
        let embed = embedding(3);
        let out = embed.forward(Array3::<f32>::zeros((3, 4, 4)).view()).unwrap();
        assert_eq!(out.dim(), (4, 8));
        // zero input leaves only the bias
        let bias = embed.proj.bias().unwrap();
        for row in out.rows() {
            assert_eq!(&row, bias);
        }
    }

    #[test]
    fn test_rejects_bad_shapes() {
        let embed = embedding(3);
        assert!(matches!(
            embed.forward(Array3::<f32>::zeros((1, 4, 4)).view()),
            Err(Error::Shape(_))
        ));
        assert!(matches!(
            embed.forward(Array3::<f32>::zeros((3, 4, 6)).view()),
            Err(Error::Shape(_))
        ));
    }
}
