use crate::{
    error::Result,
    models::{GenerationParams, Generated},
};
use async_trait::async_trait;
use image::DynamicImage;

/// A diffusion backend. Methods take `&mut self` because a backend is not
/// reentrant; share it through [`super::EngineClient`].
#[async_trait]
pub trait GenerationEngine: Send {
    async fn synthesize_text(&mut self, params: &GenerationParams) -> Result<Generated>;

    async fn synthesize_image(
        &mut self,
        params: &GenerationParams,
        init: &DynamicImage,
    ) -> Result<Generated>;

    async fn synthesize_masked(
        &mut self,
        params: &GenerationParams,
        init: &DynamicImage,
        mask: &DynamicImage,
    ) -> Result<Generated>;

    /// Round-trips an image through the model's latent representation.
    async fn decode(&mut self, image: &DynamicImage, height: u32, width: u32)
        -> Result<DynamicImage>;

    /// Resets the generator used to pick seeds when a request asks for `-1`.
    fn reseed(&mut self, seed: i64);
}
