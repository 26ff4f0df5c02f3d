pub mod http;
pub mod traits;

use crate::{
    config::RANDOM_SEED,
    error::{BotError, Result},
    logger,
    models::{GenerationParams, Generated, Request, RequestMode},
};
use image::DynamicImage;
use std::sync::Arc;
use tokio::sync::Mutex;

pub use http::HttpEngine;
pub use traits::GenerationEngine;

/// Shared handle to the single generation backend. Cloning is cheap; every
/// call holds the lock for the duration of the engine operation, so at most
/// one generation is in flight no matter how many tasks hold a handle.
#[derive(Clone)]
pub struct EngineClient {
    engine: Arc<Mutex<Box<dyn GenerationEngine>>>,
}

impl EngineClient {
    pub fn new(engine: impl GenerationEngine + 'static) -> Self {
        Self {
            engine: Arc::new(Mutex::new(Box::new(engine))),
        }
    }

    pub async fn generate(&self, request: &Request) -> Result<Generated> {
        let params = &request.params;
        let mut engine = self.engine.lock().await;
        let _timer = logger::timer(&format!("{} generation", request.mode.name()));
        log::info!(
            "Generating ({}) {}x{} steps={} seed={}",
            request.mode.name(),
            params.width,
            params.height,
            params.steps,
            params.seed
        );

        let generated = match &request.mode {
            RequestMode::Text => engine.synthesize_text(params).await,
            RequestMode::Image { init } => engine.synthesize_image(params, init).await,
            RequestMode::Masked { init, mask } => {
                engine.synthesize_masked(params, init, mask).await
            }
        };
        check_resolved(generated)
    }

    /// Reseeds the engine from `carried_seed` and runs a text generation
    /// without releasing the engine in between.
    pub async fn reseed_and_generate(
        &self,
        carried_seed: i64,
        params: &GenerationParams,
    ) -> Result<Generated> {
        let mut engine = self.engine.lock().await;
        let _timer = logger::timer("reseeded text generation");
        log::debug!("Reseeding engine from carried seed {}", carried_seed);
        engine.reseed(carried_seed);
        check_resolved(engine.synthesize_text(params).await)
    }

    pub async fn decode(&self, image: &DynamicImage, height: u32, width: u32) -> Result<DynamicImage> {
        let mut engine = self.engine.lock().await;
        let _timer = logger::timer("decode");
        engine.decode(image, height, width).await
    }
}

fn check_resolved(generated: Result<Generated>) -> Result<Generated> {
    let generated = generated?;
    if generated.seed == RANDOM_SEED {
        return Err(BotError::EngineFailure(
            "engine did not report the seed it used".into(),
        ));
    }
    Ok(generated)
}
