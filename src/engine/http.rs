use crate::{
    config::{EngineConfig, RANDOM_SEED},
    engine::traits::GenerationEngine,
    error::{BotError, Result},
    imaging,
    models::{GenerationParams, Generated},
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::DynamicImage;
use rand::{rngs::StdRng, Rng, SeedableRng};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

#[derive(Serialize)]
struct SynthesisPayload<'a> {
    prompt: &'a str,
    steps: u32,
    cfg_scale: f32,
    seed: i64,
    height: u32,
    width: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    sampler_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    denoising_strength: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    init_images: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mask: Option<String>,
}

#[derive(Deserialize)]
struct SynthesisResponse {
    images: Vec<String>,
    #[serde(default)]
    info: Option<String>,
}

#[derive(Deserialize)]
struct ProgressResponse {
    progress: f32,
    #[serde(default)]
    eta_relative: f32,
}

/// Talks to an Automatic1111-compatible `/sdapi/v1` server.
pub struct HttpEngine {
    client: Client,
    config: EngineConfig,
    rng: StdRng,
}

impl HttpEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            client: Client::new(),
            config,
            rng: StdRng::from_entropy(),
        }
    }

    /// Seeds are always chosen here so the reply can name the file after it.
    fn resolve_seed(&mut self, seed: i64) -> i64 {
        if seed == RANDOM_SEED {
            self.rng.gen_range(0..=u32::MAX as i64)
        } else {
            seed
        }
    }

    fn payload<'a>(&'a self, params: &'a GenerationParams, seed: i64) -> SynthesisPayload<'a> {
        SynthesisPayload {
            prompt: &params.query,
            steps: params.steps,
            cfg_scale: params.guidance_scale,
            seed,
            height: params.height,
            width: params.width,
            sampler_name: self.config.sampler.as_deref(),
            denoising_strength: None,
            init_images: Vec::new(),
            mask: None,
        }
    }

    async fn post(&self, path: &str, payload: &SynthesisPayload<'_>) -> Result<SynthesisResponse> {
        let url = format!("{}/sdapi/v1/{}", self.config.base_url, path);
        log::debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| BotError::EngineFailure(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BotError::EngineFailure(format!("{} returned {}: {}", path, status, body)));
        }

        response
            .json::<SynthesisResponse>()
            .await
            .map_err(|e| BotError::EngineFailure(format!("malformed {} response: {}", path, e)))
    }

    async fn post_with_progress(
        &self,
        path: &str,
        payload: &SynthesisPayload<'_>,
        show_progress: bool,
    ) -> Result<SynthesisResponse> {
        let request = self.post(path, payload);
        if !show_progress {
            return request.await;
        }

        tokio::pin!(request);
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                result = &mut request => return result,
                _ = ticker.tick() => self.log_progress().await,
            }
        }
    }

    async fn log_progress(&self) {
        let url = format!("{}/sdapi/v1/progress", self.config.base_url);
        let progress = match self.client.get(&url).send().await {
            Ok(response) => response.json::<ProgressResponse>().await,
            Err(e) => {
                log::debug!("Progress poll failed: {}", e);
                return;
            }
        };
        if let Ok(progress) = progress {
            log::info!(
                "Generation {:.0}% (eta {:.1}s)",
                progress.progress * 100.0,
                progress.eta_relative
            );
        }
    }

    async fn run(
        &self,
        path: &str,
        payload: SynthesisPayload<'_>,
        show_progress: bool,
    ) -> Result<Generated> {
        let requested_seed = payload.seed;
        let response = self.post_with_progress(path, &payload, show_progress).await?;
        let image = first_image(&response)?;
        let seed = response
            .info
            .as_deref()
            .and_then(|info| serde_json::from_str::<Value>(info).ok())
            .and_then(|info| info["seed"].as_i64())
            .unwrap_or(requested_seed);

        Ok(Generated { image, seed })
    }
}

fn first_image(response: &SynthesisResponse) -> Result<DynamicImage> {
    let encoded = response
        .images
        .first()
        .ok_or_else(|| BotError::EngineFailure("No images generated".into()))?;
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| BotError::EngineFailure(format!("bad image encoding: {}", e)))?;
    image::load_from_memory(&bytes).map_err(|e| BotError::EngineFailure(e.to_string()))
}

fn encode_image(image: &DynamicImage) -> Result<String> {
    Ok(BASE64.encode(imaging::encode_png(image)?))
}

#[async_trait]
impl GenerationEngine for HttpEngine {
    async fn synthesize_text(&mut self, params: &GenerationParams) -> Result<Generated> {
        let seed = self.resolve_seed(params.seed);
        let payload = self.payload(params, seed);
        self.run("txt2img", payload, params.show_progress).await
    }

    async fn synthesize_image(
        &mut self,
        params: &GenerationParams,
        init: &DynamicImage,
    ) -> Result<Generated> {
        let seed = self.resolve_seed(params.seed);
        let mut payload = self.payload(params, seed);
        payload.denoising_strength = Some(params.denoising_strength);
        payload.init_images = vec![encode_image(init)?];
        self.run("img2img", payload, params.show_progress).await
    }

    async fn synthesize_masked(
        &mut self,
        params: &GenerationParams,
        init: &DynamicImage,
        mask: &DynamicImage,
    ) -> Result<Generated> {
        let seed = self.resolve_seed(params.seed);
        let mut payload = self.payload(params, seed);
        payload.denoising_strength = Some(params.denoising_strength);
        payload.init_images = vec![encode_image(init)?];
        payload.mask = Some(encode_image(mask)?);
        self.run("img2img", payload, params.show_progress).await
    }

    async fn decode(
        &mut self,
        image: &DynamicImage,
        height: u32,
        width: u32,
    ) -> Result<DynamicImage> {
        // A zero-strength img2img pass only encodes and decodes the latents.
        let params = GenerationParams {
            query: String::new(),
            height,
            width,
            guidance_scale: 0.0,
            steps: 1,
            seed: 0,
            denoising_strength: 0.0,
            show_progress: false,
        };
        let mut payload = self.payload(&params, 0);
        payload.denoising_strength = Some(0.0);
        payload.init_images = vec![encode_image(image)?];
        Ok(self.run("img2img", payload, false).await?.image)
    }

    fn reseed(&mut self, seed: i64) {
        self.rng = StdRng::seed_from_u64(seed as u64);
    }
}
