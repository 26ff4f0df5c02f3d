//! Fakes shared by the unit tests.

use crate::{
    bot::Interaction,
    engine::GenerationEngine,
    error::{BotError, Result},
    imaging,
    models::{GenerationParams, Generated, MessageId, ReplyEnvelope, Request, RequestMode},
    source::ImageSource,
};
use async_trait::async_trait;
use image::{DynamicImage, Rgb, RgbImage};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

pub fn text_request(query: &str, seed: i64) -> Request {
    Request {
        params: GenerationParams {
            query: query.to_string(),
            height: 512,
            width: 512,
            guidance_scale: 7.0,
            steps: 50,
            seed,
            denoising_strength: 0.7,
            show_progress: false,
        },
        mode: RequestMode::Text,
    }
}

pub fn solid_image(width: u32, height: u32, shade: u8) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([shade, shade, shade])))
}

pub fn png_bytes(image: &DynamicImage) -> Vec<u8> {
    imaging::encode_png(image).unwrap()
}

/// Image whose pixels depend only on the query, seed and size.
pub fn seeded_image(query: &str, seed: i64, width: u32, height: u32) -> DynamicImage {
    let salt = query.bytes().fold(seed as u8, |acc, b| acc.wrapping_mul(31).wrapping_add(b));
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([salt ^ x as u8, salt.wrapping_add(y as u8), salt])
    }))
}

#[derive(Default)]
struct EngineState {
    calls: Vec<String>,
    last_params: Option<GenerationParams>,
    last_init: Option<DynamicImage>,
    next_seed: i64,
    active: usize,
    max_active: usize,
}

/// Deterministic engine. Seeds `-1` resolve from a counter that `reseed`
/// moves to just past the given seed.
#[derive(Clone)]
pub struct FakeEngine {
    state: Arc<Mutex<EngineState>>,
    delay: Option<Duration>,
    gate: Option<Arc<Semaphore>>,
    failure: Option<String>,
    echo_unresolved: bool,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(EngineState {
                next_seed: 1000,
                ..EngineState::default()
            })),
            delay: None,
            gate: None,
            failure: None,
            echo_unresolved: false,
        }
    }

    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.delay = Some(Duration::from_millis(ms));
        self
    }

    /// Every call waits for a permit on `gate`.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    pub fn echoing_unresolved_seed(mut self) -> Self {
        self.echo_unresolved = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn last_params(&self) -> Option<GenerationParams> {
        self.state.lock().unwrap().last_params.clone()
    }

    /// Init image of the latest img2img or inpaint call.
    pub fn last_init(&self) -> Option<DynamicImage> {
        self.state.lock().unwrap().last_init.clone()
    }

    fn record_init(&self, init: &DynamicImage) {
        self.state.lock().unwrap().last_init = Some(init.clone());
    }

    pub fn max_concurrency(&self) -> usize {
        self.state.lock().unwrap().max_active
    }

    async fn run(&self, kind: &str, params: &GenerationParams) -> Result<Generated> {
        let seed = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(kind.to_string());
            state.last_params = Some(params.clone());
            state.active += 1;
            state.max_active = state.max_active.max(state.active);
            if params.seed == -1 && !self.echo_unresolved {
                state.next_seed += 1;
                state.next_seed
            } else {
                params.seed
            }
        };

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.state.lock().unwrap().active -= 1;

        if let Some(message) = &self.failure {
            return Err(BotError::EngineFailure(message.clone()));
        }
        Ok(Generated {
            image: seeded_image(&params.query, seed, params.width, params.height),
            seed,
        })
    }
}

#[async_trait]
impl GenerationEngine for FakeEngine {
    async fn synthesize_text(&mut self, params: &GenerationParams) -> Result<Generated> {
        self.run("text", params).await
    }

    async fn synthesize_image(
        &mut self,
        params: &GenerationParams,
        init: &DynamicImage,
    ) -> Result<Generated> {
        self.record_init(init);
        self.run("image", params).await
    }

    async fn synthesize_masked(
        &mut self,
        params: &GenerationParams,
        init: &DynamicImage,
        _mask: &DynamicImage,
    ) -> Result<Generated> {
        self.record_init(init);
        self.run("masked", params).await
    }

    async fn decode(
        &mut self,
        image: &DynamicImage,
        height: u32,
        width: u32,
    ) -> Result<DynamicImage> {
        self.state.lock().unwrap().calls.push("decode".to_string());
        if let Some(message) = &self.failure {
            return Err(BotError::EngineFailure(message.clone()));
        }
        Ok(image.resize_exact(width, height, image::imageops::FilterType::Nearest))
    }

    fn reseed(&mut self, seed: i64) {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("reseed:{}", seed));
        state.next_seed = seed;
    }
}

/// Serves canned bytes; unknown URLs fail like an HTTP 404.
#[derive(Clone, Default)]
pub struct FakeSource {
    images: Arc<HashMap<String, Vec<u8>>>,
    fetched: Arc<Mutex<Vec<String>>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bytes(mut self, url: &str, bytes: Vec<u8>) -> Self {
        Arc::make_mut(&mut self.images).insert(url.to_string(), bytes);
        self
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageSource for FakeSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.fetched.lock().unwrap().push(url.to_string());
        self.images
            .get(url)
            .cloned()
            .ok_or_else(|| BotError::SourceFetchFailed(format!("404 Not Found for url ({})", url)))
    }
}

#[derive(Default)]
struct InteractionLog {
    deferred: usize,
    responses: Vec<ReplyEnvelope>,
    followups: Vec<ReplyEnvelope>,
}

/// Records everything the bot sends. Message ids are `<prefix>-<n>`.
#[derive(Clone)]
pub struct RecordingInteraction {
    prefix: String,
    log: Arc<Mutex<InteractionLog>>,
}

impl RecordingInteraction {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            log: Arc::new(Mutex::new(InteractionLog::default())),
        }
    }

    pub fn deferred(&self) -> usize {
        self.log.lock().unwrap().deferred
    }

    pub fn responses(&self) -> Vec<ReplyEnvelope> {
        self.log.lock().unwrap().responses.clone()
    }

    pub fn followups(&self) -> Vec<ReplyEnvelope> {
        self.log.lock().unwrap().followups.clone()
    }

    pub fn last_followup(&self) -> ReplyEnvelope {
        self.followups().pop().expect("no followup sent")
    }
}

#[async_trait]
impl Interaction for RecordingInteraction {
    fn user(&self) -> &str {
        "tester#0001"
    }

    async fn defer(&self) -> Result<()> {
        self.log.lock().unwrap().deferred += 1;
        Ok(())
    }

    async fn respond(&self, reply: ReplyEnvelope) -> Result<()> {
        self.log.lock().unwrap().responses.push(reply);
        Ok(())
    }

    async fn send_followup(&self, reply: ReplyEnvelope) -> Result<MessageId> {
        let mut log = self.log.lock().unwrap();
        log.followups.push(reply);
        Ok(MessageId(format!("{}-{}", self.prefix, log.followups.len())))
    }
}
