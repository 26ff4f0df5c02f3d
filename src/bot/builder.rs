use crate::{
    config::{
        DEFAULT_DENOISING_STRENGTH, DEFAULT_DIMENSION, DEFAULT_GUIDANCE_SCALE, DEFAULT_STEPS,
        DIMENSION_STEP, DREAM_DENOISING_STRENGTH, FOLLOW_UP_STEPS, MAX_DIMENSION, MAX_STEPS,
        MIN_DIMENSION, RANDOM_SEED,
        REFINE_DENOISING_STRENGTH, STYLIZE_DENOISING_STRENGTH,
    },
    error::{BotError, Result},
    models::{
        DecodeOptions, DreamOptions, GenerationOptions, GenerationParams, InpaintOptions,
        Request, RequestMode, TargetMessage, TranslateOptions,
    },
    source::{ColorFormat, ImageResolver},
};
use image::DynamicImage;

/// Applies defaults and bounds to raw command options.
pub fn build_params(
    query: &str,
    options: &GenerationOptions,
    denoising_strength: f32,
    show_progress: bool,
) -> Result<GenerationParams> {
    let height = dimension("height", options.height)?;
    let width = dimension("width", options.width)?;
    if !denoising_strength.is_finite() {
        return Err(BotError::InvalidRequest("denoising strength must be a number".into()));
    }

    Ok(GenerationParams {
        query: query.to_string(),
        height,
        width,
        guidance_scale: options.guidance_scale.unwrap_or(DEFAULT_GUIDANCE_SCALE),
        steps: options.steps.unwrap_or(DEFAULT_STEPS).clamp(1, MAX_STEPS),
        seed: options.seed.unwrap_or(RANDOM_SEED),
        denoising_strength: denoising_strength.clamp(0.0, 1.0),
        show_progress,
    })
}

fn dimension(name: &str, value: Option<u32>) -> Result<u32> {
    match value {
        None => Ok(DEFAULT_DIMENSION),
        Some(v) if (MIN_DIMENSION..=MAX_DIMENSION).contains(&v) && v % DIMENSION_STEP == 0 => Ok(v),
        Some(v) => Err(BotError::InvalidRequest(format!(
            "{} {} must be a multiple of {} between {} and {}",
            name, v, DIMENSION_STEP, MIN_DIMENSION, MAX_DIMENSION
        ))),
    }
}

/// Nearest accepted dimension at or below `edge`, for sizes taken from images.
fn fit_dimension(edge: u32) -> u32 {
    (edge / DIMENSION_STEP * DIMENSION_STEP).clamp(MIN_DIMENSION, MAX_DIMENSION)
}

/// Turns commands into engine requests, fetching any referenced images.
#[derive(Clone)]
pub struct RequestBuilder {
    resolver: ImageResolver,
}

impl RequestBuilder {
    pub fn new(resolver: ImageResolver) -> Self {
        Self { resolver }
    }

    pub async fn dream(&self, options: &DreamOptions) -> Result<Request> {
        let params = build_params(
            &options.query,
            &options.generation,
            options.strength.unwrap_or(DREAM_DENOISING_STRENGTH),
            options.progress.unwrap_or(false),
        )?;
        let mode = match (&options.image_url, &options.mask_url) {
            (None, None) => RequestMode::Text,
            (Some(image_url), None) => RequestMode::Image {
                init: self.fetch(image_url).await?,
            },
            (Some(image_url), Some(mask_url)) => self.masked(image_url, mask_url).await?,
            (None, Some(_)) => {
                return Err(BotError::InvalidRequest(
                    "a mask needs an init image to paint into".into(),
                ))
            }
        };
        Ok(Request { params, mode })
    }

    pub async fn translate(&self, options: &TranslateOptions) -> Result<Request> {
        let params = build_params(
            &options.query,
            &options.generation,
            options.denoising_strength.unwrap_or(DEFAULT_DENOISING_STRENGTH),
            false,
        )?;
        let init = self.fetch(&options.image_url).await?;
        Ok(Request {
            params,
            mode: RequestMode::Image { init },
        })
    }

    pub async fn inpaint(&self, options: &InpaintOptions) -> Result<Request> {
        let params = build_params(
            &options.query,
            &options.generation,
            options.denoising_strength.unwrap_or(DEFAULT_DENOISING_STRENGTH),
            false,
        )?;
        let mode = self.masked(&options.image_url, &options.mask_url).await?;
        Ok(Request { params, mode })
    }

    /// Reruns img2img on a delivered image with its own prompt and size.
    pub async fn refine(&self, target: &TargetMessage) -> Result<Request> {
        let query = target.footer.as_deref().ok_or_else(|| {
            BotError::InvalidSession("message has no prompt to refine".into())
        })?;
        let init = self.fetch(attachment_url(target)?).await?;
        let options = GenerationOptions {
            height: Some(fit_dimension(init.height())),
            width: Some(fit_dimension(init.width())),
            steps: Some(FOLLOW_UP_STEPS),
            ..GenerationOptions::default()
        };
        let params = build_params(query, &options, REFINE_DENOISING_STRENGTH, false)?;
        Ok(Request {
            params,
            mode: RequestMode::Image { init },
        })
    }

    pub async fn stylize(&self, target: &TargetMessage, prompt: &str) -> Result<Request> {
        let init = self.fetch(attachment_url(target)?).await?;
        let options = GenerationOptions {
            steps: Some(FOLLOW_UP_STEPS),
            ..GenerationOptions::default()
        };
        let params = build_params(prompt, &options, STYLIZE_DENOISING_STRENGTH, false)?;
        Ok(Request {
            params,
            mode: RequestMode::Image { init },
        })
    }

    /// Source image and target size for a decoder probe.
    pub async fn decode(&self, options: &DecodeOptions) -> Result<(DynamicImage, u32, u32)> {
        let height = dimension("height", options.height)?;
        let width = dimension("width", options.width)?;
        let image = self
            .resolver
            .resolve(&options.image_url, ColorFormat::Rgba)
            .await?;
        Ok((image, height, width))
    }

    async fn masked(&self, image_url: &str, mask_url: &str) -> Result<RequestMode> {
        let init = self.fetch(image_url).await?;
        let mask = self.fetch(mask_url).await?;
        Ok(RequestMode::Masked { init, mask })
    }

    async fn fetch(&self, url: &str) -> Result<DynamicImage> {
        self.resolver.resolve(url, ColorFormat::Rgb).await
    }
}

fn attachment_url(target: &TargetMessage) -> Result<&str> {
    target
        .attachment_url
        .as_deref()
        .ok_or_else(|| BotError::InvalidSession("message has no image attached".into()))
}
