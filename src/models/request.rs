use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// Knobs shared by every engine operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub query: String,
    pub height: u32,
    pub width: u32,
    pub guidance_scale: f32,
    pub steps: u32,
    /// `-1` lets the engine pick.
    pub seed: i64,
    pub denoising_strength: f32,
    pub show_progress: bool,
}

/// Which engine operation a request maps to.
#[derive(Debug, Clone)]
pub enum RequestMode {
    Text,
    Image { init: DynamicImage },
    Masked { init: DynamicImage, mask: DynamicImage },
}

impl RequestMode {
    pub fn name(&self) -> &'static str {
        match self {
            RequestMode::Text => "text",
            RequestMode::Image { .. } => "image",
            RequestMode::Masked { .. } => "masked",
        }
    }
}

/// A validated request. Built once and consumed by a single engine call.
#[derive(Debug, Clone)]
pub struct Request {
    pub params: GenerationParams,
    pub mode: RequestMode,
}

/// Output of one engine call; `seed` is always the resolved value.
#[derive(Debug, Clone)]
pub struct Generated {
    pub image: DynamicImage,
    pub seed: i64,
}
