use crate::error::{BotError, Result};
use crate::logger::LogLevel;
use std::env;
use std::path::PathBuf;

/// Accent color of every embed the bot sends.
pub const EMBED_COLOR: (u8, u8, u8) = (215, 195, 134);
/// Steps above this are clamped before reaching the engine.
pub const MAX_STEPS: u32 = 100;
pub const DEFAULT_STEPS: u32 = 50;
pub const DEFAULT_DIMENSION: u32 = 512;
/// Width and height must be multiples of `DIMENSION_STEP` in this range.
pub const MIN_DIMENSION: u32 = 192;
pub const MAX_DIMENSION: u32 = 768;
pub const DIMENSION_STEP: u32 = 64;
pub const DEFAULT_GUIDANCE_SCALE: f32 = 7.0;
pub const DEFAULT_DENOISING_STRENGTH: f32 = 0.7;
/// `dream` with attached images historically used a stronger default.
pub const DREAM_DENOISING_STRENGTH: f32 = 0.8;
pub const RANDOM_SEED: i64 = -1;
pub const UPSCALE_EDGE: u32 = 2048;
pub const INPAINT_CONCURRENCY_LIMIT: usize = 5;

pub const FOLLOW_UP_STEPS: u32 = 40;
pub const VARIATION_DENOISING_STRENGTH: f32 = 0.4;
pub const REFINE_DENOISING_STRENGTH: f32 = 0.4;
pub const STYLIZE_DENOISING_STRENGTH: f32 = 0.75;
pub const STYLIZE_PROMPT: &str =
    "a beautiful painting in the style of studio ghibli, highly detailed, vibrant colors";

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub base_url: String,
    pub sampler: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            base_url: "http://127.0.0.1:7860".to_string(),
            sampler: None,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = env::var("STABLECOG_ENGINE_URL") {
            config = config.with_base_url(url);
        }
        if let Ok(sampler) = env::var("STABLECOG_SAMPLER") {
            config = config.with_sampler(sampler);
        }
        config
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_sampler(mut self, sampler: impl Into<String>) -> Self {
        self.sampler = Some(sampler.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub engine: EngineConfig,
    pub embed_color: (u8, u8, u8),
    pub inpaint_limit: usize,
    pub stylize_prompt: String,
    pub log_level: LogLevel,
    /// JSON log lines instead of colored console output.
    pub log_json: bool,
    pub output_dir: PathBuf,
}

impl Default for BotConfig {
    fn default() -> Self {
        BotConfig {
            engine: EngineConfig::default(),
            embed_color: EMBED_COLOR,
            inpaint_limit: INPAINT_CONCURRENCY_LIMIT,
            stylize_prompt: STYLIZE_PROMPT.to_string(),
            log_level: LogLevel::Info,
            log_json: false,
            output_dir: PathBuf::from("out"),
        }
    }
}

impl BotConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `STABLECOG_*` variables. Unset ones keep their defaults, malformed
    /// ones are a `ConfigError`.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let inpaint_limit = parse_var(
            "STABLECOG_INPAINT_LIMIT",
            env::var("STABLECOG_INPAINT_LIMIT").ok(),
            |s| s.parse::<usize>().ok().filter(|limit| *limit > 0),
        )?;
        let log_level = parse_var(
            "STABLECOG_LOG_LEVEL",
            env::var("STABLECOG_LOG_LEVEL").ok(),
            LogLevel::parse,
        )?;
        let log_json = parse_var(
            "STABLECOG_LOG_FORMAT",
            env::var("STABLECOG_LOG_FORMAT").ok(),
            |s| match s.trim().to_ascii_lowercase().as_str() {
                "json" => Some(true),
                "console" | "text" => Some(false),
                _ => None,
            },
        )?;

        Ok(BotConfig {
            engine: EngineConfig::from_env(),
            embed_color: defaults.embed_color,
            inpaint_limit: inpaint_limit.unwrap_or(defaults.inpaint_limit),
            stylize_prompt: env::var("STABLECOG_STYLIZE_PROMPT")
                .unwrap_or(defaults.stylize_prompt),
            log_level: log_level.unwrap_or(defaults.log_level),
            log_json: log_json.unwrap_or(defaults.log_json),
            output_dir: env::var("STABLECOG_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
        })
    }

    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_inpaint_limit(mut self, limit: usize) -> Self {
        self.inpaint_limit = limit.max(1);
        self
    }

    pub fn with_stylize_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.stylize_prompt = prompt.into();
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }
}

fn parse_var<T>(
    name: &str,
    raw: Option<String>,
    parse: impl FnOnce(&str) -> Option<T>,
) -> Result<Option<T>> {
    match raw {
        None => Ok(None),
        Some(raw) => parse(&raw)
            .map(Some)
            .ok_or_else(|| BotError::ConfigError(format!("{} has invalid value {:?}", name, raw))),
    }
}
