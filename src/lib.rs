//! Chat front-end for a Stable Diffusion engine.
//!
//! A [`Dispatcher`] receives slash commands and button presses from the chat
//! platform through the [`Interaction`] trait, runs them against a shared
//! [`EngineClient`] and answers with a [`ReplyEnvelope`]. Generated images
//! carry a [`Session`] so their buttons (upscale, variation, new generation)
//! can regenerate from the original request.

pub mod bot;
pub mod config;
pub mod engine;
pub mod error;
pub mod imaging;
pub mod logger;
pub mod models;
pub mod source;

#[cfg(test)]
mod testing;

pub use bot::{Dispatcher, Interaction, Outcome, Renderer, Session, SessionStore};
pub use config::{BotConfig, EngineConfig};
pub use engine::{EngineClient, GenerationEngine, HttpEngine};
pub use error::{BotError, Result};
pub use models::*;
pub use source::{HttpImageSource, ImageResolver, ImageSource};
