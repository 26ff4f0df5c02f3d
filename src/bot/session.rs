use crate::{
    bot::render::{AttachmentName, Renderer},
    config::{DEFAULT_GUIDANCE_SCALE, FOLLOW_UP_STEPS, RANDOM_SEED, VARIATION_DENOISING_STRENGTH},
    engine::EngineClient,
    error::{BotError, Result},
    imaging,
    models::{FollowUpAction, GenerationParams, Generated, MessageId, ReplyEnvelope, Request, RequestMode},
};
use image::DynamicImage;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// State behind the buttons of one delivered image.
#[derive(Clone)]
pub struct Session {
    pub query: String,
    pub height: u32,
    pub width: u32,
    pub guidance_scale: f32,
    pub steps: u32,
    pub seed: i64,
    pub image: DynamicImage,
    engine: EngineClient,
}

impl Session {
    pub fn new(params: &GenerationParams, generated: Generated, engine: EngineClient) -> Self {
        Self {
            query: params.query.clone(),
            height: params.height,
            width: params.width,
            guidance_scale: params.guidance_scale,
            steps: params.steps,
            seed: generated.seed,
            image: generated.image,
            engine,
        }
    }

    /// Runs a follow-up and returns the session that replaces this one,
    /// together with the reply to deliver. `self` is left untouched.
    pub async fn apply(
        &self,
        action: FollowUpAction,
        renderer: &Renderer,
    ) -> Result<(Session, ReplyEnvelope)> {
        log::info!("Follow-up {:?} on seed {} -- Prompt: {}", action, self.seed, self.query);
        match action {
            FollowUpAction::Upscale => self.upscale(renderer).await,
            FollowUpAction::Variation => {
                let request = Request {
                    params: self.params(
                        FOLLOW_UP_STEPS,
                        DEFAULT_GUIDANCE_SCALE,
                        VARIATION_DENOISING_STRENGTH,
                    ),
                    mode: RequestMode::Image {
                        init: self.image.clone(),
                    },
                };
                let generated = self.engine.generate(&request).await?;
                self.succeed(generated, AttachmentName::Seed, renderer)
            }
            FollowUpAction::NewGeneration => {
                let params = self.params(self.steps, self.guidance_scale, 0.0);
                let generated = self.engine.reseed_and_generate(self.seed, &params).await?;
                self.succeed(generated, AttachmentName::Seed, renderer)
            }
        }
    }

    async fn upscale(&self, renderer: &Renderer) -> Result<(Session, ReplyEnvelope)> {
        let source = self.image.clone();
        let image = tokio::task::spawn_blocking(move || imaging::upscale(&source))
            .await
            .map_err(|e| BotError::RenderFailure(format!("upscale task failed: {}", e)))?;
        let generated = Generated {
            image,
            seed: self.seed,
        };
        self.succeed(generated, AttachmentName::Upscaled, renderer)
    }

    fn succeed(
        &self,
        generated: Generated,
        name: fn(i64) -> AttachmentName,
        renderer: &Renderer,
    ) -> Result<(Session, ReplyEnvelope)> {
        let reply = renderer.render(&generated.image, &self.query, name(generated.seed), true)?;
        let next = Session {
            query: self.query.clone(),
            height: self.height,
            width: self.width,
            guidance_scale: self.guidance_scale,
            steps: self.steps,
            seed: generated.seed,
            image: generated.image,
            engine: self.engine.clone(),
        };
        Ok((next, reply))
    }

    /// Follow-ups always ask the engine for a fresh seed.
    fn params(&self, steps: u32, guidance_scale: f32, denoising_strength: f32) -> GenerationParams {
        GenerationParams {
            query: self.query.clone(),
            height: self.height,
            width: self.width,
            guidance_scale,
            steps,
            seed: RANDOM_SEED,
            denoising_strength,
            show_progress: false,
        }
    }
}

/// Sessions keyed by the message their buttons hang off. In memory only.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<MessageId, Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &MessageId) -> Option<Session> {
        self.sessions.lock().ok()?.get(id).cloned()
    }

    pub fn attach(&self, id: MessageId, session: Session) {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.insert(id, session);
        }
    }

    /// Drops the session behind `old` and attaches `session` to `new`.
    pub fn replace(&self, old: &MessageId, new: MessageId, session: Session) {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.remove(old);
            sessions.insert(new, session);
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EMBED_COLOR;
    use crate::testing::{solid_image, text_request, FakeEngine};

    fn session(fake: &FakeEngine, seed: i64) -> Session {
        let params = text_request("a red fox", seed).params;
        let generated = Generated {
            image: solid_image(64, 48, 3),
            seed,
        };
        Session::new(&params, generated, EngineClient::new(fake.clone()))
    }

    #[tokio::test]
    async fn test_upscale_is_local() {
        let fake = FakeEngine::new();
        let renderer = Renderer::new(EMBED_COLOR);
        let (next, reply) = session(&fake, 42)
            .apply(FollowUpAction::Upscale, &renderer)
            .await
            .unwrap();

        assert_eq!((next.image.width(), next.image.height()), (2048, 2048));
        assert_eq!(next.seed, 42);
        assert_eq!(reply.filename(), Some("42-2048.png"));
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_variation_requests_fresh_seed() {
        let fake = FakeEngine::new();
        let renderer = Renderer::new(EMBED_COLOR);
        let old = session(&fake, 42);
        let (next, reply) = old.apply(FollowUpAction::Variation, &renderer).await.unwrap();

        assert_eq!(fake.calls(), vec!["image".to_string()]);
        let init = fake.last_init().unwrap();
        assert_eq!((init.width(), init.height()), (64, 48));
        assert_eq!(init.as_bytes(), old.image.as_bytes());
        let params = fake.last_params().unwrap();
        assert_eq!(params.seed, -1);
        assert_eq!(params.steps, 40);
        assert_eq!(params.denoising_strength, 0.4);
        assert_eq!((params.width, params.height), (512, 512));

        assert_ne!(next.seed, 42);
        assert_ne!(next.seed, -1);
        assert_eq!(reply.filename(), Some(format!("{}.png", next.seed).as_str()));
        assert_eq!(next.steps, old.steps);
        assert_eq!(old.seed, 42);
    }

    #[tokio::test]
    async fn test_new_generation_reseeds_then_asks_for_fresh_seed() {
        let fake = FakeEngine::new();
        let renderer = Renderer::new(EMBED_COLOR);
        let (next, _) = session(&fake, 42)
            .apply(FollowUpAction::NewGeneration, &renderer)
            .await
            .unwrap();

        assert_eq!(fake.calls(), vec!["reseed:42".to_string(), "text".to_string()]);
        assert_eq!(fake.last_params().unwrap().seed, -1);
        assert_ne!(next.seed, 42);
    }

    #[tokio::test]
    async fn test_engine_failure_leaves_session_alone() {
        let fake = FakeEngine::new().failing("model not loaded");
        let renderer = Renderer::new(EMBED_COLOR);
        let old = session(&fake, 42);
        let err = old
            .apply(FollowUpAction::Variation, &renderer)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, BotError::EngineFailure(_)));
        assert_eq!(old.seed, 42);
    }

    #[tokio::test]
    async fn test_store_replaces_sessions() {
        let fake = FakeEngine::new();
        let store = SessionStore::new();
        let first = MessageId::new("m1");
        store.attach(first.clone(), session(&fake, 1));
        store.replace(&first, MessageId::new("m2"), session(&fake, 2));

        assert!(store.get(&first).is_none());
        assert_eq!(store.get(&MessageId::new("m2")).unwrap().seed, 2);
        assert_eq!(store.len(), 1);
    }
}
