pub mod builder;
pub mod platform;
pub mod render;
pub mod session;

use crate::{
    config::BotConfig,
    engine::EngineClient,
    error::{BotError, Result},
    models::{Command, FollowUpAction, Generated, GenerationParams, MessageId, ReplyEnvelope},
    source::ImageResolver,
};
use std::sync::Arc;
use tokio::sync::Semaphore;

pub use builder::RequestBuilder;
pub use platform::Interaction;
pub use render::{AttachmentName, Renderer};
pub use session::{Session, SessionStore};

/// How one inbound interaction ended. The user has been answered in every case.
#[derive(Debug)]
pub enum Outcome {
    Delivered(MessageId),
    Failed {
        message_id: Option<MessageId>,
        error: BotError,
    },
    Rejected(BotError),
}

impl Outcome {
    pub fn message_id(&self) -> Option<&MessageId> {
        match self {
            Outcome::Delivered(id) => Some(id),
            Outcome::Failed { message_id, .. } => message_id.as_ref(),
            Outcome::Rejected(_) => None,
        }
    }

    pub fn error(&self) -> Option<&BotError> {
        match self {
            Outcome::Delivered(_) => None,
            Outcome::Failed { error, .. } | Outcome::Rejected(error) => Some(error),
        }
    }
}

type Delivery = (ReplyEnvelope, Option<Session>);

/// Entry point for slash commands and button presses.
pub struct Dispatcher {
    engine: EngineClient,
    builder: RequestBuilder,
    renderer: Renderer,
    sessions: SessionStore,
    inpaint_slots: Arc<Semaphore>,
    inpaint_limit: usize,
    stylize_prompt: String,
}

impl Dispatcher {
    pub fn new(config: &BotConfig, engine: EngineClient, resolver: ImageResolver) -> Self {
        Self {
            engine,
            builder: RequestBuilder::new(resolver),
            renderer: Renderer::new(config.embed_color),
            sessions: SessionStore::new(),
            inpaint_slots: Arc::new(Semaphore::new(config.inpaint_limit)),
            inpaint_limit: config.inpaint_limit,
            stylize_prompt: config.stylize_prompt.clone(),
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn inpaint_slots_available(&self) -> usize {
        self.inpaint_slots.available_permits()
    }

    pub async fn dispatch(&self, command: Command, interaction: &dyn Interaction) -> Outcome {
        log::info!(
            "Request -- {} -- {} -- Prompt: {}",
            interaction.user(),
            command.name(),
            command.prompt().unwrap_or("-")
        );

        // Inpainting is rejected outright instead of queueing behind the engine.
        let _permit = match &command {
            Command::Inpaint(_) => match self.inpaint_slots.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => return self.reject(&command, interaction).await,
            },
            _ => None,
        };

        if let Err(e) = interaction.defer().await {
            log::error!("Could not acknowledge {}: {}", command.name(), e);
            return Outcome::Failed {
                message_id: None,
                error: e,
            };
        }

        let result = self.execute(&command).await;
        self.deliver(interaction, result, command.failure_title(), None)
            .await
    }

    pub async fn dispatch_action(
        &self,
        message_id: &MessageId,
        action: FollowUpAction,
        interaction: &dyn Interaction,
    ) -> Outcome {
        if let Err(e) = interaction.defer().await {
            log::error!("Could not acknowledge {:?}: {}", action, e);
            return Outcome::Failed {
                message_id: None,
                error: e,
            };
        }

        let result = match self.sessions.get(message_id) {
            Some(session) => session
                .apply(action, &self.renderer)
                .await
                .map(|(next, reply)| (reply, Some(next))),
            None => Err(BotError::InvalidSession(format!(
                "no generation is attached to message {}",
                message_id
            ))),
        };
        self.deliver(interaction, result, &action.failure_title(), Some(message_id))
            .await
    }

    async fn execute(&self, command: &Command) -> Result<Delivery> {
        let request = match command {
            Command::Dream(options) => self.builder.dream(options).await?,
            Command::Translate(options) => self.builder.translate(options).await?,
            Command::Inpaint(options) => self.builder.inpaint(options).await?,
            Command::Refine(target) => self.builder.refine(target).await?,
            Command::Stylize(target) => self.builder.stylize(target, &self.stylize_prompt).await?,
            Command::Decode(options) => {
                let (image, height, width) = self.builder.decode(options).await?;
                let decoded = self.engine.decode(&image, height, width).await?;
                return Ok((self.renderer.render_decoded(&decoded)?, None));
            }
        };

        let generated = self.engine.generate(&request).await?;
        self.with_session(&request.params, generated, command.supports_follow_ups())
    }

    /// Renders a generation and, when it gets buttons, the session behind them.
    fn with_session(
        &self,
        params: &GenerationParams,
        generated: Generated,
        follow_ups: bool,
    ) -> Result<Delivery> {
        let reply = self.renderer.render(
            &generated.image,
            &params.query,
            AttachmentName::Seed(generated.seed),
            follow_ups,
        )?;
        let session = follow_ups.then(|| Session::new(params, generated, self.engine.clone()));
        Ok((reply, session))
    }

    async fn deliver(
        &self,
        interaction: &dyn Interaction,
        result: Result<Delivery>,
        failure_title: &str,
        replacing: Option<&MessageId>,
    ) -> Outcome {
        let (reply, session) = match result {
            Ok(delivery) => delivery,
            Err(error) => {
                log::error!("{}: {}", failure_title, error);
                let reply = self.renderer.render_error(failure_title, &error);
                let message_id = match interaction.send_followup(reply).await {
                    Ok(id) => Some(id),
                    Err(e) => {
                        log::error!("Could not report failure to {}: {}", interaction.user(), e);
                        None
                    }
                };
                return Outcome::Failed { message_id, error };
            }
        };

        match interaction.send_followup(reply).await {
            Ok(id) => {
                if let Some(session) = session {
                    match replacing {
                        Some(old) => self.sessions.replace(old, id.clone(), session),
                        None => self.sessions.attach(id.clone(), session),
                    }
                }
                Outcome::Delivered(id)
            }
            Err(error) => {
                log::error!("Could not deliver reply to {}: {}", interaction.user(), error);
                Outcome::Failed {
                    message_id: None,
                    error,
                }
            }
        }
    }

    async fn reject(&self, command: &Command, interaction: &dyn Interaction) -> Outcome {
        let error = BotError::ConcurrencyRejected {
            limit: self.inpaint_limit,
        };
        log::warn!("Rejecting {} from {}: {}", command.name(), interaction.user(), error);
        let reply = self.renderer.render_error(command.failure_title(), &error);
        if let Err(e) = interaction.respond(reply).await {
            log::error!("Could not send rejection: {}", e);
        }
        Outcome::Rejected(error)
    }
}
