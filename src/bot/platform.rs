use crate::{
    error::Result,
    models::{MessageId, ReplyEnvelope},
};
use async_trait::async_trait;

/// The chat platform's view of one inbound command or button press.
#[async_trait]
pub trait Interaction: Send + Sync {
    /// Display name of the invoking user, for logging.
    fn user(&self) -> &str;

    /// Acknowledges the interaction so the platform does not time it out.
    async fn defer(&self) -> Result<()>;

    /// Answers immediately, without a prior `defer`.
    async fn respond(&self, reply: ReplyEnvelope) -> Result<()>;

    /// Sends the final reply after `defer` and returns the new message id.
    async fn send_followup(&self, reply: ReplyEnvelope) -> Result<MessageId>;
}
