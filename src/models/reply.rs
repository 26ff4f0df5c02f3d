use crate::models::FollowUpAction;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embed {
    pub color: (u8, u8, u8),
    pub title: Option<String>,
    pub description: Option<String>,
    pub footer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attachment {
    pub filename: String,
    #[serde(skip)]
    pub data: Vec<u8>,
}

/// One outbound message. Built fresh per send.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplyEnvelope {
    pub embed: Option<Embed>,
    pub attachment: Option<Attachment>,
    /// Buttons shown under the message.
    pub follow_ups: Vec<FollowUpAction>,
}

impl ReplyEnvelope {
    pub fn is_error(&self) -> bool {
        self.attachment.is_none()
            && self
                .embed
                .as_ref()
                .map_or(false, |embed| embed.title.is_some())
    }

    pub fn title(&self) -> Option<&str> {
        self.embed.as_ref().and_then(|e| e.title.as_deref())
    }

    pub fn footer(&self) -> Option<&str> {
        self.embed.as_ref().and_then(|e| e.footer.as_deref())
    }

    pub fn filename(&self) -> Option<&str> {
        self.attachment.as_ref().map(|a| a.filename.as_str())
    }
}
