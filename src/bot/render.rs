use crate::{
    error::{BotError, Result},
    imaging,
    models::{Attachment, Embed, FollowUpAction, ReplyEnvelope},
};
use image::DynamicImage;

/// How the attachment of a reply is named.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentName {
    Seed(i64),
    Upscaled(i64),
    Decoded,
}

impl AttachmentName {
    pub fn filename(&self) -> String {
        match self {
            AttachmentName::Seed(seed) => format!("{}.png", seed),
            AttachmentName::Upscaled(seed) => format!("{}-2048.png", seed),
            AttachmentName::Decoded => "decoded.png".to_string(),
        }
    }
}

/// Turns images and errors into reply envelopes. Never sends anything.
#[derive(Debug, Clone)]
pub struct Renderer {
    color: (u8, u8, u8),
}

impl Renderer {
    pub fn new(color: (u8, u8, u8)) -> Self {
        Self { color }
    }

    pub fn render(
        &self,
        image: &DynamicImage,
        query: &str,
        name: AttachmentName,
        with_follow_ups: bool,
    ) -> Result<ReplyEnvelope> {
        let data = imaging::encode_png(image)?;
        Ok(ReplyEnvelope {
            embed: Some(Embed {
                color: self.color,
                title: None,
                description: None,
                footer: Some(query.to_string()),
            }),
            attachment: Some(Attachment {
                filename: name.filename(),
                data,
            }),
            follow_ups: if with_follow_ups {
                FollowUpAction::ALL.to_vec()
            } else {
                Vec::new()
            },
        })
    }

    /// Decoder probes go out as a bare attachment.
    pub fn render_decoded(&self, image: &DynamicImage) -> Result<ReplyEnvelope> {
        Ok(ReplyEnvelope {
            embed: None,
            attachment: Some(Attachment {
                filename: AttachmentName::Decoded.filename(),
                data: imaging::encode_png(image)?,
            }),
            follow_ups: Vec::new(),
        })
    }

    pub fn render_error(&self, title: &str, error: &BotError) -> ReplyEnvelope {
        ReplyEnvelope {
            embed: Some(Embed {
                color: self.color,
                title: Some(title.to_string()),
                description: Some(error.to_string()),
                footer: None,
            }),
            attachment: None,
            follow_ups: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EMBED_COLOR;
    use image::RgbImage;

    #[test]
    fn test_attachment_names() {
        assert_eq!(AttachmentName::Seed(42).filename(), "42.png");
        assert_eq!(AttachmentName::Upscaled(42).filename(), "42-2048.png");
        assert_eq!(AttachmentName::Seed(-7).filename(), "-7.png");
    }

    #[test]
    fn test_render_result() {
        let renderer = Renderer::new(EMBED_COLOR);
        let image = DynamicImage::ImageRgb8(RgbImage::new(8, 8));
        let reply = renderer
            .render(&image, "a red fox", AttachmentName::Seed(42), true)
            .unwrap();

        assert_eq!(reply.footer(), Some("a red fox"));
        assert_eq!(reply.filename(), Some("42.png"));
        assert_eq!(reply.follow_ups, FollowUpAction::ALL.to_vec());
        assert!(!reply.is_error());
        let embed = reply.embed.unwrap();
        assert_eq!(embed.color, (215, 195, 134));
        assert!(embed.title.is_none());
    }

    #[test]
    fn test_render_error() {
        let renderer = Renderer::new(EMBED_COLOR);
        let reply = renderer.render_error(
            "txt2img failed",
            &BotError::EngineFailure("CUDA out of memory".into()),
        );
        assert!(reply.is_error());
        assert_eq!(reply.title(), Some("txt2img failed"));
        let description = reply.embed.unwrap().description.unwrap();
        assert!(description.contains("CUDA out of memory"));
    }
}
