use serde::{Deserialize, Serialize};
use std::fmt;

/// Platform identifier of a delivered message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        MessageId(id.into())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Buttons attached to a generated image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FollowUpAction {
    Upscale,
    Variation,
    #[serde(rename = "doover")]
    NewGeneration,
}

impl FollowUpAction {
    pub const ALL: [FollowUpAction; 3] = [
        FollowUpAction::Upscale,
        FollowUpAction::Variation,
        FollowUpAction::NewGeneration,
    ];

    pub fn custom_id(&self) -> &'static str {
        match self {
            FollowUpAction::Upscale => "upscale",
            FollowUpAction::Variation => "variation",
            FollowUpAction::NewGeneration => "doover",
        }
    }

    pub fn from_custom_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.custom_id() == id)
    }

    pub fn label(&self) -> &'static str {
        match self {
            FollowUpAction::Upscale => "Upscale",
            FollowUpAction::Variation => "Make Variations",
            FollowUpAction::NewGeneration => "New Generation",
        }
    }

    pub fn failure_title(&self) -> String {
        format!("{} failed", self.label())
    }
}

/// Optional generation knobs common to the slash commands.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub guidance_scale: Option<f32>,
    #[serde(default)]
    pub steps: Option<u32>,
    #[serde(default)]
    pub seed: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DreamOptions {
    pub query: String,
    #[serde(flatten)]
    pub generation: GenerationOptions,
    #[serde(default)]
    pub progress: Option<bool>,
    /// Only used with an attached init image.
    #[serde(default)]
    pub strength: Option<f32>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub mask_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranslateOptions {
    pub query: String,
    pub image_url: String,
    #[serde(flatten)]
    pub generation: GenerationOptions,
    #[serde(default)]
    pub denoising_strength: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InpaintOptions {
    pub query: String,
    pub image_url: String,
    pub mask_url: String,
    #[serde(flatten)]
    pub generation: GenerationOptions,
    #[serde(default)]
    pub denoising_strength: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecodeOptions {
    pub image_url: String,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub width: Option<u32>,
}

/// The message a context-menu action was invoked on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetMessage {
    #[serde(default)]
    pub footer: Option<String>,
    #[serde(default)]
    pub attachment_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum Command {
    Dream(DreamOptions),
    Translate(TranslateOptions),
    Inpaint(InpaintOptions),
    #[serde(rename = "vae")]
    Decode(DecodeOptions),
    Refine(TargetMessage),
    Stylize(TargetMessage),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Dream(_) => "dream",
            Command::Translate(_) => "translate",
            Command::Inpaint(_) => "inpaint",
            Command::Decode(_) => "vae",
            Command::Refine(_) => "refine",
            Command::Stylize(_) => "stylize",
        }
    }

    pub fn failure_title(&self) -> &'static str {
        match self {
            Command::Dream(_) => "txt2img failed",
            Command::Translate(_) => "img2img failed",
            Command::Inpaint(_) => "inpaint failed",
            Command::Decode(_) => "vae failed",
            Command::Refine(_) => "refine failed",
            Command::Stylize(_) => "stylize failed",
        }
    }

    /// Prompt text for request logging, if the command carries one.
    pub fn prompt(&self) -> Option<&str> {
        match self {
            Command::Dream(o) => Some(&o.query),
            Command::Translate(o) => Some(&o.query),
            Command::Inpaint(o) => Some(&o.query),
            Command::Refine(t) => t.footer.as_deref(),
            Command::Decode(_) | Command::Stylize(_) => None,
        }
    }

    /// Every command except `vae` produces an image the buttons can act on.
    pub fn supports_follow_ups(&self) -> bool {
        !matches!(self, Command::Decode(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_ids_round_trip() {
        for action in FollowUpAction::ALL {
            assert_eq!(FollowUpAction::from_custom_id(action.custom_id()), Some(action));
        }
        assert_eq!(FollowUpAction::from_custom_id("delete"), None);
    }

    #[test]
    fn test_command_from_platform_json() {
        let raw = r#"{"command":"dream","query":"a red fox","seed":42,"steps":30}"#;
        let command: Command = serde_json::from_str(raw).unwrap();
        match command {
            Command::Dream(options) => {
                assert_eq!(options.query, "a red fox");
                assert_eq!(options.generation.seed, Some(42));
                assert_eq!(options.generation.steps, Some(30));
                assert_eq!(options.generation.height, None);
            }
            other => panic!("unexpected command {:?}", other),
        }

        let raw = r#"{"command":"vae","image_url":"http://x/a.png"}"#;
        let command: Command = serde_json::from_str(raw).unwrap();
        assert_eq!(command.name(), "vae");
        assert!(!command.supports_follow_ups());
    }
}
