use async_trait::async_trait;
use serde_json::{Map, Value};
use stablecog::logger::{self, LoggerConfig};
use stablecog::{
    BotConfig, BotError, Command, Dispatcher, EngineClient, FollowUpAction, HttpEngine,
    HttpImageSource, ImageResolver, Interaction, MessageId, ReplyEnvelope,
};
use std::path::PathBuf;
use std::io::IsTerminal;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinSet;

const HELP: &str = "\
commands:
  dream <prompt> [seed:N steps:N width:N height:N scale:F progress:true image:URL mask:URL strength:F]
  translate image:URL <prompt> [strength:F ...]
  inpaint image:URL mask:URL <prompt> [strength:F ...]
  vae image:URL [width:N height:N]
  refine image:URL <prompt>
  stylize image:URL
  upscale|variation|doover <message-id>";

/// Prints replies and saves attachments into the output directory.
struct ConsoleInteraction {
    user: String,
    output_dir: PathBuf,
}

#[async_trait]
impl Interaction for ConsoleInteraction {
    fn user(&self) -> &str {
        &self.user
    }

    async fn defer(&self) -> stablecog::Result<()> {
        println!("stablecog is thinking...");
        Ok(())
    }

    async fn respond(&self, reply: ReplyEnvelope) -> stablecog::Result<()> {
        print_reply(None, &reply);
        Ok(())
    }

    async fn send_followup(&self, reply: ReplyEnvelope) -> stablecog::Result<MessageId> {
        let id = MessageId::new(uuid::Uuid::new_v4().simple().to_string()[..8].to_string());
        if let Some(attachment) = &reply.attachment {
            let path = self.output_dir.join(&attachment.filename);
            tokio::fs::write(&path, &attachment.data)
                .await
                .map_err(|e| BotError::PlatformError(format!("{}: {}", path.display(), e)))?;
        }
        print_reply(Some(&id), &reply);
        Ok(id)
    }
}

fn print_reply(id: Option<&MessageId>, reply: &ReplyEnvelope) {
    let id = id.map(|id| format!("[{}] ", id)).unwrap_or_default();
    if let Some(embed) = &reply.embed {
        if let Some(title) = &embed.title {
            println!("{}{}: {}", id, title, embed.description.as_deref().unwrap_or(""));
        }
        if let Some(footer) = &embed.footer {
            println!("{}prompt: {}", id, footer);
        }
    }
    if let Some(name) = reply.filename() {
        println!("{}saved {}", id, name);
    }
    if !reply.follow_ups.is_empty() {
        let buttons: Vec<_> = reply.follow_ups.iter().map(|a| a.custom_id()).collect();
        println!("{}buttons: {}", id, buttons.join(" | "));
    }
}

enum Input {
    Command(Command),
    Action(MessageId, FollowUpAction),
}

/// Turns `name key:value words...` into the platform JSON a slash command
/// would arrive as.
fn parse_line(line: &str) -> Result<Input, String> {
    let mut words = line.split_whitespace();
    let name = words.next().ok_or("empty line")?;

    if let Some(action) = FollowUpAction::from_custom_id(name) {
        let id = words.next().ok_or("missing message id")?;
        return Ok(Input::Action(MessageId::new(id), action));
    }

    let message_action = matches!(name, "refine" | "stylize");
    let mut fields = Map::new();
    let mut prompt = Vec::new();
    for word in words {
        let option = word.split_once(':').and_then(|(key, value)| {
            let key = match (key, message_action) {
                ("image", true) => "attachment_url",
                ("image", false) => "image_url",
                ("mask", _) => "mask_url",
                ("scale", _) => "guidance_scale",
                ("strength", _) if name != "dream" => "denoising_strength",
                ("strength" | "seed" | "steps" | "width" | "height" | "progress", _) => key,
                _ => return None,
            };
            Some((key, value))
        });
        match option {
            Some((key, value)) => {
                fields.insert(key.to_string(), option_value(value));
            }
            None => prompt.push(word),
        }
    }
    if !prompt.is_empty() {
        let key = if message_action { "footer" } else { "query" };
        fields.insert(key.to_string(), Value::String(prompt.join(" ")));
    }
    fields.insert("command".to_string(), Value::String(name.to_string()));

    serde_json::from_value(Value::Object(fields))
        .map(Input::Command)
        .map_err(|e| format!("{}\n{}", e, HELP))
}

fn option_value(raw: &str) -> Value {
    if let Ok(n) = raw.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Value::from(f);
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

fn logger_config(config: &BotConfig) -> LoggerConfig {
    let base = if config.log_json {
        LoggerConfig::production()
    } else {
        LoggerConfig::development().with_colors(std::io::stdout().is_terminal())
    };
    base.with_level(config.log_level)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_loaded = dotenv::dotenv().is_ok();
    let config = BotConfig::from_env()?;

    logger::init_with_config(logger_config(&config))?;
    if !env_loaded {
        log::warn!("No .env file found, using system environment variables");
    }
    logger::log_startup_info("stablecog", env!("CARGO_PKG_VERSION"));
    logger::log_config_info(&config);

    tokio::fs::create_dir_all(&config.output_dir).await?;

    let engine = EngineClient::new(HttpEngine::new(config.engine.clone()));
    let resolver = ImageResolver::new(HttpImageSource::new());
    let dispatcher = Arc::new(Dispatcher::new(&config, engine, resolver));
    let user = std::env::var("USER").unwrap_or_else(|_| "console".to_string());

    println!("{}", HELP);
    let output_dir = config.output_dir.clone();
    serve(tokio::io::stdin(), dispatcher, move || ConsoleInteraction {
        user: user.clone(),
        output_dir: output_dir.clone(),
    })
    .await?;
    log::info!("shutting down");
    Ok(())
}

/// Runs every input line as its own task. Returns once the input is closed
/// and every started request has sent its reply.
async fn serve<R, I, F>(reader: R, dispatcher: Arc<Dispatcher>, make_interaction: F) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    I: Interaction + 'static,
    F: Fn() -> I,
{
    let mut in_flight = JoinSet::new();
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        while in_flight.try_join_next().is_some() {}

        if line.trim().is_empty() {
            continue;
        }
        let input = match parse_line(&line) {
            Ok(input) => input,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        let dispatcher = dispatcher.clone();
        let interaction = make_interaction();
        in_flight.spawn(async move {
            match input {
                Input::Command(command) => dispatcher.dispatch(command, &interaction).await,
                Input::Action(id, action) => {
                    dispatcher.dispatch_action(&id, action, &interaction).await
                }
            }
        });
    }

    log::info!("input closed, waiting for {} request(s)", in_flight.len());
    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            log::error!("Request task failed: {}", e);
        }
    }
    Ok(())
}
