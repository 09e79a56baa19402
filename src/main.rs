use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use chatsim::audio;
use chatsim::config::{self, avatar_data_url, ChatSettings, ScriptConfig};
use chatsim::core::{Author, MessageId, MessageKind, MessageStore, MessageUpdate, Participants};
use chatsim::playback::{PlaybackConfig, TimelineEngine};
use chatsim::presentation::{Notifier, Silent, TerminalBell, TerminalGateway};
use chatsim::preview::{
    CachedResolver, HttpConfig, HttpPreviewSource, LinkPreviewResolver, OfflineSource,
};
use chatsim::Simulator;

#[derive(Parser)]
#[command(name = "chatsim", version, about = "Play back scripted two-party chat conversations")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Play a script in the terminal
    Play {
        file: PathBuf,
        #[command(flatten)]
        options: PlayOptions,
    },
    /// Check a script for problems
    Validate { file: PathBuf },
    /// Write an example script
    Sample {
        /// Target file or directory (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Play the built-in demo conversation
    Demo {
        #[command(flatten)]
        options: PlayOptions,
    },
    /// Edit the messages of a script file
    Script {
        #[command(subcommand)]
        action: ScriptAction,
    },
    /// Local display settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Args)]
struct PlayOptions {
    /// Playback speed multiplier (0.1 - 10)
    #[arg(long, default_value_t = 1.0)]
    speed: f64,
    /// Show basic link previews without network access
    #[arg(long)]
    no_previews: bool,
    /// Don't ring the terminal bell on new messages
    #[arg(long)]
    no_bell: bool,
}

#[derive(Subcommand)]
enum ScriptAction {
    /// List messages
    List { file: PathBuf },
    /// Append a message
    Add {
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = KindArg::Text)]
        kind: KindArg,
        #[arg(long, value_enum, default_value_t = Side::Local)]
        author: Side,
        #[arg(long)]
        text: Option<String>,
        /// Delay in milliseconds
        #[arg(long)]
        delay: Option<u64>,
        #[arg(long)]
        reply_to: Option<MessageId>,
    },
    /// Set one field (author, type, text, delay, replyToId, duration)
    Set {
        file: PathBuf,
        id: MessageId,
        field: String,
        value: String,
    },
    Delete { file: PathBuf, id: MessageId },
    /// Attach an audio clip to a voice message
    Attach {
        file: PathBuf,
        id: MessageId,
        #[arg(required_unless_present = "remove")]
        audio: Option<PathBuf>,
        /// Remove the attached audio instead
        #[arg(long, conflicts_with = "audio")]
        remove: bool,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    Show,
    FontSize { size: u16 },
    /// Set or reset a participant avatar image
    Avatar {
        #[arg(value_enum)]
        side: Side,
        #[arg(required_unless_present = "reset")]
        path: Option<PathBuf>,
        #[arg(long, conflicts_with = "path")]
        reset: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Side {
    Local,
    Contact,
}

impl From<Side> for Author {
    fn from(side: Side) -> Self {
        match side {
            Side::Local => Author::Local,
            Side::Contact => Author::Remote,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Text,
    Voice,
}

impl From<KindArg> for MessageKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Text => MessageKind::Text,
            KindArg::Voice => MessageKind::Voice,
        }
    }
}

fn main() -> Result<()> {
    // Logs go to stderr so the conversation on stdout stays readable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Play { file, options } => {
            let contents = fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let (script, problems) = ScriptConfig::import_checked(&contents)
                .with_context(|| format!("failed to load {}", file.display()))?;
            for problem in problems {
                warn!("{}: {}", file.display(), problem);
            }
            play(script.participants.clone(), script.store(), &options)
        }
        Command::Demo { options } => {
            play(Participants::default(), MessageStore::with_default_messages(), &options)
        }
        Command::Validate { file } => validate_file(&file),
        Command::Sample { output } => {
            let sample = ScriptConfig::sample();
            match output {
                Some(path) => {
                    let path = if path.is_dir() {
                        path.join(config::default_file_name(Local::now()))
                    } else {
                        path
                    };
                    sample.save(&path)?;
                    println!("wrote {}", path.display());
                }
                None => println!("{}", sample.to_json_pretty()?),
            }
            Ok(())
        }
        Command::Script { action } => edit_script(action),
        Command::Settings { action } => edit_settings(action),
    }
}

fn play(mut participants: Participants, store: MessageStore, options: &PlayOptions) -> Result<()> {
    ChatSettings::load().apply_to(&mut participants);

    let runtime = tokio::runtime::Runtime::new().context("failed to create tokio runtime")?;
    runtime.block_on(async {
        let resolver: Arc<dyn LinkPreviewResolver> = if options.no_previews {
            Arc::new(CachedResolver::new(OfflineSource))
        } else {
            Arc::new(CachedResolver::new(HttpPreviewSource::new(HttpConfig::default())?))
        };
        let notifier: Arc<dyn Notifier> = if options.no_bell {
            Arc::new(Silent)
        } else {
            Arc::new(TerminalBell)
        };

        let engine = TimelineEngine::builder(
            store.shared(),
            Arc::new(TerminalGateway::stdout(participants.clone())),
            resolver,
        )
        .notifier(notifier)
        .config(PlaybackConfig::with_speed(options.speed))
        .build();
        let simulator = Simulator::new(participants, engine);

        simulator.start().await?;
        tokio::select! {
            _ = simulator.engine().wait_until_finished() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                simulator.stop().await;
            }
        }
        Ok::<(), anyhow::Error>(())
    })
}

fn validate_file(file: &Path) -> Result<()> {
    let contents =
        fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;
    let value: Value = serde_json::from_str(&contents)?;

    let problems = config::validate(&value);
    for problem in &problems {
        println!("{}", problem);
    }
    let script = ScriptConfig::import(&contents)?;
    if !problems.is_empty() {
        bail!("{} problem(s) found", problems.len());
    }
    println!(
        "ok: {} messages between {} and {}",
        script.messages.len(),
        script.participants.local.name,
        script.participants.remote.name
    );
    Ok(())
}

fn edit_script(action: ScriptAction) -> Result<()> {
    let file = match &action {
        ScriptAction::List { file }
        | ScriptAction::Add { file, .. }
        | ScriptAction::Set { file, .. }
        | ScriptAction::Delete { file, .. }
        | ScriptAction::Attach { file, .. } => file.clone(),
    };
    let script = ScriptConfig::load(&file)
        .with_context(|| format!("failed to load {}", file.display()))?;
    let mut store = script.store();

    match action {
        ScriptAction::List { .. } => {
            for msg in store.list() {
                println!(
                    "#{:<3} {:<6} {:<5} {:>5}ms  {}",
                    msg.id,
                    script.participants.get(msg.author).name,
                    msg.kind.as_str(),
                    msg.delay,
                    msg.text.replace('\n', " ")
                );
            }
            return Ok(());
        }
        ScriptAction::Add {
            kind,
            author,
            text,
            delay,
            reply_to,
            ..
        } => {
            let id = store.add(kind.into()).id;
            store.update(id, MessageUpdate::Author(author.into()));
            if let Some(text) = text {
                store.update(id, MessageUpdate::Text(text));
            }
            if let Some(delay) = delay {
                store.update(id, MessageUpdate::Delay(delay));
            }
            if reply_to.is_some() {
                store.update(id, MessageUpdate::ReplyTo(reply_to));
            }
            println!("added message #{}", id);
        }
        ScriptAction::Set {
            id, field, value, ..
        } => {
            let value = serde_json::from_str(&value).unwrap_or(Value::String(value));
            let Some(update) = MessageUpdate::from_field(&field, &value) else {
                bail!("unknown or invalid field '{}'", field);
            };
            if !store.update(id, update) {
                bail!("no message #{}", id);
            }
        }
        ScriptAction::Delete { id, .. } => {
            if !store.delete(id) {
                bail!("no message #{}", id);
            }
        }
        ScriptAction::Attach {
            id, audio: clip, ..
        } => match clip {
            Some(path) => {
                let bytes = fs::read(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                let name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("audio");
                let secs = audio::attach_audio(&mut store, id, &bytes, name)?;
                println!("attached {} ({})", name, audio::format_duration(secs));
            }
            None => {
                if !audio::remove_audio(&mut store, id) {
                    bail!("no message #{}", id);
                }
            }
        },
    }

    ScriptConfig::export(&script.participants, &store).save(&file)?;
    Ok(())
}

fn edit_settings(action: SettingsAction) -> Result<()> {
    let mut settings = ChatSettings::load();
    match action {
        SettingsAction::Show => {
            if let Some(path) = ChatSettings::config_path() {
                println!("# {}", path.display());
            }
            println!("{}", serde_json::to_string_pretty(&settings)?);
            return Ok(());
        }
        SettingsAction::FontSize { size } => settings.font_size = size,
        SettingsAction::Avatar { side, path, .. } => {
            let avatar = match path {
                Some(path) => {
                    let bytes = fs::read(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    Some(avatar_data_url(&bytes, image_mime(&path))?)
                }
                None => None,
            };
            settings.set_avatar(side.into(), avatar);
        }
    }
    settings.save()?;
    println!("settings saved");
    Ok(())
}

fn image_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}
