use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use agridiag_contracts::actions::Action;
use agridiag_contracts::chat::{parse_intent, CHAT_HELP_COMMANDS};
use agridiag_contracts::events::EventWriter;
use agridiag_engine::inference::describe_timeout;
use agridiag_engine::{
    AppConfig, ConfigOverrides, GeminiClient, Session, UploadSummary, UploadedImage,
};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

const EXIT_FAILURE: i32 = 1;
const EXIT_CONFIG: i32 = 2;

const CAPTION: &str = "Upload a clear image of the plant/leaf/stem, then pick an action. (Proof of concept; not a lab diagnosis.)";
const UPLOAD_HINT: &str = "Please upload an image to get started: /upload <path> with a close, well-lit photo of the symptomatic plant area.";
const IMAGE_TIPS: &str = "Image notes / tips:\n\
- Take a close-up of the symptomatic area\n\
- Include an overall plant view plus a close leaf detail if possible\n\
- Avoid excessive blurring or shadows\n\
- If your image is > 10-15MB, consider resizing it before upload";
const FOOTER_TIP: &str = "Tip: If output seems uncertain, re-take the photo with closer focus on symptomatic areas and try again. This is a decision-support tool; confirm important actions with local experts.";

#[derive(Debug, Parser)]
#[command(
    name = "agridiag",
    version,
    about = "Plant disease detection & advice from a photo"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive session: upload an image, then run actions on it.
    Chat(ChatArgs),
    /// Upload one image, run one action, print the result and exit.
    Run(RunArgs),
}

#[derive(Debug, Args)]
struct SessionArgs {
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    api_base: Option<String>,
    #[arg(long)]
    timeout_secs: Option<f64>,
    #[arg(long)]
    soft_limit_mb: Option<f64>,
    /// Applies to every action instead of the per-action defaults.
    #[arg(long)]
    thinking_budget: Option<u32>,
    #[arg(long)]
    secrets: Option<PathBuf>,
    #[arg(long)]
    events: Option<PathBuf>,
}

impl SessionArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            model: self.model.clone(),
            api_base: self.api_base.clone(),
            timeout_secs: self.timeout_secs,
            soft_limit_mb: self.soft_limit_mb,
            thinking_budget: self.thinking_budget,
            secrets_path: self.secrets.clone(),
            events_path: self.events.clone(),
        }
    }
}

#[derive(Debug, Args)]
struct ChatArgs {
    #[command(flatten)]
    session: SessionArgs,
    /// Image to upload before the prompt appears.
    #[arg(long)]
    image: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct RunArgs {
    #[command(flatten)]
    session: SessionArgs,
    #[arg(long)]
    image: PathBuf,
    /// find-disease, suggestions-advice or custom (aliases: disease, advice, ask).
    #[arg(long)]
    action: Action,
    #[arg(long)]
    question: Option<String>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("agridiag error: {err:#}");
            std::process::exit(EXIT_FAILURE);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Chat(args) => run_chat(args),
        Command::Run(args) => run_once(args),
    }
}

fn resolve_config(args: &SessionArgs) -> Option<AppConfig> {
    match AppConfig::resolve(args.overrides()) {
        Ok(config) => Some(config),
        Err(err) => {
            eprintln!("Configuration error: {err}");
            None
        }
    }
}

fn open_session(config: &AppConfig) -> Result<Session> {
    let client = GeminiClient::new(config)?;
    log::info!(
        "using {} at {} (timeout {}, key from {:?})",
        config.model,
        config.api_base,
        describe_timeout(config.request_timeout),
        config.credential_source
    );
    let mut session = Session::new(config.session_settings(), Box::new(client));
    if let Some(path) = config.events_path.as_ref() {
        let writer = EventWriter::new(path, session.id().to_string());
        session = session.with_events(writer);
    }
    Ok(session)
}

fn run_chat(args: ChatArgs) -> Result<i32> {
    let Some(config) = resolve_config(&args.session) else {
        return Ok(EXIT_CONFIG);
    };
    let mut session = open_session(&config)?;

    println!("AgriDiag: plant disease detection & advice ({})", config.model);
    println!("{CAPTION}");
    println!("Type /help for commands.");
    match args.image.as_deref() {
        Some(path) => upload_from_path(&mut session, path),
        None => println!("{UPLOAD_HINT}"),
    }

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err).context("failed reading from stdin"),
        };
        if read == 0 {
            break;
        }

        let input = line.trim_end_matches(['\n', '\r']);
        let intent = parse_intent(input);
        match intent.action.as_str() {
            "noop" => continue,
            "help" => println!("Commands: {}", CHAT_HELP_COMMANDS.join("  ")),
            "tips" => println!("{IMAGE_TIPS}"),
            "quit" => break,
            "upload" => match intent.arg_str("path") {
                Some(path) => upload_from_path(&mut session, Path::new(path)),
                None => println!("/upload requires a path"),
            },
            "find_disease" => {
                press_and_render(&mut session, Action::FindDisease, None);
            }
            "advice" => {
                press_and_render(&mut session, Action::ManagementAdvice, None);
            }
            "ask" => {
                press_and_render(
                    &mut session,
                    Action::CustomQuestion,
                    intent.question.as_deref(),
                );
            }
            "show" => show(&session, intent.arg_str("target")),
            _ => println!(
                "Unknown command: {}. Type /help for commands.",
                intent.raw.trim()
            ),
        }
    }

    Ok(0)
}

fn run_once(args: RunArgs) -> Result<i32> {
    let Some(config) = resolve_config(&args.session) else {
        return Ok(EXIT_CONFIG);
    };
    let mut session = open_session(&config)?;

    let upload = UploadedImage::from_path(&args.image)?;
    match session.upload(upload) {
        Ok(summary) => {
            if let Some(warning) = summary.warning.as_deref() {
                eprintln!("Warning: {warning}");
            }
        }
        Err(err) => {
            eprintln!("{err}");
            return Ok(EXIT_FAILURE);
        }
    }

    eprintln!("{}", args.action.pending_label());
    match session.press(args.action, args.question.as_deref()) {
        Ok(result) => {
            let code = exit_code_for(result.is_success());
            if let Some(rendered) = session.render() {
                println!("{rendered}");
            }
            Ok(code)
        }
        Err(rejected) => {
            eprintln!("Warning: {rejected}");
            Ok(EXIT_FAILURE)
        }
    }
}

fn upload_from_path(session: &mut Session, path: &Path) {
    let first_upload = session.image().is_none();
    let upload = match UploadedImage::from_path(path) {
        Ok(upload) => upload,
        Err(err) => {
            println!("Couldn't read image: {err:#}");
            return;
        }
    };
    match session.upload(upload) {
        Ok(summary) => {
            println!("{}", describe_upload(&summary));
            if let Some(warning) = summary.warning.as_deref() {
                println!("Warning: {warning}");
            }
            if first_upload {
                println!("{FOOTER_TIP}");
            }
        }
        Err(err) => {
            println!("{err}");
            println!("{UPLOAD_HINT}");
        }
    }
}

fn press_and_render(session: &mut Session, action: Action, question: Option<&str>) {
    if session.image().is_some() {
        println!("{}", action.pending_label());
    }
    match session.press(action, question) {
        Ok(_) => {
            if let Some(rendered) = session.render() {
                println!("{rendered}");
            }
        }
        Err(rejected) => println!("Warning: {rejected}"),
    }
}

fn show(session: &Session, target: Option<&str>) {
    let rendered = match target {
        None => session.render(),
        Some(raw) => match raw.parse::<Action>() {
            Ok(action) => session.presenter().render_action(action),
            Err(err) => {
                println!("{err}");
                return;
            }
        },
    };
    match rendered {
        Some(text) => println!("{text}"),
        None => println!("Nothing to show yet."),
    }
}

fn describe_upload(summary: &UploadSummary) -> String {
    format!(
        "Uploaded: {} ({}x{}, {:.1} KB as JPEG)",
        summary.name,
        summary.width,
        summary.height,
        summary.canonical_bytes as f64 / 1024.0
    )
}

fn exit_code_for(success: bool) -> i32 {
    if success {
        0
    } else {
        EXIT_FAILURE
    }
}
