//! Chatbot command line entry point

use std::collections::BTreeSet;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chatbot_relay::commands::{
    complete_candidates, describe_topic, execute, parse_command, ReplCommand,
};
use chatbot_relay::store::spawn_autosave;
use chatbot_relay::stream::StreamOutcome;
use chatbot_relay::surface::{ResponseSurface, ResponseView, SurfaceError};
use chatbot_relay::{run, run_benchmark, Cli, Commands, Relay, RelayError, Reply};
use clap::Parser;
use colored::Colorize;
use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Default)]
struct ReplHelper;

impl Helper for ReplHelper {}
impl Hinter for ReplHelper {
    type Hint = String;
}
impl Highlighter for ReplHelper {}
impl Validator for ReplHelper {}

impl Completer for ReplHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let pos = pos.min(line.len());
        let input = &line[..pos];
        let start = input
            .rfind(char::is_whitespace)
            .map_or(0, |last_ws| last_ws + 1);
        let candidates: BTreeSet<&str> = complete_candidates(&input[start..]);

        let pairs = candidates
            .into_iter()
            .map(|candidate| Pair {
                display: candidate.to_string(),
                replacement: candidate.to_string(),
            })
            .collect();
        Ok((start, pairs))
    }
}

/// Renders a streamed reply on the terminal
///
/// Text that extends what is already printed is appended; anything else
/// (the thinking animation, or text rewritten after a think block closes)
/// redraws the current line.
#[derive(Default)]
struct ConsoleSurface {
    printed: String,
    thinking: bool,
}

impl ConsoleSurface {
    fn finish(&self) {
        println!();
    }
}

#[async_trait]
impl ResponseSurface for ConsoleSurface {
    async fn show(&mut self, view: &ResponseView) -> Result<(), SurfaceError> {
        let mut stdout = io::stdout();
        match view {
            ResponseView::Thinking { .. } => {
                print!("\r{:<12}", view.render().dimmed());
                self.thinking = true;
            }
            ResponseView::Text(text) => {
                if self.thinking {
                    print!("\r{:<12}\r", "");
                    self.thinking = false;
                    self.printed.clear();
                }
                match text.strip_prefix(self.printed.as_str()) {
                    Some(delta) => print!("{delta}"),
                    None => print!("\n{text}"),
                }
                self.printed.clone_from(text);
            }
        }
        stdout
            .flush()
            .map_err(|e| SurfaceError::Edit(e.to_string()))
    }
}

struct ChatSession {
    relay: Arc<Relay>,
    user: String,
    channel: String,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "chatbot_relay=info,chatbot_context=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match cli.command.clone() {
        None => run_chat(&cli, "you".to_string(), "general".to_string(), false).await,
        Some(Commands::Chat {
            user,
            channel,
            no_preload,
        }) => run_chat(&cli, user, channel, no_preload).await,
        Some(command) => {
            let output = run(&cli, command).await?;
            println!("{output}");
            Ok(())
        }
    }
}

async fn run_chat(cli: &Cli, user: String, channel: String, no_preload: bool) -> anyhow::Result<()> {
    let config = cli.relay_config();
    let relay = Arc::new(Relay::open(&config, cli.provider()?).await?);
    tracing::info!(bot = relay.bot_name(), data_dir = %config.data_dir.root().display(), "starting chat session");

    let autosave = spawn_autosave(
        Arc::clone(relay.manager()),
        relay.history_store().clone(),
        config.autosave_every,
    );
    if !no_preload {
        let preloader = Arc::clone(&relay);
        tokio::spawn(async move {
            if let Err(e) = preloader.preload().await {
                tracing::warn!(error = %e, "model preload failed");
            }
        });
    }

    let mut editor = Editor::<ReplHelper, rustyline::history::DefaultHistory>::new()?;
    editor.set_helper(Some(ReplHelper));
    let history = history_file();
    let _ = editor.load_history(&history);

    let session = ChatSession {
        relay: Arc::clone(&relay),
        user,
        channel,
    };
    println!(
        "{}",
        format!("{} interactive mode. Type `/help`.", relay.bot_name()).bright_green()
    );
    let prompt = format!("#{}> ", session.channel);
    loop {
        match editor.readline(&prompt) {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(trimmed);
                match run_repl_command(&session, cli, parse_command(trimmed)).await {
                    Ok(true) => break,
                    Ok(false) => {}
                    Err(err) if err.is_busy() => println!("{}", err.to_string().yellow()),
                    Err(err) => eprintln!("{} {}", "error:".red(), err),
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted)
            | Err(rustyline::error::ReadlineError::Eof) => {
                println!();
                break;
            }
            Err(err) => {
                eprintln!("{} {err}", "error:".red());
                break;
            }
        }
    }

    autosave.abort();
    relay.save_history().await?;
    if let Err(err) = editor.save_history(&history) {
        eprintln!("{} failed to save history: {err}", "warning:".yellow());
    }
    Ok(())
}

async fn run_repl_command(
    session: &ChatSession,
    cli: &Cli,
    command: ReplCommand,
) -> Result<bool, RelayError> {
    let relay = &session.relay;
    match command {
        ReplCommand::Mention(text) => {
            let mut surface = ConsoleSurface::default();
            let reply = relay
                .handle_public(&session.channel, &session.user, &text, true, &mut surface)
                .await?;
            surface.finish();
            report(&reply);
        }
        ReplCommand::Post(text) => {
            relay
                .handle_public(&session.channel, &session.user, &text, false, &mut ConsoleSurface::default())
                .await?;
            println!("{}", "posted".dimmed());
        }
        ReplCommand::Private(text) => {
            let mut surface = ConsoleSurface::default();
            let reply = relay.handle_private(&session.user, &text, &mut surface).await?;
            surface.finish();
            report(&reply);
        }
        ReplCommand::Topic(text) => println!("{}", describe_topic(&text).cyan()),
        ReplCommand::Admin(command) => {
            let output = execute(relay, command).await?;
            println!("{}", output.bright_blue());
        }
        ReplCommand::Bench(prompt_type) => {
            let _guard = relay.gate().try_begin()?;
            println!("{}", "Running benchmarks...".dimmed());
            let output = run_benchmark(
                relay,
                cli.provider()?,
                &cli.relay_config(),
                prompt_type.as_deref().unwrap_or("general"),
                None,
            )
            .await?;
            println!("{}", output.bright_blue());
        }
        ReplCommand::Exit => {
            println!("{}", "bye".bright_green());
            return Ok(true);
        }
        ReplCommand::Empty => {}
        ReplCommand::Unknown(message) => {
            println!("{} {message}", "warning:".yellow());
            println!("{}", "Type `/help` for available commands.".yellow());
        }
    }

    Ok(false)
}

fn report(reply: &Reply) {
    match reply {
        Reply::Answered(StreamOutcome::Failed { error, .. }) => {
            eprintln!("{} {error}", "generation failed:".red());
        }
        Reply::Answered(StreamOutcome::Abandoned { .. }) => {
            eprintln!("{}", "response abandoned".yellow());
        }
        Reply::Answered(StreamOutcome::Completed(_)) | Reply::Ignored => {}
    }
}

fn history_file() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".chatbot-history");
    }
    PathBuf::from(".chatbot-history")
}
