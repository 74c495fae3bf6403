//! confab - conversational web-answer client

mod commands;
mod config;
mod status;

use clap::Parser;
use std::io::Write;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

use confab_engine::{
    AnswerSurface, ConversationEngine, EngineConfig, EngineEvent, TurnOutcome,
};
use confab_page::{
    AnswerExtractor, BrowserFetcher, ExtractorConfig, FetchConfig, HttpFetcher, PageFetcher,
    fetch::DEFAULT_USER_AGENT,
};

use crate::commands::CommandResult;
use crate::status::StatusLine;

/// confab - ask the web, keep the thread
#[derive(Parser, Debug)]
#[command(name = "confab")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Run a single query and exit
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Cap answers to one short paragraph
    #[arg(short, long)]
    short: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Use a plain HTTP fetcher instead of a browser
    #[arg(long)]
    http: bool,

    /// Show the browser window instead of running headless
    #[arg(long)]
    headful: bool,

    /// Answer surface base URL (the percent-encoded query is appended)
    #[arg(long)]
    base_url: Option<String>,

    /// Maximum retries per turn
    #[arg(long)]
    max_retries: Option<u32>,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Setup tracing
    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("confab=debug")
            .init();
    }

    // Initialize config and exit
    if args.init_config {
        match config::Config::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    // Load config file; CLI args take precedence
    let cfg = config::Config::load();

    let user_agent = cfg
        .user_agent
        .clone()
        .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

    let fetch_config = FetchConfig {
        headless: !args.headful && cfg.headless.unwrap_or(true),
        user_agent: user_agent.clone(),
        readiness_timeout: cfg
            .readiness_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(FetchConfig::default().readiness_timeout),
        ..FetchConfig::default()
    };

    let use_http = args.http || cfg.fetcher.as_deref() == Some("http");
    let fetcher: Arc<dyn PageFetcher> = if use_http {
        Arc::new(HttpFetcher::new(&user_agent, Duration::from_secs(15))?)
    } else {
        Arc::new(BrowserFetcher::new(fetch_config))
    };

    let extractor = Arc::new(AnswerExtractor::new(ExtractorConfig::default())?);

    let base_url = args
        .base_url
        .or(cfg.base_url.clone())
        .unwrap_or_else(|| AnswerSurface::DEFAULT_BASE_URL.to_string());
    let surface = Arc::new(AnswerSurface::new(fetcher, extractor, base_url));

    let engine_config = EngineConfig {
        max_retries: args.max_retries.or(cfg.max_retries).unwrap_or(2),
        retry_delay: Duration::from_secs(cfg.retry_delay_secs.unwrap_or(3)),
        follow_up_threshold: cfg.follow_up_threshold.unwrap_or(0.5),
        short_mode: args.short || cfg.short.unwrap_or(false),
    };
    let mut engine = ConversationEngine::new(engine_config, surface);

    // One long-lived Ctrl-C watcher: interrupt an in-flight turn, nag at
    // the prompt otherwise.
    let handle = engine.handle();
    tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                break;
            }
            if handle.is_running() {
                handle.abort();
            } else {
                println!("\n(press Ctrl-D or type /quit to exit)");
            }
        }
    });

    let verbose = Arc::new(AtomicBool::new(args.verbose));

    let result = if let Some(ref command) = args.command {
        println!("confab> {}", command);
        println!();
        run_query(&mut engine, command, &verbose).await
    } else {
        run_interactive(&mut engine, &verbose).await
    };

    // Close the browser on every exit path
    engine.shutdown().await;
    result
}

fn print_banner() {
    println!("confab - ask the web, keep the thread");
    println!("Type /help for commands. Ctrl-C interrupts a running query.");
    println!();
}

async fn run_interactive(
    engine: &mut ConversationEngine,
    verbose: &Arc<AtomicBool>,
) -> anyhow::Result<()> {
    print_banner();

    loop {
        print!("confab> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if std::io::stdin().read_line(&mut line)? == 0 {
            // EOF
            println!();
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match commands::execute_command(input, engine) {
            Some(CommandResult::Reset) => {
                println!("Conversation forgotten.");
            }
            Some(CommandResult::ClearScreen) => {
                print!("\x1b[2J\x1b[H");
                std::io::stdout().flush()?;
            }
            Some(CommandResult::ToggleVerbose) => {
                let on = !verbose.load(Ordering::Acquire);
                verbose.store(on, Ordering::Release);
                println!("Verbose {}", if on { "on" } else { "off" });
            }
            Some(CommandResult::Message(msg)) => {
                println!("{}", msg);
            }
            Some(CommandResult::Exit) => break,
            Some(CommandResult::Unknown(cmd)) => {
                println!("Unknown command: /{} (try /help)", cmd);
            }
            None => run_query(engine, input, verbose).await?,
        }
        println!();
    }

    Ok(())
}

/// Run one turn with a live status line. The status line is stopped on
/// both the success and failure paths before anything prints.
async fn run_query(
    engine: &mut ConversationEngine,
    query: &str,
    verbose: &Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let status = StatusLine::start("Searching...");
    let mut events = engine.subscribe();
    let event_status = status.clone();
    let event_verbose = Arc::clone(verbose);

    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                EngineEvent::Fetching { attempt } if attempt > 0 => {
                    event_status.set_message(format!("Retrying (attempt {})...", attempt + 1));
                }
                EngineEvent::ChallengeDetected { .. } => {
                    event_status.set_message("Challenge page detected, backing off...");
                }
                EngineEvent::Retrying { attempt, reason } => {
                    if event_verbose.load(Ordering::Acquire) {
                        event_status.set_message(format!(
                            "Attempt {} failed ({:?}), retrying...",
                            attempt + 1,
                            reason
                        ));
                    }
                }
                EngineEvent::Summarizing => {
                    event_status.set_message("Summarizing for memory...");
                }
                EngineEvent::TurnEnd { .. } => break,
                _ => {}
            }
        }
    });

    let result = engine.query(query).await;

    status.stop();
    event_task.abort();

    match result {
        Ok(TurnOutcome::Accepted(text)) => {
            println!("{}", "=".repeat(60));
            print!("{}", text);
            println!("{}", "=".repeat(60));
        }
        Ok(TurnOutcome::Failed(reason)) => {
            println!("No answer: {}", reason);
        }
        Err(confab_engine::Error::Interrupted) => {
            println!("Interrupted.");
        }
    }

    Ok(())
}
