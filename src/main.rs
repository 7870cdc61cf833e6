//! Arbiter CLI
//!
//! Usage:
//!   arbiter --text "your text here"          # Single turn
//!   arbiter --interactive                    # Conversation on stdin (empty line = silence)
//!   arbiter --serve                          # HTTP API server
//!   arbiter --text "text" --json             # JSON output

use clap::Parser;
use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

use arbiter::config::{ArbiterConfig, ConfigLoader};
use arbiter::core::{run_server, Orchestrator};
use arbiter::types::{IntensityProfile, Tone, TurnInput, TurnOutcome};
use arbiter::{logging, VERSION};

#[derive(Parser, Debug)]
#[command(
    name = "arbiter",
    version = VERSION,
    about = "Arbiter - Turn arbitration and iterative clarification engine",
    long_about = "Arbiter decides which conversational subsystem leads each turn.\n\n\
                  Every utterance passes a catastrophic safety gate and an interrupt\n\
                  gate, then signal detectors bid with claims and a deterministic\n\
                  resolver picks the leader. Ambiguous meaning starts a bounded\n\
                  paraphrase-and-check loop.\n\n\
                  Modes:\n  \
                  --text         Single turn\n  \
                  --interactive  Conversation on stdin\n  \
                  --serve        HTTP API server\n\n\
                  Profiles:\n  \
                  light   - one light iteration\n  \
                  full    - up to 3 iterations (default)\n  \
                  sacred  - up to 7 iterations"
)]
struct Args {
    /// Utterance to process (single mode)
    #[arg(short, long)]
    text: Option<String>,

    /// Interactive mode - read utterances from stdin
    #[arg(short, long)]
    interactive: bool,

    /// Run as HTTP API server
    #[arg(short, long)]
    serve: bool,

    /// Server address (default: 127.0.0.1:3000)
    #[arg(long, default_value = "127.0.0.1:3000")]
    addr: String,

    /// User id for the conversation
    #[arg(short, long, default_value = "local")]
    user: String,

    /// Looping intensity profile: light, full or sacred
    #[arg(short, long)]
    profile: Option<String>,

    /// Preferred tone lens: fire, water, earth, air or aether
    #[arg(long)]
    tone: Option<String>,

    /// Configuration file (default: ./arbiter.yaml if present)
    #[arg(short, long)]
    config: Option<String>,

    /// Output as JSON
    #[arg(long)]
    json: bool,

    /// Disable colors in output
    #[arg(long)]
    no_color: bool,

    /// Show claims and decision path
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if args.no_color {
        colored::control::set_override(false);
    }

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = logging::init(&config.logging) {
        eprintln!("Logging error: {}", e);
        std::process::exit(2);
    }

    let profile = match resolve_profile(&args, &config) {
        Ok(profile) => profile,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };
    let tone = match args.tone.as_deref().map(|name| Tone::parse(name).ok_or(name)) {
        Some(Err(name)) => {
            eprintln!("Unknown tone: {} (expected fire, water, earth, air or aether)", name);
            std::process::exit(2);
        }
        Some(Ok(tone)) => Some(tone),
        None => None,
    };

    let orchestrator = Arc::new(Orchestrator::new(config));

    if args.serve {
        run_serve(&args, orchestrator).await;
    } else if args.interactive {
        run_interactive(&args, &orchestrator, profile, tone).await;
    } else if let Some(ref text) = args.text {
        run_single(text, &args, &orchestrator, profile, tone).await;
    } else {
        // Default to interactive if no mode specified
        run_interactive(&args, &orchestrator, profile, tone).await;
    }
}

fn load_config(args: &Args) -> Result<ArbiterConfig, arbiter::error::ConfigError> {
    match args.config {
        Some(ref path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

/// `--profile` wins over the configured default
fn resolve_profile(args: &Args, config: &ArbiterConfig) -> Result<IntensityProfile, String> {
    match args.profile {
        Some(ref name) => IntensityProfile::parse(name)
            .ok_or_else(|| format!("Unknown profile: {} (expected light, full or sacred)", name)),
        None => Ok(config.looping.default_profile),
    }
}

fn turn_input(args: &Args, utterance: &str, profile: IntensityProfile, tone: Option<Tone>) -> TurnInput {
    let mut input = TurnInput::new(args.user.clone(), utterance).with_profile(profile);
    input.user_preferences.preferred_tone = tone;
    input
}

/// Run a single turn
async fn run_single(text: &str, args: &Args, orchestrator: &Orchestrator, profile: IntensityProfile, tone: Option<Tone>) {
    match orchestrator.process_turn(turn_input(args, text, profile, tone)).await {
        Ok(outcome) => print_outcome(&outcome, args),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Run interactive mode
async fn run_interactive(args: &Args, orchestrator: &Orchestrator, profile: IntensityProfile, tone: Option<Tone>) {
    print_header(profile);
    println!("Type and press Enter. An empty line reports silence. Type 'quit' to exit.");
    println!("Commands: :metrics  :session");
    println!();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("{} ", ">".bold());
        if stdout.flush().is_err() {
            break;
        }

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(_) => break,
        }

        let line = line.trim();
        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            let session_id = arbiter::core::default_session_id(&args.user);
            let exchanges = orchestrator
                .session_snapshot(&session_id)
                .await
                .map_or(0, |s| s.exchange_count);
            println!("\nSession ended. Exchanges: {}", exchanges);
            break;
        }

        let result = match line {
            "" => orchestrator.handle_silence(&args.user, None).await,
            ":metrics" => {
                print_metrics(orchestrator, &args.user);
                continue;
            }
            ":session" => {
                print_session(orchestrator, &args.user).await;
                continue;
            }
            utterance => orchestrator.process_turn(turn_input(args, utterance, profile, tone)).await,
        };

        match result {
            Ok(outcome) => print_outcome(&outcome, args),
            Err(e) => eprintln!("{} {}", "error:".red(), e),
        }
    }
}

/// Run HTTP API server
async fn run_serve(args: &Args, orchestrator: Arc<Orchestrator>) {
    println!();
    println!("{}", format!("Arbiter API Server v{}", VERSION).bold());
    println!();

    if let Err(e) = run_server(&args.addr, orchestrator).await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}

fn print_header(profile: IntensityProfile) {
    println!();
    println!("{}", format!("Arbiter v{}", VERSION).bold());
    println!("{} {:?}", "Looping profile:".dimmed(), profile);
    println!();
}

fn print_outcome(outcome: &TurnOutcome, args: &Args) {
    if args.json {
        match serde_json::to_string_pretty(outcome) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Serialization error: {}", e),
        }
        return;
    }

    if args.no_color {
        println!("{}", outcome.to_parseable_string());
    } else {
        println!("{}", outcome.to_terminal_string());
    }

    if args.verbose {
        print_verbose(outcome);
    }
}

/// Claims and decision path
fn print_verbose(outcome: &TurnOutcome) {
    let log = &outcome.decision.log;
    println!("  {} {}", "reason:".dimmed(), log.reason);
    for claim in &log.claims {
        println!(
            "  {} {:<20} p={:<2} c={:.2}  {}",
            "claim".dimmed(),
            claim.subsystem_id,
            claim.effective_priority(),
            claim.confidence,
            claim.reason
        );
    }
    for step in &log.decision_path {
        println!("  {} {}", "path".dimmed(), step);
    }
    if let Some(tone) = log.blend_tone {
        println!("  {} {}", "blend:".dimmed(), tone);
    }
    if let Some(score) = outcome.protocol_confidence {
        println!("  {} {:.2}", "protocol confidence:".dimmed(), score);
    }
    println!(
        "  {} {} | {} {}",
        "depth:".dimmed(),
        outcome.depth,
        "safety:".dimmed(),
        outcome.safety_status
    );
}

fn print_metrics(orchestrator: &Orchestrator, user: &str) {
    let session_id = arbiter::core::default_session_id(user);
    match orchestrator.metrics(&session_id) {
        Some(report) => match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Serialization error: {}", e),
        },
        None => println!("{}", "No metrics yet.".dimmed()),
    }
}

async fn print_session(orchestrator: &Orchestrator, user: &str) {
    let session_id = arbiter::core::default_session_id(user);
    match orchestrator.session_snapshot(&session_id).await {
        Some(session) => {
            println!(
                "{} {} | exchanges={} depth={} tone={} loop={}",
                "session".dimmed(),
                session.id,
                session.exchange_count,
                session.depth,
                session.current_tone.map_or_else(|| "-".to_string(), |t| t.to_string()),
                session
                    .loop_state
                    .as_ref()
                    .map_or_else(|| "-".to_string(), |s| format!("{} ({}/{})", s.phase, s.loop_count, s.max_loops)),
            );
        }
        None => println!("{}", "No session yet.".dimmed()),
    }
}
