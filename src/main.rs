use std::io::{self, BufRead, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{mpsc, Arc};
use std::thread;

use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

mod error;
mod model;
mod parsers;
mod protocol;
mod services;
mod session;

use error::Result;
use services::{diff, qa};
use session::{RequestGate, Session};

#[derive(Debug, Parser)]
#[command(name = "comfy-translator-core", version, about = "Translate ComfyUI plugin strings into Chinese")]
struct Cli {
    #[arg(long, global = true, default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// JSON-lines requests on stdin, responses on stdout (default)
    Serve,
    /// Parse plugin directories and print what was found
    Parse {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Parse plugins, translate them and write outputs plus a run report
    Translate {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[arg(long)]
        service: Option<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        concurrency: Option<usize>,
        #[arg(long)]
        batch_size: Option<usize>,
        #[arg(long)]
        rounds: Option<usize>,
    },
    /// Diff two loader translation files
    Compare { old: PathBuf, new: PathBuf },
    /// Report problems in a loader translation file
    Check { path: PathBuf },
    /// Replace raw type names in a loader translation file
    Fix { path: PathBuf },
    /// Send a short request to the configured service
    TestConnection,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| error::CoreError::json(Path::new("<stdout>"), e))?;
    println!("{text}");
    Ok(())
}

fn serve(config: &Path) -> Result<()> {
    let mut session = Session::open(config)?;
    let gate = Arc::new(RequestGate::new(session.cancel_handle()));
    let reader_gate = Arc::clone(&gate);
    let (tx, rx) = mpsc::channel::<String>();

    // The reader answers `terminate` itself so it lands while a run is busy.
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(l) => l,
                Err(_) => continue,
            };
            if line.trim().is_empty() {
                continue;
            }
            if let Some(id) = protocol::terminate_request(&line) {
                let active = reader_gate.terminate();
                tracing::info!(active, "termination requested");
                let mut out = io::stdout().lock();
                let _ = writeln!(out, "{}", protocol::ok(id, json!({ "terminating": active })));
                let _ = out.flush();
                continue;
            }
            reader_gate.enqueue();
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    for line in rx {
        let result = panic::catch_unwind(AssertUnwindSafe(|| protocol::handle(&mut session, &line)));
        gate.finish();

        let response = match result {
            Ok(resp) => resp,
            Err(_) => {
                tracing::error!("command handler panicked");
                json!({
                    "status": "error",
                    "message": "internal core error"
                })
                .to_string()
            }
        };

        let mut stdout = io::stdout().lock();
        if writeln!(stdout, "{response}").is_err() {
            break;
        }
        let _ = stdout.flush();
    }

    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    match cli.command.unwrap_or(Cmd::Serve) {
        Cmd::Serve => serve(&cli.config),

        Cmd::Parse { paths } => {
            let mut session = Session::open(&cli.config)?;
            print_json(&session.parse_paths(&paths)?)
        }

        Cmd::Translate {
            paths,
            service,
            model,
            concurrency,
            batch_size,
            rounds,
        } => {
            let mut session = Session::open(&cli.config)?;
            if let Some(s) = service {
                session.config.current_service = s;
            }
            if let Some(m) = model {
                let service = session.config.current_service.clone();
                session.config.api_configs.entry(service).or_default().model = m;
            }
            if let Some(c) = concurrency {
                session.config.concurrency = c;
            }
            if let Some(b) = batch_size {
                session.config.batch_size = b;
            }
            if let Some(r) = rounds {
                session.config.rounds = r;
            }

            session.parse_paths(&paths)?;
            let out = session.translate()?;
            print_json(&out)
        }

        Cmd::Compare { old, new } => print_json(&diff::compare_files(&old, &new)?),

        Cmd::Check { path } => print_json(&qa::check(&path)?),

        Cmd::Fix { path } => print_json(&qa::fix(&path)?),

        Cmd::TestConnection => {
            let session = Session::open(&cli.config)?;
            let reply = session.test_connection()?;
            print_json(&json!({ "reply": reply }))
        }
    }
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}
