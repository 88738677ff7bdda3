//! ingress-shield
//!
//! Admission pipeline runner.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌────────────────────────────────────────────────────┐
//!                        │                 SECURITY ORCHESTRATOR              │
//!                        │                                                    │
//!   AdmissionRequest     │  ┌──────────┐   ┌────────────┐   ┌─────────────┐   │
//!   ─────────────────────┼─▶│ firewall │──▶│ rate_limit │──▶│  detection  │───┼──▶ Decision
//!                        │  │ rules +  │   │  sliding   │   │ signatures +│   │
//!                        │  │ denylist │   │  windows   │   │  behavior   │   │
//!                        │  └────▲─────┘   └────────────┘   └──────┬──────┘   │
//!                        │       └──── critical: denylist source ──┘          │
//!                        │                                                    │
//!                        │  ┌──────────────────────────────────────────────┐  │
//!                        │  │   event log + sinks │ tunnels │ lifecycle    │  │
//!                        │  └──────────────────────────────────────────────┘  │
//!                        └────────────────────────────────────────────────────┘
//! ```

use clap::{Parser, Subcommand};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use ingress_shield::config::{load_config, parse_config, ConfigError, ShieldConfig};
use ingress_shield::observability::{logging, metrics};
use ingress_shield::{AdmissionRequest, SecurityOrchestrator, Shutdown};

#[derive(Parser)]
#[command(name = "ingress-shield")]
#[command(about = "Firewall, rate limiting and intrusion detection for inbound requests", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read JSON requests from stdin, write one JSON decision per line
    Serve,
    /// Evaluate a single request
    Check {
        #[arg(long)]
        source: IpAddr,
        #[arg(long)]
        port: u16,
        #[arg(long, default_value = "tcp")]
        protocol: String,
        #[arg(long, default_value = "")]
        payload: String,
        #[arg(long)]
        user: Option<String>,
        #[arg(long, default_value = "/")]
        endpoint: String,
        #[arg(long, default_value = "GET")]
        method: String,
    },
    /// Print a dashboard snapshot of a freshly configured pipeline
    Dashboard,
    /// Load and validate the configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Commands::Validate = cli.command {
        return validate(cli.config);
    }

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ShieldConfig::default(),
    };
    logging::init(&config.observability);
    tracing::info!("ingress-shield v{} starting", env!("CARGO_PKG_VERSION"));

    let orchestrator = Arc::new(SecurityOrchestrator::from_config(&config)?);

    match cli.command {
        Commands::Serve => serve(config, orchestrator).await?,
        Commands::Check {
            source,
            port,
            protocol,
            payload,
            user,
            endpoint,
            method,
        } => {
            let mut request = AdmissionRequest::new(source, port)
                .protocol(protocol)
                .payload(payload)
                .endpoint(endpoint)
                .method(method);
            request.user_id = user;
            let decision = orchestrator.admit_request(&request);
            println!("{}", serde_json::to_string_pretty(&decision)?);
        }
        Commands::Dashboard => {
            println!("{}", serde_json::to_string_pretty(&orchestrator.dashboard())?);
        }
        // Handled before logging is initialized.
        Commands::Validate => {}
    }

    Ok(())
}

fn validate(path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(path) = path else {
        eprintln!("validate requires --config <FILE>");
        std::process::exit(2);
    };

    let content = std::fs::read_to_string(&path)?;
    match parse_config(&content) {
        Ok(config) => {
            println!(
                "{}: valid ({} firewall rules, {} rate-limit rules)",
                path.display(),
                config.firewall.rules.len(),
                config.rate_limit.rules.len()
            );
            Ok(())
        }
        Err(ConfigError::Validation(errors)) => {
            for error in &errors {
                eprintln!("{}", error);
            }
            eprintln!("{}: {} problem(s) found", path.display(), errors.len());
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}

async fn serve(config: ShieldConfig, orchestrator: Arc<SecurityOrchestrator>) -> Result<(), Box<dyn std::error::Error>> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    orchestrator.start_background_tasks();

    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, shutting down");
            trigger.trigger();
        }
    });

    let mut signal = shutdown.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut processed: u64 = 0;

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = signal.recv() => break,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let output = match serde_json::from_str::<AdmissionRequest>(&line) {
            Ok(request) => {
                processed += 1;
                serde_json::to_string(&orchestrator.admit_request(&request))?
            }
            Err(e) => {
                tracing::warn!(error = %e, "Rejected malformed request line");
                serde_json::json!({ "error": e.to_string() }).to_string()
            }
        };
        stdout.write_all(output.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    orchestrator.stop_background_tasks();
    tracing::info!(
        processed,
        score = orchestrator.security_score(),
        "Shutdown complete"
    );
    Ok(())
}
