//! # Gatework - Logic Circuit Simulator
//!
//! The main binary for the Gatework circuit engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │           apps/gatework (THE BINARY)          │
//! │                                               │
//! │   ┌─────────────┐        ┌────────────────┐   │
//! │   │    CLI      │        │  gatework.toml │   │
//! │   │   (clap)    │◄───────┤  (config)      │   │
//! │   └──────┬──────┘        └────────────────┘   │
//! │          ▼                                    │
//! │   ┌───────────────┐                           │
//! │   │ gatework-core │                           │
//! │   │  (THE LOGIC)  │                           │
//! │   └───────────────┘                           │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! gatework init mux.json --inputs 3 --outputs 1
//! gatework truth-table mux.json
//! gatework publish mux.json local/mux/1
//! gatework simulate clock.gwk --set 0=1 --ticks 20
//! ```

use clap::Parser;
use gatework::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // GATEWORK_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("GATEWORK_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "gatework=info,gatework_core=warn".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the Gatework startup banner.
fn print_banner() {
    println!(
        r#"
   ┌─┐┌─┐┌┬┐┌─┐┬ ┬┌─┐┬─┐┬┌─
   │ ┬├─┤ │ ├┤ ││││ │├┬┘├┴┐
   └─┘┴ ┴ ┴ └─┘└┴┘└─┘┴└─┴ ┴

  Logic Circuit Simulator v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
