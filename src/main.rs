//! itinerary - travel booking services and their conversational orchestrator.

use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use itinerary_mesh::config::{load_config, validate_config};
use itinerary_mesh::oracle::OpenAiOracle;
use itinerary_mesh::service::{flight_service, hotel_service};
use itinerary_mesh::{
    CapabilityRegistry, ConversationOrchestrator, Endpoint, Error, HttpTransport, LocalTransport,
    ServiceTransport,
};

/// Travel booking services and a conversational orchestrator over them.
#[derive(Parser, Debug)]
#[command(name = "itinerary")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON.
    #[arg(long, global = true, default_value = "false")]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one resource service over HTTP.
    Serve {
        /// Catalog to serve.
        #[arg(long, value_enum)]
        catalog: Catalog,

        /// Listen address. Defaults to port 5000 for lodging, 5001 for transport.
        #[arg(long)]
        bind: Option<SocketAddr>,
    },

    /// Print each service's capability manifest.
    Discover {
        /// Configuration file.
        #[arg(long, env = "ITINERARY_CONFIG")]
        config: Option<PathBuf>,

        /// Service endpoints, overriding the configuration.
        #[arg(long = "endpoint")]
        endpoints: Vec<String>,
    },

    /// Talk to the travel assistant.
    Chat {
        /// Configuration file.
        #[arg(long, env = "ITINERARY_CONFIG")]
        config: Option<PathBuf>,

        /// Service endpoints, overriding the configuration.
        #[arg(long = "endpoint")]
        endpoints: Vec<String>,

        /// Oracle decisions allowed per message.
        #[arg(long)]
        max_rounds: Option<usize>,

        /// Oracle model.
        #[arg(long, env = "ITINERARY_MODEL")]
        model: Option<String>,

        /// Oracle API base URL.
        #[arg(long, env = "ITINERARY_ORACLE_URL")]
        oracle_url: Option<String>,

        /// Run both services in-process instead of over HTTP.
        #[arg(long, default_value = "false")]
        embedded: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Catalog {
    /// Hotels.
    Lodging,
    /// Flights.
    Transport,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout stays a clean transcript
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    if args.json_logs {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    match args.command {
        Command::Serve { catalog, bind } => serve(catalog, bind).await,
        Command::Discover { config, endpoints } => discover(config, endpoints).await,
        Command::Chat {
            config,
            endpoints,
            max_rounds,
            model,
            oracle_url,
            embedded,
        } => {
            let mut config = load_config(config.as_deref())?;
            if !endpoints.is_empty() {
                config.orchestrator.endpoints = endpoints.into_iter().map(Endpoint::new).collect();
            }
            if let Some(max_rounds) = max_rounds {
                config.orchestrator.max_rounds = max_rounds;
            }
            if let Some(model) = model {
                config.oracle.model = model;
            }
            if let Some(url) = oracle_url {
                config.oracle.base_url = url;
            }

            let transport: Arc<dyn ServiceTransport> = if embedded {
                config.orchestrator.endpoints =
                    vec![Endpoint::new("local://hotels"), Endpoint::new("local://flights")];
                Arc::new(
                    LocalTransport::new()
                        .mount("local://hotels", Arc::new(hotel_service()))
                        .mount("local://flights", Arc::new(flight_service())),
                )
            } else {
                Arc::new(HttpTransport::new(config.orchestrator.request_timeout())?)
            };
            validate_config(&config)?;

            let oracle = Arc::new(OpenAiOracle::new(
                &config.oracle,
                config.orchestrator.default_year,
                config.orchestrator.oracle_timeout(),
            )?);
            let orchestrator =
                ConversationOrchestrator::connect(transport, oracle, config.orchestrator).await;
            chat(orchestrator).await
        }
    }
}

async fn serve(catalog: Catalog, bind: Option<SocketAddr>) -> anyhow::Result<()> {
    let (service, default_port) = match catalog {
        Catalog::Lodging => (hotel_service(), 5000),
        Catalog::Transport => (flight_service(), 5001),
    };
    let addr = bind.unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], default_port)));

    itinerary_mesh::server::serve(Arc::new(service), addr)
        .await
        .with_context(|| format!("serving on {}", addr))
}

async fn discover(config: Option<PathBuf>, endpoints: Vec<String>) -> anyhow::Result<()> {
    let config = load_config(config.as_deref())?;
    let endpoints: Vec<Endpoint> = if endpoints.is_empty() {
        config.orchestrator.endpoints.clone()
    } else {
        endpoints.into_iter().map(Endpoint::new).collect()
    };

    let transport = HttpTransport::new(config.orchestrator.request_timeout())?;
    let registry = CapabilityRegistry::discover_all(&transport, &endpoints).await;

    for service in registry.services() {
        println!("{}", serde_json::to_string_pretty(service)?);
    }
    info!(
        configured = endpoints.len(),
        online = registry.online().count(),
        "discovery finished"
    );
    Ok(())
}

async fn chat(mut orchestrator: ConversationOrchestrator) -> anyhow::Result<()> {
    let operations = orchestrator.router().operations().await;
    println!("Travel assistant ready with {} operations.", operations.len());
    println!("Type 'quit' to exit, '/status' for service statistics.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        let input = line.trim();

        match input {
            "" => continue,
            "quit" | "exit" | "q" => break,
            "/status" => {
                let status = orchestrator.status().await;
                println!("{}", serde_json::to_string_pretty(&status)?);
                continue;
            }
            _ => {}
        }

        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };

        match orchestrator.respond_with_cancel(input, &cancel).await {
            Ok(reply) => println!("\nAssistant: {}\n", reply),
            Err(Error::OrchestrationExhausted { rounds }) => {
                warn!(rounds, "request not completed");
                println!("\nAssistant: {}\n", itinerary_mesh::orchestrator::EXHAUSTED_MESSAGE);
            }
            Err(Error::Cancelled) => println!("\n(cancelled)\n"),
            Err(e) => println!("\nError: {}. Please try again.\n", e),
        }
        watcher.abort();
    }

    println!("Goodbye!");
    Ok(())
}
