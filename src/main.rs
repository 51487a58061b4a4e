//! Binary entrypoint for the mcrouter CLI.
//!
//! Commands:
//! - `start [--bind <addr>] [--node <addr>] [--stdin]` - run the proxy
//! - `init` - write a starter `config.toml`
//! - `status` - print the effective configuration and command table
//!
//! With `--stdin`, each line `DST text` typed on the terminal is handled as if it came
//! from the local chat client (e.g. `* !wx` or `20 hello group`).
//!
//! See the library crate docs for module-level details: `mcrouter::`.
use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};

use mcrouter::config::Config;
use mcrouter::server::{ClientSubmission, Server};

#[derive(Parser)]
#[command(name = "mcrouter")]
#[command(about = "Command routing proxy for MeshCom mesh networks")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the proxy
    Start {
        /// Local UDP address the node sends to (overrides transport.bind)
        #[arg(long)]
        bind: Option<String>,

        /// UDP address of the MeshCom node (overrides transport.node_addr)
        #[arg(long)]
        node: Option<String>,

        /// Read `DST text` lines from stdin as local client input
        #[arg(long)]
        stdin: bool,
    },
    /// Write a default configuration file
    Init,
    /// Show the effective configuration
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start { bind, node, stdin } => {
            let mut config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            info!("Starting mcrouter v{}", env!("CARGO_PKG_VERSION"));

            if let Some(bind) = bind {
                config.transport.bind = bind;
            }
            if let Some(node) = node {
                config.transport.node_addr = node;
            }

            let mut server = Server::new(config);
            if stdin {
                spawn_stdin_client(server.client_sender());
            }
            server.run().await?;
        }
        Commands::Init => {
            init_logging(&None, cli.verbose);
            if tokio::fs::try_exists(&cli.config).await.unwrap_or(false) {
                warn!("{} already exists; not overwriting", cli.config);
                return Ok(());
            }
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
            println!(
                "Edit [node] callsign and admin_callsign in {} before starting.",
                cli.config
            );
        }
        Commands::Status => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            print_status(&config);
        }
    }

    Ok(())
}

fn print_status(config: &Config) {
    let t = &config.router;
    println!("mcrouter v{}", env!("CARGO_PKG_VERSION"));
    println!("  Node:            {}", config.node.callsign);
    println!("  Admin:           {}", config.node.admin_callsign);
    println!(
        "  Group replies:   {}",
        if config.node.group_responses_enabled { "on" } else { "off" }
    );
    println!(
        "  Transport:       {} <-> {}",
        config.transport.bind, config.transport.node_addr
    );
    println!("  Dedup window:    {}s", t.dedup_window_secs);
    println!(
        "  Cooldowns:       {}s short / {}s long",
        t.short_cooldown_secs, t.long_cooldown_secs
    );
    println!(
        "  Abuse guard:     {} failures in {}s -> {}s block",
        t.abuse_max_failures, t.abuse_window_secs, t.abuse_block_secs
    );
    println!(
        "  Frames:          {} x {}B, {}s apart",
        t.max_frames, t.frame_limit_bytes, t.frame_gap_secs
    );
    println!(
        "  Weather:         {}",
        if config.weather.enabled && !config.weather.api_key.is_empty() {
            config.weather.location.as_str()
        } else {
            "disabled"
        }
    );
}

/// Feed `DST text` lines from stdin to the local client channel.
fn spawn_stdin_client(tx: tokio::sync::mpsc::UnboundedSender<ClientSubmission>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim();
            let Some((dst, msg)) = line.split_once(char::is_whitespace) else {
                if !line.is_empty() {
                    eprintln!("usage: DST text   (e.g. `* !wx` or `20 hello`)");
                }
                continue;
            };
            let sub = ClientSubmission {
                dst: dst.to_string(),
                msg: msg.trim().to_string(),
            };
            if tx.send(sub).is_err() {
                break;
            }
        }
    });
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // Base level from CLI verbosity overrides config
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|c| c.logging.level.parse::<log::LevelFilter>().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);
    if let Some(cfg) = config {
        let security_path = cfg.logging.security_file.clone();
        if let Some(ref file) = cfg.logging.file {
            if let Ok(f) = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
            {
                let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));

                // Console output only when attached to a terminal
                let is_tty = atty::is(atty::Stream::Stdout);

                builder.format(move |fmt, record| {
                    let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                    let line = format!("{} [{}] {}", ts, record.level(), record.args());

                    if let Ok(mut guard) = write_mutex.lock() {
                        let _ = writeln!(guard, "{}", line);
                    }

                    if record.target() == "security" {
                        if let Some(ref sec_path) = security_path {
                            if let Ok(mut sf) = std::fs::OpenOptions::new()
                                .create(true)
                                .append(true)
                                .open(sec_path)
                            {
                                let _ = writeln!(sf, "{}", line);
                            }
                        }
                    }

                    if is_tty {
                        writeln!(fmt, "{}", line)
                    } else {
                        Ok(())
                    }
                });
                let _ = builder.try_init();
                return;
            }
        }
    }
    builder.format(|fmt, record| {
        let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
        writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
    });
    let _ = builder.try_init();
}
