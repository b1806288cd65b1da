//! Entry point for `noisy-link`.
//!
//! Parses CLI arguments and dispatches into one of the three roles.  All
//! protocol work is delegated to library modules; `main.rs` owns only
//! process setup (logging, argument parsing) and the interactive control
//! loops for the long-running roles.

use std::net::SocketAddr;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use noisy_link::codec::Algorithm;
use noisy_link::corrupt::Strategy;
use noisy_link::receiver::{Receiver, ReceiverConfig, StatsSnapshot, DEFAULT_RECEIVER_ADDR};
use noisy_link::relay::{Relay, RelayConfig, DEFAULT_RELAY_ADDR};
use noisy_link::sender;

/// Error-detection demo: sender, corrupting relay, verifying receiver.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    role: Role,
}

#[derive(Subcommand)]
enum Role {
    /// Build a packet and send it through the relay.
    Sender {
        /// Relay address to connect to.
        #[arg(short, long, default_value = DEFAULT_RELAY_ADDR)]
        relay: SocketAddr,
        /// Control-code algorithm (name or 1-5).
        #[arg(short, long, default_value = "CRC16")]
        algorithm: String,
        /// Payload text to send.
        text: String,
    },
    /// Run the corrupting relay.
    Relay {
        /// Local address to listen on.
        #[arg(short, long, default_value = DEFAULT_RELAY_ADDR)]
        bind: SocketAddr,
        /// Receiver address to forward corrupted packets to.
        #[arg(short, long, default_value = DEFAULT_RECEIVER_ADDR)]
        forward: SocketAddr,
        /// Corruption strategy active at startup (name or 1-8).
        #[arg(short, long, default_value = "1")]
        strategy: String,
        /// Fixed RNG seed for reproducible corruption.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Run the verifying receiver.
    Receiver {
        /// Local address to listen on.
        #[arg(short, long, default_value = DEFAULT_RECEIVER_ADDR)]
        bind: SocketAddr,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();
    match cli.role {
        Role::Sender {
            relay,
            algorithm,
            text,
        } => run_sender(relay, &algorithm, &text).await,
        Role::Relay {
            bind,
            forward,
            strategy,
            seed,
        } => run_relay(bind, forward, &strategy, seed).await,
        Role::Receiver { bind } => run_receiver(bind).await,
    }
}

async fn run_sender(relay: SocketAddr, algorithm: &str, text: &str) -> anyhow::Result<()> {
    let algorithm: Algorithm = algorithm.parse()?;
    let delivery = sender::send_text(relay, text, algorithm)
        .await
        .with_context(|| format!("sending to relay at {relay}"))?;

    println!("data      : {}", delivery.packet.data);
    println!("algorithm : {}", delivery.packet.algorithm);
    println!("control   : {}", delivery.packet.control);
    println!("reply     : {}", delivery.reply);
    Ok(())
}

async fn run_relay(
    bind: SocketAddr,
    forward: SocketAddr,
    strategy: &str,
    seed: Option<u64>,
) -> anyhow::Result<()> {
    let strategy: Strategy = strategy.parse()?;
    let mut config = RelayConfig::new(bind, forward);
    config.strategy = strategy;
    config.seed = seed;

    let relay = Relay::bind(config).await.context("binding relay listener")?;
    let addr = relay.local_addr()?;
    println!("relay listening on {addr}, forwarding to {forward}");
    println!("active strategy: {strategy}");
    println!("commands: 1-8 select strategy | q quit");

    let handle = relay.run();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => match line? {
                None => {
                    // stdin closed; keep serving until interrupted.
                    let _ = tokio::signal::ctrl_c().await;
                    break;
                }
                Some(line) => {
                    let cmd = line.trim();
                    if cmd.is_empty() {
                        continue;
                    }
                    if cmd.eq_ignore_ascii_case("q") {
                        break;
                    }
                    match cmd.parse::<Strategy>() {
                        Ok(selected) => {
                            handle.set_strategy(selected);
                            println!("active strategy: {selected}");
                        }
                        Err(e) => println!("{e} (1-8 select strategy, q quits)"),
                    }
                }
            }
        }
    }

    handle.shutdown().await;
    println!("relay stopped");
    Ok(())
}

async fn run_receiver(bind: SocketAddr) -> anyhow::Result<()> {
    let receiver = Receiver::bind(ReceiverConfig::new(bind))
        .await
        .context("binding receiver listener")?;
    let addr = receiver.local_addr()?;
    println!("receiver listening on {addr}");
    println!("commands: s stats | q quit");

    let handle = receiver.run();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => match line? {
                None => {
                    let _ = tokio::signal::ctrl_c().await;
                    break;
                }
                Some(line) => {
                    let cmd = line.trim();
                    if cmd.eq_ignore_ascii_case("s") {
                        print_stats(handle.stats());
                    } else if cmd.eq_ignore_ascii_case("q") {
                        break;
                    } else if !cmd.is_empty() {
                        println!("commands: s stats | q quit");
                    }
                }
            }
        }
    }

    let final_stats = handle.shutdown().await;
    print_stats(final_stats);
    println!("receiver stopped");
    Ok(())
}

fn print_stats(stats: StatsSnapshot) {
    println!("received  : {}", stats.received);
    println!("valid     : {}", stats.valid);
    println!("corrupted : {}", stats.corrupted);
    println!("error rate: {:.1}%", stats.error_rate() * 100.0);
}
