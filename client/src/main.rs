use clap::{Parser, Subcommand};
use locus_core::utils::misc::get_unix_nanos_now;
use rand::Rng;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

#[derive(Parser)]
#[command(author, version, about = "Line-protocol client for the locus server herd")]
struct Cli {
    /// Server address, e.g. 127.0.0.1:10000
    #[arg(long, default_value = "127.0.0.1:10000")]
    addr: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish a position and print the AT reply
    Iamat {
        client_id: String,
        /// Concatenated signed coordinates, e.g. +34.068930-118.445127
        coords: String,
        /// Client timestamp; defaults to the current time
        timestamp: Option<String>,
    },
    /// Ask for places near a previously published position
    Whatsat {
        client_id: String,
        #[arg(default_value_t = 10.0)]
        radius_km: f64,
        #[arg(default_value_t = 5)]
        max_results: usize,
    },
    /// Send one raw line and print whatever comes back
    Raw { line: String },
    /// Send a burst of randomized IAMATs and report latency
    Load {
        #[arg(long, default_value_t = 100)]
        requests: usize,
        #[arg(long, default_value_t = 10)]
        clients: usize,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Iamat { client_id, coords, timestamp } => {
            let ts = timestamp.unwrap_or_else(now_stamp);
            one_line_roundtrip(&cli.addr, &format!("IAMAT {} {} {}", client_id, coords, ts)).await
        }
        Commands::Whatsat { client_id, radius_km, max_results } => {
            whatsat(&cli.addr, &format!("WHATSAT {} {} {}", client_id, radius_km, max_results)).await
        }
        Commands::Raw { line } => one_line_roundtrip(&cli.addr, &line).await,
        Commands::Load { requests, clients } => load(&cli.addr, requests, clients).await,
    };
    if let Err(e) = result {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn now_stamp() -> String {
    let nanos = get_unix_nanos_now();
    format!("{}.{:09}", nanos / 1_000_000_000, nanos % 1_000_000_000)
}

async fn one_line_roundtrip(addr: &str, line: &str) -> std::io::Result<()> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(format!("{}\n", line).as_bytes()).await?;
    let mut reader = BufReader::new(stream);
    let mut reply = String::new();
    reader.read_line(&mut reply).await?;
    print!("{}", reply);
    Ok(())
}

/// A WHATSAT reply is the stored AT line, a JSON document, and a blank
/// terminator line; read until the blank line shows up.
async fn whatsat(addr: &str, line: &str) -> std::io::Result<()> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(format!("{}\n", line).as_bytes()).await?;
    let mut reader = BufReader::new(stream);
    let mut buf = String::new();
    loop {
        buf.clear();
        let n = reader.read_line(&mut buf).await?;
        if n == 0 || buf == "\n" {
            break;
        }
        print!("{}", buf);
    }
    Ok(())
}

async fn load(addr: &str, requests: usize, clients: usize) -> std::io::Result<()> {
    let mut latencies: Vec<Duration> = Vec::with_capacity(requests);
    let mut failures = 0usize;
    for _ in 0..requests {
        let (client, coords) = {
            let mut rng = rand::thread_rng();
            let client = format!("client{}", rng.gen_range(1..=clients.max(1)));
            let coords = format!("{:+.6}{:+.6}", rng.gen_range(-90.0..90.0), rng.gen_range(-180.0..180.0));
            (client, coords)
        };
        let line = format!("IAMAT {} {} {}", client, coords, now_stamp());
        let started = Instant::now();
        match one_shot(addr, &line).await {
            Ok(reply) if reply.starts_with("AT ") => latencies.push(started.elapsed()),
            _ => failures += 1,
        }
    }

    if latencies.is_empty() {
        println!("no successful requests ({} failures)", failures);
        return Ok(());
    }
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    let min = latencies.iter().min().copied().unwrap_or_default();
    let max = latencies.iter().max().copied().unwrap_or_default();
    println!("requests sent: {} ({} failed)", latencies.len(), failures);
    println!("latency min/avg/max: {:?} / {:?} / {:?}", min, avg, max);
    Ok(())
}

async fn one_shot(addr: &str, line: &str) -> std::io::Result<String> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(format!("{}\n", line).as_bytes()).await?;
    let mut reader = BufReader::new(stream);
    let mut reply = String::new();
    reader.read_line(&mut reply).await?;
    Ok(reply)
}
