//! kvstore CLI Client
//!
//! Command-line interface for interacting with a kvstore server.

use std::process::ExitCode;
use std::thread;
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};
use kvstore::{KvClient, KvError, Result};

/// kvstore CLI
#[derive(Parser, Debug)]
#[command(name = "kvstore-cli")]
#[command(about = "CLI for the kvstore key-value service")]
#[command(version)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:12345")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Put {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// List records in key order
    Scan {
        /// First key to include
        #[arg(long)]
        start: Option<String>,

        /// Maximum number of records
        #[arg(long)]
        limit: Option<u64>,
    },

    /// Request a zero-filled payload of the given size
    Warmup {
        size: u32,
    },

    /// Drive load against the server and report throughput
    Bench(BenchArgs),
}

#[derive(clap::Args, Debug)]
struct BenchArgs {
    /// Operation to issue
    #[arg(long, value_enum, default_value_t = BenchCmd::Put)]
    cmd: BenchCmd,

    /// Rounds per client thread
    #[arg(long, default_value_t = 10)]
    repeat: usize,

    /// Operations per round
    #[arg(long, default_value_t = 10_000)]
    batch_size: usize,

    /// Key size in bytes
    #[arg(long, default_value_t = 64)]
    key_size: usize,

    /// Value size in bytes (also the warmup response size)
    #[arg(long, default_value_t = 1024)]
    val_size: usize,

    /// Concurrent client connections
    #[arg(long, default_value_t = 4)]
    threads: usize,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum BenchCmd {
    Put,
    Get,
    Warmup,
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    if let Commands::Bench(bench_args) = &args.command {
        return bench(&args.server, bench_args);
    }

    let mut client = KvClient::connect(&args.server)?;

    match &args.command {
        Commands::Get { key } => match client.get_value(key.as_bytes()) {
            Ok(value) => println!("{}", String::from_utf8_lossy(&value)),
            Err(KvError::KeyNotFound) => println!("(nil)"),
            Err(e) => return Err(e),
        },
        Commands::Put { key, value } => {
            let status = client.put(key.as_bytes(), value.as_bytes())?;
            println!("{:?}", status);
        }
        Commands::Del { key } => {
            let status = client.delete(key.as_bytes())?;
            println!("{:?}", status);
        }
        Commands::Scan { start, limit } => {
            let records = client.scan(start.as_deref().map(str::as_bytes), *limit)?;
            for record in &records {
                println!(
                    "{} => {}",
                    String::from_utf8_lossy(&record.key),
                    String::from_utf8_lossy(&record.value)
                );
            }
            println!("({} records)", records.len());
        }
        Commands::Warmup { size } => {
            let data = client.warmup(*size)?;
            println!("received {} bytes", data.len());
        }
        Commands::Bench(_) => {}
    }

    Ok(())
}

/// Fixed-width key for operation `n` of client `client`
fn bench_key(client: usize, n: usize, size: usize) -> Vec<u8> {
    let mut key = format!("k{:04}-{:012}", client, n).into_bytes();
    key.resize(size.max(key.len()), b'x');
    key
}

fn bench(server: &str, args: &BenchArgs) -> Result<()> {
    let warmup_size = u32::try_from(args.val_size)
        .map_err(|_| KvError::Config(format!("value size {} too large", args.val_size)))?;

    let started = Instant::now();
    let handles: Vec<_> = (0..args.threads)
        .map(|id| {
            let server = server.to_string();
            let cmd = args.cmd;
            let (repeat, batch, key_size, val_size) =
                (args.repeat, args.batch_size, args.key_size, args.val_size);

            thread::spawn(move || -> Result<usize> {
                let mut client = KvClient::connect(server)?;
                let value = vec![b'v'; val_size];
                let mut ops = 0;

                for _ in 0..repeat {
                    for n in 0..batch {
                        match cmd {
                            BenchCmd::Put => {
                                client.put(&bench_key(id, n, key_size), &value)?;
                            }
                            BenchCmd::Get => {
                                client.get(&bench_key(id, n, key_size))?;
                            }
                            BenchCmd::Warmup => {
                                client.warmup(warmup_size)?;
                            }
                        }
                        ops += 1;
                    }
                }
                Ok(ops)
            })
        })
        .collect();

    let mut total = 0;
    for handle in handles {
        total += handle
            .join()
            .map_err(|_| KvError::Server("bench client thread panicked".to_string()))??;
    }

    let elapsed = started.elapsed().as_secs_f64();
    println!(
        "{:?}: {} ops in {:.2}s ({:.0} ops/sec, {} clients)",
        args.cmd,
        total,
        elapsed,
        total as f64 / elapsed.max(f64::EPSILON),
        args.threads
    );
    Ok(())
}
