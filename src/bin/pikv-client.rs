//! PiKV Client Binary
//!
//! Sends one command to the server and prints the answer.

use clap::Parser;
use pikv::cli::{parse_invocation, USAGE};
use pikv::{execute_once, RetryPolicy, DEFAULT_PORT};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

/// PiKV Client
#[derive(Parser, Debug)]
#[command(name = "pikv-client")]
#[command(about = "Send one INSERT/UPDATE/DELETE/GET command to a PiKV server")]
#[command(version)]
#[command(after_help = "Options must come before the command tokens; \
anything after the first token is read as a token.")]
struct Args {
    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Seconds to keep retrying the connection
    #[arg(long, default_value_t = 30)]
    connect_timeout: u64,

    /// Milliseconds between connection attempts
    #[arg(long, default_value_t = 1000)]
    retry_delay_ms: u64,

    /// [<ip>|localhost] [<COMMAND>] <key> [<value>], in any order, after all options
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    tokens: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries only the answer or the usage text
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let invocation = match parse_invocation(&args.tokens) {
        Ok(invocation) => invocation,
        Err(e) => {
            println!("{}", e);
            println!("{}", USAGE);
            return ExitCode::from(2);
        }
    };

    let policy = RetryPolicy {
        backoff: Duration::from_millis(args.retry_delay_ms),
        budget: Duration::from_secs(args.connect_timeout),
    };
    let addr = format!("{}:{}", invocation.host, args.port);

    match execute_once(&addr, &policy, &invocation.command).await {
        Ok(answer) => {
            println!("Answer from server: {}", answer);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
