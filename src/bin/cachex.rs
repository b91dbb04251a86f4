//! Command-line client for the cache facade.
//!
//! Builds the backend named by the flags, runs one operation and tears the
//! cache down again.
//!
//! ```bash
//! cachex --backend embedded --path /tmp/cache set jwt abc revoked --ttl-ms 60000
//! cachex --backend embedded --path /tmp/cache list jwt
//! ```

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use cachex::cli::{Cli, ClientCommand};
use cachex::{open_cache, Bytes, Cache, CacheResult};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let (cache, teardown) = match open_cache(&cli.backend.settings()).await {
        Ok(opened) => opened,
        Err(err) => {
            tracing::error!(error = %err, "failed to open cache");
            return ExitCode::FAILURE;
        }
    };

    let result = run(&cache, &cli.command).await;
    teardown.run().await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "command failed");
            ExitCode::FAILURE
        }
    }
}

/// Run one command and print its result to stdout.
async fn run(cache: &Arc<dyn Cache>, command: &ClientCommand) -> CacheResult<()> {
    match command {
        ClientCommand::Set {
            namespace,
            key,
            value,
            ..
        } => {
            cache
                .set(namespace, key, Bytes::from(value.clone()), command.ttl())
                .await?;
            println!("OK");
        }

        ClientCommand::Get { namespace, key } => {
            print_value(cache.get(namespace, key).await?);
        }

        ClientCommand::Take { namespace, key } => {
            print_value(cache.get_and_delete(namespace, key).await?);
        }

        ClientCommand::Exists { namespace, key } => {
            println!("{}", cache.exists(namespace, key).await?);
        }

        ClientCommand::Delete { namespace, key } => {
            cache.delete(namespace, key).await?;
            println!("OK");
        }

        ClientCommand::List { namespace, limit } => {
            let limit = limit.unwrap_or(usize::MAX);
            let mut shown = 0usize;
            cache
                .iterate(namespace, &mut |key: &str, value: &Bytes| {
                    if shown >= limit {
                        return false;
                    }
                    println!("{}\t{}", key, render(value));
                    shown += 1;
                    true
                })
                .await?;
        }

        ClientCommand::Stats => {
            let stats = cache.stats();
            println!(
                "hits:{} misses:{} sets:{} deletes:{} expirations:{} hit_rate:{:.1}%",
                stats.hits,
                stats.misses,
                stats.sets,
                stats.deletes,
                stats.expirations,
                stats.hit_rate
            );
        }
    }
    Ok(())
}

fn print_value(value: Option<Bytes>) {
    match value {
        Some(value) => println!("{}", render(&value)),
        None => println!("(nil)"),
    }
}

fn render(value: &Bytes) -> String {
    match std::str::from_utf8(value) {
        Ok(s) => s.to_string(),
        Err(_) => format!("(binary data: {} bytes)", value.len()),
    }
}
