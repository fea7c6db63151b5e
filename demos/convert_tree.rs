//! Example converting a whole directory tree.
//!
//! Usage: `cargo run --example convert_tree -- <root> [output] [formats]`
//!
//! `formats` is a comma separated list such as `cbz,pdf,epub` and defaults to `cbz`.
//! Archives found below the root are converted as well. Press Ctrl+C to stop
//! after the unit currently being processed.

use hako::prelude::*;
use std::str::FromStr;

#[tokio::main]
async fn main() -> hako::error::Result<()> {
    let mut args = std::env::args().skip(1);
    let Some(root) = args.next() else {
        eprintln!("usage: convert_tree <root> [output] [formats]");
        return Ok(());
    };
    let output = args.next();
    let formats = args
        .next()
        .unwrap_or_else(|| "cbz".to_string())
        .split(',')
        .map(TargetFormat::from_str)
        .collect::<hako::error::Result<Vec<_>>>()?;

    println!("=== Hako Tree Conversion ===\n");

    let mut builder = HakoConfig::builder();
    builder
        .root_path(PathBuf::from(root))
        .formats(formats)
        .process_archives(true);
    if let Some(output) = output {
        builder.output_path(PathBuf::from(output));
    }
    let config = builder.build()?;
    config.preflight_check()?;

    let sinks = RunSinks::new()
        .with_progress(|done, total, label| println!("[{:>3}/{:<3}] {}", done, total, label))
        .with_log(|message| println!("  {}", message));

    let handle = config.spawn(sinks);
    let cancel = handle_cancellation(&handle);
    let summary = handle.join().await?;
    cancel.abort();

    println!();
    println!("Attempted: {}", summary.attempted);
    println!("Succeeded: {}", summary.succeeded);
    println!("Failed:    {}", summary.failed);
    if summary.cancelled {
        println!("Run was cancelled.");
    }
    if let Some(error) = summary.last_error {
        println!("Last error: {}", error);
    }
    Ok(())
}

fn handle_cancellation(handle: &RunHandle) -> tokio::task::JoinHandle<()> {
    let flag = handle.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("Stopping after the current unit...");
            flag.cancel();
        }
    })
}
