//! # chatvault CLI
//!
//! Thin binary over the library: resolve settings, run the pipeline, print
//! the summary. Logging is initialized here and only here.

use std::process;
use std::time::Instant;

use clap::Parser as ClapParser;
use tracing_subscriber::EnvFilter;

use chatvault::cli::Args;
use chatvault::{ChatvaultError, Pipeline};

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), ChatvaultError> {
    let args = Args::parse();
    init_logging(args.verbose);

    let settings = args.into_settings()?;
    println!("chatvault v{}", env!("CARGO_PKG_VERSION"));
    println!("Exports: {}", settings.html_dir.display());
    println!("Media:   {}", settings.media_dir.display());
    println!("Output:  {}", settings.output_dir.display());
    println!();

    let start = Instant::now();
    let mut pipeline = Pipeline::new(settings)?;
    // Conversion and transcription need an encoder/transcriber wired in by
    // an embedding application; the CLI runs the file-level stages.
    let stats = pipeline.run(None, None)?;

    println!("{stats}");
    println!("Elapsed:        {:.2}s", start.elapsed().as_secs_f64());
    Ok(())
}

/// Default to `info`; `-v` means debug, `-vv` trace. `RUST_LOG` wins when
/// set.
fn init_logging(verbosity: u8) {
    let default = match verbosity {
        0 => "chatvault=info",
        1 => "chatvault=debug",
        _ => "chatvault=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
