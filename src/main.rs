//! # chatdb CLI
//!
//! Command-line interface for the chatdb library.

use std::fs::File;
use std::io::BufWriter;
use std::process;
use std::time::Instant;

use clap::Parser as ClapParser;
use log::info;

use chatdb::cli::Args;
use chatdb::ingest::{Ingestion, Input, Step};
use chatdb::progress::stderr_progress;
use chatdb::ChatDbError;

fn main() {
    let args = <Args as ClapParser>::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(if args.quiet {
        "error"
    } else {
        "warn"
    }))
    .init();

    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), ChatDbError> {
    let total_start = Instant::now();

    if !args.quiet {
        println!("chatdb v{}", env!("CARGO_PKG_VERSION"));
        println!("Platform: {}", args.platform);
        println!("Inputs:   {} file(s)", args.inputs.len());
        println!("Output:   {}", args.output.display());
        println!();
    }

    let inputs = args.inputs.iter().map(Input::path).collect();
    let mut ingestion = Ingestion::new(args.ingest_config(), args.build_config()?, inputs)?;

    let report = stderr_progress();
    for step in ingestion.by_ref() {
        match step? {
            Step::FileStarted { index, name } if !args.quiet => {
                println!("[{}/{}] {}", index + 1, args.inputs.len(), name);
            }
            Step::Progress(progress) if !args.quiet => report(&progress),
            Step::FileDone { .. } if !args.quiet => eprintln!(),
            _ => {}
        }
    }
    let parse_time = total_start.elapsed();

    let build_start = Instant::now();
    let db = ingestion.finish()?;
    info!("Built database in {:.2}s", build_start.elapsed().as_secs_f64());

    let writer = BufWriter::new(File::create(&args.output)?);
    serde_json::to_writer(writer, &db)?;

    if !args.quiet {
        println!();
        println!("Done! Database saved to {}", args.output.display());
        println!();
        println!("Summary:");
        println!("   Title:     {}", db.title);
        println!("   Messages:  {}", db.num_messages());
        println!("   Channels:  {}", db.channels.len());
        println!("   Authors:   {}", db.authors.len());
        println!("   Words:     {}", db.words.len());
        println!("   Days:      {} ({} to {})", db.time.num_days, db.time.min_date, db.time.max_date);
        println!("   Stream:    {} bytes", db.serialized().len());
        println!();
        println!("Performance:");
        println!("   Parsing:   {:.2}s", parse_time.as_secs_f64());
        println!("   Total:     {:.2}s", total_start.elapsed().as_secs_f64());
    }

    Ok(())
}
