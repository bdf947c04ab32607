//! Read control network files and print graph statistics
//!
//! # Usage
//!
//! ```bash
//! # Statistics for one or more networks
//! cargo run --release --bin cnet_stats -- mars_a.cnet mars_b.cnet
//!
//! # Tune the reader
//! cargo run --release --bin cnet_stats -- --threads 8 --config reader.json net.cnet
//!
//! # Re-encode a network after reading it
//! cargo run --release --bin cnet_stats -- --rewrite clean.cnet net.cnet
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use control_net::{
    codec, ConcurrentNetworkReader, NetworkGraph, ReadEvent, ReaderConfig, ReaderState,
};
use crossbeam_channel::RecvTimeoutError;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use uom::si::length::kilometer;

#[derive(Parser, Debug)]
#[command(
    name = "cnet_stats",
    about = "Read control networks and print graph statistics",
    long_about = None
)]
struct Args {
    /// Network files to read
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Reader configuration (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Point builder threads (overrides the config file)
    #[arg(short, long)]
    threads: Option<usize>,

    /// Write the graph back out to this path (single input only)
    #[arg(long)]
    rewrite: Option<PathBuf>,
}

fn state_label(state: ReaderState) -> &'static str {
    match state {
        ReaderState::Idle => "idle",
        ReaderState::ReadingFile => "reading file",
        ReaderState::BuildingGraph => "building graph",
        ReaderState::Done => "done",
        ReaderState::Failed => "failed",
    }
}

/// Drive the progress bar from reader events until the worker stops.
fn follow_progress(reader: &ConcurrentNetworkReader, name: &str) {
    let events = reader.events();
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap()
            .progress_chars("=>-"),
    );
    pb.set_message(format!("{name}: waiting"));

    let handle = |event: ReadEvent| match event {
        ReadEvent::StateChanged(state) => {
            pb.set_message(format!("{name}: {}", state_label(state)));
        }
        ReadEvent::ProgressRange { min, max } => {
            pb.set_length((max - min) as u64);
            pb.set_position(0);
        }
        ReadEvent::Progress(done) => pb.set_position(done as u64),
        ReadEvent::Finished { .. } => pb.finish_with_message(format!("{name}: done")),
        ReadEvent::Failed(msg) => pb.abandon_with_message(format!("{name}: {msg}")),
    };

    loop {
        match events.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => handle(event),
            Err(RecvTimeoutError::Timeout) if reader.is_finished() => break,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    events.try_iter().for_each(handle);
}

fn print_statistics(path: &Path, graph: &NetworkGraph) {
    let header = graph.header();
    println!("\n{}", path.display());
    println!("{}", "=".repeat(path.display().to_string().len()));
    println!("Network id:       {}", header.network_id);
    println!("Target:           {}", header.target_name);
    if !header.description.is_empty() {
        println!("Description:      {}", header.description);
    }
    println!("User:             {}", header.user_name);
    println!("Created:          {}", header.created);
    println!("Last modified:    {}", header.last_modified);
    if let Some(radii) = graph.target_radii() {
        println!(
            "Radii (km):       {:.3} equatorial, {:.3} polar",
            radii.equatorial.get::<kilometer>(),
            radii.polar.get::<kilometer>()
        );
    }
    println!();
    println!(
        "Points:           {} ({} valid)",
        graph.num_points(),
        graph.num_valid_points()
    );
    println!(
        "Measures:         {} ({} valid)",
        graph.num_measures(),
        graph.num_valid_measures()
    );
    println!("Images:           {}", graph.num_nodes());

    let islands = graph.islands();
    println!("Islands:          {}", islands.len());
    if islands.len() > 1 {
        let sizes: Vec<usize> = islands.iter().map(Vec::len).collect();
        println!("Island sizes:     {sizes:?}");
    }
    println!("Mean residual:    {:.4} px", graph.average_residual());
    println!("Max residual:     {:.4} px", graph.maximum_residual());
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    if args.rewrite.is_some() && args.files.len() != 1 {
        return Err("--rewrite needs exactly one input file".into());
    }

    let mut config = match &args.config {
        Some(path) => ReaderConfig::load_from_file(path)?,
        None => ReaderConfig::default(),
    };
    if let Some(threads) = args.threads {
        config = config.with_map_threads(threads);
    }
    config.validate()?;
    info!(
        "Reading {} network(s) with {} point builders",
        args.files.len(),
        config.effective_map_threads()
    );

    let mut reader = ConcurrentNetworkReader::new(config);
    let mut failures = 0;
    for path in &args.files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        reader.read(path)?;
        follow_progress(&reader, &name);

        match reader.wait() {
            Ok(graph) => {
                print_statistics(path, &graph);
                if let Some(out) = &args.rewrite {
                    codec::write_network(out, &graph)?;
                    println!("\nRewrote network to {}", out.display());
                }
            }
            Err(e) => {
                eprintln!("{}: {e}", path.display());
                failures += 1;
            }
        }
    }

    if failures > 0 {
        return Err(format!("{failures} of {} networks failed to read", args.files.len()).into());
    }
    Ok(())
}
