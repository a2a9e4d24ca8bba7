//! Tracklog CLI Tool
//!
//! Command-line interface for inspecting, converting and editing box label
//! event logs.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use tracklog_core::{
    count_objects, read_events, write_events, CommandKind, DecodeOptions, EncodeOptions,
    RecordExport, RecordFile, RenameOutcome, Timestep, TimelineStore,
};

#[derive(Parser)]
#[command(name = "tracklog")]
#[command(about = "Tracklog - diff-encoded bounding box labels for video sequences")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert an event log to a flat record file (JSON if the output ends in .json)
    Export {
        /// Input label file path
        input: PathBuf,

        /// Output record file path (.tlb or .json)
        #[arg(short, long)]
        output: PathBuf,

        /// Overwrite the output file if it exists
        #[arg(long)]
        overwrite: bool,
    },

    /// Show information about an event log
    Info {
        /// Input label file path
        input: PathBuf,

        /// Label frequency in frames per second
        #[arg(long, default_value = "200")]
        fps: u32,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Decode an event log and encode it again with other settings
    Rewrite {
        /// Input label file path
        input: PathBuf,

        /// Output label file path
        #[arg(short, long)]
        output: PathBuf,

        /// Label frequency in frames per second
        #[arg(long, default_value = "200")]
        fps: u32,

        /// Use BB_MOVE and BB_RESIZE when only one of position or size changed
        #[arg(long)]
        full_protocol: bool,

        /// Skip unchanged boxes instead of repeating them
        #[arg(long)]
        no_redundant: bool,

        /// Write boxes as untracked detections that expire after a delay
        #[arg(long)]
        untracked: bool,

        /// Delay before an untracked box is deleted, in microseconds
        #[arg(long, default_value = "100000")]
        expiry_delay: u64,

        /// Class written for boxes without one
        #[arg(long, default_value = "0")]
        default_class: u32,

        /// Only keep records produced by these commands (e.g. BB_CREATE)
        #[arg(long, value_parser = parse_command_kind, num_args = 1..)]
        keep: Vec<CommandKind>,

        /// Comment block written at the top of the output
        #[arg(long)]
        header: Option<String>,

        /// Overwrite the output file if it exists
        #[arg(long)]
        overwrite: bool,
    },

    /// Apply an edit across the timeline of an event log
    Edit {
        /// Input label file path
        input: PathBuf,

        /// Output label file path
        #[arg(short, long)]
        output: PathBuf,

        /// Label frequency in frames per second
        #[arg(long, default_value = "200")]
        fps: u32,

        /// Overwrite the output file if it exists
        #[arg(long)]
        overwrite: bool,

        #[command(subcommand)]
        action: EditAction,
    },
}

#[derive(Subcommand)]
enum EditAction {
    /// Give a new id to the contiguous run of an object around a timestamp
    RenameObject {
        #[arg(long)]
        from: u32,
        #[arg(long)]
        to: u32,
        #[arg(long)]
        at: u64,
    },

    /// Change the class of an object everywhere
    RenameClass {
        #[arg(long)]
        object: u32,
        #[arg(long)]
        class: u32,
    },

    /// Delete every instance of an object
    Purge {
        #[arg(long)]
        object: u32,
    },

    /// Delete an object after a timestamp and reopen its track
    ExpireFuture {
        #[arg(long)]
        object: u32,
        #[arg(long)]
        from: u64,
    },

    /// End the track of an object at a timestamp
    Terminate {
        #[arg(long)]
        object: u32,
        #[arg(long)]
        at: u64,
    },
}

/// Summary printed by `info`
#[derive(Serialize)]
struct LogSummary {
    frames: usize,
    first_timestamp: Option<u64>,
    last_timestamp: Option<u64>,
    objects_created: usize,
    object_ids: Vec<u32>,
    records: usize,
    open_tracks: Vec<u32>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Export {
            input,
            output,
            overwrite,
        } => export_records(&input, &output, overwrite)?,

        Commands::Info { input, fps, json } => show_info(&input, fps, json)?,

        Commands::Rewrite {
            input,
            output,
            fps,
            full_protocol,
            no_redundant,
            untracked,
            expiry_delay,
            default_class,
            keep,
            header,
            overwrite,
        } => {
            let options = EncodeOptions {
                redundant: !no_redundant,
                full_protocol,
                tracked: !untracked,
                expiry_delay,
                default_class_id: default_class,
                header,
            };
            let keep = (!keep.is_empty()).then_some(keep);
            let store = load_store(&input, fps, keep)?;
            save_store(&output, &store, &options, overwrite)?;
        }

        Commands::Edit {
            input,
            output,
            fps,
            overwrite,
            action,
        } => {
            let mut store = load_store(&input, fps, None)?;
            apply_edit(&mut store, action, timestep(fps)?)?;
            save_store(&output, &store, &EncodeOptions::default(), overwrite)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "tracklog=debug" } else { "tracklog=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    }
}

fn parse_command_kind(value: &str) -> std::result::Result<CommandKind, String> {
    value
        .parse()
        .map_err(|command| format!("unknown command '{}'", command))
}

fn timestep(fps: u32) -> Result<Timestep> {
    Timestep::from_fps(fps).context("Invalid frame rate")
}

fn load_store(path: &Path, fps: u32, keep: Option<Vec<CommandKind>>) -> Result<TimelineStore> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open label file {}", path.display()))?;
    let options = DecodeOptions {
        timestep: timestep(fps)?,
        keep,
    };
    let store = read_events(BufReader::new(file), &options)
        .with_context(|| format!("Failed to read label file {}", path.display()))?;

    info!(
        frames = store.len(),
        objects = store.object_ids().len(),
        "loaded {}",
        path.display()
    );
    Ok(store)
}

fn save_store(
    path: &Path,
    store: &TimelineStore,
    options: &EncodeOptions,
    overwrite: bool,
) -> Result<()> {
    ensure_writable(path, overwrite)?;
    let file = File::create(path)
        .with_context(|| format!("Failed to create output file {}", path.display()))?;
    let events = write_events(BufWriter::new(file), store, options)
        .context("Failed to write label file")?;

    info!(events, "wrote {}", path.display());
    Ok(())
}

fn ensure_writable(path: &Path, overwrite: bool) -> Result<()> {
    if path.exists() && !overwrite {
        bail!(
            "{} already exists, pass --overwrite to replace it",
            path.display()
        );
    }
    Ok(())
}

fn export_records(input: &Path, output: &Path, overwrite: bool) -> Result<()> {
    ensure_writable(output, overwrite)?;

    let file = File::open(input)
        .with_context(|| format!("Failed to open label file {}", input.display()))?;
    let export = RecordExport::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to read label file {}", input.display()))?;

    let file = File::create(output)
        .with_context(|| format!("Failed to create output file {}", output.display()))?;
    if output.extension().is_some_and(|ext| ext == "json") {
        serde_json::to_writer_pretty(BufWriter::new(file), &export.records)
            .context("Failed to write JSON records")?;
    } else {
        RecordFile::new(export.records.clone())
            .write(BufWriter::new(file))
            .context("Failed to write record file")?;
    }

    if !export.open_tracks.is_empty() {
        warn!(
            "{} objects were never deleted: {:?}",
            export.open_tracks.len(),
            export.open_tracks
        );
    }
    println!(
        "Exported {} records to {}",
        export.records.len(),
        output.display()
    );
    Ok(())
}

fn show_info(input: &Path, fps: u32, json: bool) -> Result<()> {
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read label file {}", input.display()))?;

    let store = read_events(Cursor::new(&text), &DecodeOptions::new(timestep(fps)?))
        .context("Failed to decode label file")?;
    let export = RecordExport::from_reader(Cursor::new(&text)).context("Failed to flatten records")?;

    let summary = LogSummary {
        frames: store.len(),
        first_timestamp: store.timestamps().next(),
        last_timestamp: store.timestamps().last(),
        objects_created: count_objects(Cursor::new(&text))?,
        object_ids: store.object_ids().into_iter().collect(),
        records: export.records.len(),
        open_tracks: export.open_tracks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("\n=== Label File Information ===");
    println!("File: {}", input.display());
    println!("Frames: {}", summary.frames);
    if let (Some(first), Some(last)) = (summary.first_timestamp, summary.last_timestamp) {
        println!("Time range: {} us to {} us", first, last);
    }
    println!("Objects created: {}", summary.objects_created);
    println!("Distinct object ids: {}", summary.object_ids.len());
    println!("Box updates: {}", summary.records);
    if summary.open_tracks.is_empty() {
        println!("Open tracks: none");
    } else {
        println!("Open tracks: {:?}", summary.open_tracks);
    }
    Ok(())
}

fn apply_edit(store: &mut TimelineStore, action: EditAction, timestep: Timestep) -> Result<()> {
    match action {
        EditAction::RenameObject { from, to, at } => {
            match store.rename_object(from, to, at, timestep) {
                RenameOutcome::Renamed { frames } => {
                    println!("Renamed object {} to {} in {} frames", from, to, frames)
                }
                RenameOutcome::Collision => {
                    bail!("object {} already exists at timestamp {}", to, at)
                }
            }
        }
        EditAction::RenameClass { object, class } => {
            let changed = store.rename_class(object, class);
            println!("Set class {} on {} records of object {}", class, changed, object);
        }
        EditAction::Purge { object } => {
            let removed = store.purge_object(object);
            println!("Removed {} records of object {}", removed, object);
        }
        EditAction::ExpireFuture { object, from } => {
            let removed = store.expire_future(object, from);
            println!(
                "Removed {} records of object {} after {}",
                removed, object, from
            );
        }
        EditAction::Terminate { object, at } => {
            let removed = store.terminate_track(object, at, timestep);
            println!(
                "Ended track of object {} at {} ({} later records removed)",
                object, at, removed
            );
        }
    }
    Ok(())
}
