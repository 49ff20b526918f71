//! Archivist CLI
//!
//! Thin front end over [`ArchivalEngine`]: each subcommand calls one engine
//! operation and prints the result as text or JSON.

use anyhow::{Context, Result};
use archivist::{
    ArchivalEngine, ArchiveConfig, ArchiveError, ArchiveId, ArchiveRecord, ChainIssue,
    ChainReport, HashAlgorithm, ListOptions, Properties, StoreOptions, VerificationResult,
};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "archivist")]
#[command(about = "Store, retrieve and verify archived payloads")]
struct Args {
    /// Archive root directory (overrides the config file)
    #[arg(short = 'r', long)]
    root: Option<PathBuf>,

    /// Path to a TOML config file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Print JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Archive a file
    Store {
        file: PathBuf,

        /// Filename to record (defaults to the file's name)
        #[arg(long)]
        name: Option<String>,

        /// MIME type (defaults to one derived from the filename)
        #[arg(long)]
        mime: Option<String>,

        /// Tag to attach; may be repeated
        #[arg(short = 't', long = "tag")]
        tags: Vec<String>,

        /// Property as key=value; value is parsed as JSON, else kept as a string
        #[arg(short = 'p', long = "prop", value_parser = parse_property)]
        properties: Vec<(String, serde_json::Value)>,

        /// Digest algorithm: sha256, sha512 or md5
        #[arg(short = 'a', long)]
        algorithm: Option<HashAlgorithm>,
    },

    /// Write an item's bytes to a file or stdout
    Retrieve {
        id: ArchiveId,

        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Skip the integrity check
        #[arg(long)]
        no_verify: bool,

        /// Record the access time
        #[arg(long)]
        touch: bool,
    },

    /// Show an item's record
    Get { id: ArchiveId },

    /// List records, newest first
    List {
        /// Required tag; may be repeated
        #[arg(short = 't', long = "tag")]
        tags: Vec<String>,

        #[arg(long)]
        mime_prefix: Option<String>,

        /// RFC 3339 lower bound on archive time (inclusive)
        #[arg(long)]
        after: Option<DateTime<Utc>>,

        /// RFC 3339 upper bound on archive time (inclusive)
        #[arg(long)]
        before: Option<DateTime<Utc>>,

        #[arg(long, default_value_t = 0)]
        offset: usize,

        #[arg(long, default_value_t = archivist::core::query::DEFAULT_LIST_LIMIT)]
        limit: usize,
    },

    /// Delete an item and its blob
    Delete { id: ArchiveId },

    /// Verify one item, or every item when no id is given
    Verify {
        id: Option<ArchiveId>,

        /// Check the digest chain linking all records instead
        #[arg(long, conflicts_with = "id")]
        chain: bool,
    },

    /// Change an item's tags
    Tag {
        id: ArchiveId,

        /// Tag to add; may be repeated
        #[arg(long = "add")]
        add: Vec<String>,

        /// Replace all tags with these; may be repeated
        #[arg(long = "set", conflicts_with = "add")]
        set: Vec<String>,

        /// Remove all tags
        #[arg(long, conflicts_with_all = ["add", "set"])]
        clear: bool,
    },

    /// Show archive totals
    Stats,

    /// List blobs no record refers to
    Orphans,
}

fn parse_property(s: &str) -> std::result::Result<(String, serde_json::Value), String> {
    let (key, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    if key.is_empty() {
        return Err(format!("property key cannot be empty in '{}'", s));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.into()));
    Ok((key.to_string(), value))
}

fn load_config(args: &Args) -> Result<ArchiveConfig> {
    let mut config = match &args.config {
        Some(path) => ArchiveConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ArchiveConfig::default(),
    };
    if let Some(root) = &args.root {
        config = config.with_root(root);
    }
    Ok(config)
}

fn format_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_record(record: &ArchiveRecord) {
    let meta = &record.metadata;
    println!("id:        {}", record.id);
    println!("filename:  {}", meta.filename);
    println!("mime:      {}", meta.mime_type);
    println!("size:      {} bytes", meta.size_bytes);
    println!("archived:  {}", format_time(&meta.archived_at));
    if let Some(accessed) = &meta.last_accessed_at {
        println!("accessed:  {}", format_time(accessed));
    }
    println!(
        "digest:    {}:{}",
        record.integrity.algorithm, record.integrity.digest_hex
    );
    println!("verified:  {}", format_time(&record.integrity.verified_at));
    println!("key:       {}", record.storage_key);
    if !meta.tags.is_empty() {
        println!("tags:      {}", meta.tags.join(", "));
    }
    for (key, value) in &meta.properties {
        println!("prop:      {} = {}", key, value);
    }
}

fn print_verification(id: &ArchiveId, result: &VerificationResult) {
    if result.valid {
        println!("[{}] OK ({})", id, result.algorithm);
    } else if let Some(error) = &result.error {
        println!("[{}] ERROR {}", id, error);
    } else {
        println!(
            "[{}] MISMATCH {} expected {} actual {}",
            id, result.algorithm, result.expected, result.actual
        );
    }
}

fn print_chain_report(report: &ChainReport) {
    for issue in &report.issues {
        match issue {
            ChainIssue::Tampered {
                id,
                expected,
                actual,
            } => println!("[{}] TAMPERED link expected {} stored {}", id, expected, actual),
            ChainIssue::MissingPredecessor { id, prev } => {
                println!("[{}] BROKEN link to missing {}", id, prev)
            }
            ChainIssue::Fork { prev, ids } => {
                let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
                println!("FORK at {}: {}", prev, ids.join(", "))
            }
        }
    }
    println!(
        "{} links checked, {} unchained, {} issues",
        report.length,
        report.unchained,
        report.issues.len()
    );
    if let Some(head) = &report.head {
        println!("head: {}", head);
    }
}

/// Run the selected command; `Ok(false)` means it completed but found problems
fn run(args: Args) -> Result<bool> {
    let config = load_config(&args)?;
    debug!("Using archive root {:?}", config.root);
    let engine = ArchivalEngine::open(config)?;

    match args.command {
        Command::Store {
            file,
            name,
            mime,
            tags,
            properties,
            algorithm,
        } => {
            let payload = std::fs::read(&file).map_err(|e| {
                ArchiveError::InvalidInput(format!("cannot read {}: {}", file.display(), e))
            })?;
            let filename = name.or_else(|| {
                file.file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string)
            });

            let mut options = StoreOptions::new().tags(tags);
            options.filename = filename;
            options.mime_type = mime;
            options.hash_algorithm = algorithm;
            options.properties = properties.into_iter().collect::<Properties>();

            let record = engine.store(&payload, options)?;
            if args.json {
                print_json(&record)?;
            } else {
                println!(
                    "Archived {} ({} bytes, {})",
                    record.id, record.metadata.size_bytes, record.metadata.mime_type
                );
            }
        }

        Command::Retrieve {
            id,
            output,
            no_verify,
            touch,
        } => {
            let mut options = engine.default_retrieve_options();
            if no_verify {
                options.verify_integrity = false;
            }
            options.update_access_time = touch;

            let bytes = engine.retrieve(&id, options)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &bytes)
                        .with_context(|| format!("writing {}", path.display()))?;
                    info!("Wrote {} bytes to {:?}", bytes.len(), path);
                }
                None => {
                    let mut stdout = std::io::stdout().lock();
                    stdout.write_all(&bytes)?;
                    stdout.flush()?;
                }
            }
        }

        Command::Get { id } => {
            let record = engine
                .get_record(&id)?
                .ok_or(ArchiveError::RecordNotFound(id))?;
            if args.json {
                print_json(&record)?;
            } else {
                print_record(&record);
            }
        }

        Command::List {
            tags,
            mime_prefix,
            after,
            before,
            offset,
            limit,
        } => {
            let options = ListOptions {
                tags,
                mime_type_prefix: mime_prefix,
                archived_after: after,
                archived_before: before,
                offset,
                limit,
            };
            let result = engine.list(&options)?;
            if args.json {
                print_json(&result)?;
            } else {
                for record in &result.items {
                    let meta = &record.metadata;
                    println!(
                        "{}  {}  {:>10}  {}  {}",
                        record.id,
                        format_time(&meta.archived_at),
                        meta.size_bytes,
                        meta.filename,
                        meta.tags.join(",")
                    );
                }
                println!(
                    "Showing {} of {}{}",
                    result.items.len(),
                    result.total,
                    if result.has_more { " (more available)" } else { "" }
                );
            }
        }

        Command::Delete { id } => {
            engine.delete(&id)?;
            if args.json {
                print_json(&serde_json::json!({ "deleted": id }))?;
            } else {
                println!("Deleted {}", id);
            }
        }

        Command::Verify { chain: true, .. } => {
            let report = engine.verify_chain()?;
            if args.json {
                print_json(&report)?;
            } else {
                print_chain_report(&report);
            }
            return Ok(report.valid);
        }

        Command::Verify { id: Some(id), .. } => {
            let result = engine.verify(&id)?;
            if args.json {
                print_json(&result)?;
            } else {
                print_verification(&id, &result);
            }
            return Ok(result.valid);
        }

        Command::Verify { id: None, .. } => {
            let results = engine.verify_all()?;
            let invalid = results.values().filter(|r| !r.valid).count();
            if args.json {
                print_json(&results)?;
            } else {
                for (id, result) in &results {
                    print_verification(id, result);
                }
                println!("{} items checked, {} invalid", results.len(), invalid);
            }
            return Ok(invalid == 0);
        }

        Command::Tag {
            id,
            add,
            set,
            clear,
        } => {
            let record = if clear {
                engine.update_tags(&id, Vec::<String>::new())?
            } else if !set.is_empty() {
                engine.update_tags(&id, set)?
            } else {
                engine.add_tags(&id, add)?
            };
            if args.json {
                print_json(&record)?;
            } else {
                println!("{}: {}", record.id, record.metadata.tags.join(", "));
            }
        }

        Command::Stats => {
            let stats = engine.stats()?;
            if args.json {
                print_json(&stats)?;
            } else {
                let show = |t: &Option<DateTime<Utc>>| {
                    t.as_ref().map(format_time).unwrap_or_else(|| "-".to_string())
                };
                println!("items:   {}", stats.total_items);
                println!("size:    {} bytes", stats.total_size);
                println!("oldest:  {}", show(&stats.oldest_item));
                println!("newest:  {}", show(&stats.newest_item));
            }
        }

        Command::Orphans => {
            let orphans = engine.find_orphans()?;
            if args.json {
                print_json(&orphans)?;
            } else {
                for key in &orphans {
                    println!("{}", key);
                }
                println!("{} orphaned blobs", orphans.len());
            }
        }
    }

    Ok(true)
}

/// Log filter: `RUST_LOG` if set and valid, else `warn`; `-v`/`-vv` set the
/// global level to info/debug
fn log_filter(env: Option<&str>, verbose: u8) -> EnvFilter {
    let filter = env
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));
    match verbose {
        0 => filter,
        1 => filter.add_directive(tracing::Level::INFO.into()),
        _ => filter.add_directive(tracing::Level::DEBUG.into()),
    }
}

/// 0 on success, 1 when the command found problems, 2 on error
fn exit_status(outcome: &Result<bool>) -> u8 {
    match outcome {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(_) => 2,
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(env.as_deref(), args.verbose))
        .with_writer(std::io::stderr)
        .init();

    let outcome = run(args);
    if let Err(e) = &outcome {
        eprintln!("error: {:#}", e);
    }
    ExitCode::from(exit_status(&outcome))
}
