use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use surmise::{DEFAULT_STORE_DIR, DirectoryStore, ExampleKind, ExampleStore, StoredExample};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "surmise")]
#[command(about = "Inspect and clean stored surmise examples", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the example store
    #[arg(short, long, default_value = DEFAULT_STORE_DIR)]
    dir: PathBuf,

    /// Log store activity to stderr (overridden by RUST_LOG)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all properties with a stored example
    List {
        /// Show detailed information
        #[arg(short, long)]
        verbose: bool,
    },
    /// Show the stored example of one property
    Show {
        /// Property key, as printed by `list`
        key: String,

        /// Print the raw JSON entry
        #[arg(long)]
        json: bool,
    },
    /// Remove stored examples
    Clean {
        /// Property key (omit to clean all)
        key: Option<String>,

        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Show statistics about stored examples
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let store = DirectoryStore::open(&cli.dir).context("Failed to open example store")?;
    tracing::debug!(dir = %store.root().display(), "opened example store");

    match cli.command {
        Commands::List { verbose } => list_examples(&store, verbose),
        Commands::Show { key, json } => show_example(&store, &key, json),
        Commands::Clean { key, yes } => clean_examples(&store, key, yes),
        Commands::Stats => show_stats(&store),
    }
}

fn init_logging(debug: bool) {
    let default = if debug { "surmise=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn kind_label(kind: &ExampleKind) -> String {
    match kind {
        ExampleKind::Fail => "fail".to_string(),
        ExampleKind::Error { kind } => format!("error: {}", kind),
    }
}

fn format_time(time: &DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn list_examples(store: &DirectoryStore, verbose: bool) -> Result<()> {
    let entries = store.entries().context("Failed to read example store")?;

    if entries.is_empty() {
        println!("{}", "No stored examples found.".green());
        return Ok(());
    }

    println!(
        "{}",
        format!("Found {} stored example(s):", entries.len()).bold()
    );
    println!();

    for entry in &entries {
        let choices = entry.record.choices.len();
        print!("  {} ", "●".bright_red());
        print!("{}", entry.key.cyan().bold());
        println!(
            " ({} choice{}, {})",
            choices,
            if choices == 1 { "" } else { "s" },
            kind_label(&entry.kind)
        );

        if verbose {
            println!(
                "      {} generation={}",
                "→".bright_black(),
                entry.record.generation
            );
            println!(
                "        {}",
                format!("Choices: {:?}", entry.record.choices).bright_black()
            );
            println!(
                "        {}",
                format!("Saved: {}", format_time(&entry.saved_at)).bright_black()
            );
            println!();
        }
    }

    if !verbose {
        println!();
        println!("{}", "Tip: Use --verbose for more details".bright_black());
    }

    Ok(())
}

fn show_example(store: &DirectoryStore, key: &str, json: bool) -> Result<()> {
    let Some(entry) = store
        .lookup(key)
        .with_context(|| format!("Failed to load stored example for '{}'", key))?
    else {
        println!(
            "{}",
            format!("No stored example for '{}'", key).yellow()
        );
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
        return Ok(());
    }

    println!("{}", format!("Stored example for '{}':", key).bold().cyan());
    println!();
    println!("  {}: {}", "Kind".bold(), kind_label(&entry.kind).red());
    println!("  {}: {:?}", "Choices".bold(), entry.record.choices);
    println!("  {}: {}", "Length".bold(), entry.record.choices.len());
    println!("  {}: {}", "Generation".bold(), entry.record.generation);
    println!("  {}: {}", "Choice limit".bold(), entry.record.max_choices);
    println!("  {}: {}", "Saved".bold(), format_time(&entry.saved_at));
    println!("  {}: {}", "File".bold(), store.path_for(key).display());
    println!();
    println!(
        "  {}",
        "The next run of this property replays these choices first.".bright_black()
    );

    Ok(())
}

fn clean_examples(store: &DirectoryStore, key: Option<String>, yes: bool) -> Result<()> {
    match key {
        // Clean one property
        Some(key) => {
            if store
                .lookup(&key)
                .with_context(|| format!("Failed to load stored example for '{}'", key))?
                .is_none()
            {
                println!(
                    "{}",
                    format!("No stored example for '{}'", key).yellow()
                );
                return Ok(());
            }

            if !yes {
                print!("Delete the stored example for '{}'? [y/N] ", key);
                if !confirm()? {
                    println!("Cancelled.");
                    return Ok(());
                }
            }

            store
                .remove(&key)
                .with_context(|| format!("Failed to delete stored example for '{}'", key))?;
            println!(
                "{}",
                format!("✓ Deleted stored example for '{}'", key).green()
            );
        }

        // Clean every property
        None => {
            let entries = store.entries().context("Failed to read example store")?;

            if entries.is_empty() {
                println!("{}", "No stored examples found.".green());
                return Ok(());
            }

            if !yes {
                print!("Delete ALL {} stored example(s)? [y/N] ", entries.len());
                if !confirm()? {
                    println!("Cancelled.");
                    return Ok(());
                }
            }

            let mut deleted = 0;
            for entry in &entries {
                match store.remove(&entry.key) {
                    Ok(()) => deleted += 1,
                    Err(err) => tracing::warn!(key = %entry.key, error = %err, "failed to delete"),
                }
            }

            println!(
                "{}",
                format!("✓ Deleted {} stored example(s)", deleted).green()
            );
        }
    }

    Ok(())
}

fn show_stats(store: &DirectoryStore) -> Result<()> {
    let entries = store.entries().context("Failed to read example store")?;

    if entries.is_empty() {
        println!("{}", "No stored examples found.".green());
        return Ok(());
    }

    let failures = entries
        .iter()
        .filter(|e| e.kind == ExampleKind::Fail)
        .count();
    let errors = entries.len() - failures;
    let total_choices: usize = entries.iter().map(|e| e.record.choices.len()).sum();
    let longest = entries.iter().max_by_key(|e| e.record.choices.len());
    let oldest = entries.iter().map(|e| e.saved_at).min();
    let newest = entries.iter().map(|e| e.saved_at).max();

    println!("{}", "Example Store Statistics".bold().cyan());
    println!();
    println!("  {}: {}", "Stored examples".bold(), entries.len());
    println!("  {}: {}", "Failures".bold(), failures);
    println!("  {}: {}", "Errors".bold(), errors);
    println!("  {}: {}", "Total choices".bold(), total_choices);
    println!(
        "  {}: {:.1}",
        "Average choices per example".bold(),
        total_choices as f64 / entries.len() as f64
    );

    if let Some(StoredExample { key, record, .. }) = longest {
        println!(
            "  {}: {} ({} choices)",
            "Longest example".bold(),
            key,
            record.choices.len()
        );
    }
    if let Some(oldest) = oldest {
        println!("  {}: {}", "Oldest example".bold(), format_time(&oldest));
    }
    if let Some(newest) = newest {
        println!("  {}: {}", "Newest example".bold(), format_time(&newest));
    }

    println!();

    Ok(())
}

fn confirm() -> Result<bool> {
    use std::io::{self, BufRead, Write};

    io::stdout().flush()?;
    let stdin = io::stdin();
    let mut line = String::new();
    stdin.lock().read_line(&mut line)?;

    let answer = line.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}
