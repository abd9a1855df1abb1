//! modelist CLI - format JSON records with YAML rule files
//!
//! Reads an array of records, coerces it into a collection, runs a format
//! pass on every element and prints the result.

use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use modelist::config::{ModelistConfig, RuleFile};
use modelist::serialization::{JsonArrayWriter, NdjsonWriter};
use modelist::{Collection, RuleSet, SortOrder};

#[derive(Parser)]
#[command(name = "modelist")]
#[command(version, about = "Format JSON records into entities with YAML rule files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Format a JSON array of records and print the collection
    Format {
        /// JSON file holding an array of records
        #[arg(short, long)]
        input: PathBuf,

        /// YAML rule file applied to every element
        #[arg(short, long)]
        rules: Option<PathBuf>,

        /// YAML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Skip records missing a property of the first element
        #[arg(long)]
        strict: bool,

        /// Sort by this property
        #[arg(long)]
        sort_by: Option<String>,

        /// Sort descending
        #[arg(long, requires = "sort_by")]
        desc: bool,

        /// Drop elements that agree with an earlier one on all these properties
        #[arg(long, num_args = 1..)]
        unique_by: Vec<String>,

        /// Print groups keyed by this property instead of a list
        #[arg(long)]
        group_by: Option<String>,

        /// Print one element per line
        #[arg(long, conflicts_with = "group_by")]
        ndjson: bool,
    },

    /// Validate a rule file without formatting anything
    Validate {
        /// YAML rule file
        #[arg(short, long)]
        rules: PathBuf,
    },
}

struct FormatArgs {
    input: PathBuf,
    rules: Option<PathBuf>,
    config: Option<PathBuf>,
    strict: bool,
    sort_by: Option<String>,
    desc: bool,
    unique_by: Vec<String>,
    group_by: Option<String>,
    ndjson: bool,
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Format {
            input,
            rules,
            config,
            strict,
            sort_by,
            desc,
            unique_by,
            group_by,
            ndjson,
        } => format_records(FormatArgs {
            input,
            rules,
            config,
            strict,
            sort_by,
            desc,
            unique_by,
            group_by,
            ndjson,
        }),
        Commands::Validate { rules } => validate_rules(rules),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Format records and write them to stdout
fn format_records(args: FormatArgs) -> Result<(), String> {
    let config = match &args.config {
        Some(path) => ModelistConfig::load_from_file(path).map_err(|e| e.to_string())?,
        None => ModelistConfig::default(),
    };
    modelist::logging::init(&config.log_filter);

    let contents = fs::read_to_string(&args.input)
        .map_err(|e| format!("Failed to read {}: {}", args.input.display(), e))?;
    let records: serde_json::Value =
        serde_json::from_str(&contents).map_err(|e| format!("Failed to parse JSON: {}", e))?;
    let records = match records {
        serde_json::Value::Array(records) => records,
        _ => return Err("Input must be a JSON array of records".to_string()),
    };

    let rules = match &args.rules {
        Some(path) => RuleFile::load_from_file(path)
            .map_err(|e| e.to_string())?
            .to_rule_set(),
        None => RuleSet::new(),
    };

    let strict = args.strict || config.strict;
    let mut collection = if strict {
        Collection::from_values_strict(records, None)
    } else {
        Collection::from_values(records, None)
    }
    .map_err(|e| e.to_string())?;
    tracing::info!("loaded {} element(s) from {}", collection.len(), args.input.display());

    if !rules.is_empty() {
        collection.format(Some(&rules), true);
    }
    if !args.unique_by.is_empty() {
        let keys: Vec<&str> = args.unique_by.iter().map(String::as_str).collect();
        collection.unique_by_key(&keys);
    }
    if let Some(key) = &args.sort_by {
        let order = if args.desc { SortOrder::Desc } else { SortOrder::Asc };
        collection.sort_by(key, order);
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();

    if let Some(key) = &args.group_by {
        let groups = collection.group_by(key);
        serde_json::to_writer(&mut out, &groups).map_err(|e| format!("JSON error: {}", e))?;
        writeln!(out).map_err(|e| format!("IO error: {}", e))?;
        return Ok(());
    }

    if args.ndjson {
        let mut writer = NdjsonWriter::new(out);
        writer.write_collection(&collection).map_err(|e| e.to_string())?;
        writer.flush().map_err(|e| e.to_string())?;
    } else {
        let mut writer = JsonArrayWriter::new(&mut out).map_err(|e| e.to_string())?;
        writer.write_collection(&collection).map_err(|e| e.to_string())?;
        writer.finish().map_err(|e| e.to_string())?;
        writeln!(out).map_err(|e| format!("IO error: {}", e))?;
    }

    Ok(())
}

/// Validate a rule file
fn validate_rules(rules: PathBuf) -> Result<(), String> {
    println!("Validating {}...", rules.display());

    let file = RuleFile::load_from_file(&rules).map_err(|e| e.to_string())?;
    for (key, spec) in &file.rules {
        println!("  ✓ {}: {:?}", key, spec.to_rule());
    }
    println!("{} rule(s) are valid", file.rules.len());

    Ok(())
}
