//! XSLT Consolidation CLI
//!
//! Command-line tool for consolidating, merging, and relocating XSLT stylesheets.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{ArgAction, Args, Parser, Subcommand};
use env_logger::Env;
use log::info;

use xslt_consolidate::{
    AppendMode, ConsolidateOptions, ConsolidateStats, MissingReferencePolicy, Stylesheet,
    StylesheetError,
};

#[derive(Parser)]
#[command(name = "xslt-consolidate")]
#[command(about = "Consolidate XSLT stylesheets and their imports into a single file")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace every import and include with the content it references
    Consolidate(ConsolidateArgs),
    /// Append stylesheets to a main stylesheet
    Merge(MergeArgs),
    /// Save a stylesheet to a new location, rebasing its references
    Rebase(RebaseArgs),
}

#[derive(Args)]
struct ConsolidateArgs {
    /// Stylesheet to consolidate
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Indent the output
    #[arg(long)]
    pretty: bool,

    /// Replace missing references with a comment instead of failing
    #[arg(long)]
    skip_missing: bool,

    /// Don't remove shadowed templates, params, and variables
    #[arg(long)]
    keep_duplicates: bool,

    /// Maximum nesting of references
    #[arg(long, value_name = "N")]
    max_depth: Option<usize>,

    /// JSON file with consolidation options
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print consolidation statistics as JSON on stderr
    #[arg(long)]
    stats: bool,
}

#[derive(Args)]
struct MergeArgs {
    /// Main stylesheet
    main: PathBuf,

    /// Stylesheets to append, in order. Can be repeated
    #[arg(long = "append", value_name = "FILE", required = true)]
    append: Vec<PathBuf>,

    /// Append as xsl:import instead of merging content
    #[arg(long)]
    import: bool,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Indent the output
    #[arg(long)]
    pretty: bool,
}

#[derive(Args)]
struct RebaseArgs {
    /// Stylesheet to relocate
    input: PathBuf,

    /// New location
    #[arg(short, long)]
    output: PathBuf,

    /// Indent the output
    #[arg(long)]
    pretty: bool,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();
}

/// Options from the config file, if any, overridden by flags
fn load_options(args: &ConsolidateArgs) -> Result<ConsolidateOptions, StylesheetError> {
    let mut options = match &args.config {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(|e| StylesheetError::LoadError {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            serde_json::from_str(&content)?
        }
        None => ConsolidateOptions::default(),
    };

    if args.skip_missing {
        options.missing_reference = MissingReferencePolicy::Skip;
    }
    if args.keep_duplicates {
        options.deduplicate = false;
    }
    if args.max_depth.is_some() {
        options.max_depth = args.max_depth;
    }
    Ok(options)
}

/// Save to file or print to stdout
fn write_output(stylesheet: &Stylesheet, output: Option<&Path>) -> Result<(), StylesheetError> {
    match output {
        Some(path) => {
            stylesheet.save(path)?;
            info!("Wrote stylesheet to {}", path.display());
        }
        None => {
            println!("{}", stylesheet.to_xml_string()?);
        }
    }
    Ok(())
}

fn print_stats(stats: &ConsolidateStats) -> Result<(), StylesheetError> {
    eprintln!("{}", serde_json::to_string_pretty(stats)?);
    Ok(())
}

fn run_consolidate(args: ConsolidateArgs) -> Result<(), StylesheetError> {
    let options = load_options(&args)?;

    let mut stylesheet = Stylesheet::load(&args.input)?;
    stylesheet.set_pretty(args.pretty);
    let stats = stylesheet.consolidate(&options)?;

    info!(
        "Consolidated {}: {} references merged from {} files, {} skipped, {} declarations removed",
        args.input.display(),
        stats.references_merged,
        stats.documents_loaded,
        stats.references_skipped,
        stats.declarations_removed
    );
    if args.stats {
        print_stats(&stats)?;
    }

    write_output(&stylesheet, args.output.as_deref())
}

fn run_merge(args: MergeArgs) -> Result<(), StylesheetError> {
    let mode = if args.import {
        AppendMode::Import
    } else {
        AppendMode::Merge
    };
    let options = ConsolidateOptions::default();

    let mut stylesheet = Stylesheet::load(&args.main)?;
    stylesheet.set_pretty(args.pretty);
    for path in &args.append {
        stylesheet.append(path, mode, &options)?;
    }

    info!(
        "Appended {} stylesheets to {}",
        args.append.len(),
        args.main.display()
    );
    write_output(&stylesheet, args.output.as_deref())
}

fn run_rebase(args: RebaseArgs) -> Result<(), StylesheetError> {
    let mut stylesheet = Stylesheet::load(&args.input)?;
    stylesheet.set_pretty(args.pretty);
    write_output(&stylesheet, Some(args.output.as_path()))
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Consolidate(args) => run_consolidate(args),
        Commands::Merge(args) => run_merge(args),
        Commands::Rebase(args) => run_rebase(args),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
