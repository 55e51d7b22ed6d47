// Version information constants
const VERSION: &str = env!("CARGO_PKG_VERSION");

use bpp_compare::ensemble::validate_sequence;
use bpp_compare::logger::format_time_used;
use bpp_compare::plot_file::save_probability_plot;
use bpp_compare::settings::validate_tool_settings;
use bpp_compare::{
    compare_files, compare_plots, load_tool_settings, Alignment, CompareOptions, Delimiter,
    EnsembleGenerator, Logger, Metric,
};
use clap::{Args, Parser, Subcommand};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare two probability plot files
    Compare(CompareArgs),
    /// Predict pairing probabilities for two sequences with an external tool and compare them
    Ensemble(EnsembleArgs),
}

#[derive(Args)]
struct CompareArgs {
    /// First probability plot file
    #[arg(short = '1', long = "file1")]
    pub file1: PathBuf,
    /// Second probability plot file
    #[arg(short = '2', long = "file2")]
    pub file2: PathBuf,
    /// Comparison method
    #[arg(short = 'c', long = "comp", value_enum)]
    pub metric: Metric,
    /// How pair lists are matched for pearson-not-sum and rmsd
    #[arg(short = 'a', long = "align", value_enum, default_value_t = Alignment::Positional)]
    pub alignment: Alignment,
    /// Field separator of the data lines
    #[arg(short = 'd', long = "delimiter", value_enum, default_value_t = Delimiter::Auto)]
    pub delimiter: Delimiter,
    /// Log file path (optional)
    #[arg(short = 'l', long = "log")]
    pub log: Option<PathBuf>,
    /// Only print the result
    #[arg(short = 'q', long = "quiet", default_value_t = false)]
    pub quiet: bool,
}

#[derive(Args)]
struct EnsembleArgs {
    /// First RNA sequence
    #[arg(short = '1', long = "seq-1")]
    pub seq1: String,
    /// Second RNA sequence
    #[arg(short = '2', long = "seq-2")]
    pub seq2: String,
    /// Container image holding the structure prediction tools
    #[arg(short = 's', long = "singularity")]
    pub image: Option<PathBuf>,
    /// Container runtime used with --singularity (default singularity)
    #[arg(long = "runtime")]
    pub runtime: Option<String>,
    /// Directory with native partition/ProbabilityPlot executables
    #[arg(short = 'b', long = "bin-dir")]
    pub bin_dir: Option<PathBuf>,
    /// Tool settings file (TOML, YAML or JSON)
    #[arg(long = "config")]
    pub config: Option<PathBuf>,
    /// Parent directory for temporary working directories
    #[arg(long = "temp-dir")]
    pub temp_dir: Option<PathBuf>,
    /// Comparison method
    #[arg(short = 'c', long = "comp", value_enum, default_value_t = Metric::Pearson)]
    pub metric: Metric,
    /// How pair lists are matched for pearson-not-sum and rmsd
    #[arg(short = 'a', long = "align", value_enum, default_value_t = Alignment::Positional)]
    pub alignment: Alignment,
    /// Keep the generated probability plots in this directory
    #[arg(long = "save-plots")]
    pub save_plots: Option<PathBuf>,
    /// Log file path (optional)
    #[arg(short = 'l', long = "log")]
    pub log: Option<PathBuf>,
    /// Only print the result
    #[arg(short = 'q', long = "quiet", default_value_t = false)]
    pub quiet: bool,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    match cli.command {
        Commands::Compare(args) => {
            validate_compare_args(&args)?;
            let logger = open_logger(args.log.as_deref())?;
            run_compare(&args, &logger)
        }
        Commands::Ensemble(args) => {
            validate_ensemble_args(&args)?;
            let logger = open_logger(args.log.as_deref())?;
            run_ensemble(&args, &logger)
        }
    }
}

fn open_logger(path: Option<&Path>) -> Result<Logger, Box<dyn Error>> {
    match path {
        Some(path) => Ok(Logger::new(std::fs::File::create(path)?)),
        None => Ok(Logger::disabled()),
    }
}

fn run_compare(args: &CompareArgs, logger: &Logger) -> Result<(), Box<dyn Error>> {
    let start_time = Instant::now();

    logger.log("=== bpp-compare Compare Log ===")?;
    logger.log(&format!("Software Version: v{}", VERSION))?;
    logger.log(&format!("Runtime: {}", chrono::Utc::now().format("%Y-%m-%d %H:%M:%S")))?;
    logger.log(&format!("File 1: {}", args.file1.display()))?;
    logger.log(&format!("File 2: {}", args.file2.display()))?;
    logger.log(&format!("Metric: {}", args.metric))?;
    logger.log(&format!("Alignment: {:?}", args.alignment))?;
    logger.log(&format!("Delimiter: {}", args.delimiter))?;

    if !args.quiet {
        eprintln!("[Loading data]");
        eprintln!("    File 1: {}", args.file1.display());
        eprintln!("    File 2: {}", args.file2.display());
        eprintln!();
    }

    let options = CompareOptions {
        metric: args.metric,
        alignment: args.alignment,
        delimiter: args.delimiter,
    };
    let result = compare_files(&args.file1, &args.file2, &options);

    match &result {
        Ok(value) => logger.log(&format!("{}: {:?}", args.metric, value))?,
        Err(e) => logger.log(&format!("Comparison failed: {}", e))?,
    }
    let value = result?;
    println!("{:?}", value);

    let elapsed = start_time.elapsed();
    if !args.quiet {
        eprintln!("[Output]");
        eprintln!("    {}: {:?}", args.metric, value);
        eprintln!("{}", format_time_used(elapsed));
    }
    logger.log(&format!("Total time: {:.2}s", elapsed.as_secs_f64()))?;
    Ok(())
}

fn run_ensemble(args: &EnsembleArgs, logger: &Logger) -> Result<(), Box<dyn Error>> {
    let start_time = Instant::now();

    // File and environment settings first, explicit flags on top
    let mut settings = load_tool_settings(args.config.as_deref())?;
    if let Some(image) = &args.image {
        settings.image = Some(image.clone());
    }
    if let Some(runtime) = &args.runtime {
        settings.runtime = runtime.clone();
    }
    if let Some(bin_dir) = &args.bin_dir {
        settings.bin_dir = Some(bin_dir.clone());
    }
    if let Some(temp_dir) = &args.temp_dir {
        settings.temp_root = Some(temp_dir.clone());
    }
    validate_tool_settings(&settings)?;

    let options = CompareOptions {
        metric: args.metric,
        alignment: args.alignment,
        delimiter: settings.delimiter,
    };
    let generator = EnsembleGenerator::new(settings);

    logger.log("=== bpp-compare Ensemble Log ===")?;
    logger.log(&format!("Software Version: v{}", VERSION))?;
    logger.log(&format!("Runtime: {}", chrono::Utc::now().format("%Y-%m-%d %H:%M:%S")))?;
    logger.log(&format!("Sequence 1: {} nt", args.seq1.trim().len()))?;
    logger.log(&format!("Sequence 2: {} nt", args.seq2.trim().len()))?;
    logger.log(&format!("Tool: {:?}", generator.handle()))?;
    logger.log(&format!("Metric: {}", args.metric))?;

    if !args.quiet {
        eprintln!("[Predicting ensembles]");
        eprintln!("    Sequence 1: {} nt", args.seq1.trim().len());
        eprintln!("    Sequence 2: {} nt", args.seq2.trim().len());
        eprintln!();
    }

    // Each fold gets its own working directory, so both can run at once
    let (plot1, plot2) = rayon::join(
        || generator.compute_probability_plot(&args.seq1, logger),
        || generator.compute_probability_plot(&args.seq2, logger),
    );
    let plot1 = plot1?;
    let plot2 = plot2?;

    if let Some(dir) = &args.save_plots {
        std::fs::create_dir_all(dir)?;
        save_probability_plot(&dir.join("seq1.txt"), &plot1)?;
        save_probability_plot(&dir.join("seq2.txt"), &plot2)?;
        logger.log(&format!("Saved probability plots to {}", dir.display()))?;
    }

    let result = compare_plots(&plot1, &plot2, &options);
    match &result {
        Ok(value) => logger.log(&format!("{}: {:?}", args.metric, value))?,
        Err(e) => logger.log(&format!("Comparison failed: {}", e))?,
    }
    let value = result?;
    println!("{:?}", value);

    let elapsed = start_time.elapsed();
    if !args.quiet {
        eprintln!("[Output]");
        eprintln!("    {}: {:?}", args.metric, value);
        if let Some(dir) = &args.save_plots {
            eprintln!("    Plots: {}", dir.display());
        }
        eprintln!("{}", format_time_used(elapsed));
    }
    logger.log(&format!("Total time: {:.2}s", elapsed.as_secs_f64()))?;
    Ok(())
}

/// Validate compare command arguments
fn validate_compare_args(args: &CompareArgs) -> Result<(), Box<dyn Error>> {
    for (name, path) in [("File 1", &args.file1), ("File 2", &args.file2)] {
        if path.as_os_str().is_empty() {
            return Err(format!("{} path cannot be empty", name).into());
        }
    }
    if let Some(log) = &args.log {
        if log.is_dir() {
            return Err(format!("Log path is a directory: {}", log.display()).into());
        }
    }
    Ok(())
}

/// Validate ensemble command arguments
fn validate_ensemble_args(args: &EnsembleArgs) -> Result<(), Box<dyn Error>> {
    validate_sequence(args.seq1.trim()).map_err(|e| format!("Sequence 1: {}", e))?;
    validate_sequence(args.seq2.trim()).map_err(|e| format!("Sequence 2: {}", e))?;

    if let Some(image) = &args.image {
        if !image.is_file() {
            return Err(format!("Container image does not exist: {}", image.display()).into());
        }
    }
    if let Some(bin_dir) = &args.bin_dir {
        if !bin_dir.is_dir() {
            return Err(format!("Tool directory does not exist: {}", bin_dir.display()).into());
        }
    }
    if let Some(temp_dir) = &args.temp_dir {
        if !temp_dir.is_dir() {
            let message = format!("Temporary directory does not exist: {}", temp_dir.display());
            return Err(message.into());
        }
    }
    if let Some(dir) = &args.save_plots {
        if dir.is_file() {
            return Err(format!("Plot output path is a file: {}", dir.display()).into());
        }
    }
    Ok(())
}
