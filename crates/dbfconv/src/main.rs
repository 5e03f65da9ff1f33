//! dbfconv - convert dBase / Visual FoxPro tables to and from CSV

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use dbf_csv::{
    ConversionConfig, ConversionStats, DbfReadOptions, DeletionPolicy, DescriptorStrategy,
    Progress, Transcoder, XbaseResult, convert_csv_to_dbf, convert_dbf_to_csv, describe_dbf_file,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser)]
#[command(name = "dbfconv")]
#[command(about = "Convert dBase/FoxPro tables to and from CSV")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export DBF files to CSV (writes <name>.csv next to each input)
    ToCsv {
        #[command(flatten)]
        csv: CsvArgs,

        /// What to do with records flagged as deleted
        #[arg(long, value_enum, default_value_t = DeletedArg::Export)]
        deleted: DeletedArg,

        /// How to find the end of the field table
        #[arg(long, value_enum, default_value_t = DescriptorsArg::Scan)]
        descriptors: DescriptorsArg,

        /// Input .dbf files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Build DBF files from CSV (writes <name>.dbf next to each input)
    ToDbf {
        #[command(flatten)]
        csv: CsvArgs,

        /// Input .csv files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Print the header and field table of DBF files as JSON
    Info {
        /// Encoding of field names
        #[arg(short, long, default_value = "UTF-8")]
        encoding: String,

        /// How to find the end of the field table
        #[arg(long, value_enum, default_value_t = DescriptorsArg::Scan)]
        descriptors: DescriptorsArg,

        /// Input .dbf files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[derive(Args)]
struct CsvArgs {
    /// Field delimiter (single character, escapes like \t allowed)
    #[arg(short = 'f', long = "delimiter", default_value = ",")]
    delimiter: String,

    /// Quote character
    #[arg(short = 'q', long = "quote", default_value = "\"")]
    quote: String,

    /// Line ending of written CSV ("\n" or "\r\n")
    #[arg(short = 'l', long = "line-ending", default_value = "\\n")]
    line_ending: String,

    /// Text encoding of the DBF and CSV side (UTF-8, GBK, GB18030, BIG5, ...)
    #[arg(short = 'e', long = "encoding", default_value = "UTF-8")]
    encoding: String,

    /// Report progress every N records (0 disables)
    #[arg(short = 'c', long = "progress", default_value_t = 0)]
    progress: u64,
}

impl CsvArgs {
    fn to_config(&self) -> Result<ConversionConfig> {
        ConversionConfig::from_settings(
            &self.delimiter,
            &self.quote,
            &self.line_ending,
            &self.encoding,
            self.progress,
        )
        .context("Invalid conversion settings")
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum DeletedArg {
    /// Export every record, deleted or not
    Export,
    /// Leave deleted records out
    Skip,
}

impl From<DeletedArg> for DeletionPolicy {
    fn from(arg: DeletedArg) -> Self {
        match arg {
            DeletedArg::Export => DeletionPolicy::ExportAll,
            DeletedArg::Skip => DeletionPolicy::SkipDeleted,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum DescriptorsArg {
    /// Read descriptors up to the 0x0D terminator
    Scan,
    /// Trust the header length
    Computed,
}

impl From<DescriptorsArg> for DescriptorStrategy {
    fn from(arg: DescriptorsArg) -> Self {
        match arg {
            DescriptorsArg::Scan => DescriptorStrategy::TerminatorScan,
            DescriptorsArg::Computed => DescriptorStrategy::ComputedCount,
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let failures = match cli.command {
        Commands::ToCsv {
            csv,
            deleted,
            descriptors,
            files,
        } => {
            let config = csv.to_config()?;
            let options = DbfReadOptions::new(deleted.into()).with_descriptor_strategy(descriptors.into());
            convert_files(&files, "csv", |src, dst| {
                let mut report = progress_logger("Exported");
                convert_dbf_to_csv(src, dst, &config, &options, Some(&mut report))
            })
        }
        Commands::ToDbf { csv, files } => {
            let config = csv.to_config()?;
            convert_files(&files, "dbf", |src, dst| {
                let mut report = progress_logger("Written");
                convert_csv_to_dbf(src, dst, &config, Some(&mut report))
            })
        }
        Commands::Info {
            encoding,
            descriptors,
            files,
        } => {
            let transcoder = Transcoder::from_label(&encoding).context("Invalid encoding")?;
            describe_files(&files, &transcoder, descriptors.into())?
        }
    };

    if failures > 0 {
        bail!("{} of the requested files failed", failures);
    }
    Ok(())
}

fn progress_logger(verb: &'static str) -> impl FnMut(Progress) {
    move |p: Progress| log::info!("  >> {} {} / {}", verb, p.processed, p.total)
}

/// `input` with its extension replaced, or `None` when that is `input` itself
fn output_path(input: &Path, extension: &str) -> Option<PathBuf> {
    let output = input.with_extension(extension);
    (output != input).then_some(output)
}

/// Convert each file in turn; a failed file is reported and its partial
/// output removed. Returns the number of failures.
fn convert_files<F>(files: &[PathBuf], extension: &str, mut convert: F) -> usize
where
    F: FnMut(&Path, &Path) -> XbaseResult<ConversionStats>,
{
    let mut failures = 0;

    for input in files {
        if !input.is_file() {
            log::error!("File not found [{}]", input.display());
            failures += 1;
            continue;
        }
        let Some(output) = output_path(input, extension) else {
            log::error!(
                "Refusing to overwrite [{}]: input already has the .{} extension",
                input.display(),
                extension
            );
            failures += 1;
            continue;
        };

        log::info!("Processing: {}", input.display());
        let start = Instant::now();

        match convert(input, &output) {
            Ok(stats) => report_done(input, &output, &stats, start),
            Err(e) => {
                log::error!("Failed [{}]: {}", input.display(), e);
                if output.exists() {
                    if let Err(remove_err) = fs::remove_file(&output) {
                        log::warn!(
                            "Could not remove partial output {}: {}",
                            output.display(),
                            remove_err
                        );
                    }
                }
                failures += 1;
            }
        }
    }

    failures
}

fn report_done(input: &Path, output: &Path, stats: &ConversionStats, start: Instant) {
    log::info!(
        "Done: {} -> {} ({} fields, {} records, {:.3}s)",
        input.display(),
        output.display(),
        stats.field_count,
        stats.records_written,
        start.elapsed().as_secs_f64()
    );
    if stats.deleted_skipped > 0 {
        log::info!("  >> Skipped {} deleted records", stats.deleted_skipped);
    }
    if stats.rows_skipped > 0 {
        log::warn!("  >> Skipped {} malformed CSV rows", stats.rows_skipped);
    }
    if stats.decode_fallbacks > 0 {
        log::warn!(
            "  >> {} values were not valid in the declared encoding",
            stats.decode_fallbacks
        );
    }
}

fn describe_files(
    files: &[PathBuf],
    transcoder: &Transcoder,
    strategy: DescriptorStrategy,
) -> Result<usize> {
    let mut failures = 0;
    for path in files {
        match describe_dbf_file(path, transcoder, strategy) {
            Ok(summary) => println!("{}", summary.to_json()?),
            Err(e) => {
                log::error!("Failed [{}]: {}", path.display(), e);
                failures += 1;
            }
        }
    }
    Ok(failures)
}
