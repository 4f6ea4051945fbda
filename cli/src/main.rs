//! remote-sync - Command-line interface for the sync engine.
//!
//! Subcommands:
//! - `transfer`: send a local file/tree to the remote host, or `--receive` one
//! - `audit`: compare digests of a local tree against its remote copy
//! - `archive`: pack or unpack `.tar.gz` archives, splitting large ones
//!
//! Progress lines and per-file notices go to stdout; logs go to stderr.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use syncengine::{
    archive::{parse_size, Compressor, DEFAULT_SPLIT_SIZE},
    audit, default_workers, receive, send, ChecksumAlgorithm, ConfigFile, ConnectionOverrides,
    DigestOracle, FileOutcome, ProgressCallback, ProgressSample, ResendReason, SshTransport,
    SyncContext, SyncOptions, TransferJob,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// remote-sync - Checksum-verified file transfer over SSH
#[derive(Parser, Debug)]
#[command(name = "remote-sync")]
#[command(version = "0.1.0")]
#[command(about = "Send and receive files over SSH, verified by checksum")]
struct Cli {
    /// Enable verbose output (debug logging)
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a file or directory to the remote host (or receive one)
    Transfer(TransferArgs),
    /// Compare local files with their remote copies
    Audit(AuditArgs),
    /// Compress or decompress archives with tar
    Archive(ArchiveArgs),
}

/// Where and how to connect. Flags override values from `--config`.
#[derive(Args, Debug, Clone, Default)]
struct ConnectionArgs {
    /// JSON file with host, port, username, password and an optional "sync" section
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Remote server host
    #[arg(long)]
    host: Option<String>,

    /// Remote server port (default 22)
    #[arg(long)]
    port: Option<u16>,

    /// Remote server username
    #[arg(long)]
    username: Option<String>,

    /// Remote server password (ssh-agent is used when omitted)
    #[arg(long)]
    password: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
struct SyncArgs {
    /// Checksum algorithm for verification: md5, sha256, blake3
    #[arg(long, value_name = "ALGORITHM")]
    hash: Option<ChecksumAlgorithm>,

    /// Transfer attempts per file before giving up (0 = retry forever)
    #[arg(long, value_name = "N")]
    max_attempts: Option<u32>,

    /// Transfer even when the destination already matches
    #[arg(long)]
    no_skip: bool,

    /// Keepalive interval in seconds (0 disables)
    #[arg(long, value_name = "SECS")]
    keepalive: Option<u32>,
}

#[derive(Args, Debug)]
struct TransferArgs {
    /// Source file or directory
    #[arg(long, value_name = "PATH")]
    src: String,

    /// Destination directory; the source is placed inside it
    #[arg(long, value_name = "PATH")]
    dst: String,

    /// Receive from the remote host instead of sending to it
    #[arg(long)]
    receive: bool,

    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(flatten)]
    sync: SyncArgs,
}

#[derive(Args, Debug)]
struct AuditArgs {
    /// Local directory (or file) to check
    #[arg(long, value_name = "PATH")]
    src: String,

    /// Remote directory expected to mirror --src
    #[arg(long, value_name = "PATH")]
    dst: String,

    /// Parallel workers (default: one per CPU, 0 = one per file)
    #[arg(long)]
    workers: Option<usize>,

    /// Checksum algorithm: md5, sha256, blake3
    #[arg(long, value_name = "ALGORITHM")]
    hash: Option<ChecksumAlgorithm>,

    #[command(flatten)]
    connection: ConnectionArgs,
}

#[derive(Args, Debug)]
struct ArchiveArgs {
    /// Single file or directory to process
    #[arg(long, value_name = "PATH", required_unless_present = "root", conflicts_with = "root")]
    src: Option<PathBuf>,

    /// Process every entry of this directory
    #[arg(long, value_name = "PATH")]
    root: Option<PathBuf>,

    /// Output directory (created if missing)
    #[arg(long, value_name = "PATH")]
    dst: PathBuf,

    /// Split archives larger than this: <n>[K|M|G]
    #[arg(long, value_name = "SIZE", default_value = DEFAULT_SPLIT_SIZE, value_parser = parse_size)]
    split: u64,

    /// Decompress instead of compress
    #[arg(long)]
    decompress: bool,
}

impl ConnectionArgs {
    fn load_file(&self) -> Result<ConfigFile, String> {
        match &self.config {
            Some(path) => ConfigFile::load(path).map_err(|e| e.to_string()),
            None => Ok(ConfigFile::default()),
        }
    }

    fn overrides(&self) -> ConnectionOverrides {
        ConnectionOverrides {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }

    /// Resolve the connection and open it.
    fn connect(&self, file: &ConfigFile) -> Result<SshTransport, String> {
        let connection = file.connection(&self.overrides()).map_err(|e| e.to_string())?;
        SshTransport::connect(&connection).map_err(|e| e.to_string())
    }
}

impl SyncArgs {
    fn apply(&self, mut options: SyncOptions) -> SyncOptions {
        if let Some(algorithm) = self.hash {
            options.algorithm = algorithm;
        }
        if let Some(max) = self.max_attempts {
            options.retry.max_attempts = if max == 0 { None } else { Some(max) };
        }
        if self.no_skip {
            options.skip_unchanged = false;
        }
        if let Some(secs) = self.keepalive {
            options.keepalive_secs = secs;
        }
        options
    }
}

/// CLI implementation of ProgressCallback printing to stdout
struct CliProgress {
    verbose: bool,
    algorithm: ChecksumAlgorithm,
}

impl CliProgress {
    fn new(verbose: bool, algorithm: ChecksumAlgorithm) -> Self {
        CliProgress { verbose, algorithm }
    }

    fn resend_notice(&self, name: &str, reason: ResendReason) -> String {
        match reason {
            ResendReason::DestinationDiffers => {
                format!("{} differs at destination. Resending...", name)
            }
            ResendReason::VerificationFailed { .. } => {
                format!("{} {} mismatch. Resending...", name, self.algorithm.command())
            }
        }
    }

    fn completion_notice(job: &TransferJob, outcome: &FileOutcome) -> String {
        let notice = format!(
            "{} {} successfully",
            job.file_name(),
            job.direction.past_tense()
        );
        if outcome.skipped() {
            format!("{} (already up to date).", notice)
        } else {
            format!("{}.", notice)
        }
    }
}

impl ProgressCallback for CliProgress {
    fn on_file_started(&self, job: &TransferJob) {
        if self.verbose {
            println!("{} -> {}", job.source_path, job.destination_path);
        }
    }

    fn on_file_progress(&self, job: &TransferJob, sample: &ProgressSample) {
        println!("{}", sample.render(job.file_name()));
    }

    fn on_resend(&self, job: &TransferJob, reason: ResendReason) {
        println!("{}", self.resend_notice(job.file_name(), reason));
    }

    fn on_file_completed(&self, job: &TransferJob, outcome: &FileOutcome) {
        println!("{}", Self::completion_notice(job, outcome));
    }
}

/// Install the stderr log subscriber. `RUST_LOG` wins over `--verbose`.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Parse command-line arguments, then run the chosen subcommand
fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let exit_code = match run_cli(&cli) {
        Ok(code) => code,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            2
        }
    };

    std::process::exit(exit_code);
}

/// Main CLI logic - separated for testability. Returns the exit code.
fn run_cli(cli: &Cli) -> Result<i32, String> {
    match &cli.command {
        Command::Transfer(args) => run_transfer(args, cli.verbose),
        Command::Audit(args) => run_audit(args),
        Command::Archive(args) => run_archive(args),
    }
}

fn run_transfer(args: &TransferArgs, verbose: bool) -> Result<i32, String> {
    let file = args.connection.load_file()?;
    let options = args.sync.apply(file.sync.clone());
    let transport = args.connection.connect(&file)?;

    let ctx = SyncContext::new(&transport, &options);
    let progress = CliProgress::new(verbose, options.algorithm);

    let result = if args.receive {
        receive(&ctx, &args.src, &args.dst, Some(&progress))
    } else {
        send(&ctx, &args.src, &args.dst, Some(&progress))
    };
    result.map_err(|e| format!("Transfer failed: {}", e))?;

    Ok(0)
}

fn run_audit(args: &AuditArgs) -> Result<i32, String> {
    let file = args.connection.load_file()?;
    let algorithm = args.hash.unwrap_or(file.sync.algorithm);
    let transport = args.connection.connect(&file)?;

    let report = audit(
        &transport,
        DigestOracle::new(algorithm),
        &args.src,
        &args.dst,
        args.workers.unwrap_or_else(default_workers),
    )
    .map_err(|e| format!("Audit failed: {}", e))?;

    for record in &report.records {
        println!("{}", record);
    }
    info!(
        "{} of {} file(s) match",
        report.records.len() - report.problems().count(),
        report.records.len()
    );

    Ok(if report.is_clean() { 0 } else { 1 })
}

fn run_archive(args: &ArchiveArgs) -> Result<i32, String> {
    let compressor = Compressor::new(args.split);
    debug!("archive split size: {} bytes", compressor.split_size());

    let result = match (&args.root, &args.src, args.decompress) {
        (Some(root), _, false) => compressor.compress_root(root, &args.dst).map(|_| ()),
        (Some(root), _, true) => compressor.decompress_root(root, &args.dst),
        (None, Some(src), false) => compressor.compress(src, &args.dst).map(|_| ()),
        (None, Some(src), true) => compressor.decompress(src, &args.dst),
        (None, None, _) => return Err("Either --src or --root is required".to_string()),
    };
    result.map_err(|e| format!("Archive failed: {}", e))?;

    Ok(0)
}
