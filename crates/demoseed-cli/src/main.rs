mod commands;
mod registry;
mod workspace;

use std::io;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use demoseed_eval::EvalError;
use demoseed_generate::{GenerationError, LlmError};
use demoseed_plan::PlanError;
use demoseed_seed::{RemoteError, SeedError};
use thiserror::Error;

use commands::CommandContext;
use commands::generate::GenerateOverrides;
use registry::{RegistryError, init_logging};
use workspace::WorkspaceError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("workspace error: {0}")]
    Workspace(#[from] WorkspaceError),
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("manifest error: {0}")]
    Plan(#[from] PlanError),
    #[error("core error: {0}")]
    Core(#[from] demoseed_core::Error),
    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),
    #[error("seed error: {0}")]
    Seed(#[from] SeedError),
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
    #[error("audit error: {0}")]
    Eval(#[from] EvalError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("unknown {kind}: {name}")]
    UnknownName { kind: &'static str, name: String },
    #[error("record set not found at {0}; generate it first")]
    MissingRecordSet(PathBuf),
}

#[derive(Parser, Debug)]
#[command(name = "demoseed", version, about = "Generate demo data with an LLM and seed it into business systems")]
struct Cli {
    /// Workspace root holding config/, secrets/, runs/ and the data directory.
    #[arg(long, global = true, default_value = ".")]
    workspace: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Grow one record set to its target size.
    Generate(GenerateArgs),
    /// Seed one target's record set into the remote system.
    Seed(SeedArgs),
    /// Generate every short record set, then seed all targets in order.
    Run(RunArgs),
    /// Delete previously seeded entities, dependents first.
    Clear(ClearArgs),
    /// Inspect application manifests.
    #[command(subcommand)]
    Manifest(ManifestCommand),
    /// Check a persisted record set against its schema.
    Audit(AuditArgs),
    /// Manage the encrypted credentials file.
    #[command(subcommand)]
    Secrets(SecretsCommand),
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Path to the application manifest.
    #[arg(long)]
    manifest: PathBuf,
    /// Record type to generate.
    #[arg(long)]
    record_type: String,
    /// Override the target record count.
    #[arg(long)]
    count: Option<usize>,
    /// Override the records requested per batch.
    #[arg(long)]
    batch_size: Option<usize>,
    /// Seed for vocabulary sampling.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args, Debug)]
struct SeedArgs {
    #[arg(long)]
    manifest: PathBuf,
    /// Seed target name.
    #[arg(long)]
    target: String,
    /// Seed into an in-memory remote instead of the configured system.
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[arg(long)]
    manifest: PathBuf,
    #[arg(long, default_value_t = false)]
    dry_run: bool,
    /// Seed for vocabulary sampling.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args, Debug)]
struct ClearArgs {
    #[arg(long)]
    manifest: PathBuf,
    /// Clear only this seed target; all targets when omitted.
    #[arg(long)]
    target: Option<String>,
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[derive(Subcommand, Debug)]
enum ManifestCommand {
    /// Validate a manifest and print its seeding order.
    Validate {
        #[arg(long)]
        manifest: PathBuf,
    },
    /// Print the manifest JSON Schema.
    Schema {
        /// Write to a file instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct AuditArgs {
    #[arg(long)]
    manifest: PathBuf,
    #[arg(long)]
    record_type: String,
    /// Exit with an error when any violation is found.
    #[arg(long, default_value_t = false)]
    strict: bool,
}

#[derive(Subcommand, Debug)]
enum SecretsCommand {
    /// Encrypt the KEY=VALUE lines of an env file into secrets/credentials.age.
    Store {
        #[arg(long)]
        env_file: PathBuf,
    },
    /// List stored credential names.
    List,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();

    match cli.command {
        Command::Manifest(ManifestCommand::Validate { manifest }) => {
            init_logging()?;
            commands::manifest::run_validate(&manifest)
        }
        Command::Manifest(ManifestCommand::Schema { out }) => {
            init_logging()?;
            commands::manifest::run_schema(out)
        }
        Command::Secrets(command) => {
            init_logging()?;
            let ctx = CommandContext::open(cli.workspace)?;
            match command {
                SecretsCommand::Store { env_file } => commands::secrets::run_store(&ctx, &env_file),
                SecretsCommand::List => commands::secrets::run_list(&ctx),
            }
        }
        Command::Generate(args) => {
            let ctx = CommandContext::open(cli.workspace)?;
            let overrides = GenerateOverrides {
                count: args.count,
                batch_size: args.batch_size,
                seed: args.seed,
            };
            commands::generate::run_generate(&ctx, args.manifest, args.record_type, overrides).await
        }
        Command::Seed(args) => {
            let ctx = CommandContext::open(cli.workspace)?;
            commands::seed::run_seed(&ctx, args.manifest, args.target, args.dry_run).await
        }
        Command::Run(args) => {
            let ctx = CommandContext::open(cli.workspace)?;
            commands::pipeline::run_all(&ctx, args.manifest, args.dry_run, args.seed).await
        }
        Command::Clear(args) => {
            let ctx = CommandContext::open(cli.workspace)?;
            commands::clear::run_clear(&ctx, args.manifest, args.target, args.dry_run).await
        }
        Command::Audit(args) => {
            let ctx = CommandContext::open(cli.workspace)?;
            commands::audit::run_audit(&ctx, args.manifest, args.record_type, args.strict)
        }
    }
}
