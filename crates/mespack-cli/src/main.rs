//! mespack - MES package assembly CLI
//!
//! ## Commands
//!
//! - `assemble`: Copy a root package and its dependency closure into one output tree
//! - `login`: Acquire and store repository credentials

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn, Level};

use mespack_auth::{
    generate_env_vars, AuthType, CredentialError, CredentialStore, LoginRequest, Prompter,
    RepositoryType, StdinPrompter,
};
use mespack_core::{
    load_descriptor, AssembleOptions, Assembler, ConfigError, ExecutionContext, MespackError,
    RepositoryUri,
};

#[derive(Parser)]
#[command(name = "mespack")]
#[command(version = mespack_core::VERSION)]
#[command(about = "MES package assembly and repository credentials", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble a root package and its dependencies
    Assemble(AssembleArgs),

    /// Log in to a package repository
    Login(LoginArgs),
}

#[derive(Args, Debug)]
struct AssembleArgs {
    /// Directory holding cmfpackage.json
    #[arg(default_value = ".")]
    working_dir: PathBuf,

    /// Output directory (default: <WORKING_DIR>/Assemble)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Repository holding unreleased packages, searched last
    #[arg(long)]
    cirepo: Option<String>,

    /// Repositories searched before the configured ones
    #[arg(short, long = "repo")]
    repos: Vec<String>,

    /// Also assemble declared test packages into Tests/
    #[arg(long)]
    include_test_packages: bool,
}

#[derive(Args, Debug, Default)]
struct LoginArgs {
    /// Repository type: portal, npm, nuget, docker, cifs (default: portal)
    repository_type: Option<String>,

    /// Repository URI
    repository: Option<String>,

    /// Authentication type: basic or bearer
    #[arg(short = 'T', long)]
    auth_type: Option<AuthType>,

    #[arg(short, long)]
    token: Option<String>,

    #[arg(short, long)]
    username: Option<String>,

    #[arg(short, long)]
    password: Option<String>,

    #[arg(short, long)]
    domain: Option<String>,

    #[arg(short, long)]
    key: Option<String>,

    /// Store locally without updating downstream tool configuration
    #[arg(long)]
    store_only: bool,

    /// Print NAME=value lines instead of storing anything
    #[arg(long)]
    print_env_vars: bool,

    /// Fail instead of prompting for missing values
    #[arg(long)]
    no_prompt: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    mespack_core::init_tracing(cli.json, level);

    let result = match cli.command {
        Commands::Assemble(args) => run_assemble(args).await,
        Commands::Login(args) => run_login(args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}

/// Exit status for `err`, from the first mespack error in its chain.
fn exit_code(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<MespackError>())
        .and_then(|err| u8::try_from(err.exit_code()).ok())
        .unwrap_or(1)
}

async fn run_assemble(args: AssembleArgs) -> Result<()> {
    let working_dir = std::path::absolute(&args.working_dir)
        .with_context(|| format!("invalid working directory {}", args.working_dir.display()))?;
    let context = ExecutionContext::load(&working_dir)?;
    cmd_assemble(&context, args).await
}

async fn cmd_assemble(context: &ExecutionContext, args: AssembleArgs) -> Result<()> {
    let working_dir = context.working_dir();
    let root = load_descriptor(working_dir)
        .map_err(MespackError::from)
        .with_context(|| format!("failed to load package in {}", working_dir.display()))?;

    let repositories = args
        .repos
        .iter()
        .map(|raw| RepositoryUri::parse(raw, working_dir))
        .collect::<std::result::Result<Vec<_>, ConfigError>>()
        .map_err(MespackError::from)?;
    let ci_repository = args
        .cirepo
        .as_deref()
        .map(|raw| RepositoryUri::parse(raw, working_dir))
        .transpose()
        .map_err(MespackError::from)?;
    let output_dir = args
        .output
        .unwrap_or_else(|| working_dir.join("Assemble"));

    let report = Assembler::new(context)
        .assemble(AssembleOptions {
            root,
            repositories,
            ci_repository,
            output_dir,
            include_test_packages: args.include_test_packages,
        })
        .await?;

    for key in &report.copied {
        println!("copied    {key}");
    }
    for key in &report.test_packages {
        println!("test      {key}");
    }
    for (key, location) in &report.locations {
        println!("released  {key} -> {location}");
    }
    println!("Locations written to {}", report.dependencies_file.display());
    Ok(())
}

async fn run_login(args: LoginArgs) -> Result<()> {
    let mut store = CredentialStore::load_default().map_err(MespackError::from)?;
    let mut prompter = StdinPrompter::new();
    let lines = cmd_login(&mut store, args, &mut prompter, StdinPrompter::is_interactive()).await?;
    for line in lines {
        println!("{line}");
    }
    Ok(())
}

/// Resolve a credential, then either render it as environment lines or
/// store it. Returns the lines to print.
async fn cmd_login(
    store: &mut CredentialStore,
    args: LoginArgs,
    prompter: &mut dyn Prompter,
    terminal: bool,
) -> Result<Vec<String>> {
    let request = login_request(&args, terminal).map_err(MespackError::from)?;
    let credential = store
        .resolve(request, prompter)
        .await
        .map_err(MespackError::from)?;

    if args.print_env_vars {
        let vars = generate_env_vars(std::slice::from_ref(&credential)).map_err(MespackError::from)?;
        return Ok(vars
            .into_iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect());
    }

    let report = store
        .save(&[credential], !args.store_only)
        .map_err(MespackError::from)?;
    for (target, err) in &report.sync_failures {
        warn!(target = %target, error = %err, "downstream configuration not updated");
    }
    info!(path = %report.path.display(), stored = report.stored, "login complete");
    Ok(vec![format!("Credentials stored in {}", report.path.display())])
}

fn login_request(args: &LoginArgs, terminal: bool) -> std::result::Result<LoginRequest, CredentialError> {
    let repository_type = args
        .repository_type
        .as_deref()
        .map(str::parse::<RepositoryType>)
        .transpose()?;
    Ok(LoginRequest {
        repository_type,
        repository: args.repository.clone(),
        auth_type: args.auth_type,
        username: args.username.clone(),
        password: args.password.clone(),
        domain: args.domain.clone(),
        token: args.token.clone(),
        key: args.key.clone(),
        interactive: terminal && !args.no_prompt,
    })
}
