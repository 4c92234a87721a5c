//! CLI definition and command handling

pub mod commands;
pub mod project;

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use briefcase_core::{BriefcaseError, Console};
use briefcase_platforms::UpdateOptions;
use briefcase_tools::{Subprocess, ToolCache};
use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand};

use commands::{
    BuildCommand, CompletionsCommand, CreateCommand, PackageCommand, PublishCommand, RunCommand,
    UpdateCommand, UpgradeCommand,
};

/// Briefcase - package Python projects as native applications
#[derive(Debug, Parser)]
#[command(name = "briefcase")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output; repeat for debug output
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Don't ask for user input; use the default for every question
    #[arg(long, global = true)]
    pub no_input: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create a new app bundle for a target platform
    Create(CreateCommand),

    /// Update the code, requirements or resources of an existing bundle
    Update(UpdateCommand),

    /// Build an app bundle
    Build(BuildCommand),

    /// Run an app
    Run(RunCommand),

    /// Package an app for distribution
    Package(PackageCommand),

    /// Publish a packaged app to a distribution channel
    Publish(PublishCommand),

    /// Upgrade the tools briefcase manages
    Upgrade(UpgradeCommand),

    /// Generate shell completions
    Completions(CompletionsCommand),
}

/// Where the chosen command runs: console, data directory and interrupt flag
pub struct Session<'a> {
    pub console: &'a Console,
    pub data_path: PathBuf,
    pub interrupted: Arc<AtomicBool>,
}

impl Session<'_> {
    /// A fresh tool cache for this invocation
    pub fn tool_cache(&self) -> ToolCache {
        let subprocess = Subprocess::new(self.console.clone(), self.interrupted.clone());
        ToolCache::new(self.console.clone(), subprocess, self.data_path.clone())
    }
}

/// Selects the platform and output format, and the project configuration
#[derive(Debug, Clone, Default, Args)]
pub struct TargetArgs {
    /// Platform to target; defaults to the host's
    pub platform: Option<String>,

    /// Output format to use; defaults to the platform's default
    pub output_format: Option<String>,

    /// List the available output formats for the platform
    #[arg(short = 'f', long)]
    pub formats: bool,

    /// Override a configuration value (KEY=VALUE, value in TOML syntax)
    #[arg(short = 'C', long = "config", value_name = "KEY=VALUE")]
    pub config: Vec<String>,

    /// Build Linux AppImages on the host rather than in Docker
    #[arg(long)]
    pub no_docker: bool,

    /// Install requirements with the host Python rather than an isolated environment
    #[arg(long)]
    pub no_isolation: bool,
}

/// Which parts of an existing bundle to refresh
#[derive(Debug, Clone, Copy, Default, Args)]
pub struct UpdateArgs {
    /// Update requirements for the app
    #[arg(short = 'd', long, visible_alias = "update-dependencies")]
    pub update_requirements: bool,

    /// Update app resources (icons, splash screens, etc)
    #[arg(short = 'r', long)]
    pub update_resources: bool,

    /// Update the app's support package
    #[arg(long)]
    pub update_support: bool,
}

impl From<UpdateArgs> for UpdateOptions {
    fn from(args: UpdateArgs) -> Self {
        UpdateOptions {
            update_requirements: args.update_requirements,
            update_resources: args.update_resources,
            update_support: args.update_support,
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self, console: &Console, data_path: PathBuf, interrupted: Arc<AtomicBool>) -> anyhow::Result<()> {
        let session = Session {
            console,
            data_path,
            interrupted,
        };

        let Some(command) = self.command else {
            return Err(BriefcaseError::NoCommand {
                help: Cli::command().render_help().to_string(),
            }
            .into());
        };

        match command {
            Commands::Create(ref cmd) => cmd.execute(&session),
            Commands::Update(ref cmd) => cmd.execute(&session),
            Commands::Build(ref cmd) => cmd.execute(&session),
            Commands::Run(ref cmd) => cmd.execute(&session),
            Commands::Package(ref cmd) => cmd.execute(&session),
            Commands::Publish(ref cmd) => cmd.execute(&session),
            Commands::Upgrade(ref cmd) => cmd.execute(&session),
            Commands::Completions(ref cmd) => cmd.execute(),
        }
    }
}
