//! Completions command - shell completion scripts for briefcase

use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Args, CommandFactory};
use clap_complete::{generate, Shell};
use tracing::info;

use crate::cli::Cli;

/// Generate shell completions
#[derive(Debug, Args)]
pub struct CompletionsCommand {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,

    /// Write the script to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl CompletionsCommand {
    pub fn execute(&self) -> anyhow::Result<()> {
        info!(shell = %self.shell, "executing completions command");
        match &self.output {
            Some(path) => {
                let mut file = std::fs::File::create(path)?;
                self.write(&mut file);
                println!("Completions written to {}", path.display());
            }
            None => self.write(&mut io::stdout()),
        }
        Ok(())
    }

    fn write(&self, out: &mut dyn Write) {
        generate(self.shell, &mut Cli::command(), "briefcase", out);
    }
}
