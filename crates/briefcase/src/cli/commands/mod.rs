//! CLI commands

mod build;
mod completions;
mod create;
mod package;
mod publish;
mod run;
mod update;
mod upgrade;

pub use build::BuildCommand;
pub use completions::CompletionsCommand;
pub use create::CreateCommand;
pub use package::PackageCommand;
pub use publish::PublishCommand;
pub use run::RunCommand;
pub use update::UpdateCommand;
pub use upgrade::UpgradeCommand;
