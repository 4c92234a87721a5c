//! Publish command - hand packaged apps to a publication channel

use std::collections::BTreeMap;

use clap::Args;
use tracing::info;

use briefcase_channels::{ChannelRegistry, PublishOptions};
use briefcase_core::BriefcaseError;
use briefcase_platforms::PublishCommand as Publish;

use crate::cli::project::Project;
use crate::cli::{Session, TargetArgs};

/// Publish a packaged app to a distribution channel
#[derive(Debug, Args)]
pub struct PublishCommand {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Name of the app to publish; may be repeated (default: all apps)
    #[arg(short, long = "app", value_name = "APP")]
    pub apps: Vec<String>,

    /// Publication channel to use
    #[arg(short, long)]
    pub channel: Option<String>,

    /// Validate the artifact without uploading it
    #[arg(long)]
    pub dry_run: bool,

    /// Channel-specific setting (KEY=VALUE)
    #[arg(short, long = "setting", value_name = "KEY=VALUE")]
    pub settings: Vec<String>,
}

impl PublishCommand {
    pub fn options(&self) -> Result<PublishOptions, BriefcaseError> {
        let settings = self
            .settings
            .iter()
            .map(|setting| match setting.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => {
                    Ok((key.trim().to_string(), value.trim().to_string()))
                }
                _ => Err(BriefcaseError::command(format!(
                    "Unable to parse channel setting {}",
                    setting
                ))),
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        Ok(PublishOptions {
            dry_run: self.dry_run,
            settings,
        })
    }

    pub fn execute(&self, session: &Session<'_>) -> anyhow::Result<()> {
        info!(apps = ?self.apps, channel = ?self.channel, "executing publish command");
        let options = self.options()?;
        let project = Project::load(session, &self.target)?;
        let apps = project.select(&self.apps)?;

        let channels = ChannelRegistry::with_builtins()?;
        let command = Publish::new(&project.ctx, &channels, self.channel.as_deref(), options)?;
        command.publish_apps(&apps)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    fn parse(args: &[&str]) -> PublishCommand {
        let mut argv = vec!["briefcase", "publish"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Some(Commands::Publish(publish)) => publish,
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_settings() {
        let options = parse(&["-s", "track=beta", "--setting", "notes = first"])
            .options()
            .unwrap();
        assert_eq!(options.settings.get("track").map(String::as_str), Some("beta"));
        assert_eq!(options.settings.get("notes").map(String::as_str), Some("first"));
        assert!(!options.dry_run);
    }

    #[test]
    fn test_malformed_setting() {
        let err = parse(&["-s", "track"]).options().unwrap_err();
        assert_eq!(err.to_string(), "Unable to parse channel setting track");
    }
}
