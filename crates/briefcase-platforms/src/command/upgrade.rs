//! `briefcase upgrade`: list or upgrade the tools briefcase manages.

use briefcase_core::{BriefcaseError, Result};
use briefcase_tools::tool::BUILTIN_TOOLS;
use briefcase_tools::{installed_managed_tools, ManagedToolHandle, ToolCache};
use tracing::instrument;

pub struct UpgradeCommand<'a> {
    tools: &'a ToolCache,
}

impl<'a> UpgradeCommand<'a> {
    pub fn new(tools: &'a ToolCache) -> Self {
        Self { tools }
    }

    /// Managed tools to act on; every installed one when `names` is empty
    pub fn tools_to_upgrade(&self, names: &[String]) -> Result<Vec<ManagedToolHandle>> {
        let mut unknown: Vec<&str> = names
            .iter()
            .map(String::as_str)
            .filter(|name| !BUILTIN_TOOLS.iter().any(|tool| tool.name() == *name))
            .collect();
        if !unknown.is_empty() {
            unknown.sort_unstable();
            unknown.dedup();
            return Err(BriefcaseError::command(format!(
                "Briefcase does not know how to manage {}.",
                unknown.join(", ")
            )));
        }

        let found: Vec<ManagedToolHandle> = installed_managed_tools(self.tools)
            .into_iter()
            .filter(|handle| names.is_empty() || names.iter().any(|name| name == handle.name))
            .collect();

        let mut unmanaged: Vec<&str> = names
            .iter()
            .map(String::as_str)
            .filter(|name| !found.iter().any(|handle| handle.name == *name))
            .collect();
        if !unmanaged.is_empty() {
            unmanaged.sort_unstable();
            unmanaged.dedup();
            let message = format!("Briefcase is not managing {}.", unmanaged.join(", "));
            if found.is_empty() {
                return Err(BriefcaseError::command(message));
            }
            self.tools.console.warning(message);
        }
        Ok(found)
    }

    /// List, or upgrade, the selected managed tools
    #[instrument(skip(self))]
    pub fn run(&self, names: &[String], list_only: bool) -> Result<()> {
        let console = &self.tools.console;
        let selected = self.tools_to_upgrade(names)?;
        if selected.is_empty() {
            console.info("Briefcase is not managing any tools.");
            return Ok(());
        }

        let action = if list_only { "is managing" } else { "will upgrade" };
        console.prefixed("upgrade", format!("Briefcase {} the following tools:", action));
        for handle in &selected {
            console.info(format!(" - {} ({})", handle.full_name, handle.name));
        }

        if !list_only {
            for handle in &selected {
                console.prefixed(handle.name, format!("Upgrading {}...", handle.full_name));
                handle.upgrade(self.tools)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use briefcase_tools::testing::fake_tool_cache;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_unknown_tool() {
        let dir = TempDir::new().unwrap();
        let (tools, _) = fake_tool_cache(dir.path(), "Linux");
        let err = UpgradeCommand::new(&tools)
            .run(&["zebra".to_string(), "aardvark".to_string()], false)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Briefcase does not know how to manage aardvark, zebra."
        );
    }

    #[test]
    fn test_nothing_managed() {
        let dir = TempDir::new().unwrap();
        let (tools, _) = fake_tool_cache(dir.path(), "Linux");
        UpgradeCommand::new(&tools).run(&[], false).unwrap();

        let err = UpgradeCommand::new(&tools)
            .run(&["git".to_string()], false)
            .unwrap_err();
        assert_eq!(err.to_string(), "Briefcase is not managing git.");
    }

    #[test]
    fn test_list_managed_tools() {
        let dir = TempDir::new().unwrap();
        let (tools, _) = fake_tool_cache(dir.path(), "Linux");
        fs::create_dir_all(tools.base_path()).unwrap();
        fs::write(tools.base_path().join("linuxdeploy-x86_64.AppImage"), "elf").unwrap();

        let command = UpgradeCommand::new(&tools);
        let selected = command.tools_to_upgrade(&[]).unwrap();
        let names: Vec<_> = selected.iter().map(|handle| handle.name).collect();
        assert_eq!(names, vec!["linuxdeploy"]);

        // A partly unmanaged request only warns
        let selected = command
            .tools_to_upgrade(&["git".to_string(), "linuxdeploy".to_string()])
            .unwrap();
        assert_eq!(selected.len(), 1);

        command.run(&[], true).unwrap();
        assert!(tools.base_path().join("linuxdeploy-x86_64.AppImage").exists());
    }
}
