//! The update phase: refresh the parts of an existing bundle that change
//! between builds without regenerating it from the template.

use briefcase_core::{AppConfig, Result};
use tracing::instrument;

use super::create::CreateCommand;
use super::{Command, CommandContext};
use crate::format::Phase;

/// Which optional parts of the bundle to refresh. App code is always
/// refreshed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    pub update_requirements: bool,
    pub update_resources: bool,
    pub update_support: bool,
}

impl UpdateOptions {
    /// Everything, as used by `package --update`
    pub fn all() -> Self {
        Self {
            update_requirements: true,
            update_resources: true,
            update_support: true,
        }
    }

    pub fn any(&self) -> bool {
        self.update_requirements || self.update_resources || self.update_support
    }
}

pub struct UpdateCommand<'a> {
    ctx: &'a CommandContext,
    options: UpdateOptions,
}

impl<'a> UpdateCommand<'a> {
    pub fn new(ctx: &'a CommandContext, options: UpdateOptions) -> Self {
        Self { ctx, options }
    }

    #[instrument(skip_all, fields(app = %app.app_name))]
    pub fn update_app(&self, app: &AppConfig, options: UpdateOptions) -> Result<()> {
        let ctx = self.ctx;
        let console = ctx.console();
        let name = app.app_name.as_str();

        if !ctx.bundle_path(app).exists() {
            console.error(format!("[{}] Application does not exist; call create first!", name));
            return Ok(());
        }

        ctx.format.verify_app(ctx, app)?;

        let create = CreateCommand::new(ctx).recreating_environment(options.update_requirements);

        console.prefixed(name, "Updating application code...");
        create.install_app_code(app)?;

        if options.update_requirements {
            console.prefixed(name, "Updating requirements...");
            create.install_app_requirements(app)?;
        }

        if options.update_resources {
            console.prefixed(name, "Updating application resources...");
            create.install_app_resources(app)?;
        }

        if options.update_support {
            console.prefixed(name, "Updating application support...");
            create.cleanup_app_support_package(app)?;
            create.install_app_support_package(app)?;
        }

        console.prefixed(name, "Removing unneeded app content...");
        create.cleanup_app_content(app)?;

        console.prefixed(name, "Application updated.");
        Ok(())
    }
}

impl Command for UpdateCommand<'_> {
    fn phase(&self) -> Phase {
        Phase::Update
    }

    fn context(&self) -> &CommandContext {
        self.ctx
    }

    fn execute_app(&self, app: &AppConfig) -> Result<()> {
        self.update_app(app, self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::run_for_apps;
    use crate::command::tests::{first_app, project};
    use briefcase_tools::subprocess::path_arg;
    use std::fs;

    #[test]
    fn test_update_skips_missing_bundle() {
        let project = project();
        run_for_apps(
            &UpdateCommand::new(&project.ctx, UpdateOptions::default()),
            &[first_app()],
        )
        .unwrap();
        assert!(!project.ctx.bundle_path(&first_app()).exists());
    }

    #[test]
    fn test_update_code_only() {
        let project = project();
        let app = first_app();
        CreateCommand::new(&project.ctx).create_app(&app).unwrap();

        let main = project.ctx.base_path.join("src/first_app/__main__.py");
        fs::write(&main, "print('updated')\n").unwrap();
        let pip_calls_before = project.executor.commands().len();

        UpdateCommand::new(&project.ctx, UpdateOptions::default())
            .update_app(&app, UpdateOptions::default())
            .unwrap();

        let installed = project
            .ctx
            .bundle_path(&app)
            .join("src/app/first_app/__main__.py");
        assert_eq!(fs::read_to_string(installed).unwrap(), "print('updated')\n");
        assert_eq!(project.executor.commands().len(), pip_calls_before);
    }

    #[test]
    fn test_update_requirements() {
        let project = project();
        let mut app = first_app();
        CreateCommand::new(&project.ctx).create_app(&app).unwrap();

        app.requires = vec!["httpx".to_string()];
        let options = UpdateOptions {
            update_requirements: true,
            ..Default::default()
        };
        assert!(options.any());
        UpdateCommand::new(&project.ctx, options)
            .update_app(&app, options)
            .unwrap();
        assert!(project
            .executor
            .commands()
            .iter()
            .any(|c| c.contains("pip install") && c.ends_with(" httpx")));
    }

    #[test]
    fn test_update_requirements_recreates_environment() {
        let mut project = project();
        project.ctx.isolated = true;
        let mut app = first_app();
        CreateCommand::new(&project.ctx).create_app(&app).unwrap();

        let venv = project.ctx.base_path.join(".briefcase/first-app/venv");
        fs::create_dir_all(&venv).unwrap();
        fs::write(venv.join("pyvenv.cfg"), "home = /usr/bin\n").unwrap();
        fs::write(venv.join("stale.txt"), "left over").unwrap();

        app.requires = vec!["httpx".to_string()];
        let options = UpdateOptions {
            update_requirements: true,
            ..Default::default()
        };
        UpdateCommand::new(&project.ctx, options)
            .update_app(&app, options)
            .unwrap();

        assert!(!venv.join("stale.txt").exists());
        let host_python = path_arg(&project.ctx.tools.host_python);
        let venv_python = path_arg(&venv.join("bin").join("python"));
        let commands = project.executor.commands();
        assert!(commands.contains(&format!("{} -m venv {}", host_python, path_arg(&venv))));
        assert!(commands.contains(&format!("{} -m pip install -U pip setuptools wheel", venv_python)));
        assert!(commands.iter().any(|c| {
            c.starts_with(&format!("{} -u -X utf8 -m pip install --upgrade", venv_python)) && c.ends_with(" httpx")
        }));
    }

    #[test]
    fn test_update_without_requirements_keeps_environment() {
        let mut project = project();
        project.ctx.isolated = true;
        let app = first_app();
        CreateCommand::new(&project.ctx).create_app(&app).unwrap();

        let venv = project.ctx.base_path.join(".briefcase/first-app/venv");
        fs::create_dir_all(&venv).unwrap();
        fs::write(venv.join("pyvenv.cfg"), "home = /usr/bin\n").unwrap();

        UpdateCommand::new(&project.ctx, UpdateOptions::default())
            .update_app(&app, UpdateOptions::default())
            .unwrap();
        assert!(venv.join("pyvenv.cfg").exists());
        assert!(!project.executor.commands().iter().any(|c| c.contains(" -m venv ")));
    }
}
