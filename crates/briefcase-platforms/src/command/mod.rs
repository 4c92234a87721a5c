//! App lifecycle commands
//!
//! Each phase (create, update, build, run, package, publish) is a command
//! that owns the sequencing for one app and calls into the selected
//! [`Format`] for the steps that differ per backend. [`run_for_apps`] drives
//! a command across every selected app.

pub mod build;
pub mod create;
pub mod package;
pub mod publish;
pub mod run;
pub mod update;
pub mod upgrade;

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use briefcase_core::{AppConfig, BriefcaseError, Console, Result};
use briefcase_tools::{virtual_environment, AppContext, NativeAppContext, ToolCache};
use tracing::{debug, info, instrument, warn};

use crate::format::{Format, Phase};
use crate::path_index::{BundlePaths, PathIndex};
use crate::template::{Cookiecutter, TemplateEngine};

pub use build::{BuildCommand, BuildOptions};
pub use create::CreateCommand;
pub use package::{PackageCommand, PackageOptions};
pub use publish::PublishCommand;
pub use run::{RunCommand, RunOptions};
pub use update::{UpdateCommand, UpdateOptions};
pub use upgrade::UpgradeCommand;

/// Everything a lifecycle command needs for one invocation: the tool cache,
/// the project location, the selected format and per-app caches.
pub struct CommandContext {
    pub tools: ToolCache,
    pub base_path: PathBuf,
    pub format: Arc<dyn Format>,
    pub path_index: PathIndex,
    pub template_engine: Box<dyn TemplateEngine>,
    /// Install requirements through an isolated virtual environment
    pub isolated: bool,
    app_contexts: RefCell<HashMap<String, Option<Rc<dyn AppContext>>>>,
    environments: RefCell<HashMap<String, Rc<dyn AppContext>>>,
}

impl CommandContext {
    pub fn new(tools: ToolCache, base_path: impl Into<PathBuf>, format: Arc<dyn Format>) -> Self {
        Self {
            tools,
            base_path: base_path.into(),
            format,
            path_index: PathIndex::new(),
            template_engine: Box::new(Cookiecutter),
            isolated: true,
            app_contexts: RefCell::new(HashMap::new()),
            environments: RefCell::new(HashMap::new()),
        }
    }

    pub fn with_template_engine(mut self, engine: impl TemplateEngine + 'static) -> Self {
        self.template_engine = Box::new(engine);
        self
    }

    pub fn with_isolation(mut self, isolated: bool) -> Self {
        self.isolated = isolated;
        self
    }

    pub fn console(&self) -> &Console {
        &self.tools.console
    }

    pub fn build_path(&self, app: &AppConfig) -> PathBuf {
        self.base_path.join("build").join(&app.app_name)
    }

    /// `build/<app>/<platform>`, lowercased
    pub fn platform_path(&self, app: &AppConfig) -> PathBuf {
        self.build_path(app).join(self.format.platform().to_lowercase())
    }

    /// `build/<app>/<platform>/<format>`, lowercased
    pub fn bundle_path(&self, app: &AppConfig) -> PathBuf {
        self.platform_path(app)
            .join(self.format.output_format().to_lowercase())
    }

    pub fn dist_path(&self) -> PathBuf {
        self.base_path.join("dist")
    }

    pub fn binary_path(&self, app: &AppConfig) -> PathBuf {
        self.format.binary_path(self, app)
    }

    pub fn distribution_path(&self, app: &AppConfig) -> PathBuf {
        self.format.distribution_path(self, app)
    }

    /// `path` relative to the project, for display
    pub fn relative<'p>(&self, path: &'p Path) -> &'p Path {
        path.strip_prefix(&self.base_path).unwrap_or(path)
    }

    /// The path index of `app`'s bundle
    pub fn paths(&self, app: &AppConfig) -> Result<Rc<BundlePaths>> {
        self.path_index.load(app, &self.bundle_path(app))
    }

    /// Fail unless the format can be used on this host
    pub fn verify_host(&self) -> Result<()> {
        if self.format.supported_host_os().contains(&self.tools.host_os.as_str()) {
            Ok(())
        } else {
            Err(BriefcaseError::command(
                self.format.supported_host_os_reason(&self.tools.host_os),
            ))
        }
    }

    /// Host, phase and tool checks made once before any app is touched
    #[instrument(skip(self), fields(platform = self.format.platform(), format = self.format.output_format()))]
    pub fn prepare(&self, phase: Phase) -> Result<()> {
        self.verify_host()?;
        if !self.format.supports_phase(phase) {
            return Err(self.format.unsupported(phase));
        }
        self.format.verify_tools(self, phase)?;
        debug!(tools = ?self.tools.verified_tools(), "tools verified");
        Ok(())
    }

    /// The format's own context for `app`, prepared at most once per app
    fn format_context(&self, app: &AppConfig) -> Result<Option<Rc<dyn AppContext>>> {
        if let Some(context) = self.app_contexts.borrow().get(&app.app_name) {
            return Ok(context.clone());
        }
        let context = self.format.app_context(self, app)?;
        self.app_contexts
            .borrow_mut()
            .insert(app.app_name.clone(), context.clone());
        Ok(context)
    }

    /// Context for build tools run on the app's behalf
    pub fn app_context(&self, app: &AppConfig) -> Result<Rc<dyn AppContext>> {
        Ok(match self.format_context(app)? {
            Some(context) => context,
            None => Rc::new(NativeAppContext::new(self.tools.subprocess.clone())),
        })
    }

    /// Context and interpreter used to install the app's requirements. A
    /// format with its own context installs through it; everything else
    /// goes through the app's virtual environment.
    ///
    /// The environment is entered once per app per invocation. `recreate`
    /// rebuilds an isolated environment from scratch on that first entry.
    pub fn requirements_context(&self, app: &AppConfig, recreate: bool) -> Result<(Rc<dyn AppContext>, PathBuf)> {
        if let Some(context) = self.format_context(app)? {
            return Ok((context, self.tools.host_python.clone()));
        }
        let env = virtual_environment(&self.tools, &app.app_name, &self.base_path, self.isolated, recreate);
        let python = env.python();
        if let Some(context) = self.environments.borrow().get(&app.app_name) {
            return Ok((context.clone(), python));
        }
        debug!(app = %app.app_name, isolated = env.is_isolated(), recreate, "entering environment");
        let context = env.enter()?;
        self.environments
            .borrow_mut()
            .insert(app.app_name.clone(), context.clone());
        Ok((context, python))
    }
}

/// A lifecycle phase that can be applied to each app in turn
pub trait Command {
    fn phase(&self) -> Phase;

    fn context(&self) -> &CommandContext;

    fn execute_app(&self, app: &AppConfig) -> Result<()>;
}

/// Apps named by `app_names`, or every app when none are named
pub fn select_apps(apps: &[AppConfig], app_names: &[String]) -> Result<Vec<AppConfig>> {
    if app_names.is_empty() {
        return Ok(apps.to_vec());
    }
    app_names
        .iter()
        .map(|name| {
            apps.iter()
                .find(|app| &app.app_name == name)
                .cloned()
                .ok_or_else(|| BriefcaseError::command(format!("App '{}' does not exist in this project.", name)))
        })
        .collect()
}

/// The one app a run-style command acts on
pub fn select_single_app(apps: &[AppConfig], app_name: Option<&str>) -> Result<AppConfig> {
    match (apps, app_name) {
        ([app], _) => Ok(app.clone()),
        (_, Some(name)) => apps
            .iter()
            .find(|app| app.app_name == name)
            .cloned()
            .ok_or_else(|| {
                BriefcaseError::command(format!("Project doesn't define an application named '{}'", name))
            }),
        (_, None) => Err(BriefcaseError::command(
            "Project specifies more than one application; use --app to specify which one to start.",
        )),
    }
}

/// Run `command` for each app in declared order.
///
/// Tool verification happens once, before the first app. A failing app
/// doesn't stop the rest; failures are returned together once every app has
/// been attempted. An interrupt stops immediately.
pub fn run_for_apps(command: &dyn Command, apps: &[AppConfig]) -> Result<()> {
    let ctx = command.context();
    ctx.prepare(command.phase())?;

    let mut failures = Vec::new();
    for app in apps {
        info!(app = %app.app_name, phase = %command.phase(), "running phase");
        match command.execute_app(app) {
            Ok(()) => {}
            Err(e) if e.is_interrupt() => return Err(e),
            Err(e) => {
                warn!(app = %app.app_name, error = %e, "phase failed");
                failures.push((app.app_name.clone(), e));
            }
        }
    }

    match failures.len() {
        0 => Ok(()),
        1 => Err(failures.remove(0).1),
        _ => Err(BriefcaseError::MultipleApps(failures)),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::format::tests::DummyFormat;
    use briefcase_tools::testing::{fake_tool_cache, FakeExecutor};
    use serde_json::{Map, Value};
    use std::cell::RefCell;
    use tempfile::TempDir;

    pub(crate) fn app_named(name: &str) -> AppConfig {
        toml::from_str(&format!(
            r#"
app_name = "{name}"
formal_name = "First App"
version = "0.0.1"
bundle = "com.example"
description = "The first simple app"
sources = ["src/{module}"]
"#,
            name = name,
            module = name.replace('-', "_"),
        ))
        .unwrap()
    }

    pub(crate) fn first_app() -> AppConfig {
        app_named("first-app")
    }

    /// Template engine that writes a minimal bundle with a path index
    #[derive(Default)]
    pub(crate) struct FakeTemplate {
        pub calls: Rc<RefCell<Vec<(String, String, Map<String, Value>)>>>,
        pub index: Option<&'static str>,
    }

    pub(crate) const DEFAULT_INDEX: &str = r#"
[paths]
app_path = "src/app"
app_packages_path = "src/app_packages"
"#;

    impl TemplateEngine for FakeTemplate {
        fn generate(
            &self,
            _tools: &ToolCache,
            template: &str,
            branch: &str,
            output_path: &Path,
            extra_context: &Map<String, Value>,
        ) -> Result<()> {
            self.calls
                .borrow_mut()
                .push((template.to_string(), branch.to_string(), extra_context.clone()));
            let bundle = output_path.join(extra_context["format"].as_str().unwrap_or_default());
            std::fs::create_dir_all(&bundle)?;
            std::fs::write(
                bundle.join("briefcase.toml"),
                self.index.unwrap_or(DEFAULT_INDEX),
            )?;
            Ok(())
        }
    }

    pub(crate) struct Project {
        pub dir: TempDir,
        pub ctx: CommandContext,
        pub executor: Rc<FakeExecutor>,
        pub calls: Rc<RefCell<Vec<(String, String, Map<String, Value>)>>>,
    }

    /// A project with `src/first_app` in a temp dir, using the dummy format
    pub(crate) fn project_with(format: Arc<dyn Format>, index: Option<&'static str>) -> Project {
        let dir = TempDir::new().unwrap();
        let (tools, executor) = fake_tool_cache(&dir.path().join("data"), "Linux");
        let python = briefcase_tools::subprocess::path_arg(&tools.host_python);
        executor.on(&[python.as_str(), "-c"], 0, "3.12\n");
        let template = FakeTemplate {
            index,
            ..Default::default()
        };
        let calls = template.calls.clone();
        let base = dir.path().join("project");
        std::fs::create_dir_all(base.join("src").join("first_app")).unwrap();
        std::fs::write(base.join("src/first_app/__main__.py"), "print('hello')\n").unwrap();
        let ctx = CommandContext::new(tools, &base, format)
            .with_template_engine(template)
            .with_isolation(false);
        Project {
            dir,
            ctx,
            executor,
            calls,
        }
    }

    pub(crate) fn project() -> Project {
        project_with(Arc::new(DummyFormat::default()), None)
    }

    #[test]
    fn test_paths() {
        let project = project();
        let app = first_app();
        let base = &project.ctx.base_path;
        assert_eq!(
            project.ctx.bundle_path(&app),
            base.join("build/first-app/tester/dummy")
        );
        assert_eq!(
            project.ctx.binary_path(&app),
            base.join("build/first-app/tester/dummy/first-app.bin")
        );
        assert_eq!(
            project.ctx.distribution_path(&app),
            base.join("dist/first-app-0.0.1.dummy")
        );
        assert_eq!(
            project.ctx.relative(&base.join("dist/x")),
            Path::new("dist/x")
        );
    }

    #[test]
    fn test_select_apps() {
        let apps = vec![app_named("first"), app_named("second")];
        assert_eq!(select_apps(&apps, &[]).unwrap().len(), 2);
        let selected = select_apps(&apps, &["second".to_string()]).unwrap();
        assert_eq!(selected[0].app_name, "second");
        let err = select_apps(&apps, &["third".to_string()]).unwrap_err();
        assert_eq!(err.to_string(), "App 'third' does not exist in this project.");
    }

    #[test]
    fn test_select_single_app() {
        let one = vec![app_named("first")];
        assert_eq!(select_single_app(&one, None).unwrap().app_name, "first");

        let two = vec![app_named("first"), app_named("second")];
        assert_eq!(
            select_single_app(&two, Some("second")).unwrap().app_name,
            "second"
        );
        assert_eq!(
            select_single_app(&two, None).unwrap_err().to_string(),
            "Project specifies more than one application; use --app to specify which one to start."
        );
        assert_eq!(
            select_single_app(&two, Some("third")).unwrap_err().to_string(),
            "Project doesn't define an application named 'third'"
        );
    }

    struct Recorder<'a> {
        ctx: &'a CommandContext,
        seen: RefCell<Vec<String>>,
        fail: &'static [&'static str],
    }

    impl Command for Recorder<'_> {
        fn phase(&self) -> Phase {
            Phase::Build
        }

        fn context(&self) -> &CommandContext {
            self.ctx
        }

        fn execute_app(&self, app: &AppConfig) -> Result<()> {
            self.seen.borrow_mut().push(app.app_name.clone());
            if self.fail.contains(&app.app_name.as_str()) {
                Err(BriefcaseError::command(format!("{} broke", app.app_name)))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_run_for_apps_visits_every_app() {
        let project = project();
        let apps = vec![app_named("first"), app_named("second"), app_named("third")];

        let recorder = Recorder {
            ctx: &project.ctx,
            seen: RefCell::new(Vec::new()),
            fail: &["first", "third"],
        };
        let err = run_for_apps(&recorder, &apps).unwrap_err();
        assert_eq!(*recorder.seen.borrow(), vec!["first", "second", "third"]);
        match err {
            BriefcaseError::MultipleApps(failures) => {
                let names: Vec<_> = failures.iter().map(|(name, _)| name.as_str()).collect();
                assert_eq!(names, vec!["first", "third"]);
            }
            other => panic!("unexpected error {other:?}"),
        }

        let recorder = Recorder {
            ctx: &project.ctx,
            seen: RefCell::new(Vec::new()),
            fail: &["second"],
        };
        let err = run_for_apps(&recorder, &apps).unwrap_err();
        assert_eq!(err.to_string(), "second broke");
    }

    #[test]
    fn test_tools_verified_once_before_apps() {
        let project = project();
        let apps = vec![app_named("first"), app_named("second")];
        let recorder = Recorder {
            ctx: &project.ctx,
            seen: RefCell::new(Vec::new()),
            fail: &[],
        };
        run_for_apps(&recorder, &apps).unwrap();
        assert_eq!(
            project.ctx.tools.verified_tools(),
            vec!["git", "file", "python"]
        );
        let git_calls = project
            .executor
            .commands()
            .iter()
            .filter(|c| c.as_str() == "git --version")
            .count();
        assert_eq!(git_calls, 1);
    }

    #[test]
    fn test_unsupported_phase_fails_before_tools() {
        let project = project_with(
            Arc::new(DummyFormat {
                phases: &[Phase::Create],
            }),
            None,
        );
        let recorder = Recorder {
            ctx: &project.ctx,
            seen: RefCell::new(Vec::new()),
            fail: &[],
        };
        let err = run_for_apps(&recorder, &[first_app()]).unwrap_err();
        assert!(matches!(err, BriefcaseError::UnsupportedCommand { .. }));
        assert!(recorder.seen.borrow().is_empty());
        assert!(project.ctx.tools.verified_tools().is_empty());
    }
}
