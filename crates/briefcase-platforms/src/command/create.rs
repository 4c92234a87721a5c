//! The create phase: generate a fresh bundle from the format's template and
//! populate it with the support package, app code, requirements and icons.

use std::fs;
use std::path::{Path, PathBuf};

use briefcase_core::{AppConfig, BriefcaseError, Result};
use briefcase_tools::{pip_install, File, Python, Tool};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};
use walkdir::WalkDir;

use super::{Command, CommandContext};
use crate::debuggers::DebuggerRegistry;
use crate::format::Phase;
use crate::template::DEFAULT_TEMPLATE_BRANCH;

const URL_SCHEMES: &[&str] = &["http", "https", "file", "ftp", "git+", "hg+", "svn", "bzr+"];

/// Whether `requirement` is a pip-installable URL
fn has_url(requirement: &str) -> bool {
    URL_SCHEMES.iter().any(|scheme| {
        if scheme.ends_with('+') {
            requirement.contains(scheme)
        } else {
            requirement.contains(&format!("{}:", scheme))
        }
    })
}

/// Whether `requirement` names a local directory or file
pub(crate) fn is_local_requirement(requirement: &str) -> bool {
    (requirement.contains('/') || requirement.contains('\\')) && !has_url(requirement)
}

/// Recursively copy `src` to `dst`
pub(crate) fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(|e| BriefcaseError::command(format!("Unable to copy {}: {}", src.display(), e)))?;
        let relative = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dst.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Remove a directory tree if it exists
pub(crate) fn remove_tree(path: &Path) -> Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)?;
    } else if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}

pub struct CreateCommand<'a> {
    ctx: &'a CommandContext,
    recreate_environment: bool,
}

impl<'a> CreateCommand<'a> {
    pub fn new(ctx: &'a CommandContext) -> Self {
        Self {
            ctx,
            recreate_environment: false,
        }
    }

    /// Rebuild the app's isolated environment before installing requirements
    pub fn recreating_environment(mut self, recreate: bool) -> Self {
        self.recreate_environment = recreate;
        self
    }

    /// Create a bundle for `app`, asking before replacing an existing one
    #[instrument(skip_all, fields(app = %app.app_name))]
    pub fn create_app(&self, app: &AppConfig) -> Result<()> {
        let ctx = self.ctx;
        let console = ctx.console();
        let platform = ctx.format.platform();
        let name = app.app_name.as_str();

        if !app.supported {
            return Err(BriefcaseError::command(format!(
                "App cannot be deployed on {p}. This is probably because one or more\n\
                 requirements (e.g., the GUI library) doesn't support {p}.",
                p = platform
            )));
        }

        let bundle_path = ctx.bundle_path(app);
        if bundle_path.exists() {
            let question = format!(
                "The directory {} already exists; overwrite",
                ctx.relative(&bundle_path).display()
            );
            if !console.input_boolean(&question, false)? {
                console.error(format!(
                    "Aborting creation of app '{}'; existing application template will not be overwritten.",
                    name
                ));
                return Ok(());
            }
            console.prefixed(name, "Removing old application template...");
            fs::remove_dir_all(&bundle_path)?;
        }

        console.prefixed(name, "Generating application template...");
        self.generate_app_template(app)?;

        console.prefixed(name, "Installing support package...");
        self.install_app_support_package(app)?;

        ctx.format.verify_app(ctx, app)?;

        console.prefixed(name, "Installing requirements...");
        self.install_app_requirements(app)?;

        console.prefixed(name, "Installing application code...");
        self.install_app_code(app)?;

        console.prefixed(name, "Installing application resources...");
        self.install_app_resources(app)?;

        console.prefixed(name, "Removing unneeded app content...");
        self.cleanup_app_content(app)?;

        console.prefixed(
            name,
            format!("Created {}", ctx.relative(&bundle_path).display()),
        );
        Ok(())
    }

    /// Values handed to the template for `app`
    pub fn template_context(&self, app: &AppConfig) -> Result<Map<String, Value>> {
        let ctx = self.ctx;
        let mut context = match serde_json::to_value(app) {
            Ok(Value::Object(map)) => map,
            Ok(_) => Map::new(),
            Err(e) => {
                return Err(BriefcaseError::command(format!(
                    "Unable to build template context for {}: {}",
                    app.app_name, e
                )))
            }
        };
        context.remove("template");
        context.remove("template_branch");

        let python = Python::verify(&ctx.tools)?;
        let now = chrono::Local::now();
        let values = [
            ("formal_name", app.formal_name().to_string()),
            ("format", ctx.format.output_format().to_lowercase()),
            ("python_version", python.version_tag()),
            ("host_arch", ctx.tools.host_arch.clone()),
            ("class_name", app.class_name()),
            ("module_name", app.module_name()),
            ("package_name", app.package_name()),
            ("bundle_identifier", app.bundle_identifier()),
            ("year", now.format("%Y").to_string()),
            ("month", now.format("%B").to_string()),
        ];
        for (key, value) in values {
            context.insert(key.to_string(), Value::from(value));
        }
        context.extend(ctx.format.template_context(ctx, app)?);
        Ok(context)
    }

    /// Render the template into the bundle's parent directory
    pub fn generate_app_template(&self, app: &AppConfig) -> Result<()> {
        let ctx = self.ctx;
        let template = app
            .template
            .clone()
            .unwrap_or_else(|| ctx.format.template_url());
        let branch = app
            .template_branch
            .as_deref()
            .unwrap_or(DEFAULT_TEMPLATE_BRANCH);

        let context = self.template_context(app)?;
        let output_path = ctx
            .bundle_path(app)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| ctx.build_path(app));
        fs::create_dir_all(&output_path)?;

        debug!(template = %template, branch, "generating app template");
        ctx.template_engine
            .generate(&ctx.tools, &template, branch, &output_path, &context)?;
        ctx.path_index.invalidate(app);
        Ok(())
    }

    /// Locate (downloading if needed) the support package archive
    fn support_package(&self, app: &AppConfig, revision_hint: Option<&str>) -> Result<PathBuf> {
        let ctx = self.ctx;
        let console = ctx.console();

        let (url, custom) = match &app.support_package {
            Some(url) => {
                console.info(format!("Using custom support package {}", url));
                if app.support_revision.is_some() {
                    console.warning(
                        "App specifies both a support package and a support revision; \
                         support revision will be ignored.",
                    );
                }
                (url.clone(), true)
            }
            None => {
                let revision = app
                    .support_revision
                    .as_deref()
                    .or(revision_hint)
                    .ok_or_else(|| self.missing_support_package())?;
                let tag = Python::verify(&ctx.tools)?.version_tag();
                let url = ctx.format.support_package_url(ctx, &tag, revision);
                console.info(format!("Using support package {}", url));
                (url, false)
            }
        };

        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Ok(PathBuf::from(url));
        }

        let mut download_path = ctx.tools.data_path.join("support");
        if custom {
            download_path = download_path.join(format!("{:x}", Sha256::digest(url.as_bytes())));
        }
        File::verify(&ctx.tools)?
            .download(&ctx.tools, &url, &download_path, Some("support package"))
            .map_err(|e| match e {
                BriefcaseError::MissingNetworkResource { .. } if !custom => self.missing_support_package(),
                e => e,
            })
    }

    fn missing_support_package(&self) -> BriefcaseError {
        let ctx = self.ctx;
        let platform = ctx.format.platform();
        let tag = Python::verify(&ctx.tools)
            .map(|python| python.version_tag())
            .unwrap_or_else(|_| "3".to_string());
        BriefcaseError::command(format!(
            "Unable to download {platform} support package for Python {tag} on {arch}.\n\n\
             This is likely because either Python {tag} and/or {arch} is not yet\n\
             supported on {platform}. You will need to:\n    \
             * Use an older version of Python; or\n    \
             * Compile your own custom support package.",
            platform = platform,
            tag = tag,
            arch = ctx.tools.host_arch,
        ))
    }

    /// Unpack the support package into the bundle's support path
    pub fn install_app_support_package(&self, app: &AppConfig) -> Result<()> {
        let ctx = self.ctx;
        let paths = ctx.paths(app)?;
        let bundle_path = ctx.bundle_path(app);
        let Some(support_path) = paths.support_path(&bundle_path) else {
            ctx.console().info("No support package required.");
            return Ok(());
        };

        let package = self.support_package(app, paths.support_revision.as_deref())?;

        let bar = ctx.console().wait_bar("Unpacking support package");
        fs::create_dir_all(&support_path)?;
        if package.is_dir() {
            copy_tree(&package, &support_path)?;
        } else {
            File::verify(&ctx.tools)?.unpack_archive(&package, &support_path)?;
        }
        bar.done();
        Ok(())
    }

    /// Remove an installed support package
    pub fn cleanup_app_support_package(&self, app: &AppConfig) -> Result<()> {
        let ctx = self.ctx;
        let paths = ctx.paths(app)?;
        if let Some(support_path) = paths.support_path(&ctx.bundle_path(app)) {
            let bar = ctx.console().wait_bar("Removing existing support package");
            remove_tree(&support_path)?;
            bar.done();
        }
        Ok(())
    }

    /// Requirements to install, including any remote debugger support
    pub fn app_requirements(&self, app: &AppConfig) -> Result<Vec<String>> {
        let mut requires = app.requirements();
        if let Some(config) = &app.debugger {
            let debugger = DebuggerRegistry::with_builtins()?.resolve(&config.debugger)?;
            requires.extend(debugger.requirements());
        }
        Ok(requires)
    }

    /// Install requirements, by writing a requirements file for the
    /// template's own build system or by installing them with pip
    pub fn install_app_requirements(&self, app: &AppConfig) -> Result<()> {
        let ctx = self.ctx;
        let paths = ctx.paths(app)?;
        let bundle_path = ctx.bundle_path(app);
        let requires = self.app_requirements(app)?;

        if let Some(requirements_path) = paths.app_requirements_path(&bundle_path) {
            let installer_args_path = paths.app_requirement_installer_args_path(&bundle_path);
            self.write_requirements_file(app, &requires, &requirements_path, installer_args_path.as_deref())
        } else if let Some(app_packages_path) = paths.app_packages_path(&bundle_path) {
            self.pip_install_requirements(app, &requires, &app_packages_path)
        } else {
            Err(BriefcaseError::command(
                "Application path index file does not define \
                 `app_requirements_path` or `app_packages_path`",
            ))
        }
    }

    fn write_requirements_file(
        &self,
        app: &AppConfig,
        requires: &[String],
        requirements_path: &Path,
        installer_args_path: Option<&Path>,
    ) -> Result<()> {
        let ctx = self.ctx;
        let bar = ctx.console().wait_bar("Writing requirements file");

        let mut content = format!("# Generated {}\n", chrono::Local::now().naive_local());
        for requirement in requires {
            if is_local_requirement(requirement) {
                content.push_str(&ctx.base_path.join(requirement).display().to_string());
            } else {
                content.push_str(requirement);
            }
            content.push('\n');
        }
        if let Some(parent) = requirements_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(requirements_path, content)?;

        if let Some(installer_args_path) = installer_args_path {
            let args = app.requirement_installer_args.join("\n");
            fs::write(installer_args_path, format!("{}\n", args))?;
        }
        bar.done();
        Ok(())
    }

    fn pip_install_requirements(&self, app: &AppConfig, requires: &[String], app_packages_path: &Path) -> Result<()> {
        let ctx = self.ctx;
        remove_tree(app_packages_path)?;
        fs::create_dir_all(app_packages_path)?;

        if requires.is_empty() {
            ctx.console().info("No application requirements.");
            return Ok(());
        }

        let (context, python) = ctx.requirements_context(app, self.recreate_environment)?;
        let mut extra_args = vec![
            "--disable-pip-version-check".to_string(),
            "--no-user".to_string(),
            format!("--target={}", app_packages_path.display()),
        ];
        extra_args.extend(app.requirement_installer_args.iter().cloned());
        pip_install(
            context.as_ref(),
            &python,
            requires,
            &extra_args,
            "Installing app requirements",
        )
    }

    /// Copy the app's sources into the bundle and describe them with a
    /// dist-info directory
    pub fn install_app_code(&self, app: &AppConfig) -> Result<()> {
        let ctx = self.ctx;
        let console = ctx.console();
        let app_path = ctx.paths(app)?.app_path(&ctx.bundle_path(app))?;
        remove_tree(&app_path)?;
        fs::create_dir_all(&app_path)?;

        let sources = app.all_sources();
        if sources.is_empty() {
            console.info(format!("No sources defined for {}.", app.app_name));
        }
        for source in &sources {
            let bar = console.wait_bar(format!("Installing {}", source));
            let original = ctx.base_path.join(source);
            if !original.exists() {
                return Err(BriefcaseError::MissingAppSources(source.clone()));
            }
            let target = match original.file_name() {
                Some(name) => app_path.join(name),
                None => app_path.clone(),
            };
            if original.is_dir() {
                copy_tree(&original, &target)?;
            } else {
                fs::copy(&original, &target)?;
            }
            bar.done();
        }

        write_dist_info(app, &app_path.join(format!("{}-{}.dist-info", app.module_name(), app.version)))
    }

    /// Copy the app's icons over the template's placeholders
    pub fn install_app_resources(&self, app: &AppConfig) -> Result<()> {
        let ctx = self.ctx;
        let console = ctx.console();
        let paths = ctx.paths(app)?;
        let bundle_path = ctx.bundle_path(app);

        let Some(icon) = &app.icon else {
            console.info("No application icon defined; using default");
            return Ok(());
        };

        for (variant, size, target) in paths.icon_targets() {
            let target = bundle_path.join(target);
            let extension = target
                .extension()
                .map(|ext| format!(".{}", ext.to_string_lossy()))
                .unwrap_or_default();
            let (source, role) = match (&variant, &size) {
                (None, None) => (format!("{}{}", icon, extension), "application icon".to_string()),
                (None, Some(size)) => (
                    format!("{}-{}{}", icon, size, extension),
                    format!("{}px application icon", size),
                ),
                (Some(variant), None) => (
                    format!("{}-{}{}", icon, variant, extension),
                    format!("{} application icon", variant),
                ),
                (Some(variant), Some(size)) => (
                    format!("{}-{}-{}{}", icon, variant, size, extension),
                    format!("{}px {} application icon", size, variant),
                ),
            };

            let full_source = ctx.base_path.join(&source);
            if full_source.exists() {
                let bar = console.wait_bar(format!("Installing {} as {}", source, role));
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::copy(&full_source, &target)?;
                bar.done();
            } else {
                console.info(format!("Unable to find {} for {}; using default", source, role));
            }
        }
        Ok(())
    }

    /// Delete bundle content matching the template's and the app's cleanup
    /// globs, plus any `__pycache__` directories
    pub fn cleanup_app_content(&self, app: &AppConfig) -> Result<()> {
        let ctx = self.ctx;
        let bundle_path = ctx.bundle_path(app);
        let paths = ctx.paths(app)?;

        let mut patterns: Vec<String> = paths.cleanup_paths.clone();
        patterns.extend(app.cleanup_paths.iter().map(|pattern| {
            pattern
                .replace("{app.app_name}", &app.app_name)
                .replace("{app.module_name}", &app.module_name())
                .replace("{app.formal_name}", app.formal_name())
        }));
        patterns.push("**/__pycache__".to_string());

        let bar = ctx.console().wait_bar("Removing unneeded app bundle content");
        for pattern in &patterns {
            let full = bundle_path.join(pattern);
            let matches = glob::glob(&full.to_string_lossy()).map_err(|e| {
                BriefcaseError::config(format!("Invalid cleanup path {:?}: {}", pattern, e))
            })?;
            for path in matches.flatten() {
                let relative = path.strip_prefix(&bundle_path).unwrap_or(&path).display().to_string();
                let is_dir = fs::symlink_metadata(&path).map(|m| m.is_dir()).unwrap_or(false);
                if is_dir {
                    ctx.console().debug(format!("Removing directory {}", relative));
                    fs::remove_dir_all(&path)?;
                } else if path.exists() || fs::symlink_metadata(&path).is_ok() {
                    ctx.console().debug(format!("Removing {}", relative));
                    fs::remove_file(&path)?;
                }
            }
        }
        bar.done();
        Ok(())
    }
}

/// Write the installed-package metadata describing the app's code
pub(crate) fn write_dist_info(app: &AppConfig, dist_info_path: &Path) -> Result<()> {
    fs::create_dir_all(dist_info_path)?;
    fs::write(dist_info_path.join("INSTALLER"), "briefcase\n")?;
    fs::write(
        dist_info_path.join("WHEEL"),
        format!(
            "Wheel-Version: 1.0\n\
             Generator: briefcase ({})\n\
             Root-Is-Purelib: true\n\
             Tag: py3-none-any\n",
            env!("CARGO_PKG_VERSION")
        ),
    )?;

    let mut metadata = format!(
        "Metadata-Version: 2.1\n\
         Briefcase-Version: {}\n\
         Name: {}\n\
         Formal-Name: {}\n\
         App-ID: {}\n\
         Version: {}\n",
        env!("CARGO_PKG_VERSION"),
        app.app_name,
        app.formal_name(),
        app.bundle_identifier(),
        app.version,
    );
    if let Some(url) = &app.url {
        metadata.push_str(&format!("Home-page: {}\nDownload-URL: {}\n", url, url));
    }
    if let Some(author) = &app.author {
        metadata.push_str(&format!("Author: {}\n", author));
    }
    if let Some(email) = &app.author_email {
        metadata.push_str(&format!("Author-email: {}\n", email));
    }
    metadata.push_str(&format!("Summary: {}\n", app.description));
    fs::write(dist_info_path.join("METADATA"), metadata)?;

    fs::write(dist_info_path.join("top_level.txt"), format!("{}\n", app.module_name()))?;
    Ok(())
}

impl Command for CreateCommand<'_> {
    fn phase(&self) -> Phase {
        Phase::Create
    }

    fn context(&self) -> &CommandContext {
        self.ctx
    }

    fn execute_app(&self, app: &AppConfig) -> Result<()> {
        self.create_app(app)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::run_for_apps;
    use crate::command::tests::{app_named, first_app, project, project_with};
    use briefcase_tools::subprocess::path_arg;
    use crate::format::tests::DummyFormat;
    use briefcase_core::{ConnectionMode, DebuggerConfig};
    use std::sync::Arc;

    #[test]
    fn test_local_requirement_detection() {
        assert!(is_local_requirement("./packages/mylib"));
        assert!(is_local_requirement("..\\mylib"));
        assert!(!is_local_requirement("toga>=0.4"));
        assert!(!is_local_requirement("git+https://github.com/beeware/toga.git"));
        assert!(!is_local_requirement("https://example.com/pkg/mylib.whl"));
    }

    #[test]
    fn test_create_app() {
        let project = project();
        let mut app = first_app();
        app.requires = vec!["toga".to_string()];
        run_for_apps(&CreateCommand::new(&project.ctx), &[app.clone()]).unwrap();

        let bundle = project.ctx.bundle_path(&app);
        assert!(bundle.join("src/app/first_app/__main__.py").exists());
        assert!(bundle.join("src/app_packages").is_dir());

        let dist_info = bundle.join("src/app/first_app-0.0.1.dist-info");
        let metadata = fs::read_to_string(dist_info.join("METADATA")).unwrap();
        assert!(metadata.contains("Name: first-app\n"));
        assert!(metadata.contains("Formal-Name: First App\n"));
        assert!(metadata.contains("App-ID: com.example.first-app\n"));
        assert_eq!(fs::read_to_string(dist_info.join("top_level.txt")).unwrap(), "first_app\n");

        let calls = project.calls.borrow();
        let (template, branch, context) = &calls[0];
        assert_eq!(template, "https://github.com/beeware/briefcase-Tester-Dummy-template.git");
        assert_eq!(branch, "main");
        assert_eq!(context["format"], "dummy");
        assert_eq!(context["python_version"], "3.12");
        assert_eq!(context["class_name"], "FirstApp");
        assert_eq!(context["module_name"], "first_app");
        assert!(context.get("template").is_none());

        let pip = project
            .executor
            .commands()
            .into_iter()
            .find(|c| c.contains(" -m pip install"))
            .unwrap();
        assert!(pip.contains("--disable-pip-version-check --no-user --target="));
        assert!(pip.ends_with(" toga"));
    }

    #[test]
    fn test_requirements_install_into_isolated_environment() {
        let mut project = project();
        project.ctx.isolated = true;
        let base = project.ctx.base_path.clone();
        fs::create_dir_all(base.join("src/second_app")).unwrap();
        fs::write(base.join("src/second_app/__main__.py"), "print('second')\n").unwrap();
        let mut first = first_app();
        first.requires = vec!["toga".to_string()];
        let mut second = app_named("second-app");
        second.requires = vec!["httpx".to_string()];

        run_for_apps(&CreateCommand::new(&project.ctx), &[first.clone(), second]).unwrap();
        // A second install in the same invocation reuses the environment
        CreateCommand::new(&project.ctx)
            .install_app_requirements(&first)
            .unwrap();

        let host_python = path_arg(&project.ctx.tools.host_python);
        let commands = project.executor.commands();
        for (name, requirement, installs) in [("first-app", "toga", 2), ("second-app", "httpx", 1)] {
            let venv = base.join(".briefcase").join(name).join("venv");
            let venv_python = path_arg(&venv.join("bin").join("python"));
            let create = format!("{} -m venv {}", host_python, path_arg(&venv));
            assert_eq!(commands.iter().filter(|c| **c == create).count(), 1, "{}", name);
            assert!(commands.contains(&format!("{} -m pip install -U pip setuptools wheel", venv_python)));

            let install = format!("{} -u -X utf8 -m pip install --upgrade", venv_python);
            let found = commands
                .iter()
                .filter(|c| c.starts_with(&install) && c.ends_with(&format!(" {}", requirement)))
                .count();
            assert_eq!(found, installs, "{}", name);
        }
        assert!(!commands
            .iter()
            .any(|c| c.starts_with(&format!("{} -u -X utf8 -m pip", host_python))));
    }

    #[test]
    fn test_unsupported_app() {
        let project = project();
        let mut app = first_app();
        app.supported = false;
        let err = CreateCommand::new(&project.ctx).create_app(&app).unwrap_err();
        assert!(err.to_string().starts_with("App cannot be deployed on Tester."));
    }

    #[test]
    fn test_existing_bundle_kept_when_not_interactive() {
        let project = project();
        let app = first_app();
        let bundle = project.ctx.bundle_path(&app);
        fs::create_dir_all(&bundle).unwrap();
        fs::write(bundle.join("marker"), "old").unwrap();

        CreateCommand::new(&project.ctx).create_app(&app).unwrap();
        assert!(bundle.join("marker").exists());
        assert!(project.calls.borrow().is_empty());
    }

    #[test]
    fn test_missing_sources() {
        let project = project();
        let mut app = first_app();
        app.sources = vec!["src/missing".to_string()];
        let err = CreateCommand::new(&project.ctx).create_app(&app).unwrap_err();
        assert_eq!(err.to_string(), "Application source 'src/missing' does not exist.");
    }

    #[test]
    fn test_requirements_file() {
        let project = project_with(
            Arc::new(DummyFormat::default()),
            Some(
                "[paths]\napp_path = \"src/app\"\napp_requirements_path = \"requirements.txt\"\n\
                 app_requirement_installer_args_path = \"pip-options.txt\"\n",
            ),
        );
        let mut app = first_app();
        app.requires = vec!["toga".to_string(), "./local/lib".to_string()];
        app.requirement_installer_args = vec!["--no-binary".to_string(), ":all:".to_string()];
        run_for_apps(&CreateCommand::new(&project.ctx), &[app.clone()]).unwrap();

        let bundle = project.ctx.bundle_path(&app);
        let requirements = fs::read_to_string(bundle.join("requirements.txt")).unwrap();
        let lines: Vec<&str> = requirements.lines().collect();
        assert!(lines[0].starts_with("# Generated "));
        assert_eq!(lines[1], "toga");
        assert_eq!(lines[2], project.ctx.base_path.join("./local/lib").display().to_string());
        assert_eq!(
            fs::read_to_string(bundle.join("pip-options.txt")).unwrap(),
            "--no-binary\n:all:\n"
        );
        assert!(!project.executor.commands().iter().any(|c| c.contains("pip install")));
    }

    #[test]
    fn test_debugger_requirements() {
        let project = project();
        let mut app = first_app();
        app.debugger = Some(DebuggerConfig {
            debugger: "debugpy".to_string(),
            mode: ConnectionMode::Server,
            host: "localhost".to_string(),
            port: 5678,
        });
        let requires = CreateCommand::new(&project.ctx).app_requirements(&app).unwrap();
        assert_eq!(
            requires,
            vec!["briefcase-debugger[debugpy]~=0.1", "debugpy~=1.8.12"]
        );
    }

    #[test]
    fn test_missing_requirements_destination() {
        let project = project_with(
            Arc::new(DummyFormat::default()),
            Some("[paths]\napp_path = \"src/app\"\n"),
        );
        let err = CreateCommand::new(&project.ctx).create_app(&first_app()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Application path index file does not define `app_requirements_path` or `app_packages_path`"
        );
    }

    #[test]
    fn test_local_support_package_and_cleanup() {
        let project = project_with(
            Arc::new(DummyFormat::default()),
            Some(
                "[paths]\napp_path = \"src/app\"\napp_packages_path = \"src/app_packages\"\n\
                 support_path = \"support\"\ncleanup_paths = [\"support/tests\"]\n",
            ),
        );
        let support = project.dir.path().join("support-pkg");
        fs::create_dir_all(support.join("python/lib")).unwrap();
        fs::create_dir_all(support.join("tests")).unwrap();
        fs::write(support.join("python/lib/os.py"), "").unwrap();
        fs::create_dir_all(project.ctx.base_path.join("src/first_app/__pycache__")).unwrap();

        let mut app = first_app();
        app.support_package = Some(support.display().to_string());
        CreateCommand::new(&project.ctx).create_app(&app).unwrap();

        let bundle = project.ctx.bundle_path(&app);
        assert!(bundle.join("support/python/lib/os.py").exists());
        assert!(!bundle.join("support/tests").exists());
        assert!(!bundle.join("src/app/first_app/__pycache__").exists());
    }

    #[test]
    fn test_support_revision_required() {
        let project = project_with(
            Arc::new(DummyFormat::default()),
            Some("[paths]\napp_path = \"src/app\"\napp_packages_path = \"pkgs\"\nsupport_path = \"support\"\n"),
        );
        let err = CreateCommand::new(&project.ctx).create_app(&first_app()).unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Unable to download Tester support package for Python 3.12 on x86_64."));
    }

    #[test]
    fn test_icons() {
        let project = project_with(
            Arc::new(DummyFormat::default()),
            Some(
                "[paths]\napp_path = \"src/app\"\napp_packages_path = \"pkgs\"\n\
                 [paths.icon]\n16 = \"icons/16.png\"\n32 = \"icons/32.png\"\n",
            ),
        );
        fs::write(project.ctx.base_path.join("icon-16.png"), "png").unwrap();
        let mut app = first_app();
        app.icon = Some("icon".to_string());
        CreateCommand::new(&project.ctx).create_app(&app).unwrap();

        let bundle = project.ctx.bundle_path(&app);
        assert_eq!(fs::read_to_string(bundle.join("icons/16.png")).unwrap(), "png");
        assert!(!bundle.join("icons/32.png").exists());
    }
}
