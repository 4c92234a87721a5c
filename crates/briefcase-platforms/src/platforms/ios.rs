//! iOS apps, generated and built as an Xcode project.
//!
//! Only the simulator build is driven from here; distribution happens
//! through Xcode's own archive workflow, so there is no run or package phase.

use std::path::{Path, PathBuf};

use briefcase_core::{AppConfig, BriefcaseError, Result, Verbosity};
use briefcase_tools::subprocess::path_arg;
use briefcase_tools::{cmd_args, SubprocessOptions, ToolId};
use plist::Value as PlistValue;
use tracing::instrument;

use crate::command::CommandContext;
use crate::format::{Format, Phase, BASE_TOOLS};

const PHASES: [Phase; 4] = [Phase::Create, Phase::Update, Phase::Build, Phase::Publish];

/// `iOS/Xcode`
#[derive(Debug, Clone, Copy, Default)]
pub struct IosXcode;

impl IosXcode {
    pub fn project_path(&self, ctx: &CommandContext, app: &AppConfig) -> PathBuf {
        ctx.bundle_path(app)
            .join(format!("{}.xcodeproj", app.formal_name()))
    }

    pub fn info_plist_path(&self, ctx: &CommandContext, app: &AppConfig) -> Result<PathBuf> {
        ctx.paths(app)?
            .required(&ctx.bundle_path(app), "info_plist_path")
    }

    /// Point the app's `Info.plist` at the module to start
    fn update_app_metadata(&self, ctx: &CommandContext, app: &AppConfig) -> Result<()> {
        let bar = ctx.console().wait_bar("Setting main module");
        let path = self.info_plist_path(ctx, app)?;
        set_main_module(&path, &app.main_module())?;
        bar.done();
        Ok(())
    }
}

fn set_main_module(path: &Path, main_module: &str) -> Result<()> {
    let invalid = |detail: String| {
        BriefcaseError::command(format!("Unable to update {}: {}", path.display(), detail))
    };
    let mut info = PlistValue::from_file(path).map_err(|e| invalid(e.to_string()))?;
    let dict = info
        .as_dictionary_mut()
        .ok_or_else(|| invalid("not a dictionary".to_string()))?;
    dict.insert("MainModule".to_string(), PlistValue::from(main_module));
    info.to_file_xml(path).map_err(|e| invalid(e.to_string()))
}

impl Format for IosXcode {
    fn platform(&self) -> &'static str {
        "iOS"
    }

    fn output_format(&self) -> &'static str {
        "Xcode"
    }

    fn description(&self) -> &'static str {
        "Create and populate an iOS Xcode project."
    }

    fn supported_host_os(&self) -> &'static [&'static str] {
        &["Darwin"]
    }

    fn supported_host_os_reason(&self, _host_os: &str) -> String {
        "iOS applications require Xcode, which is only available on macOS.".to_string()
    }

    fn phases(&self) -> &'static [Phase] {
        &PHASES
    }

    /// A missing Xcode is the more useful error, so it is checked before git
    fn tool_order(&self, _phase: Phase) -> Vec<ToolId> {
        let mut order = vec![ToolId::Xcode];
        order.extend_from_slice(BASE_TOOLS);
        order
    }

    fn binary_path(&self, ctx: &CommandContext, app: &AppConfig) -> PathBuf {
        ctx.bundle_path(app)
            .join("build")
            .join("Debug-iphonesimulator")
            .join(format!("{}.app", app.formal_name()))
    }

    /// Never generated; iOS apps are distributed through Xcode
    fn distribution_path(&self, ctx: &CommandContext, app: &AppConfig) -> PathBuf {
        ctx.dist_path()
            .join(format!("{}-{}.ipa", app.formal_name(), app.version))
    }

    #[instrument(skip_all, fields(app = %app.app_name))]
    fn build_app(&self, ctx: &CommandContext, app: &AppConfig) -> Result<()> {
        let console = ctx.console();
        console.prefixed(&app.app_name, "Updating app metadata...");
        self.update_app_metadata(ctx, app)?;

        console.prefixed(&app.app_name, "Building Xcode project...");
        let bar = console.wait_bar("Building");
        let detail = if console.verbosity() == Verbosity::Debug {
            "-verbose"
        } else {
            "-quiet"
        };
        let args = cmd_args![
            "xcodebuild",
            "build",
            "-project",
            path_arg(&self.project_path(ctx, app)),
            "-destination",
            r#"platform="iOS Simulator""#,
            "-configuration",
            "Debug",
            "-arch",
            ctx.tools.host_arch.as_str(),
            "-sdk",
            "iphonesimulator",
            detail,
        ];
        ctx.tools
            .subprocess
            .run(&args, &SubprocessOptions::new())
            .map_err(|e| {
                if e.is_interrupt() {
                    e
                } else {
                    BriefcaseError::command(format!("Unable to build app {}.", app.app_name))
                }
            })?;
        bar.done();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::tests::{first_app, project_with, Project};
    use std::fs;
    use std::sync::Arc;

    const IOS_INDEX: &str = r#"
[paths]
app_path = "First App/app"
app_packages_path = "First App/app_packages"
info_plist_path = "First App/Info.plist"
"#;

    fn ios_project() -> Project {
        let mut project = project_with(Arc::new(IosXcode), Some(IOS_INDEX));
        project.ctx.tools.host_os = "Darwin".to_string();
        project
    }

    fn write_bundle(project: &Project, app: &AppConfig) -> PathBuf {
        let bundle = project.ctx.bundle_path(app);
        fs::create_dir_all(bundle.join("First App")).unwrap();
        fs::write(bundle.join("briefcase.toml"), IOS_INDEX).unwrap();
        let mut info = plist::Dictionary::new();
        info.insert("CFBundleName".to_string(), PlistValue::from("First App"));
        PlistValue::Dictionary(info)
            .to_file_xml(bundle.join("First App/Info.plist"))
            .unwrap();
        bundle
    }

    #[test]
    fn test_phases_and_tool_order() {
        assert!(IosXcode.supports_phase(Phase::Build));
        assert!(!IosXcode.supports_phase(Phase::Run));
        assert!(!IosXcode.supports_phase(Phase::Package));
        assert_eq!(IosXcode.tool_order(Phase::Build)[..2], [ToolId::Xcode, ToolId::Git]);
    }

    #[test]
    fn test_paths() {
        let project = ios_project();
        let app = first_app();
        let bundle = project.ctx.base_path.join("build/first-app/ios/xcode");
        assert_eq!(
            IosXcode.binary_path(&project.ctx, &app),
            bundle.join("build/Debug-iphonesimulator/First App.app")
        );
        assert_eq!(
            IosXcode.project_path(&project.ctx, &app),
            bundle.join("First App.xcodeproj")
        );
    }

    #[test]
    fn test_build_sets_main_module() {
        let project = ios_project();
        let mut app = first_app();
        app.test_mode = true;
        let bundle = write_bundle(&project, &app);

        IosXcode.build_app(&project.ctx, &app).unwrap();

        let info = PlistValue::from_file(bundle.join("First App/Info.plist")).unwrap();
        let info = info.as_dictionary().unwrap();
        assert_eq!(
            info.get("MainModule").and_then(PlistValue::as_string),
            Some("tests.first_app")
        );
        assert_eq!(
            info.get("CFBundleName").and_then(PlistValue::as_string),
            Some("First App")
        );

        let calls = project.executor.calls();
        let build = calls.last().unwrap();
        assert_eq!(build.args[..3], ["xcodebuild", "build", "-project"]);
        assert_eq!(build.args[3], path_arg(&bundle.join("First App.xcodeproj")));
        assert!(build.args.contains(&"iphonesimulator".to_string()));
    }

    #[test]
    fn test_build_failure() {
        let project = ios_project();
        let app = first_app();
        write_bundle(&project, &app);
        project.executor.on(&["xcodebuild"], 65, "BUILD FAILED");

        let err = IosXcode.build_app(&project.ctx, &app).unwrap_err();
        assert_eq!(err.to_string(), "Unable to build app first-app.");
    }
}
