//! Rendering bundle templates
//!
//! Templates are cookiecutter projects. Remote templates are cloned into
//! `<data_path>/templates/<name>` and refreshed on every use; local templates
//! are rendered in place.

use std::io::Write;
use std::path::{Path, PathBuf};

use briefcase_core::{BriefcaseError, Result};
use briefcase_tools::subprocess::path_arg;
use briefcase_tools::{cmd_args, Git, SubprocessOptions, Tool, ToolCache};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

/// Branch used when the app doesn't name one
pub const DEFAULT_TEMPLATE_BRANCH: &str = "main";

/// Renders a template into an output directory
pub trait TemplateEngine {
    fn generate(
        &self,
        tools: &ToolCache,
        template: &str,
        branch: &str,
        output_path: &Path,
        extra_context: &Map<String, Value>,
    ) -> Result<()>;
}

const COOKIECUTTER_SCRIPT: &str = "\
import json, sys
from cookiecutter.main import cookiecutter
with open(sys.argv[3], encoding='utf-8') as f:
    context = json.load(f)
cookiecutter(sys.argv[1], no_input=True, output_dir=sys.argv[2], overwrite_if_exists=True, extra_context=context)
";

/// Runs cookiecutter with the host Python
#[derive(Debug, Default)]
pub struct Cookiecutter;

impl TemplateEngine for Cookiecutter {
    #[instrument(skip(self, tools, extra_context), fields(output = %output_path.display()))]
    fn generate(
        &self,
        tools: &ToolCache,
        template: &str,
        branch: &str,
        output_path: &Path,
        extra_context: &Map<String, Value>,
    ) -> Result<()> {
        let template_path = resolve_template(tools, template, branch)?;

        let mut context_file = tempfile::Builder::new()
            .prefix("briefcase-context-")
            .suffix(".json")
            .tempfile()?;
        serde_json::to_writer(&mut context_file, extra_context)
            .map_err(|e| BriefcaseError::command(format!("Unable to write template context: {}", e)))?;
        context_file.flush()?;

        info!(template = %template_path.display(), "rendering template");
        tools
            .subprocess
            .run(
                &cmd_args![
                    path_arg(&tools.host_python),
                    "-u",
                    "-X",
                    "utf8",
                    "-c",
                    COOKIECUTTER_SCRIPT,
                    path_arg(&template_path),
                    path_arg(output_path),
                    path_arg(context_file.path()),
                ],
                &SubprocessOptions::new(),
            )
            .map_err(|e| match e {
                BriefcaseError::Interrupted => e,
                e => {
                    debug!(error = %e, "cookiecutter failed");
                    BriefcaseError::command(format!("Unable to create app from the template {}.", template))
                }
            })?;
        Ok(())
    }
}

/// Whether `template` is fetched with git rather than read from disk
pub fn is_remote_template(template: &str) -> bool {
    ["https://", "http://", "git@", "git+", "ssh://"]
        .iter()
        .any(|prefix| template.starts_with(prefix))
}

/// Directory name a remote template is cached under
pub fn template_cache_name(url: &str) -> String {
    let tail = url.trim_end_matches('/').rsplit(['/', ':']).next().unwrap_or(url);
    tail.strip_suffix(".git").unwrap_or(tail).to_string()
}

/// Local directory holding `template` checked out at `branch`
pub fn resolve_template(tools: &ToolCache, template: &str, branch: &str) -> Result<PathBuf> {
    if !is_remote_template(template) {
        let path = PathBuf::from(template);
        if !path.is_dir() {
            return Err(BriefcaseError::command(format!(
                "Template {} does not exist.",
                template
            )));
        }
        return Ok(path);
    }

    let git = Git::verify(tools)?;
    let cache_path = tools
        .data_path
        .join("templates")
        .join(template_cache_name(template));
    git.update_template_cache(tools, template, &cache_path, branch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use briefcase_tools::testing::fake_tool_cache;
    use tempfile::TempDir;

    #[test]
    fn test_cache_name() {
        assert_eq!(
            template_cache_name("https://github.com/beeware/briefcase-macOS-app-template.git"),
            "briefcase-macOS-app-template"
        );
        assert_eq!(
            template_cache_name("https://example.com/templates/custom/"),
            "custom"
        );
        assert_eq!(template_cache_name("git@github.com:me/tmpl.git"), "tmpl");
    }

    #[test]
    fn test_remote_detection() {
        assert!(is_remote_template("https://github.com/beeware/template.git"));
        assert!(is_remote_template("git@github.com:me/tmpl.git"));
        assert!(!is_remote_template("/home/me/template"));
        assert!(!is_remote_template("../template"));
    }

    #[test]
    fn test_local_template_must_exist() {
        let dir = TempDir::new().unwrap();
        let (tools, _) = fake_tool_cache(dir.path(), "Linux");
        let missing = dir.path().join("missing");
        let err = resolve_template(&tools, &path_arg(&missing), "main").unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Template {} does not exist.", missing.display())
        );
        assert_eq!(resolve_template(&tools, &path_arg(dir.path()), "main").unwrap(), dir.path());
    }

    #[test]
    fn test_cookiecutter_invocation() {
        let dir = TempDir::new().unwrap();
        let (tools, executor) = fake_tool_cache(dir.path(), "Linux");
        let mut context = Map::new();
        context.insert("app_name".into(), Value::from("first-app"));

        Cookiecutter
            .generate(&tools, &path_arg(dir.path()), "main", &dir.path().join("out"), &context)
            .unwrap();

        let calls = executor.calls();
        assert_eq!(calls.len(), 1);
        let args = &calls[0].args;
        assert_eq!(args[0], path_arg(&tools.host_python));
        assert_eq!(&args[1..5], &["-u", "-X", "utf8", "-c"]);
        assert_eq!(args[6], path_arg(dir.path()));
        assert_eq!(args[7], path_arg(&dir.path().join("out")));
    }

    #[test]
    fn test_cookiecutter_failure() {
        let dir = TempDir::new().unwrap();
        let (tools, executor) = fake_tool_cache(dir.path(), "Linux");
        executor.on(&[&path_arg(&tools.host_python)], 1, "boom");

        let err = Cookiecutter
            .generate(&tools, &path_arg(dir.path()), "main", &dir.path().join("out"), &Map::new())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Unable to create app from the template {}.", dir.path().display())
        );
    }
}
