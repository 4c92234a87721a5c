//! Git, and the template cache built on it

use std::path::{Path, PathBuf};

use briefcase_core::{BriefcaseError, Result};
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::Repository;
use tracing::{debug, info};

use crate::cache::ToolCache;
use crate::cmd_args;
use crate::subprocess::SubprocessOptions;
use crate::tool::{Tool, VerifyOptions};

const DARWIN_INSTALL_HINT: &str = "\
Briefcase requires git, but it is not installed. Xcode provides git; you should
be shown a dialog prompting you to install Xcode and the Command Line Developer
Tools. Select \"Install\" to install the Command Line Developer Tools.

Alternatively, you can visit:

    https://git-scm.com/

to download and install git manually.

If you have installed git recently and are still getting this error, you may
need to restart your terminal session.";

const INSTALL_HINT: &str = "\
Briefcase requires git, but it is not installed (or is not on your PATH). Visit:

    https://git-scm.com/

to download and install git manually.

If you have installed git recently and are still getting this error, you may
need to restart your terminal session.";

#[derive(Debug)]
pub struct Git {
    /// Output of `git --version`
    pub version: String,
}

impl Tool for Git {
    const NAME: &'static str = "git";
    const FULL_NAME: &'static str = "Git";

    fn verify_install(tools: &ToolCache, _options: VerifyOptions) -> Result<Self> {
        let output = tools
            .subprocess
            .check_output(&cmd_args!["git", "--version"], &SubprocessOptions::new().quiet());
        match output {
            Ok(version) => Ok(Self {
                version: version.trim().to_string(),
            }),
            Err(e) => {
                debug!(error = %e, "git is not available");
                let hint = if tools.host_os == "Darwin" {
                    DARWIN_INSTALL_HINT
                } else {
                    INSTALL_HINT
                };
                Err(BriefcaseError::command(hint))
            }
        }
    }
}

fn git_error(action: &str, e: git2::Error) -> BriefcaseError {
    BriefcaseError::command(format!("Unable to {}: {}", action, e.message()))
}

impl Git {
    /// Clone (or refresh) the template at `url` into `cache_path` and check
    /// out `branch`.
    ///
    /// A failed refresh of an existing clone only warns; the stale template
    /// is still used.
    pub fn update_template_cache(&self, tools: &ToolCache, url: &str, cache_path: &Path, branch: &str) -> Result<PathBuf> {
        let repo = if cache_path.join(".git").exists() {
            let repo = Repository::open(cache_path)
                .map_err(|e| git_error("open template cache", e))?;
            let fetched = repo
                .find_remote("origin")
                .and_then(|mut remote| remote.fetch(&[] as &[&str], None, None));
            if let Err(e) = fetched {
                debug!(error = %e, "template fetch failed");
                tools.console.warning(
                    "Unable to update template (is your computer offline?)\n\
                     Briefcase will use existing template without updating.",
                );
            }
            repo
        } else {
            info!(url, path = %cache_path.display(), "cloning template");
            let wait_bar = tools.console.wait_bar(format!("Cloning template {}", url));
            let repo = RepoBuilder::new().clone(url, cache_path).map_err(|e| {
                BriefcaseError::NetworkFailure {
                    action: "clone template repository".to_string(),
                    source: Some(Box::new(e)),
                }
            })?;
            wait_bar.done();
            repo
        };

        let reference = repo
            .find_reference(&format!("refs/remotes/origin/{}", branch))
            .map_err(|_| BriefcaseError::TemplateUnsupportedVersion(branch.to_string()))?;
        let commit = reference
            .peel_to_commit()
            .map_err(|e| git_error("read template branch", e))?;
        tools.console.info(format!(
            "Using template {} (sha {})",
            branch,
            commit.id()
        ));
        repo.checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().force()))
            .map_err(|e| git_error("check out template", e))?;
        repo.set_head_detached(commit.id())
            .map_err(|e| git_error("check out template", e))?;

        Ok(cache_path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fake_tool_cache;
    use git2::Signature;
    use tempfile::TempDir;

    fn template_repo(dir: &Path) -> String {
        let repo = Repository::init(dir).unwrap();
        std::fs::write(dir.join("cookiecutter.json"), "{}").unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new("cookiecutter.json")).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::now("Test", "test@example.com").unwrap();
        let oid = repo.commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[]).unwrap();
        let commit = repo.find_commit(oid).unwrap();
        repo.branch("v0.3", &commit, false).unwrap();
        dir.to_string_lossy().into_owned()
    }

    #[test]
    fn test_verify_reports_missing_git() {
        let dir = TempDir::new().unwrap();
        let (tools, executor) = fake_tool_cache(dir.path(), "Darwin");
        executor.missing(&["git"]);
        let err = Git::verify(&tools).unwrap_err();
        assert!(err.to_string().contains("Xcode provides git"));

        let (tools, executor) = fake_tool_cache(dir.path(), "Linux");
        executor.missing(&["git"]);
        let err = Git::verify(&tools).unwrap_err();
        assert!(err.to_string().contains("not on your PATH"));
    }

    #[test]
    fn test_verify() {
        let dir = TempDir::new().unwrap();
        let (tools, executor) = fake_tool_cache(dir.path(), "Linux");
        executor.on(&["git", "--version"], 0, "git version 2.43.0\n");
        let git = Git::verify(&tools).unwrap();
        assert_eq!(git.version, "git version 2.43.0");
    }

    #[test]
    fn test_template_cache_clone_and_refresh() {
        let dir = TempDir::new().unwrap();
        let (tools, executor) = fake_tool_cache(dir.path(), "Linux");
        executor.on(&["git", "--version"], 0, "git version 2.43.0\n");
        let git = Git::verify(&tools).unwrap();

        let url = template_repo(&dir.path().join("template"));
        let cache = dir.path().join("cache").join("template");

        let path = git.update_template_cache(&tools, &url, &cache, "v0.3").unwrap();
        assert_eq!(path, cache);
        assert!(cache.join("cookiecutter.json").exists());

        // Second call refreshes the existing clone
        git.update_template_cache(&tools, &url, &cache, "v0.3").unwrap();

        let err = git
            .update_template_cache(&tools, &url, &cache, "v9.9")
            .unwrap_err();
        assert_eq!(err.to_string(), "Template does not support v9.9");
    }
}
