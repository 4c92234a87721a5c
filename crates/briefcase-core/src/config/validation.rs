//! Configuration validation

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::error::{BriefcaseError, Result};

use super::types::AppConfig;

/// Words that cannot be used as app names or bundle identifier parts
const RESERVED_WORDS: &[&str] = &[
    // Python
    "false", "none", "true", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return",
    "try", "while", "with", "yield",
    // Java, for Android package names
    "abstract", "boolean", "byte", "case", "catch", "char", "const", "default", "do", "double",
    "enum", "extends", "final", "float", "goto", "implements", "instanceof", "int",
    "interface", "long", "native", "new", "package", "private", "protected", "public",
    "short", "static", "strictfp", "super", "switch", "synchronized", "this", "throw",
    "throws", "transient", "void", "volatile",
];

/// PEP 508 distribution name
static PEP508_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^([A-Z0-9]|[A-Z0-9][A-Z0-9._-]*[A-Z0-9])$").expect("Invalid regex")
});

static BUNDLE_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9-]+(\.[a-zA-Z0-9-]+)+$").expect("Invalid regex"));

/// Canonical PEP 440 version
static PEP440_CANONICAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^((?P<epoch>[1-9][0-9]*)!)?(?P<release>(0|[1-9][0-9]*)(\.(0|[1-9][0-9]*))*)((?P<pre_tag>a|b|rc)(?P<pre_value>0|[1-9][0-9]*))?(\.post(?P<post>0|[1-9][0-9]*))?(\.dev(?P<dev>0|[1-9][0-9]*))?$",
    )
    .expect("Invalid regex")
});

pub fn is_reserved_keyword(word: &str) -> bool {
    RESERVED_WORDS.contains(&word.to_lowercase().as_str())
}

/// PEP 508 compliant and not a reserved word
pub fn is_valid_app_name(name: &str) -> bool {
    PEP508_NAME.is_match(name) && !is_reserved_keyword(name)
}

/// Reverse-domain identifier; `in` and `is` are tolerated as parts
pub fn is_valid_bundle_identifier(bundle: &str) -> bool {
    if !BUNDLE_IDENTIFIER.is_match(bundle) {
        return false;
    }
    bundle
        .split('.')
        .all(|part| part == "in" || part == "is" || !is_reserved_keyword(part))
}

pub fn is_pep440_canonical_version(version: &str) -> bool {
    PEP440_CANONICAL.is_match(version)
}

/// Validate a fully layered app configuration
pub fn validate_app(app: &AppConfig) -> Result<()> {
    debug!(app = %app.app_name, "validating app configuration");

    if !is_valid_app_name(&app.app_name) {
        return Err(BriefcaseError::config(format!(
            "'{}' is not a valid app name.\n\n\
             App names must not be reserved keywords such as 'and', 'for' and 'while'.\n\
             They must also be PEP508 compliant (i.e., they can only include letters,\n\
             numbers, '-' and '_'; must start with a letter; and cannot end with '-' or '_').",
            app.app_name
        )));
    }

    let bundle_id = app.bundle_identifier();
    if !is_valid_bundle_identifier(&bundle_id) {
        return Err(BriefcaseError::config(format!(
            "'{}' is not a valid bundle identifier.\n\n\
             The bundle should be a reversed domain name. It must contain at least 2\n\
             dot-separated sections; each section may only include letters, numbers,\n\
             and hyphens; and each section may not contain any reserved words (like\n\
             'switch', or 'while').",
            bundle_id
        )));
    }

    if !is_pep440_canonical_version(&app.version) {
        return Err(BriefcaseError::config(format!(
            "Version number for '{}' ({}) is not valid.\n\n\
             Version numbers must be PEP440 compliant; \
             see https://www.python.org/dev/peps/pep-0440/ for details.",
            app.app_name, app.version
        )));
    }

    let modules: HashSet<&str> = app
        .sources
        .iter()
        .map(|source| source.rsplit('/').next().unwrap_or(source))
        .collect();
    if modules.len() != app.sources.len() {
        return Err(BriefcaseError::config(format!(
            "The `sources` list for '{}' contains duplicated package names.",
            app.app_name
        )));
    }

    let module_name = app.module_name();
    if !modules.contains(module_name.as_str()) {
        return Err(BriefcaseError::config(format!(
            "The `sources` list for '{}' does not include a package named '{}'.",
            app.app_name, module_name
        )));
    }

    Ok(())
}

/// Validate the project-wide version, when one is declared
pub fn validate_global_version(version: Option<&str>) -> Result<()> {
    match version {
        Some(version) if !is_pep440_canonical_version(version) => Err(BriefcaseError::config(
            format!(
                "Version number ({}) is not valid.\n\n\
                 Version numbers must be PEP440 compliant; \
                 see https://www.python.org/dev/peps/pep-0440/ for details.",
                version
            ),
        )),
        _ => Ok(()),
    }
}
