//! Configuration layer merging

use toml::{Table, Value};

/// Keys whose list values accumulate across layers instead of being replaced
pub const MERGEABLE_KEYS: &[&str] = &["requires", "sources", "test_requires", "test_sources"];

/// Merge `data` on top of `config`.
///
/// Lists under [`MERGEABLE_KEYS`] are concatenated (existing entries first);
/// every other key is overwritten by the later layer.
pub fn merge_config(config: &mut Table, data: &Table) {
    for (key, value) in data {
        if MERGEABLE_KEYS.contains(&key.as_str()) {
            if let Value::Array(items) = value {
                if items.is_empty() {
                    continue;
                }
                if let Some(Value::Array(existing)) = config.get_mut(key) {
                    existing.extend(items.iter().cloned());
                    continue;
                }
            }
        }
        config.insert(key.clone(), value.clone());
    }
}

/// Seed the global layer from a PEP 621 `[project]` table.
///
/// Values already present in `[tool.briefcase]` take priority; dependency
/// lists are prepended to the briefcase ones.
pub fn merge_pep621_config(global: &mut Table, project: &Table) {
    let mut maybe_update = |field: &str, value: Option<&Value>| {
        if global.contains_key(field) {
            return;
        }
        if let Some(value) = value {
            global.insert(field.to_string(), value.clone());
        }
    };

    maybe_update("description", project.get("description"));
    maybe_update(
        "license",
        project
            .get("license")
            .and_then(|l| l.as_table())
            .and_then(|l| l.get("text")),
    );
    maybe_update(
        "url",
        project
            .get("urls")
            .and_then(|u| u.as_table())
            .and_then(|u| u.get("Homepage")),
    );
    maybe_update("version", project.get("version"));

    let first_author = project
        .get("authors")
        .and_then(|a| a.as_array())
        .and_then(|a| a.first())
        .and_then(|a| a.as_table());
    if let Some(author) = first_author {
        maybe_update("author", author.get("name"));
        maybe_update("author_email", author.get("email"));
    }

    prepend_list(
        global,
        "requires",
        project.get("dependencies").and_then(|d| d.as_array()),
    );
    prepend_list(
        global,
        "test_requires",
        project
            .get("optional-dependencies")
            .and_then(|d| d.as_table())
            .and_then(|d| d.get("test"))
            .and_then(|t| t.as_array()),
    );
}

fn prepend_list(config: &mut Table, key: &str, items: Option<&Vec<Value>>) {
    let Some(items) = items else {
        return;
    };
    let mut merged = items.clone();
    if let Some(Value::Array(existing)) = config.get(key) {
        merged.extend(existing.iter().cloned());
    }
    config.insert(key.to_string(), Value::Array(merged));
}
