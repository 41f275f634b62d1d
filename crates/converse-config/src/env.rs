use std::sync::LazyLock;

use regex::{Captures, Regex};
use thiserror::Error;

/// `{{ env.NAME }}` or `{{ env.NAME | default("value") }}`
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{\{\s*([A-Za-z0-9_.]+)\s*(?:\|\s*default\("([^"]*)"\)\s*)?\}\}"#).expect("must be valid regex")
});

/// Failure while expanding placeholders
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvError {
    /// Variable is unset and no default was given
    #[error("environment variable not found: `{0}`")]
    Missing(String),
    /// Placeholder does not start with `env.`
    #[error("only variables scoped with 'env.' are supported: `{0}`")]
    UnsupportedScope(String),
}

/// Expand environment placeholders in raw config text
///
/// Comment lines are copied untouched so commented-out secrets do not have
/// to be set.
pub fn expand_env(input: &str) -> Result<String, EnvError> {
    let mut output = String::with_capacity(input.len());

    for line in input.split_inclusive('\n') {
        if line.trim_start().starts_with('#') {
            output.push_str(line);
        } else {
            expand_line(line, &mut output)?;
        }
    }

    Ok(output)
}

fn expand_line(line: &str, output: &mut String) -> Result<(), EnvError> {
    let mut cursor = 0;

    for captures in PLACEHOLDER.captures_iter(line) {
        let Some(whole) = captures.get(0) else { continue };
        output.push_str(&line[cursor..whole.start()]);
        output.push_str(&resolve(&captures)?);
        cursor = whole.end();
    }

    output.push_str(&line[cursor..]);
    Ok(())
}

fn resolve(captures: &Captures<'_>) -> Result<String, EnvError> {
    let key = captures.get(1).map_or("", |m| m.as_str());
    let fallback = captures.get(2).map(|m| m.as_str());

    let Some(name) = key.strip_prefix("env.").filter(|name| !name.contains('.')) else {
        return Err(EnvError::UnsupportedScope(key.to_owned()));
    };

    match (std::env::var(name), fallback) {
        (Ok(value), _) => Ok(value),
        (Err(_), Some(fallback)) => Ok(fallback.to_owned()),
        (Err(_), None) => Err(EnvError::Missing(name.to_owned())),
    }
}
