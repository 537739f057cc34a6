//! Configuration file parsing
//!
//! One setting per line as `key: value`. Keys are case-insensitive and a
//! `#` starts a comment anywhere on the line. Inline command-line
//! overrides reuse [`split_setting`] so both sources share one grammar.

use crate::Result;
use anyhow::{anyhow, bail, Context};
use std::fs;
use std::path::Path;

/// Read all settings from a configuration file, in file order.
pub fn read_settings(path: &Path) -> Result<Vec<(String, String)>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("can't read config file {}", path.display()))?;

    let mut settings = Vec::new();

    for (lineno, raw) in text.lines().enumerate() {
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }

        let setting = split_setting(line)
            .with_context(|| format!("{}:{}", path.display(), lineno + 1))?;
        settings.push(setting);
    }

    Ok(settings)
}

/// Split one `key: value` setting; the key is lowercased.
pub fn split_setting(s: &str) -> Result<(String, String)> {
    let (key, value) = s
        .split_once(':')
        .ok_or_else(|| anyhow!("expected 'key: value', got '{}'", s))?;

    let key = key.trim().to_ascii_lowercase();
    let value = value.trim().to_string();

    if key.is_empty() {
        bail!("empty key in '{}'", s);
    }
    if value.is_empty() {
        bail!("empty value for '{}'", key);
    }

    Ok((key, value))
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}
