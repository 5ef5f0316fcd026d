//! Version metadata
//!
//! The source tree's `version.ini` is the single source of truth for the
//! version embedded into both sdists. The file is an INI document with a
//! `[Version]` section whose values may reference each other with
//! `%(key)s` interpolation:
//!
//! ```ini
//! [Version]
//! major = 3
//! minor = 2
//! revision = 0
//! release = 1
//! packageversion = %(major)s.%(minor)s.%(revision)s.post%(release)s
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

const SECTION: &str = "version";
const MAX_INTERPOLATION_DEPTH: usize = 10;

#[derive(Debug, Error)]
pub enum VersionError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no [Version] section")]
    MissingSection,

    #[error("missing key `{0}` in [Version]")]
    MissingKey(String),

    #[error("`{key}` is not a number: {value}")]
    InvalidNumber { key: String, value: String },

    #[error("cannot interpolate `{0}`")]
    Interpolation(String),

    #[error("malformed line {line}: {content}")]
    Malformed { line: usize, content: String },
}

/// Parsed contents of `version.ini`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub major: u32,
    pub minor: u32,
    pub revision: u32,
    pub release: u32,
    package_version: String,
}

impl VersionInfo {
    pub const FILE_NAME: &'static str = "version.ini";

    /// Reads `version.ini` from a source tree
    pub fn load(source_dir: &Path) -> Result<Self, VersionError> {
        let path = source_dir.join(Self::FILE_NAME);
        let content = std::fs::read_to_string(&path)
            .map_err(|source| VersionError::Read { path, source })?;
        Self::from_ini(&content)
    }

    pub fn from_ini(content: &str) -> Result<Self, VersionError> {
        let raw = parse_section(content)?;

        let number = |key: &str| -> Result<u32, VersionError> {
            let value = interpolate(&raw, key, 0)?;
            value.parse().map_err(|_| VersionError::InvalidNumber {
                key: key.to_string(),
                value,
            })
        };

        let major = number("major")?;
        let minor = number("minor")?;
        let revision = number("revision")?;
        let release = number("release")?;

        let package_version = if raw.contains_key("packageversion") {
            interpolate(&raw, "packageversion", 0)?
        } else {
            format!("{}.{}.{}.post{}", major, minor, revision, release)
        };

        Ok(Self {
            major,
            minor,
            revision,
            release,
            package_version,
        })
    }

    /// Version string both sdists must carry
    pub fn package_version(&self) -> &str {
        &self.package_version
    }
}

/// Collects the key/value pairs of the `[Version]` section
fn parse_section(content: &str) -> Result<HashMap<String, String>, VersionError> {
    let mut values = HashMap::new();
    let mut in_section = false;
    let mut seen_section = false;

    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_section = name.trim().eq_ignore_ascii_case(SECTION);
            seen_section |= in_section;
            continue;
        }

        if !in_section {
            continue;
        }

        let (key, value) = line
            .split_once('=')
            .or_else(|| line.split_once(':'))
            .ok_or_else(|| VersionError::Malformed {
                line: idx + 1,
                content: line.to_string(),
            })?;

        values.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
    }

    if !seen_section {
        return Err(VersionError::MissingSection);
    }

    Ok(values)
}

/// Resolves `%(name)s` references in the value of `key`
fn interpolate(
    values: &HashMap<String, String>,
    key: &str,
    depth: usize,
) -> Result<String, VersionError> {
    if depth > MAX_INTERPOLATION_DEPTH {
        return Err(VersionError::Interpolation(key.to_string()));
    }

    let raw = values
        .get(key)
        .ok_or_else(|| VersionError::MissingKey(key.to_string()))?;

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw.as_str();

    while let Some(start) = rest.find("%(") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find(")s")
            .ok_or_else(|| VersionError::Interpolation(key.to_string()))?;
        let name = after[..end].trim().to_ascii_lowercase();
        out.push_str(&interpolate(values, &name, depth + 1)?);
        rest = &after[end + 2..];
    }
    out.push_str(rest);

    Ok(out)
}
