//! Source distribution artifacts

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// PEP 440 public and local version grammar
static VERSION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)
        ^\s*v?
        (?:(?P<epoch>[0-9]+)!)?
        (?P<release>[0-9]+(?:\.[0-9]+)*)
        (?:[-_.]?(?P<pre_l>alpha|beta|preview|pre|rc|a|b|c)[-_.]?(?P<pre_n>[0-9]+)?)?
        (?:-(?P<post_n1>[0-9]+)|[-_.]?(?P<post_l>post|rev|r)[-_.]?(?P<post_n2>[0-9]+)?)?
        (?:[-_.]?(?P<dev_l>dev)[-_.]?(?P<dev_n>[0-9]+)?)?
        (?:\+(?P<local>[a-z0-9]+(?:[-_.][a-z0-9]+)*))?
        \s*$",
    )
    .expect("Invalid version regex")
});

/// Archive extensions `setup.py sdist` can produce
pub const ARCHIVE_EXTENSIONS: [&str; 3] = [".zip", ".tar.gz", ".tgz"];

/// Which of the two packages an sdist holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageRole {
    /// Built from the root of the source tree
    Core,
    /// Built from the server-extension subtree, may depend on core
    Server,
}

impl fmt::Display for PackageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageRole::Core => write!(f, "core"),
            PackageRole::Server => write!(f, "server"),
        }
    }
}

/// An sdist produced by this build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuiltSdist {
    pub role: PackageRole,
    pub package: String,
    pub version: String,
    pub archive: PathBuf,
}

impl BuiltSdist {
    /// Recognises an sdist from its file name inside `dir`
    pub fn from_archive(role: PackageRole, dir: &Path, file_name: &str) -> Option<Self> {
        let (package, version) = parse_archive_name(file_name)?;
        Some(Self {
            role,
            package,
            version,
            archive: dir.join(file_name),
        })
    }

    /// The archive a build is expected to produce, used for planning
    pub fn expected(
        role: PackageRole,
        dir: &Path,
        package: &str,
        version: &str,
        format: &str,
    ) -> Self {
        let extension = match format {
            "gztar" => ".tar.gz",
            _ => ".zip",
        };
        let version = normalize_version(version).unwrap_or_else(|| version.to_string());
        Self {
            role,
            package: package.to_string(),
            archive: dir.join(format!("{}-{}{}", package, version, extension)),
            version,
        }
    }

    /// True if `name` refers to the same distribution as this sdist
    pub fn is_package(&self, name: &str) -> bool {
        normalize_name(&self.package) == normalize_name(name)
    }

    /// True if this sdist carries `version`, compared in normalised form
    pub fn has_version(&self, version: &str) -> bool {
        match (normalize_version(&self.version), normalize_version(version)) {
            (Some(ours), Some(theirs)) => ours == theirs,
            _ => self.version == version,
        }
    }
}

pub fn is_archive(file_name: &str) -> bool {
    ARCHIVE_EXTENSIONS.iter().any(|ext| file_name.ends_with(ext))
}

/// Splits `grr-response-core-3.2.0.post1.zip` into name and version
pub fn parse_archive_name(file_name: &str) -> Option<(String, String)> {
    let stem = ARCHIVE_EXTENSIONS
        .iter()
        .find_map(|ext| file_name.strip_suffix(ext))?;
    let (name, version) = stem.rsplit_once('-')?;

    if name.is_empty() || !version.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }

    Some((name.to_string(), version.to_string()))
}

/// Distribution name normalisation: lowercase, runs of `-_.` become `-`
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.chars() {
        if matches!(c, '-' | '_' | '.') {
            pending_sep = true;
            continue;
        }
        if pending_sep && !out.is_empty() {
            out.push('-');
        }
        pending_sep = false;
        out.push(c.to_ascii_lowercase());
    }
    out
}

/// PEP 440 normal form of a version, `None` if it is not a valid one
///
/// This is the spelling setuptools puts into archive names, e.g.
/// `3.2.0-rc1` becomes `3.2.0rc1` and `1.0-1` becomes `1.0.post1`.
pub fn normalize_version(version: &str) -> Option<String> {
    let caps = VERSION_REGEX.captures(version)?;
    let number = |name: &str| {
        caps.name(name)
            .map(|m| trim_zeros(m.as_str()))
            .unwrap_or_else(|| "0".to_string())
    };

    let mut out = String::new();
    if let Some(epoch) = caps.name("epoch") {
        let epoch = trim_zeros(epoch.as_str());
        if epoch != "0" {
            out.push_str(&epoch);
            out.push('!');
        }
    }

    let release: Vec<String> = caps["release"].split('.').map(trim_zeros).collect();
    out.push_str(&release.join("."));

    if let Some(label) = caps.name("pre_l") {
        let label = match label.as_str().to_ascii_lowercase().as_str() {
            "a" | "alpha" => "a",
            "b" | "beta" => "b",
            _ => "rc",
        };
        out.push_str(label);
        out.push_str(&number("pre_n"));
    }

    if let Some(n) = caps.name("post_n1") {
        out.push_str(".post");
        out.push_str(&trim_zeros(n.as_str()));
    } else if caps.name("post_l").is_some() {
        out.push_str(".post");
        out.push_str(&number("post_n2"));
    }

    if caps.name("dev_l").is_some() {
        out.push_str(".dev");
        out.push_str(&number("dev_n"));
    }

    if let Some(local) = caps.name("local") {
        out.push('+');
        out.push_str(&local.as_str().to_ascii_lowercase().replace(['-', '_'], "."));
    }

    Some(out)
}

fn trim_zeros(digits: &str) -> String {
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}
