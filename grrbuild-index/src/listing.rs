//! Link listings served by package indexes
//!
//! Both flat find-links pages and PEP 503 project pages are plain HTML with
//! one anchor per distribution file.

use grrbuild_core::domain::sdist::normalize_name;
use once_cell::sync::Lazy;
use regex::Regex;

/// Files offered by one index page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexListing {
    pub url: String,
    /// File names, without URL path, query or fragment
    pub files: Vec<String>,
}

impl IndexListing {
    pub fn parse(url: impl Into<String>, html: &str) -> Self {
        let files = extract_hrefs(html)
            .into_iter()
            .filter_map(|href| file_name(&href))
            .collect();
        Self {
            url: url.into(),
            files,
        }
    }

    /// Files that belong to `package`, in page order
    pub fn files_for(&self, package: &str) -> Vec<&str> {
        let wanted = normalize_name(package);
        self.files
            .iter()
            .filter(|f| distribution_name(f).is_some_and(|n| normalize_name(n) == wanted))
            .map(String::as_str)
            .collect()
    }
}

/// An `href` attribute with a double-quoted, single-quoted or bare value
static HREF_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\bhref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("Invalid href regex")
});

/// Values of every `href` attribute on the page
fn extract_hrefs(html: &str) -> Vec<String> {
    HREF_REGEX
        .captures_iter(html)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)))
        .map(|m| m.as_str().to_string())
        .filter(|href| !href.is_empty())
        .collect()
}

/// Last path segment of a link, without query or fragment
fn file_name(href: &str) -> Option<String> {
    let href = href.split(['#', '?']).next().unwrap_or(href);
    let name = href.rsplit('/').next()?;
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Distribution name of a wheel or sdist file: everything before the
/// first `-` that is followed by a digit
fn distribution_name(file: &str) -> Option<&str> {
    let bytes = file.as_bytes();
    (1..bytes.len().saturating_sub(1))
        .find(|&i| bytes[i] == b'-' && bytes[i + 1].is_ascii_digit())
        .map(|i| &file[..i])
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIND_LINKS_PAGE: &str = r#"<html><body>
<a href="https://storage.googleapis.com/releases.grr-response.com/grr_response_templates-3.2.0.post1.tar.gz">templates</a>
<A HREF='grr-response-templates-3.1.4.zip#sha256=abc'>old</A>
<a href=grr-response-core-3.2.0.post1.zip>core</a>
<a href="other/">dir</a>
</body></html>"#;

    #[test]
    fn test_parse_extracts_file_names() {
        let listing = IndexListing::parse("https://example.com/index.html", FIND_LINKS_PAGE);
        assert_eq!(
            listing.files,
            vec![
                "grr_response_templates-3.2.0.post1.tar.gz",
                "grr-response-templates-3.1.4.zip",
                "grr-response-core-3.2.0.post1.zip",
            ]
        );
    }

    #[test]
    fn test_files_for_normalizes_names() {
        let listing = IndexListing::parse("https://example.com/index.html", FIND_LINKS_PAGE);
        assert_eq!(
            listing.files_for("grr-response-templates"),
            vec![
                "grr_response_templates-3.2.0.post1.tar.gz",
                "grr-response-templates-3.1.4.zip",
            ]
        );
        assert_eq!(listing.files_for("GRR_Response_Core").len(), 1);
        assert!(listing.files_for("grr-response-server").is_empty());
    }

    #[test]
    fn test_simple_index_anchors_with_extra_attributes() {
        let page = r#"<!DOCTYPE html><html><body>
<a href="../../packages/grr_response_templates-3.2.0.post1-py2-none-any.whl#sha256=00ff" data-requires-python="&gt;=2.7">grr_response_templates-3.2.0.post1-py2-none-any.whl</a><br/>
<a data-dist-info-metadata="true" href = "grr-response-templates-3.2.0.tar.gz">grr-response-templates-3.2.0.tar.gz</a>
</body></html>"#;

        let listing = IndexListing::parse("https://example.com/simple/grr-response-templates/", page);
        assert_eq!(
            listing.files,
            vec![
                "grr_response_templates-3.2.0.post1-py2-none-any.whl",
                "grr-response-templates-3.2.0.tar.gz",
            ]
        );
    }

    #[test]
    fn test_empty_page() {
        let listing = IndexListing::parse("https://example.com/", "<html></html>");
        assert!(listing.files.is_empty());
    }

    #[test]
    fn test_distribution_name() {
        assert_eq!(
            distribution_name("grr_response_core-3.2.0-py2-none-any.whl"),
            Some("grr_response_core")
        );
        assert_eq!(distribution_name("no-version.zip"), None);
    }
}
