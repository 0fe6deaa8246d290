//! Link extraction from the annex page.
//!
//! Scans every `<a href>` on the page and assigns URLs to configured
//! [`AnnexTarget`]s. A link qualifies for a target when its URL ends in the
//! target's required extension and one of the target's patterns appears in the
//! anchor text, or in the URL right after a `/` or `_`.
//!
//! Pattern matches must end on a word boundary, so `anexo i` never matches
//! the text `anexo ii`.

use regex::Regex;
use scraper::{Html, Selector};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::download::DownloadBatch;

/// Errors raised while scanning the page.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The anchor selector failed to compile.
    #[error("invalid CSS selector `{selector}`: {reason}")]
    InvalidSelector {
        /// The selector source.
        selector: &'static str,
        /// Parser message.
        reason: String,
    },

    /// A target's patterns did not compile into a matcher.
    #[error("invalid pattern for target `{target}`: {source}")]
    InvalidPattern {
        /// The target name.
        target: String,
        /// Regex compiler error.
        #[source]
        source: regex::Error,
    },
}

/// Anything other than a letter or digit, or the end of the input.
const WORD_END: &str = r"(?:[^\p{L}\p{N}]|$)";

/// A file to look for on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnexTarget {
    /// Logical file name the link is saved under.
    pub name: String,
    /// Lower-case fragments that identify the link.
    pub patterns: Vec<String>,
    /// Lower-case suffix the URL path must end with, e.g. `.pdf`.
    pub required_extension: String,
}

impl AnnexTarget {
    /// Creates a target; patterns and extension are lower-cased.
    pub fn new<I, P>(name: impl Into<String>, patterns: I, required_extension: &str) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        Self {
            name: name.into(),
            patterns: patterns
                .into_iter()
                .map(|p| p.as_ref().to_lowercase())
                .collect(),
            required_extension: required_extension.to_lowercase(),
        }
    }

    fn matcher(&self) -> Result<TargetMatcher<'_>, ExtractError> {
        let alternatives = self
            .patterns
            .iter()
            .filter(|p| !p.is_empty())
            .map(|p| regex::escape(p))
            .collect::<Vec<_>>()
            .join("|");
        let compile = |pattern: String| {
            Regex::new(&pattern).map_err(|source| ExtractError::InvalidPattern {
                target: self.name.clone(),
                source,
            })
        };

        Ok(TargetMatcher {
            target: self,
            text: compile(format!("(?i)(?:{alternatives}){WORD_END}"))?,
            url: compile(format!("(?i)[/_](?:{alternatives}){WORD_END}"))?,
            empty: alternatives.is_empty(),
        })
    }
}

/// Compiled form of an [`AnnexTarget`].
struct TargetMatcher<'a> {
    target: &'a AnnexTarget,
    text: Regex,
    url: Regex,
    empty: bool,
}

impl TargetMatcher<'_> {
    fn matches(&self, anchor_text: &str, url: &Url) -> bool {
        if self.empty
            || !url
                .path()
                .to_lowercase()
                .ends_with(&self.target.required_extension)
        {
            return false;
        }
        self.text.is_match(anchor_text) || self.url.is_match(url.as_str())
    }
}

/// The two annexes of the procedure-list update page.
#[must_use]
pub fn default_targets() -> Vec<AnnexTarget> {
    vec![
        AnnexTarget::new("Anexo_I.pdf", ["anexo i", "anexo_i"], ".pdf"),
        AnnexTarget::new("Anexo_II.pdf", ["anexo ii", "anexo_ii"], ".pdf"),
    ]
}

/// Finds the target links in `html`, resolving relative hrefs against `page_url`.
///
/// Returns a batch in target-discovery order. Each target takes the first
/// qualifying link in document order, and one URL is never assigned to two
/// targets. An empty batch means nothing matched.
///
/// # Errors
///
/// Returns [`ExtractError::InvalidSelector`] if the anchor selector fails to
/// compile, or [`ExtractError::InvalidPattern`] if a target's patterns do not.
#[instrument(skip(html, targets), fields(page = %page_url, targets = targets.len()))]
pub fn extract_links(
    html: &str,
    page_url: &Url,
    targets: &[AnnexTarget],
) -> Result<DownloadBatch, ExtractError> {
    const ANCHOR_SELECTOR: &str = "a[href]";

    info!("extracting annex links");
    let document = Html::parse_document(html);
    let selector =
        Selector::parse(ANCHOR_SELECTOR).map_err(|e| ExtractError::InvalidSelector {
            selector: ANCHOR_SELECTOR,
            reason: e.to_string(),
        })?;

    let matchers = targets
        .iter()
        .map(AnnexTarget::matcher)
        .collect::<Result<Vec<_>, _>>()?;
    let mut links = DownloadBatch::new();

    for anchor in document.select(&selector) {
        if links.len() == targets.len() {
            break;
        }

        let Some(href) = anchor.value().attr("href").map(str::trim) else {
            continue;
        };
        if href.is_empty() {
            continue;
        }
        let Ok(url) = page_url.join(href) else {
            debug!(href, "skipping unparseable href");
            continue;
        };
        if links.contains_url(url.as_str()) {
            continue;
        }

        let text = anchor.text().collect::<String>();
        let text = text.trim();

        if let Some(target) = matchers
            .iter()
            .filter(|m| !links.contains_name(&m.target.name))
            .find(|m| m.matches(text, &url))
            .map(|m| m.target)
        {
            info!(name = %target.name, url = %url, "found annex link");
            links.insert(target.name.clone(), url.to_string());
        }
    }

    if links.is_empty() {
        warn!("no annex links found on page");
    } else {
        info!(found = links.len(), wanted = targets.len(), "annex links extracted");
    }

    Ok(links)
}
