//! Text transformations applied to HLS playlists on their way through the
//! proxy.
//!
//! The pipeline runs in a fixed order: the port-1935 downgrade, the general
//! downgrade sweep, then reference rewriting. Every stage is a pure function
//! of its input.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use url::Url;

/// Ingest port served only over plaintext even when playlists advertise https.
pub const PLAINTEXT_INGEST_PORT: &str = "1935";

static INGEST_HTTPS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)https://(\d{1,3}(?:\.\d{1,3}){3}):1935").expect("valid regex")
});

static IPV4_HTTPS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https://(\d+\.\d+\.\d+\.\d+):([0-9]+)").expect("valid regex"));

/// State for one reference-rewriting pass.
#[derive(Debug, Clone)]
pub struct RewriteContext {
    /// Final upstream URL after redirects.
    pub base: Url,
    /// Base URL of this proxy, ending with `/`.
    pub proxy_base: Url,
}

impl RewriteContext {
    pub fn new(base: Url, proxy_base: Url) -> Self {
        Self { base, proxy_base }
    }

    /// Link that routes `target` back through the `/proxy` endpoint.
    pub fn proxy_link(&self, target: &Url) -> String {
        let mut link = self
            .proxy_base
            .join("proxy")
            .unwrap_or_else(|_| self.proxy_base.clone());
        link.set_query(None);
        link.query_pairs_mut().append_pair("url", target.as_str());
        link.into()
    }
}

const BYTE_ORDER_MARK: char = '\u{feff}';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestLine<'a> {
    /// Blank line, comment or tag; copied as-is.
    Passthrough,
    /// Trimmed URI reference.
    Reference(&'a str),
}

impl<'a> ManifestLine<'a> {
    pub fn classify(content: &'a str) -> Self {
        let trimmed = content.trim_start_matches(BYTE_ORDER_MARK).trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            ManifestLine::Passthrough
        } else {
            ManifestLine::Reference(trimmed)
        }
    }
}

/// `https://<ipv4>:1935` becomes `http://<ipv4>:1935`.
pub fn downgrade_ingest_port(text: &str) -> Cow<'_, str> {
    INGEST_HTTPS.replace_all(text, "http://${1}:1935")
}

/// Sweeps every `https://<ipv4>:<port>` and downgrades only port 1935.
pub fn downgrade_ipv4_https(text: &str) -> Cow<'_, str> {
    IPV4_HTTPS.replace_all(text, |caps: &Captures<'_>| {
        if &caps[2] == PLAINTEXT_INGEST_PORT {
            format!("http://{}:{}", &caps[1], &caps[2])
        } else {
            caps[0].to_string()
        }
    })
}

/// Both downgrade passes, in order.
pub fn downgrade_protocol(text: &str) -> String {
    let first = downgrade_ingest_port(text);
    downgrade_ipv4_https(&first).into_owned()
}

/// Rewrites every network reference line into a proxy link. Line terminators
/// are kept byte for byte.
pub fn rewrite_references(text: &str, context: &RewriteContext) -> String {
    let mut output = String::with_capacity(text.len() * 2);
    for line in text.split_inclusive('\n') {
        let (content, terminator) = split_terminator(line);
        match ManifestLine::classify(content) {
            ManifestLine::Passthrough => output.push_str(content),
            ManifestLine::Reference(reference) => match resolve_network_url(&context.base, reference) {
                Some(resolved) => output.push_str(&context.proxy_link(&resolved)),
                None => output.push_str(content),
            },
        }
        output.push_str(terminator);
    }
    output
}

/// Full manifest pipeline.
pub fn rewrite_manifest(text: &str, context: &RewriteContext) -> String {
    let downgraded = downgrade_protocol(text);
    rewrite_references(&downgraded, context)
}

fn split_terminator(line: &str) -> (&str, &str) {
    if let Some(content) = line.strip_suffix("\r\n") {
        (content, &line[content.len()..])
    } else if let Some(content) = line.strip_suffix('\n') {
        (content, &line[content.len()..])
    } else {
        (line, "")
    }
}

fn resolve_network_url(base: &Url, reference: &str) -> Option<Url> {
    let resolved = base.join(reference).ok()?;
    matches!(resolved.scheme(), "http" | "https").then_some(resolved)
}
