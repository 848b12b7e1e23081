//! # Bucketing Strategies
//!
//! Maps an incoming request to a [`BucketKey`] — the equivalence class that
//! shares a [`crate::state::ThrottlingState`]. Three strategies are composed
//! in priority order by [`BucketingChain`], each either producing a key or
//! falling through with `None`. The last strategy in the chain always
//! produces a key, so the chain as a whole never returns `None`.

use std::net::IpAddr;
use std::path::Path;

use regex::RegexBuilder;
use tracing::warn;

/// The equivalence class a request is classified into.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BucketKey {
    /// Matched a configured pattern over the `query` parameter or the
    /// `User-Agent` header; the key is the pattern's source string, so all
    /// requests matching the same pattern share state.
    Pattern(String),
    /// Fallback: source IP paired with the raw `User-Agent` value.
    IpAndUserAgent(IpAddr, String),
}

/// The request data bucketing strategies classify against. Owned rather than
/// borrowed from the Axum request, since the filter needs it both before and
/// after `Next::run` consumes the request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub source_ip: IpAddr,
    pub user_agent: String,
    pub query_param: Option<String>,
    pub headers: std::collections::HashMap<String, String>,
    pub query_params: std::collections::HashMap<String, String>,
}

/// A single step in the classification chain.
pub trait BucketingStrategy: Send + Sync {
    fn classify(&self, ctx: &RequestContext) -> Option<BucketKey>;
}

/// Matches a request attribute against a list of precompiled patterns,
/// keying on the first pattern that matches.
pub struct RegexBucketing {
    patterns: Vec<regex::Regex>,
    extract: fn(&RequestContext) -> Option<&str>,
}

impl RegexBucketing {
    /// Regex bucketing over the `query` query parameter.
    pub fn over_query(patterns: Vec<regex::Regex>) -> Self {
        Self {
            patterns,
            extract: |ctx| ctx.query_param.as_deref(),
        }
    }

    /// Regex bucketing over the `User-Agent` header.
    pub fn over_user_agent(patterns: Vec<regex::Regex>) -> Self {
        Self {
            patterns,
            extract: |ctx| Some(ctx.user_agent.as_str()),
        }
    }
}

impl BucketingStrategy for RegexBucketing {
    fn classify(&self, ctx: &RequestContext) -> Option<BucketKey> {
        let subject = (self.extract)(ctx)?;
        self.patterns
            .iter()
            .find(|p| p.is_match(subject))
            .map(|p| BucketKey::Pattern(p.as_str().to_string()))
    }
}

/// The default strategy: always yields a key, pairing source IP with
/// User-Agent.
pub struct UserAgentIpBucketing;

impl BucketingStrategy for UserAgentIpBucketing {
    fn classify(&self, ctx: &RequestContext) -> Option<BucketKey> {
        Some(BucketKey::IpAndUserAgent(ctx.source_ip, ctx.user_agent.clone()))
    }
}

/// An ordered chain of strategies; the first to produce a key wins.
pub struct BucketingChain {
    strategies: Vec<Box<dyn BucketingStrategy>>,
}

impl BucketingChain {
    pub fn new(strategies: Vec<Box<dyn BucketingStrategy>>) -> Self {
        Self { strategies }
    }

    /// Builds the standard three-strategy chain: query-regex, then
    /// User-Agent-regex, then the always-on IP+UA fallback.
    pub fn standard(query_patterns: Vec<regex::Regex>, ua_patterns: Vec<regex::Regex>) -> Self {
        Self::new(vec![
            Box::new(RegexBucketing::over_query(query_patterns)),
            Box::new(RegexBucketing::over_user_agent(ua_patterns)),
            Box::new(UserAgentIpBucketing),
        ])
    }

    /// Classifies a request; guaranteed `Some` when the chain ends in
    /// `UserAgentIpBucketing`, but the signature stays honest about the
    /// general case of an arbitrary chain.
    pub fn classify(&self, ctx: &RequestContext) -> Option<BucketKey> {
        self.strategies.iter().find_map(|s| s.classify(ctx))
    }
}

/// Loads one regex per line from a UTF-8 text file. Lines that fail to
/// compile are logged at `warn` and skipped; a missing file yields an empty
/// list rather than an error, so this strategy degrades to "no opinion"
/// instead of failing startup.
pub fn load_patterns(path: &Path) -> Vec<regex::Regex> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "could not read bucketing pattern file; degrading to no-opinion");
            return Vec::new();
        }
    };

    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            RegexBuilder::new(line)
                .dot_matches_new_line(true)
                .build()
                .map_err(|err| {
                    warn!(pattern = line, error = %err, "skipping invalid bucketing pattern");
                    err
                })
                .ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ctx(query: Option<&str>, ua: &str) -> RequestContext {
        RequestContext {
            source_ip: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            user_agent: ua.to_string(),
            query_param: query.map(str::to_string),
            headers: Default::default(),
            query_params: Default::default(),
        }
    }

    #[test]
    fn query_regex_wins_when_it_matches() {
        let chain = BucketingChain::standard(
            vec![regex::Regex::new("SELECT.*WHERE").unwrap()],
            vec![],
        );
        let key = chain.classify(&ctx(Some("SELECT * WHERE {?a ?b ?c}"), "curl/8.0"));
        assert_eq!(key, Some(BucketKey::Pattern("SELECT.*WHERE".to_string())));
    }

    #[test]
    fn falls_through_to_user_agent_regex() {
        let chain = BucketingChain::standard(
            vec![regex::Regex::new("no-match-here").unwrap()],
            vec![regex::Regex::new("^curl/").unwrap()],
        );
        let key = chain.classify(&ctx(Some("unrelated query"), "curl/8.0"));
        assert_eq!(key, Some(BucketKey::Pattern("^curl/".to_string())));
    }

    #[test]
    fn falls_through_to_ip_and_user_agent_when_nothing_matches() {
        let chain = BucketingChain::standard(vec![], vec![]);
        let key = chain.classify(&ctx(Some("whatever"), "my-client/1.0"));
        assert_eq!(
            key,
            Some(BucketKey::IpAndUserAgent(
                IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
                "my-client/1.0".to_string()
            ))
        );
    }

    #[test]
    fn two_distinct_clients_share_a_pattern_bucket() {
        let chain = BucketingChain::standard(
            vec![regex::Regex::new("SELECT.*WHERE").unwrap()],
            vec![],
        );
        let a = ctx(Some("SELECT * WHERE {?a ?b ?c}"), "client-a/1.0");
        let b = ctx(Some("SELECT * WHERE {?a ?b ?c}"), "client-b/2.0");
        assert_eq!(chain.classify(&a), chain.classify(&b));
    }

    #[test]
    fn missing_pattern_file_degrades_to_empty_list() {
        let patterns = load_patterns(Path::new("/nonexistent/path/to/patterns.txt"));
        assert!(patterns.is_empty());
    }

    #[test]
    fn invalid_pattern_is_skipped_valid_ones_survive() {
        let dir = std::env::temp_dir();
        let path = dir.join("query_throttle_test_patterns.txt");
        std::fs::write(&path, "SELECT.*WHERE\n[unterminated\n^curl/\n").unwrap();
        let patterns = load_patterns(&path);
        assert_eq!(patterns.len(), 2);
        std::fs::remove_file(&path).ok();
    }
}
