//! Inline loader request parsing.
//!
//! A raw request may carry an inline loader chain and prefixes controlling
//! automatic loader application:
//!
//! ```text
//! [-!|!|!!][<match-resource>!=!]loader1!loader2!...!resource?query
//! ```
//!
//! Prefix contract (these five combinations are complete; anything else is
//! not interpreted):
//!
//! - no prefix - all automatic loader classes apply
//! - `!`  - suppresses normal and pre automatic loaders
//! - `-!` - suppresses pre automatic loaders only
//! - `!!` - suppresses pre, normal and post automatic loaders; inline
//!   loaders are kept
//!
//! A match-resource override (`<match>!=!<rest>`) is recognized after
//! prefix stripping; prefixes apply to the request as a whole.

/// Result of breaking a raw request apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    /// Override used for rule matching and module naming.
    pub match_resource: Option<String>,
    /// Explicit inline loader specs, left to right.
    pub inline_loaders: Vec<String>,
    /// Resource path without query.
    pub resource: String,
    /// Query including the leading `?`, or empty.
    pub query: String,
    pub no_pre_auto_loaders: bool,
    pub no_normal_auto_loaders: bool,
    pub no_post_auto_loaders: bool,
}

impl ParsedRequest {
    /// Resource with its query reattached.
    pub fn resource_with_query(&self) -> String {
        format!("{}{}", self.resource, self.query)
    }
}

/// Parse a raw request string.
pub fn parse_loader_request(raw: &str) -> ParsedRequest {
    let (rest, no_pre, no_normal, no_post) = if let Some(rest) = raw.strip_prefix("!!") {
        (rest, true, true, true)
    } else if let Some(rest) = raw.strip_prefix("-!") {
        (rest, true, false, false)
    } else if let Some(rest) = raw.strip_prefix('!') {
        (rest, true, true, false)
    } else {
        (raw, false, false, false)
    };

    let (match_resource, rest) = match rest.split_once("!=!") {
        Some((match_resource, tail)) => (Some(match_resource.to_string()), tail),
        None => (None, rest),
    };

    let mut segments: Vec<&str> = rest.split('!').collect();
    let resource_segment = segments.pop().unwrap_or("");
    let inline_loaders = segments
        .into_iter()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    let (resource, query) = split_query(resource_segment);

    ParsedRequest {
        match_resource,
        inline_loaders,
        resource: resource.to_string(),
        query: query.to_string(),
        no_pre_auto_loaders: no_pre,
        no_normal_auto_loaders: no_normal,
        no_post_auto_loaders: no_post,
    }
}

/// Split `path?query` into `(path, query-with-?)`.
pub fn split_query(request: &str) -> (&str, &str) {
    match request.find('?') {
        Some(index) => request.split_at(index),
        None => (request, ""),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn plain_resource() {
        let parsed = parse_loader_request("./src/a.js");
        assert_eq!(parsed.resource, "./src/a.js");
        assert!(parsed.inline_loaders.is_empty());
        assert!(!parsed.no_pre_auto_loaders);
        assert!(!parsed.no_normal_auto_loaders);
        assert!(!parsed.no_post_auto_loaders);
    }

    #[test]
    fn inline_loader_chain_with_query() {
        let parsed = parse_loader_request("style-loader!css-loader?modules!./app.css?inline");
        assert_eq!(
            parsed.inline_loaders,
            vec!["style-loader", "css-loader?modules"]
        );
        assert_eq!(parsed.resource, "./app.css");
        assert_eq!(parsed.query, "?inline");
    }

    #[test]
    fn single_bang_disables_normal_and_pre() {
        let parsed = parse_loader_request("!raw-loader!./file.txt");
        assert_eq!(parsed.inline_loaders, vec!["raw-loader"]);
        assert!(parsed.no_pre_auto_loaders);
        assert!(parsed.no_normal_auto_loaders);
        assert!(!parsed.no_post_auto_loaders);
    }

    #[test]
    fn double_bang_disables_all_auto_loaders() {
        let parsed = parse_loader_request("!!raw-loader!./file.txt");
        assert_eq!(parsed.inline_loaders, vec!["raw-loader"]);
        assert!(parsed.no_pre_auto_loaders);
        assert!(parsed.no_normal_auto_loaders);
        assert!(parsed.no_post_auto_loaders);
    }

    #[test]
    fn dash_bang_disables_pre_only() {
        let parsed = parse_loader_request("-!./file.txt");
        assert!(parsed.inline_loaders.is_empty());
        assert!(parsed.no_pre_auto_loaders);
        assert!(!parsed.no_normal_auto_loaders);
        assert!(!parsed.no_post_auto_loaders);
    }

    #[test]
    fn match_resource_is_split_after_prefixes() {
        let parsed = parse_loader_request("!!./virtual.css!=!css-loader!./real.js");
        assert_eq!(parsed.match_resource.as_deref(), Some("./virtual.css"));
        assert_eq!(parsed.inline_loaders, vec!["css-loader"]);
        assert_eq!(parsed.resource, "./real.js");
        assert!(parsed.no_post_auto_loaders);
    }

    #[test]
    fn query_only_resource_keeps_empty_path() {
        let parsed = parse_loader_request("?config=theme");
        assert_eq!(parsed.resource, "");
        assert_eq!(parsed.query, "?config=theme");
    }

    #[test]
    fn empty_loader_segments_are_dropped() {
        let parsed = parse_loader_request("a-loader!!b-loader!./x.js");
        // An interior double bang is just an empty segment, not a prefix.
        assert_eq!(parsed.inline_loaders, vec!["a-loader", "b-loader"]);
        assert_eq!(parsed.resource, "./x.js");
    }
}
