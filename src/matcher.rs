use std::collections::HashSet;

use crate::config::CompiledRouteRule;

/// Transient view of an inbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub client_address: Option<String>,
    /// `None` when the caller has no URL information
    pub path: Option<String>,
    pub method: String,
}

impl RequestDescriptor {
    pub fn new(
        client_address: Option<impl Into<String>>,
        path: Option<impl Into<String>>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            client_address: client_address.map(Into::into),
            path: path.map(Into::into),
            method: method.into(),
        }
    }

    /// Shorthand for a client hitting a path with GET
    pub fn get(client_address: &str, path: &str) -> Self {
        Self::new(Some(client_address), Some(path), "GET")
    }
}

/// Outcome of evaluating the whitelist and route rules
#[derive(Debug, Clone, Copy)]
pub enum RouteMatch<'a> {
    /// Client is whitelisted
    Admit,
    /// Route is configured to skip counting
    Ignore,
    Override(&'a CompiledRouteRule),
    NoMatch,
}

/// Classify a request. Rules are tried in order and the first match wins.
pub fn match_route<'a>(
    request: &RequestDescriptor,
    whitelist: &HashSet<String>,
    rules: &'a [CompiledRouteRule],
) -> RouteMatch<'a> {
    if let Some(client) = &request.client_address {
        if whitelist.contains(client) {
            return RouteMatch::Admit;
        }
    }

    let Some(path) = request.path.as_deref() else {
        return RouteMatch::NoMatch;
    };

    match rules.iter().find(|rule| rule.matches(path, &request.method)) {
        Some(rule) if rule.ignore => RouteMatch::Ignore,
        Some(rule) => RouteMatch::Override(rule),
        None => RouteMatch::NoMatch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, RateLimitConfig, RouteRule};

    fn compile(routes: Vec<RouteRule>, whitelist: Vec<&str>) -> EngineConfig {
        EngineConfig::compile(RateLimitConfig {
            routes,
            whitelist: whitelist.into_iter().map(String::from).collect(),
            ..Default::default()
        })
        .unwrap()
    }

    fn exact(path: &str) -> RouteRule {
        RouteRule {
            path: Some(path.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_whitelist_short_circuits() {
        let config = compile(vec![exact("/a")], vec!["10.0.0.1"]);
        let request = RequestDescriptor::get("10.0.0.1", "/a");
        assert!(matches!(
            match_route(&request, &config.whitelist, &config.rules),
            RouteMatch::Admit
        ));
    }

    #[test]
    fn test_trailing_slash_is_ignored() {
        let config = compile(vec![exact("/path")], vec![]);
        for path in ["/path", "/path/"] {
            let request = RequestDescriptor::get("10.0.0.1", path);
            match match_route(&request, &config.whitelist, &config.rules) {
                RouteMatch::Override(rule) => assert_eq!(rule.override_suffix(), "get:/path"),
                other => panic!("expected override for {}, got {:?}", path, other),
            }
        }

        let config = compile(vec![exact("/path/")], vec![]);
        let request = RequestDescriptor::get("10.0.0.1", "/path");
        assert!(matches!(
            match_route(&request, &config.whitelist, &config.rules),
            RouteMatch::Override(_)
        ));
    }

    #[test]
    fn test_method_must_match() {
        let config = compile(
            vec![RouteRule {
                method: Some("post".to_string()),
                ..exact("/login")
            }],
            vec![],
        );

        let get = RequestDescriptor::get("10.0.0.1", "/login");
        assert!(matches!(
            match_route(&get, &config.whitelist, &config.rules),
            RouteMatch::NoMatch
        ));

        let post = RequestDescriptor::new(Some("10.0.0.1"), Some("/login"), "Post");
        assert!(matches!(
            match_route(&post, &config.whitelist, &config.rules),
            RouteMatch::Override(_)
        ));
    }

    #[test]
    fn test_first_match_wins() {
        let config = compile(
            vec![
                RouteRule {
                    ignore: Some(true),
                    ..exact("/status")
                },
                RouteRule {
                    pattern: Some("^/stat".to_string()),
                    limit: Some(5),
                    ..Default::default()
                },
            ],
            vec![],
        );

        let status = RequestDescriptor::get("10.0.0.1", "/status");
        assert!(matches!(
            match_route(&status, &config.whitelist, &config.rules),
            RouteMatch::Ignore
        ));

        let stats = RequestDescriptor::get("10.0.0.1", "/stats");
        match match_route(&stats, &config.whitelist, &config.rules) {
            RouteMatch::Override(rule) => assert_eq!(rule.limit, Some(5)),
            other => panic!("expected pattern override, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_path_never_matches() {
        let config = compile(vec![exact("/")], vec![]);
        let request = RequestDescriptor::new(Some("10.0.0.1"), None::<String>, "GET");
        assert!(matches!(
            match_route(&request, &config.whitelist, &config.rules),
            RouteMatch::NoMatch
        ));
    }

    #[test]
    fn test_missing_client_is_not_whitelisted() {
        let config = compile(vec![], vec!["unknown"]);
        let request = RequestDescriptor::new(None::<String>, Some("/"), "GET");
        assert!(matches!(
            match_route(&request, &config.whitelist, &config.rules),
            RouteMatch::NoMatch
        ));
    }
}
