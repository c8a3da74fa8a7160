//! Ordered route table for both REST dialects.
//!
//! Rules are tried in table order and the first rule whose pattern and method
//! match wins. Version-qualified patterns precede their plain counterparts.
//! A path that matches some pattern under a different method is reported as
//! [`GatewayError::MethodNotAllowed`] rather than not found.

use crate::error::{GatewayError, Result};

/// REST dialect a route belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Legacy,
    V2,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Legacy => "legacy",
            Dialect::V2 => "v2",
        }
    }
}

/// Operation a route invokes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ServerMetadata,
    ListModels,
    Live,
    Ready,
    ModelMetadata,
    ModelReady,
    Infer,
    Explain,
    Load,
    Unload,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::ServerMetadata => "server_metadata",
            Action::ListModels => "list",
            Action::Live => "live",
            Action::Ready => "ready",
            Action::ModelMetadata => "model_metadata",
            Action::ModelReady => "model_ready",
            Action::Infer => "infer",
            Action::Explain => "explain",
            Action::Load => "load",
            Action::Unload => "unload",
        }
    }
}

/// One routing rule. `{name}` and `{version}` segments capture path values.
#[derive(Debug, Clone, Copy)]
pub struct RouteRule {
    pub method: &'static str,
    pub pattern: &'static str,
    pub dialect: Dialect,
    pub action: Action,
}

const fn rule(
    method: &'static str,
    pattern: &'static str,
    dialect: Dialect,
    action: Action,
) -> RouteRule {
    RouteRule {
        method,
        pattern,
        dialect,
        action,
    }
}

use Action::*;
use Dialect::{Legacy, V2};

/// The route table, in priority order.
pub const ROUTES: &[RouteRule] = &[
    // v2
    rule("GET", "/v2", V2, ServerMetadata),
    rule("GET", "/v2/health/live", V2, Live),
    rule("GET", "/v2/health/ready", V2, Ready),
    rule("GET", "/v2/models", V2, ListModels),
    rule("GET", "/v2/models/{name}/versions/{version}", V2, ModelMetadata),
    rule("GET", "/v2/models/{name}/versions/{version}/ready", V2, ModelReady),
    rule("POST", "/v2/models/{name}/versions/{version}/infer", V2, Infer),
    rule("POST", "/v2/models/{name}/versions/{version}/explain", V2, Explain),
    rule("POST", "/v2/models/{name}/versions/{version}/load", V2, Load),
    rule("POST", "/v2/models/{name}/versions/{version}/unload", V2, Unload),
    rule("GET", "/v2/models/{name}", V2, ModelMetadata),
    rule("GET", "/v2/models/{name}/ready", V2, ModelReady),
    rule("POST", "/v2/models/{name}/infer", V2, Infer),
    rule("POST", "/v2/models/{name}/explain", V2, Explain),
    rule("POST", "/v2/models/{name}/load", V2, Load),
    rule("POST", "/v2/models/{name}/unload", V2, Unload),
    rule("POST", "/v2/repository/models/{name}/load", V2, Load),
    rule("POST", "/v2/repository/models/{name}/unload", V2, Unload),
    // legacy
    rule("GET", "/", Legacy, ServerMetadata),
    rule("GET", "/health/live", Legacy, Live),
    rule("GET", "/health/ready", Legacy, Ready),
    rule("GET", "/models", Legacy, ListModels),
    rule("GET", "/models/{name}/versions/{version}", Legacy, ModelMetadata),
    rule("GET", "/models/{name}/versions/{version}/ready", Legacy, ModelReady),
    rule("POST", "/models/{name}/versions/{version}/infer", Legacy, Infer),
    rule("POST", "/models/{name}/versions/{version}/explain", Legacy, Explain),
    rule("POST", "/models/{name}/versions/{version}/load", Legacy, Load),
    rule("POST", "/models/{name}/versions/{version}/unload", Legacy, Unload),
    rule("GET", "/models/{name}", Legacy, ModelMetadata),
    rule("GET", "/models/{name}/ready", Legacy, ModelReady),
    rule("POST", "/models/{name}/infer", Legacy, Infer),
    rule("POST", "/models/{name}/explain", Legacy, Explain),
    rule("POST", "/models/{name}/load", Legacy, Load),
    rule("POST", "/models/{name}/unload", Legacy, Unload),
];

/// A resolved route with its captured path values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub dialect: Dialect,
    pub action: Action,
    pub name: Option<String>,
    pub version: Option<String>,
}

impl RouteMatch {
    /// Model name captured from the path
    pub fn model(&self) -> Result<&str> {
        self.name.as_deref().ok_or_else(|| {
            GatewayError::Internal(format!("route {:?} captures no model name", self.action))
        })
    }
}

#[derive(Default)]
struct Captures {
    name: Option<String>,
    version: Option<String>,
}

fn match_pattern(pattern: &str, path: &str) -> Option<Captures> {
    let mut want = pattern.split('/').filter(|s| !s.is_empty());
    let mut have = path.split('/').filter(|s| !s.is_empty());
    let mut captures = Captures::default();

    loop {
        match (want.next(), have.next()) {
            (None, None) => return Some(captures),
            (Some("{name}"), Some(value)) => captures.name = Some(value.to_string()),
            (Some("{version}"), Some(value)) => captures.version = Some(value.to_string()),
            (Some(literal), Some(value)) if literal == value => {}
            _ => return None,
        }
    }
}

/// Resolves a request to the first matching rule.
pub fn resolve(method: &str, path: &str) -> Result<RouteMatch> {
    let mut path_known = false;

    for rule in ROUTES {
        let Some(captures) = match_pattern(rule.pattern, path) else {
            continue;
        };
        if rule.method != method {
            path_known = true;
            continue;
        }
        return Ok(RouteMatch {
            dialect: rule.dialect,
            action: rule.action,
            name: captures.name,
            version: captures.version,
        });
    }

    if path_known {
        Err(GatewayError::MethodNotAllowed {
            method: method.to_string(),
            path: path.to_string(),
        })
    } else {
        Err(GatewayError::RouteNotFound {
            method: method.to_string(),
            path: path.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_routes() {
        let route = resolve("GET", "/v2/health/ready").unwrap();
        assert_eq!(route.dialect, Dialect::V2);
        assert_eq!(route.action, Action::Ready);

        let route = resolve("GET", "/health/live").unwrap();
        assert_eq!(route.dialect, Dialect::Legacy);
        assert_eq!(route.action, Action::Live);
    }

    #[test]
    fn test_root_and_trailing_slash() {
        assert_eq!(resolve("GET", "/").unwrap().action, Action::ServerMetadata);
        assert_eq!(resolve("GET", "/v2/").unwrap().action, Action::ServerMetadata);
        assert_eq!(resolve("GET", "/models/").unwrap().action, Action::ListModels);
    }

    #[test]
    fn test_version_qualified_first() {
        let route = resolve("POST", "/v2/models/iris/versions/3/infer").unwrap();
        assert_eq!(route.action, Action::Infer);
        assert_eq!(route.name.as_deref(), Some("iris"));
        assert_eq!(route.version.as_deref(), Some("3"));

        let route = resolve("GET", "/models/iris/versions/3").unwrap();
        assert_eq!(route.action, Action::ModelMetadata);
        assert_eq!(route.version.as_deref(), Some("3"));

        let route = resolve("POST", "/models/iris/infer").unwrap();
        assert_eq!(route.dialect, Dialect::Legacy);
        assert!(route.version.is_none());
    }

    #[test]
    fn test_repository_routes() {
        let route = resolve("POST", "/v2/repository/models/m/load").unwrap();
        assert_eq!(route.action, Action::Load);
        assert_eq!(route.model().unwrap(), "m");
    }

    #[test]
    fn test_unknown_route_and_method() {
        assert!(matches!(
            resolve("GET", "/v3/models"),
            Err(GatewayError::RouteNotFound { .. })
        ));
        assert!(matches!(
            resolve("GET", "/v2/models/iris/infer"),
            Err(GatewayError::MethodNotAllowed { .. })
        ));
        assert!(matches!(
            resolve("DELETE", "/models"),
            Err(GatewayError::MethodNotAllowed { .. })
        ));
    }

    #[test]
    fn test_every_rule_resolves_to_itself() {
        for rule in ROUTES {
            let path = rule
                .pattern
                .replace("{name}", "model-a")
                .replace("{version}", "7");
            let route = resolve(rule.method, &path).unwrap();
            assert_eq!((route.dialect, route.action), (rule.dialect, rule.action), "{}", path);
        }
    }
}
