//! Service routing table.
//!
//! The table maps the first path segment of a request (`/upload/...` maps to
//! `upload`) to a [`ServiceRoute`]. It is built once at start-up from a JSON
//! routes file and is read-only afterwards.
//!
//! # Routes file
//!
//! ```json
//! {
//!   "services": {
//!     "upload": {
//!       "target": "http://localhost:8502",
//!       "targets": { "prod": "http://upload.internal:8502" },
//!       "requires_auth": true,
//!       "path_filters": [
//!         { "prefix": "/upload/records" },
//!         { "pattern": "^/upload/v2/", "rewrite": { "from": "^/upload/v2", "to": "/upload" } }
//!       ]
//!     },
//!     "health": {}
//!   }
//! }
//! ```

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use axum::http::Method;
use regex::Regex;
use reqwest::Url;
use serde::Deserialize;

use crate::config::ConfigError;

/// Predicate signature for programmatic path filters.
pub type PathPredicate = Arc<dyn Fn(&str, &Method) -> bool + Send + Sync>;

/// How a path filter decides whether a request belongs to it.
#[derive(Clone)]
pub enum PathMatcher {
    /// Literal path prefix.
    Prefix(String),
    /// Regular expression searched anywhere in the path.
    Pattern(Regex),
    /// Arbitrary check on path and method.
    Predicate(PathPredicate),
}

impl PathMatcher {
    /// Whether the request path and method match.
    #[must_use]
    pub fn matches(&self, path: &str, method: &Method) -> bool {
        match self {
            Self::Prefix(prefix) => path.starts_with(prefix.as_str()),
            Self::Pattern(re) => re.is_match(path),
            Self::Predicate(f) => f(path, method),
        }
    }
}

impl fmt::Debug for PathMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prefix(p) => f.debug_tuple("Prefix").field(p).finish(),
            Self::Pattern(re) => f.debug_tuple("Pattern").field(&re.as_str()).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Rewrites the first match of `pattern` in the outbound path.
#[derive(Debug, Clone)]
pub struct PathRewrite {
    pattern: Regex,
    replacement: String,
}

impl PathRewrite {
    /// Create a rewrite rule.
    #[must_use]
    pub fn new(pattern: Regex, replacement: impl Into<String>) -> Self {
        Self {
            pattern,
            replacement: replacement.into(),
        }
    }

    /// Apply the rule to `path`.
    #[must_use]
    pub fn apply<'a>(&self, path: &'a str) -> Cow<'a, str> {
        self.pattern.replace(path, self.replacement.as_str())
    }
}

/// A matcher with an optional rewrite.
#[derive(Debug, Clone)]
pub struct PathFilter {
    /// Decides whether the filter applies.
    pub matcher: PathMatcher,
    /// Applied to the outbound path when this filter matches first.
    pub rewrite: Option<PathRewrite>,
}

impl PathFilter {
    /// A filter matching a literal prefix.
    #[must_use]
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self {
            matcher: PathMatcher::Prefix(prefix.into()),
            rewrite: None,
        }
    }

    /// A filter matching a regular expression.
    #[must_use]
    pub fn pattern(re: Regex) -> Self {
        Self {
            matcher: PathMatcher::Pattern(re),
            rewrite: None,
        }
    }

    /// A filter backed by a closure.
    #[must_use]
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&str, &Method) -> bool + Send + Sync + 'static,
    {
        Self {
            matcher: PathMatcher::Predicate(Arc::new(f)),
            rewrite: None,
        }
    }

    /// Attach a rewrite rule.
    #[must_use]
    pub fn with_rewrite(mut self, rewrite: PathRewrite) -> Self {
        self.rewrite = Some(rewrite);
        self
    }
}

/// Resolved configuration for one upstream service.
#[derive(Debug, Clone)]
pub struct ServiceRoute {
    key: String,
    target: Option<Url>,
    requires_auth: bool,
    deprecated: bool,
    path_filters: Vec<PathFilter>,
}

impl ServiceRoute {
    /// Start a route for `key` with no target, no auth, and no filters.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            target: None,
            requires_auth: false,
            deprecated: false,
            path_filters: Vec::new(),
        }
    }

    /// Set the upstream base URL.
    #[must_use]
    pub fn target(mut self, url: Url) -> Self {
        self.target = Some(url);
        self
    }

    /// Require a credential.
    #[must_use]
    pub fn requires_auth(mut self) -> Self {
        self.requires_auth = true;
        self
    }

    /// Mark the service as retired.
    #[must_use]
    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    /// Append a path filter.
    #[must_use]
    pub fn path_filter(mut self, filter: PathFilter) -> Self {
        self.path_filters.push(filter);
        self
    }

    /// The service key (first path segment).
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The upstream base URL, if this route is proxied.
    #[must_use]
    pub fn upstream(&self) -> Option<&Url> {
        self.target.as_ref()
    }

    /// Whether a credential is required.
    #[must_use]
    pub const fn auth_required(&self) -> bool {
        self.requires_auth
    }

    /// Whether the service has been retired.
    #[must_use]
    pub const fn is_deprecated(&self) -> bool {
        self.deprecated
    }

    /// The path to send upstream, or `None` when no filter claims the request.
    ///
    /// With no filters every path is claimed unchanged.
    #[must_use]
    pub fn outbound_path<'a>(&self, path: &'a str, method: &Method) -> Option<Cow<'a, str>> {
        if self.path_filters.is_empty() {
            return Some(Cow::Borrowed(path));
        }

        let filter = self
            .path_filters
            .iter()
            .find(|f| f.matcher.matches(path, method))?;

        Some(match &filter.rewrite {
            Some(rewrite) => rewrite.apply(path),
            None => Cow::Borrowed(path),
        })
    }
}

/// Top-level shape of the routes file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoutesFile {
    /// Service definitions keyed by first path segment.
    pub services: HashMap<String, RouteDefinition>,
}

/// One service entry in the routes file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteDefinition {
    /// Default upstream base URL. Absent for locally handled services.
    #[serde(default)]
    pub target: Option<String>,
    /// Per-environment overrides of `target`.
    #[serde(default)]
    pub targets: HashMap<String, String>,
    /// Whether a credential is required.
    #[serde(default)]
    pub requires_auth: bool,
    /// Whether the service has been retired.
    #[serde(default)]
    pub deprecated: bool,
    /// Path filters. Empty means every path.
    #[serde(default)]
    pub path_filters: Vec<PathFilterDefinition>,
}

/// A path filter as written in the routes file. Exactly one of `prefix` and
/// `pattern` must be set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathFilterDefinition {
    /// Literal prefix.
    #[serde(default)]
    pub prefix: Option<String>,
    /// Regular expression.
    #[serde(default)]
    pub pattern: Option<String>,
    /// Optional rewrite applied on match.
    #[serde(default)]
    pub rewrite: Option<RewriteDefinition>,
}

/// A rewrite rule as written in the routes file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RewriteDefinition {
    /// Regular expression to replace.
    pub from: String,
    /// Replacement text (`$1` style groups allowed).
    pub to: String,
}

/// Immutable lookup from service key to route.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    services: HashMap<String, ServiceRoute>,
}

impl RoutingTable {
    /// Build a table from already constructed routes.
    #[must_use]
    pub fn from_routes(routes: impl IntoIterator<Item = ServiceRoute>) -> Self {
        Self {
            services: routes
                .into_iter()
                .map(|route| (route.key.clone(), route))
                .collect(),
        }
    }

    /// Normalize parsed definitions for the `environment` profile.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRoute`] for a bad URL, regex, or filter.
    pub fn from_definitions(file: RoutesFile, environment: &str) -> Result<Self, ConfigError> {
        let mut services = HashMap::with_capacity(file.services.len());

        for (key, def) in file.services {
            let route = normalize(&key, def, environment)?;
            services.insert(key, route);
        }

        Ok(Self { services })
    }

    /// Read and normalize a routes file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or normalized.
    pub fn from_file(path: impl AsRef<Path>, environment: &str) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::RoutesFile {
            path: path.to_path_buf(),
            source,
        })?;
        let file: RoutesFile = serde_json::from_str(&raw)?;
        Self::from_definitions(file, environment)
    }

    /// Find the route for a request path.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<&ServiceRoute> {
        self.services.get(service_key(path)?)
    }

    /// Number of configured services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Whether no services are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// The first segment of `path`, or `None` for `/` and the empty path.
#[must_use]
pub fn service_key(path: &str) -> Option<&str> {
    let rest = path.strip_prefix('/').unwrap_or(path);
    let key = rest.split('/').next().unwrap_or_default();
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

/// Parse an upstream base URL, accepting only `http` and `https`.
///
/// # Errors
///
/// Returns a description of the problem.
pub fn parse_target(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| format!("invalid target `{raw}`: {e}"))?;
    match url.scheme() {
        "http" | "https" if url.host().is_some() => Ok(url),
        "http" | "https" => Err(format!("target `{raw}` has no host")),
        other => Err(format!("target `{raw}` has unsupported scheme `{other}`")),
    }
}

fn normalize(key: &str, def: RouteDefinition, environment: &str) -> Result<ServiceRoute, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidRoute {
        service: key.to_string(),
        reason,
    };

    if key.is_empty() || key.contains('/') {
        return Err(invalid("service key must be a single path segment".to_string()));
    }

    let mut route = ServiceRoute::new(key);

    let raw_target = def.targets.get(environment).or(def.target.as_ref());
    if let Some(raw) = raw_target {
        route = route.target(parse_target(raw).map_err(invalid)?);
    }
    // Overrides are validated even when inactive, so a typo in the prod URL
    // fails a local start-up too.
    for raw in def.targets.values() {
        parse_target(raw).map_err(invalid)?;
    }

    if def.requires_auth {
        route = route.requires_auth();
    }
    if def.deprecated {
        route = route.deprecated();
    }

    for filter in def.path_filters {
        let mut built = match (filter.prefix, filter.pattern) {
            (Some(prefix), None) => PathFilter::prefix(prefix),
            (None, Some(pattern)) => PathFilter::pattern(
                Regex::new(&pattern).map_err(|e| invalid(format!("bad pattern `{pattern}`: {e}")))?,
            ),
            _ => {
                return Err(invalid(
                    "path filter needs exactly one of `prefix` or `pattern`".to_string(),
                ))
            }
        };
        if let Some(rw) = filter.rewrite {
            let re = Regex::new(&rw.from)
                .map_err(|e| invalid(format!("bad rewrite `{}`: {e}", rw.from)))?;
            built = built.with_rewrite(PathRewrite::new(re, rw.to));
        }
        route = route.path_filter(built);
    }

    Ok(route)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn table(json: &str, env: &str) -> Result<RoutingTable, ConfigError> {
        RoutingTable::from_definitions(serde_json::from_str(json).unwrap(), env)
    }

    #[test]
    fn service_key_extraction() {
        assert_eq!(service_key("/upload/records/1"), Some("upload"));
        assert_eq!(service_key("/health"), Some("health"));
        assert_eq!(service_key("/"), None);
        assert_eq!(service_key(""), None);
        assert_eq!(service_key("//x"), None);
    }

    #[test]
    fn resolves_known_service() {
        let table = table(
            r#"{"services": {"authentication": {"target": "http://localhost:8501"}}}"#,
            "local",
        )
        .unwrap();

        let route = table.resolve("/authentication/login").unwrap();
        assert_eq!(route.key(), "authentication");
        assert_eq!(route.upstream().unwrap().as_str(), "http://localhost:8501/");
        assert!(!route.auth_required());
        assert!(table.resolve("/billing/x").is_none());
    }

    #[test]
    fn environment_override() {
        let json = r#"{"services": {"upload": {
            "target": "http://localhost:8502",
            "targets": {"prod": "https://upload.internal"}
        }}}"#;

        let local = table(json, "local").unwrap();
        assert_eq!(
            local.resolve("/upload").unwrap().upstream().unwrap().host_str(),
            Some("localhost")
        );

        let prod = table(json, "prod").unwrap();
        assert_eq!(
            prod.resolve("/upload").unwrap().upstream().unwrap().host_str(),
            Some("upload.internal")
        );
    }

    #[test]
    fn rejects_bad_target() {
        let err = table(r#"{"services": {"x": {"target": "ftp://files"}}}"#, "local").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRoute { ref service, .. } if service == "x"));

        let err = table(
            r#"{"services": {"x": {"target": "http://ok", "targets": {"prod": "nope"}}}}"#,
            "local",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRoute { .. }));
    }

    #[test]
    fn rejects_bad_filters() {
        let err = table(
            r#"{"services": {"x": {"path_filters": [{"pattern": "("}]}}}"#,
            "local",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRoute { .. }));

        let err = table(
            r#"{"services": {"x": {"path_filters": [{"prefix": "/x", "pattern": "^/x"}]}}}"#,
            "local",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRoute { .. }));
    }

    #[test]
    fn empty_filters_match_everything() {
        let route = ServiceRoute::new("upload");
        assert_eq!(
            route.outbound_path("/upload/anything", &Method::DELETE).as_deref(),
            Some("/upload/anything")
        );
    }

    #[test]
    fn prefix_and_pattern_filters() {
        let route = ServiceRoute::new("upload")
            .path_filter(PathFilter::prefix("/upload/records"))
            .path_filter(PathFilter::pattern(Regex::new(r"^/upload/multipart/\w+$").unwrap()));

        assert!(route.outbound_path("/upload/records/42", &Method::GET).is_some());
        assert!(route.outbound_path("/upload/multipart/init", &Method::POST).is_some());
        assert!(route.outbound_path("/upload/multipart/a/b", &Method::POST).is_none());
        assert!(route.outbound_path("/upload/other", &Method::GET).is_none());
    }

    #[test]
    fn predicate_filter_sees_method() {
        let route = ServiceRoute::new("upload")
            .path_filter(PathFilter::predicate(|_, method| method == Method::POST));

        assert!(route.outbound_path("/upload/x", &Method::POST).is_some());
        assert!(route.outbound_path("/upload/x", &Method::GET).is_none());
    }

    #[test]
    fn first_matching_rewrite_wins() {
        let json = r#"{"services": {"upload": {
            "target": "http://localhost:8502",
            "path_filters": [
                {"pattern": "^/upload/v2/", "rewrite": {"from": "^/upload/v2", "to": "/upload"}},
                {"prefix": "/upload", "rewrite": {"from": "^/upload", "to": "/legacy"}}
            ]
        }}}"#;
        let table = table(json, "local").unwrap();
        let route = table.resolve("/upload/v2/records").unwrap();

        assert_eq!(
            route.outbound_path("/upload/v2/records", &Method::GET).as_deref(),
            Some("/upload/records")
        );
        assert_eq!(
            route.outbound_path("/upload/records", &Method::GET).as_deref(),
            Some("/legacy/records")
        );
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"services": {{"health": {{}}, "old": {{"target": "http://localhost:9", "deprecated": true}}}}}}"#
        )
        .unwrap();

        let table = RoutingTable::from_file(file.path(), "local").unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.resolve("/health").unwrap().upstream().is_none());
        assert!(table.resolve("/old/thing").unwrap().is_deprecated());
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = RoutingTable::from_file("/definitely/not/here.json", "local").unwrap_err();
        assert!(matches!(err, ConfigError::RoutesFile { .. }));
    }
}
