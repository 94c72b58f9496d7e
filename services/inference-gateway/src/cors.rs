//! Cross-origin policy for the browser front end.

use axum::http::HeaderValue;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::warn;

pub const FRONTEND_ORIGINS_ENV: &str = "FRONTEND_ORIGINS";
pub const DEFAULT_ORIGINS: &[&str] = &["http://localhost:5173", "http://localhost:3000"];

#[derive(Debug, Clone, PartialEq)]
pub enum OriginPolicy {
    Any,
    List(Vec<String>),
}

/// Comma separated list; a `*` entry allows any origin. Blank input falls back to the defaults.
pub fn parse_origins(raw: Option<&str>) -> OriginPolicy {
    let items: Vec<String> = raw.unwrap_or_default().split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect();
    if items.iter().any(|s| s == "*") { return OriginPolicy::Any; }
    if items.is_empty() { return OriginPolicy::List(DEFAULT_ORIGINS.iter().map(|s| s.to_string()).collect()); }
    OriginPolicy::List(items)
}

/// The environment variable overrides the configured value.
pub fn resolve_origins(configured: Option<&str>) -> OriginPolicy {
    let env = std::env::var(FRONTEND_ORIGINS_ENV).ok();
    parse_origins(env.as_deref().or(configured))
}

pub fn cors_layer(policy: &OriginPolicy) -> CorsLayer {
    let base = CorsLayer::new().allow_methods(AllowMethods::mirror_request()).allow_headers(AllowHeaders::mirror_request());
    match policy {
        // credentials cannot be combined with a wildcard origin
        OriginPolicy::Any => base.allow_origin(AllowOrigin::any()),
        OriginPolicy::List(origins) => {
            let values: Vec<HeaderValue> = origins.iter().filter_map(|o| match o.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(_) => { warn!(origin=%o, "ignoring unparsable origin"); None }
            }).collect();
            base.allow_origin(AllowOrigin::list(values)).allow_credentials(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_unset_or_blank() {
        let defaults = OriginPolicy::List(vec!["http://localhost:5173".into(), "http://localhost:3000".into()]);
        assert_eq!(parse_origins(None), defaults);
        assert_eq!(parse_origins(Some(" , ")), defaults);
    }

    #[test]
    fn explicit_list_is_trimmed() {
        assert_eq!(parse_origins(Some("https://a.example , https://b.example")),
            OriginPolicy::List(vec!["https://a.example".into(), "https://b.example".into()]));
    }

    #[test]
    fn wildcard_wins() {
        assert_eq!(parse_origins(Some("https://a.example,*")), OriginPolicy::Any);
    }
}
