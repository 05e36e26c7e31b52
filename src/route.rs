//! Route normalizer (C2): collapses method + path + optional template into the
//! canonical `"METHOD /path"` form used everywhere else in the pipeline as the
//! route identity (critical-route matching, the summary line, dashboards).

/// A materialized or templated path, as handed to the normalizer by the
/// interception hook. Frameworks that expose the matched route template as a
/// list of path segments (rather than a single string) should join them
/// before constructing this.
#[derive(Debug, Clone, Default)]
pub struct RouteInput<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub template_path: Option<&'a str>,
    pub query: Option<&'a str>,
}

pub fn normalize_route(input: &RouteInput<'_>, base_path: Option<&str>) -> String {
    let chosen = input.template_path.unwrap_or(input.path);
    let stripped = strip_query(chosen);
    let with_slash = ensure_leading_slash(stripped);
    let prefixed = apply_base_path(&with_slash, base_path);
    format!("{} {}", input.method.to_uppercase(), prefixed)
}

fn strip_query(path: &str) -> &str {
    path.split_once('?').map(|(p, _)| p).unwrap_or(path)
}

fn ensure_leading_slash(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

fn apply_base_path(path: &str, base_path: Option<&str>) -> String {
    let Some(base) = base_path else {
        return path.to_string();
    };
    let base = base.trim_end_matches('/');
    if base.is_empty() || path.starts_with(base) {
        path.to_string()
    } else {
        format!("{base}{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn route(method: &str, path: &str, template: Option<&str>, query: Option<&str>) -> String {
        normalize_route(
            &RouteInput {
                method,
                path,
                template_path: template,
                query,
            },
            None,
        )
    }

    #[test]
    fn uppercases_method_and_keeps_path() {
        assert_eq!(route("post", "/payments", None, None), "POST /payments");
    }

    #[test]
    fn strips_query_string() {
        assert_eq!(
            route("get", "/search?q=widgets", None, None),
            "GET /search"
        );
    }

    #[test]
    fn prefers_template_over_materialized_path() {
        assert_eq!(
            route("get", "/users/42", Some("/users/:id"), None),
            "GET /users/:id"
        );
    }

    #[test]
    fn adds_leading_slash_when_missing() {
        assert_eq!(route("get", "health", None, None), "GET /health");
    }

    #[test]
    fn applies_configured_base_path_once() {
        let input = RouteInput {
            method: "get",
            path: "/widgets",
            template_path: None,
            query: None,
        };
        assert_eq!(
            normalize_route(&input, Some("/api/v1")),
            "GET /api/v1/widgets"
        );
    }

    #[test]
    fn does_not_duplicate_existing_base_path() {
        let input = RouteInput {
            method: "get",
            path: "/api/v1/widgets",
            template_path: None,
            query: None,
        };
        assert_eq!(
            normalize_route(&input, Some("/api/v1")),
            "GET /api/v1/widgets"
        );
    }

    proptest! {
        /// I5: the method is always uppercased and the query string never
        /// survives into the normalized route, for any method/path/query.
        #[test]
        fn method_is_uppercased_and_query_is_always_stripped(
            method in "[a-zA-Z]{1,8}",
            path in "/[a-z/]{0,12}",
            query in "[a-z=&]{0,10}",
        ) {
            let full_path = format!("{path}?{query}");
            let normalized = route(&method, &full_path, None, None);
            prop_assert!(normalized.starts_with(&method.to_uppercase()));
            prop_assert!(!normalized.contains('?'));
        }

        /// A configured base path is never duplicated: normalizing an
        /// already-normalized route against the same base path is a no-op.
        #[test]
        fn applying_base_path_twice_is_idempotent(path in "/[a-z/]{0,12}") {
            let input = RouteInput {
                method: "get",
                path: &path,
                template_path: None,
                query: None,
            };
            let once = normalize_route(&input, Some("/api/v1"));
            let route_path = once.splitn(2, ' ').nth(1).unwrap();
            let twice_input = RouteInput {
                method: "get",
                path: route_path,
                template_path: None,
                query: None,
            };
            let twice = normalize_route(&twice_input, Some("/api/v1"));
            prop_assert_eq!(once, twice);
        }
    }
}
