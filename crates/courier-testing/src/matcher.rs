use http::{HeaderMap, Method};
use serde_json::Value;

/// Matcher for HTTP requests; every configured criterion must hold
#[derive(Debug, Clone, Default)]
pub struct RequestMatcher {
    pub(crate) method: Option<Method>,
    pub(crate) path: Option<String>,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body_json: Option<Value>,
    pub(crate) body_includes: Option<Value>,
    pub(crate) body_string: Option<String>,
}

impl RequestMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Match the exact path, without query string
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Match a decoded query parameter
    pub fn query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Match exact JSON body
    pub fn body_json(mut self, body: Value) -> Self {
        self.body_json = Some(body);
        self
    }

    /// Match a JSON body containing at least the given fields
    pub fn body_includes(mut self, body: Value) -> Self {
        self.body_includes = Some(body);
        self
    }

    pub fn body_string(mut self, body: impl Into<String>) -> Self {
        self.body_string = Some(body.into());
        self
    }

    pub fn matches(
        &self,
        method: &Method,
        path: &str,
        query: Option<&str>,
        headers: &HeaderMap,
        body: &[u8],
    ) -> bool {
        if self.method.as_ref().is_some_and(|m| m != method) {
            return false;
        }

        if self.path.as_deref().is_some_and(|p| p != path) {
            return false;
        }

        if !self.query.is_empty() {
            let pairs: Vec<(String, String)> =
                serde_urlencoded::from_str(query.unwrap_or("")).unwrap_or_default();
            let all_present = self
                .query
                .iter()
                .all(|expected| pairs.iter().any(|actual| actual == expected));
            if !all_present {
                return false;
            }
        }

        for (k, v) in &self.headers {
            match headers.get(k) {
                Some(val) if val == v.as_str() => {}
                _ => return false,
            }
        }

        if self.body_json.is_some() || self.body_includes.is_some() {
            let Ok(actual) = serde_json::from_slice::<Value>(body) else {
                return false;
            };
            if self.body_json.as_ref().is_some_and(|expected| &actual != expected) {
                return false;
            }
            if self
                .body_includes
                .as_ref()
                .is_some_and(|expected| !json_includes(&actual, expected))
            {
                return false;
            }
        }

        if let Some(expected_str) = &self.body_string {
            match std::str::from_utf8(body) {
                Ok(actual) if actual == expected_str => {}
                _ => return false,
            }
        }

        true
    }
}

/// Whether `actual` contains every field of `expected`, recursively for objects
fn json_includes(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Object(actual), Value::Object(expected)) => expected.iter().all(|(key, value)| {
            actual
                .get(key)
                .is_some_and(|present| json_includes(present, value))
        }),
        _ => actual == expected,
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn method_strategy() -> impl Strategy<Value = Method> {
        prop_oneof![
            Just(Method::GET),
            Just(Method::POST),
            Just(Method::PUT),
            Just(Method::DELETE),
        ]
    }

    fn path_strategy() -> impl Strategy<Value = String> {
        prop::string::string_regex("/contacts(/[a-z0-9]{3,8})?").unwrap()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_empty_matcher_matches_all(
            method in method_strategy(),
            path in path_strategy(),
            body in "[a-zA-Z0-9]{0,50}",
        ) {
            let matcher = RequestMatcher::new();
            prop_assert!(matcher.matches(&method, &path, None, &HeaderMap::new(), body.as_bytes()));
        }

        #[test]
        fn prop_path_matcher_exact(
            method in method_strategy(),
            target_path in path_strategy(),
            other_path in path_strategy(),
        ) {
            let matcher = RequestMatcher::new().path(target_path.clone());
            let headers = HeaderMap::new();

            prop_assert!(matcher.matches(&method, &target_path, None, &headers, b""));
            if target_path != other_path {
                prop_assert!(!matcher.matches(&method, &other_path, None, &headers, b""));
            }
        }

        #[test]
        fn prop_query_param_is_decoded(digits in "[1-9][0-9]{6,13}") {
            let phone = format!("+{}", digits);
            let matcher = RequestMatcher::new().query_param("phone", phone.clone());
            let encoded = serde_urlencoded::to_string([("phone", phone.as_str())]).unwrap();

            prop_assert!(matcher.matches(&Method::GET, "/contacts/lookup", Some(&encoded), &HeaderMap::new(), b""));
            prop_assert!(!matcher.matches(&Method::GET, "/contacts/lookup", None, &HeaderMap::new(), b""));
        }

        #[test]
        fn prop_body_includes_ignores_extra_fields(extra in "[a-z]{1,10}") {
            let matcher = RequestMatcher::new().body_includes(json!({"type": "SMS"}));
            let body = json!({"type": "SMS", "message": extra}).to_string();
            let other = json!({"type": "Email", "message": extra}).to_string();

            prop_assert!(matcher.matches(&Method::POST, "/", None, &HeaderMap::new(), body.as_bytes()));
            prop_assert!(!matcher.matches(&Method::POST, "/", None, &HeaderMap::new(), other.as_bytes()));
        }
    }

    #[test]
    fn nested_objects_match_recursively() {
        let expected = json!({"customFields": {"caseNumber": "2024-001"}});
        let actual = json!({"customFields": {"caseNumber": "2024-001", "updateType": "Hearing"}, "tags": []});
        assert!(json_includes(&actual, &expected));
        assert!(!json_includes(&json!({"customFields": {}}), &expected));
    }

    #[test]
    fn header_values_must_match_exactly() {
        let matcher = RequestMatcher::new().header("authorization", "Bearer key");
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer key".parse().unwrap());
        assert!(matcher.matches(&Method::GET, "/", None, &headers, b""));

        headers.insert("authorization", "Bearer other".parse().unwrap());
        assert!(!matcher.matches(&Method::GET, "/", None, &headers, b""));
    }
}
