use crate::extract::jsonpath::JsonPath;
use crate::extract::types::{ExtractSource, Extraction, MatchNo, RegexSubject};
use crate::variable::Value;
use rand::Rng;
use serde_json::Value as Json;

/// 对响应 Body 执行 JSON path 提取
///
/// 没有匹配或 Body 不是合法 JSON 时原样返回默认值，不报错。
pub fn extract(path: &JsonPath, body: &str, default: &Value) -> Value {
    extract_json(path, body, MatchNo::Auto).unwrap_or_else(|| default.clone())
}

fn extract_json(path: &JsonPath, body: &str, match_no: MatchNo) -> Option<Value> {
    let document: Json = serde_json::from_str(body).ok()?;
    let matches: Vec<Json> = path.query(&document).into_iter().cloned().collect();
    select(matches, match_no).map(|json| Value::from_json(&json))
}

fn extract_regex(
    pattern: &regex::Regex,
    group: usize,
    haystack: &str,
    match_no: MatchNo,
) -> Option<Value> {
    let matches: Vec<Json> = pattern
        .captures_iter(haystack)
        .filter_map(|caps| caps.get(group).map(|m| Json::String(m.as_str().to_string())))
        .collect();
    select(matches, match_no).map(|json| Value::from_json(&json))
}

/// 按 match-no 从有序匹配中挑选
fn select(mut matches: Vec<Json>, match_no: MatchNo) -> Option<Json> {
    if matches.is_empty() {
        return None;
    }

    match match_no {
        MatchNo::Auto if matches.len() == 1 => matches.pop(),
        MatchNo::Auto | MatchNo::All => Some(Json::Array(matches)),
        MatchNo::Nth(n) => n.checked_sub(1).and_then(|i| matches.into_iter().nth(i)),
        MatchNo::Random => {
            let index = rand::rng().random_range(0..matches.len());
            Some(matches.swap_remove(index))
        }
    }
}

impl Extraction {
    /// 执行提取，总是返回一个值（匹配结果或默认值）
    pub fn apply(&self, body: &str, headers_text: &str) -> Value {
        let found = match &self.source {
            ExtractSource::JsonPath(path) => extract_json(path, body, self.match_no),
            ExtractSource::Regex {
                pattern,
                group,
                subject,
            } => {
                let haystack = match subject {
                    RegexSubject::Body => body,
                    RegexSubject::Headers => headers_text,
                };
                extract_regex(pattern, *group, haystack, self.match_no)
            }
        };

        found.unwrap_or_else(|| self.default.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::NOT_FOUND;

    fn not_found() -> Value {
        Value::from(NOT_FOUND)
    }

    #[test]
    fn test_extract_string_id() {
        let path = JsonPath::parse("$.id").unwrap();
        assert_eq!(
            extract(&path, r#"{"id":"abc"}"#, &not_found()),
            Value::from("abc")
        );
    }

    #[test]
    fn test_extract_miss_returns_default() {
        let path = JsonPath::parse("$.id").unwrap();
        assert_eq!(extract(&path, "{}", &not_found()), not_found());
    }

    #[test]
    fn test_extract_malformed_body_returns_default() {
        let path = JsonPath::parse("$.id").unwrap();
        assert_eq!(
            extract(&path, "<html>502 Bad Gateway</html>", &not_found()),
            not_found()
        );
        assert_eq!(extract(&path, "", &Value::from("fallback")), Value::from("fallback"));
    }

    #[test]
    fn test_extract_number() {
        let path = JsonPath::parse("$.id").unwrap();
        assert_eq!(extract(&path, r#"{"id": 1234}"#, &not_found()), Value::Number(1234.0));
    }

    #[test]
    fn test_recursive_descent_collects_sequence() {
        let path = JsonPath::parse("$..product_id").unwrap();
        let body = r#"{"order_details":[{"product_id":"a"},{"product_id":"b"}]}"#;
        assert_eq!(
            extract(&path, body, &not_found()),
            Value::Json(serde_json::json!(["a", "b"]))
        );
    }

    #[test]
    fn test_match_no_selection() {
        let body = r#"{"items":[{"id":1},{"id":2},{"id":3}]}"#;

        let second = Extraction::jsonpath("id", "$..id")
            .unwrap()
            .with_match_no(MatchNo::Nth(2));
        assert_eq!(second.apply(body, ""), Value::Number(2.0));

        let beyond = Extraction::jsonpath("id", "$..id")
            .unwrap()
            .with_match_no(MatchNo::Nth(9));
        assert_eq!(beyond.apply(body, ""), not_found());

        let random = Extraction::jsonpath("id", "$..id")
            .unwrap()
            .with_match_no(MatchNo::Random);
        let picked = random.apply(body, "");
        assert!([1.0, 2.0, 3.0].iter().any(|n| picked == Value::Number(*n)));
    }

    #[test]
    fn test_all_wraps_single_match() {
        let all = Extraction::jsonpath("id", "$.id")
            .unwrap()
            .with_match_no(MatchNo::All);
        assert_eq!(
            all.apply(r#"{"id":7}"#, ""),
            Value::Json(serde_json::json!([7]))
        );
    }

    #[test]
    fn test_regex_from_body() {
        let extraction =
            Extraction::regex("order_id", r#""id":\s*(\d+)"#, "$1$", RegexSubject::Body).unwrap();
        assert_eq!(extraction.apply(r#"{"id": 1234}"#, ""), Value::from("1234"));
        assert_eq!(extraction.apply("{}", ""), not_found());
    }

    #[test]
    fn test_regex_from_headers() {
        let extraction = Extraction::regex(
            "request_id",
            r"(?m)^x-request-id: (.+)$",
            "$1$",
            RegexSubject::Headers,
        )
        .unwrap()
        .with_default("none");
        let headers = "content-type: application/json\nx-request-id: req-42";
        assert_eq!(extraction.apply("", headers), Value::from("req-42"));
        assert_eq!(extraction.apply("", ""), Value::from("none"));
    }
}
