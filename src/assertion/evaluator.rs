use crate::assertion::types::{
    AssertionOutcome, AssertionRule, ContainsRule, JsonPathRule, Pattern, Subject,
};
use crate::http::response::headers_to_text;
use crate::runner::ExecutionResult;
use crate::variable::Value;
use serde_json::Value as Json;

const NOT_COMPLETED: &str = "request did not complete";

/// 对执行结果求值单条断言
///
/// 请求未完成时任何断言都判定失败，包括带 `not` 的断言。
pub fn evaluate_assertion(rule: &AssertionRule, result: &ExecutionResult) -> AssertionOutcome {
    let raw = rule.describe();

    if let Some(failure) = &result.failure {
        return AssertionOutcome::fail(raw, format!("{}: {}", NOT_COMPLETED, failure.message));
    }

    let verdict = match rule {
        AssertionRule::Contains(rule) => evaluate_contains(rule, result),
        AssertionRule::JsonPath(rule) => evaluate_jsonpath(rule, &result.body),
    };

    match verdict {
        Ok(()) => AssertionOutcome::pass(raw),
        Err(reason) => AssertionOutcome::fail(raw, reason),
    }
}

/// 依次求值全部断言，互不影响
pub fn evaluate_all(rules: &[AssertionRule], result: &ExecutionResult) -> Vec<AssertionOutcome> {
    rules
        .iter()
        .map(|rule| evaluate_assertion(rule, result))
        .collect()
}

fn evaluate_contains(rule: &ContainsRule, result: &ExecutionResult) -> Result<(), String> {
    let expected: Vec<&str> = rule.patterns.iter().map(|p| p.as_str()).collect();

    match rule.subject {
        Subject::HttpCode => {
            let code = result.status.map(|s| s.to_string()).unwrap_or_default();
            let matched = rule.patterns.iter().any(|p| matches_whole(p, &code));
            match (matched, rule.negate) {
                (true, false) | (false, true) => Ok(()),
                (false, false) => Err(format!(
                    "Expected http-code in [{}], but got {}",
                    expected.join(", "),
                    code
                )),
                (true, true) => Err(format!(
                    "Expected http-code not in [{}], but got {}",
                    expected.join(", "),
                    code
                )),
            }
        }
        Subject::Body | Subject::Headers => {
            let headers;
            let haystack = match rule.subject {
                Subject::Headers => {
                    headers = headers_to_text(&result.headers);
                    headers.as_str()
                }
                _ => result.body.as_str(),
            };

            // 不带 not 时要求每个值都出现；not 对整体取反，
            // 即只要有一个值缺失就通过，而不是要求每个值都不出现
            let missing = rule.patterns.iter().find(|p| !found_in(p, haystack));
            match (missing, rule.negate) {
                (None, false) => Ok(()),
                (Some(pattern), false) => Err(format!(
                    "Expected {} to contain '{}'",
                    rule.subject,
                    pattern.as_str()
                )),
                (Some(_), true) => Ok(()),
                (None, true) => Err(format!(
                    "Expected {} not to contain all of [{}]",
                    rule.subject,
                    expected.join(", ")
                )),
            }
        }
    }
}

fn evaluate_jsonpath(rule: &JsonPathRule, body: &str) -> Result<(), String> {
    let document: Option<Json> = serde_json::from_str(body).ok();
    let first = document
        .as_ref()
        .and_then(|doc| rule.path.query(doc).into_iter().next().cloned());

    let outcome = match (&first, rule.validate, &rule.expected) {
        (None, _, _) => Err(format!("Path {} not found", rule.path)),
        (Some(actual), true, Some(expected)) => {
            let actual = Value::from_json(actual);
            if actual.loosely_eq(expected) {
                Ok(())
            } else {
                Err(format!(
                    "Expected {} to be {}, but got {}",
                    rule.path, expected, actual
                ))
            }
        }
        (Some(_), _, _) => Ok(()),
    };

    match (outcome, rule.invert) {
        (result, false) => result,
        (Ok(()), true) => Err(format!("Expected {} not to match", rule.path)),
        (Err(_), true) => Ok(()),
    }
}

fn matches_whole(pattern: &Pattern, text: &str) -> bool {
    match pattern {
        Pattern::Literal(literal) => literal.trim() == text,
        Pattern::Regex(re) => re.is_match(text),
    }
}

fn found_in(pattern: &Pattern, haystack: &str) -> bool {
    match pattern {
        Pattern::Literal(literal) => haystack.contains(literal.as_str()),
        Pattern::Regex(re) => re.is_match(haystack),
    }
}
