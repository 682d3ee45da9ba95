use crate::assertion::{AssertionRule, Subject};
use crate::config::types::{
    ActionConfig, AssertConfig, AssertJsonPathConfig, ControlConfig, JsonPathExtractConfig,
    RawStep, RegexExtractConfig, RequestConfig, ScenarioConfig,
};
use crate::extract::{Extraction, MatchNo, RegexSubject};
use crate::http::types::normalize_address;
use crate::http::{DEFAULT_TIMEOUT, Method};
use crate::scenario::expr::Guard;
use crate::scenario::types::{Action, ControlStep, FailurePolicy, RequestStep, Scenario, Step};
use crate::variable::{Globals, Value};
use crate::{Result, RuloadError};
use std::sync::Arc;

/// 将 `scenarios.<name>` 配置转换为可执行的场景
///
/// `overrides` 为环境与命令行变量，覆盖同名的 `variables`。
/// 数据源由加载器负责打开。
pub fn convert_scenario(
    name: &str,
    config: &ScenarioConfig,
    overrides: &[(String, String)],
) -> Result<Scenario> {
    let mut scenario = Scenario::new(name);

    // 1. 基地址与默认 Header
    scenario.default_address = config
        .default_address
        .as_deref()
        .map(normalize_address)
        .transpose()?;
    scenario.headers = config
        .headers
        .iter()
        .map(|(k, v)| (k.clone(), v.to_text()))
        .collect();

    // 2. 全局变量，覆盖项最后写入
    let mut globals = Globals::new();
    globals.extend(
        config
            .variables
            .iter()
            .map(|(k, v)| (k.clone(), v.to_value())),
    );
    globals.extend(
        overrides
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone()))),
    );
    scenario.globals = Arc::new(globals);

    // 3. 场景级 think-time、超时与失败策略
    if let Some(think_time) = &config.think_time {
        scenario.think_time = think_time.to_think_time()?;
    }
    scenario.timeout = match &config.timeout {
        Some(timeout) => timeout.to_duration()?,
        None => DEFAULT_TIMEOUT,
    };
    if let Some(policy) = &config.on_failure {
        scenario.failure_policy = FailurePolicy::parse(policy)?;
    }

    // 4. 步骤
    let mut position = 0;
    scenario.steps = convert_steps(&config.requests, &mut position)
        .map_err(|e| RuloadError::Config(format!("scenario '{}': {}", name, e)))?;

    Ok(scenario)
}

/// 转换步骤列表，`position` 为已分配的请求序号
pub fn convert_steps(raw: &[RawStep], position: &mut usize) -> Result<Vec<Step>> {
    raw.iter().map(|step| convert_step(step, position)).collect()
}

fn convert_step(raw: &RawStep, position: &mut usize) -> Result<Step> {
    if raw.contains_key("if") {
        let control: ControlConfig = raw.parse()?;
        let guard = Guard::parse(&control.guard)
            .map_err(|e| RuloadError::Config(format!("Invalid guard '{}': {}", control.guard, e)))?;
        let then = convert_steps(&control.then, position)?;
        let otherwise = convert_steps(&control.otherwise, position)?;
        return Ok(Step::Control(ControlStep {
            guard,
            then,
            otherwise,
        }));
    }

    if raw.contains_key("action") {
        let action: ActionConfig = raw.parse()?;
        return Ok(Step::Action(action.action.parse()?));
    }

    if raw.contains_key("url") {
        let request: RequestConfig = raw.parse()?;
        *position += 1;
        return Ok(Step::Request(Box::new(convert_request(request, *position)?)));
    }

    Err(RuloadError::Config(
        "step must declare 'url', 'if' or 'action'".to_string(),
    ))
}

/// 转换单个请求步骤
pub fn convert_request(config: RequestConfig, position: usize) -> Result<RequestStep> {
    let method = match config.method.as_deref() {
        Some(m) => Method::parse(m)?,
        None => Method::Get,
    };

    let mut step = RequestStep::new(position, method, config.url.as_str());
    if let Some(label) = config.label {
        step.label = label;
    }

    step.headers = config
        .headers
        .iter()
        .map(|(k, v)| (k.clone(), v.to_text()))
        .collect();
    step.params = config
        .params
        .iter()
        .map(|(k, v)| (k.clone(), v.to_text()))
        .collect();

    match config.body {
        None | Some(serde_json::Value::Null) => {}
        Some(serde_json::Value::String(text)) => step.body = Some(text),
        Some(structured) => {
            step.body = Some(serde_json::to_string(&structured)?);
            step.json_body = true;
        }
    }

    step.think_time = config
        .think_time
        .as_ref()
        .map(|t| t.to_think_time())
        .transpose()?;
    step.timeout = config
        .timeout
        .as_ref()
        .map(|t| t.to_duration())
        .transpose()?;

    step.assertions = config
        .assert
        .into_iter()
        .map(AssertionRule::try_from)
        .chain(config.assert_jsonpath.into_iter().map(AssertionRule::try_from))
        .collect::<Result<Vec<_>>>()?;

    for (name, extract) in config.extract_jsonpath {
        step.extractions.push(jsonpath_extraction(name, extract)?);
    }
    for (name, extract) in config.extract_regexp {
        step.extractions.push(regex_extraction(name, extract)?);
    }

    Ok(step)
}

impl TryFrom<AssertConfig> for AssertionRule {
    type Error = RuloadError;

    fn try_from(config: AssertConfig) -> Result<Self> {
        match config {
            AssertConfig::Text(text) => AssertionRule::contains(vec![text], Subject::Body, false, false),
            AssertConfig::Full(options) => {
                let subject = match options.subject.as_deref() {
                    Some(s) => s.parse()?,
                    None => Subject::Body,
                };
                let values = options
                    .contains
                    .into_vec()
                    .iter()
                    .map(|v| v.to_text())
                    .collect();
                AssertionRule::contains(values, subject, options.negate, options.regexp)
            }
        }
    }
}

impl TryFrom<AssertJsonPathConfig> for AssertionRule {
    type Error = RuloadError;

    fn try_from(config: AssertJsonPathConfig) -> Result<Self> {
        match config {
            AssertJsonPathConfig::Path(path) => AssertionRule::jsonpath(&path, None, false, false),
            AssertJsonPathConfig::Full(options) => AssertionRule::jsonpath(
                &options.jsonpath,
                options.expected_value.map(|v| v.to_value()),
                options.validate,
                options.invert,
            ),
        }
    }
}

fn jsonpath_extraction(name: String, config: JsonPathExtractConfig) -> Result<Extraction> {
    match config {
        JsonPathExtractConfig::Path(path) => Extraction::jsonpath(name, &path),
        JsonPathExtractConfig::Full(options) => {
            let mut extraction = Extraction::jsonpath(name, &options.jsonpath)?
                .with_match_no(MatchNo::from_config(options.match_no)?);
            if let Some(default) = options.default {
                extraction = extraction.with_default(default.to_value());
            }
            Ok(extraction)
        }
    }
}

fn regex_extraction(name: String, config: RegexExtractConfig) -> Result<Extraction> {
    match config {
        RegexExtractConfig::Pattern(pattern) => {
            Extraction::regex(name, &pattern, default_template(&pattern), RegexSubject::Body)
        }
        RegexExtractConfig::Full(options) => {
            let subject = match options.subject.as_deref().map(str::to_lowercase).as_deref() {
                None | Some("body") => RegexSubject::Body,
                Some("headers") => RegexSubject::Headers,
                Some(other) => {
                    return Err(RuloadError::Config(format!(
                        "Invalid extract-regexp subject: {}. Must be 'body' or 'headers'",
                        other
                    )));
                }
            };
            let template = options
                .template
                .as_deref()
                .unwrap_or_else(|| default_template(&options.regexp));
            let mut extraction = Extraction::regex(name, &options.regexp, template, subject)?
                .with_match_no(MatchNo::from_config(options.match_no)?);
            if let Some(default) = options.default {
                extraction = extraction.with_default(default.to_value());
            }
            Ok(extraction)
        }
    }
}

/// 有分组取第 1 组，否则取整个匹配
fn default_template(pattern: &str) -> &'static str {
    match regex::Regex::new(pattern) {
        Ok(re) if re.captures_len() == 1 => "$0$",
        _ => "$1$",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ExtractSource;
    use crate::variable::NOT_FOUND;
    use std::time::Duration;

    fn scenario_from(yaml: &str) -> Result<Scenario> {
        let config: ScenarioConfig = serde_yaml::from_str(yaml).unwrap();
        convert_scenario("api", &config, &[])
    }

    #[test]
    fn test_convert_basic_scenario() {
        let scenario = scenario_from(
            r#"
default-address: ":8080"
headers:
  Accept: application/json
variables:
  product: the_odyssey
  quantity: 2
think-time: uniform(0s, 10ms)
timeout: 5s
requests:
  - url: /products
    label: list products
  - url: /orders
    method: POST
    body:
      product_id: ${product}
      quantity: 1
"#,
        )
        .unwrap();

        assert_eq!(
            scenario.default_address.as_ref().map(|u| u.as_str()),
            Some("http://localhost:8080/")
        );
        assert_eq!(
            scenario.headers,
            vec![("Accept".to_string(), "application/json".to_string())]
        );
        assert_eq!(scenario.timeout, Duration::from_secs(5));
        assert_eq!(scenario.think_time.max(), Duration::from_millis(10));
        assert_eq!(scenario.steps.len(), 2);

        let requests = scenario.requests();
        assert_eq!(requests[0].label, "list products");
        assert_eq!(requests[0].method, Method::Get);
        assert_eq!(requests[1].position, 2);
        assert_eq!(requests[1].method, Method::Post);
        assert!(requests[1].json_body);
        assert_eq!(
            requests[1].body.as_deref(),
            Some(r#"{"product_id":"${product}","quantity":1}"#)
        );

        let store = scenario.new_store();
        assert_eq!(store.render("${quantity}").unwrap(), "2");
    }

    #[test]
    fn test_overrides_replace_variables() {
        let config: ScenarioConfig =
            serde_yaml::from_str("variables: {host: a}\nrequests: []").unwrap();
        let scenario =
            convert_scenario("api", &config, &[("host".to_string(), "b".to_string())]).unwrap();
        assert_eq!(scenario.new_store().render("${host}").unwrap(), "b");
    }

    #[test]
    fn test_convert_control_and_action() {
        let scenario = scenario_from(
            r#"
requests:
  - url: http://localhost/orders
    extract-jsonpath:
      created_order_id:
        jsonpath: $.id
        default: NOT_FOUND
  - if: '"${created_order_id}" == "NOT_FOUND"'
    then:
      - action: continue
    else:
      - url: http://localhost/orders/${created_order_id}
  - action: break
"#,
        )
        .unwrap();

        assert_eq!(scenario.steps.len(), 3);
        match &scenario.steps[1] {
            Step::Control(control) => {
                assert!(matches!(control.then[0], Step::Action(Action::Continue)));
                assert_eq!(control.otherwise.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(scenario.steps[2], Step::Action(Action::Break)));
        assert_eq!(scenario.requests()[1].position, 2);
    }

    #[test]
    fn test_convert_assertions_and_extractions() {
        let scenario = scenario_from(
            r#"
requests:
  - url: http://localhost/products
    assert:
      - the_odyssey
      - contains: [200]
        subject: http-code
        not: false
    assert-jsonpath:
      - $.products
      - jsonpath: $.count
        expected-value: 3
        validate: true
    extract-jsonpath:
      first: $.products[0].product_id
      all:
        jsonpath: $..product_id
        match-no: -1
    extract-regexp:
      request_id:
        regexp: 'x-request-id: (\S+)'
        subject: headers
      raw: '\d+'
"#,
        )
        .unwrap();

        let step = scenario.requests()[0];
        assert_eq!(step.assertions.len(), 4);
        assert_eq!(step.assertions[0].describe(), "body contains [the_odyssey]");
        assert_eq!(step.assertions[1].describe(), "http-code contains [200]");
        assert_eq!(step.assertions[3].describe(), "jsonpath $.count == 3");

        assert_eq!(step.extractions.len(), 4);
        let names: Vec<&str> = step.extractions.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["first", "all", "request_id", "raw"]);
        let all = step.extractions.iter().find(|e| e.name == "all").unwrap();
        assert_eq!(all.match_no, MatchNo::All);
        let first = step.extractions.iter().find(|e| e.name == "first").unwrap();
        assert_eq!(first.default, Value::from(NOT_FOUND));
        let request_id = step
            .extractions
            .iter()
            .find(|e| e.name == "request_id")
            .unwrap();
        assert!(matches!(
            request_id.source,
            ExtractSource::Regex {
                subject: RegexSubject::Headers,
                group: 1,
                ..
            }
        ));
        let raw = step.extractions.iter().find(|e| e.name == "raw").unwrap();
        assert!(matches!(raw.source, ExtractSource::Regex { group: 0, .. }));
    }

    #[test]
    fn test_invalid_configs() {
        assert!(scenario_from("requests: [{method: GET}]").is_err());
        assert!(scenario_from("requests: [{url: /a, method: FETCH}]").is_err());
        assert!(scenario_from("requests: [{action: retry}]").is_err());
        assert!(scenario_from("requests: [{if: '${a} ==', then: []}]").is_err());
        assert!(scenario_from("requests: [{url: /a, extract-jsonpath: {id: 'id'}}]").is_err());
        assert!(scenario_from("on-failure: retry\nrequests: []").is_err());
        assert!(scenario_from("default-address: 'http://'\nrequests: []").is_err());
    }
}
