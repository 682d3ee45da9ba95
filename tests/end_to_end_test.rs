use ruload::config::{ScenarioLoader, TestPlan};
use ruload::http::Client;
use ruload::runner::{
    FanOutSink, JsonlSink, ResultSink, Scheduler, StopSignal, SummaryCollector, UserOutcome,
};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn write_plan(dir: &TempDir, yaml: &str, csv: &str) -> TestPlan {
    fs::write(dir.path().join("products.csv"), csv).unwrap();
    let scenario_path = dir.path().join("load.yml");
    fs::write(&scenario_path, yaml).unwrap();
    ScenarioLoader::load_from_path(&scenario_path, &[]).unwrap()
}

fn scheduler() -> Scheduler {
    Scheduler::new(Client::new().unwrap())
}

/// products → orders 流程：提取、NOT_FOUND 守卫、断言失败记录与 JSONL 输出
#[tokio::test]
async fn test_products_orders_flow() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/products/the_odyssey"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "the_odyssey",
            "title": "The Odyssey",
            "in_stock": 10
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/products/the_void"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "error": "PRODUCT_NOT_FOUND"
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/orders"))
        .and(header("Content-Type", "application/json"))
        .and(header("X-Client", "ruload"))
        .and(body_json(serde_json::json!({
            "order_details": [{"product_id": "the_odyssey", "quantity": "2"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 7})))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/orders/7"))
        .and(query_param("expand", "products"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 7,
            "order_details": [{"product_id": "the_odyssey", "quantity": 2}]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let yaml = format!(
        r#"
execution:
  concurrency: 1
  iterations: 2

scenarios:
  shop:
    default-address: {}
    headers:
      X-Client: ruload
    variables:
      quantity: 2
    data-sources:
      - path: products.csv
        loop: false
    requests:
      - label: get product
        url: /products/${{product_id}}
        assert:
          - contains: [200]
            subject: http-code
        extract-jsonpath:
          stock:
            jsonpath: $.in_stock
            default: NOT_FOUND

      - if: '${{stock}} == "NOT_FOUND"'
        then:
          - action: continue

      - label: create order
        url: /orders
        method: POST
        body:
          order_details:
            - product_id: ${{product_id}}
              quantity: ${{quantity}}
        extract-jsonpath:
          order_id: $.id

      - label: get order
        url: /orders/${{order_id}}
        params:
          expand: products
        assert:
          - contains: ['"product_id"']
        assert-jsonpath:
          - jsonpath: $.order_details[0].product_id
            expected-value: the_odyssey
            validate: true

reporting:
  - module: final-stats
    dump-jsonl: out/results.jsonl
"#,
        mock_server.uri()
    );

    let temp_dir = TempDir::new().unwrap();
    let plan = write_plan(&temp_dir, &yaml, "product_id\nthe_odyssey\nthe_void\n");
    let execution = plan.executions[0].clone();

    let collector = Arc::new(SummaryCollector::new());
    let jsonl_path = plan.report.dump_jsonl.clone().unwrap();
    let jsonl = Arc::new(JsonlSink::create(&jsonl_path).unwrap());
    let sink: Arc<dyn ResultSink> =
        Arc::new(FanOutSink::new().with(collector.clone()).with(jsonl.clone()));

    let report = scheduler()
        .run(execution.scenario, execution.profile, sink.clone(), StopSignal::new())
        .await;
    sink.flush().unwrap();

    assert_eq!(report.iterations(), 2);
    assert_eq!(report.users[0].outcome, UserOutcome::Completed);

    // 第一次迭代 3 个请求；第二次 404 后被守卫跳过
    let summary = collector.summary();
    assert_eq!(summary.samples(), 4);
    assert_eq!(summary.request_failures(), 0);
    assert_eq!(summary.assertion_failures(), 1);
    let labels: Vec<&str> = summary.labels.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, vec!["get product", "create order", "get order"]);
    assert_eq!(summary.labels[0].samples, 2);
    assert_eq!(summary.labels[0].assertion_failures, 1);

    let lines: Vec<serde_json::Value> = fs::read_to_string(&jsonl_path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 4);

    let failed = lines
        .iter()
        .find(|line| line["status"] == 404)
        .expect("404 result is recorded");
    assert_eq!(failed["label"], "get product");
    assert_eq!(failed["iteration"], 2);
    assert_eq!(failed["assertions"][0]["verdict"], "fail");
    assert!(failed.get("failure").is_none_or(|f| f.is_null()));

    let order = lines
        .iter()
        .find(|line| line["label"] == "get order")
        .unwrap();
    assert!(
        order["url"]
            .as_str()
            .unwrap()
            .ends_with("/orders/7?expand=products")
    );
    assert_eq!(order["assertions"].as_array().unwrap().len(), 2);
    assert!(
        order["assertions"]
            .as_array()
            .unwrap()
            .iter()
            .all(|a| a["verdict"] == "pass")
    );
}

/// 连接失败记录为请求失败，与断言失败区分
#[tokio::test]
async fn test_connection_failure_is_request_failure() {
    let yaml = r#"
execution: {iterations: 1}
scenarios:
  down:
    on-failure: abort-iteration
    timeout: 2s
    requests:
      - label: unreachable
        url: http://127.0.0.1:9/health
        assert:
          - contains: [200]
            subject: http-code
      - label: never sent
        url: http://127.0.0.1:9/other
"#;
    let temp_dir = TempDir::new().unwrap();
    let plan = write_plan(&temp_dir, yaml, "");
    let execution = plan.executions[0].clone();

    let collector = Arc::new(SummaryCollector::new());
    scheduler()
        .run(
            execution.scenario,
            execution.profile,
            collector.clone(),
            StopSignal::new(),
        )
        .await;

    let summary = collector.summary();
    assert_eq!(summary.samples(), 1);
    assert_eq!(summary.request_failures(), 1);
    assert_eq!(summary.assertion_failures(), 0);
    assert_eq!(summary.labels[0].label, "unreachable");
}

/// `stop` 动作触发全局停止信号
#[tokio::test]
async fn test_stop_action_stops_run() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let yaml = format!(
        r#"
execution:
  concurrency: 1
  hold-for: 30s
scenarios:
  stopper:
    default-address: {}
    requests:
      - /ping
      - action: stop
"#,
        mock_server.uri()
    );
    let temp_dir = TempDir::new().unwrap();
    let plan = write_plan(&temp_dir, &yaml, "");
    let execution = plan.executions[0].clone();

    let global = StopSignal::new();
    let collector = Arc::new(SummaryCollector::new());
    let report = tokio::time::timeout(
        Duration::from_secs(10),
        scheduler().run(
            execution.scenario,
            execution.profile,
            collector.clone(),
            global.clone(),
        ),
    )
    .await
    .expect("stop action ends the run before hold-for");

    assert!(global.is_stopped());
    assert_eq!(report.iterations(), 1);
    assert_eq!(collector.summary().samples(), 1);
}

/// `break` 只停止当前虚拟用户
#[tokio::test]
async fn test_break_action_ends_user() {
    let yaml = r#"
execution:
  concurrency: 3
  iterations: 5
scenarios:
  quitter:
    variables:
      done: true
    requests:
      - if: '${done} == true'
        then:
          - action: break
"#;
    let temp_dir = TempDir::new().unwrap();
    let plan = write_plan(&temp_dir, yaml, "");
    let execution = plan.executions[0].clone();

    let global = StopSignal::new();
    let report = scheduler()
        .run(
            execution.scenario,
            execution.profile,
            Arc::new(SummaryCollector::new()),
            global.clone(),
        )
        .await;

    assert!(!global.is_stopped());
    assert_eq!(report.started_users(), 3);
    assert_eq!(report.iterations(), 3);
    assert!(report.users.iter().all(|u| u.outcome == UserOutcome::Break));
}
