use ruload::{Result, RuloadError};

#[test]
fn test_config_error() {
    let err = RuloadError::Config("concurrency must be at least 1".to_string());
    assert_eq!(err.to_string(), "配置错误: concurrency must be at least 1");
}

#[test]
fn test_invalid_url() {
    let err = RuloadError::InvalidUrl("not a url".to_string());
    assert_eq!(err.to_string(), "无效的 URL: not a url");
}

#[test]
fn test_request_failure_classification() {
    assert!(RuloadError::Connection("refused".to_string()).is_request_failure());
    assert!(RuloadError::Timeout("30s".to_string()).is_request_failure());
    assert!(RuloadError::Protocol("bad header".to_string()).is_request_failure());

    assert!(!RuloadError::TemplateRender("x".to_string()).is_request_failure());
    assert!(!RuloadError::DataExhausted("users.csv".to_string()).is_request_failure());
}

#[test]
fn test_error_conversion_from_anyhow() {
    let anyhow_err = anyhow::anyhow!("test anyhow error");
    let ruload_err: RuloadError = anyhow_err.into();
    assert!(ruload_err.to_string().contains("test anyhow error"));
}

#[test]
fn test_error_conversion_from_yaml() {
    let yaml_err = serde_yaml::from_str::<serde_yaml::Value>("a: [").unwrap_err();
    let ruload_err: RuloadError = yaml_err.into();
    assert!(matches!(ruload_err, RuloadError::YamlError(_)));
}

#[test]
fn test_result_type() {
    fn returns_error() -> Result<()> {
        Err(RuloadError::DataExhausted("products.csv".to_string()))
    }

    match returns_error() {
        Err(RuloadError::DataExhausted(source)) => assert_eq!(source, "products.csv"),
        _ => panic!("Expected DataExhausted"),
    }
}
