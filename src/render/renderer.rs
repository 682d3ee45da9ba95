use crate::http::RenderedRequest;
use crate::http::types::resolve_url;
use crate::scenario::{RequestStep, Scenario};
use crate::variable::VariableStore;
use crate::{Result, RuloadError};

/// 请求模板渲染器
pub struct RequestRenderer;

impl RequestRenderer {
    /// 用当前变量渲染请求步骤
    ///
    /// URL、查询参数、Header、Body 分别渲染。场景 Header 先写入，
    /// 步骤 Header 按名称（不区分大小写）覆盖。
    pub fn render(
        step: &RequestStep,
        store: &VariableStore,
        scenario: &Scenario,
    ) -> Result<RenderedRequest> {
        // 1. URL 与查询参数
        let path = render_field(store, &step.url, "url")?;
        let params = step
            .params
            .iter()
            .map(|(k, v)| Ok((render_field(store, k, "param")?, render_field(store, v, k)?)))
            .collect::<Result<Vec<_>>>()?;
        let url = resolve_url(scenario.default_address.as_ref(), &path, &params)?;

        let mut request = RenderedRequest::new(step.method, url.as_str());

        // 2. Headers
        for (key, value) in scenario.headers.iter().chain(step.headers.iter()) {
            let key = render_field(store, key, "header")?;
            let value = render_field(store, value, &key)?;
            request.insert_header(&key, &value);
        }

        // 3. Body
        if let Some(body) = &step.body {
            request.body = Some(render_field(store, body, "body")?);
            if step.json_body && request.header("content-type").is_none() {
                request.insert_header("Content-Type", "application/json");
            }
        }

        Ok(request)
    }
}

/// 渲染单个字段，未解析变量转换为带字段名的 `TemplateRender`
fn render_field(store: &VariableStore, template: &str, field: &str) -> Result<String> {
    store.render(template).map_err(|e| match e {
        RuloadError::UnresolvedVariable(name) => {
            RuloadError::TemplateRender(format!("{}: variable '{}' is not defined", field, name))
        }
        other => other,
    })
}
