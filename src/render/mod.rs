/// 请求渲染 - 将请求步骤模板展开为可发送的请求
mod renderer;

pub use renderer::RequestRenderer;
