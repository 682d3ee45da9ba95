/// 提取模块 - 从响应中提取值写入迭代变量
mod extractor;
pub mod jsonpath;
mod types;

pub use extractor::extract;
pub use jsonpath::{JsonPath, Segment};
pub use types::{ExtractSource, Extraction, MatchNo, RegexSubject};
