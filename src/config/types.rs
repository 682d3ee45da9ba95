use crate::config::duration::{DurationValue, ThinkTimeConfig};
use crate::feeder::DataSource;
use crate::variable::Value;
use crate::{Result, RuloadError};
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::Deserialize;
use serde_yaml::{Mapping, Value as Yaml};
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::path::Path;

/// 场景文件顶层结构
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScenarioFile {
    #[serde(default)]
    pub execution: OneOrMany<ExecutionConfig>,

    #[serde(default)]
    pub scenarios: BTreeMap<String, ScenarioConfig>,

    #[serde(default)]
    pub reporting: Vec<ReportingConfig>,
}

/// 单个对象或对象列表
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

/// `execution` 条目
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ExecutionConfig {
    pub concurrency: Option<usize>,
    pub ramp_up: Option<DurationValue>,
    pub hold_for: Option<DurationValue>,
    pub iterations: Option<u64>,
    pub scenario: Option<String>,
}

/// YAML 标量（变量值、Header 值、查询参数）
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Number(f64),
    String(String),
}

impl Scalar {
    pub fn to_value(&self) -> Value {
        match self {
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Number(n) => Value::Number(*n),
            Scalar::String(s) => Value::String(s.clone()),
        }
    }

    /// 文本形式，整数不带小数点
    pub fn to_text(&self) -> String {
        self.to_value().to_string()
    }
}

/// `scenarios.<name>`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScenarioConfig {
    pub default_address: Option<String>,

    #[serde(default)]
    pub headers: BTreeMap<String, Scalar>,

    #[serde(default)]
    pub variables: BTreeMap<String, Scalar>,

    #[serde(default)]
    pub data_sources: Vec<DataSourceConfig>,

    pub think_time: Option<ThinkTimeConfig>,

    pub timeout: Option<DurationValue>,

    pub on_failure: Option<String>,

    #[serde(default)]
    pub requests: Vec<RawStep>,
}

/// 数据源：路径字符串或完整配置
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum DataSourceConfig {
    Path(String),
    Full(DataSourceOptions),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DataSourceOptions {
    pub path: String,
    pub delimiter: Option<String>,
    pub quoted: Option<bool>,
    #[serde(rename = "loop")]
    pub cycle: Option<bool>,
    pub variable_names: Option<String>,
    pub random_order: Option<bool>,
}

impl DataSourceConfig {
    /// 相对路径按场景文件所在目录解析
    pub fn to_source(&self, base_dir: &Path) -> Result<DataSource> {
        let options = match self {
            DataSourceConfig::Path(path) => {
                return Ok(DataSource::new(base_dir.join(path)));
            }
            DataSourceConfig::Full(options) => options,
        };

        let mut source = DataSource::new(base_dir.join(&options.path));
        if let Some(delimiter) = &options.delimiter {
            source = source.with_delimiter(parse_delimiter(delimiter)?);
        }
        if let Some(quoted) = options.quoted {
            source.quoted = quoted;
        }
        if let Some(cycle) = options.cycle {
            source = source.with_cycle(cycle);
        }
        if let Some(names) = &options.variable_names {
            source = source.with_variable_names(
                names
                    .split(',')
                    .map(|n| n.trim().to_string())
                    .filter(|n| !n.is_empty())
                    .collect(),
            );
        }
        if let Some(random) = options.random_order {
            source.random_order = random;
        }
        Ok(source)
    }
}

fn parse_delimiter(text: &str) -> Result<u8> {
    match text {
        "tab" | "\\t" => Ok(b'\t'),
        s if s.len() == 1 && s.is_ascii() => Ok(s.as_bytes()[0]),
        other => Err(RuloadError::Config(format!(
            "Invalid delimiter '{}': must be a single ASCII character",
            other
        ))),
    }
}

/// `reporting` 条目
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReportingConfig {
    pub module: String,
    pub dump_jsonl: Option<String>,
    pub dump_xml: Option<String>,
}

/// 步骤的原始映射
///
/// 同一步骤中重复的键以最后一次出现为准，嵌套的映射同样如此。
/// 纯字符串条目视为 `{url: ...}`。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawStep(pub Mapping);

impl RawStep {
    pub fn get(&self, key: &str) -> Option<&Yaml> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// 按目标类型反序列化
    pub fn parse<T: de::DeserializeOwned>(&self) -> Result<T> {
        serde_yaml::from_value(Yaml::Mapping(self.0.clone())).map_err(RuloadError::from)
    }
}

impl<'de> Deserialize<'de> for RawStep {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match LenientYaml::deserialize(deserializer)?.0 {
            Yaml::Mapping(mapping) => Ok(RawStep(mapping)),
            Yaml::String(url) => {
                let mut mapping = Mapping::new();
                mapping.insert(Yaml::from("url"), Yaml::String(url));
                Ok(RawStep(mapping))
            }
            _ => Err(de::Error::custom("request step must be a mapping or a URL string")),
        }
    }
}

/// 任意 YAML 值，映射中重复的键后者覆盖前者
struct LenientYaml(Yaml);

impl<'de> Deserialize<'de> for LenientYaml {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(LenientVisitor)
    }
}

struct LenientVisitor;

impl<'de> Visitor<'de> for LenientVisitor {
    type Value = LenientYaml;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("any YAML value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<Self::Value, E> {
        Ok(LenientYaml(Yaml::Bool(v)))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Self::Value, E> {
        Ok(LenientYaml(Yaml::Number(v.into())))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Self::Value, E> {
        Ok(LenientYaml(Yaml::Number(v.into())))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Self::Value, E> {
        Ok(LenientYaml(Yaml::Number(v.into())))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Self::Value, E> {
        Ok(LenientYaml(Yaml::String(v.to_string())))
    }

    fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<Self::Value, E> {
        Ok(LenientYaml(Yaml::String(v)))
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
        Ok(LenientYaml(Yaml::Null))
    }

    fn visit_none<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
        Ok(LenientYaml(Yaml::Null))
    }

    fn visit_some<D>(self, deserializer: D) -> std::result::Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        LenientYaml::deserialize(deserializer)
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut items = Vec::new();
        while let Some(LenientYaml(item)) = seq.next_element()? {
            items.push(item);
        }
        Ok(LenientYaml(Yaml::Sequence(items)))
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut mapping = Mapping::new();
        while let Some((LenientYaml(key), LenientYaml(value))) = map.next_entry()? {
            mapping.insert(key, value);
        }
        Ok(LenientYaml(Yaml::Mapping(mapping)))
    }
}

/// 请求步骤
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RequestConfig {
    pub url: String,
    pub method: Option<String>,
    pub label: Option<String>,

    #[serde(default)]
    pub headers: BTreeMap<String, Scalar>,

    #[serde(default)]
    pub params: BTreeMap<String, Scalar>,

    /// 字符串原样使用，映射或列表编码为 JSON
    pub body: Option<serde_json::Value>,

    pub think_time: Option<ThinkTimeConfig>,

    pub timeout: Option<DurationValue>,

    #[serde(default)]
    pub assert: Vec<AssertConfig>,

    #[serde(default)]
    pub assert_jsonpath: Vec<AssertJsonPathConfig>,

    /// 先执行全部 jsonpath 提取，再执行 regexp 提取；各自保持文件中的顺序
    #[serde(default, deserialize_with = "ordered_map")]
    pub extract_jsonpath: Vec<(String, JsonPathExtractConfig)>,

    #[serde(default, deserialize_with = "ordered_map")]
    pub extract_regexp: Vec<(String, RegexExtractConfig)>,
}

/// 按声明顺序读取映射
fn ordered_map<'de, D, T>(deserializer: D) -> std::result::Result<Vec<(String, T)>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    struct OrderedVisitor<T>(PhantomData<T>);

    impl<'de, T: Deserialize<'de>> Visitor<'de> for OrderedVisitor<T> {
        type Value = Vec<(String, T)>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a mapping of variable names")
        }

        fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some(entry) = map.next_entry::<String, T>()? {
                entries.push(entry);
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(OrderedVisitor(PhantomData))
}

/// 条件步骤
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ControlConfig {
    #[serde(rename = "if")]
    pub guard: String,

    #[serde(default)]
    pub then: Vec<RawStep>,

    #[serde(rename = "else", default)]
    pub otherwise: Vec<RawStep>,
}

/// 动作步骤
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActionConfig {
    pub action: String,
}

/// `assert` 条目：字符串为 Body 包含，映射为完整形式
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum AssertConfig {
    Text(String),
    Full(AssertOptions),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AssertOptions {
    pub contains: OneOrMany<Scalar>,
    pub subject: Option<String>,
    #[serde(rename = "not", default)]
    pub negate: bool,
    #[serde(default)]
    pub regexp: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum AssertJsonPathConfig {
    Path(String),
    Full(AssertJsonPathOptions),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AssertJsonPathOptions {
    pub jsonpath: String,
    pub expected_value: Option<Scalar>,
    #[serde(default)]
    pub validate: bool,
    #[serde(default)]
    pub invert: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum JsonPathExtractConfig {
    Path(String),
    Full(JsonPathExtractOptions),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JsonPathExtractOptions {
    pub jsonpath: String,
    pub default: Option<Scalar>,
    pub match_no: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RegexExtractConfig {
    Pattern(String),
    Full(RegexExtractOptions),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RegexExtractOptions {
    pub regexp: String,
    pub default: Option<Scalar>,
    pub template: Option<String>,
    pub match_no: Option<i64>,
    pub subject: Option<String>,
}
