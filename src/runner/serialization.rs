use reqwest::header::HeaderMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::time::Duration;

pub mod header_map {
    use super::*;

    /// Header 输出为按名称排序的对象，非 UTF-8 值写为空串
    pub fn serialize<S>(headers: &HeaderMap, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = BTreeMap::new();
        for (k, v) in headers.iter() {
            map.insert(k.as_str(), v.to_str().unwrap_or(""));
        }
        map.serialize(serializer)
    }
}

pub mod duration_ms {
    use super::*;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Sample {
        #[serde(with = "header_map")]
        headers: HeaderMap,
        #[serde(with = "duration_ms")]
        latency: Duration,
    }

    #[test]
    fn test_serialize_headers_and_latency() {
        let mut headers = HeaderMap::new();
        headers.insert("x-b", "2".parse().unwrap());
        headers.insert("content-type", "application/json".parse().unwrap());

        let json = serde_json::to_string(&Sample {
            headers,
            latency: Duration::from_micros(12_900),
        })
        .unwrap();

        assert_eq!(
            json,
            r#"{"headers":{"content-type":"application/json","x-b":"2"},"latency":12}"#
        );
    }
}
