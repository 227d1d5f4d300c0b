use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use crate::domain::Segment;
use crate::error::NodeError;

/// 将比较值转换为 f64；非数字视为配置错误
pub fn expected_f64(value: &Value) -> Result<f64, NodeError> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| NodeError::TypeError("Cannot convert number to f64".to_string())),
        Value::String(s) => s.trim().parse::<f64>().map_err(|e| {
            NodeError::ConfigError(format!("Cannot convert '{}' to number: {}", s, e))
        }),
        other => Err(NodeError::ConfigError(format!(
            "numeric comparison needs a number, got {}",
            other
        ))),
    }
}

/// 将 Value 转换为字符串
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// 成员类操作符的比较值：数组或单个字符串
pub fn expected_string_list(value: &Value) -> Result<Vec<String>, NodeError> {
    match value {
        Value::Array(arr) => Ok(arr.iter().map(value_to_string).collect()),
        Value::String(s) => Ok(vec![s.clone()]),
        other => Err(NodeError::ConfigError(format!(
            "membership comparison needs an array, got {}",
            other
        ))),
    }
}

/// 解析时间戳：RFC 3339、`YYYY-MM-DD HH:MM:SS`、`YYYY-MM-DD` 或 Unix 秒
pub fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|n| n.and_utc());
    }
    s.parse::<i64>().ok().and_then(epoch_seconds)
}

fn epoch_seconds(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(secs, 0)
}

/// 比较值转换为时间戳；无法解析视为配置错误
pub fn expected_timestamp(value: &Value) -> Result<DateTime<Utc>, NodeError> {
    let parsed = match value {
        Value::String(s) => parse_timestamp_str(s),
        Value::Number(n) => n.as_i64().and_then(epoch_seconds),
        _ => None,
    };
    parsed.ok_or_else(|| NodeError::ConfigError(format!("invalid timestamp operand: {}", value)))
}

/// 变量值转换为时间戳；无法解析时返回 None（条件不成立）
pub fn segment_timestamp(segment: &Segment) -> Option<DateTime<Utc>> {
    match segment {
        Segment::String(s) => parse_timestamp_str(s),
        Segment::Integer(i) => epoch_seconds(*i),
        Segment::Float(f) => epoch_seconds(*f as i64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_expected_f64() {
        assert_eq!(expected_f64(&json!(3)).unwrap(), 3.0);
        assert_eq!(expected_f64(&json!(" 2.5 ")).unwrap(), 2.5);
        assert!(matches!(
            expected_f64(&json!("abc")),
            Err(NodeError::ConfigError(_))
        ));
        assert!(expected_f64(&json!([1])).is_err());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let a = parse_timestamp_str("2024-01-02T03:04:05Z").unwrap();
        let b = parse_timestamp_str("2024-01-02 03:04:05").unwrap();
        assert_eq!(a, b);
        let c = parse_timestamp_str("2024-01-02").unwrap();
        assert!(c < a);
        let d = parse_timestamp_str("0").unwrap();
        assert_eq!(d.timestamp(), 0);
        assert!(parse_timestamp_str("yesterday").is_none());
    }

    #[test]
    fn test_expected_string_list() {
        assert_eq!(
            expected_string_list(&json!(["a", 1])).unwrap(),
            vec!["a".to_string(), "1".to_string()]
        );
        assert!(expected_string_list(&json!({"a": 1})).is_err());
    }
}
