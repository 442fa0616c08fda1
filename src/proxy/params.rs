//! Request parameter types shared by the provider proxies.

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upstream resource id. Accepts a JSON string or non-negative number and
/// only allows `[A-Za-z0-9_-]`, so it is safe to splice into a URL path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn parse(value: &str) -> Result<Self, String> {
        if value.is_empty() {
            return Err("id must not be empty".to_string());
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(format!("invalid id '{}'", value));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ResourceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = deserializer.deserialize_any(IdVisitor)?;
        ResourceId::parse(&raw).map_err(de::Error::custom)
    }
}

struct IdVisitor;

impl<'de> Visitor<'de> for IdVisitor {
    type Value = String;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a string or non-negative integer id")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
        if v < 0 {
            return Err(E::custom(format!("invalid id '{}'", v)));
        }
        Ok(v.to_string())
    }
}

/// Id as returned by an upstream API, numeric or string
pub fn flexible_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    deserializer.deserialize_any(IdVisitor)
}

/// Page size, strictly positive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Limit(u32);

impl Limit {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl<'de> Deserialize<'de> for Limit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = deserializer.deserialize_any(CountVisitor)?;
        if value == 0 {
            return Err(de::Error::custom("limit must be greater than 0"));
        }
        Ok(Limit(value))
    }
}

/// Page offset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Offset(u32);

impl Offset {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl<'de> Deserialize<'de> for Offset {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(CountVisitor).map(Offset)
    }
}

// Dashboards send pagination as numbers or numeric strings
struct CountVisitor;

impl<'de> Visitor<'de> for CountVisitor {
    type Value = u32;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a non-negative integer")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<u32, E> {
        u32::try_from(v).map_err(|_| E::custom(format!("{} is out of range", v)))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<u32, E> {
        u32::try_from(v).map_err(|_| E::custom(format!("{} is out of range", v)))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<u32, E> {
        v.trim()
            .parse::<u32>()
            .map_err(|_| E::custom(format!("'{}' is not a non-negative integer", v)))
    }
}

/// Query string builder. Values are form-encoded unless pushed raw.
#[derive(Debug, Default)]
pub struct Query {
    pairs: Vec<String>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, key: &str, value: impl fmt::Display) -> Self {
        let encoded: String =
            url::form_urlencoded::byte_serialize(value.to_string().as_bytes()).collect();
        self.pairs.push(format!("{}={}", key, encoded));
        self
    }

    pub fn push_opt<T: fmt::Display>(self, key: &str, value: Option<T>) -> Self {
        match value {
            Some(value) => self.push(key, value),
            None => self,
        }
    }

    /// Rest.li values such as `List(...)` and `(start:(...))` must not be escaped
    pub fn push_raw(mut self, key: &str, value: &str) -> Self {
        self.pairs.push(format!("{}={}", key, value));
        self
    }

    pub fn finish(self) -> String {
        if self.pairs.is_empty() {
            String::new()
        } else {
            format!("?{}", self.pairs.join("&"))
        }
    }
}

/// Trailing id of a URN (`urn:li:sponsoredAccount:123` -> `123`)
pub fn urn_id(urn: &str) -> String {
    urn.rsplit(':').next().unwrap_or(urn).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resource_id_accepts_strings_and_numbers() {
        let id: ResourceId = serde_json::from_value(json!("job_42-a")).unwrap();
        assert_eq!(id.as_str(), "job_42-a");

        let id: ResourceId = serde_json::from_value(json!(12345)).unwrap();
        assert_eq!(id.as_str(), "12345");
    }

    #[test]
    fn test_resource_id_rejects_path_characters() {
        assert!(serde_json::from_value::<ResourceId>(json!("../admin")).is_err());
        assert!(serde_json::from_value::<ResourceId>(json!("1?x=2")).is_err());
        assert!(serde_json::from_value::<ResourceId>(json!("")).is_err());
        assert!(serde_json::from_value::<ResourceId>(json!(-1)).is_err());
        assert!(serde_json::from_value::<ResourceId>(json!(true)).is_err());
    }

    #[test]
    fn test_limit_must_be_positive() {
        assert_eq!(serde_json::from_value::<Limit>(json!(25)).unwrap().get(), 25);
        assert_eq!(serde_json::from_value::<Limit>(json!("10")).unwrap().get(), 10);

        let err = serde_json::from_value::<Limit>(json!(0)).unwrap_err();
        assert!(err.to_string().contains("greater than 0"));
        assert!(serde_json::from_value::<Limit>(json!(-5)).is_err());
    }

    #[test]
    fn test_query_builder() {
        let query = Query::new()
            .push("limit", 10)
            .push_opt::<u32>("offset", None)
            .push("keywords", "rust engineer & co")
            .push_raw("campaigns", "List(urn%3Ali%3AsponsoredCampaign%3A1)")
            .finish();

        assert_eq!(
            query,
            "?limit=10&keywords=rust+engineer+%26+co&campaigns=List(urn%3Ali%3AsponsoredCampaign%3A1)"
        );
        assert_eq!(Query::new().finish(), "");
    }

    #[test]
    fn test_urn_id() {
        assert_eq!(urn_id("urn:li:sponsoredAccount:507404993"), "507404993");
        assert_eq!(urn_id("507404993"), "507404993");
    }
}
