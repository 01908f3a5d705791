//! Pull and push message bodies.

use crate::bucket::Bucket;
use crate::error::{ProtocolError, ProtocolResult};
use crate::snapshot::BucketSnapshot;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// Query parameter naming the bucket on pull requests.
const FIELD_PARAM: &str = "field";

/// Body of a push request: the complete replacement snapshot for one bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushBody {
    /// Every entry currently in the bucket.
    #[serde(rename = "userData")]
    pub user_data: BucketSnapshot,
    /// Bucket name, `null` for the global bucket.
    pub field: Option<String>,
}

impl PushBody {
    /// Creates a push body for `bucket`.
    pub fn new(bucket: &Bucket, snapshot: BucketSnapshot) -> Self {
        Self {
            user_data: snapshot,
            field: bucket.name().map(str::to_owned),
        }
    }

    /// Returns the bucket this body replaces.
    #[must_use]
    pub fn bucket(&self) -> Bucket {
        Bucket::from(self.field.clone())
    }

    /// Encodes to JSON.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes from JSON.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Decodes a pull response body into a snapshot.
///
/// An empty body or `null` is an empty bucket. Some deployments serialize
/// the bucket object into a JSON string before sending it; one level of such
/// wrapping is unwrapped.
pub fn decode_pull_body(bytes: &[u8]) -> ProtocolResult<BucketSnapshot> {
    decode_pull_value(bytes, true)
}

fn decode_pull_value(bytes: &[u8], allow_wrapped: bool) -> ProtocolResult<BucketSnapshot> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(BucketSnapshot::new());
    }

    match serde_json::from_slice::<Value>(bytes)? {
        Value::Null => Ok(BucketSnapshot::new()),
        Value::Object(map) => Ok(serde_json::from_value(Value::Object(map))?),
        Value::String(inner) if allow_wrapped => decode_pull_value(inner.as_bytes(), false),
        other => Err(ProtocolError::invalid_structure(format!(
            "expected bucket object, found {}",
            json_kind(&other)
        ))),
    }
}

/// Encodes a snapshot as a pull response body.
pub fn encode_pull_body(snapshot: &BucketSnapshot) -> ProtocolResult<Vec<u8>> {
    Ok(serde_json::to_vec(snapshot)?)
}

/// Builds the URL of a pull request for `bucket` against `sync_url`.
///
/// The global bucket adds no query; named buckets append `field=<name>`,
/// form-urlencoded.
pub fn pull_url(sync_url: &str, bucket: &Bucket) -> ProtocolResult<String> {
    let mut url = Url::parse(sync_url)?;
    if let Some(name) = bucket.name() {
        url.query_pairs_mut().append_pair(FIELD_PARAM, name);
    }
    Ok(url.into())
}

/// Parses the bucket a pull request URL selects.
pub fn parse_pull_url(url: &str) -> ProtocolResult<Bucket> {
    let url = Url::parse(url)?;
    let bucket = url
        .query_pairs()
        .find(|(name, _)| name == FIELD_PARAM)
        .map_or_else(Bucket::global, |(_, value)| Bucket::named(value.into_owned()));
    Ok(bucket)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
