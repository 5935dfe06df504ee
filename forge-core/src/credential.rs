//! Persisted API credential: a little-endian `u32` byte length, then UTF-8.

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Serialize a credential into its length-prefixed form.
pub fn encode(credential: &str) -> Vec<u8> {
    let bytes = credential.as_bytes();
    let mut out = Vec::with_capacity(4 + bytes.len());
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
    out
}

/// Parse a length-prefixed credential. Truncated or non-UTF-8 input yields `None`.
pub fn decode(data: &[u8]) -> Option<String> {
    let (len, rest) = data.split_first_chunk::<4>()?;
    let len = u32::from_le_bytes(*len) as usize;
    let body = rest.get(..len)?;
    String::from_utf8(body.to_vec()).ok()
}

/// The credential as a host-persisted value.
///
/// Serializes as the length-prefixed byte string; anything that fails to
/// decode comes back as an empty credential.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credential(pub String);

impl Credential {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl Serialize for Credential {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Credential {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let data = Vec::<u8>::deserialize(deserializer)?;
        Ok(Credential(decode(&data).unwrap_or_default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        assert_eq!(encode("ab"), vec![2, 0, 0, 0, b'a', b'b']);
        assert_eq!(encode(""), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_decode_utf8() {
        let key = "sk-ünïcode";
        assert_eq!(decode(&encode(key)).as_deref(), Some(key));
    }

    #[test]
    fn test_truncated_input() {
        assert_eq!(decode(&[]), None);
        assert_eq!(decode(&[5, 0, 0]), None);
        assert_eq!(decode(&[5, 0, 0, 0, b'a']), None);
    }

    #[test]
    fn test_invalid_utf8() {
        assert_eq!(decode(&[2, 0, 0, 0, 0xff, 0xfe]), None);
    }

    #[test]
    fn test_serde_form_is_length_prefixed() {
        let json = serde_json::to_string(&Credential("key".into())).unwrap();
        assert_eq!(json, "[3,0,0,0,107,101,121]");
        let back: Credential = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_str(), "key");

        let garbage: Credential = serde_json::from_str("[9,0,0,0,1]").unwrap();
        assert!(garbage.is_empty());
    }
}
