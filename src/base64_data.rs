//! Wrapper for `Vec<u8>` that serialises as websafe-base64 on the wire, as
//! the U2F javascript API requires, while tolerating the alternate padding
//! and alphabet choices real clients produce.

use serde::de::{Error, Unexpected, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A byte buffer that serialises as a websafe-base64 string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Base64UrlSafeData(pub Vec<u8>);

impl fmt::Display for Base64UrlSafeData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            base64::encode_config(&self.0, base64::URL_SAFE_NO_PAD)
        )
    }
}

impl From<Vec<u8>> for Base64UrlSafeData {
    fn from(v: Vec<u8>) -> Base64UrlSafeData {
        Base64UrlSafeData(v)
    }
}

impl From<&[u8]> for Base64UrlSafeData {
    fn from(v: &[u8]) -> Base64UrlSafeData {
        Base64UrlSafeData(v.to_vec())
    }
}

impl From<Base64UrlSafeData> for Vec<u8> {
    fn from(d: Base64UrlSafeData) -> Vec<u8> {
        d.0
    }
}

impl AsRef<[u8]> for Base64UrlSafeData {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl PartialEq<[u8]> for Base64UrlSafeData {
    fn eq(&self, other: &[u8]) -> bool {
        self.0 == other
    }
}

static ALLOWED_DECODING_FORMATS: &[base64::Config] = &[
    base64::URL_SAFE_NO_PAD,
    base64::URL_SAFE,
    base64::STANDARD,
    base64::STANDARD_NO_PAD,
];

struct Base64UrlSafeDataVisitor;

impl<'de> Visitor<'de> for Base64UrlSafeDataVisitor {
    type Value = Base64UrlSafeData;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "a base64 url encoded string")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: Error,
    {
        // Forgive alt base64 decoding formats
        for config in ALLOWED_DECODING_FORMATS {
            if let Ok(data) = base64::decode_config(v, *config) {
                return Ok(Base64UrlSafeData(data));
            }
        }

        Err(Error::invalid_value(Unexpected::Str(v), &self))
    }
}

impl<'de> Deserialize<'de> for Base64UrlSafeData {
    fn deserialize<D>(deserializer: D) -> Result<Self, <D as Deserializer<'de>>::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_str(Base64UrlSafeDataVisitor)
    }
}

impl Serialize for Base64UrlSafeData {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let encoded = base64::encode_config(&self.0, base64::URL_SAFE_NO_PAD);
        serializer.serialize_str(&encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::Base64UrlSafeData;

    #[test]
    fn decodes_all_tolerated_alphabets() {
        // "hello" padded and unpadded.
        for s in ["\"aGVsbG8=\"", "\"aGVsbG8\""] {
            let d: Base64UrlSafeData = serde_json::from_str(s).unwrap();
            assert_eq!(d.as_ref(), b"hello");
        }
    }

    #[test]
    fn serialises_unpadded_urlsafe() {
        let d = Base64UrlSafeData(vec![0xfb, 0xef, 0xff]);
        assert_eq!(serde_json::to_string(&d).unwrap(), "\"--__\"");
    }

    #[test]
    fn rejects_non_base64() {
        assert!(serde_json::from_str::<Base64UrlSafeData>("\"!!not base64!!\"").is_err());
    }
}
