use base58::{FromBase58 as _, ToBase58 as _};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::ops::{Deref, DerefMut};

fixed_hash::construct_fixed_hash! {
    /// A 32-byte hash. Rendered as base58 wherever it crosses a serde
    /// boundary.
    pub struct H256(32);
}

impl Serialize for H256 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0.to_base58())
    }
}

impl<'de> Deserialize<'de> for H256 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        let bytes = raw
            .from_base58()
            .map_err(|err| de::Error::custom(format!("invalid base58 string: {:?}", err)))?;
        if bytes.len() != Self::len_bytes() {
            return Err(de::Error::custom(format!(
                "invalid hash length {}, expected {}",
                bytes.len(),
                Self::len_bytes()
            )));
        }
        Ok(Self::from_slice(&bytes))
    }
}

/// A wrapper around `Vec<u8>` for all fields that travel base64-url encoded
/// (chunk payloads, proof buffers).
#[derive(Default, Clone, Eq, PartialEq, Hash)]
pub struct Base64(pub Vec<u8>);

impl std::fmt::Display for Base64 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", base64_url::encode(&self.0))
    }
}

// Debug as the encoded form, raw bytes are unreadable in logs.
impl std::fmt::Debug for Base64 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Base64({})", self)
    }
}

impl Deref for Base64 {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Base64 {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Vec<u8>> for Base64 {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl TryFrom<&str> for Base64 {
    type Error = base64_url::base64::DecodeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        base64_url::decode(value).map(Self)
    }
}

impl Serialize for Base64 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Base64 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct Base64Visitor;

        impl de::Visitor<'_> for Base64Visitor {
            type Value = Base64;

            fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                formatter.write_str("a base64-url encoded string")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                base64_url::decode(value)
                    .map(Base64)
                    .map_err(|err| de::Error::custom(format!("invalid base64-url string: {}", err)))
            }
        }

        deserializer.deserialize_str(Base64Visitor)
    }
}

/// Serializes and deserializes `u64` fields as decimal strings. JSON numbers
/// lose precision past 2^53, so byte counts always cross the wire as strings.
pub mod string_u64 {
    use serde::{de, Deserialize as _, Deserializer, Serializer};

    pub fn serialize<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn base64_round_trips_through_json() {
        let value = Base64(vec![0_u8, 1, 2, 253, 254, 255]);
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, format!("\"{}\"", base64_url::encode(&value.0)));
        let decoded: Base64 = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn base64_rejects_invalid_encoding() {
        let result: Result<Base64, _> = serde_json::from_str("\"not!valid!\"");
        assert!(result.is_err());
    }

    #[test]
    fn h256_round_trips_through_base58_json() {
        let hash = H256::random();
        let json = serde_json::to_string(&hash).unwrap();
        let decoded: H256 = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, hash);
    }

    #[test]
    fn h256_rejects_wrong_length() {
        // 4 bytes of payload, valid base58
        let result: Result<H256, _> = serde_json::from_str("\"2VfUX\"");
        assert!(result.is_err());
    }

    #[test]
    fn string_u64_survives_values_beyond_f64_precision() {
        #[derive(serde::Serialize, serde::Deserialize, Debug, PartialEq, Eq)]
        struct Wrapper {
            #[serde(with = "string_u64")]
            size: u64,
        }

        let wrapper = Wrapper {
            size: u64::MAX - 1,
        };
        let json = serde_json::to_string(&wrapper).unwrap();
        assert_eq!(json, "{\"size\":\"18446744073709551614\"}");
        let decoded: Wrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, wrapper);
    }
}
