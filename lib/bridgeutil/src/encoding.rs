//! `serde(with = "...")` helpers for byte arrays that should appear as base64
//! strings on the wire (keys, tokens) instead of JSON arrays of numbers.

pub mod base64 {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&::base64::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = <&str>::deserialize(deserializer)?;
        ::base64::decode(s).map_err(de::Error::custom)
    }

    /// Decodes a base64 string directly, for call sites outside serde's `with` machinery.
    pub fn decode_str(s: &str) -> Result<Vec<u8>, ::base64::DecodeError> {
        ::base64::decode(s)
    }

    /// Deserializes into a fixed-size array, for keys and other constant-width fields.
    pub fn deserialize_fixed<'de, D, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error>
    where
        D: Deserializer<'de>,
    {
        let decoded = deserialize(deserializer)?;
        if decoded.len() != N {
            return Err(de::Error::custom(format!(
                "expected {} bytes, got {}",
                N,
                decoded.len()
            )));
        }

        let mut out = [0u8; N];
        out.copy_from_slice(&decoded);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use serde_derive::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Wrapper {
        #[serde(with = "crate::encoding::base64")]
        data: Vec<u8>,
    }

    #[test]
    fn round_trips_through_json() {
        let value = Wrapper { data: vec![1, 2, 3, 4] };
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, "{\"data\":\"AQIDBA==\"}");
        let back: Wrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(value, back);
    }
}
