use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub mod account;
pub mod address;
pub mod block;
pub mod error;
pub mod hash;
pub mod quantity;
pub mod tx;
pub mod word;

pub use word::Word;

/// Byte blob rendered as a `0x`-prefixed hex string on the wire.
#[derive(Clone, Default, Eq, PartialEq, Hash)]
pub struct Hex(Vec<u8>);

impl Hex {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn parse(hex: &str) -> Result<Self, error::Error> {
        let hex = hex.trim().trim_start_matches("0x");
        let bin = hex::decode(hex).map_err(|_| error::Error::InvalidHex(hex.to_string()))?;
        Ok(Self(bin))
    }
}

impl From<Vec<u8>> for Hex {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl From<&[u8]> for Hex {
    fn from(value: &[u8]) -> Self {
        Self(value.to_vec())
    }
}

impl<const N: usize> From<[u8; N]> for Hex {
    fn from(value: [u8; N]) -> Self {
        Self(value.to_vec())
    }
}

impl AsRef<[u8]> for Hex {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for Hex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0))
    }
}

impl std::fmt::Display for Hex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0))
    }
}

impl Serialize for Hex {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let hex = format!("0x{}", hex::encode(&self.0));
        serializer.serialize_str(&hex)
    }
}

impl<'de> Deserialize<'de> for Hex {
    fn deserialize<D>(deserializer: D) -> Result<Hex, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;

        let hex: String = Deserialize::deserialize(deserializer)?;
        Hex::parse(&hex).map_err(|_| {
            D::Error::invalid_value(serde::de::Unexpected::Str(&hex), &"Invalid hex string")
        })
    }
}

const fn decode<const N: usize>(s: &str) -> [u8; N] {
    let s = s.as_bytes();
    let mut b = [0u8; N];
    let mut n = s.len();
    let parity = s.len() % 2;

    if s.is_empty() {
        return b;
    }
    let min = if s[0] == b'0' && s.len() > 1 && s[1] == b'x' {
        2
    } else {
        0
    };

    let mut i = N;
    while n > min {
        let c = s[n - 1];
        let c = match c {
            b'0'..=b'9' => c - b'0',
            b'a'..=b'f' => c - b'a' + 10,
            b'A'..=b'F' => c - b'A' + 10,
            _ => panic!("Invalid hex"),
        };

        if n % 2 == parity {
            b[i - 1] = c;
        } else {
            b[i - 1] += c << 4;
            i -= 1;
        }

        n -= 1;
    }
    b
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_pads_from_the_right() {
        assert_eq!(decode::<4>("0x1"), [0, 0, 0, 1]);
        assert_eq!(decode::<4>("abcde"), [0, 0x0a, 0xbc, 0xde]);
        assert_eq!(
            decode::<8>("0x0123456789abcdef"),
            [0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef]
        );
    }

    #[test]
    fn test_hex_serde() {
        let hex: Hex = serde_json::from_str("\"0xdeadbeef\"").unwrap();
        assert_eq!(hex.as_bytes(), &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(serde_json::to_string(&hex).unwrap(), "\"0xdeadbeef\"");
        assert_eq!(serde_json::to_string(&Hex::default()).unwrap(), "\"0x\"");
    }

    #[test]
    fn test_hex_parse_rejects_garbage() {
        assert!(Hex::parse("0xzz").is_err());
        assert!(Hex::parse("0x").unwrap().is_empty());
    }
}
