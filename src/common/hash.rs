pub fn keccak256(input: &[u8]) -> [u8; 32] {
    use tiny_keccak::Hasher;
    let mut sha3 = tiny_keccak::Keccak::v256();
    let mut ret = [0u8; 32];
    sha3.update(input);
    sha3.finalize(&mut ret);
    ret
}

/// keccak256 of the empty byte string, the code hash of accounts without code.
pub fn empty() -> [u8; 32] {
    keccak256(&[])
}

/// Serde helpers for 32-byte hashes: always `0x` followed by 64 hex digits.
pub mod padded {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::common::Word;

    pub fn serialize<S>(value: &Word, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", value.to_hex()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Word, D::Error>
    where
        D: Deserializer<'de>,
    {
        Word::deserialize(deserializer)
    }
}
