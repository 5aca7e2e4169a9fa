//! Serde helpers for `u64` values rendered as JSON-RPC hex quantities.

use serde::{Deserialize, Deserializer, Serializer, de::Error};

#[derive(Deserialize)]
#[serde(untagged)]
enum Repr {
    Hex(String),
    Num(u64),
}

fn parse<E: Error>(repr: Repr) -> Result<u64, E> {
    match repr {
        Repr::Num(num) => Ok(num),
        Repr::Hex(hex) => {
            let digits = hex.trim_start_matches("0x");
            if digits.is_empty() {
                return Ok(0);
            }
            u64::from_str_radix(digits, 16)
                .map_err(|_| E::custom(format!("invalid quantity: '{hex}'")))
        }
    }
}

pub fn serialize<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format!("{value:#x}"))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    parse(Repr::deserialize(deserializer)?)
}

pub mod opt {
    use super::*;

    pub fn serialize<S>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(value) => super::serialize(value, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<Repr>::deserialize(deserializer)?
            .map(parse)
            .transpose()
    }
}
