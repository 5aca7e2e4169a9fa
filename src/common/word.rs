use std::ops::{BitAnd, BitOr, BitXor, Shl, Shr};

use i256::I256;
use primitive_types::{U256, U512};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::common::error::Error;

/// 256-bit unsigned machine word.
#[derive(Default, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Word(U256);

impl Word {
    pub fn zero() -> Self {
        Self(U256::zero())
    }

    pub fn one() -> Self {
        Self(U256::one())
    }

    pub fn max() -> Self {
        Self(U256::max_value())
    }

    /// Little-endian 64-bit limbs, for constants.
    pub const fn from_limbs(limbs: [u64; 4]) -> Self {
        Self(U256(limbs))
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(U256::from_big_endian(bytes))
    }

    pub fn into_bytes(&self) -> [u8; 32] {
        self.0.to_big_endian()
    }

    pub fn from_hex(hex: &str) -> Result<Self, Error> {
        let hex = hex.trim_start_matches("0x");
        if hex.is_empty() {
            return Ok(Self::zero());
        }
        U256::from_str_radix(hex, 16)
            .map(Self)
            .map_err(|_| Error::InvalidWord(hex.to_string()))
    }

    /// Exactly 64 lowercase hex digits, zero-padded, no prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(self.into_bytes())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn bit(&self, index: usize) -> bool {
        self.0.bit(index)
    }

    /// Byte `index` counted from the most significant end, as BYTE does.
    pub fn byte_be(&self, index: usize) -> u8 {
        if index >= 32 { 0 } else { self.into_bytes()[index] }
    }

    /// Number of bytes needed to represent the value.
    pub fn byte_len(&self) -> usize {
        self.0.bits().div_ceil(8)
    }

    pub fn low_u64(&self) -> u64 {
        self.0.low_u64()
    }

    pub fn to_u64(&self) -> Option<u64> {
        if self.0 > U256::from(u64::MAX) {
            None
        } else {
            Some(self.0.low_u64())
        }
    }

    pub fn to_usize(&self) -> Option<usize> {
        self.to_u64().and_then(|value| usize::try_from(value).ok())
    }

    /// Saturating conversion used for memory offsets: anything that does not fit
    /// is far beyond what gas can pay for anyway.
    pub fn as_usize_saturated(&self) -> usize {
        self.to_usize().unwrap_or(usize::MAX)
    }

    pub fn is_negative(&self) -> bool {
        self.0.bit(255)
    }

    pub fn pow(&self, exp: Self) -> Self {
        let (ret, _) = self.0.overflowing_pow(exp.0);
        Self(ret)
    }

    pub fn saturating_sub(&self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    pub fn overflowing_add(&self, rhs: Self) -> (Self, bool) {
        let (word, flag) = self.0.overflowing_add(rhs.0);
        (Self(word), flag)
    }

    pub fn overflowing_mul(&self, rhs: Self) -> (Self, bool) {
        let (word, flag) = self.0.overflowing_mul(rhs.0);
        (Self(word), flag)
    }

    pub fn overflowing_sub(&self, rhs: Self) -> (Self, bool) {
        let (word, flag) = self.0.overflowing_sub(rhs.0);
        (Self(word), flag)
    }

    pub fn checked_add(&self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn checked_sub(&self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    pub fn checked_mul(&self, rhs: Self) -> Option<Self> {
        self.0.checked_mul(rhs.0).map(Self)
    }

    pub fn add_modulo(&self, that: &Word, modulo: &Word) -> Word {
        if modulo.is_zero() {
            return Word::zero();
        }
        let res = (U512::from(self.0) + U512::from(that.0)) % U512::from(modulo.0);
        Word(U256::from_big_endian(&res.to_big_endian()[32..]))
    }

    pub fn mul_modulo(&self, that: &Word, modulo: &Word) -> Word {
        if modulo.is_zero() {
            return Word::zero();
        }
        let res = self.0.full_mul(that.0) % U512::from(modulo.0);
        Word(U256::from_big_endian(&res.to_big_endian()[32..]))
    }

    fn signed(&self) -> I256 {
        I256::from_be_bytes(self.into_bytes())
    }

    fn from_signed(value: I256) -> Self {
        Self::from_bytes(&value.to_be_bytes())
    }

    pub fn signed_div(&self, rhs: Self) -> Self {
        if rhs.is_zero() {
            return Self::zero();
        }
        let (a, b) = (self.signed(), rhs.signed());
        if a == I256::MIN && b == I256::from(-1) {
            return Self::from_signed(I256::MIN);
        }
        Self::from_signed(a / b)
    }

    pub fn signed_rem(&self, rhs: Self) -> Self {
        if rhs.is_zero() {
            return Self::zero();
        }
        let (a, b) = (self.signed(), rhs.signed());
        if b == I256::from(-1) {
            return Self::zero();
        }
        Self::from_signed(a % b)
    }

    pub fn signed_lt(&self, rhs: &Self) -> bool {
        self.signed() < rhs.signed()
    }

    pub fn signed_gt(&self, rhs: &Self) -> bool {
        self.signed() > rhs.signed()
    }

    /// Arithmetic right shift.
    pub fn sar(&self, shift: Self) -> Self {
        match shift.to_usize() {
            Some(shift) if shift < 256 => Self::from_signed(self.signed() >> shift),
            _ if self.is_negative() => Self::max(),
            _ => Self::zero(),
        }
    }

    /// Extend the sign bit of the `index`-th lowest byte through the word.
    pub fn sign_extend(&self, index: Self) -> Self {
        let Some(index) = index.to_usize().filter(|index| *index < 31) else {
            return *self;
        };
        let bit = index * 8 + 7;
        let mask = (U256::one() << bit) - U256::one();
        if self.0.bit(bit) {
            Self(self.0 | !mask)
        } else {
            Self(self.0 & mask)
        }
    }
}

impl std::fmt::Debug for Word {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl std::fmt::Display for Word {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl std::fmt::LowerHex for Word {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::LowerHex::fmt(&self.0, f)
    }
}

impl From<u8> for Word {
    fn from(value: u8) -> Self {
        Self(U256::from(value))
    }
}

impl From<u32> for Word {
    fn from(value: u32) -> Self {
        Self(U256::from(value))
    }
}

impl From<i32> for Word {
    fn from(value: i32) -> Self {
        Self(U256::from(value))
    }
}

impl From<u64> for Word {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl From<usize> for Word {
    fn from(value: usize) -> Self {
        Self(U256::from(value))
    }
}

impl From<u128> for Word {
    fn from(value: u128) -> Self {
        Self(U256::from(value))
    }
}

impl From<bool> for Word {
    fn from(value: bool) -> Self {
        if value { Self::one() } else { Self::zero() }
    }
}

impl std::ops::Sub<Word> for Word {
    type Output = Word;

    fn sub(self, rhs: Word) -> Self::Output {
        Word(self.0 - rhs.0)
    }
}

impl std::ops::SubAssign<Word> for Word {
    fn sub_assign(&mut self, rhs: Word) {
        self.0 -= rhs.0;
    }
}

impl std::ops::Add<Word> for Word {
    type Output = Word;

    fn add(self, rhs: Word) -> Self::Output {
        Word(self.0 + rhs.0)
    }
}

impl std::ops::AddAssign<Word> for Word {
    fn add_assign(&mut self, rhs: Word) {
        self.0 += rhs.0;
    }
}

impl std::ops::Mul<Word> for Word {
    type Output = Word;

    fn mul(self, rhs: Word) -> Self::Output {
        Word(self.0 * rhs.0)
    }
}

impl std::ops::Div<Word> for Word {
    type Output = Word;

    fn div(self, rhs: Word) -> Self::Output {
        if rhs.is_zero() {
            return Word::zero();
        }
        Word(self.0 / rhs.0)
    }
}

impl std::ops::Rem<Word> for Word {
    type Output = Word;

    fn rem(self, rhs: Word) -> Self::Output {
        if rhs.is_zero() {
            return Word::zero();
        }
        Word(self.0 % rhs.0)
    }
}

impl BitAnd for Word {
    type Output = Word;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self(self.0 & rhs.0)
    }
}

impl BitOr for Word {
    type Output = Word;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl BitXor for Word {
    type Output = Word;

    fn bitxor(self, rhs: Self) -> Self::Output {
        Self(self.0 ^ rhs.0)
    }
}

impl std::ops::Not for Word {
    type Output = Word;

    fn not(self) -> Self::Output {
        Self(!self.0)
    }
}

impl Shl<usize> for Word {
    type Output = Word;

    fn shl(self, rhs: usize) -> Self::Output {
        if rhs >= 256 {
            return Word::zero();
        }
        Self(self.0 << rhs)
    }
}

impl Shr<usize> for Word {
    type Output = Word;

    fn shr(self, rhs: usize) -> Self::Output {
        if rhs >= 256 {
            return Word::zero();
        }
        Self(self.0 >> rhs)
    }
}

impl Serialize for Word {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{:x}", self.0))
    }
}

impl<'de> Deserialize<'de> for Word {
    fn deserialize<D>(deserializer: D) -> Result<Word, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error as _;

        let hex: String = Deserialize::deserialize(deserializer)?;
        Word::from_hex(&hex).map_err(D::Error::custom)
    }
}
