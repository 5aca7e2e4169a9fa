use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use crate::common::{Word, address::Address, hash::keccak256};

const SECP256K1_N: Word = Word::from_limbs([
    0xbfd25e8cd0364141,
    0xbaaedce6af48a03b,
    0xfffffffffffffffe,
    0xffffffffffffffff,
]);

pub fn is_precompile(address: &Address) -> bool {
    let bytes = address.0;
    bytes[0..19] == [0u8; 19] && (1..=4).contains(&bytes[19])
}

/// Output of a precompiled contract. Malformed input yields empty output, never a fault.
pub fn execute(address: &Address, input: &[u8]) -> Vec<u8> {
    match address.0[19] {
        1 => ecrecover(input).unwrap_or_default(),
        2 => sha256(input),
        3 => ripemd160(input),
        4 => input.to_vec(),
        _ => vec![],
    }
}

pub fn gas_cost(address: &Address, input: &[u8]) -> u64 {
    let words = input.len().div_ceil(32) as u64;
    match address.0[19] {
        1 => 3000,
        2 => 60 + 12 * words,
        3 => 600 + 120 * words,
        4 => 15 + 3 * words,
        _ => 0,
    }
}

// 0x01
fn ecrecover(input: &[u8]) -> Option<Vec<u8>> {
    let mut padded = [0u8; 128];
    let len = input.len().min(128);
    padded[..len].copy_from_slice(&input[..len]);

    let msg_hash = &padded[0..32];
    let v = Word::from_bytes(&padded[32..64]);
    let r = Word::from_bytes(&padded[64..96]);
    let s = Word::from_bytes(&padded[96..128]);

    if v != Word::from(27u8) && v != Word::from(28u8) {
        return None;
    }
    if r.is_zero() || s.is_zero() || r >= SECP256K1_N || s >= SECP256K1_N {
        return None;
    }
    let mut recovery_id = (v.low_u64() - 27) as u8;

    // k256 only accepts low-s signatures: flip to n - s and the recovery parity.
    let half = SECP256K1_N >> 1;
    let s = if s > half {
        recovery_id ^= 1;
        SECP256K1_N - s
    } else {
        s
    };

    let mut signature = [0u8; 64];
    signature[0..32].copy_from_slice(&r.into_bytes());
    signature[32..64].copy_from_slice(&s.into_bytes());
    let signature = Signature::from_slice(&signature).ok()?;
    let recovery_id = RecoveryId::from_byte(recovery_id)?;

    let key = VerifyingKey::recover_from_prehash(msg_hash, &signature, recovery_id).ok()?;
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);

    let mut result = vec![0u8; 32];
    result[12..32].copy_from_slice(&hash[12..32]);
    Some(result)
}

// 0x02
fn sha256(input: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hasher.finalize().to_vec()
}

// 0x03
fn ripemd160(input: &[u8]) -> Vec<u8> {
    let mut hasher = Ripemd160::new();
    hasher.update(input);
    let hash = hasher.finalize();

    let mut result = vec![0u8; 32];
    result[12..32].copy_from_slice(&hash);
    result
}
