//! Packed floating-point fee representation: 5-bit base-10 exponent and
//! 35-bit mantissa, serialized as 5 big-endian bytes. Packing rounds half to
//! even; a value whose mantissa still overflows at the maximum exponent is an
//! error rather than a silent truncation.

use crate::error::CodecError;
use crate::types::PACKED_FEE_BYTES;

const MANTISSA_BITS: u32 = 35;
const MAX_MANTISSA: u128 = (1u128 << MANTISSA_BITS) - 1;
const MAX_EXPONENT: u32 = 31;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PackedFee {
    pub exponent: u32,
    pub mantissa: u128,
}

impl PackedFee {
    pub fn to_bytes(self) -> [u8; PACKED_FEE_BYTES] {
        let raw: u64 = ((self.exponent as u64) << MANTISSA_BITS) | self.mantissa as u64;
        let be = raw.to_be_bytes();
        let mut out = [0u8; PACKED_FEE_BYTES];
        out.copy_from_slice(&be[3..8]);
        out
    }

    pub fn from_bytes(bytes: [u8; PACKED_FEE_BYTES]) -> Self {
        let mut raw = 0u64;
        for b in bytes {
            raw = (raw << 8) | b as u64;
        }
        PackedFee {
            exponent: (raw >> MANTISSA_BITS) as u32,
            mantissa: (raw & MAX_MANTISSA as u64) as u128,
        }
    }

    pub fn value(self) -> Result<u128, CodecError> {
        let scale = 10u128
            .checked_pow(self.exponent)
            .ok_or(CodecError::FeeDecodeOverflow)?;
        self.mantissa
            .checked_mul(scale)
            .ok_or(CodecError::FeeDecodeOverflow)
    }
}

/// Pack an amount, dividing by ten (round half to even) until the mantissa
/// fits. The representation is exact for amounts up to 2^35.
pub fn pack_fee(amount: u128) -> Result<PackedFee, CodecError> {
    let mut mantissa = amount;
    let mut exponent = 0u32;
    while mantissa > MAX_MANTISSA {
        if exponent == MAX_EXPONENT {
            return Err(CodecError::FeeOverflow);
        }
        let q = mantissa / 10;
        let r = mantissa % 10;
        mantissa = match r {
            0..=4 => q,
            6..=9 => q + 1,
            _ => q + (q & 1), // half to even
        };
        exponent += 1;
    }
    Ok(PackedFee { exponent, mantissa })
}

/// Pack then re-expand; the canonical representative of `amount` under the
/// packed encoding. Exact inputs come back unchanged.
pub fn normalize_fee(amount: u128) -> Result<u128, CodecError> {
    pack_fee(amount)?.value()
}
