//! Groth16 proof formatting. The prover emits `A[2]`, `B[2][2]`, `C[2]` as
//! decimal (or 0x-hex) field elements; the sender flattens them row-major
//! into the `uint256[]` the settlement contract expects: 8 words per block.

use crate::WitnessError;
use primitive_types::U256;
use serde::{Deserialize, Serialize};

pub const PROOF_WORDS_PER_BLOCK: usize = 8;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedProof {
    pub a: [String; 2],
    pub b: [[String; 2]; 2],
    pub c: [String; 2],
    pub block_number: u64,
}

fn parse_field(s: &str) -> Result<U256, WitnessError> {
    let parsed = if let Some(h) = s.strip_prefix("0x") {
        U256::from_str_radix(h, 16).map_err(|_| ())
    } else {
        U256::from_dec_str(s).map_err(|_| ())
    };
    parsed.map_err(|_| WitnessError::MalformedDetails(format!("bad proof field element: {s}")))
}

impl FormattedProof {
    /// Unfold into 8 big-endian 32-byte words:
    /// `A0 A1 B00 B01 B10 B11 C0 C1`.
    pub fn unfold(&self) -> Result<Vec<[u8; 32]>, WitnessError> {
        let ordered = [
            &self.a[0], &self.a[1], &self.b[0][0], &self.b[0][1], &self.b[1][0], &self.b[1][1],
            &self.c[0], &self.c[1],
        ];
        let mut out = Vec::with_capacity(PROOF_WORDS_PER_BLOCK);
        for s in ordered {
            let mut word = [0u8; 32];
            parse_field(s)?.to_big_endian(&mut word);
            out.push(word);
        }
        Ok(out)
    }
}

/// Flatten one proof per block into the on-chain `proofs` array, asserting
/// each proof is bound to its block number.
pub fn pack_proofs(
    proofs: &[FormattedProof],
    block_heights: &[u64],
) -> Result<Vec<[u8; 32]>, WitnessError> {
    let mut out = Vec::with_capacity(proofs.len() * PROOF_WORDS_PER_BLOCK);
    for (proof, height) in proofs.iter().zip(block_heights.iter()) {
        if proof.block_number != *height {
            return Err(WitnessError::ProofBlockMismatch {
                proof: proof.block_number,
                block: *height,
            });
        }
        out.extend(proof.unfold()?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proof(n: u64) -> FormattedProof {
        FormattedProof {
            a: ["1".into(), "2".into()],
            b: [["3".into(), "4".into()], ["5".into(), "6".into()]],
            c: ["7".into(), "0x08".into()],
            block_number: n,
        }
    }

    #[test]
    fn unfold_is_row_major() {
        let words = proof(1).unfold().unwrap();
        assert_eq!(words.len(), 8);
        for (i, w) in words.iter().enumerate() {
            assert_eq!(w[31], (i + 1) as u8);
        }
    }

    #[test]
    fn pack_checks_block_binding() {
        let packed = pack_proofs(&[proof(1), proof(2)], &[1, 2]).unwrap();
        assert_eq!(packed.len(), 16);
        let err = pack_proofs(&[proof(1), proof(3)], &[1, 2]).unwrap_err();
        assert_eq!(err, WitnessError::ProofBlockMismatch { proof: 3, block: 2 });
    }

    #[test]
    fn bad_field_element_rejected() {
        let mut p = proof(1);
        p.a[0] = "not-a-number".into();
        assert!(p.unfold().is_err());
    }

    #[test]
    fn json_shape_matches_prover_output() {
        let json = r#"{"a":["1","2"],"b":[["3","4"],["5","6"]],"c":["7","8"],"block_number":4}"#;
        let p: FormattedProof = serde_json::from_str(json).unwrap();
        assert_eq!(p.block_number, 4);
    }
}
