use crate::error::Result;
use crate::hints::{PathHint, SumHint};
use crate::keys::{PublicKey, Signature};
use crate::program::{u64_to_atom_bytes, Program};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub parent_coin_info: [u8; 32],
    pub puzzle_hash: [u8; 32],
    pub amount: u64,
}

impl Coin {
    pub fn new(parent_coin_info: [u8; 32], puzzle_hash: [u8; 32], amount: u64) -> Self {
        Self {
            parent_coin_info,
            puzzle_hash,
            amount,
        }
    }

    /// The on-chain coin id: a hash over parentage, puzzle commitment and
    /// amount. `AGG_SIG_ME` messages are suffixed with this id, binding a
    /// signature to the one coin being spent.
    pub fn name(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.parent_coin_info);
        hasher.update(self.puzzle_hash);
        hasher.update(u64_to_atom_bytes(self.amount));
        hasher.finalize().into()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinSpend {
    pub coin: Coin,
    pub puzzle_reveal: Program,
    pub solution: Program,
}

impl CoinSpend {
    pub fn new(coin: Coin, puzzle_reveal: Program, solution: Program) -> Self {
        Self {
            coin,
            puzzle_reveal,
            solution,
        }
    }
}

/// Everything a cold signing device needs: the spends themselves, the hints
/// describing how their aggregate keys decompose, and the network suffix that
/// pins `AGG_SIG_ME` messages to one chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedSpend {
    pub coin_spends: Vec<CoinSpend>,
    pub sum_hints: Vec<SumHint>,
    pub path_hints: Vec<PathHint>,
    pub agg_sig_me_network_suffix: Vec<u8>,
}

impl UnsignedSpend {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(blob: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(blob)?)
    }
}

/// One partial signature plus the context needed to audit and merge it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureInfo {
    pub signature: Signature,
    pub partial_public_key: PublicKey,
    pub final_public_key: PublicKey,
    pub message: Vec<u8>,
}

impl SignatureInfo {
    pub fn new(
        signature: Signature,
        partial_public_key: PublicKey,
        final_public_key: PublicKey,
        message: Vec<u8>,
    ) -> Self {
        Self {
            signature,
            partial_public_key,
            final_public_key,
            message,
        }
    }
}

/// The finished product: coin spends plus the one aggregate signature that
/// covers every signing obligation they impose.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendBundle {
    pub coin_spends: Vec<CoinSpend>,
    pub aggregated_signature: Signature,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::SecretExponent;

    fn coin(amount: u64) -> Coin {
        Coin::new([1u8; 32], [2u8; 32], amount)
    }

    #[test]
    fn coin_name_depends_on_every_field() {
        let base = coin(1000);
        assert_eq!(base.name(), coin(1000).name());
        assert_ne!(base.name(), coin(1001).name());
        assert_ne!(base.name(), Coin::new([3u8; 32], [2u8; 32], 1000).name());
        assert_ne!(base.name(), Coin::new([1u8; 32], [4u8; 32], 1000).name());
    }

    #[test]
    fn unsigned_spend_round_trips() {
        let sk = SecretExponent::from_bytes({
            let mut b = [0u8; 32];
            b[31] = 11;
            b
        })
        .unwrap();
        let spend = UnsignedSpend {
            coin_spends: vec![CoinSpend::new(
                coin(123),
                Program::atom(vec![1]),
                Program::nil(),
            )],
            sum_hints: vec![SumHint::new(vec![sk.public_key()], sk)],
            path_hints: vec![PathHint::new(sk.public_key(), vec![0, 5])],
            agg_sig_me_network_suffix: vec![0xcc; 32],
        };
        let back = UnsignedSpend::from_bytes(&spend.to_bytes().unwrap()).unwrap();
        assert_eq!(back, spend);
    }

    #[test]
    fn signature_info_round_trips() {
        let sk = SecretExponent::from_bytes({
            let mut b = [0u8; 32];
            b[31] = 13;
            b
        })
        .unwrap();
        let pk = sk.public_key();
        let info = SignatureInfo::new(sk.sign(b"m", &pk), pk, pk, b"m".to_vec());
        let back: SignatureInfo =
            bincode::deserialize(&bincode::serialize(&info).unwrap()).unwrap();
        assert_eq!(back, info);
    }
}
