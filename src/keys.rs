use crate::error::{Error, Result};
use crate::utils::*;
use blst::BLST_ERROR;
use blsttc::pairing::bls12_381::{Fr, G1, G2};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::convert::TryInto;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::Sum;
use std::ops::Add;

/// A secret exponent: a scalar in the BLS12-381 scalar field.
///
/// Signing follows the message-augmentation scheme: the signature is bound to
/// the *final* aggregate public key of the condition being satisfied, so
/// partial signatures from different summand keys cannot be replayed under a
/// different aggregate (rogue-key substitution).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SecretExponent {
    fr: Fr,
}

impl SecretExponent {
    pub fn zero() -> Self {
        Self { fr: fr_zero() }
    }

    pub fn random() -> Self {
        let sk = blsttc::SecretKey::random();
        let fr = fr_from_be_bytes(sk.to_bytes()).expect("secret key bytes are canonical");
        Self { fr }
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self> {
        Ok(Self {
            fr: fr_from_be_bytes(bytes)?,
        })
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        fr_to_be_bytes(self.fr)
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey { g1: g1_for_fr(self.fr) }
    }

    /// Unhardened child derivation: the matching public-key derivation on
    /// [`PublicKey::child`] lands on the same key.
    pub fn child(&self, index: u32) -> Self {
        let tweak = derivation_tweak(&self.public_key(), index);
        Self {
            fr: fr_add(self.fr, tweak),
        }
    }

    pub fn child_for_path(&self, path: &[u32]) -> Self {
        path.iter().fold(*self, |sk, index| sk.child(*index))
    }

    /// Sign `message`, domain-separated by the final aggregate public key the
    /// signature will contribute to.
    pub fn sign(&self, message: &[u8], final_public_key: &PublicKey) -> Signature {
        let message_g2 = hash_g2_aug(&final_public_key.to_bytes(), message);
        Signature {
            g2: sign_g2(message_g2, self.fr),
        }
    }
}

impl Add for SecretExponent {
    type Output = SecretExponent;

    fn add(self, other: Self) -> Self {
        Self {
            fr: fr_add(self.fr, other.fr),
        }
    }
}

/// A public key: a point in G1.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicKey {
    g1: G1,
}

impl PublicKey {
    pub fn zero() -> Self {
        use blsttc::group::CurveProjective;
        Self { g1: G1::zero() }
    }

    pub fn from_bytes(bytes: [u8; 48]) -> Result<Self> {
        Ok(Self {
            g1: be_bytes_to_g1(bytes)?,
        })
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 48] = bytes.try_into().map_err(Error::from)?;
        Self::from_bytes(arr)
    }

    pub fn to_bytes(&self) -> [u8; 48] {
        g1_to_be_bytes(self.g1)
    }

    pub fn child(&self, index: u32) -> Self {
        let tweak = derivation_tweak(self, index);
        Self {
            g1: g1_add(self.g1, g1_for_fr(tweak)),
        }
    }

    pub fn child_for_path(&self, path: &[u32]) -> Self {
        path.iter().fold(*self, |pk, index| pk.child(*index))
    }
}

impl Add for PublicKey {
    type Output = PublicKey;

    fn add(self, other: Self) -> Self {
        Self {
            g1: g1_add(self.g1, other.g1),
        }
    }
}

impl Sum for PublicKey {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), Add::add)
    }
}

impl<'a> Sum<&'a PublicKey> for PublicKey {
    fn sum<I: Iterator<Item = &'a PublicKey>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl Hash for PublicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write(&self.to_bytes());
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.to_bytes()))
    }
}

/// A BLS signature: a point in G2.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signature {
    g2: G2,
}

impl Signature {
    pub fn zero() -> Self {
        use blsttc::group::CurveProjective;
        Self { g2: G2::zero() }
    }

    pub fn from_bytes(bytes: [u8; 96]) -> Result<Self> {
        Ok(Self {
            g2: be_bytes_to_g2(bytes)?,
        })
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 96] = bytes.try_into().map_err(Error::from)?;
        Self::from_bytes(arr)
    }

    pub fn to_bytes(&self) -> [u8; 96] {
        g2_to_be_bytes(self.g2)
    }

    /// Standard multi-message BLS aggregate verification: this signature must
    /// be the sum of one valid signature per `(public_key, message)` pair.
    pub fn verify(&self, pairs: &[(PublicKey, &[u8])]) -> bool {
        let sig = match blst::min_pk::Signature::uncompress(&self.to_bytes()) {
            Ok(sig) => sig,
            Err(_) => return false,
        };
        let mut pks = Vec::with_capacity(pairs.len());
        let mut augmented_msgs = Vec::with_capacity(pairs.len());
        for (public_key, message) in pairs {
            let pk_bytes = public_key.to_bytes();
            match blst::min_pk::PublicKey::uncompress(&pk_bytes) {
                Ok(pk) => pks.push(pk),
                Err(_) => return false,
            }
            // aug scheme: the key the message is verified under is prepended
            // to the message itself before hashing to the curve
            let mut msg = pk_bytes.to_vec();
            msg.extend_from_slice(message);
            augmented_msgs.push(msg);
        }
        let msg_refs: Vec<&[u8]> = augmented_msgs.iter().map(|m| m.as_slice()).collect();
        let pk_refs: Vec<&blst::min_pk::PublicKey> = pks.iter().collect();
        sig.aggregate_verify(true, &msg_refs, AUG_SCHEME_DST, &pk_refs, true)
            == BLST_ERROR::BLST_SUCCESS
    }
}

impl Add for Signature {
    type Output = Signature;

    fn add(self, other: Self) -> Self {
        Self {
            g2: g2_add(self.g2, other.g2),
        }
    }
}

impl Sum for Signature {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), Add::add)
    }
}

impl<'a> Sum<&'a Signature> for Signature {
    fn sum<I: Iterator<Item = &'a Signature>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

// child_sk = sk + H(parent_pk || index), reduced mod the field order
fn derivation_tweak(parent: &PublicKey, index: u32) -> Fr {
    let mut hasher = Sha256::new();
    hasher.update(parent.to_bytes());
    hasher.update(index.to_be_bytes());
    let digest: [u8; 32] = hasher.finalize().into();
    fr_from_hash(&digest)
}

// The wire form of every crypto type is its canonical compressed encoding;
// each type registers exactly one codec here instead of relying on any
// structure-derived layout.

impl Serialize for SecretExponent {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.to_bytes())
    }
}

impl<'de> Deserialize<'de> for SecretExponent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let bytes = fixed_bytes::<D, 32>(deserializer)?;
        SecretExponent::from_bytes(bytes).map_err(de::Error::custom)
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.to_bytes())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let bytes = fixed_bytes::<D, 48>(deserializer)?;
        PublicKey::from_bytes(bytes).map_err(de::Error::custom)
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.to_bytes())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let bytes = fixed_bytes::<D, 96>(deserializer)?;
        Signature::from_bytes(bytes).map_err(de::Error::custom)
    }
}

fn fixed_bytes<'de, D: Deserializer<'de>, const N: usize>(
    deserializer: D,
) -> std::result::Result<[u8; N], D::Error> {
    struct FixedBytesVisitor<const N: usize>;

    impl<'de, const N: usize> Visitor<'de> for FixedBytesVisitor<N> {
        type Value = [u8; N];

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "a byte string of length {}", N)
        }

        fn visit_bytes<E: de::Error>(self, v: &[u8]) -> std::result::Result<Self::Value, E> {
            v.try_into()
                .map_err(|_| E::invalid_length(v.len(), &self))
        }

        fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> std::result::Result<Self::Value, E> {
            self.visit_bytes(&v)
        }

        fn visit_seq<A: de::SeqAccess<'de>>(
            self,
            mut seq: A,
        ) -> std::result::Result<Self::Value, A::Error> {
            let mut bytes = [0u8; N];
            for (i, byte) in bytes.iter_mut().enumerate() {
                *byte = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(i, &self))?;
            }
            Ok(bytes)
        }
    }

    deserializer.deserialize_bytes(FixedBytesVisitor::<N>)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(byte: u8) -> SecretExponent {
        let mut bytes = [0u8; 32];
        bytes[31] = byte;
        bytes[30] = byte.wrapping_mul(3);
        SecretExponent::from_bytes(bytes).unwrap()
    }

    #[test]
    fn derivation_commutes_with_public_projection() {
        let sk = secret(5);
        let path = [0u32, 1, 12, 9999];
        let derived_sk = sk.child_for_path(&path);
        let derived_pk = sk.public_key().child_for_path(&path);
        assert_eq!(derived_sk.public_key(), derived_pk);
    }

    #[test]
    fn derivation_order_matters() {
        let pk = secret(5).public_key();
        assert_ne!(pk.child_for_path(&[0, 1]), pk.child_for_path(&[1, 0]));
    }

    #[test]
    fn empty_path_is_identity() {
        let sk = secret(9);
        assert_eq!(sk.child_for_path(&[]), sk);
    }

    #[test]
    fn sign_and_verify_single_pair() {
        let sk = secret(7);
        let pk = sk.public_key();
        let sig = sk.sign(b"hello there", &pk);
        assert!(sig.verify(&[(pk, b"hello there")]));
        assert!(!sig.verify(&[(pk, b"some other message")]));
    }

    #[test]
    fn signature_is_domain_separated() {
        let sk = secret(7);
        let domain_a = secret(8).public_key();
        let domain_b = secret(9).public_key();
        let sig_a = sk.sign(b"message", &domain_a);
        let sig_b = sk.sign(b"message", &domain_b);
        assert_ne!(sig_a, sig_b);
        // a signature under domain A does not verify as if made under B
        assert!(!sig_a.verify(&[(domain_b, b"message")]));
    }

    #[test]
    fn split_key_signatures_aggregate() {
        let sk1 = secret(21);
        let sk2 = secret(22);
        let final_pk = sk1.public_key() + sk2.public_key();
        let message = b"spend approved";
        let aggregate: Signature = [sk1.sign(message, &final_pk), sk2.sign(message, &final_pk)]
            .iter()
            .sum();
        assert!(aggregate.verify(&[(final_pk, message)]));
    }

    #[test]
    fn multi_message_aggregate_verification() {
        let sk1 = secret(31);
        let sk2 = secret(32);
        let pk1 = sk1.public_key();
        let pk2 = sk2.public_key();
        let aggregate = sk1.sign(b"first", &pk1) + sk2.sign(b"second", &pk2);
        assert!(aggregate.verify(&[(pk1, b"first"), (pk2, b"second")]));
        assert!(!aggregate.verify(&[(pk1, b"second"), (pk2, b"first")]));
    }

    #[test]
    fn zero_secret_produces_identity_contributions() {
        let zero = SecretExponent::zero();
        assert_eq!(zero.public_key(), PublicKey::zero());
        let sk = secret(3);
        let pk = sk.public_key();
        let sig = sk.sign(b"msg", &pk) + zero.sign(b"msg", &pk);
        assert!(sig.verify(&[(pk, b"msg")]));
    }

    #[test]
    fn secret_exponent_bytes_round_trip() {
        let sk = secret(77);
        assert_eq!(SecretExponent::from_bytes(sk.to_bytes()).unwrap(), sk);
    }

    #[test]
    fn public_key_rejects_garbage_bytes() {
        assert!(PublicKey::from_bytes([0x11; 48]).is_err());
        assert!(PublicKey::from_slice(&[0u8; 3]).is_err());
    }

    #[test]
    fn serde_round_trips_via_bincode() {
        let sk = secret(42);
        let pk = sk.public_key();
        let sig = sk.sign(b"round trip", &pk);

        let sk2: SecretExponent = bincode::deserialize(&bincode::serialize(&sk).unwrap()).unwrap();
        let pk2: PublicKey = bincode::deserialize(&bincode::serialize(&pk).unwrap()).unwrap();
        let sig2: Signature = bincode::deserialize(&bincode::serialize(&sig).unwrap()).unwrap();
        assert_eq!(sk2, sk);
        assert_eq!(pk2, pk);
        assert_eq!(sig2, sig);
    }

    #[test]
    fn random_secrets_differ() {
        assert_ne!(SecretExponent::random(), SecretExponent::random());
    }

    #[test]
    fn derivation_commutes_for_random_secrets() {
        use rand::Rng;
        for _ in 0..4 {
            let mut bytes: [u8; 32] = rand::thread_rng().gen();
            bytes[0] = 0; // keep the scalar canonical
            let sk = SecretExponent::from_bytes(bytes).unwrap();
            let path = [7u32, 0, 3];
            assert_eq!(
                sk.child_for_path(&path).public_key(),
                sk.public_key().child_for_path(&path)
            );
        }
    }
}
