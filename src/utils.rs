use crate::error::{Error, Result};
use blst::{blst_hash_to_g2, blst_p2, blst_p2_compress};
use blsttc::ff::{Field, PrimeField}; // for Fr trait
use blsttc::group::{CurveAffine, CurveProjective, EncodedPoint};
use blsttc::pairing::bls12_381::{Fr, FrRepr, G1Affine, G2Affine, G1, G2};
use num_bigint::BigUint;
use std::borrow::Borrow;

/// Domain separation tag of the BLS "message augmentation" scheme. The
/// augmentation (here: the final aggregate public key) is prepended to the
/// message before hashing to the curve, which is what binds each partial
/// signature to the aggregate key it contributes to.
pub(crate) const AUG_SCHEME_DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_AUG_";

/// Order of the BLS12-381 scalar field, big-endian hex.
const FR_ORDER_HEX: &[u8] = b"73eda753299d7d483339d80809a1d80553bda402fffe5bfeffffffff00000001";

// blst hash-to-curve, parameterized over the augmentation so the same
// routine serves both the signing side and tests that poke at the hash.
pub(crate) fn hash_g2_aug(aug: &[u8], msg: &[u8]) -> G2 {
    let mut msg_hash: blst_p2 = Default::default();
    unsafe {
        blst_hash_to_g2(
            &mut msg_hash,
            msg.as_ptr(),
            msg.len(),
            AUG_SCHEME_DST.as_ptr(),
            AUG_SCHEME_DST.len(),
            aug.as_ptr(),
            aug.len(),
        )
    };
    let mut msg_g2_bytes = [0u8; 96];
    unsafe { blst_p2_compress(&mut msg_g2_bytes[0], &msg_hash) }
    be_bytes_to_g2(msg_g2_bytes).expect("blst produces a valid compressed point")
}

// see blsttc util.rs
pub(crate) fn fr_from_be_bytes(bytes: [u8; 32]) -> Result<Fr> {
    let mut le_bytes = bytes;
    le_bytes.reverse();
    let mut fr_u64s = [0u64; 4];
    for i in 0..4 {
        let mut next_u64_bytes = [0u8; 8];
        next_u64_bytes.copy_from_slice(&le_bytes[i * 8..(i + 1) * 8]);
        fr_u64s[i] = u64::from_le_bytes(next_u64_bytes);
    }
    Fr::from_repr(FrRepr(fr_u64s)).map_err(|_| Error::InvalidScalar)
}

pub(crate) fn fr_to_be_bytes(fr: Fr) -> [u8; 32] {
    let repr = fr.into_repr();
    let mut bytes = [0u8; 32];
    for (i, limb) in repr.0.iter().enumerate() {
        let le = limb.to_le_bytes();
        bytes[i * 8..(i + 1) * 8].copy_from_slice(&le);
    }
    bytes.reverse();
    bytes
}

/// Interpret a 32-byte hash as a big-endian integer and reduce it modulo the
/// scalar field order. Used for unhardened child-key derivation.
pub(crate) fn fr_from_hash(hash: &[u8; 32]) -> Fr {
    let order = BigUint::parse_bytes(FR_ORDER_HEX, 16).expect("order constant parses");
    let reduced = BigUint::from_bytes_be(hash) % order;
    let reduced_bytes = reduced.to_bytes_be();
    let mut be = [0u8; 32];
    be[32 - reduced_bytes.len()..].copy_from_slice(&reduced_bytes);
    // canonical after reduction
    fr_from_be_bytes(be).expect("reduced scalar is canonical")
}

// see blsttc PublicKey from_bytes
pub(crate) fn be_bytes_to_g1(bytes: [u8; 48]) -> Result<G1> {
    let mut compressed: <G1Affine as CurveAffine>::Compressed = EncodedPoint::empty();
    compressed.as_mut().copy_from_slice(bytes.borrow());
    let affine = compressed.into_affine().map_err(|_| Error::InvalidPoint)?;
    Ok(affine.into_projective())
}

// see blsttc PublicKey to_bytes
pub(crate) fn g1_to_be_bytes(g1: G1) -> [u8; 48] {
    let mut bytes = [0u8; 48];
    bytes.copy_from_slice(g1.into_affine().into_compressed().as_ref());
    bytes
}

// see blsttc Signature from_bytes
pub(crate) fn be_bytes_to_g2(bytes: [u8; 96]) -> Result<G2> {
    let mut compressed: <G2Affine as CurveAffine>::Compressed = EncodedPoint::empty();
    compressed.as_mut().copy_from_slice(bytes.borrow());
    let affine = compressed.into_affine().map_err(|_| Error::InvalidPoint)?;
    Ok(affine.into_projective())
}

// see blsttc Signature to_bytes
pub(crate) fn g2_to_be_bytes(g2: G2) -> [u8; 96] {
    let mut bytes = [0u8; 96];
    bytes.copy_from_slice(g2.into_affine().into_compressed().as_ref());
    bytes
}

// sig = hashed_message_as_g2 * sk
pub(crate) fn sign_g2(g2: G2, fr: Fr) -> G2 {
    g2.into_affine().mul(fr)
}

// pk = generator * sk
pub(crate) fn g1_for_fr(fr: Fr) -> G1 {
    G1Affine::one().mul(fr)
}

pub(crate) fn fr_zero() -> Fr {
    Fr::zero()
}

pub(crate) fn fr_add(mut a: Fr, b: Fr) -> Fr {
    a.add_assign(&b);
    a
}

pub(crate) fn g1_add(mut a: G1, b: G1) -> G1 {
    a.add_assign(&b);
    a
}

pub(crate) fn g2_add(mut a: G2, b: G2) -> G2 {
    a.add_assign(&b);
    a
}
