//! Air-gapped co-signing of BLS spend bundles.
//!
//! A network-connected machine builds an [`UnsignedSpend`]: coin spends plus
//! hints describing how each on-chain aggregate key decomposes into summand
//! keys and a synthetic offset. The blob crosses the air gap as hex-encoded
//! chunk lines, a cold device matches the hints against its root secrets and
//! answers with partial signatures, and the partials are merged (together
//! with the synthetic-offset pass) into the one aggregate signature the
//! spend bundle needs.

mod chunks;
mod conditions;
mod error;
mod hints;
mod keys;
mod program;
mod sign;
mod spend;
mod summary;
mod transport;
mod utils;

pub use crate::chunks::{chunks_for_blob, optimal_chunk_size, ChunkAssembler, MAX_CHUNK_COUNT};
pub use crate::conditions::{
    conditions_by_opcode, Condition, ConditionResolver, Interpreter, QuotedPrograms, AGG_SIG_ME,
    AGG_SIG_UNSAFE, CREATE_COIN, MAX_COST,
};
pub use crate::error::{Error, Result};
pub use crate::hints::{Hinted, PathHint, PathHints, SumHint, SumHints};
pub use crate::keys::{PublicKey, SecretExponent, Signature};
pub use crate::program::{u64_from_atom_bytes, u64_to_atom_bytes, Program};
pub use crate::sign::{
    aggregate_signatures, create_spend_bundle, generate_synthetic_offset_signatures,
    generate_verify_pairs, sign, verify_pairs_for_conditions, SigningOutput,
};
pub use crate::spend::{Coin, CoinSpend, SignatureInfo, SpendBundle, UnsignedSpend};
pub use crate::summary::{
    parse_secret_exponents, process_signing_requests, summarize_unsigned_spend, CoinSummary,
    SigningOptions, SpendSummary,
};
pub use crate::transport::{
    decode_blob_line, decode_signature, encode_blob, encode_signature, unsigned_spend_from_blob,
    SpendReader,
};
