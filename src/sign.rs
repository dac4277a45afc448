use crate::conditions::{
    conditions_by_opcode, ConditionResolver, Interpreter, AGG_SIG_ME, AGG_SIG_UNSAFE,
};
use crate::error::Result;
use crate::hints::{PathHints, SumHints};
use crate::keys::{PublicKey, SecretExponent, Signature};
use crate::program::Program;
use crate::spend::{CoinSpend, SignatureInfo, SpendBundle, UnsignedSpend};
use std::collections::HashSet;
use tracing::debug;

/// The outcome of one partial-signing run. `unresolved` counts summands this
/// device held no root secret for (or whose hint failed its derivation
/// check): a normal state under split custody, but worth surfacing so a
/// misloaded key file does not masquerade as "nothing needed signing".
#[derive(Clone, Debug, Default)]
pub struct SigningOutput {
    pub signatures: Vec<SignatureInfo>,
    pub resolved: usize,
    pub unresolved: usize,
}

#[derive(Clone, Debug)]
struct SignatureMetadata {
    partial_public_key: PublicKey,
    final_public_key: PublicKey,
    message: Vec<u8>,
}

/// Extract the `(public key, message)` obligations from an evaluated
/// condition list. `AGG_SIG_ME` messages get the per-coin suffix appended;
/// `AGG_SIG_UNSAFE` messages are used verbatim, which is exactly what makes
/// that opcode replayable across coins and networks sharing the raw message.
pub fn verify_pairs_for_conditions(
    conditions: &Program,
    agg_sig_me_message_suffix: &[u8],
) -> Result<Vec<(PublicKey, Vec<u8>)>> {
    let lookup = conditions_by_opcode(conditions)?;
    let mut pairs = Vec::new();

    for condition in lookup.get(&AGG_SIG_ME).map(Vec::as_slice).unwrap_or(&[]) {
        let public_key = PublicKey::from_slice(condition.operand_atom(0)?)?;
        let mut message = condition.operand_atom(1)?.to_vec();
        message.extend_from_slice(agg_sig_me_message_suffix);
        pairs.push((public_key, message));
    }

    for condition in lookup
        .get(&AGG_SIG_UNSAFE)
        .map(Vec::as_slice)
        .unwrap_or(&[])
    {
        let public_key = PublicKey::from_slice(condition.operand_atom(0)?)?;
        let message = condition.operand_atom(1)?.to_vec();
        pairs.push((public_key, message));
    }

    Ok(pairs)
}

/// Obligations for one coin spend, with its conditions evaluated (or pulled
/// from the resolver's memo).
pub fn generate_verify_pairs<I: Interpreter>(
    coin_spend: &CoinSpend,
    agg_sig_me_network_suffix: &[u8],
    resolver: &mut ConditionResolver<I>,
) -> Result<Vec<(PublicKey, Vec<u8>)>> {
    let conditions = resolver.conditions_for_coin_spend(coin_spend)?;
    let suffix = agg_sig_me_message_suffix(coin_spend, agg_sig_me_network_suffix);
    verify_pairs_for_conditions(&conditions, &suffix)
}

fn agg_sig_me_message_suffix(coin_spend: &CoinSpend, network_suffix: &[u8]) -> Vec<u8> {
    let mut suffix = coin_spend.coin.name().to_vec();
    suffix.extend_from_slice(network_suffix);
    suffix
}

/// Produce every partial signature the supplied root secrets can cover.
///
/// Per obligation, the aggregate key is decomposed through the sum hints,
/// each summand is mapped to a root key and path through the path hints, and
/// any summand whose root secret is loaded gets derived, checked, and signed.
/// Summands this device cannot resolve are skipped silently (split custody);
/// integrity failures (cost ceiling, puzzle hash mismatch) abort the whole
/// unsigned spend.
pub fn sign<I: Interpreter>(
    unsigned_spend: &UnsignedSpend,
    secrets: &[SecretExponent],
    resolver: &mut ConditionResolver<I>,
) -> Result<SigningOutput> {
    let sum_hints = SumHints::build(&unsigned_spend.sum_hints);
    let path_hints = PathHints::build(&unsigned_spend.path_hints);
    let mut output = SigningOutput::default();
    let mut seen = HashSet::new();
    for coin_spend in &unsigned_spend.coin_spends {
        sign_for_coin_spend(
            coin_spend,
            secrets,
            &sum_hints,
            &path_hints,
            &unsigned_spend.agg_sig_me_network_suffix,
            resolver,
            &mut seen,
            &mut output,
        )?;
    }
    Ok(output)
}

type SignedTriple = ([u8; 48], [u8; 48], Vec<u8>);

#[allow(clippy::too_many_arguments)]
fn sign_for_coin_spend<I: Interpreter>(
    coin_spend: &CoinSpend,
    secrets: &[SecretExponent],
    sum_hints: &SumHints,
    path_hints: &PathHints,
    agg_sig_me_network_suffix: &[u8],
    resolver: &mut ConditionResolver<I>,
    seen: &mut HashSet<SignedTriple>,
    output: &mut SigningOutput,
) -> Result<()> {
    let conditions = resolver.conditions_for_coin_spend(coin_spend)?;
    let suffix = agg_sig_me_message_suffix(coin_spend, agg_sig_me_network_suffix);
    for metadata in partial_signature_metadata(&conditions, sum_hints, &suffix)? {
        let triple = (
            metadata.final_public_key.to_bytes(),
            metadata.partial_public_key.to_bytes(),
            metadata.message.clone(),
        );
        if seen.contains(&triple) {
            continue;
        }
        let path_hint = path_hints
            .for_public_key(&metadata.partial_public_key)
            .into_inner();
        let secret_key = secret_exponent_for_public_key(
            secrets,
            &path_hint.path,
            &path_hint.root_public_key,
            &metadata.partial_public_key,
        );
        let secret_key = match secret_key {
            Some(secret_key) => secret_key,
            None => {
                debug!(
                    partial_public_key = %metadata.partial_public_key,
                    "no loaded root secret resolves this summand"
                );
                output.unresolved += 1;
                continue;
            }
        };
        seen.insert(triple);
        output.resolved += 1;
        output.signatures.push(SignatureInfo::new(
            secret_key.sign(&metadata.message, &metadata.final_public_key),
            metadata.partial_public_key,
            metadata.final_public_key,
            metadata.message,
        ));
    }
    Ok(())
}

fn partial_signature_metadata(
    conditions: &Program,
    sum_hints: &SumHints,
    agg_sig_me_message_suffix: &[u8],
) -> Result<Vec<SignatureMetadata>> {
    let mut metadata = Vec::new();
    for (final_public_key, message) in
        verify_pairs_for_conditions(conditions, agg_sig_me_message_suffix)?
    {
        let sum_hint = sum_hints.summands_for(&final_public_key).into_inner();
        for partial_public_key in sum_hint.public_keys {
            metadata.push(SignatureMetadata {
                partial_public_key,
                final_public_key,
                message: message.clone(),
            });
        }
    }
    Ok(metadata)
}

/// Find a loaded root secret matching `root_public_key`, derive it along
/// `path` and insist the result lands on `public_key`. A derivation landing
/// elsewhere means a stale or corrupted hint; it is treated as unresolved
/// rather than ever signing under the wrong key.
fn secret_exponent_for_public_key(
    secrets: &[SecretExponent],
    path: &[u32],
    root_public_key: &PublicKey,
    public_key: &PublicKey,
) -> Option<SecretExponent> {
    for secret in secrets {
        if secret.public_key() == *root_public_key {
            let derived = secret.child_for_path(path);
            if derived.public_key() == *public_key {
                return Some(derived);
            }
        }
    }
    None
}

/// The synthetic-offset pass: one signature per obligation, made with the
/// (publicly derivable) offset scalar embedded in the sum hint. Needs no
/// custody secrets, so it is run once by whoever assembles the final bundle.
pub fn generate_synthetic_offset_signatures<I: Interpreter>(
    unsigned_spend: &UnsignedSpend,
    resolver: &mut ConditionResolver<I>,
) -> Result<Vec<SignatureInfo>> {
    let sum_hints = SumHints::build(&unsigned_spend.sum_hints);
    let mut sig_infos = Vec::new();
    let mut seen: HashSet<SignedTriple> = HashSet::new();
    for coin_spend in &unsigned_spend.coin_spends {
        for (final_public_key, message) in generate_verify_pairs(
            coin_spend,
            &unsigned_spend.agg_sig_me_network_suffix,
            resolver,
        )? {
            let sum_hint = sum_hints.offset_for(&final_public_key).into_inner();
            let secret_key = sum_hint.synthetic_offset;
            let partial_public_key = secret_key.public_key();
            let triple = (
                final_public_key.to_bytes(),
                partial_public_key.to_bytes(),
                message.clone(),
            );
            if !seen.insert(triple) {
                continue;
            }
            sig_infos.push(SignatureInfo::new(
                secret_key.sign(&message, &final_public_key),
                partial_public_key,
                final_public_key,
                message,
            ));
        }
    }
    Ok(sig_infos)
}

/// Group-sum any number of signatures; order never matters.
pub fn aggregate_signatures<'a>(
    signatures: impl IntoIterator<Item = &'a Signature>,
) -> Signature {
    signatures.into_iter().sum()
}

/// Merge step: combine the partial signatures collected from every signing
/// device with the synthetic-offset pass and produce the final bundle.
pub fn create_spend_bundle<I: Interpreter>(
    unsigned_spend: &UnsignedSpend,
    signatures: &[Signature],
    resolver: &mut ConditionResolver<I>,
) -> Result<SpendBundle> {
    let extra = generate_synthetic_offset_signatures(unsigned_spend, resolver)?;
    let aggregated_signature =
        aggregate_signatures(signatures.iter().chain(extra.iter().map(|info| &info.signature)));
    Ok(SpendBundle {
        coin_spends: unsigned_spend.coin_spends.clone(),
        aggregated_signature,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::QuotedPrograms;
    use crate::hints::{PathHint, SumHint};
    use crate::spend::Coin;

    fn secret(byte: u8) -> SecretExponent {
        let mut bytes = [0u8; 32];
        bytes[31] = byte;
        SecretExponent::from_bytes(bytes).unwrap()
    }

    fn agg_sig_condition(opcode: u8, pk: &PublicKey, msg: &[u8]) -> Program {
        Program::from_list(vec![
            Program::atom(vec![opcode]),
            Program::atom(pk.to_bytes().to_vec()),
            Program::atom(msg.to_vec()),
        ])
    }

    fn spend_with_conditions(conditions: Program) -> CoinSpend {
        let puzzle = Program::pair(Program::atom(vec![1]), conditions);
        let coin = Coin::new([9u8; 32], puzzle.tree_hash(), 1_000_000);
        CoinSpend::new(coin, puzzle, Program::nil())
    }

    fn unsigned_spend_for(
        conditions: Program,
        sum_hints: Vec<SumHint>,
        path_hints: Vec<PathHint>,
    ) -> UnsignedSpend {
        UnsignedSpend {
            coin_spends: vec![spend_with_conditions(conditions)],
            sum_hints,
            path_hints,
            agg_sig_me_network_suffix: vec![0xcc; 32],
        }
    }

    #[test]
    fn me_and_unsafe_differ_by_exactly_the_suffix() {
        let pk = secret(1).public_key();
        let conditions = Program::from_list(vec![
            agg_sig_condition(AGG_SIG_ME, &pk, b"same raw message"),
            agg_sig_condition(AGG_SIG_UNSAFE, &pk, b"same raw message"),
        ]);
        let suffix = b"coin-name-plus-network".to_vec();
        let pairs = verify_pairs_for_conditions(&conditions, &suffix).unwrap();
        assert_eq!(pairs.len(), 2);
        let me_message = &pairs[0].1;
        let unsafe_message = &pairs[1].1;
        assert_eq!(unsafe_message.as_slice(), b"same raw message");
        assert_eq!(
            me_message.as_slice(),
            [b"same raw message".as_ref(), &suffix].concat().as_slice()
        );
    }

    #[test]
    fn unknown_opcodes_produce_no_obligations() {
        let conditions = Program::from_list(vec![Program::from_list(vec![
            Program::atom(vec![crate::conditions::CREATE_COIN]),
            Program::atom(vec![0xaa; 32]),
            Program::atom(crate::program::u64_to_atom_bytes(500)),
        ])]);
        let pairs = verify_pairs_for_conditions(&conditions, b"suffix").unwrap();
        assert!(pairs.is_empty());
    }

    #[test]
    fn signs_directly_owned_key_without_hints() {
        let sk = secret(11);
        let pk = sk.public_key();
        let us = unsigned_spend_for(
            Program::from_list(vec![agg_sig_condition(AGG_SIG_ME, &pk, b"msg")]),
            vec![],
            vec![],
        );
        let mut resolver = ConditionResolver::new(QuotedPrograms);
        let output = sign(&us, &[sk], &mut resolver).unwrap();
        assert_eq!(output.signatures.len(), 1);
        assert_eq!(output.resolved, 1);
        assert_eq!(output.unresolved, 0);
        let info = &output.signatures[0];
        assert_eq!(info.partial_public_key, pk);
        assert_eq!(info.final_public_key, pk);
        // resolution correctness: the signature really is by the derived key
        assert_eq!(info.signature, sk.sign(&info.message, &pk));
    }

    #[test]
    fn missing_secret_is_silent_but_counted() {
        let owner = secret(12);
        let stranger = secret(13);
        let pk = owner.public_key();
        let us = unsigned_spend_for(
            Program::from_list(vec![agg_sig_condition(AGG_SIG_ME, &pk, b"msg")]),
            vec![],
            vec![],
        );
        let mut resolver = ConditionResolver::new(QuotedPrograms);
        let output = sign(&us, &[stranger], &mut resolver).unwrap();
        assert!(output.signatures.is_empty());
        assert_eq!(output.resolved, 0);
        assert_eq!(output.unresolved, 1);
    }

    #[test]
    fn stale_path_hint_never_signs_the_wrong_key() {
        let root = secret(14);
        let derived_pk = root.public_key().child_for_path(&[0, 1]);
        // hint claims the wrong path, so derivation cannot land on derived_pk
        let bad_hint = PathHint::new(root.public_key(), vec![2, 3]);
        let us = unsigned_spend_for(
            Program::from_list(vec![agg_sig_condition(AGG_SIG_ME, &derived_pk, b"msg")]),
            vec![],
            vec![bad_hint],
        );
        let mut resolver = ConditionResolver::new(QuotedPrograms);
        let output = sign(&us, &[root], &mut resolver).unwrap();
        assert!(output.signatures.is_empty());
        assert_eq!(output.unresolved, 1);
    }

    #[test]
    fn decomposed_key_yields_one_signature_per_held_summand() {
        let root_a = secret(15);
        let root_b = secret(16);
        let derived_a = root_a.child_for_path(&[0, 1]);
        let derived_b = root_b.child_for_path(&[1, 2]);
        let offset = secret(17);
        let sum_hint = SumHint::new(
            vec![derived_a.public_key(), derived_b.public_key()],
            offset,
        );
        let final_pk = sum_hint.final_public_key();
        let path_hints = vec![
            PathHint::new(root_a.public_key(), vec![0, 1]),
            PathHint::new(root_b.public_key(), vec![1, 2]),
        ];
        let us = unsigned_spend_for(
            Program::from_list(vec![agg_sig_condition(AGG_SIG_ME, &final_pk, b"msg")]),
            vec![sum_hint],
            path_hints,
        );

        // device holding only root A resolves one of two summands
        let mut resolver = ConditionResolver::new(QuotedPrograms);
        let output = sign(&us, &[root_a], &mut resolver).unwrap();
        assert_eq!(output.signatures.len(), 1);
        assert_eq!(output.resolved, 1);
        assert_eq!(output.unresolved, 1);
        assert_eq!(output.signatures[0].partial_public_key, derived_a.public_key());

        // device holding both roots resolves both
        let mut resolver = ConditionResolver::new(QuotedPrograms);
        let output = sign(&us, &[root_a, root_b], &mut resolver).unwrap();
        assert_eq!(output.signatures.len(), 2);
        assert_eq!(output.unresolved, 0);
    }

    #[test]
    fn duplicate_obligations_sign_once() {
        let sk = secret(18);
        let pk = sk.public_key();
        let conditions = Program::from_list(vec![
            agg_sig_condition(AGG_SIG_ME, &pk, b"msg"),
            agg_sig_condition(AGG_SIG_ME, &pk, b"msg"),
        ]);
        let us = unsigned_spend_for(conditions, vec![], vec![]);
        let mut resolver = ConditionResolver::new(QuotedPrograms);
        let output = sign(&us, &[sk], &mut resolver).unwrap();
        assert_eq!(output.signatures.len(), 1);
    }

    #[test]
    fn synthetic_offset_pass_signs_with_the_offset() {
        let owner = secret(19);
        let offset = secret(20);
        let sum_hint = SumHint::new(vec![owner.public_key()], offset);
        let final_pk = sum_hint.final_public_key();
        let us = unsigned_spend_for(
            Program::from_list(vec![agg_sig_condition(AGG_SIG_ME, &final_pk, b"msg")]),
            vec![sum_hint],
            vec![],
        );
        let mut resolver = ConditionResolver::new(QuotedPrograms);
        let infos = generate_synthetic_offset_signatures(&us, &mut resolver).unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].partial_public_key, offset.public_key());
        assert_eq!(infos[0].final_public_key, final_pk);
    }

    #[test]
    fn puzzle_hash_mismatch_aborts_the_whole_spend() {
        let sk = secret(21);
        let pk = sk.public_key();
        let mut us = unsigned_spend_for(
            Program::from_list(vec![agg_sig_condition(AGG_SIG_ME, &pk, b"msg")]),
            vec![],
            vec![],
        );
        us.coin_spends[0].coin.puzzle_hash = [0u8; 32];
        let mut resolver = ConditionResolver::new(QuotedPrograms);
        assert!(sign(&us, &[sk], &mut resolver).is_err());
    }

    #[test]
    fn aggregation_is_order_independent() {
        let sk1 = secret(22);
        let sk2 = secret(23);
        let pk = sk1.public_key() + sk2.public_key();
        let a = sk1.sign(b"m", &pk);
        let b = sk2.sign(b"m", &pk);
        assert_eq!(aggregate_signatures([&a, &b]), aggregate_signatures([&b, &a]));
    }
}
