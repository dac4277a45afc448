use crate::conditions::{conditions_by_opcode, ConditionResolver, Interpreter, CREATE_COIN};
use crate::error::{Error, Result};
use crate::keys::SecretExponent;
use crate::program::u64_from_atom_bytes;
use crate::sign::{aggregate_signatures, sign};
use crate::spend::UnsignedSpend;
use crate::transport::{encode_signature, SpendReader};
use std::convert::TryInto;
use std::fmt;
use std::io::BufRead;
use tracing::{error, info};

/// One line of the operator review: an amount moving to a puzzle hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoinSummary {
    pub amount: u64,
    pub puzzle_hash: Vec<u8>,
}

/// What an operator reviews before approving a signing run: every coin
/// being spent and every coin the evaluated conditions create.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpendSummary {
    pub spent: Vec<CoinSummary>,
    pub created: Vec<CoinSummary>,
}

impl fmt::Display for SpendSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for coin in &self.spent {
            writeln!(
                f,
                "COIN SPENT: {} mojos at puzzle hash {}",
                coin.amount,
                hex::encode(&coin.puzzle_hash)
            )?;
        }
        for coin in &self.created {
            writeln!(
                f,
                "COIN CREATED: {} mojos to {}",
                coin.amount,
                hex::encode(&coin.puzzle_hash)
            )?;
        }
        Ok(())
    }
}

/// Decode the spends and their `CREATE_COIN` outputs for human review.
pub fn summarize_unsigned_spend<I: Interpreter>(
    unsigned_spend: &UnsignedSpend,
    resolver: &mut ConditionResolver<I>,
) -> Result<SpendSummary> {
    let mut summary = SpendSummary::default();
    for coin_spend in &unsigned_spend.coin_spends {
        summary.spent.push(CoinSummary {
            amount: coin_spend.coin.amount,
            puzzle_hash: coin_spend.coin.puzzle_hash.to_vec(),
        });
        let conditions = resolver.conditions_for_coin_spend(coin_spend)?;
        let lookup = conditions_by_opcode(&conditions)?;
        for condition in lookup.get(&CREATE_COIN).map(Vec::as_slice).unwrap_or(&[]) {
            summary.created.push(CoinSummary {
                amount: u64_from_atom_bytes(condition.operand_atom(1)?)?,
                puzzle_hash: condition.operand_atom(0)?.to_vec(),
            });
        }
    }
    Ok(summary)
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SigningOptions {
    /// Sign without operator approval. Off by default; blind signing with
    /// offline key material must be asked for explicitly.
    pub skip_confirmation: bool,
}

/// The cold device's main loop: read spends off the transport, put each one
/// in front of the operator, sign the approved ones with the loaded root
/// secrets and emit one encoded signature line per spend.
///
/// A spend failing its integrity checks (cost ceiling, puzzle hash) is
/// flagged and excluded; the loop moves on to the next request.
pub fn process_signing_requests<R, I, F>(
    reader: R,
    secrets: &[SecretExponent],
    resolver: &mut ConditionResolver<I>,
    options: SigningOptions,
    mut approve: F,
) -> Result<Vec<String>>
where
    R: BufRead,
    I: Interpreter,
    F: FnMut(&SpendSummary) -> bool,
{
    let mut reader = SpendReader::new(reader);
    let mut signature_lines = Vec::new();
    while let Some(unsigned_spend) = reader.next_spend()? {
        let output = match review_and_sign(&unsigned_spend, secrets, resolver, options, &mut approve)
        {
            Ok(Some(output)) => output,
            Ok(None) => continue, // declined, or nothing this device can sign
            Err(err @ Error::CostExceeded { .. })
            | Err(err @ Error::PuzzleHashMismatch { .. }) => {
                error!(%err, "refusing to sign a spend that failed integrity checks");
                continue;
            }
            Err(err) => return Err(err),
        };
        let signature =
            aggregate_signatures(output.signatures.iter().map(|info| &info.signature));
        signature_lines.push(encode_signature(&signature));
    }
    Ok(signature_lines)
}

fn review_and_sign<I: Interpreter, F: FnMut(&SpendSummary) -> bool>(
    unsigned_spend: &UnsignedSpend,
    secrets: &[SecretExponent],
    resolver: &mut ConditionResolver<I>,
    options: SigningOptions,
    approve: &mut F,
) -> Result<Option<crate::sign::SigningOutput>> {
    if !options.skip_confirmation {
        let summary = summarize_unsigned_spend(unsigned_spend, resolver)?;
        if !approve(&summary) {
            info!("operator declined the spend, skipping");
            return Ok(None);
        }
    }
    let output = sign(unsigned_spend, secrets, resolver)?;
    info!(
        resolved = output.resolved,
        unresolved = output.unresolved,
        "signing run complete"
    );
    if output.signatures.is_empty() {
        return Ok(None);
    }
    Ok(Some(output))
}

/// Parse key-file lines into secret exponents. Each line is hex; lines that
/// do not parse are logged and skipped rather than aborting the batch, so a
/// file with comments or blank lines still yields its keys.
pub fn parse_secret_exponents<'a>(
    lines: impl IntoIterator<Item = &'a str>,
) -> Vec<SecretExponent> {
    let mut secrets = Vec::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parsed = hex::decode(line)
            .map_err(Error::from)
            .and_then(|bytes| {
                let arr: [u8; 32] = bytes.as_slice().try_into().map_err(Error::from)?;
                SecretExponent::from_bytes(arr)
            });
        match parsed {
            Ok(secret) => secrets.push(secret),
            Err(err) => info!(%err, "skipping unparseable key line"),
        }
    }
    secrets
}
