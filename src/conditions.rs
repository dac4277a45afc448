use crate::error::{Error, Result};
use crate::program::Program;
use crate::spend::CoinSpend;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::error;

/// Condition opcodes interpreted by this crate. Everything else passes
/// through the grouped lookup untouched for external consumers.
pub const AGG_SIG_UNSAFE: u8 = 49;
pub const AGG_SIG_ME: u8 = 50;
pub const CREATE_COIN: u8 = 51;

/// Evaluation cost ceiling for a single puzzle run.
pub const MAX_COST: u64 = 1 << 34;

/// One evaluated condition: opcode plus the operands that followed it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Condition {
    pub opcode: u8,
    pub operands: Vec<Program>,
}

impl Condition {
    pub fn operand_atom(&self, index: usize) -> Result<&[u8]> {
        self.operands
            .get(index)
            .and_then(Program::as_atom)
            .ok_or_else(|| Error::BadProgram(format!("condition operand {} is not an atom", index)))
    }
}

/// Group an evaluated condition list by opcode. Conditions whose opcode atom
/// does not fit a single byte cannot be any opcode this crate knows about
/// and are left out of the lookup.
pub fn conditions_by_opcode(conditions: &Program) -> Result<HashMap<u8, Vec<Condition>>> {
    let mut lookup: HashMap<u8, Vec<Condition>> = HashMap::new();
    for entry in conditions.iter_list()? {
        let items = entry.iter_list()?;
        let (first, rest) = match items.split_first() {
            Some(split) => split,
            None => continue,
        };
        let opcode_atom = first
            .as_atom()
            .ok_or_else(|| Error::BadProgram("condition opcode is not an atom".into()))?;
        let opcode = match crate::program::u64_from_atom_bytes(opcode_atom) {
            Ok(n) if n <= u8::MAX as u64 => n as u8,
            _ => continue,
        };
        let operands = rest.iter().map(|p| (*p).clone()).collect();
        lookup
            .entry(opcode)
            .or_insert_with(Vec::new)
            .push(Condition { opcode, operands });
    }
    Ok(lookup)
}

/// The external puzzle-interpreter boundary: evaluate a puzzle against its
/// solution under a cost ceiling, yielding the condition list.
pub trait Interpreter {
    fn evaluate(
        &self,
        puzzle: &Program,
        solution: &Program,
        max_cost: u64,
    ) -> Result<(u64, Program)>;
}

/// Minimal built-in interpreter understanding only the quote form
/// `(1 . conditions)`, the shape emitted by pay-to-conditions puzzles.
/// Real deployments plug a full interpreter in through [`Interpreter`].
#[derive(Clone, Copy, Debug, Default)]
pub struct QuotedPrograms;

impl QuotedPrograms {
    const QUOTE_COST: u64 = 20;
}

impl Interpreter for QuotedPrograms {
    fn evaluate(
        &self,
        puzzle: &Program,
        _solution: &Program,
        max_cost: u64,
    ) -> Result<(u64, Program)> {
        if Self::QUOTE_COST > max_cost {
            return Err(Error::CostExceeded {
                cost: Self::QUOTE_COST,
                max_cost,
            });
        }
        match puzzle.as_pair() {
            Some((op, quoted)) if op.as_atom() == Some(&[1u8]) => {
                Ok((Self::QUOTE_COST, quoted.clone()))
            }
            _ => Err(Error::BadProgram(
                "only quoted condition lists are supported by the built-in interpreter".into(),
            )),
        }
    }
}

/// Evaluates coin spends to condition lists, memoizing by the coin spend's
/// canonical bytes so structurally equal spends evaluated twice only run
/// once. The memo is a pure cache; correctness never depends on a hit.
///
/// Also enforces the integrity check that the revealed puzzle actually
/// hashes to the puzzle hash the coin committed to.
#[derive(Debug)]
pub struct ConditionResolver<I: Interpreter> {
    interpreter: I,
    max_cost: u64,
    cache: HashMap<[u8; 32], Program>,
}

impl<I: Interpreter> ConditionResolver<I> {
    pub fn new(interpreter: I) -> Self {
        Self::with_max_cost(interpreter, MAX_COST)
    }

    pub fn with_max_cost(interpreter: I, max_cost: u64) -> Self {
        Self {
            interpreter,
            max_cost,
            cache: HashMap::new(),
        }
    }

    pub fn conditions_for_coin_spend(&mut self, coin_spend: &CoinSpend) -> Result<Program> {
        let computed_hash = coin_spend.puzzle_reveal.tree_hash();
        if computed_hash != coin_spend.coin.puzzle_hash {
            let coin_id = hex::encode(coin_spend.coin.name());
            error!(%coin_id, "puzzle reveal does not match the coin's puzzle hash");
            return Err(Error::PuzzleHashMismatch { coin_id });
        }

        let key = cache_key(coin_spend)?;
        if let Some(conditions) = self.cache.get(&key) {
            return Ok(conditions.clone());
        }
        let (_cost, conditions) = self.interpreter.evaluate(
            &coin_spend.puzzle_reveal,
            &coin_spend.solution,
            self.max_cost,
        )?;
        self.cache.insert(key, conditions.clone());
        Ok(conditions)
    }
}

fn cache_key(coin_spend: &CoinSpend) -> Result<[u8; 32]> {
    let bytes = bincode::serialize(coin_spend)?;
    Ok(Sha256::digest(&bytes).into())
}
