use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A puzzle/solution program tree.
///
/// The evaluation of a puzzle is owned by an external interpreter; this crate
/// only needs the evaluated *shape*: an atom of bytes or a pair of subtrees.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Program {
    Atom(Vec<u8>),
    Pair(Box<Program>, Box<Program>),
}

impl Program {
    pub fn nil() -> Self {
        Program::Atom(Vec::new())
    }

    pub fn atom(bytes: impl Into<Vec<u8>>) -> Self {
        Program::Atom(bytes.into())
    }

    pub fn pair(first: Program, rest: Program) -> Self {
        Program::Pair(Box::new(first), Box::new(rest))
    }

    /// Build a proper (nil-terminated) list.
    pub fn from_list(items: Vec<Program>) -> Self {
        items
            .into_iter()
            .rev()
            .fold(Program::nil(), |rest, item| Program::pair(item, rest))
    }

    pub fn as_atom(&self) -> Option<&[u8]> {
        match self {
            Program::Atom(bytes) => Some(bytes),
            Program::Pair(..) => None,
        }
    }

    pub fn as_pair(&self) -> Option<(&Program, &Program)> {
        match self {
            Program::Atom(_) => None,
            Program::Pair(first, rest) => Some((first, rest)),
        }
    }

    /// Walk a proper list, failing on an improper terminator.
    pub fn iter_list(&self) -> Result<Vec<&Program>> {
        let mut items = Vec::new();
        let mut node = self;
        loop {
            match node {
                Program::Pair(first, rest) => {
                    items.push(first.as_ref());
                    node = rest;
                }
                Program::Atom(bytes) if bytes.is_empty() => return Ok(items),
                Program::Atom(_) => {
                    return Err(Error::BadProgram("list not nil-terminated".into()))
                }
            }
        }
    }

    /// Canonical tree hash, used to check a puzzle reveal against the
    /// puzzle hash a coin committed to on-chain.
    pub fn tree_hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        match self {
            Program::Atom(bytes) => {
                hasher.update([1u8]);
                hasher.update(bytes);
            }
            Program::Pair(first, rest) => {
                hasher.update([2u8]);
                hasher.update(first.tree_hash());
                hasher.update(rest.tree_hash());
            }
        }
        hasher.finalize().into()
    }
}

/// Minimal big-endian signed encoding of an unsigned integer, the atom form
/// used for amounts and opcodes: no redundant leading bytes, one leading zero
/// byte when the top bit would otherwise read as a sign.
pub fn u64_to_atom_bytes(n: u64) -> Vec<u8> {
    if n == 0 {
        return Vec::new();
    }
    let be = n.to_be_bytes();
    let first = be.iter().position(|b| *b != 0).unwrap_or(7);
    let mut bytes = Vec::with_capacity(9 - first);
    if be[first] & 0x80 != 0 {
        bytes.push(0);
    }
    bytes.extend_from_slice(&be[first..]);
    bytes
}

pub fn u64_from_atom_bytes(bytes: &[u8]) -> Result<u64> {
    if bytes.is_empty() {
        return Ok(0);
    }
    if bytes[0] & 0x80 != 0 {
        return Err(Error::BadProgram("negative integer atom".into()));
    }
    let digits: &[u8] = if bytes[0] == 0 { &bytes[1..] } else { bytes };
    if digits.len() > 8 {
        return Err(Error::BadProgram("integer atom exceeds 64 bits".into()));
    }
    let mut n = 0u64;
    for byte in digits {
        n = (n << 8) | u64::from(*byte);
    }
    Ok(n)
}
