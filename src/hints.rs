use crate::keys::{PublicKey, SecretExponent};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How an on-chain aggregate key decomposes: the summand keys owned by the
/// signing parties, plus a publicly-derivable synthetic offset committing to
/// a hidden spend path. The final key is `sum(public_keys) + offset * G`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SumHint {
    pub public_keys: Vec<PublicKey>,
    pub synthetic_offset: SecretExponent,
}

impl SumHint {
    pub fn new(public_keys: Vec<PublicKey>, synthetic_offset: SecretExponent) -> Self {
        Self {
            public_keys,
            synthetic_offset,
        }
    }

    pub fn final_public_key(&self) -> PublicKey {
        self.public_keys.iter().sum::<PublicKey>() + self.synthetic_offset.public_key()
    }
}

/// How a summand key maps back to key material: a root key and the
/// derivation path below it. `root_public_key.child_for_path(&path)` is the
/// key this hint describes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathHint {
    pub root_public_key: PublicKey,
    pub path: Vec<u32>,
}

impl PathHint {
    pub fn new(root_public_key: PublicKey, path: Vec<u32>) -> Self {
        Self {
            root_public_key,
            path,
        }
    }

    pub fn public_key(&self) -> PublicKey {
        self.root_public_key.child_for_path(&self.path)
    }
}

/// A hint lookup result that keeps "a hint was supplied" distinguishable
/// from "no hint, fell back to the trivial decomposition".
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Hinted<T> {
    Found(T),
    Defaulted(T),
}

impl<T> Hinted<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Hinted::Found(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Hinted::Found(inner) | Hinted::Defaulted(inner) => inner,
        }
    }
}

/// Sum hints keyed by the final aggregate key they decompose. If two hints
/// claim the same final key the later one wins; supplying conflicting
/// decompositions is the spend builder's mistake.
#[derive(Clone, Debug, Default)]
pub struct SumHints {
    by_final_key: HashMap<PublicKey, SumHint>,
}

impl SumHints {
    pub fn build(hints: &[SumHint]) -> Self {
        let by_final_key = hints
            .iter()
            .map(|hint| (hint.final_public_key(), hint.clone()))
            .collect();
        Self { by_final_key }
    }

    /// Decomposition to sign against: an unhinted key is treated as a single
    /// directly-ownable summand with no offset.
    pub fn summands_for(&self, final_public_key: &PublicKey) -> Hinted<SumHint> {
        match self.by_final_key.get(final_public_key) {
            Some(hint) => Hinted::Found(hint.clone()),
            None => Hinted::Defaulted(SumHint::new(
                vec![*final_public_key],
                SecretExponent::zero(),
            )),
        }
    }

    /// Decomposition for the synthetic-offset pass: an unhinted key carries
    /// a zero offset and contributes an identity signature.
    pub fn offset_for(&self, final_public_key: &PublicKey) -> Hinted<SumHint> {
        match self.by_final_key.get(final_public_key) {
            Some(hint) => Hinted::Found(hint.clone()),
            None => Hinted::Defaulted(SumHint::new(Vec::new(), SecretExponent::zero())),
        }
    }
}

/// Path hints keyed by the derived (not root) public key.
#[derive(Clone, Debug, Default)]
pub struct PathHints {
    by_derived_key: HashMap<PublicKey, PathHint>,
}

impl PathHints {
    pub fn build(hints: &[PathHint]) -> Self {
        let by_derived_key = hints
            .iter()
            .map(|hint| (hint.public_key(), hint.clone()))
            .collect();
        Self { by_derived_key }
    }

    /// An unhinted key is treated as its own root with an empty path.
    pub fn for_public_key(&self, public_key: &PublicKey) -> Hinted<PathHint> {
        match self.by_derived_key.get(public_key) {
            Some(hint) => Hinted::Found(hint.clone()),
            None => Hinted::Defaulted(PathHint::new(*public_key, Vec::new())),
        }
    }
}
