use blst::BLST_ERROR;
use std::array::TryFromSliceError;
use thiserror::Error;

/// Specialisation of `std::Result`.
pub type Result<T, E = SignerError> = std::result::Result<T, E>;
pub type Error = SignerError;

#[derive(Error, Debug)]
/// error variants.
pub enum SignerError {
    #[error("blst error")]
    Blst(BLST_ERROR),

    #[error("bytes do not encode a curve point")]
    InvalidPoint,

    #[error("bytes do not encode a canonical scalar")]
    InvalidScalar,

    #[error("deserialization from bytes failed")]
    InvalidBytes(#[from] TryFromSliceError),

    #[error("serialization failed")]
    Serialization(#[from] bincode::Error),

    #[error("hex decoding failed")]
    Decode(#[from] hex::FromHexError),

    #[error("program evaluation cost {cost} exceeds maximum {max_cost}")]
    CostExceeded { cost: u64, max_cost: u64 },

    #[error("puzzle reveal does not hash to the declared puzzle hash for coin {coin_id}")]
    PuzzleHashMismatch { coin_id: String },

    #[error("malformed program: {0}")]
    BadProgram(String),

    #[error("blob needs {needed} chunks but the part count must fit one byte")]
    TooManyChunks { needed: usize },

    #[error("chunk does not belong to the message being assembled")]
    ChunkMismatch,

    #[error("chunk is too short to carry index and count metadata")]
    ChunkTooShort,

    #[error("i/o error")]
    Io(#[from] std::io::Error),
}

impl From<BLST_ERROR> for SignerError {
    fn from(e: BLST_ERROR) -> Self {
        Self::Blst(e)
    }
}
