use thiserror::Error;

#[derive(Error, Debug)]
pub enum HfsError {
    #[error("device I/O error: {0}")]
    DeviceIo(#[from] std::io::Error),

    #[error("no HFS or HFS+ signature found at any candidate offset")]
    UnknownVolume,

    #[error("recognized signature but unsupported version: {0}")]
    UnsupportedVersion(u16),

    #[error("corrupt B-tree node {node}: {reason}")]
    CorruptNode { node: u32, reason: String },

    #[error("node index {index} outside [0, {total})")]
    InvalidNodeIndex { index: u32, total: u32 },

    #[error("fork of CNID {cnid} covers {covered} of {total} blocks")]
    ShortFork { cnid: u32, covered: u32, total: u32 },

    #[error("no thread record for CNID {0} during path reconstruction")]
    BrokenChain(u32),

    #[error("decoded name does not fit the output buffer")]
    OutputTooSmall,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("ill-formed HFS path: {0}")]
    PathSyntax(String),

    #[error("read of {length} bytes at offset {offset} exceeds the addressable range")]
    OutOfRange { offset: u64, length: u64 },
}

impl HfsError {
    pub(crate) fn corrupt(node: u32, reason: impl Into<String>) -> Self {
        HfsError::CorruptNode {
            node,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, HfsError>;
