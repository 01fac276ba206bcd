use crate::io::BlockNumber;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FsError {
    #[error("invalid name: {0}")]
    InvalidName(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("no such file or directory: {0}")]
    NotFound(String),
    #[error("not a file: {0}")]
    NotAFile(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("path conflict: {0} exists but is not a directory")]
    PathConflict(String),
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),
    #[error("the root directory cannot be deleted")]
    RootDeletionForbidden,
    #[error("file exceeds maximum size: {size} bytes (limit {limit})")]
    CapacityExceeded { size: usize, limit: usize },
    #[error("no free blocks available")]
    CapacityExhausted,
    #[error("block {0} out of range")]
    OutOfRange(BlockNumber),
    #[error("block {0} is free and contains no data")]
    NotAllocated(BlockNumber),
    #[error("block {0} is already free")]
    AlreadyFree(BlockNumber),
    #[error("corrupt image: {0}")]
    CorruptImage(String),
    #[error("device i/o failure")]
    Device(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FsError>;
