use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// 合并表中的一行不是恰好两个符号
    #[error("invalid line {line} in BPE codes file: {content}")]
    Format { line: usize, content: String },

    #[error("unsupported BPE codes version: {0}")]
    UnsupportedVersion(String),

    #[error("invalid line {line} in vocabulary file: {content}")]
    Vocabulary { line: usize, content: String },

    #[error("invalid glossary pattern: {0}")]
    Glossary(#[from] regex::Error),

    #[error("dropout must be in [0, 1), got {0}")]
    Dropout(f64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
