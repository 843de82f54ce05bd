#![deny(warnings)]

mod bpe;
mod config;
mod error;
mod glossary;
mod tokenizer;
mod vocab;

pub use bpe::{EndOfWord, MergeTable, END_OF_WORD};
pub use config::BpeConfig;
pub use error::{Error, Result};
pub use glossary::{isolate_glossary, Glossary};
pub use tokenizer::Tokenizer;
pub use vocab::{check_vocab_and_split, Vocab, Vocabulary};

/// `utok` for symbol id in a [`MergeTable`].
#[allow(non_camel_case_types)]
pub type utok = u32;
