//! 这个模块提供目标词表，以及把词表外的子词沿合并历史拆回词表内的功能。

use crate::{bpe::is_blank, Error, MergeTable, Result, END_OF_WORD};
use patricia_tree::PatriciaSet;
use std::{
    collections::{BTreeSet, HashSet},
    io::BufRead,
};

/// 词表成员查询。
///
/// 词表中的非末尾子词已经带有分隔符后缀，例如 `ab@@`。
pub trait Vocab {
    fn contains(&self, piece: &str) -> bool;
}

impl Vocab for HashSet<String> {
    #[inline]
    fn contains(&self, piece: &str) -> bool {
        HashSet::contains(self, piece)
    }
}

impl Vocab for BTreeSet<String> {
    #[inline]
    fn contains(&self, piece: &str) -> bool {
        BTreeSet::contains(self, piece)
    }
}

/// 目标词表，子词之间共享大量前缀，用前缀树保存。
#[derive(Clone, Default, Debug)]
pub struct Vocabulary(PatriciaSet);

impl Vocabulary {
    /// 读取词表文件，每行是 `词 频数`。
    ///
    /// 给定 `threshold` 时只保留频数不低于它的词。
    pub fn from_reader(reader: impl BufRead, threshold: Option<i64>) -> Result<Self> {
        let mut set = PatriciaSet::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim_matches(is_blank);
            let mut parts = line.split(' ');
            let (word, freq) = match (parts.next(), parts.next(), parts.next()) {
                (Some(word), Some(freq), None) => match freq.parse::<i64>() {
                    Ok(freq) => (word, freq),
                    Err(_) => return Err(invalid(i, line)),
                },
                _ => return Err(invalid(i, line)),
            };
            if threshold.map_or(true, |t| freq >= t) {
                set.insert(word);
            }
        }
        log::debug!("loaded {} vocabulary entries", set.len());
        Ok(Self(set))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn invalid(i: usize, line: &str) -> Error {
    Error::Vocabulary {
        line: i + 1,
        content: line.into(),
    }
}

impl Vocab for Vocabulary {
    #[inline]
    fn contains(&self, piece: &str) -> bool {
        self.0.contains(piece)
    }
}

impl<T: AsRef<str>> FromIterator<T> for Vocabulary {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().map(|s| s.as_ref().to_owned()).collect())
    }
}

/// 检查每个子词是否在词表中，把词表外的子词反向拆分为更小的单元。
///
/// 非末尾子词以带分隔符的形式查询，末尾子词以原形查询。
pub fn check_vocab_and_split<V: Vocab + ?Sized>(
    pieces: &[String],
    table: &MergeTable,
    vocab: &V,
    separator: &str,
) -> Vec<String> {
    let Some((last, init)) = pieces.split_last() else {
        return Vec::new();
    };

    let mut out = Vec::with_capacity(pieces.len());
    for piece in init {
        if contains_with(vocab, piece, separator) {
            out.push(piece.clone());
        } else {
            log::trace!("OOV: {piece}");
            split_further(piece, table, vocab, separator, false, &mut out);
        }
    }
    if vocab.contains(last) {
        out.push(last.clone());
    } else {
        log::trace!("OOV: {last}");
        split_further(last, table, vocab, separator, true, &mut out);
    }
    out
}

/// 递归地撤销合并，直到所有单元都在词表中或者无法再拆分。
fn split_further<V: Vocab + ?Sized>(
    piece: &str,
    table: &MergeTable,
    vocab: &V,
    separator: &str,
    is_final: bool,
    out: &mut Vec<String>,
) {
    let pair = if is_final {
        table
            .split(&format!("{piece}{END_OF_WORD}"))
            .map(|(left, right)| (left, right.strip_suffix(END_OF_WORD).unwrap_or(right)))
    } else {
        table.split(piece)
    };
    let Some((left, right)) = pair else {
        log::trace!("cannot split {piece} further");
        out.push(piece.into());
        return;
    };

    if contains_with(vocab, left, separator) {
        out.push(left.into());
    } else {
        split_further(left, table, vocab, separator, false, out);
    }

    let keep = if is_final {
        vocab.contains(right)
    } else {
        contains_with(vocab, right, separator)
    };
    if keep {
        out.push(right.into());
    } else {
        split_further(right, table, vocab, separator, is_final, out);
    }
}

#[inline]
fn contains_with<V: Vocab + ?Sized>(vocab: &V, piece: &str, separator: &str) -> bool {
    vocab.contains(&[piece, separator].concat())
}
