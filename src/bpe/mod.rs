mod algorithm;

use crate::{utok, Error, Result};
use patricia_tree::PatriciaMap;
use std::{collections::HashMap, io::Read};

/// 词尾标记，只在合并过程中出现，不会出现在输出中。
pub const END_OF_WORD: &str = "</w>";

/// 词尾约定，由合并表文件的版本头决定。
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub enum EndOfWord {
    /// `#version: 0.1` 或无版本头：词尾标记作为独立的符号追加在词后。
    #[default]
    Legacy,
    /// `#version: 0.2`：词尾标记作为后缀附加在最后一个字符上。
    V2,
}

/// 按优先级排列的合并规则表。
pub struct MergeTable {
    /// 保存所有符号的字符串内容，重复片段只保存一次
    text: Box<str>,
    /// 按符号序号保存在 `text` 中的位置
    symbols: Box<[(u32, u32)]>,
    /// 符号的前缀树，用于从字符串查找符号序号
    trie: PatriciaMap<utok>,
    /// 符号对的合并排名，从 0 开始，越小越优先
    ranks: HashMap<(utok, utok), u32>,
    /// 合并结果 -> 合并前的符号对
    reverse: PatriciaMap<(utok, utok)>,
    /// 词尾约定
    version: EndOfWord,
}

impl MergeTable {
    /// 从读取器读入合并表文本，见 [`MergeTable::from_codes`]。
    pub fn from_reader(mut reader: impl Read, limit: Option<usize>) -> Result<Self> {
        let mut codes = String::new();
        reader.read_to_string(&mut codes)?;
        Self::from_codes(&codes, limit)
    }

    /// 解析合并表文本并构造合并表。
    ///
    /// 第一行可以是 `#version: X.Y` 版本头，其余每行是以单个空格分隔的一对符号。
    /// `limit` 限制只读取前若干条合并规则，`None` 表示全部读取。
    /// 重复的符号对保留首次出现的排名。
    pub fn from_codes(codes: &str, limit: Option<usize>) -> Result<Self> {
        // 版本头占据第一行，报错时的行号需要跳过它
        let (version, body, offset) = match codes.strip_prefix("#version:") {
            Some(_) => {
                let (header, body) = codes.split_once('\n').unwrap_or((codes, ""));
                (parse_version(header)?, body, 2)
            }
            None => (EndOfWord::Legacy, codes, 1),
        };

        let lines = body
            .trim_end_matches('\n')
            .split('\n')
            .take(limit.unwrap_or(usize::MAX))
            .map(|line| line.trim_matches(is_blank))
            .collect::<Vec<_>>();

        let mut pairs = Vec::with_capacity(lines.len());
        for (i, line) in lines.into_iter().enumerate() {
            let mut parts = line.split(' ');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(left), Some(right), None) => pairs.push((left, right)),
                _ => {
                    return Err(Error::Format {
                        line: i + offset,
                        content: line.into(),
                    })
                }
            }
        }

        let table = Self::new(pairs, version);
        log::debug!(
            "loaded {} merges ({} symbols), end-of-word convention {:?}",
            table.len(),
            table.symbols.len(),
            table.version,
        );
        Ok(table)
    }

    /// 从按优先级排列的符号对构造合并表。
    pub fn new<'a>(
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
        version: EndOfWord,
    ) -> Self {
        // 为符号分配序号
        let mut ids = HashMap::<&str, utok>::new();
        let mut pieces = Vec::new();
        let mut intern = |piece: &'a str| {
            *ids.entry(piece).or_insert_with(|| {
                pieces.push(piece);
                (pieces.len() - 1) as utok
            })
        };
        // 只保留重复项的第一次出现，排名按去重后的顺序连续分配
        let mut ranks = HashMap::new();
        for (left, right) in pairs {
            let pair = (intern(left), intern(right));
            let rank = ranks.len() as u32;
            ranks.entry(pair).or_insert(rank);
        }
        let mut sorted = ranks
            .iter()
            .map(|(&pair, &rank)| (rank, pair))
            .collect::<Vec<_>>();
        sorted.sort_unstable();

        let (text, symbols) = compress(&pieces);
        let trie = pieces
            .iter()
            .enumerate()
            .map(|(i, piece)| (*piece, i as utok))
            .collect::<PatriciaMap<_>>();
        // 合并结果相同的规则只能保留一条，排名最靠前的最后写入
        let mut reverse = PatriciaMap::new();
        for &(_, (left, right)) in sorted.iter().rev() {
            let merged = [pieces[left as usize], pieces[right as usize]].concat();
            reverse.insert(merged, (left, right));
        }

        Self {
            text,
            symbols,
            trie,
            ranks,
            reverse,
            version,
        }
    }

    /// 合并规则的数量。
    #[inline]
    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    #[inline]
    pub fn version(&self) -> EndOfWord {
        self.version
    }

    /// 查询符号对的合并排名。
    pub fn rank(&self, left: &str, right: &str) -> Option<u32> {
        let pair = (self.find_symbol(left)?, self.find_symbol(right)?);
        self.ranks.get(&pair).copied()
    }

    /// 查询一个合并结果是由哪一对符号合并而来的。
    pub fn split(&self, merged: &str) -> Option<(&str, &str)> {
        self.reverse
            .get(merged)
            .map(|&(left, right)| (self.symbol(left), self.symbol(right)))
    }

    /// piece -> symbol
    #[inline]
    pub(crate) fn find_symbol(&self, piece: &str) -> Option<utok> {
        self.trie.get(piece).copied()
    }

    /// symbol -> piece
    #[inline(always)]
    pub(crate) fn symbol(&self, symbol: utok) -> &str {
        let (off, len) = self.symbols[symbol as usize];
        &self.text[off as usize..][..len as usize]
    }

    #[inline(always)]
    pub(crate) fn pair_rank(&self, left: utok, right: utok) -> Option<u32> {
        self.ranks.get(&(left, right)).copied()
    }
}

#[inline(always)]
pub(crate) fn is_blank(c: char) -> bool {
    matches!(c, '\r' | '\n' | ' ')
}

/// 解析版本头，例如 `#version: 0.2`，末尾的 `.0` 被忽略。
fn parse_version(header: &str) -> Result<EndOfWord> {
    let raw = header.split_whitespace().last().unwrap_or_default();
    let mut version = raw;
    while let Some((head, tail)) = version.rsplit_once('.') {
        if !tail.is_empty() && tail.bytes().all(|b| b == b'0') {
            version = head;
        } else {
            break;
        }
    }
    let parts = version
        .split('.')
        .map(str::parse::<u32>)
        .collect::<std::result::Result<Vec<_>, _>>();
    match parts.as_deref() {
        Ok([0, 1]) => Ok(EndOfWord::Legacy),
        Ok([0, 2]) => Ok(EndOfWord::V2),
        _ => Err(Error::UnsupportedVersion(raw.into())),
    }
}

/// 利用符号间的重复部分压缩存储，返回内容和每个符号的位置。
fn compress(pieces: &[&str]) -> (Box<str>, Box<[(u32, u32)]>) {
    let total_len = pieces.iter().map(|p| p.len()).sum();
    let mut slices = vec![(0u32, 0u32); pieces.len()];
    let mut text_buf = String::with_capacity(total_len);
    let mut indices = (0..pieces.len()).collect::<Vec<_>>();
    // 对符号按内容长度从长到短排序，因为短的内容有可能是长内容的子串，可以避免重复存储相同内容
    indices.sort_unstable_by_key(|&i| std::cmp::Reverse(pieces[i].len()));
    for i in indices {
        let piece = pieces[i];
        // 查找子串，若存在则复用，否则将新的内容追加到缓存。
        // 合法 utf-8 的子串匹配总是落在字符边界上
        let off = memchr::memmem::find(text_buf.as_bytes(), piece.as_bytes())
            .unwrap_or_else(|| {
                let off = text_buf.len();
                text_buf.push_str(piece);
                off
            });
        slices[i] = (off as _, piece.len() as _);
    }
    (text_buf.into_boxed_str(), slices.into_boxed_slice())
}
