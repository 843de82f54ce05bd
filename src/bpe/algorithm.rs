use super::{EndOfWord, MergeTable, END_OF_WORD};
use crate::utok;
use std::fmt;

/// 一个词的合并状态。
///
/// 所有符号都是 `word + "</w>"` 上连续的片段，合并只会连接相邻片段，
/// 因此用区间表示符号即可，不需要复制字符串。
pub(crate) struct MergeState<'v> {
    text: String,
    /// 原词的长度，之后的部分是词尾标记
    word_len: usize,
    table: &'v MergeTable,
    marks: Vec<Mark>,
}

#[derive(Clone, Copy, Debug)]
struct Mark {
    start: usize,
    end: usize,
    /// 片段在合并表中的符号序号，不在表中的片段不可能参与合并
    symbol: Option<utok>,
}

impl MergeTable {
    pub(crate) fn begin_merge<'v>(&'v self, word: &str) -> MergeState<'v> {
        let mut text = String::with_capacity(word.len() + END_OF_WORD.len());
        text.push_str(word);
        text.push_str(END_OF_WORD);

        let mut marks = word
            .char_indices()
            .map(|(i, c)| Mark {
                start: i,
                end: i + c.len_utf8(),
                symbol: None,
            })
            .collect::<Vec<_>>();
        match self.version {
            EndOfWord::Legacy => marks.push(Mark {
                start: word.len(),
                end: text.len(),
                symbol: None,
            }),
            EndOfWord::V2 => {
                if let Some(last) = marks.last_mut() {
                    last.end = text.len();
                }
            }
        }
        for mark in &mut marks {
            mark.symbol = self.find_symbol(&text[mark.start..mark.end]);
        }

        MergeState {
            text,
            word_len: word.len(),
            table: self,
            marks,
        }
    }
}

impl MergeState<'_> {
    /// 执行一轮合并，返回是否发生了合并。
    ///
    /// 每个相邻符号对先调用一次 `keep` 决定是否保留为候选，用于实现 dropout。
    /// 排名最靠前的符号对在本轮中所有未被占用的位置上同时合并。
    pub fn merge(&mut self, mut keep: impl FnMut() -> bool) -> bool {
        // 收集候选合并项：(rank, pos)
        let table = self.table;
        let candidates = self
            .marks
            .windows(2)
            .enumerate()
            .filter_map(|(i, pair)| {
                if !keep() {
                    return None;
                }
                let rank = table.pair_rank(pair[0].symbol?, pair[1].symbol?)?;
                Some((rank, i))
            })
            .collect::<Vec<_>>();

        let Some(best) = candidates.iter().map(|&(rank, _)| rank).min() else {
            return false;
        };

        // 排名唯一确定符号对，所以同一排名的位置持有相同的符号对
        let mut merged = Vec::with_capacity(self.marks.len());
        let mut i = 0;
        for &(rank, pos) in &candidates {
            // 重叠的位置已经被本轮更早的合并消费：x x x -> xx x
            if rank != best || pos < i {
                continue;
            }
            merged.extend_from_slice(&self.marks[i..pos]);
            let start = self.marks[pos].start;
            let end = self.marks[pos + 1].end;
            merged.push(Mark {
                start,
                end,
                symbol: table.find_symbol(&self.text[start..end]),
            });
            i = pos + 2;
        }
        merged.extend_from_slice(&self.marks[i..]);
        self.marks = merged;
        true
    }

    /// 当前的符号序列，包含词尾标记。
    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.marks.iter().map(|m| &self.text[m.start..m.end])
    }

    /// 结束合并，去掉词尾标记后产生子词序列。
    pub fn into_pieces(self) -> Vec<String> {
        let Self {
            text,
            word_len,
            marks,
            ..
        } = self;
        marks
            .into_iter()
            .filter_map(|m| {
                // 标记独占一个符号时整体丢弃，作为后缀时截掉
                let end = m.end.min(word_len);
                (m.start < end).then(|| text[m.start..end].to_string())
            })
            .collect()
    }
}

impl fmt::Display for MergeState<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:", &self.text[..self.word_len])?;
        for (piece, mark) in self.iter().zip(&self.marks) {
            match mark.symbol {
                Some(symbol) => write!(f, " {piece}#{symbol}")?,
                None => write!(f, " {piece}")?,
            }
        }
        Ok(())
    }
}
