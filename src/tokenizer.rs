use crate::{
    bpe::is_blank,
    glossary::{build_pattern, isolate_glossary, Glossary},
    vocab::check_vocab_and_split,
    BpeConfig, Error, MergeTable, Result, Vocabulary,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use regex::Regex;
use std::{
    collections::HashMap,
    io::{BufRead, Read, Write},
    sync::Arc,
};

/// BPE 分词器。
///
/// 合并表、词表和受保护模式构造后不再改变，在多个分词器之间共享；
/// 缓存和随机数发生器属于单个分词器。
pub struct Tokenizer {
    shared: Arc<Shared>,
    /// 原词 -> 子词序列，只在关闭 dropout 时使用
    cache: HashMap<String, Vec<String>>,
    rng: StdRng,
}

struct Shared {
    table: MergeTable,
    separator: String,
    vocabulary: Option<Vocabulary>,
    glossaries: Box<[Glossary]>,
    /// 所有受保护模式的整词匹配
    glossary_regex: Option<Regex>,
    dropout: f64,
}

impl Tokenizer {
    /// 从合并表文本构造分词器，`config.merges` 限制读取的规则数量。
    pub fn from_codes(codes: &str, config: BpeConfig) -> Result<Self> {
        let table = MergeTable::from_codes(codes, config.merges)?;
        Self::new(table, config)
    }

    pub fn from_reader(reader: impl Read, config: BpeConfig) -> Result<Self> {
        let table = MergeTable::from_reader(reader, config.merges)?;
        Self::new(table, config)
    }

    /// 用已经加载的合并表构造分词器，此时忽略 `config.merges`。
    pub fn new(table: MergeTable, config: BpeConfig) -> Result<Self> {
        let BpeConfig {
            separator,
            vocabulary,
            glossaries,
            dropout,
            seed,
            ..
        } = config;

        if !(0. ..1.).contains(&dropout) {
            return Err(Error::Dropout(dropout));
        }
        let glossary_regex = build_pattern(&glossaries)?;
        let glossaries = glossaries
            .iter()
            .map(|g| Glossary::new(g))
            .collect::<Result<Box<[_]>>>()?;
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            shared: Arc::new(Shared {
                table,
                separator,
                vocabulary,
                glossaries,
                glossary_regex,
                dropout,
            }),
            cache: HashMap::new(),
            rng,
        })
    }

    /// 产生一个共享只读数据的新分词器，它拥有独立的缓存和随机数发生器。
    pub fn fork(&mut self) -> Self {
        Self {
            shared: self.shared.clone(),
            cache: HashMap::new(),
            rng: StdRng::seed_from_u64(self.rng.gen()),
        }
    }

    #[inline]
    pub fn table(&self) -> &MergeTable {
        &self.shared.table
    }

    #[inline]
    pub fn separator(&self) -> &str {
        &self.shared.separator
    }

    /// 查询一个词的缓存结果。
    #[inline]
    pub fn cached(&self, word: &str) -> Option<&[String]> {
        self.cache.get(word).map(Vec::as_slice)
    }

    /// 切分一行文本，保留行首和行尾的空白。
    pub fn segment_line(&mut self, line: &str) -> String {
        let body = line.trim_start_matches(is_blank);
        let leading = &line[..line.len() - body.len()];
        let trailing = &line[line.trim_end_matches(is_blank).len()..];

        let mut out = String::with_capacity(line.len() * 2);
        out.push_str(leading);
        out.push_str(&self.segment(line));
        // 全是空白的行不重复输出
        if trailing.len() != line.len() {
            out.push_str(trailing);
        }
        out
    }

    /// 切分以空格分隔的句子。
    pub fn segment(&mut self, sentence: &str) -> String {
        self.segment_tokens(sentence.trim_matches(is_blank).split(' '))
            .join(" ")
    }

    /// 切分一组词，非末尾子词带有分隔符。
    pub fn segment_tokens<'a>(
        &mut self,
        tokens: impl IntoIterator<Item = &'a str>,
    ) -> Vec<String> {
        let mut output = Vec::new();
        for word in tokens {
            // 连续空格产生空词
            if word.is_empty() {
                continue;
            }
            let mut pieces = Vec::new();
            for segment in self.isolate_glossaries(word) {
                pieces.extend(self.encode(segment));
            }
            let n = pieces.len();
            output.extend(pieces.into_iter().enumerate().map(|(i, mut piece)| {
                if i + 1 < n {
                    piece.push_str(&self.shared.separator);
                }
                piece
            }));
        }
        output
    }

    /// 依次应用所有受保护模式切开一个词。
    pub fn isolate_glossaries<'w>(&self, word: &'w str) -> Vec<&'w str> {
        let mut segments = vec![word];
        for glossary in &*self.shared.glossaries {
            segments = segments
                .into_iter()
                .flat_map(|segment| isolate_glossary(segment, glossary))
                .collect();
        }
        segments
    }

    /// 对一个词应用合并规则，返回不带分隔符的子词序列。
    pub fn encode(&mut self, word: &str) -> Vec<String> {
        let shared = &*self.shared;
        let dropout = shared.dropout;
        let caching = dropout <= 0.;

        if caching {
            if let Some(pieces) = self.cache.get(word) {
                return pieces.clone();
            }
        }

        if shared.glossary_regex.as_ref().is_some_and(|re| re.is_match(word)) {
            let pieces = vec![word.to_string()];
            if caching {
                self.cache.insert(word.into(), pieces.clone());
            }
            return pieces;
        }

        let mut chars = word.chars();
        match (chars.next(), chars.next()) {
            (None, _) => return Vec::new(),
            (Some(_), None) => return vec![word.to_string()],
            (Some(_), Some(_)) => {}
        }

        let mut state = shared.table.begin_merge(word);
        if caching {
            while state.merge(|| true) {}
        } else {
            let rng = &mut self.rng;
            while state.merge(|| rng.gen::<f64>() > dropout) {}
        }
        log::trace!("{state}");

        let mut pieces = state.into_pieces();
        if let Some(vocab) = &shared.vocabulary {
            pieces = check_vocab_and_split(&pieces, &shared.table, vocab, &shared.separator);
        }

        if caching {
            self.cache.insert(word.into(), pieces.clone());
        }
        pieces
    }

    /// 逐行切分读取器中的文本并写入 `writer`，返回处理的行数。
    pub fn process_lines(
        &mut self,
        mut reader: impl BufRead,
        mut writer: impl Write,
    ) -> Result<usize> {
        let mut line = String::new();
        let mut count = 0;
        while reader.read_line(&mut line)? > 0 {
            writer.write_all(self.segment_line(&line).as_bytes())?;
            line.clear();
            count += 1;
        }
        writer.flush()?;
        log::debug!("segmented {count} lines, {} words cached", self.cache.len());
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CODES: &str = "#version: 0.2\nl o\nlo w\ne r</w>\nlow er</w>\nU S\nS A</w>\n";

    fn tokenizer(config: BpeConfig) -> Tokenizer {
        Tokenizer::from_codes(CODES, config).unwrap()
    }

    #[test]
    fn encode_word() {
        let mut bpe = tokenizer(BpeConfig::default());
        assert_eq!(bpe.encode("lower"), ["lower"]);
        assert_eq!(bpe.encode("lowest"), ["low", "e", "s", "t"]);
        assert_eq!(bpe.cached("lower"), Some(&["lower".to_string()][..]));
    }

    #[test]
    fn single_character() {
        let mut bpe = tokenizer(BpeConfig::default());
        assert_eq!(bpe.encode("l"), ["l"]);
        assert_eq!(bpe.encode("é"), ["é"]);
        assert!(bpe.encode("").is_empty());
    }

    #[test]
    fn whole_word_glossary() {
        let mut bpe = tokenizer(BpeConfig::default().with_glossaries(["USA"]));
        assert_eq!(bpe.encode("USA"), ["USA"]);
        assert_eq!(bpe.cached("USA"), Some(&["USA".to_string()][..]));

        let mut plain = tokenizer(BpeConfig::default());
        assert_eq!(plain.encode("USA"), ["US", "A"]);
    }

    #[test]
    fn separator_placement() {
        let mut bpe = tokenizer(BpeConfig::default());
        assert_eq!(
            bpe.segment_tokens(["lowest", "lower"]),
            ["low@@", "e@@", "s@@", "t", "lower"]
        );
        let mut bpe = tokenizer(BpeConfig::default().with_separator("</s>"));
        assert_eq!(bpe.segment("  lowest   x "), "low</s> e</s> s</s> t x");
    }

    #[test]
    fn glossary_isolation_in_tokens() {
        let mut bpe = tokenizer(BpeConfig::default().with_glossaries(["USA", "[0-9]+"]));
        assert_eq!(bpe.isolate_glossaries("1934USAlower"), ["1934", "USA", "lower"]);
        assert_eq!(
            bpe.segment_tokens(["1934USAlower"]),
            ["1934@@", "USA@@", "lower"]
        );
    }

    #[test]
    fn line_whitespace() {
        let mut bpe = tokenizer(BpeConfig::default());
        assert_eq!(bpe.segment_line("  lowest lower\r\n"), "  low@@ e@@ s@@ t lower\r\n");
        assert_eq!(bpe.segment_line("lower"), "lower");
        assert_eq!(bpe.segment_line(" \n"), " \n");
        assert_eq!(bpe.segment_line(""), "");
    }

    #[test]
    fn dropout_bypasses_cache() {
        let mut bpe = tokenizer(BpeConfig::default().with_dropout(0.5).with_seed(7));
        for _ in 0..20 {
            let pieces = bpe.encode("lower");
            assert_eq!(pieces.concat(), "lower");
        }
        assert!(bpe.cached("lower").is_none());
    }

    #[test]
    fn dropout_is_seeded() {
        let config = BpeConfig::default().with_dropout(0.3).with_seed(42);
        let mut a = tokenizer(config.clone());
        let mut b = tokenizer(config);
        let words = ["lower", "lowest", "lower", "USA"];
        for w in words {
            assert_eq!(a.encode(w), b.encode(w));
        }
    }

    #[test]
    fn invalid_dropout() {
        for p in [1., -0.1, f64::NAN] {
            assert!(matches!(
                Tokenizer::from_codes(CODES, BpeConfig::default().with_dropout(p)),
                Err(Error::Dropout(_))
            ));
        }
    }

    #[test]
    fn vocabulary_closure() {
        let vocab = ["low@@", "e@@", "r", "s@@", "t"]
            .into_iter()
            .collect::<Vocabulary>();
        let mut bpe = tokenizer(BpeConfig::default().with_vocabulary(vocab));
        assert_eq!(bpe.segment("lower lowest"), "low@@ e@@ r low@@ e@@ s@@ t");
    }

    #[test]
    fn fork_has_own_cache() {
        let mut bpe = tokenizer(BpeConfig::default());
        bpe.encode("lower");
        let mut worker = bpe.fork();
        assert!(worker.cached("lower").is_none());
        assert_eq!(worker.encode("lower"), ["lower"]);
        assert_eq!(worker.table().len(), bpe.table().len());
        assert_eq!(worker.separator(), "@@");
    }

    #[test]
    fn process_lines() {
        let mut bpe = tokenizer(BpeConfig::default());
        let input = "lower lowest\n\n  USA\n";
        let mut output = Vec::new();
        let n = bpe.process_lines(input.as_bytes(), &mut output).unwrap();
        assert_eq!(n, 3);
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "lower low@@ e@@ s@@ t\n\n  US@@ A\n"
        );
    }
}
