use crate::Vocabulary;

/// 分词器的构造参数。
#[derive(Clone, Debug)]
pub struct BpeConfig {
    /// 只使用合并表中的前若干条规则，`None` 表示全部使用
    pub merges: Option<usize>,
    /// 附加在非末尾子词上的分隔符
    pub separator: String,
    /// 目标词表，非末尾子词带有分隔符后缀
    pub vocabulary: Option<Vocabulary>,
    /// 受保护的模式，按顺序应用
    pub glossaries: Vec<String>,
    /// 每个候选合并被丢弃的概率，0 表示关闭 dropout
    pub dropout: f64,
    /// dropout 的随机数种子，`None` 时从系统熵初始化
    pub seed: Option<u64>,
}

impl Default for BpeConfig {
    fn default() -> Self {
        Self {
            merges: None,
            separator: "@@".into(),
            vocabulary: None,
            glossaries: Vec::new(),
            dropout: 0.,
            seed: None,
        }
    }
}

impl BpeConfig {
    #[inline]
    pub fn with_merges(mut self, merges: usize) -> Self {
        self.merges = Some(merges);
        self
    }

    #[inline]
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    #[inline]
    pub fn with_vocabulary(mut self, vocabulary: Vocabulary) -> Self {
        self.vocabulary = Some(vocabulary);
        self
    }

    pub fn with_glossaries<T: Into<String>>(
        mut self,
        glossaries: impl IntoIterator<Item = T>,
    ) -> Self {
        self.glossaries.extend(glossaries.into_iter().map(Into::into));
        self
    }

    #[inline]
    pub fn with_dropout(mut self, dropout: f64) -> Self {
        self.dropout = dropout;
        self
    }

    #[inline]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}
