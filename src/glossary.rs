use crate::{bpe::is_blank, Result};
use regex::Regex;

/// 一个受保护的词汇表项，它的匹配不会被 BPE 拆分。
///
/// 模式按正则表达式解释，包含元字符时具有正则语义。
/// 整词匹配把模式放在非捕获组中再锚定，即 `^(?:p)$`，
/// 因此顶层的 `|` 作用于整个词：`a|b` 不会整词匹配 `ab`，`ab` 被切为 `a`、`b`。
#[derive(Clone, Debug)]
pub struct Glossary {
    /// 整词匹配
    whole: Regex,
    /// 子串匹配
    search: Regex,
}

impl Glossary {
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(Self {
            whole: Regex::new(&format!("^(?:{pattern})$"))?,
            search: Regex::new(pattern)?,
        })
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        self.search.as_str()
    }
}

/// 把词中出现的 `glossary` 隔离为独立的片段。
///
/// 例如对 `USA` 和 `1934USABUSA` 产生 `["1934", "USA", "B", "USA"]`。
pub fn isolate_glossary<'w>(word: &'w str, glossary: &Glossary) -> Vec<&'w str> {
    if glossary.whole.is_match(word) || !glossary.search.is_match(word) {
        return vec![word];
    }

    let mut segments = Vec::new();
    let mut start = 0;
    for m in glossary.search.find_iter(word) {
        if m.start() > start {
            segments.push(&word[start..m.start()]);
        }
        if !m.is_empty() {
            segments.push(m.as_str());
        }
        start = m.end();
    }
    // 最后一次匹配之后的部分去掉首尾空白，为空则丢弃
    let ending = word[start..].trim_matches(is_blank);
    if !ending.is_empty() {
        segments.push(ending);
    }
    segments
}

/// 把所有受保护项的整词匹配合并为一个正则表达式。
pub(crate) fn build_pattern<T: AsRef<str>>(
    glossaries: impl IntoIterator<Item = T>,
) -> Result<Option<Regex>> {
    let mut pattern = String::new();
    for g in glossaries {
        pattern.push_str(g.as_ref());
        pattern.push('|');
    }
    if pattern.pop().is_none() {
        return Ok(None);
    }
    Ok(Some(Regex::new(&format!("^(?:{pattern})$"))?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn isolate<'w>(word: &'w str, pattern: &str) -> Vec<&'w str> {
        isolate_glossary(word, &Glossary::new(pattern).unwrap())
    }

    #[test]
    fn isolate_usa() {
        assert_eq!(isolate("1934USABUSA", "USA"), ["1934", "USA", "B", "USA"]);
    }

    #[test]
    fn unchanged_when_whole_or_absent() {
        assert_eq!(isolate("USA", "USA"), ["USA"]);
        assert_eq!(isolate("Canada", "USA"), ["Canada"]);
    }

    #[test]
    fn boundaries_and_adjacent_matches() {
        assert_eq!(isolate("USAUSAx", "USA"), ["USA", "USA", "x"]);
        assert_eq!(isolate("xUSA", "USA"), ["x", "USA"]);
    }

    #[test]
    fn regex_semantics() {
        assert_eq!(isolate("a1b22c", "[0-9]+"), ["a", "1", "b", "22", "c"]);
        assert_eq!(isolate("2024", "[0-9]+"), ["2024"]);
        // `.` 匹配任意字符
        assert_eq!(isolate("a.b", "."), ["a", ".", "b"]);
    }

    #[test]
    fn whole_word_pattern() {
        assert!(build_pattern(Vec::<String>::new()).unwrap().is_none());
        let re = build_pattern(["USA", "[0-9]+"]).unwrap().unwrap();
        assert!(re.is_match("USA"));
        assert!(re.is_match("1934"));
        assert!(!re.is_match("1934USA"));
        assert!(!re.is_match("USAB"));
    }

    #[test]
    fn top_level_alternation_is_anchored_as_a_unit() {
        assert_eq!(isolate("ab", "a|b"), ["a", "b"]);
        assert_eq!(isolate("a", "a|b"), ["a"]);
    }

    #[test]
    fn pattern_text() {
        assert_eq!(Glossary::new("[0-9]+").unwrap().as_str(), "[0-9]+");
    }

    #[test]
    fn invalid_pattern() {
        assert!(Glossary::new("(unclosed").is_err());
        assert!(build_pattern(["(unclosed"]).is_err());
    }
}
