/// 解析结果容器
///
/// 所有语法的解析结果都落在 `ParsedFile<T>` 中：源文本、拥有的记录列表、
/// 新记录的插入位置、换行风格以及非致命警告。
/// 记录区间以外的文本都属于"非拥有文本"，合并写回时逐字节保留。
use std::collections::HashMap;
use std::ops::Range;

use indexmap::IndexMap;

use crate::utils::{detect_newline, fold_key, ParseWarning};

/// 文件中的一条拥有记录
#[derive(Debug, Clone, PartialEq)]
pub struct Record<T> {
    /// 键（保留原始拼写）
    pub key: String,
    /// 解析后的值
    pub value: T,
    /// 记录在源文本中的字节区间（从键开始，到值结束）
    pub span: Range<usize>,
    /// 记录起始行的缩进
    pub indent: String,
    /// 起始行号
    pub line: usize,
}

/// 新记录的插入位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertSite {
    /// 插入偏移（总在行首或文本末尾）
    pub offset: usize,
    /// 新记录使用的缩进
    pub indent: String,
    /// 文件中缺少外层包装块时需要新建的包装键
    pub wrapper: Option<String>,
}

impl InsertSite {
    /// 文本末尾、无缩进
    pub fn end_of(text: &str) -> Self {
        Self {
            offset: text.len(),
            indent: String::new(),
            wrapper: None,
        }
    }
}

/// 解析后的文件
#[derive(Debug, Clone)]
pub struct ParsedFile<T> {
    source: String,
    records: Vec<Record<T>>,
    site: InsertSite,
    newline: &'static str,
    warnings: Vec<ParseWarning>,
    /// 规范化键 -> 最后一条同键记录的下标
    index: HashMap<String, usize>,
}

impl<T> ParsedFile<T> {
    pub fn new(
        source: impl Into<String>,
        records: Vec<Record<T>>,
        site: InsertSite,
        warnings: Vec<ParseWarning>,
    ) -> Self {
        let source = source.into();
        let newline = detect_newline(&source);
        let index = records
            .iter()
            .enumerate()
            .map(|(i, record)| (fold_key(&record.key), i))
            .collect();

        Self {
            source,
            records,
            site,
            newline,
            warnings,
            index,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn records(&self) -> &[Record<T>] {
        &self.records
    }

    pub fn site(&self) -> &InsertSite {
        &self.site
    }

    pub fn newline(&self) -> &'static str {
        self.newline
    }

    pub fn warnings(&self) -> &[ParseWarning] {
        &self.warnings
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 按键查找（不区分大小写，重复键取最后一条）
    pub fn get(&self, key: &str) -> Option<&T> {
        self.index
            .get(&fold_key(key))
            .map(|&i| &self.records[i].value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(&fold_key(key))
    }

    /// 文件中出现的所有键（按出现顺序，包含重复）
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.key.as_str())
    }

    /// 去重后的键值映射，重复键以最后一次赋值为准
    pub fn to_map(&self) -> IndexMap<String, T>
    where
        T: Clone,
    {
        self.records
            .iter()
            .enumerate()
            .filter(|(i, record)| self.index.get(&fold_key(&record.key)) == Some(i))
            .map(|(_, record)| (record.key.clone(), record.value.clone()))
            .collect()
    }

    /// 取出全部记录（消耗自身）
    pub fn into_records(self) -> Vec<Record<T>> {
        self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: &str, value: &str, start: usize) -> Record<String> {
        Record {
            key: key.to_string(),
            value: value.to_string(),
            span: start..start + 1,
            indent: String::new(),
            line: 1,
        }
    }

    #[test]
    fn test_last_duplicate_wins() {
        let file = ParsedFile::new(
            "",
            vec![record("Paris", "A", 0), record("rome", "B", 2), record("paris", "C", 4)],
            InsertSite::end_of(""),
            Vec::new(),
        );

        assert_eq!(file.get("PARIS"), Some(&"C".to_string()));
        assert!(file.contains("Rome"));
        assert_eq!(file.keys().count(), 3);

        let map = file.to_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("rome"), Some(&"B".to_string()));
        assert_eq!(map.get("paris"), Some(&"C".to_string()));
    }

    #[test]
    fn test_newline_detection() {
        let file: ParsedFile<String> =
            ParsedFile::new("a = b\r\n", Vec::new(), InsertSite::end_of(""), Vec::new());
        assert_eq!(file.newline(), "\r\n");
        assert!(file.is_empty());
    }
}
