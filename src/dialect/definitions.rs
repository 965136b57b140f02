/// 定义文件扫描
///
/// 只收集顶层块的键（如文化、宗教、地形的名称），用于自动补全与提示。
/// 可选的类别过滤：只保留块内任意深度出现 `category = <过滤值>` 的键，
/// 该判断在花括号深度回到 0 时做出。
use std::collections::HashSet;

use super::lexer::{tokenize, Token, TokenKind};
use crate::utils::{fold_key, same_key, strip_quotes, ParseError};

/// 定义扫描器
#[derive(Debug, Clone, Default)]
pub struct DefinitionParser {
    category_filter: Option<String>,
}

impl DefinitionParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// 只保留指定类别的定义
    pub fn with_category(category: impl Into<String>) -> Self {
        Self {
            category_filter: Some(category.into()),
        }
    }

    pub fn category_filter(&self) -> Option<&str> {
        self.category_filter.as_deref()
    }

    /// 扫描文本，返回顶层块键（按首次出现顺序，去重）
    ///
    /// 除未闭合的花括号外，其他不规范内容都被容忍。
    pub fn parse(&self, text: &str) -> Result<Vec<String>, ParseError> {
        let tokens = tokenize(text)?;
        let mut keys: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        let mut depth = 0usize;
        let mut current: Option<(&str, usize)> = None;
        let mut matched = false;

        for (i, token) in tokens.iter().enumerate() {
            match token.kind {
                TokenKind::Open => {
                    if depth == 0 {
                        current = block_key(&tokens, i).map(|key| (key, token.line));
                        matched = false;
                    }
                    depth += 1;
                }
                TokenKind::Close => {
                    if depth == 0 {
                        // 多余的 `}`：忽略
                        continue;
                    }
                    depth -= 1;
                    if depth == 0 {
                        if let Some((key, _)) = current.take() {
                            let accepted = self.category_filter.is_none() || matched;
                            if accepted && seen.insert(fold_key(key)) {
                                keys.push(key.to_string());
                            }
                        }
                    }
                }
                TokenKind::Word if depth > 0 && same_key(token.text, "category") => {
                    if let Some(filter) = &self.category_filter {
                        let is_assignment = tokens
                            .get(i + 1)
                            .is_some_and(|t| t.kind == TokenKind::Equals);
                        let value = tokens.get(i + 2).filter(|t| t.is_word());
                        if let (true, Some(value)) = (is_assignment, value) {
                            if same_key(strip_quotes(value.text), filter) {
                                matched = true;
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        if depth > 0 {
            let line = current.map_or(0, |(_, line)| line);
            return Err(ParseError::new(
                line,
                "unbalanced braces: block opened here is never closed",
            ));
        }

        Ok(keys)
    }
}

/// `{` 前面是 `KEY =` 时返回 KEY
fn block_key<'a>(tokens: &[Token<'a>], open: usize) -> Option<&'a str> {
    if open < 2 {
        return None;
    }
    let (key, eq) = (&tokens[open - 2], &tokens[open - 1]);
    (key.is_word() && eq.kind == TokenKind::Equals).then_some(key.text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOODS: &str = "\
wheat = {
    category = raw_material
    method = farming
}
tools = {
    category = produced
    input = { iron = 1 }
}
iron = {
    color = { 10 10 10 }
    info = { category = \"raw_material\" }
}
";

    #[test]
    fn test_collects_top_level_keys() {
        let keys = DefinitionParser::new().parse(GOODS).unwrap();
        assert_eq!(keys, vec!["wheat", "tools", "iron"]);
    }

    #[test]
    fn test_category_filter_any_depth() {
        let keys = DefinitionParser::with_category("raw_material")
            .parse(GOODS)
            .unwrap();
        assert_eq!(keys, vec!["wheat", "iron"]);
    }

    #[test]
    fn test_tolerates_junk_but_not_unbalanced() {
        let keys = DefinitionParser::new()
            .parse("}\nlooseword\nswedish = { }\nswedish = { }\n")
            .unwrap();
        assert_eq!(keys, vec!["swedish"]);

        let err = DefinitionParser::new().parse("norse = {\n").unwrap_err();
        assert_eq!(err.line, 1);
    }
}
