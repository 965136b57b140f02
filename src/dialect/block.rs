/// 单层属性块格式：`KEY = { prop = val ... }`
///
/// 典型文件为 location_templates。块体可以跨行；属性值中的嵌套 `{}`
/// 作为不透明文本保留。顶层的标量赋值属于非拥有文本，原样保留。
use indexmap::IndexMap;

use super::document::{InsertSite, ParsedFile, Record};
use super::lexer::{indent_at, matching_close, read_value, tokenize, Token, TokenKind};
use super::Dialect;
use crate::utils::ParseError;

/// 块内属性（保序）
pub type Properties = IndexMap<String, String>;

/// 单层属性块解析器
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockParser;

impl Dialect for BlockParser {
    type Value = Properties;

    fn empty(&self) -> ParsedFile<Properties> {
        ParsedFile::new(String::new(), Vec::new(), InsertSite::end_of(""), Vec::new())
    }

    fn parse(&self, text: &str) -> Result<ParsedFile<Properties>, ParseError> {
        let tokens = tokenize(text)?;
        let mut records = Vec::new();
        let mut i = 0;

        while i < tokens.len() {
            let key = expect_key(&tokens, i)?;

            match tokens.get(i + 2) {
                Some(token) if token.kind == TokenKind::Open => {
                    let close = matching_close(&tokens, i + 2)?;
                    let value = parse_properties(&tokens[i + 3..close])?;
                    records.push(Record {
                        key: key.text.to_string(),
                        value,
                        span: key.span.start..tokens[close].span.end,
                        indent: indent_at(text, key.span.start),
                        line: key.line,
                    });
                    i = close + 1;
                }
                // 顶层标量或带标签值：非拥有文本
                Some(_) => {
                    let (_, next) = read_value(&tokens, i + 2)?;
                    i = next;
                }
                None => {
                    return Err(ParseError::new(
                        key.line,
                        format!("missing value after '{} ='", key.text),
                    ))
                }
            }
        }

        Ok(ParsedFile::new(text, records, InsertSite::end_of(text), Vec::new()))
    }

    fn render(&self, key: &str, value: &Properties, _indent: &str, _newline: &str) -> String {
        if value.is_empty() {
            return format!("{} = {{ }}", key);
        }
        let body = value
            .iter()
            .map(|(k, v)| format!("{} = {}", k, v))
            .collect::<Vec<_>>()
            .join(" ");
        format!("{} = {{ {} }}", key, body)
    }
}

/// 检查 `i` 处为 `KEY =`，返回键记号
pub(crate) fn expect_key<'t, 'a>(
    tokens: &'t [Token<'a>],
    i: usize,
) -> Result<&'t Token<'a>, ParseError> {
    let token = &tokens[i];
    match token.kind {
        TokenKind::Word => {}
        TokenKind::Close => {
            return Err(ParseError::new(token.line, "unexpected '}' at top level"))
        }
        TokenKind::Open => {
            return Err(ParseError::new(token.line, "unexpected '{' without a key"))
        }
        TokenKind::Equals => {
            return Err(ParseError::new(token.line, "unexpected '=' without a key"))
        }
    }

    match tokens.get(i + 1) {
        Some(next) if next.kind == TokenKind::Equals => Ok(token),
        _ => Err(ParseError::new(
            token.line,
            format!("missing '=' after key '{}'", token.text),
        )),
    }
}

/// 解析块体内的 `prop = val` 序列，重复属性以最后一次为准
pub(crate) fn parse_properties(tokens: &[Token<'_>]) -> Result<Properties, ParseError> {
    let mut props = Properties::new();
    let mut j = 0;

    while j < tokens.len() {
        let token = &tokens[j];
        if !token.is_word() {
            return Err(ParseError::new(
                token.line,
                format!("unexpected '{}' inside block", token.text),
            ));
        }
        match tokens.get(j + 1) {
            Some(next) if next.kind == TokenKind::Equals => {}
            _ => {
                return Err(ParseError::new(
                    token.line,
                    format!("missing '=' after '{}'", token.text),
                ))
            }
        }
        let (value, next) = read_value(tokens, j + 2)?;
        props.insert(token.text.to_string(), value);
        j = next;
    }

    Ok(props)
}
