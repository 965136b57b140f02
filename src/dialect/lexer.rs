/// 词法扫描
///
/// 对整段文本做一次前向扫描，产出带字节区间与行号的记号。
/// `#` 到行尾为注释（引号内除外），不产出记号。
/// 花括号深度由各语法解析器基于记号序列显式计数。
use std::ops::Range;

use crate::utils::{is_word_delimiter, ParseError};

/// 记号类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// `{`
    Open,
    /// `}`
    Close,
    /// `=`
    Equals,
    /// 普通单词或带引号的字符串（保留引号）
    Word,
}

/// 记号
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    /// 在源文本中的字节区间
    pub span: Range<usize>,
    /// 所在行（从 1 开始）
    pub line: usize,
}

impl Token<'_> {
    pub fn is_word(&self) -> bool {
        self.kind == TokenKind::Word
    }
}

/// 将文本切分为记号
///
/// 唯一的失败情况是未闭合的引号。
pub fn tokenize(text: &str) -> Result<Vec<Token<'_>>, ParseError> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut pos = 0;

    while pos < bytes.len() {
        let byte = bytes[pos];
        match byte {
            b'\n' => {
                line += 1;
                pos += 1;
            }
            b if b.is_ascii_whitespace() => pos += 1,
            b'#' => {
                // 注释：跳到行尾（换行符留给下一轮计数）
                while pos < bytes.len() && bytes[pos] != b'\n' {
                    pos += 1;
                }
            }
            b'{' | b'}' | b'=' => {
                let kind = match byte {
                    b'{' => TokenKind::Open,
                    b'}' => TokenKind::Close,
                    _ => TokenKind::Equals,
                };
                tokens.push(Token {
                    kind,
                    text: &text[pos..pos + 1],
                    span: pos..pos + 1,
                    line,
                });
                pos += 1;
            }
            b'"' => {
                let start = pos;
                let start_line = line;
                pos += 1;
                while pos < bytes.len() && bytes[pos] != b'"' {
                    if bytes[pos] == b'\n' {
                        line += 1;
                    }
                    pos += 1;
                }
                if pos >= bytes.len() {
                    return Err(ParseError::new(start_line, "unterminated quoted string"));
                }
                pos += 1;
                tokens.push(Token {
                    kind: TokenKind::Word,
                    text: &text[start..pos],
                    span: start..pos,
                    line: start_line,
                });
            }
            _ => {
                let start = pos;
                while pos < bytes.len() && !is_word_delimiter(bytes[pos]) {
                    pos += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Word,
                    text: &text[start..pos],
                    span: start..pos,
                    line,
                });
            }
        }
    }

    Ok(tokens)
}

/// 查找与 `open` 处 `{` 匹配的 `}` 的下标
///
/// 深度计数器逐个记号前进，扫描到末尾仍未归零即为结构错误。
pub fn matching_close(tokens: &[Token<'_>], open: usize) -> Result<usize, ParseError> {
    match tokens.get(open) {
        Some(token) if token.kind == TokenKind::Open => {}
        Some(token) => {
            return Err(ParseError::new(
                token.line,
                format!("expected '{{' but found '{}'", token.text),
            ))
        }
        None => return Err(ParseError::new(0, "expected '{' at end of input")),
    }

    let mut depth = 0usize;
    for (index, token) in tokens.iter().enumerate().skip(open) {
        match token.kind {
            TokenKind::Open => depth += 1,
            TokenKind::Close => {
                depth -= 1;
                if depth == 0 {
                    return Ok(index);
                }
            }
            _ => {}
        }
    }

    let line = tokens.get(open).map_or(0, |t| t.line);
    Err(ParseError::new(
        line,
        "unbalanced braces: block opened here is never closed",
    ))
}

/// 将记号序列还原为单行文本（用于保存嵌套值）
pub fn join_tokens(tokens: &[Token<'_>]) -> String {
    tokens
        .iter()
        .map(|t| t.text)
        .collect::<Vec<_>>()
        .join(" ")
}

/// 读取 `key = ` 之后的值，返回（值文本，下一个记号下标）
///
/// 支持三种形式：单词、`{ ... }` 块、以及 `tag { ... }` 形式的带标签块。
/// 块值以记号还原后的单行文本保存，注释不会被带入。
pub fn read_value(tokens: &[Token<'_>], index: usize) -> Result<(String, usize), ParseError> {
    let Some(token) = tokens.get(index) else {
        let line = tokens.last().map_or(0, |t| t.line);
        return Err(ParseError::new(line, "missing value after '='"));
    };

    match token.kind {
        TokenKind::Word => match tokens.get(index + 1) {
            Some(next) if next.kind == TokenKind::Open => {
                let close = matching_close(tokens, index + 1)?;
                Ok((join_tokens(&tokens[index..=close]), close + 1))
            }
            _ => Ok((token.text.to_string(), index + 1)),
        },
        TokenKind::Open => {
            let close = matching_close(tokens, index)?;
            Ok((join_tokens(&tokens[index..=close]), close + 1))
        }
        TokenKind::Close | TokenKind::Equals => Err(ParseError::new(
            token.line,
            format!("unexpected '{}' where a value was expected", token.text),
        )),
    }
}

/// 文本是否恰好是一个单词记号（可带引号），可直接用作键
pub fn is_single_word(text: &str) -> bool {
    match tokenize(text) {
        Ok(tokens) => {
            tokens.len() == 1 && tokens[0].is_word() && tokens[0].span == (0..text.len())
        }
        Err(_) => false,
    }
}

/// 文本是否恰好构成一个值，写回 `key = <text>` 后能被原样读出
///
/// 记号之间只允许空白，注释会吞掉后续内容。
pub fn is_single_value(text: &str) -> bool {
    let Ok(tokens) = tokenize(text) else {
        return false;
    };
    match read_value(&tokens, 0) {
        Ok((_, next)) if next == tokens.len() => {}
        _ => return false,
    }

    let mut cursor = 0;
    for token in &tokens {
        if !text[cursor..token.span.start].trim().is_empty() {
            return false;
        }
        cursor = token.span.end;
    }
    text[cursor..].trim().is_empty()
}

/// 行首位置
pub fn line_start(text: &str, pos: usize) -> usize {
    text[..pos].rfind('\n').map_or(0, |i| i + 1)
}

/// 行尾位置（指向换行符，或文本末尾）
pub fn line_end(text: &str, pos: usize) -> usize {
    text[pos..].find('\n').map_or(text.len(), |i| pos + i)
}

/// `pos` 所在行的前导缩进
pub fn indent_at(text: &str, pos: usize) -> String {
    let start = line_start(text, pos);
    text[start..pos]
        .chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .collect()
}
