/// 记录组格式：人口定义文件
///
/// ```text
/// locations = {
///     stockholm = {
///         define_pop = { type = clergy size = 0.00021 culture = swedish religion = lutheran }
///     }
/// }
/// ```
///
/// 只有包装块 `locations` 内的命名块是拥有记录，其余顶层块原样保留。
use super::block::{expect_key, parse_properties, Properties};
use super::document::{InsertSite, ParsedFile, Record};
use super::lexer::{indent_at, line_start, matching_close, read_value, tokenize, Token, TokenKind};
use super::Dialect;
use crate::model::PopDefinition;
use crate::utils::{parse_decimal, same_key, strip_quotes, ParseError, ParseWarning};

/// 外层包装块的键
pub const WRAPPER_KEY: &str = "locations";
/// 人口记录的键
pub const POP_KEY: &str = "define_pop";

/// 一个地点块的内容
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PopBlock {
    pub pops: Vec<PopDefinition>,
    /// 除 define_pop 之外的条目（原样保留）
    pub extra: Vec<(String, String)>,
}

/// 人口定义解析器
#[derive(Debug, Clone, Copy, Default)]
pub struct PopParser;

impl Dialect for PopParser {
    type Value = PopBlock;

    fn empty(&self) -> ParsedFile<PopBlock> {
        ParsedFile::new(String::new(), Vec::new(), new_wrapper_site(""), Vec::new())
    }

    fn parse(&self, text: &str) -> Result<ParsedFile<PopBlock>, ParseError> {
        let tokens = tokenize(text)?;
        let mut records = Vec::new();
        let mut warnings = Vec::new();
        let mut site = None;
        let mut i = 0;

        while i < tokens.len() {
            let key = expect_key(&tokens, i)?;

            match tokens.get(i + 2) {
                Some(open) if open.kind == TokenKind::Open => {
                    let close = matching_close(&tokens, i + 2)?;
                    if same_key(key.text, WRAPPER_KEY) {
                        parse_wrapper(text, &tokens, i + 3, close, &mut records, &mut warnings)?;
                        site = Some(wrapper_site(text, key, &tokens[close]));
                    }
                    i = close + 1;
                }
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

        let site = site.unwrap_or_else(|| new_wrapper_site(text));
        Ok(ParsedFile::new(text, records, site, warnings))
    }

    fn render(&self, key: &str, value: &PopBlock, indent: &str, newline: &str) -> String {
        if value.pops.is_empty() && value.extra.is_empty() {
            return format!("{} = {{ }}", key);
        }

        let mut text = format!("{} = {{{}", key, newline);
        for pop in &value.pops {
            text.push_str(indent);
            text.push('\t');
            text.push_str(&pop.to_pop_line());
            text.push_str(newline);
        }
        for (k, v) in &value.extra {
            text.push_str(indent);
            text.push('\t');
            text.push_str(&format!("{} = {}", k, v));
            text.push_str(newline);
        }
        text.push_str(indent);
        text.push('}');
        text
    }
}

/// 解析包装块内部 `[start, close)` 区间
fn parse_wrapper(
    text: &str,
    tokens: &[Token<'_>],
    start: usize,
    close: usize,
    records: &mut Vec<Record<PopBlock>>,
    warnings: &mut Vec<ParseWarning>,
) -> Result<(), ParseError> {
    let mut i = start;

    while i < close {
        let key = inner_key(tokens, i, close)?;
        match tokens.get(i + 2) {
            Some(open) if open.kind == TokenKind::Open && i + 2 < close => {
                let block_close = matching_close(tokens, i + 2)?;
                let value = parse_location(&tokens[i + 3..block_close], warnings)?;
                records.push(Record {
                    key: key.text.to_string(),
                    value,
                    span: key.span.start..tokens[block_close].span.end,
                    indent: indent_at(text, key.span.start),
                    line: key.line,
                });
                i = block_close + 1;
            }
            _ => {
                // 包装块内的标量赋值不属于任何地点
                let (_, next) = read_value(tokens, i + 2)?;
                i = next;
            }
        }
    }

    Ok(())
}

fn inner_key<'t, 'a>(
    tokens: &'t [Token<'a>],
    i: usize,
    close: usize,
) -> Result<&'t Token<'a>, ParseError> {
    let token = &tokens[i];
    if !token.is_word() {
        return Err(ParseError::new(
            token.line,
            format!("unexpected '{}' inside '{}'", token.text, WRAPPER_KEY),
        ));
    }
    match tokens.get(i + 1) {
        Some(next) if next.kind == TokenKind::Equals && i + 2 < close => Ok(token),
        _ => Err(ParseError::new(
            token.line,
            format!("missing '=' after key '{}'", token.text),
        )),
    }
}

/// 解析单个地点块的内容
fn parse_location(
    tokens: &[Token<'_>],
    warnings: &mut Vec<ParseWarning>,
) -> Result<PopBlock, ParseError> {
    let mut block = PopBlock::default();
    let mut j = 0;

    while j < tokens.len() {
        let token = &tokens[j];
        if !token.is_word() {
            return Err(ParseError::new(
                token.line,
                format!("unexpected '{}' inside location block", token.text),
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

        if same_key(token.text, POP_KEY) {
            match tokens.get(j + 2) {
                Some(open) if open.kind == TokenKind::Open => {
                    let close = matching_close(tokens, j + 2)?;
                    let props = parse_properties(&tokens[j + 3..close])?;
                    if let Some(pop) = pop_from_properties(&props, token.line, warnings) {
                        block.pops.push(pop);
                    }
                    j = close + 1;
                }
                _ => {
                    let (value, next) = read_value(tokens, j + 2)?;
                    warnings.push(ParseWarning::new(
                        token.line,
                        format!("'{}' without a block skipped: {}", POP_KEY, value),
                    ));
                    j = next;
                }
            }
        } else {
            let (value, next) = read_value(tokens, j + 2)?;
            block.extra.push((token.text.to_string(), value));
            j = next;
        }
    }

    Ok(block)
}

/// 从属性构建人口记录，缺少 type 时跳过
fn pop_from_properties(
    props: &Properties,
    line: usize,
    warnings: &mut Vec<ParseWarning>,
) -> Option<PopDefinition> {
    let field = |name: &str| {
        props
            .iter()
            .find(|(k, _)| same_key(k, name))
            .map(|(_, v)| strip_quotes(v).to_string())
    };

    let Some(pop_type) = field("type").filter(|t| !t.is_empty()) else {
        warnings.push(ParseWarning::new(line, "pop record without 'type' skipped"));
        return None;
    };

    let size = match field("size") {
        Some(raw) => parse_decimal(&raw).unwrap_or_else(|| {
            warnings.push(ParseWarning::new(
                line,
                format!("invalid pop size '{}', using 0", raw),
            ));
            0.0
        }),
        None => {
            warnings.push(ParseWarning::new(
                line,
                format!("pop '{}' has no size, using 0", pop_type),
            ));
            0.0
        }
    };

    let culture = field("culture").unwrap_or_default();
    let religion = field("religion").unwrap_or_default();
    if culture.is_empty() || religion.is_empty() {
        warnings.push(ParseWarning::new(
            line,
            format!("pop '{}' is missing culture or religion", pop_type),
        ));
    }

    Some(PopDefinition::new(pop_type, size, culture, religion))
}

/// 已有包装块：插入到闭合括号所在行之前
fn wrapper_site(text: &str, wrapper: &Token<'_>, close: &Token<'_>) -> InsertSite {
    let close_line = line_start(text, close.span.start);
    let offset = if text[close_line..close.span.start].trim().is_empty() {
        close_line
    } else {
        close.span.start
    };

    InsertSite {
        offset,
        indent: format!("{}\t", indent_at(text, wrapper.span.start)),
        wrapper: None,
    }
}

/// 没有包装块：在文本末尾新建
fn new_wrapper_site(text: &str) -> InsertSite {
    InsertSite {
        offset: text.len(),
        indent: "\t".to_string(),
        wrapper: Some(WRAPPER_KEY.to_string()),
    }
}
