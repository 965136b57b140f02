/// 平面键值格式：每行一条 `KEY = VALUE`
///
/// 典型文件为 named_locations（名称 -> 颜色标识）。
/// 注释与空行忽略；没有 `=` 的行跳过并记录警告；重复键以最后一条为准。
use super::document::{InsertSite, ParsedFile, Record};
use super::Dialect;
use crate::utils::{ParseError, ParseWarning};

/// 平面键值解析器
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyValueParser;

impl Dialect for KeyValueParser {
    type Value = String;

    fn empty(&self) -> ParsedFile<String> {
        ParsedFile::new(String::new(), Vec::new(), InsertSite::end_of(""), Vec::new())
    }

    fn parse(&self, text: &str) -> Result<ParsedFile<String>, ParseError> {
        let mut records = Vec::new();
        let mut warnings = Vec::new();
        let mut offset = 0;

        for (index, raw_line) in text.split_inclusive('\n').enumerate() {
            let line_no = index + 1;
            let line_offset = offset;
            offset += raw_line.len();

            let content = strip_comment(raw_line);
            if content.trim().is_empty() {
                continue;
            }

            let Some(eq) = content.find('=') else {
                warnings.push(ParseWarning::new(
                    line_no,
                    format!("line without '=' skipped: {}", content.trim()),
                ));
                continue;
            };

            let key = content[..eq].trim();
            let value = content[eq + 1..].trim();
            if key.is_empty() || value.is_empty() {
                warnings.push(ParseWarning::new(
                    line_no,
                    format!("incomplete assignment skipped: {}", content.trim()),
                ));
                continue;
            }

            let key_start = content.len() - content.trim_start().len();
            let value_end = content.trim_end().len();
            records.push(Record {
                key: key.to_string(),
                value: value.to_string(),
                span: line_offset + key_start..line_offset + value_end,
                indent: content[..key_start].to_string(),
                line: line_no,
            });
        }

        Ok(ParsedFile::new(text, records, InsertSite::end_of(text), warnings))
    }

    fn render(&self, key: &str, value: &String, _indent: &str, _newline: &str) -> String {
        format!("{} = {}", key, value)
    }
}

/// 去掉引号外的 `#` 注释
fn strip_comment(line: &str) -> &str {
    let mut in_quotes = false;
    for (i, c) in line.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '#' if !in_quotes => return &line[..i],
            _ => {}
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_basic() {
        let text = "# header\nstockholm = ABABAB\n\n  uppsala=CDCDCD # trailing\n";
        let file = KeyValueParser.parse(text).unwrap();

        assert_eq!(file.len(), 2);
        assert_eq!(file.get("stockholm"), Some(&"ABABAB".to_string()));
        assert_eq!(file.get("UPPSALA"), Some(&"CDCDCD".to_string()));

        let record = &file.records()[1];
        assert_eq!(&text[record.span.clone()], "uppsala=CDCDCD");
        assert_eq!(record.indent, "  ");
        assert_eq!(record.line, 4);
    }

    #[test]
    fn test_line_without_separator_is_skipped() {
        let file = KeyValueParser.parse("a = 1\ngarbage\nb = 2\n").unwrap();
        assert_eq!(file.len(), 2);
        assert_eq!(file.warnings().len(), 1);
        assert_eq!(file.warnings()[0].line, 2);
    }

    #[test]
    fn test_duplicate_key_last_wins() {
        let file = KeyValueParser.parse("a = 1\na = 2\n").unwrap();
        assert_eq!(file.get("a"), Some(&"2".to_string()));
        assert_eq!(file.to_map().len(), 1);
    }

    #[test]
    fn test_quoted_hash_is_not_comment() {
        let file = KeyValueParser.parse("a = \"x#y\" # note\n").unwrap();
        assert_eq!(file.get("a"), Some(&"\"x#y\"".to_string()));
    }

    #[test]
    fn test_serialize_then_parse() {
        let text = KeyValueParser.serialize(vec![
            ("stockholm".to_string(), "ABABAB".to_string()),
            ("uppsala".to_string(), "CDCDCD".to_string()),
        ]);
        assert_eq!(text, "stockholm = ABABAB\nuppsala = CDCDCD\n");

        let file = KeyValueParser.parse(&text).unwrap();
        assert_eq!(file.to_map().len(), 2);
    }

    #[test]
    fn test_crlf_span_excludes_carriage_return() {
        let text = "a = 1\r\nb = 2\r\n";
        let file = KeyValueParser.parse(text).unwrap();
        assert_eq!(&text[file.records()[0].span.clone()], "a = 1");
    }
}
