use serde::Serialize;
use std::borrow::Cow;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// 尺寸数值的舍入精度（小数位数）
pub const DECIMAL_PRECISION: usize = 5;

/// 结构性解析错误（括号不平衡、缺少分隔符等）
///
/// 该错误对当前文件是致命的，由调用方附加文件路径后上报。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct ParseError {
    /// 出错位置所在行（从 1 开始）
    pub line: usize,
    /// 错误描述
    pub message: String,
}

impl ParseError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// 非致命解析警告（例如数值字段无法解析，已使用默认值）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseWarning {
    pub line: usize,
    pub message: String,
}

impl ParseWarning {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

/// 自定义错误类型
#[derive(Error, Debug)]
pub enum MapDataError {
    #[error("Structural parse error in {path:?}: {source}")]
    Structure {
        path: PathBuf,
        #[source]
        source: ParseError,
    },

    #[error("Required file not found: {0:?}")]
    MissingFile(PathBuf),

    #[error("A transaction is already in progress")]
    TransactionActive,

    #[error("No transaction in progress")]
    NoTransaction,

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Entity already exists: {0}")]
    DuplicateEntity(String),

    #[error("Name already used by another entity: {0}")]
    DuplicateName(String),

    #[error("Entity was deleted and not yet saved: {0}")]
    EntityDeleted(String),

    #[error("Name is not a single script token: {0:?}")]
    InvalidName(String),

    #[error("Value of '{field}' on {id} cannot be written: {value:?}")]
    InvalidValue {
        id: String,
        field: String,
        value: String,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error on {path:?}: {source}")]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl MapDataError {
    /// 为 IO 错误附加文件路径
    pub fn file_access(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileAccess {
            path: path.into(),
            source,
        }
    }

    /// 为结构性解析错误附加文件路径
    pub fn structure(path: impl Into<PathBuf>, source: ParseError) -> Self {
        Self::Structure {
            path: path.into(),
            source,
        }
    }
}

/// 解析十进制数值，失败返回 None
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let value = strip_quotes(raw).trim().parse::<f64>().ok()?;
    value.is_finite().then_some(value)
}

/// 按固定精度格式化数值，并去除多余的尾随零
///
/// `0.00021` -> `"0.00021"`，`0.0031` -> `"0.0031"`，`1.0` -> `"1"`
pub fn format_decimal(value: f64) -> String {
    let formatted = format!("{:.*}", DECIMAL_PRECISION, value);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');

    match trimmed {
        "" | "-0" => "0".to_string(),
        other => other.to_string(),
    }
}

/// 去除值两侧的双引号
pub fn strip_quotes(value: &str) -> &str {
    let value = value.trim();
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

/// 单词的分隔字符
pub fn is_word_delimiter(byte: u8) -> bool {
    byte.is_ascii_whitespace() || matches!(byte, b'{' | b'}' | b'=' | b'#' | b'"')
}

/// 含分隔符（或为空）的文本加上双引号
pub fn quote_if_needed(text: &str) -> Cow<'_, str> {
    if !text.is_empty() && !text.bytes().any(is_word_delimiter) {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(format!("\"{}\"", text))
    }
}

/// 不区分大小写的键比较
pub fn same_key(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// 键的规范化形式（用于索引）
pub fn fold_key(key: &str) -> String {
    key.to_ascii_lowercase()
}

/// 检测文本使用的换行符
pub fn detect_newline(text: &str) -> &'static str {
    if text.contains("\r\n") {
        "\r\n"
    } else {
        "\n"
    }
}
