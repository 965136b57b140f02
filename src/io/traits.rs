/// IO 抽象层 - trait 定义
///
/// 该模块定义了文本文件读写的抽象接口，支持依赖注入和测试 mock。
/// 遵循依赖倒置原则（DIP），面向接口编程。
use std::path::Path;

use encoding_rs::{Encoding, UTF_8};

use crate::utils::MapDataError;

/// 已解码的文本文件
///
/// 记录读取时检测到的编码与 BOM，写回时按原样还原。
#[derive(Debug, Clone, PartialEq)]
pub struct RawText {
    /// 解码后的文本
    pub text: String,
    /// 文件编码
    pub encoding: &'static Encoding,
    /// 是否带 UTF-8 BOM
    pub bom: bool,
}

impl RawText {
    /// 新文件：UTF-8，无 BOM
    pub fn utf8(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            encoding: UTF_8,
            bom: false,
        }
    }

    /// 替换文本内容，保留编码信息
    pub fn with_text(&self, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            encoding: self.encoding,
            bom: self.bom,
        }
    }
}

/// 文本文件读取 trait
///
/// # 职责
/// - 从文件系统读取并解码文本
/// - 不负责解析，仅负责 IO
pub trait TextReader {
    /// 读取文本文件
    ///
    /// # 参数
    /// * `path` - 文件路径
    fn read(&self, path: &Path) -> Result<RawText, MapDataError>;
}

/// 文本文件写入 trait
///
/// # 职责
/// - 将文本按记录的编码写入文件系统
/// - 不负责序列化，仅负责 IO
pub trait TextWriter {
    /// 写入文本文件
    ///
    /// # 参数
    /// * `data` - 要写入的文本
    /// * `path` - 目标文件路径
    fn write(&self, data: &RawText, path: &Path) -> Result<(), MapDataError>;
}
