/// 脚本方言解析与序列化
///
/// 游戏数据使用以花括号分隔、以空白分词的 `key = value` 方言。
/// 本模块提供三种文件形态的解析器，以及保留未知内容的合并式写回。
///
/// # 架构设计
///
/// - **lexer**: 记号扫描与显式花括号深度计数
/// - **document**: 统一的解析结果 `ParsedFile<T>`
/// - **key_value**: 平面 `KEY = VALUE` 形态
/// - **block**: 单层属性块 `KEY = { prop = val }` 形态
/// - **pops**: `locations = { name = { define_pop = {...} } }` 记录组形态
/// - **definitions**: 定义文件的顶层键扫描（可按类别过滤）
/// - **merge**: 把编辑合并进现有文本
///
/// # 使用示例
///
/// ```rust,ignore
/// use eu5_mapdata::dialect::{Dialect, Edit, KeyValueParser};
///
/// let file = KeyValueParser.parse("stockholm = ABABAB\n")?;
/// let result = KeyValueParser.merge(&file, vec![Edit::upsert("uppsala", "CDCDCD".to_string())]);
/// assert_eq!(result.text, "stockholm = ABABAB\nuppsala = CDCDCD\n");
/// ```
pub mod block;
pub mod definitions;
pub mod document;
pub mod key_value;
pub mod lexer;
pub mod merge;
pub mod pops;

// === 导出公共接口 ===
pub use block::{BlockParser, Properties};
pub use definitions::DefinitionParser;
pub use document::{InsertSite, ParsedFile, Record};
pub use key_value::KeyValueParser;
pub use merge::{Edit, MergeResult};
pub use pops::{PopBlock, PopParser};

use crate::utils::ParseError;

/// 一种文件形态的解析器 + 序列化器
pub trait Dialect {
    /// 记录值类型
    type Value: Clone + PartialEq;

    /// 空文件（决定新文件的插入位置与包装块）
    fn empty(&self) -> ParsedFile<Self::Value>;

    /// 解析文本；结构错误是致命的
    fn parse(&self, text: &str) -> Result<ParsedFile<Self::Value>, ParseError>;

    /// 渲染单条记录
    ///
    /// 首行不带缩进（由调用方放置），后续行使用 `indent`。
    fn render(&self, key: &str, value: &Self::Value, indent: &str, newline: &str) -> String;

    /// 把编辑合并进已解析的文件
    fn merge(
        &self,
        file: &ParsedFile<Self::Value>,
        edits: Vec<Edit<Self::Value>>,
    ) -> MergeResult {
        merge::merge(self, file, edits)
    }

    /// 从零生成完整文件
    fn serialize(&self, records: Vec<(String, Self::Value)>) -> String {
        let edits = records
            .into_iter()
            .map(|(key, value)| Edit::upsert(key, value))
            .collect();
        self.merge(&self.empty(), edits).text
    }
}
