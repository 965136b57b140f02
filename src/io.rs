/// IO 抽象层模块
///
/// 该模块提供了文本文件读写的抽象接口，遵循依赖倒置原则。
/// 支持依赖注入、测试 mock 和替换 IO 实现（如内存 IO、故障注入等）。
///
/// # 架构设计
///
/// - **traits**: 定义 Reader/Writer trait 接口
/// - **text_io**: 基于文件系统与 encoding_rs 的默认实现
///
/// # 使用示例
///
/// ```rust,ignore
/// use eu5_mapdata::io::{DefaultTextReader, TextReader};
///
/// let reader = DefaultTextReader;
/// let raw = reader.read(Path::new("location_templates.txt"))?;
/// println!("{} ({})", raw.text.len(), raw.encoding.name());
/// ```
pub mod text_io;
pub mod traits;

// === 导出 trait 定义 ===
pub use traits::{RawText, TextReader, TextWriter};

// === 导出默认实现 ===
pub use text_io::{decode, encode, DefaultTextReader, DefaultTextWriter};
