/// 文本文件 IO 实现
///
/// 提供基于文件系统的默认读写实现。解码顺序：
/// UTF-8 BOM -> 合法 UTF-8 -> Windows-1252（旧版文件）。
use std::path::Path;

use encoding_rs::{UTF_8, WINDOWS_1252};
use log::warn;

use super::traits::{RawText, TextReader, TextWriter};
use crate::utils::MapDataError;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// 解码字节
pub fn decode(bytes: &[u8]) -> RawText {
    if let Some(rest) = bytes.strip_prefix(UTF8_BOM) {
        let (text, _) = UTF_8.decode_without_bom_handling(rest);
        return RawText {
            text: text.into_owned(),
            encoding: UTF_8,
            bom: true,
        };
    }

    match std::str::from_utf8(bytes) {
        Ok(text) => RawText::utf8(text),
        Err(_) => {
            let (text, _) = WINDOWS_1252.decode_without_bom_handling(bytes);
            RawText {
                text: text.into_owned(),
                encoding: WINDOWS_1252,
                bom: false,
            }
        }
    }
}

/// 按记录的编码编码文本
///
/// 文本中有原编码无法表示的字符时，整个文件改为带 BOM 的 UTF-8，
/// 不写入数字字符引用。
pub fn encode(data: &RawText) -> Vec<u8> {
    let (bytes, _, had_errors) = data.encoding.encode(&data.text);
    if had_errors {
        warn!(
            "text is not representable in {}, writing UTF-8 with BOM instead",
            data.encoding.name()
        );
        let mut output = Vec::with_capacity(data.text.len() + UTF8_BOM.len());
        output.extend_from_slice(UTF8_BOM);
        output.extend_from_slice(data.text.as_bytes());
        return output;
    }

    let mut output = Vec::with_capacity(bytes.len() + UTF8_BOM.len());
    if data.bom && data.encoding == UTF_8 {
        output.extend_from_slice(UTF8_BOM);
    }
    output.extend_from_slice(&bytes);
    output
}

/// 默认的文本文件读取器（基于 std::fs）
#[derive(Debug, Clone, Default)]
pub struct DefaultTextReader;

impl TextReader for DefaultTextReader {
    fn read(&self, path: &Path) -> Result<RawText, MapDataError> {
        let bytes = std::fs::read(path).map_err(|e| MapDataError::file_access(path, e))?;
        Ok(decode(&bytes))
    }
}

/// 默认的文本文件写入器（基于 std::fs）
#[derive(Debug, Clone, Default)]
pub struct DefaultTextWriter;

impl TextWriter for DefaultTextWriter {
    fn write(&self, data: &RawText, path: &Path) -> Result<(), MapDataError> {
        // 确保父目录存在
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| MapDataError::file_access(parent, e))?;
        }

        std::fs::write(path, encode(data)).map_err(|e| MapDataError::file_access(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_bom_round_trip() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("bom.txt");
        std::fs::write(&file, b"\xEF\xBB\xBFstockholm = ABABAB\n").unwrap();

        let raw = DefaultTextReader.read(&file).unwrap();
        assert!(raw.bom);
        assert_eq!(raw.text, "stockholm = ABABAB\n");

        DefaultTextWriter
            .write(&raw.with_text("uppsala = CDCDCD\n"), &file)
            .unwrap();
        assert_eq!(
            std::fs::read(&file).unwrap(),
            b"\xEF\xBB\xBFuppsala = CDCDCD\n".to_vec()
        );
    }

    #[test]
    fn test_windows_1252_fallback() {
        // "Malmö" 的 Windows-1252 编码
        let raw = decode(b"malmo = \"Malm\xF6\"\n");
        assert_eq!(raw.encoding, WINDOWS_1252);
        assert_eq!(raw.text, "malmo = \"Malmö\"\n");
        assert_eq!(encode(&raw), b"malmo = \"Malm\xF6\"\n".to_vec());
    }

    #[test]
    fn test_unrepresentable_text_switches_to_utf8() {
        let raw = decode(b"g\xF6teborg = GHGHGH\n");
        assert_eq!(raw.encoding, WINDOWS_1252);

        let bytes = encode(&raw.with_text("\u{141}\u{f3}d\u{17a} = GHGHGH\n"));
        assert!(bytes.starts_with(UTF8_BOM));
        assert!(!bytes.contains(&b'#'));

        let reread = decode(&bytes);
        assert!(reread.bom);
        assert_eq!(reread.encoding, UTF_8);
        assert_eq!(reread.text, "\u{141}\u{f3}d\u{17a} = GHGHGH\n");
    }

    #[test]
    fn test_writer_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("nested").join("subdir").join("pops.txt");

        DefaultTextWriter
            .write(&RawText::utf8("locations = {\n}\n"), &file)
            .unwrap();
        assert!(file.exists());
    }

    #[test]
    fn test_missing_file_reports_path() {
        let dir = TempDir::new().unwrap();
        let err = DefaultTextReader
            .read(&dir.path().join("missing.txt"))
            .unwrap_err();
        assert!(matches!(err, MapDataError::FileAccess { .. }));
    }
}
