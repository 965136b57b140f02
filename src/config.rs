/// 编辑器配置
///
/// 可以从 JSON 文件加载，也可以由命令行参数构建。
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::utils::MapDataError;

/// 默认备份目录（相对模组目录）
pub const DEFAULT_BACKUP_DIR: &str = ".map_backup";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorConfig {
    /// 游戏本体根目录
    pub base_dir: PathBuf,
    /// 模组根目录（所有写入都发生在这里）
    pub mod_dir: PathBuf,
    /// 事务备份目录，缺省为 `<mod_dir>/.map_backup`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_dir: Option<PathBuf>,
    /// 是否同时读取本体的人口文件（默认只读模组）
    #[serde(default)]
    pub load_base_population: bool,
    /// 是否加载定义缓存
    #[serde(default = "default_true")]
    pub load_definitions: bool,
}

fn default_true() -> bool {
    true
}

impl EditorConfig {
    pub fn new(base_dir: impl Into<PathBuf>, mod_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            mod_dir: mod_dir.into(),
            backup_dir: None,
            load_base_population: false,
            load_definitions: true,
        }
    }

    /// 从 JSON 文件加载
    pub fn from_json_file(path: &Path) -> Result<Self, MapDataError> {
        let text = std::fs::read_to_string(path).map_err(|e| MapDataError::file_access(path, e))?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, MapDataError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), MapDataError> {
        if self.base_dir.as_os_str().is_empty() {
            return Err(MapDataError::Config("base_dir is empty".to_string()));
        }
        if self.mod_dir.as_os_str().is_empty() {
            return Err(MapDataError::Config("mod_dir is empty".to_string()));
        }
        Ok(())
    }

    /// 实际使用的备份目录
    pub fn backup_dir(&self) -> PathBuf {
        self.backup_dir
            .clone()
            .unwrap_or_else(|| self.mod_dir.join(DEFAULT_BACKUP_DIR))
    }
}
