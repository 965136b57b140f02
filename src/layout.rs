/// 目录布局
///
/// 把文件类别映射到游戏/模组根目录下的具体文件。候选文件按文件名排序：
/// 加载时依次读取（后读的覆盖先读的），保存时写入第一个候选，
/// 没有候选时写入默认文件名。
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::cache::ValueListKind;

/// 文件类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileCategory {
    /// 名称 -> 标识（平面键值）
    NamedLocations,
    /// 地理属性（单层属性块）
    LocationTemplates,
    /// 人口定义（记录组）
    Population,
    /// 定义文件（自动补全用）
    ValueList(ValueListKind),
}

/// 路径解析接口
pub trait PathResolver {
    /// 某类别在根目录下的全部候选文件（按文件名排序）
    fn candidates(&self, root: &Path, category: FileCategory) -> Vec<PathBuf>;

    /// 没有候选时保存使用的文件
    fn default_path(&self, root: &Path, category: FileCategory) -> PathBuf;

    /// 保存目标：第一个候选或默认文件
    fn save_target(&self, root: &Path, category: FileCategory) -> PathBuf {
        self.candidates(root, category)
            .into_iter()
            .next()
            .unwrap_or_else(|| self.default_path(root, category))
    }
}

pub const NAMED_LOCATIONS_DIR: &str = "in_game/map_data/named_locations";
pub const LOCATION_TEMPLATES_FILE: &str = "in_game/map_data/location_templates.txt";
pub const POPULATION_DIR: &str = "main_menu/setup/start";
pub const COMMON_DIR: &str = "in_game/common";

/// 游戏默认目录布局
#[derive(Debug, Clone, Copy, Default)]
pub struct GameLayout;

impl GameLayout {
    fn list_txt(dir: &Path, name_filter: impl Fn(&str) -> bool) -> Vec<PathBuf> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(_) => {
                debug!("directory not found: {:?}", dir);
                return Vec::new();
            }
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|name| {
                        name.to_ascii_lowercase().ends_with(".txt") && name_filter(name)
                    })
            })
            .collect();

        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        files
    }
}

impl PathResolver for GameLayout {
    fn candidates(&self, root: &Path, category: FileCategory) -> Vec<PathBuf> {
        match category {
            FileCategory::NamedLocations => {
                Self::list_txt(&root.join(NAMED_LOCATIONS_DIR), |_| true)
            }
            FileCategory::LocationTemplates => {
                let path = root.join(LOCATION_TEMPLATES_FILE);
                if path.is_file() {
                    vec![path]
                } else {
                    Vec::new()
                }
            }
            FileCategory::Population => Self::list_txt(&root.join(POPULATION_DIR), |name| {
                name.to_ascii_lowercase().contains("pops")
            }),
            FileCategory::ValueList(kind) => {
                Self::list_txt(&root.join(COMMON_DIR).join(kind.dir_name()), |_| true)
            }
        }
    }

    fn default_path(&self, root: &Path, category: FileCategory) -> PathBuf {
        match category {
            FileCategory::NamedLocations => root.join(NAMED_LOCATIONS_DIR).join("00_default.txt"),
            FileCategory::LocationTemplates => root.join(LOCATION_TEMPLATES_FILE),
            FileCategory::Population => root.join(POPULATION_DIR).join("00_pops.txt"),
            FileCategory::ValueList(kind) => root
                .join(COMMON_DIR)
                .join(kind.dir_name())
                .join("00_default.txt"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    #[test]
    fn test_candidates_sorted_by_name() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "in_game/map_data/named_locations/10_more.txt");
        touch(dir.path(), "in_game/map_data/named_locations/00_base.txt");
        touch(dir.path(), "in_game/map_data/named_locations/readme.md");

        let files = GameLayout.candidates(dir.path(), FileCategory::NamedLocations);
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["00_base.txt", "10_more.txt"]);
        assert_eq!(
            GameLayout.save_target(dir.path(), FileCategory::NamedLocations),
            files[0]
        );
    }

    #[test]
    fn test_population_filter_and_default() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "main_menu/setup/start/05_countries.txt");
        touch(dir.path(), "main_menu/setup/start/06_pops.txt");

        let files = GameLayout.candidates(dir.path(), FileCategory::Population);
        assert_eq!(files.len(), 1);

        let empty = TempDir::new().unwrap();
        assert_eq!(
            GameLayout.save_target(empty.path(), FileCategory::Population),
            empty.path().join("main_menu/setup/start/00_pops.txt")
        );
        assert!(GameLayout
            .candidates(empty.path(), FileCategory::LocationTemplates)
            .is_empty());
    }

    #[test]
    fn test_value_list_dir() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "in_game/common/goods/00_goods.txt");
        let files = GameLayout.candidates(
            dir.path(),
            FileCategory::ValueList(ValueListKind::RawMaterials),
        );
        assert_eq!(files.len(), 1);
    }
}
