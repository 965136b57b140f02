/// 地点数据加载器
///
/// 依次读取游戏本体与模组目录下的三类文件，按文件名顺序逐层叠加
/// （后读到的记录覆盖先读到的同名记录），再组装为实体存储。
///
/// 模组把某个标识映射到新名称时，旧名称的映射被取代；
/// 旧名称下的属性块与人口块改按新名称读取。
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::{debug, info, warn};
use serde::Serialize;

use crate::dialect::{BlockParser, Dialect, KeyValueParser, PopParser};
use crate::editor::ProvinceStore;
use crate::io::TextReader;
use crate::layout::{FileCategory, PathResolver, NAMED_LOCATIONS_DIR};
use crate::mapping::ProvinceMapper;
use crate::utils::{fold_key, strip_quotes, MapDataError, ParseWarning};

/// 带文件路径的解析警告
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadWarning {
    pub path: PathBuf,
    pub warning: ParseWarning,
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.warning)
    }
}

/// 加载结果
#[derive(Debug, Default)]
pub struct LoadedStore {
    pub store: ProvinceStore,
    pub warnings: Vec<LoadWarning>,
    /// 实际读取的文件（按读取顺序）
    pub files: Vec<PathBuf>,
    /// 游戏本体名称表中的标识与本体属性块的键（折叠后）
    ///
    /// 模组无法删除这些记录，重新加载时它们会再次出现。
    pub base_keys: HashSet<String>,
}

/// 单个文件的检查结果
#[derive(Debug, Clone, Serialize)]
pub struct FileCheck {
    pub path: PathBuf,
    pub records: usize,
    pub warnings: usize,
    /// 重新序列化后再解析，记录是否保持不变
    pub round_trip: bool,
    /// 结构性错误
    pub error: Option<String>,
}

impl FileCheck {
    pub fn is_ok(&self) -> bool {
        self.error.is_none() && self.round_trip
    }
}

/// 按折叠键叠加的记录表
///
/// 同键（不区分大小写）的新记录原地替换旧记录，并采用新的键拼写。
struct Layered<T> {
    entries: IndexMap<String, (String, T)>,
}

impl<T> Layered<T> {
    fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    fn insert(&mut self, key: String, value: T) {
        self.entries.insert(fold_key(&key), (key, value));
    }

    fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(&fold_key(key))
    }

    fn remove(&mut self, key: &str) -> Option<(String, T)> {
        self.entries.shift_remove(&fold_key(key))
    }

    /// 把旧键下的记录改到新键下；新键已有记录时丢弃旧记录
    fn rekey(&mut self, old: &str, new: &str) {
        if self.contains(new) {
            if self.remove(old).is_some() {
                debug!("'{}' superseded by existing record '{}'", old, new);
            }
        } else if let Some((_, value)) = self.remove(old) {
            debug!("record '{}' read as '{}'", old, new);
            self.insert(new.to_string(), value);
        }
    }

    fn into_map(self) -> IndexMap<String, T> {
        self.entries.into_values().collect()
    }
}

/// 名称 -> 标识表，每个标识只保留最后一次映射的名称
struct NameTable {
    names: Layered<String>,
    /// 折叠后的标识 -> 当前名称
    by_id: HashMap<String, String>,
    /// (被取代的名称, 新名称)
    superseded: Vec<(String, String)>,
}

impl NameTable {
    fn new() -> Self {
        Self {
            names: Layered::new(),
            by_id: HashMap::new(),
            superseded: Vec::new(),
        }
    }

    fn insert(&mut self, name: String, raw_id: String) {
        let id = fold_key(strip_quotes(&raw_id));

        if let Some(previous) = self.by_id.get(&id) {
            if fold_key(previous) != fold_key(&name) {
                debug!("identifier {} renamed: '{}' -> '{}'", raw_id, previous, name);
                self.names.remove(previous);
                self.superseded.push((previous.clone(), name.clone()));
            }
        }
        // 名称改指其他标识时，旧标识不再拥有该名称
        if let Some((_, old_id)) = self.names.entries.get(&fold_key(&name)) {
            let old_id = fold_key(strip_quotes(old_id));
            if old_id != id {
                self.by_id.remove(&old_id);
            }
        }

        self.by_id.insert(id, name.clone());
        self.names.insert(name, raw_id);
    }
}

/// 加载器
pub struct ProvinceLoader<'a> {
    resolver: &'a dyn PathResolver,
    reader: &'a dyn TextReader,
    load_base_population: bool,
}

impl<'a> ProvinceLoader<'a> {
    pub fn new(resolver: &'a dyn PathResolver, reader: &'a dyn TextReader) -> Self {
        Self {
            resolver,
            reader,
            load_base_population: false,
        }
    }

    /// 是否同时读取本体的人口文件
    pub fn with_base_population(mut self, enabled: bool) -> Self {
        self.load_base_population = enabled;
        self
    }

    /// 加载全部实体
    ///
    /// # 错误
    /// - 游戏本体缺少名称表 -> `MissingFile`
    /// - 任一文件结构错误 -> `Structure`（附带文件路径）
    pub fn load(&self, base_dir: &Path, mod_dir: &Path) -> Result<LoadedStore, MapDataError> {
        if self
            .resolver
            .candidates(base_dir, FileCategory::NamedLocations)
            .is_empty()
        {
            return Err(MapDataError::MissingFile(base_dir.join(NAMED_LOCATIONS_DIR)));
        }

        let mut loaded = LoadedStore::default();
        let roots = [base_dir, mod_dir];

        let mut names = NameTable::new();
        for (layer, root) in roots.into_iter().enumerate() {
            let files = self.read_category(
                &KeyValueParser,
                root,
                FileCategory::NamedLocations,
                &mut loaded,
            )?;
            for (path, map) in files {
                debug!("{:?}: {} names", path, map.len());
                for (name, id) in map {
                    if layer == 0 {
                        loaded.base_keys.insert(fold_key(strip_quotes(&id)));
                    }
                    names.insert(name, id);
                }
            }
        }

        let mut blocks = Layered::new();
        for (layer, root) in roots.into_iter().enumerate() {
            let files = self.read_category(
                &BlockParser,
                root,
                FileCategory::LocationTemplates,
                &mut loaded,
            )?;
            for (_, map) in files {
                for (key, props) in map {
                    if layer == 0 {
                        loaded.base_keys.insert(fold_key(&key));
                    }
                    blocks.insert(key, props);
                }
            }
        }

        let mut pops = Layered::new();
        let pop_roots: &[&Path] = if self.load_base_population {
            &roots
        } else {
            &roots[1..]
        };
        for root in pop_roots {
            let files =
                self.read_category(&PopParser, root, FileCategory::Population, &mut loaded)?;
            for (_, map) in files {
                for (key, block) in map {
                    pops.insert(key, block);
                }
            }
        }

        for (old, new) in &names.superseded {
            blocks.rekey(old, new);
            pops.rekey(old, new);
        }

        let provinces = ProvinceMapper::map_store(
            &names.names.into_map(),
            &blocks.into_map(),
            &pops.into_map(),
        );
        loaded.store = provinces.into_iter().collect();

        info!(
            "loaded {} locations from {} files ({} warnings)",
            loaded.store.len(),
            loaded.files.len(),
            loaded.warnings.len()
        );
        Ok(loaded)
    }

    /// 读取并解析某类别的全部文件
    fn read_category<D: Dialect>(
        &self,
        dialect: &D,
        root: &Path,
        category: FileCategory,
        loaded: &mut LoadedStore,
    ) -> Result<Vec<(PathBuf, IndexMap<String, D::Value>)>, MapDataError> {
        let files = self.resolver.candidates(root, category);
        if files.is_empty() {
            debug!("no {:?} files under {:?}", category, root);
        }

        let mut maps = Vec::with_capacity(files.len());
        for path in files {
            let raw = self.reader.read(&path)?;
            let parsed = dialect
                .parse(&raw.text)
                .map_err(|e| MapDataError::structure(&path, e))?;

            for warning in parsed.warnings() {
                warn!("{}: {}", path.display(), warning);
                loaded.warnings.push(LoadWarning {
                    path: path.clone(),
                    warning: warning.clone(),
                });
            }

            maps.push((path.clone(), parsed.to_map()));
            loaded.files.push(path);
        }
        Ok(maps)
    }

    /// 检查一个根目录下的全部数据文件：结构是否合法，重新序列化后记录是否不变
    pub fn check(&self, root: &Path) -> Vec<FileCheck> {
        let mut checks = Vec::new();
        for path in self.resolver.candidates(root, FileCategory::NamedLocations) {
            checks.push(self.check_file(&KeyValueParser, path));
        }
        for path in self.resolver.candidates(root, FileCategory::LocationTemplates) {
            checks.push(self.check_file(&BlockParser, path));
        }
        for path in self.resolver.candidates(root, FileCategory::Population) {
            checks.push(self.check_file(&PopParser, path));
        }
        checks
    }

    fn check_file<D: Dialect>(&self, dialect: &D, path: PathBuf) -> FileCheck {
        let mut check = FileCheck {
            path,
            records: 0,
            warnings: 0,
            round_trip: false,
            error: None,
        };

        let raw = match self.reader.read(&check.path) {
            Ok(raw) => raw,
            Err(e) => {
                check.error = Some(e.to_string());
                return check;
            }
        };
        let parsed = match dialect.parse(&raw.text) {
            Ok(parsed) => parsed,
            Err(e) => {
                check.error = Some(e.to_string());
                return check;
            }
        };

        let records = parsed.to_map();
        check.records = records.len();
        check.warnings = parsed.warnings().len();

        let text = dialect.serialize(records.clone().into_iter().collect());
        check.round_trip = match dialect.parse(&text) {
            Ok(reparsed) => reparsed.to_map() == records,
            Err(e) => {
                warn!("{}: serialized text does not parse: {}", check.path.display(), e);
                false
            }
        };
        check
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::Repository;
    use crate::io::DefaultTextReader;
    use crate::layout::GameLayout;
    use crate::model::ProvinceId;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, text: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    fn load(base: &Path, modded: &Path) -> Result<LoadedStore, MapDataError> {
        ProvinceLoader::new(&GameLayout, &DefaultTextReader).load(base, modded)
    }

    #[test]
    fn test_missing_base_names() {
        let base = TempDir::new().unwrap();
        let modded = TempDir::new().unwrap();
        assert!(matches!(
            load(base.path(), modded.path()),
            Err(MapDataError::MissingFile(_))
        ));
    }

    #[test]
    fn test_mod_overrides_base() {
        let base = TempDir::new().unwrap();
        let modded = TempDir::new().unwrap();
        write(
            base.path(),
            "in_game/map_data/named_locations/00_names.txt",
            "stockholm = ABABAB\nuppsala = CDCDCD\n",
        );
        write(
            base.path(),
            "in_game/map_data/location_templates.txt",
            "stockholm = { topography = flatland climate = continental }\nuppsala = { topography = hills }\n",
        );
        write(
            modded.path(),
            "in_game/map_data/named_locations/00_names.txt",
            "holmia = ababab\n",
        );
        write(
            modded.path(),
            "in_game/map_data/location_templates.txt",
            "Uppsala = { topography = mountains }\n",
        );
        write(
            base.path(),
            "main_menu/setup/start/06_pops.txt",
            "locations = { uppsala = { define_pop = { type = nobles size = 1 culture = swedish religion = catholic } } }\n",
        );

        let loaded = load(base.path(), modded.path()).unwrap();
        let store = &loaded.store;
        assert_eq!(store.len(), 2);

        let renamed = store.get(&ProvinceId::new("ABABAB")).unwrap();
        assert_eq!(renamed.name.as_deref(), Some("holmia"));
        assert_eq!(renamed.location.climate, "continental");

        let uppsala = store.lookup("uppsala").unwrap();
        assert_eq!(uppsala.location.topography, "mountains");
        // 本体人口默认不读取
        assert!(uppsala.pops.is_empty());
        assert_eq!(loaded.files.len(), 4);

        // 本体名称表的标识与本体属性块的键
        assert!(loaded.base_keys.contains("ababab"));
        assert!(loaded.base_keys.contains("stockholm"));
        assert!(!loaded.base_keys.contains("holmia"));
    }

    #[test]
    fn test_structure_error_names_file() {
        let base = TempDir::new().unwrap();
        let modded = TempDir::new().unwrap();
        write(
            base.path(),
            "in_game/map_data/named_locations/00_names.txt",
            "stockholm = ABABAB\n",
        );
        write(
            modded.path(),
            "in_game/map_data/location_templates.txt",
            "stockholm = { topography = flatland\n",
        );

        match load(base.path(), modded.path()) {
            Err(MapDataError::Structure { path, .. }) => {
                assert!(path.ends_with("location_templates.txt"));
            }
            other => panic!("expected structure error, got {:?}", other.map(|l| l.store.len())),
        }
    }

    #[test]
    fn test_warnings_collected() {
        let base = TempDir::new().unwrap();
        let modded = TempDir::new().unwrap();
        write(
            base.path(),
            "in_game/map_data/named_locations/00_names.txt",
            "stockholm = ABABAB\n",
        );
        write(
            modded.path(),
            "main_menu/setup/start/00_pops.txt",
            "locations = { stockholm = { define_pop = { type = peasants size = lots culture = swedish religion = catholic } } }\n",
        );

        let loaded = ProvinceLoader::new(&GameLayout, &DefaultTextReader)
            .with_base_population(true)
            .load(base.path(), modded.path())
            .unwrap();
        assert_eq!(loaded.warnings.len(), 1);
        let stockholm = loaded.store.lookup("stockholm").unwrap();
        assert_eq!(stockholm.pops.pops[0].size, 0.0);
    }

    #[test]
    fn test_check_reports_files() {
        let root = TempDir::new().unwrap();
        write(
            root.path(),
            "in_game/map_data/named_locations/00_names.txt",
            "# names\nstockholm = ABABAB\n",
        );
        write(
            root.path(),
            "in_game/map_data/location_templates.txt",
            "stockholm = { topography = flatland\n",
        );

        let checks = ProvinceLoader::new(&GameLayout, &DefaultTextReader).check(root.path());
        assert_eq!(checks.len(), 2);
        assert!(checks[0].is_ok());
        assert_eq!(checks[0].records, 1);
        assert!(checks[1].error.is_some());
    }
}
