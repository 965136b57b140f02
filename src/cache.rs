/// 定义值缓存
///
/// 从游戏与模组的 `in_game/common/<kind>/` 目录收集文化、宗教、地形等定义名称，
/// 仅用于自动补全与提示性校验，不参与解析的正确性。
use std::fmt;
use std::path::Path;

use indexmap::IndexMap;
use log::{debug, warn};
use serde::Serialize;

use crate::dialect::DefinitionParser;
use crate::io::TextReader;
use crate::layout::{FileCategory, PathResolver};
use crate::model::Province;
use crate::utils::same_key;

/// 定义列表的种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ValueListKind {
    Cultures,
    Religions,
    Topography,
    Vegetation,
    Climates,
    RawMaterials,
    PopTypes,
}

impl ValueListKind {
    pub const ALL: [ValueListKind; 7] = [
        ValueListKind::Cultures,
        ValueListKind::Religions,
        ValueListKind::Topography,
        ValueListKind::Vegetation,
        ValueListKind::Climates,
        ValueListKind::RawMaterials,
        ValueListKind::PopTypes,
    ];

    /// `in_game/common/` 下的目录名
    pub fn dir_name(self) -> &'static str {
        match self {
            ValueListKind::Cultures => "cultures",
            ValueListKind::Religions => "religions",
            ValueListKind::Topography => "topography",
            ValueListKind::Vegetation => "vegetation",
            ValueListKind::Climates => "climates",
            ValueListKind::RawMaterials => "goods",
            ValueListKind::PopTypes => "pop_types",
        }
    }

    /// 需要的类别过滤（原材料只取 `category = raw_material` 的商品）
    pub fn category_filter(self) -> Option<&'static str> {
        match self {
            ValueListKind::RawMaterials => Some("raw_material"),
            _ => None,
        }
    }

    pub fn parser(self) -> DefinitionParser {
        match self.category_filter() {
            Some(category) => DefinitionParser::with_category(category),
            None => DefinitionParser::new(),
        }
    }
}

impl fmt::Display for ValueListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// 一种定义的游戏本体值与模组值
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DefinitionSet {
    pub base: Vec<String>,
    pub modded: Vec<String>,
}

impl DefinitionSet {
    /// 合并列表：本体在前，模组新增的在后（不区分大小写去重）
    pub fn combined(&self) -> Vec<&str> {
        let mut values: Vec<&str> = Vec::with_capacity(self.base.len() + self.modded.len());
        for value in self.base.iter().chain(self.modded.iter()) {
            if !values.iter().any(|v| same_key(v, value)) {
                values.push(value);
            }
        }
        values
    }

    pub fn contains(&self, value: &str) -> bool {
        self.base
            .iter()
            .chain(self.modded.iter())
            .any(|v| same_key(v, value))
    }

    pub fn is_empty(&self) -> bool {
        self.base.is_empty() && self.modded.is_empty()
    }

    pub fn len(&self) -> usize {
        self.combined().len()
    }
}

/// 提示性校验发现的未知值
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnknownValue {
    pub field: String,
    pub value: String,
    pub kind: ValueListKind,
}

/// 全部定义缓存
#[derive(Debug, Clone, Default)]
pub struct DefinitionCache {
    sets: IndexMap<ValueListKind, DefinitionSet>,
}

impl DefinitionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从两个根目录加载全部定义
    ///
    /// 缺失的目录与无法解析的文件只记录警告。
    pub fn load(
        resolver: &dyn PathResolver,
        reader: &dyn TextReader,
        base_dir: &Path,
        mod_dir: &Path,
    ) -> Self {
        let mut cache = Self::new();
        for kind in ValueListKind::ALL {
            let set = DefinitionSet {
                base: Self::load_values(resolver, reader, base_dir, kind),
                modded: Self::load_values(resolver, reader, mod_dir, kind),
            };
            debug!("{}: {} definitions", kind, set.len());
            cache.sets.insert(kind, set);
        }
        cache
    }

    fn load_values(
        resolver: &dyn PathResolver,
        reader: &dyn TextReader,
        root: &Path,
        kind: ValueListKind,
    ) -> Vec<String> {
        let files = resolver.candidates(root, FileCategory::ValueList(kind));
        if files.is_empty() {
            debug!("no {} definitions under {:?}", kind, root);
            return Vec::new();
        }

        let parser = kind.parser();
        let mut values: Vec<String> = Vec::new();
        for path in files {
            let raw = match reader.read(&path) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("skipping definition file {:?}: {}", path, e);
                    continue;
                }
            };
            match parser.parse(&raw.text) {
                Ok(keys) => {
                    for key in keys {
                        if !values.iter().any(|v| same_key(v, &key)) {
                            values.push(key);
                        }
                    }
                }
                Err(e) => warn!("skipping definition file {:?}: {}", path, e),
            }
        }
        values
    }

    pub fn insert(&mut self, kind: ValueListKind, set: DefinitionSet) {
        self.sets.insert(kind, set);
    }

    pub fn get(&self, kind: ValueListKind) -> Option<&DefinitionSet> {
        self.sets.get(&kind)
    }

    /// 各种定义的数量
    pub fn sizes(&self) -> IndexMap<ValueListKind, usize> {
        self.sets.iter().map(|(k, set)| (*k, set.len())).collect()
    }

    /// 实体中不在定义列表里的值（列表为空的种类不检查）
    pub fn unknown_values(&self, province: &Province) -> Vec<UnknownValue> {
        let location = &province.location;
        let mut checks: Vec<(&str, &str, ValueListKind)> = vec![
            ("topography", location.topography.as_str(), ValueListKind::Topography),
            ("vegetation", location.vegetation.as_str(), ValueListKind::Vegetation),
            ("climate", location.climate.as_str(), ValueListKind::Climates),
            ("religion", location.religion.as_str(), ValueListKind::Religions),
            ("culture", location.culture.as_str(), ValueListKind::Cultures),
            ("raw_material", location.raw_material.as_str(), ValueListKind::RawMaterials),
        ];
        for pop in &province.pops.pops {
            checks.push(("pop.type", pop.pop_type.as_str(), ValueListKind::PopTypes));
            checks.push(("pop.culture", pop.culture.as_str(), ValueListKind::Cultures));
            checks.push(("pop.religion", pop.religion.as_str(), ValueListKind::Religions));
        }

        checks
            .into_iter()
            .filter(|(_, value, _)| !value.is_empty())
            .filter(|(_, value, kind)| {
                self.get(*kind)
                    .is_some_and(|set| !set.is_empty() && !set.contains(value))
            })
            .map(|(field, value, kind)| UnknownValue {
                field: field.to_string(),
                value: value.to_string(),
                kind,
            })
            .collect()
    }
}
