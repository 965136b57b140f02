/// 实体模型
///
/// 一个 `Province` 汇集了三类文件中的同一地点：
/// named_locations（名称 -> 标识）、location_templates（地理属性）、
/// 人口定义文件（按 type/culture/religion 区分的人口记录）。
use std::fmt;
use std::hash::{Hash, Hasher};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::utils::{format_decimal, quote_if_needed, same_key};

/// 港口适宜度的默认值
pub const DEFAULT_HARBOR_SUITABILITY: &str = "0.00";

/// 实体标识（如颜色代码 `ABABAB`）
///
/// 比较与哈希不区分大小写，输出时保留原始拼写。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProvinceId(String);

impl ProvinceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for ProvinceId {
    fn eq(&self, other: &Self) -> bool {
        same_key(&self.0, &other.0)
    }
}

impl Eq for ProvinceId {}

impl Hash for ProvinceId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for byte in self.0.bytes() {
            state.write_u8(byte.to_ascii_lowercase());
        }
        state.write_u8(0xff);
    }
}

impl fmt::Display for ProvinceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProvinceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ProvinceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// 地理属性（固定字段 + 未知属性）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationAttributes {
    pub topography: String,
    pub vegetation: String,
    pub climate: String,
    pub religion: String,
    pub culture: String,
    pub raw_material: String,
    pub natural_harbor_suitability: String,
    /// 块中出现的其他属性，原样保留
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub extra: IndexMap<String, String>,
}

impl Default for LocationAttributes {
    fn default() -> Self {
        Self {
            topography: String::new(),
            vegetation: String::new(),
            climate: String::new(),
            religion: String::new(),
            culture: String::new(),
            raw_material: String::new(),
            natural_harbor_suitability: DEFAULT_HARBOR_SUITABILITY.to_string(),
            extra: IndexMap::new(),
        }
    }
}

impl LocationAttributes {
    /// 固定字段名（按输出顺序）
    pub const FIELDS: [&'static str; 7] = [
        "topography",
        "vegetation",
        "climate",
        "religion",
        "culture",
        "raw_material",
        "natural_harbor_suitability",
    ];

    /// 所有字段均为默认值且没有未知属性
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// 读取字段（固定字段或未知属性）
    pub fn field(&self, name: &str) -> Option<&str> {
        match self.fixed(name) {
            Some(index) => Some(self.fixed_ref(index)),
            None => self
                .extra
                .iter()
                .find(|(k, _)| same_key(k, name))
                .map(|(_, v)| v.as_str()),
        }
    }

    /// 设置字段，未知字段写入 `extra`
    pub fn set_field(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.fixed(name) {
            Some(index) => *self.fixed_mut(index) = value,
            None => {
                let key = self
                    .extra
                    .keys()
                    .find(|k| same_key(k, name))
                    .cloned()
                    .unwrap_or_else(|| name.to_string());
                self.extra.insert(key, value);
            }
        }
    }

    /// 固定字段的 (名称, 值) 迭代
    pub fn fixed_fields(&self) -> impl Iterator<Item = (&'static str, &str)> {
        Self::FIELDS
            .iter()
            .enumerate()
            .map(move |(i, name)| (*name, self.fixed_ref(i)))
    }

    fn fixed(&self, name: &str) -> Option<usize> {
        Self::FIELDS.iter().position(|f| same_key(f, name))
    }

    fn fixed_ref(&self, index: usize) -> &str {
        match index {
            0 => &self.topography,
            1 => &self.vegetation,
            2 => &self.climate,
            3 => &self.religion,
            4 => &self.culture,
            5 => &self.raw_material,
            _ => &self.natural_harbor_suitability,
        }
    }

    fn fixed_mut(&mut self, index: usize) -> &mut String {
        match index {
            0 => &mut self.topography,
            1 => &mut self.vegetation,
            2 => &mut self.climate,
            3 => &mut self.religion,
            4 => &mut self.culture,
            5 => &mut self.raw_material,
            _ => &mut self.natural_harbor_suitability,
        }
    }
}

/// 单条人口记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopDefinition {
    pub pop_type: String,
    pub size: f64,
    pub culture: String,
    pub religion: String,
}

impl PopDefinition {
    pub fn new(
        pop_type: impl Into<String>,
        size: f64,
        culture: impl Into<String>,
        religion: impl Into<String>,
    ) -> Self {
        Self {
            pop_type: pop_type.into(),
            size,
            culture: culture.into(),
            religion: religion.into(),
        }
    }

    /// 身份相同：type、culture、religion 均相同（不区分大小写）
    pub fn matches(&self, other: &PopDefinition) -> bool {
        self.matches_identity(&other.pop_type, &other.culture, &other.religion)
    }

    pub fn matches_identity(&self, pop_type: &str, culture: &str, religion: &str) -> bool {
        same_key(&self.pop_type, pop_type)
            && same_key(&self.culture, culture)
            && same_key(&self.religion, religion)
    }

    /// 输出为 `define_pop = { ... }` 单行文本，含分隔符的值加引号
    pub fn to_pop_line(&self) -> String {
        let mut line = format!(
            "define_pop = {{ type = {} size = {}",
            quote_if_needed(&self.pop_type),
            format_decimal(self.size)
        );
        if !self.culture.is_empty() {
            line.push_str(" culture = ");
            line.push_str(&quote_if_needed(&self.culture));
        }
        if !self.religion.is_empty() {
            line.push_str(" religion = ");
            line.push_str(&quote_if_needed(&self.religion));
        }
        line.push_str(" }");
        line
    }
}

/// 一个地点的人口记录组
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PopGroup {
    pub pops: Vec<PopDefinition>,
    /// 地点块中除 define_pop 之外的条目，原样保留
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<(String, String)>,
}

impl PopGroup {
    /// 从记录序列构建，重复身份合并为后出现的数值
    pub fn from_definitions(definitions: impl IntoIterator<Item = PopDefinition>) -> Self {
        let mut group = Self::default();
        for pop in definitions {
            group.upsert(pop);
        }
        group
    }

    /// 插入记录；身份已存在时覆盖其数值，位置不变
    ///
    /// 返回是否覆盖了已有记录。
    pub fn upsert(&mut self, pop: PopDefinition) -> bool {
        match self.pops.iter_mut().find(|p| p.matches(&pop)) {
            Some(existing) => {
                existing.size = pop.size;
                true
            }
            None => {
                self.pops.push(pop);
                false
            }
        }
    }

    pub fn remove(&mut self, pop_type: &str, culture: &str, religion: &str) -> bool {
        let before = self.pops.len();
        self.pops
            .retain(|p| !p.matches_identity(pop_type, culture, religion));
        self.pops.len() != before
    }

    pub fn find(&self, pop_type: &str, culture: &str, religion: &str) -> Option<&PopDefinition> {
        self.pops
            .iter()
            .find(|p| p.matches_identity(pop_type, culture, religion))
    }

    pub fn len(&self) -> usize {
        self.pops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pops.is_empty() && self.extra.is_empty()
    }

    /// 总人口
    pub fn total_size(&self) -> f64 {
        self.pops.iter().map(|p| p.size).sum()
    }
}

/// 地点实体
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Province {
    pub id: ProvinceId,
    /// 显示名称；来自属性块但没有名称映射的实体为 None
    pub name: Option<String>,
    /// 磁盘上的名称，由存储层维护
    #[serde(skip)]
    pub(crate) origin_name: Option<String>,
    pub location: LocationAttributes,
    pub pops: PopGroup,
}

impl Province {
    /// 新建实体（磁盘上尚不存在）
    pub fn new(id: impl Into<ProvinceId>, name: Option<String>) -> Self {
        Self {
            id: id.into(),
            name,
            origin_name: None,
            location: LocationAttributes::default(),
            pops: PopGroup::default(),
        }
    }

    /// 从磁盘加载的实体，磁盘名称即当前名称
    pub fn loaded(
        id: impl Into<ProvinceId>,
        name: Option<String>,
        location: LocationAttributes,
        pops: PopGroup,
    ) -> Self {
        Self {
            id: id.into(),
            origin_name: name.clone(),
            name,
            location,
            pops,
        }
    }

    pub fn origin_name(&self) -> Option<&str> {
        self.origin_name.as_deref()
    }

    /// 名称（没有名称时使用标识）
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.id.as_str())
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    /// 当前名称与磁盘名称不同
    pub fn is_renamed(&self) -> bool {
        self.origin_name.is_some() && self.origin_name != self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_id_is_case_insensitive() {
        let a = ProvinceId::new("ABABAB");
        let b = ProvinceId::new("ababab");
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
        assert_eq!(set.iter().next().unwrap().as_str(), "ABABAB");
    }

    #[test]
    fn test_location_defaults() {
        let attrs = LocationAttributes::default();
        assert_eq!(attrs.natural_harbor_suitability, "0.00");
        assert!(attrs.is_empty());

        let mut attrs = attrs;
        attrs.set_field("Climate", "arid");
        attrs.set_field("color", "rgb { 1 2 3 }");
        assert_eq!(attrs.climate, "arid");
        assert_eq!(attrs.field("COLOR"), Some("rgb { 1 2 3 }"));
        assert!(!attrs.is_empty());
    }

    #[test]
    fn test_pop_line_format() {
        let pop = PopDefinition::new("clergy", 0.00021, "swedish", "lutheran");
        assert_eq!(
            pop.to_pop_line(),
            "define_pop = { type = clergy size = 0.00021 culture = swedish religion = lutheran }"
        );
    }

    #[test]
    fn test_pop_line_quotes_spaced_values() {
        let pop = PopDefinition::new("peasants", 1.0, "old norse", "norse_pagan");
        assert_eq!(
            pop.to_pop_line(),
            "define_pop = { type = peasants size = 1 culture = \"old norse\" religion = norse_pagan }"
        );
    }

    #[test]
    fn test_pop_group_reconciles_duplicates() {
        let group = PopGroup::from_definitions(vec![
            PopDefinition::new("peasants", 1.0, "swedish", "catholic"),
            PopDefinition::new("nobles", 0.01, "swedish", "catholic"),
            PopDefinition::new("PEASANTS", 2.5, "Swedish", "catholic"),
        ]);
        assert_eq!(group.len(), 2);
        assert_eq!(group.pops[0].size, 2.5);
        assert_eq!(group.pops[0].pop_type, "peasants");
    }

    #[test]
    fn test_pop_group_remove() {
        let mut group = PopGroup::default();
        group.upsert(PopDefinition::new("burghers", 0.1, "danish", "catholic"));
        assert!(group.remove("Burghers", "danish", "CATHOLIC"));
        assert!(!group.remove("burghers", "danish", "catholic"));
        assert!(group.is_empty());
    }

    #[test]
    fn test_province_rename_tracking() {
        let mut province = Province::loaded(
            "ABABAB",
            Some("stockholm".to_string()),
            LocationAttributes::default(),
            PopGroup::default(),
        );
        assert!(!province.is_renamed());
        province.rename("holmia");
        assert!(province.is_renamed());
        assert_eq!(province.origin_name(), Some("stockholm"));
        assert_eq!(province.display_name(), "holmia");

        let fresh = Province::new("CDCDCD", None);
        assert_eq!(fresh.display_name(), "CDCDCD");
        assert!(!fresh.is_renamed());
    }
}
