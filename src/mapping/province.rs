/// 三类文件 ⇄ 地点实体
///
/// 读入：名称表（名称 -> 标识）是权威来源；属性块与人口块先按名称、
/// 再按标识关联。没有名称映射的属性块成为以标识为键的无名实体。
///
/// 写回：按实体的生命周期状态为每种文件形态生成合并编辑。
use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use log::{debug, warn};

use super::{LocationMapper, PopMapper};
use crate::dialect::lexer::{is_single_value, is_single_word};
use crate::dialect::{Edit, ParsedFile, PopBlock, Properties};
use crate::editor::{Change, EntityState};
use crate::model::{Province, ProvinceId};
use crate::utils::{fold_key, same_key, strip_quotes, MapDataError};

/// 不区分大小写的键查找，每个键只能被认领一次
struct KeyIndex<'a> {
    keys: HashMap<String, &'a str>,
    used: HashSet<String>,
}

impl<'a> KeyIndex<'a> {
    fn new<I: Iterator<Item = &'a String>>(keys: I) -> Self {
        Self {
            keys: keys.map(|k| (fold_key(k), k.as_str())).collect(),
            used: HashSet::new(),
        }
    }

    fn claim(&mut self, candidates: &[&str]) -> Option<&'a str> {
        for candidate in candidates {
            let folded = fold_key(candidate);
            if let Some(&key) = self.keys.get(&folded) {
                if self.used.insert(folded) {
                    return Some(key);
                }
            }
        }
        None
    }

    fn is_used(&self, key: &str) -> bool {
        self.used.contains(&fold_key(key))
    }
}

pub struct ProvinceMapper;

impl ProvinceMapper {
    /// 由三类文件的内容构建实体列表
    pub fn map_store(
        names: &IndexMap<String, String>,
        blocks: &IndexMap<String, Properties>,
        pops: &IndexMap<String, PopBlock>,
    ) -> Vec<Province> {
        let mut block_index = KeyIndex::new(blocks.keys());
        let mut pop_index = KeyIndex::new(pops.keys());
        let mut ids: HashSet<ProvinceId> = HashSet::new();
        let mut provinces = Vec::with_capacity(names.len());

        for (name, raw_id) in names {
            let id = ProvinceId::new(strip_quotes(raw_id));
            if !ids.insert(id.clone()) {
                warn!("identifier {} is mapped by more than one name, '{}' ignored", id, name);
                continue;
            }

            let location = block_index
                .claim(&[name.as_str(), id.as_str()])
                .and_then(|key| blocks.get(key))
                .map(LocationMapper::to_attributes)
                .unwrap_or_default();
            let group = pop_index
                .claim(&[name.as_str(), id.as_str()])
                .and_then(|key| pops.get(key).map(|block| PopMapper::to_group(key, block)))
                .unwrap_or_default();

            provinces.push(Province::loaded(id, Some(name.clone()), location, group));
        }

        for (key, props) in blocks {
            if block_index.is_used(key) {
                continue;
            }
            let id = ProvinceId::new(key.as_str());
            if !ids.insert(id.clone()) {
                warn!("attribute block '{}' collides with an existing identifier, ignored", key);
                continue;
            }
            debug!("attribute block '{}' has no name mapping, loaded as unnamed", key);

            let group = pop_index
                .claim(&[key.as_str()])
                .and_then(|k| pops.get(k).map(|block| PopMapper::to_group(k, block)))
                .unwrap_or_default();
            provinces.push(Province::loaded(
                id,
                None,
                LocationMapper::to_attributes(props),
                group,
            ));
        }

        for key in pops.keys() {
            if !pop_index.is_used(key) {
                debug!("pop block '{}' matches no location, left untouched", key);
            }
        }

        provinces
    }

    /// 检查实体能否写成合法的脚本文本
    ///
    /// 名称必须是单个记号，属性值必须恰好是一个值，
    /// 人口字段中不能出现引号。
    pub fn check_writable(province: &Province) -> Result<(), MapDataError> {
        if let Some(name) = &province.name {
            if !is_single_word(name) {
                return Err(MapDataError::InvalidName(name.clone()));
            }
        }

        let invalid = |field: &str, value: &str| MapDataError::InvalidValue {
            id: province.id.to_string(),
            field: field.to_string(),
            value: value.to_string(),
        };

        for (field, value) in province.location.fixed_fields() {
            if !value.is_empty() && !is_single_value(value) {
                return Err(invalid(field, value));
            }
        }
        for (key, value) in &province.location.extra {
            if !is_single_word(key) {
                return Err(invalid(key, key));
            }
            if !is_single_value(value) {
                return Err(invalid(key, value));
            }
        }

        for pop in &province.pops.pops {
            if pop.pop_type.is_empty() || pop.pop_type.contains('"') {
                return Err(invalid("type", &pop.pop_type));
            }
            if pop.culture.contains('"') {
                return Err(invalid("culture", &pop.culture));
            }
            if pop.religion.contains('"') {
                return Err(invalid("religion", &pop.religion));
            }
        }
        for (key, value) in &province.pops.extra {
            if !is_single_word(key) || !is_single_value(value) {
                return Err(invalid(key, value));
            }
        }
        Ok(())
    }

    /// 名称表编辑
    ///
    /// 现有记录的标识文本（引号、大小写）与实体标识一致时沿用原文。
    pub fn flat_edits(
        changes: &[Change<'_>],
        existing: &[ParsedFile<String>],
    ) -> Vec<Edit<String>> {
        let mut edits = Vec::new();

        for change in changes {
            let province = change.province;
            match change.state {
                EntityState::Added | EntityState::Modified => match &province.name {
                    Some(name) => edits.push(Edit::upsert_renamed(
                        name.as_str(),
                        province.origin_name(),
                        raw_id(province, existing),
                    )),
                    // 无名实体不拥有名称记录
                    None => {
                        if let Some(origin) = province.origin_name() {
                            edits.push(Edit::remove([origin]));
                        }
                    }
                },
                EntityState::Deleted => {
                    if let Some(origin) = province.origin_name() {
                        edits.push(Edit::remove([origin]));
                    }
                }
                EntityState::Unchanged => {}
            }
        }

        edits
    }

    /// 属性块编辑
    ///
    /// 任一文件中已经以标识为键时继续使用标识，否则使用当前名称。
    pub fn block_edits(
        changes: &[Change<'_>],
        existing: &[ParsedFile<Properties>],
    ) -> Vec<Edit<Properties>> {
        let mut edits = Vec::new();

        for change in changes {
            let province = change.province;
            let id = province.id.as_str();
            let candidates = owned_keys(province);

            match change.state {
                EntityState::Added | EntityState::Modified => {
                    if province.location.is_empty() {
                        edits.push(Edit::remove(candidates));
                        continue;
                    }
                    let keyed_by_id = existing.iter().any(|file| file.contains(id));
                    let key = if keyed_by_id || province.name.is_none() {
                        id
                    } else {
                        province.display_name()
                    };
                    edits.push(Edit::upsert_renamed(
                        key,
                        candidates,
                        LocationMapper::to_properties(&province.location),
                    ));
                }
                EntityState::Deleted => {
                    edits.push(Edit::remove(candidates));
                }
                EntityState::Unchanged => {}
            }
        }

        edits
    }

    /// 人口块编辑
    pub fn pop_edits(changes: &[Change<'_>]) -> Vec<Edit<PopBlock>> {
        let mut edits = Vec::new();

        for change in changes {
            let province = change.province;
            let candidates = owned_keys(province);

            match change.state {
                EntityState::Added | EntityState::Modified => {
                    if province.pops.is_empty() {
                        edits.push(Edit::remove(candidates));
                    } else {
                        edits.push(Edit::upsert_renamed(
                            province.display_name(),
                            candidates,
                            PopMapper::to_block(&province.pops),
                        ));
                    }
                }
                EntityState::Deleted => {
                    edits.push(Edit::remove(candidates));
                }
                EntityState::Unchanged => {}
            }
        }

        edits
    }
}

/// 名称表中该实体现有记录的标识原文，没有时使用实体标识
fn raw_id(province: &Province, existing: &[ParsedFile<String>]) -> String {
    let keys = [province.name.as_deref(), province.origin_name()];
    existing
        .iter()
        .rev()
        .flat_map(|file| keys.iter().flatten().filter_map(move |key| file.get(key)))
        .find(|value| same_key(strip_quotes(value), province.id.as_str()))
        .cloned()
        .unwrap_or_else(|| province.id.to_string())
}

/// 实体在块文件中可能使用的全部键：标识、磁盘名称、当前名称
fn owned_keys(province: &Province) -> Vec<&str> {
    let mut keys = vec![province.id.as_str()];
    keys.extend(province.origin_name());
    keys.extend(province.name.as_deref());
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{BlockParser, Dialect, KeyValueParser};
    use crate::model::{LocationAttributes, PopDefinition, PopGroup};
    use pretty_assertions::assert_eq;

    fn loaded(id: &str, name: Option<&str>) -> Province {
        Province::loaded(
            id,
            name.map(str::to_string),
            LocationAttributes::default(),
            PopGroup::default(),
        )
    }

    fn names(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_map_store_joins_by_name_then_id() {
        let names = names(&[("stockholm", "ABABAB"), ("uppsala", "CDCDCD")]);

        let mut blocks = IndexMap::new();
        let mut props = Properties::new();
        props.insert("topography".to_string(), "flatland".to_string());
        blocks.insert("Stockholm".to_string(), props.clone());
        blocks.insert("cdcdcd".to_string(), props.clone());
        blocks.insert("EFEFEF".to_string(), props);

        let mut pops = IndexMap::new();
        pops.insert(
            "uppsala".to_string(),
            PopBlock {
                pops: vec![PopDefinition::new("peasants", 1.0, "swedish", "lutheran")],
                extra: Vec::new(),
            },
        );
        pops.insert("nowhere".to_string(), PopBlock::default());

        let provinces = ProvinceMapper::map_store(&names, &blocks, &pops);
        assert_eq!(provinces.len(), 3);

        assert_eq!(provinces[0].name.as_deref(), Some("stockholm"));
        assert_eq!(provinces[0].location.topography, "flatland");
        assert_eq!(provinces[1].location.topography, "flatland");
        assert_eq!(provinces[1].pops.len(), 1);

        // 没有名称映射的属性块
        assert_eq!(provinces[2].id.as_str(), "EFEFEF");
        assert_eq!(provinces[2].name, None);
        assert_eq!(provinces[2].origin_name(), None);
    }

    #[test]
    fn test_rename_edits_carry_stale_keys() {
        let mut province = loaded("ABABAB", Some("stockholm"));
        province.rename("holmia");
        province.location.climate = "arid".to_string();
        let changes = vec![Change {
            state: EntityState::Modified,
            province: &province,
        }];

        let flat = ProvinceMapper::flat_edits(&changes, &[]);
        assert_eq!(
            flat,
            vec![Edit::Upsert {
                key: "holmia".to_string(),
                stale_keys: vec!["stockholm".to_string()],
                value: "ABABAB".to_string(),
            }]
        );

        let existing = BlockParser.parse("").unwrap();
        let blocks = ProvinceMapper::block_edits(&changes, std::slice::from_ref(&existing));
        match &blocks[0] {
            Edit::Upsert { key, stale_keys, .. } => {
                assert_eq!(key, "holmia");
                assert_eq!(stale_keys, &vec!["ABABAB".to_string(), "stockholm".to_string()]);
            }
            Edit::Remove { .. } => panic!("expected upsert"),
        }

        // 人口为空：删除所有可能的键
        let pops = ProvinceMapper::pop_edits(&changes);
        assert_eq!(
            pops,
            vec![Edit::Remove {
                keys: vec![
                    "ABABAB".to_string(),
                    "stockholm".to_string(),
                    "holmia".to_string()
                ],
            }]
        );
    }

    #[test]
    fn test_block_keyed_by_id_keeps_id() {
        let mut province = loaded("ABABAB", Some("stockholm"));
        province.location.topography = "hills".to_string();
        let changes = vec![Change {
            state: EntityState::Modified,
            province: &province,
        }];

        let existing = BlockParser.parse("ababab = { topography = flatland }\n").unwrap();
        let edits = ProvinceMapper::block_edits(&changes, std::slice::from_ref(&existing));
        let result = BlockParser.merge(&existing, edits);
        assert_eq!(result.text, "ABABAB = { topography = hills }\n");
    }

    #[test]
    fn test_deleted_edits() {
        let province = loaded("ABABAB", Some("stockholm"));
        let changes = vec![Change {
            state: EntityState::Deleted,
            province: &province,
        }];
        assert_eq!(
            ProvinceMapper::flat_edits(&changes, &[]),
            vec![Edit::Remove {
                keys: vec!["stockholm".to_string()]
            }]
        );
        assert_eq!(ProvinceMapper::pop_edits(&changes).len(), 1);
    }

    #[test]
    fn test_flat_edit_keeps_quoted_id() {
        let mut province = loaded("ABABAB", Some("stockholm"));
        province.location.climate = "arid".to_string();
        let changes = vec![Change {
            state: EntityState::Modified,
            province: &province,
        }];

        let existing = KeyValueParser.parse("stockholm = \"ababab\"\n").unwrap();
        let edits = ProvinceMapper::flat_edits(&changes, std::slice::from_ref(&existing));
        let result = KeyValueParser.merge(&existing, edits);
        assert_eq!(result.text, "stockholm = \"ababab\"\n");
        assert!(!result.touched());
    }

    #[test]
    fn test_check_writable() {
        let mut province = loaded("ABABAB", Some("stockholm"));
        province.location.set_field("color", "rgb { 1 2 3 }");
        assert!(ProvinceMapper::check_writable(&province).is_ok());

        province.rename("new york");
        assert!(matches!(
            ProvinceMapper::check_writable(&province),
            Err(MapDataError::InvalidName(_))
        ));

        province.rename("new_york");
        province.location.climate = "hot # dry".to_string();
        assert!(matches!(
            ProvinceMapper::check_writable(&province),
            Err(MapDataError::InvalidValue { .. })
        ));

        province.location.climate = "arid".to_string();
        province
            .pops
            .upsert(PopDefinition::new("peasants", 1.0, "say \"hi\"", "catholic"));
        assert!(ProvinceMapper::check_writable(&province).is_err());
    }
}
