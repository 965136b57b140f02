/// 实体变更追踪模块
///
/// 记录每个实体自上次保存以来的生命周期状态，并保存首次变更前的快照，
/// 用于生成写回编辑以及在内存中撤销全部未保存的修改。
use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

use super::repository::{ProvinceStore, Repository};
use crate::model::{Province, ProvinceId};

/// 实体生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EntityState {
    Unchanged,
    Added,
    Modified,
    Deleted,
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EntityState::Unchanged => "unchanged",
            EntityState::Added => "added",
            EntityState::Modified => "modified",
            EntityState::Deleted => "deleted",
        };
        f.write_str(label)
    }
}

/// 一条待保存的变更
///
/// 已删除实体引用的是删除前的快照（其中保留了磁盘名称）。
#[derive(Debug, Clone, Copy)]
pub struct Change<'a> {
    pub state: EntityState,
    pub province: &'a Province,
}

/// 追踪条目
#[derive(Debug, Clone)]
struct TrackedEntry {
    state: EntityState,
    /// 首次变更前的快照；新增实体没有快照
    original: Option<Province>,
}

/// 变更统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeCounts {
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
}

impl ChangeCounts {
    pub fn total(&self) -> usize {
        self.added + self.modified + self.deleted
    }
}

impl fmt::Display for ChangeCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "added: {}, modified: {}, deleted: {}",
            self.added, self.modified, self.deleted
        )
    }
}

/// 变更追踪器
///
/// # 状态规则
/// - 新增 -> Added
/// - 修改 -> Modified（Added 保持 Added）
/// - 删除 -> Deleted；Added 实体直接取消追踪（磁盘上从未存在）
/// - 删除后重新新增 -> Modified，继承被删除实体的磁盘名称
#[derive(Debug, Clone, Default)]
pub struct ChangeTracker {
    entries: IndexMap<ProvinceId, TrackedEntry>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录新增，返回应继承的磁盘名称（重新新增已删除实体时）
    pub fn on_add(&mut self, province: &Province) -> Option<String> {
        if let Some(entry) = self.entries.get_mut(&province.id) {
            if entry.state == EntityState::Deleted {
                entry.state = EntityState::Modified;
                return entry
                    .original
                    .as_ref()
                    .and_then(|p| p.origin_name.clone());
            }
        }

        self.entries.insert(
            province.id.clone(),
            TrackedEntry {
                state: EntityState::Added,
                original: None,
            },
        );
        None
    }

    /// 记录修改，`before` 为修改前的实体
    pub fn on_update(&mut self, before: &Province) {
        self.entries
            .entry(before.id.clone())
            .or_insert_with(|| TrackedEntry {
                state: EntityState::Modified,
                original: Some(before.clone()),
            });
    }

    /// 记录删除，`removed` 为被删除的实体
    pub fn on_delete(&mut self, removed: Province) {
        match self.entries.get(&removed.id).map(|entry| entry.state) {
            Some(EntityState::Added) => {
                self.entries.shift_remove(&removed.id);
            }
            Some(_) => {
                if let Some(entry) = self.entries.get_mut(&removed.id) {
                    entry.state = EntityState::Deleted;
                }
            }
            None => {
                self.entries.insert(
                    removed.id.clone(),
                    TrackedEntry {
                        state: EntityState::Deleted,
                        original: Some(removed),
                    },
                );
            }
        }
    }

    pub fn state(&self, id: &ProvinceId) -> EntityState {
        self.entries
            .get(id)
            .map_or(EntityState::Unchanged, |entry| entry.state)
    }

    pub fn is_deleted(&self, id: &ProvinceId) -> bool {
        self.state(id) == EntityState::Deleted
    }

    /// 已删除实体的快照（保存前仍可访问）
    pub fn deleted(&self, id: &ProvinceId) -> Option<&Province> {
        self.entries
            .get(id)
            .filter(|entry| entry.state == EntityState::Deleted)
            .and_then(|entry| entry.original.as_ref())
    }

    /// 当前所有变更（按首次变更顺序）
    pub fn changes<'a>(&'a self, store: &'a ProvinceStore) -> Vec<Change<'a>> {
        self.entries
            .iter()
            .filter_map(|(id, entry)| {
                let province = match entry.state {
                    EntityState::Deleted => entry.original.as_ref(),
                    _ => store.get(id),
                }?;
                Some(Change {
                    state: entry.state,
                    province,
                })
            })
            .collect()
    }

    pub fn has_changes(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn counts(&self) -> ChangeCounts {
        let mut counts = ChangeCounts::default();
        for entry in self.entries.values() {
            match entry.state {
                EntityState::Added => counts.added += 1,
                EntityState::Modified => counts.modified += 1,
                EntityState::Deleted => counts.deleted += 1,
                EntityState::Unchanged => {}
            }
        }
        counts
    }

    /// 保存成功后调用：所有实体回到 Unchanged
    pub fn accept_all(&mut self) {
        self.entries.clear();
    }

    /// 撤销全部未保存的修改，把存储恢复到快照状态
    ///
    /// 返回被恢复的实体数量。
    pub fn reject_all(&mut self, store: &mut ProvinceStore) -> usize {
        let count = self.entries.len();
        for (id, entry) in self.entries.drain(..) {
            match (entry.state, entry.original) {
                (EntityState::Added, _) => {
                    store.remove_entry(&id);
                }
                (_, Some(original)) => store.restore(original),
                (_, None) => {
                    store.remove_entry(&id);
                }
            }
        }
        count
    }
}
