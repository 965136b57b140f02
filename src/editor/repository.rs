/// 仓储模块
///
/// `ProvinceStore` 是普通的内存存储；`TrackedRepository` 在其上叠加变更追踪，
/// 调用方的所有修改都应经由它进行，保存时才能知道哪些实体需要写回。
use indexmap::IndexMap;
use log::debug;

use super::tracker::ChangeTracker;
use crate::mapping::ProvinceMapper;
use crate::model::{Province, ProvinceId};
use crate::utils::{same_key, MapDataError};

/// 通用仓储接口
pub trait Repository {
    type Key;
    type Entity;

    fn get(&self, key: &Self::Key) -> Option<&Self::Entity>;

    fn all(&self) -> Vec<&Self::Entity>;

    fn find(&self, predicate: &dyn Fn(&Self::Entity) -> bool) -> Vec<&Self::Entity>;

    fn contains(&self, key: &Self::Key) -> bool {
        self.get(key).is_some()
    }

    fn add(&mut self, entity: Self::Entity) -> Result<(), MapDataError>;

    fn update(&mut self, entity: Self::Entity) -> Result<(), MapDataError>;

    fn delete(&mut self, key: &Self::Key) -> Result<Self::Entity, MapDataError>;
}

/// 内存中的实体存储（保持加载顺序）
#[derive(Debug, Clone, Default)]
pub struct ProvinceStore {
    provinces: IndexMap<ProvinceId, Province>,
}

impl ProvinceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.provinces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.provinces.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Province> {
        self.provinces.values()
    }

    /// 按名称查找（不区分大小写）
    pub fn find_by_name(&self, name: &str) -> Option<&Province> {
        self.provinces
            .values()
            .find(|p| p.name.as_deref().is_some_and(|n| same_key(n, name)))
    }

    /// 按标识或名称查找
    pub fn lookup(&self, id_or_name: &str) -> Option<&Province> {
        self.provinces
            .get(&ProvinceId::new(id_or_name))
            .or_else(|| self.find_by_name(id_or_name))
    }

    /// 名称 -> 标识表（只包含有名称的实体）
    pub fn name_index(&self) -> IndexMap<String, ProvinceId> {
        self.provinces
            .values()
            .filter_map(|p| p.name.clone().map(|name| (name, p.id.clone())))
            .collect()
    }

    /// 名称是否被其他实体占用
    pub fn name_taken(&self, name: &str, except: &ProvinceId) -> bool {
        self.provinces
            .values()
            .any(|p| &p.id != except && p.name.as_deref().is_some_and(|n| same_key(n, name)))
    }

    /// 直接插入或覆盖（加载与撤销使用）
    pub(crate) fn insert(&mut self, province: Province) {
        self.provinces.insert(province.id.clone(), province);
    }

    /// 覆盖或重新插入快照
    pub(crate) fn restore(&mut self, province: Province) {
        self.insert(province);
    }

    pub(crate) fn remove_entry(&mut self, id: &ProvinceId) -> Option<Province> {
        self.provinces.shift_remove(id)
    }

    pub(crate) fn get_mut(&mut self, id: &ProvinceId) -> Option<&mut Province> {
        self.provinces.get_mut(id)
    }
}

impl FromIterator<Province> for ProvinceStore {
    fn from_iter<I: IntoIterator<Item = Province>>(iter: I) -> Self {
        let mut store = Self::new();
        for province in iter {
            store.insert(province);
        }
        store
    }
}

impl Repository for ProvinceStore {
    type Key = ProvinceId;
    type Entity = Province;

    fn get(&self, key: &ProvinceId) -> Option<&Province> {
        self.provinces.get(key)
    }

    fn all(&self) -> Vec<&Province> {
        self.provinces.values().collect()
    }

    fn find(&self, predicate: &dyn Fn(&Province) -> bool) -> Vec<&Province> {
        self.provinces.values().filter(|p| predicate(p)).collect()
    }

    fn add(&mut self, entity: Province) -> Result<(), MapDataError> {
        if self.provinces.contains_key(&entity.id) {
            return Err(MapDataError::DuplicateEntity(entity.id.to_string()));
        }
        self.insert(entity);
        Ok(())
    }

    fn update(&mut self, entity: Province) -> Result<(), MapDataError> {
        match self.provinces.get_mut(&entity.id) {
            Some(slot) => {
                *slot = entity;
                Ok(())
            }
            None => Err(MapDataError::EntityNotFound(entity.id.to_string())),
        }
    }

    fn delete(&mut self, key: &ProvinceId) -> Result<Province, MapDataError> {
        self.remove_entry(key)
            .ok_or_else(|| MapDataError::EntityNotFound(key.to_string()))
    }
}

/// 带变更追踪的仓储视图
///
/// # 规则
/// - `add`：标识已存在 -> `DuplicateEntity`；名称被占用 -> `DuplicateName`
/// - `add`/`update`：名称不是单个记号 -> `InvalidName`；字段无法写出 -> `InvalidValue`
/// - `update`：未知标识 -> `EntityNotFound`；已删除未保存 -> `EntityDeleted`
/// - `delete`：新增后删除的实体直接取消追踪
/// - 磁盘名称由存储维护，调用方传入的值会被忽略
pub struct TrackedRepository<'a> {
    store: &'a mut ProvinceStore,
    tracker: &'a mut ChangeTracker,
}

impl<'a> TrackedRepository<'a> {
    pub fn new(store: &'a mut ProvinceStore, tracker: &'a mut ChangeTracker) -> Self {
        Self { store, tracker }
    }

    pub fn tracker(&self) -> &ChangeTracker {
        self.tracker
    }

    /// 读取、修改并回写一个实体
    pub fn modify<F>(&mut self, id: &ProvinceId, edit: F) -> Result<(), MapDataError>
    where
        F: FnOnce(&mut Province),
    {
        let mut province = self.current(id)?.clone();
        edit(&mut province);
        self.update(province)
    }

    pub fn rename(&mut self, id: &ProvinceId, name: impl Into<String>) -> Result<(), MapDataError> {
        let name = name.into();
        self.modify(id, |province| province.rename(name))
    }

    fn current(&self, id: &ProvinceId) -> Result<&Province, MapDataError> {
        if self.tracker.is_deleted(id) {
            return Err(MapDataError::EntityDeleted(id.to_string()));
        }
        self.store
            .get(id)
            .ok_or_else(|| MapDataError::EntityNotFound(id.to_string()))
    }

    /// 名称与字段必须能写成合法文本，名称不能被其他实体占用
    fn check_entity(&self, province: &Province) -> Result<(), MapDataError> {
        ProvinceMapper::check_writable(province)?;
        match &province.name {
            Some(name) if self.store.name_taken(name, &province.id) => {
                Err(MapDataError::DuplicateName(name.clone()))
            }
            _ => Ok(()),
        }
    }
}

impl Repository for TrackedRepository<'_> {
    type Key = ProvinceId;
    type Entity = Province;

    fn get(&self, key: &ProvinceId) -> Option<&Province> {
        self.store.get(key)
    }

    fn all(&self) -> Vec<&Province> {
        self.store.all()
    }

    fn find(&self, predicate: &dyn Fn(&Province) -> bool) -> Vec<&Province> {
        self.store.find(predicate)
    }

    fn add(&mut self, mut entity: Province) -> Result<(), MapDataError> {
        if self.store.contains(&entity.id) {
            return Err(MapDataError::DuplicateEntity(entity.id.to_string()));
        }
        self.check_entity(&entity)?;

        entity.origin_name = self.tracker.on_add(&entity);
        debug!("add {} ({})", entity.id, self.tracker.state(&entity.id));
        self.store.add(entity)
    }

    fn update(&mut self, mut entity: Province) -> Result<(), MapDataError> {
        self.check_entity(&entity)?;
        if self.tracker.is_deleted(&entity.id) {
            return Err(MapDataError::EntityDeleted(entity.id.to_string()));
        }
        let before = self
            .store
            .get(&entity.id)
            .ok_or_else(|| MapDataError::EntityNotFound(entity.id.to_string()))?;

        entity.origin_name = before.origin_name.clone();
        self.tracker.on_update(before);
        debug!("update {} ({})", entity.id, self.tracker.state(&entity.id));
        self.store.update(entity)
    }

    fn delete(&mut self, key: &ProvinceId) -> Result<Province, MapDataError> {
        if self.tracker.is_deleted(key) {
            return Err(MapDataError::EntityDeleted(key.to_string()));
        }
        let removed = self.store.delete(key)?;
        self.tracker.on_delete(removed.clone());
        debug!("delete {} ({})", key, self.tracker.state(key));
        Ok(removed)
    }
}
