/// 编辑会话
///
/// 加载全部实体，所有修改仅在内存中进行，`save_changes` 把变更
/// 合并回模组目录下的三类文件。每类的全部候选文件都参与合并：
/// 记录在哪个文件里就改哪个文件。保存在事务中进行：写入前备份，
/// 任一步骤失败则恢复全部文件并返回最初的错误。
use std::collections::HashSet;
use std::path::PathBuf;

use log::{debug, error, info, warn};
use serde::Serialize;

use super::repository::{ProvinceStore, TrackedRepository};
use super::tracker::{Change, ChangeCounts, ChangeTracker, EntityState};
use crate::cache::{DefinitionCache, UnknownValue};
use crate::config::EditorConfig;
use crate::dialect::merge::route;
use crate::dialect::{BlockParser, Dialect, Edit, KeyValueParser, ParsedFile, PopParser};
use crate::io::{DefaultTextReader, DefaultTextWriter, RawText, TextReader, TextWriter};
use crate::layout::{FileCategory, GameLayout, PathResolver};
use crate::loader::{LoadWarning, ProvinceLoader};
use crate::mapping::ProvinceMapper;
use crate::model::{Province, ProvinceId};
use crate::transaction::TransactionManager;
use crate::utils::{fold_key, MapDataError};

/// 一次保存的结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SaveReport {
    /// 保存的实体数（含删除，不含 `unpersisted`）
    pub entities: usize,
    /// 实际写入的文件
    pub files: Vec<PathBuf>,
    /// 新旧名称记录同时存在的键
    pub conflicts: Vec<String>,
    /// 删除了但记录来自游戏本体的实体，重新加载后会再次出现
    pub unpersisted: Vec<ProvinceId>,
}

/// 编辑会话
///
/// # 使用示例
///
/// ```rust,ignore
/// use eu5_mapdata::{EditorConfig, MapSession, ProvinceId};
///
/// let mut session = MapSession::open(EditorConfig::new("game", "my_mod"))?;
/// session
///     .repository()
///     .modify(&ProvinceId::new("ABABAB"), |p| p.location.climate = "arid".into())?;
/// let saved = session.save_changes()?;
/// ```
pub struct MapSession {
    config: EditorConfig,
    resolver: Box<dyn PathResolver>,
    reader: Box<dyn TextReader>,
    writer: Box<dyn TextWriter>,
    store: ProvinceStore,
    tracker: ChangeTracker,
    definitions: DefinitionCache,
    warnings: Vec<LoadWarning>,
    base_keys: HashSet<String>,
}

impl MapSession {
    /// 使用默认目录布局与文件系统 IO 打开会话
    pub fn open(config: EditorConfig) -> Result<Self, MapDataError> {
        Self::with_io(
            config,
            Box::new(GameLayout),
            Box::new(DefaultTextReader),
            Box::new(DefaultTextWriter),
        )
    }

    /// 注入路径解析与读写实现
    pub fn with_io(
        config: EditorConfig,
        resolver: Box<dyn PathResolver>,
        reader: Box<dyn TextReader>,
        writer: Box<dyn TextWriter>,
    ) -> Result<Self, MapDataError> {
        config.validate()?;

        let loaded = ProvinceLoader::new(resolver.as_ref(), reader.as_ref())
            .with_base_population(config.load_base_population)
            .load(&config.base_dir, &config.mod_dir)?;

        let definitions = if config.load_definitions {
            DefinitionCache::load(
                resolver.as_ref(),
                reader.as_ref(),
                &config.base_dir,
                &config.mod_dir,
            )
        } else {
            DefinitionCache::new()
        };

        Ok(Self {
            config,
            resolver,
            reader,
            writer,
            store: loaded.store,
            tracker: ChangeTracker::new(),
            definitions,
            warnings: loaded.warnings,
            base_keys: loaded.base_keys,
        })
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn store(&self) -> &ProvinceStore {
        &self.store
    }

    /// 带追踪的仓储视图，所有修改都应经由它进行
    pub fn repository(&mut self) -> TrackedRepository<'_> {
        TrackedRepository::new(&mut self.store, &mut self.tracker)
    }

    /// 未保存的变更
    pub fn changed(&self) -> Vec<Change<'_>> {
        self.tracker.changes(&self.store)
    }

    pub fn has_changes(&self) -> bool {
        self.tracker.has_changes()
    }

    pub fn counts(&self) -> ChangeCounts {
        self.tracker.counts()
    }

    pub fn definitions(&self) -> &DefinitionCache {
        &self.definitions
    }

    /// 加载时收集的警告
    pub fn warnings(&self) -> &[LoadWarning] {
        &self.warnings
    }

    /// 实体是否有来自游戏本体的记录（模组无法删除）
    pub fn is_base_entity(&self, province: &Province) -> bool {
        self.base_keys.contains(&fold_key(province.id.as_str()))
            || province
                .origin_name()
                .is_some_and(|name| self.base_keys.contains(&fold_key(name)))
    }

    /// 所有实体中不在定义列表里的值
    pub fn unknown_values(&self) -> Vec<(ProvinceId, UnknownValue)> {
        self.store
            .iter()
            .flat_map(|province| {
                self.definitions
                    .unknown_values(province)
                    .into_iter()
                    .map(move |value| (province.id.clone(), value))
            })
            .collect()
    }

    /// 保存全部变更，返回保存的实体数
    pub fn save_changes(&mut self) -> Result<usize, MapDataError> {
        self.save().map(|report| report.entities)
    }

    /// 保存全部变更
    ///
    /// 没有变更时不触碰任何文件。失败时文件被恢复，内存中的变更保留，
    /// 可以修正后重试。删除来自游戏本体的实体时，模组中的记录照常删除，
    /// 实体列入 `unpersisted` 且不计入保存数。
    pub fn save(&mut self) -> Result<SaveReport, MapDataError> {
        if !self.tracker.has_changes() {
            debug!("nothing to save");
            return Ok(SaveReport::default());
        }

        let unpersisted: Vec<ProvinceId> = self
            .changed()
            .into_iter()
            .filter(|change| change.state == EntityState::Deleted)
            .filter(|change| self.is_base_entity(change.province))
            .map(|change| change.province.id.clone())
            .collect();
        for id in &unpersisted {
            warn!("{} is defined by the base game; deleting it in the mod has no effect", id);
        }

        let mut report = SaveReport {
            entities: self.tracker.len() - unpersisted.len(),
            unpersisted,
            ..SaveReport::default()
        };
        let mut tx = TransactionManager::new(self.config.backup_dir());
        tx.begin()?;

        if let Err(e) = self.write_changes(&mut tx, &mut report) {
            error!("save failed: {}", e);
            if tx.is_active() {
                let rollback = tx.rollback()?;
                if !rollback.is_clean() {
                    for (path, reason) in &rollback.failures {
                        warn!("file left modified: {:?} ({})", path, reason);
                    }
                }
            }
            return Err(e);
        }

        let saved: Vec<ProvinceId> = self
            .changed()
            .into_iter()
            .filter(|change| change.state != EntityState::Deleted)
            .map(|change| change.province.id.clone())
            .collect();
        for id in &saved {
            if let Some(province) = self.store.get_mut(id) {
                province.origin_name = province.name.clone();
            }
        }
        self.tracker.accept_all();

        info!(
            "saved {} locations to {} files",
            report.entities,
            report.files.len()
        );
        Ok(report)
    }

    /// 撤销全部未保存的修改，返回被恢复的实体数
    pub fn rollback(&mut self) -> usize {
        let count = self.tracker.reject_all(&mut self.store);
        if count > 0 {
            info!("discarded {} unsaved changes", count);
        }
        count
    }

    /// 依次合并写入三类文件，最后提交
    fn write_changes(
        &self,
        tx: &mut TransactionManager,
        report: &mut SaveReport,
    ) -> Result<(), MapDataError> {
        let changes = self.changed();

        self.write_category(
            &KeyValueParser,
            FileCategory::NamedLocations,
            |files| ProvinceMapper::flat_edits(&changes, files),
            tx,
            report,
        )?;
        self.write_category(
            &BlockParser,
            FileCategory::LocationTemplates,
            |files| ProvinceMapper::block_edits(&changes, files),
            tx,
            report,
        )?;
        self.write_category(
            &PopParser,
            FileCategory::Population,
            |_| ProvinceMapper::pop_edits(&changes),
            tx,
            report,
        )?;

        tx.commit()
    }

    /// 读取并解析某类别在模组中的全部候选文件，把编辑分派到各文件后写回
    ///
    /// 没有候选文件时使用默认保存目标。每个文件在写入前备份，
    /// 合并结果与原文相同的文件不写入。
    fn write_category<D, F>(
        &self,
        dialect: &D,
        category: FileCategory,
        edits: F,
        tx: &mut TransactionManager,
        report: &mut SaveReport,
    ) -> Result<(), MapDataError>
    where
        D: Dialect,
        F: FnOnce(&[ParsedFile<D::Value>]) -> Vec<Edit<D::Value>>,
    {
        let mod_dir = &self.config.mod_dir;
        let mut paths = self.resolver.candidates(mod_dir, category);
        if paths.is_empty() {
            paths.push(self.resolver.save_target(mod_dir, category));
        }

        let mut raws = Vec::with_capacity(paths.len());
        let mut files = Vec::with_capacity(paths.len());
        for path in &paths {
            let raw = if path.is_file() {
                Some(self.reader.read(path)?)
            } else {
                None
            };
            let file = match &raw {
                Some(raw) => dialect
                    .parse(&raw.text)
                    .map_err(|e| MapDataError::structure(path, e))?,
                None => dialect.empty(),
            };
            raws.push(raw);
            files.push(file);
        }

        let edits = edits(&files);
        if edits.is_empty() {
            return Ok(());
        }

        let routed = route(&files, edits);
        for (((path, raw), file), edits) in paths.iter().zip(raws).zip(&files).zip(routed) {
            if edits.is_empty() {
                continue;
            }

            let result = dialect.merge(file, edits);
            if result.text == file.source() {
                debug!("{:?} unchanged", path);
                continue;
            }
            for key in &result.conflicts {
                warn!("{:?}: stale record '{}' replaced by renamed record", path, key);
            }
            debug!(
                "{:?}: {} replaced, {} removed, {} appended",
                path, result.replaced, result.removed, result.appended
            );

            tx.backup(path)?;
            let data = match raw {
                Some(raw) => raw.with_text(result.text),
                None => RawText::utf8(result.text),
            };
            self.writer.write(&data, path)?;

            report.files.push(path.clone());
            report.conflicts.extend(result.conflicts);
        }
        Ok(())
    }
}
