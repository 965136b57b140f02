/// 事务管理
///
/// 写入前备份每个受影响的文件；提交时删除备份，回滚时逐个恢复。
/// 事务开始时不存在的文件在回滚时会被删除。
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use log::{debug, info, warn};
use serde::Serialize;

use crate::utils::MapDataError;

/// 事务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransactionState {
    Idle,
    InTransaction,
    Committed,
    RolledBack,
}

/// 一个被备份的文件
#[derive(Debug, Clone)]
struct BackupEntry {
    original: PathBuf,
    /// 事务开始时文件不存在则为 None
    backup: Option<PathBuf>,
}

/// 回滚结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackReport {
    /// 从备份恢复的文件数
    pub restored: usize,
    /// 删除的新建文件数
    pub removed: usize,
    /// 恢复失败的文件及原因
    pub failures: Vec<(PathBuf, String)>,
}

impl RollbackReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// 事务管理器
#[derive(Debug)]
pub struct TransactionManager {
    backup_dir: PathBuf,
    state: TransactionState,
    entries: Vec<BackupEntry>,
}

impl TransactionManager {
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            state: TransactionState::Idle,
            entries: Vec::new(),
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == TransactionState::InTransaction
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// 已备份的原始文件
    pub fn backed_up_files(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().map(|e| e.original.as_path())
    }

    /// 开始事务
    pub fn begin(&mut self) -> Result<(), MapDataError> {
        if self.is_active() {
            return Err(MapDataError::TransactionActive);
        }
        self.entries.clear();
        self.state = TransactionState::InTransaction;
        debug!("transaction started");
        Ok(())
    }

    /// 备份一个文件（同一文件只备份一次）
    pub fn backup(&mut self, path: &Path) -> Result<(), MapDataError> {
        if !self.is_active() {
            return Err(MapDataError::NoTransaction);
        }
        if self.entries.iter().any(|e| e.original == path) {
            return Ok(());
        }

        if !path.exists() {
            debug!("backup: {:?} does not exist yet", path);
            self.entries.push(BackupEntry {
                original: path.to_path_buf(),
                backup: None,
            });
            return Ok(());
        }

        fs::create_dir_all(&self.backup_dir)
            .map_err(|e| MapDataError::file_access(&self.backup_dir, e))?;

        let backup = self.backup_dir.join(self.backup_name(path));
        fs::copy(path, &backup).map_err(|e| MapDataError::file_access(path, e))?;
        debug!("backup: {:?} -> {:?}", path, backup);

        self.entries.push(BackupEntry {
            original: path.to_path_buf(),
            backup: Some(backup),
        });
        Ok(())
    }

    /// 提交：删除备份
    pub fn commit(&mut self) -> Result<(), MapDataError> {
        if !self.is_active() {
            return Err(MapDataError::NoTransaction);
        }

        for entry in self.entries.drain(..) {
            if let Some(backup) = entry.backup {
                if let Err(e) = fs::remove_file(&backup) {
                    warn!("could not remove backup {:?}: {}", backup, e);
                }
            }
        }

        self.state = TransactionState::Committed;
        info!("transaction committed");
        Ok(())
    }

    /// 回滚：恢复每个备份文件，删除事务中新建的文件
    ///
    /// 单个文件恢复失败不会中断其余文件，失败记录在报告中。
    pub fn rollback(&mut self) -> Result<RollbackReport, MapDataError> {
        if !self.is_active() {
            return Err(MapDataError::NoTransaction);
        }

        let mut report = RollbackReport::default();

        for entry in self.entries.drain(..).rev() {
            match entry.backup {
                Some(backup) => match fs::copy(&backup, &entry.original) {
                    Ok(_) => {
                        report.restored += 1;
                        if let Err(e) = fs::remove_file(&backup) {
                            warn!("could not remove backup {:?}: {}", backup, e);
                        }
                    }
                    Err(e) => {
                        warn!(
                            "rollback: failed to restore {:?} from {:?}: {}",
                            entry.original, backup, e
                        );
                        report.failures.push((entry.original, e.to_string()));
                    }
                },
                None if entry.original.exists() => match fs::remove_file(&entry.original) {
                    Ok(()) => report.removed += 1,
                    Err(e) => {
                        warn!("rollback: failed to remove {:?}: {}", entry.original, e);
                        report.failures.push((entry.original, e.to_string()));
                    }
                },
                None => {}
            }
        }

        self.state = TransactionState::RolledBack;
        info!(
            "transaction rolled back: {} restored, {} removed, {} failed",
            report.restored,
            report.removed,
            report.failures.len()
        );
        Ok(report)
    }

    /// `<文件名>.<时间戳>.<序号>.backup`
    fn backup_name(&self, path: &Path) -> String {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        format!(
            "{}.{}.{}.backup",
            file_name,
            Local::now().format("%Y%m%d_%H%M%S_%3f"),
            self.entries.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_state_machine() {
        let dir = TempDir::new().unwrap();
        let mut tx = TransactionManager::new(dir.path().join("backup"));
        assert_eq!(tx.state(), TransactionState::Idle);

        assert!(matches!(tx.commit(), Err(MapDataError::NoTransaction)));
        assert!(matches!(
            tx.backup(&dir.path().join("a.txt")),
            Err(MapDataError::NoTransaction)
        ));

        tx.begin().unwrap();
        assert!(matches!(tx.begin(), Err(MapDataError::TransactionActive)));
        tx.commit().unwrap();
        assert_eq!(tx.state(), TransactionState::Committed);

        // 提交后可以开始新事务
        tx.begin().unwrap();
        tx.rollback().unwrap();
        assert_eq!(tx.state(), TransactionState::RolledBack);
    }

    #[test]
    fn test_rollback_restores_and_removes() {
        let dir = TempDir::new().unwrap();
        let existing = dir.path().join("existing.txt");
        let created = dir.path().join("created.txt");
        fs::write(&existing, "original").unwrap();

        let mut tx = TransactionManager::new(dir.path().join("backup"));
        tx.begin().unwrap();
        tx.backup(&existing).unwrap();
        tx.backup(&created).unwrap();
        tx.backup(&existing).unwrap();
        assert_eq!(tx.backed_up_files().count(), 2);

        fs::write(&existing, "changed").unwrap();
        fs::write(&created, "new").unwrap();

        let report = tx.rollback().unwrap();
        assert_eq!(report.restored, 1);
        assert_eq!(report.removed, 1);
        assert!(report.is_clean());
        assert_eq!(fs::read_to_string(&existing).unwrap(), "original");
        assert!(!created.exists());
        // 备份文件已清理
        assert_eq!(fs::read_dir(dir.path().join("backup")).unwrap().count(), 0);
    }

    #[test]
    fn test_commit_deletes_backups() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("pops.txt");
        fs::write(&file, "x").unwrap();

        let mut tx = TransactionManager::new(dir.path().join("backup"));
        tx.begin().unwrap();
        tx.backup(&file).unwrap();
        assert_eq!(fs::read_dir(dir.path().join("backup")).unwrap().count(), 1);

        tx.commit().unwrap();
        assert_eq!(fs::read_dir(dir.path().join("backup")).unwrap().count(), 0);
    }
}
