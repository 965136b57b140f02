/// 编辑器层模块
///
/// 该模块提供有状态的编辑接口，支持变更追踪与事务式保存。
/// 遵循"修改-保存分离"原则，所有修改操作仅在内存中进行，需要显式调用保存。
///
/// # 架构设计
///
/// - **tracker**: 实体生命周期追踪（Added / Modified / Deleted）
/// - **repository**: 内存存储与带追踪的仓储视图
/// - **session**: 加载、编辑、保存的工作单元
///
/// # 使用示例
///
/// ```rust,ignore
/// use eu5_mapdata::{EditorConfig, MapSession, ProvinceId};
///
/// let mut session = MapSession::open(EditorConfig::new("game", "my_mod"))?;
/// session.repository().rename(&ProvinceId::new("ABABAB"), "holmia")?;
/// println!("保存了 {} 个实体", session.save_changes()?);
/// ```
pub mod repository;
pub mod session;
pub mod tracker;

// === 导出公共接口 ===
pub use repository::{ProvinceStore, Repository, TrackedRepository};
pub use session::{MapSession, SaveReport};
pub use tracker::{Change, ChangeCounts, ChangeTracker, EntityState};
