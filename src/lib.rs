pub mod cache;
pub mod config;
pub mod dialect;
pub mod editor;
pub mod io;
pub mod layout;
pub mod loader;
pub mod mapping;
pub mod model;
pub mod transaction;
pub mod utils;

// 重新导出主要结构
pub use cache::{DefinitionCache, DefinitionSet, UnknownValue, ValueListKind};
pub use config::EditorConfig;
pub use dialect::{
    BlockParser, DefinitionParser, Dialect, Edit, KeyValueParser, MergeResult, ParsedFile,
    PopParser,
};
pub use editor::{
    Change, ChangeCounts, ChangeTracker, EntityState, MapSession, ProvinceStore, Repository,
    SaveReport, TrackedRepository,
};
pub use layout::{FileCategory, GameLayout, PathResolver};
pub use loader::{FileCheck, LoadWarning, LoadedStore, ProvinceLoader};
pub use model::{LocationAttributes, PopDefinition, PopGroup, Province, ProvinceId};
pub use transaction::{RollbackReport, TransactionManager, TransactionState};
pub use utils::{MapDataError, ParseError, ParseWarning};
