/// 实体映射层
///
/// 在解析器产出的通用结构（键值表、属性块、人口块）与类型化实体之间转换，
/// 并把变更集转换回各文件形态的合并编辑。
///
/// # 架构设计
///
/// - **location**: 属性块 ⇄ `LocationAttributes`
/// - **pops**: 人口块 ⇄ `PopGroup`
/// - **province**: 三类文件 ⇄ `Province`，以及变更 -> 编辑
pub mod location;
pub mod pops;
pub mod province;

// === 导出公共接口 ===
pub use location::LocationMapper;
pub use pops::PopMapper;
pub use province::ProvinceMapper;
