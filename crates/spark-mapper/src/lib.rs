//! # spark-mapper
//!
//! ## 定位与职责（Why）
//! - 让调用方一次性声明“如何由源类型实例填充目标类型实例”，之后反复执行该声明；
//! - 声明期即完成成员表达式校验与类型转换路径查找，映射执行期只剩读取、转换与赋值。
//!
//! ## 架构嵌入（Where）
//! - `accessor` 描述成员访问器并解析成员名；`convert` 与 `compiler` 把一对访问器编译为转移动作；
//! - `builder` 提供 `from().to()` 流式声明，`sequence` 组合映射策略；
//! - `mapper` 保存单个类型对的成员绑定，`repository` 按类型对缓存映射器并负责批量初始化；
//! - `provider` 定义声明提供者与提供者模块；`options` 承载仓储配置与覆盖诊断。
//!
//! ## 使用约束（Trade-offs）
//! - 映射是单向的（源 → 目标），每次调用都重新执行，不做双向同步；
//! - 集合只支持逐元素委托给内层映射器，不做集合到集合的通用映射；
//! - 同一对类型互相嵌套会无界递归，声明方需自行避免。

pub mod accessor;
pub mod builder;
pub mod compiler;
pub mod convert;
pub mod error;
pub mod mapper;
pub mod options;
pub mod provider;
pub mod repository;
pub mod sequence;
pub mod shape;

pub use accessor::{Member, MemberKey, SourceAccessor, TargetAccessor, resolve_member_name};
pub use builder::{ElementsStep, MappingBuilder, NestedStep, TargetStep};
pub use compiler::{TransferAction, TransferCompiler};
pub use convert::{ConversionFailure, ConversionTable, Converter};
pub use error::MapperError;
pub use mapper::{BindingKind, ExtensibleMapper};
pub use options::{MapperOptions, OverwriteHook, OverwriteNotice, OverwritePolicy};
pub use provider::{MappingProvider, ProviderFactory, ProviderModule, factory_of};
pub use repository::{MappingRepository, RepositoryBuilder};
pub use sequence::{
    CloneSource, DeclaredMembers, IntoTarget, MapperSequence, MapperSequenceBuilder,
    MapperStrategy, ResetTarget, StrategyOutcome,
};
pub use shape::{ShapeKey, ValueType};
