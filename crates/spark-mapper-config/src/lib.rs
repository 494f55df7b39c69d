//! # spark-mapper-config
//!
//! ## 定位与职责（Why）
//! - 把 TOML 声明文档回放为 `spark-mapper` 的流式声明，映射引擎本身不感知任何文本格式；
//! - 名字到类型、成员与提供者的绑定由调用方在 [`ShapeCatalog`] 与 [`ProviderCatalog`] 中登记。
//!
//! ## 架构嵌入（Where）
//! - `document` 定义文档结构并完成解析；
//! - `catalog` 负责类型/成员名登记与映射记录回放；
//! - `providers` 负责提供者名解析与批量初始化；
//! - `error` 汇总本层错误，引擎错误原样透传。

pub mod catalog;
pub mod document;
pub mod error;
pub mod providers;

pub use catalog::{ShapeCatalog, ShapeRegistration};
pub use document::{DeclarationDocument, MemberPairRecord, ProviderManifest, TypeMappingRecord};
pub use error::{ConfigError, MemberRole};
pub use providers::ProviderCatalog;

use spark_mapper::MappingRepository;

/// 解析文档并构造已完成初始化的仓储。
///
/// # 教案式说明
/// - **逻辑 (How)**：
///   1. 解析文档，以 `[options]` 构造仓储；
///   2. 文档带 `[providers]` 表时按清单运行提供者；
///   3. 按顺序回放全部 `type_mapping` 记录。
/// - **契约 (What)**：任一步骤失败即返回错误，已构造的仓储随之丢弃。
pub fn load(
    text: &str,
    shapes: &ShapeCatalog,
    providers: &ProviderCatalog,
) -> Result<MappingRepository, ConfigError> {
    let document = DeclarationDocument::from_toml_str(text)?;
    let repository = MappingRepository::with_options(document.options.clone());
    if document.providers.is_some() {
        providers.initialize(document.providers.as_ref(), &repository)?;
    }
    let members = shapes.apply(&document, &repository)?;
    tracing::info!(
        shapes = repository.len(),
        members,
        "mapping repository loaded from declaration document"
    );
    Ok(repository)
}
