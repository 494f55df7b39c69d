//! 声明文档的数据模型。
//!
//! 文档只承载“名字”：类型名、成员名与提供者名。名字到 Rust 类型与访问器的绑定由
//! [`ShapeCatalog`](crate::ShapeCatalog) 与 [`ProviderCatalog`](crate::ProviderCatalog) 完成。

use serde::Deserialize;
use spark_mapper::MapperOptions;

use crate::error::ConfigError;

/// 一份完整的声明文档。
///
/// ```toml
/// [options]
/// overwrite_policy = "warn"
///
/// [providers]
/// names = ["billing"]
///
/// [[type_mapping]]
/// source = "Person"
/// target = "PersonView"
/// members = [{ source = "name", target = "display_name" }]
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeclarationDocument {
    #[serde(default)]
    pub options: MapperOptions,
    #[serde(default)]
    pub providers: Option<ProviderManifest>,
    #[serde(default, rename = "type_mapping")]
    pub type_mappings: Vec<TypeMappingRecord>,
}

impl DeclarationDocument {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}

/// `[providers]` 表。`names` 缺失与空列表不同：前者视为缺少提供者集合。
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderManifest {
    #[serde(default)]
    pub names: Option<Vec<String>>,
}

/// 一条类型对映射记录。
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeMappingRecord {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub members: Vec<MemberPairRecord>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemberPairRecord {
    pub source: String,
    pub target: String,
}
