//! 提供者名到工厂的登记表。

use std::collections::HashMap;
use std::fmt;

use spark_mapper::{MapperError, MappingProvider, MappingRepository, ProviderFactory, factory_of};

use crate::document::ProviderManifest;
use crate::error::ConfigError;

/// `ProviderCatalog` 把文档中的提供者名解析为提供者实例。
///
/// # 教案式说明
/// - **意图 (Why)**：文档只列出名字，具体类型由宿主在启动时登记；
/// - **契约 (What)**：
///   - 缺少 `[providers]` 表或 `names` 键时返回 `InvalidArgument`，不调用任何提供者；
///   - 第 `i` 个名字未登记时返回参数名为 `providers.names[i]` 的 `InvalidArgument`；
///   - 全部名字解析成功后交给 [`MappingRepository::initialize_mappings`]，每个提供者恰好调用一次。
#[derive(Clone, Default)]
pub struct ProviderCatalog {
    factories: HashMap<String, ProviderFactory>,
}

impl ProviderCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以 `Default` 构造登记提供者类型 `P`。
    pub fn register<P>(&mut self, name: impl Into<String>) -> &mut Self
    where
        P: MappingProvider + Default + 'static,
    {
        self.register_factory(name, factory_of::<P>())
    }

    pub fn register_factory(&mut self, name: impl Into<String>, factory: ProviderFactory) -> &mut Self {
        self.factories.insert(name.into(), factory);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// 按清单实例化并运行提供者，返回运行的提供者数量。
    pub fn initialize(
        &self,
        manifest: Option<&ProviderManifest>,
        repository: &MappingRepository,
    ) -> Result<usize, ConfigError> {
        let names = manifest
            .ok_or_else(|| {
                MapperError::invalid_argument("providers", "declaration document has no providers table")
            })?
            .names
            .as_ref()
            .ok_or_else(|| {
                MapperError::invalid_argument("providers.names", "provider collection is missing")
            })?;

        let mut factories = Vec::with_capacity(names.len());
        for (position, name) in names.iter().enumerate() {
            let factory = self.factories.get(name).ok_or_else(|| {
                MapperError::invalid_argument(
                    format!("providers.names[{position}]"),
                    format!("provider `{name}` is not registered"),
                )
            })?;
            factories.push(*factory);
        }

        tracing::debug!(providers = ?names, "resolving providers from declaration document");
        let providers: Vec<Box<dyn MappingProvider>> =
            factories.into_iter().map(|factory| factory()).collect();
        repository.initialize_mappings(providers.iter().map(|provider| Some(provider.as_ref())))?;
        Ok(providers.len())
    }
}

impl fmt::Debug for ProviderCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("ProviderCatalog").field("providers", &names).finish()
    }
}
