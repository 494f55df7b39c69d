//! # repository：映射仓储
//!
//! ## 核心意图（Why）
//! - 以（源类型，目标类型）为键缓存唯一的 [`ExtensibleMapper`]，声明与映射都经由同一实例；
//! - 提供批量初始化入口，把分散在各处的声明提供者一次性装配进仓储。
//!
//! ## 行为契约（What）
//! - [`MappingRepository::resolve`] 首次请求时构造映射器，之后（包括并发首次访问）
//!   总是返回同一个 `Arc`；
//! - 批量初始化先校验全部条目，任何缺失条目都在调用第一个提供者之前报错；
//! - 仓储句柄可廉价克隆，所有克隆共享同一份缓存。
//!
//! ## 并发模型（How）
//! - 缓存使用 `DashMap` 的 entry API，在分片锁内完成“检查并插入”，
//!   与会话管理器注册会话的方式一致；
//! - 映射器只通过弱引用回指仓储，仓储释放后嵌套映射返回
//!   [`MapperError::RepositoryReleased`]。

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use dashmap::DashMap;

use crate::builder::MappingBuilder;
use crate::convert::{ConversionFailure, ConversionTable};
use crate::error::MapperError;
use crate::mapper::ExtensibleMapper;
use crate::options::{Diagnostics, MapperOptions, OverwriteHook, OverwriteNotice};
use crate::provider::{MappingProvider, ProviderModule};
use crate::shape::ShapeKey;

type ErasedMapper = Arc<dyn Any + Send + Sync>;

pub(crate) struct RepositoryShared {
    mappers: DashMap<ShapeKey, ErasedMapper>,
    conversions: ConversionTable,
    options: MapperOptions,
    overwrite_hook: Option<OverwriteHook>,
}

/// 映射器持有的仓储弱引用。
#[derive(Clone)]
pub(crate) struct RepositoryHandle(Weak<RepositoryShared>);

impl RepositoryHandle {
    pub(crate) fn upgrade(&self) -> Option<MappingRepository> {
        self.0.upgrade().map(|shared| MappingRepository { shared })
    }
}

/// `MappingRepository` 是映射声明与映射器缓存的入口。
///
/// # 教案式说明
/// - **意图 (Why)**：调用方只需记住“类型对”，不必自己管理映射器实例；
/// - **契约 (What)**：
///   - 每个类型对恰好对应一个映射器，懒创建、永不重建；
///   - 同一类型对的重复声明累积到同一个映射器，按成员后写者胜；
///   - 转换表、配置与覆盖钩子在构造时确定，映射器创建时拷贝诊断设置。
/// - **风险 (Trade-offs)**：缓存只增不减；类型对数量由代码中的声明决定，通常是有界的。
#[derive(Clone)]
pub struct MappingRepository {
    shared: Arc<RepositoryShared>,
}

impl MappingRepository {
    /// 使用默认配置与内置转换表构造仓储。
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn with_options(options: MapperOptions) -> Self {
        Self::builder().options(options).build()
    }

    pub fn builder() -> RepositoryBuilder {
        RepositoryBuilder::default()
    }

    /// 取得（或首次创建）类型对 `S → T` 的映射器。
    pub fn resolve<S, T>(&self) -> Arc<ExtensibleMapper<S, T>>
    where
        S: 'static,
        T: 'static,
    {
        let key = ShapeKey::of::<S, T>();
        let cached = self
            .shared
            .mappers
            .get(&key)
            .map(|existing| Arc::clone(existing.value()));
        let erased = match cached {
            Some(existing) => existing,
            None => {
                let entry = self.shared.mappers.entry(key).or_insert_with(|| {
                    tracing::debug!(
                        source = key.source_name(),
                        target = key.target_name(),
                        "mapper constructed"
                    );
                    Arc::new(ExtensibleMapper::<S, T>::new(
                        self.handle(),
                        self.diagnostics(),
                    )) as ErasedMapper
                });
                Arc::clone(entry.value())
            }
        };
        match erased.downcast::<ExtensibleMapper<S, T>>() {
            Ok(mapper) => mapper,
            Err(_) => unreachable!("mapper cached under `{key}` has a different shape"),
        }
    }

    /// 打开类型对 `S → T` 的流式声明。
    pub fn declare<S, T>(&self) -> MappingBuilder<S, T>
    where
        S: 'static,
        T: 'static,
    {
        MappingBuilder::new(self.clone(), self.resolve::<S, T>())
    }

    /// 立即把 `source` 映射到已有的 `target`。
    pub fn map<S, T>(&self, source: &S, target: &mut T) -> Result<(), MapperError>
    where
        S: 'static,
        T: 'static,
    {
        self.resolve::<S, T>().map(source, target)
    }

    /// 从 `T::default()` 出发映射出新的目标实例。
    pub fn map_new<S, T>(&self, source: &S) -> Result<T, MapperError>
    where
        S: 'static,
        T: Default + 'static,
    {
        let mut target = T::default();
        self.map(source, &mut target)?;
        Ok(target)
    }

    /// 类型对是否已有映射器（声明或解析过）。
    pub fn contains<S: 'static, T: 'static>(&self) -> bool {
        self.shared.mappers.contains_key(&ShapeKey::of::<S, T>())
    }

    pub fn len(&self) -> usize {
        self.shared.mappers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.mappers.is_empty()
    }

    /// 已缓存的全部类型对，顺序不作保证。
    pub fn shapes(&self) -> Vec<ShapeKey> {
        self.shared
            .mappers
            .iter()
            .map(|entry| *entry.key())
            .collect()
    }

    /// 追加领域类型转换；只影响之后编译的转移动作。
    pub fn register_conversion<A, B, F>(&self, convert: F)
    where
        A: 'static,
        B: 'static,
        F: Fn(&A) -> Result<B, ConversionFailure> + Send + Sync + 'static,
    {
        self.shared.conversions.register::<A, B, F>(convert);
    }

    pub fn conversions(&self) -> &ConversionTable {
        &self.shared.conversions
    }

    pub fn options(&self) -> &MapperOptions {
        &self.shared.options
    }

    /// 两个句柄是否指向同一仓储。
    pub fn ptr_eq(&self, other: &MappingRepository) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// 依次调用提供者完成批量初始化。
    ///
    /// # 教案式说明
    /// - **契约 (What)**：
    ///   - 条目为 `None` 时返回 `InvalidArgument`，参数名形如 `providers[2]`，
    ///     此时没有任何提供者被调用；
    ///   - 校验通过后每个提供者按顺序恰好调用一次，首个错误中止并原样返回。
    pub fn initialize_mappings<'p, I>(&self, providers: I) -> Result<(), MapperError>
    where
        I: IntoIterator<Item = Option<&'p dyn MappingProvider>>,
    {
        let mut validated = Vec::new();
        for (position, provider) in providers.into_iter().enumerate() {
            match provider {
                Some(provider) => validated.push(provider),
                None => {
                    return Err(MapperError::invalid_argument(
                        format!("providers[{position}]"),
                        "provider entry is missing",
                    ));
                }
            }
        }
        self.run_providers(&validated)
    }

    /// [`initialize_mappings`](Self::initialize_mappings) 的无空位版本。
    pub fn initialize_providers(&self, providers: &[&dyn MappingProvider]) -> Result<(), MapperError> {
        self.run_providers(providers)
    }

    /// 实例化各模块中的全部提供者并逐个调用。
    pub fn initialize_from_modules(&self, modules: &[ProviderModule]) -> Result<(), MapperError> {
        let mut providers = Vec::new();
        for module in modules {
            tracing::debug!(
                module = module.name(),
                providers = module.len(),
                "provider module discovered"
            );
            providers.extend(module.instantiate_all());
        }
        let borrowed: Vec<&dyn MappingProvider> =
            providers.iter().map(|provider| provider.as_ref()).collect();
        self.run_providers(&borrowed)
    }

    fn run_providers(&self, providers: &[&dyn MappingProvider]) -> Result<(), MapperError> {
        tracing::info!(count = providers.len(), "initializing mapping providers");
        for provider in providers {
            tracing::debug!(provider = provider.name(), "adding mappings");
            provider.add_mappings(self)?;
        }
        Ok(())
    }

    fn handle(&self) -> RepositoryHandle {
        RepositoryHandle(Arc::downgrade(&self.shared))
    }

    fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            policy: self.shared.options.overwrite_policy,
            hook: self.shared.overwrite_hook.clone(),
        }
    }
}

impl Default for MappingRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MappingRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingRepository")
            .field("mappers", &self.shared.mappers.len())
            .field("conversions", &self.shared.conversions)
            .field("options", &self.shared.options)
            .finish()
    }
}

/// 仓储构建器。
#[derive(Default)]
pub struct RepositoryBuilder {
    options: MapperOptions,
    overwrite_hook: Option<OverwriteHook>,
    conversions: Option<ConversionTable>,
}

impl RepositoryBuilder {
    pub fn options(mut self, options: MapperOptions) -> Self {
        self.options = options;
        self
    }

    /// 成员覆盖时的回调。
    pub fn overwrite_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&OverwriteNotice) + Send + Sync + 'static,
    {
        self.overwrite_hook = Some(Arc::new(hook));
        self
    }

    /// 替换内置转换表。
    pub fn conversions(mut self, conversions: ConversionTable) -> Self {
        self.conversions = Some(conversions);
        self
    }

    pub fn build(self) -> MappingRepository {
        MappingRepository {
            shared: Arc::new(RepositoryShared {
                mappers: DashMap::new(),
                conversions: self.conversions.unwrap_or_default(),
                options: self.options,
                overwrite_hook: self.overwrite_hook,
            }),
        }
    }
}

impl fmt::Debug for RepositoryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryBuilder")
            .field("options", &self.options)
            .field("overwrite_hook", &self.overwrite_hook.is_some())
            .field("custom_conversions", &self.conversions.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member;

    #[derive(Default)]
    struct Account {
        balance: i32,
    }

    #[derive(Default, Debug, PartialEq)]
    struct AccountView {
        balance: i64,
    }

    #[test]
    fn resolve_is_memoised() {
        let repository = MappingRepository::new();
        assert!(repository.is_empty());
        let first = repository.resolve::<Account, AccountView>();
        let second = repository.resolve::<Account, AccountView>();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(repository.contains::<Account, AccountView>());
        assert!(!repository.contains::<AccountView, Account>());
        assert_eq!(repository.shapes(), vec![ShapeKey::of::<Account, AccountView>()]);
    }

    #[test]
    fn clones_share_the_cache() {
        let repository = MappingRepository::new();
        let clone = repository.clone();
        assert!(repository.ptr_eq(&clone));
        let first = repository.resolve::<Account, AccountView>();
        assert!(Arc::ptr_eq(&first, &clone.resolve::<Account, AccountView>()));
        assert!(!repository.ptr_eq(&MappingRepository::new()));
    }

    #[test]
    fn map_new_starts_from_default() {
        let repository = MappingRepository::new();
        repository
            .declare::<Account, AccountView>()
            .from(member!(Account, balance))
            .to(member!(AccountView, balance))
            .unwrap();
        let view: AccountView = repository.map_new(&Account { balance: -3 }).unwrap();
        assert_eq!(view, AccountView { balance: -3 });
    }

    #[test]
    fn custom_conversion_table_replaces_builtins() {
        let repository = MappingRepository::builder()
            .conversions(ConversionTable::new())
            .build();
        let err = repository
            .declare::<Account, AccountView>()
            .from(member!(Account, balance))
            .to(member!(AccountView, balance))
            .unwrap_err();
        assert_eq!(err.code(), crate::error::codes::TYPE_MISMATCH);

        repository.register_conversion::<i32, i64, _>(|value: &i32| Ok(i64::from(*value) * 100));
        repository
            .declare::<Account, AccountView>()
            .from(member!(Account, balance))
            .to(member!(AccountView, balance))
            .unwrap();
        let view: AccountView = repository.map_new(&Account { balance: 2 }).unwrap();
        assert_eq!(view.balance, 200);
    }

    #[test]
    fn released_repository_fails_nested_mapping() {
        #[derive(Default)]
        struct Outer {
            inner: Account,
        }
        #[derive(Default)]
        struct OuterView {
            inner: AccountView,
        }

        let mapper = {
            let repository = MappingRepository::new();
            repository
                .declare::<Outer, OuterView>()
                .from_nested(member!(Outer, inner))
                .to(member!(OuterView, inner))
                .unwrap();
            repository.resolve::<Outer, OuterView>()
        };
        assert!(mapper.repository().is_none());
        let err = mapper
            .map(&Outer::default(), &mut OuterView::default())
            .unwrap_err();
        assert_eq!(err.code(), crate::error::codes::REPOSITORY_RELEASED);
    }
}
