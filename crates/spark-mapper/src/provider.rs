//! 声明提供者与提供者模块。
//!
//! 提供者把一组映射声明打包在一起，由仓储在批量初始化时逐个调用；模块则是调用方
//! 模块系统预先解析好的“提供者工厂清单”，对应按程序集扫描提供者的场景。

use std::any::type_name;
use std::borrow::Cow;
use std::fmt;

use crate::error::MapperError;
use crate::repository::MappingRepository;

/// 映射声明提供者。
///
/// # 契约说明（What）
/// - 批量初始化期间每个提供者恰好被调用一次，参数是正在初始化的仓储；
/// - 返回的错误会中止初始化并原样传播，之前提供者注册的声明保留；
/// - 仓储不会在初始化结束后保留提供者。
pub trait MappingProvider {
    /// 日志中使用的提供者名称。
    fn name(&self) -> &'static str {
        type_name::<Self>()
    }

    fn add_mappings(&self, repository: &MappingRepository) -> Result<(), MapperError>;
}

/// 无参提供者工厂。
pub type ProviderFactory = fn() -> Box<dyn MappingProvider>;

/// 返回以 `P::default()` 构造提供者的工厂。
pub fn factory_of<P>() -> ProviderFactory
where
    P: MappingProvider + Default + 'static,
{
    instantiate::<P>
}

fn instantiate<P>() -> Box<dyn MappingProvider>
where
    P: MappingProvider + Default + 'static,
{
    Box::new(P::default())
}

/// `ProviderModule` 是一个具名的提供者工厂清单。
///
/// # 教案式说明
/// - **意图 (Why)**：宿主的模块系统在启动前发现提供者类型，本类型只承载发现结果；
/// - **契约 (What)**：工厂按加入顺序实例化；空模块合法，初始化时被跳过。
#[derive(Clone)]
pub struct ProviderModule {
    name: Cow<'static, str>,
    factories: Vec<(&'static str, ProviderFactory)>,
}

impl ProviderModule {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            factories: Vec::new(),
        }
    }

    /// 加入可 `Default` 构造的提供者类型。
    pub fn with_provider<P>(self) -> Self
    where
        P: MappingProvider + Default + 'static,
    {
        self.with_factory(type_name::<P>(), factory_of::<P>())
    }

    /// 加入自定义工厂。
    pub fn with_factory(mut self, name: &'static str, factory: ProviderFactory) -> Self {
        self.factories.push((name, factory));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.factories.iter().map(|(name, _)| *name).collect()
    }

    pub(crate) fn instantiate_all(&self) -> Vec<Box<dyn MappingProvider>> {
        self.factories.iter().map(|(_, factory)| factory()).collect()
    }
}

impl fmt::Debug for ProviderModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderModule")
            .field("name", &self.name)
            .field("providers", &self.provider_names())
            .finish()
    }
}
