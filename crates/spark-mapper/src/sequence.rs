//! # sequence：映射策略序列
//!
//! ## 核心意图（Why）
//! - 一个类型对的“如何填充目标”可以由多种策略组合而成：先清空、再按成员转移，
//!   或直接整体克隆；
//! - 序列在构建期间不可见，只有 `finally` 封口后才原子地提交给所属映射器，
//!   正在执行的 `map` 调用不会看到半成品序列。
//!
//! ## 行为契约（What）
//! - 策略按顺序尝试：返回 [`StrategyOutcome::Handled`] 即停止，返回
//!   [`StrategyOutcome::Skipped`] 则交给下一个；全部跳过时映射失败；
//! - 序列非空且封口后不可变；
//! - 所属映射器在提交时已释放，返回 [`MapperError::InvalidArgument`]。

use std::any::type_name;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::error::MapperError;
use crate::mapper::ExtensibleMapper;

/// 单个策略的执行结果。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrategyOutcome {
    /// 本策略已完成映射，后续策略不再执行。
    Handled,
    /// 本策略未完成映射，继续尝试下一个策略。
    Skipped,
}

/// 映射策略：序列中的一个步骤。
///
/// # 契约说明（What）
/// - 策略通过 `Default` 构造，由 [`MapperSequenceBuilder`] 按类型实例化；
/// - 返回错误会立即终止整个 `map` 调用，错误原样传播。
pub trait MapperStrategy<S, T>: Send + Sync + 'static {
    /// 诊断用名称，默认取实现类型的短名。
    fn name(&self) -> &'static str {
        short_type_name(type_name::<Self>())
    }

    fn apply(
        &self,
        mapper: &ExtensibleMapper<S, T>,
        source: &S,
        target: &mut T,
    ) -> Result<StrategyOutcome, MapperError>;
}

fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// 执行映射器上声明的全部成员绑定。默认序列只包含此策略。
#[derive(Clone, Copy, Debug, Default)]
pub struct DeclaredMembers;

impl<S, T> MapperStrategy<S, T> for DeclaredMembers
where
    S: 'static,
    T: 'static,
{
    fn apply(
        &self,
        mapper: &ExtensibleMapper<S, T>,
        source: &S,
        target: &mut T,
    ) -> Result<StrategyOutcome, MapperError> {
        mapper.apply_members(source, target)?;
        Ok(StrategyOutcome::Handled)
    }
}

/// 源与目标同类型时，以源的克隆整体替换目标。
#[derive(Clone, Copy, Debug, Default)]
pub struct CloneSource;

impl<S> MapperStrategy<S, S> for CloneSource
where
    S: Clone + 'static,
{
    fn apply(
        &self,
        _mapper: &ExtensibleMapper<S, S>,
        source: &S,
        target: &mut S,
    ) -> Result<StrategyOutcome, MapperError> {
        target.clone_from(source);
        Ok(StrategyOutcome::Handled)
    }
}

/// 通过 `Into` 把源的克隆转换为目标。
#[derive(Clone, Copy, Debug, Default)]
pub struct IntoTarget;

impl<S, T> MapperStrategy<S, T> for IntoTarget
where
    S: Clone + Into<T> + 'static,
    T: 'static,
{
    fn apply(
        &self,
        _mapper: &ExtensibleMapper<S, T>,
        source: &S,
        target: &mut T,
    ) -> Result<StrategyOutcome, MapperError> {
        *target = source.clone().into();
        Ok(StrategyOutcome::Handled)
    }
}

/// 把目标重置为 `T::default()`，随后交给下一个策略。
#[derive(Clone, Copy, Debug, Default)]
pub struct ResetTarget;

impl<S, T> MapperStrategy<S, T> for ResetTarget
where
    S: 'static,
    T: Default + 'static,
{
    fn apply(
        &self,
        _mapper: &ExtensibleMapper<S, T>,
        _source: &S,
        target: &mut T,
    ) -> Result<StrategyOutcome, MapperError> {
        *target = T::default();
        Ok(StrategyOutcome::Skipped)
    }
}

/// 封口后的策略序列。
pub struct MapperSequence<S, T> {
    strategies: Vec<Box<dyn MapperStrategy<S, T>>>,
}

impl<S, T> MapperSequence<S, T>
where
    S: 'static,
    T: 'static,
{
    /// 由策略实例构造序列；空列表返回 `InvalidArgument`。
    pub fn new(strategies: Vec<Box<dyn MapperStrategy<S, T>>>) -> Result<Self, MapperError> {
        if strategies.is_empty() {
            return Err(MapperError::invalid_argument(
                "strategies",
                "a mapper sequence needs at least one strategy",
            ));
        }
        Ok(Self { strategies })
    }

    /// 只包含 [`DeclaredMembers`] 的默认序列。
    pub fn declared_members() -> Self {
        Self {
            strategies: vec![Box::new(DeclaredMembers)],
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|strategy| strategy.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub(crate) fn strategies(&self) -> impl Iterator<Item = &dyn MapperStrategy<S, T>> {
        self.strategies.iter().map(|strategy| strategy.as_ref())
    }
}

impl<S, T> fmt::Debug for MapperSequence<S, T>
where
    S: 'static,
    T: 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MapperSequence").field(&self.names()).finish()
    }
}

/// `MapperSequenceBuilder` 以类型为单位累积策略，`finally` 时封口并提交。
///
/// # 教案式说明
/// - **意图 (Why)**：保持 `then::<A>().then::<B>().finally::<C>()` 式的链式声明；
/// - **契约 (What)**：
///   - 状态机 `{Building} → (then)* → (finally) → {Sealed}`，`finally` 消耗构建器；
///   - 构建器只持有所属映射器的弱引用，不延长其生命周期；
///   - 封口后的序列整体替换所属映射器的当前序列。
/// - **风险 (Trade-offs)**：同一映射器上并发封口的两个序列按提交先后覆盖，后提交者生效。
pub struct MapperSequenceBuilder<S, T> {
    owner: Weak<ExtensibleMapper<S, T>>,
    strategies: Vec<Box<dyn MapperStrategy<S, T>>>,
}

impl<S, T> MapperSequenceBuilder<S, T>
where
    S: 'static,
    T: 'static,
{
    pub fn new(owner: Weak<ExtensibleMapper<S, T>>) -> Self {
        Self {
            owner,
            strategies: Vec::new(),
        }
    }

    /// 追加策略 `A`。
    pub fn then<A>(mut self) -> Self
    where
        A: MapperStrategy<S, T> + Default,
    {
        self.strategies.push(Box::new(A::default()));
        self
    }

    /// 追加策略实例，适用于无法 `Default` 构造的策略。
    pub fn then_with(mut self, strategy: impl MapperStrategy<S, T>) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    /// 追加最后一个策略 `A`，封口并提交给所属映射器。
    pub fn finally<A>(self) -> Result<Arc<MapperSequence<S, T>>, MapperError>
    where
        A: MapperStrategy<S, T> + Default,
    {
        self.then::<A>().seal()
    }

    fn seal(self) -> Result<Arc<MapperSequence<S, T>>, MapperError> {
        let owner = self.owner.upgrade().ok_or_else(|| {
            MapperError::invalid_argument(
                "owner",
                "the declaration owning this sequence no longer exists",
            )
        })?;
        let sequence = Arc::new(MapperSequence::new(self.strategies)?);
        owner.install_sequence(Arc::clone(&sequence));
        Ok(sequence)
    }
}

impl<S, T> fmt::Debug for MapperSequenceBuilder<S, T>
where
    S: 'static,
    T: 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&'static str> = self.strategies.iter().map(|s| s.name()).collect();
        f.debug_struct("MapperSequenceBuilder")
            .field("strategies", &names)
            .field("owner_alive", &(self.owner.strong_count() > 0))
            .finish()
    }
}
