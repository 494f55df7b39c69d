//! # mapper：可扩展映射器
//!
//! ## 核心意图（Why）
//! - 为固定的（源类型，目标类型）对保存全部成员绑定与策略序列，并提供真正的“立即映射”入口；
//! - 声明可能在仓储初始化后继续追加，读路径却是高频热路径，因此成员表采用写时复制。
//!
//! ## 行为契约（What）
//! - 成员绑定按“最后一次注册”的顺序执行；重复声明同一目标成员会移除旧绑定并追加新绑定；
//! - 任一绑定失败立即返回原始错误，已完成的赋值保留在目标上，不回滚；
//! - 嵌套绑定在执行期经仓储解析内层映射器，内层映射器可以晚于外层声明。
//!
//! ## 并发模型（How）
//! - 成员表与策略序列分别存放在 `ArcSwap` 中，`map` 只做一次原子加载；
//! - 写操作在 `mutation` 互斥锁下复制当前表、修改并整体替换，与
//!   Pipeline 热插拔控制器的 Handler 链更新方式一致。

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::accessor::MemberKey;
use crate::compiler::TransferAction;
use crate::error::MapperError;
use crate::options::{Diagnostics, OverwriteNotice};
use crate::repository::{MappingRepository, RepositoryHandle};
use crate::sequence::{MapperSequence, StrategyOutcome};
use crate::shape::ShapeKey;

/// 成员绑定的种类。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingKind {
    /// 编译后的直接转移动作。
    Transfer,
    /// 委托给内层映射器的嵌套绑定。
    Nested,
    /// 逐元素委托给内层映射器的集合绑定。
    Elements,
}

type NestedFn<S, T> = dyn Fn(&S, &mut T) -> Result<(), MapperError> + Send + Sync;

/// 委托给内层（源，目标）类型对映射器的绑定。
pub(crate) struct NestedBinding<S, T> {
    kind: BindingKind,
    inner: ShapeKey,
    run: Arc<NestedFn<S, T>>,
}

impl<S, T> NestedBinding<S, T>
where
    S: 'static,
    T: 'static,
{
    /// 对单个复合成员递归调用内层映射器。
    pub(crate) fn delegate<V, W>(
        repository: RepositoryHandle,
        get: fn(&S) -> &V,
        get_mut: fn(&mut T) -> &mut W,
    ) -> Self
    where
        V: 'static,
        W: 'static,
    {
        let inner = ShapeKey::of::<V, W>();
        let run = move |source: &S, target: &mut T| -> Result<(), MapperError> {
            let repository = upgrade(&repository, inner)?;
            repository
                .resolve::<V, W>()
                .map(get(source), get_mut(target))
        };
        Self {
            kind: BindingKind::Nested,
            inner,
            run: Arc::new(run),
        }
    }

    /// 对集合成员逐元素调用内层映射器，每个元素映射到一个新的 `W::default()`。
    ///
    /// 全部元素成功后才整体写回目标集合；任一元素失败时目标集合保持原样。
    pub(crate) fn elements<V, W>(
        repository: RepositoryHandle,
        get: fn(&S) -> &Vec<V>,
        get_mut: fn(&mut T) -> &mut Vec<W>,
    ) -> Self
    where
        V: 'static,
        W: Default + 'static,
    {
        let inner = ShapeKey::of::<V, W>();
        let run = move |source: &S, target: &mut T| -> Result<(), MapperError> {
            let repository = upgrade(&repository, inner)?;
            let mapper = repository.resolve::<V, W>();
            let items = get(source);
            let mut mapped = Vec::with_capacity(items.len());
            for item in items {
                let mut element = W::default();
                mapper.map(item, &mut element)?;
                mapped.push(element);
            }
            *get_mut(target) = mapped;
            Ok(())
        };
        Self {
            kind: BindingKind::Elements,
            inner,
            run: Arc::new(run),
        }
    }
}

fn upgrade(handle: &RepositoryHandle, inner: ShapeKey) -> Result<MappingRepository, MapperError> {
    handle
        .upgrade()
        .ok_or_else(|| MapperError::RepositoryReleased {
            shape: inner.to_string(),
        })
}

pub(crate) enum Binding<S, T> {
    Transfer(TransferAction<S, T>),
    Nested(NestedBinding<S, T>),
}

impl<S, T> Binding<S, T> {
    fn kind(&self) -> BindingKind {
        match self {
            Binding::Transfer(_) => BindingKind::Transfer,
            Binding::Nested(nested) => nested.kind,
        }
    }

    fn apply(&self, source: &S, target: &mut T) -> Result<(), MapperError> {
        match self {
            Binding::Transfer(action) => action.invoke(source, target),
            Binding::Nested(nested) => (nested.run)(source, target),
        }
    }
}

struct MemberEntry<S, T> {
    key: MemberKey,
    binding: Binding<S, T>,
}

/// `ExtensibleMapper` 持有一个类型对的全部成员绑定与策略序列。
///
/// # 教案式说明
/// - **意图 (Why)**：仓储为每个类型对只保存一个实例，所有声明都累积到这里；
/// - **契约 (What)**：
///   - [`map`](Self::map) 按策略序列依次尝试，默认序列只包含
///     [`DeclaredMembers`](crate::sequence::DeclaredMembers)；
///   - [`apply_members`](Self::apply_members) 按顺序执行成员绑定，首错即止；
///   - 实例由仓储创建，调用方只能通过 `Arc` 共享。
/// - **风险 (Trade-offs)**：两个类型对互相嵌套会导致无界递归，这由声明方负责避免。
pub struct ExtensibleMapper<S, T> {
    shape: ShapeKey,
    repository: RepositoryHandle,
    diagnostics: Diagnostics,
    members: ArcSwap<Vec<Arc<MemberEntry<S, T>>>>,
    sequence: ArcSwap<MapperSequence<S, T>>,
    mutation: Mutex<()>,
}

impl<S, T> ExtensibleMapper<S, T>
where
    S: 'static,
    T: 'static,
{
    pub(crate) fn new(repository: RepositoryHandle, diagnostics: Diagnostics) -> Self {
        Self {
            shape: ShapeKey::of::<S, T>(),
            repository,
            diagnostics,
            members: ArcSwap::from_pointee(Vec::new()),
            sequence: ArcSwap::from_pointee(MapperSequence::declared_members()),
            mutation: Mutex::new(()),
        }
    }

    /// 按策略序列把 `source` 映射到 `target`。
    pub fn map(&self, source: &S, target: &mut T) -> Result<(), MapperError> {
        let sequence = self.sequence.load_full();
        tracing::trace!(
            source = self.shape.source_name(),
            target = self.shape.target_name(),
            strategies = sequence.len(),
            "mapping"
        );
        for strategy in sequence.strategies() {
            if strategy.apply(self, source, target)? == StrategyOutcome::Handled {
                return Ok(());
            }
        }
        Err(MapperError::NoApplicableStrategy {
            shape: self.shape.to_string(),
        })
    }

    /// 依次执行全部成员绑定。
    pub fn apply_members(&self, source: &S, target: &mut T) -> Result<(), MapperError> {
        let members = self.members.load_full();
        for entry in members.iter() {
            tracing::trace!(member = entry.key.as_str(), "applying member binding");
            entry.binding.apply(source, target)?;
        }
        Ok(())
    }

    /// 当前成员名，按执行顺序排列。
    pub fn member_keys(&self) -> Vec<MemberKey> {
        self.members
            .load()
            .iter()
            .map(|entry| entry.key.clone())
            .collect()
    }

    /// 查询成员绑定种类。
    pub fn binding_kind(&self, member: &str) -> Option<BindingKind> {
        self.members
            .load()
            .iter()
            .find(|entry| entry.key == member)
            .map(|entry| entry.binding.kind())
    }

    /// 嵌套或集合绑定所委托的内层类型对。
    pub fn nested_shape(&self, member: &str) -> Option<ShapeKey> {
        self.members
            .load()
            .iter()
            .find(|entry| entry.key == member)
            .and_then(|entry| match &entry.binding {
                Binding::Nested(nested) => Some(nested.inner),
                Binding::Transfer(_) => None,
            })
    }

    pub fn len(&self) -> usize {
        self.members.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.load().is_empty()
    }

    /// 当前生效的策略序列快照。
    pub fn sequence(&self) -> Arc<MapperSequence<S, T>> {
        self.sequence.load_full()
    }

    /// 所属仓储；仓储已释放时返回 `None`。
    pub fn repository(&self) -> Option<MappingRepository> {
        self.repository.upgrade()
    }

    pub(crate) fn repository_handle(&self) -> RepositoryHandle {
        self.repository.clone()
    }

    /// 注册成员绑定，同名成员后写者胜。
    pub(crate) fn register(&self, key: MemberKey, binding: Binding<S, T>) {
        let kind = binding.kind();
        let replaced = {
            let _guard = self.mutation.lock();
            let current = self.members.load_full();
            let mut next = Vec::with_capacity(current.len() + 1);
            let mut replaced = false;
            for entry in current.iter() {
                if entry.key == key {
                    replaced = true;
                } else {
                    next.push(Arc::clone(entry));
                }
            }
            next.push(Arc::new(MemberEntry {
                key: key.clone(),
                binding,
            }));
            self.members.store(Arc::new(next));
            replaced
        };

        tracing::trace!(
            source = self.shape.source_name(),
            target = self.shape.target_name(),
            member = key.as_str(),
            ?kind,
            "member binding registered"
        );
        if replaced {
            self.diagnostics.report_overwrite(OverwriteNotice {
                shape: self.shape,
                member: key,
            });
        }
    }

    /// 原子替换策略序列。
    pub(crate) fn install_sequence(&self, sequence: Arc<MapperSequence<S, T>>) {
        let _guard = self.mutation.lock();
        tracing::debug!(
            source = self.shape.source_name(),
            target = self.shape.target_name(),
            strategies = ?sequence.names(),
            "mapper sequence committed"
        );
        self.sequence.store(sequence);
    }
}

impl<S, T> ExtensibleMapper<S, T> {
    pub fn shape(&self) -> ShapeKey {
        self.shape
    }
}

impl<S, T> fmt::Debug for ExtensibleMapper<S, T>
where
    S: 'static,
    T: 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let members: Vec<MemberKey> = self
            .members
            .load()
            .iter()
            .map(|entry| entry.key.clone())
            .collect();
        f.debug_struct("ExtensibleMapper")
            .field("shape", &self.shape)
            .field("members", &members)
            .field("sequence", &self.sequence.load().names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tracing_test::traced_test;

    use crate::member;
    use crate::options::{MapperOptions, OverwritePolicy};
    use crate::repository::MappingRepository;

    use super::*;

    #[derive(Clone, Default)]
    struct Order {
        id: u32,
        total: i64,
        note: String,
    }

    #[derive(Default)]
    struct OrderView {
        id: u64,
        total: i32,
        note: String,
    }

    #[test]
    fn members_run_in_last_registered_order() {
        let repository = MappingRepository::new();
        repository
            .declare::<Order, OrderView>()
            .from(member!(Order, id))
            .to(member!(OrderView, id))
            .unwrap()
            .from(member!(Order, note))
            .to(member!(OrderView, note))
            .unwrap()
            .from(member!(Order, id))
            .to(member!(OrderView, id))
            .unwrap();

        let mapper = repository.resolve::<Order, OrderView>();
        assert_eq!(mapper.member_keys(), vec!["note", "id"]);
        assert_eq!(mapper.len(), 2);
        assert_eq!(mapper.binding_kind("id"), Some(BindingKind::Transfer));
        assert_eq!(mapper.nested_shape("id"), None);
    }

    #[test]
    fn first_failure_aborts_and_keeps_earlier_assignments() {
        let repository = MappingRepository::new();
        repository
            .declare::<Order, OrderView>()
            .from(member!(Order, note))
            .to(member!(OrderView, note))
            .unwrap()
            .from(member!(Order, total))
            .to(member!(OrderView, total))
            .unwrap()
            .from(member!(Order, id))
            .to(member!(OrderView, id))
            .unwrap();

        let source = Order {
            id: 5,
            total: i64::MAX,
            note: "rush".into(),
        };
        let mut view = OrderView::default();
        let err = repository.map(&source, &mut view).unwrap_err();
        assert_eq!(err.code(), crate::error::codes::CONVERSION);
        assert_eq!(view.note, "rush");
        assert_eq!(view.id, 0);
    }

    #[test]
    #[traced_test]
    fn overwrite_is_reported_through_tracing_and_hook() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let repository = MappingRepository::builder()
            .overwrite_hook(move |notice| {
                assert_eq!(notice.member, "note");
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build();

        let declare = || {
            repository
                .declare::<Order, OrderView>()
                .from(member!(Order, note))
                .to(member!(OrderView, note))
                .unwrap();
        };
        declare();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        declare();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(logs_contain("member mapping overwritten by a later declaration"));
    }

    #[test]
    #[traced_test]
    fn silent_policy_keeps_overwrite_out_of_warnings() {
        let repository = MappingRepository::with_options(MapperOptions {
            overwrite_policy: OverwritePolicy::Silent,
        });
        for _ in 0..2 {
            repository
                .declare::<Order, OrderView>()
                .from(member!(Order, id))
                .to(member!(OrderView, id))
                .unwrap();
        }
        assert!(!logs_contain("WARN"));
        assert_eq!(repository.resolve::<Order, OrderView>().len(), 1);
    }
}
