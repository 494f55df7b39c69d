//! # builder：流式映射声明
//!
//! ## 核心意图（Why）
//! - 以 `from(源成员).to(目标成员)` 的链式写法声明成员映射，每一步都立即校验；
//! - 每个步骤都是持有映射器 `Arc` 的普通值，不依赖任何全局构建状态。
//!
//! ## 行为契约（What）
//! - [`TargetStep::to`] 编译转移动作并注册，返回同一映射器上的新 [`MappingBuilder`]；
//! - [`NestedStep::to`] 与 [`ElementsStep::to`] 不编译转移动作，而是注册委托给内层
//!   映射器的绑定；
//! - 校验失败（`InvalidExpression`、`TypeMismatch`）时什么都不注册。

use std::fmt;
use std::sync::Arc;

use crate::accessor::{Member, MemberKey, SourceAccessor, TargetAccessor, resolve_member_name};
use crate::compiler::TransferCompiler;
use crate::error::MapperError;
use crate::mapper::{Binding, ExtensibleMapper, NestedBinding};
use crate::repository::MappingRepository;
use crate::sequence::MapperSequenceBuilder;

/// 源角色：选择下一条映射的源成员。
///
/// ```
/// use spark_mapper::{MappingRepository, member};
///
/// #[derive(Default)]
/// struct Person { age: i32 }
/// #[derive(Default)]
/// struct PersonView { age: i64 }
///
/// let repository = MappingRepository::new();
/// repository
///     .declare::<Person, PersonView>()
///     .from(member!(Person, age))
///     .to(member!(PersonView, age))?;
///
/// let view: PersonView = repository.map_new(&Person { age: 42 })?;
/// assert_eq!(view.age, 42);
/// # Ok::<(), spark_mapper::MapperError>(())
/// ```
pub struct MappingBuilder<S, T> {
    repository: MappingRepository,
    mapper: Arc<ExtensibleMapper<S, T>>,
}

impl<S, T> MappingBuilder<S, T>
where
    S: 'static,
    T: 'static,
{
    pub(crate) fn new(repository: MappingRepository, mapper: Arc<ExtensibleMapper<S, T>>) -> Self {
        Self { repository, mapper }
    }

    /// 以成员访问器作为源，值在映射时被克隆或转换。
    pub fn from<V>(self, member: Member<S, V>) -> TargetStep<S, T>
    where
        V: Clone + 'static,
    {
        self.from_accessor(member.into_source())
    }

    /// 以已擦除值类型的源访问器作为源。
    pub fn from_accessor(self, source: SourceAccessor<S>) -> TargetStep<S, T> {
        TargetStep {
            builder: self,
            source,
        }
    }

    /// 把复合成员交给 `(V, W)` 类型对的映射器处理。
    pub fn from_nested<V>(self, member: Member<S, V>) -> NestedStep<S, T, V>
    where
        V: 'static,
    {
        NestedStep {
            builder: self,
            source: member,
        }
    }

    /// 把集合成员逐元素交给 `(V, W)` 类型对的映射器处理。
    pub fn from_elements<V>(self, member: Member<S, Vec<V>>) -> ElementsStep<S, T, V>
    where
        V: 'static,
    {
        ElementsStep {
            builder: self,
            source: member,
        }
    }

    /// 为同一声明打开策略序列构建器。
    pub fn sequence(&self) -> MapperSequenceBuilder<S, T> {
        MapperSequenceBuilder::new(Arc::downgrade(&self.mapper))
    }

    pub fn mapper(&self) -> &Arc<ExtensibleMapper<S, T>> {
        &self.mapper
    }

    pub fn repository(&self) -> &MappingRepository {
        &self.repository
    }

    fn register(self, binding: Binding<S, T>, member: MemberKey) -> Self {
        self.mapper.register(member, binding);
        self
    }
}

impl<S, T> Clone for MappingBuilder<S, T> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            mapper: Arc::clone(&self.mapper),
        }
    }
}

impl<S, T> fmt::Debug for MappingBuilder<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingBuilder")
            .field("shape", &self.mapper.shape())
            .finish()
    }
}

/// 目标角色：已选定源成员，等待目标成员。
pub struct TargetStep<S, T> {
    builder: MappingBuilder<S, T>,
    source: SourceAccessor<S>,
}

impl<S, T> TargetStep<S, T>
where
    S: 'static,
    T: 'static,
{
    /// 编译并注册转移动作。
    pub fn to<W>(self, member: Member<T, W>) -> Result<MappingBuilder<S, T>, MapperError>
    where
        W: 'static,
    {
        self.to_accessor(member.into_target())
    }

    pub fn to_accessor(self, target: TargetAccessor<T>) -> Result<MappingBuilder<S, T>, MapperError> {
        let TargetStep { builder, source } = self;
        let action = TransferCompiler::new(builder.repository.conversions()).compile(source, target)?;
        let member = action.member().clone();
        Ok(builder.register(Binding::Transfer(action), member))
    }
}

impl<S, T> fmt::Debug for TargetStep<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetStep")
            .field("shape", &self.builder.mapper.shape())
            .field("source", &self.source)
            .finish()
    }
}

/// 嵌套映射的目标角色。
pub struct NestedStep<S, T, V> {
    builder: MappingBuilder<S, T>,
    source: Member<S, V>,
}

impl<S, T, V> NestedStep<S, T, V>
where
    S: 'static,
    T: 'static,
    V: 'static,
{
    /// 注册嵌套绑定；内层映射器在映射时才解析，可以晚于本声明。
    pub fn to<W>(self, member: Member<T, W>) -> Result<MappingBuilder<S, T>, MapperError>
    where
        W: 'static,
    {
        let NestedStep { builder, source } = self;
        resolve_member_name(source.expression())?;
        let key = resolve_member_name(member.expression())?;
        let binding = NestedBinding::delegate(
            builder.mapper.repository_handle(),
            source.getter(),
            member.projector(),
        );
        Ok(builder.register(Binding::Nested(binding), key))
    }
}

impl<S, T, V> fmt::Debug for NestedStep<S, T, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NestedStep")
            .field("shape", &self.builder.mapper.shape())
            .field("source", &self.source)
            .finish()
    }
}

/// 集合逐元素映射的目标角色。
pub struct ElementsStep<S, T, V> {
    builder: MappingBuilder<S, T>,
    source: Member<S, Vec<V>>,
}

impl<S, T, V> ElementsStep<S, T, V>
where
    S: 'static,
    T: 'static,
    V: 'static,
{
    /// 注册集合绑定，目标集合在全部元素映射成功后整体替换。
    pub fn to<W>(self, member: Member<T, Vec<W>>) -> Result<MappingBuilder<S, T>, MapperError>
    where
        W: Default + 'static,
    {
        let ElementsStep { builder, source } = self;
        resolve_member_name(source.expression())?;
        let key = resolve_member_name(member.expression())?;
        let binding = NestedBinding::elements(
            builder.mapper.repository_handle(),
            source.getter(),
            member.projector(),
        );
        Ok(builder.register(Binding::Nested(binding), key))
    }
}

impl<S, T, V> fmt::Debug for ElementsStep<S, T, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementsStep")
            .field("shape", &self.builder.mapper.shape())
            .field("source", &self.source)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::BindingKind;
    use crate::member;

    #[derive(Clone, Default)]
    struct Line {
        sku: String,
        quantity: u16,
    }

    #[derive(Default, Debug, PartialEq)]
    struct LineView {
        sku: String,
        quantity: u32,
    }

    #[derive(Default)]
    struct Invoice {
        number: u64,
        lines: Vec<Line>,
        primary: Line,
    }

    #[derive(Default)]
    struct InvoiceView {
        number: u64,
        lines: Vec<LineView>,
        primary: LineView,
    }

    fn declare_lines(repository: &MappingRepository) {
        repository
            .declare::<Line, LineView>()
            .from(member!(Line, sku))
            .to(member!(LineView, sku))
            .unwrap()
            .from(member!(Line, quantity))
            .to(member!(LineView, quantity))
            .unwrap();
    }

    #[test]
    fn nested_and_element_bindings_delegate() {
        let repository = MappingRepository::new();
        let builder = repository
            .declare::<Invoice, InvoiceView>()
            .from(member!(Invoice, number))
            .to(member!(InvoiceView, number))
            .unwrap()
            .from_nested(member!(Invoice, primary))
            .to(member!(InvoiceView, primary))
            .unwrap()
            .from_elements(member!(Invoice, lines))
            .to(member!(InvoiceView, lines))
            .unwrap();
        // inner mapper declared after the outer one
        declare_lines(&repository);

        let mapper = builder.mapper();
        assert_eq!(mapper.binding_kind("primary"), Some(BindingKind::Nested));
        assert_eq!(mapper.binding_kind("lines"), Some(BindingKind::Elements));
        assert_eq!(
            mapper.nested_shape("lines"),
            Some(crate::shape::ShapeKey::of::<Line, LineView>())
        );

        let invoice = Invoice {
            number: 7,
            lines: vec![
                Line {
                    sku: "A".into(),
                    quantity: 1,
                },
                Line {
                    sku: "B".into(),
                    quantity: 2,
                },
            ],
            primary: Line {
                sku: "P".into(),
                quantity: 9,
            },
        };
        let view: InvoiceView = repository.map_new(&invoice).unwrap();
        assert_eq!(view.number, 7);
        assert_eq!(view.primary.sku, "P");
        assert_eq!(view.primary.quantity, 9);
        assert_eq!(
            view.lines,
            vec![
                LineView {
                    sku: "A".into(),
                    quantity: 1
                },
                LineView {
                    sku: "B".into(),
                    quantity: 2
                },
            ]
        );
    }

    #[test]
    fn failed_steps_register_nothing() {
        let repository = MappingRepository::new();
        let bad_target = Member::<LineView, u32>::new("|v| v.total()", |v| &v.quantity, |v| {
            &mut v.quantity
        });
        let err = repository
            .declare::<Line, LineView>()
            .from(member!(Line, quantity))
            .to(bad_target)
            .unwrap_err();
        assert_eq!(err.code(), crate::error::codes::INVALID_EXPRESSION);

        let err = repository
            .declare::<Line, LineView>()
            .from(member!(Line, sku))
            .to(member!(LineView, quantity))
            .unwrap_err();
        assert_eq!(err.code(), crate::error::codes::TYPE_MISMATCH);

        let bad_nested = Member::<Invoice, Line>::new("primary.clone()", |i| &i.primary, |i| {
            &mut i.primary
        });
        let err = repository
            .declare::<Invoice, InvoiceView>()
            .from_nested(bad_nested)
            .to(member!(InvoiceView, primary))
            .unwrap_err();
        assert_eq!(err.code(), crate::error::codes::INVALID_EXPRESSION);

        assert!(repository.resolve::<Line, LineView>().is_empty());
        assert!(repository.resolve::<Invoice, InvoiceView>().is_empty());
    }

    #[test]
    fn element_failure_leaves_target_collection_untouched() {
        #[derive(Default)]
        struct Batch {
            sizes: Vec<i64>,
        }
        #[derive(Default)]
        struct BatchView {
            sizes: Vec<u8>,
        }
        let repository = MappingRepository::new();
        repository
            .declare::<i64, u8>()
            .sequence()
            .finally::<crate::sequence::ResetTarget>()
            .unwrap();
        repository
            .declare::<Batch, BatchView>()
            .from_elements(member!(Batch, sizes))
            .to(member!(BatchView, sizes))
            .unwrap();

        let mut view = BatchView { sizes: vec![1, 2] };
        let err = repository
            .map(&Batch { sizes: vec![5] }, &mut view)
            .unwrap_err();
        assert_eq!(err.code(), crate::error::codes::NO_STRATEGY);
        assert_eq!(view.sizes, vec![1, 2]);
    }
}
