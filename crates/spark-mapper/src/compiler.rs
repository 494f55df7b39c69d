//! # compiler：转移动作编译器
//!
//! 把一对（源访问器，目标访问器）编译为一个可反复调用的 [`TransferAction`]：
//! 读取源值、转换为目标成员类型并赋值。转换路径在编译时确定，缺失即报
//! [`MapperError::TypeMismatch`]。

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::accessor::{MemberKey, SourceAccessor, TargetAccessor, resolve_member_name};
use crate::convert::{ConversionTable, Converter};
use crate::error::MapperError;

type TransferFn<S, T> = dyn Fn(&S, &mut T) -> Result<(), MapperError> + Send + Sync;

/// 编译完成的单成员转移动作。
///
/// # 契约说明（What）
/// - 调用时对目标实例恰好执行一次赋值，不修改源实例；
/// - 每次编译得到独立的动作，动作之间不共享可变状态；
/// - 失败时目标成员保持调用前的值。
pub struct TransferAction<S, T> {
    member: MemberKey,
    run: Arc<TransferFn<S, T>>,
}

impl<S, T> TransferAction<S, T> {
    /// 目标成员名。
    pub fn member(&self) -> &MemberKey {
        &self.member
    }

    /// 执行转移。
    pub fn invoke(&self, source: &S, target: &mut T) -> Result<(), MapperError> {
        (self.run)(source, target)
    }
}

impl<S, T> fmt::Debug for TransferAction<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferAction")
            .field("member", &self.member)
            .finish_non_exhaustive()
    }
}

enum Plan {
    Identity,
    Convert(Converter),
}

/// `TransferCompiler` 借用仓储的转换表完成编译。
///
/// # 教案式说明
/// - **逻辑 (How)**：
///   1. 解析目标与源表达式，二者都必须是直接成员访问；
///   2. 值类型相同走恒等路径（克隆源值），否则在转换表中查找转换函数；
///   3. 生成闭包：读取/转换源值后交给目标访问器赋值。
/// - **契约 (What)**：任何失败都发生在返回之前，调用方据此保证“失败不注册”。
pub struct TransferCompiler<'a> {
    conversions: &'a ConversionTable,
}

impl<'a> TransferCompiler<'a> {
    pub fn new(conversions: &'a ConversionTable) -> Self {
        Self { conversions }
    }

    pub fn compile<S, T>(
        &self,
        source: SourceAccessor<S>,
        target: TargetAccessor<T>,
    ) -> Result<TransferAction<S, T>, MapperError>
    where
        S: 'static,
        T: 'static,
    {
        let member = resolve_member_name(target.expression())?;
        resolve_member_name(source.expression())?;

        let source_type = source.value_type();
        let target_type = target.value_type();
        let plan = if source_type == target_type {
            Plan::Identity
        } else {
            let converter = self
                .conversions
                .lookup(source_type, target_type)
                .ok_or_else(|| MapperError::TypeMismatch {
                    member: member.to_string(),
                    source_type: source_type.name(),
                    target_type: target_type.name(),
                })?;
            Plan::Convert(converter)
        };

        let member_name = member.clone();
        let run = move |value: &S, destination: &mut T| -> Result<(), MapperError> {
            let converted: Box<dyn Any> = match &plan {
                Plan::Identity => source.duplicate(value),
                Plan::Convert(converter) => {
                    converter(source.read(value)).map_err(|failure| MapperError::Conversion {
                        member: member_name.to_string(),
                        source_type: source_type.name(),
                        target_type: target_type.name(),
                        detail: failure.into_detail(),
                    })?
                }
            };
            target
                .assign(destination, converted)
                .map_err(|_| MapperError::Conversion {
                    member: member_name.to_string(),
                    source_type: source_type.name(),
                    target_type: target_type.name(),
                    detail: "converted value does not match the member type".to_owned(),
                })
        };

        Ok(TransferAction {
            member,
            run: Arc::new(run),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::Member;
    use crate::member;

    #[derive(Default)]
    struct Source {
        age: i32,
        label: String,
    }

    #[derive(Default)]
    struct Target {
        age: i64,
        small: u8,
        label: String,
        tags: Vec<String>,
    }

    fn compiler_parts() -> ConversionTable {
        ConversionTable::with_builtins()
    }

    #[test]
    fn widening_transfer_assigns_once() {
        let table = compiler_parts();
        let action = TransferCompiler::new(&table)
            .compile(
                member!(Source, age).into_source(),
                member!(Target, age).into_target(),
            )
            .unwrap();
        assert_eq!(action.member(), &"age");

        let source = Source {
            age: 42,
            label: "kept".into(),
        };
        let mut target = Target::default();
        action.invoke(&source, &mut target).unwrap();
        assert_eq!(target.age, 42_i64);
        assert_eq!(source.label, "kept");
    }

    #[test]
    fn identity_transfer_clones_value() {
        let table = compiler_parts();
        let action = TransferCompiler::new(&table)
            .compile(
                member!(Source, label).into_source(),
                member!(Target, label).into_target(),
            )
            .unwrap();
        let source = Source {
            age: 0,
            label: "x".into(),
        };
        let mut target = Target::default();
        action.invoke(&source, &mut target).unwrap();
        assert_eq!(target.label, "x");
    }

    #[test]
    fn missing_conversion_is_a_compile_error() {
        let table = compiler_parts();
        let err = TransferCompiler::new(&table)
            .compile(
                member!(Source, label).into_source(),
                member!(Target, tags).into_target(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            MapperError::TypeMismatch { ref member, .. } if member == "tags"
        ));
    }

    #[test]
    fn narrowing_overflow_fails_at_call_time() {
        let table = compiler_parts();
        let action = TransferCompiler::new(&table)
            .compile(
                member!(Source, age).into_source(),
                member!(Target, small).into_target(),
            )
            .unwrap();
        let mut target = Target {
            small: 9,
            ..Target::default()
        };
        let source = Source {
            age: 1_000,
            label: String::new(),
        };
        let err = action.invoke(&source, &mut target).unwrap_err();
        assert_eq!(err.code(), crate::error::codes::CONVERSION);
        assert_eq!(target.small, 9);
    }

    #[test]
    fn invalid_target_expression_is_rejected() {
        let table = compiler_parts();
        let target = Member::<Target, i64>::new("t.get_age()", |t| &t.age, |t| &mut t.age);
        let err = TransferCompiler::new(&table)
            .compile(member!(Source, age).into_source(), target.into_target())
            .unwrap_err();
        assert_eq!(err.code(), crate::error::codes::INVALID_EXPRESSION);
    }

    #[test]
    fn compiled_actions_are_independent() {
        let table = compiler_parts();
        let compiler = TransferCompiler::new(&table);
        let first = compiler
            .compile(
                member!(Source, age).into_source(),
                member!(Target, age).into_target(),
            )
            .unwrap();
        let second = compiler
            .compile(
                member!(Source, age).into_source(),
                member!(Target, age).into_target(),
            )
            .unwrap();
        let mut a = Target::default();
        let mut b = Target::default();
        first
            .invoke(&Source { age: 1, label: String::new() }, &mut a)
            .unwrap();
        second
            .invoke(&Source { age: 2, label: String::new() }, &mut b)
            .unwrap();
        assert_eq!((a.age, b.age), (1, 2));
    }
}
