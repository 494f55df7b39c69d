//! # accessor：成员访问器与成员名解析
//!
//! ## 核心意图（Why）
//! - Rust 没有运行期表达式树，映射声明需要调用方显式给出“读成员”和“写成员”两个函数；
//! - 覆盖语义按成员名生效，因此每个访问器同时携带一段访问表达式文本，由
//!   [`resolve_member_name`] 解析出成员名作为 [`MemberKey`]。
//!
//! ## 行为契约（What）
//! - 接受 `member`、`root.member` 与闭包形式 `|t| t.member`，成员段可以是标识符或元组下标；
//! - 方法调用、下标访问、计算表达式与多级成员链一律拒绝，返回
//!   [`MapperError::InvalidExpression`]；
//! - 解析是纯函数，没有副作用。
//!
//! ## 使用方式（How）
//! - 常规字段使用 [`member!`](crate::member) 宏，表达式文本由 `stringify!` 生成；
//! - 需要自定义表达式文本时使用 [`Member::new`]。

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::error::MapperError;
use crate::shape::ValueType;

/// 单个映射器内部索引成员映射所用的成员名。
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct MemberKey(Arc<str>);

impl MemberKey {
    pub(crate) fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for MemberKey {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for MemberKey {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

/// 从访问表达式中解析被访问成员的名字。
///
/// # 教案式说明
/// - **意图 (Why)**：阻止把映射声明到不可寻址的位置（方法返回值、下标、计算结果）上；
/// - **逻辑 (How)**：
///   1. 去掉首尾空白，识别可选的闭包参数前缀 `|t|`/`|t: &T|`；
///   2. 先按字符识别方法调用与下标，给出更准确的拒绝原因；
///   3. 按 `.` 切分，只允许一段（`member`）或两段（`root.member`）；
///   4. 若带闭包前缀，根段必须等于闭包参数名。
/// - **契约 (What)**：成功返回成员名；失败返回携带原始表达式与原因的
///   [`MapperError::InvalidExpression`]。
pub fn resolve_member_name(expression: &str) -> Result<MemberKey, MapperError> {
    let trimmed = expression.trim();
    if trimmed.is_empty() {
        return Err(MapperError::invalid_expression(expression, "expression is empty"));
    }

    let (parameter, body) = split_closure(expression, trimmed)?;
    if body.contains('(') {
        return Err(MapperError::invalid_expression(
            expression,
            "method calls are not addressable",
        ));
    }
    if body.contains('[') {
        return Err(MapperError::invalid_expression(
            expression,
            "indexers are not addressable",
        ));
    }

    let segments: Vec<&str> = body.split('.').map(str::trim).collect();
    let member = match (segments.as_slice(), parameter) {
        ([member], None) => *member,
        ([root, member], parameter) => {
            if !is_identifier(root) {
                return Err(MapperError::invalid_expression(
                    expression,
                    "computed expressions are not addressable",
                ));
            }
            if parameter.is_some_and(|parameter| parameter != *root) {
                return Err(MapperError::invalid_expression(
                    expression,
                    "access does not start from the closure parameter",
                ));
            }
            *member
        }
        ([_], Some(_)) => {
            return Err(MapperError::invalid_expression(
                expression,
                "access does not start from the closure parameter",
            ));
        }
        _ => {
            return Err(MapperError::invalid_expression(
                expression,
                "nested member chains are not direct accesses",
            ));
        }
    };

    if is_identifier(member) || is_tuple_index(member) {
        Ok(MemberKey::new(member))
    } else {
        Err(MapperError::invalid_expression(
            expression,
            "computed expressions are not addressable",
        ))
    }
}

fn split_closure<'a>(
    expression: &str,
    trimmed: &'a str,
) -> Result<(Option<&'a str>, &'a str), MapperError> {
    let Some(rest) = trimmed.strip_prefix('|') else {
        return Ok((None, trimmed));
    };
    let Some(end) = rest.find('|') else {
        return Err(MapperError::invalid_expression(
            expression,
            "unterminated closure parameter list",
        ));
    };
    let declaration = &rest[..end];
    let parameter = declaration.split(':').next().unwrap_or_default().trim();
    if !is_identifier(parameter) {
        return Err(MapperError::invalid_expression(
            expression,
            "closure must take exactly one named parameter",
        ));
    }
    Ok((Some(parameter), rest[end + 1..].trim()))
}

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) if first == '_' || first.is_alphabetic() => {}
        _ => return false,
    }
    segment != "_" && chars.all(|c| c == '_' || c.is_alphanumeric())
}

fn is_tuple_index(segment: &str) -> bool {
    !segment.is_empty()
        && segment.bytes().all(|b| b.is_ascii_digit())
        && (segment == "0" || !segment.starts_with('0'))
}

/// `Member` 描述类型 `T` 上类型为 `V` 的一个成员：表达式文本、读函数与可变投影函数。
///
/// # 契约说明（What）
/// - 读函数与投影函数必须指向同一个成员，引擎不做交叉校验；
/// - 表达式文本在注册时才解析，构造本身不会失败，便于在常量上下文之外批量声明。
pub struct Member<T, V> {
    expression: Cow<'static, str>,
    get: fn(&T) -> &V,
    get_mut: fn(&mut T) -> &mut V,
}

impl<T, V> Member<T, V> {
    /// 以表达式文本、读函数与可变投影函数构造访问器。
    pub fn new(
        expression: impl Into<Cow<'static, str>>,
        get: fn(&T) -> &V,
        get_mut: fn(&mut T) -> &mut V,
    ) -> Self {
        Self {
            expression: expression.into(),
            get,
            get_mut,
        }
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// 读取成员。
    pub fn get<'a>(&self, value: &'a T) -> &'a V {
        (self.get)(value)
    }

    /// 取得成员的可变引用。
    pub fn get_mut<'a>(&self, value: &'a mut T) -> &'a mut V {
        (self.get_mut)(value)
    }

    pub(crate) fn getter(&self) -> fn(&T) -> &V {
        self.get
    }

    pub(crate) fn projector(&self) -> fn(&mut T) -> &mut V {
        self.get_mut
    }
}

impl<T, V> Member<T, V>
where
    T: 'static,
    V: 'static,
{
    /// 擦除值类型，得到可作为映射源的访问器。
    pub fn into_source(self) -> SourceAccessor<T>
    where
        V: Clone,
    {
        SourceAccessor {
            expression: self.expression,
            value_type: ValueType::of::<V>(),
            reader: Arc::new(FieldReader { get: self.get }),
        }
    }

    /// 擦除值类型，得到可作为映射目标的访问器。
    pub fn into_target(self) -> TargetAccessor<T> {
        TargetAccessor {
            expression: self.expression,
            value_type: ValueType::of::<V>(),
            writer: Arc::new(FieldWriter {
                get_mut: self.get_mut,
            }),
        }
    }
}

impl<T, V> Clone for Member<T, V> {
    fn clone(&self) -> Self {
        Self {
            expression: self.expression.clone(),
            get: self.get,
            get_mut: self.get_mut,
        }
    }
}

impl<T, V> fmt::Debug for Member<T, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Member")
            .field("expression", &self.expression)
            .field("value_type", &std::any::type_name::<V>())
            .finish()
    }
}

/// 针对命名字段构造 [`Member`]。
///
/// ```
/// use spark_mapper::member;
///
/// struct Person {
///     name: String,
/// }
///
/// let name = member!(Person, name);
/// assert_eq!(name.expression(), "name");
/// ```
#[macro_export]
macro_rules! member {
    ($ty:ty, $field:tt) => {
        $crate::accessor::Member::<$ty, _>::new(
            ::core::stringify!($field),
            |value: &$ty| &value.$field,
            |value: &mut $ty| &mut value.$field,
        )
    };
}

trait ValueReader<S>: Send + Sync {
    fn read<'a>(&self, source: &'a S) -> &'a dyn Any;

    fn duplicate(&self, source: &S) -> Box<dyn Any>;
}

struct FieldReader<S, V> {
    get: fn(&S) -> &V,
}

impl<S, V> ValueReader<S> for FieldReader<S, V>
where
    S: 'static,
    V: Clone + 'static,
{
    fn read<'a>(&self, source: &'a S) -> &'a dyn Any {
        (self.get)(source)
    }

    fn duplicate(&self, source: &S) -> Box<dyn Any> {
        Box::new((self.get)(source).clone())
    }
}

trait ValueWriter<T>: Send + Sync {
    /// 写入成功返回 `Ok`；值类型与成员不符时原样退回。
    fn assign(&self, target: &mut T, value: Box<dyn Any>) -> Result<(), Box<dyn Any>>;
}

struct FieldWriter<T, W> {
    get_mut: fn(&mut T) -> &mut W,
}

impl<T, W> ValueWriter<T> for FieldWriter<T, W>
where
    T: 'static,
    W: 'static,
{
    fn assign(&self, target: &mut T, value: Box<dyn Any>) -> Result<(), Box<dyn Any>> {
        let value = value.downcast::<W>()?;
        *(self.get_mut)(target) = *value;
        Ok(())
    }
}

/// 值类型已擦除的源访问器，供转换编译器与声明加载器使用。
pub struct SourceAccessor<S> {
    expression: Cow<'static, str>,
    value_type: ValueType,
    reader: Arc<dyn ValueReader<S>>,
}

impl<S> SourceAccessor<S> {
    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// 借出成员值。
    pub fn read<'a>(&self, source: &'a S) -> &'a dyn Any {
        self.reader.read(source)
    }

    /// 克隆出成员值的拥有型副本。
    pub(crate) fn duplicate(&self, source: &S) -> Box<dyn Any> {
        self.reader.duplicate(source)
    }
}

impl<S> Clone for SourceAccessor<S> {
    fn clone(&self) -> Self {
        Self {
            expression: self.expression.clone(),
            value_type: self.value_type,
            reader: Arc::clone(&self.reader),
        }
    }
}

impl<S> fmt::Debug for SourceAccessor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceAccessor")
            .field("expression", &self.expression)
            .field("value_type", &self.value_type.name())
            .finish()
    }
}

/// 值类型已擦除的目标访问器。
pub struct TargetAccessor<T> {
    expression: Cow<'static, str>,
    value_type: ValueType,
    writer: Arc<dyn ValueWriter<T>>,
}

impl<T> TargetAccessor<T> {
    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub(crate) fn assign(&self, target: &mut T, value: Box<dyn Any>) -> Result<(), Box<dyn Any>> {
        self.writer.assign(target, value)
    }
}

impl<T> Clone for TargetAccessor<T> {
    fn clone(&self) -> Self {
        Self {
            expression: self.expression.clone(),
            value_type: self.value_type,
            writer: Arc::clone(&self.writer),
        }
    }
}

impl<T> fmt::Debug for TargetAccessor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetAccessor")
            .field("expression", &self.expression)
            .field("value_type", &self.value_type.name())
            .finish()
    }
}
