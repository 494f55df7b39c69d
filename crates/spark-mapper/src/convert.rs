//! # convert：值转换表
//!
//! ## 定位与职责（Why）
//! - 转换编译器在声明期查表决定“源值类型 → 目标成员类型”是否存在转换路径，
//!   查不到即为 `TypeMismatch`，不会拖到映射执行期；
//! - 表项在执行期负责真正的转换，收窄溢出等数据相关失败只能在此时发现。
//!
//! ## 内置转换（What）
//! - 全部整数类型两两之间：无损方向走 `From`，收窄方向走 `TryFrom` 并在溢出时失败；
//! - 整数 → 浮点，`f32` ↔ `f64`，浮点 → 整数（要求有限且落在目标范围内，向零截断）；
//! - `bool` → 整数（0/1）；
//! - 字符串族：`String`、`Arc<str>`、`Box<str>`、`&'static str` 之间的互转，
//!   数值、`bool`、`char` → `String`；
//! - 标量 `V` → `Option<V>`。
//!
//! 同类型之间的恒等转换不经过本表，由编译器直接克隆源值。

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::shape::ValueType;

/// 执行期转换失败的描述。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversionFailure {
    detail: String,
}

impl ConversionFailure {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }

    /// 值超出目标类型表示范围。
    pub fn out_of_range(value: impl fmt::Display, target: &'static str) -> Self {
        Self::new(format!("value {value} is out of range for `{target}`"))
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub(crate) fn into_detail(self) -> String {
        self.detail
    }
}

impl fmt::Display for ConversionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.detail)
    }
}

/// 类型擦除后的转换函数。
pub type Converter =
    Arc<dyn Fn(&dyn Any) -> Result<Box<dyn Any>, ConversionFailure> + Send + Sync>;

/// `ConversionTable` 以 `(源类型, 目标类型)` 为键保存转换函数。
///
/// # 教案式说明
/// - **意图 (Why)**：仓储内所有映射器共享同一张表，调用方可以追加领域类型的转换；
/// - **契约 (What)**：
///   - 同一类型对重复注册时后者覆盖前者；
///   - 已编译的转移动作持有查表当时拿到的 [`Converter`]，之后的覆盖不影响它们；
/// - **并发 (How)**：读多写少，使用 `parking_lot::RwLock` 保护内部 `HashMap`。
pub struct ConversionTable {
    converters: RwLock<HashMap<(TypeId, TypeId), Converter>>,
}

impl ConversionTable {
    /// 构造空表。
    pub fn new() -> Self {
        Self {
            converters: RwLock::new(HashMap::new()),
        }
    }

    /// 构造预置全部内置转换的表。
    pub fn with_builtins() -> Self {
        let table = Self::new();
        register_builtins(&table);
        table
    }

    /// 注册 `A → B` 的转换函数。
    pub fn register<A, B, F>(&self, convert: F)
    where
        A: 'static,
        B: 'static,
        F: Fn(&A) -> Result<B, ConversionFailure> + Send + Sync + 'static,
    {
        let converter: Converter = Arc::new(move |value: &dyn Any| {
            let typed = value.downcast_ref::<A>().ok_or_else(|| {
                ConversionFailure::new(format!("expected a `{}` value", type_name::<A>()))
            })?;
            convert(typed).map(|converted| Box::new(converted) as Box<dyn Any>)
        });
        self.converters
            .write()
            .insert((TypeId::of::<A>(), TypeId::of::<B>()), converter);
    }

    /// 查询转换函数，不存在时返回 `None`。
    pub fn lookup(&self, source: ValueType, target: ValueType) -> Option<Converter> {
        self.converters
            .read()
            .get(&(source.id(), target.id()))
            .cloned()
    }

    /// 是否存在 `A → B` 的转换。
    pub fn contains<A: 'static, B: 'static>(&self) -> bool {
        self.converters
            .read()
            .contains_key(&(TypeId::of::<A>(), TypeId::of::<B>()))
    }

    pub fn len(&self) -> usize {
        self.converters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.read().is_empty()
    }
}

impl Default for ConversionTable {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for ConversionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionTable")
            .field("len", &self.len())
            .finish()
    }
}

macro_rules! integer_row {
    ($table:ident, $from:ty => [$($to:ty),+]) => {
        $(
            $table.register::<$from, $to, _>(|value: &$from| {
                <$to>::try_from(*value)
                    .map_err(|_| ConversionFailure::out_of_range(value, stringify!($to)))
            });
        )+
    };
}

macro_rules! integer_matrix {
    ($table:ident, $targets:tt, $($from:ty),+) => {
        $( integer_row!($table, $from => $targets); )+
    };
}

macro_rules! integer_to_float {
    ($table:ident, $($from:ty),+) => {
        $(
            $table.register::<$from, f64, _>(|value: &$from| Ok(*value as f64));
            $table.register::<$from, f32, _>(|value: &$from| {
                let widened = *value as f32;
                if widened.is_finite() {
                    Ok(widened)
                } else {
                    Err(ConversionFailure::out_of_range(value, "f32"))
                }
            });
        )+
    };
}

macro_rules! float_to_integer {
    ($table:ident, $from:ty => $($to:ty),+) => {
        $(
            $table.register::<$from, $to, _>(|value: &$from| {
                // `MAX as float` rounds up to 2^bits for wide targets, so the upper bound is exclusive.
                let bits = if <$to>::MIN == 0 { <$to>::BITS } else { <$to>::BITS - 1 };
                let upper = <$from>::from(2_u8).powi(bits as i32);
                let truncated = value.trunc();
                if truncated.is_finite()
                    && truncated >= <$to>::MIN as $from
                    && truncated < upper
                {
                    Ok(truncated as $to)
                } else {
                    Err(ConversionFailure::out_of_range(value, stringify!($to)))
                }
            });
        )+
    };
}

macro_rules! bool_to_integer {
    ($table:ident, $($to:ty),+) => {
        $( $table.register::<bool, $to, _>(|value: &bool| Ok(u8::from(*value) as $to)); )+
    };
}

macro_rules! display_to_string {
    ($table:ident, $($from:ty),+) => {
        $( $table.register::<$from, String, _>(|value: &$from| Ok(value.to_string())); )+
    };
}

macro_rules! wrap_in_option {
    ($table:ident, $($ty:ty),+) => {
        $( $table.register::<$ty, Option<$ty>, _>(|value: &$ty| Ok(Some(value.clone()))); )+
    };
}

fn register_builtins(table: &ConversionTable) {
    integer_matrix!(
        table,
        [i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize],
        i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize
    );
    integer_to_float!(table, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);
    float_to_integer!(table, f64 => i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);
    float_to_integer!(table, f32 => i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);
    bool_to_integer!(table, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

    table.register::<f32, f64, _>(|value: &f32| Ok(f64::from(*value)));
    table.register::<f64, f32, _>(|value: &f64| {
        let narrowed = *value as f32;
        if value.is_finite() && narrowed.is_infinite() {
            Err(ConversionFailure::out_of_range(value, "f32"))
        } else {
            Ok(narrowed)
        }
    });

    display_to_string!(
        table, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, bool,
        char
    );
    table.register::<&'static str, String, _>(|value: &&'static str| Ok((*value).to_owned()));
    table.register::<&'static str, Arc<str>, _>(|value: &&'static str| Ok(Arc::from(*value)));
    table.register::<String, Arc<str>, _>(|value: &String| Ok(Arc::from(value.as_str())));
    table.register::<String, Box<str>, _>(|value: &String| Ok(value.clone().into_boxed_str()));
    table.register::<Arc<str>, String, _>(|value: &Arc<str>| Ok(value.to_string()));
    table.register::<Box<str>, String, _>(|value: &Box<str>| Ok(value.to_string()));

    wrap_in_option!(
        table, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, bool,
        char, String
    );
}
