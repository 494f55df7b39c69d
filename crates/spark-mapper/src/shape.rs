use std::any::{TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};

/// `ShapeKey` 标识一对（源类型，目标类型），是映射仓储的索引键。
///
/// # 教案式说明
/// - **意图 (Why)**：仓储按类型对缓存映射器，需要一个可哈希、可打印的键；
/// - **契约 (What)**：
///   - 相等性只比较两个 `TypeId`，即结构化的类型相等，不感知任何“派生/继承”关系；
///   - 类型名仅用于日志与错误信息，不参与比较。
#[derive(Clone, Copy, Debug)]
pub struct ShapeKey {
    source: TypeId,
    target: TypeId,
    source_name: &'static str,
    target_name: &'static str,
}

impl ShapeKey {
    /// 由类型参数构造键。
    pub fn of<S: 'static, T: 'static>() -> Self {
        Self {
            source: TypeId::of::<S>(),
            target: TypeId::of::<T>(),
            source_name: type_name::<S>(),
            target_name: type_name::<T>(),
        }
    }

    pub fn source_id(&self) -> TypeId {
        self.source
    }

    pub fn target_id(&self) -> TypeId {
        self.target
    }

    pub fn source_name(&self) -> &'static str {
        self.source_name
    }

    pub fn target_name(&self) -> &'static str {
        self.target_name
    }
}

impl PartialEq for ShapeKey {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.target == other.target
    }
}

impl Eq for ShapeKey {}

impl Hash for ShapeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source.hash(state);
        self.target.hash(state);
    }
}

impl fmt::Display for ShapeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source_name, self.target_name)
    }
}

/// 成员值的运行期类型描述：`TypeId` 加类型名。
#[derive(Clone, Copy, Debug)]
pub struct ValueType {
    id: TypeId,
    name: &'static str,
}

impl ValueType {
    pub fn of<V: 'static>() -> Self {
        Self {
            id: TypeId::of::<V>(),
            name: type_name::<V>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for ValueType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ValueType {}
