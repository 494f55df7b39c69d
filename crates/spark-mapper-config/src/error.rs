//! 配置边界层错误。

use std::fmt;

use spark_mapper::MapperError;
use thiserror::Error;

/// 稳定错误码常量。
pub mod codes {
    pub const PARSE: &str = "mapper_config.parse";
    pub const UNKNOWN_SHAPE: &str = "mapper_config.unknown_shape";
    pub const UNKNOWN_MEMBER: &str = "mapper_config.unknown_member";
    pub const UNKNOWN_PAIR: &str = "mapper_config.unknown_pair";
}

/// 成员在映射记录中的角色。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberRole {
    Source,
    Target,
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberRole::Source => f.write_str("source"),
            MemberRole::Target => f.write_str("target"),
        }
    }
}

/// 声明文档加载错误。
///
/// # 教案式说明
/// - **意图 (Why)**：区分“文档本身写错”（解析、名称引用）与“回放到仓储时被拒绝”两类问题；
/// - **契约 (What)**：映射引擎返回的错误经 `Mapper` 变体原样透传，`code()` 返回其原始错误码。
#[derive(Debug, Error)]
pub enum ConfigError {
    /// TOML 语法或结构错误。
    #[error("failed to parse declaration document: {0}")]
    Parse(#[from] toml::de::Error),

    /// 记录引用了未登记的类型名。
    #[error("unknown shape `{name}`")]
    UnknownShape { name: String },

    /// 记录引用了类型上未登记的成员。
    #[error("shape `{shape}` has no registered {role} member `{member}`")]
    UnknownMember {
        shape: String,
        member: String,
        role: MemberRole,
    },

    /// 类型对未登记，无法回放。
    #[error("mapping from `{source_shape}` to `{target_shape}` is not a registered pair")]
    UnknownPair {
        source_shape: String,
        target_shape: String,
    },

    #[error(transparent)]
    Mapper(#[from] MapperError),
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Parse(_) => codes::PARSE,
            ConfigError::UnknownShape { .. } => codes::UNKNOWN_SHAPE,
            ConfigError::UnknownMember { .. } => codes::UNKNOWN_MEMBER,
            ConfigError::UnknownPair { .. } => codes::UNKNOWN_PAIR,
            ConfigError::Mapper(inner) => inner.code(),
        }
    }
}
