//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为映射声明、转换编译与映射执行三个阶段提供统一的错误枚举；
//! - 声明期错误（参数、表达式、类型不匹配）在声明调用点同步返回，执行期错误原样向上传播。
//!
//! ## 设计要求（What）
//! - 所有变体派生 `thiserror::Error`，可直接交给 `anyhow` 等上层框架；
//! - 每个变体提供稳定的点分错误码（`mapper.*`），便于告警与排障检索。

use std::borrow::Cow;

use thiserror::Error;

/// 稳定错误码常量。
pub mod codes {
    pub const INVALID_ARGUMENT: &str = "mapper.invalid_argument";
    pub const INVALID_EXPRESSION: &str = "mapper.invalid_expression";
    pub const TYPE_MISMATCH: &str = "mapper.type_mismatch";
    pub const CONVERSION: &str = "mapper.conversion";
    pub const NO_STRATEGY: &str = "mapper.no_strategy";
    pub const REPOSITORY_RELEASED: &str = "mapper.repository_released";
}

/// 映射引擎错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：区分“声明写错了”与“数据在执行期转换失败”两类问题，前者在声明阶段即暴露；
/// - **契约 (What)**：
///   - `InvalidArgument`、`InvalidExpression`、`TypeMismatch` 只会在声明/编译阶段出现；
///   - `Conversion`、`NoApplicableStrategy`、`RepositoryReleased` 只会在执行映射时出现；
///   - 嵌套映射器或提供者返回的错误不做包装，保持原样传播。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MapperError {
    /// 必需输入缺失，例如提供者列表中的空位或已释放的声明所有者。
    #[error("invalid argument `{argument}`: {detail}")]
    InvalidArgument {
        argument: Cow<'static, str>,
        detail: String,
    },

    /// 访问表达式不是直接的成员访问。
    #[error("`{expression}` is not a direct member access: {reason}")]
    InvalidExpression {
        expression: String,
        reason: &'static str,
    },

    /// 源值类型与目标成员类型之间不存在转换路径。
    #[error("no conversion from `{source_type}` to `{target_type}` for member `{member}`")]
    TypeMismatch {
        member: String,
        source_type: &'static str,
        target_type: &'static str,
    },

    /// 执行期转换失败，例如收窄转换溢出。
    #[error(
        "failed to convert `{source_type}` to `{target_type}` for member `{member}`: {detail}"
    )]
    Conversion {
        member: String,
        source_type: &'static str,
        target_type: &'static str,
        detail: String,
    },

    /// 策略序列中没有任何策略处理本次映射。
    #[error("no mapper strategy handled `{shape}`")]
    NoApplicableStrategy { shape: String },

    /// 嵌套映射需要仓储解析，但仓储已被释放。
    #[error("mapping repository was released before resolving `{shape}`")]
    RepositoryReleased { shape: String },
}

impl MapperError {
    /// 构造 `InvalidArgument`，减少调用点的 `String` 样板代码。
    pub fn invalid_argument(
        argument: impl Into<Cow<'static, str>>,
        detail: impl Into<String>,
    ) -> Self {
        MapperError::InvalidArgument {
            argument: argument.into(),
            detail: detail.into(),
        }
    }

    /// 构造 `InvalidExpression`。
    pub fn invalid_expression(expression: &str, reason: &'static str) -> Self {
        MapperError::InvalidExpression {
            expression: expression.to_owned(),
            reason,
        }
    }

    /// 返回稳定错误码。
    ///
    /// - **契约 (What)**：错误码只增不改，告警规则与 Runbook 可以直接依赖字符串值。
    pub fn code(&self) -> &'static str {
        match self {
            MapperError::InvalidArgument { .. } => codes::INVALID_ARGUMENT,
            MapperError::InvalidExpression { .. } => codes::INVALID_EXPRESSION,
            MapperError::TypeMismatch { .. } => codes::TYPE_MISMATCH,
            MapperError::Conversion { .. } => codes::CONVERSION,
            MapperError::NoApplicableStrategy { .. } => codes::NO_STRATEGY,
            MapperError::RepositoryReleased { .. } => codes::REPOSITORY_RELEASED,
        }
    }

    /// 是否属于声明期错误。
    ///
    /// 声明期错误意味着映射声明本身需要修改，重试没有意义。
    pub fn is_declaration_error(&self) -> bool {
        matches!(
            self,
            MapperError::InvalidArgument { .. }
                | MapperError::InvalidExpression { .. }
                | MapperError::TypeMismatch { .. }
        )
    }
}
