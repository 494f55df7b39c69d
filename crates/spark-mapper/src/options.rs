//! 仓储级配置与覆盖诊断钩子。

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::accessor::MemberKey;
use crate::shape::ShapeKey;

/// 重复声明同一目标成员时的诊断策略。
///
/// 两种策略下覆盖都会生效（后写者胜），差别只在日志级别。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverwritePolicy {
    /// 以 `warn` 级别记录覆盖。
    #[default]
    Warn,
    /// 以 `debug` 级别记录覆盖。
    Silent,
}

/// 映射仓储的可配置项。
///
/// # 契约说明（What）
/// - 所有字段都有默认值，`#[serde(default)]` 允许配置文档只写需要覆盖的键；
/// - 未知键会被拒绝，避免拼写错误被静默忽略。
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MapperOptions {
    pub overwrite_policy: OverwritePolicy,
}

/// 一次成员覆盖的通知内容。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OverwriteNotice {
    pub shape: ShapeKey,
    pub member: MemberKey,
}

/// 成员覆盖回调，在覆盖生效之后调用。
pub type OverwriteHook = Arc<dyn Fn(&OverwriteNotice) + Send + Sync>;

/// 映射器创建时从仓储拷贝的诊断设置。
#[derive(Clone, Default)]
pub(crate) struct Diagnostics {
    pub(crate) policy: OverwritePolicy,
    pub(crate) hook: Option<OverwriteHook>,
}

impl Diagnostics {
    pub(crate) fn report_overwrite(&self, notice: OverwriteNotice) {
        match self.policy {
            OverwritePolicy::Warn => tracing::warn!(
                source = notice.shape.source_name(),
                target = notice.shape.target_name(),
                member = notice.member.as_str(),
                "member mapping overwritten by a later declaration"
            ),
            OverwritePolicy::Silent => tracing::debug!(
                source = notice.shape.source_name(),
                target = notice.shape.target_name(),
                member = notice.member.as_str(),
                "member mapping overwritten by a later declaration"
            ),
        }
        if let Some(hook) = &self.hook {
            hook(&notice);
        }
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("policy", &self.policy)
            .field("hook", &self.hook.is_some())
            .finish()
    }
}
