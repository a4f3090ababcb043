//! 层级通配权限匹配
//!
//! 权限是以 `.` 分隔的段序列，例如 `herqles.job.get`。授予的权限 `g`
//! 满足所需权限 `p` 的条件：`g` 的段数不多于 `p`，且 `g` 的每一段要么与
//! `p` 的对应段相等，要么是通配段 `*`（精确匹配时通配段不生效）。

use herqles_core::{HerqlesError, HerqlesResult};

pub const WILDCARD: &str = "*";
pub const SEPARATOR: char = '.';

/// 判断单个授予权限是否满足所需权限
pub fn matches(granted: &str, required: &str, exact: bool) -> bool {
    let granted: Vec<&str> = granted.split(SEPARATOR).collect();
    let required: Vec<&str> = required.split(SEPARATOR).collect();

    if granted.len() > required.len() {
        return false;
    }

    granted
        .iter()
        .zip(required.iter())
        .all(|(g, p)| g == p || (!exact && *g == WILDCARD))
}

/// 任一授予权限满足即返回 `true`
pub fn any_matches<'a, I>(grants: I, required: &str, exact: bool) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    grants
        .into_iter()
        .any(|granted| matches(granted, required, exact))
}

/// 校验权限字符串格式：非空且不含空段
pub fn validate_permission(permission: &str) -> HerqlesResult<()> {
    if permission.trim().is_empty() {
        return Err(HerqlesError::validation("权限不能为空"));
    }
    if permission.split(SEPARATOR).any(|segment| segment.is_empty()) {
        return Err(HerqlesError::validation(format!("无效的权限格式: {permission}")));
    }
    Ok(())
}
