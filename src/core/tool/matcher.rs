#![allow(clippy::result_large_err)]

use crate::core::error::AppError;
use crate::core::tool::{Namespace, ToolConfig};
use crate::core::types::ErrorCategory;
use std::cmp::Ordering;

/// Order two version strings, highest wins.
///
/// Dot separated segments are compared numerically when both sides parse as
/// integers and lexically otherwise, so `10.0.0` sorts above `9.0.0`. A
/// version that is a strict prefix of another sorts lower (`1.0` < `1.0.1`).
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) => {
                let ordering = match (l.parse::<u64>(), r.parse::<u64>()) {
                    (Ok(l), Ok(r)) => l.cmp(&r),
                    _ => l.cmp(r),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}

/// Select one descriptor per requested namespace, in request order.
///
/// Candidates are sorted highest version first so an unversioned request
/// resolves to the newest installed version. Any request without a match
/// fails the whole resolution.
pub fn find_tool_configs(
    mut candidates: Vec<ToolConfig>,
    requested: &[Namespace],
) -> Result<Vec<ToolConfig>, AppError> {
    candidates.retain(|config| config.plugin.is_some());
    candidates.sort_by(|a, b| {
        let a = a.namespace().map(|ns| ns.version.as_str()).unwrap_or_default();
        let b = b.namespace().map(|ns| ns.version.as_str()).unwrap_or_default();
        compare_versions(b, a)
    });

    let mut found = Vec::with_capacity(requested.len());
    for request in requested {
        let matched = candidates
            .iter()
            .find(|config| config.namespace().is_some_and(|ns| request.selects(ns)));

        match matched {
            Some(config) => found.push(config.clone()),
            None => {
                return Err(AppError::new(
                    ErrorCategory::ToolNotFound,
                    format!(
                        "{}/{}/{} tool cannot be found",
                        request.author, request.id, request.version
                    ),
                )
                .with_code("TOOL-001"))
            }
        }
    }

    Ok(found)
}
