//! Dependency-ordered teardown of deployment resources
//!
//! Cleanup never rolls back. Every entry is re-described before anything is
//! deleted, so running the same plan twice is safe: resources that are
//! already gone are reported as skipped.

use crate::provider::Adapters;
use crate::resource::{Resource, ResourceKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

/// Sub-call that must happen before a resource can be deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreDeleteStep {
    DetachManagedPolicies,
    DeleteInlinePolicies,
}

impl std::fmt::Display for PreDeleteStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PreDeleteStep::DetachManagedPolicies => write!(f, "detach managed policies"),
            PreDeleteStep::DeleteInlinePolicies => write!(f, "delete inline policies"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanupEntry {
    pub resource: Resource,
    pub pre_delete: Vec<PreDeleteStep>,
}

impl CleanupEntry {
    fn new(resource: Resource) -> Self {
        let pre_delete = if resource.requires_pre_delete_cleanup() {
            vec![
                PreDeleteStep::DetachManagedPolicies,
                PreDeleteStep::DeleteInlinePolicies,
            ]
        } else {
            Vec::new()
        };
        Self {
            resource,
            pre_delete,
        }
    }
}

/// Ordered deletions
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupPlan {
    pub entries: Vec<CleanupEntry>,
}

impl CleanupPlan {
    /// Order `resources` so dependents go first and roles go last
    pub fn new(mut resources: Vec<Resource>) -> Self {
        resources.sort_by_key(|r| r.kind.cleanup_priority());
        Self {
            entries: resources.into_iter().map(CleanupEntry::new).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn summary(&self) -> CleanupSummary {
        let mut by_kind = BTreeMap::new();
        for entry in &self.entries {
            *by_kind.entry(entry.resource.kind).or_insert(0) += 1;
        }
        CleanupSummary {
            total: self.entries.len(),
            by_kind,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CleanupSummary {
    pub total: usize,
    pub by_kind: BTreeMap<ResourceKind, usize>,
}

impl std::fmt::Display for CleanupSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to delete", self.total)?;
        if !self.by_kind.is_empty() {
            let parts: Vec<_> = self
                .by_kind
                .iter()
                .map(|(kind, n)| format!("{} {}", n, kind))
                .collect();
            write!(f, " ({})", parts.join(", "))?;
        }
        Ok(())
    }
}

/// Outcome for one plan entry
#[derive(Debug, Clone, Serialize)]
pub struct CleanupResult {
    pub kind: ResourceKind,
    pub name: String,
    pub message: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub succeeded: Vec<CleanupResult>,
    pub failed: Vec<CleanupResult>,
    /// Already gone when cleanup reached them
    pub skipped: Vec<CleanupResult>,
    /// Pre-delete failures that did not stop the terminal delete
    pub warnings: Vec<String>,
    pub dry_run: bool,
    pub duration_ms: u64,
}

impl CleanupReport {
    fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    fn add_success(&mut self, resource: &Resource, message: impl Into<String>) {
        self.succeeded.push(CleanupResult {
            kind: resource.kind,
            name: resource.name.clone(),
            message: message.into(),
            error: None,
        });
    }

    fn add_skipped(&mut self, resource: &Resource) {
        self.skipped.push(CleanupResult {
            kind: resource.kind,
            name: resource.name.clone(),
            message: "already deleted".to_string(),
            error: None,
        });
    }

    fn add_failure(&mut self, resource: &Resource, error: impl Into<String>) {
        self.failed.push(CleanupResult {
            kind: resource.kind,
            name: resource.name.clone(),
            message: String::new(),
            error: Some(error.into()),
        });
    }
}

pub struct CleanupExecutor<'a> {
    adapters: &'a Adapters,
}

impl<'a> CleanupExecutor<'a> {
    pub fn new(adapters: &'a Adapters) -> Self {
        Self { adapters }
    }

    pub fn plan(&self, resources: Vec<Resource>) -> CleanupPlan {
        CleanupPlan::new(resources)
    }

    /// Run the plan in order. With `dry_run` only read-only calls are made.
    pub async fn execute(&self, plan: &CleanupPlan, dry_run: bool) -> CleanupReport {
        let start = Instant::now();
        let mut report = CleanupReport::new(dry_run);

        for entry in &plan.entries {
            let planned = &entry.resource;
            let current = match self.adapters.describe(planned.kind, &planned.name).await {
                Ok(current) => current,
                Err(e) if e.is_not_found() => {
                    tracing::info!(kind = %planned.kind, name = %planned.name, "already deleted");
                    report.add_skipped(planned);
                    continue;
                }
                Err(e) => {
                    tracing::warn!(kind = %planned.kind, name = %planned.name, error = %e, "cannot confirm resource state");
                    report.add_failure(planned, e.to_string());
                    continue;
                }
            };

            for step in &entry.pre_delete {
                self.run_pre_delete(&current, *step, dry_run, &mut report)
                    .await;
            }

            if dry_run {
                report.add_success(&current, format!("would delete {}", current.name));
                continue;
            }

            match self.adapters.delete(&current.delete_spec()).await {
                Ok(()) => {
                    tracing::info!(kind = %current.kind, name = %current.name, "deleted");
                    report.add_success(&current, format!("deleted {}", current.name));
                }
                Err(e) if e.is_not_found() => report.add_skipped(&current),
                Err(e) => {
                    tracing::warn!(kind = %current.kind, name = %current.name, error = %e, "delete failed");
                    report.add_failure(&current, e.to_string());
                }
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        report
    }

    async fn run_pre_delete(
        &self,
        role: &Resource,
        step: PreDeleteStep,
        dry_run: bool,
        report: &mut CleanupReport,
    ) {
        let role_name = role.name.as_str();
        let listed = match step {
            PreDeleteStep::DetachManagedPolicies => {
                self.adapters.list_attached_policies(role_name).await
            }
            PreDeleteStep::DeleteInlinePolicies => {
                self.adapters.list_inline_policies(role_name).await
            }
        };

        let policies = match listed {
            Ok(policies) => policies,
            Err(e) => {
                report
                    .warnings
                    .push(format!("{}: cannot {}: {}", role_name, step, e));
                return;
            }
        };

        for policy in policies {
            if dry_run {
                tracing::debug!(role = %role_name, policy = %policy, "would {}", step);
                continue;
            }
            let result = match step {
                PreDeleteStep::DetachManagedPolicies => {
                    self.adapters.detach_policy(role_name, &policy).await
                }
                PreDeleteStep::DeleteInlinePolicies => {
                    self.adapters.delete_inline_policy(role_name, &policy).await
                }
            };
            if let Err(e) = result {
                tracing::warn!(role = %role_name, policy = %policy, error = %e, "pre-delete step failed");
                report
                    .warnings
                    .push(format!("{}: {} ({}): {}", role_name, step, policy, e));
            }
        }
    }
}
