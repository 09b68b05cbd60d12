//! Conflict resolution for re-run deployments
//!
//! The resolver is pure: it never calls the provider and never prompts. When
//! the policy mode leaves the decision to a human, it hands back a
//! [`Conflict`] and the caller feeds the human's [`UserChoice`] into
//! [`ConflictResolver::decide`].

use crate::error::{CloudError, Result};
use crate::naming::DeploymentName;
use crate::resource::Resource;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How to treat existing resources; fixed for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyMode {
    #[default]
    Standard,
    AutoUpdate,
    ForceRecreate,
}

impl PolicyMode {
    pub fn from_flags(auto_update: bool, force_recreate: bool) -> Result<Self> {
        match (auto_update, force_recreate) {
            (true, true) => Err(CloudError::Validation(
                "--auto-update and --force-recreate cannot be used together".to_string(),
            )),
            (true, false) => Ok(PolicyMode::AutoUpdate),
            (false, true) => Ok(PolicyMode::ForceRecreate),
            (false, false) => Ok(PolicyMode::Standard),
        }
    }

    /// Label embedded in generated deployment names
    pub fn label(&self) -> &'static str {
        match self {
            PolicyMode::Standard => "auto",
            PolicyMode::AutoUpdate => "update",
            PolicyMode::ForceRecreate => "recreate",
        }
    }
}

impl std::fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyMode::Standard => write!(f, "standard"),
            PolicyMode::AutoUpdate => write!(f, "auto-update"),
            PolicyMode::ForceRecreate => write!(f, "force-recreate"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictAction {
    UseExisting,
    /// In-place update. Never produced: existing infrastructure is renamed
    /// around instead of being modified.
    Update,
    DeleteAndRecreate,
    RenameAndCreate,
}

impl std::fmt::Display for ConflictAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictAction::UseExisting => write!(f, "use existing"),
            ConflictAction::Update => write!(f, "update"),
            ConflictAction::DeleteAndRecreate => write!(f, "delete and recreate"),
            ConflictAction::RenameAndCreate => write!(f, "rename and create"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictDecision {
    pub action: ConflictAction,
    pub resulting_name: DeploymentName,
}

impl ConflictDecision {
    fn new(action: ConflictAction, resulting_name: DeploymentName) -> Self {
        Self {
            action,
            resulting_name,
        }
    }

    /// Existing resources under the requested name are reused as-is
    pub fn reuses_existing(&self) -> bool {
        matches!(self.action, ConflictAction::UseExisting | ConflictAction::Update)
    }
}

/// Existing resources found for a requested name in Standard mode
#[derive(Debug, Clone)]
pub struct Conflict {
    pub requested: DeploymentName,
    pub existing: Vec<Resource>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserChoice {
    UseExisting,
    DeleteAndRecreate,
    /// A new name, or `None` to generate one
    RenameAndCreate(Option<DeploymentName>),
    Abort,
}

#[derive(Debug, Clone)]
pub enum Resolution {
    Decided(ConflictDecision),
    NeedsChoice(Conflict),
}

/// Source of "now" for generated names
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Local>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        self.0
    }
}

#[derive(Clone)]
pub struct ConflictResolver {
    clock: Arc<dyn Clock>,
}

impl ConflictResolver {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    fn fresh_name(&self, requested: &DeploymentName, mode: PolicyMode) -> DeploymentName {
        requested.generate(mode.label(), &self.clock.now())
    }

    pub fn resolve(
        &self,
        discovered: &[Resource],
        mode: PolicyMode,
        requested: &DeploymentName,
    ) -> Resolution {
        if discovered.is_empty() {
            return Resolution::Decided(ConflictDecision::new(
                ConflictAction::RenameAndCreate,
                requested.clone(),
            ));
        }

        match mode {
            PolicyMode::ForceRecreate => Resolution::Decided(ConflictDecision::new(
                ConflictAction::DeleteAndRecreate,
                self.fresh_name(requested, mode),
            )),
            PolicyMode::AutoUpdate => Resolution::Decided(ConflictDecision::new(
                ConflictAction::RenameAndCreate,
                self.fresh_name(requested, mode),
            )),
            PolicyMode::Standard => Resolution::NeedsChoice(Conflict {
                requested: requested.clone(),
                existing: discovered.to_vec(),
            }),
        }
    }

    /// Turn a human's choice into a decision. `Abort` yields `Cancelled`.
    pub fn decide(&self, conflict: &Conflict, choice: UserChoice) -> Result<ConflictDecision> {
        let requested = &conflict.requested;
        match choice {
            UserChoice::UseExisting => Ok(ConflictDecision::new(
                ConflictAction::UseExisting,
                requested.clone(),
            )),
            UserChoice::DeleteAndRecreate => Ok(ConflictDecision::new(
                ConflictAction::DeleteAndRecreate,
                self.fresh_name(requested, PolicyMode::ForceRecreate),
            )),
            UserChoice::RenameAndCreate(Some(name)) => {
                Ok(ConflictDecision::new(ConflictAction::RenameAndCreate, name))
            }
            UserChoice::RenameAndCreate(None) => Ok(ConflictDecision::new(
                ConflictAction::RenameAndCreate,
                self.fresh_name(requested, PolicyMode::Standard),
            )),
            UserChoice::Abort => Err(CloudError::Cancelled(format!(
                "deployment '{}' aborted at the conflict prompt",
                requested
            ))),
        }
    }
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceKind;
    use chrono::TimeZone;

    fn resolver() -> ConflictResolver {
        let now = Local.with_ymd_and_hms(2026, 10, 19, 14, 30, 0).unwrap();
        ConflictResolver::with_clock(Arc::new(FixedClock(now)))
    }

    fn requested() -> DeploymentName {
        DeploymentName::parse("sbom_security_agent").unwrap()
    }

    fn existing() -> Vec<Resource> {
        vec![Resource::new(
            ResourceKind::IdentityRole,
            "AgentCoreRuntimeRole-sbom_security_agent",
            "arn:aws:iam::123:role/AgentCoreRuntimeRole-sbom_security_agent",
        )]
    }

    fn decided(resolution: Resolution) -> ConflictDecision {
        match resolution {
            Resolution::Decided(d) => d,
            Resolution::NeedsChoice(_) => panic!("expected a decision"),
        }
    }

    #[test]
    fn test_empty_discovery_creates_under_requested_name_in_every_mode() {
        for mode in [
            PolicyMode::Standard,
            PolicyMode::AutoUpdate,
            PolicyMode::ForceRecreate,
        ] {
            let d = decided(resolver().resolve(&[], mode, &requested()));
            assert_eq!(d.action, ConflictAction::RenameAndCreate);
            assert_eq!(d.resulting_name, requested());
        }
    }

    #[test]
    fn test_force_recreate_picks_fresh_name() {
        let d = decided(resolver().resolve(&existing(), PolicyMode::ForceRecreate, &requested()));
        assert_eq!(d.action, ConflictAction::DeleteAndRecreate);
        assert_eq!(
            d.resulting_name.as_str(),
            "sbom_security_agen_recreate_20261019_143000"
        );
        assert!(requested().is_generated_from(d.resulting_name.as_str()));
    }

    #[test]
    fn test_auto_update_renames_and_never_updates_in_place() {
        let d = decided(resolver().resolve(&existing(), PolicyMode::AutoUpdate, &requested()));
        assert_eq!(d.action, ConflictAction::RenameAndCreate);
        assert_ne!(d.resulting_name, requested());
        assert!(d.resulting_name.as_str().contains("_update_"));
    }

    #[test]
    fn test_standard_mode_asks_for_a_choice() {
        match resolver().resolve(&existing(), PolicyMode::Standard, &requested()) {
            Resolution::NeedsChoice(conflict) => {
                assert_eq!(conflict.requested, requested());
                assert_eq!(conflict.existing.len(), 1);
            }
            Resolution::Decided(_) => panic!("standard mode must not decide alone"),
        }
    }

    #[test]
    fn test_decide_maps_every_choice() {
        let r = resolver();
        let conflict = Conflict {
            requested: requested(),
            existing: existing(),
        };

        let d = r.decide(&conflict, UserChoice::UseExisting).unwrap();
        assert!(d.reuses_existing());
        assert_eq!(d.resulting_name, requested());

        let d = r.decide(&conflict, UserChoice::DeleteAndRecreate).unwrap();
        assert_eq!(d.action, ConflictAction::DeleteAndRecreate);
        assert_ne!(d.resulting_name, requested());

        let custom = DeploymentName::parse("sbom_v2").unwrap();
        let d = r
            .decide(&conflict, UserChoice::RenameAndCreate(Some(custom.clone())))
            .unwrap();
        assert_eq!(d.resulting_name, custom);

        let d = r.decide(&conflict, UserChoice::RenameAndCreate(None)).unwrap();
        assert!(d.resulting_name.as_str().contains("_auto_"));

        let err = r.decide(&conflict, UserChoice::Abort).unwrap_err();
        assert!(matches!(err, CloudError::Cancelled(_)));
    }

    #[test]
    fn test_policy_mode_flags_are_exclusive() {
        assert!(PolicyMode::from_flags(true, true).is_err());
        assert_eq!(PolicyMode::from_flags(false, false).unwrap(), PolicyMode::Standard);
        assert_eq!(
            PolicyMode::from_flags(false, true).unwrap().label(),
            "recreate"
        );
    }
}
