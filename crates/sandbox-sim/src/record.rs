use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::SimError;
use crate::pod::PodPhase;
use crate::quantity::Quantity;

pub const RESOURCE_CPU: &str = "cpu";
pub const RESOURCE_MEMORY: &str = "memory";

/// Requested quantity per resource name.
pub type ResourceList = BTreeMap<String, Quantity>;

/// Terminal outcome a sandbox reports once its simulated duration elapses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TerminationOutcome {
    #[default]
    Succeeded,
    Failed,
}

impl TerminationOutcome {
    pub fn phase(self) -> PodPhase {
        match self {
            Self::Succeeded => PodPhase::Succeeded,
            Self::Failed => PodPhase::Failed,
        }
    }

    pub fn exit_code(self) -> i32 {
        match self {
            Self::Succeeded => 0,
            Self::Failed => 1,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Self::Succeeded => "Completed",
            Self::Failed => "Failed",
        }
    }
}

impl FromStr for TerminationOutcome {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Succeeded" => Ok(Self::Succeeded),
            "Failed" => Ok(Self::Failed),
            other => Err(SimError::InvalidOutcome(other.to_string())),
        }
    }
}

impl fmt::Display for TerminationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => f.write_str("Succeeded"),
            Self::Failed => f.write_str("Failed"),
        }
    }
}

/// Creation-time identity of a sandbox, as handed over by the runtime proxy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SandboxConfig {
    pub name: String,
    pub namespace: String,
    pub uid: String,
    pub attempt: u32,
    pub annotations: BTreeMap<String, String>,
}

impl SandboxConfig {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }
}

/// One live simulated sandbox. Fields are fixed at insertion; the cache hands
/// out shared read-only references.
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxRecord {
    id: String,
    config: SandboxConfig,
    requested: ResourceList,
    started_at: DateTime<Utc>,
    simulated_duration: Duration,
    outcome: TerminationOutcome,
}

impl SandboxRecord {
    pub(crate) fn new(
        id: String,
        config: SandboxConfig,
        requested: ResourceList,
        started_at: DateTime<Utc>,
        simulated_duration: Duration,
        outcome: TerminationOutcome,
    ) -> Self {
        Self {
            id,
            config,
            requested,
            started_at,
            simulated_duration,
            outcome,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn requested(&self) -> &ResourceList {
        &self.requested
    }

    /// Requested quantity for `resource`, zero when not requested.
    pub fn requested_quantity(&self, resource: &str) -> Quantity {
        self.requested.get(resource).copied().unwrap_or_default()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn simulated_duration(&self) -> Duration {
        self.simulated_duration
    }

    pub fn outcome(&self) -> TerminationOutcome {
        self.outcome
    }

    /// Instant at which the sandbox becomes eligible for termination.
    /// `None` for zero-duration sandboxes, which never expire.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        if self.simulated_duration.is_zero() {
            return None;
        }
        let delta = TimeDelta::from_std(self.simulated_duration).ok()?;
        self.started_at.checked_add_signed(delta)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|at| now >= at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(duration: Duration) -> SandboxRecord {
        SandboxRecord::new(
            "sb-1".into(),
            SandboxConfig::new("default", "web-0"),
            ResourceList::new(),
            DateTime::<Utc>::UNIX_EPOCH,
            duration,
            TerminationOutcome::Succeeded,
        )
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let r = record(Duration::from_secs(10));
        let start = r.started_at();
        assert!(!r.is_expired(start));
        assert!(!r.is_expired(start + TimeDelta::milliseconds(9_999)));
        assert!(r.is_expired(start + TimeDelta::seconds(10)));
        assert!(r.is_expired(start + TimeDelta::seconds(3600)));
    }

    #[test]
    fn zero_duration_never_expires() {
        let r = record(Duration::ZERO);
        assert_eq!(r.expires_at(), None);
        assert!(!r.is_expired(DateTime::<Utc>::MAX_UTC));
    }

    #[test]
    fn outcome_mapping() {
        let ok = TerminationOutcome::Succeeded;
        assert_eq!((ok.phase(), ok.exit_code(), ok.reason()), (PodPhase::Succeeded, 0, "Completed"));
        let failed = TerminationOutcome::Failed;
        assert_eq!((failed.phase(), failed.exit_code(), failed.reason()), (PodPhase::Failed, 1, "Failed"));
    }

    #[test]
    fn outcome_rejects_other_values() {
        assert_eq!("Failed".parse::<TerminationOutcome>().unwrap(), TerminationOutcome::Failed);
        assert!("Unknown".parse::<TerminationOutcome>().is_err());
        assert!("succeeded".parse::<TerminationOutcome>().is_err());
    }

    #[test]
    fn missing_resource_defaults_to_zero() {
        let r = record(Duration::ZERO);
        assert!(r.requested_quantity(RESOURCE_CPU).is_zero());
    }
}
