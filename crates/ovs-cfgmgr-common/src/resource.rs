//! Reconciler trait and tracked resource records.
//!
//! Every managed object kind (bridge, port) has a reconciler implementing
//! [`Reconciler`]. The orchestrating caller owns the [`TrackedResource`]
//! records and hands them to the reconciler for each lifecycle operation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CfgMgrResult;

/// Lifecycle state of a managed resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// Not present on the switch (or never created).
    Unmanaged,
    /// A create is in flight.
    Creating,
    /// Present on the switch and tracked.
    Present,
    /// A delete is in flight.
    Deleting,
}

impl ResourceState {
    /// Returns the state name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceState::Unmanaged => "unmanaged",
            ResourceState::Creating => "creating",
            ResourceState::Present => "present",
            ResourceState::Deleting => "deleting",
        }
    }
}

/// Why a read found no live object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Absence {
    /// The object itself is gone.
    NotFound,
    /// The parent could not be queried, so the child is taken as gone.
    ParentUnavailable,
}

/// Result of comparing tracked identity with the live switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observed {
    /// The object exists; tracked identity was kept.
    Present,
    /// The object is gone; tracked identity was cleared.
    Absent(Absence),
}

impl Observed {
    /// Returns true if the object exists.
    pub fn is_present(&self) -> bool {
        matches!(self, Observed::Present)
    }
}

/// Desired configuration of one resource kind.
pub trait ResourceSpec: Clone + Send + Sync {
    /// Returns the identifier the resource is tracked under once created.
    fn identity(&self) -> String;

    /// Returns true if `other` names the same live object.
    ///
    /// Identity fields are immutable; a spec that differs here requires the
    /// resource to be replaced rather than updated.
    fn same_identity(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

/// Persisted record for one managed resource.
///
/// An empty `id` means the object is not present externally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedResource<S> {
    /// Encoded identifier (bridge name or `bridge:port`).
    #[serde(default)]
    pub id: String,
    /// Configuration last applied to the switch.
    pub last_known_config: S,
}

impl<S> TrackedResource<S> {
    /// A record for a resource that has not been created yet.
    pub fn unmanaged(config: S) -> Self {
        Self {
            id: String::new(),
            last_known_config: config,
        }
    }

    /// A record for a resource present under `id`.
    pub fn present(id: impl Into<String>, config: S) -> Self {
        Self {
            id: id.into(),
            last_known_config: config,
        }
    }

    /// Returns true if the record tracks a live object.
    pub fn is_present(&self) -> bool {
        !self.id.is_empty()
    }

    /// Returns the lifecycle state implied by the record.
    pub fn state(&self) -> ResourceState {
        if self.is_present() {
            ResourceState::Present
        } else {
            ResourceState::Unmanaged
        }
    }

    /// Drops tracked identity after the object disappeared or was deleted.
    pub fn clear(&mut self) {
        self.id.clear();
    }
}

/// Converges one resource kind with the switch.
///
/// Implementations perform a short, bounded sequence of adapter calls per
/// operation. They hold no per-resource state; the caller owns the records
/// and serializes operations that target the same identifier.
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// Desired configuration for this kind.
    type Spec: ResourceSpec;

    /// Returns the resource kind (e.g., "bridge").
    fn kind(&self) -> &'static str;

    /// Creates the resource and reads it back.
    async fn create(&self, spec: &Self::Spec) -> CfgMgrResult<TrackedResource<Self::Spec>>;

    /// Refreshes `tracked` against the switch, clearing its identity if the
    /// object is gone. Absence is not an error.
    async fn read(&self, tracked: &mut TrackedResource<Self::Spec>) -> CfgMgrResult<Observed>;

    /// Applies mutable fields of `spec` to an existing resource.
    async fn update(
        &self,
        tracked: &mut TrackedResource<Self::Spec>,
        spec: &Self::Spec,
    ) -> CfgMgrResult<()>;

    /// Deletes the resource and clears `tracked`.
    async fn delete(&self, tracked: &mut TrackedResource<Self::Spec>) -> CfgMgrResult<()>;
}

/// Default values for the resource configuration surface.
pub mod defaults {
    /// Default port action.
    pub const DEFAULT_PORT_ACTION: &str = "up";

    /// Separator between bridge and port in compound identifiers.
    pub const ID_SEPARATOR: char = ':';
}
