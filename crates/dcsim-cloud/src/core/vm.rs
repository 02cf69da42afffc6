//! Representation of a virtual machine and its lifecycle.

use std::fmt::{Display, Formatter};

use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;

use dcsim_core::Id;

use crate::core::common::Allocation;
use crate::core::task_scheduler::TaskScheduler;

/// Lifecycle status of a virtual machine.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum VmStatus {
    /// Requested but not yet assigned to a host.
    Unplaced,
    /// Assigned to a host, capacity reserved.
    Placed,
    /// Running on its host and accepting tasks.
    Active,
    /// Removed; capacity returned to the host.
    Destroyed,
}

impl Display for VmStatus {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            VmStatus::Unplaced => write!(f, "unplaced"),
            VmStatus::Placed => write!(f, "placed"),
            VmStatus::Active => write!(f, "active"),
            VmStatus::Destroyed => write!(f, "destroyed"),
        }
    }
}

/// A requested slice of processing units, memory and bandwidth,
/// owning the scheduler that time-shares its capacity among tasks.
pub struct VirtualMachine {
    pub id: u32,
    pub owner_id: Id,
    pub units: u32,
    pub ram: u64,
    pub bw: u64,
    pub image_size: u64,
    host_id: Option<Id>,
    status: VmStatus,
    scheduler: Box<dyn TaskScheduler>,
}

impl Clone for VirtualMachine {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            owner_id: self.owner_id,
            units: self.units,
            ram: self.ram,
            bw: self.bw,
            image_size: self.image_size,
            host_id: self.host_id,
            status: self.status.clone(),
            scheduler: dyn_clone::clone_box(&*self.scheduler),
        }
    }
}

impl Serialize for VirtualMachine {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("VirtualMachine", 4)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("units", &self.units)?;
        state.serialize_field("ram", &self.ram)?;
        state.serialize_field("bw", &self.bw)?;
        state.end()
    }
}

impl VirtualMachine {
    pub fn new(
        id: u32,
        owner_id: Id,
        units: u32,
        ram: u64,
        bw: u64,
        image_size: u64,
        scheduler: Box<dyn TaskScheduler>,
    ) -> Self {
        Self {
            id,
            owner_id,
            units,
            ram,
            bw,
            image_size,
            host_id: None,
            status: VmStatus::Unplaced,
            scheduler,
        }
    }

    pub fn status(&self) -> &VmStatus {
        &self.status
    }

    /// Host the VM is placed on, if any.
    pub fn host_id(&self) -> Option<Id> {
        self.host_id
    }

    /// Resources the VM asks a host to reserve.
    pub fn allocation(&self) -> Allocation {
        Allocation {
            vm_id: self.id,
            units: self.units,
            ram: self.ram,
            bw: self.bw,
        }
    }

    pub fn scheduler(&self) -> &dyn TaskScheduler {
        &*self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut dyn TaskScheduler {
        &mut *self.scheduler
    }

    pub fn set_placed(&mut self, host_id: Id) {
        assert_eq!(self.status, VmStatus::Unplaced, "VM {} is already placed", self.id);
        self.host_id = Some(host_id);
        self.status = VmStatus::Placed;
    }

    pub fn set_active(&mut self) {
        assert_eq!(self.status, VmStatus::Placed, "VM {} is not placed", self.id);
        self.status = VmStatus::Active;
    }

    pub fn set_destroyed(&mut self) {
        self.host_id = None;
        self.status = VmStatus::Destroyed;
    }
}
