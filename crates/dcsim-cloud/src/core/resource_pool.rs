//! Datacenter-wide view of host capacities and VM allocations.

use std::collections::BTreeMap;

use crate::core::common::{Allocation, AllocationVerdict};

/// Capacity and current allocations of a single host.
#[derive(Clone)]
pub struct HostInfo {
    pub units_total: u32,
    pub ram_total: u64,
    pub bw_total: u64,

    pub units_available: u32,
    pub ram_available: u64,
    pub bw_available: u64,

    pub allocations: BTreeMap<u32, Allocation>,
}

impl HostInfo {
    pub fn new(units_total: u32, ram_total: u64, bw_total: u64) -> Self {
        Self {
            units_total,
            ram_total,
            bw_total,
            units_available: units_total,
            ram_available: ram_total,
            bw_available: bw_total,
            allocations: BTreeMap::new(),
        }
    }
}

/// Tracks free and allocated capacity across all hosts.
///
/// Hosts are keyed by id in a sorted map, so iteration order is the
/// ascending id order the placement policies rely on.
#[derive(Clone)]
pub struct ResourcePoolState {
    hosts: BTreeMap<u32, HostInfo>,
}

impl ResourcePoolState {
    /// Creates empty resource pool state.
    pub fn new() -> Self {
        Self { hosts: BTreeMap::new() }
    }

    /// Adds host to resource pool.
    pub fn add_host(&mut self, id: u32, units_total: u32, ram_total: u64, bw_total: u64) {
        self.hosts.insert(id, HostInfo::new(units_total, ram_total, bw_total));
    }

    /// Returns IDs of all hosts in ascending order.
    pub fn get_hosts_list(&self) -> Vec<u32> {
        self.hosts.keys().cloned().collect()
    }

    /// Returns the number of hosts.
    pub fn get_host_count(&self) -> u32 {
        self.hosts.len() as u32
    }

    /// Checks if the specified allocation is currently possible on the specified host.
    ///
    /// All three dimensions must fit simultaneously; the first violated one
    /// determines the verdict.
    pub fn can_allocate(&self, alloc: &Allocation, host_id: u32) -> AllocationVerdict {
        let host = match self.hosts.get(&host_id) {
            Some(host) => host,
            None => return AllocationVerdict::HostNotFound,
        };
        if host.units_available < alloc.units {
            return AllocationVerdict::NotEnoughUnits;
        }
        if host.ram_available < alloc.ram {
            return AllocationVerdict::NotEnoughRam;
        }
        if host.bw_available < alloc.bw {
            return AllocationVerdict::NotEnoughBandwidth;
        }
        AllocationVerdict::Success
    }

    /// Commits the specified allocation on the specified host.
    ///
    /// Committing the same VM twice has no effect. The caller must check
    /// `can_allocate` first; capacity is never driven below zero.
    pub fn allocate(&mut self, alloc: &Allocation, host_id: u32) {
        if let Some(host) = self.hosts.get_mut(&host_id) {
            if host.allocations.contains_key(&alloc.vm_id) {
                return;
            }
            host.units_available -= alloc.units;
            host.ram_available -= alloc.ram;
            host.bw_available -= alloc.bw;
            host.allocations.insert(alloc.vm_id, alloc.clone());
        }
    }

    /// Releases the allocation of the specified VM on the specified host.
    ///
    /// Releasing a VM that holds no allocation is a no-op, so duplicate
    /// destroy requests cannot inflate the free capacity.
    pub fn release(&mut self, vm_id: u32, host_id: u32) {
        if let Some(host) = self.hosts.get_mut(&host_id) {
            if let Some(alloc) = host.allocations.remove(&vm_id) {
                host.units_available += alloc.units;
                host.ram_available += alloc.ram;
                host.bw_available += alloc.bw;
            }
        }
    }

    /// Returns the total number of processing units of the specified host.
    pub fn get_total_units(&self, host_id: u32) -> u32 {
        self.hosts[&host_id].units_total
    }

    /// Returns the number of free processing units on the specified host.
    pub fn get_available_units(&self, host_id: u32) -> u32 {
        self.hosts[&host_id].units_available
    }

    /// Returns the amount of free memory on the specified host.
    pub fn get_available_ram(&self, host_id: u32) -> u64 {
        self.hosts[&host_id].ram_available
    }

    /// Returns the amount of free bandwidth on the specified host.
    pub fn get_available_bw(&self, host_id: u32) -> u64 {
        self.hosts[&host_id].bw_available
    }

    /// Returns the number of VMs currently allocated on the specified host.
    pub fn get_allocation_count(&self, host_id: u32) -> u32 {
        self.hosts[&host_id].allocations.len() as u32
    }

    /// Returns the unit allocation rate (ratio of allocated to total units) of the specified host.
    pub fn get_unit_load(&self, host_id: u32) -> f64 {
        1. - self.hosts[&host_id].units_available as f64 / self.hosts[&host_id].units_total as f64
    }
}
