//! Virtual machine placement policies.

use crate::core::common::Allocation;
use crate::core::common::AllocationVerdict;
use crate::core::resource_pool::ResourcePoolState;

/// Trait for implementation of VM placement policies.
///
/// The policy is defined as a function of VM allocation request and current
/// resource pool state, which returns an ID of host selected for VM placement
/// or `None` if there is no suitable host. The policy never mutates the pool;
/// committing the allocation is the caller's job.
pub trait AllocationPolicy {
    fn select_host(&self, alloc: &Allocation, pool_state: &ResourcePoolState) -> Option<u32>;
}

/// Instantiates the placement policy selected by configuration.
pub fn allocation_policy_resolver(policy_name: &str) -> Box<dyn AllocationPolicy> {
    match policy_name {
        "FirstFit" => Box::new(FirstFit::new()),
        "BestFit" => Box::new(BestFit::new()),
        "WorstFit" => Box::new(WorstFit::new()),
        _ => panic!("Can't resolve allocation policy: {}", policy_name),
    }
}

////////////////////////////////////////////////////////////////////////////////

/// FirstFit policy, which returns the suitable host with the lowest id.
pub struct FirstFit;

impl FirstFit {
    pub fn new() -> Self {
        Self {}
    }
}

impl AllocationPolicy for FirstFit {
    fn select_host(&self, alloc: &Allocation, pool_state: &ResourcePoolState) -> Option<u32> {
        for host in pool_state.get_hosts_list() {
            if pool_state.can_allocate(alloc, host) == AllocationVerdict::Success {
                return Some(host);
            }
        }
        None
    }
}

////////////////////////////////////////////////////////////////////////////////

/// BestFit policy, which returns the most loaded (by free units) suitable host.
pub struct BestFit;

impl BestFit {
    pub fn new() -> Self {
        Self {}
    }
}

impl AllocationPolicy for BestFit {
    fn select_host(&self, alloc: &Allocation, pool_state: &ResourcePoolState) -> Option<u32> {
        let mut result: Option<u32> = None;
        let mut min_available_units: u32 = u32::MAX;

        for host in pool_state.get_hosts_list() {
            if pool_state.can_allocate(alloc, host) == AllocationVerdict::Success
                && pool_state.get_available_units(host) < min_available_units
            {
                min_available_units = pool_state.get_available_units(host);
                result = Some(host);
            }
        }
        result
    }
}

////////////////////////////////////////////////////////////////////////////////

/// WorstFit policy, which returns the least loaded (by free units) suitable host.
pub struct WorstFit;

impl WorstFit {
    pub fn new() -> Self {
        Self {}
    }
}

impl AllocationPolicy for WorstFit {
    fn select_host(&self, alloc: &Allocation, pool_state: &ResourcePoolState) -> Option<u32> {
        let mut result: Option<u32> = None;
        let mut max_available_units: Option<u32> = None;

        for host in pool_state.get_hosts_list() {
            if pool_state.can_allocate(alloc, host) == AllocationVerdict::Success
                && max_available_units.map_or(true, |max| pool_state.get_available_units(host) > max)
            {
                max_available_units = Some(pool_state.get_available_units(host));
                result = Some(host);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alloc(units: u32) -> Allocation {
        Allocation {
            vm_id: 0,
            units,
            ram: 0,
            bw: 0,
        }
    }

    fn pool() -> ResourcePoolState {
        let mut pool = ResourcePoolState::new();
        pool.add_host(1, 8, 8192, 1000);
        pool.add_host(2, 4, 8192, 1000);
        pool.add_host(3, 16, 8192, 1000);
        pool
    }

    #[test]
    fn first_fit_scans_hosts_in_ascending_id_order() {
        let pool = pool();
        assert_eq!(FirstFit::new().select_host(&alloc(2), &pool), Some(1));
        assert_eq!(FirstFit::new().select_host(&alloc(12), &pool), Some(3));
        assert_eq!(FirstFit::new().select_host(&alloc(32), &pool), None);
    }

    #[test]
    fn best_fit_picks_the_tightest_host() {
        let pool = pool();
        assert_eq!(BestFit::new().select_host(&alloc(2), &pool), Some(2));
    }

    #[test]
    fn worst_fit_picks_the_roomiest_host() {
        let pool = pool();
        assert_eq!(WorstFit::new().select_host(&alloc(2), &pool), Some(3));
    }
}
