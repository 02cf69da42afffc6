//! Simulation configuration.

use serde::{Deserialize, Serialize};

/// Represents physical host(s) configuration.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct HostConfig {
    /// Host name. Should be set if count = 1
    pub name: Option<String>,
    /// Host name prefix. Full name is produced by appending instance number to the prefix.
    /// Should be set if count > 1
    pub name_prefix: Option<String>,
    /// number of processing units
    pub units: u32,
    /// host memory capacity
    pub ram: u64,
    /// host network bandwidth capacity
    pub bw: u64,
    /// number of such hosts
    pub count: Option<u32>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
struct ConfigDataRaw {
    /// message trip time between any two components
    message_delay: Option<f64>,
    /// processing rate of a single unit, shared by all hosts
    unit_rate: Option<f64>,
    /// VM placement policy used by the datacenter
    allocation_policy: Option<String>,
    /// task scheduling discipline used by the VMs
    task_discipline: Option<String>,
    /// cloud physical hosts
    hosts: Option<Vec<HostConfig>>,
}

/// Represents simulation configuration.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// message trip time between any two components
    pub message_delay: f64,
    /// processing rate of a single unit, shared by all hosts
    pub unit_rate: f64,
    /// VM placement policy used by the datacenter
    pub allocation_policy: String,
    /// task scheduling discipline used by the VMs
    pub task_discipline: String,
    /// cloud physical hosts
    pub hosts: Vec<HostConfig>,
}

impl SimulationConfig {
    /// Creates simulation config with default parameter values.
    pub fn new() -> Self {
        Self {
            message_delay: 0.,
            unit_rate: 1000.,
            allocation_policy: "FirstFit".to_string(),
            task_discipline: "TimeShared".to_string(),
            hosts: Vec::new(),
        }
    }

    /// Creates simulation config by reading parameter values from .yaml file
    /// (uses default values if some parameters are absent).
    pub fn from_file(file_name: &str) -> Self {
        let raw: ConfigDataRaw = serde_yaml::from_str(
            &std::fs::read_to_string(file_name).unwrap_or_else(|_| panic!("Can't read file {}", file_name)),
        )
        .unwrap_or_else(|_| panic!("Can't parse YAML from file {}", file_name));
        let default = SimulationConfig::new();
        Self {
            message_delay: raw.message_delay.unwrap_or(default.message_delay),
            unit_rate: raw.unit_rate.unwrap_or(default.unit_rate),
            allocation_policy: raw.allocation_policy.unwrap_or(default.allocation_policy),
            task_discipline: raw.task_discipline.unwrap_or(default.task_discipline),
            hosts: raw.hosts.unwrap_or_default(),
        }
    }

    /// Returns total hosts count.
    pub fn number_of_hosts(&self) -> u32 {
        self.hosts.iter().map(|host| host.count.unwrap_or(1)).sum()
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::new()
    }
}
