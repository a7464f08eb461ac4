//! GPU resource types that reservations can claim

use serde::{Deserialize, Serialize};

use crate::{GpuslotError, GpuslotResult};

/// A reservable GPU resource type; each has its own timeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuResourceType {
    /// Identifier used by reservations (e.g., "A100")
    pub name: String,
    /// GPU vendor
    #[serde(default = "default_vendor")]
    pub vendor: GpuVendor,
    /// Architecture name
    pub architecture: String,
    /// Device memory description
    pub memory: String,
    /// Number of GPUs behind this resource type
    pub gpu_count: u32,
}

fn default_vendor() -> GpuVendor {
    GpuVendor::Nvidia
}

impl GpuResourceType {
    pub fn new(name: &str, architecture: &str, memory: &str, gpu_count: u32) -> Self {
        Self {
            name: name.to_string(),
            vendor: GpuVendor::Nvidia,
            architecture: architecture.to_string(),
            memory: memory.to_string(),
            gpu_count,
        }
    }
}

/// GPU vendor types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Unknown,
}

impl std::fmt::Display for GpuVendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GpuVendor::Nvidia => write!(f, "NVIDIA"),
            GpuVendor::Amd => write!(f, "AMD"),
            GpuVendor::Intel => write!(f, "Intel"),
            GpuVendor::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Set of resource types known to the system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceCatalog {
    pub resource_types: Vec<GpuResourceType>,
}

impl Default for ResourceCatalog {
    fn default() -> Self {
        Self {
            resource_types: vec![
                GpuResourceType::new("A100", "Ampere", "80GB HBM2e", 8),
                GpuResourceType::new("V100", "Volta", "32GB HBM2", 4),
                GpuResourceType::new("RTX4090", "Ada Lovelace", "24GB GDDR6X", 4),
                GpuResourceType::new("H100", "Hopper", "80GB HBM3", 8),
            ],
        }
    }
}

impl ResourceCatalog {
    pub fn new(resource_types: Vec<GpuResourceType>) -> Self {
        Self { resource_types }
    }

    /// Look up a resource type by exact name
    pub fn get(&self, name: &str) -> Option<&GpuResourceType> {
        self.resource_types.iter().find(|r| r.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Reject resource types that are not in the catalog
    pub fn validate(&self, name: &str) -> GpuslotResult<()> {
        if self.contains(name) {
            Ok(())
        } else {
            Err(GpuslotError::Validation(format!(
                "unknown resource type '{}' (known: {})",
                name,
                self.names().join(", ")
            )))
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.resource_types.iter().map(|r| r.name.as_str()).collect()
    }

    /// Total GPUs across all resource types
    pub fn total_gpus(&self) -> u32 {
        self.resource_types.iter().map(|r| r.gpu_count).sum()
    }
}
