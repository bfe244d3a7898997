//! Fake device-plugin capacity advertised by the simulated node.

use std::collections::BTreeMap;

use tracing::{error, info};

use crate::quantity::Quantity;
use crate::record::ResourceList;

/// Extended (device-plugin) resources configured for the node. Capacity and
/// allocatable are always equal since nothing is actually consumed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceCapacity {
    resources: ResourceList,
}

/// Kubernetes-native resources: unprefixed names and the `kubernetes.io/` domain.
pub fn is_native_resource(name: &str) -> bool {
    !name.contains('/') || name.contains("kubernetes.io/")
}

impl DeviceCapacity {
    /// Build from the node's configured capacity. Native resources are left to
    /// the node itself; values must be plain integers.
    pub fn from_node_capacity(capacity: &BTreeMap<String, String>) -> Self {
        let mut resources = ResourceList::new();
        for (name, value) in capacity {
            if is_native_resource(name) {
                info!(name = %name, "skip registering native resource");
                continue;
            }
            match value.parse::<i64>() {
                Ok(count) => {
                    resources.insert(name.clone(), Quantity::from_value(count));
                }
                Err(e) => {
                    error!(name = %name, value = %value, error = %e, "failed to parse resource value");
                }
            }
        }
        Self { resources }
    }

    pub fn capacity(&self) -> &ResourceList {
        &self.resources
    }

    pub fn allocatable(&self) -> &ResourceList {
        &self.resources
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_only_extended_integer_resources() {
        let capacity = BTreeMap::from([
            ("cpu".to_string(), "8".to_string()),
            ("memory".to_string(), "16Gi".to_string()),
            ("kubernetes.io/batch".to_string(), "1".to_string()),
            ("nvidia.com/gpu".to_string(), "4".to_string()),
            ("example.com/fpga".to_string(), "two".to_string()),
        ]);

        let devices = DeviceCapacity::from_node_capacity(&capacity);
        assert_eq!(devices.capacity().len(), 1);
        assert_eq!(devices.capacity()["nvidia.com/gpu"].value(), 4);
        assert_eq!(devices.allocatable(), devices.capacity());
    }

    #[test]
    fn padded_values_are_rejected() {
        let capacity = BTreeMap::from([
            ("nvidia.com/gpu".to_string(), " 4 ".to_string()),
            ("example.com/fpga".to_string(), "+2".to_string()),
        ]);

        let devices = DeviceCapacity::from_node_capacity(&capacity);
        assert!(!devices.capacity().contains_key("nvidia.com/gpu"));
        assert_eq!(devices.capacity()["example.com/fpga"].value(), 2);
    }

    #[test]
    fn native_resource_detection() {
        assert!(is_native_resource("cpu"));
        assert!(is_native_resource("hugepages-2Mi"));
        assert!(is_native_resource("requests.kubernetes.io/foo"));
        assert!(!is_native_resource("nvidia.com/gpu"));
    }
}
