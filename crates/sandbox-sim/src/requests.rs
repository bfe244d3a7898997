//! Requested-resource derivation at sandbox creation.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::pod::Pod;
use crate::quantity::Quantity;
use crate::record::{RESOURCE_CPU, RESOURCE_MEMORY, ResourceList};

/// What to do with container requests other than `cpu` and `memory`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnrecognizedResources {
    /// Drop them (logged at debug).
    #[default]
    Skip,
    /// Keep them on the record. They are never aggregated.
    Keep,
}

fn is_recognized(name: &str) -> bool {
    name == RESOURCE_CPU || name == RESOURCE_MEMORY
}

/// Zero `cpu` and `memory`; the baseline every sandbox starts from.
pub fn zero_requests() -> ResourceList {
    ResourceList::from([
        (RESOURCE_CPU.to_string(), Quantity::ZERO),
        (RESOURCE_MEMORY.to_string(), Quantity::ZERO),
    ])
}

/// Sum each container's resource *requests* (limits are ignored).
pub fn derive_requests(pod: &Pod, policy: UnrecognizedResources) -> ResourceList {
    let mut requested = zero_requests();

    for container in &pod.spec.containers {
        for (name, raw) in &container.resources.requests {
            if !is_recognized(name) && policy == UnrecognizedResources::Skip {
                debug!(
                    namespace = %pod.namespace(),
                    pod = %pod.name(),
                    container = %container.name,
                    resource = %name,
                    "unsupported resource request ignored"
                );
                continue;
            }

            let quantity = match raw.parse::<Quantity>() {
                Ok(q) => q,
                Err(e) => {
                    warn!(
                        namespace = %pod.namespace(),
                        pod = %pod.name(),
                        container = %container.name,
                        resource = %name,
                        error = %e,
                        "skipping malformed resource request"
                    );
                    continue;
                }
            };

            *requested.entry(name.clone()).or_default() += quantity;
        }
    }

    requested
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pod::Container;

    fn q(s: &str) -> Quantity {
        s.parse().unwrap()
    }

    #[test]
    fn sums_requests_across_containers() {
        let pod = Pod::new("default", "web-0")
            .with_container(Container::with_requests("app", &[("cpu", "100m"), ("memory", "128Mi")]))
            .with_container(Container::with_requests("sidecar", &[("cpu", "50m"), ("memory", "72Mi")]));

        let requested = derive_requests(&pod, UnrecognizedResources::Skip);
        assert_eq!(requested[RESOURCE_CPU], q("150m"));
        assert_eq!(requested[RESOURCE_MEMORY], q("200Mi"));
    }

    #[test]
    fn limits_are_not_requests() {
        let mut container = Container::with_requests("app", &[("cpu", "100m")]);
        container
            .resources
            .limits
            .insert("cpu".into(), "2".into());
        let pod = Pod::new("default", "web-0").with_container(container);

        let requested = derive_requests(&pod, UnrecognizedResources::Skip);
        assert_eq!(requested[RESOURCE_CPU], q("100m"));
    }

    #[test]
    fn missing_resources_default_to_zero() {
        let pod = Pod::new("default", "idle").with_container(Container::with_requests("app", &[]));
        let requested = derive_requests(&pod, UnrecognizedResources::Skip);
        assert_eq!(requested, zero_requests());
    }

    #[test]
    fn unrecognized_resources_follow_policy() {
        let pod = Pod::new("default", "gpu").with_container(Container::with_requests(
            "app",
            &[("cpu", "1"), ("nvidia.com/gpu", "2")],
        ));

        let skipped = derive_requests(&pod, UnrecognizedResources::Skip);
        assert!(!skipped.contains_key("nvidia.com/gpu"));
        assert_eq!(skipped.len(), 2);

        let kept = derive_requests(&pod, UnrecognizedResources::Keep);
        assert_eq!(kept["nvidia.com/gpu"], q("2"));
        assert_eq!(kept[RESOURCE_CPU], q("1"));
    }

    #[test]
    fn malformed_quantity_skips_only_that_entry() {
        let pod = Pod::new("default", "bad")
            .with_container(Container::with_requests("a", &[("cpu", "lots"), ("memory", "1Gi")]))
            .with_container(Container::with_requests("b", &[("cpu", "250m")]));

        let requested = derive_requests(&pod, UnrecognizedResources::Skip);
        assert_eq!(requested[RESOURCE_CPU], q("250m"));
        assert_eq!(requested[RESOURCE_MEMORY], q("1Gi"));
    }
}
