//! Resource name to kind resolution.

/// Kind names for a resource type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceKind {
    pub kind: String,
    pub list_kind: String,
}

const KNOWN_KINDS: &[(&str, &str)] = &[
    ("pods", "Pod"),
    ("services", "Service"),
    ("endpoints", "Endpoints"),
    ("endpointslices", "EndpointSlice"),
    ("configmaps", "ConfigMap"),
    ("secrets", "Secret"),
    ("nodes", "Node"),
    ("namespaces", "Namespace"),
    ("events", "Event"),
    ("serviceaccounts", "ServiceAccount"),
    ("persistentvolumes", "PersistentVolume"),
    ("persistentvolumeclaims", "PersistentVolumeClaim"),
    ("deployments", "Deployment"),
    ("replicasets", "ReplicaSet"),
    ("daemonsets", "DaemonSet"),
    ("statefulsets", "StatefulSet"),
    ("jobs", "Job"),
    ("cronjobs", "CronJob"),
    ("leases", "Lease"),
    ("ingresses", "Ingress"),
    ("networkpolicies", "NetworkPolicy"),
    ("storageclasses", "StorageClass"),
    ("csidrivers", "CSIDriver"),
    ("csinodes", "CSINode"),
    ("runtimeclasses", "RuntimeClass"),
    ("priorityclasses", "PriorityClass"),
    ("roles", "Role"),
    ("rolebindings", "RoleBinding"),
    ("clusterroles", "ClusterRole"),
    ("clusterrolebindings", "ClusterRoleBinding"),
    ("customresourcedefinitions", "CustomResourceDefinition"),
];

impl ResourceKind {
    /// Resolve kind names for a plural resource name.
    ///
    /// Well-known resources use their registered kind; anything else
    /// (custom resources mostly) gets a singularized, capitalized guess.
    pub fn resolve(resource: &str) -> Self {
        let kind = KNOWN_KINDS
            .iter()
            .find(|(plural, _)| *plural == resource)
            .map(|(_, kind)| kind.to_string())
            .unwrap_or_else(|| guess_kind(resource));
        Self::from_kind(kind)
    }

    /// Build from a kind name, deriving the list kind.
    pub fn from_kind(kind: impl Into<String>) -> Self {
        let kind = kind.into();
        let list_kind = format!("{kind}List");
        Self { kind, list_kind }
    }

    /// Build from a list kind such as `PodList`.
    pub fn from_list_kind(list_kind: &str) -> Option<Self> {
        list_kind.strip_suffix("List").filter(|k| !k.is_empty()).map(Self::from_kind)
    }
}

fn guess_kind(resource: &str) -> String {
    let singular = if let Some(stem) = resource.strip_suffix("ies") {
        format!("{stem}y")
    } else if ["sses", "uses", "xes", "ches", "shes"].iter().any(|suffix| resource.ends_with(suffix)) {
        resource[..resource.len() - 2].to_string()
    } else if let Some(stem) = resource.strip_suffix('s') {
        stem.to_string()
    } else {
        resource.to_string()
    };

    let mut chars = singular.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
