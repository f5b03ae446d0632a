use std::fmt;
use uuid::Uuid;

/// Host name used when the operating system does not report one.
const FALLBACK_HOST_NAME: &str = "localhost";

/// Stable identifier of the host that executes runs.
///
/// It is the name based UUID (version 3, DNS namespace) of the host name, so every run from the
/// same host carries the same indicator without any registration step.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeIndicator(String);

impl NodeIndicator {
    /// Derive the indicator for the current host.
    pub fn detect() -> Self {
        let host_name = sysinfo::System::host_name().unwrap_or_else(|| {
            log::warn!("Host name not available, using {FALLBACK_HOST_NAME} for the node indicator");
            FALLBACK_HOST_NAME.to_string()
        });
        Self::from_host_name(&host_name)
    }

    pub fn from_host_name(host_name: &str) -> Self {
        Self(Uuid::new_v3(&Uuid::NAMESPACE_DNS, host_name.as_bytes()).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The short probe key, which is the first segment of the indicator.
    pub fn probe(&self) -> &str {
        probe_key(&self.0)
    }
}

impl fmt::Display for NodeIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The first `-` separated segment of a node indicator.
pub fn probe_key(node_indicator: &str) -> &str {
    node_indicator
        .split_once('-')
        .map_or(node_indicator, |(head, _)| head)
}
