//! InstanceStatus
//! Point-in-time snapshot of one extension server, as reported to operators

use crate::domain::{ExtensionConfig, ExtensionKind, InstanceState};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceStatus {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ExtensionKind,
    pub status: InstanceState,
    pub enabled: bool,
    pub auto_start: bool,
    pub pid: Option<u32>,
    pub last_error: Option<String>,
}

impl InstanceStatus {
    /// Snapshot for a configuration that has no live instance.
    pub fn inactive(config: &ExtensionConfig) -> Self {
        Self::from_config(config, InstanceState::Inactive, None, None)
    }

    pub(crate) fn from_config(
        config: &ExtensionConfig,
        status: InstanceState,
        pid: Option<u32>,
        last_error: Option<String>,
    ) -> Self {
        Self {
            id: config.id.clone(),
            name: config.name.clone(),
            kind: config.kind,
            status,
            enabled: config.enabled,
            auto_start: config.auto_start,
            pid,
            last_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inactive_snapshot() {
        let cfg = ExtensionConfig::new("cal", "Calendar", "/bin/cal-server")
            .kind(ExtensionKind::Calendar)
            .auto_start(true);
        let status = InstanceStatus::inactive(&cfg);

        assert_eq!(status.id, "cal");
        assert_eq!(status.status, InstanceState::Inactive);
        assert!(status.auto_start);
        assert!(status.pid.is_none());
        assert!(status.last_error.is_none());

        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["type"], "calendar");
        assert_eq!(value["status"], "inactive");
        assert_eq!(value["lastError"], serde_json::Value::Null);
    }
}
