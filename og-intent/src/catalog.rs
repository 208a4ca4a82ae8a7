//! Static catalog of the operations the parser can produce.

use crate::types::OperationClass;

#[derive(Debug, Clone, Copy)]
pub struct OperationDescriptor {
    pub id: &'static str,
    pub class: Option<OperationClass>,
    pub description: &'static str,
    /// Argument keys the parser tries to extract for this operation. Drives the
    /// confidence score.
    pub expected_params: &'static [&'static str],
}

pub const EXPORT_DATABASE: &str = "export_database";
pub const CHECK_EXPORT_STATUS: &str = "check_export_status";
pub const DOWNLOAD_DATABASE: &str = "download_database";
pub const DOWNLOAD_BLOBS: &str = "download_blobs";
pub const DOWNLOAD_LOGS: &str = "download_logs";
pub const START_DEPLOYMENT: &str = "start_deployment";
pub const COMPLETE_DEPLOYMENT: &str = "complete_deployment";
pub const RESET_DEPLOYMENT: &str = "reset_deployment";
pub const LIST_DEPLOYMENTS: &str = "list_deployments";
pub const COPY_CONTENT: &str = "copy_content";
pub const LIST_PROJECTS: &str = "list_projects";
pub const SWITCH_PROJECT: &str = "switch_project";

const OPERATIONS: &[OperationDescriptor] = &[
    OperationDescriptor {
        id: EXPORT_DATABASE,
        class: Some(OperationClass::Export),
        description: "Start a database export (bacpac) on the remote environment.",
        expected_params: &["project", "environment", "database"],
    },
    OperationDescriptor {
        id: CHECK_EXPORT_STATUS,
        class: None,
        description: "Report the status of a previously started database export.",
        expected_params: &["project", "export_id"],
    },
    OperationDescriptor {
        id: DOWNLOAD_DATABASE,
        class: Some(OperationClass::Download),
        description: "Download the most recent completed database export.",
        expected_params: &["project", "environment", "database"],
    },
    OperationDescriptor {
        id: DOWNLOAD_BLOBS,
        class: Some(OperationClass::Download),
        description: "Download media/blob files from a storage container.",
        expected_params: &["project", "environment", "container", "time_window_hours"],
    },
    OperationDescriptor {
        id: DOWNLOAD_LOGS,
        class: Some(OperationClass::Download),
        description: "Download application, web or CDN logs for a time window.",
        expected_params: &["project", "environment", "log_type", "time_window_hours"],
    },
    OperationDescriptor {
        id: START_DEPLOYMENT,
        class: Some(OperationClass::Deploy),
        description: "Start a code deployment between two environments.",
        expected_params: &["project", "source_environment", "target_environment"],
    },
    OperationDescriptor {
        id: COMPLETE_DEPLOYMENT,
        class: Some(OperationClass::Deploy),
        description: "Complete a deployment that is awaiting verification.",
        expected_params: &["project", "environment"],
    },
    OperationDescriptor {
        id: RESET_DEPLOYMENT,
        class: Some(OperationClass::Deploy),
        description: "Roll back a deployment that is awaiting verification.",
        expected_params: &["project", "environment"],
    },
    OperationDescriptor {
        id: LIST_DEPLOYMENTS,
        class: None,
        description: "List recent deployments.",
        expected_params: &["project"],
    },
    OperationDescriptor {
        id: COPY_CONTENT,
        class: Some(OperationClass::ContentCopy),
        description: "Copy database and/or blob content between environments.",
        expected_params: &["project", "source_environment", "target_environment"],
    },
    OperationDescriptor {
        id: LIST_PROJECTS,
        class: None,
        description: "List configured projects.",
        expected_params: &[],
    },
    OperationDescriptor {
        id: SWITCH_PROJECT,
        class: None,
        description: "Make a project the session's current target.",
        expected_params: &["project"],
    },
];

pub fn all() -> &'static [OperationDescriptor] {
    OPERATIONS
}

pub fn lookup(id: &str) -> Option<&'static OperationDescriptor> {
    OPERATIONS.iter().find(|op| op.id == id)
}

/// Operations answered from session state rather than a remote endpoint.
pub fn is_remote(id: &str) -> bool {
    id != LIST_PROJECTS && id != SWITCH_PROJECT
}

/// Canonical instructions offered when nothing else matches.
pub const EXAMPLE_COMMANDS: &[&str] = &[
    "export the production database for acme",
    "download the latest database backup",
    "download blobs from production",
    "download application logs from the last 24 hours",
    "deploy from preproduction to production",
    "complete the deployment in production",
    "reset the deployment in preproduction",
    "list deployments",
    "copy content from production to integration",
    "check export status",
    "list projects",
    "switch to project contoso",
];
