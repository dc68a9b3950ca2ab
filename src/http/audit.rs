//! Security audit logging for the share endpoints.
//!
//! Events go to the `audit` target so they can be filtered or shipped
//! separately from request logs.

use std::net::SocketAddr;
use tracing::{info, warn};

/// Security-relevant events seen by the HTTP surface.
#[derive(Debug, Clone)]
pub enum AuditEvent {
    /// An upload name carried directory components that were stripped.
    PathTraversalBlocked {
        filename: String,
        stored_as: String,
        remote_addr: SocketAddr,
    },
    /// A name that can never be stored was rejected.
    InvalidName {
        name: String,
        remote_addr: SocketAddr,
    },
    /// An upload exceeded the ceiling.
    UploadTooLarge { limit: u64, remote_addr: SocketAddr },
    /// An upload reused a name that is still live.
    DuplicateRejected {
        name: String,
        remote_addr: SocketAddr,
    },
}

/// Log a security audit event with structured fields.
pub fn log_audit_event(event: AuditEvent) {
    match event {
        AuditEvent::PathTraversalBlocked {
            filename,
            stored_as,
            remote_addr,
        } => {
            warn!(
                target: "audit",
                event_type = "path_traversal_blocked",
                %filename,
                %stored_as,
                %remote_addr,
                "Directory components stripped from upload name"
            );
        },
        AuditEvent::InvalidName { name, remote_addr } => {
            warn!(
                target: "audit",
                event_type = "invalid_name",
                name = ?name,
                %remote_addr,
                "Unstorable file name rejected"
            );
        },
        AuditEvent::UploadTooLarge { limit, remote_addr } => {
            warn!(
                target: "audit",
                event_type = "upload_too_large",
                limit,
                %remote_addr,
                "Upload rejected for size"
            );
        },
        AuditEvent::DuplicateRejected { name, remote_addr } => {
            info!(
                target: "audit",
                event_type = "duplicate_rejected",
                %name,
                %remote_addr,
                "Upload rejected, name already shared"
            );
        },
    }
}
