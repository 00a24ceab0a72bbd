//! Audit trail for the session gate.
//!
//! Events go to the `audit` tracing target so they can be routed apart
//! from request logs, e.g. `RUST_LOG=info,audit=info`.

use super::middleware::ClientAddr;
use tracing::{info, warn};

/// Something the gate decided about a client.
#[derive(Debug, Clone)]
pub enum AuditEvent {
    /// Failed login attempt
    AuthFailure { client: ClientAddr, reason: String },
    /// Successful login (session created)
    AuthSuccess { client: ClientAddr, user: String },
    /// Session ended by logout
    Logout { client: ClientAddr },
    /// Unauthenticated request to a protected path
    AccessDenied { path: String, client: ClientAddr },
}

/// Emits `event` on the `audit` target.
pub fn log_audit_event(event: AuditEvent) {
    match event {
        AuditEvent::AuthFailure { client, reason } => {
            warn!(
                target: "audit",
                event_type = "auth_failure",
                %client,
                %reason,
                "Authentication failed"
            );
        },
        AuditEvent::AuthSuccess { client, user } => {
            info!(
                target: "audit",
                event_type = "auth_success",
                %client,
                %user,
                "Session created"
            );
        },
        AuditEvent::Logout { client } => {
            info!(
                target: "audit",
                event_type = "logout",
                %client,
                "Logged out"
            );
        },
        AuditEvent::AccessDenied { path, client } => {
            info!(
                target: "audit",
                event_type = "access_denied",
                %path,
                %client,
                "Unauthenticated request rejected"
            );
        },
    }
}
