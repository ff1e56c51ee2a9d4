//! # Sandbox Tax Authority
//!
//! In-process stand-in for SUNAT/OSE, used in development and tests.
//!
//! ## Behaviors
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  behavior              submit()            fetch_status()               │
//! │  ─────────────────     ─────────────────   ──────────────────────────   │
//! │  accept_immediately    ACEPTADO            ACEPTADO                     │
//! │  accept_after_polls N  PENDIENTE           PENDIENTE until poll N       │
//! │  reject                RECHAZADO           RECHAZADO                    │
//! │  always_pending        PENDIENTE           PENDIENTE                    │
//! │  unreachable           transport error     transport error              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The behavior is fixed per instance and chosen by configuration
//! (`[authority] mode = "..."` or `FACTURO_AUTHORITY_BEHAVIOR`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::ports::{AuthorityResponse, AuthorityStatus, SubmissionPayload, TaxAuthorityClient};

// =============================================================================
// Behavior
// =============================================================================

/// How the sandbox answers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SandboxBehavior {
    /// Accept every document on submission.
    #[default]
    AcceptImmediately,

    /// Answer PENDIENTE until the document has been polled `polls` times.
    AcceptAfterPolls { polls: u32 },

    /// Reject every document with `reason`.
    Reject {
        #[serde(default = "default_rejection")]
        reason: String,
    },

    /// Never reach a verdict.
    AlwaysPending,

    /// Fail every call at the transport level.
    Unreachable,
}

fn default_rejection() -> String {
    "2017 - El número de documento de identidad del receptor no es válido".to_string()
}

impl std::fmt::Display for SandboxBehavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SandboxBehavior::AcceptImmediately => write!(f, "accept_immediately"),
            SandboxBehavior::AcceptAfterPolls { polls } => write!(f, "accept_after_polls:{}", polls),
            SandboxBehavior::Reject { .. } => write!(f, "reject"),
            SandboxBehavior::AlwaysPending => write!(f, "always_pending"),
            SandboxBehavior::Unreachable => write!(f, "unreachable"),
        }
    }
}

/// Parses `accept`, `accept_after_polls:N`, `reject[:reason]`,
/// `always_pending` or `unreachable`.
impl FromStr for SandboxBehavior {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (mode, arg) = match s.trim().split_once(':') {
            Some((mode, arg)) => (mode.to_lowercase(), Some(arg.trim())),
            None => (s.trim().to_lowercase(), None),
        };

        match (mode.as_str(), arg) {
            ("accept" | "accept_immediately", None) => Ok(SandboxBehavior::AcceptImmediately),
            ("accept_after_polls" | "accept_after", Some(n)) => n
                .parse()
                .map(|polls| SandboxBehavior::AcceptAfterPolls { polls })
                .map_err(|_| EngineError::Config(format!("Invalid poll count in '{}'", s))),
            ("reject", reason) => Ok(SandboxBehavior::Reject {
                reason: reason.map(String::from).unwrap_or_else(default_rejection),
            }),
            ("always_pending" | "pending", None) => Ok(SandboxBehavior::AlwaysPending),
            ("unreachable" | "offline", None) => Ok(SandboxBehavior::Unreachable),
            _ => Err(EngineError::Config(format!(
                "Unknown authority behavior: '{}'. Valid options: accept, accept_after_polls:N, \
                 reject[:reason], always_pending, unreachable",
                s
            ))),
        }
    }
}

// =============================================================================
// Sandbox Authority
// =============================================================================

#[derive(Debug)]
struct Ticket {
    /// "{ruc}-{code}-{number}", used to name the XML and CDR.
    key: String,
    polls: u32,
}

/// Deterministic [`TaxAuthorityClient`] driven by a [`SandboxBehavior`].
#[derive(Debug)]
pub struct SandboxAuthority {
    behavior: SandboxBehavior,
    tickets: Mutex<HashMap<String, Ticket>>,
    next_ticket: AtomicU64,
    submit_calls: AtomicU32,
    status_calls: AtomicU32,
}

impl SandboxAuthority {
    pub fn new(behavior: SandboxBehavior) -> Self {
        SandboxAuthority {
            behavior,
            tickets: Mutex::new(HashMap::new()),
            next_ticket: AtomicU64::new(1),
            submit_calls: AtomicU32::new(0),
            status_calls: AtomicU32::new(0),
        }
    }

    pub fn behavior(&self) -> &SandboxBehavior {
        &self.behavior
    }

    /// Number of `submit` calls received.
    pub fn submit_calls(&self) -> u32 {
        self.submit_calls.load(Ordering::SeqCst)
    }

    /// Number of `fetch_status` calls received.
    pub fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }

    fn respond(&self, status: AuthorityStatus, remote_id: &str, key: &str) -> AuthorityResponse {
        let accepted = status == AuthorityStatus::Aceptado;
        let error_message = match (&self.behavior, status) {
            (SandboxBehavior::Reject { reason }, AuthorityStatus::Rechazado) => Some(reason.clone()),
            _ => None,
        };
        AuthorityResponse {
            status,
            remote_id: Some(remote_id.to_string()),
            xml: Some(format!("xml/{}.xml", key)),
            cdr: accepted.then(|| format!("cdr/R-{}.zip", key)),
            error_message,
        }
    }

    fn status_after(&self, polls: u32) -> AuthorityStatus {
        match &self.behavior {
            SandboxBehavior::AcceptImmediately => AuthorityStatus::Aceptado,
            SandboxBehavior::AcceptAfterPolls { polls: needed } if polls >= *needed => {
                AuthorityStatus::Aceptado
            }
            SandboxBehavior::AcceptAfterPolls { .. } | SandboxBehavior::AlwaysPending => {
                AuthorityStatus::Pendiente
            }
            SandboxBehavior::Reject { .. } => AuthorityStatus::Rechazado,
            SandboxBehavior::Unreachable => AuthorityStatus::Pendiente,
        }
    }

    fn unreachable() -> EngineError {
        EngineError::Authority("sandbox authority is unreachable".to_string())
    }
}

impl Default for SandboxAuthority {
    fn default() -> Self {
        Self::new(SandboxBehavior::default())
    }
}

#[async_trait]
impl TaxAuthorityClient for SandboxAuthority {
    async fn submit(&self, payload: &SubmissionPayload) -> EngineResult<AuthorityResponse> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        if self.behavior == SandboxBehavior::Unreachable {
            return Err(Self::unreachable());
        }

        let remote_id = format!("SBX-{:08}", self.next_ticket.fetch_add(1, Ordering::SeqCst));
        let key = format!("{}-{}-{}", payload.issuer_ruc, payload.document_code, payload.number);
        let status = self.status_after(0);

        debug!(remote_id = %remote_id, number = %payload.number, ?status, "Sandbox received document");

        let response = self.respond(status, &remote_id, &key);
        self.tickets
            .lock()
            .await
            .insert(remote_id, Ticket { key, polls: 0 });
        Ok(response)
    }

    async fn fetch_status(&self, remote_id: &str) -> EngineResult<AuthorityResponse> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if self.behavior == SandboxBehavior::Unreachable {
            return Err(Self::unreachable());
        }

        // Tickets issued by another instance start counting here
        let mut tickets = self.tickets.lock().await;
        let ticket = tickets.entry(remote_id.to_string()).or_insert_with(|| Ticket {
            key: remote_id.to_string(),
            polls: 0,
        });
        ticket.polls += 1;

        let status = self.status_after(ticket.polls);
        Ok(self.respond(status, remote_id, &ticket.key))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn payload() -> SubmissionPayload {
        SubmissionPayload {
            issuer_ruc: "20100070970".into(),
            issuer_name: "Bodega Don Lucho SAC".into(),
            document_code: "01".into(),
            number: "F0A1-00000001".into(),
            issue_date: Utc::now(),
            currency: "PEN".into(),
            customer_identity: Some("20601030013".into()),
            customer_name: Some("Comercial Andina SAC".into()),
            taxed_cents: 1000,
            exempt_cents: 0,
            igv_cents: 180,
            total_cents: 1180,
            affected_number: None,
            affected_code: None,
            motive_code: None,
            lines: vec![],
        }
    }

    #[test]
    fn test_behavior_parsing() {
        assert_eq!("accept".parse::<SandboxBehavior>().unwrap(), SandboxBehavior::AcceptImmediately);
        assert_eq!(
            "accept_after_polls:3".parse::<SandboxBehavior>().unwrap(),
            SandboxBehavior::AcceptAfterPolls { polls: 3 }
        );
        assert_eq!(
            "reject:RUC no habido".parse::<SandboxBehavior>().unwrap(),
            SandboxBehavior::Reject {
                reason: "RUC no habido".into()
            }
        );
        assert_eq!("UNREACHABLE".parse::<SandboxBehavior>().unwrap(), SandboxBehavior::Unreachable);
        assert!("accept_after_polls:x".parse::<SandboxBehavior>().is_err());
        assert!("chaos".parse::<SandboxBehavior>().is_err());
    }

    #[test]
    fn test_behavior_toml_shape() {
        let behavior: SandboxBehavior = toml::from_str("mode = \"accept_after_polls\"\npolls = 2").unwrap();
        assert_eq!(behavior, SandboxBehavior::AcceptAfterPolls { polls: 2 });
    }

    #[tokio::test]
    async fn test_accept_immediately() {
        let sandbox = SandboxAuthority::default();
        let response = sandbox.submit(&payload()).await.unwrap();
        assert_eq!(response.status, AuthorityStatus::Aceptado);
        assert_eq!(
            response.cdr.as_deref(),
            Some("cdr/R-20100070970-01-F0A1-00000001.zip")
        );
        assert_eq!(sandbox.submit_calls(), 1);
    }

    #[tokio::test]
    async fn test_accept_after_polls() {
        let sandbox = SandboxAuthority::new(SandboxBehavior::AcceptAfterPolls { polls: 2 });
        let submitted = sandbox.submit(&payload()).await.unwrap();
        assert_eq!(submitted.status, AuthorityStatus::Pendiente);
        assert!(submitted.cdr.is_none());

        let remote_id = submitted.remote_id.unwrap();
        let first = sandbox.fetch_status(&remote_id).await.unwrap();
        assert_eq!(first.status, AuthorityStatus::Pendiente);
        let second = sandbox.fetch_status(&remote_id).await.unwrap();
        assert_eq!(second.status, AuthorityStatus::Aceptado);
        assert_eq!(sandbox.status_calls(), 2);
    }

    #[tokio::test]
    async fn test_reject_and_unreachable() {
        let rejecting = SandboxAuthority::new(SandboxBehavior::Reject { reason: "mal".into() });
        let response = rejecting.submit(&payload()).await.unwrap();
        assert_eq!(response.status, AuthorityStatus::Rechazado);
        assert_eq!(response.error_message.as_deref(), Some("mal"));

        let offline = SandboxAuthority::new(SandboxBehavior::Unreachable);
        let err = offline.submit(&payload()).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(offline.fetch_status("SBX-00000001").await.is_err());
    }
}
