//! tendrl-agent: host-local message forwarding to the tendrl ingest API.
//!
//! Co-resident applications write JSON messages to a local stream socket;
//! the agent queues fire-and-forget publishes and forwards them upstream in
//! adaptive batches sized from live CPU, memory, and queue telemetry.
//! Synchronous publishes and downstream polls bypass the queue and are
//! served inline on the connection. One agent-wide credential authenticates
//! every upstream call, so individual applications never hold the key.
//!
//! Pipeline:
//!
//! ```text
//!   clients ──► ingress listener ──► connection handlers
//!                                        │        │
//!                              (publish) │        │ (wait / msg_check)
//!                                        v        v
//!                                 bounded queue   upstream client
//!                                        │             ▲
//!                                        v             │
//!                                  egress worker ──────┘
//!                              (metrics probe + batch controller)
//! ```

pub mod agent;
pub mod batch;
pub mod cli;
pub mod codec;
pub mod config;
pub mod egress;
pub mod error;
pub mod ingress;
pub mod messages;
pub mod platform;
pub mod queue;
pub mod upstream;

pub use agent::Agent;
pub use config::Config;
pub use error::AgentError;
