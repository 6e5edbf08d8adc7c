//! # Valheim Server Monitor Library
//!
//! This library watches a Valheim dedicated server by reading the text log
//! the server appends to, and maintains an authoritative in-memory picture
//! of the world: who is connected, who is mid-handshake, which characters
//! exist and how often they have died, which world is loaded and what
//! in-game day it is.
//!
//! ## Core Responsibilities
//!
//! ### Incremental Log Ingestion
//! The log is fetched in full on every poll (the source is not assumed to
//! support range reads) and a remembered line offset makes processing
//! incremental and idempotent: re-polling an unchanged log is a no-op, and a
//! failed fetch simply retries the same lines next cycle.
//!
//! ### Connection Reconciliation
//! A connection spans multiple independent log lines with no shared
//! correlation id. The registry reconstructs the lifecycle anyway: handshake
//! starts are queued FIFO by Steam id, completions bind the earliest pending
//! start to a character, and disconnects tear the result down. The FIFO
//! correlation assumption is documented in [`pending`] together with its
//! known limitation.
//!
//! ### Identity Resolution
//! Steam ids are resolved to display identities through an injected
//! [`sources::IdentityResolver`], once per id, with failures degrading to an
//! Unknown placeholder that retries on the next appearance.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Poll Loop
//! All classification and state mutation happens synchronously inside
//! [`monitor::ServerMonitor::poll`], in log-line order — which is the
//! load-bearing ordering assumption behind the FIFO handshake matching. The
//! binary drives polls from a periodic tokio timer; `&mut self` guarantees
//! polls never overlap.
//!
//! ### Dependency Injection at the Boundaries
//! The log transport and the identity service are the only external
//! collaborators, both taken as constructor parameters behind one-method
//! traits. Tests substitute in-memory fakes; deployments pick a transport.
//!
//! ## Module Organization
//!
//! ### Pending Module (`pending`)
//! The connection lifecycle type and the FIFO tracker matching handshake
//! starts to completions.
//!
//! ### Registry Module (`registry`)
//! Profiles, characters and live connections, double-indexed for the two
//! kinds of lookup the log demands (by session id and by Steam id).
//!
//! ### Monitor Module (`monitor`)
//! The poll cycle: fetch, classify, apply, advance offset; plus the event
//! history and status snapshots for presentation layers.
//!
//! ### Sources Module (`sources`)
//! Collaborator traits and the stock implementations (local log file,
//! offline identity resolver).

pub mod monitor;
pub mod pending;
pub mod registry;
pub mod sources;
