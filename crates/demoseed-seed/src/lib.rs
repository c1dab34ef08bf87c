//! Idempotent seeding of record sets into remote business systems.
//!
//! The [`Seeder`] walks a record set in order, resolves references through
//! the [`Resolver`], and creates or updates entities through a
//! [`RemoteClient`]. One failing record never stops the others; only
//! authentication and schema-mismatch errors, or a missing structural
//! prerequisite, abort a run.
//!
//! [`Seeder::clear`] is the reverse: it deletes the remote entities whose
//! natural keys appear in a record set.

pub mod client;
pub mod errors;
pub mod memory;
pub mod odoo;
pub mod resolver;
pub mod rest;
pub mod seeder;

pub use client::{KeyFilter, RemoteClient, RemoteEntity, RemoteId};
pub use errors::{RemoteError, SeedError};
pub use memory::{InMemoryRemote, RemoteCall, RemoteOp};
pub use odoo::{OdooConfig, OdooRpcClient};
pub use resolver::Resolver;
pub use rest::{RestClient, RestConfig};
pub use seeder::{ClearResult, RecordAction, RecordOutcome, SeedFailure, SeedResult, SeedState, Seeder};

pub use demoseed_plan::SeedTarget;
