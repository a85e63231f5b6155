//! Persistence for server records and notification throttle records
//!
//! SQLite is the production store; in-memory mocks back the unit and
//! integration tests. See [`repository`] for the trait definitions.

pub mod repository;

pub use repository::{
    create_sqlite_repositories, InviteUpdateRepository, MockInviteUpdateRepository,
    MockServerRepository, ServerRepository, SharedInviteUpdateRepository, SharedServerRepository,
    SqliteRepository,
};
