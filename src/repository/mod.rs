//! Persistence operations over the four standup tables.
//!
//! Everything here is a free function over `&mut SqliteConnection`. Callers
//! own transaction scope: the standup service wraps each public operation in
//! one transaction and passes the same connection down. Writes take the
//! caller's `now` for their `created_at` / `updated_at` columns.

pub mod pending_states;
pub mod reports;
pub mod users;
pub mod workspaces;
