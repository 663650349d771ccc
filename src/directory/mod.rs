//! Azure AD directory access through Microsoft Graph.
//!
//! Provides paginated user and group-membership traversal with early exit,
//! plus point lookups by id and by mail.

pub mod client;
pub mod cursor;
pub mod models;

pub use client::DirectoryClient;
pub use cursor::PageCursor;
pub use models::{DirectoryObject, DirectoryUser, Group};
