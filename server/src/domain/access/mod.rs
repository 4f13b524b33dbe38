//! Access control: per-user row restrictions and submission-time rights

mod resolver;
mod rights;

pub use resolver::{AccessFilterResolver, AccessFilters, GrantSource};
pub use rights::{FieldKind, RightsProblem, check_rights};
