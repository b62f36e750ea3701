//! Sessions and their append-only event log

mod model;
mod store;

pub use model::{context_roles, RoutingPolicy, Session, UsageDelta, UsageTotals};
pub use store::EventStore;
