pub mod analytics;
pub mod assignment;
pub mod conversation;
pub mod registry;
pub mod sla;
pub mod ticket;
