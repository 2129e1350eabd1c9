pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod session;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{LeadDeskConfig, StoreBackend};
pub use error::{ErrorKind, LeadDeskError, Result};
pub use session::{Session, SessionVerifier, SignedTokenVerifier};
pub use store::{
    AgentDirectory, LeadFilter, LeadStore, MemoryStore, MessageStore, PgStore,
    ReassignmentReport, SettingsStore, Store, StoreHealth,
};
