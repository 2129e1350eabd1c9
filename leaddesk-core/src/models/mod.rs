pub mod agent;
pub mod lead;
pub mod message;
pub mod settings;

pub use agent::{Agent, AgentRole, NewAgent};
pub use lead::{ContactDetails, Lead, LeadStatus, SlaState};
pub use message::{Message, MessageAuthor};
pub use settings::{ChatSettings, MissedChatTimer};
