pub mod config;
pub mod selector;
pub mod types;

pub use config::CanarydConfig;
pub use selector::{LabelSelector, Requirement, SelectorError};
pub use types::*;
