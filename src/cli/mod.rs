//! CLI command implementations
//!
//! - `fill`: write data into a template body
//! - `fields`: list the fields of a template body
//! - `check`: validate a mapping
//! - `config`: effective configuration and JSON schemas
//! - `util`: shared argument and file helpers

pub mod check;
pub mod config;
pub mod fields;
pub mod fill;
pub mod util;

pub use check::cmd_check;
pub use config::{cmd_config, cmd_schema};
pub use fields::cmd_fields;
pub use fill::cmd_fill;
