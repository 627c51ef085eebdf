//! Run configuration: typed model plus YAML loading with `${VAR}`
//! environment substitution.

pub mod parser;
pub mod types;

pub use parser::{load_config, parse_config_str, substitute_env_vars};
pub use types::{Binaries, DatabaseConfig, DumpConfig, PartsConfig};
