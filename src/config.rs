pub use self::parser::{Config, DatabaseConfig, LoggingConfig, ProvisioningConfig};
pub use self::validator::ConfigError;

mod parser;
mod validator;
