pub mod loader;
pub mod schema;

pub use loader::{find_config_path, load_config, resolve_root};
pub use schema::{Config, Rank, RanksConfig, UsersConfig};
