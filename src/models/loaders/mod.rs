pub mod toml_loader;

pub use toml_loader::{load_settings_file, parse_settings};
