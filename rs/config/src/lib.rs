pub mod enums;
pub mod index_config;
pub mod loader;
pub mod search_params;
