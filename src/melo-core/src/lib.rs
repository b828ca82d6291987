pub mod browser;
pub mod config;
pub mod context;
pub mod contract;
pub mod id;
pub mod logging;
pub mod media;
pub mod paths;
pub mod player;
pub mod playlist;
pub mod registry;
pub mod request;

pub use browser::{Browser, BrowserInfo};
pub use config::{
    Config, ConfigError, LogLevel, LoggingConfig, PluginsConfig, RequestsConfig, ValidationError,
};
pub use context::{BrowserRegistry, Core, DispatchError, PlayerRegistry};
pub use contract::{run_browser_contract, BrowserContractError, BrowserContractExpectations};
pub use id::is_valid_id;
pub use logging::{init_logging, LoggingError, LoggingGuard};
pub use media::Media;
pub use paths::{AppDirs, DirsError};
pub use player::{Player, PlayerInfo};
pub use playlist::{Playlist, PlaylistEntry, PlaylistError};
pub use registry::Registry;
pub use request::{CompletionError, Reply, ReplyError, Request};

pub const APP_NAME: &str = "melo";
pub const APP_AUTHOR: &str = "Melo";
pub const APP_QUALIFIER: &str = "com";

/// Version of the Melo core, as exposed to plugins and bindings.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_semver_triplet() {
        let parts: Vec<_> = version().split('.').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| p.parse::<u32>().is_ok()));
    }
}
