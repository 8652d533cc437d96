pub mod preferences;
pub mod settings;

pub use preferences::ChatPreferences;
pub use settings::{RemoteBackend, Settings};
