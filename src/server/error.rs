use crate::dynamic::ProviderError;
use crate::settings::SettingsError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Config Error: {0}")]
    Config(#[from] SettingsError),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Provider Error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Bind Error: {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}
