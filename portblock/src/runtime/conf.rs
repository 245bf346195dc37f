use std::{
    error::Error,
    fmt,
    path::{Path, PathBuf},
};

use figment::{
    Figment,
    providers::{Format, Serialized, Yaml},
};
use portblock_common::DEFAULT_BLOCKED_PORT;
use serde::{Deserialize, Serialize};
use tracing::Level;

use crate::{
    filter::attach::XdpMode,
    runtime::{cli::Cli, conf::conf_serde::level},
};

/// Resolved runtime configuration.
///
/// Values are layered as defaults < configuration file < environment < CLI.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Conf {
    /// TCP destination port dropped by the filter.
    pub port: u16,

    /// Interface the filter attaches to, by name or numeric index.
    pub interface: String,

    /// How the program is bound to the interface.
    pub xdp_mode: XdpMode,

    /// Location of the compiled eBPF object.
    pub program_path: PathBuf,

    #[serde(with = "level")]
    pub log_level: Level,

    /// Path of the file this configuration was read from, kept for reloads.
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Conf {
    fn default() -> Self {
        Self {
            port: DEFAULT_BLOCKED_PORT,
            interface: "eth0".to_string(),
            xdp_mode: XdpMode::default(),
            program_path: PathBuf::from(env!("PORTBLOCK_EBPF_PATH")),
            log_level: Level::INFO,
            config_path: None,
        }
    }
}

impl Conf {
    /// Builds the configuration from defaults, the optional YAML file named by
    /// `cli.config`, and the values given on the command line or through
    /// `PORTBLOCK_*` environment variables, in that order of precedence.
    ///
    /// # Errors
    /// * `ConfError::NoConfigFile` - the configuration file does not exist.
    /// * `ConfError::InvalidConfigPath` - the path points to a directory.
    /// * `ConfError::InvalidExtension` - the file is not `.yaml` or `.yml`.
    /// * `ConfError::Extraction` - a value has the wrong type or is out of range.
    pub fn new(cli: Cli) -> Result<(Self, Cli), ConfError> {
        let mut figment = Figment::new().merge(Serialized::defaults(Conf::default()));

        let config_path_to_store = if let Some(config_path) = &cli.config {
            validate_config_path(config_path)?;
            figment = figment.merge(Yaml::file(config_path));
            Some(config_path.clone())
        } else {
            None
        };

        figment = figment.merge(Serialized::defaults(&cli));

        let mut conf: Conf = figment.extract()?;

        conf.config_path = config_path_to_store;
        Ok((conf, cli))
    }

    /// Re-reads the configuration file and layers `cli` over it again.
    ///
    /// The result is built from scratch with the same precedence as
    /// [`Conf::new`], so a value given on the command line or through the
    /// environment keeps winning over the file after a reload.
    pub fn reload(&self, cli: &Cli) -> Result<Self, ConfError> {
        let Some(path) = &self.config_path else {
            return Err(ConfError::NoConfigFile);
        };

        validate_config_path(path)?;
        let mut conf: Conf = Figment::new()
            .merge(Serialized::defaults(Conf::default()))
            .merge(Yaml::file(path))
            .merge(Serialized::defaults(cli))
            .extract()?;
        conf.config_path = self.config_path.clone();

        Ok(conf)
    }
}

/// Validates that the given path points to an existing file with a supported extension.
fn validate_config_path(path: &Path) -> Result<(), ConfError> {
    if !path.is_file() {
        if path.exists() {
            return Err(ConfError::InvalidConfigPath(
                path.to_string_lossy().into_owned(),
            ));
        } else {
            return Err(ConfError::NoConfigFile);
        }
    }

    match path.extension().and_then(|s| s.to_str()) {
        Some("yaml") | Some("yml") => Ok(()),
        Some(ext) => Err(ConfError::InvalidExtension(ext.to_string())),
        None => Err(ConfError::InvalidExtension("none".to_string())),
    }
}

#[derive(Debug)]
pub enum ConfError {
    /// The specified configuration file does not exist.
    NoConfigFile,
    /// The path exists but is not a file (e.g., it's a directory).
    InvalidConfigPath(String),
    /// The file has an unsupported extension.
    InvalidExtension(String),
    /// Failed to extract configuration data.
    Extraction(Box<figment::Error>),
}

impl fmt::Display for ConfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfError::NoConfigFile => write!(f, "no config file provided"),
            ConfError::InvalidConfigPath(p) => write!(f, "path '{p}' is not a valid file"),
            ConfError::InvalidExtension(ext) => {
                write!(
                    f,
                    "invalid file extension '.{ext}', expected 'yaml' or 'yml'"
                )
            }
            ConfError::Extraction(e) => write!(f, "{e}"),
        }
    }
}

impl Error for ConfError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfError::Extraction(e) => Some(e),
            _ => None,
        }
    }
}

impl From<figment::Error> for ConfError {
    fn from(e: figment::Error) -> Self {
        ConfError::Extraction(Box::from(e))
    }
}

pub mod conf_serde {
    pub mod level {
        use serde::{self, Deserialize, Deserializer, Serializer};
        use tracing::Level;

        pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            serializer.serialize_str(level.as_str())
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
        where
            D: Deserializer<'de>,
        {
            let s = String::deserialize(deserializer)?;
            s.parse::<Level>().map_err(serde::de::Error::custom)
        }

        pub mod option {
            use super::*;

            pub fn serialize<S>(level: &Option<Level>, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                match level {
                    Some(l) => serializer.serialize_str(l.as_str()),
                    None => serializer.serialize_none(),
                }
            }

            pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Level>, D::Error>
            where
                D: Deserializer<'de>,
            {
                let opt = Option::<String>::deserialize(deserializer)?;
                match opt {
                    Some(s) => s
                        .parse::<Level>()
                        .map(Some)
                        .map_err(serde::de::Error::custom),
                    None => Ok(None),
                }
            }
        }
    }
}
