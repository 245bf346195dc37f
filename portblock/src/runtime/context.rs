use clap::Parser;

use crate::{
    error::Result,
    runtime::{
        cli::Cli,
        conf::{Conf, ConfError},
    },
};

/// The parsed command line together with the configuration resolved from it.
///
/// The command line is kept so reloads can layer it over the file again.
pub struct Context {
    pub cli: Cli,
    pub conf: Conf,
}

impl Context {
    pub fn new() -> Result<Self> {
        Ok(Self::from_cli(Cli::parse())?)
    }

    pub fn from_cli(cli: Cli) -> std::result::Result<Self, ConfError> {
        let (conf, cli) = Conf::new(cli)?;
        Ok(Self { cli, conf })
    }

    /// Resolves the configuration again from the file and the original
    /// command line. `self.conf` is left untouched.
    pub fn reload(&self) -> std::result::Result<Conf, ConfError> {
        self.conf.reload(&self.cli)
    }
}
