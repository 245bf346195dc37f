pub mod capabilities;
pub mod cli;
pub mod conf;
pub mod context;
pub mod logging;
pub mod memlock;
pub mod signals;
