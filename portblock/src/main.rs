mod error;
mod filter;
mod runtime;

use tracing::error;

use crate::{
    filter::lifecycle::{self, AyaDatapath},
    runtime::{capabilities, context::Context, logging, memlock, signals},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let context = Context::new()?;
    let conf = &context.conf;

    logging::init_tracing(conf.log_level);
    capabilities::check_capabilities();
    memlock::bump_memlock_rlimit();

    let triggers = signals::listen()?;
    let datapath = AyaDatapath::new(conf.program_path.clone());

    if let Err(e) = lifecycle::run(datapath, context, triggers).await {
        error!(
            event.name = "system.fatal",
            error.message = %e,
            "portblock stopped on a setup failure"
        );
        return Err(e.into());
    }

    Ok(())
}
