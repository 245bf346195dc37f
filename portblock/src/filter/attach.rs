use std::fmt;

use aya::programs::{Xdp, XdpFlags, xdp::XdpLinkId};
use clap::ValueEnum;
use pnet::datalink;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{PortblockError, Result};

/// How the XDP program is bound to the interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum XdpMode {
    /// Generic mode, run by the kernel after the driver hands off the frame.
    #[default]
    Skb,
    /// Native mode, run inside the NIC driver.
    Driver,
    /// Offloaded to the NIC.
    Hardware,
    /// Native mode when the driver supports it, generic mode otherwise.
    Auto,
}

impl XdpMode {
    /// Attach flags to try, in order.
    pub fn attempts(self) -> &'static [XdpFlags] {
        match self {
            XdpMode::Skb => &[XdpFlags::SKB_MODE],
            XdpMode::Driver => &[XdpFlags::DRV_MODE],
            XdpMode::Hardware => &[XdpFlags::HW_MODE],
            XdpMode::Auto => &[XdpFlags::DRV_MODE, XdpFlags::SKB_MODE],
        }
    }
}

impl fmt::Display for XdpMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            XdpMode::Skb => "skb",
            XdpMode::Driver => "driver",
            XdpMode::Hardware => "hardware",
            XdpMode::Auto => "auto",
        };
        f.write_str(name)
    }
}

/// Resolves an interface given by name or numeric index against the host's
/// interfaces and returns its name.
pub fn resolve_interface(id: &str) -> Result<String> {
    let available = datalink::interfaces()
        .into_iter()
        .map(|iface| (iface.index, iface.name));
    resolve_from(id, available)
}

/// Resolves `id` against `(index, name)` pairs. Names win over indices so an
/// interface literally named "2" is still found by name.
pub fn resolve_from<I>(id: &str, available: I) -> Result<String>
where
    I: IntoIterator<Item = (u32, String)>,
{
    let available: Vec<(u32, String)> = available.into_iter().collect();

    if available.iter().any(|(_, name)| name == id) {
        return Ok(id.to_string());
    }

    if let Ok(index) = id.parse::<u32>()
        && let Some((_, name)) = available.iter().find(|(i, _)| *i == index)
    {
        debug!(
            event.name = "attach.interface_resolved",
            network.interface.index = index,
            network.interface.name = %name,
            "resolved interface index to name"
        );
        return Ok(name.clone());
    }

    Err(PortblockError::attach(id, "no such interface"))
}

/// Binds `program` to `iface` using the flags of `mode`, falling back through
/// the mode's attempts until one succeeds.
pub fn attach(program: &mut Xdp, iface: &str, mode: XdpMode) -> Result<XdpLinkId> {
    let mut last_error = None;

    for flags in mode.attempts() {
        match program.attach(iface, *flags) {
            Ok(link_id) => {
                info!(
                    event.name = "attach.program_attached",
                    network.interface.name = %iface,
                    xdp.mode = %mode,
                    xdp.flags = ?flags,
                    "xdp program attached to interface"
                );
                return Ok(link_id);
            }
            Err(e) => {
                warn!(
                    event.name = "attach.attempt_failed",
                    network.interface.name = %iface,
                    xdp.flags = ?flags,
                    error.message = %e,
                    "failed to attach xdp program"
                );
                last_error = Some(e);
            }
        }
    }

    Err(match last_error {
        Some(e) => PortblockError::attach(iface, e),
        None => PortblockError::attach(iface, format!("no attach flags for mode {mode}")),
    })
}
