use aya::{
    Ebpf,
    maps::{HashMap, MapData, MapError},
};
use portblock_common::{BLOCKED_PORT_KEY, BLOCKED_PORT_MAP};
use tracing::debug;

use crate::error::{PortblockError, Result};

/// The single slot shared with the XDP program that holds the blocked port.
///
/// Only the control plane writes it. Entries are never deleted; `set`
/// overwrites the slot and is visible to the next classified frame.
pub trait PortCell {
    fn set(&mut self, port: u16) -> Result<()>;

    /// Returns `None` until the first `set`.
    fn get(&self) -> Result<Option<u16>>;
}

/// [`PortCell`] backed by the `BLOCKED_PORT` hash map of a loaded object.
pub struct BlockedPortCell {
    map: HashMap<MapData, u32, u16>,
}

impl BlockedPortCell {
    /// Takes ownership of the map out of `ebpf`. The map stays alive as long
    /// as the cell does.
    pub fn take(ebpf: &mut Ebpf) -> Result<Self> {
        let map = ebpf.take_map(BLOCKED_PORT_MAP).ok_or_else(|| {
            PortblockError::config(format!("{BLOCKED_PORT_MAP} map not present in the object"))
        })?;
        let map = HashMap::try_from(map).map_err(|e| {
            PortblockError::config(format!("{BLOCKED_PORT_MAP} is not a u32 -> u16 hash map: {e}"))
        })?;

        Ok(Self { map })
    }
}

impl PortCell for BlockedPortCell {
    fn set(&mut self, port: u16) -> Result<()> {
        self.map
            .insert(BLOCKED_PORT_KEY, port, 0)
            .map_err(|e| PortblockError::config(format!("failed to write port {port}: {e}")))?;

        debug!(
            event.name = "cell.port_set",
            blocked_port = port,
            "blocked port written to map"
        );
        Ok(())
    }

    fn get(&self) -> Result<Option<u16>> {
        match self.map.get(&BLOCKED_PORT_KEY, 0) {
            Ok(port) => Ok(Some(port)),
            Err(MapError::KeyNotFound) => Ok(None),
            Err(e) => Err(PortblockError::config(format!(
                "failed to read blocked port: {e}"
            ))),
        }
    }
}
