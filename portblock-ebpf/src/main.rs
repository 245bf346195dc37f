#![no_std]
#![no_main]

use core::mem;

use aya_ebpf::{
    bindings::xdp_action,
    macros::{map, xdp},
    maps::HashMap,
    programs::XdpContext,
};
use portblock_common::{BLOCKED_PORT_KEY, Frame, Verdict, classify};

/// Blocked TCP destination port, written by userspace under [`BLOCKED_PORT_KEY`].
#[map(name = "BLOCKED_PORT")]
static BLOCKED_PORT: HashMap<u32, u16> = HashMap::with_max_entries(1, 0);

/// Bounds-checked view over the packet bytes between `data` and `data_end`.
struct XdpFrame<'a>(&'a XdpContext);

impl Frame for XdpFrame<'_> {
    #[inline(always)]
    fn len(&self) -> usize {
        self.0.data_end() - self.0.data()
    }

    #[inline(always)]
    fn load<T: Copy>(&self, offset: usize) -> Result<T, ()> {
        let start = self.0.data();
        let end = self.0.data_end();

        if start + offset + mem::size_of::<T>() > end {
            return Err(());
        }
        // SAFETY: the read stays within [data, data_end) as checked above.
        Ok(unsafe { core::ptr::read_unaligned((start + offset) as *const T) })
    }
}

#[xdp]
pub fn portblock(ctx: XdpContext) -> u32 {
    let frame = XdpFrame(&ctx);
    let verdict = classify(&frame, || {
        // SAFETY: the value is copied out before the map can be updated again.
        unsafe { BLOCKED_PORT.get(&BLOCKED_PORT_KEY) }.copied()
    });

    match verdict {
        Verdict::Drop => xdp_action::XDP_DROP,
        Verdict::Pass => xdp_action::XDP_PASS,
    }
}

#[cfg(not(test))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}

#[unsafe(link_section = "license")]
#[unsafe(no_mangle)]
static LICENSE: [u8; 13] = *b"Dual MIT/GPL\0";
