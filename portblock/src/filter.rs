//! Control plane for the XDP port filter: the shared blocked-port cell, the
//! interface binding and the load/attach/teardown sequence that owns them.

pub mod attach;
pub mod cell;
pub mod lifecycle;
