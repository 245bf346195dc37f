use tracing::debug;

/// Removes the limit on locked memory.
///
/// Kernels without memcg based accounting charge map memory against
/// RLIMIT_MEMLOCK, see https://lwn.net/Articles/837122/
pub fn bump_memlock_rlimit() {
    let rlim = libc::rlimit {
        rlim_cur: libc::RLIM_INFINITY,
        rlim_max: libc::RLIM_INFINITY,
    };
    let ret = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) };
    if ret != 0 {
        debug!(
            event.name = "system.memlock_rlimit_failed",
            error.code = ret,
            "remove limit on locked memory failed"
        );
    }
}
