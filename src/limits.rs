//! Open file descriptor limit (`ulimit -n`).
//!
//! Every proxied request holds two sockets, so a busy proxy runs out of
//! descriptors long before it runs out of anything else.

use std::io;
use tracing::{info, warn};

/// Current (soft) and maximum (hard) open files limit.
#[cfg(unix)]
pub fn open_files_limit() -> io::Result<(u64, u64)> {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: `limit` is a valid, writable rlimit.
    if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok((limit.rlim_cur as u64, limit.rlim_max as u64))
}

/// Raises the soft open files limit to `wanted`, clamped to the hard
/// limit. Never lowers it. Returns the limit in effect afterwards.
#[cfg(unix)]
pub fn raise_open_files_limit(wanted: u64) -> io::Result<u64> {
    let (current, max) = open_files_limit()?;

    let target = if wanted > max {
        info!(wanted, max, "Open files limit capped at system maximum");
        max
    } else {
        wanted
    };

    if current >= target {
        info!(current, wanted = target, "Open files limit already high enough");
        return Ok(current);
    }

    let limit = libc::rlimit {
        rlim_cur: target as libc::rlim_t,
        rlim_max: max as libc::rlim_t,
    };
    // SAFETY: `limit` is a valid rlimit; the hard limit is left unchanged.
    if unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &limit) } != 0 {
        return Err(io::Error::last_os_error());
    }

    info!(from = current, to = target, "Raised open files limit");
    Ok(target)
}

#[cfg(not(unix))]
pub fn open_files_limit() -> io::Result<(u64, u64)> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "open files limit is not available on this platform",
    ))
}

#[cfg(not(unix))]
pub fn raise_open_files_limit(_wanted: u64) -> io::Result<u64> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "open files limit is not available on this platform",
    ))
}

/// Startup wrapper around [`raise_open_files_limit`]. A failure is logged
/// and otherwise ignored since the proxy still runs with a lower limit.
pub fn ensure_open_files_limit(wanted: u64) -> Option<u64> {
    match raise_open_files_limit(wanted) {
        Ok(limit) => Some(limit),
        Err(error) => {
            warn!(error = %error, wanted, "Unable to raise open files limit");
            None
        }
    }
}
