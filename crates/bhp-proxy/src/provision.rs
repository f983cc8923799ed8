//! Provisioning policy: get a missing applet package into the VM and retry
//! the request that failed for lack of it. Retries are bounded to one.

use tracing::warn;

use crate::error::Result;

/// Provision unless the applet is already resident.
///
/// Returns whether `provision` ran.
pub fn ensure_resident<P>(resident: bool, provision: P) -> Result<bool>
where
    P: FnOnce() -> Result<()>,
{
    if resident {
        return Ok(false);
    }
    provision()?;
    Ok(true)
}

/// Run `attempt`; if it fails with package-not-found, provision and run it
/// exactly once more. Any other outcome, including a second
/// package-not-found, is returned as is.
pub fn retry_after_provisioning<T, A, P>(mut attempt: A, provision: P) -> Result<T>
where
    A: FnMut() -> Result<T>,
    P: FnOnce() -> Result<()>,
{
    match attempt() {
        Err(err) if err.is_package_not_found() => {
            warn!("package missing at open, provisioning and retrying once");
            provision()?;
            attempt()
        }
        outcome => outcome,
    }
}
