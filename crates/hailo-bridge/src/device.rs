use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use crate::backend::Accelerator;
use crate::error::DeviceError;

/// A shared handle to one open accelerator session.
///
/// Cloning is cheap and every clone refers to the same session. Each
/// [`crate::NetworkGroupHandle`] configured from this device holds a clone, so the
/// session is only closed once the last handle and the last network group are gone.
pub struct DeviceHandle<A: Accelerator> {
    inner: Arc<DeviceInner<A>>,
}

struct DeviceInner<A: Accelerator> {
    session: A::Session,
    accelerator: Arc<A>,
}

impl<A: Accelerator> DeviceHandle<A> {
    /// Open one accelerator session through `accelerator`.
    ///
    /// A single attempt is made; retrying is left to the caller.
    ///
    /// # Parameters
    ///
    /// * `accelerator` - The runtime the session is opened on. The handle keeps it
    ///   alive for as long as the session exists.
    ///
    /// # Returns
    ///
    /// A handle owning the new session, or [`DeviceError::Open`] carrying the
    /// runtime's status.
    pub fn open(accelerator: Arc<A>) -> Result<Self, DeviceError> {
        let session = accelerator.open_session().map_err(|status| {
            warn!(%status, "failed to open accelerator session");
            DeviceError::Open(status)
        })?;
        debug!("opened accelerator session");

        Ok(Self {
            inner: Arc::new(DeviceInner {
                session,
                accelerator,
            }),
        })
    }

    /// The runtime this session was opened on
    pub fn accelerator(&self) -> &Arc<A> {
        &self.inner.accelerator
    }

    pub(crate) fn session(&self) -> &A::Session {
        &self.inner.session
    }

    /// Number of live owners of the session, including network groups built from it
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Whether both handles refer to the same session
    pub fn same_device(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<A: Accelerator> Clone for DeviceHandle<A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<A: Accelerator> fmt::Debug for DeviceHandle<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("accelerator", &self.inner.accelerator)
            .field("owners", &self.strong_count())
            .finish()
    }
}

impl<A: Accelerator> Drop for DeviceInner<A> {
    fn drop(&mut self) {
        debug!("closing accelerator session");
    }
}
