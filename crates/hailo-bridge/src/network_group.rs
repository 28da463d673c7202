use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};
use crate::backend::Accelerator;
use crate::device::DeviceHandle;
use crate::error::{ConfigError, QueryError};
use crate::stream::{Direction, StreamDescriptor, StreamInfo};

/// One configured, schedulable network group.
///
/// Holds a strong reference to the [`DeviceHandle`] it was configured on, so the
/// device outlives the network group even if every other device handle is released.
pub struct NetworkGroupHandle<A: Accelerator> {
    inner: Arc<NetworkGroupInner<A>>,
}

// Field order matters: the network group is torn down before the device it lives on.
struct NetworkGroupInner<A: Accelerator> {
    network_group: A::NetworkGroup,
    device: DeviceHandle<A>,
}

impl<A: Accelerator> NetworkGroupHandle<A> {
    /// Configure `device` from the artifact at `path`.
    ///
    /// The artifact must yield exactly one network group; anything else is a hard
    /// failure and nothing is retained.
    ///
    /// # Parameters
    ///
    /// * `device` - The session to configure. The returned handle holds a clone of it.
    /// * `path` - Location of the compiled artifact.
    ///
    /// # Returns
    ///
    /// The configured network group, or a [`ConfigError`] naming the stage that failed.
    pub fn configure(device: &DeviceHandle<A>, path: &Path) -> Result<Self, ConfigError> {
        let accelerator = device.accelerator();
        let session = device.session();

        let artifact = accelerator.load_artifact(path).map_err(|status| {
            warn!(path = %path.display(), %status, "failed to load artifact");
            ConfigError::ArtifactLoad {
                path: path.to_path_buf(),
                status,
            }
        })?;

        let params = accelerator
            .create_configure_params(session, &artifact)
            .map_err(|status| {
                warn!(%status, "failed to create configure params");
                ConfigError::ConfigParams(status)
            })?;

        let mut network_groups = accelerator
            .configure(session, &artifact, params)
            .map_err(|status| {
                warn!(%status, "failed to configure network groups");
                ConfigError::DeviceConfig(status)
            })?;

        if network_groups.len() != 1 {
            warn!(count = network_groups.len(), "artifact must yield exactly one network group");
            return Err(ConfigError::ArtifactShape {
                count: network_groups.len(),
            });
        }

        let network_group = network_groups.remove(0);
        debug!(path = %path.display(), "configured network group");

        Ok(Self {
            inner: Arc::new(NetworkGroupInner {
                network_group,
                device: device.clone(),
            }),
        })
    }

    /// Open a fresh device and configure it from `path` in one call.
    ///
    /// The returned handle is the only owner of the device.
    pub fn load(accelerator: Arc<A>, path: &Path) -> Result<Self, ConfigError> {
        let device = DeviceHandle::open(accelerator)?;
        Self::configure(&device, path)
    }

    /// Name and exact frame size of every input stream, in declared order
    pub fn input_stream_descriptors(&self) -> Result<Vec<StreamDescriptor>, QueryError> {
        self.stream_descriptors(Direction::Input)
    }

    /// Name and exact frame size of every output stream, in declared order
    pub fn output_stream_descriptors(&self) -> Result<Vec<StreamDescriptor>, QueryError> {
        self.stream_descriptors(Direction::Output)
    }

    fn stream_descriptors(&self, direction: Direction) -> Result<Vec<StreamDescriptor>, QueryError> {
        self.stream_infos(direction)?
            .iter()
            .map(StreamInfo::descriptor)
            .collect()
    }

    pub(crate) fn stream_infos(&self, direction: Direction) -> Result<Vec<StreamInfo>, QueryError> {
        self.accelerator()
            .stream_infos(&self.inner.network_group, direction)
            .map_err(|status| QueryError::Status { direction, status })
    }

    /// The device this network group was configured on
    pub fn device(&self) -> &DeviceHandle<A> {
        &self.inner.device
    }

    pub(crate) fn accelerator(&self) -> &Arc<A> {
        self.inner.device.accelerator()
    }

    pub(crate) fn raw(&self) -> &A::NetworkGroup {
        &self.inner.network_group
    }

    /// Number of live owners, including pipelines built from this network group
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl<A: Accelerator> Clone for NetworkGroupHandle<A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<A: Accelerator> fmt::Debug for NetworkGroupHandle<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkGroupHandle")
            .field("device", &self.inner.device)
            .field("owners", &self.strong_count())
            .finish()
    }
}

impl<A: Accelerator> Drop for NetworkGroupInner<A> {
    fn drop(&mut self) {
        debug!("releasing network group");
    }
}

#[cfg(all(test, feature = "sim"))]
mod tests {
    use super::*;
    use crate::backend::Status;
    use crate::backend::sim::{SimAccelerator, SimArtifact, SimNetworkGroupSpec, SimStage};
    use crate::error::DeviceError;
    use crate::stream::FormatType;

    fn accelerator() -> Arc<SimAccelerator> {
        Arc::new(
            SimAccelerator::builder()
                .artifact("net.hef", SimArtifact::single(
                    vec![StreamInfo::new("in0", vec![10, 10, 3], FormatType::Uint8)],
                    vec![
                        StreamInfo::new("out0", vec![4], FormatType::Uint8),
                        StreamInfo::new("out1", vec![2, 2], FormatType::Float32),
                    ],
                ))
                .artifact("empty.hef", SimArtifact::default())
                .artifact("double.hef", SimArtifact::single(vec![], vec![]).with_network_group(
                    SimNetworkGroupSpec::new("second", vec![], vec![]),
                ))
                .build(),
        )
    }

    #[test]
    fn test_configure_single_network_group() {
        let accelerator = accelerator();
        let device = DeviceHandle::open(accelerator.clone()).unwrap();
        let ng = NetworkGroupHandle::configure(&device, Path::new("net.hef")).unwrap();

        assert_eq!(
            ng.input_stream_descriptors().unwrap(),
            vec![StreamDescriptor { name: "in0".to_string(), frame_size: 300 }]
        );
        assert_eq!(
            ng.output_stream_descriptors().unwrap(),
            vec![
                StreamDescriptor { name: "out0".to_string(), frame_size: 4 },
                StreamDescriptor { name: "out1".to_string(), frame_size: 16 },
            ]
        );
        assert!(ng.device().same_device(&device));
    }

    #[test]
    fn test_descriptors_are_stable_across_calls() {
        let ng = NetworkGroupHandle::load(accelerator(), Path::new("net.hef")).unwrap();
        let first = ng.output_stream_descriptors().unwrap();
        let second = ng.output_stream_descriptors().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_artifact_is_load_error() {
        let device = DeviceHandle::open(accelerator()).unwrap();
        let err = NetworkGroupHandle::configure(&device, Path::new("nope.hef")).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::ArtifactLoad { status: Status::OPEN_FILE_FAILURE, .. }
        ));
    }

    #[test]
    fn test_zero_network_groups_is_shape_error() {
        let device = DeviceHandle::open(accelerator()).unwrap();
        let err = NetworkGroupHandle::configure(&device, Path::new("empty.hef")).unwrap_err();
        assert_eq!(err, ConfigError::ArtifactShape { count: 0 });
    }

    #[test]
    fn test_multiple_network_groups_is_shape_error() {
        let device = DeviceHandle::open(accelerator()).unwrap();
        let err = NetworkGroupHandle::configure(&device, Path::new("double.hef")).unwrap_err();
        assert_eq!(err, ConfigError::ArtifactShape { count: 2 });
    }

    #[test]
    fn test_configure_params_failure() {
        let accelerator = accelerator();
        accelerator.inject_fault(SimStage::ConfigureParams, Status::INVALID_HEF);
        let device = DeviceHandle::open(accelerator.clone()).unwrap();

        let err = NetworkGroupHandle::configure(&device, Path::new("net.hef")).unwrap_err();
        assert_eq!(err, ConfigError::ConfigParams(Status::INVALID_HEF));
    }

    #[test]
    fn test_device_configure_failure_keeps_device_usable() {
        let accelerator = accelerator();
        accelerator.inject_fault(SimStage::Configure, Status::INTERNAL_FAILURE);
        let device = DeviceHandle::open(accelerator.clone()).unwrap();

        let err = NetworkGroupHandle::configure(&device, Path::new("net.hef")).unwrap_err();
        assert_eq!(err, ConfigError::DeviceConfig(Status::INTERNAL_FAILURE));

        accelerator.clear_fault(SimStage::Configure);
        assert!(NetworkGroupHandle::configure(&device, Path::new("net.hef")).is_ok());
    }

    #[test]
    fn test_load_surfaces_device_open_failure() {
        let accelerator = accelerator();
        accelerator.inject_fault(SimStage::OpenSession, Status::OUT_OF_PHYSICAL_DEVICES);

        let err = NetworkGroupHandle::load(accelerator, Path::new("net.hef")).unwrap_err();
        assert_eq!(err, ConfigError::Device(DeviceError::Open(Status::OUT_OF_PHYSICAL_DEVICES)));
    }

    #[test]
    fn test_network_group_keeps_device_alive() {
        let accelerator = accelerator();
        let device = DeviceHandle::open(accelerator.clone()).unwrap();
        let ng = NetworkGroupHandle::configure(&device, Path::new("net.hef")).unwrap();

        drop(device);
        assert_eq!(accelerator.live_sessions(), 1);
        assert!(ng.output_stream_descriptors().is_ok());

        drop(ng);
        assert_eq!(accelerator.live_sessions(), 0);
    }

    #[test]
    fn test_many_network_groups_share_one_device() {
        let accelerator = accelerator();
        let device = DeviceHandle::open(accelerator.clone()).unwrap();
        let a = NetworkGroupHandle::configure(&device, Path::new("net.hef")).unwrap();
        let b = NetworkGroupHandle::configure(&device, Path::new("net.hef")).unwrap();

        assert!(a.device().same_device(b.device()));
        assert_eq!(device.strong_count(), 3);
        assert_eq!(accelerator.live_sessions(), 1);
    }

    #[test]
    fn test_stream_query_failure() {
        let accelerator = accelerator();
        let ng = NetworkGroupHandle::load(accelerator.clone(), Path::new("net.hef")).unwrap();
        accelerator.inject_fault(SimStage::StreamInfos, Status::INTERNAL_FAILURE);

        let err = ng.input_stream_descriptors().unwrap_err();
        assert_eq!(
            err,
            QueryError::Status { direction: Direction::Input, status: Status::INTERNAL_FAILURE }
        );
    }
}
