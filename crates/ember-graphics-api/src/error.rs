pub type GfxResult<T> = Result<T, GfxError>;

/// Errors that may occur when using the API.
///
/// Creation failures are transient: the caller may release resources and
/// retry. A device removal is fatal and the frame must be abandoned.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GfxError {
    #[error("{0}")]
    String(String),

    #[error("out of device memory creating '{name}' ({requested} bytes)")]
    OutOfMemory { name: String, requested: u64 },

    #[error("capability {0} is not supported by this device")]
    UnsupportedCapability(&'static str),

    #[error("device removed")]
    DeviceRemoved,
}

impl From<&str> for GfxError {
    fn from(msg: &str) -> Self {
        Self::String(msg.to_string())
    }
}

impl From<String> for GfxError {
    fn from(msg: String) -> Self {
        Self::String(msg)
    }
}
