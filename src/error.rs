use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationError {
  #[error("out of memory")]
  OutOfMemory,

  #[error("invalid allocation handle")]
  InvalidHandle,

  #[error("allocation already freed")]
  DoubleFree,

  #[error("invalid allocation size")]
  InvalidSize,

  #[error("storage tail is in use")]
  InUse,

  #[error("page size {0} is not a power of two")]
  InvalidPageSize(u64),
}

impl AllocationError {
  /// True for every way a handle can be rejected, double frees included.
  pub fn is_invalid_handle(&self) -> bool {
    matches!(self, Self::InvalidHandle | Self::DoubleFree)
  }
}

impl From<std::collections::TryReserveError> for AllocationError {
  fn from(_: std::collections::TryReserveError) -> Self {
    Self::OutOfMemory
  }
}

pub type Result<T> = std::result::Result<T, AllocationError>;
