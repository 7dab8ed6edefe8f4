pub mod device;
pub mod dtype;
pub mod layout;

pub use device::Device;
pub use dtype::DType;
pub use layout::Layout;
