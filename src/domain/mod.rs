pub mod device;
mod number;

pub use device::{Device, DeviceList, DeviceUpsert};
pub use number::Number;
