mod devices;
mod error;
mod models;
mod server;
mod status;

pub use devices::CONTINUATION_HEADER;
pub use error::{ApiError, ErrorApiModel};
pub use models::{DeviceApiModel, DeviceListApiModel, DeviceRequestApiModel, PropertiesApiModel, StatusApiModel};
pub use server::{AppState, router, serve};
