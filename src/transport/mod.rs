pub mod device;
pub mod rfcomm;
pub mod tcp;
pub mod traits;

pub use device::{DeviceHandle, DeviceSelector};
pub use rfcomm::{RfcommConfig, RfcommConnector, RfcommTransportStream};
pub use tcp::{TcpConnector, TcpTransportStream};
pub use traits::{TransportConnector, TransportStream};
