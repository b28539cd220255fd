//! Message protocol between display clients and the background worker.

mod background;
mod messages;

pub use background::{Background, ServiceClient, ServiceHandle};
pub use messages::{Ack, CurrentImage, DeviceList, Event, Request, Response, StatusLines};
