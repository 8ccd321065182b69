//! Domain models.

pub mod device;
pub mod device_request;
pub mod role;
pub mod user;

pub use device::{
    AdminDevicesQuery, ApprovedDevicesQuery, ContactInfo, CreateDeviceRequest, Device,
    DeviceCondition, DeviceFilter, DeviceLocation, DeviceType, ModerationDecision,
    ModerationStatus, NewDevice, SetDeviceStatusRequest, UpdateDeviceRequest,
};
pub use device_request::{
    AdminDeviceRequestsQuery, CreateDeviceRequestPayload, CreatedDeviceRequest, DeviceRequest,
    DeviceRequestFilter, Eligibility, ExistingRequest, NewDeviceRequest, RequestPolicy,
    RequestStatus, SetRequestStatusPayload, StatusUpdate,
};
pub use role::{Actor, Role};
pub use user::Contact;
