//! Device domain model and its moderation state machine.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use shared::validation::{validate_not_blank, validate_phone, validate_photo_references};

/// Maximum number of photos attached to a device.
pub const MAX_PHOTOS: usize = 10;

/// Kind of donated device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Laptop,
    Desktop,
    Tablet,
    Smartphone,
    Accessories,
    Other,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Laptop => "laptop",
            DeviceType::Desktop => "desktop",
            DeviceType::Tablet => "tablet",
            DeviceType::Smartphone => "smartphone",
            DeviceType::Accessories => "accessories",
            DeviceType::Other => "other",
        }
    }
}

impl FromStr for DeviceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "laptop" => Ok(DeviceType::Laptop),
            "desktop" => Ok(DeviceType::Desktop),
            "tablet" => Ok(DeviceType::Tablet),
            "smartphone" => Ok(DeviceType::Smartphone),
            "accessories" => Ok(DeviceType::Accessories),
            "other" => Ok(DeviceType::Other),
            _ => Err(format!("Invalid device type: {}", s)),
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Physical condition reported by the donor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceCondition {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl DeviceCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceCondition::Excellent => "excellent",
            DeviceCondition::Good => "good",
            DeviceCondition::Fair => "fair",
            DeviceCondition::Poor => "poor",
        }
    }
}

impl FromStr for DeviceCondition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "excellent" => Ok(DeviceCondition::Excellent),
            "good" => Ok(DeviceCondition::Good),
            "fair" => Ok(DeviceCondition::Fair),
            "poor" => Ok(DeviceCondition::Poor),
            _ => Err(format!("Invalid device condition: {}", s)),
        }
    }
}

impl fmt::Display for DeviceCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Admin-controlled approval state of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationStatus {
    Pending,
    Approved,
    Rejected,
    Suspended,
}

impl ModerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationStatus::Pending => "pending",
            ModerationStatus::Approved => "approved",
            ModerationStatus::Rejected => "rejected",
            ModerationStatus::Suspended => "suspended",
        }
    }
}

impl FromStr for ModerationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ModerationStatus::Pending),
            "approved" => Ok(ModerationStatus::Approved),
            "rejected" => Ok(ModerationStatus::Rejected),
            "suspended" => Ok(ModerationStatus::Suspended),
            _ => Err(format!("Invalid moderation status: {}", s)),
        }
    }
}

impl fmt::Display for ModerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The two outcomes an admin can record through moderation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationDecision {
    Approve,
    Reject,
}

impl ModerationDecision {
    /// Parses the requested status; anything but `approved` or `rejected` is refused.
    pub fn parse(status: &str) -> Option<Self> {
        match status {
            "approved" => Some(ModerationDecision::Approve),
            "rejected" => Some(ModerationDecision::Reject),
            _ => None,
        }
    }

    pub fn status(&self) -> ModerationStatus {
        match self {
            ModerationDecision::Approve => ModerationStatus::Approved,
            ModerationDecision::Reject => ModerationStatus::Rejected,
        }
    }
}

/// Where the device can be picked up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DeviceLocation {
    #[validate(length(max = 100, message = "City must be at most 100 characters"))]
    pub city: Option<String>,
    #[validate(length(max = 100, message = "State must be at most 100 characters"))]
    pub state: Option<String>,
    #[validate(length(max = 100, message = "Country must be at most 100 characters"))]
    pub country: Option<String>,
}

impl DeviceLocation {
    /// Case-insensitive substring match against city, state or country.
    pub fn matches(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        [&self.city, &self.state, &self.country]
            .into_iter()
            .flatten()
            .any(|part| part.to_lowercase().contains(&needle))
    }
}

/// How the donor wants to be contacted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ContactInfo {
    #[validate(email(message = "Contact email must be a valid email address"))]
    pub email: Option<String>,
    #[validate(custom(function = "validate_phone"))]
    pub phone: Option<String>,
}

/// A device posted for donation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: String,
    pub device_type: DeviceType,
    pub condition: DeviceCondition,
    pub location: Option<DeviceLocation>,
    pub contact_info: Option<ContactInfo>,
    pub photos: Vec<String>,
    pub status: ModerationStatus,
    pub is_active: bool,
    pub admin_notes: Option<String>,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Device {
    /// A device can receive requests only while approved and active.
    pub fn is_requestable(&self) -> bool {
        self.status == ModerationStatus::Approved && self.is_active
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.owner_id == user_id
    }

    /// Timestamp for the next write, truncated to microseconds and strictly
    /// after the current `updated_at`. Stores guard writes on `updated_at`.
    pub fn next_revision_time(&self) -> DateTime<Utc> {
        let now = Utc::now();
        let now = now - Duration::nanoseconds(i64::from(now.timestamp_subsec_nanos() % 1_000));
        now.max(self.updated_at + Duration::microseconds(1))
    }

    /// Applies an owner edit.
    ///
    /// An approved device drops back to pending and loses its approval
    /// metadata, so every edit goes through moderation again.
    pub fn apply_update(&mut self, update: UpdateDeviceRequest, now: DateTime<Utc>) {
        if let Some(title) = update.title {
            self.title = title.trim().to_string();
        }
        if let Some(description) = update.description {
            self.description = description.trim().to_string();
        }
        if let Some(device_type) = update.device_type {
            self.device_type = device_type;
        }
        if let Some(condition) = update.condition {
            self.condition = condition;
        }
        if let Some(location) = update.location {
            self.location = Some(location);
        }
        if let Some(contact_info) = update.contact_info {
            self.contact_info = Some(contact_info);
        }
        if let Some(photos) = update.photos {
            self.photos = photos;
        }
        if let Some(is_active) = update.is_active {
            self.is_active = is_active;
        }

        if self.status == ModerationStatus::Approved {
            self.status = ModerationStatus::Pending;
            self.approved_by = None;
            self.approved_at = None;
        }
        self.updated_at = now;
    }

    /// Records an admin moderation decision.
    pub fn moderate(
        &mut self,
        decision: ModerationDecision,
        admin_id: Uuid,
        notes: Option<String>,
        rejection_reason: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.status = decision.status();
        self.admin_notes = notes;
        match decision {
            ModerationDecision::Approve => {
                self.approved_by = Some(admin_id);
                self.approved_at = Some(now);
                self.rejection_reason = None;
            }
            ModerationDecision::Reject => {
                self.rejection_reason = rejection_reason;
                self.approved_by = None;
                self.approved_at = None;
            }
        }
        self.updated_at = now;
    }
}

/// Fields needed to insert a device. Status is always pending.
#[derive(Debug, Clone)]
pub struct NewDevice {
    pub owner_id: Uuid,
    pub title: String,
    pub description: String,
    pub device_type: DeviceType,
    pub condition: DeviceCondition,
    pub location: Option<DeviceLocation>,
    pub contact_info: Option<ContactInfo>,
    pub photos: Vec<String>,
}

/// Request payload for posting a device.
///
/// There is deliberately no `status` field: unknown fields are ignored, so a
/// client-supplied status never reaches the catalog.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateDeviceRequest {
    #[validate(length(min = 1, max = 100, message = "Title must be between 1 and 100 characters"))]
    #[validate(custom(function = "validate_not_blank"))]
    pub title: String,

    #[validate(length(
        min = 1,
        max = 2000,
        message = "Description must be between 1 and 2000 characters"
    ))]
    #[validate(custom(function = "validate_not_blank"))]
    pub description: String,

    pub device_type: DeviceType,

    pub condition: DeviceCondition,

    #[validate(nested)]
    pub location: Option<DeviceLocation>,

    #[validate(nested)]
    pub contact_info: Option<ContactInfo>,

    #[serde(default)]
    #[validate(length(max = 10, message = "At most 10 photos may be attached"))]
    #[validate(custom(function = "validate_photo_references"))]
    pub photos: Vec<String>,
}

impl CreateDeviceRequest {
    pub fn into_new_device(self, owner_id: Uuid) -> NewDevice {
        NewDevice {
            owner_id,
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            device_type: self.device_type,
            condition: self.condition,
            location: self.location,
            contact_info: self.contact_info,
            photos: self.photos,
        }
    }
}

/// Request payload for an owner edit. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDeviceRequest {
    #[validate(length(min = 1, max = 100, message = "Title must be between 1 and 100 characters"))]
    #[validate(custom(function = "validate_not_blank"))]
    pub title: Option<String>,

    #[validate(length(
        min = 1,
        max = 2000,
        message = "Description must be between 1 and 2000 characters"
    ))]
    #[validate(custom(function = "validate_not_blank"))]
    pub description: Option<String>,

    pub device_type: Option<DeviceType>,

    pub condition: Option<DeviceCondition>,

    #[validate(nested)]
    pub location: Option<DeviceLocation>,

    #[validate(nested)]
    pub contact_info: Option<ContactInfo>,

    #[validate(length(max = 10, message = "At most 10 photos may be attached"))]
    #[validate(custom(function = "validate_photo_references"))]
    pub photos: Option<Vec<String>>,

    pub is_active: Option<bool>,
}

/// Request payload for admin moderation.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SetDeviceStatusRequest {
    pub status: String,

    #[validate(length(max = 1000, message = "Notes must be at most 1000 characters"))]
    pub notes: Option<String>,

    #[validate(length(max = 500, message = "Rejection reason must be at most 500 characters"))]
    pub rejection_reason: Option<String>,
}

/// Filters for catalog queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceFilter {
    pub status: Option<ModerationStatus>,
    pub is_active: Option<bool>,
    pub device_type: Option<DeviceType>,
    pub condition: Option<DeviceCondition>,
    pub location: Option<String>,
    pub owner_id: Option<Uuid>,
}

impl DeviceFilter {
    pub fn matches(&self, device: &Device) -> bool {
        self.status.map_or(true, |s| device.status == s)
            && self.is_active.map_or(true, |a| device.is_active == a)
            && self.device_type.map_or(true, |t| device.device_type == t)
            && self.condition.map_or(true, |c| device.condition == c)
            && self.owner_id.map_or(true, |o| device.owner_id == o)
            && self.location.as_deref().map_or(true, |needle| {
                device
                    .location
                    .as_ref()
                    .map_or(false, |loc| loc.matches(needle))
            })
    }
}

/// Query parameters for the public approved listing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovedDevicesQuery {
    pub device_type: Option<DeviceType>,
    pub condition: Option<DeviceCondition>,
    pub location: Option<String>,
    pub is_active: Option<bool>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl ApprovedDevicesQuery {
    /// Only approved devices, active ones unless the caller asks otherwise.
    pub fn filter(&self) -> DeviceFilter {
        DeviceFilter {
            status: Some(ModerationStatus::Approved),
            is_active: Some(self.is_active.unwrap_or(true)),
            device_type: self.device_type,
            condition: self.condition,
            location: self
                .location
                .as_deref()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string),
            owner_id: None,
        }
    }
}

/// Query parameters for the admin moderation queue.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminDevicesQuery {
    pub status: Option<ModerationStatus>,
    pub device_type: Option<DeviceType>,
    pub owner_id: Option<Uuid>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl AdminDevicesQuery {
    pub fn filter(&self) -> DeviceFilter {
        DeviceFilter {
            status: self.status,
            device_type: self.device_type,
            owner_id: self.owner_id,
            ..DeviceFilter::default()
        }
    }
}
