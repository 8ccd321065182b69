//! Device entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{
    ContactInfo, Device, DeviceCondition, DeviceLocation, DeviceType, ModerationStatus,
};
use sqlx::FromRow;
use uuid::Uuid;

/// Database enum for device type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "device_type", rename_all = "lowercase")]
pub enum DeviceTypeDb {
    Laptop,
    Desktop,
    Tablet,
    Smartphone,
    Accessories,
    Other,
}

impl From<DeviceTypeDb> for DeviceType {
    fn from(value: DeviceTypeDb) -> Self {
        match value {
            DeviceTypeDb::Laptop => DeviceType::Laptop,
            DeviceTypeDb::Desktop => DeviceType::Desktop,
            DeviceTypeDb::Tablet => DeviceType::Tablet,
            DeviceTypeDb::Smartphone => DeviceType::Smartphone,
            DeviceTypeDb::Accessories => DeviceType::Accessories,
            DeviceTypeDb::Other => DeviceType::Other,
        }
    }
}

impl From<DeviceType> for DeviceTypeDb {
    fn from(value: DeviceType) -> Self {
        match value {
            DeviceType::Laptop => DeviceTypeDb::Laptop,
            DeviceType::Desktop => DeviceTypeDb::Desktop,
            DeviceType::Tablet => DeviceTypeDb::Tablet,
            DeviceType::Smartphone => DeviceTypeDb::Smartphone,
            DeviceType::Accessories => DeviceTypeDb::Accessories,
            DeviceType::Other => DeviceTypeDb::Other,
        }
    }
}

/// Database enum for device condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "device_condition", rename_all = "lowercase")]
pub enum DeviceConditionDb {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl From<DeviceConditionDb> for DeviceCondition {
    fn from(value: DeviceConditionDb) -> Self {
        match value {
            DeviceConditionDb::Excellent => DeviceCondition::Excellent,
            DeviceConditionDb::Good => DeviceCondition::Good,
            DeviceConditionDb::Fair => DeviceCondition::Fair,
            DeviceConditionDb::Poor => DeviceCondition::Poor,
        }
    }
}

impl From<DeviceCondition> for DeviceConditionDb {
    fn from(value: DeviceCondition) -> Self {
        match value {
            DeviceCondition::Excellent => DeviceConditionDb::Excellent,
            DeviceCondition::Good => DeviceConditionDb::Good,
            DeviceCondition::Fair => DeviceConditionDb::Fair,
            DeviceCondition::Poor => DeviceConditionDb::Poor,
        }
    }
}

/// Database enum for moderation status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "moderation_status", rename_all = "lowercase")]
pub enum ModerationStatusDb {
    Pending,
    Approved,
    Rejected,
    Suspended,
}

impl From<ModerationStatusDb> for ModerationStatus {
    fn from(value: ModerationStatusDb) -> Self {
        match value {
            ModerationStatusDb::Pending => ModerationStatus::Pending,
            ModerationStatusDb::Approved => ModerationStatus::Approved,
            ModerationStatusDb::Rejected => ModerationStatus::Rejected,
            ModerationStatusDb::Suspended => ModerationStatus::Suspended,
        }
    }
}

impl From<ModerationStatus> for ModerationStatusDb {
    fn from(value: ModerationStatus) -> Self {
        match value {
            ModerationStatus::Pending => ModerationStatusDb::Pending,
            ModerationStatus::Approved => ModerationStatusDb::Approved,
            ModerationStatus::Rejected => ModerationStatusDb::Rejected,
            ModerationStatus::Suspended => ModerationStatusDb::Suspended,
        }
    }
}

/// Database row mapping for the devices table.
///
/// Location and contact info are flattened into nullable columns.
#[derive(Debug, Clone, FromRow)]
pub struct DeviceEntity {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: String,
    pub device_type: DeviceTypeDb,
    pub condition: DeviceConditionDb,
    pub location_city: Option<String>,
    pub location_state: Option<String>,
    pub location_country: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub photos: Vec<String>,
    pub status: ModerationStatusDb,
    pub is_active: bool,
    pub admin_notes: Option<String>,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DeviceEntity> for Device {
    fn from(entity: DeviceEntity) -> Self {
        let location = if entity.location_city.is_some()
            || entity.location_state.is_some()
            || entity.location_country.is_some()
        {
            Some(DeviceLocation {
                city: entity.location_city,
                state: entity.location_state,
                country: entity.location_country,
            })
        } else {
            None
        };

        let contact_info = if entity.contact_email.is_some() || entity.contact_phone.is_some() {
            Some(ContactInfo {
                email: entity.contact_email,
                phone: entity.contact_phone,
            })
        } else {
            None
        };

        Self {
            id: entity.id,
            owner_id: entity.owner_id,
            title: entity.title,
            description: entity.description,
            device_type: entity.device_type.into(),
            condition: entity.condition.into(),
            location,
            contact_info,
            photos: entity.photos,
            status: entity.status.into(),
            is_active: entity.is_active,
            admin_notes: entity.admin_notes,
            approved_by: entity.approved_by,
            approved_at: entity.approved_at,
            rejection_reason: entity.rejection_reason,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_device_entity() -> DeviceEntity {
        DeviceEntity {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            title: "HP EliteBook".to_string(),
            description: "Refurbished, new battery".to_string(),
            device_type: DeviceTypeDb::Laptop,
            condition: DeviceConditionDb::Excellent,
            location_city: Some("Nairobi".to_string()),
            location_state: None,
            location_country: Some("Kenya".to_string()),
            contact_email: None,
            contact_phone: None,
            photos: vec!["blob/1.jpg".to_string()],
            status: ModerationStatusDb::Approved,
            is_active: true,
            admin_notes: None,
            approved_by: Some(Uuid::new_v4()),
            approved_at: Some(Utc::now()),
            rejection_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_device_entity_to_domain() {
        let entity = create_test_device_entity();
        let device: Device = entity.clone().into();

        assert_eq!(device.id, entity.id);
        assert_eq!(device.owner_id, entity.owner_id);
        assert_eq!(device.device_type, DeviceType::Laptop);
        assert_eq!(device.condition, DeviceCondition::Excellent);
        assert_eq!(device.status, ModerationStatus::Approved);
        assert_eq!(device.photos, entity.photos);

        let location = device.location.unwrap();
        assert_eq!(location.city.as_deref(), Some("Nairobi"));
        assert!(location.state.is_none());
        assert!(device.contact_info.is_none());
    }

    #[test]
    fn test_flattened_groups_map_to_none_when_empty() {
        let mut entity = create_test_device_entity();
        entity.location_city = None;
        entity.location_country = None;
        entity.contact_phone = Some("+254700000000".to_string());

        let device: Device = entity.into();
        assert!(device.location.is_none());
        assert_eq!(
            device.contact_info.unwrap().phone.as_deref(),
            Some("+254700000000")
        );
    }

    #[test]
    fn test_enum_conversions_are_symmetric() {
        for status in [
            ModerationStatus::Pending,
            ModerationStatus::Approved,
            ModerationStatus::Rejected,
            ModerationStatus::Suspended,
        ] {
            let db: ModerationStatusDb = status.into();
            assert_eq!(ModerationStatus::from(db), status);
        }
        for device_type in [DeviceType::Smartphone, DeviceType::Accessories, DeviceType::Other] {
            let db: DeviceTypeDb = device_type.into();
            assert_eq!(DeviceType::from(db), device_type);
        }
    }
}
