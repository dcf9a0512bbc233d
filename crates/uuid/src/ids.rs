//! Typed identifiers for engine entities and external subjects.
//!
//! Each newtype wraps a [`CanonicalUuid`] and shares its canonical display, parsing and serde
//! representation.

use crate::service::CanonicalUuid;
use crate::UuidError;
use std::{fmt, str::FromStr};

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[cfg_attr(feature = "serde", serde(transparent))]
        pub struct $name(CanonicalUuid);

        impl $name {
            /// Allocates a fresh identifier.
            pub fn new() -> Self {
                Self(CanonicalUuid::new())
            }

            pub fn from_uuid(uuid: ::uuid::Uuid) -> Self {
                Self(CanonicalUuid::from_uuid(uuid))
            }

            pub fn uuid(&self) -> ::uuid::Uuid {
                self.0.uuid()
            }

            pub fn canonical(&self) -> CanonicalUuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = UuidError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                CanonicalUuid::parse(s).map(Self)
            }
        }

        impl From<$name> for CanonicalUuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

record_id!(
    /// Identifier of a ward.
    WardId
);
record_id!(
    /// Identifier of a bed.
    BedId
);
record_id!(
    /// Identifier of a room category (general, private, ICU, ...).
    RoomCategoryId
);
record_id!(
    /// Identifier of an inpatient admission.
    AdmissionId
);
record_id!(
    /// Identifier of a doctor order.
    OrderId
);
record_id!(
    /// Identifier of a medication schedule.
    ScheduleId
);
record_id!(
    /// Identifier of a single medication administration task.
    AdministrationId
);
record_id!(
    /// Identifier of a vitals observation.
    VitalsId
);
record_id!(
    /// Identifier of an emergency event.
    EventId
);
record_id!(
    /// Identifier of a patient held by the external patient directory.
    PatientId
);
record_id!(
    /// Identifier of a staff user (doctor, nurse, administrator) supplied by identity.
    UserId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_id_round_trips_through_string() {
        let id = BedId::new();
        let parsed: BedId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_typed_id_rejects_hyphenated_input() {
        let result = "550e8400-e29b-41d4-a716-446655440000".parse::<WardId>();
        assert!(matches!(result, Err(UuidError::InvalidInput(_))));
    }

    #[test]
    fn test_typed_id_serialises_transparently() {
        let id: AdmissionId = "550e8400e29b41d4a716446655440000".parse().unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"550e8400e29b41d4a716446655440000\"");

        let back: AdmissionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
