// Storage schema — the unique indexes each backend must guarantee.
//
// The relay leans on the store for uniqueness: `deviceId` and `phoneNumber`
// are hard-unique, `mobileNumber` is unique only when present (a device that
// has never reported a mobile number must not collide with another).

use crate::db::models::collections;

/// A unique index on a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniqueIndex {
    pub field: &'static str,
    /// Sparse: documents missing the field are exempt from the constraint.
    pub sparse: bool,
}

/// A collection plus its unique indexes.
#[derive(Debug, Clone)]
pub struct CollectionSpec {
    pub name: &'static str,
    pub unique: &'static [UniqueIndex],
}

/// The full relay schema.
#[derive(Debug, Clone)]
pub struct RelaySchema {
    pub collections: Vec<CollectionSpec>,
}

impl RelaySchema {
    /// The schema every deployment uses.
    pub fn core_schema() -> Self {
        Self {
            collections: vec![
                CollectionSpec {
                    name: collections::DEVICE,
                    unique: &[
                        UniqueIndex { field: "deviceId", sparse: true },
                        UniqueIndex { field: "mobileNumber", sparse: true },
                    ],
                },
                CollectionSpec {
                    name: collections::MESSAGE,
                    unique: &[],
                },
                CollectionSpec {
                    name: collections::PHONE_NUMBER,
                    unique: &[UniqueIndex { field: "phoneNumber", sparse: false }],
                },
                CollectionSpec {
                    name: collections::ADMIN,
                    unique: &[UniqueIndex { field: "email", sparse: false }],
                },
            ],
        }
    }
}
