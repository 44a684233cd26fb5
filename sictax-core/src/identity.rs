//! Identity types for SICTAX entities
//!
//! Every table key in the cadastral schema is an integer. Each one gets its own
//! newtype so an assignment id can never be handed to something expecting a
//! property id.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw integer key as stored in the database (read as `int8`).
pub type RawId = i64;

/// Timestamp type for assignment dates (columns are `timestamp without time zone`).
pub type Timestamp = chrono::NaiveDateTime;

/// Common behavior of the integer-backed identifier newtypes.
pub trait IntegerId: Copy + Eq + std::hash::Hash + fmt::Display {
    /// Wrap a raw database key.
    fn new(raw: RawId) -> Self;

    /// The raw database key.
    fn get(self) -> RawId;
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
        #[serde(transparent)]
        pub struct $name(RawId);

        impl IntegerId for $name {
            fn new(raw: RawId) -> Self {
                Self(raw)
            }

            fn get(self) -> RawId {
                self.0
            }
        }

        impl From<RawId> for $name {
            fn from(raw: RawId) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for RawId {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Key of `sictax_tramitesdb.asignacion`.
    AssignmentId
);
define_id!(
    /// Key of `sictax_data_temporal.lc_predio_t`.
    PropertyId
);
define_id!(
    /// Key of `sictax_data_temporal.lc_construccion_t`.
    ConstructionId
);
define_id!(
    /// Key of `sictax_data_temporal.lc_unidadconstruccion_t`.
    UnitId
);
define_id!(
    /// Key of `sictax_control_usuario.usuario`.
    UserId
);
