//! Resource models as the backend exposes them.
//!
//! Authoritative storage lives in the backend; these types only mirror what the
//! client reads and writes. Resources arrive with camelCase field names.

#[cfg(test)]
pub(crate) mod fixtures;
mod notification;
mod reservation;
mod tool;
mod user;

pub use notification::{Notification, NotificationId};
pub use reservation::{NewReservation, Reservation, ReservationId, ReservationStatus, StatusUpdate};
pub use tool::{
    NewTool, RatingUpdate, Tool, ToolForm, ToolId, ToolStatus, ToolUpdate, TOOL_CATEGORIES,
};
pub use user::{NewUser, SessionResponse, UserDirectory, UserId, UserProfile};

use serde::{Deserialize, Deserializer};

/// Numeric identifiers occasionally arrive as strings; accept both.
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Int(i64),
    Float(f64),
    Str(String),
}

pub(crate) fn de_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Int(v) => Ok(v),
        NumberOrString::Float(v) if v.fract() == 0.0 => Ok(v as i64),
        NumberOrString::Float(v) => Err(serde::de::Error::custom(format!(
            "expected an integer id, got {}",
            v
        ))),
        NumberOrString::Str(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid id: {:?}", s))),
    }
}

/// Coordinates are sent as strings by the registration form and may come back
/// either way.
pub(crate) fn de_opt_coordinate<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<NumberOrString> = Option::deserialize(deserializer)?;
    Ok(match raw {
        None => None,
        Some(NumberOrString::Int(v)) => Some(v as f64),
        Some(NumberOrString::Float(v)) => Some(v),
        Some(NumberOrString::Str(s)) => s.trim().parse().ok(),
    })
}

/// Prices and ratings are decimals on the wire, sometimes serialized as strings.
pub(crate) fn de_decimal<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<NumberOrString> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(0.0),
        Some(NumberOrString::Int(v)) => Ok(v as f64),
        Some(NumberOrString::Float(v)) => Ok(v),
        Some(NumberOrString::Str(s)) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid number: {:?}", s))),
    }
}

/// Generates a numeric id newtype with lenient decoding.
macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                crate::models::de_id(deserializer).map($name)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map($name)
            }
        }
    };
}

pub(crate) use numeric_id;
