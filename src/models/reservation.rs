//! Reservations of a tool by a renter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{de_decimal, numeric_id, Tool, ToolId, UserId};

numeric_id! {
    /// Backend reservation identifier.
    ReservationId
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pendente,
    Confirmada,
    Cancelada,
    Finalizada,
}

impl ReservationStatus {
    pub const ALL: [ReservationStatus; 4] = [
        ReservationStatus::Pendente,
        ReservationStatus::Confirmada,
        ReservationStatus::Cancelada,
        ReservationStatus::Finalizada,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pendente => "pendente",
            ReservationStatus::Confirmada => "confirmada",
            ReservationStatus::Cancelada => "cancelada",
            ReservationStatus::Finalizada => "finalizada",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_lowercase();
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }

    /// Transitions the client offers from this status. The backend owns the
    /// real state machine; this is only the subset exposed to tool owners.
    pub fn offered_transitions(&self) -> &'static [ReservationStatus] {
        match self {
            ReservationStatus::Pendente => {
                &[ReservationStatus::Confirmada, ReservationStatus::Cancelada]
            }
            ReservationStatus::Confirmada => {
                &[ReservationStatus::Finalizada, ReservationStatus::Cancelada]
            }
            ReservationStatus::Cancelada | ReservationStatus::Finalizada => &[],
        }
    }

    pub fn can_transition_to(&self, next: ReservationStatus) -> bool {
        self.offered_transitions().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.offered_transitions().is_empty()
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reservation with a snapshot of the tool it references. The reservation
/// does not own the tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: ReservationId,
    /// The renter.
    pub user_id: UserId,
    pub tool_id: ToolId,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default, deserialize_with = "de_decimal")]
    pub total_price: f64,
    pub status: ReservationStatus,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    pub tool: Tool,
}

impl Reservation {
    /// Owner of the reserved tool.
    pub fn owner_id(&self) -> UserId {
        self.tool.user_id
    }
}

/// Body of `POST /reservation`. This endpoint takes snake_case fields.
#[derive(Debug, Clone, Serialize)]
pub struct NewReservation {
    pub tool_id: ToolId,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: ReservationStatus,
}

/// Body of `PUT /reservation/:id/status`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StatusUpdate {
    pub status: ReservationStatus,
}
