//! Create, update and delete operations.
//!
//! Every mutation is pessimistic: input is validated, one request is sent,
//! and local collections are only touched after the backend accepted it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::api::{ApiClient, BearerToken};
use crate::error::{ClientError, ValidationErrors};
use crate::models::{
    NewReservation, NewUser, Notification, NotificationId, RatingUpdate, Reservation,
    ReservationStatus, Tool, ToolForm, ToolId, ToolUpdate,
};
use crate::poller::CollectionStore;
use crate::session::SessionStore;
use crate::validation::{
    validate_rating_form, validate_register_form, validate_reservation_form, validate_tool_form,
    validate_tool_update_form,
};

/// How the caller's local collection was, or should be, brought up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    None,
    Appended,
    Patched,
    Removed,
    /// The local copy cannot be patched; poll the collection again.
    Refetch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acknowledgment {
    pub message: &'static str,
    pub reconcile: Reconciliation,
}

impl Acknowledgment {
    fn new(message: &'static str, reconcile: Reconciliation) -> Self {
        Self { message, reconcile }
    }
}

/// A failed mutation: what to show the user and the underlying error.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct MutationError {
    pub message: String,
    #[source]
    pub cause: ClientError,
}

impl MutationError {
    pub fn is_validation(&self) -> bool {
        matches!(self.cause, ClientError::Validation(_))
    }
}

fn rejected(field: &str, message: &str) -> ClientError {
    let mut errors = ValidationErrors::new();
    errors.add(field, message);
    ClientError::Validation(errors)
}

pub struct MutationHandler {
    client: ApiClient,
    session: Arc<SessionStore>,
}

impl MutationHandler {
    pub fn new(client: ApiClient, session: Arc<SessionStore>) -> Self {
        Self { client, session }
    }

    fn failed(&self, operation: &'static str, fallback: &str, err: ClientError) -> MutationError {
        if !matches!(err, ClientError::Validation(_)) {
            warn!(operation = operation, error = %err, "Mutation failed");
        }
        MutationError {
            message: err.user_message(fallback),
            cause: err,
        }
    }

    /// A request sent with `token` failed; 401/403 is reported to the session.
    fn request_failed(
        &self,
        operation: &'static str,
        fallback: &str,
        token: &BearerToken,
        err: ClientError,
    ) -> MutationError {
        self.session.report_unauthorized(&err, token);
        self.failed(operation, fallback, err)
    }

    pub async fn register(&self, user: &NewUser) -> Result<Acknowledgment, MutationError> {
        const FALLBACK: &str = "Registration failed";

        validate_register_form(user).map_err(|e| self.failed("register", FALLBACK, e.into()))?;
        self.client
            .register_user(user)
            .await
            .map_err(|e| self.failed("register", FALLBACK, e))?;

        Ok(Acknowledgment::new("Registration complete", Reconciliation::None))
    }

    pub async fn create_tool(
        &self,
        form: ToolForm,
        tools: Option<&CollectionStore<Tool>>,
    ) -> Result<Acknowledgment, MutationError> {
        const FALLBACK: &str = "Failed to add tool";

        validate_tool_form(&form).map_err(|e| self.failed("create_tool", FALLBACK, e.into()))?;
        let session = self
            .session
            .require()
            .map_err(|e| self.failed("create_tool", FALLBACK, e))?;

        let body = form.into_new_tool(session.user.id);
        let created = self
            .client
            .create_tool(&session.token, &body)
            .await
            .map_err(|e| self.request_failed("create_tool", FALLBACK, &session.token, e))?;
        info!(tool_id = %created.id, name = %created.name, "Tool created");

        let reconcile = match tools {
            Some(store) => {
                store.append(created);
                Reconciliation::Appended
            }
            None => Reconciliation::None,
        };
        Ok(Acknowledgment::new("Tool added", reconcile))
    }

    pub async fn update_tool(
        &self,
        id: ToolId,
        update: ToolUpdate,
        tools: Option<&CollectionStore<Tool>>,
    ) -> Result<Acknowledgment, MutationError> {
        const FALLBACK: &str = "Failed to update tool";

        validate_tool_update_form(&update)
            .map_err(|e| self.failed("update_tool", FALLBACK, e.into()))?;
        let session = self
            .session
            .require()
            .map_err(|e| self.failed("update_tool", FALLBACK, e))?;

        let updated = self
            .client
            .update_tool(&session.token, id, &update)
            .await
            .map_err(|e| self.request_failed("update_tool", FALLBACK, &session.token, e))?;
        info!(tool_id = %id, "Tool updated");

        let reconcile = match tools {
            Some(store) if store.patch(|t| t.id == id, |t| *t = updated.clone()) > 0 => {
                Reconciliation::Patched
            }
            Some(_) => Reconciliation::Refetch,
            None => Reconciliation::None,
        };
        Ok(Acknowledgment::new("Tool updated", reconcile))
    }

    pub async fn delete_tool(
        &self,
        id: ToolId,
        tools: Option<&CollectionStore<Tool>>,
    ) -> Result<Acknowledgment, MutationError> {
        const FALLBACK: &str = "Failed to delete tool";

        let session = self
            .session
            .require()
            .map_err(|e| self.failed("delete_tool", FALLBACK, e))?;
        self.client
            .delete_tool(&session.token, id)
            .await
            .map_err(|e| self.request_failed("delete_tool", FALLBACK, &session.token, e))?;
        info!(tool_id = %id, "Tool deleted");

        let reconcile = match tools {
            Some(store) => {
                store.remove(|t| t.id == id);
                Reconciliation::Removed
            }
            None => Reconciliation::None,
        };
        Ok(Acknowledgment::new("Tool deleted", reconcile))
    }

    /// Rent `tool` for the given period. Renting one's own tool is refused
    /// before anything is sent.
    pub async fn create_reservation(
        &self,
        tool: &Tool,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        reservations: Option<&CollectionStore<Reservation>>,
    ) -> Result<Acknowledgment, MutationError> {
        const FALLBACK: &str = "Failed to rent tool";

        let session = self
            .session
            .require()
            .map_err(|e| self.failed("create_reservation", FALLBACK, e))?;
        if tool.is_owned_by(session.user.id) {
            return Err(self.failed(
                "create_reservation",
                FALLBACK,
                rejected("tool", "You cannot rent your own tool"),
            ));
        }
        validate_reservation_form(start, end)
            .map_err(|e| self.failed("create_reservation", FALLBACK, e.into()))?;

        let body = NewReservation {
            tool_id: tool.id,
            start_date: start,
            end_date: end,
            status: ReservationStatus::Pendente,
        };
        let created = self
            .client
            .create_reservation(&session.token, &body)
            .await
            .map_err(|e| self.request_failed("create_reservation", FALLBACK, &session.token, e))?;
        info!(tool_id = %tool.id, renter_id = %session.user.id, "Reservation created");

        let reconcile = match (reservations, created) {
            (Some(store), Some(created)) => {
                store.append(created);
                Reconciliation::Appended
            }
            (Some(_), None) => Reconciliation::Refetch,
            (None, _) => Reconciliation::None,
        };
        Ok(Acknowledgment::new("Tool rented", reconcile))
    }

    /// Move a received reservation to `next`. Only the tool owner may do this,
    /// and only along the offered transitions.
    pub async fn change_reservation_status(
        &self,
        reservation: &Reservation,
        next: ReservationStatus,
        reservations: Option<&CollectionStore<Reservation>>,
    ) -> Result<Acknowledgment, MutationError> {
        const FALLBACK: &str = "Failed to update reservation status";

        let session = self
            .session
            .require()
            .map_err(|e| self.failed("change_reservation_status", FALLBACK, e))?;
        if reservation.owner_id() != session.user.id {
            return Err(self.failed(
                "change_reservation_status",
                FALLBACK,
                rejected("reservation", "Only the tool owner can change this reservation"),
            ));
        }
        if !reservation.status.can_transition_to(next) {
            let message = format!("Cannot move a reservation from {} to {}", reservation.status, next);
            return Err(self.failed(
                "change_reservation_status",
                FALLBACK,
                rejected("status", &message),
            ));
        }

        let id = reservation.id;
        self.client
            .update_reservation_status(&session.token, id, next)
            .await
            .map_err(|e| self.request_failed("change_reservation_status", FALLBACK, &session.token, e))?;
        info!(reservation_id = %id, status = %next, "Reservation status updated");

        let reconcile = match reservations {
            Some(store) if store.patch(|r| r.id == id, |r| r.status = next) > 0 => {
                Reconciliation::Patched
            }
            Some(_) => Reconciliation::Refetch,
            None => Reconciliation::None,
        };
        Ok(Acknowledgment::new("Reservation status updated", reconcile))
    }

    /// Cancel one of the viewer's own reservations. Confirmed and finished
    /// rentals cannot be deleted.
    pub async fn delete_reservation(
        &self,
        reservation: &Reservation,
        reservations: Option<&CollectionStore<Reservation>>,
    ) -> Result<Acknowledgment, MutationError> {
        const FALLBACK: &str = "Failed to delete reservation";

        let session = self
            .session
            .require()
            .map_err(|e| self.failed("delete_reservation", FALLBACK, e))?;
        if reservation.user_id != session.user.id {
            return Err(self.failed(
                "delete_reservation",
                FALLBACK,
                rejected("reservation", "Only the renter can delete this reservation"),
            ));
        }
        if matches!(
            reservation.status,
            ReservationStatus::Confirmada | ReservationStatus::Finalizada
        ) {
            return Err(self.failed(
                "delete_reservation",
                FALLBACK,
                rejected("status", "Confirmed or finished reservations cannot be deleted"),
            ));
        }

        let id = reservation.id;
        self.client
            .delete_reservation(&session.token, id)
            .await
            .map_err(|e| self.request_failed("delete_reservation", FALLBACK, &session.token, e))?;
        info!(reservation_id = %id, "Reservation deleted");

        let reconcile = match reservations {
            Some(store) => {
                store.remove(|r| r.id == id);
                Reconciliation::Removed
            }
            None => Reconciliation::None,
        };
        Ok(Acknowledgment::new("Reservation deleted", reconcile))
    }

    /// Rate the tool of a finished reservation. The tool's aggregate rating
    /// is computed server-side, so callers should refetch.
    pub async fn submit_rating(
        &self,
        reservation: &Reservation,
        rating: i64,
    ) -> Result<Acknowledgment, MutationError> {
        const FALLBACK: &str = "Failed to submit rating";

        validate_rating_form(rating, reservation.status)
            .map_err(|e| self.failed("submit_rating", FALLBACK, e.into()))?;
        let session = self
            .session
            .require()
            .map_err(|e| self.failed("submit_rating", FALLBACK, e))?;
        if reservation.user_id != session.user.id {
            return Err(self.failed(
                "submit_rating",
                FALLBACK,
                rejected("reservation", "Only the renter can rate this reservation"),
            ));
        }

        let rating = u8::try_from(rating).map_err(|_| {
            self.failed("submit_rating", FALLBACK, rejected("rating", "Rating out of range"))
        })?;
        self.client
            .rate_tool(&session.token, reservation.tool_id, RatingUpdate { rating })
            .await
            .map_err(|e| self.request_failed("submit_rating", FALLBACK, &session.token, e))?;
        info!(tool_id = %reservation.tool_id, rating = rating, "Rating submitted");

        Ok(Acknowledgment::new("Rating submitted", Reconciliation::Refetch))
    }

    pub async fn mark_notification_read(
        &self,
        id: NotificationId,
        notifications: Option<&CollectionStore<Notification>>,
    ) -> Result<Acknowledgment, MutationError> {
        const FALLBACK: &str = "Failed to mark notification as read";

        let session = self
            .session
            .require()
            .map_err(|e| self.failed("mark_notification_read", FALLBACK, e))?;
        self.client
            .mark_notification_read(&session.token, id)
            .await
            .map_err(|e| self.request_failed("mark_notification_read", FALLBACK, &session.token, e))?;

        let reconcile = match notifications {
            Some(store) if store.patch(|n| n.id == id, |n| n.read = true) > 0 => {
                Reconciliation::Patched
            }
            Some(_) => Reconciliation::Refetch,
            None => Reconciliation::None,
        };
        Ok(Acknowledgment::new("Notification marked as read", reconcile))
    }

    pub async fn delete_notification(
        &self,
        id: NotificationId,
        notifications: Option<&CollectionStore<Notification>>,
    ) -> Result<Acknowledgment, MutationError> {
        const FALLBACK: &str = "Failed to delete notification";

        let session = self
            .session
            .require()
            .map_err(|e| self.failed("delete_notification", FALLBACK, e))?;
        self.client
            .delete_notification(&session.token, id)
            .await
            .map_err(|e| self.request_failed("delete_notification", FALLBACK, &session.token, e))?;

        let reconcile = match notifications {
            Some(store) => {
                store.remove(|n| n.id == id);
                Reconciliation::Removed
            }
            None => Reconciliation::None,
        };
        Ok(Acknowledgment::new("Notification deleted", reconcile))
    }
}
