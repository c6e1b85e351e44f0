//! Typed access to the ToolShare backend.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::transport::{ApiRequest, BearerToken, Transport};
use crate::error::ClientError;
use crate::models::{
    NewReservation, NewTool, NewUser, Notification, NotificationId, RatingUpdate, Reservation,
    ReservationId, ReservationStatus, SessionResponse, StatusUpdate, Tool, ToolId, ToolUpdate,
    UserDirectory, UserId, UserProfile,
};
use crate::session::{AuthenticatedSession, Authenticator, Credentials};

#[derive(Debug, Deserialize)]
struct ToolList {
    #[serde(default)]
    tools: Vec<Tool>,
}

/// Single-tool answers come either wrapped in `{"tool": ...}` or bare.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ToolPayload {
    Wrapped { tool: Tool },
    Bare(Tool),
}

impl From<ToolPayload> for Tool {
    fn from(payload: ToolPayload) -> Self {
        match payload {
            ToolPayload::Wrapped { tool } => tool,
            ToolPayload::Bare(tool) => tool,
        }
    }
}

/// Client for the backend REST API. Cheap to clone.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Exchange credentials for a token and profile (`POST /session`).
    pub async fn create_session(
        &self,
        credentials: &Credentials,
    ) -> Result<AuthenticatedSession, ClientError> {
        let request = ApiRequest::post("/session").json(json!({
            "email": credentials.email,
            "password": credentials.password,
        }));

        let response: SessionResponse = self.transport.send(request).await?.into_result()?;
        let token = response
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ClientError::Decode("session response carried no token".to_string()))?;

        Ok(AuthenticatedSession {
            token: BearerToken::new(token),
            user: response.user,
        })
    }

    /// `POST /user`. Registration is the only unauthenticated write.
    pub async fn register_user(&self, user: &NewUser) -> Result<(), ClientError> {
        let request = ApiRequest::post("/user").json(serde_json::to_value(user)?);
        self.transport.send(request).await?.check()?;
        info!(email = %user.email, "User registered");
        Ok(())
    }

    pub async fn get_user(&self, token: &BearerToken, id: UserId) -> Result<UserProfile, ClientError> {
        let request = ApiRequest::get(format!("/user/{}", id)).bearer(token);
        self.transport.send(request).await?.into_result()
    }

    /// Resolve several profiles concurrently. Ids that fail to resolve are
    /// left out of the directory.
    pub async fn resolve_users(
        &self,
        token: &BearerToken,
        ids: impl IntoIterator<Item = UserId>,
    ) -> UserDirectory {
        let unique: BTreeSet<UserId> = ids.into_iter().collect();
        let lookups = unique.into_iter().map(|id| async move {
            match self.get_user(token, id).await {
                Ok(profile) => Some(profile),
                Err(e) => {
                    warn!(user_id = %id, error = %e, "Failed to fetch user");
                    None
                }
            }
        });

        futures::future::join_all(lookups)
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    pub async fn list_tools(&self, token: &BearerToken) -> Result<Vec<Tool>, ClientError> {
        let request = ApiRequest::get("/tool").bearer(token);
        let list: ToolList = self.transport.send(request).await?.into_result()?;
        Ok(list.tools)
    }

    pub async fn get_tool(&self, token: &BearerToken, id: ToolId) -> Result<Tool, ClientError> {
        let request = ApiRequest::get(format!("/tool/{}", id)).bearer(token);
        let payload: ToolPayload = self.transport.send(request).await?.into_result()?;
        Ok(payload.into())
    }

    pub async fn create_tool(&self, token: &BearerToken, tool: &NewTool) -> Result<Tool, ClientError> {
        let request = ApiRequest::post("/tool")
            .bearer(token)
            .json(serde_json::to_value(tool)?);
        let payload: ToolPayload = self.transport.send(request).await?.into_result()?;
        Ok(payload.into())
    }

    pub async fn update_tool(
        &self,
        token: &BearerToken,
        id: ToolId,
        update: &ToolUpdate,
    ) -> Result<Tool, ClientError> {
        let request = ApiRequest::put(format!("/tool/{}", id))
            .bearer(token)
            .json(serde_json::to_value(update)?);
        let payload: ToolPayload = self.transport.send(request).await?.into_result()?;
        Ok(payload.into())
    }

    pub async fn rate_tool(
        &self,
        token: &BearerToken,
        id: ToolId,
        rating: RatingUpdate,
    ) -> Result<(), ClientError> {
        let request = ApiRequest::put(format!("/tool/{}", id))
            .bearer(token)
            .json(serde_json::to_value(rating)?);
        self.transport.send(request).await?.check()?;
        Ok(())
    }

    pub async fn delete_tool(&self, token: &BearerToken, id: ToolId) -> Result<(), ClientError> {
        let request = ApiRequest::delete(format!("/tool/{}", id)).bearer(token);
        self.transport.send(request).await?.check()?;
        Ok(())
    }

    /// Reservations made by the signed-in user.
    pub async fn list_reservations(&self, token: &BearerToken) -> Result<Vec<Reservation>, ClientError> {
        let request = ApiRequest::get("/reservation").bearer(token);
        self.transport.send(request).await?.into_result()
    }

    /// Reservations other users made for the signed-in user's tools.
    pub async fn list_received_reservations(
        &self,
        token: &BearerToken,
    ) -> Result<Vec<Reservation>, ClientError> {
        let request = ApiRequest::get("/reservations/received").bearer(token);
        self.transport.send(request).await?.into_result()
    }

    /// `POST /reservation`. Returns the created reservation when the backend
    /// echoes it back.
    pub async fn create_reservation(
        &self,
        token: &BearerToken,
        reservation: &NewReservation,
    ) -> Result<Option<Reservation>, ClientError> {
        let request = ApiRequest::post("/reservation")
            .bearer(token)
            .json(serde_json::to_value(reservation)?);
        let body = self.transport.send(request).await?.check()?;
        match serde_json::from_slice::<Reservation>(&body) {
            Ok(created) => Ok(Some(created)),
            Err(e) => {
                debug!(error = %e, "Reservation response did not echo the reservation");
                Ok(None)
            }
        }
    }

    pub async fn update_reservation_status(
        &self,
        token: &BearerToken,
        id: ReservationId,
        status: ReservationStatus,
    ) -> Result<(), ClientError> {
        let request = ApiRequest::put(format!("/reservation/{}/status", id))
            .bearer(token)
            .json(serde_json::to_value(StatusUpdate { status })?);
        self.transport.send(request).await?.check()?;
        Ok(())
    }

    pub async fn delete_reservation(
        &self,
        token: &BearerToken,
        id: ReservationId,
    ) -> Result<(), ClientError> {
        let request = ApiRequest::delete(format!("/reservation/{}", id)).bearer(token);
        self.transport.send(request).await?.check()?;
        Ok(())
    }

    pub async fn list_notifications(&self, token: &BearerToken) -> Result<Vec<Notification>, ClientError> {
        let request = ApiRequest::get("/notifications").bearer(token);
        self.transport.send(request).await?.into_result()
    }

    pub async fn mark_notification_read(
        &self,
        token: &BearerToken,
        id: NotificationId,
    ) -> Result<(), ClientError> {
        let request = ApiRequest::put(format!("/notifications/{}/mark-as-read", id)).bearer(token);
        self.transport.send(request).await?.check()?;
        Ok(())
    }

    pub async fn delete_notification(
        &self,
        token: &BearerToken,
        id: NotificationId,
    ) -> Result<(), ClientError> {
        let request = ApiRequest::delete(format!("/notifications/{}", id)).bearer(token);
        self.transport.send(request).await?.check()?;
        Ok(())
    }
}

#[async_trait]
impl Authenticator for ApiClient {
    async fn authenticate(&self, credentials: &Credentials) -> Result<AuthenticatedSession, ClientError> {
        self.create_session(credentials).await
    }
}
