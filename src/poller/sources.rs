//! Backend collections polled by the views.

use async_trait::async_trait;
use tracing::warn;

use super::CollectionSource;
use crate::api::{ApiClient, BearerToken};
use crate::error::ClientError;
use crate::models::{Notification, Reservation, Tool, ToolId, UserDirectory, UserProfile};
use crate::views::ReservationTab;

/// `GET /tool`: every listed tool.
pub struct ToolsSource {
    client: ApiClient,
}

impl ToolsSource {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CollectionSource for ToolsSource {
    type Item = Tool;
    type Filter = ();

    fn name(&self) -> &'static str {
        "tools"
    }

    async fn fetch(&self, token: &BearerToken, _filter: &()) -> Result<Vec<Tool>, ClientError> {
        self.client.list_tools(token).await
    }
}

/// Reservations made or received, depending on the tab.
pub struct ReservationsSource {
    client: ApiClient,
}

impl ReservationsSource {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CollectionSource for ReservationsSource {
    type Item = Reservation;
    type Filter = ReservationTab;

    fn name(&self) -> &'static str {
        "reservations"
    }

    async fn fetch(
        &self,
        token: &BearerToken,
        tab: &ReservationTab,
    ) -> Result<Vec<Reservation>, ClientError> {
        match tab {
            ReservationTab::Made => self.client.list_reservations(token).await,
            ReservationTab::Received => self.client.list_received_reservations(token).await,
        }
    }
}

pub struct NotificationsSource {
    client: ApiClient,
}

impl NotificationsSource {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CollectionSource for NotificationsSource {
    type Item = Notification;
    type Filter = ();

    fn name(&self) -> &'static str {
        "notifications"
    }

    async fn fetch(
        &self,
        token: &BearerToken,
        _filter: &(),
    ) -> Result<Vec<Notification>, ClientError> {
        self.client.list_notifications(token).await
    }
}

/// Profiles of every renter and tool owner referenced by `reservations`.
pub async fn fetch_user_directory(
    client: &ApiClient,
    token: &BearerToken,
    reservations: &[Reservation],
) -> UserDirectory {
    let ids = reservations
        .iter()
        .flat_map(|r| [r.user_id, r.owner_id()]);
    client.resolve_users(token, ids).await
}

/// A tool with its owner's profile, for the detail page.
#[derive(Debug, Clone)]
pub struct ToolDetail {
    pub tool: Tool,
    /// `None` when the owner lookup failed.
    pub owner: Option<UserProfile>,
}

pub async fn fetch_tool_detail(
    client: &ApiClient,
    token: &BearerToken,
    id: ToolId,
) -> Result<ToolDetail, ClientError> {
    let tool = client.get_tool(token, id).await?;
    let owner = match client.get_user(token, tool.user_id).await {
        Ok(owner) => Some(owner),
        Err(e) => {
            warn!(tool_id = %id, owner_id = %tool.user_id, error = %e, "Failed to fetch tool owner");
            None
        }
    };
    Ok(ToolDetail { tool, owner })
}
