//! Pure projections of fetched collections.
//!
//! Nothing here is cached; every render recomputes its view from the latest
//! snapshot and the signed-in user.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::error::ValidationErrors;
use crate::models::{Notification, Reservation, ReservationStatus, Tool, ToolStatus, UserId};
use crate::validation::validate_reservation_form;

/// Tools other users listed that can be rented now.
pub fn available_tools(tools: &[Tool], viewer: UserId) -> Vec<&Tool> {
    tools
        .iter()
        .filter(|t| t.status == ToolStatus::Available && !t.is_owned_by(viewer))
        .collect()
}

/// Tools currently out on rent.
pub fn rented_tools(tools: &[Tool]) -> Vec<&Tool> {
    tools
        .iter()
        .filter(|t| t.status == ToolStatus::Rented)
        .collect()
}

/// The viewer's own listings that are open for rent.
pub fn owned_listings(tools: &[Tool], viewer: UserId) -> Vec<&Tool> {
    tools
        .iter()
        .filter(|t| t.status == ToolStatus::Available && t.is_owned_by(viewer))
        .collect()
}

/// Reservations whose tool is in `category`. `None` keeps everything.
pub fn filter_by_category<'a>(
    reservations: &'a [Reservation],
    category: Option<&str>,
) -> Vec<&'a Reservation> {
    match category {
        None => reservations.iter().collect(),
        Some(category) => reservations
            .iter()
            .filter(|r| r.tool.category == category)
            .collect(),
    }
}

pub fn unread_count(notifications: &[Notification]) -> usize {
    notifications.iter().filter(|n| !n.read).count()
}

/// The two sides of the reservations page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReservationTab {
    /// Reservations the viewer made as a renter.
    #[default]
    Made,
    /// Reservations other users made for the viewer's tools.
    Received,
}

impl ReservationTab {
    pub fn label(&self) -> &'static str {
        match self {
            ReservationTab::Made => "realizadas",
            ReservationTab::Received => "recebidas",
        }
    }
}

impl fmt::Display for ReservationTab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ReservationTab {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "made" | "realizadas" => Ok(ReservationTab::Made),
            "received" | "recebidas" => Ok(ReservationTab::Received),
            other => Err(format!("unknown tab '{}', expected made or received", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationAction {
    Delete,
    Rate,
    ChangeStatus(ReservationStatus),
}

impl fmt::Display for ReservationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReservationAction::Delete => f.write_str("delete"),
            ReservationAction::Rate => f.write_str("rate"),
            ReservationAction::ChangeStatus(status) => write!(f, "mark {}", status),
        }
    }
}

/// Actions the viewer is offered for `reservation` on `tab`.
pub fn available_actions(
    reservation: &Reservation,
    tab: ReservationTab,
    viewer: UserId,
) -> Vec<ReservationAction> {
    match tab {
        ReservationTab::Made => match reservation.status {
            ReservationStatus::Finalizada => vec![ReservationAction::Rate],
            ReservationStatus::Confirmada => Vec::new(),
            _ => vec![ReservationAction::Delete],
        },
        ReservationTab::Received if reservation.owner_id() == viewer => reservation
            .status
            .offered_transitions()
            .iter()
            .map(|s| ReservationAction::ChangeStatus(*s))
            .collect(),
        ReservationTab::Received => Vec::new(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RentalQuote {
    pub hours: f64,
    pub total: f64,
}

/// Price of renting at `price_per_hour` from `start` to `end`, counting
/// fractional hours.
pub fn quote(
    price_per_hour: f64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<RentalQuote, ValidationErrors> {
    validate_reservation_form(start, end)?;
    let hours = (end - start).num_seconds() as f64 / 3600.0;
    Ok(RentalQuote {
        hours,
        total: hours * price_per_hour,
    })
}

/// `R$12.50/h`
pub fn format_price(price_per_hour: f64) -> String {
    format!("R${:.2}/h", price_per_hour)
}

/// `R$12.50`
pub fn format_total(amount: f64) -> String {
    format!("R${:.2}", amount)
}

/// The dashboard's two tool sections.
#[derive(Debug, Clone, PartialEq)]
pub struct Dashboard<'a> {
    pub available: Vec<&'a Tool>,
    pub rented: Vec<&'a Tool>,
}

impl<'a> Dashboard<'a> {
    pub fn build(tools: &'a [Tool], viewer: UserId) -> Self {
        Self {
            available: available_tools(tools, viewer),
            rented: rented_tools(tools),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::{at, notification, reservation, tool};

    #[test]
    fn test_available_excludes_own_tools() {
        let tools = vec![tool(1, 5, ToolStatus::Available)];

        for viewer in [1, 4, 6, 500] {
            assert_eq!(available_tools(&tools, UserId(viewer)).len(), 1);
        }
        assert!(available_tools(&tools, UserId(5)).is_empty());
    }

    #[test]
    fn test_dashboard_sections() {
        let tools = vec![
            tool(1, 5, ToolStatus::Available),
            tool(2, 6, ToolStatus::Rented),
            tool(3, 7, ToolStatus::Maintenance),
            tool(4, 1, ToolStatus::Available),
            tool(5, 1, ToolStatus::Rented),
        ];
        let dashboard = Dashboard::build(&tools, UserId(1));
        fn ids(v: &[&Tool]) -> Vec<i64> {
            v.iter().map(|t| t.id.0).collect()
        }

        assert_eq!(ids(&dashboard.available), vec![1]);
        assert_eq!(ids(&dashboard.rented), vec![2, 5]);
        assert_eq!(ids(&owned_listings(&tools, UserId(1))), vec![4]);
    }

    #[test]
    fn test_filter_by_category() {
        let mut garden = tool(2, 5, ToolStatus::Rented);
        garden.category = "Ferramentas para jardim".to_string();
        let reservations = vec![
            reservation(1, 1, tool(1, 5, ToolStatus::Rented), ReservationStatus::Pendente),
            reservation(2, 1, garden, ReservationStatus::Pendente),
        ];

        assert_eq!(filter_by_category(&reservations, None).len(), 2);
        let filtered = filter_by_category(&reservations, Some("Ferramentas para jardim"));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id.0, 2);
    }

    #[test]
    fn test_unread_count() {
        let notifications = vec![
            notification(1, "Nova reserva", false),
            notification(2, "Reserva confirmada", true),
            notification(3, "Reserva cancelada", false),
        ];
        assert_eq!(unread_count(&notifications), 2);
    }

    #[test]
    fn test_actions_on_made_tab() {
        let made = |status| {
            available_actions(
                &reservation(1, 1, tool(1, 5, ToolStatus::Rented), status),
                ReservationTab::Made,
                UserId(1),
            )
        };
        assert_eq!(made(ReservationStatus::Pendente), vec![ReservationAction::Delete]);
        assert_eq!(made(ReservationStatus::Cancelada), vec![ReservationAction::Delete]);
        assert!(made(ReservationStatus::Confirmada).is_empty());
        assert_eq!(made(ReservationStatus::Finalizada), vec![ReservationAction::Rate]);
    }

    #[test]
    fn test_actions_on_received_tab_need_ownership() {
        let r = reservation(1, 1, tool(1, 5, ToolStatus::Rented), ReservationStatus::Pendente);
        assert_eq!(
            available_actions(&r, ReservationTab::Received, UserId(5)),
            vec![
                ReservationAction::ChangeStatus(ReservationStatus::Confirmada),
                ReservationAction::ChangeStatus(ReservationStatus::Cancelada),
            ]
        );
        assert!(available_actions(&r, ReservationTab::Received, UserId(9)).is_empty());
    }

    #[test]
    fn test_quote_counts_fractional_hours() {
        let q = quote(10.0, at("2024-06-01T08:00:00Z"), at("2024-06-01T10:30:00Z")).unwrap();
        assert_eq!(q.hours, 2.5);
        assert_eq!(q.total, 25.0);
        assert_eq!(format_total(q.total), "R$25.00");

        let start = at("2024-06-01T08:00:00Z");
        assert!(quote(10.0, start, start).is_err());
    }

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(15.0), "R$15.00/h");
        assert_eq!(format_price(7.5), "R$7.50/h");
    }

    #[test]
    fn test_tab_parsing() {
        assert_eq!("received".parse::<ReservationTab>(), Ok(ReservationTab::Received));
        assert_eq!("Realizadas".parse::<ReservationTab>(), Ok(ReservationTab::Made));
        assert!("both".parse::<ReservationTab>().is_err());
    }
}
