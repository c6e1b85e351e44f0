//! Plain-text rendering of the pages.
//!
//! Each page is a [`fmt::Display`] view over borrowed data, so the same
//! snapshot always renders the same text.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::models::{Notification, Reservation, Tool, UserDirectory, UserId};
use crate::poller::ToolDetail;
use crate::views::{available_actions, format_price, format_total, Dashboard, ReservationTab};

/// Shorten `s` to at most `max_len` characters.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

fn format_date(date: &DateTime<Utc>) -> String {
    date.format("%d/%m/%Y %H:%M").to_string()
}

fn format_rating(rating: f64) -> String {
    format!("{:.1}/5", rating)
}

pub struct ToolTable<'a> {
    title: &'a str,
    tools: &'a [&'a Tool],
}

pub fn tool_table<'a>(title: &'a str, tools: &'a [&'a Tool]) -> ToolTable<'a> {
    ToolTable { title, tools }
}

impl fmt::Display for ToolTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title)?;
        if self.tools.is_empty() {
            return writeln!(f, "  No tools found.");
        }

        writeln!(
            f,
            "{:<6}  {:<24}  {:<24}  {:<12}  {:<6}  {:<14}",
            "ID", "NAME", "CATEGORY", "PRICE", "RATING", "STATUS"
        )?;
        writeln!(f, "{}", "-".repeat(96))?;
        for tool in self.tools {
            writeln!(
                f,
                "{:<6}  {:<24}  {:<24}  {:<12}  {:<6}  {:<14}",
                tool.id,
                truncate(&tool.name, 24),
                truncate(&tool.category, 24),
                format_price(tool.price),
                format_rating(tool.rating),
                tool.status
            )?;
        }
        Ok(())
    }
}

pub struct DashboardPage<'a> {
    user_name: &'a str,
    dashboard: &'a Dashboard<'a>,
    unread: usize,
}

pub fn dashboard<'a>(user_name: &'a str, dashboard: &'a Dashboard<'a>, unread: usize) -> DashboardPage<'a> {
    DashboardPage {
        user_name,
        dashboard,
        unread,
    }
}

impl fmt::Display for DashboardPage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== ToolShare: {} ===", self.user_name)?;
        if self.unread > 0 {
            writeln!(f, "{} unread notification(s)", self.unread)?;
        }
        writeln!(f)?;
        write!(f, "{}", tool_table("Available tools", &self.dashboard.available))?;
        writeln!(f)?;
        write!(f, "{}", tool_table("Rented tools", &self.dashboard.rented))
    }
}

pub struct ReservationTable<'a> {
    reservations: &'a [&'a Reservation],
    tab: ReservationTab,
    viewer: UserId,
    users: &'a UserDirectory,
}

pub fn reservation_table<'a>(
    reservations: &'a [&'a Reservation],
    tab: ReservationTab,
    viewer: UserId,
    users: &'a UserDirectory,
) -> ReservationTable<'a> {
    ReservationTable {
        reservations,
        tab,
        viewer,
        users,
    }
}

impl fmt::Display for ReservationTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Reservations ({})", self.tab)?;
        if self.reservations.is_empty() {
            return writeln!(f, "  No reservations found.");
        }

        let counterpart = match self.tab {
            ReservationTab::Made => "OWNER",
            ReservationTab::Received => "RENTER",
        };
        writeln!(
            f,
            "{:<6}  {:<20}  {:<35}  {:<10}  {:<11}  {:<16}  {}",
            "ID", "TOOL", "PERIOD", "TOTAL", "STATUS", counterpart, "ACTIONS"
        )?;
        writeln!(f, "{}", "-".repeat(120))?;
        for reservation in self.reservations {
            let other = match self.tab {
                ReservationTab::Made => reservation.owner_id(),
                ReservationTab::Received => reservation.user_id,
            };
            let actions = available_actions(reservation, self.tab, self.viewer)
                .iter()
                .map(|a| a.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(
                f,
                "{:<6}  {:<20}  {:<35}  {:<10}  {:<11}  {:<16}  {}",
                reservation.id,
                truncate(&reservation.tool.name, 20),
                format!(
                    "{} - {}",
                    format_date(&reservation.start_date),
                    format_date(&reservation.end_date)
                ),
                format_total(reservation.total_price),
                reservation.status,
                truncate(&self.users.display_name(other), 16),
                if actions.is_empty() { "-" } else { &actions }
            )?;
        }
        Ok(())
    }
}

pub struct NotificationList<'a>(&'a [Notification]);

pub fn notification_list(notifications: &[Notification]) -> NotificationList<'_> {
    NotificationList(notifications)
}

impl fmt::Display for NotificationList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return writeln!(f, "No notifications.");
        }
        for n in self.0 {
            let marker = if n.read { "   " } else { "[*]" };
            writeln!(f, "{} {:<6} {}", marker, n.id, n.message)?;
        }
        Ok(())
    }
}

pub struct ToolDetailPage<'a>(&'a ToolDetail);

pub fn tool_detail(detail: &ToolDetail) -> ToolDetailPage<'_> {
    ToolDetailPage(detail)
}

impl fmt::Display for ToolDetailPage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tool = &self.0.tool;
        writeln!(f, "=== {} ===", tool.name)?;
        writeln!(f)?;
        writeln!(f, "Price:       {}", format_price(tool.price))?;
        writeln!(f, "Category:    {}", tool.category)?;
        writeln!(f, "Rating:      {}", format_rating(tool.rating))?;
        writeln!(f, "Status:      {}", tool.status)?;
        if let Some(image) = &tool.image {
            writeln!(f, "Image:       {}", image)?;
        }
        writeln!(f)?;
        writeln!(f, "{}", tool.description)?;
        writeln!(f)?;
        match &self.0.owner {
            Some(owner) => {
                writeln!(f, "Owner:       {}", owner.name)?;
                if let Some(phone) = &owner.phone {
                    writeln!(f, "Phone:       {}", phone)?;
                }
                if let Some(address) = &owner.address {
                    writeln!(f, "Address:     {}", address)?;
                }
                Ok(())
            }
            None => writeln!(f, "Owner:       user #{}", tool.user_id),
        }
    }
}
