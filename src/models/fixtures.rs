//! Sample resources shared by unit tests.

use chrono::{DateTime, Utc};

use super::*;

pub fn profile(id: i64, name: &str) -> UserProfile {
    UserProfile {
        id: UserId(id),
        name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
        phone: Some("11999990000".to_string()),
        cpf: None,
        address: None,
        latitude: None,
        longitude: None,
        image: None,
        account_type: Some("user".to_string()),
        created_at: None,
        updated_at: None,
    }
}

pub fn tool(id: i64, owner: i64, status: ToolStatus) -> Tool {
    Tool {
        id: ToolId(id),
        user_id: UserId(owner),
        name: format!("Tool {}", id),
        description: "A perfectly ordinary tool".to_string(),
        price: 10.0,
        category: TOOL_CATEGORIES[0].to_string(),
        rating: 0.0,
        status,
        image: None,
        created_at: None,
        updated_at: None,
    }
}

pub fn at(rfc3339: &str) -> DateTime<Utc> {
    rfc3339.parse().expect("valid timestamp")
}

pub fn reservation(id: i64, renter: i64, tool: Tool, status: ReservationStatus) -> Reservation {
    Reservation {
        id: ReservationId(id),
        user_id: UserId(renter),
        tool_id: tool.id,
        start_date: at("2024-06-01T08:00:00Z"),
        end_date: at("2024-06-01T12:00:00Z"),
        total_price: tool.price * 4.0,
        status,
        created_at: None,
        updated_at: None,
        tool,
    }
}

pub fn notification(id: i64, message: &str, read: bool) -> Notification {
    Notification {
        id: NotificationId(id),
        message: message.to_string(),
        read,
    }
}
