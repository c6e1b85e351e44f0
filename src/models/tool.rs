//! Tools listed for rent.

use serde::{Deserialize, Serialize};

use super::{de_decimal, numeric_id, UserId};

numeric_id! {
    /// Backend tool identifier.
    ToolId
}

/// Categories offered when listing a tool.
pub const TOOL_CATEGORIES: [&str; 6] = [
    "Ferramentas Elétricas",
    "Ferramentas Manuais",
    "Medição e instrumentação",
    "Caixas Organizadoras",
    "Ferramentas para jardim",
    "Acessórios",
];

/// Availability of a tool. Only the backend moves a tool between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolStatus {
    #[serde(rename = "disponível")]
    Available,
    #[serde(rename = "alugada")]
    Rented,
    #[serde(rename = "em manutenção")]
    Maintenance,
    #[serde(other)]
    Unknown,
}

impl ToolStatus {
    /// Statuses a user may pick when listing a tool.
    pub const SELECTABLE: [ToolStatus; 3] = [
        ToolStatus::Available,
        ToolStatus::Rented,
        ToolStatus::Maintenance,
    ];

    /// Wire value.
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolStatus::Available => "disponível",
            ToolStatus::Rented => "alugada",
            ToolStatus::Maintenance => "em manutenção",
            ToolStatus::Unknown => "desconhecido",
        }
    }

    /// Parse a wire value; accepts the unaccented spelling as well.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "disponível" | "disponivel" | "available" => Some(ToolStatus::Available),
            "alugada" | "rented" => Some(ToolStatus::Rented),
            "em manutenção" | "em manutencao" | "maintenance" => Some(ToolStatus::Maintenance),
            _ => None,
        }
    }
}

impl std::fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub id: ToolId,
    pub user_id: UserId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Hourly price.
    #[serde(default, deserialize_with = "de_decimal")]
    pub price: f64,
    #[serde(default)]
    pub category: String,
    #[serde(default, deserialize_with = "de_decimal")]
    pub rating: f64,
    pub status: ToolStatus,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Tool {
    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.user_id == user
    }
}

/// Body of `POST /tool`. New listings always start unrated.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTool {
    pub name: String,
    pub description: String,
    pub price: f64,
    pub category: String,
    pub status: ToolStatus,
    pub image: String,
    pub user_id: UserId,
    pub rating: f64,
}

/// Listing form as filled in by the owner.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolForm {
    pub name: String,
    pub description: String,
    pub price: f64,
    pub category: String,
    pub status: ToolStatus,
    pub image: String,
}

impl ToolForm {
    pub fn into_new_tool(self, owner: UserId) -> NewTool {
        NewTool {
            name: self.name,
            description: self.description,
            price: self.price,
            category: self.category,
            status: self.status,
            image: self.image,
            user_id: owner,
            rating: 0.0,
        }
    }
}

/// Body of `PUT /tool/:id` when editing a listing.
#[derive(Debug, Clone, Serialize)]
pub struct ToolUpdate {
    pub name: String,
    pub description: String,
    pub price: f64,
    pub category: String,
    pub image: String,
}

/// Body of `PUT /tool/:id` when rating a finished rental.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RatingUpdate {
    pub rating: u8,
}
