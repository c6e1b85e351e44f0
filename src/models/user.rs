//! User profiles, registration payloads and the users-by-id directory.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{de_opt_coordinate, numeric_id};

numeric_id! {
    /// Backend user identifier.
    UserId
}

/// A user as the backend returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub cpf: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "de_opt_coordinate")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_coordinate")]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default, rename = "type")]
    pub account_type: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Answer to `POST /session`: the profile with the issued token alongside.
#[derive(Debug, Deserialize)]
pub struct SessionResponse {
    #[serde(flatten)]
    pub user: UserProfile,
    #[serde(default)]
    pub token: Option<String>,
}

/// Body of `POST /user`.
#[derive(Debug, Clone, Serialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: String,
    pub cpf: String,
    pub address: String,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub image: String,
}

/// Profiles keyed by id, used to show renter and owner details next to
/// reservations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserDirectory {
    users: HashMap<UserId, UserProfile>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the profile stored under its id.
    pub fn insert(&mut self, profile: UserProfile) {
        self.users.insert(profile.id, profile);
    }

    pub fn get(&self, id: UserId) -> Option<&UserProfile> {
        self.users.get(&id)
    }

    /// Display name for `id`, or the bare id when it has not been resolved.
    pub fn display_name(&self, id: UserId) -> String {
        self.get(id)
            .map(|u| u.name.clone())
            .unwrap_or_else(|| format!("user #{}", id))
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn contains(&self, id: UserId) -> bool {
        self.users.contains_key(&id)
    }
}

impl FromIterator<UserProfile> for UserDirectory {
    fn from_iter<I: IntoIterator<Item = UserProfile>>(iter: I) -> Self {
        let mut directory = UserDirectory::new();
        for profile in iter {
            directory.insert(profile);
        }
        directory
    }
}
