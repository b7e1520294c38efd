//! User Registry
//!
//! Per-user profile and registration status. Registration only succeeds with
//! the sender's own shared contact; phone equality is always compared after
//! normalization.

use super::error::{DealError, DealResult, ValidationError};
use super::model::{ProfileHints, User, UserId};
use std::collections::HashMap;

/// Contact card shared through the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedContact {
    /// Platform identity the contact belongs to (if the transport knows it)
    pub owner_id: Option<UserId>,
    pub phone: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Strip `+` and whitespace so "+1 234 5678" and "12345678" compare equal.
pub fn normalize_phone(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != '+' && !c.is_whitespace())
        .collect()
}

/// Normalize and check that what remains is a non-empty run of digits
pub fn validate_phone(raw: &str) -> Result<String, ValidationError> {
    let phone = normalize_phone(raw);
    if phone.is_empty() || !phone.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidPhoneFormat);
    }
    Ok(phone)
}

/// In-memory user registry
#[derive(Debug, Default)]
pub struct UserRegistry {
    users: HashMap<UserId, User>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the existing user or create an unregistered one.
    ///
    /// Hints only fill gaps on unregistered users; a registered profile is
    /// never overwritten from a later interaction.
    pub fn get_or_create(&mut self, user_id: &UserId, hints: &ProfileHints) -> &mut User {
        let user = self
            .users
            .entry(user_id.clone())
            .or_insert_with(|| User::new(user_id.clone()));

        if !user.is_registered {
            if user.username.is_none() {
                user.username = hints.username.clone();
            }
            if user.first_name.is_none() {
                user.first_name = hints.first_name.clone();
            }
            if user.last_name.is_none() {
                user.last_name = hints.last_name.clone();
            }
        }

        user
    }

    /// Register `user_id` from their own shared contact.
    pub fn complete_registration(
        &mut self,
        user_id: &UserId,
        contact: &SharedContact,
    ) -> DealResult<&User> {
        if contact.owner_id.as_ref() != Some(user_id) {
            return Err(DealError::OwnershipMismatch);
        }
        let phone = validate_phone(&contact.phone)?;

        let user = self
            .users
            .entry(user_id.clone())
            .or_insert_with(|| User::new(user_id.clone()));

        user.phone = Some(phone);
        if contact.first_name.is_some() {
            user.first_name = contact.first_name.clone();
        }
        if contact.last_name.is_some() {
            user.last_name = contact.last_name.clone();
        }
        user.is_registered = true;

        Ok(user)
    }

    /// First registered user whose normalized phone matches, excluding the requester
    pub fn find_by_phone(&self, phone: &str, excluding: &UserId) -> Option<&User> {
        let wanted = normalize_phone(phone);
        if wanted.is_empty() {
            return None;
        }
        self.registered_except(excluding).find(|u| {
            u.phone.as_deref().map(normalize_phone).as_deref() == Some(wanted.as_str())
        })
    }

    /// Registered user with this username (case-insensitive, leading `@` ignored)
    pub fn find_by_username(&self, username: &str, excluding: &UserId) -> Option<&User> {
        let wanted = username.trim();
        let wanted = wanted.strip_prefix('@').unwrap_or(wanted);
        if wanted.is_empty() {
            return None;
        }
        self.registered_except(excluding).find(|u| {
            u.username
                .as_deref()
                .is_some_and(|name| name.eq_ignore_ascii_case(wanted))
        })
    }

    fn registered_except<'a>(&'a self, excluding: &UserId) -> impl Iterator<Item = &'a User> {
        // Sorted so "first match" is stable across runs
        let mut users: Vec<&User> = self
            .users
            .values()
            .filter(move |u| u.is_registered && &u.id != excluding)
            .collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        users.into_iter()
    }

    pub fn get(&self, user_id: &UserId) -> Option<&User> {
        self.users.get(user_id)
    }

    pub fn get_mut(&mut self, user_id: &UserId) -> Option<&mut User> {
        self.users.get_mut(user_id)
    }

    pub fn insert(&mut self, user: User) {
        self.users.insert(user.id.clone(), user);
    }

    pub fn iter(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
