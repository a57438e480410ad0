//! The user directory port.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::UserId;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Member,
    Staff,
}

/// A user's preferred language for notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Ar,
    En,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Ar => "ar",
            Language::En => "en",
        }
    }

    /// Parses a language code, `None` for anything unsupported.
    pub fn parse(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "ar" => Some(Language::Ar),
            "en" => Some(Language::En),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub display_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Role,
    pub language: Language,
    /// Lifetime count of orders completed as a buyer.
    pub total_orders_made: u32,
}

impl UserProfile {
    pub fn member(display_name: impl Into<String>) -> Self {
        Self {
            id: UserId::new(),
            display_name: display_name.into(),
            email: None,
            phone: None,
            role: Role::Member,
            language: Language::default(),
            total_orders_made: 0,
        }
    }

    pub fn staff(display_name: impl Into<String>) -> Self {
        Self {
            role: Role::Staff,
            ..Self::member(display_name)
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    pub fn is_staff(&self) -> bool {
        self.role == Role::Staff
    }
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, id: UserId) -> Result<Option<UserProfile>, DomainError>;

    async fn increment_order_count(&self, id: UserId) -> Result<(), DomainError>;
}

#[derive(Clone, Default)]
pub struct InMemoryUserDirectory {
    users: Arc<RwLock<HashMap<UserId, UserProfile>>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, user: UserProfile) -> UserId {
        let id = user.id;
        self.users.write().await.insert(id, user);
        id
    }

    pub async fn order_count(&self, id: UserId) -> Option<u32> {
        self.users
            .read()
            .await
            .get(&id)
            .map(|user| user.total_orders_made)
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn get_user(&self, id: UserId) -> Result<Option<UserProfile>, DomainError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn increment_order_count(&self, id: UserId) -> Result<(), DomainError> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(&id)
            .ok_or_else(|| DomainError::Collaborator(format!("unknown user {id}")))?;
        user.total_orders_made += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_codes() {
        assert_eq!(Language::default(), Language::Ar);
        assert_eq!(Language::parse(" EN "), Some(Language::En));
        assert_eq!(Language::parse("fr"), None);
    }

    #[tokio::test]
    async fn increment_order_count() {
        let directory = InMemoryUserDirectory::new();
        let id = directory.insert(UserProfile::member("Huda")).await;

        directory.increment_order_count(id).await.unwrap();
        directory.increment_order_count(id).await.unwrap();

        assert_eq!(directory.order_count(id).await, Some(2));
        assert!(directory.increment_order_count(UserId::new()).await.is_err());
    }

    #[test]
    fn staff_profiles_carry_role() {
        let staff = UserProfile::staff("Ops").with_language(Language::En);
        assert!(staff.is_staff());
        assert!(!UserProfile::member("Buyer").is_staff());
    }
}
