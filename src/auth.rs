use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Editor,
    Analyst,
    User,
}

impl Default for Role {
    fn default() -> Self {
        Role::User
    }
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Editor => "editor",
            Role::Analyst => "analyst",
            Role::User => "user",
        }
    }
}

/// The authenticated identity attempting an action. Anonymous callers are
/// represented as `None` wherever a principal is expected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub user_id: String,
    pub role: Role,
}

/// Platform actions gated by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    EarnRewards,
    AuthorArticles,
    PublishArticles,
    ManageUsers,
    AdjustTokens,
    ViewAnalytics,
}

/// Single authorization predicate. Both the settlement service and any UI
/// gating go through here instead of comparing role strings locally.
pub fn has_capability(principal: &Principal, action: Action) -> bool {
    match (principal.role, action) {
        (Role::Admin, _) => true,
        (Role::Editor, Action::EarnRewards) => true,
        (Role::Editor, Action::AuthorArticles | Action::PublishArticles) => true,
        (Role::Analyst, Action::EarnRewards | Action::ViewAnalytics) => true,
        (Role::User, Action::EarnRewards) => true,
        _ => false,
    }
}

/// Identity capability. Implementations belong to the host application;
/// the core only asks who is acting right now.
pub trait IdentityProvider: Send + Sync {
    fn current_principal(&self) -> Option<Principal>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(role: Role) -> Principal {
        Principal {
            user_id: "user-1".into(),
            role,
        }
    }

    #[test]
    fn every_role_can_earn_rewards() {
        for role in [Role::Admin, Role::Editor, Role::Analyst, Role::User] {
            assert!(has_capability(&principal(role), Action::EarnRewards));
        }
    }

    #[test]
    fn only_admin_manages_users_and_tokens() {
        for role in [Role::Editor, Role::Analyst, Role::User] {
            assert!(!has_capability(&principal(role), Action::ManageUsers));
            assert!(!has_capability(&principal(role), Action::AdjustTokens));
        }
        assert!(has_capability(&principal(Role::Admin), Action::ManageUsers));
        assert!(has_capability(&principal(Role::Admin), Action::AdjustTokens));
    }

    #[test]
    fn editors_author_but_analysts_do_not() {
        assert!(has_capability(&principal(Role::Editor), Action::AuthorArticles));
        assert!(!has_capability(&principal(Role::Analyst), Action::AuthorArticles));
        assert!(!has_capability(&principal(Role::User), Action::PublishArticles));
    }
}
