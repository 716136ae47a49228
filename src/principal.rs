//! Authenticated principals and the channel a request arrived through.
//!
//! DESIGN
//! ======
//! A request acts either as a console account or as an end user holding a
//! passport. Extractors build the [`Principal`] and handlers pass it down
//! explicitly; nothing reads a "current user" from ambient state.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Principal {
    /// Console account.
    InternalUser { account_id: Uuid },
    /// End user of a published web app.
    ExternalVisitor { end_user_id: Uuid },
}

impl Principal {
    #[must_use]
    pub fn id(&self) -> Uuid {
        match self {
            Self::InternalUser { account_id } => *account_id,
            Self::ExternalVisitor { end_user_id } => *end_user_id,
        }
    }

    /// Value of `conversations.from_source` for rows this principal owns.
    #[must_use]
    pub fn from_source(&self) -> &'static str {
        match self {
            Self::InternalUser { .. } => "console",
            Self::ExternalVisitor { .. } => "api",
        }
    }

    #[must_use]
    pub fn account_id(&self) -> Option<Uuid> {
        match self {
            Self::InternalUser { account_id } => Some(*account_id),
            Self::ExternalVisitor { .. } => None,
        }
    }

    #[must_use]
    pub fn end_user_id(&self) -> Option<Uuid> {
        match self {
            Self::InternalUser { .. } => None,
            Self::ExternalVisitor { end_user_id } => Some(*end_user_id),
        }
    }

    /// Role string stored alongside rows the principal creates.
    #[must_use]
    pub fn role(&self) -> &'static str {
        match self {
            Self::InternalUser { .. } => "account",
            Self::ExternalVisitor { .. } => "end_user",
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.role(), self.id())
    }
}

/// Channel through which a conversation was started. Rows written by other
/// channels (`service-api`, `debugger`) are never matched by either value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvokeFrom {
    WebApp,
    Explore,
}

impl InvokeFrom {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WebApp => "web-app",
            Self::Explore => "explore",
        }
    }
}
