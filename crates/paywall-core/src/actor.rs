//! Actors
//!
//! The creator is a single, well-known participant resolved from
//! configuration at startup. Callers arrive already authenticated by the
//! layer in front of this service.

use serde::{Deserialize, Serialize};

/// The creator who owns every piece of sold content
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    user_id: String,
}

impl Actor {
    pub fn creator(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn is(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }
}

/// An already-validated caller identity
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: String,
}

impl Caller {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }

    pub fn is_creator(&self, creator: &Actor) -> bool {
        creator.is(&self.user_id)
    }
}
