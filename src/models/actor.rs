use std::fmt;
use uuid::Uuid;

/// Identity of whoever is acting on the core, already resolved by the auth layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Actor {
    User(Uuid),
    Guest,
}

impl Actor {
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Actor::User(id) => Some(*id),
            Actor::Guest => None,
        }
    }

    pub fn is_guest(&self) -> bool {
        matches!(self, Actor::Guest)
    }
}

impl From<Option<Uuid>> for Actor {
    fn from(user_id: Option<Uuid>) -> Self {
        user_id.map_or(Actor::Guest, Actor::User)
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::User(id) => write!(f, "user:{}", id),
            Actor::Guest => f.write_str("guest"),
        }
    }
}

/// Actor reading an event gallery, with the event password if one was presented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub actor: Actor,
    pub event_password: Option<String>,
}

impl Requester {
    pub fn new(actor: Actor) -> Self {
        Self {
            actor,
            event_password: None,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.event_password = Some(password.into());
        self
    }
}

impl From<Actor> for Requester {
    fn from(actor: Actor) -> Self {
        Requester::new(actor)
    }
}
