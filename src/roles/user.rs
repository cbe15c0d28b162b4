//! User role: a passive observer that records the narration stream
//! addressed to it. Human interventions (hold/amend/approve/reject)
//! are published directly onto the bus by the session's caller — a
//! person doesn't react to the runtime loop, they drive it.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::agent::AgentHandler;
use crate::bus::AgentNetwork;
use crate::error::AppError;
use crate::message::{Message, Role};
use crate::proposal::Proposal;

#[derive(Default)]
pub struct UserAgent {
    narrations: Mutex<Vec<String>>,
}

impl UserAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn narrations(&self) -> Vec<String> {
        self.narrations.lock().clone()
    }
}

#[async_trait]
impl AgentHandler for UserAgent {
    fn role(&self) -> Role {
        Role::User
    }

    fn subscriptions(&self) -> Vec<String> {
        vec!["narration".to_string()]
    }

    async fn handle(&self, msg: &Message, _bus: &AgentNetwork) -> Result<(), AppError> {
        if let Proposal::Narration(n) = &msg.payload {
            self.narrations.lock().push(n.text.clone());
        }
        Ok(())
    }
}
