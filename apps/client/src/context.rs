use netpass_common::{request_topic, response_topic};

use crate::config::Config;
use crate::identity::ClientIdentity;

/// Process-scoped state built once at startup and shared by every component
#[derive(Debug, Clone)]
pub struct ClientContext {
    pub config: Config,
    pub identity: ClientIdentity,
}

impl ClientContext {
    pub fn new(config: Config, identity: ClientIdentity) -> Self {
        Self { config, identity }
    }

    /// Identifier used on the broker (client id and topic scope)
    pub fn client_id(&self) -> &str {
        &self.identity.assigned_id
    }

    pub fn request_topic(&self) -> String {
        request_topic(self.client_id())
    }

    pub fn response_topic(&self) -> String {
        response_topic(self.client_id())
    }

    pub fn public_url(&self) -> String {
        self.config.public_url(self.client_id())
    }
}
