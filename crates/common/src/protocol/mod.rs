mod request;
mod response;

use serde::{Deserialize, Deserializer};

use crate::constants::{REQUEST_TOPIC_PREFIX, RESPONSE_TOPIC_PREFIX};

pub use request::{Action, ForwardedRequest};
pub use response::RelayResponse;

/// Topic carrying forwarded requests for a client: `http/request/<id>`
pub fn request_topic(client_id: &str) -> String {
    format!("{}/{}", REQUEST_TOPIC_PREFIX, client_id)
}

/// Topic receiving relay responses from a client: `http/response/<id>`
pub fn response_topic(client_id: &str) -> String {
    format!("{}/{}", RESPONSE_TOPIC_PREFIX, client_id)
}

/// The gateway encodes absent maps and strings as `null`
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
