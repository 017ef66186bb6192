//! Client identity
//!
//! The local id is a digest of the machine's hardware addresses. The
//! identity endpoint may exchange it for a server-assigned id; any failure
//! there quietly keeps the local id.

use netpass_common::{Result, TunnelError, derive_local_id};
use network_interface::{NetworkInterface, NetworkInterfaceConfig};
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use crate::config::Config;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// 12 hex characters derived from hardware addresses
    pub local_id: String,

    /// Identifier used on the broker; equals `local_id` when assignment fails
    pub assigned_id: String,
}

/// Derive the local id from the adapters in interface-index order
pub fn local_hardware_id() -> Result<String> {
    let interfaces = NetworkInterface::show()
        .map_err(|e| TunnelError::InternalError(format!("Cannot list adapters: {}", e)))?;

    derive_local_id(hardware_addresses(interfaces)).ok_or(TunnelError::NoAdapters)
}

/// Hardware addresses ordered by interface index
///
/// `NetworkInterface::show` returns adapters in hash-map order, which changes
/// between calls. The index is the kernel's enumeration order.
fn hardware_addresses(mut interfaces: Vec<NetworkInterface>) -> Vec<String> {
    interfaces.sort_by(|a, b| a.index.cmp(&b.index).then_with(|| a.name.cmp(&b.name)));
    interfaces
        .into_iter()
        .filter_map(|iface| {
            debug!("Adapter {} (#{}): {:?}", iface.name, iface.index, iface.mac_addr);
            iface.mac_addr
        })
        .collect()
}

pub struct IdentityResolver {
    client: Client,
    url: String,
    api_key: String,
}

impl IdentityResolver {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.identity_timeout)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| TunnelError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            url: config.identity_url(),
            api_key: config.api_key.clone(),
        })
    }

    /// Fails only when no adapter reports a hardware address
    pub async fn resolve(&self) -> Result<ClientIdentity> {
        let local_id = local_hardware_id()?;
        let assigned_id = self.assigned_id(&local_id).await;

        info!("Client id: {} (local {})", assigned_id, local_id);
        Ok(ClientIdentity {
            local_id,
            assigned_id,
        })
    }

    /// Ask the identity endpoint for an id, falling back to `local_id`
    pub async fn assigned_id(&self, local_id: &str) -> String {
        match self.request_id(local_id).await {
            Ok(id) => id,
            Err(e) => {
                warn!("Identity assignment unavailable ({}), using local id", e);
                local_id.to_string()
            }
        }
    }

    async fn request_id(&self, local_id: &str) -> Result<String> {
        let response = self
            .client
            .post(&self.url)
            .form(&[("hwid", local_id), ("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| TunnelError::HttpError(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(TunnelError::HttpError(format!("status {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| TunnelError::HttpError(e.to_string()))?;
        let id = body.trim();
        if id.is_empty() {
            return Err(TunnelError::HttpError("empty response body".to_string()));
        }

        Ok(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{spawn_http_responder, unused_port};

    fn resolver(port: u16) -> IdentityResolver {
        let config = Config::new(&format!("http://127.0.0.1:{}", port), "secret-key").unwrap();
        IdentityResolver::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_assigned_id_is_trimmed_body() {
        let (port, captured) = spawn_http_responder(
            b"HTTP/1.1 200 OK\r\nContent-Length: 8\r\n\r\nsrv-42\r\n".to_vec(),
        )
        .await;

        let id = resolver(port).assigned_id("a1b2c3d4e5f6").await;
        assert_eq!(id, "srv-42");

        let raw = captured.await.unwrap();
        assert!(raw.starts_with("POST /api/getID HTTP/1.1\r\n"));
        assert!(
            raw.to_ascii_lowercase()
                .contains("content-type: application/x-www-form-urlencoded")
        );
        assert!(raw.ends_with("hwid=a1b2c3d4e5f6&key=secret-key"));
    }

    #[tokio::test]
    async fn test_error_status_falls_back_to_local_id() {
        let (port, _) = spawn_http_responder(
            b"HTTP/1.1 403 Forbidden\r\nContent-Length: 6\r\n\r\nsrv-99".to_vec(),
        )
        .await;

        assert_eq!(resolver(port).assigned_id("a1b2c3d4e5f6").await, "a1b2c3d4e5f6");
    }

    #[tokio::test]
    async fn test_empty_body_falls_back_to_local_id() {
        let (port, _) =
            spawn_http_responder(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\n \n".to_vec())
                .await;

        assert_eq!(resolver(port).assigned_id("a1b2c3d4e5f6").await, "a1b2c3d4e5f6");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_falls_back_to_local_id() {
        let port = unused_port().await;

        assert_eq!(resolver(port).assigned_id("0123456789ab").await, "0123456789ab");
    }

    fn adapter(name: &str, index: u32, mac: Option<&str>) -> NetworkInterface {
        NetworkInterface {
            name: name.to_string(),
            addr: vec![],
            mac_addr: mac.map(str::to_string),
            index,
            internal: false,
        }
    }

    #[test]
    fn test_hardware_addresses_follow_interface_index() {
        let ordered = vec![
            adapter("lo", 1, Some("00:00:00:00:00:00")),
            adapter("eth0", 2, Some("02:42:ac:11:00:02")),
            adapter("wlan0", 3, None),
            adapter("eth1", 4, Some("02:42:ac:11:00:03")),
        ];
        let expected = vec![
            "00:00:00:00:00:00".to_string(),
            "02:42:ac:11:00:02".to_string(),
            "02:42:ac:11:00:03".to_string(),
        ];

        let mut shuffled = ordered.clone();
        shuffled.reverse();
        shuffled.swap(0, 2);

        assert_eq!(hardware_addresses(ordered), expected);
        assert_eq!(hardware_addresses(shuffled), expected);
    }

    #[test]
    fn test_local_hardware_id_is_stable_across_calls() {
        let ids: std::collections::BTreeSet<String> =
            (0..20).filter_map(|_| local_hardware_id().ok()).collect();
        assert!(ids.len() <= 1, "local id changed between calls: {:?}", ids);
    }

    #[test]
    fn test_local_hardware_id_shape() {
        // Containers may expose no hardware address at all
        match local_hardware_id() {
            Ok(id) => {
                assert_eq!(id.len(), 12);
                assert!(id.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
            }
            Err(e) => assert!(matches!(e, TunnelError::NoAdapters)),
        }
    }
}
