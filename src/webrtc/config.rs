//! Builds the webrtc-rs `RTCConfiguration` from the current [`RtcConfig`]
//! snapshot (§4.4 step 1), grounded on
//! `original_source/src/selkies/webrtc_utils.py`'s ICE server shape and the
//! `"url|user|cred"` TURN encoding produced by `rtc_config::resolver`.

use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;

use crate::rtc_config::RtcConfig;

/// Max-bundle keeps every media line and the data channel on a single ICE
/// transport, matching the browser's default offer and avoiding a second
/// ICE negotiation for the "input" channel.
pub fn build_configuration(config: &RtcConfig) -> RTCConfiguration {
    RTCConfiguration {
        ice_servers: ice_servers(config),
        bundle_policy: RTCBundlePolicy::MaxBundle,
        ..Default::default()
    }
}

fn ice_servers(config: &RtcConfig) -> Vec<RTCIceServer> {
    let mut servers: Vec<RTCIceServer> = config
        .stun_uris
        .iter()
        .map(|url| RTCIceServer {
            urls: vec![url.clone()],
            ..Default::default()
        })
        .collect();

    for entry in &config.turn_uris {
        servers.push(decode_turn_uri(entry));
    }

    servers
}

/// Reverses `rtc_config::resolver::parse_rtc_config`'s
/// `"{url}|{encoded_user}|{encoded_cred}"` encoding. A TURN URL with no
/// credentials (a bare relay) has no `|` and is passed through
/// unauthenticated.
fn decode_turn_uri(entry: &str) -> RTCIceServer {
    let mut parts = entry.splitn(3, '|');
    let url = parts.next().unwrap_or(entry).to_string();
    let username = parts.next().and_then(|u| urlencoding::decode(u).ok()).map(|c| c.into_owned());
    let credential = parts.next().and_then(|c| urlencoding::decode(c).ok()).map(|c| c.into_owned());

    RTCIceServer {
        urls: vec![url],
        username: username.unwrap_or_default(),
        credential: credential.unwrap_or_default(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stun_uri_has_no_credentials() {
        let config = RtcConfig {
            stun_uris: vec!["stun:stun.example.com:3478".into()],
            turn_uris: vec![],
            raw_json: vec![],
        };
        let servers = ice_servers(&config);
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].urls, vec!["stun:stun.example.com:3478"]);
        assert!(servers[0].username.is_empty());
    }

    #[test]
    fn turn_uri_decodes_pipe_delimited_credentials() {
        let config = RtcConfig {
            stun_uris: vec![],
            turn_uris: vec!["turn:turn.example.com:3478|a%40b|s%3Dcret".into()],
            raw_json: vec![],
        };
        let servers = ice_servers(&config);
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].urls, vec!["turn:turn.example.com:3478"]);
        assert_eq!(servers[0].username, "a@b");
        assert_eq!(servers[0].credential, "s=cret");
    }

    #[test]
    fn turn_uri_without_credentials_passes_through() {
        let config = RtcConfig {
            stun_uris: vec![],
            turn_uris: vec!["turn:open-relay.example.com:3478".into()],
            raw_json: vec![],
        };
        let servers = ice_servers(&config);
        assert_eq!(servers[0].urls, vec!["turn:open-relay.example.com:3478"]);
        assert!(servers[0].username.is_empty());
    }

    #[test]
    fn build_configuration_sets_max_bundle() {
        let config = RtcConfig::default();
        let rtc_config = build_configuration(&config);
        assert_eq!(rtc_config.bundle_policy, RTCBundlePolicy::MaxBundle);
    }
}
