//! HMAC-SHA1 short-term TURN credential generation (§4.2).
//!
//! `username = "<exp>-<user>"` with `exp = now + 86400`,
//! `password = base64(HMAC_SHA1(secret, username))`.

use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use sha1::Sha1;

use super::RtcConfig;

type HmacSha1 = Hmac<Sha1>;

const CREDENTIAL_TTL_SECS: i64 = 86_400;

pub struct HmacTurnParams<'a> {
    pub turn_host: &'a str,
    pub turn_port: u16,
    pub shared_secret: &'a str,
    pub user: &'a str,
    pub protocol: &'a str,
    pub tls: bool,
}

/// Generate `(username, password)` for `now` (unix seconds).
pub fn generate_credential(now: i64, secret: &str, user: &str) -> (String, String) {
    let username = format!("{}-{user}", now + CREDENTIAL_TTL_SECS);
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(username.as_bytes());
    let password = STANDARD.encode(mac.finalize().into_bytes());
    (username, password)
}

/// Build the RTC config for the HMAC TURN source: one stun URL, one
/// turn/turns URL with `?transport=udp|tcp`.
pub fn build_rtc_config(now: i64, params: &HmacTurnParams, stun_host: &str, stun_port: u16) -> RtcConfig {
    let (username, password) = generate_credential(now, params.shared_secret, params.user);
    let scheme = if params.tls { "turns" } else { "turn" };
    let turn_uri = format!(
        "{scheme}:{}:{}?transport={}",
        params.turn_host, params.turn_port, params.protocol
    );
    let stun_uri = format!("stun:{stun_host}:{stun_port}");

    let raw_json = serde_json::json!({
        "lifetimeDuration": format!("{CREDENTIAL_TTL_SECS}s"),
        "iceServers": [
            { "urls": [stun_uri.clone()] },
            { "urls": [turn_uri.clone()], "username": username, "credential": password },
        ],
    });

    let encoded_user = urlencoding::encode(&username);
    let encoded_cred = urlencoding::encode(&password);

    RtcConfig {
        stun_uris: vec![stun_uri],
        turn_uris: vec![format!("{turn_uri}|{encoded_user}|{encoded_cred}")],
        raw_json: serde_json::to_vec(&raw_json).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_the_documented_example() {
        // now=1000, secret="s", user="alice" => username="87400-alice" (§8 scenario 3).
        let (username, password) = generate_credential(1000, "s", "alice");
        assert_eq!(username, "87400-alice");

        let mut mac = HmacSha1::new_from_slice(b"s").unwrap();
        mac.update(username.as_bytes());
        let expected = STANDARD.encode(mac.finalize().into_bytes());
        assert_eq!(password, expected);
    }
}
