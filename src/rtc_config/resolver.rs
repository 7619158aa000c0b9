//! `get_rtc_configuration` priority chain and `parse_rtc_config` (§4.6).

use serde::Deserialize;
use tracing::{debug, info, warn};

use super::hmac_turn::{self, HmacTurnParams};
use super::RtcConfig;
use crate::config::RtcSettingsConfig;

#[derive(Deserialize)]
struct IceServerJson {
    urls: UrlsField,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    credential: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum UrlsField {
    One(String),
    Many(Vec<String>),
}

#[derive(Deserialize)]
struct RtcConfigJson {
    #[serde(rename = "iceServers")]
    ice_servers: Vec<IceServerJson>,
}

/// Walk `iceServers[].urls`, classify by scheme, URL-encode credentials,
/// and return `(stun_uris, turn_uris, raw_bytes)`.
pub fn parse_rtc_config(data: &[u8]) -> crate::error::Result<RtcConfig> {
    let parsed: RtcConfigJson = serde_json::from_slice(data)
        .map_err(|e| crate::error::AppError::ConfigInvalid(format!("invalid rtc config json: {e}")))?;

    let mut stun_uris = Vec::new();
    let mut turn_uris = Vec::new();

    for server in &parsed.ice_servers {
        let urls = match &server.urls {
            UrlsField::One(u) => vec![u.clone()],
            UrlsField::Many(u) => u.clone(),
        };

        for url in urls {
            if url.starts_with("stun:") {
                stun_uris.push(url);
            } else if url.starts_with("turn:") || url.starts_with("turns:") {
                match (&server.username, &server.credential) {
                    (Some(user), Some(cred)) => {
                        let encoded_user = urlencoding::encode(user);
                        let encoded_cred = urlencoding::encode(cred);
                        turn_uris.push(format!("{url}|{encoded_user}|{encoded_cred}"));
                    }
                    _ => turn_uris.push(url),
                }
            }
        }
    }

    Ok(RtcConfig {
        stun_uris,
        turn_uris,
        raw_json: data.to_vec(),
    })
}

fn default_rtc_config(stun_host: &str, stun_port: u16) -> RtcConfig {
    let stun_uri = format!("stun:{stun_host}:{stun_port}");
    let raw = serde_json::json!({ "iceServers": [{ "urls": [stun_uri.clone()] }] });
    RtcConfig {
        stun_uris: vec![stun_uri],
        turn_uris: vec![],
        raw_json: serde_json::to_vec(&raw).unwrap_or_default(),
    }
}

async fn try_cloudflare(cfg: &RtcSettingsConfig, client: &reqwest::Client) -> Option<RtcConfig> {
    if !cfg.enable_cloudflare_turn {
        return None;
    }
    let (token_id, api_token) = (
        cfg.cloudflare_turn_token_id.as_ref()?,
        cfg.cloudflare_turn_api_token.as_ref()?,
    );

    let url = format!("https://rtc.live.cloudflare.com/v1/turn/keys/{token_id}/credentials/generate");
    let response = client
        .post(url)
        .bearer_auth(api_token)
        .json(&serde_json::json!({ "ttl": 86_400 }))
        .send()
        .await
        .ok()?;

    if !response.status().is_success() {
        warn!(status = %response.status(), "cloudflare turn credential request failed");
        return None;
    }

    let body = response.bytes().await.ok()?;
    parse_rtc_config(&body).ok()
}

async fn try_json_file(path: &str) -> Option<RtcConfig> {
    let data = tokio::fs::read(path).await.ok()?;
    parse_rtc_config(&data).ok()
}

async fn try_rest_api(cfg: &RtcSettingsConfig, client: &reqwest::Client) -> Option<RtcConfig> {
    let uri = cfg.turn_rest_uri.as_ref()?;
    let username = cfg.turn_rest_username.replace(':', "-");
    let response = client
        .get(uri)
        .header(cfg.turn_rest_username_auth_header.as_str(), username)
        .header(cfg.turn_rest_protocol_header.as_str(), cfg.turn_protocol.clone())
        .header(cfg.turn_rest_tls_header.as_str(), cfg.turn_tls.to_string())
        .send()
        .await
        .ok()?;

    if !response.status().is_success() {
        return None;
    }
    let body = response.bytes().await.ok()?;
    parse_rtc_config(&body).ok()
}

fn try_long_term(cfg: &RtcSettingsConfig) -> Option<RtcConfig> {
    let (user, pass) = (
        cfg.long_term_turn_username.as_ref()?,
        cfg.long_term_turn_password.as_ref()?,
    );
    let scheme = if cfg.turn_tls { "turns" } else { "turn" };
    let turn_uri = format!("{scheme}:{}:{}?transport={}", cfg.turn_host, cfg.turn_port, cfg.turn_protocol);
    let stun_uri = format!("stun:{}:{}", cfg.stun_host, cfg.stun_port);
    let raw = serde_json::json!({
        "iceServers": [
            { "urls": [stun_uri.clone()] },
            { "urls": [turn_uri.clone()], "username": user, "credential": pass },
        ],
    });
    let encoded_user = urlencoding::encode(user);
    let encoded_pass = urlencoding::encode(pass);
    Some(RtcConfig {
        stun_uris: vec![stun_uri],
        turn_uris: vec![format!("{turn_uri}|{encoded_user}|{encoded_pass}")],
        raw_json: serde_json::to_vec(&raw).unwrap_or_default(),
    })
}

fn try_hmac(cfg: &RtcSettingsConfig, now: i64) -> Option<RtcConfig> {
    let secret = cfg.turn_shared_secret.as_ref()?;
    let params = HmacTurnParams {
        turn_host: &cfg.turn_host,
        turn_port: cfg.turn_port,
        shared_secret: secret,
        user: &cfg.turn_username,
        protocol: &cfg.turn_protocol,
        tls: cfg.turn_tls,
    };
    Some(hmac_turn::build_rtc_config(now, &params, &cfg.stun_host, cfg.stun_port))
}

/// Six-source priority chain: Cloudflare, JSON file, REST, long-term,
/// HMAC, built-in default (§4.6).
pub async fn get_rtc_configuration(cfg: &RtcSettingsConfig, now: i64) -> RtcConfig {
    let client = reqwest::Client::new();

    if let Some(config) = try_cloudflare(cfg, &client).await {
        info!(source = "cloudflare", "rtc config resolved");
        return config;
    }
    if let Some(path) = cfg.rtc_config_json_path.as_deref() {
        if let Some(config) = try_json_file(path).await {
            info!(source = "json_file", "rtc config resolved");
            return config;
        }
    }
    if let Some(config) = try_rest_api(cfg, &client).await {
        info!(source = "rest_api", "rtc config resolved");
        return config;
    }
    if let Some(config) = try_long_term(cfg) {
        info!(source = "long_term", "rtc config resolved");
        return config;
    }
    if let Some(config) = try_hmac(cfg, now) {
        info!(source = "hmac", "rtc config resolved");
        return config;
    }

    debug!(source = "default", "no turn source configured, falling back to stun-only default");
    default_rtc_config(&cfg.stun_host, cfg.stun_port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_carries_only_stun() {
        let config = default_rtc_config("stun.example.com", 19302);
        assert_eq!(config.stun_uris, vec!["stun:stun.example.com:19302"]);
        assert!(config.turn_uris.is_empty());
    }

    #[test]
    fn parses_mixed_stun_and_turn_entries() {
        let json = br#"{"iceServers":[
            {"urls":"stun:stun.example.com:19302"},
            {"urls":["turn:turn.example.com:3478"],"username":"u","credential":"p"}
        ]}"#;
        let config = parse_rtc_config(json).unwrap();
        assert_eq!(config.stun_uris, vec!["stun:stun.example.com:19302"]);
        assert_eq!(config.turn_uris.len(), 1);
        assert!(config.turn_uris[0].starts_with("turn:turn.example.com:3478|u|p"));
    }
}
