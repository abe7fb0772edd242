// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later

/// Maximum length of a relay URL.
pub const MAX_RELAY_URL_LENGTH: usize = 256;

/// Maximum number of relays a single bunker locator may list.
pub const MAX_RELAYS: usize = 10;

/// Validate a relay URL.
///
/// Accepts `wss://` and `ws://` URLs. Loopback, link-local and private
/// network hosts are refused unless `allow_internal` is set.
pub fn validate_relay_url(url: &str, allow_internal: bool) -> Result<(), String> {
    if url.len() > MAX_RELAY_URL_LENGTH {
        return Err("URL too long".into());
    }

    let rest = url
        .strip_prefix("wss://")
        .or_else(|| url.strip_prefix("ws://"))
        .ok_or("Must use wss:// or ws:// protocol")?;

    let host_port = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    if host_port.is_empty() {
        return Err("Missing host".into());
    }

    let host = split_port(host_port)?;
    if host.is_empty() {
        return Err("Missing host".into());
    }

    if !host.chars().all(|c| {
        c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '[' || c == ']' || c == ':'
    }) {
        return Err("Invalid host characters".into());
    }

    if !allow_internal && is_internal_host(host) {
        return Err("Internal addresses not allowed".into());
    }

    Ok(())
}

/// Canonical form used to compare relay URLs: lowercase, no trailing slash.
pub fn normalize_relay_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_lowercase()
}

/// Drop duplicate relays (after normalization), keeping first occurrence order.
pub fn dedup_relays<I, S>(relays: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = std::collections::HashSet::new();
    relays
        .into_iter()
        .filter_map(|r| {
            let raw = r.as_ref().trim();
            seen.insert(normalize_relay_url(raw)).then(|| raw.to_string())
        })
        .collect()
}

fn split_port(host_port: &str) -> Result<&str, String> {
    // bracketed IPv6, optionally followed by :port
    if host_port.starts_with('[') {
        let end = host_port.find(']').ok_or("Unterminated IPv6 host")?;
        let tail = &host_port[end + 1..];
        if let Some(port) = tail.strip_prefix(':') {
            check_port(port)?;
        } else if !tail.is_empty() {
            return Err("Invalid host".into());
        }
        return Ok(&host_port[..=end]);
    }

    match host_port.rfind(':') {
        Some(pos) => {
            check_port(&host_port[pos + 1..])?;
            Ok(&host_port[..pos])
        }
        None => Ok(host_port),
    }
}

fn check_port(port: &str) -> Result<(), String> {
    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err("Invalid port".into()),
        Ok(_) => Ok(()),
    }
}

fn is_internal_host(host: &str) -> bool {
    let host = host.to_lowercase();

    const FORBIDDEN: &[&str] = &[
        "localhost",
        "127.0.0.1",
        "0.0.0.0",
        "::1",
        "[::1]",
        "169.254.169.254",
    ];

    FORBIDDEN.contains(&host.as_str())
        || host.ends_with(".local")
        || host.ends_with(".localhost")
        || host.starts_with("127.")
        || host.starts_with("10.")
        || host.starts_with("192.168.")
        || host.starts_with("169.254.")
        || is_private_172(host.as_str())
}

fn is_private_172(host: &str) -> bool {
    host.strip_prefix("172.")
        .and_then(|rest| rest.split('.').next())
        .and_then(|s| s.parse::<u8>().ok())
        .is_some_and(|octet| (16..=31).contains(&octet))
}
