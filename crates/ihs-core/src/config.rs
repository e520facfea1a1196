//! User-facing configuration and session-identity types (spec.md §6).

use std::net::SocketAddr;

use ihs_crypto::SessionKey;

/// Identity presented to hosts during discovery and the connect handshake.
/// Supplied once per client process.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Stable 64-bit id identifying this client device to the host.
    pub device_id: u64,
    /// Shared secret established out-of-band (the streaming-request
    /// handshake, out of scope here) and used to derive the session key.
    pub secret_key: [u8; 32],
    /// Human-readable device name shown in the host's device list.
    pub device_name: String,
}

/// Information needed to open a session against a specific host, normally
/// obtained from a prior streaming-request exchange.
#[derive(Clone)]
pub struct SessionInfo {
    /// Host's UDP endpoint.
    pub address: SocketAddr,
    /// Session key: 16 bytes selects AES-128, 32 bytes selects AES-256.
    pub session_key: SessionKey,
    /// Steam id of the account the session authenticates as.
    pub steam_id: u64,
}

impl std::fmt::Debug for SessionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionInfo")
            .field("address", &self.address)
            .field("session_key", &self.session_key)
            .field("steam_id", &self.steam_id)
            .finish()
    }
}

/// Negotiable session parameters. Exposed to the `configuring` callback
/// (spec.md §6) before negotiation starts, so a caller can veto HEVC or
/// disable audio before `NegotiationSetConfig` is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Request an audio data channel at all.
    pub enable_audio: bool,
    /// Allow the host to choose HEVC over H.264 if it supports both.
    pub enable_hevc: bool,
    /// Request the `TV_FORM_FACTOR` capability bit.
    pub tv_form_factor: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { enable_audio: true, enable_hevc: false, tv_form_factor: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_session_config_enables_audio_but_not_hevc() {
        let config = SessionConfig::default();
        assert!(config.enable_audio);
        assert!(!config.enable_hevc);
    }
}
