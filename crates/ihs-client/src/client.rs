//! The public-facing library entry point: owns a [`Session`] plus the
//! socket and threads that drive it (spec.md §3 "Lifecycle").

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use ihs_core::{CallbackSet, ClientConfig, Session, SessionConfig, SessionInfo, hid::HidProvider};

use crate::{
    error::Result,
    transport::{UdpTransport, Workers},
};

/// A connected (or connecting) Steam In-Home Streaming session, the public
/// type this crate exists to provide. Construct with [`IhsClient::new`],
/// drive the handshake with [`IhsClient::connect`], and tear down with
/// [`IhsClient::disconnect`] followed by [`IhsClient::shutdown`].
pub struct IhsClient {
    session: Arc<Mutex<Session>>,
    transport: Arc<UdpTransport>,
    workers: Option<Workers>,
}

impl IhsClient {
    /// Build a session against `info.address`, binding the UDP socket but
    /// not yet sending anything — call [`Self::connect`] to start the
    /// handshake.
    pub fn new(
        client_config: ClientConfig,
        info: SessionInfo,
        config: SessionConfig,
        callbacks: CallbackSet,
        hid_providers: Vec<Box<dyn HidProvider>>,
    ) -> Result<Self> {
        let remote = info.address;
        let transport = UdpTransport::connect(remote)?;
        let session = Session::new(client_config, info, config, callbacks, hid_providers);
        Ok(Self { session: Arc::new(Mutex::new(session)), transport: Arc::new(transport), workers: None })
    }

    /// This client's local UDP endpoint.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    /// Start the receive/send/data-channel worker threads (idempotent) and
    /// send the `Connect` packet that opens the session.
    pub fn connect(&mut self) {
        if self.workers.is_none() {
            self.workers = Some(Workers::spawn(self.session.clone(), self.transport.clone()));
        }
        #[allow(clippy::unwrap_used)]
        self.session.lock().unwrap().connect();
    }

    /// Begin graceful teardown: send `Disconnect` on the discovery channel
    /// and tear down any running data channels. The worker threads keep
    /// running until [`Self::shutdown`] joins them.
    pub fn disconnect(&mut self) {
        #[allow(clippy::unwrap_used)]
        self.session.lock().unwrap().disconnect();
    }

    /// Stop and join every worker thread, then invoke the session's
    /// `finalized` callback (spec.md §3 "Lifecycle": "`destroy` joins
    /// threads and frees all owned resources"). Consumes `self`: once
    /// joined, the client has nothing left to drive.
    pub fn shutdown(mut self) -> Result<()> {
        if let Some(workers) = self.workers.take() {
            workers.stop(&self.transport)?;
        }
        #[allow(clippy::unwrap_used)]
        self.session.lock().unwrap().finalize();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ihs_core::hid::NullProvider;
    use ihs_crypto::SessionKey;

    use super::*;

    fn client() -> IhsClient {
        let client_config = ClientConfig { device_id: 1, secret_key: [0u8; 32], device_name: "test".into() };
        let info = SessionInfo {
            address: "127.0.0.1:27050".parse().expect("valid address"),
            session_key: SessionKey::new(vec![0x11u8; 16]).expect("valid key"),
            steam_id: 7,
        };
        IhsClient::new(
            client_config,
            info,
            SessionConfig::default(),
            CallbackSet::new(),
            vec![Box::new(NullProvider)],
        )
        .expect("client construction should not fail against a loopback address")
    }

    #[test]
    fn new_binds_a_local_ephemeral_port() {
        let client = client();
        assert_ne!(client.local_addr().port(), 0);
    }

    #[test]
    fn connect_then_shutdown_joins_every_worker() {
        let mut client = client();
        client.connect();
        client.disconnect();
        client.shutdown().expect("shutdown should join cleanly");
    }
}
