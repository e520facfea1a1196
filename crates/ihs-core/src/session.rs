//! The session aggregate: owns every channel, the shared outbound queues,
//! the HID manager and the keep-alive timer, and drains the event sink
//! after each dispatch to react (spec.md §3 "Lifecycle", §4.4-§4.8).
//!
//! This crate has no sockets or threads of its own. `ihs-client` feeds
//! [`Session::dispatch`] inbound packets on its receive thread, drains
//! [`Session::send_queue`]/[`Session::retransmission`] on its send thread,
//! calls [`Session::tick_timers`] on the same cadence, and spawns one
//! worker per data channel waiting on the waker returned by
//! [`Session::audio_waker`]/[`Session::video_waker`].

use std::sync::Arc;
use std::time::Instant;

use ihs_crypto::SessionKey;
use ihs_proto::{
    Packet,
    pb::hid::{
        HidMessageFromRemote, HidMessageToRemote, hid_message_from_remote::Kind as FromRemoteKind,
        hid_message_to_remote::Kind as ToRemoteKind,
    },
};
use tracing::{debug, warn};

use crate::{
    callbacks::CallbackSet,
    channel::{Channel, ChannelIo, ids},
    channels::{
        control::ControlChannel,
        data::{AudioDataChannel, DataChannelWaker, VideoDataChannel},
        discovery::DiscoveryChannel,
    },
    config::{ClientConfig, SessionConfig, SessionInfo},
    connection::ConnectionState,
    events::{EventSink, SessionEvent},
    hid::HidManager,
    retransmission::RetransmissionQueue,
    send_queue::SendQueue,
    timer::TimerWheel,
};

/// Interval for the control channel's steady-state `KeepAlive` (spec.md §4.6).
const KEEP_ALIVE_INTERVAL: std::time::Duration = std::time::Duration::from_secs(10);

/// Name the keep-alive timer registers under in [`TimerWheel`].
const KEEP_ALIVE_TIMER: &str = "keep_alive";

/// The session-transport state machine: discovery and control channels
/// always present, audio/video data channels spawned on demand, and the
/// HID relay reachable from the control channel's `RemoteHid` envelope.
pub struct Session {
    connection: Arc<ConnectionState>,
    send_queue: Arc<SendQueue>,
    retransmission: Arc<RetransmissionQueue>,
    events: Arc<EventSink>,
    discovery: DiscoveryChannel,
    control: ControlChannel,
    audio: Option<AudioDataChannel>,
    video: Option<VideoDataChannel>,
    hid: HidManager,
    timers: TimerWheel,
    callbacks: CallbackSet,
    client_config: ClientConfig,
    key: SessionKey,
    steam_id: u64,
}

impl Session {
    /// Build a session against `info`, ready to [`Session::connect`].
    /// `hid` is the provider set backing the HID relay; pass an empty
    /// `Vec` if the caller has no HID backend to offer.
    #[must_use]
    pub fn new(
        client_config: ClientConfig,
        info: SessionInfo,
        mut config: SessionConfig,
        mut callbacks: CallbackSet,
        hid_providers: Vec<Box<dyn crate::hid::HidProvider>>,
    ) -> Self {
        callbacks.session.initialized();
        callbacks.session.configuring(&mut config);

        let connection = Arc::new(ConnectionState::new());
        let send_queue = Arc::new(SendQueue::new(256));
        let retransmission = Arc::new(RetransmissionQueue::new());
        let events = Arc::new(EventSink::new());

        let discovery_io = ChannelIo::new(ids::DISCOVERY, connection.clone(), send_queue.clone(), retransmission.clone());
        let discovery = DiscoveryChannel::new(discovery_io, connection.clone(), events.clone());

        let control_io = ChannelIo::new(ids::CONTROL, connection.clone(), send_queue.clone(), retransmission.clone());
        let control = ControlChannel::new(control_io, info.session_key.clone(), info.steam_id, config, events.clone());

        Self {
            connection,
            send_queue,
            retransmission,
            events,
            discovery,
            control,
            audio: None,
            video: None,
            hid: HidManager::new(hid_providers),
            timers: TimerWheel::new(),
            callbacks,
            client_config,
            key: info.session_key,
            steam_id: info.steam_id,
        }
    }

    /// This session's configured client identity.
    #[must_use]
    pub fn client_config(&self) -> &ClientConfig {
        &self.client_config
    }

    /// Shared outbound packet queue; `ihs-client`'s send thread drains it.
    #[must_use]
    pub fn send_queue(&self) -> Arc<SendQueue> {
        self.send_queue.clone()
    }

    /// Shared timed-retransmission manager; `ihs-client`'s send thread
    /// ticks it on the same cadence as the send queue flush.
    #[must_use]
    pub fn retransmission(&self) -> Arc<RetransmissionQueue> {
        self.retransmission.clone()
    }

    /// Shared connection-identity state, for stamping `src_connection_id`
    /// once `ihs-client` assigns one locally (spec.md §3 "Session").
    #[must_use]
    pub fn connection(&self) -> Arc<ConnectionState> {
        self.connection.clone()
    }

    /// The audio data channel's waker, once it's been spawned by
    /// `StartAudioData`. `None` before that or after `StopAudioData`.
    #[must_use]
    pub fn audio_waker(&self) -> Option<Arc<DataChannelWaker>> {
        self.audio.as_ref().map(AudioDataChannel::waker)
    }

    /// The video data channel's waker, once it's been spawned by
    /// `StartVideoData`. `None` before that or after `StopVideoData`.
    #[must_use]
    pub fn video_waker(&self) -> Option<Arc<DataChannelWaker>> {
        self.video.as_ref().map(VideoDataChannel::waker)
    }

    /// Drive the audio channel's own worker-loop body, if one is running.
    pub fn process_audio_frames(&mut self) {
        if let Some(audio) = &mut self.audio {
            audio.process_ready_frames();
        }
    }

    /// Drive the video channel's own worker-loop body, if one is running.
    pub fn process_video_frames(&mut self) {
        if let Some(video) = &mut self.video {
            video.process_ready_frames();
        }
    }

    /// Start the connect handshake: send the discovery channel's `Connect`
    /// packet (spec.md §3 "Lifecycle").
    pub fn connect(&mut self) {
        self.callbacks.session.connecting();
        self.discovery.send_connect();
    }

    /// Begin graceful teardown: send `Disconnect` and stop every running
    /// data channel (spec.md §3 "Lifecycle").
    pub fn disconnect(&mut self) {
        self.discovery.send_disconnect();
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(mut audio) = self.audio.take() {
            audio.stopped();
        }
        if let Some(mut video) = self.video.take() {
            video.stopped();
        }
        self.timers.cancel(KEEP_ALIVE_TIMER);
        self.callbacks.session.disconnected();
    }

    /// Notify the session-lifecycle callback that every worker thread has
    /// joined and this session object is about to be dropped (spec.md §3
    /// "Lifecycle": "`destroy` joins threads and frees all owned
    /// resources"). `ihs-client` calls this once its own threads
    /// (receive, send, data-channel workers) have all returned.
    pub fn finalize(&mut self) {
        self.callbacks.session.finalized();
    }

    /// Route an inbound packet to its addressed channel, then drain and
    /// react to any events the dispatch produced.
    pub fn dispatch(&mut self, packet: Packet) {
        match packet.header.channel_id() {
            ids::DISCOVERY => self.discovery.received(packet),
            ids::CONTROL => self.control.received(packet),
            channel_id if self.audio.as_ref().is_some_and(|audio| audio.channel_id() == channel_id) => {
                #[allow(clippy::unwrap_used)]
                self.audio.as_mut().unwrap().received(packet);
            }
            channel_id if self.video.as_ref().is_some_and(|video| video.channel_id() == channel_id) => {
                #[allow(clippy::unwrap_used)]
                self.video.as_mut().unwrap().received(packet);
            }
            other => debug!(channel_id = other, "packet for unknown channel; dropping"),
        }
        self.drain_events();
    }

    /// Advance the keep-alive timer, firing it if the 10 s interval has
    /// elapsed. Called from `ihs-client`'s send-thread loop alongside the
    /// send queue flush (spec.md §5).
    pub fn tick_timers(&mut self, now: Instant) {
        for timer in self.timers.tick(now) {
            if timer == KEEP_ALIVE_TIMER {
                self.control.send_keep_alive();
            }
        }
    }

    fn drain_events(&mut self) {
        for event in self.events.drain() {
            self.handle_event(event);
        }
    }

    fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::ConnectAckReceived => self.control.start_handshake(),
            SessionEvent::ServerHandshakeReceived { mtu } => self.connection.set_mtu(mtu),
            SessionEvent::NegotiationComplete => {
                self.timers.register(KEEP_ALIVE_TIMER, KEEP_ALIVE_INTERVAL, Instant::now());
                self.callbacks.session.connected();
            }
            SessionEvent::StartAudioData(start) => self.spawn_audio(&start),
            SessionEvent::StartVideoData(start) => self.spawn_video(&start),
            SessionEvent::StopAudioData => {
                if let Some(mut audio) = self.audio.take() {
                    audio.stopped();
                }
            }
            SessionEvent::StopVideoData => {
                if let Some(mut video) = self.video.take() {
                    video.stopped();
                }
            }
            SessionEvent::SetCursor { cursor_id } => {
                if !self.callbacks.input.set_cursor(cursor_id) {
                    self.control.send_get_cursor_image(cursor_id);
                }
            }
            SessionEvent::DeleteCursor { cursor_id } => {
                self.callbacks.input.delete_cursor(cursor_id);
            }
            SessionEvent::CursorImage(image) => self.callbacks.input.cursor_image(&image),
            SessionEvent::ShowCursor { x, y } => self.callbacks.input.show_cursor(x, y),
            SessionEvent::HideCursor => self.callbacks.input.hide_cursor(),
            SessionEvent::RemoteHidFromHost(message) => self.handle_remote_hid(&message),
            SessionEvent::Disconnected => self.teardown(),
        }
    }

    fn spawn_audio(&mut self, start: &ihs_proto::control::StartAudioData) {
        #[allow(clippy::cast_possible_truncation)]
        let channel_id = start.channel_id as u8;
        let io = ChannelIo::new(channel_id, self.connection.clone(), self.send_queue.clone(), self.retransmission.clone());
        self.audio = Some(AudioDataChannel::new(io, start, self.callbacks.audio.clone()));
    }

    fn spawn_video(&mut self, start: &ihs_proto::control::StartVideoData) {
        #[allow(clippy::cast_possible_truncation)]
        let channel_id = start.channel_id as u8;
        let io = ChannelIo::new(channel_id, self.connection.clone(), self.send_queue.clone(), self.retransmission.clone());
        self.video = Some(VideoDataChannel::new(io, start, self.key.clone(), self.callbacks.video.clone()));
    }

    fn handle_remote_hid(&mut self, message: &HidMessageToRemote) {
        let Some(kind) = &message.kind else {
            debug!("RemoteHid envelope carried no kind; dropping");
            return;
        };
        let response = match kind {
            ToRemoteKind::Open(open) => {
                self.hid.open(&open.path);
                Some(FromRemoteKind::DeviceList(self.hid.device_list_update()))
            }
            ToRemoteKind::Close(close) => {
                let ok = self.hid.close(close.device_id);
                Some(FromRemoteKind::CloseResult(ihs_proto::pb::hid::CloseDeviceResult {
                    device_id: close.device_id,
                    ok,
                }))
            }
            ToRemoteKind::Write(write) => {
                let result = self.hid.write(write.device_id, &write.data);
                self.warn_on_hid_failure(write.device_id, "write", result);
                None
            }
            ToRemoteKind::Read(read) => {
                let timeout = std::time::Duration::from_millis(u64::from(read.timeout_ms));
                let result = self.hid.read(read.device_id, read.length as usize, timeout);
                self.hid_response(read.device_id, result)
            }
            ToRemoteKind::GetFeature(get) => {
                #[allow(clippy::cast_possible_truncation)]
                let report_number = get.report_number as u8;
                let result = self.hid.get_feature_report(get.device_id, report_number, get.length as usize);
                self.hid_response(get.device_id, result)
            }
            ToRemoteKind::SendFeature(send) => {
                let result = self.hid.send_feature_report(send.device_id, &send.data);
                self.warn_on_hid_failure(send.device_id, "send_feature_report", result);
                None
            }
            ToRemoteKind::StartInput(start) => {
                let result = self.hid.start_input_reports(start.device_id, start.length as usize);
                self.warn_on_hid_failure(start.device_id, "start_input_reports", result);
                None
            }
            ToRemoteKind::Disconnect(disconnect) => {
                let result =
                    self.hid.request_disconnect(disconnect.device_id, disconnect.method, &disconnect.data);
                self.warn_on_hid_failure(disconnect.device_id, "request_disconnect", result);
                None
            }
        };
        if let Some(kind) = response {
            self.control.send_remote_hid(&HidMessageFromRemote { kind: Some(kind) });
        }
    }

    fn warn_on_hid_failure(&self, device_id: u32, op: &'static str, result: Option<crate::hid::Result<()>>) {
        match result {
            Some(Err(err)) => warn!(device_id, op, error = %err.0, "hid operation failed"),
            Some(Ok(())) => {}
            None => warn!(device_id, op, "hid operation for unknown device"),
        }
    }

    fn hid_response(&self, device_id: u32, result: Option<crate::hid::Result<Vec<u8>>>) -> Option<FromRemoteKind> {
        match result {
            Some(Ok(data)) => Some(FromRemoteKind::Response(ihs_proto::pb::hid::RequestResponse {
                device_id,
                request_id: 0,
                data,
            })),
            Some(Err(err)) => {
                warn!(device_id, error = %err.0, "hid request failed");
                None
            }
            None => {
                warn!(device_id, "hid request for unknown device");
                None
            }
        }
    }
}
