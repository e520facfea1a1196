//! The control channel (id 1): handshake, authentication, codec
//! negotiation, keep-alive, cursor relay, outbound input, and the HID
//! relay envelope (spec.md §4.6).

use std::sync::Arc;

use ihs_crypto::{DecryptOutcome, SessionKey, authentication_token};
use ihs_proto::{
    Packet, PacketType,
    control::{
        AuthenticationRequest, AuthenticationResponse, ClientCapabilities, ClientHandshake,
        ControlMessage, DeltaPosition, EAudioCodec, EAuthResult, EMouseButton,
        EStreamControlMessage, ETouchPhase, EVideoCodec, EWheelDirection, GetCursorImage,
        KeepAlive, KeyboardEvent, MouseButtonEvent, MouseMotion, MouseMotionPosition,
        MouseWheelEvent, NegotiationComplete, NegotiationInit, NegotiationSetConfig,
        NormalizedPosition, RemoteHid, ServerHandshake, SetCursor, StartAudioData, StartVideoData,
        TouchEvent,
    },
    pb::hid::{HidMessageFromRemote, HidMessageToRemote},
};
use prost::Message as _;
use tracing::{debug, error, warn};

use crate::{
    channel::{Channel, ChannelIo, handle_ack_or_nack, ids},
    config::SessionConfig,
    events::{EventSink, SessionEvent},
    window::ReassemblyWindow,
};

/// Reassembly window capacity for the control channel (spec.md §4.6).
const CONTROL_WINDOW_CAPACITY: usize = 128;

/// Protocol version sent in `AuthenticationRequest`.
const PROTOCOL_VERSION: u32 = 1;

/// Control-channel state machine states (spec.md §4.6 "happy path").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    /// Nothing sent yet; waiting for the discovery channel's `ConnectAck`.
    Idle,
    /// `ClientHandshake` sent; waiting for `ServerHandshake`.
    AwaitingServerHandshake,
    /// `AuthenticationRequest` sent; waiting for the result.
    AwaitingAuthResponse,
    /// Authenticated; waiting for `NegotiationInit`.
    AwaitingNegotiationInit,
    /// `NegotiationSetConfig` sent; waiting for `NegotiationComplete`.
    AwaitingNegotiationComplete,
    /// Negotiation finished; keep-alive running, steady-state traffic flows.
    SteadyState,
}

/// The control channel.
pub struct ControlChannel {
    io: ChannelIo,
    window: ReassemblyWindow,
    key: SessionKey,
    steam_id: u64,
    encrypt_sequence: u64,
    decrypt_sequence: u64,
    state: ControlState,
    config: SessionConfig,
    events: Arc<EventSink>,
}

impl ControlChannel {
    /// Build the control channel. `config` is the negotiable session
    /// configuration, already adjusted by the user's `configuring`
    /// callback (spec.md §6).
    #[must_use]
    pub fn new(io: ChannelIo, key: SessionKey, steam_id: u64, config: SessionConfig, events: Arc<EventSink>) -> Self {
        debug_assert_eq!(io.channel_id(), ids::CONTROL);
        Self {
            io,
            window: ReassemblyWindow::new(CONTROL_WINDOW_CAPACITY),
            key,
            steam_id,
            encrypt_sequence: 0,
            decrypt_sequence: 0,
            state: ControlState::Idle,
            config,
            events,
        }
    }

    /// Current state-machine state.
    #[must_use]
    pub fn state(&self) -> ControlState {
        self.state
    }

    /// Start the handshake: sent once the discovery channel observes
    /// `ConnectAck` (spec.md §4.6).
    pub fn start_handshake(&mut self) {
        debug_assert_eq!(self.state, ControlState::Idle);
        self.send_plaintext(EStreamControlMessage::ClientHandshake, &ClientHandshake {});
        self.state = ControlState::AwaitingServerHandshake;
    }

    fn send_plaintext(&self, message_type: EStreamControlMessage, body: &impl prost::Message) {
        debug_assert!(message_type.is_plaintext());
        let message = ControlMessage::encode(message_type, body);
        self.io.send_frame(PacketType::Reliable, false, message.to_bytes());
    }

    fn send_encrypted(&mut self, message_type: EStreamControlMessage, body: &impl prost::Message) {
        debug_assert!(!message_type.is_plaintext());
        let plaintext = body.encode_to_vec();
        let ciphertext = ihs_crypto::frame::encrypt(&self.key, &plaintext, self.encrypt_sequence);
        self.encrypt_sequence += 1;
        let message = ControlMessage { message_type, body: ciphertext.into() };
        self.io.send_frame(PacketType::Reliable, false, message.to_bytes());
    }

    /// Send the 10-unit-interval empty `KeepAlive` control message
    /// (spec.md §4.6, steady state only).
    pub fn send_keep_alive(&mut self) {
        if self.state != ControlState::SteadyState {
            return;
        }
        self.send_encrypted(EStreamControlMessage::KeepAlive, &KeepAlive {});
    }

    /// Request pixel data for a cursor the input callback didn't recognize
    /// (spec.md §4.6 "Cursor").
    pub fn send_get_cursor_image(&mut self, cursor_id: u64) {
        self.send_encrypted(EStreamControlMessage::GetCursorImage, &GetCursorImage { cursor_id });
    }

    /// Send absolute (normalized) mouse motion.
    pub fn send_mouse_motion_absolute(&mut self, x: f32, y: f32) {
        let message =
            MouseMotion { position: Some(MouseMotionPosition::Absolute(NormalizedPosition { x, y })) };
        self.send_encrypted(EStreamControlMessage::MouseMotion, &message);
    }

    /// Send relative mouse motion.
    pub fn send_mouse_motion_relative(&mut self, dx: i32, dy: i32) {
        let message = MouseMotion { position: Some(MouseMotionPosition::Relative(DeltaPosition { dx, dy })) };
        self.send_encrypted(EStreamControlMessage::MouseMotion, &message);
    }

    /// Send a mouse button press/release.
    pub fn send_mouse_button(&mut self, button: EMouseButton, pressed: bool) {
        let message = MouseButtonEvent { button: button.into(), pressed };
        self.send_encrypted(EStreamControlMessage::MouseButton, &message);
    }

    /// Send a scroll-wheel event.
    pub fn send_mouse_wheel(&mut self, direction: EWheelDirection, amount: i32) {
        let message = MouseWheelEvent { direction: direction.into(), amount };
        self.send_encrypted(EStreamControlMessage::MouseWheel, &message);
    }

    /// Send a keyboard scan-code event.
    pub fn send_keyboard(&mut self, scan_code: u32, pressed: bool) {
        let message = KeyboardEvent { scan_code, pressed };
        self.send_encrypted(EStreamControlMessage::Keyboard, &message);
    }

    /// Send a touch event.
    pub fn send_touch(&mut self, finger_id: u32, phase: ETouchPhase, x: f32, y: f32) {
        let message = TouchEvent { finger_id, phase: phase.into(), x, y };
        self.send_encrypted(EStreamControlMessage::Touch, &message);
    }

    /// Relay an outbound HID message to the host, wrapped in `RemoteHid`.
    pub fn send_remote_hid(&mut self, message: &HidMessageFromRemote) {
        let payload = message.encode_to_vec();
        self.send_encrypted(EStreamControlMessage::RemoteHid, &RemoteHid { payload });
    }

    fn handle_frame(&mut self, frame: ihs_proto::Frame) {
        let head_type = frame.header.packet_type();
        if head_type.is_reliable() {
            self.io.send_ack(PacketType::Ack, frame.header.packet_id());
        }
        let control_message = match ControlMessage::parse(&frame.body) {
            Ok(message) => message,
            Err(err) => {
                debug!(error = %err, "malformed control frame body; dropping");
                return;
            }
        };
        if control_message.message_type.is_plaintext() {
            self.dispatch(control_message.message_type, &control_message.body);
            return;
        }
        match ihs_crypto::frame::decrypt(&self.key, &control_message.body, self.decrypt_sequence) {
            Ok(DecryptOutcome::Ok { plaintext }) => {
                self.decrypt_sequence += 1;
                self.dispatch(control_message.message_type, &plaintext);
            }
            Ok(DecryptOutcome::SequenceJump { plaintext, actual }) => {
                warn!(expected = self.decrypt_sequence, actual, "control sequence jump");
                self.decrypt_sequence = actual + 1;
                self.dispatch(control_message.message_type, &plaintext);
            }
            Ok(DecryptOutcome::OldSequence { actual }) => {
                debug!(expected = self.decrypt_sequence, actual, "dropping old control sequence");
            }
            Ok(DecryptOutcome::HashMismatch) => {
                warn!("control frame HMAC mismatch; dropping");
            }
            Err(err) => {
                debug!(error = %err, "control frame decrypt error; dropping");
            }
        }
    }

    fn dispatch(&mut self, message_type: EStreamControlMessage, body: &[u8]) {
        match message_type {
            EStreamControlMessage::ServerHandshake => self.handle_server_handshake(body),
            EStreamControlMessage::AuthenticationResponse => self.handle_auth_response(body),
            EStreamControlMessage::NegotiationInit => self.handle_negotiation_init(body),
            EStreamControlMessage::NegotiationComplete => self.handle_negotiation_complete(),
            EStreamControlMessage::KeepAlive => debug!("keep-alive received"),
            EStreamControlMessage::StartAudioData => self.handle_start_audio(body),
            EStreamControlMessage::StartVideoData => self.handle_start_video(body),
            EStreamControlMessage::StopAudioData => self.events.push(SessionEvent::StopAudioData),
            EStreamControlMessage::StopVideoData => self.events.push(SessionEvent::StopVideoData),
            EStreamControlMessage::SetCursor => self.handle_set_cursor(body),
            EStreamControlMessage::DeleteCursor => self.handle_delete_cursor(body),
            EStreamControlMessage::SetCursorImage => self.handle_set_cursor_image(body),
            EStreamControlMessage::ShowCursor => self.handle_show_cursor(body),
            EStreamControlMessage::HideCursor => self.events.push(SessionEvent::HideCursor),
            EStreamControlMessage::RemoteHid => self.handle_remote_hid(body),
            other => warn!(?other, "unexpected control message for this state"),
        }
    }

    fn decode<T: prost::Message + Default>(body: &[u8], context: &'static str) -> Option<T> {
        T::decode(body)
            .inspect_err(|err| debug!(error = %err, context, "malformed control payload"))
            .ok()
    }

    fn handle_server_handshake(&mut self, body: &[u8]) {
        if self.state != ControlState::AwaitingServerHandshake {
            warn!(?self.state, "unexpected ServerHandshake");
            return;
        }
        let Some(handshake) = Self::decode::<ServerHandshake>(body, "ServerHandshake") else { return };
        #[allow(clippy::cast_possible_truncation)]
        let mtu = handshake.mtu as u16;
        self.events.push(SessionEvent::ServerHandshakeReceived { mtu });

        let token = authentication_token(&self.key).to_vec();
        self.send_plaintext(
            EStreamControlMessage::AuthenticationRequest,
            &AuthenticationRequest { token, version: PROTOCOL_VERSION, steam_id: self.steam_id },
        );
        self.state = ControlState::AwaitingAuthResponse;
    }

    fn handle_auth_response(&mut self, body: &[u8]) {
        if self.state != ControlState::AwaitingAuthResponse {
            warn!(?self.state, "unexpected AuthenticationResponse");
            return;
        }
        let Some(response) = Self::decode::<AuthenticationResponse>(body, "AuthenticationResponse") else {
            return;
        };
        if response.result() == EAuthResult::AuthSucceeded {
            self.state = ControlState::AwaitingNegotiationInit;
        } else {
            error!(result = ?response.result(), "authentication failed; session will not proceed");
        }
    }

    fn handle_negotiation_init(&mut self, body: &[u8]) {
        if self.state != ControlState::AwaitingNegotiationInit {
            warn!(?self.state, "unexpected NegotiationInit");
            return;
        }
        let Some(init) = Self::decode::<NegotiationInit>(body, "NegotiationInit") else { return };

        let offers_audio = |codec: EAudioCodec| init.supported_audio_codecs.contains(&(codec as i32));
        let offers_video = |codec: EVideoCodec| init.supported_video_codecs.contains(&(codec as i32));

        let audio_codec = if self.config.enable_audio && offers_audio(EAudioCodec::AudioCodecOpus) {
            EAudioCodec::AudioCodecOpus
        } else {
            EAudioCodec::AudioCodecUnknown
        };

        let video_codec = if self.config.enable_hevc && offers_video(EVideoCodec::VideoCodecHevc) {
            EVideoCodec::VideoCodecHevc
        } else if offers_video(EVideoCodec::VideoCodecH264) {
            EVideoCodec::VideoCodecH264
        } else {
            EVideoCodec::VideoCodecUnknown
        };

        let set_config = NegotiationSetConfig {
            audio_codec: audio_codec.into(),
            video_codec: video_codec.into(),
            video_modes: Vec::new(),
            capabilities: Some(ClientCapabilities {
                tv_form_factor: self.config.tv_form_factor,
                supports_suspend: true,
                hardware_decoding: true,
            }),
        };
        self.send_encrypted(EStreamControlMessage::NegotiationSetConfig, &set_config);
        self.state = ControlState::AwaitingNegotiationComplete;
    }

    fn handle_negotiation_complete(&mut self) {
        if self.state != ControlState::AwaitingNegotiationComplete {
            warn!(?self.state, "unexpected NegotiationComplete");
            return;
        }
        self.state = ControlState::SteadyState;
        self.events.push(SessionEvent::NegotiationComplete);
    }

    fn handle_start_audio(&mut self, body: &[u8]) {
        let Some(message) = Self::decode::<StartAudioData>(body, "StartAudioData") else { return };
        self.events.push(SessionEvent::StartAudioData(message));
    }

    fn handle_start_video(&mut self, body: &[u8]) {
        let Some(message) = Self::decode::<StartVideoData>(body, "StartVideoData") else { return };
        self.events.push(SessionEvent::StartVideoData(message));
    }

    fn handle_set_cursor(&mut self, body: &[u8]) {
        let Some(message) = Self::decode::<SetCursor>(body, "SetCursor") else { return };
        self.events.push(SessionEvent::SetCursor { cursor_id: message.cursor_id });
    }

    fn handle_delete_cursor(&mut self, body: &[u8]) {
        let Some(message) = Self::decode::<ihs_proto::control::DeleteCursor>(body, "DeleteCursor") else {
            return;
        };
        self.events.push(SessionEvent::DeleteCursor { cursor_id: message.cursor_id });
    }

    fn handle_set_cursor_image(&mut self, body: &[u8]) {
        let Some(message) = Self::decode::<ihs_proto::control::SetCursorImage>(body, "SetCursorImage") else {
            return;
        };
        self.events.push(SessionEvent::CursorImage(message));
    }

    fn handle_show_cursor(&mut self, body: &[u8]) {
        let Some(message) = Self::decode::<ihs_proto::control::ShowCursor>(body, "ShowCursor") else {
            return;
        };
        self.events.push(SessionEvent::ShowCursor { x: message.x, y: message.y });
    }

    fn handle_remote_hid(&mut self, body: &[u8]) {
        let Some(envelope) = Self::decode::<RemoteHid>(body, "RemoteHid") else { return };
        let Some(message) = Self::decode::<HidMessageToRemote>(&envelope.payload, "HidMessageToRemote") else {
            return;
        };
        self.events.push(SessionEvent::RemoteHidFromHost(message));
    }
}

impl Channel for ControlChannel {
    fn channel_id(&self) -> u8 {
        ids::CONTROL
    }

    fn received(&mut self, packet: Packet) {
        if handle_ack_or_nack(&self.io, &packet) {
            return;
        }
        match self.window.add(packet) {
            Ok(_) => {}
            Err(overflow) => {
                error!(?overflow, "control reassembly window overflow; session must disconnect");
                return;
            }
        }
        while let Some(frame) = self.window.poll() {
            self.handle_frame(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ihs_proto::PacketHeader;

    use super::*;
    use crate::{connection::ConnectionState, retransmission::RetransmissionQueue, send_queue::SendQueue};

    fn channel() -> (ControlChannel, Arc<SendQueue>, Arc<EventSink>) {
        let connection = Arc::new(ConnectionState::new());
        let send_queue = Arc::new(SendQueue::new(64));
        let retransmission = Arc::new(RetransmissionQueue::new());
        let events = Arc::new(EventSink::new());
        let io = ChannelIo::new(ids::CONTROL, connection, send_queue.clone(), retransmission);
        let key = SessionKey::new(vec![0x42u8; 16]).expect("valid key");
        let channel = ControlChannel::new(io, key, 999, SessionConfig::default(), events.clone());
        (channel, send_queue, events)
    }

    fn frame_packet(body: impl Into<bytes::Bytes>) -> Packet {
        Packet {
            header: PacketHeader::new(PacketType::Reliable, false, 0, 0, ids::CONTROL, 0, 0, 0),
            body: body.into(),
        }
    }

    #[test]
    fn start_handshake_sends_plaintext_client_handshake() {
        let (mut channel, send_queue, _events) = channel();
        channel.start_handshake();
        assert_eq!(channel.state(), ControlState::AwaitingServerHandshake);
        assert_eq!(send_queue.len(), 1);
    }

    #[test]
    fn server_handshake_triggers_authentication_request() {
        let (mut channel, send_queue, events) = channel();
        channel.start_handshake();
        send_queue.flush(std::time::Instant::now(), 0, |_| {});

        let handshake = ControlMessage::encode(
            EStreamControlMessage::ServerHandshake,
            &ServerHandshake { mtu: 1200 },
        );
        channel.received(frame_packet(handshake.to_bytes()));

        assert_eq!(channel.state(), ControlState::AwaitingAuthResponse);
        assert_eq!(send_queue.len(), 1);
        let drained = events.drain();
        assert!(matches!(drained[0], SessionEvent::ServerHandshakeReceived { mtu: 1200 }));
    }

    #[test]
    fn successful_authentication_advances_to_negotiation() {
        let (mut channel, _send_queue, _events) = channel();
        channel.state = ControlState::AwaitingAuthResponse;
        let response = ControlMessage::encode(
            EStreamControlMessage::AuthenticationResponse,
            &AuthenticationResponse { result: EAuthResult::AuthSucceeded.into() },
        );
        channel.received(frame_packet(response.to_bytes()));
        assert_eq!(channel.state(), ControlState::AwaitingNegotiationInit);
    }

    #[test]
    fn failed_authentication_does_not_advance() {
        let (mut channel, _send_queue, _events) = channel();
        channel.state = ControlState::AwaitingAuthResponse;
        let response = ControlMessage::encode(
            EStreamControlMessage::AuthenticationResponse,
            &AuthenticationResponse { result: EAuthResult::AuthDenied.into() },
        );
        channel.received(frame_packet(response.to_bytes()));
        assert_eq!(channel.state(), ControlState::AwaitingAuthResponse);
    }

    #[test]
    fn negotiation_init_selects_opus_and_h264() {
        let (mut channel, send_queue, _events) = channel();
        channel.state = ControlState::AwaitingNegotiationInit;
        let init = ControlMessage::encode(
            EStreamControlMessage::NegotiationInit,
            &NegotiationInit {
                supported_audio_codecs: vec![EAudioCodec::AudioCodecOpus.into()],
                supported_video_codecs: vec![EVideoCodec::VideoCodecH264.into()],
            },
        );
        channel.received(frame_packet(init.to_bytes()));
        assert_eq!(channel.state(), ControlState::AwaitingNegotiationComplete);
        assert_eq!(send_queue.len(), 1);
    }

    #[test]
    fn negotiation_complete_enters_steady_state_and_emits_event() {
        let (mut channel, _send_queue, events) = channel();
        channel.state = ControlState::AwaitingNegotiationComplete;
        let complete =
            ControlMessage::encode(EStreamControlMessage::NegotiationComplete, &NegotiationComplete {});
        channel.received(frame_packet(complete.to_bytes()));
        assert_eq!(channel.state(), ControlState::SteadyState);
        assert!(matches!(events.drain()[0], SessionEvent::NegotiationComplete));
    }

    #[test]
    fn keep_alive_is_a_noop_outside_steady_state() {
        let (mut channel, send_queue, _events) = channel();
        channel.send_keep_alive();
        assert!(send_queue.is_empty());
    }

    #[test]
    fn encrypted_messages_round_trip_through_the_real_cipher() {
        let (mut channel, send_queue, _events) = channel();
        channel.state = ControlState::SteadyState;
        channel.send_keep_alive();
        assert_eq!(send_queue.len(), 1);
    }

    #[test]
    fn set_cursor_emits_event() {
        let (mut channel, _send_queue, events) = channel();
        channel.state = ControlState::SteadyState;
        // Build an encrypted SetCursor as the host would send it.
        let plaintext = SetCursor { cursor_id: 77 }.encode_to_vec();
        let ciphertext = ihs_crypto::frame::encrypt(&channel.key, &plaintext, 0);
        let message = ControlMessage { message_type: EStreamControlMessage::SetCursor, body: ciphertext.into() };
        channel.received(frame_packet(message.to_bytes()));
        assert!(matches!(events.drain()[0], SessionEvent::SetCursor { cursor_id: 77 }));
    }
}
