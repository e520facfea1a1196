//! Control-channel message framing: `[1-byte EStreamControlMessage][body]`.
//!
//! `ClientHandshake`, `ServerHandshake`, `AuthenticationRequest` and
//! `AuthenticationResponse` travel in plaintext; every other message is
//! encrypted per the frame-encryption scheme in `ihs-crypto` before it
//! reaches this layer (this module only knows about the inner protobuf
//! body, not the encryption wrapper).

use bytes::{Bytes, BytesMut};
use prost::Message;

use crate::{
    errors::{ProtocolError, Result},
    pb::control as pb,
};

/// The one-byte control-message type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EStreamControlMessage {
    /// Client -> host, opens the handshake.
    ClientHandshake = 0,
    /// Host -> client, carries the negotiated MTU.
    ServerHandshake = 1,
    /// Client -> host, carries the HMAC-SHA-256 token.
    AuthenticationRequest = 2,
    /// Host -> client, carries the auth result.
    AuthenticationResponse = 3,
    /// Host -> client, offers codec options.
    NegotiationInit = 4,
    /// Client -> host, selects codecs and capabilities.
    NegotiationSetConfig = 5,
    /// Host -> client, negotiation finished.
    NegotiationComplete = 6,
    /// Either direction, empty keep-alive ping.
    KeepAlive = 7,
    /// Host -> client, spawn an audio data channel.
    StartAudioData = 8,
    /// Host -> client, spawn a video data channel.
    StartVideoData = 9,
    /// Host -> client, tear down the audio data channel.
    StopAudioData = 10,
    /// Host -> client, tear down the video data channel.
    StopVideoData = 11,
    /// Host -> client, select a cursor by id.
    SetCursor = 12,
    /// Host -> client, forget a cursor id.
    DeleteCursor = 13,
    /// Host -> client, cursor pixel data.
    SetCursorImage = 14,
    /// Host -> client, reveal the cursor at a position.
    ShowCursor = 15,
    /// Host -> client, hide the cursor.
    HideCursor = 16,
    /// Client -> host, mouse motion (absolute or relative).
    MouseMotion = 17,
    /// Client -> host, mouse button press/release.
    MouseButton = 18,
    /// Client -> host, scroll wheel.
    MouseWheel = 19,
    /// Client -> host, keyboard scan code.
    Keyboard = 20,
    /// Client -> host, touch event.
    Touch = 21,
    /// Either direction, HID relay envelope.
    RemoteHid = 22,
    /// Client -> host, requests pixel data for an unknown cursor id.
    GetCursorImage = 23,
}

impl EStreamControlMessage {
    /// Whether this message type travels in plaintext (spec.md §4.6).
    #[must_use]
    pub fn is_plaintext(self) -> bool {
        matches!(
            self,
            Self::ClientHandshake
                | Self::ServerHandshake
                | Self::AuthenticationRequest
                | Self::AuthenticationResponse
        )
    }

    fn from_u8(value: u8) -> Result<Self> {
        Ok(match value {
            0 => Self::ClientHandshake,
            1 => Self::ServerHandshake,
            2 => Self::AuthenticationRequest,
            3 => Self::AuthenticationResponse,
            4 => Self::NegotiationInit,
            5 => Self::NegotiationSetConfig,
            6 => Self::NegotiationComplete,
            7 => Self::KeepAlive,
            8 => Self::StartAudioData,
            9 => Self::StartVideoData,
            10 => Self::StopAudioData,
            11 => Self::StopVideoData,
            12 => Self::SetCursor,
            13 => Self::DeleteCursor,
            14 => Self::SetCursorImage,
            15 => Self::ShowCursor,
            16 => Self::HideCursor,
            17 => Self::MouseMotion,
            18 => Self::MouseButton,
            19 => Self::MouseWheel,
            20 => Self::Keyboard,
            21 => Self::Touch,
            22 => Self::RemoteHid,
            23 => Self::GetCursorImage,
            other => return Err(ProtocolError::UnknownMessageType(other)),
        })
    }
}

/// A decoded control message: the type tag plus its protobuf body, still
/// encoded (callers that care about a specific variant decode the body
/// themselves via the `pb::control` types — this enum exists to let the
/// dispatcher route on type without re-parsing the tag byte).
#[derive(Debug, Clone, PartialEq)]
pub struct ControlMessage {
    /// Message-type tag.
    pub message_type: EStreamControlMessage,
    /// Encoded protobuf body (or empty, for zero-field messages).
    pub body: Bytes,
}

impl ControlMessage {
    /// Build a message from a tag and a `prost` message, encoding the body.
    #[must_use]
    pub fn encode(message_type: EStreamControlMessage, body: &impl Message) -> Self {
        Self { message_type, body: body.encode_to_vec().into() }
    }

    /// Parse `[1-byte tag][body]` into a tag and the raw body bytes.
    pub fn parse(frame_body: &[u8]) -> Result<Self> {
        let [tag, rest @ ..] = frame_body else {
            return Err(ProtocolError::SubHeaderTruncated { expected: 1, actual: 0 });
        };
        let message_type = EStreamControlMessage::from_u8(*tag)?;
        Ok(Self { message_type, body: Bytes::copy_from_slice(rest) })
    }

    /// Serialize back to `[1-byte tag][body]`.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + self.body.len());
        buf.extend_from_slice(&[self.message_type as u8]);
        buf.extend_from_slice(&self.body);
        buf.freeze()
    }

    /// Decode the body as a specific `prost` message type.
    pub fn decode_as<T: Message + Default>(&self, context: &'static str) -> Result<T> {
        T::decode(&self.body[..])
            .map_err(|err| ProtocolError::MalformedPayload { context, source: err.to_string() })
    }
}

/// Convenience re-exports of the generated protobuf types, so callers don't
/// need to spell out `ihs_proto::pb::control::Foo` everywhere.
pub use pb::{
    AuthenticationRequest, AuthenticationResponse, ClientCapabilities, ClientHandshake,
    DeltaPosition, EAudioCodec, EAuthResult, EMouseButton, ETouchPhase, EVideoCodec,
    EWheelDirection, GetCursorImage, HideCursor, KeepAlive, KeyboardEvent, MouseButtonEvent,
    MouseMotion, MouseWheelEvent, NegotiationComplete, NegotiationInit, NegotiationSetConfig,
    NormalizedPosition, RemoteHid, ServerHandshake, SetCursor, SetCursorImage, ShowCursor,
    StartAudioData, StartVideoData, StopAudioData, StopVideoData, TouchEvent, VideoMode,
};
pub use pb::mouse_motion::Position as MouseMotionPosition;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plaintext_classification_matches_spec() {
        assert!(EStreamControlMessage::ClientHandshake.is_plaintext());
        assert!(EStreamControlMessage::ServerHandshake.is_plaintext());
        assert!(EStreamControlMessage::AuthenticationRequest.is_plaintext());
        assert!(EStreamControlMessage::AuthenticationResponse.is_plaintext());
        assert!(!EStreamControlMessage::NegotiationInit.is_plaintext());
        assert!(!EStreamControlMessage::KeepAlive.is_plaintext());
        assert!(!EStreamControlMessage::RemoteHid.is_plaintext());
    }

    #[test]
    fn round_trips_through_tag_and_protobuf_body() {
        let auth = AuthenticationRequest { token: vec![1, 2, 3], version: 1, steam_id: 42 };
        let message = ControlMessage::encode(EStreamControlMessage::AuthenticationRequest, &auth);
        let wire = message.to_bytes();

        let parsed = ControlMessage::parse(&wire).expect("should parse");
        assert_eq!(parsed.message_type, EStreamControlMessage::AuthenticationRequest);

        let decoded: AuthenticationRequest =
            parsed.decode_as("AuthenticationRequest").expect("should decode");
        assert_eq!(decoded, auth);
    }

    #[test]
    fn empty_body_roundtrips() {
        let message = ControlMessage::encode(EStreamControlMessage::KeepAlive, &KeepAlive {});
        let wire = message.to_bytes();
        assert_eq!(wire.len(), 1);
        let parsed = ControlMessage::parse(&wire).expect("should parse");
        assert_eq!(parsed.message_type, EStreamControlMessage::KeepAlive);
    }

    #[test]
    fn rejects_unknown_tag() {
        let result = ControlMessage::parse(&[200]);
        assert_eq!(result, Err(ProtocolError::UnknownMessageType(200)));
    }
}
