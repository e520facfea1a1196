//! Data channels (audio, video): host-assigned ids starting at
//! [`crate::channel::ids::FIRST_DATA_CHANNEL`] (spec.md §4.7).
//!
//! Each data channel owns a 1024-slot reassembly window and is driven by a
//! dedicated worker thread in `ihs-client`: the thread waits on this
//! channel's [`DataChannelWaker`], and on wake calls
//! [`AudioDataChannel::process_ready_frames`] /
//! [`VideoDataChannel::process_ready_frames`], which discards stale
//! fragments, drains every complete frame off the window, and invokes the
//! user's audio/video callbacks. This crate only supplies the waker
//! primitive and the frame-processing logic; it never spawns the thread
//! itself.

use std::{
    sync::{Arc, Condvar, Mutex},
    time::{Duration, Instant},
};

use bytes::Bytes;
use ihs_crypto::SessionKey;
use ihs_proto::{
    Packet, PacketType,
    control::{StartAudioData, StartVideoData},
    data::{DataMessage, EStreamDataMessage},
    pb::data::{AudioConfig, FrameStatsListMsg},
    video::{VideoFrameFlags, VideoFrameHeader, apply_partial_transforms},
};
use prost::Message as _;
use tracing::{debug, warn};

use crate::{
    callbacks::{AudioCallbacks, VideoCallbacks},
    channel::{Channel, ChannelIo, handle_ack_or_nack},
    window::ReassemblyWindow,
};

/// Reassembly window capacity for audio/video data channels (spec.md §4.2).
const DATA_WINDOW_CAPACITY: usize = 1024;

/// `Discard` threshold a data channel's worker applies before each poll,
/// expressed in `send_timestamp` units (1 unit = 1/65536 s): 50 ms
/// (spec.md §4.7 "Discard(50 ms)").
const DISCARD_MAX_AGE_UNITS: u32 = (50 * 65536) / 1000;

/// How long the video reassembler waits after requesting a key frame
/// before re-requesting it (spec.md §4.7).
const KEY_FRAME_WAIT_TIMEOUT: Duration = Duration::from_millis(200);

/// Frame-stats reporting cadence (spec.md §4.7, cadence per SPEC_FULL.md §4.7).
const FRAME_STATS_INTERVAL: Duration = Duration::from_millis(1000);

/// Data-message tag this crate uses to carry an outbound `FrameStatsListMsg`
/// on the video data channel. Not specified exhaustively by spec.md (which
/// names the message but not its wire tag); chosen as the first `Other`
/// value distinct from `DataPacket=0`.
const FRAME_STATS_TAG: u8 = 1;

/// A condition variable a data channel's `received` signals and a worker
/// thread in `ihs-client` waits on (spec.md §4.7's "wait on a condition
/// variable; on wake, ... drain `Poll`").
#[derive(Default)]
pub struct DataChannelWaker {
    work: Mutex<bool>,
    ready: Condvar,
}

impl DataChannelWaker {
    /// A waker with no work pending.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag that work is available and wake one waiting thread.
    pub fn notify(&self) {
        #[allow(clippy::unwrap_used)]
        let mut work = self.work.lock().unwrap();
        *work = true;
        self.ready.notify_one();
    }

    /// Block until [`Self::notify`] is called, or `timeout` elapses,
    /// clearing the pending flag either way.
    pub fn wait(&self, timeout: Duration) {
        #[allow(clippy::unwrap_used)]
        let mut work = self.work.lock().unwrap();
        if !*work {
            #[allow(clippy::unwrap_used)]
            let (guard, _timeout_result) = self.ready.wait_timeout(work, timeout).unwrap();
            work = guard;
        }
        *work = false;
    }
}

fn ack_if_reliable(io: &ChannelIo, frame: &ihs_proto::Frame) {
    if frame.header.packet_type().is_reliable() {
        io.send_ack(PacketType::Ack, frame.header.packet_id());
    }
}

/// The audio data channel: delivers the negotiated [`AudioConfig`] once at
/// start, then each packet's payload to [`AudioCallbacks::received`].
pub struct AudioDataChannel {
    io: ChannelIo,
    window: ReassemblyWindow,
    waker: Arc<DataChannelWaker>,
    callbacks: Arc<Mutex<Box<dyn AudioCallbacks>>>,
}

impl AudioDataChannel {
    /// Build the channel and immediately deliver `AudioConfig` (derived
    /// from the host's `StartAudioData`) to the callback.
    #[must_use]
    pub fn new(
        io: ChannelIo,
        start: &StartAudioData,
        callbacks: Arc<Mutex<Box<dyn AudioCallbacks>>>,
    ) -> Self {
        let config = AudioConfig {
            channels: start.channels,
            frequency: start.frequency,
            codec: start.codec,
            codec_data: start.codec_data.clone(),
        };
        #[allow(clippy::unwrap_used)]
        callbacks.lock().unwrap().start(&config);
        Self {
            io,
            window: ReassemblyWindow::new(DATA_WINDOW_CAPACITY),
            waker: Arc::new(DataChannelWaker::new()),
            callbacks,
        }
    }

    /// The condition variable this channel's worker thread should wait on.
    #[must_use]
    pub fn waker(&self) -> Arc<DataChannelWaker> {
        self.waker.clone()
    }

    /// Discard stale fragments, then drain and dispatch every complete
    /// frame currently available (spec.md §4.7 worker-loop body).
    pub fn process_ready_frames(&mut self) {
        self.window.discard_older_than(DISCARD_MAX_AGE_UNITS);
        while let Some(frame) = self.window.poll() {
            ack_if_reliable(&self.io, &frame);
            match DataMessage::parse(&frame.body) {
                Ok(message) if message.message_type == EStreamDataMessage::DataPacket => {
                    #[allow(clippy::unwrap_used)]
                    self.callbacks.lock().unwrap().received(&message.payload);
                }
                Ok(_) => {}
                Err(err) => debug!(error = %err, "malformed audio data frame; dropping"),
            }
        }
    }
}

impl Channel for AudioDataChannel {
    fn channel_id(&self) -> u8 {
        self.io.channel_id()
    }

    fn received(&mut self, packet: Packet) {
        if handle_ack_or_nack(&self.io, &packet) {
            return;
        }
        if let Err(overflow) = self.window.add(packet) {
            warn!(?overflow, "audio reassembly window overflow; session must disconnect");
            return;
        }
        self.waker.notify();
    }

    fn stopped(&mut self) {
        #[allow(clippy::unwrap_used)]
        self.callbacks.lock().unwrap().stop();
    }
}

/// One still-pending partial video frame, sorted into
/// [`VideoReassembler::partials`] by `(sequence, reserved2)`.
struct Partial {
    header: VideoFrameHeader,
    payload: Bytes,
}

/// Reassembles video partials into complete frames, handling key-frame
/// resynchronization (spec.md §4.7 "Video reassembly").
struct VideoReassembler {
    partials: Vec<Partial>,
    expected_sequence: Option<u16>,
    reserved1_hi: u16,
    waiting_key_frame: Option<Instant>,
    output: Vec<u8>,
    frame_is_key: bool,
}

/// What [`VideoReassembler::ingest`] wants the channel to do next.
struct IngestOutcome {
    completed_frame: Option<(Vec<u8>, bool)>,
    request_key_frame: bool,
}

impl VideoReassembler {
    fn new() -> Self {
        Self {
            partials: Vec::new(),
            expected_sequence: None,
            reserved1_hi: 0,
            waiting_key_frame: None,
            output: Vec::new(),
            frame_is_key: false,
        }
    }

    fn ingest(&mut self, header: VideoFrameHeader, payload: Bytes, now: Instant) -> IngestOutcome {
        if header.flags.has(VideoFrameFlags::KEY_FRAME) {
            self.partials.clear();
            self.output.clear();
            self.reserved1_hi = 0;
            self.frame_is_key = false;
            self.expected_sequence = Some(header.sequence);
            self.waiting_key_frame = None;
        } else if self
            .waiting_key_frame
            .is_some_and(|since| now.duration_since(since) > KEY_FRAME_WAIT_TIMEOUT)
        {
            self.waiting_key_frame = Some(now);
            return IngestOutcome { completed_frame: None, request_key_frame: true };
        } else if self.expected_sequence != Some(header.sequence) {
            self.waiting_key_frame = Some(now);
            return IngestOutcome { completed_frame: None, request_key_frame: true };
        }

        self.expected_sequence = Some(header.sequence.wrapping_add(1));

        let insert_at = self
            .partials
            .partition_point(|p| (p.header.sequence, p.header.reserved2) < (header.sequence, header.reserved2));
        self.partials.insert(insert_at, Partial { header, payload });

        let mut consumed = 0;
        let mut finished = false;
        for partial in &self.partials {
            if partial.header.reserved2 != 0 && partial.header.reserved1 != self.reserved1_hi {
                break;
            }
            let transformed = apply_partial_transforms(partial.header.flags, &partial.payload);
            self.output.extend_from_slice(&transformed);
            if partial.header.flags.has(VideoFrameFlags::RESERVED1_INCREMENT) {
                self.reserved1_hi = self.reserved1_hi.wrapping_add(1);
            }
            if partial.header.flags.has(VideoFrameFlags::KEY_FRAME) {
                self.frame_is_key = true;
            }
            consumed += 1;
            if partial.header.flags.has(VideoFrameFlags::FRAME_FINISH) {
                finished = true;
                break;
            }
        }
        self.partials.drain(..consumed);

        if finished {
            let frame = std::mem::take(&mut self.output);
            let is_key = std::mem::take(&mut self.frame_is_key);
            return IngestOutcome { completed_frame: Some((frame, is_key)), request_key_frame: false };
        }
        IngestOutcome { completed_frame: None, request_key_frame: false }
    }
}

/// The video data channel: reassembles partials into complete frames and
/// submits them to [`VideoCallbacks::submit`].
pub struct VideoDataChannel {
    io: ChannelIo,
    window: ReassemblyWindow,
    waker: Arc<DataChannelWaker>,
    key: SessionKey,
    callbacks: Arc<Mutex<Box<dyn VideoCallbacks>>>,
    reassembler: VideoReassembler,
    frames_received: u32,
    frames_decoded: u32,
    frames_dropped: u32,
    last_stats_report: Instant,
}

impl VideoDataChannel {
    /// Build the channel and deliver the negotiated `StartVideoData` to the
    /// callback; a non-zero return is logged as a user-callback failure
    /// (spec.md §7).
    #[must_use]
    pub fn new(
        io: ChannelIo,
        start: &StartVideoData,
        key: SessionKey,
        callbacks: Arc<Mutex<Box<dyn VideoCallbacks>>>,
    ) -> Self {
        #[allow(clippy::unwrap_used)]
        let result = callbacks.lock().unwrap().start(start);
        if result != 0 {
            warn!(result, "video callback start() returned non-zero");
        }
        Self {
            io,
            window: ReassemblyWindow::new(DATA_WINDOW_CAPACITY),
            waker: Arc::new(DataChannelWaker::new()),
            key,
            callbacks,
            reassembler: VideoReassembler::new(),
            frames_received: 0,
            frames_decoded: 0,
            frames_dropped: 0,
            last_stats_report: Instant::now(),
        }
    }

    /// The condition variable this channel's worker thread should wait on.
    #[must_use]
    pub fn waker(&self) -> Arc<DataChannelWaker> {
        self.waker.clone()
    }

    /// Discard stale fragments, drain and reassemble every complete data
    /// frame, and report frame stats if the 1000 ms cadence has elapsed.
    pub fn process_ready_frames(&mut self) {
        self.window.discard_older_than(DISCARD_MAX_AGE_UNITS);
        while let Some(frame) = self.window.poll() {
            ack_if_reliable(&self.io, &frame);
            self.handle_data_frame(&frame.body);
        }
        self.maybe_report_stats();
    }

    fn handle_data_frame(&mut self, body: &[u8]) {
        let message = match DataMessage::parse(body) {
            Ok(message) => message,
            Err(err) => {
                debug!(error = %err, "malformed video data frame; dropping");
                return;
            }
        };
        if message.message_type != EStreamDataMessage::DataPacket {
            return;
        }
        let Some(header) = VideoFrameHeader::parse(&message.payload) else {
            debug!("video payload shorter than the 7-byte partial header; dropping");
            return;
        };
        let raw = &message.payload[VideoFrameHeader::SIZE..];
        let payload = if header.flags.has(VideoFrameFlags::ENCRYPTED) {
            match ihs_crypto::video::decrypt_zero_iv(&self.key, raw) {
                Ok(plain) => Bytes::from(plain),
                Err(err) => {
                    debug!(error = %err, "video partial decrypt failed; dropping");
                    self.frames_dropped += 1;
                    return;
                }
            }
        } else {
            Bytes::copy_from_slice(raw)
        };

        self.frames_received += 1;
        let sequence = header.sequence;
        let outcome = self.reassembler.ingest(header, payload, Instant::now());
        if outcome.request_key_frame {
            self.frames_dropped += 1;
            // Tell the host this sequence was lost so it resends a key frame
            // (spec.md §4.7 "request a key frame"/§7 "Key-frame loss").
            self.io.send_ack(PacketType::Nack, sequence);
        }
        if let Some((frame, is_key)) = outcome.completed_frame {
            let mut flags = VideoFrameFlags::default();
            if is_key {
                flags = VideoFrameFlags(VideoFrameFlags::KEY_FRAME);
            }
            #[allow(clippy::unwrap_used)]
            let result = self.callbacks.lock().unwrap().submit(&frame, flags);
            if result == 0 {
                self.frames_decoded += 1;
            } else {
                warn!(result, "video callback submit() returned non-zero");
            }
        }
    }

    fn maybe_report_stats(&mut self) {
        let now = Instant::now();
        if now.duration_since(self.last_stats_report) < FRAME_STATS_INTERVAL {
            return;
        }
        self.last_stats_report = now;
        let stats = FrameStatsListMsg {
            frames_received: self.frames_received,
            frames_decoded: self.frames_decoded,
            frames_dropped: self.frames_dropped,
        };
        let message = DataMessage {
            message_type: EStreamDataMessage::Other(FRAME_STATS_TAG),
            sub_header: None,
            payload: stats.encode_to_vec().into(),
        };
        self.io.send_frame(PacketType::Unreliable, false, message.to_bytes());
    }
}

impl Channel for VideoDataChannel {
    fn channel_id(&self) -> u8 {
        self.io.channel_id()
    }

    fn received(&mut self, packet: Packet) {
        if handle_ack_or_nack(&self.io, &packet) {
            return;
        }
        if let Err(overflow) = self.window.add(packet) {
            warn!(?overflow, "video reassembly window overflow; session must disconnect");
            return;
        }
        self.waker.notify();
    }

    fn stopped(&mut self) {
        #[allow(clippy::unwrap_used)]
        self.callbacks.lock().unwrap().stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ihs_proto::{PacketHeader, control::EAudioCodec};

    use super::*;
    use crate::{channel::ids, connection::ConnectionState, retransmission::RetransmissionQueue, send_queue::SendQueue};

    fn io(channel_id: u8) -> (ChannelIo, Arc<SendQueue>) {
        let connection = Arc::new(ConnectionState::new());
        let send_queue = Arc::new(SendQueue::new(64));
        let retransmission = Arc::new(RetransmissionQueue::new());
        (ChannelIo::new(channel_id, connection, send_queue.clone(), retransmission), send_queue)
    }

    fn frame_packet(channel_id: u8, body: impl Into<bytes::Bytes>) -> Packet {
        Packet {
            header: PacketHeader::new(PacketType::Unreliable, false, 0, 0, channel_id, 0, 0, 0),
            body: body.into(),
        }
    }

    struct RecordingAudio {
        started: Option<AudioConfig>,
        received: Vec<Vec<u8>>,
        stopped: bool,
    }

    impl AudioCallbacks for RecordingAudio {
        fn start(&mut self, config: &AudioConfig) {
            self.started = Some(config.clone());
        }
        fn received(&mut self, payload: &[u8]) {
            self.received.push(payload.to_vec());
        }
        fn stop(&mut self) {
            self.stopped = true;
        }
    }

    #[test]
    fn audio_channel_delivers_config_then_payload() {
        let (io, _queue) = io(ids::FIRST_DATA_CHANNEL);
        let callbacks: Arc<Mutex<Box<dyn AudioCallbacks>>> =
            Arc::new(Mutex::new(Box::new(RecordingAudio { started: None, received: Vec::new(), stopped: false })));
        let start = StartAudioData {
            channel_id: u32::from(ids::FIRST_DATA_CHANNEL),
            codec: EAudioCodec::AudioCodecOpus.into(),
            channels: 2,
            frequency: 48000,
            codec_data: vec![],
        };
        let mut channel = AudioDataChannel::new(io, &start, callbacks.clone());

        let message = DataMessage {
            message_type: EStreamDataMessage::DataPacket,
            sub_header: None,
            payload: Bytes::from_static(b"opus-bytes"),
        };
        channel.received(frame_packet(ids::FIRST_DATA_CHANNEL, message.to_bytes()));
        channel.process_ready_frames();

        #[allow(clippy::unwrap_used)]
        let recorded = callbacks.lock().unwrap();
        assert_eq!(recorded.started.as_ref().expect("started").frequency, 48000);
        assert_eq!(recorded.received, vec![b"opus-bytes".to_vec()]);
    }

    #[test]
    fn audio_channel_stop_invokes_callback() {
        let (io, _queue) = io(ids::FIRST_DATA_CHANNEL);
        let callbacks: Arc<Mutex<Box<dyn AudioCallbacks>>> =
            Arc::new(Mutex::new(Box::new(RecordingAudio { started: None, received: Vec::new(), stopped: false })));
        let start = StartAudioData { channel_id: 3, codec: 0, channels: 2, frequency: 48000, codec_data: vec![] };
        let mut channel = AudioDataChannel::new(io, &start, callbacks.clone());
        channel.stopped();
        #[allow(clippy::unwrap_used)]
        assert!(callbacks.lock().unwrap().stopped);
    }

    struct RecordingVideo {
        submitted: Vec<(Vec<u8>, bool)>,
    }

    impl VideoCallbacks for RecordingVideo {
        fn submit(&mut self, payload: &[u8], flags: VideoFrameFlags) -> i32 {
            self.submitted.push((payload.to_vec(), flags.has(VideoFrameFlags::KEY_FRAME)));
            0
        }
    }

    fn video_partial(sequence: u16, flags: u8, payload: &[u8]) -> Bytes {
        let header =
            VideoFrameHeader { sequence, flags: VideoFrameFlags(flags), reserved1: 0, reserved2: 0 };
        let mut body = Vec::new();
        body.extend_from_slice(&header.to_bytes());
        body.extend_from_slice(payload);
        let message = DataMessage { message_type: EStreamDataMessage::DataPacket, sub_header: None, payload: body.into() };
        message.to_bytes()
    }

    #[test]
    fn video_channel_reassembles_single_partial_key_frame() {
        let (io, _queue) = io(ids::FIRST_DATA_CHANNEL + 1);
        let callbacks: Arc<Mutex<Box<dyn VideoCallbacks>>> =
            Arc::new(Mutex::new(Box::new(RecordingVideo { submitted: Vec::new() })));
        let start = StartVideoData { channel_id: 4, codec: 0, width: 1920, height: 1080 };
        let key = SessionKey::new(vec![0x11u8; 16]).expect("valid key");
        let mut channel = VideoDataChannel::new(io, &start, key, callbacks.clone());

        let flags = VideoFrameFlags::KEY_FRAME | VideoFrameFlags::FRAME_FINISH;
        let body = video_partial(0, flags, b"NALU");
        channel.received(frame_packet(ids::FIRST_DATA_CHANNEL + 1, body));
        channel.process_ready_frames();

        #[allow(clippy::unwrap_used)]
        let recorded = callbacks.lock().unwrap();
        assert_eq!(recorded.submitted.len(), 1);
        assert_eq!(&recorded.submitted[0].0, b"NALU");
        assert!(recorded.submitted[0].1);
    }

    #[test]
    fn video_channel_requests_key_frame_on_sequence_gap() {
        let (io, queue) = io(ids::FIRST_DATA_CHANNEL + 1);
        let callbacks: Arc<Mutex<Box<dyn VideoCallbacks>>> =
            Arc::new(Mutex::new(Box::new(RecordingVideo { submitted: Vec::new() })));
        let start = StartVideoData { channel_id: 4, codec: 0, width: 1920, height: 1080 };
        let key = SessionKey::new(vec![0x11u8; 16]).expect("valid key");
        let mut channel = VideoDataChannel::new(io, &start, key, callbacks.clone());

        let flags = VideoFrameFlags::KEY_FRAME | VideoFrameFlags::FRAME_FINISH;
        channel.received(frame_packet(ids::FIRST_DATA_CHANNEL + 1, video_partial(0, flags, b"key")));
        channel.process_ready_frames();
        let queue_len_before_gap = queue.len();

        // Skip straight to sequence 5 without a key frame: should be dropped,
        // no new frame submitted, and a key frame should have been requested.
        channel.received(frame_packet(ids::FIRST_DATA_CHANNEL + 1, video_partial(5, VideoFrameFlags::FRAME_FINISH, b"gap")));
        channel.process_ready_frames();

        #[allow(clippy::unwrap_used)]
        let recorded = callbacks.lock().unwrap();
        assert_eq!(recorded.submitted.len(), 1);
        assert_eq!(channel.frames_dropped, 1);
        // The reassembler's key-frame request surfaces as an outbound NACK
        // to the host, not just internal bookkeeping.
        assert_eq!(queue.len(), queue_len_before_gap + 1);
    }

    #[test]
    fn video_channel_reassembles_multiple_partials_in_order() {
        let (io, _queue) = io(ids::FIRST_DATA_CHANNEL + 1);
        let callbacks: Arc<Mutex<Box<dyn VideoCallbacks>>> =
            Arc::new(Mutex::new(Box::new(RecordingVideo { submitted: Vec::new() })));
        let start = StartVideoData { channel_id: 4, codec: 0, width: 1920, height: 1080 };
        let key = SessionKey::new(vec![0x11u8; 16]).expect("valid key");
        let mut channel = VideoDataChannel::new(io, &start, key, callbacks.clone());

        channel.received(frame_packet(
            ids::FIRST_DATA_CHANNEL + 1,
            video_partial(0, VideoFrameFlags::KEY_FRAME, b"AAA"),
        ));
        channel.received(frame_packet(
            ids::FIRST_DATA_CHANNEL + 1,
            video_partial(1, VideoFrameFlags::FRAME_FINISH, b"BBB"),
        ));
        channel.process_ready_frames();

        #[allow(clippy::unwrap_used)]
        let recorded = callbacks.lock().unwrap();
        assert_eq!(recorded.submitted.len(), 1);
        assert_eq!(&recorded.submitted[0].0, b"AAABBB");
    }
}
