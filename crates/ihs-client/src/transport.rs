//! UDP transport and the threading model that drives a [`Session`]
//! (spec.md §5): a blocking receive thread, a send thread that flushes the
//! send queue and ticks timers/retransmission, and one worker per
//! data channel.
//!
//! Grounded on the blocking-`UdpSocket`-plus-dispatch-thread shape of
//! `AquaEBM-syfala_test`'s `syfala_network::udp::client::Client::start`,
//! adapted from that crate's single receive loop into the multi-thread
//! model spec.md §5 mandates (one thread per concern, a shared interrupt
//! flag rather than a `Result`-returning loop).

use std::{
    net::{SocketAddr, UdpSocket},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use ihs_core::Session;
use ihs_proto::Packet;
use tracing::{debug, trace, warn};

use crate::error::{ClientError, Result};

/// How long the send thread's condvar wait blocks before re-checking the
/// interrupt flag and ticking timers anyway (spec.md §5: "each iteration
/// ticks the timer wheel, flushes the send queue, and sleeps 1 ms at the
/// tail" — this is the wait preceding that iteration, not the tail sleep).
const SEND_LOOP_POLL: Duration = Duration::from_millis(50);

/// How long a data-channel worker waits on its channel's waker before
/// re-checking whether the channel still exists (it may not have been
/// spawned yet, or may have just been torn down by `Stop*Data`).
const DATA_WORKER_POLL: Duration = Duration::from_millis(200);

/// How long a just-spawned data-channel worker sleeps before checking
/// again whether its channel has been spawned.
const DATA_WORKER_IDLE: Duration = Duration::from_millis(50);

/// One UDP socket connected to a single remote host, plus the local
/// ephemeral port a [`Self::wake`] datagram is sent to in order to
/// unblock a thread parked in [`Self::recv_blocking`] (spec.md §5
/// "Cancellation": "unblocks the UDP recv via a loopback wake-up packet").
pub struct UdpTransport {
    socket: UdpSocket,
    remote: SocketAddr,
    local_addr: SocketAddr,
}

impl UdpTransport {
    /// Bind an ephemeral local socket and record `remote` as the session
    /// host's address. Sends go to `remote`; receives accept datagrams
    /// from any source (including this transport's own wake-up packets).
    pub fn connect(remote: SocketAddr) -> std::io::Result<Self> {
        let bind_addr: SocketAddr = if remote.is_ipv6() { "[::]:0".parse() } else { "0.0.0.0:0".parse() }
            .expect("hardcoded bind address literal is always valid");
        let socket = UdpSocket::bind(bind_addr)?;
        let local_addr = socket.local_addr()?;
        Ok(Self { socket, remote, local_addr })
    }

    /// This transport's local ephemeral endpoint.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Send `bytes` to the session host.
    pub fn send(&self, bytes: &[u8]) -> std::io::Result<()> {
        self.socket.send_to(bytes, self.remote).map(|_| ())
    }

    /// Block until a datagram arrives from any source.
    pub fn recv_blocking(&self, buf: &mut [u8]) -> std::io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf)
    }

    /// Send a single empty datagram to this transport's own local address,
    /// unblocking a thread parked in [`Self::recv_blocking`].
    pub fn wake(&self) -> std::io::Result<()> {
        let waker = UdpSocket::bind(if self.local_addr.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" })?;
        waker.send_to(&[0u8], self.local_addr)?;
        Ok(())
    }
}

/// Every thread a running [`crate::IhsClient`] owns: receive, send, and the
/// two data-channel workers. Spawned once by `connect`, stopped and joined
/// once by `shutdown`.
pub struct Workers {
    interrupt: Arc<AtomicBool>,
    receive: Option<JoinHandle<()>>,
    send: Option<JoinHandle<()>>,
    audio: Option<JoinHandle<()>>,
    video: Option<JoinHandle<()>>,
}

impl Workers {
    /// Spawn every worker thread against a shared `session` and `transport`.
    pub fn spawn(session: Arc<Mutex<Session>>, transport: Arc<UdpTransport>) -> Self {
        let interrupt = Arc::new(AtomicBool::new(false));

        let receive = thread::spawn({
            let session = session.clone();
            let transport = transport.clone();
            let interrupt = interrupt.clone();
            move || receive_loop(&session, &transport, &interrupt)
        });
        let send = thread::spawn({
            let session = session.clone();
            let transport = transport.clone();
            let interrupt = interrupt.clone();
            move || send_loop(&session, &transport, &interrupt)
        });
        let audio = thread::spawn({
            let session = session.clone();
            let interrupt = interrupt.clone();
            move || data_worker_loop("audio", &session, &interrupt, Session::audio_waker, Session::process_audio_frames)
        });
        let video = thread::spawn({
            let session = session.clone();
            let interrupt = interrupt.clone();
            move || data_worker_loop("video", &session, &interrupt, Session::video_waker, Session::process_video_frames)
        });

        Self {
            interrupt,
            receive: Some(receive),
            send: Some(send),
            audio: Some(audio),
            video: Some(video),
        }
    }

    /// Signal every worker to stop, unblock the receive thread with a
    /// loopback wake-up datagram, and join all four threads.
    pub fn stop(mut self, transport: &UdpTransport) -> Result<()> {
        self.interrupt.store(true, Ordering::Release);
        transport.wake()?;
        self.join_one("receive", self.receive.take())?;
        self.join_one("send", self.send.take())?;
        self.join_one("audio", self.audio.take())?;
        self.join_one("video", self.video.take())?;
        Ok(())
    }

    fn join_one(&self, name: &'static str, handle: Option<JoinHandle<()>>) -> Result<()> {
        match handle {
            Some(handle) => handle.join().map_err(|_| ClientError::ThreadPanicked(name)),
            None => Ok(()),
        }
    }
}

fn receive_loop(session: &Arc<Mutex<Session>>, transport: &UdpTransport, interrupt: &AtomicBool) {
    let mut buf = [0u8; 2048];
    while !interrupt.load(Ordering::Acquire) {
        match transport.recv_blocking(&mut buf) {
            Ok((len, _from)) => {
                if interrupt.load(Ordering::Acquire) {
                    break;
                }
                match Packet::parse(&buf[..len]) {
                    Ok(packet) => {
                        #[allow(clippy::unwrap_used)]
                        session.lock().unwrap().dispatch(packet);
                    }
                    Err(err) => debug!(%err, "malformed packet; dropping"),
                }
            }
            Err(err) => {
                warn!(%err, "udp recv failed; stopping receive loop");
                break;
            }
        }
    }
}

fn send_loop(session: &Arc<Mutex<Session>>, transport: &UdpTransport, interrupt: &AtomicBool) {
    let (send_queue, retransmission, connection) = {
        #[allow(clippy::unwrap_used)]
        let session = session.lock().unwrap();
        (session.send_queue(), session.retransmission(), session.connection())
    };
    while !interrupt.load(Ordering::Acquire) {
        send_queue.wait_for_work(SEND_LOOP_POLL);
        if interrupt.load(Ordering::Acquire) {
            break;
        }
        let now = Instant::now();
        {
            #[allow(clippy::unwrap_used)]
            session.lock().unwrap().tick_timers(now);
        }
        retransmission.tick(now, &send_queue);
        let timestamp = connection.timestamp_now();
        send_queue.flush(now, timestamp, |packet| {
            if let Err(err) = transport.send(&packet.serialize()) {
                warn!(%err, "udp send failed");
            }
        });
        thread::sleep(Duration::from_millis(1));
    }
}

fn data_worker_loop(
    name: &'static str,
    session: &Arc<Mutex<Session>>,
    interrupt: &AtomicBool,
    waker_of: fn(&Session) -> Option<Arc<ihs_core::channels::data::DataChannelWaker>>,
    process: fn(&mut Session),
) {
    while !interrupt.load(Ordering::Acquire) {
        #[allow(clippy::unwrap_used)]
        let waker = waker_of(&session.lock().unwrap());
        match waker {
            Some(waker) => {
                waker.wait(DATA_WORKER_POLL);
                #[allow(clippy::unwrap_used)]
                process(&mut session.lock().unwrap());
            }
            None => thread::sleep(DATA_WORKER_IDLE),
        }
    }
    trace!(channel = name, "data worker stopped");
}
