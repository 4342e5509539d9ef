use crate::bridge::payload::decode_payload;
use crate::bridge::queue::InputQueue;
use crate::model::config::EngineConfig;
use crate::model::note::InputEvent;
use anyhow::{Context, Result, bail};
use log::{debug, info, trace, warn};
use socket2::{Domain, Protocol, Socket, Type};
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, UdpSocket};
use std::sync::mpsc;
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::thread;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const MAX_DATAGRAM: usize = 512;
const ERROR_BACKOFF: Duration = Duration::from_millis(10);

enum ControlMsg {
    Stop,
}

struct Listener {
    control_tx: Sender<ControlMsg>,
    local_addr: SocketAddr,
    // Same socket as the thread's, kept so `stop` can shut it down under a blocked receive.
    socket: Socket,
    handle: JoinHandle<()>,
}

/// Receives taps from the remote relay on a background thread and hands them to the game loop.
///
/// The listener thread owns the socket. `stop` asks it to quit, shuts the socket down under its
/// blocking receive and joins it, so once `stop` returns the thread is gone and the port is free.
pub struct NetworkBridge {
    addr: SocketAddr,
    lane_count: usize,
    recv_poll_interval: Duration,
    max_events_per_tick: usize,
    queue: InputQueue,
    listener: Option<Listener>,
    peer_connected: bool,
    on_connected: Option<Box<dyn FnMut()>>,
}

impl NetworkBridge {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            addr: config.socket_addr(),
            lane_count: config.lane_count,
            recv_poll_interval: config.recv_poll_interval(),
            max_events_per_tick: config.max_events_per_tick,
            queue: InputQueue::bounded(config.queue_capacity),
            listener: None,
            peer_connected: false,
            on_connected: None,
        }
    }

    /// Registers a callback fired from `poll` each time a peer goes from disconnected to connected.
    pub fn set_on_connected<F: FnMut() + 'static>(&mut self, callback: F) {
        self.on_connected = Some(Box::new(callback));
    }

    /// Binds the socket and spawns the listener thread. Calling it while already listening
    /// does nothing.
    pub fn start(&mut self) -> Result<()> {
        if let Some(listener) = &self.listener {
            debug!("Network bridge already listening on {}..!", listener.local_addr);
            return Ok(());
        }

        let socket = bind_reusable(self.addr)?;
        socket
            .set_read_timeout(Some(self.recv_poll_interval))
            .context("Failed to set the UDP read timeout..!")?;
        let shutdown_handle = socket
            .try_clone()
            .context("Failed to clone the UDP socket..!")?;
        let socket: UdpSocket = socket.into();
        let local_addr = socket.local_addr()?;

        self.queue.clear();
        self.peer_connected = false;

        let (tx, rx) = mpsc::channel::<ControlMsg>();
        let queue = self.queue.clone();
        let lane_count = self.lane_count;

        let handle = thread::Builder::new()
            .name("taplane-listener".into())
            .spawn(move || listen(socket, rx, queue, lane_count))
            .context("Failed to spawn the network listener thread..!")?;

        self.listener = Some(Listener {
            control_tx: tx,
            local_addr,
            socket: shutdown_handle,
            handle,
        });

        info!("Network bridge listening on {}..!", local_addr);
        Ok(())
    }

    /// Stops and joins the listener thread. Calling it while stopped does nothing.
    pub fn stop(&mut self) -> Result<()> {
        self.peer_connected = false;

        let Some(listener) = self.listener.take() else {
            debug!("Network bridge is not running..!");
            return Ok(());
        };

        let _ = listener.control_tx.send(ControlMsg::Stop);

        // Unconnected UDP sockets report ENOTCONN here but the blocked receive still returns.
        if let Err(why) = listener.socket.shutdown(Shutdown::Both) {
            debug!("Socket shutdown reported: {}..!", why);
        }

        // Fallbacks for platforms where shutdown doesn't interrupt the receive: an empty
        // datagram, then the read timeout.
        if let Err(why) = wake(listener.local_addr) {
            debug!("Couldn't wake the network listener: {}..!", why);
        }

        if listener.handle.join().is_err() {
            bail!("Network listener thread panicked..!");
        }

        info!("Stopped network bridge on {}..!", listener.local_addr);
        Ok(())
    }

    /// Drains at most `max_events_per_tick` queued inputs without blocking.
    ///
    /// Lane events come back as they were received. `PeerConnected` only comes back (and the
    /// registered callback only fires) on a transition into the connected state.
    pub fn poll(&mut self) -> Vec<InputEvent> {
        let mut events = Vec::new();

        for event in self.queue.drain(self.max_events_per_tick) {
            match event {
                InputEvent::PeerConnected => {
                    if self.peer_connected {
                        debug!("Ignoring repeated CONNECT from an already connected peer..!");
                        continue;
                    }

                    self.peer_connected = true;
                    if let Some(callback) = self.on_connected.as_mut() {
                        callback();
                    }
                    events.push(event);
                }
                InputEvent::Lane { .. } => events.push(event),
            }
        }

        events
    }

    /// Feeds a message that arrived some other way (e.g. from an embedding host) through the
    /// same decode path as a datagram.
    pub fn receive_message(&self, bytes: &[u8]) {
        match decode_payload(bytes, self.lane_count) {
            Some(payload) => self.queue.push_payload(payload, Instant::now()),
            None => trace!("Dropped an unrecognized message of {} bytes..!", bytes.len()),
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().map(|l| l.local_addr)
    }

    pub fn peer_connected(&self) -> bool {
        self.peer_connected
    }

    /// Events thrown away because the game loop fell behind.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }

    pub fn queue(&self) -> &InputQueue {
        &self.queue
    }
}

impl Drop for NetworkBridge {
    fn drop(&mut self) {
        if let Err(why) = self.stop() {
            warn!("Failed to stop the network bridge cleanly: {:?}", why);
        }
    }
}

fn bind_reusable(addr: SocketAddr) -> Result<Socket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
        .context("Failed to create the UDP socket..!")?;
    socket
        .set_reuse_address(true)
        .context("Failed to enable address reuse..!")?;
    socket
        .bind(&addr.into())
        .with_context(|| format!("Failed to bind UDP {}..!", addr))?;

    Ok(socket)
}

fn wake(target: SocketAddr) -> Result<()> {
    let target = match target.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(Ipv4Addr::LOCALHOST.into(), target.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(Ipv6Addr::LOCALHOST.into(), target.port())
        }
        _ => target,
    };
    let from: SocketAddr = match target {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };

    let probe = UdpSocket::bind(from)?;
    probe.send_to(&[], target)?;
    Ok(())
}

fn stop_requested(ctrl_rx: &Receiver<ControlMsg>) -> bool {
    match ctrl_rx.try_recv() {
        Ok(ControlMsg::Stop) | Err(TryRecvError::Disconnected) => true,
        Err(TryRecvError::Empty) => false,
    }
}

fn listen(socket: UdpSocket, ctrl_rx: Receiver<ControlMsg>, queue: InputQueue, lane_count: usize) {
    let mut buf = [0u8; MAX_DATAGRAM];

    loop {
        if stop_requested(&ctrl_rx) {
            break;
        }

        match socket.recv_from(&mut buf) {
            // A shut down socket returns empty reads, and so does the wake datagram.
            Ok((len, from)) => {
                if stop_requested(&ctrl_rx) {
                    break;
                }

                match decode_payload(&buf[..len], lane_count) {
                    Some(payload) => {
                        trace!("Received {:?} from {}", payload, from);
                        queue.push_payload(payload, Instant::now());
                    }
                    None => trace!("Dropped a malformed datagram of {} bytes from {}..!", len, from),
                }
            }
            Err(why)
                if matches!(
                    why.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) => {}
            Err(why) => {
                if stop_requested(&ctrl_rx) {
                    break;
                }

                warn!("UDP receive error: {}..!", why);
                spin_sleep::sleep(ERROR_BACKOFF);
            }
        }
    }

    debug!("Network listener thread exiting..!");
}
