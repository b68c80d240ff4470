//! The gossip streamer.
//!
//! One background thread per node runs a continuous loop with two
//! interleaved phases. The send phase walks the block indices
//! round-robin: blocks the local node masters are broadcast to every
//! peer as authoritative values; all other blocks are sent to their
//! master as an elementwise delta against the last-sent snapshot. The
//! receive phase polls the non-blocking socket once: a master
//! accumulates incoming deltas into its authoritative block, everyone
//! else folds the master's value into its replica while preserving
//! local unsynced progress.
//!
//! There is no acknowledgment, retransmission, or sequencing. A lost
//! datagram is refreshed on the next gossip cycle; bandwidth is spent
//! on every block every cycle whether it changed or not. That is the
//! protocol's simplicity/robustness trade-off, kept on purpose.

use std::{
    io,
    net::{SocketAddr, UdpSocket},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread,
};

use thiserror::Error;

use gossamer_core::{
    message::{BlockBuffer, DecodeError},
    BlockLayout, ParameterVector, Topology,
};

#[derive(Debug, Error)]
/// An error raised by the gossip streamer.
pub enum StreamerError {
    #[error("parameter vector length {len} is not a multiple of block length {block_len}")]
    Layout { len: usize, block_len: usize },
    #[error("failed to bind gossip endpoint {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to spawn streamer thread")]
    Spawn(#[source] io::Error),
    #[error("gossip endpoint failed")]
    Socket(#[from] io::Error),
}

/// Monitoring counters, updated on successful socket operations and
/// read without synchronization. Approximate, non-authoritative.
#[derive(Debug, Default)]
pub struct StreamerCounters {
    sent: AtomicU64,
    received: AtomicU64,
    cycles: AtomicU64,
}

impl StreamerCounters {
    /// Datagrams handed to the kernel.
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Well-formed datagrams absorbed into the replica.
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Completed passes through all block indices.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }
}

/// The per-node replica state the protocol acts on: the shared
/// parameter vector, the last-sent snapshot of every non-owned block,
/// and the first-reception bookkeeping behind the ready signal.
///
/// Socket-free; the [`Streamer`] loop feeds it datagrams and drains
/// outgoing ones from it.
///
/// [`Streamer`]: struct.Streamer.html
struct NodeView {
    params: Arc<ParameterVector>,
    topology: Topology,
    layout: BlockLayout,
    last_sent: Box<[f32]>,
    received: Box<[bool]>,
    remaining_blocks: usize,
    /// Round-robin send position.
    cursor: usize,
    /// Reusable one-block staging area; the loop never allocates.
    scratch: Vec<f32>,
    on_ready: Option<Box<dyn FnOnce() + Send>>,
}

impl NodeView {
    fn new(
        params: Arc<ParameterVector>,
        topology: Topology,
        layout: BlockLayout,
        on_ready: Option<Box<dyn FnOnce() + Send>>,
    ) -> Self {
        let last_sent = params.snapshot().into_boxed_slice();
        let blocks = layout.blocks(params.len());
        let mut received = vec![false; blocks].into_boxed_slice();
        let mut remaining_blocks = blocks;
        for block in 0..blocks {
            if topology.is_local_master(block) {
                received[block] = true;
                remaining_blocks -= 1;
            }
        }
        Self {
            params,
            topology,
            layout,
            last_sent,
            received,
            remaining_blocks,
            cursor: 0,
            scratch: vec![0.0; layout.block_len()],
            on_ready,
        }
    }

    fn blocks(&self) -> usize {
        self.received.len()
    }

    /// Advances the round-robin cursor; true on wrap (one full gossip
    /// cycle).
    fn advance(&mut self) -> bool {
        self.cursor += 1;
        if self.cursor == self.blocks() {
            self.cursor = 0;
            return true;
        }
        false
    }

    /// Encodes the current authoritative values of a locally mastered
    /// block.
    fn encode_full(&self, block: usize, datagram: &mut [u8]) {
        let weights = self.params.view();
        let mut writer = BlockBuffer::new_unchecked(datagram);
        writer.set_index(block as u32);
        writer.write_values(&weights[self.layout.span(block)]);
    }

    /// Encodes the ground-truth value of a non-owned block re-expressed
    /// as a difference from what was last sent, and moves the snapshot
    /// forward.
    ///
    /// The snapshot moves whether or not the datagram later reaches the
    /// wire; an unsendable delta is a lost packet like any other.
    fn encode_delta(&mut self, block: usize, datagram: &mut [u8]) {
        let weights = self.params.view();
        for (j, i) in self.layout.span(block).enumerate() {
            self.scratch[j] = weights[i] - self.last_sent[i];
            self.last_sent[i] = weights[i];
        }
        let mut writer = BlockBuffer::new_unchecked(datagram);
        writer.set_index(block as u32);
        writer.write_values(&self.scratch);
    }

    /// Folds one incoming datagram into the replica.
    fn absorb(&mut self, datagram: &[u8]) -> Result<(), DecodeError> {
        let reader = BlockBuffer::new(datagram)?;
        if reader.value_count() != self.layout.block_len() {
            return Err(anyhow::anyhow!(
                "datagram carries {} values, layout expects {}",
                reader.value_count(),
                self.layout.block_len()
            ));
        }
        let block = reader.index() as usize;
        if block >= self.blocks() {
            return Err(anyhow::anyhow!(
                "block index {} out of range for {} blocks",
                block,
                self.blocks()
            ));
        }
        reader.read_values(&mut self.scratch);
        let weights = self.params.view_mut();
        if self.topology.is_local_master(block) {
            // A peer's delta: accumulate into the authoritative value.
            // Several peers may contribute before the next broadcast.
            for (j, i) in self.layout.span(block).enumerate() {
                weights[i] += self.scratch[j];
            }
        } else {
            // The master's authoritative value: keep whatever local
            // progress was made since the last transmission on top of
            // it instead of discarding it.
            for (j, i) in self.layout.span(block).enumerate() {
                let local_delta = weights[i] - self.last_sent[i];
                self.last_sent[i] = self.scratch[j];
                weights[i] = self.scratch[j] + local_delta;
            }
            if self.remaining_blocks > 0 && !self.received[block] {
                self.received[block] = true;
                self.remaining_blocks -= 1;
                if self.remaining_blocks == 0 {
                    self.signal_ready();
                }
            }
        }
        Ok(())
    }

    fn signal_ready(&mut self) {
        if let Some(ready) = self.on_ready.take() {
            ready();
        }
    }
}

/// The per-node gossip process.
///
/// Constructed with the shared parameter vector, the cluster topology
/// and the block layout; [`start`] binds the local UDP endpoint and
/// moves the streamer onto its background thread for the rest of the
/// process lifetime.
///
/// [`start`]: #method.start
pub struct Streamer {
    params: Arc<ParameterVector>,
    topology: Topology,
    layout: BlockLayout,
    on_ready: Option<Box<dyn FnOnce() + Send>>,
}

impl std::fmt::Debug for Streamer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Streamer")
            .field("params_len", &self.params.len())
            .field("topology", &self.topology)
            .field("layout", &self.layout)
            .field("on_ready", &self.on_ready.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

impl Streamer {
    /// Creates a streamer for the local node.
    ///
    /// # Errors
    /// Fails if the parameter vector is not block-aligned. Topology
    /// and layout carry their own validation; nothing here opens a
    /// socket or spawns a thread yet.
    pub fn new(
        params: Arc<ParameterVector>,
        topology: Topology,
        layout: BlockLayout,
    ) -> Result<Self, StreamerError> {
        if params.len() % layout.block_len() != 0 {
            return Err(StreamerError::Layout {
                len: params.len(),
                block_len: layout.block_len(),
            });
        }
        Ok(Self {
            params,
            topology,
            layout,
            on_ready: None,
        })
    }

    /// Registers the callback invoked exactly once, when every block
    /// has been received at least once.
    pub fn on_ready(mut self, ready: impl FnOnce() + Send + 'static) -> Self {
        self.on_ready = Some(Box::new(ready));
        self
    }

    /// Binds the local endpoint and starts the gossip loop on a
    /// background thread.
    ///
    /// # Errors
    /// Bind failure is fatal: no thread is spawned and the error is
    /// returned immediately.
    pub fn start(self) -> Result<StreamerHandle, StreamerError> {
        let addr = self.topology.local_addr();
        let socket = UdpSocket::bind(addr).map_err(|source| StreamerError::Bind { addr, source })?;
        socket
            .set_nonblocking(true)
            .map_err(|source| StreamerError::Bind { addr, source })?;
        info!(
            "node {}/{} gossiping on {}",
            self.topology.local_index(),
            self.topology.len(),
            addr
        );

        let counters = Arc::new(StreamerCounters::default());
        let view = NodeView::new(self.params, self.topology, self.layout, self.on_ready);
        let thread_counters = Arc::clone(&counters);
        let thread = thread::Builder::new()
            .name("gossip-streamer".into())
            .spawn(move || run(socket, view, thread_counters))
            .map_err(StreamerError::Spawn)?;
        Ok(StreamerHandle { counters, thread })
    }
}

/// A handle on a running streamer.
#[derive(Debug)]
pub struct StreamerHandle {
    counters: Arc<StreamerCounters>,
    thread: thread::JoinHandle<Result<(), StreamerError>>,
}

impl StreamerHandle {
    /// The streamer's monitoring counters.
    pub fn counters(&self) -> Arc<StreamerCounters> {
        Arc::clone(&self.counters)
    }

    /// Blocks until the gossip loop exits, which only happens on a
    /// persistent socket failure.
    pub fn join(self) -> Result<(), StreamerError> {
        match self.thread.join() {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

/// Transient conditions of the non-blocking socket: nothing to
/// send/receive right now, an interrupted syscall, or a peer that is
/// down (Linux reports ICMP port-unreachable as `ConnectionRefused`).
/// All equivalent to a dropped datagram.
fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::ConnectionRefused
    )
}

fn run(
    socket: UdpSocket,
    mut view: NodeView,
    counters: Arc<StreamerCounters>,
) -> Result<(), StreamerError> {
    let mut datagram = vec![0u8; view.layout.datagram_len()];
    // A node that masters every block has nothing to wait for.
    if view.remaining_blocks == 0 {
        view.signal_ready();
    }
    loop {
        let block = view.cursor;
        if view.topology.is_local_master(block) {
            view.encode_full(block, &mut datagram);
            for peer in view.topology.peers() {
                send(&socket, &datagram, peer, &counters)?;
            }
        } else {
            view.encode_delta(block, &mut datagram);
            let master = view.topology.addr(view.topology.master(block));
            send(&socket, &datagram, master, &counters)?;
        }
        if view.advance() {
            counters.cycles.fetch_add(1, Ordering::Relaxed);
        }

        match socket.recv_from(&mut datagram) {
            Ok((len, _src)) => match view.absorb(&datagram[..len]) {
                Ok(()) => {
                    counters.received.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => warn!("dropping malformed datagram: {}", err),
            },
            Err(ref err) if is_transient(err) => {}
            Err(err) => {
                error!("gossip receive failed: {}", err);
                return Err(err.into());
            }
        }
    }
}

fn send(
    socket: &UdpSocket,
    datagram: &[u8],
    to: SocketAddr,
    counters: &StreamerCounters,
) -> Result<(), StreamerError> {
    match socket.send_to(datagram, to) {
        Ok(_) => {
            counters.sent.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
        Err(ref err) if is_transient(err) => Ok(()),
        Err(err) => {
            error!("gossip send to {} failed: {}", to, err);
            Err(err.into())
        }
    }
}
