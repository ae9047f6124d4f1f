/*!
    Demux pump shared by all sample providers.
*/

use std::collections::{BTreeMap, VecDeque};

use crate::engine::{Container, Packet};
use crate::error::EngineError;

#[derive(Debug, Default)]
struct StreamQueue {
    active: bool,
    packets: VecDeque<Packet>,
}

/**
    Reads packets from the container on behalf of the providers.

    The container interleaves streams in file order, while each provider asks
    for packets of its own stream. Packets read for a bound, active stream
    other than the requested one are queued until that stream asks for them;
    packets for anything else are dropped.
*/
pub struct PacketReader {
    container: Box<dyn Container>,
    queues: BTreeMap<usize, StreamQueue>,
}

impl PacketReader {
    pub fn new(container: Box<dyn Container>) -> Self {
        Self {
            container,
            queues: BTreeMap::new(),
        }
    }

    pub fn container(&self) -> &dyn Container {
        self.container.as_ref()
    }

    pub fn container_mut(&mut self) -> &mut dyn Container {
        self.container.as_mut()
    }

    /**
        Start routing packets of `stream_index`.
    */
    pub fn bind(&mut self, stream_index: usize, active: bool) {
        self.queues.insert(
            stream_index,
            StreamQueue {
                active,
                packets: VecDeque::new(),
            },
        );
    }

    pub fn is_bound(&self, stream_index: usize) -> bool {
        self.queues.contains_key(&stream_index)
    }

    pub fn is_active(&self, stream_index: usize) -> bool {
        self.queues.get(&stream_index).is_some_and(|q| q.active)
    }

    /**
        Stop routing packets for every stream and discard everything queued.
    */
    pub fn unbind_all(&mut self) {
        self.queues.clear();
    }

    /**
        Activate or deactivate a bound stream. Deactivating discards its queue.
    */
    pub fn set_active(&mut self, stream_index: usize, active: bool) {
        if let Some(queue) = self.queues.get_mut(&stream_index) {
            queue.active = active;
            if !active {
                queue.packets.clear();
            }
        }
    }

    /**
        Discard queued packets of one stream.
    */
    pub fn flush(&mut self, stream_index: usize) {
        if let Some(queue) = self.queues.get_mut(&stream_index) {
            queue.packets.clear();
        }
    }

    pub fn queued(&self, stream_index: usize) -> usize {
        self.queues.get(&stream_index).map_or(0, |q| q.packets.len())
    }

    /**
        Seek the container. Queued packets are stale afterwards and are
        discarded, but only if the seek succeeded.
    */
    pub fn seek(&mut self, stream_index: usize, timestamp: i64) -> Result<(), EngineError> {
        self.container.seek(stream_index, timestamp)?;
        for queue in self.queues.values_mut() {
            queue.packets.clear();
        }
        Ok(())
    }

    /**
        Next packet of `stream_index`, `None` at end of stream.
    */
    pub fn next_packet(&mut self, stream_index: usize) -> Result<Option<Packet>, EngineError> {
        if let Some(packet) = self
            .queues
            .get_mut(&stream_index)
            .and_then(|q| q.packets.pop_front())
        {
            return Ok(Some(packet));
        }

        loop {
            let Some(packet) = self.container.read_packet()? else {
                return Ok(None);
            };

            if packet.stream_index == stream_index {
                return Ok(Some(packet));
            }

            match self.queues.get_mut(&packet.stream_index) {
                Some(queue) if queue.active => queue.packets.push_back(packet),
                _ => {
                    tracing::trace!(stream = packet.stream_index, "dropping packet");
                }
            }
        }
    }
}

impl std::fmt::Debug for PacketReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketReader")
            .field("queues", &self.queues)
            .finish_non_exhaustive()
    }
}
