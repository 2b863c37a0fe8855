//! Cross-qubit messaging bus
//!
//! A bounded queue of small typed messages that concurrently running qubits
//! use to share partial results, hints and convergence signals. Delivery is
//! "everyone but me": `receive` hands out the oldest message not sent by the
//! caller, whatever its target. The bus also tracks the best solution seen so
//! far, independently of the queue.

use arc_swap::ArcSwap;
use crossbeam_utils::CachePadded;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::clock::{system_clock, Clock};
use crate::error::BusError;

/// Target id meaning "every other qubit"
pub const BROADCAST: i32 = -1;

/// Size of the opaque block carried by a knowledge hint
pub const KNOWLEDGE_BLOCK_SIZE: usize = 256;

/// Relevance stamped on every outgoing message
const DEFAULT_RELEVANCE: u32 = 75;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    PartialResult,
    BestFound,
    Hint,
    Convergence,
    /// Cooperative hint that a branch is no longer worth pursuing
    AbortBranch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossMessage {
    pub id: Uuid,
    pub kind: MessageType,
    pub sender_id: u32,
    /// Recorded but not used for delivery
    pub target_id: i32,
    pub timestamp_ms: u64,
    pub priority: u32,
    pub relevance_score: u32,
    pub payload: Vec<u8>,
}

impl CrossMessage {
    pub fn data_size(&self) -> usize {
        self.payload.len()
    }

    /// Split a `Hint` produced by [`MessageBus::share_knowledge`] into its
    /// knowledge type and block
    pub fn knowledge(&self) -> Option<(u32, &[u8])> {
        if self.kind != MessageType::Hint || self.payload.len() < 4 {
            return None;
        }
        let (tag, block) = self.payload.split_at(4);
        let tag = u32::from_le_bytes([tag[0], tag[1], tag[2], tag[3]]);
        Some((tag, block))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusConfig {
    pub enabled: bool,
    /// Whether best-solution and knowledge broadcasts enqueue a message
    pub broadcast_enabled: bool,
    pub message_priority: u32,
    /// Messages older than this are discarded at receive time; 0 keeps them forever
    pub max_message_age_ms: u64,
    pub capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            broadcast_enabled: true,
            message_priority: 50,
            max_message_age_ms: 0,
            capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusStats {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub messages_dropped: u64,
    pub messages_expired: u64,
    pub helpful_messages: u64,
    pub ignored_messages: u64,
    pub queued: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestSolution {
    pub qubit_id: u32,
    pub quality_score: u32,
    pub data: Vec<u8>,
}

#[derive(Default)]
struct BusCounters {
    sent: CachePadded<AtomicU64>,
    received: CachePadded<AtomicU64>,
    dropped: CachePadded<AtomicU64>,
    expired: CachePadded<AtomicU64>,
    helpful: CachePadded<AtomicU64>,
    ignored: CachePadded<AtomicU64>,
}

impl BusCounters {
    fn reset(&self) {
        for counter in [
            &self.sent,
            &self.received,
            &self.dropped,
            &self.expired,
            &self.helpful,
            &self.ignored,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

pub struct MessageBus {
    config: ArcSwap<BusConfig>,
    queue: Mutex<VecDeque<CrossMessage>>,
    best: Mutex<Option<BestSolution>>,
    counters: BusCounters,
    clock: Arc<dyn Clock>,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

impl MessageBus {
    pub fn new(config: BusConfig) -> Self {
        info!("Cross-learning bus ready (capacity {})", config.capacity);
        Self {
            queue: Mutex::new(VecDeque::with_capacity(config.capacity)),
            config: ArcSwap::from_pointee(config),
            best: Mutex::new(None),
            counters: BusCounters::default(),
            clock: system_clock(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn configure(&self, config: BusConfig) {
        debug!("Bus configuration updated: {:?}", config);
        self.config.store(Arc::new(config));
    }

    pub fn config(&self) -> Arc<BusConfig> {
        self.config.load_full()
    }

    /// Enqueue a copy of `payload`. A full queue drops the message.
    pub fn send(
        &self,
        sender_id: u32,
        kind: MessageType,
        payload: &[u8],
        target_id: i32,
    ) -> Result<Uuid, BusError> {
        let config = self.config.load();
        if !config.enabled {
            return Err(BusError::Disabled);
        }

        let mut queue = self.queue.lock();
        if queue.len() >= config.capacity {
            drop(queue);
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(
                "Bus: queue full ({}), dropping {:?} from qubit {}",
                config.capacity, kind, sender_id
            );
            return Err(BusError::QueueFull {
                capacity: config.capacity,
            });
        }

        let message = CrossMessage {
            id: Uuid::new_v4(),
            kind,
            sender_id,
            target_id,
            timestamp_ms: self.clock.now_ms(),
            priority: config.message_priority,
            relevance_score: DEFAULT_RELEVANCE,
            payload: payload.to_vec(),
        };
        let id = message.id;
        queue.push_back(message);
        drop(queue);

        self.counters.sent.fetch_add(1, Ordering::Relaxed);
        trace!("Bus: qubit {} sent {:?} ({} bytes)", sender_id, kind, payload.len());
        Ok(id)
    }

    /// Take the oldest live message not sent by `qubit_id`
    pub fn receive(&self, qubit_id: u32) -> Option<CrossMessage> {
        let config = self.config.load();
        if !config.enabled {
            return None;
        }

        let mut queue = self.queue.lock();
        if config.max_message_age_ms > 0 {
            let now = self.clock.now_ms();
            let before = queue.len();
            queue.retain(|m| now.saturating_sub(m.timestamp_ms) <= config.max_message_age_ms);
            let expired = before - queue.len();
            if expired > 0 {
                self.counters.expired.fetch_add(expired as u64, Ordering::Relaxed);
                debug!("Bus: discarded {} expired messages", expired);
            }
        }

        let position = queue.iter().position(|m| m.sender_id != qubit_id)?;
        let message = queue.remove(position)?;
        drop(queue);

        self.counters.received.fetch_add(1, Ordering::Relaxed);
        Some(message)
    }

    /// Record `solution` as the best one if its quality is strictly higher,
    /// then broadcast it as `BestFound`
    pub fn broadcast_best(&self, sender_id: u32, solution: &[u8], quality_score: u32) -> Result<(), BusError> {
        {
            let mut best = self.best.lock();
            let improves = best
                .as_ref()
                .map_or(true, |b| quality_score > b.quality_score);
            if improves {
                *best = Some(BestSolution {
                    qubit_id: sender_id,
                    quality_score,
                    data: solution.to_vec(),
                });
                info!("Bus: new global best from qubit {} (quality {})", sender_id, quality_score);
            }
        }

        if !self.config.load().broadcast_enabled {
            return Ok(());
        }
        self.send(sender_id, MessageType::BestFound, solution, BROADCAST)
            .map(|_| ())
    }

    /// Broadcast a knowledge hint: a little-endian type tag followed by a
    /// zero-padded 256-byte block
    pub fn share_knowledge(&self, qubit_id: u32, knowledge_type: u32, data: &[u8]) -> Result<(), BusError> {
        if !self.config.load().broadcast_enabled {
            return Ok(());
        }

        let mut package = Vec::with_capacity(4 + KNOWLEDGE_BLOCK_SIZE);
        package.extend_from_slice(&knowledge_type.to_le_bytes());
        let len = data.len().min(KNOWLEDGE_BLOCK_SIZE);
        package.extend_from_slice(&data[..len]);
        package.resize(4 + KNOWLEDGE_BLOCK_SIZE, 0);

        self.send(qubit_id, MessageType::Hint, &package, BROADCAST)?;
        debug!("Bus: qubit {} shared knowledge type {}", qubit_id, knowledge_type);
        Ok(())
    }

    /// Sender of the best solution, once any has been broadcast
    pub fn check_convergence(&self) -> Option<u32> {
        self.best.lock().as_ref().map(|b| b.qubit_id)
    }

    pub fn best_solution(&self) -> Option<BestSolution> {
        self.best.lock().clone()
    }

    pub fn mark_helpful(&self) {
        self.counters.helpful.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mark_ignored(&self) {
        self.counters.ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Drop queued messages and the best-solution record; statistics are kept
    pub fn clear(&self) {
        let discarded = {
            let mut queue = self.queue.lock();
            let n = queue.len();
            queue.clear();
            n
        };
        *self.best.lock() = None;
        debug!("Bus: cleared {} pending messages", discarded);
    }

    /// Clear and zero the statistics
    pub fn reset(&self) {
        self.clear();
        self.counters.reset();
    }

    pub fn stats(&self) -> BusStats {
        let c = &self.counters;
        BusStats {
            messages_sent: c.sent.load(Ordering::Relaxed),
            messages_received: c.received.load(Ordering::Relaxed),
            messages_dropped: c.dropped.load(Ordering::Relaxed),
            messages_expired: c.expired.load(Ordering::Relaxed),
            helpful_messages: c.helpful.load(Ordering::Relaxed),
            ignored_messages: c.ignored.load(Ordering::Relaxed),
            queued: self.pending(),
        }
    }

    pub fn print_stats(&self) -> BusStats {
        let stats = self.stats();
        info!(
            "Bus statistics: sent={} received={} dropped={} expired={} helpful={} ignored={}",
            stats.messages_sent,
            stats.messages_received,
            stats.messages_dropped,
            stats.messages_expired,
            stats.helpful_messages,
            stats.ignored_messages
        );
        if let Some(best) = self.best_solution() {
            info!("  best solution: qubit {} quality={}", best.qubit_id, best.quality_score);
        }
        stats
    }
}
