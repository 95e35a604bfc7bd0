//! Mock PRI source
//!
//! Stands in for the digitizer when no radar hardware is attached: emits
//! sequenced, waveform-coded PRIs at a fixed PRF, optionally losing some in
//! simulated transport.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_channel::{Sender, TrySendError};
use bytes::{BufMut, Bytes, BytesMut};
use contracts::{ChannelType, PriMessage, PriPayload, PriRef, SourceConfig};
use metrics::counter;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sync_engine::COUNTER_MASK;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use crate::config::{DropPolicy, IngestionMetrics};
use crate::error::{IngestionError, Result};

/// One delivered PRI and the channel it feeds
#[derive(Debug, Clone)]
pub struct ChannelMessage {
    /// Target channel index
    pub channel_index: usize,

    /// The message
    pub message: PriRef,
}

/// Mock PRI source configuration
#[derive(Debug, Clone)]
pub struct MockPriConfig {
    /// Channel name (for logs and metric labels)
    pub channel: String,

    /// Target channel index
    pub channel_index: usize,

    /// Payload type to generate
    pub channel_type: ChannelType,

    /// Pulse repetition frequency (Hz)
    pub prf_hz: f64,

    /// First sequence counter (masked to 16 bits)
    pub start_sequence: u32,

    /// PRIs per waveform code
    pub pulses_per_cpi: usize,

    /// Waveform codes cycled through, one per CPI
    pub waveform_codes: Vec<u32>,

    /// Probability that a PRI is lost before delivery
    pub drop_probability: f64,

    /// Samples (range gates) per PRI
    pub samples: usize,

    /// RNG seed for reproducible loss patterns
    pub seed: Option<u64>,

    /// Stop after generating this many PRIs
    pub pulse_limit: Option<u64>,
}

impl Default for MockPriConfig {
    fn default() -> Self {
        Self {
            channel: "input1".to_string(),
            channel_index: 0,
            channel_type: ChannelType::Video,
            prf_hz: 1000.0,
            start_sequence: 0,
            pulses_per_cpi: 16,
            waveform_codes: vec![1, 2],
            drop_probability: 0.0,
            samples: 256,
            seed: None,
            pulse_limit: None,
        }
    }
}

impl MockPriConfig {
    /// Build from a blueprint source entry
    pub fn from_source(source: &SourceConfig, channel_index: usize, channel_type: ChannelType) -> Self {
        Self {
            channel: source.channel.clone(),
            channel_index,
            channel_type,
            prf_hz: source.prf_hz,
            start_sequence: source.start_sequence,
            pulses_per_cpi: source.pulses_per_cpi,
            waveform_codes: source.waveform_codes.clone(),
            drop_probability: source.drop_probability,
            samples: source.samples,
            seed: None,
            pulse_limit: None,
        }
    }

    fn check(&self) -> Result<()> {
        let invalid = |message: &str| IngestionError::InvalidSource {
            channel: self.channel.clone(),
            message: message.to_string(),
        };
        if !self.prf_hz.is_finite() || self.prf_hz <= 0.0 {
            return Err(invalid("prf_hz must be > 0"));
        }
        if self.pulses_per_cpi == 0 {
            return Err(invalid("pulses_per_cpi must be > 0"));
        }
        if self.waveform_codes.is_empty() {
            return Err(invalid("waveform_codes must not be empty"));
        }
        Ok(())
    }
}

/// Deterministic PRI sequence: wrapping counters, one waveform code per
/// `pulses_per_cpi` pulses, Bernoulli transport loss.
#[derive(Debug)]
pub struct PriGenerator {
    sequence_counter: u32,
    pulse_in_cpi: usize,
    code_index: usize,
    pulses_per_cpi: usize,
    waveform_codes: Vec<u32>,
    drop_probability: f64,
    payload: PriPayload,
    rng: StdRng,
    generated: u64,
}

impl PriGenerator {
    /// Create a generator
    pub fn new(config: &MockPriConfig) -> Self {
        let drop_probability = if config.drop_probability.is_nan() {
            0.0
        } else {
            config.drop_probability.clamp(0.0, 1.0)
        };
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::seed_from_u64(rand::random()),
        };
        let waveform_codes = if config.waveform_codes.is_empty() {
            vec![0]
        } else {
            config.waveform_codes.clone()
        };

        Self {
            sequence_counter: config.start_sequence & COUNTER_MASK,
            pulse_in_cpi: 0,
            code_index: 0,
            pulses_per_cpi: config.pulses_per_cpi.max(1),
            waveform_codes,
            drop_probability,
            payload: template_payload(config.channel_type, config.samples),
            rng,
            generated: 0,
        }
    }

    /// Generate the next PRI.
    ///
    /// Returns `None` when the pulse was lost; its counter is consumed anyway.
    pub fn next_pulse(&mut self) -> Option<PriMessage> {
        let message = PriMessage::new(
            self.sequence_counter,
            self.waveform_codes[self.code_index],
            self.payload.clone(),
        );
        self.advance();

        let lost = self.drop_probability > 0.0 && self.rng.random_bool(self.drop_probability);
        (!lost).then_some(message)
    }

    /// Pulses generated so far, lost ones included
    pub fn generated(&self) -> u64 {
        self.generated
    }

    fn advance(&mut self) {
        self.generated += 1;
        self.sequence_counter = self.sequence_counter.wrapping_add(1) & COUNTER_MASK;
        self.pulse_in_cpi += 1;
        if self.pulse_in_cpi == self.pulses_per_cpi {
            self.pulse_in_cpi = 0;
            self.code_index = (self.code_index + 1) % self.waveform_codes.len();
        }
    }
}

/// Payload shared (zero-copy) by every pulse of a source
fn template_payload(channel_type: ChannelType, samples: usize) -> PriPayload {
    match channel_type {
        ChannelType::Video => {
            let mut buf = BytesMut::with_capacity(samples * 2);
            for gate in 0..samples {
                buf.put_i16_le((gate % 4096) as i16);
            }
            PriPayload::Video(buf.freeze())
        }
        ChannelType::BinaryVideo => {
            PriPayload::BinaryVideo((0..samples).map(|gate| (gate % 2) as u8).collect())
        }
        ChannelType::Raw => PriPayload::Raw(Bytes::from(vec![0u8; samples])),
    }
}

/// Mock PRI source
///
/// Runs a [`PriGenerator`] on a tokio task, paced by the PRF.
pub struct MockPriSource {
    config: MockPriConfig,
    running: Arc<AtomicBool>,
}

impl MockPriSource {
    /// Create a new mock source
    pub fn new(config: MockPriConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Video source for `channel_index` with default timing
    pub fn video(channel: &str, channel_index: usize, prf_hz: f64, pulses_per_cpi: usize) -> Self {
        Self::new(MockPriConfig {
            channel: channel.to_string(),
            channel_index,
            prf_hz,
            pulses_per_cpi,
            ..Default::default()
        })
    }

    /// Source configuration
    pub fn config(&self) -> &MockPriConfig {
        &self.config
    }

    /// Start the source, delivering into `tx`
    ///
    /// # Arguments
    /// * `tx` - Delivery queue shared with the other sources
    /// * `drop_policy` - Behaviour when the queue is full
    /// * `metrics` - Shared ingestion metrics
    pub fn start(
        &self,
        tx: Sender<ChannelMessage>,
        drop_policy: DropPolicy,
        metrics: Arc<IngestionMetrics>,
    ) -> Result<JoinHandle<()>> {
        self.config.check()?;
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(IngestionError::AlreadyRunning {
                channel: self.config.channel.clone(),
            });
        }

        let config = self.config.clone();
        let running = self.running.clone();

        Ok(tokio::spawn(async move {
            let mut generator = PriGenerator::new(&config);
            let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / config.prf_hz));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

            debug!(
                channel = %config.channel,
                channel_index = config.channel_index,
                prf_hz = config.prf_hz,
                pulses_per_cpi = config.pulses_per_cpi,
                "mock pri source started"
            );

            while running.load(Ordering::Relaxed) {
                if config
                    .pulse_limit
                    .is_some_and(|limit| generator.generated() >= limit)
                {
                    break;
                }
                ticker.tick().await;

                metrics.record_generated();
                let Some(pulse) = generator.next_pulse() else {
                    metrics.record_lost();
                    counter!("sidecar_ingestion_pulses_lost_total", "channel" => config.channel.clone())
                        .increment(1);
                    continue;
                };

                let sequence_counter = pulse.sequence_counter;
                let item = ChannelMessage {
                    channel_index: config.channel_index,
                    message: pulse.into_ref(),
                };

                let delivered = match drop_policy {
                    DropPolicy::DropNewest => match tx.try_send(item) {
                        Ok(()) => true,
                        Err(TrySendError::Full(_)) => {
                            metrics.record_dropped();
                            counter!("sidecar_ingestion_pulses_dropped_total", "channel" => config.channel.clone())
                                .increment(1);
                            false
                        }
                        Err(TrySendError::Closed(_)) => break,
                    },
                    DropPolicy::Block => {
                        if tx.send(item).await.is_err() {
                            break;
                        }
                        true
                    }
                };

                if delivered {
                    metrics.record_sent();
                    trace!(channel = %config.channel, sequence_counter, "mock pri sent");
                }
                metrics.update_queue_len(tx.len());
            }

            running.store(false, Ordering::SeqCst);
            debug!(
                channel = %config.channel,
                generated = generator.generated(),
                "mock pri source stopped"
            );
        }))
    }

    /// Stop the source
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Check whether the source is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}
