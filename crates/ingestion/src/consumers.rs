//! Reference consumers for the sync engine
//!
//! - [`PassThroughSummer`]: sums aligned video PRIs, or forwards the first
//!   enabled channel untouched when the algorithm is disabled
//! - [`CpiBatcher`]: collects complete CPIs for downstream processing

use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use contracts::{PriMessage, PriPayload, PriRef};
use sync_engine::{AlignedConsumer, CpiConsumer, LockedChannels};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

/// Sums the aligned PRIs of all enabled channels gate by gate.
///
/// Output length is the shortest input. With the algorithm disabled, or a
/// single enabled channel, the first enabled channel's message is forwarded
/// as is.
#[derive(Debug, Default)]
pub struct PassThroughSummer {
    output: Option<UnboundedSender<PriRef>>,
    emitted: u64,
    passed_through: u64,
}

impl PassThroughSummer {
    /// Summer that only counts its output
    pub fn new() -> Self {
        Self::default()
    }

    /// Summer forwarding its output to `output`
    pub fn with_output(output: UnboundedSender<PriRef>) -> Self {
        Self {
            output: Some(output),
            ..Default::default()
        }
    }

    /// Messages delivered to the output
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Messages forwarded without summing
    pub fn passed_through(&self) -> u64 {
        self.passed_through
    }

    fn emit(&mut self, msg: PriRef) -> bool {
        if let Some(output) = &self.output {
            if output.send(msg).is_err() {
                warn!("summer output closed");
                return false;
            }
        }
        self.emitted += 1;
        true
    }
}

impl AlignedConsumer for PassThroughSummer {
    fn process_aligned(&mut self, channels: &mut LockedChannels<'_>) -> bool {
        let algorithm_enabled = channels.is_algorithm_enabled();
        let (fronts, min_samples) = channels.pop_enabled_fronts();
        let Some((_, first)) = fronts.first() else {
            return true;
        };

        if !algorithm_enabled || fronts.len() == 1 {
            let first = Arc::clone(first);
            let sent = self.emit(first);
            if sent {
                self.passed_through += 1;
            }
            return sent;
        }

        let summed = sum_video(&fronts, min_samples).unwrap_or_else(|| Arc::clone(first));
        self.emit(summed)
    }

    fn channel_enabled_changed(&mut self, index: usize, enabled: bool) {
        debug!(channel = index, enabled, "summer input changed");
    }
}

/// Gate-wise saturating sum of video payloads.
///
/// Returns `None` if any input is not video.
fn sum_video(fronts: &[(usize, PriRef)], samples: usize) -> Option<PriRef> {
    let (_, first) = fronts.first()?;
    let mut sums = vec![0i32; samples];
    for (_, msg) in fronts {
        let PriPayload::Video(data) = &msg.payload else {
            return None;
        };
        for (sum, gate) in sums.iter_mut().zip(data.chunks_exact(2)) {
            *sum += i32::from(i16::from_le_bytes([gate[0], gate[1]]));
        }
    }

    let mut buf = BytesMut::with_capacity(samples * 2);
    for sum in sums {
        buf.put_i16_le(sum.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16);
    }

    Some(
        PriMessage::new(
            first.sequence_counter,
            first.waveform_code,
            PriPayload::Video(buf.freeze()),
        )
        .into_ref(),
    )
}

/// One complete CPI across all enabled channels
#[derive(Debug, Clone)]
pub struct CpiBatch {
    /// Sequence counter of the first PRI
    pub sequence_counter: u32,

    /// Waveform code shared by every PRI
    pub waveform_code: u32,

    /// `cpi_span` PRIs per enabled channel, by channel index
    pub pulses: Vec<(usize, Vec<PriRef>)>,
}

impl CpiBatch {
    /// PRIs per channel
    pub fn span(&self) -> usize {
        self.pulses.first().map_or(0, |(_, p)| p.len())
    }
}

/// Pops complete CPIs and forwards them as [`CpiBatch`]es
#[derive(Debug, Default)]
pub struct CpiBatcher {
    output: Option<UnboundedSender<CpiBatch>>,
    batches: u64,
    last: Option<CpiBatch>,
}

impl CpiBatcher {
    /// Batcher that keeps only the latest CPI
    pub fn new() -> Self {
        Self::default()
    }

    /// Batcher forwarding every CPI to `output`
    pub fn with_output(output: UnboundedSender<CpiBatch>) -> Self {
        Self {
            output: Some(output),
            ..Default::default()
        }
    }

    /// CPIs delivered to the output
    pub fn batches(&self) -> u64 {
        self.batches
    }

    /// Most recent CPI
    pub fn last(&self) -> Option<&CpiBatch> {
        self.last.as_ref()
    }
}

impl CpiConsumer for CpiBatcher {
    fn process_cpi(&mut self, channels: &mut LockedChannels<'_>, cpi_span: usize) -> bool {
        let pulses: Vec<(usize, Vec<PriRef>)> = channels
            .enabled_indices()
            .into_iter()
            .map(|index| (index, channels.take_front(index, cpi_span)))
            .collect();

        let Some(first) = pulses.first().and_then(|(_, p)| p.first()) else {
            return true;
        };
        let batch = CpiBatch {
            sequence_counter: first.sequence_counter,
            waveform_code: first.waveform_code,
            pulses,
        };

        if let Some(output) = &self.output {
            if output.send(batch.clone()).is_err() {
                warn!(
                    sequence_counter = batch.sequence_counter,
                    "cpi output closed"
                );
                return false;
            }
        }
        self.batches += 1;
        self.last = Some(batch);
        true
    }

    fn channel_enabled_changed(&mut self, index: usize, enabled: bool) {
        debug!(channel = index, enabled, "cpi input changed");
    }
}
