//! # Integration Tests
//!
//! Cross-crate and end-to-end tests.
//!
//! Covers:
//! - Config loading into a running engine
//! - Mock PRI sources through the CPI assembler and the sync controller
//! - Runtime reconfiguration through the shared channel handle

#[cfg(test)]
mod contract_tests {
    use contracts::{ChannelStatus, SyncStatus};

    #[test]
    fn test_status_line_format() {
        let status = SyncStatus {
            enabled: true,
            channels: vec![
                ChannelStatus { index: 0, size: 3 },
                ChannelStatus { index: 1, size: 0 },
                ChannelStatus { index: 2, size: 2 },
            ],
        };
        assert_eq!(status.to_string(), "C0[3]  C2[2]  ");
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::time::Duration;

    use contracts::{ChannelType, PriRef, SyncEngineConfig};
    use ingestion::{
        BackpressureConfig, ChannelMessage, CpiBatch, CpiBatcher, DropPolicy, IngestionPipeline,
        MockPriConfig, MockPriSource, PassThroughSummer,
    };
    use observability::StatusReporter;
    use sync_engine::{CpiAssembler, SyncController, COUNTER_MASK};
    use tokio::sync::mpsc;

    fn source(channel_index: usize, start: u32, limit: u64, drop: f64, seed: u64) -> MockPriSource {
        MockPriSource::new(MockPriConfig {
            channel: format!("input{}", channel_index + 1),
            channel_index,
            channel_type: ChannelType::Video,
            prf_hz: 5000.0,
            start_sequence: start,
            pulses_per_cpi: 8,
            waveform_codes: vec![3, 7],
            drop_probability: drop,
            samples: 32,
            seed: Some(seed),
            pulse_limit: Some(limit),
        })
    }

    fn pipeline(sources: Vec<MockPriSource>) -> IngestionPipeline {
        let mut pipeline =
            IngestionPipeline::with_config(BackpressureConfig::new(4096, DropPolicy::Block));
        for source in sources {
            pipeline.register_source(source);
        }
        pipeline
    }

    fn is_successor(prev: u32, next: u32) -> bool {
        (prev + 1) & COUNTER_MASK == next
    }

    fn assert_complete(batch: &CpiBatch, span: usize) {
        for (_, pulses) in &batch.pulses {
            assert_eq!(pulses.len(), span);
            assert_eq!(pulses[0].sequence_counter, batch.sequence_counter);
            assert!(pulses.iter().all(|p| p.waveform_code == batch.waveform_code));
            assert!(pulses
                .windows(2)
                .all(|w| is_successor(w[0].sequence_counter, w[1].sequence_counter)));
        }
    }

    /// Drive the engine from the delivery queue until every source stops
    async fn drain<F>(mut pipeline: IngestionPipeline, mut add: F)
    where
        F: FnMut(ChannelMessage),
    {
        let rx = pipeline.take_receiver().unwrap();
        pipeline.start_all().unwrap();

        let run = async {
            while let Ok(delivered) = rx.recv().await {
                add(delivered);
            }
        };
        tokio::time::timeout(Duration::from_secs(10), run)
            .await
            .expect("sources should finish");
        pipeline.join().await;
    }

    /// Two lossless sources crossing the counter wrap produce only
    /// complete, channel-aligned CPIs.
    #[tokio::test]
    async fn test_e2e_cpi_across_wrap() {
        let config = SyncEngineConfig::uniform(2, 256, true).with_cpi(8);
        let (tx, mut out) = mpsc::unbounded_channel();
        let mut assembler = CpiAssembler::new(&config, CpiBatcher::with_output(tx));

        let sources = vec![source(0, 65_500, 160, 0.0, 1), source(1, 65_500, 160, 0.0, 2)];
        drain(pipeline(sources), |m| {
            assembler.add_data(m.channel_index, m.message).unwrap();
        })
        .await;

        let mut batches = Vec::new();
        while let Ok(batch) = out.try_recv() {
            batches.push(batch);
        }

        // 20 CPIs per channel; the last one is never closed by a boundary
        assert_eq!(batches.len(), 19);
        for batch in &batches {
            assert_complete(batch, 8);
            assert_eq!(batch.pulses.len(), 2);
        }
        assert_eq!(batches[0].sequence_counter, 65_500);
        assert!(batches.iter().any(|b| b.sequence_counter < 100));
        assert!(batches
            .windows(2)
            .all(|w| w[0].waveform_code != w[1].waveform_code));
        assert_eq!(assembler.rejected_count(), 0);
    }

    /// Lossy sources with incomplete-CPI dropping never deliver a gapped or
    /// short CPI.
    #[tokio::test]
    async fn test_e2e_lossy_cpi_drops_incomplete() {
        let mut config = SyncEngineConfig::uniform(2, 256, true).with_cpi(8);
        if let Some(cpi) = config.cpi.as_mut() {
            cpi.drop_incomplete_cpi = true;
        }
        let (tx, mut out) = mpsc::unbounded_channel();
        let mut assembler = CpiAssembler::new(&config, CpiBatcher::with_output(tx));

        let sources = vec![source(0, 100, 800, 0.05, 11), source(1, 100, 800, 0.05, 12)];
        drain(pipeline(sources), |m| {
            assembler.add_data(m.channel_index, m.message).unwrap();
        })
        .await;

        let mut delivered = 0;
        while let Ok(batch) = out.try_recv() {
            assert_complete(&batch, 8);
            delivered += 1;
        }
        assert!(delivered > 0, "some CPIs survive 5% loss");
        assert!(assembler.rejected_count() > 0, "losses reject some CPIs");
    }

    /// Aligned mode sums one PRI per sequence counter, in counter order.
    #[tokio::test]
    async fn test_e2e_aligned_summing() {
        let config = SyncEngineConfig::uniform(2, 256, true);
        let (tx, mut out) = mpsc::unbounded_channel::<PriRef>();
        let mut controller = SyncController::new(&config, PassThroughSummer::with_output(tx));

        let sources = vec![source(0, 65_530, 64, 0.1, 21), source(1, 65_530, 64, 0.1, 22)];
        drain(pipeline(sources), |m| {
            controller.add_data(m.channel_index, m.message).unwrap();
        })
        .await;

        let mut outputs = Vec::new();
        while let Ok(msg) = out.try_recv() {
            outputs.push(msg);
        }

        assert!(!outputs.is_empty());
        assert_eq!(controller.aligned_count(), outputs.len() as u64);
        let wrap = controller.channels().wrap();
        assert!(outputs
            .windows(2)
            .all(|w| wrap.advances(w[0].sequence_counter, w[1].sequence_counter)));

        // Both template payloads hold gate % 4096, so each sum doubles it
        let first = outputs[0].payload.bytes();
        assert_eq!(i16::from_le_bytes([first[2], first[3]]), 2);
    }

    /// A blueprint loaded from TOML drives sources and engine end to end.
    #[tokio::test]
    async fn test_e2e_from_blueprint() {
        let blueprint = config_loader::ConfigLoader::load_from_str(
            r#"
[algorithm]
name = "summer"

[engine]
max_buffer_size = 128

[[engine.channels]]
name = "input1"

[[engine.channels]]
name = "input2"

[engine.cpi]
cpi_span = 4

[[sources]]
channel = "input1"
prf_hz = 4000.0
pulses_per_cpi = 4

[[sources]]
channel = "input2"
prf_hz = 4000.0
pulses_per_cpi = 4
"#,
            config_loader::ConfigFormat::Toml,
        )
        .unwrap();

        let mut ingestion = IngestionPipeline::from_blueprint(
            &blueprint,
            BackpressureConfig::new(1024, DropPolicy::Block),
        )
        .unwrap();
        let rx = ingestion.take_receiver().unwrap();
        ingestion.start_all().unwrap();

        let mut assembler = CpiAssembler::new(&blueprint.engine, CpiBatcher::new());
        let run = async {
            while assembler.cpi_count() < 5 {
                let Ok(m) = rx.recv().await else { break };
                assembler.add_data(m.channel_index, m.message).unwrap();
            }
        };
        tokio::time::timeout(Duration::from_secs(10), run)
            .await
            .unwrap();
        ingestion.stop_all();
        ingestion.join().await;

        assert!(assembler.cpi_count() >= 5);
        assert_complete(assembler.consumer().last().unwrap(), 4);
    }

    /// Disabling a channel through the shared handle takes it out of the
    /// next cycle and out of the status line.
    #[tokio::test]
    async fn test_runtime_disable_through_shared_handle() {
        let config = SyncEngineConfig::uniform(3, 256, true).with_cpi(8);
        let mut assembler = CpiAssembler::new(&config, CpiBatcher::new());
        let handle = assembler.channels().clone();

        let control = tokio::spawn(async move {
            handle.set_channel_enabled(2, false).unwrap();
            handle
        });
        let handle = control.await.unwrap();

        // Channel 2 never gets data; with it disabled the other two align
        let sources = vec![source(0, 0, 80, 0.0, 31), source(1, 0, 80, 0.0, 32)];
        drain(pipeline(sources), |m| {
            assembler.add_data(m.channel_index, m.message).unwrap();
        })
        .await;

        assert_eq!(assembler.cpi_count(), 9);
        let batch = assembler.consumer().last().unwrap();
        assert_eq!(batch.pulses.len(), 2);
        assert!(handle.status().channels.iter().all(|c| c.index != 2));
    }

    /// The status reporter reads buffer depths from the shared handle
    /// while the delivery path owns the engine.
    #[tokio::test]
    async fn test_status_reporter_follows_engine() {
        let config = SyncEngineConfig::uniform(2, 256, true).with_cpi(8);
        let mut assembler = CpiAssembler::new(&config, CpiBatcher::new());
        let handle = assembler.channels().clone();
        let reporter = StatusReporter::new("batcher", Duration::from_millis(5), move || {
            handle.status()
        });

        // Only channel 0 is fed, so nothing aligns and everything stays buffered
        let sources = vec![source(0, 0, 20, 0.0, 41)];
        drain(pipeline(sources), |m| {
            assembler.add_data(m.channel_index, m.message).unwrap();
        })
        .await;

        let status = reporter.report_once();
        assert_eq!(status.to_string(), "C0[20]  ");
        assert_eq!(assembler.cpi_count(), 0);

        let aggregator = reporter.aggregator();
        let summary = aggregator.lock().unwrap().summary();
        assert_eq!(summary.snapshots, 1);
        assert_eq!(summary.channel_depths[&0].max, 20.0);
    }
}
