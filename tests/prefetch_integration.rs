//! End-to-end tests for the public prefetch API
//!
//! Each test forks real worker processes, so records cross a process boundary.

use dataflow_prefetch::{
    Count, Coordinator, LifecycleState, PrefetchConfig, PrefetchError, RangeSource,
    SourcePipeline,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Sample {
    id: u32,
    label: String,
    pixels: Vec<u8>,
}

/// Structured records with a payload, to exercise framing beyond small integers.
struct SampleSource {
    next: u32,
    len: u32,
}

impl SourcePipeline for SampleSource {
    type Record = Sample;

    fn reset_state(&mut self) {
        self.next = 0;
    }

    fn produce(&mut self) -> Option<Sample> {
        if self.next >= self.len {
            self.next = 0;
            return None;
        }
        let id = self.next;
        self.next += 1;
        Some(Sample {
            id,
            label: format!("sample-{id}"),
            pixels: vec![id as u8; 4096],
        })
    }

    fn size(&self) -> Option<usize> {
        Some(self.len as usize)
    }
}

#[test]
fn test_one_worker_delivers_pass_in_order() -> anyhow::Result<()> {
    let mut coordinator = Coordinator::spawn(RangeSource::new(0, 5), PrefetchConfig::queue(1, 2))?;

    assert_eq!(coordinator.state(), LifecycleState::Running);
    let records = coordinator.records()?.collect::<Result<Vec<_>, _>>()?;
    assert_eq!(records, vec![0, 1, 2, 3, 4]);

    coordinator.close();
    assert_eq!(coordinator.state(), LifecycleState::Closed);
    Ok(())
}

#[test]
fn test_message_transport_with_structured_records() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let config = PrefetchConfig::message(2, dir.path());
    let mut coordinator = Coordinator::spawn(SampleSource { next: 0, len: 8 }, config)?;

    assert_eq!(coordinator.count(), Count::Known(8));
    let samples = coordinator.records()?.collect::<Result<Vec<_>, _>>()?;
    assert_eq!(samples.len(), 8);
    for sample in &samples {
        assert!(sample.id < 8);
        assert_eq!(sample.label, format!("sample-{}", sample.id));
        assert_eq!(sample.pixels.len(), 4096);
    }

    coordinator.close();
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())?.collect();
    assert!(leftovers.is_empty(), "socket file left behind");
    Ok(())
}

#[test]
fn test_unknown_count_streams_from_every_worker() -> anyhow::Result<()> {
    let mut coordinator = Coordinator::spawn(
        RangeSource::without_size(0, 4),
        PrefetchConfig::queue(3, 8),
    )?;

    assert_eq!(coordinator.count(), Count::Unknown);
    let seen: HashSet<u64> = coordinator
        .records()?
        .take(60)
        .collect::<Result<_, _>>()?;
    assert_eq!(seen, HashSet::from([0, 1, 2, 3]));
    Ok(())
}

#[test]
fn test_close_twice_then_pull_fails() -> anyhow::Result<()> {
    let mut coordinator = Coordinator::spawn(RangeSource::new(0, 3), PrefetchConfig::queue(2, 4))?;
    assert!(coordinator.next_record()? < 3);

    coordinator.close();
    coordinator.close();

    assert!(matches!(coordinator.next_record(), Err(PrefetchError::Closed)));
    assert!(matches!(coordinator.records(), Err(PrefetchError::Closed)));
    Ok(())
}

#[test]
fn test_missing_pipe_dir_is_rejected_before_forking() {
    let dir = TempDir::new().unwrap();
    let config = PrefetchConfig::message(1, dir.path().join("missing"));

    let result = Coordinator::spawn(RangeSource::new(0, 3), config);
    assert!(matches!(
        result,
        Err(PrefetchError::EndpointDirectory { .. })
    ));
}
