//! End-to-end: raw bytes on a channel through the deframer into the engine.

use crossbeam_channel::bounded;
use cushion_link::clock::{Clock, ManualClock};
use cushion_link::config::{DisconnectPolicy, ThresholdConfig};
use cushion_link::core::{
    CushionEngine, EngineEvent, EngineOptions, HistoryAggregator, MemoryStore, PostureLabel,
};
use cushion_link::diagnostics::create_shared_log;
use cushion_link::protocol::codec::{encode, payload_from_reading};
use cushion_link::protocol::types::Command;
use cushion_link::source::{MockSource, StreamSource};
use cushion_link::SensorReading;

fn sensor_frame(pressures: [u16; 4], temperature: f64, humidity: f64) -> Vec<u8> {
    let reading = SensorReading::new(pressures, temperature, humidity, 0);
    encode(Command::SensorData, &payload_from_reading(&reading)).unwrap()
}

fn engine(policy: DisconnectPolicy) -> (CushionEngine, MemoryStore) {
    let store = MemoryStore::new();
    let history = HistoryAggregator::with_store(Box::new(store.clone())).unwrap();
    let options = EngineOptions {
        disconnect_policy: policy,
        ..EngineOptions::default()
    };
    (CushionEngine::new(options, history, create_shared_log()), store)
}

#[test]
fn test_noisy_stream_drives_a_session() {
    let (tx, rx) = bounded(64);
    let mut source = StreamSource::new("test", rx);
    let (mut engine, store) = engine(DisconnectPolicy::Close);
    let clock = ManualClock::new(1_700_000_000_000);

    let normal = sensor_frame([200, 200, 220, 220], 25.0, 60.0);
    let lean = sensor_frame([330, 170, 350, 150], 25.0, 60.0);
    let empty = sensor_frame([0, 0, 0, 0], 25.0, 60.0);

    let mut corrupt = normal.clone();
    corrupt[5] ^= 0x40;

    let script: Vec<Vec<u8>> = vec![
        normal.clone(),
        // split across two chunks with leading noise
        [vec![0x00, 0x7F], normal[..6].to_vec()].concat(),
        normal[6..].to_vec(),
        corrupt,
        lean.clone(),
        lean.clone(),
        empty,
    ];

    let mut events = Vec::new();
    for chunk in script {
        tx.send(chunk).unwrap();
        events.extend(engine.pump(&mut source, clock.now_ms()));
        clock.advance(1_000);
    }

    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::SessionOpened { .. })));
    let record = events
        .iter()
        .find_map(|e| match e {
            EngineEvent::SessionClosed(r) => Some(r.clone()),
            _ => None,
        })
        .expect("session closed");

    // Readings at 0, 2, 4 and 5 s; the chunks that completed no reading add
    // nothing, so each gap is credited to the posture that ends it.
    assert_eq!(record.duration, 5);
    assert_eq!(record.posture_breakdown.normal, 2.0);
    assert_eq!(record.posture_breakdown.lean_left, 3.0);
    assert_eq!(store.records().len(), 1);

    let stats = engine.link_log().stats();
    assert_eq!(stats.readings_processed, 5);
    assert_eq!(stats.frames_dropped, 1);
    assert!(stats.bytes_discarded >= 2);
}

#[test]
fn test_transport_drop_closes_session() {
    let (tx, rx) = bounded(8);
    let mut source = StreamSource::new("test", rx);
    let (mut engine, store) = engine(DisconnectPolicy::Close);
    let normal = sensor_frame([200, 200, 220, 220], 25.0, 60.0);

    for t in 0..3u64 {
        tx.send(normal.clone()).unwrap();
        engine.pump(&mut source, t * 1000);
    }
    drop(tx);

    let events = engine.pump(&mut source, 3000);
    assert!(events.contains(&EngineEvent::LinkLost));
    let closed: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::SessionClosed(r) => Some(r),
            _ => None,
        })
        .collect();
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].duration, 2);
    assert_eq!(closed[0].end_time, 2000);
    assert_eq!(store.records().len(), 1);
    assert_eq!(engine.link_log().stats().disconnects, 1);

    // Further polls report the loss again without a second disconnect.
    let again = engine.pump(&mut source, 4000);
    assert_eq!(again, vec![EngineEvent::LinkLost]);
    assert_eq!(engine.link_log().stats().disconnects, 1);
}

#[test]
fn test_climate_commands_follow_hysteresis() {
    let (tx, rx) = bounded(16);
    let mut source = StreamSource::new("test", rx);
    let (mut engine, _) = engine(DisconnectPolicy::Close);
    engine.take_outbound();

    let thresholds = ThresholdConfig::default();
    let mut heating = Vec::new();
    for (i, temp) in [25.0, 20.0, 21.0, 23.0, 29.0, 27.0, 23.0].iter().enumerate() {
        tx.send(sensor_frame([200, 200, 220, 220], *temp, 60.0)).unwrap();
        engine.pump(&mut source, i as u64 * 1000);
        heating.push(engine.snapshot().effective.heating_on);
        assert_eq!(engine.thresholds(), thresholds);
    }
    assert_eq!(heating, vec![false, true, true, true, false, false, false]);

    // handshake (2), first full state (2), heating on then off (2)
    let commands = engine.link_log().stats().commands_sent;
    assert_eq!(commands, 2 + 4);
}

#[test]
fn test_mock_source_full_cycle() {
    let (mut engine, store) = engine(DisconnectPolicy::Close);
    let mut source = MockSource::new(Some(11));

    let mut labels = std::collections::HashSet::new();
    let mut alerts = 0;
    for t in 0..200u64 {
        for event in engine.pump(&mut source, t * 1000) {
            match event {
                EngineEvent::PostureChanged { to, .. } => {
                    labels.insert(to);
                }
                EngineEvent::PostureAlert { .. } => alerts += 1,
                _ => {}
            }
        }
    }

    assert!(labels.contains(&PostureLabel::CrossLegRight));
    assert!(labels.contains(&PostureLabel::LeanForward));
    assert!(labels.contains(&PostureLabel::Unseated));

    // One streak runs from the crossed legs through the forward lean.
    assert_eq!(alerts, 1);

    let records = store.records();
    assert_eq!(records.len(), 1);
    // Seated from the first tick until phase 150.
    assert_eq!(records[0].duration, 148);
    assert!(engine.snapshot().device_status.is_some());
}

#[test]
fn test_stand_up_and_sit_down_in_one_chunk() {
    let (tx, rx) = bounded(8);
    let mut source = StreamSource::new("test", rx);
    let (mut engine, store) = engine(DisconnectPolicy::Close);

    let normal = sensor_frame([200, 200, 220, 220], 25.0, 60.0);
    let empty = sensor_frame([0, 0, 0, 0], 25.0, 60.0);

    tx.send(normal.clone()).unwrap();
    engine.pump(&mut source, 0);
    tx.send(normal.clone()).unwrap();
    engine.pump(&mut source, 1000);

    tx.send([empty, normal].concat()).unwrap();
    let events = engine.pump(&mut source, 2000);

    let closed: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::SessionClosed(r) => Some(r),
            _ => None,
        })
        .collect();
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].duration, 1);
    assert_eq!(closed[0].end_time, 2000);
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, EngineEvent::SessionOpened { start_ms: 2000, .. }))
            .count(),
        1
    );

    assert_eq!(store.records().len(), 1);
    let snapshot = engine.snapshot();
    assert!(snapshot.occupied);
    assert_eq!(snapshot.elapsed_secs, 0);
    assert_eq!(snapshot.link.readings_processed, 4);
}

#[test]
fn test_quiet_link_adds_no_seated_time() {
    let (tx, rx) = bounded(8);
    let mut source = StreamSource::new("test", rx);
    let (mut engine, _) = engine(DisconnectPolicy::Close);
    let normal = sensor_frame([200, 200, 220, 220], 25.0, 60.0);

    tx.send(normal.clone()).unwrap();
    engine.pump(&mut source, 0);
    tx.send(normal[..4].to_vec()).unwrap();
    for t in 1..10u64 {
        engine.pump(&mut source, t * 1000);
    }

    let snapshot = engine.snapshot();
    assert!(snapshot.occupied);
    assert_eq!(snapshot.elapsed_secs, 0);
    assert_eq!(snapshot.reading.map(|r| r.timestamp_ms), Some(0));
}

#[test]
fn test_paused_session_resumes_on_reattached_stream() {
    let (tx, rx) = bounded(8);
    let mut source = StreamSource::new("test", rx);
    let (mut engine, store) = engine(DisconnectPolicy::Pause);
    let normal = sensor_frame([200, 200, 220, 220], 25.0, 60.0);

    for t in 0..3u64 {
        tx.send(normal.clone()).unwrap();
        engine.pump(&mut source, t * 1000);
    }
    drop(tx);
    let events = engine.pump(&mut source, 3000);
    assert!(events.contains(&EngineEvent::LinkLost));
    assert!(engine.snapshot().occupied);

    let (tx, rx) = bounded(8);
    source.reattach(rx);
    assert!(!source.is_disconnected());
    engine.reconnect();
    engine.take_outbound();

    for t in 60..63u64 {
        tx.send(normal.clone()).unwrap();
        engine.pump(&mut source, t * 1000);
    }

    // 2 s before the drop, 2 s after; the gap is not credited.
    assert_eq!(engine.snapshot().elapsed_secs, 4);
    assert!(store.records().is_empty());

    let closed = engine.shutdown();
    assert!(matches!(&closed[..], [EngineEvent::SessionClosed(r)] if r.duration == 4));
    assert_eq!(engine.link_log().stats().disconnects, 1);
}
