//! Drive the engine with the synthetic cushion on a simulated clock.
//!
//! Run with `cargo run --example mock_session`.

use cushion_link::clock::{Clock, ManualClock};
use cushion_link::core::{CushionEngine, EngineEvent, EngineOptions, HistoryAggregator};
use cushion_link::diagnostics::create_shared_log;
use cushion_link::source::MockSource;

fn main() {
    let clock = ManualClock::new(0);
    let log = create_shared_log();
    let mut engine = CushionEngine::new(EngineOptions::default(), HistoryAggregator::new(), log.clone());
    let mut source = MockSource::new(Some(7));

    // Two full posture cycles at one tick per second.
    for _ in 0..400 {
        for event in engine.pump(&mut source, clock.now_ms()) {
            match event {
                EngineEvent::PostureChanged { to, .. } => {
                    println!("{:>4}s  posture -> {to}", clock.now_ms() / 1000);
                }
                EngineEvent::PostureAlert { label, .. } => {
                    println!("{:>4}s  ALERT {}", clock.now_ms() / 1000, label.description());
                }
                EngineEvent::SessionClosed(record) => {
                    println!(
                        "{:>4}s  session closed: {}s, {} alert(s)",
                        clock.now_ms() / 1000,
                        record.duration,
                        record.alert_count
                    );
                }
                _ => {}
            }
        }
        clock.advance(1_000);
    }

    let summary = engine.history().summary(7);
    println!();
    println!("Sessions: {}", summary.sessions);
    println!("Upright share: {:.0}%", summary.posture_share.normal * 100.0);
    println!();
    println!("{}", log.summary());
}
