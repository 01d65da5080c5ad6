//! Timer-driven threaded component example
//!
//! Schedules three timers at +10ms, +50ms and +200ms against a component
//! living on the main thread, plus one from a remote that gets cancelled
//! before it can fire. The component sleeps between deadlines instead of
//! polling and drains each fired payload from its "event" inbox.

use std::time::{Duration, Instant};

use mtask::{init_logging, Message, ThreadedComponent, EVENT};

fn main() {
    init_logging();
    println!("=== Timer Heap Example ===\n");

    let mut clock = ThreadedComponent::new("clock");
    let start = Instant::now();

    clock.schedule_rel(Message::data("fast"), Duration::from_millis(10), 0);
    clock.schedule_rel(Message::data("medium"), Duration::from_millis(50), 0);
    clock.schedule_rel(Message::data("slow"), Duration::from_millis(200), 0);

    let remote = clock.remote();
    let doomed = remote.schedule_rel(Message::data("never"), Duration::from_millis(100), 0);
    assert!(remote.cancel(doomed));
    println!("[Clock] 3 timers armed, 1 remote timer cancelled\n");

    let mut fired = 0;
    while fired < 3 {
        clock.wait_event();
        while let Ok(msg) = clock.recv(EVENT) {
            let label = msg.downcast::<&str>().unwrap_or("?");
            println!("[Clock] +{:>3}ms {}", start.elapsed().as_millis(), label);
            fired += 1;
        }
    }

    println!("\n=== Example Complete ===");
}
