//! Dining philosophers over the transactional store
//!
//! Each fork is a store key holding `Option<usize>` (the current owner).
//! A philosopher grabs both neighboring forks in a single transaction, so a
//! conflicting grab aborts with `ConcurrentUpdate` and is retried after a
//! random jitter. No ordering discipline on the forks is needed: atomicity
//! of the two-key commit rules out the circular-wait deadlock.

use std::thread;
use std::time::Duration;

use rand::Rng;

use mtask::{env_get, init_logging, Store};

const SEATS: usize = 5;

fn fork_key(i: usize) -> String {
    format!("fork.{}", i)
}

fn main() {
    init_logging();
    let meals: u32 = env_get("MTK_MEALS", 5);
    println!("=== Dining Philosophers (STM) ===\n");

    let forks: Store<Option<usize>> = Store::new();
    for i in 0..SEATS {
        forks.insert(fork_key(i), None);
    }

    let diners: Vec<_> = (0..SEATS)
        .map(|seat| {
            let forks = forks.clone();
            thread::spawn(move || dine(seat, meals, forks))
        })
        .collect();
    for d in diners {
        if d.join().is_err() {
            eprintln!("[Table] a philosopher panicked");
        }
    }

    let stats = forks.stats();
    println!(
        "\n[Table] {} commits, {} conflicts retried",
        stats.commits, stats.conflicts
    );
    println!("\n=== Example Complete ===");
}

fn dine(seat: usize, meals: u32, forks: Store<Option<usize>>) {
    let left = fork_key(seat);
    let right = fork_key((seat + 1) % SEATS);
    let mut rng = rand::rng();
    let mut eaten = 0;

    while eaten < meals {
        let grabbed = mtask::retry(&forks, &[left.as_str(), right.as_str()], 10_000, |tx| {
            if tx.get(&left)?.is_none() && tx.get(&right)?.is_none() {
                tx.set(&left, Some(seat))?;
                tx.set(&right, Some(seat))?;
                Ok(true)
            } else {
                Ok(false)
            }
        });

        match grabbed {
            Ok(true) => {}
            Ok(false) => {
                // Neighbor is eating; think a little and try again
                thread::sleep(Duration::from_micros(rng.random_range(50..500)));
                continue;
            }
            Err(e) => {
                eprintln!("[Philosopher {}] starved out: {}", seat, e);
                return;
            }
        }

        println!("[Philosopher {}] eating (meal {})", seat, eaten + 1);
        thread::sleep(Duration::from_millis(rng.random_range(1..5)));

        let released = mtask::retry(&forks, &[left.as_str(), right.as_str()], 10_000, |tx| {
            tx.set(&left, None)?;
            tx.set(&right, None)
        });
        if let Err(e) = released {
            eprintln!("[Philosopher {}] failed to release forks: {}", seat, e);
            return;
        }
        eaten += 1;
    }
    println!("[Philosopher {}] done", seat);
}
