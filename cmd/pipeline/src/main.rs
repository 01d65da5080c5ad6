//! Hello-world pipeline example
//!
//! A producer component emits one greeting per pass, a postman relays them
//! and a consumer prints what arrives. Over 100 passes the consumer sees 99
//! messages: the postman runs one pass behind the producer.

use std::cell::Cell;
use std::rc::Rc;

use mtask::{
    init_logging, Component, Kernel, Message, MicroTask, RunMode, Step, INBOX, OUTBOX,
};

fn main() {
    init_logging();
    println!("=== MicroTask Pipeline Example ===\n");

    let mut kernel = Kernel::with_run_mode(RunMode::Passes(100));

    let producer = Component::new("producer").into_ref();
    let consumer = Component::new("consumer").into_ref();

    let p = Rc::clone(&producer);
    let mut n = 0u32;
    kernel.activate(MicroTask::new("producer", move || {
        let greeting = format!("hello world #{}", n);
        n += 1;
        if p.borrow_mut().send(Message::data(greeting), OUTBOX).is_err() {
            println!("[Producer] outbox full, dropping turn");
        }
        Step::Yield
    }));

    let received = Rc::new(Cell::new(0u32));
    let seen = Rc::clone(&received);
    let c = Rc::clone(&consumer);
    kernel.activate(MicroTask::new("consumer", move || {
        while let Ok(msg) = c.borrow_mut().recv(INBOX) {
            if let Some(text) = msg.downcast::<String>() {
                println!("[Consumer] {}", text);
                seen.set(seen.get() + 1);
            }
        }
        Step::Yield
    }));

    kernel.link(&producer, OUTBOX, &consumer, INBOX, None);
    kernel.run();

    let stats = kernel.stats();
    println!(
        "\n[Kernel] {} passes, {} resumptions, {} messages delivered",
        stats.passes,
        stats.resumptions,
        received.get()
    );
    println!("\n=== Example Complete ===");
}
