//! Parent/child shutdown handshake over a rendezvous link
//!
//! The child does a few turns of work, then hands its result to the parent
//! through a synchronous link and parks until the parent takes it. The
//! parent dawdles before accepting; the child gets zero resumptions in
//! between, which is the whole point of the rendezvous.

use mtask::{init_logging, Kernel, Message, MicroTask, RunMode, Step};

fn main() {
    init_logging();
    println!("=== Rendezvous Example ===\n");

    let mut kernel = Kernel::with_run_mode(RunMode::UntilIdle);
    let (_id, tx, rx) = kernel.link_sync();

    let mut work_left = 3u32;
    let mut handed_off = false;
    kernel.activate(MicroTask::new("child", move || {
        if work_left > 0 {
            println!("[Child] working ({} turns left)", work_left);
            work_left -= 1;
            return Step::Yield;
        }
        if !handed_off {
            handed_off = true;
            println!("[Child] offering result, parking until taken");
            match tx.send(Message::data(42u32)) {
                Ok(waker) => return Step::Wait(waker),
                Err(_) => return Step::Terminate,
            }
        }
        println!("[Child] handoff confirmed, exiting");
        Step::Terminate
    }));

    let mut patience = 6u32;
    kernel.activate(MicroTask::new("parent", move || {
        if patience > 0 {
            patience -= 1;
            return Step::Yield;
        }
        match rx.recv() {
            Ok(msg) => {
                println!("[Parent] child produced {:?}", msg.downcast::<u32>());
                Step::Terminate
            }
            Err(_) => Step::Yield,
        }
    }));

    kernel.run();
    println!("\n[Kernel] {} passes", kernel.stats().passes);
    println!("\n=== Example Complete ===");
}
