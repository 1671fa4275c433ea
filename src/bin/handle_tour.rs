use colored::Colorize;
use std::convert::Infallible;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use unique_handle::handle::{HandleTraits, UniqueHandle};

// =============================================================================
// A stand-in for kernel events: ids handed out by a counter, closes counted
// =============================================================================

static NEXT_EVENT: AtomicU32 = AtomicU32::new(1);
static CLOSED: AtomicUsize = AtomicUsize::new(0);

fn create_event() -> u32 {
    let id = NEXT_EVENT.fetch_add(1, Ordering::Relaxed);
    println!("    create_event -> {id}");
    id
}

fn close_event(id: u32) {
    println!("    close_event({id})");
    CLOSED.fetch_add(1, Ordering::Relaxed);
}

struct EventTraits;

impl HandleTraits for EventTraits {
    type Raw = u32;
    type Error = Infallible;

    fn invalid() -> u32 {
        0
    }

    fn close(value: u32) -> Result<(), Infallible> {
        close_event(value);
        Ok(())
    }
}

type EventHandle = UniqueHandle<EventTraits>;

fn section(title: &str) {
    println!("\n{}", format!("== {title} ==").bold().cyan());
}

// =============================================================================
// Walkthrough
// =============================================================================

fn init_handle_to_null() {
    section("Initialise to the sentinel");
    let h = EventHandle::new(0);
    if h.is_valid() {
        println!("    unreachable: the handle is empty");
    }
    println!("    valid: {}", h.is_valid());
}

fn init_handle_to_value() {
    section("Initialise to a value");
    let event = EventHandle::new(create_event());
    if event.is_valid() {
        println!("    signalling event {}", event.get());
    }
} // closed here

fn release_handle() {
    section("Release ownership");
    let mut event = EventHandle::new(create_event());
    let danger = event.release();
    println!("    handle now valid: {}", event.is_valid());
    // We own the raw id now, so we close it ourselves.
    close_event(danger);
}

fn reset_handle() {
    section("Reset to a new value");
    let mut event = EventHandle::new(create_event());
    if event.reset(create_event()) {
        println!("    {}", "new handle is valid".green());
    }
    let same = event.get();
    event.reset(same);
    println!("    reset to the same id closes nothing");
} // closes the second event

fn move_and_swap() {
    section("Move and swap");
    let mut a = EventHandle::new(create_event());
    let mut b = a.take();
    println!("    after take: a valid = {}, b = {}", a.is_valid(), b.get());
    a.swap(&mut b);
    println!("    after swap: a = {}, b valid = {}", a.get(), b.is_valid());
    b.assign(a.take());
    println!("    after assign: a valid = {}, b = {}", a.is_valid(), b.get());
}

/// Events created and closed so far.
fn event_counts() -> (usize, usize) {
    let created = NEXT_EVENT.load(Ordering::Relaxed) - 1;
    (created as usize, CLOSED.load(Ordering::Relaxed))
}

fn walkthrough() {
    init_handle_to_null();
    init_handle_to_value();
    release_handle();
    reset_handle();
    move_and_swap();
}

fn main() {
    unique_handle::logging::init("info");

    walkthrough();

    let (created, closed) = event_counts();
    let summary = format!("\ncreated {created} events, closed {closed}");
    if created == closed {
        println!("{}", summary.green());
    } else {
        println!("{}", summary.red());
    }
}

// =============================================================================
// Tests
// =============================================================================
