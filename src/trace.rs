//! Chrome Tracing collector for scheduler visualization.
//!
//! Records one span per executed chunk and per pooled `parallel_for` call
//! into thread-local buffers, with no contention on the hot path. The
//! collected spans can be exported to a JSON file loadable in
//! chrome://tracing or ui.perfetto.dev. Only built with the `trace`
//! feature.

use std::cell::RefCell;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// A single span in Chrome Tracing format.
#[derive(Debug, Clone)]
pub struct TraceSpan {
    pub name: &'static str,
    pub tid: usize,
    pub start_us: u64,
    pub duration_us: u64,
}

thread_local! {
    static SPAN_BUFFER: RefCell<Vec<TraceSpan>> = RefCell::new(Vec::with_capacity(4096));
}

lazy_static::lazy_static! {
    static ref GLOBAL_START: Instant = Instant::now();
    static ref EPOCH_START_US: u64 = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_micros() as u64;
    static ref ALL_BUFFERS: Mutex<Vec<Vec<TraceSpan>>> = Mutex::new(Vec::new());
}

/// Records a completed span.
pub fn record_span(name: &'static str, tid: usize, start: Instant, duration: Duration) {
    let start_us = (start.duration_since(*GLOBAL_START).as_micros() as u64) + *EPOCH_START_US;
    SPAN_BUFFER.with(|buf| {
        buf.borrow_mut().push(TraceSpan {
            name,
            tid,
            start_us,
            duration_us: duration.as_micros() as u64,
        });
    });
}

/// Moves the current thread's buffer into the global list. Workers call
/// this at exit; the driving thread should call it before exporting.
pub fn collect_local_spans() {
    SPAN_BUFFER.with(|buf| {
        let mut local = buf.borrow_mut();
        if !local.is_empty() {
            ALL_BUFFERS.lock().unwrap().push(std::mem::take(&mut *local));
        }
    });
}

/// Writes all collected spans to `path` in Chrome Tracing JSON.
pub fn export_to_file(path: &str) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    let buffers = ALL_BUFFERS.lock().unwrap();

    writeln!(writer, "[")?;
    let mut first = true;
    for buffer in buffers.iter() {
        for span in buffer {
            if !first {
                writeln!(writer, ",")?;
            }
            first = false;

            // ph: X is a "Complete Event" (carries its duration).
            write!(
                writer,
                "{{\"name\":\"{}\",\"ph\":\"X\",\"ts\":{},\"dur\":{},\"pid\":1,\"tid\":{}}}",
                span.name, span.start_us, span.duration_us, span.tid
            )?;
        }
    }
    write!(writer, "\n]\n")?;
    writer.flush()
}

/// RAII helper recording a span from construction to drop.
pub struct SpanGuard {
    name: &'static str,
    tid: usize,
    start: Instant,
}

impl SpanGuard {
    pub fn new(name: &'static str, tid: usize) -> Self {
        Self {
            name,
            tid,
            start: Instant::now(),
        }
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        record_span(self.name, self.tid, self.start, self.start.elapsed());
    }
}
