use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;

use crate::packet::Flit;
use crate::sim::clock::Cycle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host towards the module.
    Down,
    Up,
}

impl Direction {
    fn as_str(&self) -> &'static str {
        match self {
            Direction::Down => "down",
            Direction::Up => "up",
        }
    }
}

/// CSV record of every flit crossing a traced boundary: `cycle,domain,direction,data,last`.
/// Shared between clock domains, so writes go through a lock.
pub struct FlitTrace {
    writer: Mutex<BufWriter<Box<dyn Write + Send>>>,
}

impl FlitTrace {
    pub fn create(path: &Path) -> anyhow::Result<Self> {
        let file = File::create(path).with_context(|| format!("cannot create trace {}", path.display()))?;
        Self::from_writer(Box::new(file)).context("cannot write trace header")
    }

    pub fn from_writer(inner: Box<dyn Write + Send>) -> std::io::Result<Self> {
        let mut writer = BufWriter::new(inner);
        writeln!(writer, "cycle,domain,direction,data,last")?;
        Ok(Self { writer: Mutex::new(writer) })
    }

    pub fn record(&self, cycle: Cycle, domain: &str, direction: Direction, flit: &Flit) {
        if let Ok(mut guard) = self.writer.lock() {
            let _ = writeln!(
                guard,
                "{},{},{},{:#06x},{}",
                cycle,
                domain,
                direction.as_str(),
                flit.data,
                flit.last as u8
            );
        }
    }

    pub fn flush(&self) {
        if let Ok(mut guard) = self.writer.lock() {
            let _ = guard.flush();
        }
    }
}

impl Drop for FlitTrace {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// Writer handing its bytes back to the test.
    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn lines_follow_the_header() {
        let out = Shared::default();
        let trace = FlitTrace::from_writer(Box::new(out.clone())).unwrap();
        trace.record(3, "host", Direction::Down, &Flit::body(0x0005));
        trace.record(4, "host", Direction::Up, &Flit::tail(0xbeef));
        trace.flush();
        let text = String::from_utf8(out.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            vec!["cycle,domain,direction,data,last", "3,host,down,0x0005,0", "4,host,up,0xbeef,1"],
            lines
        );
    }
}
