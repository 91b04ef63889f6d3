use std::{
    fmt, fs,
    io::{self, BufRead, BufReader, Read},
    num::ParseIntError,
    path::Path,
    thread::{self, JoinHandle},
};

use crossbeam::channel::{Receiver, Sender};
use xz2::read::XzDecoder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Load,
    Store,
    /// Load followed by a store to the same address.
    Modify,
}

impl Op {
    fn from_code(code: &str) -> Option<Op> {
        match code {
            "L" => Some(Op::Load),
            "S" => Some(Op::Store),
            "M" => Some(Op::Modify),
            _ => None,
        }
    }

    pub fn code(self) -> char {
        match self {
            Op::Load => 'L',
            Op::Store => 'S',
            Op::Modify => 'M',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    pub op: Op,
    pub addr: u64,
    pub size: u32,
}

impl Record {
    /// Addresses this record hands to the cache, in order.
    pub fn accesses(&self) -> impl Iterator<Item = u64> {
        let times = match self.op {
            Op::Load | Op::Store => 1,
            Op::Modify => 2,
        };
        std::iter::repeat(self.addr).take(times)
    }

    /// Parses one trace line. `Ok(None)` for lines the cache never sees:
    /// blanks, instruction fetches and unknown operations.
    pub fn parse(line: &str) -> Result<Option<Record>, LineError> {
        let line = line.trim();
        let Some((code, rest)) = line.split_once(char::is_whitespace) else {
            return match Op::from_code(line) {
                Some(_) => Err(LineError::MissingAddress),
                None => Ok(None),
            };
        };
        let Some(op) = Op::from_code(code) else {
            return Ok(None);
        };
        let (addr, size) = rest
            .trim()
            .split_once(',')
            .ok_or(LineError::MissingSize)?;
        let addr = u64::from_str_radix(addr.trim(), 16).map_err(LineError::BadAddress)?;
        let size = size.trim().parse().map_err(LineError::BadSize)?;
        Ok(Some(Record { op, addr, size }))
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:x},{}", self.op.code(), self.addr, self.size)
    }
}

/// Why a `L`/`S`/`M` line could not be read.
#[derive(Debug, PartialEq, Eq)]
pub enum LineError {
    MissingAddress,
    MissingSize,
    BadAddress(ParseIntError),
    BadSize(ParseIntError),
}

impl fmt::Display for LineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineError::MissingAddress => f.write_str("missing address"),
            LineError::MissingSize => f.write_str("expected <address>,<size>"),
            LineError::BadAddress(err) => write!(f, "bad address: {err}"),
            LineError::BadSize(err) => write!(f, "bad size: {err}"),
        }
    }
}

impl std::error::Error for LineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LineError::BadAddress(err) | LineError::BadSize(err) => Some(err),
            LineError::MissingAddress | LineError::MissingSize => None,
        }
    }
}

#[derive(Debug)]
pub enum TraceError {
    Io(io::Error),
    Malformed { line: usize, reason: LineError },
}

impl fmt::Display for TraceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceError::Io(err) => write!(f, "error reading trace: {err}"),
            TraceError::Malformed { line, reason } => {
                write!(f, "malformed trace line {line}: {reason}")
            }
        }
    }
}

impl std::error::Error for TraceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TraceError::Io(err) => Some(err),
            TraceError::Malformed { reason, .. } => Some(reason),
        }
    }
}

impl From<io::Error> for TraceError {
    fn from(err: io::Error) -> Self {
        TraceError::Io(err)
    }
}

pub type RecordBlock = Result<Vec<Record>, TraceError>;

/// Trace records streamed in blocks from a reader thread. The channel closes
/// at end of input; an `Err` is always the last block sent.
pub struct Trace {
    pub rec: Receiver<RecordBlock>,
    _thread: JoinHandle<()>,
}

impl Trace {
    /// Opens a trace file, decompressing it if the name ends in `.xz`.
    pub fn read(
        path: &Path,
        records_per_block: usize,
        blocks_per_queue: usize,
    ) -> io::Result<Trace> {
        let stream = fs::File::open(path)?;
        let is_xz = path.extension().is_some_and(|ext| ext == "xz");
        let reader: Box<dyn Read + Send> = if is_xz {
            Box::new(XzDecoder::new(stream))
        } else {
            Box::new(stream)
        };
        Ok(Trace::spawn(reader, records_per_block, blocks_per_queue))
    }

    pub fn spawn<R: Read + Send + 'static>(
        reader: R,
        records_per_block: usize,
        blocks_per_queue: usize,
    ) -> Trace {
        let records_per_block = records_per_block.max(1);
        let (sender, receiver) = crossbeam::channel::bounded(blocks_per_queue);

        let t = thread::spawn(move || {
            Trace::run_thread(BufReader::new(reader), records_per_block, sender)
        });

        Trace {
            rec: receiver,
            _thread: t,
        }
    }

    fn run_thread<R: BufRead>(reader: R, records_per_block: usize, queue: Sender<RecordBlock>) {
        let mut buffer = Vec::with_capacity(records_per_block);
        let mut failure = None;

        for (idx, line) in reader.lines().enumerate() {
            let parsed = line.map_err(TraceError::from).and_then(|line| {
                Record::parse(&line).map_err(|reason| TraceError::Malformed {
                    line: idx + 1,
                    reason,
                })
            });
            match parsed {
                Ok(Some(record)) => buffer.push(record),
                Ok(None) => continue,
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }

            if buffer.len() == records_per_block {
                let full = std::mem::replace(&mut buffer, Vec::with_capacity(records_per_block));
                if queue.send(Ok(full)).is_err() {
                    return;
                }
            }
        }

        if !buffer.is_empty() && queue.send(Ok(buffer)).is_err() {
            return;
        }
        if let Some(err) = failure {
            let _ = queue.send(Err(err));
        }
    }
}
