//! Read-only inspection of Python pickle files
//!
//! Walks the opcode stream just far enough to find the class of the pickled
//! object, and looks up the `_sklearn_version` attribute scikit-learn stores
//! in estimator state. Nothing is unpickled.

use crate::error::{DlhubError, DlhubResult};
use std::collections::HashMap;
use std::path::Path;

/// Globals emitted by the pickle machinery itself rather than the pickled object
const HELPER_GLOBALS: &[&str] = &[
    "copy_reg._reconstructor",
    "copyreg._reconstructor",
    "copyreg.__newobj__",
    "__builtin__.object",
    "builtins.object",
    "numpy.core.multiarray._reconstruct",
    "numpy._core.multiarray._reconstruct",
    "joblib.numpy_pickle.NumpyArrayWrapper",
];

/// What could be learned from a pickle without loading it
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PickleSummary {
    /// Fully-qualified class of the top-level object, e.g. `sklearn.svm._classes.SVC`
    pub class_name: Option<String>,
    /// Version of scikit-learn that produced the pickle, when recorded
    pub sklearn_version: Option<String>,
}

impl PickleSummary {
    /// Class name without its module, e.g. `SVC`
    pub fn short_class_name(&self) -> Option<&str> {
        self.class_name
            .as_deref()
            .map(|c| c.rsplit('.').next().unwrap_or(c))
    }
}

/// Inspect a pickle file on disk
pub fn inspect_pickle_file(path: &Path) -> DlhubResult<PickleSummary> {
    let bytes = std::fs::read(path)?;
    inspect_pickle(&bytes).map_err(|reason| DlhubError::Introspection {
        path: path.to_string_lossy().to_string(),
        reason,
    })
}

/// Inspect pickle bytes
pub fn inspect_pickle(bytes: &[u8]) -> Result<PickleSummary, String> {
    let class_name = first_object_class(bytes)?;
    let sklearn_version = find_string_after(bytes, b"_sklearn_version");
    Ok(PickleSummary {
        class_name,
        sklearn_version,
    })
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8], pos: usize) -> Self {
        Self { bytes, pos }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], String> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| format!("truncated pickle at offset {}", self.pos))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn byte(&mut self) -> Result<u8, String> {
        Ok(self.take(1)?[0])
    }

    fn le_len(&mut self, width: usize) -> Result<usize, String> {
        let raw = self.take(width)?;
        let mut value: u64 = 0;
        for (i, b) in raw.iter().enumerate() {
            value |= (*b as u64) << (8 * i);
        }
        usize::try_from(value).map_err(|_| "length overflow".to_string())
    }

    fn line(&mut self) -> Result<&'a [u8], String> {
        let rest = &self.bytes[self.pos..];
        let end = rest
            .iter()
            .position(|b| *b == b'\n')
            .ok_or_else(|| format!("unterminated line at offset {}", self.pos))?;
        self.pos += end + 1;
        Ok(&rest[..end])
    }

    fn string(&mut self, len: usize) -> Result<String, String> {
        Ok(String::from_utf8_lossy(self.take(len)?).to_string())
    }
}

/// Walk opcodes until the first global that names a user class
fn first_object_class(bytes: &[u8]) -> Result<Option<String>, String> {
    let mut reader = Reader::new(bytes, 0);
    let mut strings: Vec<String> = Vec::new();
    let mut last_string: Option<String> = None;
    let mut memo: HashMap<usize, String> = HashMap::new();
    let mut memo_len = 0usize;

    if bytes.first() != Some(&0x80) && bytes.first() != Some(&b'(') && bytes.first() != Some(&b'c')
    {
        return Err("not a pickle stream".to_string());
    }

    loop {
        let op = reader.byte()?;
        let mut pushed: Option<String> = None;

        match op {
            // PROTO
            0x80 => {
                reader.take(1)?;
                continue;
            }
            // FRAME
            0x95 => {
                reader.take(8)?;
                continue;
            }
            // GLOBAL
            b'c' => {
                let module = String::from_utf8_lossy(reader.line()?).to_string();
                let name = String::from_utf8_lossy(reader.line()?).to_string();
                let global = format!("{}.{}", module, name);
                if !HELPER_GLOBALS.contains(&global.as_str()) {
                    return Ok(Some(global));
                }
            }
            // STACK_GLOBAL
            0x93 => {
                if strings.len() < 2 {
                    return Err("STACK_GLOBAL without module and name".to_string());
                }
                let name = strings.pop().unwrap_or_default();
                let module = strings.pop().unwrap_or_default();
                let global = format!("{}.{}", module, name);
                if !HELPER_GLOBALS.contains(&global.as_str()) {
                    return Ok(Some(global));
                }
            }
            // SHORT_BINUNICODE, SHORT_BINSTRING, SHORT_BINBYTES
            0x8c | b'U' | b'C' => {
                let len = reader.byte()? as usize;
                pushed = Some(reader.string(len)?);
            }
            // BINUNICODE, BINSTRING, BINBYTES
            b'X' | b'T' | b'B' => {
                let len = reader.le_len(4)?;
                pushed = Some(reader.string(len)?);
            }
            // BINUNICODE8, BINBYTES8
            0x8d | 0x8e => {
                let len = reader.le_len(8)?;
                pushed = Some(reader.string(len)?);
            }
            // UNICODE, STRING
            b'V' | b'S' => {
                let raw = String::from_utf8_lossy(reader.line()?).to_string();
                pushed = Some(raw.trim_matches(|c| c == '\'' || c == '"').to_string());
            }
            // MEMOIZE
            0x94 => {
                if let Some(s) = &last_string {
                    memo.insert(memo_len, s.clone());
                }
                memo_len += 1;
                continue;
            }
            // BINPUT, LONG_BINPUT, PUT
            b'q' | b'r' | b'p' => {
                let index = match op {
                    b'q' => reader.byte()? as usize,
                    b'r' => reader.le_len(4)?,
                    _ => parse_line_index(reader.line()?)?,
                };
                if let Some(s) = &last_string {
                    memo.insert(index, s.clone());
                }
                continue;
            }
            // BINGET, LONG_BINGET, GET
            b'h' | b'j' | b'g' => {
                let index = match op {
                    b'h' => reader.byte()? as usize,
                    b'j' => reader.le_len(4)?,
                    _ => parse_line_index(reader.line()?)?,
                };
                pushed = memo.get(&index).cloned();
            }
            // Opcodes with fixed-size arguments
            b'K' => {
                reader.take(1)?;
            }
            b'M' => {
                reader.take(2)?;
            }
            b'J' => {
                reader.take(4)?;
            }
            b'G' => {
                reader.take(8)?;
            }
            // LONG1, LONG4
            0x8a => {
                let len = reader.byte()? as usize;
                reader.take(len)?;
            }
            0x8b => {
                let len = reader.le_len(4)?;
                reader.take(len)?;
            }
            // INT, LONG, FLOAT
            b'I' | b'L' | b'F' => {
                reader.line()?;
            }
            // Argument-free structural opcodes
            b'(' | b')' | b'}' | b']' | b'N' | 0x88 | 0x89 | 0x85 | 0x86 | 0x87 | 0x81
            | 0x92 | b'R' | b'b' | b's' | b'u' | b'a' | b'e' | b't' | b'l' | b'd' | b'0'
            | b'1' | b'2' | 0x8f | 0x90 | 0x91 => {}
            // STOP
            b'.' => return Ok(None),
            other => {
                return Err(format!(
                    "unsupported opcode 0x{:02x} at offset {}",
                    other,
                    reader.pos - 1
                ));
            }
        }

        match pushed {
            Some(s) => {
                strings.push(s.clone());
                last_string = Some(s);
            }
            None => last_string = None,
        }
    }
}

fn parse_line_index(line: &[u8]) -> Result<usize, String> {
    String::from_utf8_lossy(line)
        .trim()
        .parse()
        .map_err(|_| "invalid memo index".to_string())
}

/// Find `key` in the stream and read the string value that follows it
fn find_string_after(bytes: &[u8], key: &[u8]) -> Option<String> {
    let start = bytes.windows(key.len()).position(|w| w == key)? + key.len();
    let mut reader = Reader::new(bytes, start);

    // Protocol 0 keys are newline-terminated
    if bytes.get(start) == Some(&b'\n') {
        reader.take(1).ok()?;
    }

    loop {
        match reader.byte().ok()? {
            0x94 => continue,
            b'q' => {
                reader.take(1).ok()?;
            }
            b'r' => {
                reader.take(4).ok()?;
            }
            b'p' => {
                reader.line().ok()?;
            }
            0x8c | b'U' => {
                let len = reader.byte().ok()? as usize;
                return reader.string(len).ok();
            }
            b'X' | b'T' => {
                let len = reader.le_len(4).ok()?;
                return reader.string(len).ok();
            }
            b'V' | b'S' => {
                let raw = String::from_utf8_lossy(reader.line().ok()?).to_string();
                return Some(raw.trim_matches(|c| c == '\'' || c == '"').to_string());
            }
            _ => return None,
        }
    }
}
