//! Input sources. A run reads an ordered list of log files as one stream;
//! the shorthand arguments `-` and `-N` expand against the live log.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor};
use std::path::{Path, PathBuf};
use globset::{GlobBuilder, GlobSetBuilder};
use log::debug;
use walkdir::WalkDir;
use crate::error::TlogError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogSource {
    File(PathBuf),
    /// The last `lines` lines of a file.
    Tail { path: PathBuf, lines: usize },
}

impl LogSource {
    pub fn name(&self) -> String {
        match self {
            LogSource::File(p) => p.display().to_string(),
            LogSource::Tail { path, lines } => format!("{} (last {} lines)", path.display(), lines),
        }
    }

    pub fn open(&self) -> Result<Box<dyn BufRead>, TlogError> {
        match self {
            LogSource::File(p) => {
                let f = File::open(p).map_err(|e| TlogError::io(p, e))?;
                Ok(Box::new(BufReader::new(f)))
            }
            LogSource::Tail { path, lines } => {
                let f = File::open(path).map_err(|e| TlogError::io(path, e))?;
                let tail = tail_lines(BufReader::new(f), *lines).map_err(|e| TlogError::io(path, e))?;
                Ok(Box::new(Cursor::new(tail)))
            }
        }
    }
}

/// Keeps only the last `n` `\n`-terminated lines, holding at most `n` in memory.
pub fn tail_lines<R: BufRead>(mut r: R, n: usize) -> io::Result<Vec<u8>> {
    let mut keep: VecDeque<Vec<u8>> = VecDeque::with_capacity(n.min(1 << 16));
    loop {
        let mut line = Vec::new();
        if r.read_until(b'\n', &mut line)? == 0 { break; }
        if n == 0 { continue; }
        if keep.len() == n { keep.pop_front(); }
        keep.push_back(line);
    }
    Ok(keep.into_iter().flatten().collect())
}

/// Decodes one byte per char, so any byte sequence is a valid line.
pub fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Lines split on `\n` only; a carriage return stays inside its line.
pub struct Latin1Lines<R> {
    inner: R,
    buf: Vec<u8>,
}

impl<R: BufRead> Latin1Lines<R> {
    pub fn new(inner: R) -> Self { Self { inner, buf: Vec::new() } }
}

impl<R: BufRead> Iterator for Latin1Lines<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.inner.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => Some(Ok(latin1(&self.buf))),
            Err(e) => Some(Err(e)),
        }
    }
}

/// Dated siblings of the live log (`<live>.<YYYY.MM.DD>...`) from `day` on,
/// oldest first, followed by the live log itself. `None` keeps every dated file.
pub fn dated_set(live: &Path, day: Option<&str>) -> Result<Vec<PathBuf>, TlogError> {
    let dir = match live.parent() {
        Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let base = live.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    let glob = GlobBuilder::new(&format!("{}*", globset::escape(&base)))
        .literal_separator(true)
        .build()
        .map_err(|e| TlogError::BadLiveLog { path: live.to_path_buf(), source: e })?;
    let mut gs = GlobSetBuilder::new();
    gs.add(glob);
    let set = gs.build().map_err(|e| TlogError::BadLiveLog { path: live.to_path_buf(), source: e })?;

    let mut names: Vec<String> = WalkDir::new(&dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|de| de.file_type().is_file())
        .map(|de| de.file_name().to_string_lossy().to_string())
        .filter(|n| set.is_match(n))
        .collect();
    names.sort_by(|a, b| b.cmp(a));

    let target = day.map(|d| format!("{}.{}", base, d));
    let mut files: Vec<PathBuf> = names
        .into_iter()
        .take_while(|n| n != &base && target.as_ref().is_none_or(|t| n >= t))
        .map(|n| dir.join(n))
        .collect();
    files.reverse();
    files.push(live.to_path_buf());
    debug!("Expanded - to {} file(s) under {}", files.len(), dir.display());
    Ok(files)
}

/// Turns the positional file arguments into sources. `-` must stand alone.
pub fn resolve(args: &[String], live: &Path, day: Option<&str>) -> Result<Vec<LogSource>, TlogError> {
    if args.iter().any(|a| a == "-") {
        if args.len() > 1 { return Err(TlogError::DashNotAlone); }
        return Ok(dated_set(live, day)?.into_iter().map(LogSource::File).collect());
    }
    Ok(args
        .iter()
        .map(|a| match a.strip_prefix('-').filter(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit())) {
            Some(n) => LogSource::Tail { path: live.to_path_buf(), lines: n.parse().unwrap_or(usize::MAX) },
            None => LogSource::File(PathBuf::from(a)),
        })
        .collect())
}
