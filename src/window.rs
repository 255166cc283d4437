use serde::Serialize;
use crate::error::TlogError;
use crate::temper::{next_boundary, Cadence, StartTime};

/// Reporting interval: `start` inclusive, `boundary` exclusive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Window {
    pub start: String,
    pub boundary: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum State {
    /// Start is "from the beginning" and no line has been seen yet.
    Pending,
    BeforeStart(Window),
    Active(Window),
    Finished,
}

/// What the caller must do with the line whose timestamp was observed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    /// Line precedes the start time.
    PreStart,
    /// Count the line into the current window.
    Count,
    /// The given window closed: report it, flush, then count the line into the new window.
    Crossed(Window),
    /// The given window closed at or after the end time: report it, flush, drop the line.
    Finished(Window),
    /// The run already finished.
    Skip,
}

#[derive(Debug)]
pub struct WindowController {
    cadence: Cadence,
    endtime: String,
    state: State,
    original_start: Option<String>,
}

impl WindowController {
    pub fn new(start: StartTime, cadence: Cadence, endtime: impl Into<String>) -> Result<Self, TlogError> {
        let mut wc = Self { cadence, endtime: endtime.into(), state: State::Pending, original_start: None };
        if let StartTime::At(s) = start {
            if s >= wc.endtime { return Err(TlogError::BoundaryBeforeStart { start: s, boundary: wc.endtime }); }
            let w = wc.open(s.clone())?;
            wc.original_start = Some(s);
            wc.state = State::BeforeStart(w);
        }
        Ok(wc)
    }

    fn open(&self, start: String) -> Result<Window, TlogError> {
        let cadence_boundary = next_boundary(&start, self.cadence)?;
        if start > cadence_boundary { return Err(TlogError::BoundaryBeforeStart { start, boundary: cadence_boundary }); }
        let boundary = if cadence_boundary < self.endtime { cadence_boundary } else { self.endtime.clone() };
        Ok(Window { start, boundary })
    }

    pub fn observe(&mut self, ts: &str) -> Result<Step, TlogError> {
        match &self.state {
            State::Finished => return Ok(Step::Skip),
            State::Pending => {
                self.original_start = Some(ts.to_string());
                if ts >= self.endtime.as_str() {
                    self.state = State::Finished;
                    return Ok(Step::Skip);
                }
                let w = self.open(ts.to_string())?;
                self.state = State::BeforeStart(w);
            }
            _ => {}
        }
        if let State::BeforeStart(w) = &self.state {
            if ts < w.start.as_str() { return Ok(Step::PreStart); }
            self.state = State::Active(w.clone());
        }
        let State::Active(w) = &self.state else { return Ok(Step::Skip) };
        if ts < w.boundary.as_str() { return Ok(Step::Count); }
        let closed = w.clone();
        if ts >= self.endtime.as_str() {
            self.state = State::Finished;
            return Ok(Step::Finished(closed));
        }
        self.state = State::Active(self.open(ts.to_string())?);
        Ok(Step::Crossed(closed))
    }

    /// Current window; `None` until a start is known and after the run finished.
    pub fn window(&self) -> Option<&Window> {
        match &self.state {
            State::BeforeStart(w) | State::Active(w) => Some(w),
            _ => None,
        }
    }

    /// The configured start, or the first line's timestamp for "from the beginning".
    pub fn original_start(&self) -> Option<&str> { self.original_start.as_deref() }

    pub fn started(&self) -> bool { matches!(self.state, State::Active(_) | State::Finished) }

    pub fn finished(&self) -> bool { self.state == State::Finished }

    pub fn cadence(&self) -> Cadence { self.cadence }
}
