//! The processing loop: every line goes through the classifier, the window
//! controller decides when a window closes, and the aggregator holds counts
//! until the emitter has printed them.

use std::io::{self, BufRead, Write};
use indicatif::ProgressBar;
use log::{debug, info, warn};
use serde::Serialize;
use crate::classify::{Classifier, LogEvent};
use crate::counters::{Aggregator, Counters};
use crate::error::TlogError;
use crate::registry::ReferenceTables;
use crate::report::{self, with_commas, ReportModes};
use crate::sources::{Latin1Lines, LogSource};
use crate::temper::Cadence;
use crate::window::{Step, Window, WindowController};

const PROGRESS_EVERY: u64 = 10_000;
const REPORT_STREAM: &str = "<report>";

/// Scalar counts of one flushed window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WindowRow {
    pub start: String,
    pub boundary: String,
    pub resolution: u64,
    pub internal: u64,
    pub modification: u64,
    pub non_resolution: u64,
    pub malformed: u64,
    pub pre_start: u64,
}

impl WindowRow {
    fn new(w: &Window, c: &Counters) -> Self {
        Self {
            start: w.start.clone(),
            boundary: w.boundary.clone(),
            resolution: c.resolution,
            internal: c.internal,
            modification: c.modification,
            non_resolution: c.non_match,
            malformed: c.malformed,
            pre_start: c.pre_start,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    pub original_start: String,
    pub last_time: String,
    pub files: Vec<String>,
    pub lines_read: u64,
    pub windows: Vec<WindowRow>,
    pub totals: Counters,
}

pub struct Analyzer<'t, W: Write> {
    tables: &'t ReferenceTables,
    classifier: Classifier<'t>,
    window: WindowController,
    agg: Aggregator,
    modes: ReportModes,
    out: W,
    files: Vec<String>,
    rows: Vec<WindowRow>,
    last_time: String,
    lines_read: u64,
    progress: Option<ProgressBar>,
}

fn report_err(e: io::Error) -> TlogError { TlogError::io(REPORT_STREAM, e) }

impl<'t, W: Write> Analyzer<'t, W> {
    pub fn new(tables: &'t ReferenceTables, window: WindowController, modes: ReportModes, out: W) -> Self {
        Self {
            tables,
            classifier: Classifier::new(&tables.naans, modes.res, modes.modifications()),
            window,
            agg: Aggregator::default(),
            modes,
            out,
            files: Vec::new(),
            rows: Vec::new(),
            last_time: String::new(),
            lines_read: 0,
            progress: None,
        }
    }

    pub fn with_progress(mut self, on: bool) -> Self {
        self.progress = if on { Some(ProgressBar::new_spinner()) } else { None };
        self
    }

    /// Reads every source in order, then prints the totals.
    pub fn run(&mut self, sources: &[LogSource]) -> Result<RunSummary, TlogError> {
        for src in sources {
            let name = src.name();
            if self.window.finished() {
                self.feed(&name, io::empty())?;
                continue;
            }
            let rdr = src.open()?;
            self.feed(&name, rdr)?;
        }
        self.finish()
    }

    /// Processes one input stream. Nothing is read once the run has finished.
    pub fn feed<R: BufRead>(&mut self, name: &str, rdr: R) -> Result<(), TlogError> {
        self.files.push(name.to_string());
        if let Some(pb) = &self.progress { pb.set_message(format!("Scanning {}", name)); }
        if !self.window.finished() {
            self.consume(name, rdr)?;
        } else {
            debug!("Skipping {}: past end time", name);
        }
        report::end_of_file(&mut self.out, self.modes, name).map_err(report_err)
    }

    fn consume<R: BufRead>(&mut self, name: &str, rdr: R) -> Result<(), TlogError> {
        for (idx, line) in Latin1Lines::new(rdr).enumerate() {
            let line = line.map_err(|e| TlogError::io(name, e))?;
            let lineno = idx as u64 + 1;
            self.lines_read += 1;
            if let Some(pb) = &self.progress && self.lines_read % PROGRESS_EVERY == 0 {
                pb.tick();
                pb.set_message(format!("{}: {} lines", name, with_commas(self.lines_read)));
            }

            let ev = match LogEvent::parse(&line) {
                Ok(ev) => ev,
                Err(e) => {
                    warn!("malformed log line in {}, line {}, {}; skipping: {}", name, lineno, e, line.trim_end());
                    self.agg.malformed();
                    continue;
                }
            };
            self.last_time.clear();
            self.last_time.push_str(ev.timestamp);

            let was_started = self.window.started();
            match self.window.observe(ev.timestamp)? {
                Step::PreStart => { self.agg.pre_start(); continue; }
                Step::Count => {}
                Step::Crossed(w) => self.close(&w, ev.timestamp)?,
                Step::Finished(w) => {
                    self.close(&w, ev.timestamp)?;
                    info!("End time {} reached at line {} of {}", w.boundary, with_commas(lineno), name);
                    break;
                }
                Step::Skip => break,
            }
            if !was_started && lineno > 1 {
                info!("Starting time trigger {} found in file \"{}\" at line {}", ev.timestamp, name, with_commas(lineno));
            }
            let c = self.classifier.classify(&ev);
            self.agg.record(&c);
        }
        Ok(())
    }

    /// Reports (unless cadence is end) and flushes a closed window.
    fn close(&mut self, w: &Window, at: &str) -> Result<(), TlogError> {
        info!("Reporting time trigger {} found at {}", w.boundary, at);
        if self.window.cadence() != Cadence::End {
            report::write_window(&mut self.out, self.modes, self.tables, self.agg.partial(), &w.start, &w.boundary, Some(at)).map_err(report_err)?;
        }
        self.rows.push(WindowRow::new(w, self.agg.partial()));
        self.agg.flush();
        Ok(())
    }

    /// Final partial report and flush, then the totals.
    pub fn finish(&mut self) -> Result<RunSummary, TlogError> {
        if let Some(pb) = self.progress.take() { pb.finish_and_clear(); }
        let original_start = self.window.original_start().unwrap_or("0").to_string();
        if !self.window.started() {
            let latest = if self.last_time.is_empty() { "(none)".to_string() } else { self.last_time.clone() };
            return Err(TlogError::StartNotFound { start: original_start, latest });
        }
        if let Some(w) = self.window.window().cloned() {
            if self.window.cadence() != Cadence::End {
                report::write_window(&mut self.out, self.modes, self.tables, self.agg.partial(), &w.start, &w.boundary, Some(&self.last_time)).map_err(report_err)?;
            }
            self.rows.push(WindowRow::new(&w, self.agg.partial()));
        }
        self.agg.flush();
        report::write_totals(&mut self.out, self.modes, self.tables, self.agg.total(), &original_start, &self.last_time, &self.files, self.lines_read).map_err(report_err)?;
        self.out.flush().map_err(report_err)?;
        Ok(RunSummary {
            original_start,
            last_time: self.last_time.clone(),
            files: self.files.clone(),
            lines_read: self.lines_read,
            windows: self.rows.clone(),
            totals: self.agg.total().clone(),
        })
    }

    pub fn into_output(self) -> W { self.out }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ReferenceTable;
    use crate::temper::{StartTime, END_OF_TIME};

    fn res_line(ts: &str) -> String {
        format!("+n2t ids-n2t-prd-2a {} tx BEGIN resolve ark:/12345/x{} !!!pr=https!!!ra=172.30.32.230!!!\n", ts, &ts[..4])
    }

    fn mod_line(ts: &str, id: &str, op: &str) -> String {
        format!("oca 172.30.5.148 {} tx BEGIN {}|_t.{}\n", ts, id, op)
    }

    fn tables() -> ReferenceTables {
        ReferenceTables { naans: ReferenceTable::from_pairs([("12345", "E Example Museum")]), ..Default::default() }
    }

    fn analyze(tables: &ReferenceTables, start: StartTime, cadence: Cadence, endtime: &str, modes: ReportModes, input: &str) -> (Result<RunSummary, TlogError>, String) {
        let wc = WindowController::new(start, cadence, endtime).unwrap();
        let mut a = Analyzer::new(tables, wc, modes, Vec::new());
        let res = a.feed("test.log", input.as_bytes()).and_then(|_| a.finish());
        (res, String::from_utf8(a.into_output()).unwrap())
    }

    #[test]
    fn monthly_scenario() {
        let t = tables();
        let input: String = ["2021.01.15_08:00:00.000000", "2021.02.03_08:00:00.000000", "2021.02.20_08:00:00.000000"].iter().map(|ts| res_line(ts)).collect();
        let (res, out) = analyze(&t, StartTime::Beginning, Cadence::Monthly, END_OF_TIME, ReportModes::new(true, false, false), &input);
        let sum = res.unwrap();
        assert_eq!(out.matches("# ======== ").count(), 3);
        assert!(out.contains("# ======== 2021.01.15_08:00:00.000000 to 2021.02\n"));
        assert!(out.contains("# ======== 2021.02.03_08:00:00.000000 to 2021.03\n      * Log end at 2021.02.20_08:00:00.000000\n"));
        let counts: Vec<u64> = sum.windows.iter().map(|w| w.resolution).collect();
        assert_eq!(counts, [1, 2]);
        assert_eq!(sum.totals.resolution, 3);
        assert_eq!(sum.original_start, "2021.01.15_08:00:00.000000");
        assert!(out.contains("# ======== 2021.01.15_08:00:00.000000 to 2021.02.20_08:00:00.000000\n"));
        assert!(out.contains("         total resolution lines             3\n"));
    }

    #[test]
    fn window_partials_sum_to_totals() {
        let t = tables();
        let mut input = String::new();
        for d in 1..=9 {
            let ts = format!("2024.02.2{}_10:00:00.000000", d);
            input.push_str(&res_line(&ts));
            input.push_str(&mod_line(&ts, "ark:/99999/fk4abc", "set"));
            input.push_str("+n2t host ");
            input.push_str(&ts);
            input.push_str(" tx END SUCCESS\n");
            if d % 3 == 0 { input.push_str("broken line\n"); }
        }
        let (res, _) = analyze(&t, StartTime::Beginning, Cadence::Daily, END_OF_TIME, ReportModes::new(true, true, false), &input);
        let sum = res.unwrap();
        assert_eq!(sum.windows.len(), 9);
        let tot = &sum.totals;
        assert_eq!(sum.windows.iter().map(|w| w.resolution).sum::<u64>(), tot.resolution);
        assert_eq!(sum.windows.iter().map(|w| w.modification).sum::<u64>(), tot.modification);
        assert_eq!(sum.windows.iter().map(|w| w.non_resolution).sum::<u64>(), tot.non_match);
        assert_eq!(sum.windows.iter().map(|w| w.malformed).sum::<u64>(), tot.malformed);
        assert_eq!((tot.resolution, tot.modification, tot.non_match, tot.malformed), (9, 9, 9, 3));
        assert_eq!(tot.resolution + tot.modification + tot.non_match + tot.malformed + tot.pre_start, sum.lines_read);
        assert!(sum.windows.windows(2).all(|p| p[0].start <= p[1].start));
    }

    #[test]
    fn impossible_dates_are_malformed_not_fatal() {
        let t = tables();
        let input = [
            res_line("2021.01.01_00:00:00.000000"),
            res_line("2021.01.32_00:00:00.000000"),
            res_line("2021.01.03_00:00:00.000000"),
        ].concat();
        let (res, out) = analyze(&t, StartTime::Beginning, Cadence::Daily, END_OF_TIME, ReportModes::new(true, false, false), &input);
        let sum = res.unwrap();
        assert_eq!(sum.totals.malformed, 1);
        assert_eq!(sum.totals.resolution, 2);
        assert_eq!(sum.lines_read, 3);
        assert_eq!(sum.windows.len(), 2);
        assert_eq!(sum.last_time, "2021.01.03_00:00:00.000000");
        assert!(out.contains("TOTALS"));
    }

    #[test]
    fn endtime_before_first_line_counts_nothing() {
        let t = tables();
        let input = [res_line("2021.02.01_00:00:00.000000"), res_line("2021.02.02_00:00:00.000000")].concat();
        let (res, out) = analyze(&t, StartTime::Beginning, Cadence::End, "2021.01.01", ReportModes::new(true, false, false), &input);
        let sum = res.unwrap();
        assert_eq!(sum.totals.resolution, 0);
        assert_eq!(sum.lines_read, 1);
        assert!(sum.windows.is_empty());
        assert_eq!(sum.original_start, "2021.02.01_00:00:00.000000");
        assert!(out.contains("TOTALS"));
    }

    #[test]
    fn start_not_found_is_an_error() {
        let t = tables();
        let input = res_line("2021.01.15_08:00:00.000000");
        let (res, _) = analyze(&t, StartTime::At("2030.01.01_00:00:00.000000".into()), Cadence::End, END_OF_TIME, ReportModes::new(true, false, false), &input);
        match res {
            Err(TlogError::StartNotFound { start, latest }) => {
                assert_eq!(start, "2030.01.01_00:00:00.000000");
                assert_eq!(latest, "2021.01.15_08:00:00.000000");
            }
            other => panic!("{:?}", other.map(|s| s.lines_read)),
        }
    }

    #[test]
    fn pre_start_lines_are_skipped_and_counted() {
        let t = tables();
        let input: String = ["2021.01.01_00:00:00.000000", "2021.01.02_00:00:00.000000", "2021.01.03_00:00:00.000000"].iter().map(|ts| res_line(ts)).collect();
        let (res, out) = analyze(&t, StartTime::At("2021.01.02_00:00:00.000000".into()), Cadence::End, END_OF_TIME, ReportModes::new(true, false, false), &input);
        let sum = res.unwrap();
        assert_eq!(sum.totals.pre_start, 1);
        assert_eq!(sum.totals.resolution, 2);
        assert_eq!(out.matches("# ======== ").count(), 1);
        assert!(out.contains("                pre-start lines             1\n"));
    }

    #[test]
    fn iddump_output_is_machine_readable() {
        let t = tables();
        let input = [
            mod_line("2021.01.01_01:00:00.000000", "ark:/99999/fk4a", "set"),
            mod_line("2021.01.01_02:00:00.000000", "ark:/13960/t1", "get"),
            mod_line("2021.01.02_01:00:00.000000", "doi:10.5072/FK2b", "rm"),
        ].concat();
        let (res, out) = analyze(&t, StartTime::Beginning, Cadence::Daily, END_OF_TIME, ReportModes::new(false, false, true), &input);
        res.unwrap();
        assert!(out.lines().all(|l| l.starts_with('#') || l.starts_with(' ')), "{}", out);
        assert!(out.contains("\n oca ark:/99999/fk4a\n# operations: 1.set 1.get\n# report end time: 2021.01.02\n"));
        assert!(!out.contains("TOTALS"));
        assert!(!out.contains("-- (end"));
    }

    #[test]
    fn internal_traffic_stays_out_of_schemes() {
        let t = tables();
        let input = "ezid ids-n2t2-stg 2020.05.08_18:33:27.971308 wAIu BEGIN resolve ark:/12345/x !!!pr=http!!!ra=127.0.0.1!!!co=!!!\n";
        let (res, _) = analyze(&t, StartTime::Beginning, Cadence::End, END_OF_TIME, ReportModes::new(true, false, false), input);
        let tot = res.unwrap().totals;
        assert_eq!(tot.internal, 1);
        assert_eq!(tot.resolution, 1);
        assert!(tot.schemes.is_empty());
        assert!(tot.naans.is_empty());
    }

    #[test]
    fn endtime_stops_the_run() {
        let t = tables();
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("a.log");
        let input: String = ["2021.01.01_05:00:00.000000", "2021.01.02_05:00:00.000000", "2021.01.03_05:00:00.000000", "2021.01.04_05:00:00.000000"].iter().map(|ts| res_line(ts)).collect();
        std::fs::write(&log, input).unwrap();
        let missing = dir.path().join("never-opened.log");
        let wc = WindowController::new(StartTime::Beginning, Cadence::Daily, "2021.01.03").unwrap();
        let mut a = Analyzer::new(&t, wc, ReportModes::new(true, false, false), Vec::new());
        let sum = a.run(&[LogSource::File(log), LogSource::File(missing.clone())]).unwrap();
        assert_eq!(sum.totals.resolution, 2);
        assert_eq!(sum.lines_read, 3);
        assert_eq!(sum.windows.len(), 2);
        assert_eq!(sum.windows[1].boundary, "2021.01.03");
        let out = String::from_utf8(a.into_output()).unwrap();
        assert!(out.contains(&format!("  -- (end {})\n", missing.display())));
        assert_eq!(out.matches("# ======== ").count(), 3);
    }

    #[test]
    fn tail_matches_truncated_file() {
        let t = tables();
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("transaction_log");
        let mut all = Vec::new();
        for i in 0..500u32 {
            let ts = format!("2021.01.{:02}_{:02}:{:02}:00.000000", 1 + i / 60, (i / 60) % 24, i % 60);
            all.push(if i % 4 == 0 { mod_line(&ts, "ark:/99999/fk4x", "set") } else { res_line(&ts) });
        }
        std::fs::write(&live, all.concat()).unwrap();
        let cut = dir.path().join("last200.log");
        std::fs::write(&cut, all[300..].concat()).unwrap();

        let run = |src: LogSource| {
            let wc = WindowController::new(StartTime::Beginning, Cadence::Daily, END_OF_TIME).unwrap();
            let mut a = Analyzer::new(&t, wc, ReportModes::new(true, true, false), io::sink());
            a.run(&[src]).unwrap()
        };
        let tailed = run(LogSource::Tail { path: live.clone(), lines: 200 });
        let manual = run(LogSource::File(cut));
        assert_eq!(tailed.lines_read, 200);
        assert_eq!(tailed.totals, manual.totals);
        assert_eq!(tailed.windows, manual.windows);
    }
}
