use std::path::Path;
use anyhow::{Context, Result};
use crate::analyzer::{RunSummary, WindowRow};

/// One row per flushed window.
pub fn write_windows_csv(path: &Path, rows: &[WindowRow]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    for r in rows { wtr.serialize(r)?; }
    wtr.flush()?;
    Ok(())
}

pub fn write_summary_json(path: &Path, summary: &RunSummary) -> Result<()> {
    let data = serde_json::to_vec_pretty(summary)?;
    std::fs::write(path, data).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::Counters;

    fn row(start: &str, boundary: &str, resolution: u64) -> WindowRow {
        WindowRow { start: start.into(), boundary: boundary.into(), resolution, internal: 0, modification: 0, non_resolution: 1, malformed: 0, pre_start: 0 }
    }

    #[test]
    fn csv_has_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("windows.csv");
        write_windows_csv(&p, &[row("2021.01.15_00:00:00.000000", "2021.02", 4), row("2021.02.03_00:00:00.000000", "2021.03", 2)]).unwrap();
        let text = std::fs::read_to_string(&p).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "start,boundary,resolution,internal,modification,non_resolution,malformed,pre_start");
        assert_eq!(lines[1], "2021.01.15_00:00:00.000000,2021.02,4,0,0,1,0,0");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn json_summary_ranks_tallies() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("summary.json");
        let mut totals = Counters::default();
        totals.schemes.add("doi", 1);
        totals.schemes.add("ark", 5);
        totals.resolution = 6;
        let summary = RunSummary {
            original_start: "2021.01.15_00:00:00.000000".into(),
            last_time: "2021.02.20_00:00:00.000000".into(),
            files: vec!["a.log".into()],
            lines_read: 6,
            windows: vec![row("2021.01.15_00:00:00.000000", "9999.12.31", 6)],
            totals,
        };
        write_summary_json(&p, &summary).unwrap();
        let text = std::fs::read_to_string(&p).unwrap();
        let v: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["totals"]["resolution"], 6);
        assert_eq!(v["totals"]["schemes"]["ark"], 5);
        assert!(text.find("\"ark\"").unwrap() < text.find("\"doi\"").unwrap());
        assert_eq!(v["windows"][0]["boundary"], "9999.12.31");
    }
}
