//! Report emitter. Renders partial or total counters as plain text on the
//! report stream. Rendering never touches the counters.

use std::io::{self, Write};
use crate::counters::Counters;
use crate::registry::ReferenceTables;

pub const TOTALS_BANNER: &str = "============================ TOTALS ================================";
const LABEL_WIDTH: usize = 55;

/// Which report sections are printed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReportModes {
    pub res: bool,
    pub mods: bool,
    pub iddump: bool,
}

impl ReportModes {
    /// Resolution reporting is the default when no other mode is asked for.
    pub fn new(res: bool, mods: bool, iddump: bool) -> Self {
        Self { res: res || !(mods || iddump), mods, iddump }
    }

    /// Whether the BEGIN-operation grammar needs to run at all.
    pub fn modifications(&self) -> bool { self.mods || self.iddump }
}

pub fn with_commas(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 { out.push(','); }
        out.push(c);
    }
    out
}

fn clip(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

fn scalar<W: Write>(out: &mut W, label: &str, n: u64) -> io::Result<()> {
    writeln!(out, "{:>31} {:13}", label, n)
}

/// One window (or the totals) report.
pub fn write_window<W: Write>(
    out: &mut W,
    modes: ReportModes,
    tables: &ReferenceTables,
    c: &Counters,
    start: &str,
    boundary: &str,
    last_seen: Option<&str>,
) -> io::Result<()> {
    writeln!(out, "# ======== {} to {}", start, boundary)?;
    if let Some(t) = last_seen && t < boundary && !modes.iddump {
        writeln!(out, "      * Log end at {}", t)?;
    }

    if modes.res {
        writeln!(out, "== schemes: {}", c.schemes.len())?;
        for (k, v) in c.schemes.ranked() {
            writeln!(out, "{:>12} {}  {}", with_commas(v), clip(tables.prefix_label(k), LABEL_WIDTH), k)?;
        }
        writeln!(out, "== naans")?;
        for (k, v) in c.naans.ranked() {
            writeln!(out, "{:>12} {}  {}", with_commas(v), clip(tables.naan_label(k), LABEL_WIDTH), k)?;
        }
        writeln!(out, "== naan classes (E=ezid ARK, N=non-ezid ARK, D=DOI or shadow ARK)")?;
        for (k, v) in c.naan_classes.ranked() {
            writeln!(out, "{:>12} {}", with_commas(v), k)?;
        }
    }

    if modes.mods {
        writeln!(out, "== ops")?;
        for (k, v) in c.ops.ranked() {
            writeln!(out, "{:>13} {}", with_commas(v), k)?;
        }
        writeln!(out, "== ops encountered: {:>13}", with_commas(c.ops.len() as u64))?;
        writeln!(out, "== ids")?;
        writeln!(out, "== ids encountered: {:>13}", with_commas(c.ids.len() as u64))?;
        writeln!(out, "== testid classes")?;
        for (k, v) in c.test_ids.ranked() {
            writeln!(out, "{:>13} {}", with_commas(v), k)?;
        }
        writeln!(out, "== testid classes encountered: {:>13}", with_commas(c.test_ids.len() as u64))?;
        writeln!(out, "== ids modified")?;
        writeln!(out, "   sorted to optimize btree insertion time")?;
        for k in &c.modified {
            writeln!(out, "+=mod== {}", k)?;
        }
        writeln!(out, "== ids modified: {:>13}", with_commas(c.modified.len() as u64))?;
    }

    if modes.iddump {
        // Data lines start with one space, comment lines with '#'.
        for k in &c.modified {
            writeln!(out, " {}", k)?;
        }
        write!(out, "# operations:")?;
        for (k, v) in c.ops.ranked() {
            write!(out, " {}.{}", v, k)?;
        }
        writeln!(out)?;
        writeln!(out, "# report end time: {}", boundary)?;
        writeln!(out, "# {:6} mods from {} to {}", c.modified.len(), start, boundary)?;
        writeln!(out, "# next harvest: {} -", boundary)?;
        return Ok(());
    }

    scalar(out, "internal testing lines", c.internal)?;
    scalar(out, "resolution lines", c.resolution)?;
    if c.modification > 0 { scalar(out, "modification lines", c.modification)?; }
    if c.non_match > 0 { scalar(out, "non-resolution lines", c.non_match)?; }
    Ok(())
}

pub fn end_of_file<W: Write>(out: &mut W, modes: ReportModes, name: &str) -> io::Result<()> {
    if modes.iddump { return Ok(()); }
    writeln!(out, "  -- (end {})", name)
}

/// Totals for the whole run: banner, file list, the cumulative report and
/// the line accounting footer.
pub fn write_totals<W: Write>(
    out: &mut W,
    modes: ReportModes,
    tables: &ReferenceTables,
    t: &Counters,
    original_start: &str,
    last_time: &str,
    files: &[String],
    lines_read: u64,
) -> io::Result<()> {
    if !modes.iddump {
        writeln!(out)?;
        writeln!(out, "{}", TOTALS_BANNER)?;
        match files {
            [one] => writeln!(out, "# from log {}", one)?,
            many => {
                writeln!(out, "# from logs")?;
                for f in many { writeln!(out, "    {}", f)?; }
            }
        }
    }
    write_window(out, modes, tables, t, original_start, last_time, Some(last_time))?;
    if modes.iddump { return Ok(()); }

    scalar(out, "internal testing lines", t.internal)?;
    scalar(out, "pre-start lines", t.pre_start)?;
    writeln!(out)?;
    scalar(out, "total resolution lines", t.resolution)?;
    scalar(out, "total modification lines", t.modification)?;
    scalar(out, "total non-resolution lines", t.non_match)?;
    scalar(out, "sum of the above totals", t.resolution + t.modification + t.non_match + t.pre_start)?;
    scalar(out, "error lines processed", t.malformed)?;
    scalar(out, "total lines processed", lines_read)?;
    Ok(())
}
