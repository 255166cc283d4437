//! Line classifier: splits a transaction-log line into its fixed fields and
//! matches the remainder against the resolve and BEGIN-operation grammars.
//!
//! A line looks like
//! `+n2t ids-n2t-prd-2a 2020.08.10_00:00:49.564981 ihfmONfa6hGY7dvcywAfZQ BEGIN resolve ark:/65666/v1/12609 !!!pr=https!!!...`
//! or
//! `oca 172.30.5.148 2017.12.25_00:00:16.611367 iu3fpEnp5xG2vpGHYSA6uQ BEGIN ark:/13960/t26b3j87c|_t.set`.

use log::{trace, warn};
use regex::Regex;
use thiserror::Error;
use crate::registry::{NaanClass, ReferenceTable};
use crate::temper::calendar_day;

/// Remainder substring marking scanner noise.
pub const PHP_PROBE: &str = ".php";
/// Remainder substring marking requests from the resolver host itself.
pub const INTERNAL_MARKER: &str = "!ra=127.0.0.1";
pub const MUTATING_OPS: [&str; 6] = ["set", "purge", "rm", "add", "del", "let"];

pub const EZID_TEST_ARK: &str = "ark:/99999/fk4";
pub const SHADOW_TEST_ARK: &str = "ark:/b5072/fk2";
pub const TEST_DOI: &str = "doi:10.5072/FK2";

const RESOLVE_PATTERN: &str = r"^BEGIN resolve (?P<scheme>[^: ]*)(?P<post>:?/?(?P<naan>[^/ ]*)(?P<blade>.*?)) !!!";
const MODIFY_PATTERN: &str = r"^BEGIN (?P<id>\S*)\.(?P<op>\w+)\b";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MalformedLine {
    #[error("expected 5 fields, found {0}")]
    TooFewFields(usize),
    #[error("line begins with a SPACE")]
    LeadingSpace,
    #[error("not a TEMPER time value")]
    NotTemper,
    #[error("timestamp is not a calendar date")]
    BadDate,
}

/// The five space-delimited fields of a log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent<'a> {
    pub populator: &'a str,
    pub origin: &'a str,
    pub timestamp: &'a str,
    pub transaction_id: &'a str,
    pub rest: &'a str,
}

impl<'a> LogEvent<'a> {
    pub fn parse(line: &'a str) -> Result<Self, MalformedLine> {
        let line = line.strip_suffix('\n').unwrap_or(line);
        let fields: Vec<&str> = line.splitn(5, ' ').collect();
        if fields.len() < 5 { return Err(MalformedLine::TooFewFields(fields.len())); }
        if fields[0].is_empty() { return Err(MalformedLine::LeadingSpace); }
        let ts = fields[2];
        if !(ts.starts_with('1') || ts.starts_with('2')) || ts.chars().count() != 26 { return Err(MalformedLine::NotTemper); }
        if calendar_day(ts).is_err() { return Err(MalformedLine::BadDate); }
        Ok(Self { populator: fields[0], origin: fields[1], timestamp: ts, transaction_id: fields[3], rest: fields[4].trim_end() })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionEvent {
    pub scheme: String,
    /// Everything after the scheme, normally `:` plus the identifier body.
    pub post_scheme: String,
    pub naming_authority: String,
    pub blade: String,
    pub internal: bool,
    pub php_probe: bool,
    /// Set only for `ark` and `doi` schemes.
    pub naan_class: Option<NaanClass>,
}

impl ResolutionEvent {
    pub fn has_colon(&self) -> bool { self.post_scheme.starts_with(':') }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdClass { Ark, Doi, Unclassified }

impl IdClass {
    pub fn key(self) -> &'static str {
        match self { IdClass::Ark => "ark:", IdClass::Doi => "doi:", IdClass::Unclassified => "noclass" }
    }

    fn of(id: &str) -> (Self, Option<&'static str>) {
        if id.starts_with("ark:") {
            let sub = [EZID_TEST_ARK, SHADOW_TEST_ARK].into_iter().find(|p| id.starts_with(p));
            (IdClass::Ark, sub)
        } else if id.starts_with("doi:") {
            (IdClass::Doi, Some(TEST_DOI).filter(|p| id.starts_with(p)))
        } else {
            (IdClass::Unclassified, None)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModificationEvent {
    pub populator: String,
    pub identifier: String,
    pub operation: String,
    pub class: IdClass,
    /// Known test shoulder the identifier falls under, if any.
    pub test_prefix: Option<&'static str>,
}

impl ModificationEvent {
    pub fn mutating(&self) -> bool { MUTATING_OPS.contains(&self.operation.as_str()) }

    /// Key into the modified set; the same id may be touched by several populators.
    pub fn modified_key(&self) -> String { format!("{} {}", self.populator, self.identifier) }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    Resolution(ResolutionEvent),
    Modification(ModificationEvent),
    NonMatch,
}

/// Holds the compiled grammars; a disabled report mode compiles nothing.
pub struct Classifier<'t> {
    resolve: Option<Regex>,
    modify: Option<Regex>,
    naans: &'t ReferenceTable,
}

impl<'t> Classifier<'t> {
    pub fn new(naans: &'t ReferenceTable, resolutions: bool, modifications: bool) -> Self {
        let resolve = if resolutions { Some(Regex::new(RESOLVE_PATTERN).expect("resolve pattern")) } else { None };
        let modify = if modifications { Some(Regex::new(MODIFY_PATTERN).expect("modify pattern")) } else { None };
        Self { resolve, modify, naans }
    }

    pub fn classify(&self, ev: &LogEvent<'_>) -> Classified {
        if let Some(re) = self.resolve.as_ref() && let Some(c) = re.captures(ev.rest) {
            let scheme = c["scheme"].to_string();
            let post_scheme = c["post"].to_string();
            let naming_authority = c["naan"].to_string();
            let naan_class = if scheme == "ark" || scheme == "doi" { Some(self.naans.naan_class(&naming_authority)) } else { None };
            let res = ResolutionEvent {
                blade: c["blade"].to_string(),
                internal: ev.rest.contains(INTERNAL_MARKER),
                php_probe: ev.rest.contains(PHP_PROBE),
                scheme,
                post_scheme,
                naming_authority,
                naan_class,
            };
            if !res.php_probe && !res.internal && !res.has_colon() && ["ark", "doi"].iter().any(|s| res.scheme.starts_with(s) || res.post_scheme.starts_with(s)) {
                warn!("no colon after ark or doi scheme at {} ({} {}): {}", ev.timestamp, ev.origin, ev.transaction_id, ev.rest);
            }
            trace!("{} {} resolve {} {} blade {:?}", ev.transaction_id, ev.origin, res.scheme, res.naming_authority, res.blade);
            return Classified::Resolution(res);
        }
        if let Some(re) = self.modify.as_ref() && let Some(c) = re.captures(ev.rest) {
            let mut identifier = &c["id"];
            if let Some(i) = identifier.rfind('|') && i > 0 { identifier = &identifier[..i]; }
            let (class, test_prefix) = IdClass::of(identifier);
            return Classified::Modification(ModificationEvent {
                populator: ev.populator.to_string(),
                identifier: identifier.to_string(),
                operation: c["op"].to_string(),
                class,
                test_prefix,
            });
        }
        Classified::NonMatch
    }
}
