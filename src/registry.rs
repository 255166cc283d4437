//! Reference tables: read-only lookups used to label report rows.
//!
//! All three registries are tab-separated, one row per key, no header:
//! - `naan_table.txt`: `naan \t label \t type...`
//! - `doi_naans.txt`: `naan/shoulder \t label \t type...`
//! - `prefixes.txt`: `prefix \t longname \t alias \t synonym`

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use crate::error::TlogError;

pub const NAAN_FILE: &str = "naan_table.txt";
pub const SHOULDER_FILE: &str = "doi_naans.txt";
pub const PREFIX_FILE: &str = "prefixes.txt";
pub const NOT_REGISTERED: &str = "not registered";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NaanClass {
    /// ARK assigned through EZID.
    Ezid,
    NonEzid,
    /// DOI prefix or shadow ARK; anything the naan registry does not know.
    Doi,
}

impl NaanClass {
    pub fn letter(self) -> &'static str {
        match self { NaanClass::Ezid => "E", NaanClass::NonEzid => "N", NaanClass::Doi => "D" }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReferenceTable {
    labels: HashMap<String, String>,
}

impl ReferenceTable {
    pub fn from_pairs<K: Into<String>, V: Into<String>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        Self { labels: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }

    pub fn get(&self, key: &str) -> Option<&str> { self.labels.get(key).map(String::as_str) }

    pub fn len(&self) -> usize { self.labels.len() }

    pub fn is_empty(&self) -> bool { self.labels.is_empty() }

    /// Class of a naming authority by the type letter its label starts with.
    pub fn naan_class(&self, naan: &str) -> NaanClass {
        match self.get(naan).and_then(|l| l.chars().next()) {
            Some('E') => NaanClass::Ezid,
            Some(_) => NaanClass::NonEzid,
            None => NaanClass::Doi,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ReferenceTables {
    pub naans: ReferenceTable,
    pub prefixes: ReferenceTable,
}

impl ReferenceTables {
    /// Loads all registries from `dir`. A missing file leaves its table empty.
    pub fn load(dir: &Path) -> Result<Self, TlogError> {
        let mut naans = match open(&dir.join(NAAN_FILE))? { Some(r) => load_naans(r, &dir.join(NAAN_FILE))?, None => ReferenceTable::default() };
        let shoulders = match open(&dir.join(SHOULDER_FILE))? { Some(r) => load_shoulders(r, &dir.join(SHOULDER_FILE), &mut naans)?, None => ReferenceTable::default() };
        let prefixes = match open(&dir.join(PREFIX_FILE))? { Some(r) => load_prefixes(r, &dir.join(PREFIX_FILE))?, None => ReferenceTable::default() };
        info!("Loaded {} naans, {} shoulders, {} prefixes from {}", naans.len(), shoulders.len(), prefixes.len(), dir.display());
        Ok(Self { naans, prefixes })
    }

    pub fn prefix_label(&self, scheme: &str) -> &str {
        self.prefixes.get(scheme).filter(|l| !l.is_empty()).unwrap_or(NOT_REGISTERED)
    }

    /// Label for a `scheme:naan` key, cut before any ` (=)` marker.
    pub fn naan_label(&self, key: &str) -> &str {
        let naan = key.split_once(':').map_or(key, |(_, n)| n);
        let label = self.naans.get(naan).filter(|l| !l.is_empty()).unwrap_or(NOT_REGISTERED);
        label.find(" (=)").map_or(label, |i| &label[..i])
    }
}

fn open(path: &Path) -> Result<Option<std::fs::File>, TlogError> {
    match std::fs::File::open(path) {
        Ok(f) => Ok(Some(f)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => { warn!("Missing reference table {}", path.display()); Ok(None) }
        Err(e) => Err(TlogError::io(path, e)),
    }
}

fn rows<R: Read>(rdr: R, path: &Path) -> Result<Vec<Vec<String>>, TlogError> {
    let mut rdr = csv::ReaderBuilder::new().delimiter(b'\t').has_headers(false).flexible(true).quoting(false).from_reader(rdr);
    let mut out = Vec::new();
    for rec in rdr.records() {
        let rec = rec.map_err(|e| TlogError::table(path, e))?;
        out.push(rec.iter().map(str::to_string).collect());
    }
    Ok(out)
}

fn col(row: &[String], i: usize) -> &str { row.get(i).map_or("", String::as_str) }

fn type_letter(t: &str) -> char { if t.starts_with('E') { 'E' } else { 'N' } }

pub fn load_naans<R: Read>(rdr: R, path: &Path) -> Result<ReferenceTable, TlogError> {
    let mut labels = HashMap::new();
    for row in rows(rdr, path)? {
        labels.insert(col(&row, 0).to_string(), format!("{} {}", type_letter(col(&row, 2)), col(&row, 1)));
    }
    Ok(ReferenceTable { labels })
}

/// Loads the shoulder registry and adds any naan it names that `naans` lacks;
/// the first shoulder seen for a naan wins.
pub fn load_shoulders<R: Read>(rdr: R, path: &Path, naans: &mut ReferenceTable) -> Result<ReferenceTable, TlogError> {
    let mut labels = HashMap::new();
    for row in rows(rdr, path)? {
        let key = col(&row, 0);
        let (naan, _) = key.split_once('/').ok_or_else(|| TlogError::BadShoulder(key.to_string()))?;
        let t = type_letter(col(&row, 2));
        labels.insert(key.to_string(), format!("{} {}", t, col(&row, 1)));
        naans.labels.entry(naan.to_string()).or_insert_with(|| format!("{} {}", t, naan));
    }
    Ok(ReferenceTable { labels })
}

fn last_segment(prefix: &str) -> Option<&str> {
    prefix.rsplit('/').next().filter(|s| !s.is_empty())
}

fn with_last_segment(prefix: &str, replacement: &str) -> Result<String, TlogError> {
    let last = last_segment(prefix).ok_or_else(|| TlogError::BadPrefix(prefix.to_string()))?;
    Ok(format!("{}{}", &prefix[..prefix.len() - last.len()], replacement))
}

/// Loads the prefix registry. A row without a longname inherits the label of
/// its synonym, which must already have been seen. An alias registers the
/// label again under the key whose last `/` segment is the alias.
pub fn load_prefixes<R: Read>(rdr: R, path: &Path) -> Result<ReferenceTable, TlogError> {
    let mut labels: HashMap<String, String> = HashMap::new();
    let mut aliases: HashMap<String, String> = HashMap::new();
    for row in rows(rdr, path)? {
        let (prefix, longname, alias, synonym) = (col(&row, 0), col(&row, 1), col(&row, 2), col(&row, 3));
        let name = if !longname.is_empty() {
            longname.to_string()
        } else if !synonym.is_empty() {
            let inherited = labels.get(synonym).cloned().ok_or_else(|| TlogError::UnresolvableSynonym { prefix: prefix.to_string(), synonym: synonym.to_string() })?;
            let last = last_segment(prefix).ok_or_else(|| TlogError::BadPrefix(prefix.to_string()))?;
            if let Some(a) = aliases.get(last) { labels.insert(with_last_segment(prefix, a)?, inherited.clone()); }
            inherited
        } else {
            String::new()
        };
        if !name.is_empty() { labels.insert(prefix.to_string(), name.clone()); }
        if !alias.is_empty() {
            aliases.insert(prefix.to_string(), alias.to_string());
            if !name.is_empty() { labels.insert(with_last_segment(prefix, alias)?, name); }
        }
    }
    Ok(ReferenceTable { labels })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p() -> &'static Path { Path::new("test.txt") }

    #[test]
    fn naan_rows_carry_type_letter() {
        let t = load_naans("12345\tExample Museum\tEZID\n13960\tInternet Archive\tNAAN\n99999\tTest (=) Alias\t\n".as_bytes(), p()).unwrap();
        assert_eq!(t.get("12345"), Some("E Example Museum"));
        assert_eq!(t.get("13960"), Some("N Internet Archive"));
        assert_eq!(t.naan_class("12345"), NaanClass::Ezid);
        assert_eq!(t.naan_class("13960"), NaanClass::NonEzid);
        assert_eq!(t.naan_class("10.1234"), NaanClass::Doi);
    }

    #[test]
    fn shoulders_backfill_missing_naans() {
        let mut naans = load_naans("12345\tExample Museum\tEZID\n".as_bytes(), p()).unwrap();
        let s = load_shoulders("10.5072/FK2\tTest DOIs\tEZID\n10.5072/X9\tOther\tN\nb5072/fk2\tShadow\tE\n12345/x5\tMuseum x5\tN\n".as_bytes(), p(), &mut naans).unwrap();
        assert_eq!(s.get("10.5072/FK2"), Some("E Test DOIs"));
        assert_eq!(naans.get("10.5072"), Some("E 10.5072"));
        assert_eq!(naans.get("b5072"), Some("E b5072"));
        assert_eq!(naans.get("12345"), Some("E Example Museum"));
    }

    #[test]
    fn shoulder_without_slash_is_fatal() {
        let mut naans = ReferenceTable::default();
        assert!(matches!(load_shoulders("10.5072\tx\tE\n".as_bytes(), p(), &mut naans), Err(TlogError::BadShoulder(_))));
    }

    #[test]
    fn prefix_alias_and_synonym() {
        let data = "pubmed\tPubMed\tpmid\t\nebi/pubmed\t\t\tpubmed\npdb\tProtein Data Bank\t\t\nxyz/pdb\t\t\tpdb\n";
        let t = load_prefixes(data.as_bytes(), p()).unwrap();
        assert_eq!(t.get("pubmed"), Some("PubMed"));
        assert_eq!(t.get("pmid"), Some("PubMed"));
        assert_eq!(t.get("ebi/pubmed"), Some("PubMed"));
        assert_eq!(t.get("ebi/pmid"), Some("PubMed"));
        assert_eq!(t.get("xyz/pdb"), Some("Protein Data Bank"));
    }

    #[test]
    fn unknown_synonym_is_fatal() {
        let err = load_prefixes("abc/def\t\t\tnowhere\n".as_bytes(), p()).unwrap_err();
        assert!(matches!(err, TlogError::UnresolvableSynonym { .. }));
    }

    #[test]
    fn alias_on_trailing_slash_is_fatal() {
        assert!(matches!(load_prefixes("abc/\tName\tx\t\n".as_bytes(), p()), Err(TlogError::BadPrefix(_))));
    }

    #[test]
    fn labels_fall_back_and_trim() {
        let tables = ReferenceTables {
            naans: ReferenceTable::from_pairs([("99999", "N Test (=) Other")]),
            prefixes: ReferenceTable::from_pairs([("ark", "Archival Resource Key")]),
        };
        assert_eq!(tables.prefix_label("ark"), "Archival Resource Key");
        assert_eq!(tables.prefix_label("zzz"), NOT_REGISTERED);
        assert_eq!(tables.naan_label("ark:99999"), "N Test");
        assert_eq!(tables.naan_label("doi:10.1"), NOT_REGISTERED);
        assert_eq!(tables.naan_label("ark:99999"), tables.naan_label("ark:99999"));
    }

    #[test]
    fn load_tolerates_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(NAAN_FILE), "12345\tExample\tE\n").unwrap();
        let tables = ReferenceTables::load(dir.path()).unwrap();
        assert_eq!(tables.naans.len(), 1);
        assert!(tables.prefixes.is_empty());
    }
}
