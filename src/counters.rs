use std::collections::{BTreeSet, HashMap};
use serde::{Serialize, Serializer};
use crate::classify::{Classified, ModificationEvent, ResolutionEvent};

/// Scheme bucket for resolve requests carrying a php probe.
pub const PHPHACK: &str = "<phphack>";
/// Scheme bucket for resolve requests whose scheme is not followed by a colon.
pub const SOMEFILE: &str = "<somefile>";

/// Category counts that remember first-insertion order. Absent keys read as zero.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tally {
    entries: Vec<(String, u64)>,
    index: HashMap<String, usize>,
}

impl Tally {
    pub fn add(&mut self, key: &str, n: u64) {
        match self.index.get(key) {
            Some(&i) => self.entries[i].1 += n,
            None => {
                self.index.insert(key.to_string(), self.entries.len());
                self.entries.push((key.to_string(), n));
            }
        }
    }

    pub fn bump(&mut self, key: &str) { self.add(key, 1); }

    pub fn get(&self, key: &str) -> u64 { self.index.get(key).map_or(0, |&i| self.entries[i].1) }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn merge(&mut self, other: &Tally) {
        for (k, v) in &other.entries { self.add(k, *v); }
    }

    /// Entries by descending count; ties keep insertion order.
    pub fn ranked(&self) -> Vec<(&str, u64)> {
        let mut v: Vec<(&str, u64)> = self.entries.iter().map(|(k, n)| (k.as_str(), *n)).collect();
        v.sort_by(|a, b| b.1.cmp(&a.1));
        v
    }
}

/// Serialized as a map in ranked order.
impl Serialize for Tally {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_map(self.ranked())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub schemes: Tally,
    /// Keyed `scheme:naan`, ark and doi only.
    pub naans: Tally,
    pub naan_classes: Tally,
    pub ops: Tally,
    pub ids: Tally,
    pub test_ids: Tally,
    /// `populator identifier` pairs touched by a mutating operation, sorted.
    pub modified: BTreeSet<String>,
    /// Lines matching the resolve grammar, internal and probe traffic included.
    pub resolution: u64,
    pub internal: u64,
    pub modification: u64,
    pub non_match: u64,
    pub malformed: u64,
    pub pre_start: u64,
}

impl Counters {
    fn absorb(&mut self, other: &Counters) {
        self.schemes.merge(&other.schemes);
        self.naans.merge(&other.naans);
        self.naan_classes.merge(&other.naan_classes);
        self.ops.merge(&other.ops);
        self.ids.merge(&other.ids);
        self.test_ids.merge(&other.test_ids);
        self.modified.extend(other.modified.iter().cloned());
        self.resolution += other.resolution;
        self.internal += other.internal;
        self.modification += other.modification;
        self.non_match += other.non_match;
        self.malformed += other.malformed;
        self.pre_start += other.pre_start;
    }

    fn record_resolution(&mut self, r: &ResolutionEvent) {
        self.resolution += 1;
        if r.php_probe { self.schemes.bump(PHPHACK); return; }
        if r.internal { self.internal += 1; return; }
        if !r.has_colon() { self.schemes.bump(SOMEFILE); return; }
        self.schemes.bump(&r.scheme);
        if let Some(class) = r.naan_class {
            self.naans.bump(&format!("{}:{}", r.scheme, r.naming_authority));
            self.naan_classes.bump(class.letter());
        }
    }

    fn record_modification(&mut self, m: &ModificationEvent) {
        self.modification += 1;
        self.ops.bump(&m.operation);
        self.ids.bump(&m.identifier);
        self.test_ids.bump(m.class.key());
        if let Some(p) = m.test_prefix { self.test_ids.bump(p); }
        if m.mutating() { self.modified.insert(m.modified_key()); }
    }
}

/// Partial counts for the current window plus running totals.
#[derive(Debug, Default)]
pub struct Aggregator {
    partial: Counters,
    total: Counters,
}

impl Aggregator {
    pub fn record(&mut self, c: &Classified) {
        match c {
            Classified::Resolution(r) => self.partial.record_resolution(r),
            Classified::Modification(m) => self.partial.record_modification(m),
            Classified::NonMatch => self.partial.non_match += 1,
        }
    }

    pub fn malformed(&mut self) { self.partial.malformed += 1; }

    pub fn pre_start(&mut self) { self.partial.pre_start += 1; }

    /// Adds the partial counts into the totals and clears them.
    /// Returns the number of resolution lines the window held.
    pub fn flush(&mut self) -> u64 {
        let matched = self.partial.resolution;
        self.total.absorb(&self.partial);
        self.partial = Counters::default();
        matched
    }

    pub fn partial(&self) -> &Counters { &self.partial }

    pub fn total(&self) -> &Counters { &self.total }
}
