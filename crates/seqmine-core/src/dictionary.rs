//! Item taxonomy with dense frequency identifiers.
//!
//! Items form a DAG (an item may have several parents). After
//! [`Dictionary::recompute_fids`] every item carries a *fid*: a dense integer
//! id ranked by descending document frequency, so "is this item frequent?"
//! is the single comparison `fid <= largest_fid_above(sigma)`. Fid 0 is
//! reserved as the epsilon-output sentinel of the automaton layer.

use crate::error::{Error, Result};
use rustc_hash::{FxHashMap, FxHashSet};

/// A single item in the taxonomy.
#[derive(Debug, Clone)]
pub struct Item {
    /// Stable global identifier.
    pub gid: u32,
    /// Unique textual identifier.
    pub sid: String,
    /// Dense frequency identifier; 0 until assigned by `recompute_fids`.
    pub fid: u32,
    /// Collection frequency of this item and its descendants.
    pub c_freq: u64,
    /// Document frequency of this item and its descendants.
    pub d_freq: u64,
    parents: Vec<usize>,
    children: Vec<usize>,
}

/// In-memory taxonomy. Mutable while items and edges are added; frozen for
/// the automaton layer once `recompute_fids` has run.
#[derive(Debug, Default)]
pub struct Dictionary {
    items: Vec<Item>,
    by_sid: FxHashMap<String, usize>,
    by_gid: FxHashMap<u32, usize>,

    /// fid -> item index; entry 0 unused (fids start at 1).
    fid_index: Vec<usize>,
    /// Per fid: all transitive ascendant fids, sorted ascending, self excluded.
    ascendants: Vec<Vec<u32>>,
    /// Per fid: all transitive descendant fids, sorted ascending, self included.
    descendants: Vec<Vec<u32>>,
}

impl Dictionary {
    pub fn new() -> Self {
        Dictionary::default()
    }

    /// Number of items in the dictionary.
    pub fn num_items(&self) -> usize {
        self.items.len()
    }

    /// True once fids have been assigned.
    pub fn has_fids(&self) -> bool {
        !self.fid_index.is_empty()
    }

    /// Add a new item with zero frequencies. Gids and sids must be unique.
    pub fn add_item(&mut self, gid: u32, sid: &str) -> Result<()> {
        if self.by_gid.contains_key(&gid) {
            return Err(Error::InvalidConfig(format!("duplicate item gid {gid}")));
        }
        if self.by_sid.contains_key(sid) {
            return Err(Error::InvalidConfig(format!("duplicate item sid '{sid}'")));
        }
        let index = self.items.len();
        self.items.push(Item {
            gid,
            sid: sid.to_string(),
            fid: 0,
            c_freq: 0,
            d_freq: 0,
            parents: Vec::new(),
            children: Vec::new(),
        });
        self.by_gid.insert(gid, index);
        self.by_sid.insert(sid.to_string(), index);
        self.fid_index.clear(); // fids are stale now
        Ok(())
    }

    /// Connect child and parent items.
    pub fn add_parent(&mut self, child_gid: u32, parent_gid: u32) -> Result<()> {
        let child = self.index_of_gid(child_gid)?;
        let parent = self.index_of_gid(parent_gid)?;
        self.items[child].parents.push(parent);
        self.items[parent].children.push(child);
        self.fid_index.clear();
        Ok(())
    }

    /// Set frequencies of one item directly (e.g., when loading a prepared
    /// dictionary). Frequencies must already include descendant occurrences.
    pub fn set_frequencies(&mut self, gid: u32, c_freq: u64, d_freq: u64) -> Result<()> {
        let index = self.index_of_gid(gid)?;
        self.items[index].c_freq = c_freq;
        self.items[index].d_freq = d_freq;
        self.fid_index.clear();
        Ok(())
    }

    /// Count one input sequence of gids: collection frequency grows per
    /// occurrence, document frequency once per distinct item, both propagated
    /// to all ascendants.
    pub fn count_sequence(&mut self, gids: &[u32]) -> Result<()> {
        let mut counted: FxHashMap<usize, u64> = FxHashMap::default();
        for &gid in gids {
            let index = self.index_of_gid(gid)?;
            let mut seen = FxHashSet::default();
            self.collect_self_and_ascendants(index, &mut seen);
            for i in seen {
                *counted.entry(i).or_insert(0) += 1;
            }
        }
        for (index, occurrences) in counted {
            self.items[index].c_freq += occurrences;
            self.items[index].d_freq += 1;
        }
        self.fid_index.clear();
        Ok(())
    }

    fn collect_self_and_ascendants(&self, index: usize, out: &mut FxHashSet<usize>) {
        if !out.insert(index) {
            return;
        }
        for p in 0..self.items[index].parents.len() {
            self.collect_self_and_ascendants(self.items[index].parents[p], out);
        }
    }

    /// Assign dense fids by descending document frequency (ties broken by
    /// ascending gid) and materialize per-fid ascendant/descendant sets.
    /// Must run before the taxonomy is handed to the automaton layer.
    pub fn recompute_fids(&mut self) {
        let n = self.items.len();
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| {
            self.items[b]
                .d_freq
                .cmp(&self.items[a].d_freq)
                .then(self.items[a].gid.cmp(&self.items[b].gid))
        });

        self.fid_index = vec![usize::MAX; n + 1];
        for (rank, &index) in order.iter().enumerate() {
            let fid = rank as u32 + 1;
            self.items[index].fid = fid;
            self.fid_index[fid as usize] = index;
        }

        // Transitive closure over the DAG, per item.
        self.ascendants = vec![Vec::new(); n + 1];
        self.descendants = vec![Vec::new(); n + 1];
        for fid in 1..=n as u32 {
            let index = self.fid_index[fid as usize];

            let mut up = FxHashSet::default();
            self.collect_self_and_ascendants(index, &mut up);
            up.remove(&index);
            let mut up: Vec<u32> = up.into_iter().map(|i| self.items[i].fid).collect();
            up.sort_unstable();
            self.ascendants[fid as usize] = up;

            let mut down = FxHashSet::default();
            self.collect_self_and_descendants(index, &mut down);
            let mut down: Vec<u32> = down.into_iter().map(|i| self.items[i].fid).collect();
            down.sort_unstable();
            self.descendants[fid as usize] = down;
        }
    }

    fn collect_self_and_descendants(&self, index: usize, out: &mut FxHashSet<usize>) {
        if !out.insert(index) {
            return;
        }
        for c in 0..self.items[index].children.len() {
            self.collect_self_and_descendants(self.items[index].children[c], out);
        }
    }

    /// Fid of the item with the given textual identifier.
    pub fn fid_of(&self, sid: &str) -> Result<u32> {
        debug_assert!(self.has_fids(), "recompute_fids must run before lookups");
        self.by_sid
            .get(sid)
            .map(|&i| self.items[i].fid)
            .ok_or_else(|| Error::NotFound(sid.to_string()))
    }

    /// Fid of the item with the given gid.
    pub fn gid_to_fid(&self, gid: u32) -> Result<u32> {
        debug_assert!(self.has_fids(), "recompute_fids must run before lookups");
        self.by_gid
            .get(&gid)
            .map(|&i| self.items[i].fid)
            .ok_or_else(|| Error::NotFound(format!("gid {gid}")))
    }

    /// Textual identifier of the item with the given fid.
    pub fn sid_of_fid(&self, fid: u32) -> Result<&str> {
        self.item_of_fid(fid)
            .map(|item| item.sid.as_str())
            .ok_or_else(|| Error::NotFound(format!("fid {fid}")))
    }

    fn item_of_fid(&self, fid: u32) -> Option<&Item> {
        let fid = fid as usize;
        if fid == 0 || fid >= self.fid_index.len() {
            return None;
        }
        Some(&self.items[self.fid_index[fid]])
    }

    /// Document frequency of the item with the given fid.
    pub fn d_freq_of(&self, fid: u32) -> u64 {
        self.item_of_fid(fid).map_or(0, |item| item.d_freq)
    }

    /// All transitive ascendant fids of `fid`, sorted ascending, self excluded.
    pub fn ascendant_fids(&self, fid: u32) -> &[u32] {
        &self.ascendants[fid as usize]
    }

    /// All transitive descendant fids of `fid`, sorted ascending, self included.
    pub fn descendant_fids(&self, fid: u32) -> &[u32] {
        &self.descendants[fid as usize]
    }

    /// Largest fid whose document frequency is at least `sigma`, or 0 if no
    /// item is that frequent. Because fids rank by descending frequency, an
    /// item is frequent iff `fid <= largest_fid_above(sigma)`.
    pub fn largest_fid_above(&self, sigma: u64) -> u32 {
        let mut largest = 0;
        for fid in 1..=self.items.len() as u32 {
            if self.d_freq_of(fid) >= sigma {
                largest = fid;
            } else {
                break;
            }
        }
        largest
    }

    /// Iterate all fids ascending (most frequent first).
    pub fn fids(&self) -> std::ops::RangeInclusive<u32> {
        1..=self.items.len() as u32
    }

    /// Map textual identifiers to fids, failing on the first unknown sid.
    pub fn fids_of(&self, sids: &[&str]) -> Result<Vec<u32>> {
        sids.iter().map(|sid| self.fid_of(sid)).collect()
    }

    fn index_of_gid(&self, gid: u32) -> Result<usize> {
        self.by_gid
            .get(&gid)
            .copied()
            .ok_or_else(|| Error::NotFound(format!("gid {gid}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_taxonomy() -> Dictionary {
        // P is parent of A and B; C is flat.
        let mut dict = Dictionary::new();
        dict.add_item(1, "P").unwrap();
        dict.add_item(2, "A").unwrap();
        dict.add_item(3, "B").unwrap();
        dict.add_item(4, "C").unwrap();
        dict.add_parent(2, 1).unwrap();
        dict.add_parent(3, 1).unwrap();
        dict
    }

    #[test]
    fn test_fid_ranking() {
        let mut dict = small_taxonomy();
        dict.count_sequence(&[2, 2, 3]).unwrap();
        dict.count_sequence(&[2, 4]).unwrap();
        dict.recompute_fids();

        // d_freqs: P=2 (via A,B), A=2, B=1, C=1
        let p = dict.fid_of("P").unwrap();
        let a = dict.fid_of("A").unwrap();
        let b = dict.fid_of("B").unwrap();
        let c = dict.fid_of("C").unwrap();
        assert_eq!(p, 1); // ties broken by gid
        assert_eq!(a, 2);
        assert_eq!(b, 3);
        assert_eq!(c, 4);
        assert_eq!(dict.d_freq_of(p), 2);
        assert_eq!(dict.largest_fid_above(2), a);
        assert_eq!(dict.largest_fid_above(1), c);
        assert_eq!(dict.largest_fid_above(3), 0);
    }

    #[test]
    fn test_ascendants_descendants() {
        let mut dict = small_taxonomy();
        dict.count_sequence(&[2, 3, 4]).unwrap();
        dict.recompute_fids();

        let p = dict.fid_of("P").unwrap();
        let a = dict.fid_of("A").unwrap();
        let b = dict.fid_of("B").unwrap();

        assert_eq!(dict.ascendant_fids(a), &[p]);
        assert!(dict.ascendant_fids(p).is_empty());
        let mut down = dict.descendant_fids(p).to_vec();
        down.sort_unstable();
        let mut expected = vec![p, a, b];
        expected.sort_unstable();
        assert_eq!(down, expected);
        assert_eq!(dict.descendant_fids(a), &[a]); // self included
    }

    #[test]
    fn test_dag_multiple_parents() {
        let mut dict = Dictionary::new();
        dict.add_item(1, "X").unwrap();
        dict.add_item(2, "Y").unwrap();
        dict.add_item(3, "Z").unwrap();
        dict.add_parent(3, 1).unwrap();
        dict.add_parent(3, 2).unwrap();
        dict.count_sequence(&[3]).unwrap();
        dict.recompute_fids();

        let z = dict.fid_of("Z").unwrap();
        assert_eq!(dict.ascendant_fids(z).len(), 2);
        // Counting Z reaches both parents exactly once.
        assert_eq!(dict.d_freq_of(dict.fid_of("X").unwrap()), 1);
        assert_eq!(dict.d_freq_of(dict.fid_of("Y").unwrap()), 1);
    }

    #[test]
    fn test_unknown_item_is_not_found() {
        let mut dict = small_taxonomy();
        dict.recompute_fids();
        assert!(matches!(dict.fid_of("missing"), Err(Error::NotFound(_))));
        assert!(matches!(dict.gid_to_fid(99), Err(Error::NotFound(_))));
    }
}
