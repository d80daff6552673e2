//! Pattern automaton: a finite-state transducer whose transitions match
//! taxonomy items on the input side and produce output items.
//!
//! Construction happens in an arena ([`FstBuilder`]): algebraic operations
//! take and return [`Frag`] handles into a shared state table, and transition
//! labels are interned immutable payloads shared across edges (an edge pairs
//! a label id with its own to-state, so sharing a label never shares a
//! destination). Epsilon links are materialized by copying edges, so the
//! frozen automaton contains no epsilon transitions. [`FstBuilder::freeze`]
//! renumbers states densely, drops orphans, and produces the immutable
//! [`Fst`] used by the acceptor and the mining engine.

use crate::dictionary::Dictionary;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use std::sync::Arc;

/// Output fid sentinel for "no output item". Real fids start at 1.
pub const EPSILON_OUTPUT: u32 = 0;

/// Input side of a transition label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputMatch {
    /// Matches every item.
    Any,
    /// Matches exactly this fid.
    Item(u32),
    /// Matches this fid and all its descendants.
    ItemWithDescendants(u32),
}

/// Output side of a transition label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputRule {
    /// Produce nothing.
    Epsilon,
    /// Copy the matched input item.
    Matched,
    /// Copy the matched input item and all its ascendants.
    MatchedWithAscendants,
    /// Produce this constant item.
    Constant(u32),
}

/// Interned transition payload. Immutable once created; the descendant fid
/// set is materialized here exactly once, at label construction time.
#[derive(Debug, Clone)]
pub struct TransitionLabel {
    pub input: InputMatch,
    pub output: OutputRule,
    /// Sorted descendant fids, populated only for `ItemWithDescendants`.
    input_fids: Vec<u32>,
}

impl TransitionLabel {
    /// Does this label match the given input item?
    pub fn matches(&self, fid: u32) -> bool {
        match self.input {
            InputMatch::Any => true,
            InputMatch::Item(label_fid) => label_fid == fid,
            InputMatch::ItemWithDescendants(_) => self.input_fids.binary_search(&fid).is_ok(),
        }
    }

    /// Can this label ever produce an output item?
    pub fn has_output(&self) -> bool {
        self.output != OutputRule::Epsilon
    }

    /// Fill `buf` with the output items produced when `matched` is consumed.
    /// Epsilon produces no items; the generalize rule produces the matched
    /// item followed by all its ascendants.
    pub fn outputs_into(&self, matched: u32, dict: &Dictionary, buf: &mut Vec<u32>) {
        buf.clear();
        match self.output {
            OutputRule::Epsilon => {}
            OutputRule::Matched => buf.push(matched),
            OutputRule::Constant(fid) => buf.push(fid),
            OutputRule::MatchedWithAscendants => {
                buf.push(matched);
                buf.extend_from_slice(dict.ascendant_fids(matched));
            }
        }
    }

    /// Deterministic edge ordering key: outputs first, then inputs.
    fn sort_key(&self) -> (u8, u32, u8, u32) {
        let (output_kind, output_fid) = match self.output {
            OutputRule::Epsilon => (0, 0),
            OutputRule::Matched => (1, 0),
            OutputRule::MatchedWithAscendants => (2, 0),
            OutputRule::Constant(fid) => (3, fid),
        };
        let (input_kind, input_fid) = match self.input {
            InputMatch::Any => (0, 0),
            InputMatch::Item(fid) => (1, fid),
            InputMatch::ItemWithDescendants(fid) => (2, fid),
        };
        (output_kind, output_fid, input_kind, input_fid)
    }
}

/// One transition: a shared label plus this edge's own destination.
#[derive(Debug, Clone, Copy)]
pub struct Edge {
    pub label: u32,
    pub to: u32,
}

/// Handle to a sub-automaton inside the builder arena. Its final states are
/// the flagged states reachable from `initial`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frag {
    pub initial: u32,
}

#[derive(Debug, Default, Clone)]
struct BuildState {
    is_final: bool,
    edges: Vec<Edge>,
}

/// Arena for automaton construction.
pub struct FstBuilder<'d> {
    dict: &'d Dictionary,
    states: Vec<BuildState>,
    labels: Vec<TransitionLabel>,
    label_cache: FxHashMap<(InputMatch, OutputRule), u32>,
}

impl<'d> FstBuilder<'d> {
    pub fn new(dict: &'d Dictionary) -> Self {
        FstBuilder {
            dict,
            states: Vec::new(),
            labels: Vec::new(),
            label_cache: FxHashMap::default(),
        }
    }

    pub fn dict(&self) -> &'d Dictionary {
        self.dict
    }

    /// Allocate a fresh state.
    pub fn state(&mut self, is_final: bool) -> u32 {
        let id = self.states.len() as u32;
        self.states.push(BuildState {
            is_final,
            edges: Vec::new(),
        });
        id
    }

    pub fn set_final(&mut self, state: u32, is_final: bool) {
        self.states[state as usize].is_final = is_final;
    }

    pub fn is_final(&self, state: u32) -> bool {
        self.states[state as usize].is_final
    }

    /// Intern a transition label, materializing the descendant set on first
    /// use. Identical labels are shared across all edges that carry them.
    pub fn label(&mut self, input: InputMatch, output: OutputRule) -> u32 {
        if let Some(&id) = self.label_cache.get(&(input, output)) {
            return id;
        }
        let input_fids = match input {
            InputMatch::ItemWithDescendants(fid) => self.dict.descendant_fids(fid).to_vec(),
            _ => Vec::new(),
        };
        let id = self.labels.len() as u32;
        self.labels.push(TransitionLabel {
            input,
            output,
            input_fids,
        });
        self.label_cache.insert((input, output), id);
        id
    }

    pub fn add_edge(&mut self, from: u32, label: u32, to: u32) {
        self.states[from as usize].edges.push(Edge { label, to });
    }

    /// The elementary two-state automaton: initial --label--> final.
    pub fn two_state_fragment(&mut self, input: InputMatch, output: OutputRule) -> Frag {
        let label = self.label(input, output);
        let initial = self.state(false);
        let fin = self.state(true);
        self.add_edge(initial, label, fin);
        Frag { initial }
    }

    /// The automaton accepting exactly the empty sequence.
    pub fn trivial_accept(&mut self) -> Frag {
        let initial = self.state(true);
        Frag { initial }
    }

    /// Materialized epsilon link: `from` gains all of `to`'s edges and
    /// inherits its finality.
    pub fn epsilon_link(&mut self, from: u32, to: u32) {
        if from == to {
            return;
        }
        if self.states[to as usize].is_final {
            self.states[from as usize].is_final = true;
        }
        let edges = self.states[to as usize].edges.clone();
        self.states[from as usize].edges.extend(edges);
    }

    /// All states reachable from the fragment initial, in BFS order.
    pub fn reachable(&self, frag: Frag) -> Vec<u32> {
        let mut visited = vec![false; self.states.len()];
        let mut order = Vec::new();
        let mut queue = VecDeque::new();
        visited[frag.initial as usize] = true;
        queue.push_back(frag.initial);
        while let Some(s) = queue.pop_front() {
            order.push(s);
            for edge in &self.states[s as usize].edges {
                if !visited[edge.to as usize] {
                    visited[edge.to as usize] = true;
                    queue.push_back(edge.to);
                }
            }
        }
        order
    }

    /// The fragment's final states.
    pub fn finals(&self, frag: Frag) -> Vec<u32> {
        self.reachable(frag)
            .into_iter()
            .filter(|&s| self.states[s as usize].is_final)
            .collect()
    }

    /// Copy the fragment's states into fresh arena slots, sharing labels.
    /// Only the copies' own to-state pointers differ from the original.
    pub fn shallow_copy(&mut self, frag: Frag) -> Frag {
        let old_states = self.reachable(frag);
        let mut remap: FxHashMap<u32, u32> = FxHashMap::default();
        for &old in &old_states {
            let is_final = self.states[old as usize].is_final;
            let copy = self.state(is_final);
            remap.insert(old, copy);
        }
        for &old in &old_states {
            let edges = self.states[old as usize].edges.clone();
            let copy = remap[&old];
            for edge in edges {
                let to = remap[&edge.to];
                self.add_edge(copy, edge.label, to);
            }
        }
        Frag {
            initial: remap[&frag.initial],
        }
    }

    /// Drop duplicate `(label, to)` edges on every reachable state.
    pub fn dedup_edges(&mut self, frag: Frag) {
        for s in self.reachable(frag) {
            let edges = &mut self.states[s as usize].edges;
            let mut seen: FxHashSet<(u32, u32)> = FxHashSet::default();
            edges.retain(|e| seen.insert((e.label, e.to)));
        }
    }

    /// Renumber the fragment densely (initial becomes state 0), drop states
    /// not reachable from the initial, sort edges deterministically, and
    /// compute per-state flags. The result is immutable.
    pub fn freeze(self, frag: Frag) -> Fst {
        let order = self.reachable(frag);
        let mut old_to_new = vec![u32::MAX; self.states.len()];
        for (new, &old) in order.iter().enumerate() {
            old_to_new[old as usize] = new as u32;
        }

        // Compact labels to those actually referenced.
        let mut label_remap = vec![u32::MAX; self.labels.len()];
        let mut labels: Vec<TransitionLabel> = Vec::new();
        let mut states = Vec::with_capacity(order.len());
        for &old in &order {
            let build = &self.states[old as usize];
            let mut edges: Vec<Edge> = build
                .edges
                .iter()
                .map(|e| {
                    let to = old_to_new[e.to as usize];
                    debug_assert!(to != u32::MAX);
                    let slot = &mut label_remap[e.label as usize];
                    if *slot == u32::MAX {
                        *slot = labels.len() as u32;
                        labels.push(self.labels[e.label as usize].clone());
                    }
                    Edge { label: *slot, to }
                })
                .collect();
            edges.sort_by_key(|e| (labels[e.label as usize].sort_key(), e.to));
            states.push(State {
                is_final: build.is_final,
                is_final_complete: false,
                edges,
            });
        }

        let mut fst = Fst {
            initial: 0,
            states,
            labels: labels.into(),
        };
        fst.annotate();
        fst
    }
}

/// One frozen automaton state.
#[derive(Debug, Clone)]
pub struct State {
    pub is_final: bool,
    /// Final state whose every edge is a wildcard/epsilon self-loop; once
    /// entered, the run stays final and produces nothing more.
    pub is_final_complete: bool,
    pub edges: Vec<Edge>,
}

/// Frozen pattern automaton. State ids are dense; state 0 is the initial
/// state. Read-only after construction and shareable across workers.
#[derive(Debug, Clone)]
pub struct Fst {
    initial: u32,
    states: Vec<State>,
    labels: Arc<[TransitionLabel]>,
}

impl Fst {
    pub fn num_states(&self) -> u32 {
        self.states.len() as u32
    }

    pub fn initial_state(&self) -> u32 {
        self.initial
    }

    pub fn is_final(&self, state: u32) -> bool {
        self.states[state as usize].is_final
    }

    pub fn is_final_complete(&self, state: u32) -> bool {
        self.states[state as usize].is_final_complete
    }

    pub fn edges(&self, state: u32) -> &[Edge] {
        &self.states[state as usize].edges
    }

    pub fn label(&self, id: u32) -> &TransitionLabel {
        &self.labels[id as usize]
    }

    pub fn final_states(&self) -> Vec<u32> {
        (0..self.num_states()).filter(|&s| self.is_final(s)).collect()
    }

    /// Whether any transition can produce an output item. An automaton
    /// without one can only ever mine the empty pattern set.
    pub fn has_output(&self) -> bool {
        self.labels.iter().any(|l| l.has_output())
    }

    fn annotate(&mut self) {
        for id in 0..self.states.len() {
            let state = &self.states[id];
            let complete = state.is_final
                && !state.edges.is_empty()
                && state.edges.iter().all(|e| {
                    let label = &self.labels[e.label as usize];
                    e.to == id as u32
                        && label.input == InputMatch::Any
                        && label.output == OutputRule::Epsilon
                });
            self.states[id].is_final_complete = complete;
        }
    }

    /// Invert every edge, sharing labels. State ids and finality flags are
    /// preserved: the forward final states are the backward entry points and
    /// the forward initial state is the backward accept target.
    pub fn reversed(&self) -> Fst {
        let n = self.states.len();
        let mut states: Vec<State> = self
            .states
            .iter()
            .map(|s| State {
                is_final: s.is_final,
                is_final_complete: false,
                edges: Vec::new(),
            })
            .collect();
        for from in 0..n {
            for edge in &self.states[from].edges {
                states[edge.to as usize].edges.push(Edge {
                    label: edge.label,
                    to: from as u32,
                });
            }
        }
        Fst {
            initial: self.initial,
            states,
            labels: Arc::clone(&self.labels),
        }
    }

    /// Plain input-side acceptance: does some run over `seq` end in a final
    /// state exactly at end of input? Outputs are ignored.
    pub fn accepts(&self, seq: &[u32]) -> bool {
        fn step(
            fst: &Fst,
            seq: &[u32],
            pos: usize,
            state: u32,
            visited: &mut FxHashSet<u64>,
        ) -> bool {
            if !visited.insert(((state as u64) << 32) | pos as u64) {
                return false;
            }
            if pos == seq.len() {
                return fst.is_final(state);
            }
            if fst.is_final_complete(state) {
                return true;
            }
            fst.edges(state)
                .iter()
                .any(|e| fst.label(e.label).matches(seq[pos]) && step(fst, seq, pos + 1, e.to, visited))
        }
        let mut visited = FxHashSet::default();
        step(self, seq, 0, self.initial, &mut visited)
    }
}
