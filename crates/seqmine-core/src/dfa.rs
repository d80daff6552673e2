//! Deterministic acceptor over the input side of a pattern automaton.
//!
//! Built by subset construction from the forward automaton: an acceptor
//! state is an interned set of automaton states, and items are partitioned
//! into transition classes by their successor set, so one transition covers
//! every item that behaves identically. The acceptor answers "can this
//! input produce any pattern?" without enumerating outputs, which makes it
//! cheap enough to run on every input sequence as a pre-filter. It also
//! records the per-position reachability trace that the two-pass engine
//! replays backwards.

use crate::dictionary::Dictionary;
use crate::fst::Fst;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;

/// One transition class: every item in `items` leads to `to`.
#[derive(Debug)]
struct AcceptorTransition {
    /// Sorted item fids.
    items: Vec<u32>,
    to: u32,
}

#[derive(Debug)]
struct AcceptorState {
    /// Sorted automaton states in this subset.
    fst_states: Vec<u32>,
    /// Dense membership flags, indexed by automaton state id.
    fst_membership: Vec<bool>,
    /// Final automaton states in this subset.
    fst_final_states: Vec<u32>,
    /// Final-complete automaton states in this subset.
    fst_final_complete_states: Vec<u32>,
    transitions: Vec<AcceptorTransition>,
}

/// Deterministic input-side acceptor. State 0 corresponds to the singleton
/// set holding the automaton's initial state.
#[derive(Debug)]
pub struct Acceptor {
    states: Vec<AcceptorState>,
}

impl Acceptor {
    pub fn new(fst: &Fst, dict: &Dictionary) -> Self {
        let mut acceptor = Acceptor { states: Vec::new() };
        let mut interned: FxHashMap<Vec<u32>, u32> = FxHashMap::default();
        let mut worklist: VecDeque<u32> = VecDeque::new();

        let initial = vec![fst.initial_state()];
        let id = acceptor.intern(initial, fst, &mut interned);
        worklist.push_back(id);

        // Per-item successor sets, regrouped into transition classes.
        let mut successors: FxHashMap<u32, Vec<u32>> = FxHashMap::default();
        let mut classes: FxHashMap<Vec<u32>, Vec<u32>> = FxHashMap::default();
        while let Some(from) = worklist.pop_front() {
            successors.clear();
            classes.clear();

            for fid in dict.fids() {
                let mut reached: Vec<u32> = Vec::new();
                for &s in &acceptor.states[from as usize].fst_states {
                    for edge in fst.edges(s) {
                        if fst.label(edge.label).matches(fid) {
                            reached.push(edge.to);
                        }
                    }
                }
                if !reached.is_empty() {
                    reached.sort_unstable();
                    reached.dedup();
                    successors.insert(fid, reached);
                }
            }
            for (&fid, reached) in &successors {
                classes.entry(reached.clone()).or_default().push(fid);
            }

            let mut transitions = Vec::with_capacity(classes.len());
            for (reached, mut items) in classes.drain() {
                items.sort_unstable();
                let to = match interned.get(&reached) {
                    Some(&to) => to,
                    None => {
                        let to = acceptor.intern(reached, fst, &mut interned);
                        worklist.push_back(to);
                        to
                    }
                };
                transitions.push(AcceptorTransition { items, to });
            }
            transitions.sort_by_key(|t| t.items[0]);
            acceptor.states[from as usize].transitions = transitions;
        }
        acceptor
    }

    fn intern(&mut self, fst_states: Vec<u32>, fst: &Fst, interned: &mut FxHashMap<Vec<u32>, u32>) -> u32 {
        let id = self.states.len() as u32;
        let mut fst_membership = vec![false; fst.num_states() as usize];
        let mut fst_final_states = Vec::new();
        let mut fst_final_complete_states = Vec::new();
        for &s in &fst_states {
            fst_membership[s as usize] = true;
            if fst.is_final(s) {
                fst_final_states.push(s);
            }
            if fst.is_final_complete(s) {
                fst_final_complete_states.push(s);
            }
        }
        interned.insert(fst_states.clone(), id);
        self.states.push(AcceptorState {
            fst_states,
            fst_membership,
            fst_final_states,
            fst_final_complete_states,
            transitions: Vec::new(),
        });
        id
    }

    pub fn num_states(&self) -> u32 {
        self.states.len() as u32
    }

    pub fn initial_state(&self) -> u32 {
        0
    }

    /// Follow the transition for one item, if any.
    pub fn consume(&self, state: u32, fid: u32) -> Option<u32> {
        self.states[state as usize]
            .transitions
            .iter()
            .find(|t| t.items.binary_search(&fid).is_ok())
            .map(|t| t.to)
    }

    /// Is the given automaton state a member of this acceptor state's subset?
    pub fn fst_contains(&self, state: u32, fst_state: u32) -> bool {
        self.states[state as usize].fst_membership[fst_state as usize]
    }

    /// Final automaton states in this acceptor state's subset.
    pub fn fst_final_states(&self, state: u32) -> &[u32] {
        &self.states[state as usize].fst_final_states
    }

    /// Final-complete automaton states in this acceptor state's subset.
    pub fn fst_final_complete_states(&self, state: u32) -> &[u32] {
        &self.states[state as usize].fst_final_complete_states
    }

    fn contains_final(&self, state: u32) -> bool {
        !self.states[state as usize].fst_final_states.is_empty()
    }

    fn contains_final_complete(&self, state: u32) -> bool {
        !self.states[state as usize].fst_final_complete_states.is_empty()
    }

    /// Can this input sequence produce any accepting run? A run accepts when
    /// it sits in a final state at end of input, or reaches a final-complete
    /// state at any position.
    pub fn is_relevant(&self, sequence: &[u32]) -> bool {
        let mut state = self.initial_state();
        if self.contains_final_complete(state) {
            return true;
        }
        for &fid in sequence {
            state = match self.consume(state, fid) {
                Some(next) => next,
                None => return false,
            };
            if self.contains_final_complete(state) {
                return true;
            }
        }
        self.contains_final(state)
    }

    /// Forward pass of the two-pass protocol. Fills `trace` with the
    /// acceptor state after each consumed item (`trace[p]` is the state
    /// after `p` items, so `trace[0]` is the initial state) and `final_pos`
    /// with every position where a match can end: any position whose subset
    /// holds a final-complete state, plus the end of input when its subset
    /// holds a final state. Returns true if the input is relevant. The
    /// trace may be shorter than the input when the acceptor dies early.
    pub fn relevant_trace(&self, sequence: &[u32], trace: &mut Vec<u32>, final_pos: &mut Vec<usize>) -> bool {
        trace.clear();
        final_pos.clear();
        let mut state = self.initial_state();
        trace.push(state);
        if self.contains_final_complete(state) {
            final_pos.push(0);
        }
        for (pos, &fid) in sequence.iter().enumerate() {
            state = match self.consume(state, fid) {
                Some(next) => next,
                None => return !final_pos.is_empty(),
            };
            trace.push(state);
            if self.contains_final_complete(state) {
                final_pos.push(pos + 1);
            }
        }
        if self.contains_final(state) && final_pos.last() != Some(&sequence.len()) {
            final_pos.push(sequence.len());
        }
        !final_pos.is_empty()
    }
}
