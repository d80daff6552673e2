//! Pattern-growth mining engine.
//!
//! The miner compiles a pattern expression, buffers weighted input
//! sequences, and grows frequent patterns depth-first: every search tree
//! node holds one output prefix together with a byte-encoded projected
//! database of `(input, state, position)` snapshots from which the
//! automaton run can resume. Children are expanded in ascending fid order
//! and pruned against the minimum support before recursion, so the
//! anti-monotonicity of support bounds the search.
//!
//! Two execution modes share the engine:
//!
//! * one-pass: automaton runs start at position 0 of every buffered input;
//!   optionally the acceptor pre-filters irrelevant inputs.
//! * two-pass: the acceptor first computes a forward reachability trace per
//!   input, then the reversed automaton is simulated backwards from every
//!   position where a match can end, restricted to forward-reachable
//!   states. The search tree is built back to front, so patterns reach the
//!   sink through [`PatternSink::write_reversed`].

use crate::dfa::Acceptor;
use crate::dictionary::Dictionary;
use crate::error::{Error, Result};
use crate::fst::{Fst, EPSILON_OUTPUT};
use crate::patex;
use crate::posting::PostingList;
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;
use std::mem;

/// Mining configuration.
#[derive(Debug, Clone)]
pub struct MinerConf {
    /// The pattern expression to mine with.
    pub pattern_expression: String,
    /// Minimum weighted support of an emitted pattern.
    pub min_support: u64,
    /// Drop input sequences without an accepting run at add time.
    pub prune_irrelevant_inputs: bool,
    /// Use the two-pass protocol. Implies input pruning.
    pub use_two_pass: bool,
    /// Drop output items that cannot reach minimum support on their own.
    pub use_flist: bool,
}

impl MinerConf {
    pub fn new(pattern_expression: impl Into<String>, min_support: u64) -> Self {
        MinerConf {
            pattern_expression: pattern_expression.into(),
            min_support,
            prune_irrelevant_inputs: false,
            use_two_pass: false,
            use_flist: true,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.min_support == 0 {
            return Err(Error::InvalidConfig(
                "minimum support must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Receiver for mined patterns.
pub trait PatternSink {
    fn write(&mut self, pattern: &[u32], support: u64);

    /// Deliver a pattern whose items arrive in reverse order. The buffer is
    /// restored before returning.
    fn write_reversed(&mut self, pattern: &mut Vec<u32>, support: u64) {
        pattern.reverse();
        self.write(pattern, support);
        pattern.reverse();
    }
}

/// Collects mined patterns in memory.
#[derive(Debug, Default)]
pub struct MemoryPatternSink {
    patterns: Vec<(Vec<u32>, u64)>,
}

impl MemoryPatternSink {
    pub fn new() -> Self {
        MemoryPatternSink::default()
    }

    pub fn patterns(&self) -> &[(Vec<u32>, u64)] {
        &self.patterns
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Patterns sorted lexicographically, for stable comparisons.
    pub fn sorted_patterns(&self) -> Vec<(Vec<u32>, u64)> {
        let mut patterns = self.patterns.clone();
        patterns.sort();
        patterns
    }

    pub fn clear(&mut self) {
        self.patterns.clear();
    }
}

impl PatternSink for MemoryPatternSink {
    fn write(&mut self, pattern: &[u32], support: u64) {
        self.patterns.push((pattern.to_vec(), support));
    }
}

/// Counters reported after mining.
#[derive(Debug, Default, Clone)]
pub struct MiningStats {
    /// Inputs handed to `add_input`.
    pub num_inputs: u64,
    /// Inputs kept after relevance filtering.
    pub num_relevant_inputs: u64,
    /// Search tree nodes expanded.
    pub num_expanded_nodes: u64,
    /// Patterns written to the sink.
    pub num_patterns: u64,
}

/// One buffered input sequence.
#[derive(Debug, Clone)]
struct WeightedSequence {
    items: Vec<u32>,
    weight: u64,
}

/// Search tree node: the projected database of one output prefix.
#[derive(Debug, Default)]
struct TreeNode {
    projected: PostingList,
    /// Sum of weights of inputs contributing at least one snapshot. An upper
    /// bound on the node's actual support.
    prefix_support: u64,
    /// Input id of the posting currently being appended to.
    current_input_id: i64,
    /// Snapshots already stored for the current input.
    snapshots: FxHashSet<u64>,
    children: BTreeMap<u32, TreeNode>,
}

impl TreeNode {
    fn new() -> Self {
        TreeNode {
            current_input_id: -1,
            ..TreeNode::default()
        }
    }

    /// Record a resumable snapshot in the child for `fid`. Input ids are
    /// gap-encoded across postings; duplicate snapshots within one input are
    /// dropped.
    fn expand_with_item(&mut self, fid: u32, input_id: u32, weight: u64, position: u32, state: u32) {
        let child = self.children.entry(fid).or_insert_with(TreeNode::new);
        if child.current_input_id != input_id as i64 {
            child.projected.new_posting();
            child
                .projected
                .add_non_negative((input_id as i64 - child.current_input_id) as u32);
            child.current_input_id = input_id as i64;
            child.prefix_support += weight;
            child.snapshots.clear();
        }
        if child.snapshots.insert(((state as u64) << 32) | position as u64) {
            child.projected.add_non_negative(state);
            child.projected.add_non_negative(position);
        }
    }

    fn prune_infrequent(&mut self, sigma: u64) {
        self.children.retain(|_, child| child.prefix_support >= sigma);
    }
}

/// Reusable buffers for output item enumeration during stepping.
#[derive(Debug, Default)]
struct Scratch {
    buffers: Vec<Vec<u32>>,
}

impl Scratch {
    fn take(&mut self) -> Vec<u32> {
        self.buffers.pop().unwrap_or_default()
    }

    fn put(&mut self, mut buffer: Vec<u32>) {
        buffer.clear();
        self.buffers.push(buffer);
    }
}

/// Immutable context shared by every step of one automaton run.
struct StepContext<'a> {
    /// The working automaton: forward in one-pass, reversed in two-pass.
    fst: &'a Fst,
    dict: &'a Dictionary,
    input: &'a [u32],
    input_id: u32,
    weight: u64,
    largest_frequent_fid: u32,
    use_flist: bool,
    /// Forward reachability restriction for the backward simulation.
    trace: Option<(&'a Acceptor, &'a [u32])>,
}

impl StepContext<'_> {
    fn output_is_kept(&self, fid: u32) -> bool {
        !self.use_flist || fid <= self.largest_frequent_fid
    }
}

/// Resume a forward automaton run at `pos`. Frequent output items become
/// snapshots in `node`'s children; epsilon outputs continue the run. Returns
/// true if a final state is reachable without producing further output.
fn inc_step_forward(
    ctx: &StepContext,
    pos: usize,
    state: u32,
    node: &mut TreeNode,
    scratch: &mut Scratch,
) -> bool {
    if ctx.fst.is_final_complete(state) || pos == ctx.input.len() {
        return ctx.fst.is_final(state);
    }
    let fid = ctx.input[pos];
    let mut reached_final = false;
    let mut buf = scratch.take();
    for edge in ctx.fst.edges(state) {
        let label = ctx.fst.label(edge.label);
        if !label.matches(fid) {
            continue;
        }
        if label.has_output() {
            label.outputs_into(fid, ctx.dict, &mut buf);
            for &out in &buf {
                if ctx.output_is_kept(out) {
                    node.expand_with_item(out, ctx.input_id, ctx.weight, pos as u32 + 1, edge.to);
                }
            }
        } else {
            reached_final |= inc_step_forward(ctx, pos + 1, edge.to, node, scratch);
        }
    }
    scratch.put(buf);
    reached_final
}

/// Resume a backward run of the reversed automaton at `pos` (the index of
/// the next item to consume, moving left). Edges are restricted to states
/// the forward pass reached. Returns true if the forward initial state is
/// reachable at a position before the input without producing further
/// output.
fn inc_step_backward(
    ctx: &StepContext,
    pos: i64,
    state: u32,
    node: &mut TreeNode,
    scratch: &mut Scratch,
) -> bool {
    if pos < 0 {
        return state == ctx.fst.initial_state();
    }
    let fid = ctx.input[pos as usize];
    let mut reached_initial = false;
    let mut buf = scratch.take();
    for edge in ctx.fst.edges(state) {
        let label = ctx.fst.label(edge.label);
        if !label.matches(fid) {
            continue;
        }
        if let Some((acceptor, trace)) = ctx.trace {
            if !acceptor.fst_contains(trace[pos as usize], edge.to) {
                continue;
            }
        }
        if label.has_output() {
            label.outputs_into(fid, ctx.dict, &mut buf);
            for &out in &buf {
                if ctx.output_is_kept(out) {
                    node.expand_with_item(out, ctx.input_id, ctx.weight, pos as u32, edge.to);
                }
            }
        } else {
            reached_initial |= inc_step_backward(ctx, pos - 1, edge.to, node, scratch);
        }
    }
    scratch.put(buf);
    reached_initial
}

/// In-memory sequence miner.
pub struct SequenceMiner<'a> {
    dict: &'a Dictionary,
    conf: MinerConf,
    /// The working automaton: forward in one-pass, reversed in two-pass.
    fst: Fst,
    acceptor: Option<Acceptor>,
    largest_frequent_fid: u32,
    inputs: Vec<WeightedSequence>,
    /// Forward acceptor trace per kept input (two-pass only).
    traces: Vec<Vec<u32>>,
    root: TreeNode,
    scratch: Scratch,
    stats: MiningStats,
    trace_buf: Vec<u32>,
    final_pos_buf: Vec<usize>,
}

impl<'a> SequenceMiner<'a> {
    /// Compile the pattern expression and set up the engine. The dictionary
    /// must already carry fids.
    pub fn new(dict: &'a Dictionary, conf: MinerConf) -> Result<Self> {
        conf.validate()?;
        if conf.use_two_pass && !conf.prune_irrelevant_inputs {
            tracing::warn!("two-pass mining always prunes irrelevant inputs");
        }
        let forward = patex::compile(&conf.pattern_expression, dict)?;
        let acceptor = if conf.prune_irrelevant_inputs || conf.use_two_pass {
            Some(Acceptor::new(&forward, dict))
        } else {
            None
        };
        let fst = if conf.use_two_pass {
            forward.reversed()
        } else {
            forward
        };
        let largest_frequent_fid = dict.largest_fid_above(conf.min_support);
        tracing::debug!(
            num_states = fst.num_states(),
            num_acceptor_states = acceptor.as_ref().map(Acceptor::num_states),
            largest_frequent_fid,
            "miner ready"
        );
        Ok(SequenceMiner {
            dict,
            conf,
            fst,
            acceptor,
            largest_frequent_fid,
            inputs: Vec::new(),
            traces: Vec::new(),
            root: TreeNode::new(),
            scratch: Scratch::default(),
            stats: MiningStats::default(),
            trace_buf: Vec::new(),
            final_pos_buf: Vec::new(),
        })
    }

    /// True when patterns are handed to the sink in reverse item order.
    pub fn emits_reversed(&self) -> bool {
        self.conf.use_two_pass
    }

    pub fn stats(&self) -> &MiningStats {
        &self.stats
    }

    /// Drop all buffered inputs and mining state; the compiled automaton is
    /// kept.
    pub fn clear(&mut self) {
        self.inputs.clear();
        self.traces.clear();
        self.root = TreeNode::new();
        self.stats = MiningStats::default();
    }

    /// Buffer one weighted input sequence and run the first step of every
    /// automaton run on it. Items with fid 0 are skipped; the remaining
    /// items close ranks, so a skipped entry does not act as a gap.
    pub fn add_input(&mut self, items: &[u32], weight: u64) {
        self.stats.num_inputs += 1;
        let items: Vec<u32> = items
            .iter()
            .copied()
            .filter(|&fid| fid != EPSILON_OUTPUT)
            .collect();
        let input_id = self.inputs.len() as u32;

        if self.conf.use_two_pass {
            let relevant = match &self.acceptor {
                Some(acceptor) => {
                    acceptor.relevant_trace(&items, &mut self.trace_buf, &mut self.final_pos_buf)
                }
                None => false,
            };
            if !relevant {
                return;
            }
            let trace = mem::take(&mut self.trace_buf);
            if let Some(acceptor) = &self.acceptor {
                let ctx = StepContext {
                    fst: &self.fst,
                    dict: self.dict,
                    input: &items,
                    input_id,
                    weight,
                    largest_frequent_fid: self.largest_frequent_fid,
                    use_flist: self.conf.use_flist,
                    trace: Some((acceptor, &trace)),
                };
                for &pos in &self.final_pos_buf {
                    let seeds = if pos == items.len() {
                        acceptor.fst_final_states(trace[pos])
                    } else {
                        acceptor.fst_final_complete_states(trace[pos])
                    };
                    for &fst_state in seeds {
                        inc_step_backward(
                            &ctx,
                            pos as i64 - 1,
                            fst_state,
                            &mut self.root,
                            &mut self.scratch,
                        );
                    }
                }
            }
            self.traces.push(trace);
        } else {
            if self.conf.prune_irrelevant_inputs {
                let relevant = self
                    .acceptor
                    .as_ref()
                    .map_or(true, |acceptor| acceptor.is_relevant(&items));
                if !relevant {
                    return;
                }
            }
            let ctx = StepContext {
                fst: &self.fst,
                dict: self.dict,
                input: &items,
                input_id,
                weight,
                largest_frequent_fid: self.largest_frequent_fid,
                use_flist: self.conf.use_flist,
                trace: None,
            };
            inc_step_forward(
                &ctx,
                0,
                self.fst.initial_state(),
                &mut self.root,
                &mut self.scratch,
            );
        }

        self.stats.num_relevant_inputs += 1;
        self.inputs.push(WeightedSequence { items, weight });
    }

    /// Mine all frequent patterns into the sink. Consumes the buffered
    /// search state; call [`SequenceMiner::clear`] before reusing the miner.
    pub fn mine(&mut self, sink: &mut dyn PatternSink) {
        let total_weight: u64 = self.inputs.iter().map(|s| s.weight).sum();
        if total_weight >= self.conf.min_support {
            let mut root = mem::replace(&mut self.root, TreeNode::new());
            root.prune_infrequent(self.conf.min_support);
            let mut prefix = Vec::new();
            self.expand(&mut prefix, root, sink);
        }
        tracing::debug!(
            num_inputs = self.stats.num_inputs,
            num_relevant_inputs = self.stats.num_relevant_inputs,
            num_expanded_nodes = self.stats.num_expanded_nodes,
            num_patterns = self.stats.num_patterns,
            "mining done"
        );
    }

    /// Expand every child of `node`: replay its projected database to
    /// compute the actual support and the grandchildren, emit if frequent,
    /// then recurse.
    fn expand(&mut self, prefix: &mut Vec<u32>, node: TreeNode, sink: &mut dyn PatternSink) {
        for (fid, mut child) in node.children {
            self.stats.num_expanded_nodes += 1;
            prefix.push(fid);
            let projected = mem::take(&mut child.projected);
            let mut it = projected.iter();
            let mut support = 0u64;
            let mut input_id: i64 = -1;
            loop {
                input_id += it.next_non_negative() as i64;
                let input = &self.inputs[input_id as usize];
                let ctx = StepContext {
                    fst: &self.fst,
                    dict: self.dict,
                    input: &input.items,
                    input_id: input_id as u32,
                    weight: input.weight,
                    largest_frequent_fid: self.largest_frequent_fid,
                    use_flist: self.conf.use_flist,
                    trace: if self.conf.use_two_pass {
                        self.acceptor
                            .as_ref()
                            .map(|a| (a, self.traces[input_id as usize].as_slice()))
                    } else {
                        None
                    },
                };
                let mut reached_end = false;
                while it.has_next() {
                    let state = it.next_non_negative();
                    let position = it.next_non_negative();
                    reached_end |= if self.conf.use_two_pass {
                        inc_step_backward(
                            &ctx,
                            position as i64 - 1,
                            state,
                            &mut child,
                            &mut self.scratch,
                        )
                    } else {
                        inc_step_forward(&ctx, position as usize, state, &mut child, &mut self.scratch)
                    };
                }
                if reached_end {
                    support += ctx.weight;
                }
                if !it.next_posting() {
                    break;
                }
            }

            if support >= self.conf.min_support {
                self.stats.num_patterns += 1;
                if self.conf.use_two_pass {
                    sink.write_reversed(prefix, support);
                } else {
                    sink.write(prefix, support);
                }
            }

            child.prune_infrequent(self.conf.min_support);
            self.expand(prefix, child, sink);
            prefix.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_dict(sids: &[&str]) -> Dictionary {
        let mut dict = Dictionary::new();
        for (i, sid) in sids.iter().enumerate() {
            dict.add_item(i as u32 + 1, sid).unwrap();
        }
        dict
    }

    fn mine(dict: &Dictionary, conf: MinerConf, inputs: &[&[&str]]) -> Vec<(Vec<String>, u64)> {
        let mut miner = SequenceMiner::new(dict, conf).unwrap();
        for input in inputs {
            let fids = dict.fids_of(input).unwrap();
            miner.add_input(&fids, 1);
        }
        let mut sink = MemoryPatternSink::new();
        miner.mine(&mut sink);
        let mut patterns: Vec<(Vec<String>, u64)> = sink
            .patterns()
            .iter()
            .map(|(fids, support)| {
                let sids = fids
                    .iter()
                    .map(|&fid| dict.sid_of_fid(fid).unwrap().to_string())
                    .collect();
                (sids, *support)
            })
            .collect();
        patterns.sort();
        patterns
    }

    fn counted_flat_dict(sids: &[&str], inputs: &[&[&str]]) -> Dictionary {
        let mut dict = flat_dict(sids);
        for input in inputs {
            let gids: Vec<u32> = input
                .iter()
                .map(|sid| sids.iter().position(|s| s == sid).unwrap() as u32 + 1)
                .collect();
            dict.count_sequence(&gids).unwrap();
        }
        dict.recompute_fids();
        dict
    }

    #[test]
    fn test_adjacent_pair_mining() {
        let inputs: &[&[&str]] = &[&["a", "b", "c"]];
        let dict = counted_flat_dict(&["a", "b", "c"], inputs);
        let patterns = mine(&dict, MinerConf::new("(a) (b)", 1), inputs);
        assert_eq!(patterns, vec![(vec!["a".into(), "b".into()], 1)]);
    }

    #[test]
    fn test_generalization_produces_ancestors() {
        let mut dict = Dictionary::new();
        dict.add_item(1, "P").unwrap();
        dict.add_item(2, "A").unwrap();
        dict.add_parent(2, 1).unwrap();
        dict.count_sequence(&[2]).unwrap();
        dict.recompute_fids();

        let inputs: &[&[&str]] = &[&["A"]];
        let patterns = mine(&dict, MinerConf::new("(A^)", 1), inputs);
        assert_eq!(
            patterns,
            vec![(vec!["A".into()], 1), (vec!["P".into()], 1)]
        );
    }

    #[test]
    fn test_min_support_filters_patterns() {
        let inputs: &[&[&str]] = &[&["a", "b"], &["a", "b"], &["a", "c"]];
        let dict = counted_flat_dict(&["a", "b", "c"], inputs);
        let patterns = mine(&dict, MinerConf::new("(a) (.)", 2), inputs);
        assert_eq!(patterns, vec![(vec!["a".into(), "b".into()], 2)]);
    }

    #[test]
    fn test_two_pass_matches_one_pass() {
        let inputs: &[&[&str]] = &[&["a", "b", "c"], &["a", "c", "b"], &["b", "a", "b"]];
        let dict = counted_flat_dict(&["a", "b", "c"], inputs);

        for expr in ["(a) (b)", "(.) (.)", "(a) .* (b)", "(a | b)+"] {
            let one_pass = mine(&dict, MinerConf::new(expr, 1), inputs);
            let mut conf = MinerConf::new(expr, 1);
            conf.prune_irrelevant_inputs = true;
            conf.use_two_pass = true;
            let two_pass = mine(&dict, conf, inputs);
            assert_eq!(one_pass, two_pass, "mode disagreement for {expr}");
        }
    }

    #[test]
    fn test_duplicate_runs_count_once_per_input() {
        // Both (a,.) matches inside one input produce output [a, b] once.
        let inputs: &[&[&str]] = &[&["a", "b", "a", "b"]];
        let dict = counted_flat_dict(&["a", "b"], inputs);
        let patterns = mine(&dict, MinerConf::new("(a) (b)", 1), inputs);
        assert_eq!(patterns, vec![(vec!["a".into(), "b".into()], 1)]);
    }

    #[test]
    fn test_weighted_support() {
        // One input with weight 3; the dictionary carries matching counts.
        let inputs: &[&[&str]] = &[&["a", "b"], &["a", "b"], &["a", "b"]];
        let dict = counted_flat_dict(&["a", "b"], inputs);
        let mut miner = SequenceMiner::new(&dict, MinerConf::new("(a) (b)", 3)).unwrap();
        let fids = dict.fids_of(&["a", "b"]).unwrap();
        miner.add_input(&fids, 3);
        let mut sink = MemoryPatternSink::new();
        miner.mine(&mut sink);
        assert_eq!(sink.patterns(), &[(fids, 3)]);
    }

    #[test]
    fn test_invalid_support_is_rejected() {
        let dict = counted_flat_dict(&["a"], &[&["a"]]);
        assert!(matches!(
            SequenceMiner::new(&dict, MinerConf::new("(a)", 0)),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_clear_resets_state() {
        let inputs: &[&[&str]] = &[&["a", "b"]];
        let dict = counted_flat_dict(&["a", "b"], inputs);
        let mut miner = SequenceMiner::new(&dict, MinerConf::new("(a) (b)", 1)).unwrap();
        let fids = dict.fids_of(&["a", "b"]).unwrap();
        miner.add_input(&fids, 1);
        miner.clear();
        let mut sink = MemoryPatternSink::new();
        miner.mine(&mut sink);
        assert!(sink.is_empty());
        assert_eq!(miner.stats().num_inputs, 0);
    }
}
