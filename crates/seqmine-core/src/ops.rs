//! Regular-expression algebra over builder fragments.
//!
//! Every operation rewires states inside one [`FstBuilder`] arena and hands
//! back a [`Frag`]. Fragments must be complete when composed: an operation
//! may keep mutating its own fragment, but never a fragment it already
//! handed to another operation. Epsilon links copy edges eagerly, so the
//! target of a link must already carry all of its edges.

use crate::fst::{Frag, FstBuilder};

/// Sequential composition. The left fragment's final states stop being
/// final and link into the right fragment.
pub fn concatenate(b: &mut FstBuilder, left: Frag, right: Frag) -> Frag {
    for f in b.finals(left) {
        b.set_final(f, false);
        b.epsilon_link(f, right.initial);
    }
    left
}

/// Alternation under a fresh initial state.
pub fn union(b: &mut FstBuilder, left: Frag, right: Frag) -> Frag {
    let initial = b.state(false);
    b.epsilon_link(initial, left.initial);
    b.epsilon_link(initial, right.initial);
    Frag { initial }
}

/// One or more repetitions: every final state loops back to the initial.
pub fn plus(b: &mut FstBuilder, frag: Frag) -> Frag {
    for f in b.finals(frag) {
        b.epsilon_link(f, frag.initial);
    }
    frag
}

/// Zero or one repetition: a fresh accepting initial state wrapping the
/// fragment. No-op when the fragment already accepts the empty sequence.
pub fn optional(b: &mut FstBuilder, frag: Frag) -> Frag {
    if b.is_final(frag.initial) {
        return frag;
    }
    let initial = b.state(false);
    b.epsilon_link(initial, frag.initial);
    b.set_final(initial, true);
    Frag { initial }
}

/// Zero or more repetitions.
pub fn kleene(b: &mut FstBuilder, frag: Frag) -> Frag {
    let repeated = plus(b, frag);
    optional(b, repeated)
}

/// Exactly `n` repetitions. All copies are taken from the pristine fragment
/// before any concatenation rewires it.
pub fn repeat_exactly(b: &mut FstBuilder, frag: Frag, n: u32) -> Frag {
    if n == 0 {
        return b.trivial_accept();
    }
    let mut parts = Vec::with_capacity(n as usize);
    parts.push(frag);
    for _ in 1..n {
        parts.push(b.shallow_copy(frag));
    }
    let mut parts = parts.into_iter();
    let mut result = parts.next().unwrap_or(frag);
    for part in parts {
        result = concatenate(b, result, part);
    }
    result
}

/// At least `n` repetitions: `n - 1` exact copies followed by a plus.
pub fn repeat_min(b: &mut FstBuilder, frag: Frag, n: u32) -> Frag {
    if n == 0 {
        return kleene(b, frag);
    }
    let tail = b.shallow_copy(frag);
    let head = repeat_exactly(b, frag, n - 1);
    let tail = plus(b, tail);
    concatenate(b, head, tail)
}

/// Between `min` and `max` repetitions: `min` exact copies followed by
/// `max - min` optional copies. Requires `min <= max`.
pub fn repeat_min_max(b: &mut FstBuilder, frag: Frag, min: u32, max: u32) -> Frag {
    debug_assert!(min <= max);
    let mut optionals = Vec::with_capacity((max - min) as usize);
    for _ in min..max {
        optionals.push(b.shallow_copy(frag));
    }
    let mut result = repeat_exactly(b, frag, min);
    for copy in optionals {
        let copy = optional(b, copy);
        result = concatenate(b, result, copy);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::Dictionary;
    use crate::fst::{Fst, InputMatch, OutputRule};

    fn flat_dict(sids: &[&str]) -> Dictionary {
        let mut dict = Dictionary::new();
        for (i, sid) in sids.iter().enumerate() {
            dict.add_item(i as u32 + 1, sid).unwrap();
            dict.set_frequencies(i as u32 + 1, 1, 1).unwrap();
        }
        dict.recompute_fids();
        dict
    }

    fn item(b: &mut FstBuilder, fid: u32) -> Frag {
        b.two_state_fragment(InputMatch::Item(fid), OutputRule::Matched)
    }

    fn build<F>(dict: &Dictionary, f: F) -> Fst
    where
        F: FnOnce(&mut FstBuilder) -> Frag,
    {
        let mut b = FstBuilder::new(dict);
        let frag = f(&mut b);
        b.dedup_edges(frag);
        b.freeze(frag)
    }

    #[test]
    fn test_concatenate() {
        let dict = flat_dict(&["a", "b"]);
        let a = dict.fid_of("a").unwrap();
        let b_fid = dict.fid_of("b").unwrap();
        let fst = build(&dict, |b| {
            let left = item(b, a);
            let right = item(b, b_fid);
            concatenate(b, left, right)
        });
        assert!(fst.accepts(&[a, b_fid]));
        assert!(!fst.accepts(&[a]));
        assert!(!fst.accepts(&[b_fid]));
        assert!(!fst.accepts(&[b_fid, a]));
        assert!(!fst.accepts(&[]));
    }

    #[test]
    fn test_concatenate_with_empty_accepting_left() {
        let dict = flat_dict(&["a", "b"]);
        let a = dict.fid_of("a").unwrap();
        let b_fid = dict.fid_of("b").unwrap();
        let fst = build(&dict, |b| {
            let left = item(b, a);
            let left = optional(b, left);
            let right = item(b, b_fid);
            concatenate(b, left, right)
        });
        assert!(fst.accepts(&[a, b_fid]));
        assert!(fst.accepts(&[b_fid]));
        assert!(!fst.accepts(&[a]));
    }

    #[test]
    fn test_union() {
        let dict = flat_dict(&["a", "b"]);
        let a = dict.fid_of("a").unwrap();
        let b_fid = dict.fid_of("b").unwrap();
        let fst = build(&dict, |b| {
            let left = item(b, a);
            let right = item(b, b_fid);
            union(b, left, right)
        });
        assert!(fst.accepts(&[a]));
        assert!(fst.accepts(&[b_fid]));
        assert!(!fst.accepts(&[a, b_fid]));
        assert!(!fst.accepts(&[]));
    }

    #[test]
    fn test_kleene_and_plus() {
        let dict = flat_dict(&["a", "b"]);
        let a = dict.fid_of("a").unwrap();
        let b_fid = dict.fid_of("b").unwrap();

        let star = build(&dict, |b| {
            let frag = item(b, a);
            kleene(b, frag)
        });
        assert!(star.accepts(&[]));
        assert!(star.accepts(&[a]));
        assert!(star.accepts(&[a, a, a]));
        assert!(!star.accepts(&[b_fid]));

        let one_or_more = build(&dict, |b| {
            let frag = item(b, a);
            plus(b, frag)
        });
        assert!(!one_or_more.accepts(&[]));
        assert!(one_or_more.accepts(&[a]));
        assert!(one_or_more.accepts(&[a, a]));
    }

    #[test]
    fn test_nested_kleene() {
        let dict = flat_dict(&["a", "b"]);
        let a = dict.fid_of("a").unwrap();
        let b_fid = dict.fid_of("b").unwrap();
        // (a b?)*
        let fst = build(&dict, |b| {
            let head = item(b, a);
            let tail = item(b, b_fid);
            let tail = optional(b, tail);
            let inner = concatenate(b, head, tail);
            kleene(b, inner)
        });
        assert!(fst.accepts(&[]));
        assert!(fst.accepts(&[a]));
        assert!(fst.accepts(&[a, b_fid]));
        assert!(fst.accepts(&[a, b_fid, a, a, b_fid]));
        assert!(!fst.accepts(&[b_fid]));
        assert!(!fst.accepts(&[a, b_fid, b_fid]));
    }

    #[test]
    fn test_repeat_exactly() {
        let dict = flat_dict(&["a"]);
        let a = dict.fid_of("a").unwrap();
        let fst = build(&dict, |b| {
            let frag = item(b, a);
            repeat_exactly(b, frag, 3)
        });
        assert!(!fst.accepts(&[]));
        assert!(!fst.accepts(&[a, a]));
        assert!(fst.accepts(&[a, a, a]));
        assert!(!fst.accepts(&[a, a, a, a]));

        let empty = build(&dict, |b| {
            let frag = item(b, a);
            repeat_exactly(b, frag, 0)
        });
        assert!(empty.accepts(&[]));
        assert!(!empty.accepts(&[a]));
    }

    #[test]
    fn test_repeat_min() {
        let dict = flat_dict(&["a"]);
        let a = dict.fid_of("a").unwrap();
        let fst = build(&dict, |b| {
            let frag = item(b, a);
            repeat_min(b, frag, 2)
        });
        assert!(!fst.accepts(&[a]));
        assert!(fst.accepts(&[a, a]));
        assert!(fst.accepts(&[a, a, a, a, a]));
    }

    #[test]
    fn test_repeat_min_max() {
        let dict = flat_dict(&["a"]);
        let a = dict.fid_of("a").unwrap();
        let fst = build(&dict, |b| {
            let frag = item(b, a);
            repeat_min_max(b, frag, 1, 3)
        });
        assert!(!fst.accepts(&[]));
        assert!(fst.accepts(&[a]));
        assert!(fst.accepts(&[a, a]));
        assert!(fst.accepts(&[a, a, a]));
        assert!(!fst.accepts(&[a, a, a, a]));

        let zero_to_two = build(&dict, |b| {
            let frag = item(b, a);
            repeat_min_max(b, frag, 0, 2)
        });
        assert!(zero_to_two.accepts(&[]));
        assert!(zero_to_two.accepts(&[a, a]));
        assert!(!zero_to_two.accepts(&[a, a, a]));
    }

    #[test]
    fn test_concatenation_splits_accepted_sequences() {
        let dict = flat_dict(&["a", "b", "c"]);
        let a = dict.fid_of("a").unwrap();
        let b_fid = dict.fid_of("b").unwrap();
        let c = dict.fid_of("c").unwrap();
        // left = a+, right = (b | c)
        let fst = build(&dict, |b| {
            let left = item(b, a);
            let left = plus(b, left);
            let rb = item(b, b_fid);
            let rc = item(b, c);
            let right = union(b, rb, rc);
            concatenate(b, left, right)
        });
        // Every split s1 ++ s2 with left accepting s1 and right accepting s2.
        for s1 in [vec![a], vec![a, a], vec![a, a, a]] {
            for s2 in [vec![b_fid], vec![c]] {
                let mut joined = s1.clone();
                joined.extend_from_slice(&s2);
                assert!(fst.accepts(&joined));
            }
        }
        assert!(!fst.accepts(&[a]));
        assert!(!fst.accepts(&[b_fid, c]));
    }
}
