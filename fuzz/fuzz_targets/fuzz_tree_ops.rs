//! Fuzz target for random cut tree mutation.
//!
//! Arbitrary insert/delete/score sequences must keep every structural
//! invariant.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rcf_core::RandomCutTree;

const DIMS: usize = 2;

#[derive(Debug, Arbitrary)]
enum Op {
    Insert([f64; DIMS]),
    Delete(u8),
    Score([f64; DIMS]),
}

#[derive(Debug, Arbitrary)]
struct Input {
    seed: u64,
    ops: Vec<Op>,
}

fuzz_target!(|input: Input| {
    let mut tree = RandomCutTree::with_seed(DIMS, input.seed);
    let mut live: Vec<[f64; DIMS]> = Vec::new();

    for op in input.ops.into_iter().take(256) {
        match op {
            Op::Insert(p) if p.iter().all(|x| x.is_finite()) => {
                tree.insert(&p).expect("finite insert");
                live.push(p);
            }
            Op::Insert(_) => {}
            Op::Delete(i) if !live.is_empty() => {
                let p = live.swap_remove(i as usize % live.len());
                tree.delete(&p).expect("live point present");
            }
            Op::Delete(_) => {}
            Op::Score(q) if q.iter().all(|x| x.is_finite()) => {
                let s = tree.score(&q).expect("two-dimensional query");
                assert!((0.0..1.0).contains(&s), "score {s}");
            }
            Op::Score(_) => {}
        }
        tree.validate().expect("tree invariants");
        assert_eq!(tree.len(), live.len());
    }
});
