//! Deterministic end-to-end scenarios. The debug build keeps the node
//! fanout at 8, so even short lists exercise multi-level trees here.

use treelist::{TreeList, LIMIT};

#[test]
fn delete_slice_from_ten() {
    let mut list: TreeList<i32> = (0..10).collect();
    list.remove_range(2..7);
    assert_eq!(list.len(), 5);
    assert_eq!(list, [0, 1, 7, 8, 9]);
    let collected: Vec<i32> = list.iter().copied().collect();
    assert_eq!(collected, vec![0, 1, 7, 8, 9]);
    list.dbg_check();
}

#[test]
fn append_one_hundred() {
    let mut list = TreeList::new();
    for i in 0..100 {
        list.push(i);
        assert_eq!(list.len(), i + 1);
        assert_eq!(list[i], i);
    }
    let collected: Vec<usize> = list.iter().copied().collect();
    assert_eq!(collected, (0..100).collect::<Vec<_>>());
    list.dbg_check();
}

#[test]
fn pop_front_one_hundred() {
    let mut list: TreeList<usize> = (0..100).collect();
    for want in 0..100 {
        assert_eq!(list.remove(0), want);
    }
    assert!(list.is_empty());
    list.dbg_check();
}

#[test]
fn slice_assign_with_different_length() {
    let mut list: TreeList<i64> = (0..100).collect();
    list.replace_range(10..20, [-1, -2, -3]);
    assert_eq!(list.len(), 93);
    assert_eq!(list[10], -1);
    assert_eq!(list[11], -2);
    assert_eq!(list[12], -3);
    assert_eq!(list[13], 20);
    list.dbg_check();
}

#[test]
fn sort_by_first_coordinate_is_stable() {
    let mut list: TreeList<(i32, &str)> = [(3, "a"), (1, "b"), (3, "c"), (2, "d")]
        .into_iter()
        .collect();
    list.sort_by_key(|pair| pair.0);
    assert_eq!(list, [(1, "b"), (2, "d"), (3, "a"), (3, "c")]);
}

#[test]
fn copies_are_isolated() {
    let mut a: TreeList<i32> = (0..50).collect();
    let b = a.clone();
    a.set(0, 999);
    assert_eq!(b[0], 0);
    assert_eq!(a[0], 999);
    a.dbg_check();
    b.dbg_check();
}

#[test]
fn delete_then_reinsert_roundtrip() {
    let n = LIMIT * LIMIT + 11;
    let original: TreeList<usize> = (0..n).collect();
    for (lo, hi) in [(0, 0), (0, n), (3, LIMIT * 2), (n / 2, n - 1)] {
        let saved = original.slice(lo..hi);
        let mut list = original.clone();
        list.remove_range(lo..hi);
        list.replace_range(lo..lo, saved.iter().cloned());
        assert_eq!(list, original, "range {}..{}", lo, hi);
        list.dbg_check();
    }
}

#[test]
fn concat_is_elementwise() {
    let a: TreeList<usize> = (0..LIMIT * 2 + 3).collect();
    let b: TreeList<usize> = (1000..1000 + LIMIT + 1).collect();
    let joined = a.concat(&b);
    assert_eq!(joined.len(), a.len() + b.len());
    for i in 0..joined.len() {
        let want = if i < a.len() { a[i] } else { b[i - a.len()] };
        assert_eq!(joined[i], want);
    }
    joined.dbg_check();
}

#[test]
fn repeat_matches_repeated_concat() {
    let base: TreeList<usize> = (0..LIMIT - 1).collect();
    for k in [0, 1, 3, LIMIT, LIMIT + 5] {
        let repeated = base.repeat(k);
        assert_eq!(repeated.len(), base.len() * k);
        let mut folded = TreeList::new();
        for _ in 0..k {
            folded.extend_from_list(&base);
        }
        assert_eq!(repeated, folded, "k = {}", k);
        repeated.dbg_check();
    }
}

#[test]
fn set_get_roundtrip_is_noop() {
    let mut list: TreeList<usize> = (0..LIMIT * 3).collect();
    let snapshot = list.clone();
    for i in 0..list.len() {
        let v = list[i];
        list.set(i, v);
    }
    assert_eq!(list, snapshot);
    list.dbg_check();
}

#[test]
fn mutation_through_index_cache_is_visible() {
    // Warm the read cache, then interleave reads and writes so both
    // the clean and clean-writable paths get traffic.
    let n = LIMIT * LIMIT * 2;
    let mut list: TreeList<usize> = (0..n).collect();
    for i in 0..n {
        assert_eq!(list[i], i);
    }
    for i in (0..n).step_by(3) {
        list.set(i, i + 1000);
    }
    for i in 0..n {
        let want = if i % 3 == 0 { i + 1000 } else { i };
        assert_eq!(list[i], want);
    }
    list.dbg_check();
}

#[test]
fn deeply_nested_lists_drop_cleanly() {
    #[derive(Clone)]
    enum Value {
        Num(u64),
        List(TreeList<Box<Value>>),
    }

    let mut v = Value::Num(0);
    for _ in 0..400 {
        let mut list = TreeList::new();
        list.push(Box::new(v));
        list.push(Box::new(Value::Num(1)));
        v = Value::List(list);
    }
    drop(v);
}

#[test]
fn stress_interleaved_operations() {
    let mut list: TreeList<usize> = TreeList::new();
    let mut model: Vec<usize> = Vec::new();
    for step in 0..LIMIT * LIMIT {
        match step % 5 {
            0 => {
                list.push(step);
                model.push(step);
            }
            1 => {
                let at = step % (model.len() + 1);
                list.insert(at, step);
                model.insert(at.min(model.len()), step);
            }
            2 if !model.is_empty() => {
                let at = step % model.len();
                assert_eq!(list.remove(at), model.remove(at));
            }
            3 => {
                let lo = step % (model.len() + 1);
                let hi = (lo + 3).min(model.len());
                let got: Vec<usize> = list.slice(lo..hi).iter().copied().collect();
                assert_eq!(got, model[lo.min(model.len())..hi].to_vec());
            }
            _ => {
                assert_eq!(list.len(), model.len());
            }
        }
    }
    assert_eq!(list, model);
    list.dbg_check();
}
