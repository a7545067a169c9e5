//! End-to-end editing scenarios across replicas.

use strand_core::{OpId, SpliceKind, Splice, TextTree, TreeError};

fn id(seq: u64, agent: &str) -> OpId {
    OpId::new(seq, agent)
}

fn all(_: &OpId) -> bool {
    true
}

fn none(_: &OpId) -> bool {
    false
}

#[test]
fn test_concurrent_inserts_use_tie_break() {
    let a = id(1, "alice");
    let b = id(1, "bob");
    let insert_a = [Splice::insert(0, "ab".chars())];
    let insert_b = [Splice::insert(0, "x".chars())];

    let mut alice = TextTree::new();
    alice.add_version(&a, &insert_a, None, none).unwrap();
    assert_eq!(alice.len(all), 2);
    assert_eq!(alice.get(0, all), Some(&'a'));

    let mut bob = TextTree::new();
    bob.add_version(&b, &insert_b, None, none).unwrap();

    // alice receives bob's edit, bob receives alice's
    alice.add_version(&b, &insert_b, None, none).unwrap();
    bob.add_version(&a, &insert_a, None, none).unwrap();

    // "alice" sorts before "bob" at equal sequence numbers
    assert_eq!(alice.text(all), "abx");
    assert_eq!(bob.text(all), "abx");
}

#[test]
fn test_concurrent_inserts_lower_key_first() {
    let a = id(2, "alice");
    let b = id(1, "bob");
    let insert_a = [Splice::insert(0, "ab".chars())];
    let insert_b = [Splice::insert(0, "x".chars())];

    let mut left = TextTree::new();
    left.add_version(&a, &insert_a, None, none).unwrap();
    left.add_version(&b, &insert_b, None, none).unwrap();
    let mut right = TextTree::new();
    right.add_version(&b, &insert_b, None, none).unwrap();
    right.add_version(&a, &insert_a, None, none).unwrap();

    assert_eq!(left.text(all), "xab");
    assert_eq!(right.text(all), "xab");
}

#[test]
fn test_delete_hides_but_keeps_content() {
    let a = id(1, "a");
    let c = id(2, "c");
    let mut tree = TextTree::new();
    tree.add_version(&a, &[Splice::insert(0, "ab".chars())], None, none)
        .unwrap();
    tree.add_version(&c, &[Splice::delete(0, 1)], None, |v: &OpId| *v == a)
        .unwrap();

    assert_eq!(tree.len(all), 1);
    assert_eq!(tree.get(0, all), Some(&'b'));
    // a replica that has not seen `c` still reads the old text
    assert_eq!(tree.text(|v: &OpId| *v == a), "ab");
    tree.dbg_check();
}

#[test]
fn test_concurrent_replacements_never_interleave() {
    let a = id(1, "a");
    let d = id(2, "d");
    let e = id(2, "e");
    let only_a = |v: &OpId| *v == a;
    let replace_d = [Splice::replace(0, 2, "ZZ".chars())];
    let replace_e = [Splice::replace(0, 2, "YY".chars())];

    let mut base = TextTree::new();
    base.add_version(&a, &[Splice::insert(0, "ab".chars())], None, none)
        .unwrap();

    let mut left = base.clone();
    left.add_version(&d, &replace_d, None, only_a).unwrap();
    left.add_version(&e, &replace_e, None, only_a).unwrap();

    let mut right = base;
    right.add_version(&e, &replace_e, None, only_a).unwrap();
    right.add_version(&d, &replace_d, None, only_a).unwrap();

    let text = left.text(all);
    assert_eq!(text, right.text(all));
    assert_eq!(text, "ZZYY");
    assert!(!text.contains("ab"));
}

#[test]
fn test_remote_replica_catches_up_with_braids() {
    let a = id(1, "alice");
    let b = id(2, "bob");
    let c = id(3, "alice");

    let mut alice = TextTree::new();
    alice
        .add_version(&a, &[Splice::insert(0, "hello world".chars())], None, none)
        .unwrap();
    alice
        .add_version(&b, &[Splice::replace(0, 1, "J".chars())], None, |v: &OpId| *v == a)
        .unwrap();
    alice
        .add_version(
            &c,
            &[Splice::delete(5, 6), Splice::insert(11, "!".chars())],
            None,
            |v: &OpId| *v == a || *v == b,
        )
        .unwrap();
    assert_eq!(alice.text(all), "Jello!");

    // carol replays every operation from its causal past
    let history = [(&a, vec![]), (&b, vec![&a]), (&c, vec![&a, &b])];
    let mut carol = TextTree::new();
    for (version, parents) in history {
        let is_anc = |v: &OpId| parents.contains(&v);
        let braid = alice.generate_braid(version, is_anc);
        let sort_key = braid.iter().find_map(|s| s.sort_key.clone());
        let splices: Vec<Splice<char>> = braid.into_iter().map(Splice::from).collect();
        carol.add_version(version, &splices, sort_key, is_anc).unwrap();
    }

    assert_eq!(carol.text(all), "Jello!");
    carol.dbg_check();
}

#[test]
fn test_replace_braid_kind() {
    let a = id(1, "a");
    let b = id(2, "b");
    let mut tree = TextTree::new();
    tree.add_version(&a, &[Splice::insert(0, "abc".chars())], None, none)
        .unwrap();
    tree.add_version(&b, &[Splice::replace(1, 1, "B".chars())], None, |v: &OpId| *v == a)
        .unwrap();

    let braid = tree.generate_braid(&b, |v: &OpId| *v == a);
    assert_eq!(braid.len(), 1);
    assert_eq!(braid[0].kind, SpliceKind::Replace);
    assert_eq!(braid[0].splice, Splice::replace(1, 1, "B".chars()));
}

#[test]
fn test_set_is_local_only() {
    let a = id(1, "a");
    let mut tree = TextTree::new();
    tree.add_version(&a, &[Splice::insert(0, "abc".chars())], None, none)
        .unwrap();

    tree.set(1, 'X', all).unwrap();
    assert_eq!(tree.text(all), "aXc");
    // the overwrite carries no provenance, so braids report the new value
    let braid = tree.generate_braid(&a, none);
    assert_eq!(braid[0].splice, Splice::insert(0, "aXc".chars()));

    assert_eq!(
        tree.set(3, 'Y', all),
        Err(TreeError::IndexOutOfBounds {
            index: 3,
            length: 3
        })
    );
}

#[test]
fn test_generic_elements() {
    let a = id(1, "a");
    let b = id(2, "b");
    let mut list = strand_core::Tree::<u32>::new();
    list.add_version(&a, &[Splice::insert(0, [1, 2, 3, 4])], None, none)
        .unwrap();
    list.add_version(&b, &[Splice::replace(1, 2, [20, 30, 35])], None, |v: &OpId| *v == a)
        .unwrap();

    assert_eq!(list.content(all), vec![1, 20, 30, 35, 4]);
    assert_eq!(list.content(|v: &OpId| *v == a), vec![1, 2, 3, 4]);
    assert_eq!(list.get(3, all), Some(&35));
}
