use super::{deps, names, open, sym, touch, Sym, Workspace, MODES};
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use sts_index_cache::{CacheError, CachedSymbol, IndexCache, IndexCacheKey};

fn key() -> IndexCacheKey {
    IndexCacheKey::new("demo", "symbols", "java", "4")
}

#[test]
fn update_replaces_one_file_and_keeps_the_rest() {
    for mode in MODES {
        let ws = Workspace::new();
        let a = ws.file("A.java");
        let b = ws.file("B.java");
        let cache = open(mode, ws.cache_dir());
        cache
            .store(
                &key(),
                &[&a, &b],
                vec![sym(&a, "a-old"), sym(&b, "b")],
                deps(&[(a.as_str(), &["old-dep"]), (b.as_str(), &["b-dep"])]),
            )
            .unwrap();

        let modified = touch(&a);
        cache
            .update(
                &key(),
                &a,
                modified,
                vec![sym(&a, "a-new1"), sym(&a, "a-new2")],
                BTreeSet::from(["new-dep".to_string()]),
            )
            .unwrap();

        assert_eq!(cache.modification_timestamp(&key(), &a), modified, "{mode:?}");
        let hit = cache.retrieve::<Sym, _>(&key(), &[&a, &b]).unwrap();
        assert_eq!(names(&hit.symbols), vec!["a-new1", "a-new2", "b"], "{mode:?}");
        assert_eq!(
            hit.dependencies,
            deps(&[(a.as_str(), &["new-dep"]), (b.as_str(), &["b-dep"])]),
            "{mode:?}"
        );
    }
}

#[test]
fn update_attributes_every_symbol_to_the_updated_file() {
    for mode in MODES {
        let ws = Workspace::new();
        let a = ws.file("A.java");
        let cache = open(mode, ws.cache_dir());
        cache
            .store(&key(), &[&a], vec![sym(&a, "a")], Default::default())
            .unwrap();

        let modified = touch(&a);
        cache
            .update(
                &key(),
                &a,
                modified,
                vec![CachedSymbol::new("docURI", modified, "generated".to_string())],
                BTreeSet::new(),
            )
            .unwrap();
        let next = touch(&a);
        cache
            .update::<Sym>(&key(), &a, next, Vec::new(), BTreeSet::new())
            .unwrap();

        let hit = cache.retrieve::<Sym, _>(&key(), &[&a]).unwrap();
        assert!(hit.symbols.is_empty(), "{mode:?}");
    }
}

#[test]
fn empty_dependency_set_clears_dependencies() {
    for mode in MODES {
        let ws = Workspace::new();
        let a = ws.file("A.java");
        let cache = open(mode, ws.cache_dir());
        cache
            .store(&key(), &[&a], vec![sym(&a, "a")], deps(&[(a.as_str(), &["dep"])]))
            .unwrap();

        let modified = cache.modification_timestamp(&key(), &a);
        cache
            .update(&key(), &a, modified, vec![sym(&a, "a")], BTreeSet::new())
            .unwrap();

        let hit = cache.retrieve::<Sym, _>(&key(), &[&a]).unwrap();
        assert!(hit.dependencies.is_empty(), "{mode:?}");
    }
}

#[test]
fn update_of_a_new_file_grows_the_entry() {
    for mode in MODES {
        let ws = Workspace::new();
        let a = ws.file("A.java");
        let cache = open(mode, ws.cache_dir());
        cache
            .store(&key(), &[&a], vec![sym(&a, "a")], Default::default())
            .unwrap();

        let b = ws.file("B.java");
        assert!(cache.retrieve::<Sym, _>(&key(), &[&a, &b]).is_none(), "{mode:?}");

        let modified = sts_index_cache::file_mtime_millis(std::path::Path::new(&b)).unwrap();
        cache
            .update(&key(), &b, modified, vec![sym(&b, "b")], BTreeSet::new())
            .unwrap();

        let hit = cache.retrieve::<Sym, _>(&key(), &[&a, &b]).unwrap();
        assert_eq!(names(&hit.symbols), vec!["a", "b"], "{mode:?}");
    }
}

#[test]
fn update_without_stored_entry_is_ignored() {
    for mode in MODES {
        let ws = Workspace::new();
        let a = ws.file("A.java");
        let cache = open(mode, ws.cache_dir());

        cache
            .update(&key(), &a, 42, vec![sym(&a, "a")], BTreeSet::new())
            .unwrap();
        assert!(ws.cache_files().is_empty(), "{mode:?}");
        assert_eq!(cache.modification_timestamp(&key(), &a), 0, "{mode:?}");
    }
}

#[test]
fn update_many_applies_the_whole_batch() {
    for mode in MODES {
        let ws = Workspace::new();
        let a = ws.file("A.java");
        let b = ws.file("B.java");
        let c = ws.file("C.java");
        let cache = open(mode, ws.cache_dir());
        cache
            .store(
                &key(),
                &[&a, &b, &c],
                vec![sym(&a, "a"), sym(&b, "b"), sym(&c, "c")],
                Default::default(),
            )
            .unwrap();

        let a_time = touch(&a);
        let c_time = touch(&c);
        cache
            .update_many(
                &key(),
                &[&a, &c],
                &[a_time, c_time],
                vec![
                    sym(&c, "c2"),
                    sym(&a, "a2"),
                    CachedSymbol::new("docURI", 0, "unowned".to_string()),
                ],
                deps(&[(c.as_str(), &["c-dep"]), (b.as_str(), &["ignored"])]),
            )
            .unwrap();

        assert_eq!(cache.modification_timestamp(&key(), &a), a_time, "{mode:?}");
        assert_eq!(cache.modification_timestamp(&key(), &c), c_time, "{mode:?}");
        let hit = cache.retrieve::<Sym, _>(&key(), &[&a, &b, &c]).unwrap();
        assert_eq!(names(&hit.symbols), vec!["a2", "b", "c2", "unowned"], "{mode:?}");
        assert_eq!(hit.dependencies, deps(&[(c.as_str(), &["c-dep"])]), "{mode:?}");
    }
}

#[test]
fn update_many_rejects_mismatched_batches_without_changes() {
    for mode in MODES {
        let ws = Workspace::new();
        let a = ws.file("A.java");
        let b = ws.file("B.java");
        let cache = open(mode, ws.cache_dir());
        cache
            .store(&key(), &[&a, &b], vec![sym(&a, "a")], Default::default())
            .unwrap();
        let before = cache.modification_timestamp(&key(), &a);

        let err = cache
            .update_many(&key(), &[&a, &b], &[1], vec![sym(&a, "a2")], Default::default())
            .unwrap_err();
        assert!(
            matches!(err, CacheError::BatchLengthMismatch { files: 2, timestamps: 1 }),
            "{mode:?}: {err}"
        );

        assert_eq!(cache.modification_timestamp(&key(), &a), before, "{mode:?}");
        let hit = cache.retrieve::<Sym, _>(&key(), &[&a, &b]).unwrap();
        assert_eq!(names(&hit.symbols), vec!["a"], "{mode:?}");
    }
}
