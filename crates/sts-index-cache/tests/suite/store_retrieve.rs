use super::{deps, init_tracing, names, open, sym, touch, Sym, Workspace, MODES};
use pretty_assertions::assert_eq;
use std::fs;
use sts_index_cache::{CachedSymbol, IndexCache, IndexCacheKey};

fn key() -> IndexCacheKey {
    IndexCacheKey::new("demo-app", "beans", "java", "1")
}

#[test]
fn store_then_retrieve_returns_symbols_and_dependencies() {
    init_tracing();
    for mode in MODES {
        let ws = Workspace::new();
        let a = ws.file("A.java");
        let b = ws.file("B.java");
        let cache = open(mode, ws.cache_dir());

        let dependencies = deps(&[(a.as_str(), &["com.example.Dep"])]);
        cache
            .store(
                &key(),
                &[&a, &b],
                vec![sym(&a, "a1"), sym(&b, "b1"), sym(&a, "a2")],
                dependencies.clone(),
            )
            .unwrap();

        let hit = cache.retrieve::<Sym, _>(&key(), &[&b, &a]).unwrap();
        assert_eq!(names(&hit.symbols), vec!["a1", "a2", "b1"], "{mode:?}");
        assert_eq!(hit.dependencies, dependencies, "{mode:?}");
        assert_eq!(ws.cache_files(), vec!["demo-app-beans-java-1.json"]);
    }
}

#[test]
fn symbol_order_within_a_file_is_preserved() {
    for mode in MODES {
        let ws = Workspace::new();
        let a = ws.file("A.java");
        let cache = open(mode, ws.cache_dir());
        let symbols = vec![sym(&a, "z"), sym(&a, "m"), sym(&a, "a")];
        cache
            .store(&key(), &[&a], symbols.clone(), Default::default())
            .unwrap();

        let retrieved: Vec<Sym> = cache.retrieve_symbols(&key(), &[&a]).unwrap();
        assert_eq!(retrieved, symbols, "{mode:?}");
    }
}

#[test]
fn extra_or_missing_requested_file_is_a_miss() {
    for mode in MODES {
        let ws = Workspace::new();
        let a = ws.file("A.java");
        let b = ws.file("B.java");
        let c = ws.file("C.java");
        let cache = open(mode, ws.cache_dir());
        cache
            .store(&key(), &[&a, &b], vec![sym(&a, "a")], Default::default())
            .unwrap();

        assert!(cache.retrieve::<Sym, _>(&key(), &[&a, &b, &c]).is_none(), "{mode:?}");
        assert!(cache.retrieve::<Sym, _>(&key(), &[&a]).is_none(), "{mode:?}");
        assert!(cache.retrieve::<Sym, _>(&key(), &[&a, &c]).is_none(), "{mode:?}");
        assert!(cache.retrieve::<Sym, _>(&key(), &[&a, &b]).is_some(), "{mode:?}");
    }
}

#[test]
fn touched_file_is_a_miss() {
    for mode in MODES {
        let ws = Workspace::new();
        let a = ws.file("A.java");
        let b = ws.file("B.java");
        let cache = open(mode, ws.cache_dir());
        cache
            .store(&key(), &[&a, &b], vec![sym(&b, "b")], Default::default())
            .unwrap();

        touch(&b);
        assert!(cache.retrieve::<Sym, _>(&key(), &[&a, &b]).is_none(), "{mode:?}");
    }
}

#[test]
fn deleting_a_stored_file_is_a_miss() {
    for mode in MODES {
        let ws = Workspace::new();
        let a = ws.file("A.java");
        let b = ws.file("B.java");
        let cache = open(mode, ws.cache_dir());
        cache
            .store(&key(), &[&a, &b], Vec::<Sym>::new(), Default::default())
            .unwrap();

        fs::remove_file(&b).unwrap();
        assert!(cache.retrieve::<Sym, _>(&key(), &[&a, &b]).is_none(), "{mode:?}");
    }
}

#[test]
fn nonexistent_files_are_neither_recorded_nor_compared() {
    for mode in MODES {
        let ws = Workspace::new();
        let a = ws.file("A.java");
        let ghost = a.replace("A.java", "Ghost.java");
        let cache = open(mode, ws.cache_dir());
        cache
            .store(&key(), &[&a, &ghost], vec![sym(&a, "a")], Default::default())
            .unwrap();

        assert_eq!(cache.modification_timestamp(&key(), &ghost), 0, "{mode:?}");
        let hit = cache.retrieve::<Sym, _>(&key(), &[&a, &ghost]).unwrap();
        assert_eq!(names(&hit.symbols), vec!["a"], "{mode:?}");
    }
}

#[test]
fn symbols_of_unknown_documents_are_kept() {
    for mode in MODES {
        let ws = Workspace::new();
        let a = ws.file("A.java");
        let cache = open(mode, ws.cache_dir());
        cache
            .store(
                &key(),
                &[&a],
                vec![CachedSymbol::new("docURI", 0, "stray".to_string()), sym(&a, "a")],
                deps(&[("/elsewhere/X.java", &["x"])]),
            )
            .unwrap();

        let hit = cache.retrieve::<Sym, _>(&key(), &[&a]).unwrap();
        assert_eq!(names(&hit.symbols), vec!["a", "stray"], "{mode:?}");
        assert_eq!(hit.dependencies, deps(&[("/elsewhere/X.java", &["x"])]), "{mode:?}");
    }
}

#[test]
fn entry_is_reused_by_a_new_instance() {
    for mode in MODES {
        let ws = Workspace::new();
        let a = ws.file("A.java");
        open(mode, ws.cache_dir())
            .store(&key(), &[&a], vec![sym(&a, "a")], Default::default())
            .unwrap();

        let reopened = open(mode, ws.cache_dir());
        let symbols: Vec<Sym> = reopened.retrieve_symbols(&key(), &[&a]).unwrap();
        assert_eq!(names(&symbols), vec!["a"], "{mode:?}");
    }
}

#[test]
fn unknown_key_is_a_miss() {
    let ws = Workspace::new();
    let a = ws.file("A.java");
    for mode in MODES {
        let cache = open(mode, ws.cache_dir());
        assert!(cache.retrieve::<Sym, _>(&key(), &[&a]).is_none());
        assert_eq!(cache.modification_timestamp(&key(), &a), 0);
    }
}

#[test]
fn corrupt_entry_is_a_miss_and_is_deleted() {
    for mode in MODES {
        let ws = Workspace::new();
        let a = ws.file("A.java");
        let path = ws.cache_dir().join(key().file_name());
        fs::write(&path, b"\0\0 definitely not json").unwrap();

        let cache = open(mode, ws.cache_dir());
        assert!(cache.retrieve::<Sym, _>(&key(), &[&a]).is_none(), "{mode:?}");
        assert!(!path.exists(), "{mode:?}");
    }
}

#[test]
fn duplicate_requested_file_is_a_miss() {
    for mode in MODES {
        let ws = Workspace::new();
        let a = ws.file("A.java");
        let b = ws.file("B.java");
        let cache = open(mode, ws.cache_dir());
        cache
            .store(&key(), &[&a, &b], vec![sym(&a, "a"), sym(&b, "b")], Default::default())
            .unwrap();

        assert!(cache.retrieve::<Sym, _>(&key(), &[&a, &a]).is_none(), "{mode:?}");
        assert!(cache.retrieve::<Sym, _>(&key(), &[&a, &b, &a]).is_none(), "{mode:?}");

        let hit = cache.retrieve::<Sym, _>(&key(), &[&a, &b]).unwrap();
        assert_eq!(names(&hit.symbols), vec!["a", "b"], "{mode:?}");
    }
}

#[test]
fn reading_a_colliding_key_leaves_the_other_entry_alone() {
    let owner = IndexCacheKey::new("a-b", "c", "d", "1");
    let colliding = IndexCacheKey::new("a", "b-c", "d", "1");
    assert_eq!(owner.file_name(), colliding.file_name());

    for mode in MODES {
        let ws = Workspace::new();
        let a = ws.file("A.java");
        let cache = open(mode, ws.cache_dir());
        cache
            .store(&owner, &[&a], vec![sym(&a, "a")], Default::default())
            .unwrap();

        assert_eq!(cache.modification_timestamp(&colliding, &a), 0, "{mode:?}");
        assert!(cache.retrieve::<Sym, _>(&colliding, &[&a]).is_none(), "{mode:?}");
        assert_eq!(ws.cache_files(), vec!["a-b-c-d-1.json"], "{mode:?}");

        let reopened = open(mode, ws.cache_dir());
        let symbols: Vec<Sym> = reopened.retrieve_symbols(&owner, &[&a]).unwrap();
        assert_eq!(names(&symbols), vec!["a"], "{mode:?}");
    }
}
