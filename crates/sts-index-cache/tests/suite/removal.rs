use super::{deps, names, open, sym, Sym, Workspace, MODES};
use pretty_assertions::assert_eq;
use sts_index_cache::{IndexCache, IndexCacheKey};

fn key() -> IndexCacheKey {
    IndexCacheKey::new("demo", "properties", "yaml", "2")
}

#[test]
fn remove_file_keeps_the_remaining_files_valid() {
    for mode in MODES {
        let ws = Workspace::new();
        let a = ws.file("A.java");
        let b = ws.file("B.java");
        let cache = open(mode, ws.cache_dir());
        cache
            .store(
                &key(),
                &[&a, &b],
                vec![sym(&a, "a"), sym(&b, "b")],
                deps(&[(a.as_str(), &["a-dep"]), (b.as_str(), &["b-dep"])]),
            )
            .unwrap();

        cache.remove_file(&key(), &a).unwrap();

        assert_eq!(cache.modification_timestamp(&key(), &a), 0, "{mode:?}");
        assert_ne!(cache.modification_timestamp(&key(), &b), 0, "{mode:?}");
        let hit = cache.retrieve::<Sym, _>(&key(), &[&b]).unwrap();
        assert_eq!(names(&hit.symbols), vec!["b"], "{mode:?}");
        assert_eq!(hit.dependencies, deps(&[(b.as_str(), &["b-dep"])]), "{mode:?}");
        assert!(cache.retrieve::<Sym, _>(&key(), &[&a, &b]).is_none(), "{mode:?}");
    }
}

#[test]
fn remove_files_drops_exactly_the_given_files() {
    for mode in MODES {
        let ws = Workspace::new();
        let files: Vec<String> = ["F1.java", "F2.java", "F3.java", "F4.java"]
            .iter()
            .map(|name| ws.file(name))
            .collect();
        let symbols = files
            .iter()
            .enumerate()
            .map(|(idx, file)| sym(file, &format!("s{}", idx + 1)))
            .collect();
        let dependencies = deps(&[
            (files[0].as_str(), &["d1"]),
            (files[1].as_str(), &["d2"]),
            (files[2].as_str(), &["d3"]),
            (files[3].as_str(), &["d4"]),
        ]);
        let cache = open(mode, ws.cache_dir());
        cache.store(&key(), &files[..], symbols, dependencies).unwrap();

        cache
            .remove_files(&key(), &[&files[0], &files[2]])
            .unwrap();

        let remaining = [&files[1], &files[3]];
        let hit = cache.retrieve::<Sym, _>(&key(), &remaining).unwrap();
        assert_eq!(names(&hit.symbols), vec!["s2", "s4"], "{mode:?}");
        assert_eq!(
            hit.dependencies,
            deps(&[(files[1].as_str(), &["d2"]), (files[3].as_str(), &["d4"])]),
            "{mode:?}"
        );
        assert_eq!(cache.modification_timestamp(&key(), &files[0]), 0, "{mode:?}");
        assert_eq!(cache.modification_timestamp(&key(), &files[2]), 0, "{mode:?}");
    }
}

#[test]
fn remove_deletes_the_entry() {
    for mode in MODES {
        let ws = Workspace::new();
        let a = ws.file("A.java");
        let cache = open(mode, ws.cache_dir());
        cache
            .store(&key(), &[&a], vec![sym(&a, "a")], Default::default())
            .unwrap();
        assert_eq!(ws.cache_files(), vec![key().file_name()]);

        cache.remove(&key()).unwrap();

        assert!(ws.cache_files().is_empty(), "{mode:?}");
        assert!(cache.retrieve::<Sym, _>(&key(), &[&a]).is_none(), "{mode:?}");
        assert_eq!(cache.modification_timestamp(&key(), &a), 0, "{mode:?}");

        // Removing twice, or removing from a missing entry, is fine.
        cache.remove(&key()).unwrap();
        cache.remove_file(&key(), &a).unwrap();
        assert!(ws.cache_files().is_empty(), "{mode:?}");
    }
}
