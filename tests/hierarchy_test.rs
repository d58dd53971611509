//! Integration tests for top-level parent resolution
//!
//! Both resolvers must agree on the outermost ancestor of items and collections.

use repograph::model::{Collection, Item};
use repograph::{
    system_user, HierarchyIndex, HierarchyResolver, RepoError, Repository, SecurityTarget,
};

fn collection(repo: &Repository, parent: Option<&str>, title: &str) -> Collection {
    repo.writer()
        .create_batch(
            vec![Collection {
                collection: parent.map(str::to_string),
                title: title.into(),
                ..Default::default()
            }],
            Some(system_user()),
        )
        .unwrap()
        .remove(0)
}

fn item(repo: &Repository, parent: &str) -> Item {
    repo.writer()
        .create_batch(
            vec![Item {
                collection: Some(parent.to_string()),
                filename: "file.tif".into(),
                ..Default::default()
            }],
            Some(system_user()),
        )
        .unwrap()
        .remove(0)
}

fn top_level(repo: &Repository, target: &SecurityTarget) -> String {
    repo.dataset()
        .read(|tx| repo.authorization().resolver().top_level_parent(tx, target))
        .unwrap()
}

fn uri<T: repograph::Protected>(object: &T) -> String {
    object.uri().unwrap().to_string()
}

#[test]
fn test_item_in_top_level_collection() {
    let repo = Repository::in_memory().unwrap();
    let c1 = collection(&repo, None, "C1");
    let i1 = item(&repo, &uri(&c1));

    assert_eq!(top_level(&repo, &SecurityTarget::of(&i1).unwrap()), uri(&c1));
}

#[test]
fn test_item_in_sub_collection() {
    let repo = Repository::in_memory().unwrap();
    let c1 = collection(&repo, None, "C1");
    let c2 = collection(&repo, Some(&uri(&c1)), "C2");
    let i2 = item(&repo, &uri(&c2));

    assert_eq!(top_level(&repo, &SecurityTarget::of(&c2).unwrap()), uri(&c1));
    assert_eq!(top_level(&repo, &SecurityTarget::of(&i2).unwrap()), uri(&c1));
}

#[test]
fn test_root_is_its_own_top_level_parent() {
    let repo = Repository::in_memory().unwrap();
    let c1 = collection(&repo, None, "C1");
    let target = SecurityTarget::of(&c1).unwrap();

    let top = top_level(&repo, &target);
    assert_eq!(top, uri(&c1));
    assert_eq!(top_level(&repo, &SecurityTarget::collection(top.clone())), top);
}

#[test]
fn test_deep_chain_and_index_agree() {
    let repo = Repository::in_memory().unwrap();
    let mut chain = vec![collection(&repo, None, "level 0")];
    for depth in 1..6 {
        let parent = uri(&chain[depth - 1]);
        chain.push(collection(&repo, Some(&parent), &format!("level {}", depth)));
    }
    let leaf = item(&repo, &uri(&chain[5]));
    let root = uri(&chain[0]);

    for c in &chain {
        assert_eq!(top_level(&repo, &SecurityTarget::of(c).unwrap()), root);
    }
    assert_eq!(top_level(&repo, &SecurityTarget::of(&leaf).unwrap()), root);

    let index = HierarchyIndex::new(repo.registry());
    index.rebuild(&repo.dataset().snapshot());
    let ancestors = index.ancestors(&uri(&leaf));
    let expected: Vec<String> = chain.iter().rev().map(uri).collect();
    assert_eq!(ancestors, expected);
    assert_eq!(index.top_level_parent(&uri(&leaf)), root);
    assert_eq!(index.descendants(&root).len(), 6);
    assert!(index.descendants(&uri(&leaf)).is_empty());
}

#[test]
fn test_index_does_not_see_later_writes_until_rebuilt() {
    let repo = Repository::in_memory().unwrap();
    let c1 = collection(&repo, None, "C1");
    let index = HierarchyIndex::new(repo.registry());
    index.rebuild(&repo.dataset().snapshot());

    let c2 = collection(&repo, Some(&uri(&c1)), "C2");
    assert!(index.ancestors(&uri(&c2)).is_empty());

    index.rebuild(&repo.dataset().snapshot());
    assert_eq!(index.ancestors(&uri(&c2)), vec![uri(&c1)]);
}

#[test]
fn test_malformed_identifier_fails_the_query() {
    let repo = Repository::in_memory().unwrap();
    let target = SecurityTarget::collection("http://imeji.org/collection/<bad>");
    let result = repo
        .dataset()
        .read(|tx| repo.authorization().resolver().top_level_parent(tx, &target));
    assert!(matches!(result, Err(RepoError::QueryFailed(_))));
}
