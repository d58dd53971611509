//! Integration tests for the authorization-checking facades

use repograph::model::{Collection, Item, Status, User, UserGroup};
use repograph::rdf::NamedNode;
use repograph::{system_user, ElementChange, RepoConfig, RepoError, Repository, Value};

const GLOBAL: &str = "http://imeji.org/";

struct World {
    repo: Repository,
    c1: String,
    c2: String,
    other: String,
    item: Item,
}

fn admin() -> Option<&'static User> {
    Some(system_user())
}

fn world_with(config: RepoConfig) -> World {
    let repo = Repository::open(config).unwrap();
    let writer = repo.writer();
    let c1 = writer
        .create_batch(vec![Collection { title: "C1".into(), ..Default::default() }], admin())
        .unwrap()
        .remove(0)
        .id
        .unwrap();
    let c2 = writer
        .create_batch(
            vec![Collection {
                collection: Some(c1.clone()),
                title: "C2".into(),
                ..Default::default()
            }],
            admin(),
        )
        .unwrap()
        .remove(0)
        .id
        .unwrap();
    let other = writer
        .create_batch(vec![Collection { title: "Other".into(), ..Default::default() }], admin())
        .unwrap()
        .remove(0)
        .id
        .unwrap();
    let item = writer
        .create_batch(
            vec![Item {
                collection: Some(c2.clone()),
                filename: "a.png".into(),
                ..Default::default()
            }],
            admin(),
        )
        .unwrap()
        .remove(0);
    World {
        repo,
        c1,
        c2,
        other,
        item,
    }
}

fn world() -> World {
    world_with(RepoConfig::default())
}

impl World {
    fn user(&self, grants: &[String]) -> User {
        self.repo
            .writer()
            .create_batch(
                vec![User {
                    email: "someone@example.org".into(),
                    grants: grants.to_vec(),
                    ..Default::default()
                }],
                admin(),
            )
            .unwrap()
            .remove(0)
    }

    fn item_uri(&self) -> String {
        self.item.id.clone().unwrap()
    }

    fn item_count(&self) -> usize {
        let graph = NamedNode::new("http://imeji.org/item").unwrap();
        self.repo
            .query(
                "SELECT ?s WHERE { ?s a <http://imeji.org/terms/item> }",
                Some(&graph),
            )
            .unwrap()
            .len()
    }
}

#[test]
fn test_unauthorized_reads_raise() {
    let w = world();
    let stranger = w.user(&[format!("ADMIN,{}", w.other)]);
    let uris = vec![w.item_uri()];

    assert!(matches!(
        w.repo.reader().retrieve_batch::<Item>(&uris, Some(&stranger)),
        Err(RepoError::NotAllowed(_))
    ));
    assert!(matches!(
        w.repo.reader().retrieve_batch_lazy::<Item>(&uris, None),
        Err(RepoError::AuthenticationRequired)
    ));
}

#[test]
fn test_grant_on_top_level_collection_covers_nested_item() {
    let w = world();
    let reader = w.user(&[format!("READ,{}", w.c1)]);
    let found: Vec<Item> = w
        .repo
        .reader()
        .retrieve_batch(&[w.item_uri()], Some(&reader))
        .unwrap();
    assert_eq!(found[0].filename, "a.png");

    let mut changed = found[0].clone();
    changed.filename = "b.png".into();
    assert!(matches!(
        w.repo.writer().update_batch(vec![changed], Some(&reader), false),
        Err(RepoError::NotAllowed(_))
    ));
    let stored: Vec<Item> = w.repo.reader().retrieve_batch(&[w.item_uri()], admin()).unwrap();
    assert_eq!(stored[0].filename, "a.png");
}

#[test]
fn test_released_objects_are_public_unless_private_mode() {
    for private_mode in [false, true] {
        let w = world_with(RepoConfig {
            private_mode,
            ..RepoConfig::default()
        });
        let mut released = w.item.clone();
        released.properties.status = Status::Released;
        w.repo.writer().update_batch(vec![released], admin(), false).unwrap();

        let anonymous = w.repo.reader().retrieve_batch::<Item>(&[w.item_uri()], None);
        if private_mode {
            assert!(matches!(anonymous, Err(RepoError::AuthenticationRequired)));
        } else {
            assert_eq!(anonymous.unwrap()[0].properties.status, Status::Released);
        }

        let nobody = w.user(&[]);
        assert!(w
            .repo
            .reader()
            .retrieve_batch::<Item>(&[w.item_uri()], Some(&nobody))
            .is_ok());
    }
}

#[test]
fn test_batch_is_checked_before_any_write() {
    let w = world();
    let editor = w.user(&[format!("UPDATE,{}", w.c1)]);
    let before = w.item_count();

    let batch = vec![
        Item {
            collection: Some(w.c2.clone()),
            filename: "allowed.png".into(),
            ..Default::default()
        },
        Item {
            collection: Some(w.other.clone()),
            filename: "refused.png".into(),
            ..Default::default()
        },
    ];
    assert!(matches!(
        w.repo.writer().create_batch(batch, Some(&editor)),
        Err(RepoError::NotAllowed(_))
    ));
    assert_eq!(w.item_count(), before);

    let created = w
        .repo
        .writer()
        .create_batch(
            vec![Item {
                collection: Some(w.c2.clone()),
                filename: "allowed.png".into(),
                ..Default::default()
            }],
            Some(&editor),
        )
        .unwrap();
    assert!(created[0].id.as_deref().unwrap().starts_with("http://imeji.org/item/"));
    assert_eq!(w.item_count(), before + 1);
}

#[test]
fn test_top_level_collections_need_global_update() {
    let w = world();
    let creator = w.user(&[format!("UPDATE,{}", GLOBAL)]);
    let editor = w.user(&[format!("UPDATE,{}", w.c1)]);
    let fresh = || vec![Collection { title: "New".into(), ..Default::default() }];

    assert!(w.repo.writer().create_batch(fresh(), Some(&creator)).is_ok());
    assert!(matches!(
        w.repo.writer().create_batch(fresh(), Some(&editor)),
        Err(RepoError::NotAllowed(_))
    ));
    assert!(matches!(
        w.repo.writer().create_batch(fresh(), None),
        Err(RepoError::AuthenticationRequired)
    ));
    // A repository-wide UPDATE grant does not reach into existing collections
    assert!(w
        .repo
        .reader()
        .retrieve_batch::<Collection>(&[w.c1.clone()], Some(&creator))
        .is_err());
}

#[test]
fn test_delete_needs_delete_role() {
    let w = world();
    let editor = w.user(&[format!("EDIT,{}", w.c1)]);
    let deleter = w.user(&[format!("DELETE,{}", w.c1)]);

    assert!(matches!(
        w.repo.writer().delete_batch(std::slice::from_ref(&w.item), Some(&editor)),
        Err(RepoError::NotAllowed(_))
    ));
    w.repo
        .writer()
        .delete_batch(std::slice::from_ref(&w.item), Some(&deleter))
        .unwrap();
    assert!(matches!(
        w.repo.reader().retrieve_batch::<Item>(&[w.item_uri()], admin()),
        Err(RepoError::NotFound(_))
    ));
}

#[test]
fn test_moving_an_item_needs_update_on_the_new_parent() {
    let w = world();
    let editor = w.user(&[format!("UPDATE,{}", w.c1)]);
    let mut moved = w.item.clone();
    moved.collection = Some(w.other.clone());

    assert!(matches!(
        w.repo.writer().update_batch(vec![moved.clone()], Some(&editor), false),
        Err(RepoError::NotAllowed(_))
    ));

    let both = w.user(&[format!("UPDATE,{}", w.c1), format!("UPDATE,{}", w.other)]);
    let updated = w
        .repo
        .writer()
        .update_batch(vec![moved], Some(&both), false)
        .unwrap();
    assert_eq!(updated[0].collection.as_deref(), Some(w.other.as_str()));
}

#[test]
fn test_acting_user_is_reread_inside_the_transaction() {
    let w = world();
    let mut reader = w.user(&[format!("READ,{}", w.c1)]);
    let uris = vec![w.item_uri()];
    assert!(w.repo.reader().retrieve_batch::<Item>(&uris, Some(&reader)).is_ok());

    // The in-memory copy keeps its grant, the stored user loses it
    let mut revoked = reader.clone();
    revoked.grants.clear();
    w.repo.writer().update_batch(vec![revoked], admin(), false).unwrap();
    assert!(matches!(
        w.repo.reader().retrieve_batch::<Item>(&uris, Some(&reader)),
        Err(RepoError::NotAllowed(_))
    ));

    w.repo
        .writer()
        .delete_batch(std::slice::from_ref(&reader), admin())
        .unwrap();
    assert!(matches!(
        w.repo.reader().retrieve_batch::<Item>(&uris, Some(&reader)),
        Err(RepoError::AuthenticationRequired)
    ));

    reader.id = None;
    assert!(matches!(
        w.repo.reader().retrieve_batch::<Item>(&uris, Some(&reader)),
        Err(RepoError::AuthenticationRequired)
    ));
}

#[test]
fn test_group_grants_apply_to_members() {
    let w = world();
    let member = w.user(&[]);
    let uris = vec![w.item_uri()];
    assert!(w.repo.reader().retrieve_batch::<Item>(&uris, Some(&member)).is_err());

    w.repo
        .writer()
        .create_batch(
            vec![UserGroup {
                name: "Curators".into(),
                grants: vec![format!("READ,{}", w.c1)],
                users: vec![member.id.clone().unwrap()],
                ..Default::default()
            }],
            admin(),
        )
        .unwrap();
    assert!(w.repo.reader().retrieve_batch::<Item>(&uris, Some(&member)).is_ok());
}

#[test]
fn test_change_element_is_authorized_on_the_owner() {
    let w = world();
    let reader = w.user(&[format!("READ,{}", w.c1)]);
    let editor = w.user(&[format!("UPDATE,{}", w.c1)]);
    let change = || ElementChange::Add(Value::String("survey".into()));

    assert!(matches!(
        w.repo
            .writer()
            .change_element::<Collection>(&w.c2, "types", change(), Some(&reader)),
        Err(RepoError::NotAllowed(_))
    ));
    w.repo
        .writer()
        .change_element::<Collection>(&w.c2, "types", change(), Some(&editor))
        .unwrap();
    let c2: Vec<Collection> = w
        .repo
        .reader()
        .retrieve_batch(&[w.c2.clone()], Some(&editor))
        .unwrap();
    assert_eq!(c2[0].types, vec!["survey"]);
}

#[test]
fn test_rejected_change_leaves_writes_available() {
    let w = world();
    let result = w.repo.writer().change_element::<Collection>(
        &w.c2,
        "tpyes",
        ElementChange::Add(Value::String("survey".into())),
        admin(),
    );
    assert!(matches!(result, Err(RepoError::InvalidChange { .. })));

    let before = w.item_count();
    w.repo
        .writer()
        .create_batch(
            vec![Item {
                collection: Some(w.c2.clone()),
                filename: "b.png".into(),
                ..Default::default()
            }],
            admin(),
        )
        .unwrap();
    assert_eq!(w.item_count(), before + 1);
}

#[test]
fn test_only_sysadmins_manage_users() {
    let w = world();
    let admin_user = w.user(&[format!("ADMIN,{}", GLOBAL)]);
    let plain = w.user(&[format!("ADMIN,{}", w.c1)]);
    let account = || vec![User { email: "new@example.org".into(), ..Default::default() }];

    assert!(w.repo.writer().create_batch(account(), Some(&admin_user)).is_ok());
    assert!(matches!(
        w.repo.writer().create_batch(account(), Some(&plain)),
        Err(RepoError::NotAllowed(_))
    ));
}

#[test]
fn test_open_rejects_base_uri_without_trailing_slash() {
    let config = RepoConfig {
        base_uri: "http://imeji.org".into(),
        ..RepoConfig::default()
    };
    assert!(matches!(Repository::open(config), Err(RepoError::Config(_))));
}
