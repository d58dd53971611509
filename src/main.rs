use anyhow::Context;
use rayon::prelude::*;
use repograph::model::{Collection, Item, Metadata, User};
use repograph::{system_user, ElementChange, RepoConfig, RepoError, Repository, Role};

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let config = match std::env::args().nth(1) {
        Some(path) => RepoConfig::from_file(&path)
            .with_context(|| format!("loading configuration from {}", path))?,
        None => RepoConfig::default(),
    };

    println!("Repograph v{}", repograph::version());
    println!("==========================================");
    println!();

    let repo = Repository::open(config).context("opening repository")?;
    let admin = Some(system_user());

    println!("=== Demo 1: Collections and items ===");
    let root = repo
        .writer()
        .create_batch(
            vec![Collection {
                title: "Expedition 2024".into(),
                description: "Photos from the field campaign".into(),
                ..Default::default()
            }],
            admin,
        )?
        .remove(0);
    let root_uri = root.id.clone().context("collection without identifier")?;
    println!("✓ Created collection {}", root_uri);

    let sub = repo
        .writer()
        .create_batch(
            vec![Collection {
                collection: Some(root_uri.clone()),
                title: "Day 1".into(),
                ..Default::default()
            }],
            admin,
        )?
        .remove(0);
    let sub_uri = sub.id.clone().context("collection without identifier")?;
    println!("✓ Created sub-collection {}", sub_uri);

    let items: Vec<Item> = (1..=5)
        .map(|n| Item {
            collection: Some(sub_uri.clone()),
            filename: format!("IMG_{:04}.jpg", n),
            filetype: "image/jpeg".into(),
            file_size: 1024 * n,
            ..Default::default()
        })
        .collect();
    let items = repo.writer().create_batch(items, admin)?;
    println!("✓ Created {} items", items.len());

    let first = items[0].id.clone().context("item without identifier")?;
    repo.writer().change_element::<Item>(
        &first,
        "metadata",
        ElementChange::add_object(
            repo.registry(),
            &Metadata {
                text: "sand dunes".into(),
                ..Default::default()
            },
        ),
        admin,
    )?;
    println!("✓ Attached metadata to {}", first);

    println!("\n=== Demo 2: Authorization ===");
    let editor = repo
        .writer()
        .create_batch(
            vec![User {
                email: "editor@example.org".into(),
                name: "Editor".into(),
                grants: vec![format!("{},{}", Role::Update, root_uri)],
                ..Default::default()
            }],
            admin,
        )?
        .remove(0);
    let outsider = repo
        .writer()
        .create_batch(
            vec![User {
                email: "outsider@example.org".into(),
                name: "Outsider".into(),
                ..Default::default()
            }],
            admin,
        )?
        .remove(0);

    let uris: Vec<String> = items.iter().filter_map(|i| i.id.clone()).collect();
    let visible: Vec<Item> = repo.reader().retrieve_batch_lazy(&uris, Some(&editor))?;
    println!("✓ Editor reads {} items through the grant on {}", visible.len(), root_uri);

    match repo.reader().retrieve_batch::<Item>(&uris, Some(&outsider)) {
        Err(RepoError::NotAllowed(reason)) => println!("✓ Outsider refused: {}", reason),
        other => println!("✗ Unexpected outcome for outsider: {:?}", other.map(|v| v.len())),
    }
    match repo.reader().retrieve_batch::<Item>(&uris, None) {
        Err(RepoError::AuthenticationRequired) => println!("✓ Anonymous caller must authenticate"),
        other => println!("✗ Unexpected outcome for anonymous: {:?}", other.map(|v| v.len())),
    }

    println!("\n=== Demo 3: Concurrent reads ===");
    let sizes: Vec<i64> = uris
        .par_iter()
        .map(|uri| {
            repo.reader()
                .retrieve_batch::<Item>(std::slice::from_ref(uri), Some(&editor))
                .map(|mut found| found.remove(0).file_size)
        })
        .collect::<Result<_, _>>()?;
    println!("✓ Total size read in parallel: {} bytes", sizes.iter().sum::<i64>());

    let item: Vec<Item> = repo.reader().retrieve_batch(&[first], admin)?;
    println!("\n{}", serde_json::to_string_pretty(&item[0])?);

    Ok(())
}
