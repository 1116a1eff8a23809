use std::sync::Arc;

use warboard_server::db::memory::MemStore;
use warboard_server::db::NewPlayer;
use warboard_server::db::WarStore;
use warboard_server::players::PlayerDirectory;

fn directory() -> (Arc<MemStore>, PlayerDirectory) {
    let store = Arc::new(MemStore::new());
    let dir = PlayerDirectory::new(store.clone());
    (store, dir)
}

async fn seed(store: &MemStore, nicknames: &[&str]) {
    let rows = nicknames
        .iter()
        .map(|n| NewPlayer {
            nickname: n.to_string(),
            nick_key: n.to_lowercase().replace(|c: char| !c.is_ascii_alphanumeric(), ""),
            world: None,
        })
        .collect();
    store.create_players(rows).await.unwrap();
}

#[tokio::test]
async fn upsert_collapses_decorated_variants() {
    let (store, dir) = directory();

    // same identity under canonicalization
    let resolved = dir
        .upsert_players(&["Lk-Lk!".into(), "lklk".into()], None)
        .await
        .unwrap();
    assert_eq!(resolved.len(), 1);
    assert_eq!(store.all_players().await.unwrap().len(), 1);
    assert_eq!(resolved[0].nick_key, "lklk");
}

#[tokio::test]
async fn upsert_does_not_merge_distinct_short_names() {
    let (store, dir) = directory();

    // two characters apart at length two is a different player
    let resolved = dir
        .upsert_players(&["ab".into(), "cd".into()], None)
        .await
        .unwrap();
    assert_eq!(resolved.len(), 2);
    assert_eq!(store.all_players().await.unwrap().len(), 2);
}

#[tokio::test]
async fn lookup_by_nickname_is_canonical() {
    let (_, dir) = directory();
    dir.upsert_players(&["Shadow Blade".into()], Some("Aaru"))
        .await
        .unwrap();

    let view = dir.find_by_nickname("shadowblade").await.unwrap().unwrap();
    assert_eq!(view.player.nickname, "Shadow Blade");
    assert!(view.profile.is_some());
    assert!(dir.find_by_id(view.player.id).await.unwrap().is_some());
    assert!(dir.find_by_nickname("nobody").await.unwrap().is_none());
}

#[tokio::test]
async fn search_ranks_exact_prefix_substring_then_fuzzy() {
    let (store, dir) = directory();
    seed(&store, &["mark", "marker", "denmark", "mask", "zeta"]).await;

    let page = dir.search(Some("mark"), 1, 10).await.unwrap();
    let names: Vec<&str> = page.data.iter().map(|p| p.nickname.as_str()).collect();

    assert_eq!(names, vec!["mark", "marker", "denmark", "mask"]);
    assert_eq!(page.total, 4);
    assert_eq!(page.total_pages, 1);
}

#[tokio::test]
async fn search_without_query_pages_alphabetically() {
    let (store, dir) = directory();
    seed(&store, &["carol", "alice", "bob"]).await;

    let page = dir.search(None, 1, 2).await.unwrap();
    let names: Vec<&str> = page.data.iter().map(|p| p.nickname.as_str()).collect();
    assert_eq!(names, vec!["alice", "bob"]);
    assert_eq!(page.total, 3);
    assert_eq!(page.total_pages, 2);

    let page2 = dir.search(None, 2, 2).await.unwrap();
    assert_eq!(page2.data.len(), 1);
    assert_eq!(page2.data[0].nickname, "carol");
}

#[tokio::test]
async fn search_page_past_the_end_is_empty() {
    let (store, dir) = directory();
    seed(&store, &["alice", "bob"]).await;

    let page = dir.search(None, 1000, 10).await.unwrap();
    assert!(page.data.is_empty());
    assert_eq!(page.total, 2);

    // extreme page numbers must not wrap the offset arithmetic
    let page = dir.search(None, u32::MAX, u32::MAX).await.unwrap();
    assert!(page.data.is_empty());
    assert_eq!(page.total, 2);
}
