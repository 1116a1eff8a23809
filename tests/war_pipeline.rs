use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use uuid::Uuid;
use warboard_server::background::TaskRunner;
use warboard_server::db::memory::MemStore;
use warboard_server::db::models::{Company, SideType};
use warboard_server::db::WarStore;
use warboard_server::error::Error;
use warboard_server::players::PlayerDirectory;
use warboard_server::ranking::memory::MemRanking;
use warboard_server::ranking::RankingCache;
use warboard_server::scoring;
use warboard_server::war::{PartyStats, PlayerLine, WarService, WarUpload};

struct Fixture {
    store: Arc<MemStore>,
    cache: Arc<RankingCache>,
    tasks: TaskRunner,
    svc: WarService,
}

fn fixture() -> Fixture {
    let store: Arc<MemStore> = Arc::new(MemStore::new());
    let cache = Arc::new(RankingCache::new(Arc::new(MemRanking::new())));
    let tasks = TaskRunner::start(64);
    let svc = WarService::new(
        store.clone(),
        PlayerDirectory::new(store.clone()),
        cache.clone(),
        tasks.clone(),
        scoring::default_score,
    );
    Fixture {
        store,
        cache,
        tasks,
        svc,
    }
}

fn line(nickname: &str, class: &str, kills: u32, deaths: u32) -> PlayerLine {
    PlayerLine {
        nickname: nickname.into(),
        class: class.into(),
        kills,
        deaths,
        assists: 0,
        damage: 0,
        healing: 0,
    }
}

fn upload(
    company: Uuid,
    opponent: Uuid,
    side: SideType,
    is_winner: bool,
    players: Vec<PlayerLine>,
) -> WarUpload {
    WarUpload {
        territory: "Windsward".into(),
        start_time: Utc.with_ymd_and_hms(2024, 3, 1, 20, 0, 0).unwrap(),
        company_id: company,
        opponent_id: opponent,
        side,
        is_winner,
        world: Some("Aaru".into()),
        stats: vec![PartyStats {
            name: "Group 1".into(),
            players,
        }],
    }
}

#[tokio::test]
async fn upload_creates_war_and_ranks_players() {
    let f = fixture();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    let war = f
        .svc
        .upload_war(upload(
            a,
            b,
            SideType::Attacker,
            true,
            vec![line("Alice", "musket", 10, 2)],
        ))
        .await
        .unwrap();

    assert_eq!(war.attacker_id, a);
    assert_eq!(war.defender_id, b);
    assert_eq!(war.winner, SideType::Attacker);

    // cache update runs on the background worker
    f.tasks.flush().await;

    let player = f
        .store
        .find_player_by_key("alice")
        .await
        .unwrap()
        .expect("player created");
    let stats = f
        .cache
        .get_stats(player.id, "musket")
        .await
        .unwrap()
        .expect("ranked");
    assert_eq!(stats.games_played, 1);
    assert_eq!(stats.wins, 1);
    assert_eq!(stats.total_kills, 10);
}

#[tokio::test]
async fn losing_defender_upload_names_attacker_winner() {
    let f = fixture();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    let war = f
        .svc
        .upload_war(upload(
            b,
            a,
            SideType::Defender,
            false,
            vec![line("Bob", "bow", 3, 7)],
        ))
        .await
        .unwrap();

    assert_eq!(war.attacker_id, a);
    assert_eq!(war.defender_id, b);
    assert_eq!(war.winner, SideType::Attacker);
}

#[tokio::test]
async fn opponent_attaches_second_side() {
    let f = fixture();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    let first = f
        .svc
        .upload_war(upload(
            a,
            b,
            SideType::Attacker,
            true,
            vec![line("Alice", "musket", 10, 2)],
        ))
        .await
        .unwrap();
    let second = f
        .svc
        .upload_war(upload(
            b,
            a,
            SideType::Defender,
            false,
            vec![line("Bob", "bow", 3, 7)],
        ))
        .await
        .unwrap();

    // same war, now with both sides on record
    assert_eq!(first.id, second.id);
    let sides = f.store.sides_of(first.id).await.unwrap();
    assert_eq!(sides.len(), 2);
}

#[tokio::test]
async fn duplicate_side_is_a_conflict() {
    let f = fixture();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    f.svc
        .upload_war(upload(
            a,
            b,
            SideType::Attacker,
            true,
            vec![line("Alice", "musket", 10, 2)],
        ))
        .await
        .unwrap();

    let err = f
        .svc
        .upload_war(upload(
            a,
            b,
            SideType::Attacker,
            true,
            vec![line("Carol", "hatchet", 5, 5)],
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)), "got {err:?}");
}

#[tokio::test]
async fn unrelated_company_cannot_claim_existing_war() {
    let f = fixture();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let c = Uuid::new_v4();

    f.svc
        .upload_war(upload(
            a,
            b,
            SideType::Attacker,
            true,
            vec![line("Alice", "musket", 10, 2)],
        ))
        .await
        .unwrap();

    let err = f
        .svc
        .upload_war(upload(
            c,
            a,
            SideType::Defender,
            false,
            vec![line("Eve", "rapier", 1, 1)],
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)), "got {err:?}");
}

#[tokio::test]
async fn company_cannot_hold_both_roles() {
    let f = fixture();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    f.svc
        .upload_war(upload(
            a,
            b,
            SideType::Attacker,
            true,
            vec![line("Alice", "musket", 10, 2)],
        ))
        .await
        .unwrap();

    // attacker company trying to also file as defender
    let err = f
        .svc
        .upload_war(upload(
            a,
            b,
            SideType::Defender,
            false,
            vec![line("Alice", "musket", 10, 2)],
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)), "got {err:?}");
}

#[tokio::test]
async fn self_war_rejected_before_any_write() {
    let f = fixture();
    let a = Uuid::new_v4();

    let err = f
        .svc
        .upload_war(upload(
            a,
            a,
            SideType::Attacker,
            true,
            vec![line("Alice", "musket", 10, 2)],
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "got {err:?}");
    assert_eq!(f.store.count_performances().await.unwrap(), 0);
    assert!(f.store.all_players().await.unwrap().is_empty());
}

#[tokio::test]
async fn empty_stats_rejected() {
    let f = fixture();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    let err = f
        .svc
        .upload_war(upload(a, b, SideType::Attacker, true, vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "got {err:?}");
}

#[tokio::test]
async fn rollback_removes_war_players_and_rankings() {
    let f = fixture();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    let war = f
        .svc
        .upload_war(upload(
            a,
            b,
            SideType::Attacker,
            true,
            vec![line("Alice", "musket", 10, 2)],
        ))
        .await
        .unwrap();
    f.tasks.flush().await;

    let alice = f
        .store
        .find_player_by_key("alice")
        .await
        .unwrap()
        .unwrap();
    assert!(f.cache.get_stats(alice.id, "musket").await.unwrap().is_some());

    f.svc.rollback_war(war.id).await.unwrap();
    f.tasks.flush().await;

    assert!(f.store.find_war_by_id(war.id).await.unwrap().is_none());
    assert_eq!(f.store.count_performances().await.unwrap(), 0);
    // Alice appeared in no other war, so her row goes too
    assert!(f.store.find_player_by_key("alice").await.unwrap().is_none());
    assert!(f.cache.get_stats(alice.id, "musket").await.unwrap().is_none());
}

#[tokio::test]
async fn rollback_keeps_players_seen_in_other_wars() {
    let f = fixture();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    let first = f
        .svc
        .upload_war(upload(
            a,
            b,
            SideType::Attacker,
            true,
            vec![line("Alice", "musket", 10, 2)],
        ))
        .await
        .unwrap();

    let mut second = upload(
        a,
        b,
        SideType::Attacker,
        false,
        vec![line("Alice", "musket", 4, 6)],
    );
    second.territory = "Everfall".into();
    f.svc.upload_war(second).await.unwrap();
    f.tasks.flush().await;

    f.svc.rollback_war(first.id).await.unwrap();
    f.tasks.flush().await;

    // one performance survives, so the player does too
    assert_eq!(f.store.count_performances().await.unwrap(), 1);
    assert!(f.store.find_player_by_key("alice").await.unwrap().is_some());
}

#[tokio::test]
async fn rollback_of_unknown_war_is_not_found() {
    let f = fixture();
    let err = f.svc.rollback_war(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "got {err:?}");
}

#[tokio::test]
async fn recent_wars_shows_company_names_newest_first() {
    let f = fixture();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    f.store
        .create_company(Company {
            id: a,
            name: "Iron Pact".into(),
            faction: "Syndicate".into(),
            world: Some("Aaru".into()),
        })
        .await
        .unwrap();

    // five wars over the last five days, distinct territories
    for (i, territory) in ["Windsward", "Everfall", "Brightwood", "Reekwater", "Mourningdale"]
        .iter()
        .enumerate()
    {
        let mut u = upload(
            a,
            b,
            SideType::Attacker,
            true,
            vec![line("Alice", "musket", 1, 0)],
        );
        u.territory = territory.to_string();
        u.start_time = Utc::now() - Duration::days(i as i64);
        f.svc.upload_war(u).await.unwrap();
    }

    let recent = f.svc.recent_wars().await.unwrap();
    assert_eq!(recent.len(), 3);
    assert_eq!(recent[0].territory, "Windsward");
    assert_eq!(recent[0].attacker, "Iron Pact");
    assert_eq!(recent[0].attacker_faction, "Syndicate");
    // company b was never registered, so the feed falls back to its id
    assert_eq!(recent[0].defender, b.to_string());
}

#[tokio::test]
async fn typoed_nickname_resolves_to_existing_player() {
    let f = fixture();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    f.svc
        .upload_war(upload(
            a,
            b,
            SideType::Attacker,
            true,
            vec![line("Guilherme", "musket", 10, 2)],
        ))
        .await
        .unwrap();

    let mut second = upload(
        a,
        b,
        SideType::Attacker,
        false,
        vec![line("Guilheme", "musket", 4, 6)], // dropped one letter
    );
    second.territory = "Everfall".into();
    f.svc.upload_war(second).await.unwrap();

    // one identity, two performances
    assert_eq!(f.store.all_players().await.unwrap().len(), 1);
    assert_eq!(f.store.count_performances().await.unwrap(), 2);
}
